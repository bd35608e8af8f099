//! Tests for #[derive(Action)] macro

use todosync_macros::Action;

#[derive(Action, Clone, Debug, PartialEq)]
enum TodoAction {
    #[command]
    AddTodo { title: String },

    #[command]
    ClearCompleted,

    #[command]
    DeleteTodo(u64),

    #[event]
    TodoAdded { id: u64, title: String },

    #[event]
    DeleteTodoFailed(u64),

    Tick,
}

#[test]
fn test_is_command() {
    let action = TodoAction::AddTodo {
        title: "Buy milk".to_string(),
    };
    assert!(action.is_command());
    assert!(!action.is_event());
}

#[test]
fn test_is_event() {
    let action = TodoAction::TodoAdded {
        id: 5,
        title: "Buy milk".to_string(),
    };
    assert!(!action.is_command());
    assert!(action.is_event());
}

#[test]
fn test_unmarked_variant_is_neither() {
    assert!(!TodoAction::Tick.is_command());
    assert!(!TodoAction::Tick.is_event());
}

#[test]
fn test_all_shapes_identified() {
    let commands = vec![
        TodoAction::AddTodo {
            title: "x".to_string(),
        },
        TodoAction::ClearCompleted,
        TodoAction::DeleteTodo(1),
    ];
    for cmd in commands {
        assert!(cmd.is_command(), "Expected command: {cmd:?}");
    }

    let events = vec![
        TodoAction::TodoAdded {
            id: 1,
            title: "x".to_string(),
        },
        TodoAction::DeleteTodoFailed(1),
    ];
    for event in events {
        assert!(event.is_event(), "Expected event: {event:?}");
    }
}

#[test]
fn test_variant_names() {
    assert_eq!(TodoAction::ClearCompleted.name(), "ClearCompleted");
    assert_eq!(TodoAction::DeleteTodo(3).name(), "DeleteTodo");
    assert_eq!(
        TodoAction::TodoAdded {
            id: 1,
            title: String::new()
        }
        .name(),
        "TodoAdded"
    );
    assert_eq!(TodoAction::Tick.name(), "Tick");
}
