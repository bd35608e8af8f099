//! Domain types for the todo list.
//!
//! Wire types mirror the REST resource (camelCase JSON). [`AppAction`] is the
//! single action type flowing through the store: commands are user intents,
//! events are outcomes reported back by effects.

use crate::filter::FilterStatus;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use todosync_macros::Action;

/// Server-assigned todo identifier; `0` is reserved for the optimistic placeholder
pub type TodoId = u64;

/// Server-assigned user identifier
pub type UserId = u64;

/// Id carried by a todo that the server has not created yet
pub const PLACEHOLDER_ID: TodoId = 0;

/// A single todo item, as stored by the server
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    /// Server-assigned id
    pub id: TodoId,
    /// Owner
    pub user_id: UserId,
    /// Title shown in the list
    pub title: String,
    /// Whether the todo is done
    pub completed: bool,
}

impl Todo {
    /// Optimistic placeholder shown while a create request is in flight
    #[must_use]
    pub fn placeholder(user_id: UserId, title: impl Into<String>) -> Self {
        Self {
            id: PLACEHOLDER_ID,
            user_id,
            title: title.into(),
            completed: false,
        }
    }

    /// Full update body for this todo with `changes` merged in
    #[must_use]
    pub fn patched(&self, changes: &TodoChanges) -> TodoPatch {
        TodoPatch {
            user_id: self.user_id,
            title: changes.title.clone().unwrap_or_else(|| self.title.clone()),
            completed: changes.completed.unwrap_or(self.completed),
        }
    }
}

/// Create request body
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTodo {
    /// Owner
    pub user_id: UserId,
    /// Always `false` on creation
    pub completed: bool,
    /// Trimmed, non-empty title
    pub title: String,
}

/// Update request body: every todo field except the id
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoPatch {
    /// Owner
    pub user_id: UserId,
    /// Title
    pub title: String,
    /// Completion flag
    pub completed: bool,
}

/// Fields a caller wants changed; `None` keeps the current value
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TodoChanges {
    /// New title
    pub title: Option<String>,
    /// New completion flag
    pub completed: Option<bool>,
}

impl TodoChanges {
    /// Change only the title
    #[must_use]
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            completed: None,
        }
    }

    /// Change only the completion flag
    #[must_use]
    pub const fn completed(completed: bool) -> Self {
        Self {
            title: None,
            completed: Some(completed),
        }
    }
}

/// An account owning a todo collection
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Server-assigned id
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Login email
    pub email: String,
}

/// Registration request body
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    /// Display name
    pub name: String,
    /// Login email
    pub email: String,
}

/// User-facing error kinds; `Display` is the banner text
///
/// At most one is active at a time. Transport details never reach this type.
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TodosError {
    /// Initial list request failed
    #[error("Unable to load todos")]
    LoadTodos,
    /// Create request failed
    #[error("Unable to add a todo")]
    AddTodo,
    /// Update request failed
    #[error("Unable to update a todo")]
    UpdateTodo,
    /// Delete request (single or bulk) failed
    #[error("Unable to delete a todo")]
    DeleteTodo,
    /// Local validation: title is blank
    #[error("Title should not be empty")]
    EmptyTitle,
}

/// Lifecycle of the single in-flight add
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AddStatus {
    /// No add has been attempted since the last reset
    #[default]
    Idle,
    /// Create request in flight; carries the optimistic placeholder
    Pending(Todo),
    /// Last add succeeded; the input can be cleared
    Settled(Todo),
    /// Last add failed; the attempted todo was dropped
    Failed(TodosError),
}

impl AddStatus {
    /// The placeholder, only while a create request is in flight
    #[must_use]
    pub const fn temp_todo(&self) -> Option<&Todo> {
        match self {
            Self::Pending(todo) => Some(todo),
            _ => None,
        }
    }

    /// Returns true while a create request is in flight
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

/// Every input to the application reducer
#[derive(Action, Clone, Debug, PartialEq)]
pub enum AppAction {
    // Commands (user intents)
    /// Read the persisted session user at startup
    #[command]
    RestoreSession,

    /// Look up a user by email
    #[command]
    Login {
        /// Raw input; trimmed before use
        email: String,
    },

    /// Create the user whose email was not found
    #[command]
    Register {
        /// Raw input; trimmed before use
        name: String,
    },

    /// Forget the session user and its todos
    #[command]
    Logout,

    /// Fetch the full collection for a user
    #[command]
    LoadTodos {
        /// Owner of the collection
        user_id: UserId,
    },

    /// Create a todo
    #[command]
    AddTodo {
        /// Raw input; trimmed before use
        title: String,
    },

    /// Delete a todo
    #[command]
    DeleteTodo {
        /// Target
        id: TodoId,
    },

    /// Change fields of a todo
    #[command]
    UpdateTodo {
        /// Target
        id: TodoId,
        /// Requested changes
        changes: TodoChanges,
    },

    /// Flip the completion flag of a todo
    #[command]
    ToggleTodo {
        /// Target
        id: TodoId,
    },

    /// Submit an edited title: unchanged does nothing, blank deletes
    #[command]
    RenameTodo {
        /// Target
        id: TodoId,
        /// Raw input; trimmed before use
        title: String,
    },

    /// Delete every completed todo, all or nothing
    #[command]
    ClearCompleted,

    /// Select the visible subset
    #[command]
    SetFilter {
        /// New filter
        filter: FilterStatus,
    },

    /// Show an error banner
    #[command]
    RaiseError {
        /// Kind to show
        error: TodosError,
    },

    /// Hide the error banner now
    #[command]
    DismissError,

    // Events (effect outcomes)
    /// No user was persisted
    #[event]
    SessionEmpty,

    /// A user became the session user
    #[event]
    UserAdopted {
        /// The adopted user
        user: User,
    },

    /// Email lookup found nobody; a name is needed
    #[event]
    RegistrationRequired {
        /// Trimmed email that was looked up
        email: String,
    },

    /// Login, registration, or session persistence failed
    #[event]
    AuthFailed {
        /// Human readable cause
        reason: String,
    },

    /// The persisted session was cleared
    #[event]
    LoggedOut,

    /// List request succeeded
    #[event]
    TodosLoaded {
        /// Owner the request was made for
        user_id: UserId,
        /// Full collection
        todos: Vec<Todo>,
    },

    /// List request failed
    #[event]
    LoadTodosFailed {
        /// Owner the request was made for
        user_id: UserId,
        /// Transport detail, for logs only
        reason: String,
    },

    /// Create request succeeded
    #[event]
    TodoAdded {
        /// Owner the request was made for
        user_id: UserId,
        /// Server copy with its real id
        todo: Todo,
    },

    /// Create request failed
    #[event]
    AddTodoFailed {
        /// Owner the request was made for
        user_id: UserId,
        /// Transport detail, for logs only
        reason: String,
    },

    /// An add was dropped because another one is still in flight
    #[event]
    AddRejected {
        /// Title of the dropped add
        title: String,
    },

    /// Delete request succeeded
    #[event]
    TodoDeleted {
        /// Owner the request was made for
        user_id: UserId,
        /// Deleted todo
        id: TodoId,
    },

    /// Delete request failed
    #[event]
    DeleteTodoFailed {
        /// Owner the request was made for
        user_id: UserId,
        /// Target
        id: TodoId,
        /// Transport detail, for logs only
        reason: String,
    },

    /// Update request succeeded
    #[event]
    TodoUpdated {
        /// Owner the request was made for
        user_id: UserId,
        /// Server copy after the update
        todo: Todo,
    },

    /// Update request failed
    #[event]
    UpdateTodoFailed {
        /// Owner the request was made for
        user_id: UserId,
        /// Target
        id: TodoId,
        /// Transport detail, for logs only
        reason: String,
    },

    /// A delete or update was dropped because the todo is already pending
    #[event]
    OperationRejected {
        /// Target
        id: TodoId,
    },

    /// Every delete of a clear-completed batch succeeded
    #[event]
    CompletedCleared {
        /// Owner the requests were made for
        user_id: UserId,
        /// The batch
        ids: Vec<TodoId>,
    },

    /// At least one delete of a clear-completed batch failed
    #[event]
    ClearCompletedFailed {
        /// Owner the requests were made for
        user_id: UserId,
        /// The batch
        ids: Vec<TodoId>,
        /// First failure, for logs only
        reason: String,
    },

    /// An error banner timer fired
    #[event]
    ErrorExpired {
        /// Generation of the error the timer was started for
        generation: u64,
    },
}

/// Trims a title; `None` when nothing is left
#[must_use]
pub fn normalize_title(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// What submitting an edited title amounts to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenamePlan {
    /// Same title after trimming; nothing to send
    Unchanged,
    /// Blank title; the todo is deleted
    Delete,
    /// New trimmed title to send
    Update(String),
}

/// Decides what an edit of `current` to `input` does
#[must_use]
pub fn plan_rename(current: &str, input: &str) -> RenamePlan {
    match normalize_title(input) {
        None => RenamePlan::Delete,
        Some(title) if title == current => RenamePlan::Unchanged,
        Some(title) => RenamePlan::Update(title),
    }
}
