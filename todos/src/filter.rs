//! View derivation: pure subsets of the collection.
//!
//! Every function preserves the collection order.

use crate::types::Todo;
use std::fmt;

/// Which subset of the collection is visible
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FilterStatus {
    /// Everything
    #[default]
    All,
    /// Not completed
    Active,
    /// Completed
    Completed,
}

impl FilterStatus {
    /// All filters, in display order
    pub const ALL: [Self; 3] = [Self::All, Self::Active, Self::Completed];

    /// URL fragment selecting this filter
    #[must_use]
    pub const fn fragment(self) -> &'static str {
        match self {
            Self::All => "#/",
            Self::Active => "#/active",
            Self::Completed => "#/completed",
        }
    }

    /// Filter selected by a URL fragment; unknown fragments select `All`
    #[must_use]
    pub fn from_fragment(fragment: &str) -> Self {
        match fragment {
            "#/active" => Self::Active,
            "#/completed" => Self::Completed,
            _ => Self::All,
        }
    }

    /// Parses `all`, `active` or `completed`, ignoring case
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|filter| filter.to_string().eq_ignore_ascii_case(name.trim()))
    }

    /// Returns true if `todo` belongs to this subset
    #[must_use]
    pub const fn matches(self, todo: &Todo) -> bool {
        match self {
            Self::All => true,
            Self::Active => !todo.completed,
            Self::Completed => todo.completed,
        }
    }
}

impl fmt::Display for FilterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::All => "All",
            Self::Active => "Active",
            Self::Completed => "Completed",
        };
        f.write_str(label)
    }
}

/// Todos that are not completed
#[must_use]
pub fn active_todos(todos: &[Todo]) -> Vec<Todo> {
    visible_todos(todos, FilterStatus::Active)
}

/// Todos that are completed
#[must_use]
pub fn completed_todos(todos: &[Todo]) -> Vec<Todo> {
    visible_todos(todos, FilterStatus::Completed)
}

/// The subset selected by `filter`
#[must_use]
pub fn visible_todos(todos: &[Todo], filter: FilterStatus) -> Vec<Todo> {
    todos
        .iter()
        .filter(|todo| filter.matches(todo))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn todo(id: u64, completed: bool) -> Todo {
        Todo {
            id,
            user_id: 1,
            title: format!("todo {id}"),
            completed,
        }
    }

    fn arb_todos() -> impl Strategy<Value = Vec<Todo>> {
        prop::collection::vec(any::<bool>(), 0..32).prop_map(|flags| {
            flags
                .into_iter()
                .enumerate()
                .map(|(index, completed)| todo(index as u64 + 1, completed))
                .collect()
        })
    }

    #[test]
    fn subsets_keep_order() {
        let todos = vec![todo(1, false), todo(2, true), todo(3, false), todo(4, true)];
        let active: Vec<u64> = active_todos(&todos).iter().map(|t| t.id).collect();
        let completed: Vec<u64> = completed_todos(&todos).iter().map(|t| t.id).collect();
        assert_eq!(active, vec![1, 3]);
        assert_eq!(completed, vec![2, 4]);
    }

    #[test]
    fn fragments_round_trip() {
        for filter in FilterStatus::ALL {
            assert_eq!(FilterStatus::from_fragment(filter.fragment()), filter);
        }
        assert_eq!(FilterStatus::from_fragment("#/unknown"), FilterStatus::All);
        assert_eq!(FilterStatus::from_fragment(""), FilterStatus::All);
    }

    #[test]
    fn names_parse_case_insensitively() {
        assert_eq!(FilterStatus::from_name("ACTIVE"), Some(FilterStatus::Active));
        assert_eq!(FilterStatus::from_name(" completed "), Some(FilterStatus::Completed));
        assert_eq!(FilterStatus::from_name("done"), None);
    }

    proptest! {
        #[test]
        fn all_is_identity(todos in arb_todos()) {
            prop_assert_eq!(visible_todos(&todos, FilterStatus::All), todos);
        }

        #[test]
        fn active_and_completed_partition(todos in arb_todos()) {
            let active = active_todos(&todos);
            let completed = completed_todos(&todos);
            prop_assert_eq!(active.len() + completed.len(), todos.len());
            prop_assert!(active.iter().all(|t| !t.completed));
            prop_assert!(completed.iter().all(|t| t.completed));
        }
    }
}
