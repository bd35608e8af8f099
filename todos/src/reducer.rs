//! Reducer for the todo collection.
//!
//! Every mutation is a command whose request runs as an effect and reports
//! back with an outcome event. The collection only changes on confirmed
//! outcomes; the add placeholder and the pending set are the only optimistic
//! state.
//!
//! Operations on different ids proceed independently. Two operations on the
//! same id may overlap under [`PendingPolicy::Concurrent`]; the last response
//! wins.

use crate::app::AppEnvironment;
use crate::filter::{completed_todos, visible_todos, FilterStatus};
use crate::types::{
    normalize_title, plan_rename, AddStatus, AppAction, NewTodo, RenamePlan, Todo, TodoChanges,
    TodoId, TodosError, UserId,
};
use futures::future::join_all;
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;
use todosync_core::effect::{Effect, EffectId};
use todosync_core::reducer::Reducer;
use todosync_core::{async_effect, cancellable, delay, smallvec, SmallVec};

/// Slot of the error banner auto-clear timer
pub const ERROR_BANNER: EffectId = EffectId::new("error-banner");

/// What to do with a delete or update on an id that is already pending
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PendingPolicy {
    /// Issue it anyway; the last response wins
    #[default]
    Concurrent,
    /// Drop it with a warning
    RejectWhilePending,
}

impl FromStr for PendingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "concurrent" => Ok(Self::Concurrent),
            "reject" | "reject-while-pending" => Ok(Self::RejectWhilePending),
            other => Err(format!("unknown pending policy: {other}")),
        }
    }
}

/// Todo slice of the application state
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TodosState {
    /// User whose collection is loaded; outcomes for anyone else are stale
    pub owner: Option<UserId>,
    /// Confirmed todos in display order
    pub todos: Vec<Todo>,
    /// The single add in flight, or how the last one ended
    pub add: AddStatus,
    /// Ids with a delete or update in flight
    pub pending: BTreeSet<TodoId>,
    /// Visible subset
    pub filter: FilterStatus,
    /// Active error banner
    pub error: Option<TodosError>,
    /// Bumped on every raise and dismiss; a timer only clears its own generation
    pub error_generation: u64,
}

impl TodosState {
    /// Optimistic placeholder while an add is in flight
    #[must_use]
    pub const fn temp_todo(&self) -> Option<&Todo> {
        self.add.temp_todo()
    }

    /// Todos selected by the current filter
    #[must_use]
    pub fn visible_todos(&self) -> Vec<Todo> {
        visible_todos(&self.todos, self.filter)
    }

    /// Number of todos not completed
    #[must_use]
    pub fn items_left(&self) -> usize {
        self.todos.iter().filter(|todo| !todo.completed).count()
    }

    /// Returns true if any todo is completed
    #[must_use]
    pub fn has_completed(&self) -> bool {
        self.todos.iter().any(|todo| todo.completed)
    }

    /// Todo with `id` in the collection
    #[must_use]
    pub fn get(&self, id: TodoId) -> Option<&Todo> {
        self.todos.iter().find(|todo| todo.id == id)
    }

    /// Returns true if `id` has a delete or update in flight
    #[must_use]
    pub fn is_pending(&self, id: TodoId) -> bool {
        self.pending.contains(&id)
    }

    /// Returns true if an outcome made for `user_id` still applies
    fn is_current(&self, user_id: UserId) -> bool {
        self.owner == Some(user_id)
    }
}

/// Reducer for the todo collection, pending set, filter and error banner
#[derive(Clone, Copy, Debug, Default)]
pub struct TodosReducer {
    policy: PendingPolicy,
}

impl TodosReducer {
    /// Creates a reducer with the default [`PendingPolicy::Concurrent`]
    #[must_use]
    pub const fn new() -> Self {
        Self::with_policy(PendingPolicy::Concurrent)
    }

    /// Creates a reducer with the given policy
    #[must_use]
    pub const fn with_policy(policy: PendingPolicy) -> Self {
        Self { policy }
    }

    /// Policy for operations on already pending ids
    #[must_use]
    pub const fn policy(&self) -> PendingPolicy {
        self.policy
    }

    /// Shows `error` and (re)starts its auto-clear timer
    ///
    /// The timer replaces any previous one; its generation guards against a
    /// stale expiry that was already in flight.
    fn raise_error(
        state: &mut TodosState,
        error: TodosError,
        env: &AppEnvironment,
    ) -> Effect<AppAction> {
        state.error = Some(error);
        state.error_generation += 1;
        let generation = state.error_generation;
        tracing::debug!(%error, generation, "Raised error");

        cancellable! {
            id: ERROR_BANNER,
            effect: delay! {
                duration: env.error_display,
                action: AppAction::ErrorExpired { generation }
            }
        }
    }

    /// Returns the rejection to report if an operation on `id` should be dropped
    fn rejects(&self, state: &TodosState, id: TodoId) -> Option<Effect<AppAction>> {
        if self.policy != PendingPolicy::RejectWhilePending || !state.is_pending(id) {
            return None;
        }
        tracing::warn!(id, "Dropped operation on a todo that is already pending");
        Some(async_effect! { Some(AppAction::OperationRejected { id }) })
    }

    /// Fresh state for `owner`; the error generation keeps counting so an
    /// expiry from before the reset can never match a newer error
    fn reset(state: &TodosState, owner: Option<UserId>, filter: FilterStatus) -> TodosState {
        TodosState {
            owner,
            filter,
            error_generation: state.error_generation + 1,
            ..TodosState::default()
        }
    }

    fn load(user_id: UserId, env: &AppEnvironment) -> Effect<AppAction> {
        let gateway = Arc::clone(&env.gateway);
        async_effect! {
            let result = gateway.list_todos(user_id).await;
            match result {
                Ok(todos) => Some(AppAction::TodosLoaded { user_id, todos }),
                Err(error) => Some(AppAction::LoadTodosFailed { user_id, reason: error.to_string() }),
            }
        }
    }

    fn add(state: &mut TodosState, title: &str, env: &AppEnvironment) -> Effect<AppAction> {
        let Some(user_id) = state.owner else {
            tracing::debug!("Ignored add without a session user");
            return Effect::None;
        };
        if state.add.is_pending() {
            tracing::debug!("Dropped add while another is in flight");
            let title = title.to_string();
            return async_effect! { Some(AppAction::AddRejected { title }) };
        }
        let Some(title) = normalize_title(title) else {
            return Self::raise_error(state, TodosError::EmptyTitle, env);
        };

        state.add = AddStatus::Pending(Todo::placeholder(user_id, title.clone()));

        let gateway = Arc::clone(&env.gateway);
        let new = NewTodo {
            user_id,
            completed: false,
            title,
        };
        async_effect! {
            let result = gateway.create_todo(new).await;
            match result {
                Ok(todo) => Some(AppAction::TodoAdded { user_id, todo }),
                Err(error) => Some(AppAction::AddTodoFailed { user_id, reason: error.to_string() }),
            }
        }
    }

    fn delete(&self, state: &mut TodosState, id: TodoId, env: &AppEnvironment) -> Effect<AppAction> {
        let Some(user_id) = state.owner else {
            return Effect::None;
        };
        if let Some(rejection) = self.rejects(state, id) {
            return rejection;
        }

        state.pending.insert(id);

        let gateway = Arc::clone(&env.gateway);
        async_effect! {
            let result = gateway.delete_todo(id).await;
            match result {
                Ok(()) => Some(AppAction::TodoDeleted { user_id, id }),
                Err(error) => Some(AppAction::DeleteTodoFailed { user_id, id, reason: error.to_string() }),
            }
        }
    }

    fn update(
        &self,
        state: &mut TodosState,
        id: TodoId,
        mut changes: TodoChanges,
        env: &AppEnvironment,
    ) -> Effect<AppAction> {
        let Some(user_id) = state.owner else {
            return Effect::None;
        };
        let Some(todo) = state.get(id).cloned() else {
            tracing::debug!(id, "Ignored update of a todo not in the collection");
            return Effect::None;
        };
        if let Some(title) = changes.title.take() {
            match normalize_title(&title) {
                Some(title) => changes.title = Some(title),
                None => return Self::raise_error(state, TodosError::EmptyTitle, env),
            }
        }
        if let Some(rejection) = self.rejects(state, id) {
            return rejection;
        }

        let patch = todo.patched(&changes);
        state.pending.insert(id);

        let gateway = Arc::clone(&env.gateway);
        async_effect! {
            let result = gateway.update_todo(id, patch).await;
            match result {
                Ok(todo) => Some(AppAction::TodoUpdated { user_id, todo }),
                Err(error) => Some(AppAction::UpdateTodoFailed { user_id, id, reason: error.to_string() }),
            }
        }
    }

    fn clear_completed(state: &mut TodosState, env: &AppEnvironment) -> Effect<AppAction> {
        let Some(user_id) = state.owner else {
            return Effect::None;
        };
        let ids: Vec<TodoId> = completed_todos(&state.todos)
            .into_iter()
            .map(|todo| todo.id)
            .collect();
        if ids.is_empty() {
            return Effect::None;
        }

        // Marked before any request is sent
        state.pending.extend(ids.iter().copied());

        let gateway = Arc::clone(&env.gateway);
        async_effect! {
            let results = join_all(ids.iter().map(|id| gateway.delete_todo(*id))).await;
            match results.into_iter().find_map(Result::err) {
                None => Some(AppAction::CompletedCleared { user_id, ids }),
                Some(error) => Some(AppAction::ClearCompletedFailed {
                    user_id,
                    ids,
                    reason: error.to_string(),
                }),
            }
        }
    }
}

impl Reducer for TodosReducer {
    type State = TodosState;
    type Action = AppAction;
    type Environment = AppEnvironment;

    #[allow(clippy::too_many_lines)] // One arm per todo action
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Session ==========
            AppAction::UserAdopted { user } => {
                if state.owner != Some(user.id) {
                    *state = Self::reset(state, Some(user.id), state.filter);
                }
                smallvec![Self::load(user.id, env)]
            },

            AppAction::Logout => {
                *state = Self::reset(state, None, FilterStatus::default());
                smallvec![Effect::Cancel(ERROR_BANNER)]
            },

            // ========== Commands ==========
            AppAction::LoadTodos { user_id } => {
                if !state.is_current(user_id) {
                    tracing::debug!(user_id, "Ignored load for a user that is not signed in");
                    return smallvec![Effect::None];
                }
                smallvec![Self::load(user_id, env)]
            },

            AppAction::AddTodo { title } => smallvec![Self::add(state, &title, env)],

            AppAction::DeleteTodo { id } => smallvec![self.delete(state, id, env)],

            AppAction::UpdateTodo { id, changes } => {
                smallvec![self.update(state, id, changes, env)]
            },

            AppAction::ToggleTodo { id } => {
                let Some(completed) = state.get(id).map(|todo| !todo.completed) else {
                    return smallvec![Effect::None];
                };
                smallvec![self.update(state, id, TodoChanges::completed(completed), env)]
            },

            AppAction::RenameTodo { id, title } => {
                let Some(current) = state.get(id) else {
                    return smallvec![Effect::None];
                };
                match plan_rename(&current.title, &title) {
                    RenamePlan::Unchanged => smallvec![Effect::None],
                    RenamePlan::Delete => smallvec![self.delete(state, id, env)],
                    RenamePlan::Update(title) => {
                        smallvec![self.update(state, id, TodoChanges::title(title), env)]
                    },
                }
            },

            AppAction::ClearCompleted => smallvec![Self::clear_completed(state, env)],

            AppAction::SetFilter { filter } => {
                state.filter = filter;
                smallvec![Effect::None]
            },

            AppAction::RaiseError { error } => smallvec![Self::raise_error(state, error, env)],

            AppAction::DismissError => {
                state.error = None;
                state.error_generation += 1;
                smallvec![Effect::Cancel(ERROR_BANNER)]
            },

            // ========== Outcomes ==========
            AppAction::TodosLoaded { user_id, todos } => {
                if state.is_current(user_id) {
                    tracing::debug!(user_id, count = todos.len(), "Loaded todos");
                    state.todos = todos;
                }
                smallvec![Effect::None]
            },

            AppAction::LoadTodosFailed { user_id, reason } => {
                if !state.is_current(user_id) {
                    return smallvec![Effect::None];
                }
                tracing::warn!(user_id, %reason, "Loading todos failed");
                smallvec![Self::raise_error(state, TodosError::LoadTodos, env)]
            },

            AppAction::TodoAdded { user_id, todo } => {
                if state.is_current(user_id) {
                    state.todos.push(todo.clone());
                    state.add = AddStatus::Settled(todo);
                }
                smallvec![Effect::None]
            },

            AppAction::AddTodoFailed { user_id, reason } => {
                if !state.is_current(user_id) {
                    return smallvec![Effect::None];
                }
                tracing::warn!(%reason, "Adding todo failed");
                state.add = AddStatus::Failed(TodosError::AddTodo);
                smallvec![Self::raise_error(state, TodosError::AddTodo, env)]
            },

            AppAction::TodoDeleted { user_id, id } => {
                if state.is_current(user_id) {
                    state.todos.retain(|todo| todo.id != id);
                    state.pending.remove(&id);
                }
                smallvec![Effect::None]
            },

            AppAction::DeleteTodoFailed { user_id, id, reason } => {
                if !state.is_current(user_id) {
                    return smallvec![Effect::None];
                }
                tracing::warn!(id, %reason, "Deleting todo failed");
                state.pending.remove(&id);
                smallvec![Self::raise_error(state, TodosError::DeleteTodo, env)]
            },

            AppAction::TodoUpdated { user_id, todo } => {
                if state.is_current(user_id) {
                    state.pending.remove(&todo.id);
                    if let Some(slot) = state.todos.iter_mut().find(|t| t.id == todo.id) {
                        *slot = todo;
                    }
                }
                smallvec![Effect::None]
            },

            AppAction::UpdateTodoFailed { user_id, id, reason } => {
                if !state.is_current(user_id) {
                    return smallvec![Effect::None];
                }
                tracing::warn!(id, %reason, "Updating todo failed");
                state.pending.remove(&id);
                smallvec![Self::raise_error(state, TodosError::UpdateTodo, env)]
            },

            AppAction::CompletedCleared { user_id, ids } => {
                if state.is_current(user_id) {
                    for id in &ids {
                        state.pending.remove(id);
                    }
                    state.todos.retain(|todo| !ids.contains(&todo.id));
                }
                smallvec![Effect::None]
            },

            AppAction::ClearCompletedFailed {
                user_id,
                ids,
                reason,
            } => {
                if !state.is_current(user_id) {
                    return smallvec![Effect::None];
                }
                tracing::warn!(count = ids.len(), %reason, "Clearing completed todos failed");
                for id in &ids {
                    state.pending.remove(id);
                }
                smallvec![Self::raise_error(state, TodosError::DeleteTodo, env)]
            },

            AppAction::ErrorExpired { generation } => {
                if generation == state.error_generation {
                    state.error = None;
                } else {
                    tracing::debug!(generation, current = state.error_generation, "Ignored stale error expiry");
                }
                smallvec![Effect::None]
            },

            _ => smallvec![Effect::None],
        }
    }
}
