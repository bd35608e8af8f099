//! Application wiring and the [`TodoApp`] facade.
//!
//! [`AppReducer`] combines the session and todo reducers over [`AppState`].
//! [`TodoApp`] owns the store and exposes each operation as an async method
//! that resolves once the operation's outcome has been applied.

use crate::config::Config;
use crate::filter::FilterStatus;
use crate::gateway::{GatewayError, TodoGateway};
use crate::http::HttpGateway;
use crate::reducer::{PendingPolicy, TodosReducer, TodosState};
use crate::session::{FileSessionStore, SessionReducer, SessionState, SessionStore};
use crate::types::{
    normalize_title, plan_rename, AppAction, RenamePlan, Todo, TodoChanges, TodoId, TodosError,
    User, UserId,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use todosync_core::composition::{combine_reducers, scope_reducer, BoxedReducer, CombinedReducer};
use todosync_core::effect::Effect;
use todosync_core::reducer::Reducer;
use todosync_core::SmallVec;
use todosync_runtime::{wait_for, Store, StoreError};
use tokio::sync::{broadcast, Mutex};

/// How long an error banner stays up
pub const DEFAULT_ERROR_DISPLAY: Duration = Duration::from_secs(3);

/// How long a facade call waits for its outcome
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(65);

/// Whole application state
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppState {
    /// Authentication
    pub session: SessionState,
    /// Todo collection and its bookkeeping
    pub todos: TodosState,
}

/// Injected dependencies
#[derive(Clone)]
pub struct AppEnvironment {
    /// Remote resource
    pub gateway: Arc<dyn TodoGateway>,
    /// Durable session slot
    pub session: Arc<dyn SessionStore>,
    /// Error banner lifetime
    pub error_display: Duration,
}

impl AppEnvironment {
    /// Environment with the default error banner lifetime
    #[must_use]
    pub fn new(gateway: Arc<dyn TodoGateway>, session: Arc<dyn SessionStore>) -> Self {
        Self {
            gateway,
            session,
            error_display: DEFAULT_ERROR_DISPLAY,
        }
    }

    /// Override the error banner lifetime
    #[must_use]
    pub const fn with_error_display(mut self, error_display: Duration) -> Self {
        self.error_display = error_display;
        self
    }
}

impl std::fmt::Debug for AppEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppEnvironment")
            .field("error_display", &self.error_display)
            .finish_non_exhaustive()
    }
}

fn session_slice(state: &AppState) -> &SessionState {
    &state.session
}

fn set_session_slice(state: &mut AppState, session: SessionState) {
    state.session = session;
}

fn todos_slice(state: &AppState) -> &TodosState {
    &state.todos
}

fn set_todos_slice(state: &mut AppState, todos: TodosState) {
    state.todos = todos;
}

/// Session and todo reducers combined over [`AppState`]
#[derive(Clone)]
pub struct AppReducer {
    inner: Arc<CombinedReducer<AppState, AppAction, AppEnvironment>>,
}

impl AppReducer {
    /// Combine the reducers, with `policy` for operations on pending ids
    #[must_use]
    pub fn new(policy: PendingPolicy) -> Self {
        let reducers: Vec<BoxedReducer<AppState, AppAction, AppEnvironment>> = vec![
            Box::new(scope_reducer(
                SessionReducer::new(),
                session_slice,
                set_session_slice,
            )),
            Box::new(scope_reducer(
                TodosReducer::with_policy(policy),
                todos_slice,
                set_todos_slice,
            )),
        ];
        Self {
            inner: Arc::new(combine_reducers(reducers)),
        }
    }
}

impl Default for AppReducer {
    fn default() -> Self {
        Self::new(PendingPolicy::default())
    }
}

impl Reducer for AppReducer {
    type State = AppState;
    type Action = AppAction;
    type Environment = AppEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        self.inner.reduce(state, action, env)
    }
}

/// Store running the application reducer
pub type AppStore = Store<AppState, AppAction, AppEnvironment, AppReducer>;

/// Errors returned by [`TodoApp`] operations
#[derive(Error, Debug)]
pub enum AppError {
    /// The operation failed; the same kind is shown in the error banner
    #[error(transparent)]
    Todos(#[from] TodosError),

    /// Login, registration or session persistence failed
    #[error("{0}")]
    Auth(String),

    /// The operation needs a session user
    #[error("not signed in")]
    NotSignedIn,

    /// Another add is still in flight
    #[error("another todo is being added")]
    AddInFlight,

    /// The todo already has a request in flight and the policy rejects another
    #[error("todo {0} already has a request in flight")]
    Busy(TodoId),

    /// No todo with this id in the collection
    #[error("no todo with id {0}")]
    UnknownTodo(TodoId),

    /// The gateway could not be set up
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The store rejected the action or the outcome did not arrive in time
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of [`TodoApp::login`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The user was found and adopted
    SignedIn(User),
    /// The email is unknown; call [`TodoApp::register`] with a name
    RegistrationRequired {
        /// Email that will be registered
        email: String,
    },
}

/// Result of [`TodoApp::rename_todo`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenameOutcome {
    /// Same title; nothing was sent
    Unchanged,
    /// Blank title; the todo was deleted
    Deleted,
    /// The server copy carrying the new title
    Renamed(Todo),
}

/// The todo list state manager
///
/// # Example
///
/// ```ignore
/// let app = TodoApp::new(env, PendingPolicy::Concurrent);
/// app.start().await?;
/// if let LoginOutcome::RegistrationRequired { .. } = app.login("ann@example.com").await? {
///     app.register("Annie").await?;
/// }
/// let todo = app.add_todo("Buy milk").await?;
/// app.toggle_todo(todo.id).await?;
/// ```
pub struct TodoApp {
    store: AppStore,
    policy: PendingPolicy,
    response_timeout: Duration,
    /// Held by a todo command from its state check until its action is reduced
    commands: Mutex<()>,
}

impl TodoApp {
    /// Create an app over the given dependencies
    #[must_use]
    pub fn new(env: AppEnvironment, policy: PendingPolicy) -> Self {
        Self {
            store: Store::new(AppState::default(), AppReducer::new(policy), env),
            policy,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            commands: Mutex::new(()),
        }
    }

    /// Create an app talking HTTP to the configured backend with a file session
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Gateway`] if the base URL is invalid or the HTTP
    /// client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let gateway = HttpGateway::new(&config.api_url, config.request_timeout)?;
        let env = AppEnvironment::new(
            Arc::new(gateway),
            Arc::new(FileSessionStore::new(&config.session_file)),
        )
        .with_error_display(config.error_display);

        // Login waits for a lookup and then a list request
        let response_timeout = config
            .request_timeout
            .map_or(Duration::from_secs(24 * 60 * 60), |timeout| {
                timeout * 2 + Duration::from_secs(5)
            });

        Ok(Self::new(env, config.pending_policy).with_response_timeout(response_timeout))
    }

    /// Override how long operations wait for their outcome
    #[must_use]
    pub const fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// The underlying store, for observers
    #[must_use]
    pub const fn store(&self) -> &AppStore {
        &self.store
    }

    /// Sends `action` and waits for the first outcome matching `predicate`
    async fn dispatch<F>(&self, action: AppAction, predicate: F) -> Result<AppAction, AppError>
    where
        F: Fn(&AppAction) -> bool,
    {
        tracing::debug!(action = action.name(), "Dispatching");
        Ok(self
            .store
            .send_and_wait_for(action, predicate, self.response_timeout)
            .await?)
    }

    /// Subscribes to outcomes, then sends `action`
    async fn submit(&self, action: AppAction) -> Result<broadcast::Receiver<AppAction>, AppError> {
        tracing::debug!(action = action.name(), "Dispatching");
        let rx = self.store.subscribe_actions();
        self.store.send(action).await?;
        Ok(rx)
    }

    /// Waits on a [`Self::submit`] subscription for the first matching outcome
    async fn outcome<F>(
        &self,
        mut rx: broadcast::Receiver<AppAction>,
        predicate: F,
    ) -> Result<AppAction, AppError>
    where
        F: Fn(&AppAction) -> bool,
    {
        Ok(wait_for(&mut rx, predicate, self.response_timeout).await?)
    }

    /// Sends `action` without waiting for anything
    async fn fire(&self, action: AppAction) -> Result<(), AppError> {
        self.store.send(action).await?;
        Ok(())
    }

    fn signed_in_outcome(state: &AppState, outcome: AppAction) -> Result<Option<User>, AppError> {
        match outcome {
            AppAction::AuthFailed { reason } => Err(AppError::Auth(reason)),
            _ => Ok(state.session.user.clone()),
        }
    }

    /// Restore the persisted session and load its todos
    ///
    /// Returns the restored user, or `None` when nobody was signed in.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Auth`] if the session slot cannot be read.
    pub async fn start(&self) -> Result<Option<User>, AppError> {
        let outcome = self
            .dispatch(AppAction::RestoreSession, |action| {
                matches!(
                    action,
                    AppAction::SessionEmpty
                        | AppAction::AuthFailed { .. }
                        | AppAction::TodosLoaded { .. }
                        | AppAction::LoadTodosFailed { .. }
                )
            })
            .await?;
        let state = self.snapshot().await;
        Self::signed_in_outcome(&state, outcome)
    }

    /// Sign in by email
    ///
    /// A known email is adopted and its todos loaded before this returns. An
    /// unknown one moves the flow to registration.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Auth`] for an invalid email or a failed lookup.
    pub async fn login(&self, email: &str) -> Result<LoginOutcome, AppError> {
        let outcome = self
            .dispatch(
                AppAction::Login {
                    email: email.to_string(),
                },
                Self::is_auth_outcome,
            )
            .await?;

        if let AppAction::RegistrationRequired { email } = outcome {
            return Ok(LoginOutcome::RegistrationRequired { email });
        }
        let state = self.snapshot().await;
        match Self::signed_in_outcome(&state, outcome)? {
            Some(user) => Ok(LoginOutcome::SignedIn(user)),
            None => Err(AppError::NotSignedIn),
        }
    }

    /// Register the email from the last login under `name`, then sign in
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Auth`] if no registration is expected, the name is
    /// too short, or the create request fails.
    pub async fn register(&self, name: &str) -> Result<User, AppError> {
        let outcome = self
            .dispatch(
                AppAction::Register {
                    name: name.to_string(),
                },
                Self::is_auth_outcome,
            )
            .await?;
        let state = self.snapshot().await;
        Self::signed_in_outcome(&state, outcome)?.ok_or(AppError::NotSignedIn)
    }

    fn is_auth_outcome(action: &AppAction) -> bool {
        matches!(
            action,
            AppAction::RegistrationRequired { .. }
                | AppAction::AuthFailed { .. }
                | AppAction::TodosLoaded { .. }
                | AppAction::LoadTodosFailed { .. }
        )
    }

    /// Forget the session user and its todos
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Auth`] if the session slot cannot be cleared.
    pub async fn logout(&self) -> Result<(), AppError> {
        let outcome = self
            .dispatch(AppAction::Logout, |action| {
                matches!(action, AppAction::LoggedOut | AppAction::AuthFailed { .. })
            })
            .await?;
        match outcome {
            AppAction::AuthFailed { reason } => Err(AppError::Auth(reason)),
            _ => Ok(()),
        }
    }

    /// Reload the collection of the session user
    ///
    /// # Errors
    ///
    /// Returns [`TodosError::LoadTodos`] if the list request fails.
    pub async fn load_todos(&self) -> Result<Vec<Todo>, AppError> {
        let user_id = self.owner().await?;
        let outcome = self
            .dispatch(AppAction::LoadTodos { user_id }, move |action| {
                matches!(
                    action,
                    AppAction::TodosLoaded { user_id: id, .. }
                        | AppAction::LoadTodosFailed { user_id: id, .. } if *id == user_id
                )
            })
            .await?;
        match outcome {
            AppAction::TodosLoaded { todos, .. } => Ok(todos),
            _ => Err(TodosError::LoadTodos.into()),
        }
    }

    /// Create a todo; returns the server copy with its id
    ///
    /// # Errors
    ///
    /// - [`TodosError::EmptyTitle`] for a blank title; no request is sent
    /// - [`TodosError::AddTodo`] if the create request fails
    /// - [`AppError::AddInFlight`] if another add is still pending
    pub async fn add_todo(&self, title: &str) -> Result<Todo, AppError> {
        let turn = self.commands.lock().await;
        let state = self.todos_state().await;
        if state.owner.is_none() {
            return Err(AppError::NotSignedIn);
        }
        if state.add.is_pending() {
            return Err(AppError::AddInFlight);
        }

        let action = AppAction::AddTodo {
            title: title.to_string(),
        };
        if normalize_title(title).is_none() {
            self.fire(action).await?;
            return Err(TodosError::EmptyTitle.into());
        }
        let rx = self.submit(action).await?;
        drop(turn);

        let outcome = self
            .outcome(rx, |action| {
                matches!(
                    action,
                    AppAction::TodoAdded { .. }
                        | AppAction::AddTodoFailed { .. }
                        | AppAction::AddRejected { .. }
                )
            })
            .await?;
        match outcome {
            AppAction::TodoAdded { todo, .. } => Ok(todo),
            AppAction::AddRejected { .. } => Err(AppError::AddInFlight),
            _ => Err(TodosError::AddTodo.into()),
        }
    }

    /// Delete a todo
    ///
    /// The request is sent even if the id is not in the collection.
    ///
    /// # Errors
    ///
    /// Returns [`TodosError::DeleteTodo`] if the delete request fails.
    pub async fn delete_todo(&self, id: TodoId) -> Result<(), AppError> {
        let turn = self.commands.lock().await;
        self.check_operable(id).await?;
        let rx = self.submit(AppAction::DeleteTodo { id }).await?;
        drop(turn);
        self.delete_outcome(rx, id).await
    }

    /// Change fields of a todo; returns the server copy
    ///
    /// # Errors
    ///
    /// - [`TodosError::EmptyTitle`] if `changes` carries a blank title
    /// - [`TodosError::UpdateTodo`] if the update request fails
    pub async fn update_todo(&self, id: TodoId, changes: TodoChanges) -> Result<Todo, AppError> {
        let turn = self.commands.lock().await;
        self.existing(id).await?;
        let blank_title = changes
            .title
            .as_deref()
            .is_some_and(|title| normalize_title(title).is_none());

        let action = AppAction::UpdateTodo { id, changes };
        if blank_title {
            self.fire(action).await?;
            return Err(TodosError::EmptyTitle.into());
        }
        let rx = self.submit(action).await?;
        drop(turn);
        self.update_outcome(rx, id).await
    }

    /// Flip the completion flag of a todo; returns the server copy
    ///
    /// # Errors
    ///
    /// Returns [`TodosError::UpdateTodo`] if the update request fails.
    pub async fn toggle_todo(&self, id: TodoId) -> Result<Todo, AppError> {
        let turn = self.commands.lock().await;
        self.existing(id).await?;
        let rx = self.submit(AppAction::ToggleTodo { id }).await?;
        drop(turn);
        self.update_outcome(rx, id).await
    }

    /// Submit an edited title
    ///
    /// The title is trimmed. An unchanged title sends nothing, a blank one
    /// deletes the todo.
    ///
    /// # Errors
    ///
    /// Returns [`TodosError::UpdateTodo`] or [`TodosError::DeleteTodo`] if the
    /// resulting request fails.
    pub async fn rename_todo(&self, id: TodoId, title: &str) -> Result<RenameOutcome, AppError> {
        let turn = self.commands.lock().await;
        let current = self.existing(id).await?;
        let plan = plan_rename(&current.title, title);
        if plan == RenamePlan::Unchanged {
            return Ok(RenameOutcome::Unchanged);
        }

        let rx = self
            .submit(AppAction::RenameTodo {
                id,
                title: title.to_string(),
            })
            .await?;
        drop(turn);

        if plan == RenamePlan::Delete {
            self.delete_outcome(rx, id).await?;
            Ok(RenameOutcome::Deleted)
        } else {
            Ok(RenameOutcome::Renamed(self.update_outcome(rx, id).await?))
        }
    }

    /// Delete every completed todo; returns how many were removed
    ///
    /// Either all of them are removed or, if any delete fails, none are. Only
    /// the batch's own ids leave the pending set when it settles, so markers
    /// of other operations still in flight are kept.
    ///
    /// # Errors
    ///
    /// Returns [`TodosError::DeleteTodo`] if any delete request fails.
    pub async fn clear_completed(&self) -> Result<usize, AppError> {
        let turn = self.commands.lock().await;
        let state = self.todos_state().await;
        if state.owner.is_none() {
            return Err(AppError::NotSignedIn);
        }
        if !state.has_completed() {
            return Ok(0);
        }

        let rx = self.submit(AppAction::ClearCompleted).await?;
        drop(turn);

        let outcome = self
            .outcome(rx, |action| {
                matches!(
                    action,
                    AppAction::CompletedCleared { .. } | AppAction::ClearCompletedFailed { .. }
                )
            })
            .await?;
        match outcome {
            AppAction::CompletedCleared { ids, .. } => Ok(ids.len()),
            _ => Err(TodosError::DeleteTodo.into()),
        }
    }

    /// Select the visible subset
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`] if the store is shutting down.
    pub async fn set_filter(&self, filter: FilterStatus) -> Result<(), AppError> {
        self.fire(AppAction::SetFilter { filter }).await
    }

    /// Show an error banner for the configured lifetime
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`] if the store is shutting down.
    pub async fn raise_error(&self, error: TodosError) -> Result<(), AppError> {
        self.fire(AppAction::RaiseError { error }).await
    }

    /// Hide the error banner now
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`] if the store is shutting down.
    pub async fn dismiss_error(&self) -> Result<(), AppError> {
        self.fire(AppAction::DismissError).await
    }

    /// Stop accepting operations and wait for in-flight ones
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`] if effects are still running after `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), AppError> {
        self.store.send(AppAction::DismissError).await?;
        Ok(self.store.shutdown(timeout).await?)
    }

    async fn delete_outcome(
        &self,
        rx: broadcast::Receiver<AppAction>,
        id: TodoId,
    ) -> Result<(), AppError> {
        let outcome = self
            .outcome(rx, move |action| {
                matches!(
                    action,
                    AppAction::TodoDeleted { id: done, .. }
                        | AppAction::DeleteTodoFailed { id: done, .. }
                        | AppAction::OperationRejected { id: done } if *done == id
                )
            })
            .await?;
        match outcome {
            AppAction::TodoDeleted { .. } => Ok(()),
            AppAction::OperationRejected { .. } => Err(AppError::Busy(id)),
            _ => Err(TodosError::DeleteTodo.into()),
        }
    }

    async fn update_outcome(
        &self,
        rx: broadcast::Receiver<AppAction>,
        id: TodoId,
    ) -> Result<Todo, AppError> {
        let outcome = self
            .outcome(rx, move |action| match action {
                AppAction::TodoUpdated { todo, .. } => todo.id == id,
                AppAction::UpdateTodoFailed { id: failed, .. }
                | AppAction::OperationRejected { id: failed } => *failed == id,
                _ => false,
            })
            .await?;
        match outcome {
            AppAction::TodoUpdated { todo, .. } => Ok(todo),
            AppAction::OperationRejected { .. } => Err(AppError::Busy(id)),
            _ => Err(TodosError::UpdateTodo.into()),
        }
    }

    /// Checks the session and the pending policy; returns the todo if present
    ///
    /// Callers hold `commands` until their action is sent, so no other todo
    /// command can change the answer in between.
    async fn check_operable(&self, id: TodoId) -> Result<Option<Todo>, AppError> {
        let state = self.todos_state().await;
        if state.owner.is_none() {
            return Err(AppError::NotSignedIn);
        }
        if self.policy == PendingPolicy::RejectWhilePending && state.is_pending(id) {
            return Err(AppError::Busy(id));
        }
        Ok(state.get(id).cloned())
    }

    /// Like [`Self::check_operable`], but the todo must be in the collection
    async fn existing(&self, id: TodoId) -> Result<Todo, AppError> {
        self.check_operable(id).await?.ok_or(AppError::UnknownTodo(id))
    }

    async fn owner(&self) -> Result<UserId, AppError> {
        self.store
            .state(|s| s.todos.owner)
            .await
            .ok_or(AppError::NotSignedIn)
    }

    // ========== Read access ==========

    /// Copy of the whole state
    pub async fn snapshot(&self) -> AppState {
        self.store.state(Clone::clone).await
    }

    /// Copy of the todo slice
    pub async fn todos_state(&self) -> TodosState {
        self.store.state(|s| s.todos.clone()).await
    }

    /// Copy of the session slice
    pub async fn session(&self) -> SessionState {
        self.store.state(|s| s.session.clone()).await
    }

    /// Session user
    pub async fn user(&self) -> Option<User> {
        self.store.state(|s| s.session.user.clone()).await
    }

    /// Confirmed todos in display order
    pub async fn todos(&self) -> Vec<Todo> {
        self.store.state(|s| s.todos.todos.clone()).await
    }

    /// Todos selected by the current filter
    pub async fn visible_todos(&self) -> Vec<Todo> {
        self.store.state(|s| s.todos.visible_todos()).await
    }

    /// Ids with a request in flight
    pub async fn pending(&self) -> BTreeSet<TodoId> {
        self.store.state(|s| s.todos.pending.clone()).await
    }

    /// Optimistic placeholder while an add is in flight
    pub async fn temp_todo(&self) -> Option<Todo> {
        self.store.state(|s| s.todos.temp_todo().cloned()).await
    }

    /// Current filter
    pub async fn filter(&self) -> FilterStatus {
        self.store.state(|s| s.todos.filter).await
    }

    /// Active error banner
    pub async fn error(&self) -> Option<TodosError> {
        self.store.state(|s| s.todos.error).await
    }
}
