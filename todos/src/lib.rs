//! # Todosync
//!
//! Client-side state layer for a todo list backed by a REST resource.
//!
//! The layer keeps an in-memory collection consistent with the server while
//! several user operations are in flight:
//!
//! - **Optimistic add**: a placeholder todo (id `0`) is shown until the
//!   create request settles
//! - **Per-item pending set**: ids with a delete or update in flight, so each
//!   item can show its own busy state
//! - **Transient errors**: at most one error banner, cleared after a fixed
//!   window unless a newer error replaces it
//! - **All-or-nothing clear**: completed todos are removed only if every
//!   delete succeeds
//!
//! ## Architecture
//!
//! ```text
//! TodoApp (facade) ──send──▶ Store ──▶ AppReducer
//!                                       ├─ SessionReducer (login, register, logout)
//!                                       └─ TodosReducer   (collection, pending, errors)
//!                              ▲            │ effects
//!                              └─ outcomes ─┘
//!                                 TodoGateway (HTTP or in-memory), SessionStore
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use todosync::{Config, TodoApp};
//!
//! let app = TodoApp::from_config(&Config::from_env())?;
//! app.start().await?;
//! app.login("ann@example.com").await?;
//! let todo = app.add_todo("Buy milk").await?;
//! app.toggle_todo(todo.id).await?;
//! ```

pub mod app;
pub mod config;
pub mod filter;
pub mod gateway;
pub mod http;
pub mod mocks;
pub mod reducer;
pub mod session;
pub mod types;

pub use app::{
    AppEnvironment, AppError, AppReducer, AppState, AppStore, LoginOutcome, RenameOutcome, TodoApp,
};
pub use config::Config;
pub use filter::{active_todos, completed_todos, visible_todos, FilterStatus};
pub use gateway::{GatewayError, TodoGateway};
pub use http::HttpGateway;
pub use reducer::{PendingPolicy, TodosReducer, TodosState, ERROR_BANNER};
pub use session::{
    AuthStep, FileSessionStore, MemorySessionStore, SessionError, SessionReducer, SessionState,
    SessionStore,
};
pub use types::{AddStatus, AppAction, Todo, TodoChanges, TodoId, TodosError, User, UserId};
