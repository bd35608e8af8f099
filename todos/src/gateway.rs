//! Remote todo gateway: typed requests against the REST resource.
//!
//! | Operation | Request |
//! |---|---|
//! | list todos | `GET /todos?userId={id}` |
//! | create todo | `POST /todos` |
//! | delete todo | `DELETE /todos/{id}` |
//! | update todo | `PATCH /todos/{id}` |
//! | find user by email | `GET /users?email={email}` |
//! | create user | `POST /users` |

use crate::types::{NewTodo, NewUser, Todo, TodoId, TodoPatch, User, UserId};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors from the remote resource
///
/// Reducers turn these into [`crate::types::TodosError`] kinds; the details
/// only reach logs.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Connection or protocol failure
    #[error("request failed: {0}")]
    Request(String),

    /// Server answered with a non-success status
    #[error("server returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// Response body did not match the expected shape
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// Request did not complete within the configured timeout
    #[error("request timed out")]
    Timeout,
}

/// Future returned by gateway methods
pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, GatewayError>> + Send + 'a>>;

/// Typed access to the todo and user resources
///
/// Object safe so it can be injected as `Arc<dyn TodoGateway>`.
pub trait TodoGateway: Send + Sync {
    /// All todos owned by `user_id`
    fn list_todos(&self, user_id: UserId) -> GatewayFuture<'_, Vec<Todo>>;

    /// Create a todo; the response carries the server-assigned id
    fn create_todo(&self, todo: NewTodo) -> GatewayFuture<'_, Todo>;

    /// Delete a todo
    fn delete_todo(&self, id: TodoId) -> GatewayFuture<'_, ()>;

    /// Replace every field of a todo except its id
    fn update_todo(&self, id: TodoId, patch: TodoPatch) -> GatewayFuture<'_, Todo>;

    /// First user whose email matches exactly
    fn find_user_by_email<'a>(&'a self, email: &'a str) -> GatewayFuture<'a, Option<User>>;

    /// Create a user
    fn create_user(&self, user: NewUser) -> GatewayFuture<'_, User>;
}
