//! In-memory implementations of the injected dependencies.
//!
//! [`InMemoryTodoGateway`] behaves like the REST resource (auto-incrementing
//! ids from 1) and lets tests inject failures, count calls, and hold
//! requests in flight until released.

use crate::gateway::{GatewayError, GatewayFuture, TodoGateway};
use crate::types::{NewTodo, NewUser, Todo, TodoId, TodoPatch, User, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Gateway operations, for failure injection and call counting
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `list_todos`
    ListTodos,
    /// `create_todo`
    CreateTodo,
    /// `delete_todo`
    DeleteTodo,
    /// `update_todo`
    UpdateTodo,
    /// `find_user_by_email`
    FindUser,
    /// `create_user`
    CreateUser,
}

#[derive(Default)]
struct Resource {
    todos: Vec<Todo>,
    users: Vec<User>,
    last_todo_id: TodoId,
    last_user_id: UserId,
    failing: HashSet<Operation>,
    failing_deletes: HashSet<TodoId>,
    calls: HashMap<Operation, usize>,
}

/// Fake REST resource
///
/// # Example
///
/// ```ignore
/// let gateway = InMemoryTodoGateway::new();
/// let user = gateway.seed_user("Ann", "ann@example.com");
/// gateway.fail(Operation::UpdateTodo);
/// ```
pub struct InMemoryTodoGateway {
    resource: Mutex<Resource>,
    open: watch::Sender<bool>,
}

impl Default for InMemoryTodoGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTodoGateway {
    /// Empty resource with the gate open
    #[must_use]
    pub fn new() -> Self {
        let (open, _) = watch::channel(true);
        Self {
            resource: Mutex::new(Resource::default()),
            open,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Resource> {
        self.resource.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a user and return it with its assigned id
    pub fn seed_user(&self, name: &str, email: &str) -> User {
        let mut resource = self.lock();
        resource.last_user_id += 1;
        let user = User {
            id: resource.last_user_id,
            name: name.to_string(),
            email: email.to_string(),
        };
        resource.users.push(user.clone());
        user
    }

    /// Store a todo and return it with its assigned id
    pub fn seed_todo(&self, user_id: UserId, title: &str, completed: bool) -> Todo {
        let mut resource = self.lock();
        resource.last_todo_id += 1;
        let todo = Todo {
            id: resource.last_todo_id,
            user_id,
            title: title.to_string(),
            completed,
        };
        resource.todos.push(todo.clone());
        todo
    }

    /// Make every future call of `operation` fail
    pub fn fail(&self, operation: Operation) {
        self.lock().failing.insert(operation);
    }

    /// Make deletes of `id` fail
    pub fn fail_delete_of(&self, id: TodoId) {
        self.lock().failing_deletes.insert(id);
    }

    /// Stop injecting failures
    pub fn heal(&self) {
        let mut resource = self.lock();
        resource.failing.clear();
        resource.failing_deletes.clear();
    }

    /// Number of calls made to `operation`, including held and failed ones
    #[must_use]
    pub fn calls(&self, operation: Operation) -> usize {
        self.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Current server-side todos
    #[must_use]
    pub fn todos(&self) -> Vec<Todo> {
        self.lock().todos.clone()
    }

    /// Hold every new and waiting request until [`Self::release`]
    pub fn hold(&self) {
        self.open.send_replace(false);
    }

    /// Let held requests proceed
    pub fn release(&self) {
        self.open.send_replace(true);
    }

    /// Counts the call, waits for the gate, then decides whether it fails
    async fn enter(&self, operation: Operation) -> Result<(), GatewayError> {
        *self.lock().calls.entry(operation).or_default() += 1;

        let mut open = self.open.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = open.wait_for(|open| *open).await;

        if self.lock().failing.contains(&operation) {
            return Err(GatewayError::Status {
                status: 500,
                body: format!("injected {operation:?} failure"),
            });
        }
        Ok(())
    }

    async fn list(&self, user_id: UserId) -> Result<Vec<Todo>, GatewayError> {
        self.enter(Operation::ListTodos).await?;
        Ok(self
            .lock()
            .todos
            .iter()
            .filter(|todo| todo.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create(&self, new: NewTodo) -> Result<Todo, GatewayError> {
        self.enter(Operation::CreateTodo).await?;
        Ok(self.seed_todo(new.user_id, &new.title, new.completed))
    }

    async fn delete(&self, id: TodoId) -> Result<(), GatewayError> {
        self.enter(Operation::DeleteTodo).await?;
        let mut resource = self.lock();
        if resource.failing_deletes.contains(&id) {
            return Err(GatewayError::Status {
                status: 500,
                body: format!("injected delete failure for {id}"),
            });
        }
        resource.todos.retain(|todo| todo.id != id);
        Ok(())
    }

    async fn update(&self, id: TodoId, patch: TodoPatch) -> Result<Todo, GatewayError> {
        self.enter(Operation::UpdateTodo).await?;
        let mut resource = self.lock();
        let todo = resource
            .todos
            .iter_mut()
            .find(|todo| todo.id == id)
            .ok_or_else(|| GatewayError::Status {
                status: 404,
                body: "Not Found".to_string(),
            })?;
        todo.user_id = patch.user_id;
        todo.title = patch.title;
        todo.completed = patch.completed;
        Ok(todo.clone())
    }

    async fn find_user(&self, email: &str) -> Result<Option<User>, GatewayError> {
        self.enter(Operation::FindUser).await?;
        Ok(self
            .lock()
            .users
            .iter()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn register(&self, new: NewUser) -> Result<User, GatewayError> {
        self.enter(Operation::CreateUser).await?;
        Ok(self.seed_user(&new.name, &new.email))
    }
}

impl TodoGateway for InMemoryTodoGateway {
    fn list_todos(&self, user_id: UserId) -> GatewayFuture<'_, Vec<Todo>> {
        Box::pin(self.list(user_id))
    }

    fn create_todo(&self, todo: NewTodo) -> GatewayFuture<'_, Todo> {
        Box::pin(self.create(todo))
    }

    fn delete_todo(&self, id: TodoId) -> GatewayFuture<'_, ()> {
        Box::pin(self.delete(id))
    }

    fn update_todo(&self, id: TodoId, patch: TodoPatch) -> GatewayFuture<'_, Todo> {
        Box::pin(self.update(id, patch))
    }

    fn find_user_by_email<'a>(&'a self, email: &'a str) -> GatewayFuture<'a, Option<User>> {
        Box::pin(self.find_user(email))
    }

    fn create_user(&self, user: NewUser) -> GatewayFuture<'_, User> {
        Box::pin(self.register(user))
    }
}
