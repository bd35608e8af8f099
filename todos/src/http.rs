//! [`TodoGateway`] over HTTP with reqwest.

use crate::gateway::{GatewayError, GatewayFuture, TodoGateway};
use crate::types::{NewTodo, NewUser, Todo, TodoId, TodoPatch, User, UserId};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// REST client for the todo and user resources
#[derive(Clone, Debug)]
pub struct HttpGateway {
    client: Client,
    base_url: Url,
}

impl HttpGateway {
    /// Create a gateway rooted at `base_url`
    ///
    /// `timeout` bounds every request; `None` waits indefinitely.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Request`] if the URL is not an absolute
    /// hierarchical URL or the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, GatewayError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| GatewayError::Request(format!("invalid base url {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::Request(format!(
                "base url {base_url} cannot carry a path"
            )));
        }

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(transport_error)?;

        Ok(Self { client, base_url })
    }

    /// Base URL requests are resolved against
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn fetch_todos(&self, user_id: UserId) -> Result<Vec<Todo>, GatewayError> {
        let mut url = self.endpoint(&["todos"]);
        url.query_pairs_mut()
            .append_pair("userId", &user_id.to_string());

        let response = self.client.get(url).send().await.map_err(transport_error)?;
        decode(response).await
    }

    async fn post_todo(&self, todo: NewTodo) -> Result<Todo, GatewayError> {
        let response = self
            .client
            .post(self.endpoint(&["todos"]))
            .json(&todo)
            .send()
            .await
            .map_err(transport_error)?;
        decode(response).await
    }

    async fn remove_todo(&self, id: TodoId) -> Result<(), GatewayError> {
        let response = self
            .client
            .delete(self.endpoint(&["todos", &id.to_string()]))
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await.map(drop)
    }

    async fn patch_todo(&self, id: TodoId, patch: TodoPatch) -> Result<Todo, GatewayError> {
        let response = self
            .client
            .patch(self.endpoint(&["todos", &id.to_string()]))
            .json(&patch)
            .send()
            .await
            .map_err(transport_error)?;
        decode(response).await
    }

    async fn lookup_user(&self, email: &str) -> Result<Option<User>, GatewayError> {
        let mut url = self.endpoint(&["users"]);
        url.query_pairs_mut().append_pair("email", email);

        let response = self.client.get(url).send().await.map_err(transport_error)?;
        let users: Vec<User> = decode(response).await?;
        Ok(users.into_iter().next())
    }

    async fn post_user(&self, user: NewUser) -> Result<User, GatewayError> {
        let response = self
            .client
            .post(self.endpoint(&["users"]))
            .json(&user)
            .send()
            .await
            .map_err(transport_error)?;
        decode(response).await
    }
}

impl TodoGateway for HttpGateway {
    fn list_todos(&self, user_id: UserId) -> GatewayFuture<'_, Vec<Todo>> {
        Box::pin(self.fetch_todos(user_id))
    }

    fn create_todo(&self, todo: NewTodo) -> GatewayFuture<'_, Todo> {
        Box::pin(self.post_todo(todo))
    }

    fn delete_todo(&self, id: TodoId) -> GatewayFuture<'_, ()> {
        Box::pin(self.remove_todo(id))
    }

    fn update_todo(&self, id: TodoId, patch: TodoPatch) -> GatewayFuture<'_, Todo> {
        Box::pin(self.patch_todo(id, patch))
    }

    fn find_user_by_email<'a>(&'a self, email: &'a str) -> GatewayFuture<'a, Option<User>> {
        Box::pin(self.lookup_user(email))
    }

    fn create_user(&self, user: NewUser) -> GatewayFuture<'_, User> {
        Box::pin(self.post_user(user))
    }
}

fn transport_error(error: reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Request(error.to_string())
    }
}

async fn check_status(response: Response) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::debug!(status = status.as_u16(), %body, "Request rejected");
    Err(GatewayError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    let response = check_status(response).await?;
    let bytes = response.bytes().await.map_err(transport_error)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn gateway(server: &MockServer) -> HttpGateway {
        HttpGateway::new(&server.uri(), Some(Duration::from_millis(500))).unwrap()
    }

    #[tokio::test]
    async fn lists_todos_for_user() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/todos"))
            .and(query_param("userId", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 5, "userId": 1, "title": "Buy milk", "completed": false},
                {"id": 6, "userId": 1, "title": "Walk dog", "completed": true}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let todos = gateway(&server).await.list_todos(1).await.unwrap();

        assert_eq!(todos.len(), 2);
        assert_eq!(todos[0].title, "Buy milk");
        assert!(todos[1].completed);
    }

    #[tokio::test]
    async fn creates_todo_with_camel_case_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/todos"))
            .and(body_json(json!({"userId": 1, "completed": false, "title": "Buy milk"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(
                json!({"id": 5, "userId": 1, "title": "Buy milk", "completed": false}),
            ))
            .mount(&server)
            .await;

        let todo = gateway(&server)
            .await
            .create_todo(NewTodo {
                user_id: 1,
                completed: false,
                title: "Buy milk".into(),
            })
            .await
            .unwrap();

        assert_eq!(todo.id, 5);
    }

    #[tokio::test]
    async fn patches_all_fields_but_id() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/todos/5"))
            .and(body_json(json!({"userId": 1, "title": "Buy milk", "completed": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"id": 5, "userId": 1, "title": "Buy milk", "completed": true}),
            ))
            .mount(&server)
            .await;

        let patch = TodoPatch {
            user_id: 1,
            title: "Buy milk".into(),
            completed: true,
        };
        let todo = gateway(&server).await.update_todo(5, patch).await.unwrap();

        assert!(todo.completed);
    }

    #[tokio::test]
    async fn delete_ignores_response_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/todos/7"))
            .respond_with(ResponseTemplate::new(200).set_body_string("1"))
            .expect(1)
            .mount(&server)
            .await;

        gateway(&server).await.delete_todo(7).await.unwrap();
    }

    #[tokio::test]
    async fn failing_status_is_reported_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/todos/7"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
            .mount(&server)
            .await;

        let error = gateway(&server).await.delete_todo(7).await.unwrap_err();

        assert!(matches!(
            error,
            GatewayError::Status { status: 404, ref body } if body == "Not Found"
        ));
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/todos"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let error = gateway(&server).await.list_todos(1).await.unwrap_err();

        assert!(matches!(error, GatewayError::Decode(_)));
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/todos"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([]))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let error = gateway(&server).await.list_todos(1).await.unwrap_err();

        assert!(matches!(error, GatewayError::Timeout));
    }

    #[tokio::test]
    async fn user_lookup_adopts_first_match() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .and(query_param("email", "ann@example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 3, "name": "Ann", "email": "ann@example.com"},
                {"id": 4, "name": "Ann Two", "email": "ann@example.com"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .and(query_param("email", "nobody@example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let gateway = gateway(&server).await;
        let found = gateway.find_user_by_email("ann@example.com").await.unwrap();
        let missing = gateway.find_user_by_email("nobody@example.com").await.unwrap();

        assert_eq!(found.map(|u| u.id), Some(3));
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn creates_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users"))
            .and(body_json(json!({"name": "Annie", "email": "ann@example.com"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(
                json!({"id": 9, "name": "Annie", "email": "ann@example.com"}),
            ))
            .mount(&server)
            .await;

        let user = gateway(&server)
            .await
            .create_user(NewUser {
                name: "Annie".into(),
                email: "ann@example.com".into(),
            })
            .await
            .unwrap();

        assert_eq!(user.id, 9);
    }

    #[test]
    fn base_url_path_is_kept() {
        let gateway = HttpGateway::new("https://mate.academy/students-api", None).unwrap();
        assert_eq!(
            gateway.endpoint(&["todos", "5"]).as_str(),
            "https://mate.academy/students-api/todos/5"
        );
        assert!(HttpGateway::new("not a url", None).is_err());
    }
}
