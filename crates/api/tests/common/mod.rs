#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use flowsmith_api::auth::jwt::{generate_access_token, JwtConfig};
use flowsmith_api::config::ServerConfig;
use flowsmith_api::router::build_app_router;
use flowsmith_api::state::AppState;
use flowsmith_core::store::memory::{InMemoryCatalog, InMemoryGraphStore};
use flowsmith_core::types::DbId;
use flowsmith_events::EventBus;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

pub const ADMIN_ID: DbId = 1;
pub const EDITOR_ID: DbId = 2;
pub const OTHER_EDITOR_ID: DbId = 3;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        rule_cache_ttl: Duration::from_secs(300),
        jwt: JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
            access_token_expiry_mins: 15,
        },
    }
}

/// The application under test plus handles on its stores and bus.
pub struct TestApp {
    pub router: Router,
    pub catalog: Arc<InMemoryCatalog>,
    pub event_bus: Arc<EventBus>,
    config: ServerConfig,
}

impl TestApp {
    pub fn new() -> Self {
        let config = test_config();
        let catalog = Arc::new(InMemoryCatalog::new());
        let event_bus = Arc::new(EventBus::default());
        let state = AppState::from_stores(
            config.clone(),
            Arc::new(InMemoryGraphStore::new()),
            Arc::clone(&catalog),
            Arc::clone(&event_bus),
            None,
        );
        Self {
            router: build_app_router(state),
            catalog,
            event_bus,
            config,
        }
    }

    pub fn token(&self, user_id: DbId, role: &str) -> String {
        generate_access_token(user_id, role, &self.config.jwt).unwrap()
    }

    pub fn admin(&self) -> String {
        self.token(ADMIN_ID, "admin")
    }

    pub fn editor(&self) -> String {
        self.token(EDITOR_ID, "editor")
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap()
    }

    pub async fn get(&self, uri: &str, token: &str) -> Response<Body> {
        self.send(Method::GET, uri, Some(token), None).await
    }

    pub async fn post_json(&self, uri: &str, token: &str, body: Value) -> Response<Body> {
        self.send(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn put_json(&self, uri: &str, token: &str, body: Value) -> Response<Body> {
        self.send(Method::PUT, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> Response<Body> {
        self.send(Method::DELETE, uri, Some(token), None).await
    }
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
