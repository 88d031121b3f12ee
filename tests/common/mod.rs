#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use adminhub::{
    cache::Cache,
    config::Config,
    create_router,
    seed::seed,
    store::{MemoryStore, Store},
    AppState,
};

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "admin-password";

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
}

pub struct Reply {
    pub status: StatusCode,
    pub body: Value,
}

pub async fn spawn_app() -> TestApp {
    let config = Config::from_lookup(|name| {
        match name {
            "JWT_SECRET" => Some("test-secret"),
            "ADMIN_EMAIL" => Some(ADMIN_EMAIL),
            "ADMIN_PASSWORD" => Some(ADMIN_PASSWORD),
            "BCRYPT_COST" => Some("4"),
            _ => None,
        }
        .map(str::to_string)
    })
    .unwrap();

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    seed(store.as_ref(), &config).await.unwrap();
    let cache = Cache::memory(config.cache_short_ttl, config.cache_long_ttl);
    let state = AppState::new(config, store, cache);
    let router = create_router(state.clone());
    TestApp { state, router }
}

impl TestApp {
    pub async fn request(&self, method: Method, path: &str, token: Option<&str>, body: Option<Value>) -> Reply {
        let mut builder = Request::builder().method(method).uri(format!("/api{path}"));
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        Reply { status, body }
    }

    pub async fn get(&self, path: &str, token: &str) -> Reply {
        self.request(Method::GET, path, Some(token), None).await
    }

    pub async fn post(&self, path: &str, token: &str, body: Value) -> Reply {
        self.request(Method::POST, path, Some(token), Some(body)).await
    }

    /// Logs in and returns `(token, user_id)`.
    pub async fn login(&self, email: &str, password: &str) -> (String, String) {
        let reply = self
            .request(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK, "login failed: {}", reply.body);
        let data = &reply.body["data"];
        (
            data["token"].as_str().unwrap().to_string(),
            data["user"]["id"].as_str().unwrap().to_string(),
        )
    }

    pub async fn login_admin(&self) -> (String, String) {
        self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await
    }

    /// Registers a member account and returns `(token, user_id)`.
    pub async fn register(&self, email: &str) -> (String, String) {
        let reply = self
            .request(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({
                    "email": email,
                    "password": "member-password",
                    "first_name": "Test",
                    "last_name": "Member",
                })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "register failed: {}", reply.body);
        let data = &reply.body["data"];
        (
            data["token"].as_str().unwrap().to_string(),
            data["user"]["id"].as_str().unwrap().to_string(),
        )
    }

    /// Creates a group holding `codenames` and returns its id.
    pub async fn group_with(&self, admin: &str, codename: &str, codenames: &[&str]) -> String {
        let catalog = self.get("/permissions", admin).await;
        let permission_ids: Vec<Value> = catalog.body["data"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|p| codenames.contains(&p["codename"].as_str().unwrap()))
            .map(|p| p["id"].clone())
            .collect();
        assert_eq!(permission_ids.len(), codenames.len());

        let reply = self
            .post(
                "/groups",
                admin,
                json!({ "name": codename, "codename": codename, "permission_ids": permission_ids }),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "group create failed: {}", reply.body);
        reply.body["data"]["id"].as_str().unwrap().to_string()
    }
}
