#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    response::Response,
    Router,
};
use catalog_api::{
    config::{AppConfig, ImageConfig},
    db,
    notifications::InMemoryMailer,
    AppState,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

pub const TEST_SECRET: &str =
    "k9Fq2Lw8Zr5Tn1Vb7Xc3Md6Hs0Pj4Ga9Ey2Ru8Io5Kl1Qw7Ez3Tx6Cv0Bn4Mm8Ah2Sd5Fg";

/// 1x1 transparent PNG
pub const PIXEL_B64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

/// Router over an in-memory SQLite database, a temp image root and a recording mailer.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub mailer: InMemoryMailer,
    pub image_root: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Same as [`TestApp::new`] with a hook to adjust configuration first.
    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let image_root = TempDir::new().expect("temp image root");

        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            TEST_SECRET.to_string(),
            3600,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // A second pooled connection would open a separate empty in-memory database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.images = ImageConfig::rooted_at(image_root.path());
        cfg.mail.reset_link_base = "https://shop.example.com/reset".to_string();
        adjust(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let mailer = InMemoryMailer::new();
        let state = AppState::new(cfg, Arc::new(pool), Arc::new(mailer.clone()))
            .await
            .expect("app state");
        let router = catalog_api::build_router(state.clone());

        Self {
            router,
            state,
            mailer,
            image_root,
        }
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Signs up and logs in, returning the session token.
    pub async fn signup_and_login(&self, email: &str, password: &str) -> String {
        self.request(
            Method::POST,
            "/user/signup",
            Some(json!({ "email": email, "password": password, "resetPassword": password })),
            None,
        )
        .await;
        self.login(email, password)
            .await
            .expect("login after signup should succeed")
    }

    pub async fn login(&self, email: &str, password: &str) -> Option<String> {
        let response = self
            .request(
                Method::POST,
                "/user/login",
                Some(json!({ "email": email, "password": password })),
                None,
            )
            .await;
        if !response.status().is_success() {
            return None;
        }
        response_json(response).await["token"]
            .as_str()
            .map(str::to_string)
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response body is json")
    }
}
