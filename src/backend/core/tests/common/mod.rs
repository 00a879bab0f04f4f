//! Shared fixtures for the router-level tests.

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, Response},
    Router,
};
use campus_core::api::{build_router, AppState};
use campus_core::auth::{ConsumedTokenLedger, Role, SessionClaim};
use campus_core::config::AuthConfig;
use campus_core::middleware::AccessGate;
use campus_core::access::InMemoryDirectory;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub const SECRET: &str = "integration-test-secret";

pub struct School {
    pub app: Router,
    pub directory: Arc<InMemoryDirectory>,
    pub gate: Arc<AccessGate>,
}

/// Class 1 has students s-1 (guardian p-1) and s-2 (guardian p-2) and is
/// taught Math by t-1. Teacher t-2 has no lessons.
pub fn seeded_directory() -> InMemoryDirectory {
    let directory = InMemoryDirectory::new();
    directory
        .insert_class(1, "1A")
        .insert_parent("p-1", "Ana", "Diaz")
        .insert_parent("p-2", "Ben", "Okafor")
        .insert_teacher("t-1", "Tom", "Reyes")
        .insert_teacher("t-2", "Uma", "Singh")
        .insert_student("s-1", 1, "p-1")
        .insert_student("s-2", 1, "p-2");
    directory.add_lesson("t-1", 1, "Math");
    directory
}

pub fn school() -> School {
    school_with(AuthConfig::with_secret(SECRET))
}

pub fn school_with(auth: AuthConfig) -> School {
    let directory = Arc::new(seeded_directory());
    let gate = Arc::new(AccessGate::from_config(&auth, Arc::new(ConsumedTokenLedger::new())).unwrap());
    let app = build_router(AppState::new(directory.clone(), gate.clone()));
    School { app, directory, gate }
}

impl School {
    /// `Cookie` header value carrying a fresh access token.
    pub fn session(&self, sub: &str, role: Role) -> String {
        let (access, _) = self.gate.keys().issue_access(sub, role).unwrap();
        format!("accessToken={}", access.token)
    }

    pub fn expired_access(&self, sub: &str, role: Role) -> String {
        let claim = SessionClaim::new(
            sub,
            role,
            chrono::Duration::minutes(-30),
            "campus",
            self.gate.keys().access_audience(),
        );
        self.gate.keys().sign(&claim).unwrap()
    }

    pub fn refresh_token(&self, sub: &str, role: Role) -> String {
        self.gate.keys().issue_refresh(sub, role).unwrap().token
    }

    pub async fn get(&self, path: &str, cookie: Option<&str>) -> Response<Body> {
        let mut request = Request::builder().uri(path);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        self.app.clone().oneshot(request.body(Body::empty()).unwrap()).await.unwrap()
    }

    pub async fn post_json(&self, path: &str, body: Value, cookie: Option<&str>) -> Response<Body> {
        let mut request = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        self.app
            .clone()
            .oneshot(request.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap()
    }
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}

/// Value of `name` in the response's `Set-Cookie` headers.
pub fn issued_cookie(response: &Response<Body>, name: &str) -> Option<String> {
    set_cookies(response).into_iter().find_map(|cookie| {
        cookie
            .split(';')
            .next()
            .and_then(|pair| pair.split_once('='))
            .filter(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
    })
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
