//! HTTP surface of the campus gate.
//!
//! Every route sits behind [`AccessGateLayer`]. The gate lets the public
//! paths (`/login`, `/logout`, `/health`, `/metrics`) through untouched and
//! resolves a [`crate::middleware::SessionContext`] for everything else.
//!
//! | route                    | who                                  |
//! |--------------------------|--------------------------------------|
//! | `/admin` ... `/parent`   | the matching role only               |
//! | `/list/:collection`      | per the route table                  |
//! | `/list/students/:id`     | any role, then the per-entity check  |
//! | `/list/teachers/:id`     | any role, then the per-entity check  |

mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::access::SchoolDirectory;
use crate::middleware::{AccessGate, AccessGateLayer, SecurityHeadersConfig, SecurityHeadersLayer};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<dyn SchoolDirectory>,
    pub gate: Arc<AccessGate>,
}

impl AppState {
    pub fn new(directory: Arc<dyn SchoolDirectory>, gate: Arc<AccessGate>) -> Self {
        Self { directory, gate }
    }
}

/// Build the router with the access gate and response hardening applied.
pub fn build_router(state: AppState) -> Router {
    build_router_with_headers(state, SecurityHeadersConfig::default())
}

pub fn build_router_with_headers(state: AppState, headers: SecurityHeadersConfig) -> Router {
    let gate = state.gate.clone();

    Router::new()
        // Public
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/login", get(handlers::login_page).post(handlers::login))
        .route("/logout", post(handlers::logout))
        // Dashboards
        .route("/admin", get(handlers::dashboard))
        .route("/teacher", get(handlers::dashboard))
        .route("/student", get(handlers::dashboard))
        .route("/parent", get(handlers::dashboard))
        // Lists and detail pages
        .route("/list/:collection", get(handlers::list_collection))
        .route("/list/students/:id", get(handlers::student_detail))
        .route("/list/teachers/:id", get(handlers::teacher_detail))
        // Middleware
        .layer(AccessGateLayer::new(gate))
        .layer(SecurityHeadersLayer::new(headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Success envelope. Failures render through [`crate::error::ErrorResponse`].
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self { success: true, data }
    }
}
