//! HTTP handlers.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{ApiResponse, AppState};
use crate::access::{ensure_visible, EntityRef, Relationship, StudentQuery, TeacherQuery};
use crate::auth::password::verify_password;
use crate::auth::Role;
use crate::error::{CampusError, Result};
use crate::middleware::SessionContext;

// ═══════════════════════════════════════════════════════════════════════════════
// Health and Metrics
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

pub async fn prometheus_metrics() -> impl IntoResponse {
    let body = crate::observability::metrics::render();

    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// Session Handlers
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub async fn login_page(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "login": state.gate.login_path(),
        "method": "POST",
        "fields": ["username", "password"]
    }))
}

pub async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Result<Response> {
    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err(CampusError::validation("Username and password are required"));
    }

    let credential = state.directory.credential(&req.username).await?;

    let credential = match credential {
        Some(c) if verify_password(&req.password, &c.password_hash) => c,
        _ => {
            counter!("campus_logins_total", "result" => "rejected").increment(1);
            warn!(username = %req.username, "Login rejected");
            return Err(CampusError::invalid_credentials());
        }
    };

    let pair = state
        .gate
        .keys()
        .issue_pair(&credential.subject_id, credential.role)?;

    counter!("campus_logins_total", "result" => "accepted").increment(1);
    info!(sub = %credential.subject_id, role = %credential.role, "Login accepted");

    let cookies = state.gate.cookies().issue(&pair.access.token, &pair.refresh.token);
    Ok(see_other(credential.role.landing_path(), &cookies))
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = state.gate.cookies().refresh_token(&headers) {
        if let Err(e) = state.gate.exchange().revoke(token).await {
            debug!(error = %e, "Refresh token not revoked at logout");
        }
    }

    see_other(state.gate.login_path(), &state.gate.cookies().clear())
}

fn see_other(location: &str, cookies: &[String]) -> Response {
    let mut response = StatusCode::SEE_OTHER.into_response();
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(location) {
        headers.insert(header::LOCATION, value);
    }
    for cookie in cookies {
        if let Ok(value) = HeaderValue::from_str(cookie) {
            headers.append(header::SET_COOKIE, value);
        }
    }
    response
}

// ═══════════════════════════════════════════════════════════════════════════════
// Dashboards and Lists
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    pub subject: String,
    pub role: Role,
    pub landing: &'static str,
    pub expires_at: DateTime<Utc>,
    pub refreshed: bool,
}

pub async fn dashboard(session: SessionContext) -> Json<ApiResponse<DashboardSummary>> {
    Json(ApiResponse::success(DashboardSummary {
        subject: session.claim.sub.clone(),
        role: session.role(),
        landing: session.role().landing_path(),
        expires_at: session.claim.expires_at(),
        refreshed: session.refreshed,
    }))
}

const COLLECTIONS: &[&str] = &[
    "teachers",
    "students",
    "parents",
    "subjects",
    "classes",
    "lessons",
    "exams",
    "assignments",
    "results",
    "attendance",
    "events",
    "announcements",
];

#[derive(Debug, Serialize)]
pub struct CollectionListing {
    pub collection: String,
    pub viewer: Role,
    pub items: Vec<serde_json::Value>,
}

/// List pages render elsewhere; this only confirms the gate let the caller in.
pub async fn list_collection(
    session: SessionContext,
    Path(collection): Path<String>,
) -> Result<Json<ApiResponse<CollectionListing>>> {
    if !COLLECTIONS.contains(&collection.as_str()) {
        return Err(CampusError::not_found("collection", &collection));
    }

    Ok(Json(ApiResponse::success(CollectionListing {
        collection,
        viewer: session.role(),
        items: Vec::new(),
    })))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Detail Pages
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
pub struct Detail<T> {
    pub relationship: Relationship,
    pub profile: T,
}

pub async fn student_detail(
    State(state): State<AppState>,
    session: SessionContext,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Detail<crate::access::StudentProfile>>>> {
    let target = EntityRef::student(&id);
    let relationship = ensure_visible(state.directory.as_ref(), &session.caller(), &target).await?;

    let profile = state
        .directory
        .student_profile(&id, &StudentQuery::full())
        .await?
        .ok_or_else(|| CampusError::not_found("student", &id))?;

    Ok(Json(ApiResponse::success(Detail { relationship, profile })))
}

pub async fn teacher_detail(
    State(state): State<AppState>,
    session: SessionContext,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Detail<crate::access::TeacherProfile>>>> {
    let target = EntityRef::teacher(&id);
    let relationship = ensure_visible(state.directory.as_ref(), &session.caller(), &target).await?;

    let profile = state
        .directory
        .teacher_profile(&id, &TeacherQuery::full())
        .await?
        .ok_or_else(|| CampusError::not_found("teacher", &id))?;

    Ok(Json(ApiResponse::success(Detail { relationship, profile })))
}
