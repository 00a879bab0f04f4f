#![allow(clippy::result_large_err)]
//! # Campus Core
//!
//! Session verification and role-based access control for the school
//! dashboard.
//!
//! ## Architecture
//!
//! - **Token Verifier**: HS256 access/refresh tokens with a typed failure kind
//! - **Refresh Flow**: single-use refresh token rotation, at most once per request
//! - **Route Table**: ordered (pattern, roles) rules, first match wins
//! - **Access Gate**: Tower middleware driving the request lifecycle
//! - **Entity Access**: self / guardian / assigned-teacher / admin relationships
//! - **Directory**: PostgreSQL and in-memory lookups of relationship fields
//! - **Observability**: structured logging, OTLP tracing, Prometheus metrics

pub mod access;
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod observability;

pub use error::{CampusError, ErrorCategory, ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::access::{
        can_view, ensure_visible, resolve_relationship, Caller, EntityKind, EntityRef,
        InMemoryDirectory, Relationship, SchoolDirectory, StudentLink, StudentProfile,
        StudentQuery, TeacherProfile, TeacherQuery,
    };
    pub use crate::auth::{
        ConsumedTokenLedger, CookieSettings, JwtRefreshExchange, RefreshError, RefreshExchange,
        RefreshGuard, Role, RouteDecision, RouteRule, RouteTable, SessionClaim, TokenError,
        TokenKeys, TokenPair, TokenSettings, UnmatchedRoutePolicy,
    };
    pub use crate::error::{CampusError, ErrorCode, ErrorContext, ErrorSeverity, Result};
    pub use crate::middleware::{
        AccessGate, AccessGateLayer, GateOutcome, GateState, SessionContext,
        SecurityHeadersLayer, SecurityHeadersConfig,
    };
}
