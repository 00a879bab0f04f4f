//! Campus error taxonomy and its HTTP rendering.
//!
//! Every failure in the access path maps to an [`ErrorCode`]. Handlers return
//! [`CampusError`], which renders as
//! `{"success": false, "error": {"code", "numeric_code", "message", "details"}}`.
//!
//! A record the caller may not see is reported exactly like a record that
//! does not exist: same status, same code, same body.
//!
//! ```rust,ignore
//! use campus_core::error::{ErrorContext, Result};
//!
//! fn hash(raw: &str) -> Result<String> {
//!     argon2_hash(raw).context("password hashing failed")
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, warn};

pub type Result<T> = std::result::Result<T, CampusError>;

type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

// ═══════════════════════════════════════════════════════════════════════════════
// Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Coarse grouping used for metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Storage,
    Encoding,
    Session,
    Access,
    Input,
    Configuration,
    Internal,
}

impl ErrorCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Storage => "storage",
            Self::Encoding => "encoding",
            Self::Session => "session",
            Self::Access => "access",
            Self::Input => "input",
            Self::Configuration => "configuration",
            Self::Internal => "internal",
        }
    }
}

/// Machine-readable failure kinds.
///
/// `EntityForbidden` is internal only. Clients see it as `RECORD_NOT_FOUND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    DatabaseError,
    DatabaseConnectionFailed,
    DatabaseQueryFailed,
    RecordNotFound,
    DuplicateRecord,

    SerializationError,
    DeserializationError,

    MissingToken,
    MalformedToken,
    ExpiredToken,
    RefreshFailure,
    InvalidCredentials,

    RouteForbidden,
    EntityForbidden,

    ValidationError,
    InvalidInput,

    ConfigurationError,
    MissingConfiguration,
    InvalidConfiguration,

    InternalError,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DatabaseError => "DATABASE_ERROR",
            Self::DatabaseConnectionFailed => "DATABASE_CONNECTION_FAILED",
            Self::DatabaseQueryFailed => "DATABASE_QUERY_FAILED",
            Self::RecordNotFound => "RECORD_NOT_FOUND",
            Self::DuplicateRecord => "DUPLICATE_RECORD",
            Self::SerializationError => "SERIALIZATION_ERROR",
            Self::DeserializationError => "DESERIALIZATION_ERROR",
            Self::MissingToken => "MISSING_TOKEN",
            Self::MalformedToken => "MALFORMED_TOKEN",
            Self::ExpiredToken => "EXPIRED_TOKEN",
            Self::RefreshFailure => "REFRESH_FAILURE",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::RouteForbidden => "ROUTE_FORBIDDEN",
            Self::EntityForbidden => "ENTITY_FORBIDDEN",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::InvalidInput => "INVALID_INPUT",
            Self::ConfigurationError => "CONFIGURATION_ERROR",
            Self::MissingConfiguration => "MISSING_CONFIGURATION",
            Self::InvalidConfiguration => "INVALID_CONFIGURATION",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Stable number reported next to the code. Ranges follow the category.
    pub const fn numeric_code(self) -> u32 {
        match self {
            Self::DatabaseError => 2000,
            Self::DatabaseConnectionFailed => 2001,
            Self::DatabaseQueryFailed => 2002,
            Self::RecordNotFound => 2004,
            Self::DuplicateRecord => 2005,
            Self::SerializationError => 2200,
            Self::DeserializationError => 2201,
            Self::MissingToken => 4000,
            Self::MalformedToken => 4001,
            Self::ExpiredToken => 4002,
            Self::RefreshFailure => 4003,
            Self::InvalidCredentials => 4006,
            Self::RouteForbidden => 4050,
            Self::EntityForbidden => 4051,
            Self::ValidationError => 4100,
            Self::InvalidInput => 4101,
            Self::ConfigurationError => 5000,
            Self::MissingConfiguration => 5001,
            Self::InvalidConfiguration => 5002,
            Self::InternalError => 9000,
        }
    }

    pub const fn category(self) -> ErrorCategory {
        match self {
            Self::DatabaseError
            | Self::DatabaseConnectionFailed
            | Self::DatabaseQueryFailed
            | Self::RecordNotFound
            | Self::DuplicateRecord => ErrorCategory::Storage,
            Self::SerializationError | Self::DeserializationError => ErrorCategory::Encoding,
            Self::MissingToken
            | Self::MalformedToken
            | Self::ExpiredToken
            | Self::RefreshFailure
            | Self::InvalidCredentials => ErrorCategory::Session,
            Self::RouteForbidden | Self::EntityForbidden => ErrorCategory::Access,
            Self::ValidationError | Self::InvalidInput => ErrorCategory::Input,
            Self::ConfigurationError | Self::MissingConfiguration | Self::InvalidConfiguration => {
                ErrorCategory::Configuration
            }
            Self::InternalError => ErrorCategory::Internal,
        }
    }

    /// The code clients are allowed to see.
    pub const fn public_code(self) -> ErrorCode {
        match self {
            Self::EntityForbidden => Self::RecordNotFound,
            other => other,
        }
    }

    pub const fn http_status(self) -> StatusCode {
        match self {
            Self::RecordNotFound | Self::EntityForbidden => StatusCode::NOT_FOUND,
            Self::DuplicateRecord => StatusCode::CONFLICT,
            Self::ValidationError | Self::InvalidInput => StatusCode::UNPROCESSABLE_ENTITY,
            Self::RouteForbidden => StatusCode::FORBIDDEN,
            Self::DatabaseConnectionFailed => StatusCode::SERVICE_UNAVAILABLE,
            Self::MissingToken
            | Self::MalformedToken
            | Self::ExpiredToken
            | Self::RefreshFailure
            | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Failures after which the gate drops the session and sends the caller
    /// to the login page. An expired access token alone does not: it is
    /// refreshed first.
    pub const fn ends_session(self) -> bool {
        matches!(self, Self::MissingToken | Self::MalformedToken | Self::RefreshFailure)
    }

    pub const fn severity(self) -> ErrorSeverity {
        match self {
            Self::MalformedToken | Self::RefreshFailure | Self::InvalidCredentials => {
                ErrorSeverity::Suspicious
            }
            Self::DatabaseConnectionFailed | Self::InternalError => ErrorSeverity::Critical,
            _ => match self.category() {
                ErrorCategory::Storage
                | ErrorCategory::Encoding
                | ErrorCategory::Configuration
                | ErrorCategory::Internal
                    if !matches!(self, Self::RecordNotFound | Self::DuplicateRecord) =>
                {
                    ErrorSeverity::Fault
                }
                _ => ErrorSeverity::Expected,
            },
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How loudly a failure is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Caller mistakes and ordinary denials.
    Expected,
    /// Tampered or replayed credentials.
    Suspicious,
    /// Server-side failures.
    Fault,
    Critical,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error
// ═══════════════════════════════════════════════════════════════════════════════

/// Structured extras rendered under `error.details`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl ErrorDetails {
    pub fn entity(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: Some(entity_type.into()),
            entity_id: Some(entity_id.into()),
            context: BTreeMap::new(),
        }
    }

    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Error, Debug)]
#[error("{code}: {user_message}")]
pub struct CampusError {
    code: ErrorCode,
    /// Safe to show to clients.
    user_message: Cow<'static, str>,
    /// Logged, never rendered.
    internal_message: Option<String>,
    details: ErrorDetails,
    #[source]
    source: Option<BoxedSource>,
}

impl CampusError {
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        counter!(
            "campus_errors_total",
            "code" => code.as_str(),
            "category" => code.category().as_str(),
        )
        .increment(1);

        Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        }
    }

    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An internal error occurred", message)
    }

    pub fn not_found(entity_type: &str, entity_id: &str) -> Self {
        Self::entity_error(ErrorCode::RecordNotFound, entity_type, entity_id)
    }

    /// A record the caller may not see. Renders exactly like [`Self::not_found`].
    pub fn entity_hidden(entity_type: &str, entity_id: &str) -> Self {
        Self::entity_error(ErrorCode::EntityForbidden, entity_type, entity_id)
    }

    fn entity_error(code: ErrorCode, entity_type: &str, entity_id: &str) -> Self {
        Self::new(code, format!("{} not found: {}", entity_type, entity_id))
            .with_details(ErrorDetails::entity(entity_type, entity_id))
    }

    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::ConfigurationError, "Invalid configuration", message)
    }

    pub fn invalid_credentials() -> Self {
        Self::new(ErrorCode::InvalidCredentials, "Invalid username or password")
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), value);
        }
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    pub fn log(&self) {
        let code = self.code.as_str();
        let category = self.code.category().as_str();
        let internal = self.internal_message.as_deref().unwrap_or("");

        match self.code.severity() {
            ErrorSeverity::Critical | ErrorSeverity::Fault => error!(
                code,
                category,
                internal,
                source = ?self.source,
                "{}",
                self.user_message
            ),
            ErrorSeverity::Suspicious => warn!(code, category, internal, "{}", self.user_message),
            ErrorSeverity::Expected => debug!(code, category, "{}", self.user_message),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Rendering
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub numeric_code: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
}

impl From<&CampusError> for ErrorResponse {
    fn from(err: &CampusError) -> Self {
        let code = err.code.public_code();
        let details = (!err.details.is_empty()).then(|| err.details.clone());

        Self {
            success: false,
            error: ErrorInfo {
                code,
                numeric_code: code.numeric_code(),
                message: err.user_message.to_string(),
                details,
            },
        }
    }
}

impl IntoResponse for CampusError {
    fn into_response(self) -> Response {
        self.log();
        (self.http_status(), Json(ErrorResponse::from(&self))).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Context
// ═══════════════════════════════════════════════════════════════════════════════

/// Converts foreign failures into [`CampusError`] at the call site.
pub trait ErrorContext<T> {
    /// Wrap as an internal error with `message` logged.
    fn context(self, message: impl Into<String>) -> Result<T>;

    fn with_error_code(self, code: ErrorCode) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let message = message.into();
            CampusError::internal(format!("{}: {}", message, e)).with_source(e)
        })
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.map_err(|e| CampusError::with_internal(code, "Request failed", e.to_string()).with_source(e))
    }
}

impl<T> ErrorContext<T> for Option<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| CampusError::new(ErrorCode::RecordNotFound, message.into()))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.ok_or_else(|| CampusError::new(code, "Request failed"))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Conversions
// ═══════════════════════════════════════════════════════════════════════════════

impl From<sqlx::Error> for CampusError {
    fn from(err: sqlx::Error) -> Self {
        let (code, message) = match &err {
            sqlx::Error::RowNotFound => (ErrorCode::RecordNotFound, "Record not found"),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                (ErrorCode::DuplicateRecord, "Record already exists")
            }
            sqlx::Error::Database(_) => (ErrorCode::DatabaseQueryFailed, "Database query failed"),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                (ErrorCode::DatabaseConnectionFailed, "Database unavailable")
            }
            _ => (ErrorCode::DatabaseError, "Database error"),
        };
        Self::with_internal(code, message, err.to_string()).with_source(err)
    }
}

impl From<serde_json::Error> for CampusError {
    fn from(err: serde_json::Error) -> Self {
        let code = match err.classify() {
            serde_json::error::Category::Io => ErrorCode::SerializationError,
            _ => ErrorCode::DeserializationError,
        };
        Self::with_internal(code, "Invalid JSON", err.to_string()).with_source(err)
    }
}

impl From<std::io::Error> for CampusError {
    fn from(err: std::io::Error) -> Self {
        Self::internal(err.to_string()).with_source(err)
    }
}

impl From<anyhow::Error> for CampusError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{:#}", err))
    }
}

impl From<config::ConfigError> for CampusError {
    fn from(err: config::ConfigError) -> Self {
        let code = match &err {
            config::ConfigError::NotFound(_) => ErrorCode::MissingConfiguration,
            config::ConfigError::Type { .. } | config::ConfigError::Message(_) => {
                ErrorCode::InvalidConfiguration
            }
            _ => ErrorCode::ConfigurationError,
        };
        Self::with_internal(code, "Invalid configuration", err.to_string()).with_source(err)
    }
}
