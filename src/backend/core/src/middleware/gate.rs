//! Access gate middleware.
//!
//! Drives every request through token verification, at most one refresh and
//! the route table before the handler runs:
//!
//! ```text
//! Unauthenticated -> TokenPresent -> Verified -> Authorized | Denied
//!                          |
//!                       Expired -> Refreshing -> Verified | RefreshFailed -> Unauthenticated
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use campus_core::middleware::{AccessGate, AccessGateLayer};
//!
//! let gate = Arc::new(AccessGate::from_config(&config.auth, ledger)?);
//! let app = Router::new()
//!     .route("/list/teachers", get(list_teachers))
//!     .layer(AccessGateLayer::new(gate));
//! ```

use axum::{
    body::Body,
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use metrics::counter;
use std::{
    fmt,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::access::Caller;
use crate::auth::cookies::replace_request_cookie;
use crate::auth::{
    normalize_path, ConsumedTokenLedger, CookieSettings, JwtRefreshExchange, RefreshExchange,
    RefreshGuard, Role, RouteDecision, RouteTable, SessionClaim, TokenError, TokenKeys, TokenPair,
};
use crate::config::AuthConfig;
use crate::error::{ErrorCode, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// States and Outcomes
// ═══════════════════════════════════════════════════════════════════════════════

/// Where a request is in the gate lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Unauthenticated,
    TokenPresent,
    Expired,
    Refreshing,
    RefreshFailed,
    Verified,
    Authorized,
    Denied,
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unauthenticated => "unauthenticated",
            Self::TokenPresent => "token_present",
            Self::Expired => "expired",
            Self::Refreshing => "refreshing",
            Self::RefreshFailed => "refresh_failed",
            Self::Verified => "verified",
            Self::Authorized => "authorized",
            Self::Denied => "denied",
        };
        f.write_str(name)
    }
}

/// The verified session, available to handlers as an extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub claim: SessionClaim,
    pub request_id: String,
    /// True when this request minted a new token pair.
    pub refreshed: bool,
}

impl SessionContext {
    pub fn role(&self) -> Role {
        self.claim.role
    }

    pub fn subject(&self) -> &str {
        &self.claim.sub
    }

    pub fn caller(&self) -> Caller {
        Caller::from(&self.claim)
    }
}

/// What the gate decided for one request.
#[derive(Debug, Clone)]
pub enum GateOutcome {
    /// Public path, no session required.
    Public,
    Authorized {
        session: SessionContext,
        decision: RouteDecision,
        refreshed: Option<TokenPair>,
    },
    /// Back to the login page. `cause` is `MissingToken`, `MalformedToken`
    /// or `RefreshFailure`.
    RedirectLogin {
        cause: ErrorCode,
    },
    RedirectHome {
        role: Role,
        refreshed: Option<TokenPair>,
    },
}

impl GateOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Authorized {
                decision: RouteDecision::AllowedUnmatched,
                ..
            } => "authorized_unmatched",
            Self::Authorized { .. } => "authorized",
            Self::RedirectLogin { .. } => "redirect_login",
            Self::RedirectHome { .. } => "redirect_home",
        }
    }

    /// Stale cookies are cleared unless the caller sent none.
    pub fn clears_cookies(&self) -> bool {
        matches!(self, Self::RedirectLogin { cause } if cause.ends_session() && *cause != ErrorCode::MissingToken)
    }
}

/// Login path handed to extractors through request extensions.
#[derive(Debug, Clone)]
struct LoginPath(Arc<str>);

// ═══════════════════════════════════════════════════════════════════════════════
// Gate
// ═══════════════════════════════════════════════════════════════════════════════

pub struct AccessGate {
    keys: Arc<TokenKeys>,
    exchange: Arc<dyn RefreshExchange>,
    routes: Arc<RouteTable>,
    cookies: CookieSettings,
    login_path: Arc<str>,
    public_paths: Vec<String>,
}

impl fmt::Debug for AccessGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessGate")
            .field("keys", &self.keys)
            .field("routes", &self.routes.rules().len())
            .field("login_path", &self.login_path)
            .field("public_paths", &self.public_paths)
            .finish_non_exhaustive()
    }
}

impl AccessGate {
    pub fn new(
        keys: Arc<TokenKeys>,
        exchange: Arc<dyn RefreshExchange>,
        routes: Arc<RouteTable>,
        cookies: CookieSettings,
    ) -> Self {
        Self {
            keys,
            exchange,
            routes,
            cookies,
            login_path: Arc::from("/login"),
            public_paths: vec![
                "/login".to_string(),
                "/logout".to_string(),
                "/health".to_string(),
                "/metrics".to_string(),
            ],
        }
    }

    /// Build the gate with the school route table and JWT refresh rotation.
    pub fn from_config(config: &AuthConfig, ledger: Arc<ConsumedTokenLedger>) -> Result<Self> {
        let keys = Arc::new(TokenKeys::new(&config.jwt_secret, config.token_settings())?);
        let exchange = Arc::new(JwtRefreshExchange::new(keys.clone(), ledger));
        let routes = Arc::new(RouteTable::school_default().with_unmatched_policy(config.unmatched_routes));

        Ok(Self::new(keys, exchange, routes, config.cookie_settings())
            .with_login_path(&config.login_path)
            .with_public_paths(config.public_paths.clone()))
    }

    pub fn with_login_path(mut self, path: &str) -> Self {
        self.login_path = Arc::from(path);
        self
    }

    pub fn with_public_paths(mut self, paths: Vec<String>) -> Self {
        self.public_paths = paths.iter().filter_map(|p| normalize_path(p)).collect();
        self
    }

    pub fn keys(&self) -> &Arc<TokenKeys> {
        &self.keys
    }

    pub fn exchange(&self) -> &Arc<dyn RefreshExchange> {
        &self.exchange
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn cookies(&self) -> &CookieSettings {
        &self.cookies
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Undecodable paths are never public.
    pub fn is_public(&self, path: &str) -> bool {
        let Some(path) = normalize_path(path) else {
            return false;
        };
        self.public_paths.iter().any(|public| {
            path == *public
                || path
                    .strip_prefix(public.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    /// Decide what happens to a request. Never fails: every problem becomes
    /// a redirect.
    pub async fn evaluate(
        &self,
        path: &str,
        headers: &HeaderMap,
        guard: &RefreshGuard,
        request_id: &str,
    ) -> GateOutcome {
        let outcome = self.decide(path, headers, guard, request_id).await;
        counter!("campus_gate_decisions_total", "outcome" => outcome.label()).increment(1);
        if let GateOutcome::RedirectLogin { cause } = &outcome {
            debug!(request_id, code = %cause, "Sending caller to login");
        }
        outcome
    }

    async fn decide(&self, path: &str, headers: &HeaderMap, guard: &RefreshGuard, request_id: &str) -> GateOutcome {
        if self.is_public(path) {
            return GateOutcome::Public;
        }

        let access = self.cookies.access_token(headers);
        let refresh = self.cookies.refresh_token(headers);

        if access.is_none() && refresh.is_none() {
            debug!(request_id, path = %path, "No session cookies");
            return GateOutcome::RedirectLogin { cause: ErrorCode::MissingToken };
        }
        transition(request_id, GateState::Unauthenticated, GateState::TokenPresent);

        let (claim, refreshed) = match access.map(|token| self.keys.verify_access(token)) {
            Some(Ok(claim)) => {
                transition(request_id, GateState::TokenPresent, GateState::Verified);
                (claim, None)
            }
            Some(Err(TokenError::Expired)) | None => {
                transition(request_id, GateState::TokenPresent, GateState::Expired);
                match self.refresh(guard, refresh, request_id).await {
                    Some((claim, pair)) => (claim, Some(pair)),
                    None => return GateOutcome::RedirectLogin { cause: ErrorCode::RefreshFailure },
                }
            }
            Some(Err(e)) => {
                warn!(request_id, path = %path, error = %e, "Rejected access token");
                transition(request_id, GateState::TokenPresent, GateState::Unauthenticated);
                return GateOutcome::RedirectLogin { cause: ErrorCode::MalformedToken };
            }
        };

        match self.routes.authorize(path, claim.role) {
            RouteDecision::RedirectHome(role) => {
                warn!(
                    request_id,
                    path = %path,
                    sub = %claim.sub,
                    role = %role,
                    "Route denied for role"
                );
                transition(request_id, GateState::Verified, GateState::Denied);
                GateOutcome::RedirectHome { role, refreshed }
            }
            decision => {
                transition(request_id, GateState::Verified, GateState::Authorized);
                GateOutcome::Authorized {
                    session: SessionContext {
                        claim,
                        request_id: request_id.to_string(),
                        refreshed: refreshed.is_some(),
                    },
                    decision,
                    refreshed,
                }
            }
        }
    }

    async fn refresh(
        &self,
        guard: &RefreshGuard,
        refresh_token: Option<&str>,
        request_id: &str,
    ) -> Option<(SessionClaim, TokenPair)> {
        transition(request_id, GateState::Expired, GateState::Refreshing);

        let pair = match guard.refresh(self.exchange.as_ref(), refresh_token).await {
            Ok(pair) => pair,
            Err(e) => {
                info!(request_id, error = %e, "Session refresh failed");
                transition(request_id, GateState::Refreshing, GateState::RefreshFailed);
                return None;
            }
        };

        match self.keys.verify_access(&pair.access.token) {
            Ok(claim) => {
                transition(request_id, GateState::Refreshing, GateState::Verified);
                Some((claim, pair))
            }
            Err(e) => {
                warn!(request_id, error = %e, "Refreshed access token failed verification");
                transition(request_id, GateState::Refreshing, GateState::RefreshFailed);
                None
            }
        }
    }

    fn redirect(&self, location: &str) -> Response {
        let mut response = StatusCode::SEE_OTHER.into_response();
        if let Ok(value) = HeaderValue::from_str(location) {
            response.headers_mut().insert(header::LOCATION, value);
        }
        response
    }

    fn set_cookies(&self, response: &mut Response, cookies: &[String]) {
        for cookie in cookies {
            if let Ok(value) = HeaderValue::from_str(cookie) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
        }
    }

    fn issue_cookies(&self, response: &mut Response, pair: &TokenPair) {
        self.set_cookies(response, &self.cookies.issue(&pair.access.token, &pair.refresh.token));
    }
}

fn transition(request_id: &str, from: GateState, to: GateState) {
    debug!(request_id, %from, %to, "Gate transition");
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer and Service
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct AccessGateLayer {
    gate: Arc<AccessGate>,
}

impl AccessGateLayer {
    pub fn new(gate: Arc<AccessGate>) -> Self {
        Self { gate }
    }
}

impl<S> Layer<S> for AccessGateLayer {
    type Service = AccessGateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessGateService {
            inner,
            gate: self.gate.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AccessGateService<S> {
    inner: S,
    gate: Arc<AccessGate>,
}

impl<S> Service<Request<Body>> for AccessGateService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, std::result::Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let gate = self.gate.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let request_id = request
                .headers()
                .get("X-Request-ID")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
                .unwrap_or_else(|| Uuid::new_v4().to_string());

            let guard = request
                .extensions()
                .get::<RefreshGuard>()
                .cloned()
                .unwrap_or_default();
            request.extensions_mut().insert(guard.clone());
            request.extensions_mut().insert(LoginPath(gate.login_path.clone()));

            let path = request.uri().path().to_string();
            let outcome = gate.evaluate(&path, request.headers(), &guard, &request_id).await;

            let clear_cookies = outcome.clears_cookies();
            match outcome {
                GateOutcome::Public => inner.call(request).await,

                GateOutcome::RedirectLogin { .. } => {
                    let mut response = gate.redirect(&gate.login_path);
                    if clear_cookies {
                        gate.set_cookies(&mut response, &gate.cookies.clear());
                    }
                    Ok(response)
                }

                GateOutcome::RedirectHome { role, refreshed } => {
                    let mut response = gate.redirect(role.landing_path());
                    if let Some(pair) = &refreshed {
                        gate.issue_cookies(&mut response, pair);
                    }
                    Ok(response)
                }

                GateOutcome::Authorized { session, refreshed, .. } => {
                    if let Some(pair) = &refreshed {
                        let headers = request.headers_mut();
                        replace_request_cookie(headers, &gate.cookies.access_name, &pair.access.token);
                        replace_request_cookie(headers, &gate.cookies.refresh_name, &pair.refresh.token);
                    }
                    request.extensions_mut().insert(session);

                    let mut response = inner.call(request).await?;
                    if let Some(pair) = &refreshed {
                        gate.issue_cookies(&mut response, pair);
                    }
                    Ok(response)
                }
            }
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Axum Extractor
// ═══════════════════════════════════════════════════════════════════════════════

#[axum::async_trait]
impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        parts.extensions.get::<SessionContext>().cloned().ok_or_else(|| {
            let login = parts
                .extensions
                .get::<LoginPath>()
                .map(|p| p.0.to_string())
                .unwrap_or_else(|| "/login".to_string());
            (StatusCode::SEE_OTHER, [(header::LOCATION, login)]).into_response()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{RefreshError, TokenSettings};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SECRET: &str = "gate-test-secret";

    fn gate() -> AccessGate {
        AccessGate::from_config(
            &AuthConfig::with_secret(SECRET),
            Arc::new(ConsumedTokenLedger::new()),
        )
        .unwrap()
    }

    fn cookie_headers(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    fn expired_access(gate: &AccessGate, sub: &str, role: Role) -> String {
        let claim = SessionClaim::new(
            sub,
            role,
            chrono::Duration::minutes(-30),
            "campus",
            gate.keys().access_audience(),
        );
        gate.keys().sign(&claim).unwrap()
    }

    #[tokio::test]
    async fn test_public_paths_skip_tokens() {
        let gate = gate();
        let outcome = gate.evaluate("/login", &HeaderMap::new(), &RefreshGuard::new(), "r").await;
        assert!(matches!(outcome, GateOutcome::Public));
        assert!(gate.is_public("/health/"));
        assert!(!gate.is_public("/loginx"));
    }

    #[tokio::test]
    async fn test_no_cookies_redirects_to_login() {
        let gate = gate();
        let outcome = gate.evaluate("/admin", &HeaderMap::new(), &RefreshGuard::new(), "r").await;
        assert!(matches!(outcome, GateOutcome::RedirectLogin { cause: ErrorCode::MissingToken }));
        assert!(!outcome.clears_cookies());
    }

    #[tokio::test]
    async fn test_tampered_token_redirects_and_clears() {
        let gate = gate();
        let headers = cookie_headers("accessToken=abc.def.ghi");
        let outcome = gate.evaluate("/admin", &headers, &RefreshGuard::new(), "r").await;
        assert!(matches!(outcome, GateOutcome::RedirectLogin { cause: ErrorCode::MalformedToken }));
        assert!(outcome.clears_cookies());
    }

    #[tokio::test]
    async fn test_valid_token_authorized() {
        let gate = gate();
        let (access, _) = gate.keys().issue_access("t-1", Role::Teacher).unwrap();
        let headers = cookie_headers(&format!("accessToken={}", access.token));

        match gate.evaluate("/list/teachers", &headers, &RefreshGuard::new(), "r").await {
            GateOutcome::Authorized { session, refreshed, decision } => {
                assert_eq!(session.role(), Role::Teacher);
                assert_eq!(decision, RouteDecision::Allowed);
                assert!(refreshed.is_none());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_role_mismatch_redirects_home() {
        let gate = gate();
        let (access, _) = gate.keys().issue_access("s-1", Role::Student).unwrap();
        let headers = cookie_headers(&format!("accessToken={}", access.token));

        let outcome = gate.evaluate("/list/teachers", &headers, &RefreshGuard::new(), "r").await;
        assert!(matches!(
            outcome,
            GateOutcome::RedirectHome { role: Role::Student, refreshed: None }
        ));
    }

    #[tokio::test]
    async fn test_expired_access_refreshes() {
        let gate = gate();
        let refresh = gate.keys().issue_refresh("p-1", Role::Parent).unwrap();
        let headers = cookie_headers(&format!(
            "accessToken={}; refreshToken={}",
            expired_access(&gate, "p-1", Role::Parent),
            refresh.token
        ));

        match gate.evaluate("/parent", &headers, &RefreshGuard::new(), "r").await {
            GateOutcome::Authorized { session, refreshed, .. } => {
                assert!(session.refreshed);
                assert_eq!(session.subject(), "p-1");
                assert!(refreshed.is_some());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_access_with_refresh_is_treated_as_expired() {
        let gate = gate();
        let refresh = gate.keys().issue_refresh("a-1", Role::Admin).unwrap();
        let headers = cookie_headers(&format!("refreshToken={}", refresh.token));

        let outcome = gate.evaluate("/admin", &headers, &RefreshGuard::new(), "r").await;
        assert!(matches!(outcome, GateOutcome::Authorized { refreshed: Some(_), .. }));
    }

    struct CountingExchange(AtomicUsize);

    #[async_trait]
    impl RefreshExchange for CountingExchange {
        async fn exchange(&self, _: &str) -> std::result::Result<TokenPair, RefreshError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(RefreshError::Replayed)
        }

        async fn revoke(&self, _: &str) -> std::result::Result<(), RefreshError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_refresh_runs_once_per_request() {
        let keys = Arc::new(TokenKeys::new(SECRET, TokenSettings::default()).unwrap());
        let counting = Arc::new(CountingExchange(AtomicUsize::new(0)));
        let gate = AccessGate::new(
            keys.clone(),
            counting.clone(),
            Arc::new(RouteTable::school_default()),
            CookieSettings::default(),
        );
        let claim = SessionClaim::new("s-1", Role::Student, chrono::Duration::minutes(-1), "campus", keys.access_audience());
        let headers = cookie_headers(&format!("accessToken={}; refreshToken=r", keys.sign(&claim).unwrap()));

        let guard = RefreshGuard::new();
        for _ in 0..2 {
            let outcome = gate.evaluate("/student", &headers, &guard, "r").await;
            assert!(matches!(outcome, GateOutcome::RedirectLogin { cause: ErrorCode::RefreshFailure }));
        }
        assert_eq!(counting.0.load(Ordering::SeqCst), 1);
    }
}
