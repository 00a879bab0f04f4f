//! Response hardening and request ids.
//!
//! Runs outside the access gate so that redirects issued by the gate carry
//! the same headers as handler responses. Dashboard pages hold personal
//! records, so anything that is not explicitly cacheable is marked
//! `no-store`.

use axum::{
    extract::Request,
    http::{header, HeaderName, HeaderValue},
    response::Response,
};
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use uuid::Uuid;

const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FrameOptions {
    #[default]
    Deny,
    SameOrigin,
}

impl FrameOptions {
    fn as_header(&self) -> HeaderValue {
        match self {
            Self::Deny => HeaderValue::from_static("DENY"),
            Self::SameOrigin => HeaderValue::from_static("SAMEORIGIN"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SecurityHeadersConfig {
    pub frame_options: FrameOptions,
    pub referrer_policy: &'static str,
    /// `Strict-Transport-Security` max age; `None` leaves the header off.
    pub hsts_max_age: Option<u64>,
    pub content_security_policy: String,
    /// Paths whose responses may be cached when they set no cookies.
    pub cacheable_paths: Vec<String>,
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            frame_options: FrameOptions::Deny,
            referrer_policy: "strict-origin-when-cross-origin",
            hsts_max_age: None,
            content_security_policy: "default-src 'self'; frame-ancestors 'none'; form-action 'self'".into(),
            cacheable_paths: vec!["/health".to_string()],
        }
    }
}

impl SecurityHeadersConfig {
    /// Defaults plus HSTS, for deployments that serve cookies with `Secure`.
    pub fn with_hsts(mut self, max_age: u64) -> Self {
        self.hsts_max_age = Some(max_age);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct SecurityHeadersLayer {
    config: SecurityHeadersConfig,
}

impl SecurityHeadersLayer {
    pub fn new(config: SecurityHeadersConfig) -> Self {
        Self { config }
    }
}

impl<S> Layer<S> for SecurityHeadersLayer {
    type Service = SecurityHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SecurityHeadersService {
            inner,
            config: self.config.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SecurityHeadersService<S> {
    inner: S,
    config: SecurityHeadersConfig,
}

impl<S> Service<Request> for SecurityHeadersService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let config = self.config.clone();
        let mut inner = self.inner.clone();

        let request_id = req
            .headers()
            .get(&REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            req.headers_mut().insert(REQUEST_ID, value);
        }

        let cacheable = config
            .cacheable_paths
            .iter()
            .any(|p| req.uri().path() == p.as_str());

        Box::pin(async move {
            let mut response = inner.call(req).await?;
            let sets_cookie = response.headers().contains_key(header::SET_COOKIE);
            let headers = response.headers_mut();

            headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
            headers.insert(header::X_FRAME_OPTIONS, config.frame_options.as_header());
            headers.insert(header::REFERRER_POLICY, HeaderValue::from_static(config.referrer_policy));

            if let Some(max_age) = config.hsts_max_age {
                if let Ok(v) = HeaderValue::from_str(&format!("max-age={}; includeSubDomains", max_age)) {
                    headers.insert(header::STRICT_TRANSPORT_SECURITY, v);
                }
            }
            if !config.content_security_policy.is_empty() {
                if let Ok(v) = HeaderValue::from_str(&config.content_security_policy) {
                    headers.insert(header::CONTENT_SECURITY_POLICY, v);
                }
            }
            if sets_cookie || !cacheable {
                headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store, private"));
            }
            if let Ok(v) = HeaderValue::from_str(&request_id) {
                headers.insert(REQUEST_ID, v);
            }

            Ok(response)
        })
    }
}
