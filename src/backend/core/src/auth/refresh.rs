//! Refresh token rotation.
//!
//! A refresh token is exchanged for a brand new access/refresh pair. The old
//! refresh token's id goes into the [`ConsumedTokenLedger`] so a replay of the
//! same cookie fails. [`RefreshGuard`] bounds the exchange to one attempt per
//! incoming request.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use metrics::counter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use super::token::{TokenError, TokenKeys, TokenPair};
use crate::error::{CampusError, ErrorCode};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("no refresh token presented")]
    Missing,

    #[error("refresh token rejected: {0}")]
    Invalid(TokenError),

    #[error("refresh token was already used")]
    Replayed,

    #[error("failed to issue new tokens: {0}")]
    Issuance(TokenError),

    #[error("refresh already attempted for this request")]
    AlreadyAttempted,
}

impl RefreshError {
    /// Label used on the refresh counter.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Invalid(TokenError::Expired) => "expired",
            Self::Invalid(_) => "invalid",
            Self::Replayed => "replayed",
            Self::Issuance(_) => "issuance_failed",
            Self::AlreadyAttempted => "already_attempted",
        }
    }
}

impl From<RefreshError> for CampusError {
    fn from(error: RefreshError) -> Self {
        CampusError::with_internal(
            ErrorCode::RefreshFailure,
            "Your session has ended, please sign in again",
            error.to_string(),
        )
        .with_source(error)
    }
}

/// Issues a new token pair for a refresh token.
#[async_trait]
pub trait RefreshExchange: Send + Sync {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenPair, RefreshError>;

    /// Mark a refresh token as no longer usable without issuing anything.
    async fn revoke(&self, refresh_token: &str) -> Result<(), RefreshError>;
}

/// Refresh token ids that have already been exchanged, kept until the
/// token would have expired anyway.
#[derive(Debug, Default)]
pub struct ConsumedTokenLedger {
    consumed: DashMap<String, i64>,
}

impl ConsumedTokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `jti` as consumed. Returns false if it already was.
    pub fn consume(&self, jti: &str, expires_at: i64) -> bool {
        match self.consumed.entry(jti.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(expires_at);
                true
            }
        }
    }

    pub fn is_consumed(&self, jti: &str) -> bool {
        self.consumed.contains_key(jti)
    }

    /// Drop entries whose token has expired. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now().timestamp();
        let before = self.consumed.len();
        self.consumed.retain(|_, exp| *exp >= now);
        let removed = before.saturating_sub(self.consumed.len());
        if removed > 0 {
            debug!(removed, "Purged expired refresh token ids");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.consumed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumed.is_empty()
    }
}

/// Exchange backed by the signing keys and an in-process ledger.
pub struct JwtRefreshExchange {
    keys: Arc<TokenKeys>,
    ledger: Arc<ConsumedTokenLedger>,
}

impl JwtRefreshExchange {
    pub fn new(keys: Arc<TokenKeys>, ledger: Arc<ConsumedTokenLedger>) -> Self {
        Self { keys, ledger }
    }

    pub fn ledger(&self) -> &Arc<ConsumedTokenLedger> {
        &self.ledger
    }
}

#[async_trait]
impl RefreshExchange for JwtRefreshExchange {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenPair, RefreshError> {
        let claim = self
            .keys
            .verify_refresh(refresh_token)
            .map_err(RefreshError::Invalid)?;

        if !self.ledger.consume(&claim.jti, claim.exp) {
            info!(sub = %claim.sub, jti = %claim.jti, "Refresh token replay rejected");
            return Err(RefreshError::Replayed);
        }

        let pair = self
            .keys
            .issue_pair(&claim.sub, claim.role)
            .map_err(RefreshError::Issuance)?;

        debug!(sub = %claim.sub, role = %claim.role, "Rotated refresh token");
        Ok(pair)
    }

    async fn revoke(&self, refresh_token: &str) -> Result<(), RefreshError> {
        let claim = self
            .keys
            .verify_refresh(refresh_token)
            .map_err(RefreshError::Invalid)?;
        self.ledger.consume(&claim.jti, claim.exp);
        Ok(())
    }
}

/// Per-request marker: the first `try_acquire` wins, every later one fails.
#[derive(Debug, Clone, Default)]
pub struct RefreshGuard {
    attempted: Arc<AtomicBool>,
}

impl RefreshGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Result<(), RefreshError> {
        if self.attempted.swap(true, Ordering::SeqCst) {
            Err(RefreshError::AlreadyAttempted)
        } else {
            Ok(())
        }
    }

    pub fn attempted(&self) -> bool {
        self.attempted.load(Ordering::SeqCst)
    }

    /// Run the exchange unless this request already tried once.
    pub async fn refresh(
        &self,
        exchange: &dyn RefreshExchange,
        refresh_token: Option<&str>,
    ) -> Result<TokenPair, RefreshError> {
        let result = match self.try_acquire() {
            Ok(()) => match refresh_token {
                Some(token) => exchange.exchange(token).await,
                None => Err(RefreshError::Missing),
            },
            Err(e) => Err(e),
        };

        let label = match &result {
            Ok(_) => "success",
            Err(e) => e.label(),
        };
        counter!("campus_refresh_total", "result" => label).increment(1);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Role, TokenSettings};
    use std::sync::atomic::AtomicUsize;

    fn exchange() -> JwtRefreshExchange {
        let keys = Arc::new(TokenKeys::new("refresh-secret", TokenSettings::default()).unwrap());
        JwtRefreshExchange::new(keys, Arc::new(ConsumedTokenLedger::new()))
    }

    #[tokio::test]
    async fn test_exchange_rotates() {
        let exchange = exchange();
        let original = exchange.keys.issue_refresh("p-1", Role::Parent).unwrap();

        let pair = exchange.exchange(&original.token).await.unwrap();
        assert_eq!(pair.claim.sub, "p-1");
        assert_eq!(pair.claim.role, Role::Parent);
        assert_ne!(pair.refresh.jti, original.jti);
        assert!(exchange.ledger().is_consumed(&original.jti));
    }

    #[tokio::test]
    async fn test_replay_is_rejected() {
        let exchange = exchange();
        let original = exchange.keys.issue_refresh("p-1", Role::Parent).unwrap();

        exchange.exchange(&original.token).await.unwrap();
        assert_eq!(
            exchange.exchange(&original.token).await.unwrap_err(),
            RefreshError::Replayed
        );
    }

    #[tokio::test]
    async fn test_access_token_cannot_refresh() {
        let exchange = exchange();
        let (access, _) = exchange.keys.issue_access("p-1", Role::Parent).unwrap();

        assert!(matches!(
            exchange.exchange(&access.token).await,
            Err(RefreshError::Invalid(TokenError::Malformed(_)))
        ));
    }

    #[tokio::test]
    async fn test_revoke_blocks_later_exchange() {
        let exchange = exchange();
        let original = exchange.keys.issue_refresh("a-1", Role::Admin).unwrap();

        exchange.revoke(&original.token).await.unwrap();
        assert_eq!(
            exchange.exchange(&original.token).await.unwrap_err(),
            RefreshError::Replayed
        );
    }

    struct CountingExchange(AtomicUsize);

    #[async_trait]
    impl RefreshExchange for CountingExchange {
        async fn exchange(&self, _: &str) -> Result<TokenPair, RefreshError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(RefreshError::Invalid(TokenError::Expired))
        }

        async fn revoke(&self, _: &str) -> Result<(), RefreshError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_guard_allows_single_attempt() {
        let counting = CountingExchange(AtomicUsize::new(0));
        let guard = RefreshGuard::new();

        assert!(guard.refresh(&counting, Some("t")).await.is_err());
        assert_eq!(
            guard.refresh(&counting, Some("t")).await.unwrap_err(),
            RefreshError::AlreadyAttempted
        );
        assert_eq!(counting.0.load(Ordering::SeqCst), 1);
        assert!(guard.clone().attempted());
    }

    #[tokio::test]
    async fn test_missing_token_consumes_attempt() {
        let counting = CountingExchange(AtomicUsize::new(0));
        let guard = RefreshGuard::new();

        assert_eq!(guard.refresh(&counting, None).await.unwrap_err(), RefreshError::Missing);
        assert_eq!(counting.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_ledger_consume_and_purge() {
        let ledger = ConsumedTokenLedger::new();
        let future = Utc::now().timestamp() + 600;
        let past = Utc::now().timestamp() - 600;

        assert!(ledger.consume("a", future));
        assert!(!ledger.consume("a", future));
        assert!(ledger.consume("b", past));

        assert_eq!(ledger.purge_expired(), 1);
        assert!(ledger.is_consumed("a"));
        assert!(!ledger.is_consumed("b"));
    }
}
