//! JWT claim bodies.
//!
//! Access and refresh tokens carry the same fields. They differ only in
//! audience, so a refresh token can never be presented as an access token.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use uuid::Uuid;

use super::role::Role;

/// Who the caller is, as read from a verified access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaim {
    /// Student, teacher, parent or admin id.
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    /// Unique per token; the refresh ledger keys on it.
    pub jti: String,
    pub iss: String,
    pub aud: String,
}

impl SessionClaim {
    /// A claim for `sub` that lapses `ttl` from now.
    pub fn new(sub: impl Into<String>, role: Role, ttl: Duration, issuer: &str, audience: &str) -> Self {
        let iat = Utc::now().timestamp();
        Self {
            sub: sub.into(),
            role,
            iat,
            exp: iat + ttl.num_seconds(),
            jti: Uuid::new_v4().to_string(),
            iss: issuer.to_owned(),
            aud: audience.to_owned(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        timestamp(self.iat)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        timestamp(self.exp)
    }
}

/// Body of a refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefreshClaim(pub SessionClaim);

impl Deref for RefreshClaim {
    type Target = SessionClaim;

    fn deref(&self) -> &SessionClaim {
        &self.0
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_window() {
        let claim = SessionClaim::new("t-1", Role::Teacher, Duration::minutes(15), "campus", "campus-access");
        assert!(!claim.is_expired());
        assert_eq!(claim.exp - claim.iat, 15 * 60);
        assert!(claim.expires_at() > claim.issued_at());
    }

    #[test]
    fn test_negative_ttl_is_already_expired() {
        let claim = SessionClaim::new("t-1", Role::Teacher, Duration::minutes(-5), "campus", "campus-access");
        assert!(claim.is_expired());
    }

    #[test]
    fn test_fresh_claims_get_distinct_ids() {
        let a = SessionClaim::new("s-1", Role::Student, Duration::minutes(1), "campus", "campus-refresh");
        let b = SessionClaim::new("s-1", Role::Student, Duration::minutes(1), "campus", "campus-refresh");
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn test_refresh_claim_serializes_flat() {
        let inner = SessionClaim::new("p-1", Role::Parent, Duration::days(7), "campus", "campus-refresh");
        let json = serde_json::to_value(RefreshClaim(inner.clone())).unwrap();
        assert_eq!(json["sub"], "p-1");
        assert_eq!(serde_json::from_value::<SessionClaim>(json).unwrap(), inner);
    }

    #[test]
    fn test_unknown_role_fails_to_decode() {
        let raw = serde_json::json!({
            "sub": "x", "role": "janitor", "iat": 0, "exp": 1,
            "jti": "j", "iss": "campus", "aud": "campus-access"
        });
        assert!(serde_json::from_value::<SessionClaim>(raw).is_err());
    }
}
