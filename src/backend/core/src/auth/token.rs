//! Token issuance and verification.
//!
//! Verification is pure and fails with exactly one of [`TokenError::Malformed`],
//! [`TokenError::SignatureInvalid`] or [`TokenError::Expired`]. Only `Expired`
//! is recoverable (through the refresh flow).

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;

use super::claims::{RefreshClaim, SessionClaim};
use super::role::Role;
use crate::error::{CampusError, ErrorCode};

const ACCESS_AUDIENCE_SUFFIX: &str = "access";
const REFRESH_AUDIENCE_SUFFIX: &str = "refresh";

/// Token verification failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed: {0}")]
    Malformed(String),

    #[error("token signature is invalid")]
    SignatureInvalid,

    #[error("token has expired")]
    Expired,

    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl TokenError {
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired)
    }

    fn from_jwt(error: jsonwebtoken::errors::Error) -> Self {
        match error.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::SignatureInvalid,
            _ => Self::Malformed(error.to_string()),
        }
    }
}

impl From<TokenError> for CampusError {
    fn from(error: TokenError) -> Self {
        let code = match &error {
            TokenError::Expired => ErrorCode::ExpiredToken,
            TokenError::Malformed(_) | TokenError::SignatureInvalid => ErrorCode::MalformedToken,
            TokenError::Signing(_) => ErrorCode::InternalError,
        };
        CampusError::with_internal(code, "The session token is not valid", error.to_string())
            .with_source(error)
    }
}

/// Token lifetimes and identity.
#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub issuer: String,
    pub access_ttl: std::time::Duration,
    pub refresh_ttl: std::time::Duration,
    pub leeway_secs: u64,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            issuer: "campus".to_string(),
            access_ttl: std::time::Duration::from_secs(15 * 60),
            refresh_ttl: std::time::Duration::from_secs(7 * 24 * 60 * 60),
            leeway_secs: 0,
        }
    }
}

/// A signed token and its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

/// An access token together with the refresh token that can renew it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
    pub claim: SessionClaim,
}

/// HMAC keys plus validation rules for both token kinds.
pub struct TokenKeys {
    settings: TokenSettings,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_validation: Validation,
    refresh_validation: Validation,
    access_audience: String,
    refresh_audience: String,
}

impl fmt::Debug for TokenKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenKeys")
            .field("issuer", &self.settings.issuer)
            .field("access_audience", &self.access_audience)
            .field("refresh_audience", &self.refresh_audience)
            .finish_non_exhaustive()
    }
}

impl TokenKeys {
    /// Create keys from the signing secret.
    pub fn new(secret: &str, settings: TokenSettings) -> Result<Self, CampusError> {
        if secret.is_empty() {
            return Err(CampusError::configuration("JWT secret must not be empty"));
        }

        let access_audience = format!("{}-{}", settings.issuer, ACCESS_AUDIENCE_SUFFIX);
        let refresh_audience = format!("{}-{}", settings.issuer, REFRESH_AUDIENCE_SUFFIX);

        let validation_for = |audience: &str| {
            let mut validation = Validation::new(Algorithm::HS256);
            validation.leeway = settings.leeway_secs;
            validation.set_issuer(&[&settings.issuer]);
            validation.set_audience(&[audience]);
            validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
            validation
        };

        Ok(Self {
            access_validation: validation_for(&access_audience),
            refresh_validation: validation_for(&refresh_audience),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_audience,
            refresh_audience,
            settings,
        })
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    /// Verify an access token and return its claim.
    pub fn verify_access(&self, token: &str) -> Result<SessionClaim, TokenError> {
        self.verify(token, &self.access_validation)
    }

    /// Verify a refresh token and return its claim.
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaim, TokenError> {
        self.verify(token, &self.refresh_validation)
    }

    fn verify<C: DeserializeOwned>(&self, token: &str, validation: &Validation) -> Result<C, TokenError> {
        if token.trim().is_empty() {
            return Err(TokenError::Malformed("empty token".to_string()));
        }

        decode::<C>(token, &self.decoding_key, validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Token verification failed: {}", e);
                TokenError::from_jwt(e)
            })
    }

    /// Sign a new access token.
    pub fn issue_access(&self, sub: &str, role: Role) -> Result<(IssuedToken, SessionClaim), TokenError> {
        let claim = SessionClaim::new(
            sub,
            role,
            to_chrono(self.settings.access_ttl),
            &self.settings.issuer,
            &self.access_audience,
        );
        let token = self.sign(&claim)?;
        let issued = IssuedToken {
            token,
            jti: claim.jti.clone(),
            expires_at: claim.expires_at(),
        };
        Ok((issued, claim))
    }

    /// Sign a new refresh token.
    pub fn issue_refresh(&self, sub: &str, role: Role) -> Result<IssuedToken, TokenError> {
        let claim = RefreshClaim(SessionClaim::new(
            sub,
            role,
            to_chrono(self.settings.refresh_ttl),
            &self.settings.issuer,
            &self.refresh_audience,
        ));
        let token = self.sign(&claim)?;
        Ok(IssuedToken {
            token,
            jti: claim.jti.clone(),
            expires_at: claim.expires_at(),
        })
    }

    /// Sign an access/refresh pair for a fresh session.
    pub fn issue_pair(&self, sub: &str, role: Role) -> Result<TokenPair, TokenError> {
        let (access, claim) = self.issue_access(sub, role)?;
        let refresh = self.issue_refresh(sub, role)?;
        Ok(TokenPair { access, refresh, claim })
    }

    /// Sign an arbitrary claim with these keys.
    pub fn sign<C: Serialize>(&self, claims: &C) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    pub fn access_audience(&self) -> &str {
        &self.access_audience
    }

    pub fn refresh_audience(&self) -> &str {
        &self.refresh_audience
    }
}

fn to_chrono(ttl: std::time::Duration) -> Duration {
    Duration::from_std(ttl).unwrap_or_else(|_| Duration::seconds(i64::MAX / 1000))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(secret: &str) -> TokenKeys {
        TokenKeys::new(secret, TokenSettings::default()).unwrap()
    }

    #[test]
    fn test_issue_and_verify_access() {
        let keys = keys("super-secret-key-for-testing-only");
        let (issued, claim) = keys.issue_access("s-1", Role::Student).unwrap();

        let verified = keys.verify_access(&issued.token).unwrap();
        assert_eq!(verified, claim);
        assert_eq!(verified.role, Role::Student);
        assert_eq!(verified.aud, "campus-access");
    }

    #[test]
    fn test_expired_is_distinct() {
        let keys = keys("secret");
        let claim = SessionClaim::new("s-1", Role::Student, Duration::minutes(-10), "campus", "campus-access");
        let token = keys.sign(&claim).unwrap();

        assert_eq!(keys.verify_access(&token), Err(TokenError::Expired));
    }

    #[test]
    fn test_wrong_secret_is_signature_invalid() {
        let (issued, _) = keys("secret-a").issue_access("s-1", Role::Student).unwrap();
        assert_eq!(
            keys("secret-b").verify_access(&issued.token),
            Err(TokenError::SignatureInvalid)
        );
    }

    #[test]
    fn test_garbage_is_malformed() {
        let keys = keys("secret");
        assert!(matches!(keys.verify_access("not-a-token"), Err(TokenError::Malformed(_))));
        assert!(matches!(keys.verify_access(""), Err(TokenError::Malformed(_))));
    }

    #[test]
    fn test_refresh_token_is_not_an_access_token() {
        let keys = keys("secret");
        let refresh = keys.issue_refresh("p-1", Role::Parent).unwrap();

        assert!(matches!(keys.verify_access(&refresh.token), Err(TokenError::Malformed(_))));
        let claim = keys.verify_refresh(&refresh.token).unwrap();
        assert_eq!(claim.sub, "p-1");
        assert_eq!(claim.jti, refresh.jti);
    }

    #[test]
    fn test_unknown_role_is_malformed() {
        let keys = keys("secret");
        let now = Utc::now().timestamp();
        let raw = serde_json::json!({
            "sub": "x", "role": "janitor", "iat": now, "exp": now + 600,
            "jti": "j", "iss": "campus", "aud": "campus-access"
        });
        let token = keys.sign(&raw).unwrap();
        assert!(matches!(keys.verify_access(&token), Err(TokenError::Malformed(_))));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(TokenKeys::new("", TokenSettings::default()).is_err());
    }

    #[test]
    fn test_token_error_codes() {
        assert_eq!(CampusError::from(TokenError::Expired).code(), ErrorCode::ExpiredToken);
        assert_eq!(
            CampusError::from(TokenError::SignatureInvalid).code(),
            ErrorCode::MalformedToken
        );
    }
}
