//! Session tokens, refresh rotation, and whole-page route authorization.
//!
//! This module provides:
//! - **Role**: the single normalized role enum used after the auth boundary
//! - **Tokens**: HS256 access/refresh token issuance and verification
//! - **Refresh**: single-use refresh token exchange
//! - **Cookies**: reading and writing the session cookies
//! - **Routes**: the ordered route rule table
//!
//! # Usage
//!
//! ```rust,ignore
//! use campus_core::auth::{Role, RouteTable, TokenKeys, TokenSettings};
//!
//! let keys = TokenKeys::new("secret", TokenSettings::default())?;
//! let pair = keys.issue_pair("s-1", Role::Student)?;
//! let claim = keys.verify_access(&pair.access.token)?;
//!
//! let table = RouteTable::school_default();
//! let decision = table.authorize("/list/teachers", claim.role);
//! ```

pub mod claims;
pub mod cookies;
pub mod password;
pub mod refresh;
pub mod role;
pub mod routes;
pub mod token;

pub use claims::{RefreshClaim, SessionClaim};
pub use cookies::{expired_cookie, read_cookie, session_cookie, CookieSettings};
pub use refresh::{ConsumedTokenLedger, JwtRefreshExchange, RefreshError, RefreshExchange, RefreshGuard};
pub use role::{Role, RoleParseError};
pub use routes::{
    normalize_path, RouteDecision, RoutePattern, RouteRule, RouteTable, RouteTableError,
    UnmatchedRoutePolicy,
};
pub use token::{IssuedToken, TokenError, TokenKeys, TokenPair, TokenSettings};
