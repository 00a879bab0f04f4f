//! Whole-page route authorization.
//!
//! Rules are checked in declaration order and the first matching pattern
//! decides. A role outside the rule's allowed set is sent back to its own
//! landing page; it is never shown a generic forbidden page.

use percent_encoding::percent_decode_str;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;

use super::role::Role;
use crate::error::CampusError;

#[derive(Debug, Error)]
pub enum RouteTableError {
    #[error("invalid route pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("route pattern {0:?} allows no roles")]
    NoRoles(String),
}

impl From<RouteTableError> for CampusError {
    fn from(error: RouteTableError) -> Self {
        CampusError::configuration(error.to_string())
    }
}

/// What happens on a path that no rule matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedRoutePolicy {
    /// Let any authenticated role through.
    #[default]
    Allow,
    /// Send the caller to its own landing page.
    RedirectHome,
}

/// Outcome of a route check for a verified role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Allowed,
    /// No rule matched and the policy let the request through.
    AllowedUnmatched,
    RedirectHome(Role),
}

impl RouteDecision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Self::RedirectHome(_))
    }
}

/// A pattern anchored at both ends and compiled once.
#[derive(Clone)]
pub struct RoutePattern {
    source: String,
    regex: Regex,
}

impl RoutePattern {
    pub fn new(pattern: &str) -> Result<Self, RouteTableError> {
        let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|source| {
            RouteTableError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            }
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RoutePattern").field(&self.source).finish()
    }
}

#[derive(Debug, Clone)]
pub struct RouteRule {
    pub pattern: RoutePattern,
    pub allowed: Vec<Role>,
}

impl RouteRule {
    pub fn new(pattern: &str, allowed: &[Role]) -> Result<Self, RouteTableError> {
        if allowed.is_empty() {
            return Err(RouteTableError::NoRoles(pattern.to_string()));
        }
        Ok(Self {
            pattern: RoutePattern::new(pattern)?,
            allowed: allowed.to_vec(),
        })
    }

    pub fn allows(&self, role: Role) -> bool {
        self.allowed.contains(&role)
    }
}

/// Ordered route rules plus the unmatched-route policy.
#[derive(Debug, Clone)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
    unmatched: UnmatchedRoutePolicy,
}

const ALL_ROLES: &[Role] = &Role::ALL;
const STAFF: &[Role] = &[Role::Admin, Role::Teacher];

const SCHOOL_ROUTES: &[(&str, &[Role])] = &[
    ("/admin(.*)", &[Role::Admin]),
    ("/student(.*)", &[Role::Student]),
    ("/teacher(.*)", &[Role::Teacher]),
    ("/parent(.*)", &[Role::Parent]),
    ("/list/students/[^/]+", ALL_ROLES),
    ("/list/teachers/[^/]+", ALL_ROLES),
    ("/list/teachers", STAFF),
    ("/list/students", STAFF),
    ("/list/parents", STAFF),
    ("/list/subjects", &[Role::Admin]),
    ("/list/classes", STAFF),
    ("/list/lessons", STAFF),
    ("/list/exams", ALL_ROLES),
    ("/list/assignments", ALL_ROLES),
    ("/list/results", ALL_ROLES),
    ("/list/attendance", ALL_ROLES),
    ("/list/events", ALL_ROLES),
    ("/list/announcements", ALL_ROLES),
];

impl RouteTable {
    pub fn new(rules: Vec<RouteRule>) -> Self {
        Self {
            rules,
            unmatched: UnmatchedRoutePolicy::default(),
        }
    }

    /// Build a table from `(pattern, roles)` pairs.
    pub fn from_patterns(patterns: &[(&str, &[Role])]) -> Result<Self, RouteTableError> {
        let rules = patterns
            .iter()
            .map(|(pattern, roles)| RouteRule::new(pattern, roles))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(rules))
    }

    /// The dashboard and list pages of the school application.
    pub fn school_default() -> Self {
        let rules = SCHOOL_ROUTES
            .iter()
            .filter_map(|(pattern, roles)| RouteRule::new(pattern, roles).ok())
            .collect();
        Self::new(rules)
    }

    pub fn with_unmatched_policy(mut self, policy: UnmatchedRoutePolicy) -> Self {
        self.unmatched = policy;
        self
    }

    pub fn unmatched_policy(&self) -> UnmatchedRoutePolicy {
        self.unmatched
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// First rule whose pattern matches the normalized path. Paths that do
    /// not decode match nothing.
    pub fn find(&self, path: &str) -> Option<&RouteRule> {
        let path = normalize_path(path)?;
        self.rules.iter().find(|rule| rule.pattern.matches(&path))
    }

    pub fn authorize(&self, path: &str, role: Role) -> RouteDecision {
        if normalize_path(path).is_none() {
            debug!(path, role = %role, "Undecodable path, redirecting home");
            return RouteDecision::RedirectHome(role);
        }

        match self.find(path) {
            Some(rule) if rule.allows(role) => RouteDecision::Allowed,
            Some(rule) => {
                debug!(path, role = %role, pattern = rule.pattern.as_str(), "Role not allowed on route");
                RouteDecision::RedirectHome(role)
            }
            None => match self.unmatched {
                UnmatchedRoutePolicy::Allow => {
                    debug!(path, role = %role, "No route rule matched, allowing");
                    RouteDecision::AllowedUnmatched
                }
                UnmatchedRoutePolicy::RedirectHome => {
                    debug!(path, role = %role, "No route rule matched, redirecting home");
                    RouteDecision::RedirectHome(role)
                }
            },
        }
    }
}

/// The path the router will see: query and fragment stripped, each segment
/// percent-decoded, repeated and trailing slashes dropped.
///
/// `None` when a segment is not UTF-8 after decoding or decodes to a `/`,
/// since such a path cannot be matched the way the router matches it.
pub fn normalize_path(path: &str) -> Option<String> {
    let path = path.split(['?', '#']).next().unwrap_or_default();

    let mut normalized = String::with_capacity(path.len() + 1);
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let decoded = percent_decode_str(segment).decode_utf8().ok()?;
        if decoded.contains('/') {
            return None;
        }
        normalized.push('/');
        normalized.push_str(&decoded);
    }

    if normalized.is_empty() {
        normalized.push('/');
    }
    Some(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/list/teachers/").as_deref(), Some("/list/teachers"));
        assert_eq!(normalize_path("//list///teachers").as_deref(), Some("/list/teachers"));
        assert_eq!(normalize_path("/list/teachers?page=2#top").as_deref(), Some("/list/teachers"));
        assert_eq!(normalize_path("/").as_deref(), Some("/"));
        assert_eq!(normalize_path("").as_deref(), Some("/"));
    }

    #[test]
    fn test_normalize_path_decodes_segments() {
        assert_eq!(normalize_path("/list/%74eachers").as_deref(), Some("/list/teachers"));
        assert_eq!(normalize_path("/LIST/%73ubjects/").as_deref(), Some("/LIST/subjects"));
        assert_eq!(normalize_path("/list/students/s%2D1").as_deref(), Some("/list/students/s-1"));
        assert_eq!(normalize_path("/list/students%2Fs-1"), None);
        assert_eq!(normalize_path("/list/%ff"), None);
    }

    #[test]
    fn test_encoded_path_hits_same_rule() {
        let table = RouteTable::school_default();
        assert_eq!(table.authorize("/list/%74eachers", Role::Student), RouteDecision::RedirectHome(Role::Student));
        assert_eq!(table.authorize("/list/%73ubjects", Role::Teacher), RouteDecision::RedirectHome(Role::Teacher));
        assert_eq!(table.authorize("/list/%73ubjects", Role::Admin), RouteDecision::Allowed);
    }

    #[test]
    fn test_undecodable_path_redirects_home_even_when_unmatched_allowed() {
        let table = RouteTable::school_default().with_unmatched_policy(UnmatchedRoutePolicy::Allow);
        assert_eq!(table.authorize("/list/%c3%28", Role::Parent), RouteDecision::RedirectHome(Role::Parent));
        assert_eq!(table.authorize("/list/teachers%2F..", Role::Admin), RouteDecision::RedirectHome(Role::Admin));
    }

    #[test]
    fn test_patterns_are_anchored() {
        let pattern = RoutePattern::new("/list/teachers").unwrap();
        assert!(pattern.matches("/list/teachers"));
        assert!(!pattern.matches("/list/teachers/t-1"));
        assert!(!pattern.matches("/x/list/teachers"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(matches!(
            RoutePattern::new("/broken(["),
            Err(RouteTableError::InvalidPattern { .. })
        ));
        assert!(matches!(RouteRule::new("/x", &[]), Err(RouteTableError::NoRoles(_))));
    }

    #[test]
    fn test_school_default_compiles_every_rule() {
        assert_eq!(RouteTable::school_default().rules().len(), SCHOOL_ROUTES.len());
        assert!(RouteTable::from_patterns(SCHOOL_ROUTES).is_ok());
    }

    #[test]
    fn test_role_mismatch_redirects_home() {
        let table = RouteTable::school_default();

        assert_eq!(
            table.authorize("/list/teachers", Role::Student),
            RouteDecision::RedirectHome(Role::Student)
        );
        assert_eq!(
            table.authorize("/admin/settings", Role::Parent),
            RouteDecision::RedirectHome(Role::Parent)
        );
        assert_eq!(table.authorize("/list/teachers", Role::Teacher), RouteDecision::Allowed);
        assert_eq!(table.authorize("/list/subjects", Role::Teacher), RouteDecision::RedirectHome(Role::Teacher));
    }

    #[test]
    fn test_every_role_reaches_only_its_own_dashboard() {
        let table = RouteTable::school_default();
        for role in Role::ALL {
            for other in Role::ALL {
                let decision = table.authorize(other.landing_path(), role);
                if role == other {
                    assert_eq!(decision, RouteDecision::Allowed);
                } else {
                    assert_eq!(decision, RouteDecision::RedirectHome(role));
                }
            }
        }
    }

    #[test]
    fn test_detail_pages_admit_every_role() {
        let table = RouteTable::school_default();
        for role in Role::ALL {
            assert_eq!(table.authorize("/list/students/s-9", role), RouteDecision::Allowed);
            assert_eq!(table.authorize("/list/teachers/t-9", role), RouteDecision::Allowed);
        }
    }

    #[test]
    fn test_first_match_wins() {
        let table = RouteTable::from_patterns(&[
            ("/reports/private", &[Role::Admin]),
            ("/reports(.*)", &Role::ALL),
        ])
        .unwrap();

        assert_eq!(
            table.authorize("/reports/private", Role::Teacher),
            RouteDecision::RedirectHome(Role::Teacher)
        );
        assert_eq!(table.authorize("/reports/weekly", Role::Teacher), RouteDecision::Allowed);
    }

    #[test]
    fn test_unmatched_policy() {
        let open = RouteTable::school_default();
        assert_eq!(open.authorize("/calendar", Role::Student), RouteDecision::AllowedUnmatched);

        let closed = RouteTable::school_default().with_unmatched_policy(UnmatchedRoutePolicy::RedirectHome);
        assert_eq!(
            closed.authorize("/calendar", Role::Student),
            RouteDecision::RedirectHome(Role::Student)
        );
        assert_eq!(closed.authorize("/list/students/s-1", Role::Parent), RouteDecision::Allowed);
    }

    #[test]
    fn test_policy_deserializes_snake_case() {
        let policy: UnmatchedRoutePolicy = serde_json::from_str("\"redirect_home\"").unwrap();
        assert_eq!(policy, UnmatchedRoutePolicy::RedirectHome);
    }
}
