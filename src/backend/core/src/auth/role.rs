//! The four dashboard roles.
//!
//! | Role    | Landing    |
//! |---------|------------|
//! | Admin   | `/admin`   |
//! | Teacher | `/teacher` |
//! | Student | `/student` |
//! | Parent  | `/parent`  |

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown role: {0:?}")]
pub struct RoleParseError(pub String);

/// Caller role. Raw role strings are parsed once, at the auth boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Teacher,
    Student,
    Parent,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Teacher, Role::Student, Role::Parent];

    /// Parse a role name, ignoring case and surrounding whitespace.
    pub fn parse(raw: &str) -> Result<Self, RoleParseError> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "admin" => Ok(Self::Admin),
            "teacher" => Ok(Self::Teacher),
            "student" => Ok(Self::Student),
            "parent" => Ok(Self::Parent),
            _ => Err(RoleParseError(raw.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Teacher => "teacher",
            Self::Student => "student",
            Self::Parent => "parent",
        }
    }

    /// The role's own dashboard.
    pub fn landing_path(&self) -> &'static str {
        match self {
            Self::Admin => "/admin",
            Self::Teacher => "/teacher",
            Self::Student => "/student",
            Self::Parent => "/parent",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Role::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(Role::parse("Student").unwrap(), Role::Student);
        assert_eq!(Role::parse("student").unwrap(), Role::Student);
        assert_eq!(Role::parse(" ADMIN ").unwrap(), Role::Admin);
        assert!(Role::parse("principal").is_err());
        assert!(Role::parse("").is_err());
    }

    #[test]
    fn test_landing_paths() {
        for role in Role::ALL {
            assert_eq!(role.landing_path(), format!("/{}", role));
        }
    }

    #[test]
    fn test_serde_round_trip_normalizes() {
        let role: Role = serde_json::from_str("\"Teacher\"").unwrap();
        assert_eq!(role, Role::Teacher);
        assert_eq!(serde_json::to_string(&role).unwrap(), "\"teacher\"");
    }
}
