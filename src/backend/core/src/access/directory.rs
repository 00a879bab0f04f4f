//! Read-only view of the school records the gate needs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::error::Result;

/// The identity fields of a student that decide who may see the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentLink {
    pub student_id: String,
    pub class_id: i32,
    pub guardian_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSummary {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianSummary {
    pub id: String,
    pub name: String,
    pub surname: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub id: String,
    pub username: String,
    pub name: String,
    pub surname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<ClassSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guardian: Option<GuardianSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeacherProfile {
    pub id: String,
    pub username: String,
    pub name: String,
    pub surname: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<ClassSummary>,
}

/// Which relations to load alongside a student.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct StudentQuery {
    #[serde(default)]
    pub with_class: bool,
    #[serde(default)]
    pub with_guardian: bool,
}

impl StudentQuery {
    pub fn full() -> Self {
        Self {
            with_class: true,
            with_guardian: true,
        }
    }
}

/// Which relations to load alongside a teacher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TeacherQuery {
    #[serde(default)]
    pub with_subjects: bool,
    #[serde(default)]
    pub with_classes: bool,
}

impl TeacherQuery {
    pub fn full() -> Self {
        Self {
            with_subjects: true,
            with_classes: true,
        }
    }
}

/// Stored login credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub subject_id: String,
    pub role: Role,
    /// Argon2 PHC string
    pub password_hash: String,
}

/// Source of identity and relationship data.
///
/// Implementations must not cache across calls: a removed lesson has to
/// revoke a teacher's access on the very next request.
#[async_trait]
pub trait SchoolDirectory: Send + Sync {
    async fn student_link(&self, student_id: &str) -> Result<Option<StudentLink>>;

    /// True when at least one lesson of `class_id` is taught by `teacher_id`.
    async fn teaches_class(&self, teacher_id: &str, class_id: i32) -> Result<bool>;

    async fn student_profile(&self, student_id: &str, query: &StudentQuery) -> Result<Option<StudentProfile>>;

    async fn teacher_profile(&self, teacher_id: &str, query: &TeacherQuery) -> Result<Option<TeacherProfile>>;

    async fn credential(&self, username: &str) -> Result<Option<Credential>>;
}
