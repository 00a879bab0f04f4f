//! Per-entity access checks for individually addressed records.
//!
//! Whole-page authorization ([`crate::auth::RouteTable`]) decides whether a
//! role may open a kind of page at all. This module decides whether a
//! particular caller may see one particular student or teacher record:
//!
//! | caller  | target  | visible when                                     |
//! |---------|---------|--------------------------------------------------|
//! | admin   | any     | always                                           |
//! | student | student | same id                                          |
//! | teacher | teacher | same id                                          |
//! | teacher | student | a lesson of the student's class is theirs        |
//! | parent  | student | they are the student's guardian                  |
//!
//! Anything else is hidden, and a hidden record is reported exactly like a
//! missing one.

pub mod directory;
pub mod memory;

pub use directory::{
    ClassSummary, Credential, GuardianSummary, SchoolDirectory, StudentLink, StudentProfile,
    StudentQuery, TeacherProfile, TeacherQuery,
};
pub use memory::InMemoryDirectory;

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::auth::{Role, SessionClaim};
use crate::error::{CampusError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Student,
    Teacher,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The record being asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityRef {
    pub fn student(id: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Student,
            id: id.into(),
        }
    }

    pub fn teacher(id: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Teacher,
            id: id.into(),
        }
    }
}

/// The verified identity asking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: String,
    pub role: Role,
}

impl Caller {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), role }
    }
}

impl From<&SessionClaim> for Caller {
    fn from(claim: &SessionClaim) -> Self {
        Self::new(claim.sub.clone(), claim.role)
    }
}

/// Why a caller may see a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    Admin,
    SelfRecord,
    Guardian,
    AssignedTeacher,
}

/// Find the relationship that lets `caller` see `target`, if any.
///
/// Hits the directory at most twice and never caches.
pub async fn resolve_relationship(
    directory: &dyn SchoolDirectory,
    caller: &Caller,
    target: &EntityRef,
) -> Result<Option<Relationship>> {
    let relationship = match (caller.role, target.kind) {
        (Role::Admin, _) => Some(Relationship::Admin),

        (Role::Student, EntityKind::Student) | (Role::Teacher, EntityKind::Teacher) => {
            (caller.id == target.id).then_some(Relationship::SelfRecord)
        }

        (Role::Teacher, EntityKind::Student) => match directory.student_link(&target.id).await? {
            Some(link) if directory.teaches_class(&caller.id, link.class_id).await? => {
                Some(Relationship::AssignedTeacher)
            }
            _ => None,
        },

        (Role::Parent, EntityKind::Student) => directory
            .student_link(&target.id)
            .await?
            .filter(|link| link.guardian_id == caller.id)
            .map(|_| Relationship::Guardian),

        (Role::Student, EntityKind::Teacher) | (Role::Parent, EntityKind::Teacher) => None,
    };

    Ok(relationship)
}

pub async fn can_view(directory: &dyn SchoolDirectory, caller: &Caller, target: &EntityRef) -> Result<bool> {
    Ok(resolve_relationship(directory, caller, target).await?.is_some())
}

/// Like [`can_view`], but a denial becomes an error that renders as 404.
pub async fn ensure_visible(
    directory: &dyn SchoolDirectory,
    caller: &Caller,
    target: &EntityRef,
) -> Result<Relationship> {
    match resolve_relationship(directory, caller, target).await {
        Ok(Some(relationship)) => {
            counter!("campus_entity_checks_total", "result" => "allowed").increment(1);
            debug!(
                caller = %caller.id,
                role = %caller.role,
                kind = %target.kind,
                target = %target.id,
                relationship = ?relationship,
                "Entity access granted"
            );
            Ok(relationship)
        }
        Ok(None) => {
            counter!("campus_entity_checks_total", "result" => "denied").increment(1);
            warn!(
                caller = %caller.id,
                role = %caller.role,
                kind = %target.kind,
                target = %target.id,
                "Entity access denied"
            );
            Err(CampusError::entity_hidden(target.kind.as_str(), &target.id))
        }
        Err(e) => {
            counter!("campus_entity_checks_total", "result" => "error").increment(1);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn school() -> InMemoryDirectory {
        let directory = InMemoryDirectory::new();
        directory
            .insert_class(1, "1A")
            .insert_parent("p-1", "Ana", "Diaz")
            .insert_parent("p-2", "Ben", "Okafor")
            .insert_teacher("t-1", "Tom", "Reyes")
            .insert_teacher("t-2", "Uma", "Singh")
            .insert_student("s-1", 1, "p-1")
            .insert_student("s-2", 1, "p-2");
        directory.add_lesson("t-1", 1, "Math");
        directory
    }

    #[tokio::test]
    async fn test_admin_sees_everything() {
        let directory = school();
        let admin = Caller::new("a-1", Role::Admin);

        for target in [EntityRef::student("s-1"), EntityRef::teacher("t-2"), EntityRef::student("nobody")] {
            assert_eq!(
                resolve_relationship(&directory, &admin, &target).await.unwrap(),
                Some(Relationship::Admin)
            );
        }
    }

    #[tokio::test]
    async fn test_student_sees_only_self() {
        let directory = school();
        let student = Caller::new("s-1", Role::Student);

        assert_eq!(
            resolve_relationship(&directory, &student, &EntityRef::student("s-1")).await.unwrap(),
            Some(Relationship::SelfRecord)
        );
        assert!(!can_view(&directory, &student, &EntityRef::student("s-2")).await.unwrap());
        assert!(!can_view(&directory, &student, &EntityRef::teacher("t-1")).await.unwrap());
    }

    #[tokio::test]
    async fn test_teacher_follows_lessons() {
        let directory = school();
        let t1 = Caller::new("t-1", Role::Teacher);
        let t2 = Caller::new("t-2", Role::Teacher);

        assert_eq!(
            resolve_relationship(&directory, &t1, &EntityRef::student("s-2")).await.unwrap(),
            Some(Relationship::AssignedTeacher)
        );
        assert!(!can_view(&directory, &t2, &EntityRef::student("s-2")).await.unwrap());
        assert!(can_view(&directory, &t2, &EntityRef::teacher("t-2")).await.unwrap());
        assert!(!can_view(&directory, &t2, &EntityRef::teacher("t-1")).await.unwrap());

        directory.remove_lessons_for("t-1", 1);
        assert!(!can_view(&directory, &t1, &EntityRef::student("s-2")).await.unwrap());
    }

    #[tokio::test]
    async fn test_parent_sees_own_child() {
        let directory = school();
        let parent = Caller::new("p-1", Role::Parent);

        assert_eq!(
            resolve_relationship(&directory, &parent, &EntityRef::student("s-1")).await.unwrap(),
            Some(Relationship::Guardian)
        );
        assert!(!can_view(&directory, &parent, &EntityRef::student("s-2")).await.unwrap());
        assert!(!can_view(&directory, &parent, &EntityRef::teacher("t-1")).await.unwrap());
        assert!(!can_view(&directory, &parent, &EntityRef::student("missing")).await.unwrap());
    }

    #[tokio::test]
    async fn test_denial_looks_like_missing_record() {
        let directory = school();
        let parent = Caller::new("p-1", Role::Parent);

        let err = ensure_visible(&directory, &parent, &EntityRef::student("s-2"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::EntityForbidden);
        assert_eq!(err.http_status(), axum::http::StatusCode::NOT_FOUND);
    }
}
