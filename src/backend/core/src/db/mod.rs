//! Database layer for Campus.
//!
//! Reads the school application's PostgreSQL tables with sqlx. The schema is
//! owned by the application's ORM, so table and column names are quoted in
//! their original casing and nothing here migrates.

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::{Duration, Instant};
use tracing::{error, warn};

use crate::access::{
    ClassSummary, Credential, GuardianSummary, SchoolDirectory, StudentLink, StudentProfile,
    StudentQuery, TeacherProfile, TeacherQuery,
};
use crate::auth::Role;
use crate::config::DatabaseConfig;
use crate::error::{CampusError, ErrorContext, Result};

/// Database connection and lookups.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Round-trip a trivial query.
    pub async fn ping(&self) -> Result<Duration> {
        let start = Instant::now();
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Database connectivity check failed");
                CampusError::from(e)
            })?;
        let latency = start.elapsed();
        if latency > Duration::from_millis(100) {
            warn!(latency_ms = latency.as_millis() as u64, "Database ping is slow");
        }
        Ok(latency)
    }

    async fn class_summary(&self, class_id: i32) -> Result<Option<ClassSummary>> {
        let row = sqlx::query_as::<_, ClassRow>(r#"SELECT id, name FROM "Class" WHERE id = $1"#)
            .bind(class_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl SchoolDirectory for Database {
    async fn student_link(&self, student_id: &str) -> Result<Option<StudentLink>> {
        let row = sqlx::query_as::<_, StudentLinkRow>(
            r#"
            SELECT id, "classId" AS class_id, "parentId" AS parent_id
            FROM "Student"
            WHERE id = $1
            "#,
        )
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| StudentLink {
            student_id: r.id,
            class_id: r.class_id,
            guardian_id: r.parent_id,
        }))
    }

    async fn teaches_class(&self, teacher_id: &str, class_id: i32) -> Result<bool> {
        let teaches = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM "Lesson" WHERE "teacherId" = $1 AND "classId" = $2
            )
            "#,
        )
        .bind(teacher_id)
        .bind(class_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(teaches)
    }

    async fn student_profile(&self, student_id: &str, query: &StudentQuery) -> Result<Option<StudentProfile>> {
        let Some(row) = sqlx::query_as::<_, StudentRow>(
            r#"
            SELECT id, username, name, surname, "classId" AS class_id, "parentId" AS parent_id
            FROM "Student"
            WHERE id = $1
            "#,
        )
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let class = if query.with_class {
            self.class_summary(row.class_id).await?
        } else {
            None
        };

        let guardian = if query.with_guardian {
            sqlx::query_as::<_, PersonRow>(r#"SELECT id, name, surname FROM "Parent" WHERE id = $1"#)
                .bind(&row.parent_id)
                .fetch_optional(&self.pool)
                .await?
                .map(|p| GuardianSummary {
                    id: p.id,
                    name: p.name,
                    surname: p.surname,
                })
        } else {
            None
        };

        Ok(Some(StudentProfile {
            id: row.id,
            username: row.username,
            name: row.name,
            surname: row.surname,
            class,
            guardian,
        }))
    }

    async fn teacher_profile(&self, teacher_id: &str, query: &TeacherQuery) -> Result<Option<TeacherProfile>> {
        let Some(row) = sqlx::query_as::<_, TeacherRow>(
            r#"SELECT id, username, name, surname FROM "Teacher" WHERE id = $1"#,
        )
        .bind(teacher_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let subjects = if query.with_subjects {
            sqlx::query_scalar::<_, String>(
                r#"
                SELECT DISTINCT s.name
                FROM "Subject" s
                JOIN "Lesson" l ON l."subjectId" = s.id
                WHERE l."teacherId" = $1
                ORDER BY s.name
                "#,
            )
            .bind(teacher_id)
            .fetch_all(&self.pool)
            .await?
        } else {
            Vec::new()
        };

        let classes = if query.with_classes {
            sqlx::query_as::<_, ClassRow>(
                r#"
                SELECT DISTINCT c.id, c.name
                FROM "Class" c
                JOIN "Lesson" l ON l."classId" = c.id
                WHERE l."teacherId" = $1
                ORDER BY c.id
                "#,
            )
            .bind(teacher_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Into::into)
            .collect()
        } else {
            Vec::new()
        };

        Ok(Some(TeacherProfile {
            id: row.id,
            username: row.username,
            name: row.name,
            surname: row.surname,
            subjects,
            classes,
        }))
    }

    async fn credential(&self, username: &str) -> Result<Option<Credential>> {
        let Some(row) = sqlx::query_as::<_, CredentialRow>(
            r#"
            SELECT username, "subjectId" AS subject_id, role, "passwordHash" AS password_hash
            FROM "Credential"
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let role = Role::parse(&row.role).context(format!("credential {} has a bad role", row.username))?;

        Ok(Some(Credential {
            username: row.username,
            subject_id: row.subject_id,
            role,
            password_hash: row.password_hash,
        }))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Row Types
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, sqlx::FromRow)]
pub struct StudentLinkRow {
    pub id: String,
    pub class_id: i32,
    pub parent_id: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct StudentRow {
    pub id: String,
    pub username: String,
    pub name: String,
    pub surname: String,
    pub class_id: i32,
    pub parent_id: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct TeacherRow {
    pub id: String,
    pub username: String,
    pub name: String,
    pub surname: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct PersonRow {
    pub id: String,
    pub name: String,
    pub surname: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ClassRow {
    pub id: i32,
    pub name: String,
}

impl From<ClassRow> for ClassSummary {
    fn from(row: ClassRow) -> Self {
        Self { id: row.id, name: row.name }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct CredentialRow {
    pub username: String,
    pub subject_id: String,
    pub role: String,
    pub password_hash: String,
}
