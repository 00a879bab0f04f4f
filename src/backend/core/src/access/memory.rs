//! Process-local directory for tests and demos.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeSet;

use super::directory::{
    ClassSummary, Credential, GuardianSummary, SchoolDirectory, StudentLink, StudentProfile,
    StudentQuery, TeacherProfile, TeacherQuery,
};
use crate::auth::password::hash_password;
use crate::auth::Role;
use crate::error::Result;

#[derive(Debug, Clone)]
struct Person {
    username: String,
    name: String,
    surname: String,
}

#[derive(Debug, Clone)]
struct Lesson {
    teacher_id: String,
    class_id: i32,
    subject: String,
}

/// In-memory [`SchoolDirectory`]. Every read sees the latest mutation.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    students: DashMap<String, (Person, StudentLink)>,
    teachers: DashMap<String, Person>,
    parents: DashMap<String, Person>,
    classes: DashMap<i32, String>,
    lessons: DashMap<u64, Lesson>,
    credentials: DashMap<String, Credential>,
    next_lesson: std::sync::atomic::AtomicU64,
}

fn person(username: &str, name: &str, surname: &str) -> Person {
    Person {
        username: username.to_string(),
        name: name.to_string(),
        surname: surname.to_string(),
    }
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_class(&self, class_id: i32, name: &str) -> &Self {
        self.classes.insert(class_id, name.to_string());
        self
    }

    pub fn insert_parent(&self, id: &str, name: &str, surname: &str) -> &Self {
        self.parents.insert(id.to_string(), person(id, name, surname));
        self
    }

    pub fn insert_teacher(&self, id: &str, name: &str, surname: &str) -> &Self {
        self.teachers.insert(id.to_string(), person(id, name, surname));
        self
    }

    pub fn insert_student(&self, id: &str, class_id: i32, guardian_id: &str) -> &Self {
        let link = StudentLink {
            student_id: id.to_string(),
            class_id,
            guardian_id: guardian_id.to_string(),
        };
        self.students.insert(id.to_string(), (person(id, id, ""), link));
        self
    }

    pub fn remove_student(&self, id: &str) -> bool {
        self.students.remove(id).is_some()
    }

    /// Record a lesson and return its id.
    pub fn add_lesson(&self, teacher_id: &str, class_id: i32, subject: &str) -> u64 {
        let id = self
            .next_lesson
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.lessons.insert(
            id,
            Lesson {
                teacher_id: teacher_id.to_string(),
                class_id,
                subject: subject.to_string(),
            },
        );
        id
    }

    pub fn remove_lesson(&self, lesson_id: u64) -> bool {
        self.lessons.remove(&lesson_id).is_some()
    }

    /// Remove every lesson `teacher_id` gives to `class_id`.
    pub fn remove_lessons_for(&self, teacher_id: &str, class_id: i32) -> usize {
        let mut removed = 0;
        self.lessons.retain(|_, lesson| {
            let hit = lesson.teacher_id == teacher_id && lesson.class_id == class_id;
            removed += usize::from(hit);
            !hit
        });
        removed
    }

    /// Store a login; the password is hashed with argon2.
    pub fn insert_credential(&self, username: &str, subject_id: &str, role: Role, password: &str) -> Result<()> {
        let credential = Credential {
            username: username.to_string(),
            subject_id: subject_id.to_string(),
            role,
            password_hash: hash_password(password)?,
        };
        self.credentials.insert(username.to_string(), credential);
        Ok(())
    }

    fn class_summary(&self, class_id: i32) -> Option<ClassSummary> {
        self.classes.get(&class_id).map(|name| ClassSummary {
            id: class_id,
            name: name.clone(),
        })
    }
}

#[async_trait]
impl SchoolDirectory for InMemoryDirectory {
    async fn student_link(&self, student_id: &str) -> Result<Option<StudentLink>> {
        Ok(self.students.get(student_id).map(|entry| entry.1.clone()))
    }

    async fn teaches_class(&self, teacher_id: &str, class_id: i32) -> Result<bool> {
        Ok(self
            .lessons
            .iter()
            .any(|lesson| lesson.teacher_id == teacher_id && lesson.class_id == class_id))
    }

    async fn student_profile(&self, student_id: &str, query: &StudentQuery) -> Result<Option<StudentProfile>> {
        let Some(entry) = self.students.get(student_id) else {
            return Ok(None);
        };
        let (person, link) = entry.value();

        let class = if query.with_class {
            self.class_summary(link.class_id)
        } else {
            None
        };
        let guardian = if query.with_guardian {
            self.parents.get(&link.guardian_id).map(|parent| GuardianSummary {
                id: link.guardian_id.clone(),
                name: parent.name.clone(),
                surname: parent.surname.clone(),
            })
        } else {
            None
        };

        Ok(Some(StudentProfile {
            id: student_id.to_string(),
            username: person.username.clone(),
            name: person.name.clone(),
            surname: person.surname.clone(),
            class,
            guardian,
        }))
    }

    async fn teacher_profile(&self, teacher_id: &str, query: &TeacherQuery) -> Result<Option<TeacherProfile>> {
        let Some(teacher) = self.teachers.get(teacher_id) else {
            return Ok(None);
        };

        let mut subjects = Vec::new();
        let mut class_ids = BTreeSet::new();
        for lesson in self.lessons.iter().filter(|l| l.teacher_id == teacher_id) {
            if query.with_subjects && !subjects.contains(&lesson.subject) {
                subjects.push(lesson.subject.clone());
            }
            class_ids.insert(lesson.class_id);
        }

        let classes: Vec<ClassSummary> = if query.with_classes {
            class_ids.iter().filter_map(|id| self.class_summary(*id)).collect()
        } else {
            Vec::new()
        };
        subjects.sort();

        Ok(Some(TeacherProfile {
            id: teacher_id.to_string(),
            username: teacher.username.clone(),
            name: teacher.name.clone(),
            surname: teacher.surname.clone(),
            subjects,
            classes,
        }))
    }

    async fn credential(&self, username: &str) -> Result<Option<Credential>> {
        Ok(self.credentials.get(username).map(|c| c.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lessons_drive_teaches_class() {
        let directory = InMemoryDirectory::new();
        let lesson = directory.add_lesson("t-1", 4, "Math");

        assert!(directory.teaches_class("t-1", 4).await.unwrap());
        assert!(!directory.teaches_class("t-1", 5).await.unwrap());

        assert!(directory.remove_lesson(lesson));
        assert!(!directory.teaches_class("t-1", 4).await.unwrap());
    }

    #[test]
    fn test_lesson_removal_counts_only_its_own_rows_under_concurrent_adds() {
        let directory = std::sync::Arc::new(InMemoryDirectory::new());
        for class_id in 0..50 {
            directory.add_lesson("t-1", class_id % 2, "Math");
        }

        let writer = {
            let directory = directory.clone();
            std::thread::spawn(move || {
                for class_id in 0..2_000 {
                    directory.add_lesson("t-2", class_id, "Art");
                }
            })
        };

        let removed = directory.remove_lessons_for("t-1", 0) + directory.remove_lessons_for("t-1", 1);
        writer.join().unwrap();

        assert_eq!(removed, 50);
        assert_eq!(directory.remove_lessons_for("t-1", 0), 0);
    }

    #[tokio::test]
    async fn test_profiles_honor_query_options() {
        let directory = InMemoryDirectory::new();
        directory
            .insert_class(4, "4A")
            .insert_parent("p-1", "Ana", "Diaz")
            .insert_teacher("t-1", "Tom", "Reyes")
            .insert_student("s-1", 4, "p-1");
        directory.add_lesson("t-1", 4, "Math");
        directory.add_lesson("t-1", 4, "Physics");

        let bare = directory.student_profile("s-1", &StudentQuery::default()).await.unwrap().unwrap();
        assert!(bare.class.is_none() && bare.guardian.is_none());

        let full = directory.student_profile("s-1", &StudentQuery::full()).await.unwrap().unwrap();
        assert_eq!(full.class.unwrap().name, "4A");
        assert_eq!(full.guardian.unwrap().surname, "Diaz");

        let teacher = directory.teacher_profile("t-1", &TeacherQuery::full()).await.unwrap().unwrap();
        assert_eq!(teacher.subjects, vec!["Math".to_string(), "Physics".to_string()]);
        assert_eq!(teacher.classes.len(), 1);

        assert!(directory.teacher_profile("t-404", &TeacherQuery::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_lessons_for() {
        let directory = InMemoryDirectory::new();
        directory.add_lesson("t-1", 4, "Math");
        directory.add_lesson("t-1", 4, "Art");
        directory.add_lesson("t-2", 4, "Music");

        assert_eq!(directory.remove_lessons_for("t-1", 4), 2);
        assert!(directory.teaches_class("t-2", 4).await.unwrap());
    }
}
