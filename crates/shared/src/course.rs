//! Course records: parsed syllabi, class groups and match results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata extracted from an uploaded syllabus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyllabusData {
    #[serde(default)]
    pub class_code: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub instructor: String,
    #[serde(default)]
    pub instructor_email: String,
    #[serde(default)]
    pub university: String,
    #[serde(default)]
    pub term: String,
    #[serde(default)]
    pub assignments: Vec<AssignmentItem>,
}

impl SyllabusData {
    /// True when none of the identifying fields were found.
    pub fn is_empty(&self) -> bool {
        self.class_code.is_empty()
            && self.class_name.is_empty()
            && self.instructor.is_empty()
            && self.university.is_empty()
            && self.term.is_empty()
    }

    /// Fill blank fields from `other`, keeping what is already set.
    pub fn fill_from(&mut self, other: &SyllabusData) {
        fn fill(dst: &mut String, src: &str) {
            if dst.trim().is_empty() && !src.trim().is_empty() {
                *dst = src.to_string();
            }
        }
        fill(&mut self.class_code, &other.class_code);
        fill(&mut self.class_name, &other.class_name);
        fill(&mut self.instructor, &other.instructor);
        fill(&mut self.instructor_email, &other.instructor_email);
        fill(&mut self.university, &other.university);
        fill(&mut self.term, &other.term);
        if self.assignments.is_empty() {
            self.assignments = other.assignments.clone();
        }
    }
}

/// A dated item (assignment, exam, quiz) found in a syllabus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentItem {
    pub title: String,
    #[serde(default)]
    pub due_date: Option<String>,
}

/// Shared chat room for students of one course section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassGroup {
    pub id: String,
    pub class_code: String,
    pub class_name: String,
    pub university: String,
    pub term: String,
    pub instructor: String,
    pub members: Vec<String>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

impl ClassGroup {
    /// New public group seeded from a syllabus, with `owner` as first member.
    pub fn from_syllabus(syllabus: &SyllabusData, owner: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            class_code: syllabus.class_code.clone(),
            class_name: syllabus.class_name.clone(),
            university: syllabus.university.clone(),
            term: syllabus.term.clone(),
            instructor: syllabus.instructor.clone(),
            members: vec![owner.to_string()],
            is_public: true,
            created_at: Utc::now(),
        }
    }
}

/// An existing group scored against an uploaded syllabus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassMatch {
    pub group_id: String,
    pub class_code: String,
    pub class_name: String,
    pub score: u32,
}
