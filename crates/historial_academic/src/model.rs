//! Students, their subject records and credentials.
//!
//! These are plain in-memory entities. They know nothing about storage;
//! [`crate::rehydrate`] converts them to and from stored records.

use serde::Serialize;
use std::fmt;

/// Lowest score that passes a subject.
pub const PASS_THRESHOLD: f64 = 6.0;

/// Enrollment status of a student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentStatus {
    /// Currently enrolled.
    Active,
    /// Not enrolled. New students start here.
    #[default]
    Inactive,
}

impl StudentStatus {
    /// Stored form: `"active"` or `"inactive"`.
    pub fn as_str(self) -> &'static str {
        match self {
            StudentStatus::Active => "active",
            StudentStatus::Inactive => "inactive",
        }
    }

    /// Parses the stored form. Only the exact text `"active"` is active;
    /// anything else, including other casings, is inactive and is written
    /// back as `"inactive"` on the next save.
    pub fn parse(text: &str) -> Self {
        if text == "active" {
            StudentStatus::Active
        } else {
            StudentStatus::Inactive
        }
    }
}

impl fmt::Display for StudentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A graded subject.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectRecord {
    /// Subject name.
    pub name: String,
    /// Numeric score.
    pub score: f64,
    /// Whether the subject was passed.
    pub passed: bool,
}

impl SubjectRecord {
    /// Creates a record with an explicit pass flag, which may disagree
    /// with the score.
    pub fn new(name: impl Into<String>, score: f64, passed: bool) -> Self {
        Self {
            name: name.into(),
            score,
            passed,
        }
    }

    /// Creates a record whose pass flag follows the score.
    pub fn graded(name: impl Into<String>, score: f64) -> Self {
        Self::new(name, score, score >= PASS_THRESHOLD)
    }

    /// Replaces the score and re-derives the pass flag.
    pub fn set_score(&mut self, score: f64) {
        self.score = score;
        self.passed = score >= PASS_THRESHOLD;
    }
}

/// A title, diploma or certification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credential {
    /// Official title.
    pub title: String,
    /// Date obtained, as entered.
    pub obtained_on: String,
    /// Distinction such as "cum laude".
    pub note: Option<String>,
}

impl Credential {
    /// Creates a credential.
    pub fn new(
        title: impl Into<String>,
        obtained_on: impl Into<String>,
        note: Option<String>,
    ) -> Self {
        Self {
            title: title.into(),
            obtained_on: obtained_on.into(),
            note,
        }
    }
}

/// A student and their academic history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Student {
    /// Identity document number; unique.
    pub id: String,
    /// Full name.
    pub name: String,
    /// Birth date, as entered.
    pub birth_date: String,
    /// Country of origin.
    pub nationality: String,
    /// Enrollment status.
    pub status: StudentStatus,
    /// Subject records in entry order.
    pub records: Vec<SubjectRecord>,
    /// Credentials in entry order.
    pub credentials: Vec<Credential>,
}

impl Student {
    /// Creates an inactive student with no records.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        birth_date: impl Into<String>,
        nationality: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            birth_date: birth_date.into(),
            nationality: nationality.into(),
            status: StudentStatus::Inactive,
            records: Vec::new(),
            credentials: Vec::new(),
        }
    }

    /// Marks the student active.
    pub fn activate(&mut self) {
        self.status = StudentStatus::Active;
    }

    /// Marks the student inactive.
    pub fn deactivate(&mut self) {
        self.status = StudentStatus::Inactive;
    }

    /// Whether the student is active.
    pub fn is_active(&self) -> bool {
        self.status == StudentStatus::Active
    }

    /// Appends a subject record as given.
    pub fn add_record(&mut self, record: SubjectRecord) {
        self.records.push(record);
    }

    /// Appends a credential.
    pub fn add_credential(&mut self, credential: Credential) {
        self.credentials.push(credential);
    }

    /// Mean score rounded to two decimals; 0 without records.
    pub fn average(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        let total: f64 = self.records.iter().map(|r| r.score).sum();
        #[allow(clippy::cast_precision_loss)]
        let mean = total / self.records.len() as f64;
        (mean * 100.0).round() / 100.0
    }

    /// Number of passed subjects.
    pub fn passed_count(&self) -> usize {
        self.records.iter().filter(|r| r.passed).count()
    }

    /// Number of failed subjects.
    pub fn failed_count(&self) -> usize {
        self.records.iter().filter(|r| !r.passed).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_students_start_inactive_and_empty() {
        let student = Student::new("123", "Ana", "2001-04-02", "AR");
        assert_eq!(student.status, StudentStatus::Inactive);
        assert!(!student.is_active());
        assert!(student.records.is_empty());
        assert!(student.credentials.is_empty());
    }

    #[test]
    fn status_toggles() {
        let mut student = Student::new("1", "Ana", "", "");
        student.activate();
        assert!(student.is_active());
        student.deactivate();
        assert!(!student.is_active());
    }

    #[test]
    fn average_is_zero_without_records() {
        assert_eq!(Student::new("1", "Ana", "", "").average(), 0.0);
    }

    #[test]
    fn average_rounds_to_two_decimals() {
        let mut student = Student::new("1", "Ana", "", "");
        student.add_record(SubjectRecord::graded("Math", 7.0));
        student.add_record(SubjectRecord::graded("History", 8.0));
        student.add_record(SubjectRecord::graded("Art", 8.0));
        assert_eq!(student.average(), 7.67);
    }

    #[test]
    fn counts_follow_the_flag_not_the_score() {
        let mut student = Student::new("1", "Ana", "", "");
        student.add_record(SubjectRecord::new("Math", 9.0, false));
        student.add_record(SubjectRecord::graded("Art", 6.0));
        student.add_record(SubjectRecord::graded("Music", 5.99));
        assert_eq!(student.passed_count(), 1);
        assert_eq!(student.failed_count(), 2);
    }

    #[test]
    fn set_score_rederives_pass_flag() {
        let mut record = SubjectRecord::new("Math", 4.0, true);
        record.set_score(4.5);
        assert!(!record.passed);
        record.set_score(PASS_THRESHOLD);
        assert!(record.passed);
    }

    #[test]
    fn status_parse_accepts_only_exact_active() {
        assert_eq!(StudentStatus::parse("active"), StudentStatus::Active);
        assert_eq!(StudentStatus::parse("ACTIVE"), StudentStatus::Inactive);
        assert_eq!(StudentStatus::parse(" active"), StudentStatus::Inactive);
        assert_eq!(StudentStatus::parse("inactive"), StudentStatus::Inactive);
        assert_eq!(StudentStatus::parse("suspended"), StudentStatus::Inactive);
    }
}
