//! Read-only projections for the instructor and student views.

use crate::model::{Credential, Student, StudentStatus, SubjectRecord};
use serde::Serialize;

/// One line of the instructor overview.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentSummary {
    /// Student id.
    pub id: String,
    /// Full name.
    pub name: String,
    /// Enrollment status.
    pub status: StudentStatus,
    /// Mean score, two decimals.
    pub average: f64,
    /// Passed subjects.
    pub passed: usize,
    /// Failed subjects.
    pub failed: usize,
}

impl From<&Student> for StudentSummary {
    fn from(student: &Student) -> Self {
        Self {
            id: student.id.clone(),
            name: student.name.clone(),
            status: student.status,
            average: student.average(),
            passed: student.passed_count(),
            failed: student.failed_count(),
        }
    }
}

/// Everything a student sees about themselves.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentView {
    /// Student id.
    pub id: String,
    /// Full name.
    pub name: String,
    /// Birth date.
    pub birth_date: String,
    /// Country of origin.
    pub nationality: String,
    /// Enrollment status.
    pub status: StudentStatus,
    /// Subject records in entry order.
    pub records: Vec<SubjectRecord>,
    /// Credentials in entry order.
    pub credentials: Vec<Credential>,
    /// Mean score, two decimals.
    pub average: f64,
    /// Passed subjects.
    pub passed: usize,
    /// Failed subjects.
    pub failed: usize,
}

impl From<&Student> for StudentView {
    fn from(student: &Student) -> Self {
        Self {
            id: student.id.clone(),
            name: student.name.clone(),
            birth_date: student.birth_date.clone(),
            nationality: student.nationality.clone(),
            status: student.status,
            records: student.records.clone(),
            credentials: student.credentials.clone(),
            average: student.average(),
            passed: student.passed_count(),
            failed: student.failed_count(),
        }
    }
}
