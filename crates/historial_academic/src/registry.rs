//! Commands behind the instructor and student views.

use crate::error::{AcademicError, AcademicResult};
use crate::model::{Credential, Student, StudentStatus, SubjectRecord};
use crate::repository::StudentRepository;
use crate::views::{StudentSummary, StudentView};

/// Changes to a student's profile. `None` fields are left as they are.
#[derive(Debug, Clone, Default)]
pub struct ProfileEdit {
    /// New id.
    pub id: Option<String>,
    /// New name.
    pub name: Option<String>,
    /// New birth date.
    pub birth_date: Option<String>,
    /// New nationality.
    pub nationality: Option<String>,
    /// New status.
    pub status: Option<StudentStatus>,
}

/// The loaded students plus the one currently being worked on.
///
/// Commands mutate the in-memory students first and then persist. A failed
/// save or delete is logged by the repository and the in-memory change is
/// kept; only validation failures are returned.
#[derive(Debug)]
pub struct Registry {
    repository: StudentRepository,
    students: Vec<Student>,
    selected: Option<String>,
}

impl Registry {
    /// Loads every student from `repository`.
    pub async fn load(repository: StudentRepository) -> Self {
        let students = repository.load_all().await;
        Self {
            repository,
            students,
            selected: None,
        }
    }

    /// The backing repository.
    pub fn repository(&self) -> &StudentRepository {
        &self.repository
    }

    /// Loaded students.
    pub fn students(&self) -> &[Student] {
        &self.students
    }

    /// A loaded student by id.
    pub fn student(&self, id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == id)
    }

    /// The selected student.
    pub fn selected(&self) -> Option<&Student> {
        self.selected.as_deref().and_then(|id| self.student(id))
    }

    /// Replaces the loaded students with what is stored.
    pub async fn reload(&mut self) {
        self.students = self.repository.load_all().await;
        if self.selected().is_none() {
            self.selected = None;
        }
    }

    /// Registers a new student and marks them active.
    ///
    /// # Errors
    ///
    /// [`AcademicError::DuplicateId`] if the id is taken.
    pub async fn register(&mut self, mut student: Student) -> AcademicResult<()> {
        if self.student(&student.id).is_some() {
            return Err(AcademicError::DuplicateId { id: student.id });
        }
        student.activate();
        tracing::info!(id = %student.id, name = %student.name, "registering student");
        self.students.push(student);
        self.persist(self.students.len() - 1).await;
        Ok(())
    }

    /// Edits a profile. Changing the id deletes the record stored under
    /// the old one before the student is saved under the new one.
    pub async fn edit_profile(&mut self, id: &str, edit: ProfileEdit) -> AcademicResult<()> {
        let position = self.position(id)?;
        let new_id = edit.id.filter(|new_id| new_id != id);
        if let Some(new_id) = &new_id {
            if self.student(new_id).is_some() {
                return Err(AcademicError::DuplicateId { id: new_id.clone() });
            }
            // Failure is logged by the repository; the rename goes ahead.
            let _ = self.repository.delete(id).await;
            if self.selected.as_deref() == Some(id) {
                self.selected = Some(new_id.clone());
            }
        }

        let student = &mut self.students[position];
        if let Some(new_id) = new_id {
            student.id = new_id;
        }
        if let Some(name) = edit.name {
            student.name = name;
        }
        if let Some(birth_date) = edit.birth_date {
            student.birth_date = birth_date;
        }
        if let Some(nationality) = edit.nationality {
            student.nationality = nationality;
        }
        if let Some(status) = edit.status {
            student.status = status;
        }
        self.persist(position).await;
        Ok(())
    }

    /// Activates or deactivates a student.
    pub async fn set_status(&mut self, id: &str, status: StudentStatus) -> AcademicResult<()> {
        let position = self.position(id)?;
        self.students[position].status = status;
        self.persist(position).await;
        Ok(())
    }

    /// Removes a student from memory and storage and clears the selection.
    pub async fn remove(&mut self, id: &str) -> AcademicResult<Student> {
        let position = self.position(id)?;
        let _ = self.repository.delete(id).await;
        self.selected = None;
        tracing::info!(id, "student removed");
        Ok(self.students.remove(position))
    }

    /// Selects the student later commands act on.
    pub fn select(&mut self, id: &str) -> AcademicResult<&Student> {
        let position = self.position(id)?;
        self.selected = Some(id.to_string());
        Ok(&self.students[position])
    }

    /// Clears the selection.
    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// Adds a subject record to the selected student with the pass flag
    /// as given.
    pub async fn add_record(&mut self, record: SubjectRecord) -> AcademicResult<()> {
        check_score(record.score)?;
        let position = self.selected_position()?;
        self.students[position].add_record(record);
        self.persist(position).await;
        Ok(())
    }

    /// Grades a subject for the selected student, deriving the pass flag
    /// from the score.
    pub async fn grade(&mut self, subject: &str, score: f64) -> AcademicResult<()> {
        self.add_record(SubjectRecord::graded(subject, score)).await
    }

    /// Corrects the score of the selected student's record at `index` and
    /// re-derives its pass flag.
    pub async fn edit_score(&mut self, index: usize, score: f64) -> AcademicResult<()> {
        check_score(score)?;
        let position = self.selected_position()?;
        let records = &mut self.students[position].records;
        let len = records.len();
        records
            .get_mut(index)
            .ok_or(AcademicError::RecordIndex { index, len })?
            .set_score(score);
        self.persist(position).await;
        Ok(())
    }

    /// Adds a credential to the selected student.
    pub async fn add_credential(&mut self, credential: Credential) -> AcademicResult<()> {
        let position = self.selected_position()?;
        self.students[position].add_credential(credential);
        self.persist(position).await;
        Ok(())
    }

    /// Summary line per loaded student.
    pub fn instructor_overview(&self) -> Vec<StudentSummary> {
        self.students.iter().map(StudentSummary::from).collect()
    }

    /// Full view of one student.
    pub fn student_view(&self, id: &str) -> AcademicResult<StudentView> {
        self.student(id)
            .map(StudentView::from)
            .ok_or_else(|| AcademicError::unknown_student(id))
    }

    fn position(&self, id: &str) -> AcademicResult<usize> {
        self.students
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| AcademicError::unknown_student(id))
    }

    fn selected_position(&self) -> AcademicResult<usize> {
        let id = self.selected.as_deref().ok_or(AcademicError::NoSelection)?;
        self.position(id)
    }

    async fn persist(&self, position: usize) {
        let student = &self.students[position];
        if self.repository.save(student).await.is_err() {
            tracing::warn!(id = %student.id, "change kept in memory only");
        }
    }
}

fn check_score(score: f64) -> AcademicResult<()> {
    if score.is_finite() {
        Ok(())
    } else {
        Err(AcademicError::InvalidScore { score })
    }
}
