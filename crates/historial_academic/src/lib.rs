//! # Historial Academic
//!
//! Students, their grades and credentials, kept in a Historial record
//! database.
//!
//! - [`model`]: the entities and their derived figures
//! - [`rehydrate`]: flattening students into stored records and back
//! - [`StudentRepository`]: typed load, save and delete
//! - [`Registry`]: the commands and views the presentation layer calls
//!
//! ## Example
//!
//! ```rust
//! use historial_academic::{RecordsConfig, Registry, Student, StudentRepository};
//! use historial_core::Factory;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> historial_academic::AcademicResult<()> {
//! let repository = StudentRepository::new(Factory::in_memory(), &RecordsConfig::default());
//! let mut registry = Registry::load(repository).await;
//!
//! registry.register(Student::new("123", "Ana", "2001-04-02", "AR")).await?;
//! registry.select("123")?;
//! registry.grade("Math", 8.0).await?;
//!
//! let view = registry.student_view("123")?;
//! assert_eq!(view.passed, 1);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
pub mod model;
pub mod rehydrate;
mod registry;
mod repository;
mod views;

pub use config::RecordsConfig;
pub use error::{AcademicError, AcademicResult};
pub use model::{Credential, Student, StudentStatus, SubjectRecord, PASS_THRESHOLD};
pub use registry::{ProfileEdit, Registry};
pub use repository::StudentRepository;
pub use views::{StudentSummary, StudentView};
