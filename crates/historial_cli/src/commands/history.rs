//! Grades and credentials of one student.

use historial_academic::{Credential, Registry, SubjectRecord};

/// Grades a subject, deriving the pass flag.
pub async fn grade(
    registry: &mut Registry,
    id: &str,
    subject: &str,
    score: f64,
) -> Result<(), Box<dyn std::error::Error>> {
    registry.select(id)?;
    registry.grade(subject, score).await?;
    report(registry);
    Ok(())
}

/// Adds a subject record with the pass flag as given.
pub async fn add_record(
    registry: &mut Registry,
    id: &str,
    record: SubjectRecord,
) -> Result<(), Box<dyn std::error::Error>> {
    registry.select(id)?;
    registry.add_record(record).await?;
    report(registry);
    Ok(())
}

/// Corrects a score.
pub async fn edit_score(
    registry: &mut Registry,
    id: &str,
    index: usize,
    score: f64,
) -> Result<(), Box<dyn std::error::Error>> {
    registry.select(id)?;
    registry.edit_score(index, score).await?;
    report(registry);
    Ok(())
}

/// Adds a credential.
pub async fn add_credential(
    registry: &mut Registry,
    id: &str,
    credential: Credential,
) -> Result<(), Box<dyn std::error::Error>> {
    registry.select(id)?;
    let title = credential.title.clone();
    registry.add_credential(credential).await?;
    println!("Added {title} to {id}");
    Ok(())
}

fn report(registry: &Registry) {
    if let Some(student) = registry.selected() {
        println!(
            "{}: average {:.2}, {} passed, {} failed",
            student.id,
            student.average(),
            student.passed_count(),
            student.failed_count()
        );
    }
}
