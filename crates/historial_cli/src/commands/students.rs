//! Student management commands.

use historial_academic::{ProfileEdit, Registry, Student, StudentStatus};

/// Registers a student.
pub async fn register(
    registry: &mut Registry,
    student: Student,
) -> Result<(), Box<dyn std::error::Error>> {
    let id = student.id.clone();
    registry.register(student).await?;
    println!("Registered student {id}");
    Ok(())
}

/// Edits a student's profile.
pub async fn edit(
    registry: &mut Registry,
    id: &str,
    edit: ProfileEdit,
) -> Result<(), Box<dyn std::error::Error>> {
    let new_id = edit.id.clone().unwrap_or_else(|| id.to_string());
    registry.edit_profile(id, edit).await?;
    println!("Updated student {new_id}");
    Ok(())
}

/// Sets a student's status.
pub async fn set_status(
    registry: &mut Registry,
    id: &str,
    status: StudentStatus,
) -> Result<(), Box<dyn std::error::Error>> {
    registry.set_status(id, status).await?;
    println!("Student {id} is now {status}");
    Ok(())
}

/// Removes a student.
pub async fn remove(registry: &mut Registry, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let student = registry.remove(id).await?;
    println!("Removed {} ({})", student.name, student.id);
    Ok(())
}
