//! Instructor and student views.

use super::Format;
use historial_academic::{Registry, StudentView};

/// Prints the instructor overview.
pub fn list(registry: &Registry, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let overview = registry.instructor_overview();
    if Format::parse(format)? == Format::Json {
        println!("{}", serde_json::to_string_pretty(&overview)?);
        return Ok(());
    }

    if overview.is_empty() {
        println!("No students registered.");
        return Ok(());
    }
    println!(
        "{:<12} {:<28} {:<8} {:>7} {:>6} {:>6}",
        "ID", "NAME", "STATUS", "AVERAGE", "PASSED", "FAILED"
    );
    for line in &overview {
        println!(
            "{:<12} {:<28} {:<8} {:>7.2} {:>6} {:>6}",
            line.id, line.name, line.status, line.average, line.passed, line.failed
        );
    }
    Ok(())
}

/// Prints one student's profile, history and credentials.
pub fn show(registry: &Registry, id: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let view = registry.student_view(id)?;
    match Format::parse(format)? {
        Format::Json => println!("{}", serde_json::to_string_pretty(&view)?),
        Format::Text => print_view(&view),
    }
    Ok(())
}

fn print_view(view: &StudentView) {
    println!("Name:        {}", view.name);
    println!("ID:          {}", view.id);
    println!("Birth date:  {}", view.birth_date);
    println!("Nationality: {}", view.nationality);
    println!("Status:      {}", view.status);
    println!();

    if view.records.is_empty() {
        println!("No subjects recorded.");
    } else {
        println!("Subjects:");
        for (index, record) in view.records.iter().enumerate() {
            let outcome = if record.passed { "passed" } else { "failed" };
            println!("  [{index}] {} | score {} | {outcome}", record.name, record.score);
        }
        println!();
        println!("Average: {:.2}", view.average);
        println!("Passed:  {}", view.passed);
        println!("Failed:  {}", view.failed);
    }
    println!();

    if view.credentials.is_empty() {
        println!("No credentials recorded.");
    } else {
        println!("Credentials:");
        for credential in &view.credentials {
            match &credential.note {
                Some(note) => println!(
                    "  {} | {} | {note}",
                    credential.title, credential.obtained_on
                ),
                None => println!("  {} | {}", credential.title, credential.obtained_on),
            }
        }
    }
}
