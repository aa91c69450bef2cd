//! Compact command implementation.

use historial_core::{Config, Factory};
use historial_storage::FileBackend;
use std::path::Path;

/// Journal sizes around a compaction.
#[derive(Debug)]
pub struct CompactStats {
    /// Bytes before compaction.
    pub bytes_before: u64,
    /// Bytes after compaction.
    pub bytes_after: u64,
}

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No journal found at {:?}", path).into());
    }

    println!("Compacting journal at {:?}", path);
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let factory = Factory::open(FileBackend::open(path)?, Config::default())?;
    for database in factory.databases() {
        println!("  {} (version {})", database.name, database.version);
    }

    if dry_run {
        println!("  Size: {} bytes", factory.journal_size()?);
        return Ok(());
    }

    let stats = compact(&factory)?;
    let saved = stats.bytes_before.saturating_sub(stats.bytes_after);
    println!("  Size before: {} bytes", stats.bytes_before);
    println!("  Size after:  {} bytes", stats.bytes_after);
    #[allow(clippy::cast_precision_loss)]
    let percent = if stats.bytes_before > 0 {
        saved as f64 / stats.bytes_before as f64 * 100.0
    } else {
        0.0
    };
    println!("  Space saved: {saved} bytes ({percent:.1}%)");
    println!();
    println!("✓ Compaction complete");
    Ok(())
}

/// Rewrites the journal and reports its size before and after.
pub fn compact(factory: &Factory) -> Result<CompactStats, Box<dyn std::error::Error>> {
    let bytes_before = factory.journal_size()?;
    factory.compact()?;
    let bytes_after = factory.journal_size()?;
    tracing::info!(bytes_before, bytes_after, "journal compacted");
    Ok(CompactStats {
        bytes_before,
        bytes_after,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::open_registry;
    use historial_academic::Student;

    #[tokio::test]
    async fn compaction_keeps_students() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("historial.journal");
        {
            let mut registry = open_registry(&path).await.unwrap();
            registry
                .register(Student::new("123", "Ana", "2001-04-02", "AR"))
                .await
                .unwrap();
            registry.select("123").unwrap();
            for score in [4.0, 5.0, 6.0, 7.0] {
                registry.grade("Math", score).await.unwrap();
            }
            registry.edit_score(0, 9.0).await.unwrap();
        }

        let stats = {
            let factory = Factory::open(FileBackend::open(&path).unwrap(), Config::default()).unwrap();
            compact(&factory).unwrap()
        };
        assert!(stats.bytes_after < stats.bytes_before);

        let registry = open_registry(&path).await.unwrap();
        let view = registry.student_view("123").unwrap();
        assert_eq!(view.records.len(), 4);
        assert_eq!(view.records[0].score, 9.0);
    }

    #[test]
    fn missing_journal_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run(&dir.path().join("absent.journal"), true).is_err());
    }
}
