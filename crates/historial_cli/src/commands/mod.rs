//! CLI command implementations.

pub mod compact;
pub mod history;
pub mod students;
pub mod view;

use historial_academic::{RecordsConfig, Registry, StudentRepository};
use historial_core::{Config, Factory};
use historial_storage::FileBackend;
use std::path::Path;

/// Replays the journal at `path` and loads every student.
pub async fn open_registry(path: &Path) -> Result<Registry, Box<dyn std::error::Error>> {
    let backend = FileBackend::open(path)?;
    let factory = Factory::open(backend, Config::default())?;
    let repository = StudentRepository::new(factory, &RecordsConfig::default());
    Ok(Registry::load(repository).await)
}

/// Output format of the read commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human readable lines.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl Format {
    /// Parses `text` or `json`.
    pub fn parse(format: &str) -> Result<Self, Box<dyn std::error::Error>> {
        match format {
            "text" => Ok(Format::Text),
            "json" => Ok(Format::Json),
            other => Err(format!("unknown format {other:?} (expected text or json)").into()),
        }
    }
}
