//! Where student records live.

/// Database coordinates for the student repository.
#[derive(Debug, Clone)]
pub struct RecordsConfig {
    /// Database name.
    pub database: String,

    /// Schema version requested on open.
    pub version: u64,

    /// Collection holding the students.
    pub collection: String,

    /// Key path of the collection.
    pub key_path: String,
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            database: "academic_records".to_string(),
            version: 1,
            collection: "students".to_string(),
            key_path: "id".to_string(),
        }
    }
}

impl RecordsConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the database name.
    #[must_use]
    pub fn database(mut self, name: impl Into<String>) -> Self {
        self.database = name.into();
        self
    }

    /// Sets the schema version.
    #[must_use]
    pub const fn version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Sets the collection name.
    #[must_use]
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = RecordsConfig::default();
        assert_eq!(config.database, "academic_records");
        assert_eq!(config.version, 1);
        assert_eq!(config.collection, "students");
        assert_eq!(config.key_path, "id");
    }

    #[test]
    fn builder_pattern() {
        let config = RecordsConfig::new().database("archive").version(3).collection("alumni");
        assert_eq!(config.database, "archive");
        assert_eq!(config.version, 3);
        assert_eq!(config.collection, "alumni");
        assert_eq!(config.key_path, "id");
    }
}
