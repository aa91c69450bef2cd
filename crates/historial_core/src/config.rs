//! Engine configuration.

/// Configuration for opening a [`Factory`](crate::Factory).
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to sync the journal after every committed transaction.
    pub sync_on_commit: bool,

    /// Whether to rewrite the journal as a compact snapshot after replay.
    pub compact_on_open: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_on_commit: true,
            compact_on_open: false,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to sync the journal on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets whether to compact the journal right after replay.
    #[must_use]
    pub const fn compact_on_open(mut self, value: bool) -> Self {
        self.compact_on_open = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.sync_on_commit);
        assert!(!config.compact_on_open);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new().sync_on_commit(false).compact_on_open(true);
        assert!(!config.sync_on_commit);
        assert!(config.compact_on_open);
    }
}
