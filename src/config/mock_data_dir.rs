use std::path::Path;

use super::{ConfigToml, DataDir};

/// Data directory for tests.
///
/// Lives in a temporary directory that is removed as soon as the object is dropped.
/// The config is held in memory instead of being read from disk.
#[derive(Debug, Clone)]
pub struct MockDataDir {
    pub(crate) temp_dir: std::sync::Arc<tempfile::TempDir>,
    pub config_toml: ConfigToml,
}

impl MockDataDir {
    pub fn new(config_toml: ConfigToml) -> anyhow::Result<Self> {
        Ok(Self {
            temp_dir: std::sync::Arc::new(tempfile::TempDir::new()?),
            config_toml,
        })
    }

    /// Mock data directory holding `ConfigToml::test()`.
    pub fn test() -> Self {
        Self::new(ConfigToml::test()).expect("failed to create MockDataDir")
    }
}

impl Default for MockDataDir {
    fn default() -> Self {
        Self::test()
    }
}

impl DataDir for MockDataDir {
    fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    fn ensure_data_dir_exists_and_is_writable(&self) -> anyhow::Result<()> {
        Ok(()) // Always ok because this is validated by the tempfile crate.
    }

    fn read_or_create_config_file(&self) -> anyhow::Result<ConfigToml> {
        Ok(self.config_toml.clone())
    }
}
