use super::{data_dir::DataDir, ConfigToml};
use std::{
    io::Write,
    path::{Path, PathBuf},
};

/// The data directory on disk. Holds `config.toml`.
#[derive(Debug, Clone)]
pub struct PersistentDataDir {
    expanded_path: PathBuf,
}

impl PersistentDataDir {
    /// `path` is expanded to the home directory if it starts with "~".
    pub fn new(path: PathBuf) -> Self {
        Self {
            expanded_path: Self::expand_home_dir(path),
        }
    }

    fn expand_home_dir(path: PathBuf) -> PathBuf {
        let Some(raw) = path.to_str() else {
            // Not valid utf-8 so we can't expand it.
            return path;
        };

        if let Some(without_home) = raw.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(without_home);
            }
        }
        path
    }

    pub fn get_config_file_path(&self) -> PathBuf {
        self.expanded_path.join("config.toml")
    }

    fn write_sample_config_file(&self) -> anyhow::Result<()> {
        let config_string = ConfigToml::commented_out_sample();
        let mut config_file = std::fs::File::create(self.get_config_file_path())?;
        config_file.write_all(config_string.as_bytes())?;
        Ok(())
    }
}

impl Default for PersistentDataDir {
    fn default() -> Self {
        Self::new(PathBuf::from("~/.cachedns"))
    }
}

impl DataDir for PersistentDataDir {
    fn path(&self) -> &Path {
        &self.expanded_path
    }

    fn ensure_data_dir_exists_and_is_writable(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.expanded_path)?;

        // Random name to not conflict with anything.
        let test_file_path = self.expanded_path.join("write_check_5c1d9e2a7b3f4e08a6d1c0b9e8f7a6d5");
        std::fs::write(&test_file_path, b"test")
            .map_err(|err| anyhow::anyhow!("Failed to write to data directory: {}", err))?;
        std::fs::remove_file(&test_file_path)
            .map_err(|err| anyhow::anyhow!("Failed to write to data directory: {}", err))?;
        Ok(())
    }

    fn read_or_create_config_file(&self) -> anyhow::Result<ConfigToml> {
        let config_file_path = self.get_config_file_path();
        if !config_file_path.exists() {
            tracing::info!("Write sample config file to {}", config_file_path.display());
            self.write_sample_config_file()?;
        }
        ConfigToml::from_file(config_file_path)
    }
}
