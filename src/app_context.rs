use crate::config::{ConfigToml, DataDir};

/// Everything the server needs to start.
#[derive(Debug, Clone, Default)]
pub struct AppContext {
    pub config: ConfigToml,
}

impl AppContext {
    pub fn from_data_dir(data_dir: impl DataDir) -> Result<Self, anyhow::Error> {
        data_dir.ensure_data_dir_exists_and_is_writable()?;
        let config = data_dir.read_or_create_config_file()?;
        Ok(Self { config })
    }

    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            config: ConfigToml::test(),
        }
    }
}
