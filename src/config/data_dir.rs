use dyn_clone::DynClone;
use std::path::Path;

use crate::config::ConfigToml;

/// Where cachedns keeps its configuration file.
///
/// Implemented by the real directory on disk and by a temporary one for tests.
pub trait DataDir: std::fmt::Debug + DynClone + Send + Sync {
    /// Returns the path to the data directory.
    fn path(&self) -> &Path;

    /// Creates the directory if it doesn't exist and checks that it is writable.
    fn ensure_data_dir_exists_and_is_writable(&self) -> anyhow::Result<()>;

    /// Reads the config file from the data directory.
    /// Creates a commented out sample config file if it doesn't exist.
    fn read_or_create_config_file(&self) -> anyhow::Result<ConfigToml>;
}

dyn_clone::clone_trait_object!(DataDir);
