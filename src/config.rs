use std::path::{Path, PathBuf};

use tracing::debug;

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV_VAR: &str = "TODOS_DATA_DIR";

const APP_DIR_NAME: &str = "todos";
const FALLBACK_DIR: &str = ".todos";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding one JSON file per storage key
    pub data_dir: PathBuf,
}

impl Config {
    /// Resolves the configuration. `explicit` is the value of `--data-dir` or
    /// `TODOS_DATA_DIR` (clap merges both), and wins when it is not blank.
    pub fn resolve(explicit: Option<&Path>) -> Self {
        let data_dir = resolve_data_dir(explicit, dirs::data_local_dir());
        debug!(data_dir = %data_dir.display(), "Resolved configuration");
        Self { data_dir }
    }
}

fn resolve_data_dir(explicit: Option<&Path>, local_data_dir: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit
        && !path.as_os_str().to_string_lossy().trim().is_empty()
    {
        return path.to_path_buf();
    }

    match local_data_dir {
        Some(dir) => dir.join(APP_DIR_NAME),
        None => PathBuf::from(FALLBACK_DIR),
    }
}
