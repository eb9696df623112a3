//! Where the store and the log file live.
//!
//! Flags and environment variables are resolved by clap before they get here;
//! this only fills in defaults.

use crate::storage::{DB_FILE, STORE_DIR};
use std::path::{Path, PathBuf};

/// Log file name inside the log directory.
pub const LOG_FILE: &str = "taskplan.log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory that contains (or will contain) `.taskplan/`
    pub root: PathBuf,
    pub log_dir: PathBuf,
}

impl Config {
    /// Resolve explicit settings, falling back to the current directory and
    /// the user's local data directory.
    pub fn new(root: Option<PathBuf>, log_dir: Option<PathBuf>) -> Self {
        let root = root.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let log_dir = log_dir.unwrap_or_else(default_log_dir);
        Self { root, log_dir }
    }

    pub fn store_dir(&self) -> PathBuf {
        self.root.join(STORE_DIR)
    }

    pub fn db_path(&self) -> PathBuf {
        self.store_dir().join(DB_FILE)
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join(LOG_FILE)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// `<data_local_dir>/taskplan/logs`, or `./taskplan/logs` when there is no data dir.
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskplan")
        .join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_paths() {
        let config = Config::new(Some(PathBuf::from("/work")), Some(PathBuf::from("/var/log/tp")));
        assert_eq!(config.root(), Path::new("/work"));
        assert_eq!(config.db_path(), PathBuf::from("/work/.taskplan/taskplan.db"));
        assert_eq!(config.log_file(), PathBuf::from("/var/log/tp/taskplan.log"));
    }

    #[test]
    fn test_defaults() {
        let config = Config::new(None, None);
        assert!(config.log_dir.ends_with("taskplan/logs"));
        assert!(config.store_dir().ends_with(".taskplan"));
    }
}
