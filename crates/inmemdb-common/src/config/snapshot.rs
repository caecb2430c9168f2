use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Errors that can occur during snapshot configuration validation.
#[derive(Debug, Error)]
pub enum SnapshotConfigError {
    /// The snapshot path is empty.
    #[error("Snapshot path is empty")]
    EmptyPath,

    /// The snapshot directory is not writable or cannot be created.
    #[error("Directory not writable: {path:?}")]
    DirNotWritable {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
}

/// Configuration for snapshot persistence.
#[derive(Debug, Deserialize)]
pub struct SnapshotConfig {
    /// The path of the snapshot file, loaded at startup and overwritten by
    /// SAVE and SHUTDOWN.
    /// Defaults to "dump.rdb" in the working directory.
    #[serde(default = "default_snapshot_path")]
    pub path: PathBuf,
}

const DEFAULT_SNAPSHOT_PATH: &str = "dump.rdb";

fn default_snapshot_path() -> PathBuf {
    PathBuf::from(DEFAULT_SNAPSHOT_PATH)
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: default_snapshot_path(),
        }
    }
}

impl SnapshotConfig {
    /// Validates the snapshot configuration.
    ///
    /// Checks:
    /// 1. `path` is non-empty.
    /// 2. The containing directory is writable (created if it doesn't exist).
    pub(crate) fn validate(&self) -> Result<(), SnapshotConfigError> {
        if self.path.as_os_str().is_empty() {
            return Err(SnapshotConfigError::EmptyPath);
        }

        self.check_dir()?;

        Ok(())
    }

    fn check_dir(&self) -> Result<(), SnapshotConfigError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        if !dir.exists() {
            info!(?dir, "Creating snapshot directory");
            std::fs::create_dir_all(dir).map_err(|error| SnapshotConfigError::DirNotWritable {
                path: dir.to_path_buf(),
                error,
            })?;
        }

        let test_file = dir.join(".write_test");
        std::fs::write(&test_file, b"test").map_err(|error| {
            SnapshotConfigError::DirNotWritable {
                path: dir.to_path_buf(),
                error,
            }
        })?;
        std::fs::remove_file(test_file).ok();

        Ok(())
    }
}
