use std::path::{Path, PathBuf};

/// Where the database and blob files live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub db_path: PathBuf,
    pub blob_root: PathBuf,
}

impl Settings {
    /// Explicit paths win; otherwise use the platform data directory, falling
    /// back to the working directory.
    pub fn resolve(db_path: Option<PathBuf>, blob_root: Option<PathBuf>) -> Self {
        let data_dir = Self::data_dir();
        Self {
            db_path: db_path.unwrap_or_else(|| data_dir.join("jobtrack.db")),
            blob_root: blob_root.unwrap_or_else(|| data_dir.join("blobs")),
        }
    }

    fn data_dir() -> PathBuf {
        directories::ProjectDirs::from("", "", "jobtrack")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| Path::new(".").to_path_buf())
    }
}
