use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::JobError;

/// A picture source that has been read into the local cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Picture {
    pub source: String,
    pub path: PathBuf,
    pub bytes: u64,
}

pub trait Loader: Send + Sync + 'static {
    fn load(&self, source: &str) -> Result<Picture, JobError>;
}

/// Reads sources relative to a root directory. Remote URLs are not fetched.
#[derive(Debug, Clone)]
pub struct FsLoader { root: PathBuf }

impl FsLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    pub fn root(&self) -> &Path { &self.root }

    pub fn resolve(&self, source: &str) -> PathBuf {
        let trimmed = source.trim_start_matches('/');
        self.root.join(trimmed)
    }
}

pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://") || source.starts_with("//")
}

impl Loader for FsLoader {
    fn load(&self, source: &str) -> Result<Picture, JobError> {
        if is_remote(source) {
            return Err(JobError::UnsupportedSource(source.to_string()));
        }
        let path = self.resolve(source);
        let data = std::fs::read(&path).map_err(|e| JobError::Io { path: path.clone(), source: e })?;
        Ok(Picture { source: source.to_string(), path, bytes: data.len() as u64 })
    }
}
