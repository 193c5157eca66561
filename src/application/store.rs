//! Read-only interface to the physical byte store behind the virtual filesystem.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entry::FileType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreMetadata {
    pub file_type: FileType,
    /// Size in bytes (0 for directories).
    pub size: u64,
    pub modified: OffsetDateTime,
}

impl StoreMetadata {
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }
}

/// A directory entry returned by `read_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    /// Name of the entry (not full path).
    pub name: String,
    pub metadata: StoreMetadata,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("`{path}` does not exist")]
    NotFound { path: String },
    #[error("permission denied for `{path}`")]
    PermissionDenied { path: String },
    #[error("`{path}` is not a directory")]
    NotADirectory { path: String },
    #[error("io error on `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory { path: path.into() }
    }

    /// Classifies an io error for `path`.
    pub fn from_io(path: impl Into<String>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotADirectory => Self::NotADirectory { path },
            _ => Self::Io { path, source },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Hierarchical byte store addressed by virtual paths (`"."` is the root).
///
/// Implementations must be safe to share across tasks.
#[async_trait]
pub trait PhysicalStore: Send + Sync {
    /// Read the entire contents of a regular file.
    async fn read(&self, path: &str) -> Result<Bytes, StoreError>;

    /// List the entries of a directory, in no particular order.
    async fn read_dir(&self, path: &str) -> Result<Vec<StoreEntry>, StoreError>;

    /// Metadata for a file or directory.
    async fn stat(&self, path: &str) -> Result<StoreMetadata, StoreError>;
}
