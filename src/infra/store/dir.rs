//! Physical store over a local directory tree.

use std::{
    path::{Component, Path, PathBuf},
    time::SystemTime,
};

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;
use tokio::fs;
use tracing::debug;

use crate::{
    application::store::{PhysicalStore, StoreEntry, StoreError, StoreMetadata},
    domain::{entry::FileType, path::ROOT},
};

/// Serves files below `root`. Symbolic links are followed.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        if path == ROOT {
            return Ok(self.root.clone());
        }
        let relative = Path::new(path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|component| !matches!(component, Component::Normal(_)))
        {
            return Err(StoreError::not_found(path));
        }
        Ok(self.root.join(relative))
    }
}

fn metadata_from(metadata: &std::fs::Metadata) -> StoreMetadata {
    let is_dir = metadata.is_dir();
    let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    StoreMetadata {
        file_type: if is_dir {
            FileType::Directory
        } else {
            FileType::Regular
        },
        size: if is_dir { 0 } else { metadata.len() },
        modified: OffsetDateTime::from(modified),
    }
}

#[async_trait]
impl PhysicalStore for DirStore {
    async fn read(&self, path: &str) -> Result<Bytes, StoreError> {
        let absolute = self.resolve(path)?;
        let data = fs::read(&absolute)
            .await
            .map_err(|err| StoreError::from_io(path, err))?;
        Ok(Bytes::from(data))
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<StoreEntry>, StoreError> {
        let absolute = self.resolve(path)?;
        let mut reader = fs::read_dir(&absolute)
            .await
            .map_err(|err| StoreError::from_io(path, err))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|err| StoreError::from_io(path, err))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                debug!(
                    target = "vellum::store::dir",
                    dir = path,
                    "Skipping entry with a non UTF-8 name"
                );
                continue;
            };
            // `fs::metadata` follows links; dangling links are left out.
            match fs::metadata(entry.path()).await {
                Ok(metadata) => entries.push(StoreEntry {
                    name,
                    metadata: metadata_from(&metadata),
                }),
                Err(err) => debug!(
                    target = "vellum::store::dir",
                    dir = path,
                    name = %name,
                    error = %err,
                    "Skipping unreadable entry"
                ),
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn stat(&self, path: &str) -> Result<StoreMetadata, StoreError> {
        let absolute = self.resolve(path)?;
        let metadata = fs::metadata(&absolute)
            .await
            .map_err(|err| StoreError::from_io(path, err))?;
        Ok(metadata_from(&metadata))
    }
}
