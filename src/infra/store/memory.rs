//! In-memory physical store.

use std::{collections::BTreeMap, sync::RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;

use crate::{
    application::store::{PhysicalStore, StoreEntry, StoreError, StoreMetadata},
    cache::lock::{rw_read, rw_write},
    domain::{
        entry::FileType,
        path::{self, ROOT},
    },
};

const SOURCE: &str = "infra::store::memory";

#[derive(Debug, Clone)]
enum Node {
    File { data: Bytes, modified: OffsetDateTime },
    Dir { modified: OffsetDateTime },
}

impl Node {
    fn metadata(&self) -> StoreMetadata {
        match self {
            Node::File { data, modified } => StoreMetadata {
                file_type: FileType::Regular,
                size: data.len() as u64,
                modified: *modified,
            },
            Node::Dir { modified } => StoreMetadata {
                file_type: FileType::Directory,
                size: 0,
                modified: *modified,
            },
        }
    }
}

/// A mutable tree of files held in memory. Parent directories are created on insert.
#[derive(Debug)]
pub struct MemoryStore {
    nodes: RwLock<BTreeMap<String, Node>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            ROOT.to_string(),
            Node::Dir {
                modified: OffsetDateTime::UNIX_EPOCH,
            },
        );
        Self {
            nodes: RwLock::new(nodes),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from `(path, contents)` pairs, all modified at `modified`.
    pub fn with_files<'a>(
        files: impl IntoIterator<Item = (&'a str, &'a str)>,
        modified: OffsetDateTime,
    ) -> Self {
        let store = Self::new();
        for (path, contents) in files {
            store.insert_file(path, contents.to_owned(), modified);
        }
        store
    }

    /// Creates or replaces the file at `path`.
    pub fn insert_file(&self, path: &str, data: impl Into<Bytes>, modified: OffsetDateTime) {
        let mut nodes = rw_write(&self.nodes, SOURCE, "insert_file");
        let mut parent = path::split(path).0;
        while parent != ROOT {
            nodes
                .entry(parent.to_string())
                .or_insert(Node::Dir { modified });
            parent = path::split(parent).0;
        }
        nodes.insert(
            path.to_string(),
            Node::File {
                data: data.into(),
                modified,
            },
        );
    }

    /// Creates an empty directory at `path`.
    pub fn insert_dir(&self, path: &str, modified: OffsetDateTime) {
        let mut nodes = rw_write(&self.nodes, SOURCE, "insert_dir");
        let mut current = path;
        while current != ROOT {
            nodes
                .entry(current.to_string())
                .or_insert(Node::Dir { modified });
            current = path::split(current).0;
        }
    }

    /// Removes `path` and everything below it.
    pub fn remove(&self, path: &str) {
        let mut nodes = rw_write(&self.nodes, SOURCE, "remove");
        let prefix = format!("{path}/");
        nodes.retain(|key, _| key != path && !key.starts_with(&prefix));
    }

    fn node(&self, path: &str) -> Result<Node, StoreError> {
        rw_read(&self.nodes, SOURCE, "node")
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::not_found(path))
    }
}

#[async_trait]
impl PhysicalStore for MemoryStore {
    async fn read(&self, path: &str) -> Result<Bytes, StoreError> {
        match self.node(path)? {
            Node::File { data, .. } => Ok(data),
            Node::Dir { .. } => Err(StoreError::Io {
                path: path.to_string(),
                source: std::io::Error::other("is a directory"),
            }),
        }
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<StoreEntry>, StoreError> {
        if let Node::File { .. } = self.node(path)? {
            return Err(StoreError::not_a_directory(path));
        }
        let nodes = rw_read(&self.nodes, SOURCE, "read_dir");
        Ok(nodes
            .iter()
            .filter(|(key, _)| key.as_str() != ROOT && path::split(key).0 == path)
            .map(|(key, node)| StoreEntry {
                name: path::split(key).1.to_string(),
                metadata: node.metadata(),
            })
            .collect())
    }

    async fn stat(&self, path: &str) -> Result<StoreMetadata, StoreError> {
        Ok(self.node(path)?.metadata())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parents_are_created_and_listed() {
        let store = MemoryStore::with_files(
            [("blog/post1.md", "hi"), ("index.md", "home")],
            OffsetDateTime::UNIX_EPOCH,
        );

        let root: Vec<String> = store
            .read_dir(".")
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert_eq!(root, vec!["blog", "index.md"]);
        assert!(store.stat("blog").await.unwrap().is_dir());
        assert_eq!(store.stat("blog/post1.md").await.unwrap().size, 2);
    }

    #[tokio::test]
    async fn missing_and_wrong_kind_errors() {
        let store = MemoryStore::with_files([("a.txt", "x")], OffsetDateTime::UNIX_EPOCH);
        assert!(store.read("b.txt").await.unwrap_err().is_not_found());
        assert!(matches!(
            store.read_dir("a.txt").await,
            Err(StoreError::NotADirectory { .. })
        ));
    }

    #[tokio::test]
    async fn remove_drops_subtree() {
        let store = MemoryStore::with_files(
            [("blog/a.md", "a"), ("blog/b.md", "b"), ("blogroll.md", "c")],
            OffsetDateTime::UNIX_EPOCH,
        );
        store.remove("blog");
        assert!(store.stat("blog/a.md").await.is_err());
        assert!(store.stat("blogroll.md").await.is_ok());
    }
}
