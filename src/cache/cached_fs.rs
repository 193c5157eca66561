//! The virtual filesystem behind one cache group per resource kind.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use tracing::warn;

use crate::{
    application::vfs::{Opened, VfsError, VirtualFile, VirtualFs},
    domain::{
        entry::{FileInfo, VirtualEntry},
        path,
    },
};

use super::{
    codec::{self, ListingRecord},
    config::CacheConfig,
    error::CacheError,
    group::{CacheGroup, Loader},
    keys::{CacheKey, ResourceKind},
    peers::{NoPeers, PeerPicker},
    quantize::quantize,
    registry::GroupRegistry,
};

struct VfsLoader {
    vfs: Arc<VirtualFs>,
}

#[async_trait]
impl Loader for VfsLoader {
    async fn load(&self, key: &CacheKey) -> Result<Bytes, CacheError> {
        let path = key.discriminator.as_str();
        let encoded = match key.kind {
            ResourceKind::Page => {
                let opened = self.vfs.open(path).await.map_err(|err| into_cache_error(key, err))?;
                codec::encode(&opened)
            }
            ResourceKind::Listing => {
                let entries = self
                    .vfs
                    .read_dir(path)
                    .await
                    .map_err(|err| into_cache_error(key, err))?;
                codec::encode(&ListingRecord { entries })
            }
            ResourceKind::Sitemap => {
                let sitemap = self
                    .vfs
                    .sitemap()
                    .await
                    .map_err(|err| into_cache_error(key, err))?;
                codec::encode(&sitemap)
            }
        };
        encoded.map_err(|err| CacheError::load(key.to_string(), err.to_string()))
    }
}

fn into_cache_error(key: &CacheKey, err: VfsError) -> CacheError {
    match err {
        VfsError::NotExist { path } | VfsError::PermissionDenied { path } => {
            CacheError::not_found(path)
        }
        VfsError::InvalidPath { path } => CacheError::invalid_key(path),
        VfsError::Cache(err) => err,
        other => CacheError::load(key.discriminator.as_str(), other.to_string()),
    }
}

/// Cached front of a [`VirtualFs`].
///
/// Keys combine the resource kind, the path, the template generation and a quantized time
/// bucket. Kinds configured with a zero duration bypass their group and hit the
/// filesystem on every call.
pub struct CachedFs {
    vfs: Arc<VirtualFs>,
    loader: Arc<VfsLoader>,
    config: CacheConfig,
    registry: GroupRegistry,
}

impl CachedFs {
    pub fn new(vfs: Arc<VirtualFs>, config: CacheConfig) -> Self {
        Self::with_peers(vfs, config, Arc::new(NoPeers))
    }

    pub fn with_peers(
        vfs: Arc<VirtualFs>,
        config: CacheConfig,
        peers: Arc<dyn PeerPicker>,
    ) -> Self {
        let loader = Arc::new(VfsLoader {
            vfs: Arc::clone(&vfs),
        });
        let registry = GroupRegistry::new();
        for kind in ResourceKind::ALL {
            let group = config.group(kind);
            registry.register(CacheGroup::with_peers(
                kind.as_str(),
                group.main_bytes,
                group.hot_bytes,
                Arc::clone(&loader) as Arc<dyn Loader>,
                Arc::clone(&peers),
            ));
        }
        Self {
            vfs,
            loader,
            config,
            registry,
        }
    }

    pub fn vfs(&self) -> &Arc<VirtualFs> {
        &self.vfs
    }

    pub fn registry(&self) -> &GroupRegistry {
        &self.registry
    }

    /// Key under which `discriminator` is cached right now.
    pub fn key(&self, kind: ResourceKind, discriminator: &str) -> CacheKey {
        let duration = self.config.group(kind).duration;
        CacheKey::new(
            kind,
            discriminator,
            self.vfs.template_generation(),
            quantize(OffsetDateTime::now_utc(), duration, discriminator),
        )
    }

    /// Encoded cache entry for `discriminator`.
    pub async fn get(&self, kind: ResourceKind, discriminator: &str) -> Result<Bytes, VfsError> {
        if !self.config.group(kind).is_enabled() {
            let key = self.key(kind, discriminator);
            return Ok(self.loader.load(&key).await?);
        }

        let group = self
            .registry
            .get(kind.as_str())
            .ok_or_else(|| VfsError::Cache(CacheError::not_found(kind.as_str())))?;
        let key = self.key(kind, discriminator);
        Ok(group.get(&key).await?)
    }

    pub async fn open(&self, path: &str) -> Result<Opened, VfsError> {
        self.get_decoded(ResourceKind::Page, path).await
    }

    pub async fn stat(&self, path: &str) -> Result<FileInfo, VfsError> {
        Ok(self.open(path).await?.info().clone())
    }

    pub async fn read_dir(&self, path: &str) -> Result<Vec<VirtualEntry>, VfsError> {
        let record: ListingRecord = self.get_decoded(ResourceKind::Listing, path).await?;
        Ok(record.entries)
    }

    pub async fn sitemap(&self) -> Result<VirtualFile, VfsError> {
        self.get_decoded(ResourceKind::Sitemap, path::SITEMAP_FILE)
            .await
    }

    /// Fetches and decodes an entry. A payload that does not decode is evicted and loaded
    /// once more before giving up.
    async fn get_decoded<T: DeserializeOwned>(
        &self,
        kind: ResourceKind,
        discriminator: &str,
    ) -> Result<T, VfsError> {
        let bytes = self.get(kind, discriminator).await?;
        match codec::decode(&bytes) {
            Ok(value) => Ok(value),
            Err(err) => {
                warn!(
                    target = "vellum::cache",
                    group = kind.as_str(),
                    path = discriminator,
                    error = %err,
                    "Evicting corrupt cache entry"
                );
                if let Some(group) = self.registry.get(kind.as_str()) {
                    group.remove(&self.key(kind, discriminator));
                }
                let bytes = self.get(kind, discriminator).await?;
                codec::decode(&bytes)
                    .map_err(|err| VfsError::decode(discriminator, err.to_string()))
            }
        }
    }
}
