//! Assignment of cache keys to the node that owns their load.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use bytes::Bytes;

use super::{
    error::CacheError,
    keys::{CacheKey, digest64},
};

const DEFAULT_REPLICAS: usize = 50;

/// Fetches a value for a key from the node that owns it.
#[async_trait]
pub trait PeerGetter: Send + Sync {
    /// Base URL identifying the peer.
    fn url(&self) -> &str;

    async fn get(&self, group: &str, key: &CacheKey) -> Result<Bytes, CacheError>;
}

/// Chooses the owning peer of a key. `None` means this node loads the key itself.
pub trait PeerPicker: Send + Sync {
    fn pick(&self, key: &CacheKey) -> Option<Arc<dyn PeerGetter>>;
}

/// Single-node setup: every key is loaded locally.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPeers;

impl PeerPicker for NoPeers {
    fn pick(&self, _key: &CacheKey) -> Option<Arc<dyn PeerGetter>> {
        None
    }
}

/// Consistent hash ring over this node and its peers.
///
/// Every node places `replicas` points on the ring; a key belongs to the node owning the
/// first point at or after the key's fingerprint. Nodes configured with the same member
/// list agree on every owner.
pub struct HashRing {
    self_url: String,
    ring: BTreeMap<u64, String>,
    peers: HashMap<String, Arc<dyn PeerGetter>>,
}

impl HashRing {
    pub fn new(self_url: impl Into<String>, peers: Vec<Arc<dyn PeerGetter>>) -> Self {
        Self::with_replicas(self_url, peers, DEFAULT_REPLICAS)
    }

    pub fn with_replicas(
        self_url: impl Into<String>,
        peers: Vec<Arc<dyn PeerGetter>>,
        replicas: usize,
    ) -> Self {
        let self_url = self_url.into();
        let peers: HashMap<String, Arc<dyn PeerGetter>> = peers
            .into_iter()
            .filter(|peer| peer.url() != self_url)
            .map(|peer| (peer.url().to_string(), peer))
            .collect();

        let mut ring = BTreeMap::new();
        let replicas = replicas.max(1);
        for node in peers.keys().chain(std::iter::once(&self_url)) {
            for replica in 0..replicas {
                let point = digest64(format!("{replica}{node}").as_bytes());
                ring.insert(point, node.clone());
            }
        }

        Self {
            self_url,
            ring,
            peers,
        }
    }

    /// URL of the node owning `key`.
    pub fn owner(&self, key: &CacheKey) -> &str {
        let hash = key.fingerprint();
        self.ring
            .range(hash..)
            .next()
            .or_else(|| self.ring.iter().next())
            .map(|(_, node)| node.as_str())
            .unwrap_or(self.self_url.as_str())
    }

    /// Number of nodes on the ring, this one included.
    pub fn node_count(&self) -> usize {
        self.peers.len() + 1
    }
}

impl PeerPicker for HashRing {
    fn pick(&self, key: &CacheKey) -> Option<Arc<dyn PeerGetter>> {
        let owner = self.owner(key);
        if owner == self.self_url {
            return None;
        }
        self.peers.get(owner).cloned()
    }
}
