//! Cache group: lookup-first storage with coalesced loads.
//!
//! Concurrent misses on one key share a single load. The load runs on its own task, so a
//! caller that stops waiting does not cancel work other waiters depend on. Errors reach
//! every waiter of that load and are never stored; the next `get` loads again.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::{DashMap, mapref::entry::Entry};
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use metrics::counter;
use serde::Serialize;
use tracing::{debug, warn};

use super::{
    error::CacheError,
    keys::CacheKey,
    peers::{NoPeers, PeerPicker},
    store::{Evictions, Tier, TierUsage, TieredStore},
};

pub(crate) const METRIC_HIT_TOTAL: &str = "vellum_cache_hit_total";
pub(crate) const METRIC_MISS_TOTAL: &str = "vellum_cache_miss_total";
pub(crate) const METRIC_LOAD_TOTAL: &str = "vellum_cache_load_total";
pub(crate) const METRIC_EVICT_TOTAL: &str = "vellum_cache_evict_total";

/// Computes the value of a key on a miss.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(&self, key: &CacheKey) -> Result<Bytes, CacheError>;
}

type SharedLoad = Shared<BoxFuture<'static, Result<Bytes, CacheError>>>;

#[derive(Default)]
struct Counters {
    gets: AtomicU64,
    hot_hits: AtomicU64,
    main_hits: AtomicU64,
    loads: AtomicU64,
    load_errors: AtomicU64,
    coalesced: AtomicU64,
    peer_loads: AtomicU64,
    peer_errors: AtomicU64,
    evictions: AtomicU64,
}

/// Point-in-time statistics of a group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub gets: u64,
    pub hot_hits: u64,
    pub main_hits: u64,
    /// Loads executed on this node.
    pub loads: u64,
    pub load_errors: u64,
    /// Callers that joined a load already in flight.
    pub coalesced: u64,
    pub peer_loads: u64,
    pub peer_errors: u64,
    pub evictions: u64,
    pub hot: TierUsage,
    pub main: TierUsage,
}

pub struct CacheGroup {
    name: String,
    store: TieredStore,
    loader: Arc<dyn Loader>,
    peers: Arc<dyn PeerPicker>,
    in_flight: DashMap<CacheKey, SharedLoad>,
    counters: Counters,
}

impl CacheGroup {
    pub fn new(
        name: impl Into<String>,
        main_bytes: usize,
        hot_bytes: usize,
        loader: Arc<dyn Loader>,
    ) -> Arc<Self> {
        Self::with_peers(name, main_bytes, hot_bytes, loader, Arc::new(NoPeers))
    }

    pub fn with_peers(
        name: impl Into<String>,
        main_bytes: usize,
        hot_bytes: usize,
        loader: Arc<dyn Loader>,
        peers: Arc<dyn PeerPicker>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            store: TieredStore::new(main_bytes, hot_bytes),
            loader,
            peers,
            in_flight: DashMap::new(),
            counters: Counters::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value of `key`, loading it (here or on its owning peer) on a miss.
    pub async fn get(self: &Arc<Self>, key: &CacheKey) -> Result<Bytes, CacheError> {
        self.get_with(key, true).await
    }

    /// Like [`CacheGroup::get`], but a miss is always loaded on this node. Used to answer
    /// requests from peers, which already routed the key here.
    pub async fn get_local(self: &Arc<Self>, key: &CacheKey) -> Result<Bytes, CacheError> {
        self.get_with(key, false).await
    }

    /// Drops `key` from both tiers.
    pub fn remove(&self, key: &CacheKey) -> bool {
        self.store.remove(key)
    }

    pub fn stats(&self) -> CacheStats {
        let read = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        CacheStats {
            gets: read(&self.counters.gets),
            hot_hits: read(&self.counters.hot_hits),
            main_hits: read(&self.counters.main_hits),
            loads: read(&self.counters.loads),
            load_errors: read(&self.counters.load_errors),
            coalesced: read(&self.counters.coalesced),
            peer_loads: read(&self.counters.peer_loads),
            peer_errors: read(&self.counters.peer_errors),
            evictions: read(&self.counters.evictions),
            hot: self.store.usage(Tier::Hot),
            main: self.store.usage(Tier::Main),
        }
    }

    async fn get_with(
        self: &Arc<Self>,
        key: &CacheKey,
        allow_peer: bool,
    ) -> Result<Bytes, CacheError> {
        self.counters.gets.fetch_add(1, Ordering::Relaxed);
        if let Some(value) = self.lookup(key) {
            return Ok(value);
        }

        counter!(METRIC_MISS_TOTAL, "group" => self.name.clone()).increment(1);
        debug!(target = "vellum::cache", group = %self.name, key = %key, "Cache miss");

        let load = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                // A load may have finished between the lookup and taking the entry.
                if let Some(value) = self.lookup(key) {
                    return Ok(value);
                }
                // The shard stays locked until the insert, so the task's guard removes
                // this entry and never runs ahead of it.
                let load = self.spawn_load(key.clone(), allow_peer);
                entry.insert(load.clone());
                load
            }
        };

        load.await
    }

    fn lookup(&self, key: &CacheKey) -> Option<Bytes> {
        let (value, tier, evictions) = self.store.get(key)?;
        match tier {
            Tier::Hot => self.counters.hot_hits.fetch_add(1, Ordering::Relaxed),
            Tier::Main => self.counters.main_hits.fetch_add(1, Ordering::Relaxed),
        };
        counter!(METRIC_HIT_TOTAL, "group" => self.name.clone(), "tier" => tier.as_str())
            .increment(1);
        debug!(
            target = "vellum::cache",
            group = %self.name,
            key = %key,
            tier = tier.as_str(),
            "Cache hit"
        );
        self.record_evictions(evictions);
        Some(value)
    }

    fn spawn_load(self: &Arc<Self>, key: CacheKey, allow_peer: bool) -> SharedLoad {
        let guard = InFlightGuard {
            group: Arc::clone(self),
            key: key.clone(),
        };
        let handle = tokio::spawn(async move {
            let result = guard.group.load(&guard.key, allow_peer).await;
            drop(guard);
            result
        });

        let group = Arc::clone(self);
        async move {
            match handle.await {
                Ok(result) => result,
                Err(err) => {
                    warn!(
                        target = "vellum::cache",
                        group = %group.name,
                        key = %key,
                        error = %err,
                        "Cache load task ended abnormally"
                    );
                    Err(CacheError::aborted(key.to_string()))
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn load(&self, key: &CacheKey, allow_peer: bool) -> Result<Bytes, CacheError> {
        let peer = if allow_peer { self.peers.pick(key) } else { None };

        let (result, tier, source) = match peer {
            Some(peer) => {
                self.counters.peer_loads.fetch_add(1, Ordering::Relaxed);
                let result = peer.get(&self.name, key).await;
                if let Err(err) = &result {
                    self.counters.peer_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        target = "vellum::cache",
                        group = %self.name,
                        key = %key,
                        peer = peer.url(),
                        error = %err,
                        "Peer load failed"
                    );
                }
                (result, Tier::Hot, "peer")
            }
            None => {
                self.counters.loads.fetch_add(1, Ordering::Relaxed);
                let result = self.loader.load(key).await;
                if result.is_err() {
                    self.counters.load_errors.fetch_add(1, Ordering::Relaxed);
                }
                (result, Tier::Main, "local")
            }
        };
        counter!(METRIC_LOAD_TOTAL, "group" => self.name.clone(), "source" => source).increment(1);

        let value = result?;
        let evictions = self.store.insert(key.clone(), value.clone(), tier);
        self.record_evictions(evictions);
        Ok(value)
    }

    fn record_evictions(&self, evictions: Evictions) {
        if evictions.total() == 0 {
            return;
        }
        self.counters
            .evictions
            .fetch_add(evictions.total(), Ordering::Relaxed);
        for (tier, count) in [(Tier::Hot, evictions.hot), (Tier::Main, evictions.main)] {
            if count > 0 {
                counter!(METRIC_EVICT_TOTAL, "group" => self.name.clone(), "tier" => tier.as_str())
                    .increment(count);
                debug!(
                    target = "vellum::cache",
                    group = %self.name,
                    tier = tier.as_str(),
                    count,
                    "Cache eviction"
                );
            }
        }
    }
}

/// Clears the in-flight entry of a load when its task ends, also when it panics or is
/// aborted. Only the task owning the entry removes it.
struct InFlightGuard {
    group: Arc<CacheGroup>,
    key: CacheKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.group.in_flight.remove(&self.key);
    }
}
