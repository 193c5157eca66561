//! Byte-bounded two-tier LRU storage for one cache group.
//!
//! New values land in the main tier. A main entry that is read again moves to the hot
//! tier, so one-off lookups cannot push out entries that are requested repeatedly. Each
//! tier evicts its least recently used entries independently once its byte budget is
//! exceeded.

use std::sync::Mutex;

use bytes::Bytes;
use lru::LruCache;
use serde::Serialize;

use super::{keys::CacheKey, lock::mutex_lock};

const SOURCE: &str = "cache::store";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Hot,
    Main,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Hot => "hot",
            Tier::Main => "main",
        }
    }
}

/// Occupancy of one tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierUsage {
    pub items: usize,
    pub bytes: usize,
    pub capacity: usize,
}

/// Number of entries each tier dropped during one operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Evictions {
    pub hot: u64,
    pub main: u64,
}

impl Evictions {
    pub fn total(self) -> u64 {
        self.hot + self.main
    }
}

struct Shelf {
    entries: LruCache<CacheKey, Bytes>,
    used: usize,
    capacity: usize,
}

impl Shelf {
    fn new(capacity: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            used: 0,
            capacity,
        }
    }

    fn get(&mut self, key: &CacheKey) -> Option<Bytes> {
        self.entries.get(key).cloned()
    }

    fn remove(&mut self, key: &CacheKey) -> Option<Bytes> {
        let value = self.entries.pop(key)?;
        self.used -= cost(key, &value);
        Some(value)
    }

    /// Stores `value` and returns how many other entries were evicted. A value that does
    /// not fit the tier at all is not retained.
    fn insert(&mut self, key: CacheKey, value: Bytes) -> u64 {
        self.remove(&key);
        let size = cost(&key, &value);
        if size > self.capacity {
            return 0;
        }

        self.entries.put(key, value);
        self.used += size;

        let mut evicted = 0;
        while self.used > self.capacity {
            let Some((old_key, old_value)) = self.entries.pop_lru() else {
                break;
            };
            self.used -= cost(&old_key, &old_value);
            evicted += 1;
        }
        evicted
    }

    fn usage(&self) -> TierUsage {
        TierUsage {
            items: self.entries.len(),
            bytes: self.used,
            capacity: self.capacity,
        }
    }
}

struct Tiers {
    hot: Shelf,
    main: Shelf,
}

/// Storage of one cache group. Memory use is bounded by `hot_bytes + main_bytes`
/// regardless of how many keys are requested.
pub struct TieredStore {
    tiers: Mutex<Tiers>,
}

impl TieredStore {
    pub fn new(main_bytes: usize, hot_bytes: usize) -> Self {
        Self {
            tiers: Mutex::new(Tiers {
                hot: Shelf::new(hot_bytes),
                main: Shelf::new(main_bytes),
            }),
        }
    }

    /// Looks `key` up, promoting a main-tier hit into the hot tier.
    pub fn get(&self, key: &CacheKey) -> Option<(Bytes, Tier, Evictions)> {
        let mut tiers = mutex_lock(&self.tiers, SOURCE, "get");
        if let Some(value) = tiers.hot.get(key) {
            return Some((value, Tier::Hot, Evictions::default()));
        }

        let value = tiers.main.remove(key)?;
        let evicted = tiers.hot.insert(key.clone(), value.clone());
        if tiers.hot.get(key).is_none() {
            // Too large for the hot tier; keep it where it was.
            tiers.main.insert(key.clone(), value.clone());
        }
        Some((
            value,
            Tier::Main,
            Evictions {
                hot: evicted,
                main: 0,
            },
        ))
    }

    pub fn insert(&self, key: CacheKey, value: Bytes, tier: Tier) -> Evictions {
        let mut tiers = mutex_lock(&self.tiers, SOURCE, "insert");
        match tier {
            Tier::Hot => {
                tiers.main.remove(&key);
                Evictions {
                    hot: tiers.hot.insert(key, value),
                    main: 0,
                }
            }
            Tier::Main => {
                tiers.hot.remove(&key);
                Evictions {
                    hot: 0,
                    main: tiers.main.insert(key, value),
                }
            }
        }
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        let mut tiers = mutex_lock(&self.tiers, SOURCE, "remove");
        let hot = tiers.hot.remove(key).is_some();
        let main = tiers.main.remove(key).is_some();
        hot || main
    }

    pub fn usage(&self, tier: Tier) -> TierUsage {
        let tiers = mutex_lock(&self.tiers, SOURCE, "usage");
        match tier {
            Tier::Hot => tiers.hot.usage(),
            Tier::Main => tiers.main.usage(),
        }
    }
}

/// Bytes charged for one entry.
fn cost(key: &CacheKey, value: &Bytes) -> usize {
    key.discriminator.len() + value.len()
}
