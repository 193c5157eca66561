//! Name-indexed collection of cache groups.
//!
//! Peers address groups by name, so every group serving peer requests is registered here.

use std::{collections::HashMap, sync::{Arc, RwLock}};

use super::{
    group::{CacheGroup, CacheStats},
    lock::{rw_read, rw_write},
};

const SOURCE: &str = "cache::registry";

#[derive(Default)]
pub struct GroupRegistry {
    groups: RwLock<HashMap<String, Arc<CacheGroup>>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `group` under its name, replacing any group of the same name.
    pub fn register(&self, group: Arc<CacheGroup>) {
        rw_write(&self.groups, SOURCE, "register").insert(group.name().to_string(), group);
    }

    pub fn get(&self, name: &str) -> Option<Arc<CacheGroup>> {
        rw_read(&self.groups, SOURCE, "get").get(name).cloned()
    }

    /// Statistics of every group, sorted by group name.
    pub fn stats(&self) -> Vec<(String, CacheStats)> {
        let mut stats: Vec<(String, CacheStats)> = rw_read(&self.groups, SOURCE, "stats")
            .iter()
            .map(|(name, group)| (name.clone(), group.stats()))
            .collect();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        stats
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::cache::{CacheError, CacheKey, Loader};

    struct Empty;

    #[async_trait]
    impl Loader for Empty {
        async fn load(&self, _key: &CacheKey) -> Result<Bytes, CacheError> {
            Ok(Bytes::new())
        }
    }

    #[test]
    fn groups_are_found_by_name() {
        let registry = GroupRegistry::new();
        registry.register(CacheGroup::new("page", 10, 10, Arc::new(Empty)));
        registry.register(CacheGroup::new("listing", 10, 10, Arc::new(Empty)));

        assert_eq!(registry.get("page").map(|g| g.name().to_string()), Some("page".into()));
        assert!(registry.get("feed").is_none());
        let names: Vec<String> = registry.stats().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["listing", "page"]);
    }
}
