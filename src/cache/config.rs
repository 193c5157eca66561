//! Cache configuration.

use std::time::Duration;

use super::ResourceKind;

const MIB: usize = 1024 * 1024;

const DEFAULT_PAGE_MAIN_BYTES: usize = 32 * MIB;
const DEFAULT_PAGE_HOT_BYTES: usize = 4 * MIB;
const DEFAULT_LISTING_MAIN_BYTES: usize = 4 * MIB;
const DEFAULT_LISTING_HOT_BYTES: usize = MIB / 2;
const DEFAULT_SITEMAP_MAIN_BYTES: usize = MIB;
const DEFAULT_SITEMAP_HOT_BYTES: usize = MIB / 4;
const DEFAULT_DURATION: Duration = Duration::from_secs(600);

/// Capacity and lifetime of one cache group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupConfig {
    pub main_bytes: usize,
    pub hot_bytes: usize,
    /// Bucket length for quantized expiry. Zero disables caching for the group.
    pub duration: Duration,
}

impl GroupConfig {
    /// Whether the group can hold anything at all.
    pub fn is_enabled(&self) -> bool {
        !self.duration.is_zero() && (self.main_bytes > 0 || self.hot_bytes > 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub page: GroupConfig,
    pub listing: GroupConfig,
    pub sitemap: GroupConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            page: GroupConfig {
                main_bytes: DEFAULT_PAGE_MAIN_BYTES,
                hot_bytes: DEFAULT_PAGE_HOT_BYTES,
                duration: DEFAULT_DURATION,
            },
            listing: GroupConfig {
                main_bytes: DEFAULT_LISTING_MAIN_BYTES,
                hot_bytes: DEFAULT_LISTING_HOT_BYTES,
                duration: DEFAULT_DURATION,
            },
            sitemap: GroupConfig {
                main_bytes: DEFAULT_SITEMAP_MAIN_BYTES,
                hot_bytes: DEFAULT_SITEMAP_HOT_BYTES,
                duration: DEFAULT_DURATION,
            },
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        let group = |settings: &crate::config::GroupSettings| GroupConfig {
            main_bytes: settings.main_bytes,
            hot_bytes: settings.hot_bytes,
            duration: settings.duration,
        };
        Self {
            page: group(&settings.page),
            listing: group(&settings.listing),
            sitemap: group(&settings.sitemap),
        }
    }
}

impl CacheConfig {
    pub fn group(&self, kind: ResourceKind) -> GroupConfig {
        match kind {
            ResourceKind::Page => self.page,
            ResourceKind::Listing => self.listing,
            ResourceKind::Sitemap => self.sitemap,
        }
    }

    /// Same capacities with caching disabled for every kind.
    pub fn disabled() -> Self {
        let off = |group: GroupConfig| GroupConfig {
            duration: Duration::ZERO,
            ..group
        };
        let defaults = Self::default();
        Self {
            page: off(defaults.page),
            listing: off(defaults.listing),
            sitemap: off(defaults.sitemap),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cache_every_kind() {
        let config = CacheConfig::default();
        for kind in ResourceKind::ALL {
            assert!(config.group(kind).is_enabled(), "{kind}");
        }
        assert_eq!(config.page.duration, Duration::from_secs(600));
    }

    #[test]
    fn zero_duration_disables_group() {
        let config = CacheConfig::disabled();
        assert!(!config.page.is_enabled());
        assert_eq!(config.page.main_bytes, DEFAULT_PAGE_MAIN_BYTES);
    }

    #[test]
    fn zero_capacity_disables_group() {
        let group = GroupConfig {
            main_bytes: 0,
            hot_bytes: 0,
            duration: DEFAULT_DURATION,
        };
        assert!(!group.is_enabled());
    }
}
