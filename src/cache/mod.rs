//! Quantized cache overlay for the virtual filesystem.
//!
//! - Keys carry a time bucket from [`quantize`], so entries expire by being superseded
//!   rather than by per-entry timers, and different paths roll over at different instants.
//! - Each resource kind has its own [`CacheGroup`]: byte-bounded hot/main tiers and at
//!   most one in-flight load per key.
//! - With peers configured, a consistent [`HashRing`] decides which node loads a key.

mod cached_fs;
pub mod codec;
mod config;
mod error;
mod group;
mod keys;
pub(crate) mod lock;
mod peers;
mod quantize;
mod registry;
mod store;

pub use cached_fs::CachedFs;
pub use codec::ListingRecord;
pub use config::{CacheConfig, GroupConfig};
pub use error::{CacheError, CodecError};
pub use group::{CacheGroup, CacheStats, Loader};
pub use keys::{CacheKey, ResourceKind};
pub use peers::{HashRing, NoPeers, PeerGetter, PeerPicker};
pub use quantize::{phase, quantize};
pub use registry::GroupRegistry;
pub use store::{Tier, TierUsage, TieredStore};
