//! Cache key definitions.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Kind of cached resource. Each kind is served by its own cache group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Result of `open` on any virtual path.
    Page,
    /// Merged directory listing.
    Listing,
    /// Rendered root sitemap.
    Sitemap,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [Self::Page, Self::Listing, Self::Sitemap];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Listing => "listing",
            Self::Sitemap => "sitemap",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one cached value.
///
/// Everything that influences the cached bytes is part of the key: the template
/// generation is folded in as `revision`, so a template reload never serves output
/// rendered with the previous set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub kind: ResourceKind,
    /// Virtual path the value was computed for.
    pub discriminator: String,
    pub revision: u64,
    /// Quantized time bucket.
    pub bucket: i64,
}

impl CacheKey {
    pub fn new(
        kind: ResourceKind,
        discriminator: impl Into<String>,
        revision: u64,
        bucket: i64,
    ) -> Self {
        Self {
            kind,
            discriminator: discriminator.into(),
            revision,
            bucket,
        }
    }

    /// Stable 64-bit hash used to place the key on the peer ring.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(self.kind.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(self.discriminator.as_bytes());
        hasher.update([0]);
        hasher.update(self.revision.to_be_bytes());
        hasher.update(self.bucket.to_be_bytes());
        leading_u64(&hasher.finalize())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}@{}#{}",
            self.kind, self.discriminator, self.revision, self.bucket
        )
    }
}

/// SHA-256 of `data` reduced to its first eight bytes.
pub(crate) fn digest64(data: &[u8]) -> u64 {
    leading_u64(&Sha256::digest(data))
}

fn leading_u64(digest: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_kind_names_parse_back() {
        for kind in ResourceKind::ALL {
            assert_eq!(ResourceKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ResourceKind::parse("feed"), None);
    }

    #[test]
    fn fingerprint_depends_on_every_field() {
        let base = CacheKey::new(ResourceKind::Page, "blog/a.html", 1, 10);
        let variants = [
            CacheKey::new(ResourceKind::Listing, "blog/a.html", 1, 10),
            CacheKey::new(ResourceKind::Page, "blog/b.html", 1, 10),
            CacheKey::new(ResourceKind::Page, "blog/a.html", 2, 10),
            CacheKey::new(ResourceKind::Page, "blog/a.html", 1, 11),
        ];
        for variant in variants {
            assert_ne!(base.fingerprint(), variant.fingerprint(), "{variant}");
        }
        assert_eq!(base.fingerprint(), base.clone().fingerprint());
    }
}
