use thiserror::Error;

/// Failure of a cache lookup. Shared by every waiter of a coalesced load and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("`{key}` does not exist")]
    NotFound { key: String },
    #[error("invalid cache key `{key}`")]
    InvalidKey { key: String },
    #[error("load of `{key}` failed: {message}")]
    Load { key: String, message: String },
    #[error("peer `{peer}` failed: {message}")]
    Peer { peer: String, message: String },
    #[error("load of `{key}` was aborted")]
    Aborted { key: String },
}

impl CacheError {
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn invalid_key(key: impl Into<String>) -> Self {
        Self::InvalidKey { key: key.into() }
    }

    pub fn load(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn peer(peer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Peer {
            peer: peer.into(),
            message: message.into(),
        }
    }

    pub fn aborted(key: impl Into<String>) -> Self {
        Self::Aborted { key: key.into() }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode cache value: {0}")]
    Encode(String),
    #[error("failed to decode cache value: {0}")]
    Decode(String),
}
