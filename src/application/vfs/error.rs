use thiserror::Error;

use crate::{
    application::{render::RenderError, site_config::SiteConfigError, store::StoreError},
    cache::CacheError,
};

/// Failures of virtual filesystem operations.
///
/// `PermissionDenied` is reported separately but carries no security meaning at this
/// layer; callers treat it like `NotExist`.
#[derive(Debug, Error)]
pub enum VfsError {
    #[error("invalid path `{path}`")]
    InvalidPath { path: String },
    #[error("`{path}` does not exist")]
    NotExist { path: String },
    #[error("permission denied for `{path}`")]
    PermissionDenied { path: String },
    #[error("failed to render `{path}`: {source}")]
    Transform {
        path: String,
        #[source]
        source: RenderError,
    },
    #[error(transparent)]
    Store(StoreError),
    #[error("corrupt cached payload for `{path}`: {message}")]
    Decode { path: String, message: String },
    #[error("site configuration: {0}")]
    SiteConfig(#[from] SiteConfigError),
    #[error(transparent)]
    Cache(CacheError),
}

impl VfsError {
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath { path: path.into() }
    }

    pub fn not_exist(path: impl Into<String>) -> Self {
        Self::NotExist { path: path.into() }
    }

    pub fn transform(path: impl Into<String>, source: RenderError) -> Self {
        Self::Transform {
            path: path.into(),
            source,
        }
    }

    pub fn decode(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            message: message.into(),
        }
    }

    /// True for every error a caller should present as "not found".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotExist { .. } | Self::PermissionDenied { .. })
    }
}

impl From<StoreError> for VfsError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { path } => Self::NotExist { path },
            StoreError::PermissionDenied { path } => Self::PermissionDenied { path },
            other => Self::Store(other),
        }
    }
}

impl From<CacheError> for VfsError {
    fn from(error: CacheError) -> Self {
        match error {
            CacheError::NotFound { key } => Self::NotExist { path: key },
            CacheError::InvalidKey { key } => Self::InvalidPath { path: key },
            other => Self::Cache(other),
        }
    }
}
