//! Site-level settings read from the reserved `site.toml` file at the root.

use std::{collections::BTreeMap, time::Duration};

use serde::Deserialize;
use thiserror::Error;

use crate::domain::duration::parse_duration;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteConfig {
    /// Lifetime advertised for pages, directories and the sitemap.
    pub expires: Option<Duration>,
    /// Lifetime advertised for pass-through files.
    pub static_expires: Option<Duration>,
    /// Extra response headers added to every response.
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Error)]
pub enum SiteConfigError {
    #[error("site configuration is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid site configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSiteConfig {
    expires: Option<String>,
    staticexpires: Option<String>,
    headers: BTreeMap<String, String>,
}

impl SiteConfig {
    pub fn from_toml(text: &str) -> Result<Self, SiteConfigError> {
        let raw: RawSiteConfig = toml::from_str(text)?;
        Ok(Self {
            expires: parse_optional(raw.expires, "expires")?,
            static_expires: parse_optional(raw.staticexpires, "staticexpires")?,
            headers: raw.headers,
        })
    }
}

fn parse_optional(
    value: Option<String>,
    key: &'static str,
) -> Result<Option<Duration>, SiteConfigError> {
    match value {
        None => Ok(None),
        Some(text) => parse_duration(&text)
            .map(|duration| (!duration.is_zero()).then_some(duration))
            .map_err(|err| SiteConfigError::Invalid {
                key,
                reason: err.to_string(),
            }),
    }
}
