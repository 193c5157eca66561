//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::domain::duration::parse_duration;

pub use cli::{
    CatArgs, CliArgs, Command, LsArgs, ServeArgs, ServeOverrides, SiteOverride, SitemapArgs,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "vellum";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_TEMPLATE_RELOAD: Duration = Duration::from_secs(600);
const DEFAULT_SITE_ROOT: &str = ".";
const DEFAULT_CACHE_DURATION: Duration = Duration::from_secs(600);
const MIB: usize = 1024 * 1024;
const DEFAULT_PAGE_MAIN_BYTES: usize = 32 * MIB;
const DEFAULT_PAGE_HOT_BYTES: usize = 4 * MIB;
const DEFAULT_LISTING_MAIN_BYTES: usize = 4 * MIB;
const DEFAULT_LISTING_HOT_BYTES: usize = MIB / 2;
const DEFAULT_SITEMAP_MAIN_BYTES: usize = MIB;
const DEFAULT_SITEMAP_HOT_BYTES: usize = MIB / 4;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub site: SiteSettings,
    pub cache: CacheSettings,
    pub peers: PeerSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
    /// Interval between template reloads; zero disables periodic reloads.
    pub template_reload: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub page: GroupSettings,
    pub listing: GroupSettings,
    pub sitemap: GroupSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSettings {
    pub main_bytes: usize,
    pub hot_bytes: usize,
    /// Zero disables caching for the group.
    pub duration: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct PeerSettings {
    /// This node's own URL. Required when `urls` is not empty.
    pub self_url: Option<String>,
    pub urls: Vec<String>,
}

impl PeerSettings {
    pub fn is_clustered(&self) -> bool {
        self.self_url.is_some() && !self.urls.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix("VELLUM")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("peers.urls")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Cat(args)) => raw.apply_site_override(&args.site),
        Some(Command::Ls(args)) => raw.apply_site_override(&args.site),
        Some(Command::Sitemap(args)) => raw.apply_site_override(&args.site),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Parse command-line arguments and load settings for them.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    site: RawSiteSettings,
    cache: RawCacheSettings,
    peers: RawPeerSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_site_override(&overrides.site);
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(reload) = overrides.template_reload.as_ref() {
            self.server.template_reload = Some(reload.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(duration) = overrides.cache_duration.as_ref() {
            for group in [
                &mut self.cache.page,
                &mut self.cache.listing,
                &mut self.cache.sitemap,
            ] {
                group.duration = Some(duration.clone());
            }
        }
        if let Some(url) = overrides.peers_self_url.as_ref() {
            self.peers.self_url = Some(url.clone());
        }
        if !overrides.peers.is_empty() {
            self.peers.urls = Some(overrides.peers.clone());
        }
    }

    fn apply_site_override(&mut self, overrides: &SiteOverride) {
        if let Some(root) = overrides.root.as_ref() {
            self.site.root = Some(root.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            site,
            cache,
            peers,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let site = build_site_settings(site)?;
        let cache = build_cache_settings(cache)?;
        let peers = build_peer_settings(peers)?;

        Ok(Self {
            server,
            logging,
            site,
            cache,
            peers,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    let template_reload = match server.template_reload {
        Some(text) => duration_setting(&text, "server.template_reload")?,
        None => DEFAULT_TEMPLATE_RELOAD,
    };

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
        template_reload,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_site_settings(site: RawSiteSettings) -> Result<SiteSettings, LoadError> {
    let root = site
        .root
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SITE_ROOT));
    if root.as_os_str().is_empty() {
        return Err(LoadError::invalid("site.root", "path must not be empty"));
    }
    Ok(SiteSettings { root })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    Ok(CacheSettings {
        page: build_group_settings(
            cache.page,
            ("cache.page.duration", DEFAULT_PAGE_MAIN_BYTES, DEFAULT_PAGE_HOT_BYTES),
        )?,
        listing: build_group_settings(
            cache.listing,
            (
                "cache.listing.duration",
                DEFAULT_LISTING_MAIN_BYTES,
                DEFAULT_LISTING_HOT_BYTES,
            ),
        )?,
        sitemap: build_group_settings(
            cache.sitemap,
            (
                "cache.sitemap.duration",
                DEFAULT_SITEMAP_MAIN_BYTES,
                DEFAULT_SITEMAP_HOT_BYTES,
            ),
        )?,
    })
}

fn build_group_settings(
    group: RawGroupSettings,
    (key, main_default, hot_default): (&'static str, usize, usize),
) -> Result<GroupSettings, LoadError> {
    let duration = match group.duration {
        Some(text) => duration_setting(&text, key)?,
        None => DEFAULT_CACHE_DURATION,
    };
    Ok(GroupSettings {
        main_bytes: group.main_bytes.unwrap_or(main_default),
        hot_bytes: group.hot_bytes.unwrap_or(hot_default),
        duration,
    })
}

fn build_peer_settings(peers: RawPeerSettings) -> Result<PeerSettings, LoadError> {
    let self_url = peers
        .self_url
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(|value| normalize_url(&value, "peers.self_url"))
        .transpose()?;

    let urls = peers
        .urls
        .unwrap_or_default()
        .iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(|value| normalize_url(value, "peers.urls"))
        .collect::<Result<Vec<_>, _>>()?;

    if !urls.is_empty() && self_url.is_none() {
        return Err(LoadError::invalid(
            "peers.self_url",
            "required when peers.urls is set",
        ));
    }

    Ok(PeerSettings { self_url, urls })
}

fn normalize_url(value: &str, key: &'static str) -> Result<String, LoadError> {
    let url = Url::parse(value)
        .map_err(|err| LoadError::invalid(key, format!("`{value}` is not a URL: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            key,
            format!("`{value}` must use http or https"),
        ));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn duration_setting(text: &str, key: &'static str) -> Result<Duration, LoadError> {
    parse_duration(text.trim()).map_err(|err| LoadError::invalid(key, err.to_string()))
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("`{candidate}` is not a socket address: {err}"))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
    template_reload: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    root: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    page: RawGroupSettings,
    listing: RawGroupSettings,
    sitemap: RawGroupSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawGroupSettings {
    main_bytes: Option<usize>,
    hot_bytes: Option<usize>,
    duration: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPeerSettings {
    self_url: Option<String>,
    urls: Option<Vec<String>>,
}
