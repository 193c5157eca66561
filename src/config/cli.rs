use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the Vellum binary.
#[derive(Debug, Parser)]
#[command(
    name = "vellum",
    version,
    about = "Serves a content folder through a rendered, cached virtual view"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "VELLUM_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP server.
    Serve(Box<ServeArgs>),
    /// Print a virtual file, or the target of a redirect.
    Cat(CatArgs),
    /// Print the merged listing of a virtual directory.
    Ls(LsArgs),
    /// Print the rendered sitemap.
    Sitemap(SitemapArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct SiteOverride {
    /// Override the site root folder.
    #[arg(long = "root", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub site: SiteOverride,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override how often templates are reloaded (`10m`, `0` disables).
    #[arg(long = "template-reload", value_name = "DURATION")]
    pub template_reload: Option<String>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the cache duration of every resource kind (`90s`, `0` disables).
    #[arg(long = "cache-duration", value_name = "DURATION")]
    pub cache_duration: Option<String>,

    /// Override this node's URL as seen by its peers.
    #[arg(long = "peers-self-url", value_name = "URL")]
    pub peers_self_url: Option<String>,

    /// Peer URL; repeat for every member of the cluster.
    #[arg(long = "peer", value_name = "URL")]
    pub peers: Vec<String>,
}

#[derive(Debug, Args, Clone)]
pub struct CatArgs {
    #[command(flatten)]
    pub site: SiteOverride,

    /// Virtual path to print, relative to the site root.
    #[arg(value_name = "PATH")]
    pub path: String,
}

#[derive(Debug, Args, Clone)]
pub struct LsArgs {
    #[command(flatten)]
    pub site: SiteOverride,

    /// Virtual directory to list; defaults to the site root.
    #[arg(value_name = "PATH", default_value = ".")]
    pub path: String,
}

#[derive(Debug, Args, Default, Clone)]
pub struct SitemapArgs {
    #[command(flatten)]
    pub site: SiteOverride,
}
