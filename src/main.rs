use std::{
    future::IntoFuture,
    io::{self, Write},
    process,
    sync::Arc,
    time::Duration,
};

use tokio::{sync::Notify, task::JoinHandle};
use tracing::{Dispatch, Level, debug, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use vellum::{
    application::{
        error::AppError,
        vfs::{Collaborators, Opened, VirtualFs},
    },
    cache::{CacheConfig, CachedFs},
    config::{self, Command, Settings},
    domain::{entry::EntryKind, path},
    infra::{
        error::InfraError,
        front_matter::TomlFrontMatter,
        http::{self, HttpState, SiteHandle},
        markdown::ComrakRenderer,
        peers,
        store::DirStore,
        telemetry,
        templates::PlaceholderCompiler,
    },
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    let command = cli_args
        .command
        .unwrap_or(Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        Command::Serve(_) => run_serve(settings).await,
        Command::Cat(args) => run_cat(&settings, &args.path).await,
        Command::Ls(args) => run_ls(&settings, &args.path).await,
        Command::Sitemap(_) => run_sitemap(&settings).await,
    }
}

async fn build_virtual_fs(settings: &Settings) -> Result<Arc<VirtualFs>, AppError> {
    let root = &settings.site.root;
    let metadata = tokio::fs::metadata(root).await.map_err(InfraError::from)?;
    if !metadata.is_dir() {
        return Err(InfraError::configuration(format!(
            "site root `{}` is not a directory",
            root.display()
        ))
        .into());
    }

    let collaborators = Collaborators {
        renderer: Arc::new(ComrakRenderer::new()),
        decoder: Arc::new(TomlFrontMatter),
        compiler: Arc::new(PlaceholderCompiler::new()),
    };
    let vfs = VirtualFs::new(Arc::new(DirStore::new(root)), collaborators).await?;
    Ok(Arc::new(vfs))
}

fn build_cached_fs(vfs: Arc<VirtualFs>, settings: &Settings) -> Result<CachedFs, AppError> {
    let config = CacheConfig::from(&settings.cache);
    match settings.peers.self_url.as_deref() {
        Some(self_url) if settings.peers.is_clustered() => {
            let ring = peers::build_ring(self_url, &settings.peers.urls)
                .map_err(|err| InfraError::configuration(format!("peer client: {err}")))?;
            info!(
                target = "vellum::peers",
                self_url,
                nodes = ring.node_count(),
                "Cache sharded across peers"
            );
            Ok(CachedFs::with_peers(vfs, config, Arc::new(ring)))
        }
        _ => Ok(CachedFs::new(vfs, config)),
    }
}

async fn run_serve(settings: Settings) -> Result<(), AppError> {
    let vfs = build_virtual_fs(&settings).await?;
    let site = Arc::new(SiteHandle::new(vfs.site_config().await?));
    let fs = Arc::new(build_cached_fs(vfs, &settings)?);

    let reload_handle = spawn_template_reload(
        Arc::clone(&fs),
        Arc::clone(&site),
        settings.server.template_reload,
    );

    let result = serve_http(&settings, HttpState::new(fs, site)).await;

    if let Some(handle) = reload_handle {
        handle.abort();
        let _ = handle.await;
    }
    result
}

async fn serve_http(settings: &Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;
    info!(
        target = "vellum::http",
        addr = %settings.server.addr,
        root = %settings.site.root.display(),
        "Listening"
    );

    let shutdown = Arc::new(Notify::new());
    let trigger = Arc::clone(&shutdown);
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            trigger.notify_one();
        })
        .into_future();

    let grace = settings.server.graceful_shutdown;
    let deadline = async move {
        shutdown.notified().await;
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server => result.map_err(|err| InfraError::server(err.to_string()))?,
        () = deadline => {
            warn!(
                target = "vellum::http",
                grace_secs = grace.as_secs(),
                "Graceful shutdown timed out; dropping open connections"
            );
        }
    }
    info!(target = "vellum::http", "Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target = "vellum::http", error = %err, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(target = "vellum::http", error = %err, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!(target = "vellum::http", "Shutdown requested");
}

/// Reloads templates and `site.toml` every `every`; a zero interval disables reloading.
fn spawn_template_reload(
    fs: Arc<CachedFs>,
    site: Arc<SiteHandle>,
    every: Duration,
) -> Option<JoinHandle<()>> {
    if every.is_zero() {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await; // Skip the first immediate tick
        loop {
            interval.tick().await;
            if let Err(err) = fs.vfs().reload_templates().await {
                debug!(
                    target = "vellum::site",
                    error = %err,
                    "Serving previous templates until the next reload"
                );
            }
            match fs.vfs().site_config().await {
                Ok(config) => site.replace(config),
                Err(err) => warn!(
                    target = "vellum::site",
                    error = %err,
                    "Site configuration reload failed; keeping current settings"
                ),
            }
        }
    }))
}

async fn run_cat(settings: &Settings, target: &str) -> Result<(), AppError> {
    let vfs = build_virtual_fs(settings).await?;
    let path = normalize_cli_path(target);
    match vfs.open(&path).await? {
        Opened::File(file) => write_stdout(&file.body),
        Opened::Redirect(redirect) => {
            write_stdout(format!("redirect: {}\n", redirect.target).as_bytes())
        }
        Opened::Directory(_) => Err(AppError::unexpected(format!(
            "`{path}` is a directory; use `ls`"
        ))),
    }
}

async fn run_ls(settings: &Settings, target: &str) -> Result<(), AppError> {
    let vfs = build_virtual_fs(settings).await?;
    let entries = vfs.read_dir(&normalize_cli_path(target)).await?;

    let mut out = String::new();
    for entry in entries {
        let kind = match entry.kind {
            EntryKind::PassThrough => "file",
            EntryKind::MarkdownVirtual => "markdown",
            EntryKind::ImageVirtual => "image",
            EntryKind::SitemapVirtual => "sitemap",
        };
        let kind = if entry.info.is_dir() { "dir" } else { kind };
        let size = if entry.size_is_exact() {
            entry.info.size.to_string()
        } else {
            format!("~{}", entry.info.size)
        };
        let suffix = if entry.info.is_dir() { "/" } else { "" };
        out.push_str(&format!(
            "{kind:<8} {size:>10} {name}{suffix}\n",
            name = entry.name()
        ));
    }
    write_stdout(out.as_bytes())
}

async fn run_sitemap(settings: &Settings) -> Result<(), AppError> {
    let vfs = build_virtual_fs(settings).await?;
    let sitemap = vfs.sitemap().await?;
    write_stdout(&sitemap.body)
}

/// Accepts `/a/b`, `a/b/` and `/` as spellings of virtual paths.
fn normalize_cli_path(target: &str) -> String {
    let trimmed = target.trim_matches('/');
    if trimmed.is_empty() {
        path::ROOT.to_string()
    } else {
        trimmed.to_string()
    }
}

fn write_stdout(bytes: &[u8]) -> Result<(), AppError> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(bytes)
        .and_then(|()| stdout.flush())
        .map_err(|err| AppError::from(InfraError::from(err)))
}
