//! Virtual content filesystem.
//!
//! Presents the physical store through a transformed, read-only view:
//!
//! - `x.html` is rendered from `x.md` when no physical `x.html` exists; raw markdown is
//!   never visible.
//! - Inside image folders, `x.html` wraps the image `x.png` (or `.jpg`, `.gif`, `.jpeg`),
//!   while the image itself stays visible.
//! - The root `sitemap.txt` is executed as a template over every visible page path.
//! - Hidden segments (leading `.`) and the reserved top-level names `template` and
//!   `site.toml` do not exist.
//! - Pages dated in the future do not exist until their date passes.
//!
//! Page templates may list folders. Their listings are read before the template runs, so
//! template execution itself never touches the store.

mod error;
mod listing;
mod walk;

use std::{sync::Arc, time::Instant};

use bytes::Bytes;
use metrics::histogram;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, error, warn};

use crate::{
    application::{
        render::{
            CompiledTemplates, FolderItem, FolderListings, FrontMatterDecoder, ImageTransform,
            MarkdownSource, MarkdownTransform, PageOutcome, Renderer, SitemapTransform,
            TemplateCompiler, TemplateEngine, TemplateRegistry, TemplateSource, TemplateSources,
        },
        site_config::SiteConfig,
        store::{PhysicalStore, StoreError, StoreMetadata},
    },
    domain::{
        entry::{EntryKind, FileInfo, FileType, VirtualEntry},
        front_matter::FrontMatter,
        path,
    },
};

pub use error::VfsError;

const METRIC_RENDER_MS: &str = "vellum_render_ms";

/// Bytes and metadata of one opened file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualFile {
    pub info: FileInfo,
    pub kind: EntryKind,
    /// Present for rendered pages.
    pub front_matter: Option<FrontMatter>,
    pub body: Bytes,
}

/// A page whose front matter redirects elsewhere. It has no servable content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    pub info: FileInfo,
    pub target: String,
    pub front_matter: FrontMatter,
}

/// Outcome of opening a virtual path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Opened {
    File(VirtualFile),
    Directory(FileInfo),
    Redirect(Redirect),
}

impl Opened {
    pub fn info(&self) -> &FileInfo {
        match self {
            Opened::File(file) => &file.info,
            Opened::Directory(info) => info,
            Opened::Redirect(redirect) => &redirect.info,
        }
    }
}

/// External collaborators used by the render transforms.
#[derive(Clone)]
pub struct Collaborators {
    pub renderer: Arc<dyn Renderer>,
    pub decoder: Arc<dyn FrontMatterDecoder>,
    pub compiler: Arc<dyn TemplateCompiler>,
}

/// How a requested path maps onto the physical store. Resolved once per call.
enum Resolution {
    Directory(StoreMetadata),
    PassThrough(StoreMetadata),
    Sitemap(StoreMetadata),
    Markdown {
        source: String,
        metadata: StoreMetadata,
    },
    Image {
        source: String,
        metadata: StoreMetadata,
    },
}

pub struct VirtualFs {
    store: Arc<dyn PhysicalStore>,
    collaborators: Collaborators,
    templates: TemplateRegistry,
}

impl VirtualFs {
    /// Builds the filesystem and loads the site's page and sitemap templates.
    pub async fn new(
        store: Arc<dyn PhysicalStore>,
        collaborators: Collaborators,
    ) -> Result<Self, VfsError> {
        let sources = read_template_sources(store.as_ref()).await?;
        let compiled = compile_templates(&sources, collaborators.compiler.as_ref())?;
        Ok(Self {
            store,
            collaborators,
            templates: TemplateRegistry::new(sources.fingerprint(), compiled),
        })
    }

    /// Generation of the installed page templates.
    pub fn template_generation(&self) -> u64 {
        self.templates.generation()
    }

    /// Reloads the `template` folder and `sitemap.txt` and returns the live generation.
    ///
    /// The generation only moves when a source changed, so unchanged templates keep every
    /// cached entry valid. On failure the current set stays installed.
    pub async fn reload_templates(&self) -> Result<u64, VfsError> {
        match self.load_changed_templates().await {
            Ok(generation) => Ok(generation),
            Err(err) => {
                warn!(
                    target = "vellum::vfs",
                    error = %err,
                    generation = self.templates.generation(),
                    "Template reload failed; keeping current templates"
                );
                Err(err)
            }
        }
    }

    async fn load_changed_templates(&self) -> Result<u64, VfsError> {
        let sources = read_template_sources(self.store.as_ref()).await?;
        let fingerprint = sources.fingerprint();
        if self.templates.is_current(&fingerprint) {
            let generation = self.templates.generation();
            debug!(
                target = "vellum::vfs",
                generation, "Templates unchanged; keeping current set"
            );
            return Ok(generation);
        }
        let compiled = compile_templates(&sources, self.collaborators.compiler.as_ref())?;
        Ok(self.templates.install(fingerprint, compiled))
    }

    /// Reads `site.toml`. A missing file yields the defaults.
    pub async fn site_config(&self) -> Result<SiteConfig, VfsError> {
        match self.store.read(path::SITE_CONFIG_FILE).await {
            Ok(bytes) => Ok(SiteConfig::from_toml(&String::from_utf8_lossy(&bytes))?),
            Err(StoreError::NotFound { .. }) => Ok(SiteConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn open(&self, path: &str) -> Result<Opened, VfsError> {
        match self.resolve(path).await? {
            Resolution::Directory(metadata) => Ok(Opened::Directory(file_info(path, &metadata, 0))),
            Resolution::PassThrough(metadata) => {
                let body = self.store.read(path).await?;
                Ok(Opened::File(VirtualFile {
                    info: file_info(path, &metadata, body.len() as u64),
                    kind: EntryKind::PassThrough,
                    front_matter: None,
                    body,
                }))
            }
            Resolution::Sitemap(metadata) => self.render_sitemap(&metadata).await.map(Opened::File),
            Resolution::Markdown { source, metadata } => {
                self.render_markdown(path, &source, &metadata).await
            }
            Resolution::Image { source, metadata } => self
                .render_image(path, &source, &metadata)
                .map(Opened::File),
        }
    }

    /// Metadata of a virtual path. Rendered entries report their rendered size.
    pub async fn stat(&self, path: &str) -> Result<FileInfo, VfsError> {
        match self.resolve(path).await? {
            Resolution::Directory(metadata) => Ok(file_info(path, &metadata, 0)),
            Resolution::PassThrough(metadata) => Ok(file_info(path, &metadata, metadata.size)),
            _ => self.open(path).await.map(|opened| opened.info().clone()),
        }
    }

    /// Merged, name-sorted listing of a virtual directory.
    pub async fn read_dir(&self, path: &str) -> Result<Vec<VirtualEntry>, VfsError> {
        check_visible(path)?;
        let metadata = self.store.stat(path).await?;
        if !metadata.is_dir() {
            return Err(VfsError::Store(StoreError::not_a_directory(path)));
        }
        let entries = self.store.read_dir(path).await?;
        Ok(listing::merge(path, entries))
    }

    /// Front matter of the page at `path` without rendering it. Embargoed pages are
    /// included. Paths that are not rendered pages yield `None`.
    pub async fn front_matter(&self, path: &str) -> Result<Option<FrontMatter>, VfsError> {
        match self.resolve(path).await? {
            Resolution::Markdown { source, metadata } => {
                let text = self.store.read(&source).await?;
                let text = String::from_utf8_lossy(&text);
                let snapshot = self.templates.snapshot();
                let transform = self.markdown_transform(snapshot.pages.as_ref());
                Ok(Some(transform.front_matter(&MarkdownSource {
                    path,
                    source_name: path::split(&source).1,
                    text: &text,
                    modified: metadata.modified,
                })))
            }
            Resolution::Image { source, metadata } => Ok(Some(FrontMatter::for_image(
                path::split(&source).1,
                metadata.modified,
            ))),
            _ => Ok(None),
        }
    }

    /// Renders the root sitemap.
    pub async fn sitemap(&self) -> Result<VirtualFile, VfsError> {
        match self.resolve(path::SITEMAP_FILE).await? {
            Resolution::Sitemap(metadata) => self.render_sitemap(&metadata).await,
            _ => Err(VfsError::not_exist(path::SITEMAP_FILE)),
        }
    }

    async fn resolve(&self, path: &str) -> Result<Resolution, VfsError> {
        check_visible(path)?;

        match self.store.stat(path).await {
            Ok(metadata) if metadata.is_dir() => return Ok(Resolution::Directory(metadata)),
            Ok(metadata) if path::is_sitemap(path) => return Ok(Resolution::Sitemap(metadata)),
            Ok(_) if path::is_markdown(path) => return Err(VfsError::not_exist(path)),
            Ok(metadata) => return Ok(Resolution::PassThrough(metadata)),
            Err(StoreError::NotFound { .. }) => {}
            Err(err) => return Err(err.into()),
        }

        if !path::is_page(path) {
            return Err(VfsError::not_exist(path));
        }

        let markdown = path::with_extension(path, path::MARKDOWN_EXTENSION);
        if let Some(metadata) = self.regular_file(&markdown).await? {
            return Ok(Resolution::Markdown {
                source: markdown,
                metadata,
            });
        }

        if path::in_image_folder(path) {
            for ext in path::IMAGE_EXTENSIONS {
                let image = path::with_extension(path, ext);
                if let Some(metadata) = self.regular_file(&image).await? {
                    return Ok(Resolution::Image {
                        source: image,
                        metadata,
                    });
                }
            }
        }

        Err(VfsError::not_exist(path))
    }

    async fn regular_file(&self, path: &str) -> Result<Option<StoreMetadata>, VfsError> {
        match self.store.stat(path).await {
            Ok(metadata) if !metadata.is_dir() => Ok(Some(metadata)),
            Ok(_) | Err(StoreError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn markdown_transform<'a>(
        &'a self,
        templates: &'a dyn TemplateEngine,
    ) -> MarkdownTransform<'a> {
        MarkdownTransform {
            renderer: self.collaborators.renderer.as_ref(),
            decoder: self.collaborators.decoder.as_ref(),
            templates,
        }
    }

    async fn render_markdown(
        &self,
        path: &str,
        source: &str,
        metadata: &StoreMetadata,
    ) -> Result<Opened, VfsError> {
        let bytes = self.store.read(source).await?;
        let text = String::from_utf8_lossy(&bytes);
        let snapshot = self.templates.snapshot();
        let transform = self.markdown_transform(snapshot.pages.as_ref());
        let markdown = MarkdownSource {
            path,
            source_name: path::split(source).1,
            text: &text,
            modified: metadata.modified,
        };

        let started_at = Instant::now();
        let rendered = match transform.render(&markdown, OffsetDateTime::now_utc()) {
            Ok(PageOutcome::Page(draft)) => {
                let folders = self.folder_listings(&transform.folders(&draft)).await;
                transform.execute(&draft, &folders).map(|body| {
                    Some(Opened::File(VirtualFile {
                        info: file_info(path, metadata, body.len() as u64),
                        kind: EntryKind::MarkdownVirtual,
                        front_matter: Some(draft.front_matter),
                        body: Bytes::from(body),
                    }))
                })
            }
            Ok(PageOutcome::Redirect {
                front_matter,
                target,
            }) => Ok(Some(Opened::Redirect(Redirect {
                info: file_info(path, metadata, 0),
                target,
                front_matter,
            }))),
            Ok(PageOutcome::Embargoed) => Ok(None),
            Err(err) => Err(err),
        };
        histogram!(METRIC_RENDER_MS, "transform" => "markdown")
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        match rendered {
            Ok(Some(opened)) => Ok(opened),
            Ok(None) => Err(VfsError::not_exist(path)),
            Err(err) => {
                error!(
                    target = "vellum::vfs",
                    path,
                    source,
                    error = %err,
                    "Markdown transform failed"
                );
                Err(VfsError::transform(path, err))
            }
        }
    }

    /// Listings of `folders` for a page template. A folder that cannot be listed is logged
    /// and left out.
    async fn folder_listings(&self, folders: &[String]) -> FolderListings {
        let mut listings = FolderListings::new();
        for folder in folders {
            match self.folder_items(folder).await {
                Ok(items) => {
                    listings.insert(folder.clone(), items);
                }
                Err(err) => warn!(
                    target = "vellum::vfs",
                    folder = %folder,
                    error = %err,
                    "Skipping unreadable folder in page template"
                ),
            }
        }
        listings
    }

    /// Merged listing of `folder` with each entry's front matter. Index and error pages and
    /// embargoed pages are left out.
    async fn folder_items(&self, folder: &str) -> Result<Vec<FolderItem>, VfsError> {
        let now = OffsetDateTime::now_utc();
        let mut items = Vec::new();
        for entry in self.read_dir(folder).await? {
            if path::UNLISTED_PAGES.contains(&entry.name()) {
                continue;
            }
            let front_matter = match entry.kind {
                EntryKind::MarkdownVirtual | EntryKind::ImageVirtual => {
                    let full = path::join(folder, entry.name());
                    self.front_matter(&full).await?
                }
                EntryKind::PassThrough | EntryKind::SitemapVirtual => None,
            };
            if entry.kind == EntryKind::MarkdownVirtual
                && front_matter.as_ref().is_some_and(|fm| fm.is_embargoed(now))
            {
                continue;
            }
            items.push(FolderItem {
                front_matter: front_matter
                    .unwrap_or_else(|| FrontMatter::for_entry(entry.name(), entry.info.modified)),
                is_dir: entry.info.is_dir(),
                filename: entry.info.name,
            });
        }
        Ok(items)
    }

    fn render_image(
        &self,
        path: &str,
        source: &str,
        metadata: &StoreMetadata,
    ) -> Result<VirtualFile, VfsError> {
        let snapshot = self.templates.snapshot();
        let transform = ImageTransform {
            templates: snapshot.pages.as_ref(),
        };

        let started_at = Instant::now();
        let outcome = transform.render(path, path::split(source).1, metadata.modified);
        histogram!(METRIC_RENDER_MS, "transform" => "image")
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        let (front_matter, body) = outcome.map_err(|err| {
            error!(
                target = "vellum::vfs",
                path,
                source,
                error = %err,
                "Image transform failed"
            );
            VfsError::transform(path, err)
        })?;

        Ok(VirtualFile {
            info: file_info(path, metadata, body.len() as u64),
            kind: EntryKind::ImageVirtual,
            front_matter: Some(front_matter),
            body: Bytes::from(body),
        })
    }

    async fn render_sitemap(&self, metadata: &StoreMetadata) -> Result<VirtualFile, VfsError> {
        let snapshot = self.templates.snapshot();
        let Some(template) = snapshot.sitemap.as_deref() else {
            // Added after the last template load; the next reload picks it up.
            debug!(
                target = "vellum::vfs",
                generation = snapshot.generation,
                "Sitemap template not loaded"
            );
            return Err(VfsError::not_exist(path::SITEMAP_FILE));
        };

        let started_at = Instant::now();
        let paths = walk::collect_sitemap_paths(self).await?;
        let outcome = SitemapTransform { template }.render(&paths);
        histogram!(METRIC_RENDER_MS, "transform" => "sitemap")
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        let body = outcome.map_err(|err| {
            error!(
                target = "vellum::vfs",
                path = path::SITEMAP_FILE,
                error = %err,
                "Sitemap transform failed"
            );
            VfsError::transform(path::SITEMAP_FILE, err)
        })?;

        Ok(VirtualFile {
            info: file_info(path::SITEMAP_FILE, metadata, body.len() as u64),
            kind: EntryKind::SitemapVirtual,
            front_matter: None,
            body: Bytes::from(body),
        })
    }
}

fn check_visible(path: &str) -> Result<(), VfsError> {
    if !path::is_valid(path) {
        return Err(VfsError::invalid_path(path));
    }
    if path::is_concealed(path) {
        return Err(VfsError::not_exist(path));
    }
    Ok(())
}

fn file_info(path: &str, metadata: &StoreMetadata, size: u64) -> FileInfo {
    let name = if path == path::ROOT {
        path::ROOT
    } else {
        path::split(path).1
    };
    FileInfo {
        name: name.to_string(),
        size,
        file_type: if metadata.is_dir() {
            FileType::Directory
        } else {
            FileType::Regular
        },
        modified: metadata.modified,
    }
}

async fn read_template_sources(store: &dyn PhysicalStore) -> Result<TemplateSources, VfsError> {
    let mut sources = TemplateSources::default();
    match store.stat(path::TEMPLATE_DIR).await {
        Ok(metadata) if metadata.is_dir() => {
            let mut entries = store.read_dir(path::TEMPLATE_DIR).await?;
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            for entry in entries {
                if entry.metadata.is_dir()
                    || entry.name.starts_with('.')
                    || !path::is_page(&entry.name)
                {
                    continue;
                }
                let file = path::join(path::TEMPLATE_DIR, &entry.name);
                let body = store.read(&file).await?;
                sources.pages.push(TemplateSource::new(
                    path::strip_extension(&entry.name),
                    String::from_utf8_lossy(&body),
                ));
            }
        }
        Ok(_) | Err(StoreError::NotFound { .. }) => {}
        Err(err) => return Err(err.into()),
    }

    match store.stat(path::SITEMAP_FILE).await {
        Ok(metadata) if !metadata.is_dir() => {
            let body = store.read(path::SITEMAP_FILE).await?;
            sources.sitemap = Some(String::from_utf8_lossy(&body).into_owned());
        }
        Ok(_) | Err(StoreError::NotFound { .. }) => {}
        Err(err) => return Err(err.into()),
    }

    Ok(sources)
}

fn compile_templates(
    sources: &TemplateSources,
    compiler: &dyn TemplateCompiler,
) -> Result<CompiledTemplates, VfsError> {
    sources
        .compile(compiler)
        .map_err(|err| VfsError::transform(path::TEMPLATE_DIR, err.into()))
}
