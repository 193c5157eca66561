//! Render transforms and the collaborator interfaces they rely on.
//!
//! Transforms are pure: they receive source text and metadata already read from the
//! physical store and produce page bytes or a structured outcome. IO and caching happen
//! in the caller.

mod image;
mod markdown;
mod sitemap;
mod templates;
mod types;

pub use image::ImageTransform;
pub use markdown::{MarkdownSource, MarkdownTransform, PageDraft, PageOutcome};
pub use sitemap::{SITEMAP_TEMPLATE, SitemapTransform};
pub use templates::{
    CompiledTemplates, Fingerprint, TemplateRegistry, TemplateSnapshot, TemplateSources,
};
pub use types::{
    FOLDERS_KEY, FolderItem, FolderListings, FrontMatterDecoder, PageContext, PageInfo,
    RenderError, Renderer, TemplateCompiler, TemplateEngine, TemplateError, TemplateSource,
};
