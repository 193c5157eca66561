use std::{collections::BTreeMap, sync::Arc};

use serde::Serialize;
use thiserror::Error;

use crate::domain::front_matter::{FrontMatter, FrontMatterFields};

/// Structured errors surfaced by the render transforms.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("markdown conversion failed: {message}")]
    Markdown { message: String },
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("front matter could not be decoded: {message}")]
    FrontMatter { message: String },
    #[error("template data could not be built: {message}")]
    Context { message: String },
}

impl RenderError {
    pub fn markdown(message: impl Into<String>) -> Self {
        Self::Markdown {
            message: message.into(),
        }
    }

    pub fn front_matter(message: impl Into<String>) -> Self {
        Self::FrontMatter {
            message: message.into(),
        }
    }

    pub fn context(message: impl Into<String>) -> Self {
        Self::Context {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template `{name}` failed to parse: {message}")]
    Parse { name: String, message: String },
    #[error("template `{name}` is not defined")]
    UnknownTemplate { name: String },
}

impl TemplateError {
    pub fn parse(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn unknown(name: impl Into<String>) -> Self {
        Self::UnknownTemplate { name: name.into() }
    }
}

/// Converts markdown to markup. Implementations must be deterministic.
pub trait Renderer: Send + Sync {
    fn to_markup(&self, markdown: &str) -> Result<String, RenderError>;
}

/// Decodes the text of a front-matter block.
pub trait FrontMatterDecoder: Send + Sync {
    fn decode(&self, block: &str) -> Result<FrontMatterFields, RenderError>;
}

/// A compiled, immutable set of named templates.
pub trait TemplateEngine: Send + Sync {
    fn execute(&self, name: &str, data: &serde_json::Value) -> Result<String, TemplateError>;

    fn has_template(&self, name: &str) -> bool;

    /// Folders whose listings template `name` reads when executed with `data`. The caller
    /// provides them under [`FOLDERS_KEY`].
    fn folder_references(&self, _name: &str, _data: &serde_json::Value) -> Vec<String> {
        Vec::new()
    }
}

/// Source text of one named template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSource {
    pub name: String,
    pub body: String,
}

impl TemplateSource {
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }
}

pub trait TemplateCompiler: Send + Sync {
    /// Compiles the site's page templates. Values are HTML-escaped; names the site does not
    /// provide fall back to the built-in `default` and `image` templates.
    fn compile_pages(
        &self,
        sources: &[TemplateSource],
    ) -> Result<Arc<dyn TemplateEngine>, TemplateError>;

    /// Compiles one plain-text template without escaping.
    fn compile_text(
        &self,
        source: &TemplateSource,
    ) -> Result<Arc<dyn TemplateEngine>, TemplateError>;
}

/// Location of the page being rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    /// Directory part of the page URL, with leading and trailing slash (`/blog/`).
    pub path: String,
    pub filename: String,
    /// Full URL path of the page (`/blog/post1.html`).
    pub pathname: String,
}

impl PageInfo {
    /// Builds page information from a virtual path such as `blog/post1.html`.
    pub fn from_virtual_path(path: &str) -> Self {
        let (dir, filename) = match path.rfind('/') {
            Some(idx) => (&path[..=idx], &path[idx + 1..]),
            None => ("", path),
        };
        Self {
            path: format!("/{dir}"),
            filename: filename.to_string(),
            pathname: format!("/{path}"),
        }
    }
}

/// Key of the folder listings inside page template data.
pub const FOLDERS_KEY: &str = "folders";

/// One entry of a folder listing as page templates see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderItem {
    pub filename: String,
    pub is_dir: bool,
    pub front_matter: FrontMatter,
}

/// Listings keyed by directory path (`blog`, `.` for the root).
pub type FolderListings = BTreeMap<String, Vec<FolderItem>>;

/// Data handed to a page template for the duration of one render.
#[derive(Debug, Serialize)]
pub struct PageContext<'a> {
    pub front_matter: &'a FrontMatter,
    pub page: PageInfo,
    pub content: &'a str,
    pub folders: &'a FolderListings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_info_splits_directory_and_file() {
        let info = PageInfo::from_virtual_path("blog/post1.html");
        assert_eq!(info.path, "/blog/");
        assert_eq!(info.filename, "post1.html");
        assert_eq!(info.pathname, "/blog/post1.html");

        let root = PageInfo::from_virtual_path("index.html");
        assert_eq!(root.path, "/");
        assert_eq!(root.filename, "index.html");
    }
}
