//! Markdown transform: front matter, markup conversion and page template execution.

use time::OffsetDateTime;
use tracing::warn;

use crate::domain::front_matter::{FrontMatter, FrontMatterFields, split_front_matter};

use super::types::{
    FolderListings, FrontMatterDecoder, PageContext, PageInfo, RenderError, Renderer,
    TemplateEngine, TemplateError,
};

/// A markdown source about to be rendered as the page at `path`.
#[derive(Debug, Clone, Copy)]
pub struct MarkdownSource<'a> {
    /// Virtual path of the page (`blog/post1.html`).
    pub path: &'a str,
    /// File name of the markdown source (`post1.md`).
    pub source_name: &'a str,
    pub text: &'a str,
    pub modified: OffsetDateTime,
}

/// Result of rendering one markdown page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Page(PageDraft),
    Redirect {
        front_matter: FrontMatter,
        target: String,
    },
    /// The page is dated in the future and must not be visible yet.
    Embargoed,
}

/// A page with resolved front matter and markup whose template has not run yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDraft {
    pub front_matter: FrontMatter,
    page: PageInfo,
    content: String,
}

impl PageDraft {
    fn context(&self, folders: &FolderListings) -> Result<serde_json::Value, RenderError> {
        let context = PageContext {
            front_matter: &self.front_matter,
            page: self.page.clone(),
            content: &self.content,
            folders,
        };
        serde_json::to_value(&context).map_err(|err| RenderError::context(err.to_string()))
    }
}

pub struct MarkdownTransform<'a> {
    pub renderer: &'a dyn Renderer,
    pub decoder: &'a dyn FrontMatterDecoder,
    pub templates: &'a dyn TemplateEngine,
}

impl MarkdownTransform<'_> {
    /// Resolves the front matter of `source`. A block that fails to decode is logged
    /// and replaced by defaults.
    pub fn front_matter(&self, source: &MarkdownSource<'_>) -> FrontMatter {
        let (block, _) = split_front_matter(source.text);
        resolve_front_matter(self.decoder, source, block)
    }

    /// Resolves front matter and converts the body. Pages come back as a [`PageDraft`]
    /// that [`MarkdownTransform::execute`] finishes.
    pub fn render(
        &self,
        source: &MarkdownSource<'_>,
        now: OffsetDateTime,
    ) -> Result<PageOutcome, RenderError> {
        let (block, body) = split_front_matter(source.text);
        let front_matter = resolve_front_matter(self.decoder, source, block);

        if front_matter.is_embargoed(now) {
            return Ok(PageOutcome::Embargoed);
        }
        if let Some(target) = front_matter.redirect.clone() {
            return Ok(PageOutcome::Redirect {
                front_matter,
                target,
            });
        }

        let content = self.renderer.to_markup(body)?;
        if !self.templates.has_template(&front_matter.template) {
            return Err(TemplateError::unknown(front_matter.template.as_str()).into());
        }
        Ok(PageOutcome::Page(PageDraft {
            front_matter,
            page: PageInfo::from_virtual_path(source.path),
            content,
        }))
    }

    /// Folders the draft's template lists.
    pub fn folders(&self, draft: &PageDraft) -> Vec<String> {
        match draft.context(&FolderListings::new()) {
            Ok(data) => self
                .templates
                .folder_references(&draft.front_matter.template, &data),
            Err(_) => Vec::new(),
        }
    }

    /// Executes the draft's template with the listings of the folders it references.
    pub fn execute(
        &self,
        draft: &PageDraft,
        folders: &FolderListings,
    ) -> Result<String, RenderError> {
        let data = draft.context(folders)?;
        Ok(self.templates.execute(&draft.front_matter.template, &data)?)
    }
}

fn resolve_front_matter(
    decoder: &dyn FrontMatterDecoder,
    source: &MarkdownSource<'_>,
    block: Option<&str>,
) -> FrontMatter {
    let fields = match block {
        Some(block) if !block.is_empty() => decoder.decode(block).unwrap_or_else(|err| {
            warn!(
                target = "vellum::render::markdown",
                path = source.path,
                error = %err,
                "Ignoring malformed front matter"
            );
            FrontMatterFields::default()
        }),
        _ => FrontMatterFields::default(),
    };
    FrontMatter::for_markdown(fields, source.source_name, source.modified)
}
