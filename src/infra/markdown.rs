//! Markdown to HTML through comrak.

use comrak::{Arena, format_html, options::Options, parse_document};

use crate::application::render::{RenderError, Renderer};

/// Markdown renderer with the common GitHub extensions and footnotes enabled.
///
/// Raw HTML in sources is passed through; site content is trusted.
pub struct ComrakRenderer {
    options: Options<'static>,
}

impl ComrakRenderer {
    pub fn new() -> Self {
        Self {
            options: default_options(),
        }
    }
}

impl Default for ComrakRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for ComrakRenderer {
    fn to_markup(&self, markdown: &str) -> Result<String, RenderError> {
        let arena = Arena::new();
        let root = parse_document(&arena, markdown, &self.options);

        let mut html = String::new();
        format_html(root, &self.options, &mut html)
            .map_err(|err| RenderError::markdown(err.to_string()))?;
        Ok(html)
    }
}

fn default_options() -> Options<'static> {
    let mut options = Options::default();

    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.table = true;
    ext.autolink = true;
    ext.tasklist = true;
    ext.footnotes = true;

    let render = &mut options.render;
    render.r#unsafe = true;
    render.github_pre_lang = true;

    options
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(markdown: &str) -> String {
        ComrakRenderer::new().to_markup(markdown).unwrap()
    }

    #[test]
    fn renders_paragraphs_and_emphasis() {
        assert_eq!(render("hello *world*"), "<p>hello <em>world</em></p>\n");
    }

    #[test]
    fn renders_tables_and_strikethrough() {
        let html = render("| a | b |\n|---|---|\n| 1 | ~~2~~ |\n");
        assert!(html.contains("<table>"));
        assert!(html.contains("<del>2</del>"));
    }

    #[test]
    fn renders_footnotes() {
        let html = render("text[^1]\n\n[^1]: note\n");
        assert!(html.contains("footnote"));
        assert!(html.contains("note"));
    }

    #[test]
    fn keeps_raw_html() {
        let html = render("<div class=\"x\">raw</div>\n");
        assert!(html.contains("<div class=\"x\">raw</div>"));
    }

    #[test]
    fn autolinks_bare_urls() {
        let html = render("see https://example.com now");
        assert!(html.contains("<a href=\"https://example.com\">"));
    }
}
