//! Sitemap transform: executes the root `sitemap.txt` template over the site's page paths.

use serde::Serialize;

use super::types::{RenderError, TemplateEngine};

/// Name under which the sitemap template is compiled.
pub const SITEMAP_TEMPLATE: &str = "sitemap";

#[derive(Debug, Serialize)]
struct SitemapContext<'a> {
    paths: &'a [String],
}

pub struct SitemapTransform<'a> {
    /// The compiled `sitemap.txt`.
    pub template: &'a dyn TemplateEngine,
}

impl SitemapTransform<'_> {
    pub fn render(&self, paths: &[String]) -> Result<String, RenderError> {
        let data = serde_json::to_value(SitemapContext { paths })
            .map_err(|err| RenderError::context(err.to_string()))?;
        Ok(self.template.execute(SITEMAP_TEMPLATE, &data)?)
    }
}
