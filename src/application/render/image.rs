//! Image transform: a synthesized HTML page wrapping an image from an image folder.

use time::OffsetDateTime;

use crate::domain::front_matter::{FrontMatter, IMAGE_TEMPLATE};

use super::types::{
    FolderListings, PageContext, PageInfo, RenderError, TemplateEngine, TemplateError,
};

pub struct ImageTransform<'a> {
    pub templates: &'a dyn TemplateEngine,
}

impl ImageTransform<'_> {
    /// Renders the page at `path` for the image file `source_name`.
    pub fn render(
        &self,
        path: &str,
        source_name: &str,
        modified: OffsetDateTime,
    ) -> Result<(FrontMatter, String), RenderError> {
        let front_matter = FrontMatter::for_image(source_name, modified);
        if !self.templates.has_template(IMAGE_TEMPLATE) {
            return Err(TemplateError::unknown(IMAGE_TEMPLATE).into());
        }

        let folders = FolderListings::new();
        let context = PageContext {
            front_matter: &front_matter,
            page: PageInfo::from_virtual_path(path),
            content: "",
            folders: &folders,
        };
        let data = serde_json::to_value(&context)
            .map_err(|err| RenderError::context(err.to_string()))?;
        let body = self.templates.execute(IMAGE_TEMPLATE, &data)?;
        Ok((front_matter, body))
    }
}
