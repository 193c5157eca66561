//! Hot-swappable set of compiled page templates.

use std::sync::{Arc, RwLock};

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::cache::lock::{rw_read, rw_write};

use super::{
    sitemap::SITEMAP_TEMPLATE,
    types::{TemplateCompiler, TemplateEngine, TemplateError, TemplateSource},
};

/// Digest identifying one set of template sources.
pub type Fingerprint = [u8; 32];

/// Template sources read from the site: page templates in name order and the root sitemap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateSources {
    pub pages: Vec<TemplateSource>,
    pub sitemap: Option<String>,
}

impl TemplateSources {
    /// SHA-256 over every name and body, each length-prefixed.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        for source in &self.pages {
            hasher.update(b"p");
            update_field(&mut hasher, &source.name);
            update_field(&mut hasher, &source.body);
        }
        if let Some(sitemap) = &self.sitemap {
            hasher.update(b"s");
            update_field(&mut hasher, sitemap);
        }

        let mut fingerprint = [0; 32];
        fingerprint.copy_from_slice(&hasher.finalize());
        fingerprint
    }

    pub fn compile(
        &self,
        compiler: &dyn TemplateCompiler,
    ) -> Result<CompiledTemplates, TemplateError> {
        let pages = compiler.compile_pages(&self.pages)?;
        let sitemap = self
            .sitemap
            .as_ref()
            .map(|body| compiler.compile_text(&TemplateSource::new(SITEMAP_TEMPLATE, body)))
            .transpose()?;
        Ok(CompiledTemplates { pages, sitemap })
    }
}

fn update_field(hasher: &mut Sha256, field: &str) {
    hasher.update((field.len() as u64).to_be_bytes());
    hasher.update(field.as_bytes());
}

pub struct CompiledTemplates {
    pub pages: Arc<dyn TemplateEngine>,
    /// Compiled root `sitemap.txt`, absent when the site has none.
    pub sitemap: Option<Arc<dyn TemplateEngine>>,
}

/// One immutable generation of compiled templates.
pub struct TemplateSnapshot {
    pub generation: u64,
    pub fingerprint: Fingerprint,
    pub pages: Arc<dyn TemplateEngine>,
    pub sitemap: Option<Arc<dyn TemplateEngine>>,
}

/// Holds the current template snapshot. Readers clone the `Arc` under a short read lock;
/// a reload swaps the whole snapshot, so no reader sees a partially loaded set.
pub struct TemplateRegistry {
    current: RwLock<Arc<TemplateSnapshot>>,
}

impl TemplateRegistry {
    pub fn new(fingerprint: Fingerprint, templates: CompiledTemplates) -> Self {
        Self {
            current: RwLock::new(Arc::new(TemplateSnapshot {
                generation: 1,
                fingerprint,
                pages: templates.pages,
                sitemap: templates.sitemap,
            })),
        }
    }

    pub fn snapshot(&self) -> Arc<TemplateSnapshot> {
        rw_read(&self.current, "application::render::templates", "snapshot").clone()
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation
    }

    /// Reports whether sources with `fingerprint` are already installed.
    pub fn is_current(&self, fingerprint: &Fingerprint) -> bool {
        self.snapshot().fingerprint == *fingerprint
    }

    /// Installs templates compiled from sources with `fingerprint` and returns the live
    /// generation. Unchanged sources keep the installed snapshot and its generation.
    pub fn install(&self, fingerprint: Fingerprint, templates: CompiledTemplates) -> u64 {
        let mut guard = rw_write(&self.current, "application::render::templates", "install");
        if guard.fingerprint == fingerprint {
            let generation = guard.generation;
            drop(guard);
            debug!(
                target = "vellum::render::templates",
                generation, "Template sources unchanged"
            );
            return generation;
        }

        let generation = guard.generation + 1;
        *guard = Arc::new(TemplateSnapshot {
            generation,
            fingerprint,
            pages: templates.pages,
            sitemap: templates.sitemap,
        });
        drop(guard);

        info!(
            target = "vellum::render::templates",
            generation, "Installed template set"
        );
        generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    impl TemplateEngine for Fixed {
        fn execute(&self, _name: &str, _data: &serde_json::Value) -> Result<String, TemplateError> {
            Ok(self.0.to_string())
        }

        fn has_template(&self, _name: &str) -> bool {
            true
        }
    }

    fn compiled(text: &'static str) -> CompiledTemplates {
        CompiledTemplates {
            pages: Arc::new(Fixed(text)),
            sitemap: None,
        }
    }

    fn sources(body: &str) -> TemplateSources {
        TemplateSources {
            pages: vec![TemplateSource::new("default", body)],
            sitemap: None,
        }
    }

    #[test]
    fn install_swaps_snapshot_and_bumps_generation() {
        let registry = TemplateRegistry::new(sources("one").fingerprint(), compiled("one"));
        let before = registry.snapshot();
        assert_eq!(before.generation, 1);

        let generation = registry.install(sources("two").fingerprint(), compiled("two"));
        assert_eq!(generation, 2);

        let after = registry.snapshot();
        let data = serde_json::Value::Null;
        assert_eq!(before.pages.execute("x", &data).unwrap(), "one");
        assert_eq!(after.pages.execute("x", &data).unwrap(), "two");
    }

    #[test]
    fn unchanged_sources_keep_generation() {
        let registry = TemplateRegistry::new(sources("one").fingerprint(), compiled("one"));
        assert!(registry.is_current(&sources("one").fingerprint()));

        let generation = registry.install(sources("one").fingerprint(), compiled("again"));
        assert_eq!(generation, 1);
        let data = serde_json::Value::Null;
        assert_eq!(registry.snapshot().pages.execute("x", &data).unwrap(), "one");
    }

    #[test]
    fn fingerprint_covers_names_bodies_and_sitemap() {
        let base = sources("body");
        let renamed = TemplateSources {
            pages: vec![TemplateSource::new("post", "body")],
            sitemap: None,
        };
        let with_sitemap = TemplateSources {
            sitemap: Some("body".to_string()),
            ..base.clone()
        };
        let sitemap_only = TemplateSources {
            pages: Vec::new(),
            sitemap: Some("body".to_string()),
        };

        assert_eq!(base.fingerprint(), sources("body").fingerprint());
        assert_ne!(base.fingerprint(), sources("body!").fingerprint());
        assert_ne!(base.fingerprint(), renamed.fingerprint());
        assert_ne!(base.fingerprint(), with_sitemap.fingerprint());
        assert_ne!(with_sitemap.fingerprint(), sitemap_only.fingerprint());
    }
}
