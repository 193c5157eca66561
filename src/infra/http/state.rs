use std::sync::{Arc, RwLock};

use crate::{
    application::site_config::SiteConfig,
    cache::{
        CachedFs,
        lock::{rw_read, rw_write},
    },
};

const SOURCE: &str = "infra::http::state";

/// Current site configuration, replaced wholesale on reload.
pub struct SiteHandle {
    current: RwLock<Arc<SiteConfig>>,
}

impl SiteHandle {
    pub fn new(config: SiteConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    pub fn current(&self) -> Arc<SiteConfig> {
        rw_read(&self.current, SOURCE, "current").clone()
    }

    pub fn replace(&self, config: SiteConfig) {
        *rw_write(&self.current, SOURCE, "replace") = Arc::new(config);
    }
}

#[derive(Clone)]
pub struct HttpState {
    pub fs: Arc<CachedFs>,
    pub site: Arc<SiteHandle>,
}

impl HttpState {
    pub fn new(fs: Arc<CachedFs>, site: Arc<SiteHandle>) -> Self {
        Self { fs, site }
    }
}
