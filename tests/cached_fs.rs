//! Cached filesystem behavior: template reloads and corrupt payloads.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use time::{OffsetDateTime, macros::datetime};

use vellum::{
    application::vfs::{Collaborators, Opened, VfsError, VirtualFs},
    cache::{
        CacheConfig, CacheError, CacheKey, CacheStats, CachedFs, GroupConfig, PeerGetter,
        PeerPicker, codec,
    },
    infra::{
        front_matter::TomlFrontMatter, markdown::ComrakRenderer, store::MemoryStore,
        templates::PlaceholderCompiler,
    },
};

const MODIFIED: OffsetDateTime = datetime!(2024-01-01 12:00 UTC);

const FILES: [(&str, &str); 3] = [
    ("template/default.html", "<main>{{{ content }}}</main>"),
    ("a.md", "alpha"),
    ("b.md", "beta"),
];

async fn vfs(store: Arc<MemoryStore>) -> Arc<VirtualFs> {
    let collaborators = Collaborators {
        renderer: Arc::new(ComrakRenderer::new()),
        decoder: Arc::new(TomlFrontMatter),
        compiler: Arc::new(PlaceholderCompiler::new()),
    };
    let vfs = VirtualFs::new(store, collaborators)
        .await
        .expect("filesystem builds");
    Arc::new(vfs)
}

/// Page buckets a day wide, so no rollover happens while a test runs.
fn config() -> CacheConfig {
    let defaults = CacheConfig::default();
    CacheConfig {
        page: GroupConfig {
            duration: Duration::from_secs(86_400),
            ..defaults.page
        },
        ..defaults
    }
}

fn page_stats(fs: &CachedFs) -> CacheStats {
    fs.registry().get("page").expect("page group").stats()
}

fn body(opened: Opened) -> String {
    match opened {
        Opened::File(file) => String::from_utf8(file.body.to_vec()).expect("utf-8 body"),
        other => panic!("expected a file, got {other:?}"),
    }
}

#[tokio::test]
async fn reload_without_changes_keeps_cached_pages() {
    let store = Arc::new(MemoryStore::with_files(FILES, MODIFIED));
    let fs = CachedFs::new(vfs(store.clone()).await, config());

    fs.open("a.html").await.unwrap();
    fs.open("b.html").await.unwrap();
    fs.open("a.html").await.unwrap();
    assert_eq!(page_stats(&fs).loads, 2);

    let generation = fs.vfs().template_generation();
    assert_eq!(fs.vfs().reload_templates().await.unwrap(), generation);
    assert!(body(fs.open("a.html").await.unwrap()).contains("alpha"));
    assert!(body(fs.open("b.html").await.unwrap()).contains("beta"));
    assert_eq!(page_stats(&fs).loads, 2, "{:?}", page_stats(&fs));

    store.insert_file("template/default.html", "<article>{{{ content }}}</article>", MODIFIED);
    assert_eq!(fs.vfs().reload_templates().await.unwrap(), generation + 1);
    let page = body(fs.open("a.html").await.unwrap());
    assert!(page.starts_with("<article>"), "{page}");
    assert_eq!(page_stats(&fs).loads, 3);
}

/// Serves garbage for the first `garbage` requests, then real encoded pages.
struct GarblingPeer {
    vfs: Arc<VirtualFs>,
    garbage: usize,
    calls: AtomicUsize,
}

impl GarblingPeer {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerGetter for GarblingPeer {
    fn url(&self) -> &str {
        "http://peer-b:8080"
    }

    async fn get(&self, _group: &str, key: &CacheKey) -> Result<Bytes, CacheError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.garbage {
            return Ok(Bytes::from_static(&[0xff, 0xff, 0xff]));
        }
        let opened = self
            .vfs
            .open(&key.discriminator)
            .await
            .map_err(|err| CacheError::peer(self.url(), err.to_string()))?;
        codec::encode(&opened).map_err(|err| CacheError::peer(self.url(), err.to_string()))
    }
}

struct AlwaysPeer(Arc<GarblingPeer>);

impl PeerPicker for AlwaysPeer {
    fn pick(&self, _key: &CacheKey) -> Option<Arc<dyn PeerGetter>> {
        let peer: Arc<dyn PeerGetter> = self.0.clone();
        Some(peer)
    }
}

async fn garbling_fs(garbage: usize) -> (CachedFs, Arc<GarblingPeer>) {
    let vfs = vfs(Arc::new(MemoryStore::with_files(FILES, MODIFIED))).await;
    let peer = Arc::new(GarblingPeer {
        vfs: Arc::clone(&vfs),
        garbage,
        calls: AtomicUsize::new(0),
    });
    let fs = CachedFs::with_peers(vfs, config(), Arc::new(AlwaysPeer(peer.clone())));
    (fs, peer)
}

#[tokio::test]
async fn corrupt_payload_is_evicted_and_fetched_once_more() {
    let (fs, peer) = garbling_fs(1).await;

    let page = body(fs.open("a.html").await.unwrap());
    assert!(page.contains("alpha"), "{page}");
    assert_eq!(peer.calls(), 2);

    // The repaired entry now serves from the hot tier.
    fs.open("a.html").await.unwrap();
    assert_eq!(peer.calls(), 2);
    assert_eq!(page_stats(&fs).hot_hits, 1);
}

#[tokio::test]
async fn payload_corrupt_twice_is_a_decode_error() {
    let (fs, peer) = garbling_fs(usize::MAX).await;

    let err = fs.open("a.html").await.unwrap_err();
    assert!(matches!(&err, VfsError::Decode { path, .. } if path == "a.html"), "{err:?}");
    assert_eq!(peer.calls(), 2);
}
