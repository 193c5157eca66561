//! Pre-order traversal of the virtual tree feeding the sitemap.

use std::{collections::HashSet, vec};

use time::OffsetDateTime;
use tracing::warn;

use crate::domain::{
    entry::{EntryKind, VirtualEntry},
    path,
};

use super::{VfsError, VirtualFs};

struct Frame {
    dir: String,
    names: HashSet<String>,
    entries: vec::IntoIter<VirtualEntry>,
}

impl Frame {
    fn new(dir: String, entries: Vec<VirtualEntry>) -> Self {
        let names = entries.iter().map(|entry| entry.info.name.clone()).collect();
        Self {
            dir,
            names,
            entries: entries.into_iter(),
        }
    }
}

/// Collects the virtual path of every visible entry in lexical pre-order.
///
/// The root is emitted as `""` and directories carry a trailing `/`. Index and error pages,
/// embargoed pages, and raw images that already have a synthesized page are left out.
pub(super) async fn collect_sitemap_paths(vfs: &VirtualFs) -> Result<Vec<String>, VfsError> {
    let now = OffsetDateTime::now_utc();
    let root = vfs.read_dir(path::ROOT).await?;
    let mut paths = vec![String::new()];
    let mut stack = vec![Frame::new(path::ROOT.to_string(), root)];

    loop {
        let Some(frame) = stack.last_mut() else {
            break;
        };
        let Some(entry) = frame.entries.next() else {
            stack.pop();
            continue;
        };

        let full = path::join(&frame.dir, entry.name());
        let collapsed = entry.kind == EntryKind::PassThrough
            && !entry.info.is_dir()
            && path::in_image_folder(&full)
            && path::has_image_extension(entry.name())
            && frame
                .names
                .contains(&path::with_extension(entry.name(), path::PAGE_EXTENSION));

        if entry.info.is_dir() {
            paths.push(format!("{full}/"));
            match vfs.read_dir(&full).await {
                Ok(children) => stack.push(Frame::new(full, children)),
                Err(err) => {
                    warn!(
                        target = "vellum::vfs::walk",
                        path = %full,
                        error = %err,
                        "Skipping unreadable directory in sitemap"
                    );
                }
            }
            continue;
        }

        if collapsed || path::UNLISTED_PAGES.contains(&entry.name()) {
            continue;
        }

        if entry.kind == EntryKind::MarkdownVirtual {
            match vfs.front_matter(&full).await {
                Ok(Some(front_matter)) if front_matter.is_embargoed(now) => continue,
                Ok(_) => {}
                Err(err) => {
                    warn!(
                        target = "vellum::vfs::walk",
                        path = %full,
                        error = %err,
                        "Skipping unreadable page in sitemap"
                    );
                    continue;
                }
            }
        }

        paths.push(full);
    }

    Ok(paths)
}
