//! Merge of physical directory entries with synthesized page entries.

use std::collections::HashSet;

use crate::{
    application::store::StoreEntry,
    domain::{
        entry::{EntryKind, FileInfo, VirtualEntry},
        path,
    },
};

/// Builds the virtual listing of `dir` from its physical entries.
///
/// Names are claimed in a fixed order (pass-through entries, then markdown pages, then
/// image pages), so the first claimant of a name wins. Raw markdown sources never appear.
/// Synthesized entries report the size of their source.
pub(super) fn merge(dir: &str, mut entries: Vec<StoreEntry>) -> Vec<VirtualEntry> {
    entries.retain(|entry| {
        !entry.name.starts_with('.') && !path::is_reserved_entry(dir, &entry.name)
    });
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    let mut claimed: HashSet<String> = HashSet::with_capacity(entries.len());
    let mut merged = Vec::with_capacity(entries.len());

    for entry in &entries {
        let is_dir = entry.metadata.is_dir();
        if !is_dir && path::is_markdown(&entry.name) {
            continue;
        }
        let kind = if !is_dir && dir == path::ROOT && path::is_sitemap(&entry.name) {
            EntryKind::SitemapVirtual
        } else {
            EntryKind::PassThrough
        };
        if claimed.insert(entry.name.clone()) {
            merged.push(VirtualEntry::new(info_for(&entry.name, entry), kind));
        }
    }

    for entry in entries
        .iter()
        .filter(|entry| !entry.metadata.is_dir() && path::is_markdown(&entry.name))
    {
        let name = path::with_extension(&entry.name, path::PAGE_EXTENSION);
        if claimed.insert(name.clone()) {
            merged.push(VirtualEntry::new(
                info_for(&name, entry),
                EntryKind::MarkdownVirtual,
            ));
        }
    }

    if path::in_image_folder(dir) {
        let mut images: Vec<&StoreEntry> = entries
            .iter()
            .filter(|entry| !entry.metadata.is_dir() && path::has_image_extension(&entry.name))
            .collect();
        images.sort_by_key(|entry| {
            (
                path::strip_extension(&entry.name),
                image_priority(&entry.name),
            )
        });
        for entry in images {
            let name = path::with_extension(&entry.name, path::PAGE_EXTENSION);
            if claimed.insert(name.clone()) {
                merged.push(VirtualEntry::new(
                    info_for(&name, entry),
                    EntryKind::ImageVirtual,
                ));
            }
        }
    }

    merged.sort_by(|a, b| a.info.name.cmp(&b.info.name));
    merged
}

fn image_priority(name: &str) -> usize {
    path::extension(name)
        .and_then(|ext| path::IMAGE_EXTENSIONS.iter().position(|candidate| *candidate == ext))
        .unwrap_or(path::IMAGE_EXTENSIONS.len())
}

fn info_for(name: &str, entry: &StoreEntry) -> FileInfo {
    FileInfo {
        name: name.to_string(),
        size: entry.metadata.size,
        file_type: entry.metadata.file_type,
        modified: entry.metadata.modified,
    }
}
