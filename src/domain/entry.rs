use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    Regular,
    Directory,
}

/// Name and metadata of one file in the virtual namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub file_type: FileType,
    #[serde(with = "super::serde_fmt::rfc3339")]
    pub modified: OffsetDateTime,
}

impl FileInfo {
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }
}

/// How a virtual entry relates to the physical store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    /// A physical file or directory shown unchanged.
    PassThrough,
    /// A page rendered from a same-stem markdown source.
    MarkdownVirtual,
    /// A page synthesized for an image in an image folder.
    ImageVirtual,
    /// The root sitemap rendered from its template.
    SitemapVirtual,
}

/// One item of a merged directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualEntry {
    pub info: FileInfo,
    pub kind: EntryKind,
}

impl VirtualEntry {
    pub fn new(info: FileInfo, kind: EntryKind) -> Self {
        Self { info, kind }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Listings report the source size for rendered entries; only pass-through sizes are exact.
    pub fn size_is_exact(&self) -> bool {
        self.kind == EntryKind::PassThrough
    }
}
