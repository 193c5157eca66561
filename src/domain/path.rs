//! Virtual path syntax and visibility rules.
//!
//! Paths are slash-delimited and relative to the site root, with `"."` naming
//! the root itself. A path never starts or ends with a slash and never
//! contains empty, `.` or `..` segments.

/// Name of the root directory in the virtual namespace.
pub const ROOT: &str = ".";

/// Top-level folder holding page templates.
pub const TEMPLATE_DIR: &str = "template";

/// Top-level site configuration file.
pub const SITE_CONFIG_FILE: &str = "site.toml";

/// Root-level file that is rendered as the sitemap template.
pub const SITEMAP_FILE: &str = "sitemap.txt";

/// Extension of synthesized pages.
pub const PAGE_EXTENSION: &str = "html";

/// Extension of markdown sources.
pub const MARKDOWN_EXTENSION: &str = "md";

/// Image extensions checked, in priority order, when synthesizing an image page.
pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "gif", "jpeg"];

/// Top-level folders whose images gain a synthesized HTML page.
pub const IMAGE_FOLDERS: [&str; 8] = [
    "photos", "images", "pictures", "cartoons", "toons", "sketches", "artwork", "drawings",
];

/// Page names that exist but are left out of generated indexes.
pub const UNLISTED_PAGES: [&str; 3] = ["index.html", "404.html", "500.html"];

const RESERVED_TOP_LEVEL: [&str; 2] = [TEMPLATE_DIR, SITE_CONFIG_FILE];

/// Reports whether `path` satisfies the virtual path syntax.
pub fn is_valid(path: &str) -> bool {
    if path == ROOT {
        return true;
    }
    if path.is_empty() {
        return false;
    }
    path.split('/').all(|segment| {
        !segment.is_empty() && segment != "." && segment != ".." && !segment.contains('\\')
    })
}

/// Reports whether any segment of `path` is hidden (starts with a period).
pub fn has_hidden_segment(path: &str) -> bool {
    if path == ROOT {
        return false;
    }
    path.split('/').any(|segment| segment.starts_with('.'))
}

/// Reports whether `path` is, or lives under, a reserved top-level name.
pub fn is_reserved(path: &str) -> bool {
    let first = path.split('/').next().unwrap_or_default();
    RESERVED_TOP_LEVEL.contains(&first)
}

/// Reports whether `name` at directory `dir` is reserved.
pub fn is_reserved_entry(dir: &str, name: &str) -> bool {
    dir == ROOT && RESERVED_TOP_LEVEL.contains(&name)
}

/// Reports whether `path` is hidden from the virtual view.
pub fn is_concealed(path: &str) -> bool {
    path != ROOT && (has_hidden_segment(path) || is_reserved(path))
}

/// Reports whether `path` lives in one of the image folders.
pub fn in_image_folder(path: &str) -> bool {
    if path == ROOT {
        return false;
    }
    let first = path.split('/').next().unwrap_or_default();
    IMAGE_FOLDERS.contains(&first)
}

/// Joins a directory path and an entry name.
pub fn join(dir: &str, name: &str) -> String {
    if dir == ROOT {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Splits `path` into its parent directory and base name.
pub fn split(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => (ROOT, path),
    }
}

/// Returns the extension of the final segment, without the period.
pub fn extension(path: &str) -> Option<&str> {
    let (_, base) = split(path);
    match base.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some(&base[idx + 1..]),
    }
}

/// Strips the extension (if any) from `path`.
pub fn strip_extension(path: &str) -> &str {
    match extension(path) {
        Some(ext) => &path[..path.len() - ext.len() - 1],
        None => path,
    }
}

/// Returns `path` with its extension replaced by `ext`.
pub fn with_extension(path: &str, ext: &str) -> String {
    format!("{}.{ext}", strip_extension(path))
}

/// Reports whether `name` carries one of the image extensions.
pub fn has_image_extension(name: &str) -> bool {
    extension(name).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext))
}

/// Reports whether `name` is a markdown source.
pub fn is_markdown(name: &str) -> bool {
    extension(name) == Some(MARKDOWN_EXTENSION)
}

/// Reports whether `name` is a synthesized page name.
pub fn is_page(name: &str) -> bool {
    extension(name) == Some(PAGE_EXTENSION)
}

/// Reports whether `path` names the root sitemap template.
pub fn is_sitemap(path: &str) -> bool {
    path == SITEMAP_FILE
}

/// Directory path named by a URL-style folder such as `/blog/`, `blog` or `/`.
pub fn folder_from_url(folder: &str) -> Option<String> {
    let trimmed = folder.trim().trim_matches('/');
    let dir = if trimmed.is_empty() { ROOT } else { trimmed };
    is_valid(dir).then(|| dir.to_string())
}
