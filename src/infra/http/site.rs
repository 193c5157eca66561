//! Serving the virtual filesystem over HTTP.

use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, RawQuery, Request, State},
    http::{
        HeaderMap, HeaderName, HeaderValue, StatusCode,
        header::{CONTENT_LENGTH, CONTENT_TYPE, EXPIRES, LAST_MODIFIED, LOCATION},
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use time::{OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};
use tracing::debug;

use crate::{
    application::{
        error::{ErrorReport, HttpError},
        site_config::SiteConfig,
        vfs::{Opened, Redirect, VfsError, VirtualFile},
    },
    domain::{entry::VirtualEntry, path},
};

use super::state::HttpState;

const SOURCE: &str = "infra::http::site";
const INDEX_PAGE: &str = "index.html";
const NOT_FOUND_PAGE: &str = "404.html";
const ERROR_PAGE: &str = "500.html";
const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

const HTTP_DATE: &[BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

pub(super) async fn serve_root(State(state): State<HttpState>) -> Response {
    serve(&state, "", None).await
}

pub(super) async fn serve_path(
    State(state): State<HttpState>,
    Path(request_path): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    serve(&state, &request_path, query.as_deref()).await
}

/// Adds the site's configured headers to every response.
pub(super) async fn apply_site_headers(
    State(state): State<HttpState>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let site = state.site.current();
    for (name, value) in &site.headers {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().insert(name, value);
            }
            _ => debug!(target = SOURCE, header = %name, "Skipping invalid site header"),
        }
    }
    response
}

/// `request_path` is the URL path without its leading slash.
async fn serve(state: &HttpState, request_path: &str, query: Option<&str>) -> Response {
    let wants_dir = request_path.is_empty() || request_path.ends_with('/');
    let trimmed = request_path.trim_end_matches('/');
    let virtual_path = if trimmed.is_empty() { path::ROOT } else { trimmed };

    let site = state.site.current();
    match state.fs.open(virtual_path).await {
        Ok(Opened::Directory(_)) if !wants_dir => {
            let mut location = format!("/{trimmed}/");
            if let Some(query) = query {
                location.push('?');
                location.push_str(query);
            }
            redirect_response(&location)
        }
        Ok(Opened::Directory(_)) => serve_directory(state, &site, virtual_path).await,
        Ok(Opened::File(_)) if wants_dir => {
            not_found(state, VfsError::not_exist(request_path)).await
        }
        Ok(Opened::File(file)) => {
            let expiry = expiry_for(&site, virtual_path, &file);
            file_response(file, expiry)
        }
        Ok(Opened::Redirect(Redirect { target, .. })) => redirect_response(&target),
        Err(err) => error_response(state, err).await,
    }
}

/// Serves `index.html` of a directory, or a plain listing when it has none.
async fn serve_directory(state: &HttpState, site: &SiteConfig, dir: &str) -> Response {
    let index = path::join(dir, INDEX_PAGE);
    match state.fs.open(&index).await {
        Ok(Opened::File(file)) => {
            let expiry = expiry_for(site, &index, &file);
            file_response(file, expiry)
        }
        Ok(Opened::Redirect(Redirect { target, .. })) => redirect_response(&target),
        Ok(Opened::Directory(_)) => not_found(state, VfsError::not_exist(index)).await,
        Err(err) if err.is_not_found() => match state.fs.read_dir(dir).await {
            Ok(entries) => {
                let mut response = html_response(StatusCode::OK, render_listing(&entries));
                set_expires(response.headers_mut(), site.expires);
                response
            }
            Err(err) => error_response(state, err).await,
        },
        Err(err) => error_response(state, err).await,
    }
}

fn render_listing(entries: &[VirtualEntry]) -> String {
    let mut body = String::from("<!DOCTYPE html>\n<pre>\n");
    for entry in entries {
        let name = if entry.info.is_dir() {
            format!("{}/", entry.name())
        } else {
            entry.name().to_string()
        };
        let escaped = ammonia::clean_text(&name);
        body.push_str(&format!("<a href=\"{escaped}\">{escaped}</a>\n"));
    }
    body.push_str("</pre>\n");
    body
}

/// Front-matter expiry wins; otherwise pages, directories and the sitemap use the site's
/// `expires` and everything else `staticexpires`.
fn expiry_for(site: &SiteConfig, virtual_path: &str, file: &VirtualFile) -> Option<Duration> {
    if let Some(expires) = file.front_matter.as_ref().and_then(|fm| fm.expires) {
        return Some(expires);
    }
    if path::is_page(virtual_path) || path::is_sitemap(virtual_path) {
        site.expires
    } else {
        site.static_expires
    }
}

fn file_response(file: VirtualFile, expiry: Option<Duration>) -> Response {
    let content_type = content_type_for(&file.info.name);
    let length = file.body.len();
    let modified = file.info.modified;

    let mut response = Response::new(Body::from(file.body));
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&content_type) {
        headers.insert(CONTENT_TYPE, value);
    }
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    if let Some(value) = http_date(modified) {
        headers.insert(LAST_MODIFIED, value);
    }
    set_expires(headers, expiry);
    response
}

fn content_type_for(name: &str) -> String {
    let mime = mime_guess::from_path(name).first_or_octet_stream();
    if mime.type_() == mime_guess::mime::TEXT {
        format!("{mime}; charset=utf-8")
    } else {
        mime.to_string()
    }
}

fn set_expires(headers: &mut HeaderMap, expiry: Option<Duration>) {
    let Some(expiry) = expiry else {
        return;
    };
    if let Some(value) = http_date(OffsetDateTime::now_utc() + expiry) {
        headers.insert(EXPIRES, value);
    }
}

fn http_date(instant: OffsetDateTime) -> Option<HeaderValue> {
    let text = instant
        .to_offset(time::UtcOffset::UTC)
        .format(HTTP_DATE)
        .ok()?;
    HeaderValue::from_str(&text).ok()
}

fn redirect_response(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            let mut response = StatusCode::PERMANENT_REDIRECT.into_response();
            response.headers_mut().insert(LOCATION, value);
            response
        }
        Err(err) => HttpError::from_error(
            SOURCE,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Invalid redirect target",
            &err,
        )
        .into_response(),
    }
}

fn html_response(status: StatusCode, body: impl Into<Body>) -> Response {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(HTML_CONTENT_TYPE));
    response
}

async fn error_response(state: &HttpState, err: VfsError) -> Response {
    match err {
        VfsError::InvalidPath { .. } => HttpError::from_error(
            SOURCE,
            StatusCode::BAD_REQUEST,
            "Invalid path",
            &err,
        )
        .into_response(),
        err if err.is_not_found() => not_found(state, err).await,
        err => {
            error_page(
                state,
                StatusCode::INTERNAL_SERVER_ERROR,
                ERROR_PAGE,
                "Internal server error",
                err,
            )
            .await
        }
    }
}

async fn not_found(state: &HttpState, err: VfsError) -> Response {
    error_page(state, StatusCode::NOT_FOUND, NOT_FOUND_PAGE, "Not found", err).await
}

/// Serves the site's own error page when it has one.
async fn error_page(
    state: &HttpState,
    status: StatusCode,
    page: &str,
    fallback: &'static str,
    err: VfsError,
) -> Response {
    let mut response = match state.fs.open(page).await {
        Ok(Opened::File(file)) => html_response(status, file.body),
        _ => (status, fallback).into_response(),
    };
    ErrorReport::from_error(SOURCE, status, &err).attach(&mut response);
    response
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::domain::{
        entry::{EntryKind, FileInfo, FileType},
        front_matter::FrontMatter,
    };

    fn file(name: &str, front_matter: Option<FrontMatter>) -> VirtualFile {
        VirtualFile {
            info: FileInfo {
                name: name.to_string(),
                size: 0,
                file_type: FileType::Regular,
                modified: OffsetDateTime::UNIX_EPOCH,
            },
            kind: EntryKind::PassThrough,
            front_matter,
            body: bytes::Bytes::new(),
        }
    }

    fn site() -> SiteConfig {
        SiteConfig {
            expires: Some(Duration::from_secs(60)),
            static_expires: Some(Duration::from_secs(3_600)),
            ..SiteConfig::default()
        }
    }

    #[test]
    fn formats_http_dates() {
        let value = http_date(datetime!(1994-11-06 08:49:37 UTC)).unwrap();
        assert_eq!(value, "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn pages_and_static_files_use_their_expiry() {
        let site = site();
        assert_eq!(
            expiry_for(&site, "blog/a.html", &file("a.html", None)),
            Some(Duration::from_secs(60))
        );
        assert_eq!(
            expiry_for(&site, "sitemap.txt", &file("sitemap.txt", None)),
            Some(Duration::from_secs(60))
        );
        assert_eq!(
            expiry_for(&site, "style.css", &file("style.css", None)),
            Some(Duration::from_secs(3_600))
        );
    }

    #[test]
    fn front_matter_expiry_wins() {
        let mut front_matter = FrontMatter::for_image("a.png", OffsetDateTime::UNIX_EPOCH);
        front_matter.expires = Some(Duration::from_secs(5));
        assert_eq!(
            expiry_for(&site(), "a.html", &file("a.html", Some(front_matter))),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn text_types_carry_charset() {
        assert_eq!(content_type_for("index.html"), "text/html; charset=utf-8");
        assert_eq!(content_type_for("sitemap.txt"), "text/plain; charset=utf-8");
        assert_eq!(content_type_for("cat.png"), "image/png");
    }

    #[test]
    fn listing_escapes_names() {
        let entries = vec![VirtualEntry::new(
            FileInfo {
                name: "a<b".to_string(),
                size: 0,
                file_type: FileType::Directory,
                modified: OffsetDateTime::UNIX_EPOCH,
            },
            EntryKind::PassThrough,
        )];
        let body = render_listing(&entries);
        assert!(body.contains("&lt;"));
        assert!(!body.contains("a<b"));
    }
}
