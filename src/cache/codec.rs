//! Byte encoding of cached values and of keys sent to peers.
//!
//! Values are stored as postcard bytes; optional fields keep their absent state across a
//! round trip. Keys travel to peers as URL-safe base64 of their postcard encoding.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use bytes::Bytes;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::domain::entry::VirtualEntry;

use super::{CacheKey, error::CodecError};

/// Cached result of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub entries: Vec<VirtualEntry>,
}

pub fn encode<T: Serialize>(value: &T) -> Result<Bytes, CodecError> {
    postcard::to_stdvec(value)
        .map(Bytes::from)
        .map_err(|err| CodecError::Encode(err.to_string()))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    postcard::from_bytes(bytes).map_err(|err| CodecError::Decode(err.to_string()))
}

pub fn encode_key(key: &CacheKey) -> Result<String, CodecError> {
    let bytes = encode(key)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

pub fn decode_key(text: &str) -> Result<CacheKey, CodecError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(text)
        .map_err(|err| CodecError::Decode(err.to_string()))?;
    decode(&bytes)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use time::macros::datetime;

    use super::*;
    use crate::{
        application::vfs::{Opened, Redirect, VirtualFile},
        cache::ResourceKind,
        domain::{
            entry::{EntryKind, FileInfo, FileType},
            front_matter::FrontMatter,
        },
    };

    fn info(name: &str, size: u64) -> FileInfo {
        FileInfo {
            name: name.to_string(),
            size,
            file_type: FileType::Regular,
            modified: datetime!(2024-03-01 12:30:00.123456789 UTC),
        }
    }

    fn front_matter() -> FrontMatter {
        FrontMatter {
            title: "Hello".to_string(),
            date: datetime!(2024-02-29 08:00:00 +02:00),
            template: "default".to_string(),
            tags: vec!["rust".to_string(), "web".to_string()],
            expires: Some(Duration::from_secs(90)),
            redirect: None,
            original_file: "post1.md".to_string(),
        }
    }

    #[test]
    fn page_without_front_matter_stays_absent() {
        let opened = Opened::File(VirtualFile {
            info: info("style.css", 3),
            kind: EntryKind::PassThrough,
            front_matter: None,
            body: Bytes::from_static(b"a{}"),
        });
        let decoded: Opened = decode(&encode(&opened).unwrap()).unwrap();
        assert_eq!(decoded, opened);
        let Opened::File(file) = decoded else {
            panic!("expected a file");
        };
        assert!(file.front_matter.is_none());
    }

    #[test]
    fn rendered_page_and_redirect_round_trip() {
        let page = Opened::File(VirtualFile {
            info: info("post1.html", 11),
            kind: EntryKind::MarkdownVirtual,
            front_matter: Some(front_matter()),
            body: Bytes::from_static(b"<p>Hi</p>\n"),
        });
        let redirect = Opened::Redirect(Redirect {
            info: info("old.html", 0),
            target: "/new".to_string(),
            front_matter: FrontMatter {
                redirect: Some("/new".to_string()),
                expires: None,
                ..front_matter()
            },
        });
        for value in [page, redirect] {
            assert_eq!(decode::<Opened>(&encode(&value).unwrap()).unwrap(), value);
        }
    }

    #[test]
    fn listing_round_trips() {
        let record = ListingRecord {
            entries: vec![
                VirtualEntry::new(info("a.html", 4), EntryKind::MarkdownVirtual),
                VirtualEntry::new(
                    FileInfo {
                        file_type: FileType::Directory,
                        ..info("drafts", 0)
                    },
                    EntryKind::PassThrough,
                ),
            ],
        };
        assert_eq!(
            decode::<ListingRecord>(&encode(&record).unwrap()).unwrap(),
            record
        );
    }

    #[test]
    fn keys_are_url_safe() {
        let key = CacheKey::new(ResourceKind::Page, "photos/über cat.html", 3, -42);
        let text = encode_key(&key).unwrap();
        assert!(
            text.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_eq!(decode_key(&text).unwrap(), key);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            decode::<ListingRecord>(&[0xff, 0xff, 0xff]),
            Err(CodecError::Decode(_))
        ));
        assert!(matches!(decode_key("!!!"), Err(CodecError::Decode(_))));
    }
}
