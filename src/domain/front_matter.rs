//! Per-page metadata carried in a `+++`-delimited block at the top of a markdown source.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::{
    Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset,
    format_description::well_known::Rfc3339, macros::format_description,
};

use super::{error::DomainError, path};

/// Line that opens and closes a front-matter block.
pub const DELIMITER: &str = "+++";

/// Template used for markdown pages that do not name one.
pub const DEFAULT_TEMPLATE: &str = "default";

/// Template used for synthesized image pages.
pub const IMAGE_TEMPLATE: &str = "image";

/// Fully resolved front matter of one virtual page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontMatter {
    pub title: String,
    #[serde(with = "super::serde_fmt::rfc3339")]
    pub date: OffsetDateTime,
    pub template: String,
    pub tags: Vec<String>,
    #[serde(with = "super::serde_fmt::duration_text")]
    pub expires: Option<Duration>,
    pub redirect: Option<String>,
    pub original_file: String,
}

/// Front-matter keys as decoded from a source, before defaults are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontMatterFields {
    pub title: Option<String>,
    pub date: Option<OffsetDateTime>,
    pub template: Option<String>,
    pub tags: Vec<String>,
    pub expires: Option<Duration>,
    pub redirect: Option<String>,
    pub original_file: Option<String>,
}

impl FrontMatter {
    /// Front matter of a markdown page, filling gaps from the source file.
    pub fn for_markdown(
        fields: FrontMatterFields,
        source_name: &str,
        modified: OffsetDateTime,
    ) -> Self {
        Self {
            title: fields
                .title
                .unwrap_or_else(|| path::strip_extension(source_name).to_string()),
            date: fields.date.unwrap_or(modified),
            template: fields
                .template
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string()),
            tags: fields.tags,
            expires: fields.expires.filter(|value| !value.is_zero()),
            redirect: fields.redirect.filter(|target| !target.trim().is_empty()),
            original_file: fields
                .original_file
                .unwrap_or_else(|| source_name.to_string()),
        }
    }

    /// Front matter synthesized for an image page.
    pub fn for_image(source_name: &str, modified: OffsetDateTime) -> Self {
        Self {
            title: path::strip_extension(source_name).to_string(),
            date: modified,
            template: IMAGE_TEMPLATE.to_string(),
            tags: Vec::new(),
            expires: None,
            redirect: None,
            original_file: source_name.to_string(),
        }
    }

    /// Stand-in front matter for a listed entry that is not a rendered page.
    pub fn for_entry(name: &str, modified: OffsetDateTime) -> Self {
        Self::for_markdown(FrontMatterFields::default(), name, modified)
    }

    /// Reports whether the page is embargoed until a date after `now`.
    pub fn is_embargoed(&self, now: OffsetDateTime) -> bool {
        self.date > now
    }
}

/// Splits `source` into its front-matter block and body.
///
/// A block exists only when the first non-blank line is a delimiter line and a second
/// delimiter line follows. Delimiter lines may carry surrounding whitespace. Both the
/// block and the body are trimmed; without a block the whole source is the body.
pub fn split_front_matter(source: &str) -> (Option<&str>, &str) {
    let mut delimiters = Vec::with_capacity(2);
    let mut offset = 0;
    for line in source.split_inclusive('\n') {
        if line.trim() == DELIMITER {
            delimiters.push((offset, offset + line.len()));
            if delimiters.len() == 2 {
                break;
            }
        }
        offset += line.len();
    }

    let [(first_start, first_end), (second_start, second_end)] = delimiters[..] else {
        return (None, source);
    };
    if !source[..first_start].trim().is_empty() {
        return (None, source);
    }

    let block = source[first_end..second_start].trim();
    let body = source[second_end..].trim();
    (Some(block), body)
}

/// Parses a front-matter date.
///
/// Accepts RFC 3339 timestamps, local date-times (`2024-01-02T03:04:05` or with a space
/// separator, optional fractional seconds) and plain dates. Values without an offset are UTC.
pub fn parse_date(input: &str) -> Result<OffsetDateTime, DomainError> {
    let trimmed = input.trim();
    let normalized = trimmed.replacen(' ', "T", 1);
    if let Ok(value) = OffsetDateTime::parse(&normalized, &Rfc3339) {
        return Ok(value);
    }

    let datetime_formats = [
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]"),
    ];
    for format in datetime_formats {
        if let Ok(value) = PrimitiveDateTime::parse(&normalized, format) {
            return Ok(value.assume_offset(UtcOffset::UTC));
        }
    }

    Date::parse(trimmed, format_description!("[year]-[month]-[day]"))
        .map(|date| PrimitiveDateTime::new(date, Time::MIDNIGHT).assume_offset(UtcOffset::UTC))
        .map_err(|err| DomainError::invalid_date(input, err.to_string()))
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn splits_block_and_body() {
        let (block, body) = split_front_matter("+++\ntitle = \"Hello\"\n+++\n# Body\n");
        assert_eq!(block, Some("title = \"Hello\""));
        assert_eq!(body, "# Body");
    }

    #[test]
    fn delimiters_tolerate_whitespace_and_quoted_markers() {
        let source = "  +++\n x = \"+++\"\n +++\n hello";
        let (block, body) = split_front_matter(source);
        assert_eq!(block, Some("x = \"+++\""));
        assert_eq!(body, "hello");
    }

    #[test]
    fn block_without_body() {
        let (block, body) = split_front_matter("\n+++\nx = 2\n+++");
        assert_eq!(block, Some("x = 2"));
        assert_eq!(body, "");
    }

    #[test]
    fn no_block_when_delimiter_is_not_alone() {
        let (block, body) = split_front_matter(" ++++++ ");
        assert_eq!(block, None);
        assert_eq!(body, " ++++++ ");
    }

    #[test]
    fn no_block_when_text_precedes_delimiter() {
        let source = "intro\n+++\nx = 1\n+++\nbody";
        assert_eq!(split_front_matter(source), (None, source));
    }

    #[test]
    fn no_block_with_single_delimiter() {
        let source = "+++\nx = 1\n";
        assert_eq!(split_front_matter(source), (None, source));
    }

    #[test]
    fn markdown_defaults_come_from_source() {
        let modified = datetime!(2023-05-01 10:00 UTC);
        let front = FrontMatter::for_markdown(FrontMatterFields::default(), "post1.md", modified);
        assert_eq!(front.title, "post1");
        assert_eq!(front.date, modified);
        assert_eq!(front.template, DEFAULT_TEMPLATE);
        assert_eq!(front.original_file, "post1.md");
        assert_eq!(front.redirect, None);
    }

    #[test]
    fn explicit_fields_override_defaults() {
        let fields = FrontMatterFields {
            title: Some("Hello".into()),
            template: Some("wide".into()),
            redirect: Some("/new".into()),
            expires: Some(Duration::from_secs(60)),
            tags: vec!["rust".into()],
            ..Default::default()
        };
        let front = FrontMatter::for_markdown(fields, "old.md", OffsetDateTime::UNIX_EPOCH);
        assert_eq!(front.title, "Hello");
        assert_eq!(front.template, "wide");
        assert_eq!(front.redirect.as_deref(), Some("/new"));
        assert_eq!(front.expires, Some(Duration::from_secs(60)));
        assert_eq!(front.tags, vec!["rust".to_string()]);
    }

    #[test]
    fn blank_redirect_is_absent() {
        let fields = FrontMatterFields {
            redirect: Some("  ".into()),
            ..Default::default()
        };
        let front = FrontMatter::for_markdown(fields, "a.md", OffsetDateTime::UNIX_EPOCH);
        assert_eq!(front.redirect, None);
    }

    #[test]
    fn image_front_matter_uses_image_template() {
        let front = FrontMatter::for_image("cat.jpeg", OffsetDateTime::UNIX_EPOCH);
        assert_eq!(front.title, "cat");
        assert_eq!(front.template, IMAGE_TEMPLATE);
        assert_eq!(front.original_file, "cat.jpeg");
    }

    #[test]
    fn plain_entries_take_title_from_name() {
        let front = FrontMatter::for_entry("style.css", OffsetDateTime::UNIX_EPOCH);
        assert_eq!(front.title, "style");
        assert_eq!(front.date, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(front.original_file, "style.css");
    }

    #[test]
    fn embargo_is_strictly_after_now() {
        let now = datetime!(2024-01-01 00:00 UTC);
        let mut front = FrontMatter::for_image("a.png", now);
        assert!(!front.is_embargoed(now));
        front.date = datetime!(2024-01-01 00:00:01 UTC);
        assert!(front.is_embargoed(now));
    }

    #[test]
    fn parses_supported_date_shapes() {
        assert_eq!(
            parse_date("2024-03-04T05:06:07+02:00").unwrap(),
            datetime!(2024-03-04 05:06:07 +2)
        );
        assert_eq!(
            parse_date("2024-03-04 05:06:07").unwrap(),
            datetime!(2024-03-04 05:06:07 UTC)
        );
        assert_eq!(
            parse_date("2024-03-04T05:06").unwrap(),
            datetime!(2024-03-04 05:06 UTC)
        );
        assert_eq!(parse_date("2024-03-04").unwrap(), datetime!(2024-03-04 0:00 UTC));
        assert!(parse_date("March 4th").is_err());
    }
}
