//! TOML front-matter decoder.

use toml::{Table, Value};

use crate::{
    application::render::{FrontMatterDecoder, RenderError},
    domain::{
        duration::parse_duration,
        front_matter::{FrontMatterFields, parse_date},
    },
};

/// Decodes `+++` blocks written in TOML. Unknown keys are ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct TomlFrontMatter;

impl FrontMatterDecoder for TomlFrontMatter {
    fn decode(&self, block: &str) -> Result<FrontMatterFields, RenderError> {
        let table: Table = block
            .parse()
            .map_err(|err: toml::de::Error| RenderError::front_matter(err.to_string()))?;

        let mut fields = FrontMatterFields::default();
        for (key, value) in table {
            match key.as_str() {
                "title" => fields.title = Some(string_field("title", value)?),
                "template" => fields.template = Some(string_field("template", value)?),
                "redirect" => fields.redirect = Some(string_field("redirect", value)?),
                "originalfile" => {
                    fields.original_file = Some(string_field("originalfile", value)?)
                }
                "date" => {
                    let text = match value {
                        Value::Datetime(datetime) => datetime.to_string(),
                        Value::String(text) => text,
                        other => return Err(wrong_type("date", &other)),
                    };
                    let date = parse_date(&text)
                        .map_err(|err| RenderError::front_matter(err.to_string()))?;
                    fields.date = Some(date);
                }
                "expires" => {
                    let text = string_field("expires", value)?;
                    let expires = parse_duration(&text)
                        .map_err(|err| RenderError::front_matter(err.to_string()))?;
                    fields.expires = Some(expires);
                }
                "tags" => fields.tags = tags_field(value)?,
                _ => {}
            }
        }
        Ok(fields)
    }
}

fn string_field(key: &str, value: Value) -> Result<String, RenderError> {
    match value {
        Value::String(text) => Ok(text),
        other => Err(wrong_type(key, &other)),
    }
}

fn tags_field(value: Value) -> Result<Vec<String>, RenderError> {
    match value {
        Value::String(tag) => Ok(vec![tag]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| string_field("tags", item))
            .collect(),
        other => Err(wrong_type("tags", &other)),
    }
}

fn wrong_type(key: &str, value: &Value) -> RenderError {
    RenderError::front_matter(format!("`{key}` has unsupported type {}", value.type_str()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use time::macros::datetime;

    use super::*;

    #[test]
    fn decodes_known_keys() {
        let fields = TomlFrontMatter
            .decode(
                r#"
title = "Hello"
date = 2024-01-02T03:04:05Z
template = "post"
tags = ["rust", "web"]
expires = "1h"
redirect = "/new"
originalfile = "hello.txt"
"#,
            )
            .unwrap();
        assert_eq!(fields.title.as_deref(), Some("Hello"));
        assert_eq!(fields.date, Some(datetime!(2024-01-02 03:04:05 UTC)));
        assert_eq!(fields.template.as_deref(), Some("post"));
        assert_eq!(fields.tags, vec!["rust", "web"]);
        assert_eq!(fields.expires, Some(Duration::from_secs(3_600)));
        assert_eq!(fields.redirect.as_deref(), Some("/new"));
        assert_eq!(fields.original_file.as_deref(), Some("hello.txt"));
    }

    #[test]
    fn accepts_local_dates_and_date_strings() {
        let local = TomlFrontMatter.decode("date = 2024-01-02").unwrap();
        assert_eq!(local.date, Some(datetime!(2024-01-02 0:00 UTC)));

        let local_time = TomlFrontMatter.decode("date = 2024-01-02T10:30:00").unwrap();
        assert_eq!(local_time.date, Some(datetime!(2024-01-02 10:30 UTC)));

        let text = TomlFrontMatter
            .decode("date = \"2024-01-02T10:30:00+02:00\"")
            .unwrap();
        assert_eq!(text.date, Some(datetime!(2024-01-02 08:30 UTC)));
    }

    #[test]
    fn ignores_unknown_keys() {
        let fields = TomlFrontMatter.decode("author = \"me\"\nweight = 3").unwrap();
        assert_eq!(fields, FrontMatterFields::default());
    }

    #[test]
    fn rejects_invalid_toml_and_wrong_types() {
        assert!(TomlFrontMatter.decode("title = ").is_err());
        assert!(TomlFrontMatter.decode("title = 3").is_err());
        assert!(TomlFrontMatter.decode("tags = [1, 2]").is_err());
        assert!(TomlFrontMatter.decode("expires = \"later\"").is_err());
    }
}
