//! Front-matter parsing and serialization

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{ContentError, Result};

/// Custom deserializer that handles both a single string and a list of strings
fn string_or_vec<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, SeqAccess, Visitor};

    struct StringOrVec;

    impl<'de> Visitor<'de> for StringOrVec {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or a list of strings")
        }

        fn visit_str<E>(self, value: &str) -> std::result::Result<Self::Value, E>
        where
            E: de::Error,
        {
            // "news, tips" is a common shorthand for two entries
            Ok(value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect())
        }

        fn visit_seq<S>(self, mut seq: S) -> std::result::Result<Self::Value, S::Error>
        where
            S: SeqAccess<'de>,
        {
            let mut vec = Vec::new();
            while let Some(item) = seq.next_element::<String>()? {
                vec.push(item);
            }
            Ok(vec)
        }

        fn visit_none<E>(self) -> std::result::Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Vec::new())
        }

        fn visit_unit<E>(self) -> std::result::Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Vec::new())
        }
    }

    deserializer.deserialize_any(StringOrVec)
}

fn is_true(value: &bool) -> bool {
    *value
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Default value for published field
fn default_published() -> bool {
    true
}

/// Front-matter data from a content file or a directory metadata file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontMatter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(
        alias = "last_modified",
        alias = "lastModified",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated: Option<String>,
    #[serde(
        deserialize_with = "string_or_vec",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tags: Vec<String>,
    #[serde(
        deserialize_with = "string_or_vec",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub categories: Vec<String>,
    #[serde(
        rename = "featured",
        alias = "is_featured",
        alias = "isFeatured",
        skip_serializing_if = "is_false"
    )]
    pub is_featured: bool,
    /// Content is published unless it says otherwise
    #[serde(default = "default_published", skip_serializing_if = "is_true")]
    pub published: bool,
    #[serde(alias = "lang", skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(alias = "localizationId", skip_serializing_if = "Option::is_none")]
    pub localization_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<i32>,
    #[serde(
        alias = "featuredImage",
        alias = "image",
        skip_serializing_if = "Option::is_none"
    )]
    pub featured_image: Option<String>,

    /// Additional custom fields, in file order
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_yaml::Value>,
}

impl Default for FrontMatter {
    fn default() -> Self {
        Self {
            title: None,
            description: None,
            author: None,
            date: None,
            updated: None,
            tags: Vec::new(),
            categories: Vec::new(),
            is_featured: false,
            published: true,
            locale: None,
            localization_id: None,
            slug: None,
            url: None,
            order: None,
            featured_image: None,
            extra: IndexMap::new(),
        }
    }
}

impl FrontMatter {
    /// Parse front-matter from content string
    /// Returns (front_matter, remaining_content)
    pub fn parse(content: &str) -> Result<(Self, &str)> {
        let content = content.trim_start_matches('\u{feff}').trim_start();

        if content.starts_with("---") {
            return Ok(Self::parse_yaml(content));
        }

        if content.starts_with(";;;") || content.starts_with('{') {
            return Self::parse_json(content);
        }

        Ok((FrontMatter::default(), content))
    }

    fn parse_yaml(content: &str) -> (Self, &str) {
        let rest = &content[3..];
        let rest = rest.trim_start_matches(['\n', '\r']);

        let Some(end_pos) = find_closing_fence(rest) else {
            return (FrontMatter::default(), content);
        };

        let yaml_content = &rest[..end_pos];
        let remaining = rest[end_pos..]
            .trim_start_matches(['\n', '\r'])
            .strip_prefix("---")
            .unwrap_or("");
        let remaining = remaining.trim_start_matches(['\n', '\r']);

        if yaml_content.trim().is_empty() {
            return (FrontMatter::default(), remaining);
        }

        // A `---` fenced block is only front matter if it carries `key: value` lines;
        // markdown uses the same fence as a thematic break.
        if !yaml_content.lines().any(looks_like_yaml_key) {
            return (FrontMatter::default(), content);
        }

        match serde_yaml::from_str::<FrontMatter>(yaml_content) {
            Ok(fm) => (fm, remaining),
            Err(e) => {
                tracing::warn!(
                    "Failed to parse YAML front-matter, treating as content: {}",
                    e
                );
                (FrontMatter::default(), content)
            }
        }
    }

    fn parse_json(content: &str) -> Result<(Self, &str)> {
        // JSON front-matter ends with ;;;
        if let Some(rest) = content.strip_prefix(";;;") {
            if let Some(end_pos) = rest.find(";;;") {
                let json_content = &rest[..end_pos];
                let remaining = rest[end_pos + 3..].trim_start_matches(['\n', '\r']);
                let fm: FrontMatter = serde_json::from_str(json_content).map_err(|e| {
                    ContentError::Decode(format!("Failed to parse JSON front-matter: {}", e))
                })?;
                return Ok((fm, remaining));
            }
        }

        if content.starts_with('{') {
            let mut depth = 0;
            let mut end_pos = 0;
            for (i, c) in content.char_indices() {
                match c {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            end_pos = i + 1;
                            break;
                        }
                    }
                    _ => {}
                }
            }

            if end_pos > 0 {
                let json_content = &content[..end_pos];
                let remaining = content[end_pos..].trim_start_matches(['\n', '\r']);
                let fm: FrontMatter = serde_json::from_str(json_content).map_err(|e| {
                    ContentError::Decode(format!("Failed to parse JSON front-matter: {}", e))
                })?;
                return Ok((fm, remaining));
            }
        }

        Err(ContentError::Decode("Invalid JSON front-matter".to_string()))
    }

    /// Render the fields back into a YAML block
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Render a complete document: `---` fenced front matter followed by `body`
    pub fn to_document(&self, body: &str) -> Result<String> {
        Ok(format!("---\n{}---\n\n{}", self.to_yaml()?, body))
    }

    /// Parse the date string
    pub fn parse_date(&self) -> Option<DateTime<Utc>> {
        self.date.as_deref().and_then(parse_date_string)
    }

    /// Parse the updated date string
    pub fn parse_updated(&self) -> Option<DateTime<Utc>> {
        self.updated.as_deref().and_then(parse_date_string)
    }

    /// Custom fields flattened to strings
    pub fn metadata(&self) -> BTreeMap<String, String> {
        self.extra
            .iter()
            .map(|(k, v)| (k.clone(), yaml_to_string(v)))
            .collect()
    }

    /// Every field that has a value, as strings, known fields included
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = self.metadata();
        for field in KnownField::ALL {
            if let Some(value) = field.value(self) {
                map.insert(field.name().to_string(), value);
            }
        }
        if !self.published {
            map.insert("published".to_string(), "false".to_string());
        }
        if self.is_featured {
            map.insert("featured".to_string(), "true".to_string());
        }
        map
    }

    /// Check that every field in `required` has a non-empty value
    pub fn validate_required(&self, required: &[KnownField]) -> Result<()> {
        let missing: Vec<&str> = required
            .iter()
            .filter(|field| !field.is_present(self))
            .map(|field| field.name())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ContentError::validation(format!(
                "missing required front matter: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Position of the line holding the closing `---`, relative to `rest`
fn find_closing_fence(rest: &str) -> Option<usize> {
    if rest.starts_with("---") {
        return Some(0);
    }
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if offset > 0 && line.trim_end() == "---" {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

/// Whether a line reads as `key: value` rather than prose or a URL
fn looks_like_yaml_key(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return false;
    }
    let Some(colon_pos) = trimmed.find(':') else {
        return false;
    };
    let key = &trimmed[..colon_pos];
    let is_valid_key = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        && !matches!(key, "http" | "https" | "ftp");
    let after = &trimmed[colon_pos + 1..];
    is_valid_key && (after.is_empty() || after.starts_with(' '))
}

fn yaml_to_string(value: &serde_yaml::Value) -> String {
    use serde_yaml::Value;

    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Sequence(items) => items
            .iter()
            .map(yaml_to_string)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Mapping(_) | Value::Tagged(_) => serde_yaml::to_string(value)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

/// Parse a date string in various formats; naive times are taken as UTC
pub fn parse_date_string(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    let formats = [
        "%Y-%m-%d %H:%M:%S",
        "%Y/%m/%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
    ];
    for fmt in formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc());
        }
    }

    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }

    None
}

/// Front-matter fields that can be declared required in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnownField {
    Title,
    Description,
    Author,
    Date,
    Tags,
    Categories,
    Slug,
    Url,
    Locale,
    LocalizationId,
    FeaturedImage,
    Order,
}

impl KnownField {
    pub const ALL: [KnownField; 12] = [
        KnownField::Title,
        KnownField::Description,
        KnownField::Author,
        KnownField::Date,
        KnownField::Tags,
        KnownField::Categories,
        KnownField::Slug,
        KnownField::Url,
        KnownField::Locale,
        KnownField::LocalizationId,
        KnownField::FeaturedImage,
        KnownField::Order,
    ];

    /// Key used in front matter
    pub fn name(&self) -> &'static str {
        match self {
            KnownField::Title => "title",
            KnownField::Description => "description",
            KnownField::Author => "author",
            KnownField::Date => "date",
            KnownField::Tags => "tags",
            KnownField::Categories => "categories",
            KnownField::Slug => "slug",
            KnownField::Url => "url",
            KnownField::Locale => "locale",
            KnownField::LocalizationId => "localization_id",
            KnownField::FeaturedImage => "featured_image",
            KnownField::Order => "order",
        }
    }

    /// The field's value rendered as a string, if set
    pub fn value(&self, fm: &FrontMatter) -> Option<String> {
        let text = |v: &Option<String>| v.as_ref().filter(|s| !s.trim().is_empty()).cloned();
        let list = |v: &Vec<String>| (!v.is_empty()).then(|| v.join(", "));

        match self {
            KnownField::Title => text(&fm.title),
            KnownField::Description => text(&fm.description),
            KnownField::Author => text(&fm.author),
            KnownField::Date => text(&fm.date),
            KnownField::Tags => list(&fm.tags),
            KnownField::Categories => list(&fm.categories),
            KnownField::Slug => text(&fm.slug),
            KnownField::Url => text(&fm.url),
            KnownField::Locale => text(&fm.locale),
            KnownField::LocalizationId => text(&fm.localization_id),
            KnownField::FeaturedImage => text(&fm.featured_image),
            KnownField::Order => fm.order.map(|o| o.to_string()),
        }
    }

    pub fn is_present(&self, fm: &FrontMatter) -> bool {
        self.value(fm).is_some()
    }
}

impl fmt::Display for KnownField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KnownField {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        KnownField::ALL
            .into_iter()
            .find(|f| f.name() == wanted || f.name().replace('_', "") == wanted)
            .ok_or_else(|| ContentError::validation(format!("unknown front matter field: {}", s)))
    }
}
