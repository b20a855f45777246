//! Content and directory models

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::FrontMatter;
use crate::config::ContentOptions;
use crate::error::Result;
use crate::helpers;

/// A single content document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    /// Stable identifier derived from `path`
    pub id: String,

    /// Path relative to the provider's content root
    pub path: String,

    /// Owning provider
    pub provider_id: String,

    /// Backend concurrency token (content hash or blob SHA)
    pub provider_specific_id: String,

    pub title: String,

    /// URL-friendly name of the document
    pub slug: String,

    /// Slug path used for URL lookups
    pub url: String,

    /// Body after the front matter
    pub content: String,

    pub author: Option<String>,
    pub description: Option<String>,

    /// Publication date
    pub date: DateTime<Utc>,

    /// Last updated date
    pub last_modified: Option<DateTime<Utc>>,

    pub tags: IndexSet<String>,
    pub categories: IndexSet<String>,
    pub is_featured: bool,
    pub published: bool,
    pub locale: String,

    /// Shared by every translation of one logical document
    pub localization_id: String,

    pub featured_image: Option<String>,

    /// Sibling sort key
    pub order: i32,

    /// Custom front-matter fields
    pub metadata: BTreeMap<String, String>,
}

impl ContentItem {
    /// Build an item from a raw document read from a backend
    pub fn parse(
        provider_id: &str,
        path: &str,
        raw: &str,
        provider_specific_id: &str,
        options: &ContentOptions,
        file_modified: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        let path = helpers::normalize_path(path);
        let (fm, body) = FrontMatter::parse(raw)?;

        let stem = helpers::file_stem(&path).to_string();
        let title = fm
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| stem.clone());

        let path_locale = if options.enable_localization {
            helpers::extract_locale(&path, &options.supported_locales)
        } else {
            None
        };
        let locale = fm
            .locale
            .clone()
            .or_else(|| path_locale.clone())
            .unwrap_or_else(|| options.default_locale.clone());
        let base_path = match &path_locale {
            Some(_) => helpers::strip_locale(&path, &options.supported_locales),
            None => path.clone(),
        };

        let slug = fm
            .slug
            .as_deref()
            .map(helpers::slugify)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| helpers::slugify(&stem));
        let url = match fm.url.as_deref() {
            Some(url) if !url.trim().is_empty() => helpers::normalize_url(url),
            _ => derive_url(&base_path, &slug, path_locale.as_deref()),
        };
        let localization_id = fm
            .localization_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| helpers::url_from_path(&base_path));

        // Undated documents sort as oldest and keep that date across reloads
        let date = fm
            .parse_date()
            .or(file_modified)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let last_modified = fm.parse_updated().or(file_modified);

        Ok(Self {
            id: helpers::stable_id(&path),
            provider_id: provider_id.to_string(),
            provider_specific_id: provider_specific_id.to_string(),
            title,
            slug,
            url,
            content: body.to_string(),
            author: fm.author.clone(),
            description: fm.description.clone(),
            date,
            last_modified,
            tags: clean_set(&fm.tags),
            categories: clean_set(&fm.categories),
            is_featured: fm.is_featured,
            published: fm.published,
            locale,
            localization_id,
            featured_image: fm.featured_image.clone(),
            order: fm.order.unwrap_or(0),
            metadata: fm.metadata(),
            path,
        })
    }

    /// Front matter describing this item, suitable for writing back
    pub fn to_front_matter(&self) -> FrontMatter {
        let mut fm = FrontMatter {
            title: Some(self.title.clone()),
            description: self.description.clone(),
            author: self.author.clone(),
            date: Some(self.date.format("%Y-%m-%d %H:%M:%S").to_string()),
            updated: self
                .last_modified
                .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string()),
            tags: self.tags.iter().cloned().collect(),
            categories: self.categories.iter().cloned().collect(),
            is_featured: self.is_featured,
            published: self.published,
            locale: Some(self.locale.clone()),
            slug: Some(self.slug.clone()),
            featured_image: self.featured_image.clone(),
            order: (self.order != 0).then_some(self.order),
            ..Default::default()
        };
        for (key, value) in &self.metadata {
            fm.extra
                .insert(key.clone(), serde_yaml::Value::String(value.clone()));
        }
        fm
    }

    /// Render the item as a complete document
    pub fn to_document(&self) -> Result<String> {
        self.to_front_matter().to_document(&self.content)
    }

    /// `last_modified`, falling back to `date`
    pub fn effective_last_modified(&self) -> DateTime<Utc> {
        self.last_modified.unwrap_or(self.date)
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.categories
            .iter()
            .any(|c| c.eq_ignore_ascii_case(category.trim()))
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag.trim()))
    }
}

fn derive_url(base_path: &str, slug: &str, locale: Option<&str>) -> String {
    let stem = helpers::file_stem(base_path);
    let dir_url = helpers::parent_path(base_path)
        .map(|p| helpers::url_from_path(&p))
        .unwrap_or_default();
    let mut segments: Vec<&str> = Vec::new();
    if let Some(locale) = locale {
        segments.push(locale);
    }
    if !dir_url.is_empty() {
        segments.push(&dir_url);
    }
    if !stem.eq_ignore_ascii_case("index") && !slug.is_empty() {
        segments.push(slug);
    }
    segments.join("/").to_lowercase()
}

fn clean_set(values: &[String]) -> IndexSet<String> {
    values
        .iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

/// A node in the content hierarchy
///
/// Parents own their children; `parent_id` is a lookup-only back-reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryItem {
    /// Stable identifier derived from `path`
    pub id: String,
    pub path: String,
    pub name: String,
    pub provider_id: String,
    pub parent_id: Option<String>,
    pub children: Vec<DirectoryItem>,
    pub title: String,
    pub description: Option<String>,
    pub locale: Option<String>,

    /// Sibling sort key
    pub order: i32,

    /// Slug path of the directory
    pub url: String,
    pub metadata: BTreeMap<String, String>,

    /// Content files directly inside this directory
    pub item_count: usize,

    /// Whether a metadata file was found for this directory
    pub has_metadata_file: bool,
}

impl DirectoryItem {
    /// A directory with defaults derived from its path
    pub fn new(provider_id: &str, path: &str) -> Self {
        let path = helpers::normalize_path(path);
        let name = helpers::file_name(&path).to_string();
        Self {
            id: helpers::stable_id(&path),
            provider_id: provider_id.to_string(),
            parent_id: None,
            children: Vec::new(),
            title: name.clone(),
            description: None,
            locale: None,
            order: 0,
            url: helpers::url_from_path(&path),
            metadata: BTreeMap::new(),
            item_count: 0,
            has_metadata_file: false,
            name,
            path,
        }
    }

    /// Apply the directory's metadata file
    pub fn apply_front_matter(&mut self, fm: &FrontMatter) {
        if let Some(title) = fm.title.as_ref().filter(|t| !t.trim().is_empty()) {
            self.title = title.clone();
        }
        if fm.description.is_some() {
            self.description = fm.description.clone();
        }
        if let Some(order) = fm.order {
            self.order = order;
        }
        if fm.locale.is_some() {
            self.locale = fm.locale.clone();
        }
        if let Some(url) = fm.url.as_deref().filter(|u| !u.trim().is_empty()) {
            self.url = helpers::normalize_url(url);
        }
        self.metadata = fm.metadata();
        self.has_metadata_file = true;
    }

    /// Whether the node carries nothing: no content, no children, no metadata file
    pub fn is_empty(&self) -> bool {
        self.item_count == 0 && self.children.is_empty() && !self.has_metadata_file
    }

    /// Depth-first iterator over this node and its descendants
    pub fn descendants(&self) -> Vec<&DirectoryItem> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.descendants());
        }
        out
    }
}

/// A category with the number of items carrying it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentCategory {
    pub name: String,
    pub slug: String,
    pub count: usize,
}

/// A tag with the number of items carrying it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTag {
    pub name: String,
    pub slug: String,
    pub count: usize,
}

/// Locales known to a provider and how documents map across them
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizationInfo {
    pub default_locale: String,
    pub available_locales: BTreeSet<String>,
    /// localization id -> locale -> item path
    pub translations: BTreeMap<String, BTreeMap<String, String>>,
}
