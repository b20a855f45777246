//! Content queries: filter, sort, paginate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use super::ContentItem;
use crate::helpers;

/// Field used to order query results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Title,
    Author,
    LastModified,
    #[default]
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

/// Publish state filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    Published,
    Draft,
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortField::Title => "title",
            SortField::Author => "author",
            SortField::LastModified => "lastmodified",
            SortField::Date => "date",
        })
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortDirection::Ascending => "asc",
            SortDirection::Descending => "desc",
        })
    }
}

impl fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PublishStatus::Published => "published",
            PublishStatus::Draft => "draft",
        })
    }
}

/// Filter, sort and pagination settings; unset fields do not filter
///
/// Every set field must match (AND semantics).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContentQuery {
    /// Only items inside this directory (recursively)
    pub directory: Option<String>,
    /// Only items inside the directory with this id (recursively)
    pub directory_id: Option<String>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub is_featured: Option<bool>,
    pub author: Option<String>,
    pub status: Option<PublishStatus>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    /// Whitespace-separated tokens; all must appear somewhere in the item
    pub search_query: Option<String>,
    pub locale: Option<String>,
    pub localization_id: Option<String>,
    pub sort_by: SortField,
    pub sort_direction: SortDirection,
    pub skip: Option<usize>,
    pub take: Option<usize>,
}

impl ContentQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    pub fn with_directory_id(mut self, id: impl Into<String>) -> Self {
        self.directory_id = Some(id.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn featured(mut self, featured: bool) -> Self {
        self.is_featured = Some(featured);
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_status(mut self, status: PublishStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search_query = Some(text.into());
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_localization_id(mut self, id: impl Into<String>) -> Self {
        self.localization_id = Some(id.into());
        self
    }

    pub fn sorted_by(mut self, field: SortField, direction: SortDirection) -> Self {
        self.sort_by = field;
        self.sort_direction = direction;
        self
    }

    pub fn paginate(mut self, skip: usize, take: usize) -> Self {
        self.skip = Some(skip);
        self.take = Some(take);
        self
    }

    /// Deterministic key built from every set field, in a fixed order
    ///
    /// # Examples
    /// ```ignore
    /// ContentQuery::new().with_directory("blog").with_category("news").cache_key()
    /// // -> "dir:blog|cat:news|sort:date:desc"
    /// ```
    pub fn cache_key(&self) -> String {
        fn text(parts: &mut Vec<String>, label: &str, value: &Option<String>) {
            if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                parts.push(format!("{}:{}", label, v));
            }
        }

        let mut parts = Vec::new();
        text(&mut parts, "dir", &self.directory.as_deref().map(helpers::normalize_path));
        text(&mut parts, "dirid", &self.directory_id);
        text(&mut parts, "cat", &self.category);
        text(&mut parts, "tag", &self.tag);
        if let Some(featured) = self.is_featured {
            parts.push(format!("featured:{}", featured));
        }
        text(&mut parts, "author", &self.author);
        if let Some(status) = self.status {
            parts.push(format!("status:{}", status));
        }
        if let Some(from) = self.date_from {
            parts.push(format!("from:{}", from.to_rfc3339()));
        }
        if let Some(to) = self.date_to {
            parts.push(format!("to:{}", to.to_rfc3339()));
        }
        text(&mut parts, "q", &self.search_query);
        text(&mut parts, "locale", &self.locale);
        text(&mut parts, "lid", &self.localization_id);
        parts.push(format!("sort:{}:{}", self.sort_by, self.sort_direction));
        if let Some(skip) = self.skip {
            parts.push(format!("skip:{}", skip));
        }
        if let Some(take) = self.take {
            parts.push(format!("take:{}", take));
        }
        parts.join("|")
    }

    /// Run the query over a materialized collection
    ///
    /// Filters run in a fixed order (directory, locale, localization id, category,
    /// tag, featured, author, status, date range, search), then sort, skip, take.
    /// Equal sort keys fall back to ascending path so output is fully ordered.
    pub fn apply<I>(&self, items: I) -> Vec<ContentItem>
    where
        I: IntoIterator<Item = ContentItem>,
    {
        let tokens: Vec<String> = self
            .search_query
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();

        let mut results: Vec<ContentItem> = items
            .into_iter()
            .filter(|item| self.matches_directory(item))
            .filter(|item| matches_text(&self.locale, &item.locale))
            .filter(|item| matches_text(&self.localization_id, &item.localization_id))
            .filter(|item| self.category.as_deref().map_or(true, |c| item.has_category(c)))
            .filter(|item| self.tag.as_deref().map_or(true, |t| item.has_tag(t)))
            .filter(|item| self.is_featured.map_or(true, |f| item.is_featured == f))
            .filter(|item| {
                self.author.as_deref().map_or(true, |a| {
                    item.author
                        .as_deref()
                        .is_some_and(|author| author.trim().eq_ignore_ascii_case(a.trim()))
                })
            })
            .filter(|item| match self.status {
                Some(PublishStatus::Published) => item.published,
                Some(PublishStatus::Draft) => !item.published,
                None => true,
            })
            .filter(|item| self.date_from.map_or(true, |from| item.date >= from))
            .filter(|item| self.date_to.map_or(true, |to| item.date <= to))
            .filter(|item| tokens.iter().all(|token| matches_token(item, token)))
            .collect();

        results.sort_by(|a, b| self.compare(a, b));

        results
            .into_iter()
            .skip(self.skip.unwrap_or(0))
            .take(self.take.unwrap_or(usize::MAX))
            .collect()
    }

    fn matches_directory(&self, item: &ContentItem) -> bool {
        if let Some(dir) = self.directory.as_deref() {
            if !helpers::is_under(&item.path, dir) {
                return false;
            }
        }
        if let Some(id) = self.directory_id.as_deref() {
            // Directory ids derive from paths, so an item is inside the directory when
            // one of its ancestor paths hashes to that id.
            let mut current = helpers::parent_path(&item.path);
            let mut found = false;
            while let Some(dir) = current {
                if dir.is_empty() {
                    break;
                }
                if helpers::stable_id(&dir).eq_ignore_ascii_case(id.trim()) {
                    found = true;
                    break;
                }
                current = helpers::parent_path(&dir);
            }
            if !found {
                return false;
            }
        }
        true
    }

    fn compare(&self, a: &ContentItem, b: &ContentItem) -> Ordering {
        let primary = match self.sort_by {
            SortField::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
            SortField::Author => a
                .author
                .as_deref()
                .unwrap_or_default()
                .to_lowercase()
                .cmp(&b.author.as_deref().unwrap_or_default().to_lowercase()),
            SortField::LastModified => a
                .effective_last_modified()
                .cmp(&b.effective_last_modified()),
            SortField::Date => a.date.cmp(&b.date),
        };
        let primary = match self.sort_direction {
            SortDirection::Ascending => primary,
            SortDirection::Descending => primary.reverse(),
        };
        primary.then_with(|| a.path.cmp(&b.path))
    }
}

fn matches_text(wanted: &Option<String>, actual: &str) -> bool {
    wanted
        .as_deref()
        .map_or(true, |w| w.trim().eq_ignore_ascii_case(actual.trim()))
}

/// Whether a lowercase token appears in any searchable field
fn matches_token(item: &ContentItem, token: &str) -> bool {
    let contains = |s: &str| s.to_lowercase().contains(token);
    contains(&item.title)
        || item.description.as_deref().is_some_and(contains)
        || contains(&item.content)
        || item.tags.iter().any(|t| contains(t))
        || item.categories.iter().any(|c| contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContentOptions;
    use chrono::TimeZone;

    fn item(path: &str, front_matter: &str) -> ContentItem {
        let raw = format!("---\n{}\n---\nbody text", front_matter);
        ContentItem::parse("test", path, &raw, "t", &ContentOptions::default(), None).unwrap()
    }

    fn sample() -> Vec<ContentItem> {
        vec![
            item(
                "blog/a.md",
                "title: Alpha\ncategories: [A]\ntags: [x]\nauthor: Ann\ndate: 2024-01-01",
            ),
            item(
                "blog/b.md",
                "title: Beta\ncategories: [A]\ntags: [y]\nauthor: Bob\ndate: 2024-02-01\nfeatured: true",
            ),
            item(
                "news/c.md",
                "title: Gamma\ncategories: [B]\ntags: [x]\nauthor: ann\ndate: 2024-03-01\npublished: false",
            ),
        ]
    }

    fn paths(items: &[ContentItem]) -> Vec<&str> {
        items.iter().map(|i| i.path.as_str()).collect()
    }

    #[test]
    fn test_and_semantics() {
        let query = ContentQuery::new().with_category("A").with_tag("x");
        assert_eq!(paths(&query.apply(sample())), vec!["blog/a.md"]);
    }

    #[test]
    fn test_directory_filters() {
        let query = ContentQuery::new()
            .with_directory("blog")
            .sorted_by(SortField::Title, SortDirection::Ascending);
        assert_eq!(paths(&query.apply(sample())), vec!["blog/a.md", "blog/b.md"]);

        let query = ContentQuery::new().with_directory_id(helpers::stable_id("news"));
        assert_eq!(paths(&query.apply(sample())), vec!["news/c.md"]);
        let query =
            ContentQuery::new().with_directory_id(helpers::stable_id("news").to_uppercase());
        assert_eq!(paths(&query.apply(sample())), vec!["news/c.md"]);

        let query = ContentQuery::new().with_directory("blo");
        assert!(query.apply(sample()).is_empty());
    }

    #[test]
    fn test_flag_author_and_status_filters() {
        assert_eq!(
            paths(&ContentQuery::new().featured(true).apply(sample())),
            vec!["blog/b.md"]
        );
        assert_eq!(
            paths(
                &ContentQuery::new()
                    .with_author("ANN")
                    .sorted_by(SortField::Date, SortDirection::Ascending)
                    .apply(sample())
            ),
            vec!["blog/a.md", "news/c.md"]
        );
        assert_eq!(
            paths(
                &ContentQuery::new()
                    .with_status(PublishStatus::Draft)
                    .apply(sample())
            ),
            vec!["news/c.md"]
        );
    }

    #[test]
    fn test_date_range() {
        let from = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let query = ContentQuery::new().between(Some(from), Some(to));
        assert_eq!(paths(&query.apply(sample())), vec!["blog/b.md"]);
    }

    #[test]
    fn test_search_requires_every_token() {
        let query = ContentQuery::new().search("alpha X");
        assert_eq!(paths(&query.apply(sample())), vec!["blog/a.md"]);

        // "body" is in every item, "news" only in a path, which is not searched
        let query = ContentQuery::new().search("body news");
        assert!(query.apply(sample()).is_empty());

        let query = ContentQuery::new().search("  ");
        assert_eq!(query.apply(sample()).len(), 3);
    }

    #[test]
    fn test_default_sort_is_newest_first() {
        assert_eq!(
            paths(&ContentQuery::new().apply(sample())),
            vec!["news/c.md", "blog/b.md", "blog/a.md"]
        );
    }

    #[test]
    fn test_ties_broken_by_path() {
        let items = vec![
            item("z.md", "title: Same\ndate: 2024-01-01"),
            item("a.md", "title: Same\ndate: 2024-01-01"),
            item("m.md", "title: Same\ndate: 2024-01-01"),
        ];
        for direction in [SortDirection::Ascending, SortDirection::Descending] {
            let query = ContentQuery::new().sorted_by(SortField::Title, direction);
            assert_eq!(paths(&query.apply(items.clone())), vec!["a.md", "m.md", "z.md"]);
        }
    }

    #[test]
    fn test_last_modified_falls_back_to_date() {
        let items = vec![
            item("a.md", "date: 2024-01-01\nupdated: 2024-06-01"),
            item("b.md", "date: 2024-03-01"),
        ];
        let query = ContentQuery::new().sorted_by(SortField::LastModified, SortDirection::Descending);
        assert_eq!(paths(&query.apply(items)), vec!["a.md", "b.md"]);
    }

    #[test]
    fn test_pagination() {
        let query = ContentQuery::new()
            .sorted_by(SortField::Title, SortDirection::Ascending)
            .paginate(1, 1);
        assert_eq!(paths(&query.apply(sample())), vec!["blog/b.md"]);

        let query = ContentQuery::new().paginate(5, 10);
        assert!(query.apply(sample()).is_empty());
    }

    #[test]
    fn test_cache_key() {
        let query = ContentQuery::new()
            .with_directory("/blog/")
            .with_category("news")
            .featured(true);
        assert_eq!(query.cache_key(), "dir:blog|cat:news|featured:true|sort:date:desc");

        let a = ContentQuery::new().with_tag("x").with_category("y");
        let b = ContentQuery::new().with_category("y").with_tag("x");
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(ContentQuery::new().cache_key(), "sort:date:desc");
        assert_ne!(
            ContentQuery::new().paginate(0, 10).cache_key(),
            ContentQuery::new().paginate(10, 10).cache_key()
        );
    }
}
