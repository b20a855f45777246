//! Category, tag and localization summaries over a set of items

use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet};

use super::{ContentCategory, ContentItem, ContentTag, LocalizationInfo};
use crate::helpers;

/// Count names case-insensitively, keeping the first spelling seen
fn count_names<'a>(names: impl Iterator<Item = &'a String>) -> Vec<(String, usize)> {
    let mut counts: IndexMap<String, (String, usize)> = IndexMap::new();
    for name in names {
        let entry = counts
            .entry(name.to_lowercase())
            .or_insert_with(|| (name.clone(), 0));
        entry.1 += 1;
    }
    let mut counted: Vec<(String, usize)> = counts.into_values().collect();
    counted.sort_by(|a, b| a.0.to_lowercase().cmp(&b.0.to_lowercase()));
    counted
}

/// Every category with its item count, sorted by name
pub fn categories(items: &[ContentItem]) -> Vec<ContentCategory> {
    count_names(items.iter().flat_map(|i| i.categories.iter()))
        .into_iter()
        .map(|(name, count)| ContentCategory {
            slug: helpers::slugify(&name),
            name,
            count,
        })
        .collect()
}

/// Every tag with its item count, sorted by name
pub fn tags(items: &[ContentItem]) -> Vec<ContentTag> {
    count_names(items.iter().flat_map(|i| i.tags.iter()))
        .into_iter()
        .map(|(name, count)| ContentTag {
            slug: helpers::slugify(&name),
            name,
            count,
        })
        .collect()
}

/// Locales present in `items` and the translations of each document
pub fn localization_info(items: &[ContentItem], default_locale: &str) -> LocalizationInfo {
    let mut available_locales: BTreeSet<String> = items.iter().map(|i| i.locale.clone()).collect();
    available_locales.insert(default_locale.to_string());

    let mut translations: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    for item in items {
        translations
            .entry(item.localization_id.clone())
            .or_default()
            .insert(item.locale.clone(), item.path.clone());
    }

    LocalizationInfo {
        default_locale: default_locale.to_string(),
        available_locales,
        translations,
    }
}

/// Items sharing `localization_id`, ordered by locale
pub fn translations(items: &[ContentItem], localization_id: &str) -> Vec<ContentItem> {
    let mut found: Vec<ContentItem> = items
        .iter()
        .filter(|i| i.localization_id.eq_ignore_ascii_case(localization_id.trim()))
        .cloned()
        .collect();
    found.sort_by(|a, b| a.locale.cmp(&b.locale).then_with(|| a.path.cmp(&b.path)));
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContentOptions;

    fn items() -> Vec<ContentItem> {
        let options = ContentOptions {
            enable_localization: true,
            ..Default::default()
        };
        let parse = |path: &str, fm: &str| {
            ContentItem::parse("t", path, &format!("---\n{}\n---\n", fm), "x", &options, None)
                .unwrap()
        };
        vec![
            parse("en/blog/a.md", "categories: [News]\ntags: [rust, web]"),
            parse("fr/blog/a.md", "categories: [news]\ntags: [Rust]"),
            parse("en/blog/b.md", "categories: [Tips]"),
        ]
    }

    #[test]
    fn test_categories_are_counted_case_insensitively() {
        let categories = categories(&items());
        assert_eq!(
            categories,
            vec![
                ContentCategory {
                    name: "News".to_string(),
                    slug: "news".to_string(),
                    count: 2
                },
                ContentCategory {
                    name: "Tips".to_string(),
                    slug: "tips".to_string(),
                    count: 1
                },
            ]
        );
    }

    #[test]
    fn test_tags() {
        let tags = tags(&items());
        let summary: Vec<_> = tags.iter().map(|t| (t.name.as_str(), t.count)).collect();
        assert_eq!(summary, vec![("rust", 2), ("web", 1)]);
    }

    #[test]
    fn test_localization_info() {
        let info = localization_info(&items(), "en");
        assert_eq!(
            info.available_locales.iter().collect::<Vec<_>>(),
            vec!["en", "fr"]
        );
        let blog_a = info.translations.get("blog/a").unwrap();
        assert_eq!(blog_a.get("fr").map(String::as_str), Some("fr/blog/a.md"));
        assert_eq!(blog_a.len(), 2);

        let found = translations(&items(), "blog/a");
        let locales: Vec<_> = found.iter().map(|i| i.locale.as_str()).collect();
        assert_eq!(locales, vec!["en", "fr"]);
    }
}
