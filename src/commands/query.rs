//! Run a content query

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::content::{parse_date_string, ContentQuery, PublishStatus, SortDirection, SortField};
use crate::ContentHub;

/// Query arguments as given on the command line
#[derive(Debug, Default)]
pub struct QueryArgs {
    pub directory: Option<String>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub author: Option<String>,
    pub featured: bool,
    pub drafts: bool,
    pub from: Option<String>,
    pub to: Option<String>,
    pub search: Option<String>,
    pub locale: Option<String>,
    pub sort: Option<String>,
    pub ascending: bool,
    pub skip: Option<usize>,
    pub take: Option<usize>,
}

impl QueryArgs {
    /// Build the query, rejecting unknown sort fields and unparsable dates
    pub fn to_query(&self) -> Result<ContentQuery> {
        let mut query = ContentQuery::new();
        if let Some(directory) = &self.directory {
            query = query.with_directory(directory);
        }
        if let Some(category) = &self.category {
            query = query.with_category(category);
        }
        if let Some(tag) = &self.tag {
            query = query.with_tag(tag);
        }
        if let Some(author) = &self.author {
            query = query.with_author(author);
        }
        if self.featured {
            query = query.featured(true);
        }
        if self.drafts {
            query = query.with_status(PublishStatus::Draft);
        }
        if self.from.is_some() || self.to.is_some() {
            query = query.between(parse_bound(self.from.as_deref())?, parse_bound(self.to.as_deref())?);
        }
        if let Some(search) = &self.search {
            query = query.search(search);
        }
        if let Some(locale) = &self.locale {
            query = query.with_locale(locale);
        }
        if self.sort.is_some() || self.ascending {
            let field = match self.sort.as_deref().unwrap_or("date") {
                "title" => SortField::Title,
                "author" => SortField::Author,
                "last_modified" | "updated" => SortField::LastModified,
                "date" => SortField::Date,
                other => anyhow::bail!(
                    "Unknown sort field: {}. Available: title, author, last_modified, date",
                    other
                ),
            };
            let direction = if self.ascending {
                SortDirection::Ascending
            } else {
                SortDirection::Descending
            };
            query = query.sorted_by(field, direction);
        }
        if self.skip.is_some() || self.take.is_some() {
            query = query.paginate(self.skip.unwrap_or(0), self.take.unwrap_or(usize::MAX));
        }
        Ok(query)
    }
}

fn parse_bound(value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    match value {
        None => Ok(None),
        Some(s) => parse_date_string(s)
            .map(Some)
            .ok_or_else(|| anyhow::anyhow!("Invalid date: {}", s)),
    }
}

pub async fn run(hub: &ContentHub, args: &QueryArgs, cancel: &CancellationToken) -> Result<()> {
    let query = args.to_query()?;
    tracing::debug!("Running query {}", query.cache_key());
    let items = hub.provider.get_items_by_query(&query, cancel).await?;

    println!("Results ({}):", items.len());
    for item in items {
        println!(
            "  {} - {} [{}]",
            item.date.format("%Y-%m-%d"),
            item.title,
            item.path
        );
    }
    Ok(())
}
