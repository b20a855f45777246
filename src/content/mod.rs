//! Content module - documents, directories, front matter and queries

mod frontmatter;
mod item;
pub mod markdown;
mod query;
pub mod taxonomy;
mod tree;

pub use frontmatter::{parse_date_string, FrontMatter, KnownField};
pub use item::{ContentCategory, ContentItem, ContentTag, DirectoryItem, LocalizationInfo};
pub use query::{ContentQuery, PublishStatus, SortDirection, SortField};
pub use tree::{DirectoryTree, EntryKind, ListingEntry, TreeBuilder};
