//! Show a single item

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::content::markdown;
use crate::ContentHub;

/// Print an item's metadata and body; `html` renders the body first
pub async fn run(hub: &ContentHub, path: &str, html: bool, cancel: &CancellationToken) -> Result<()> {
    let item = match hub.provider.get_item_by_path(path, cancel).await? {
        Some(item) => item,
        None => match hub.provider.get_item_by_url(path, cancel).await? {
            Some(item) => item,
            None => anyhow::bail!("No item at {}", path),
        },
    };

    println!("Title:    {}", item.title);
    println!("Path:     {}", item.path);
    println!("URL:      /{}", item.url);
    println!("Date:     {}", item.date.format("%Y-%m-%d %H:%M:%S"));
    if let Some(author) = &item.author {
        println!("Author:   {}", author);
    }
    if !item.categories.is_empty() {
        println!(
            "Categories: {}",
            item.categories.iter().cloned().collect::<Vec<_>>().join(", ")
        );
    }
    if !item.tags.is_empty() {
        println!("Tags:     {}", item.tags.iter().cloned().collect::<Vec<_>>().join(", "));
    }
    println!("Locale:   {}", item.locale);
    println!("Token:    {}", item.provider_specific_id);
    println!();

    if html {
        println!("{}", markdown::render_html(&item.content));
    } else {
        println!("{}", item.content);
    }
    Ok(())
}
