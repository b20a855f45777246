//! List content, taxonomies and the directory tree

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::content::DirectoryItem;
use crate::ContentHub;

/// List every item, newest first
pub async fn items(hub: &ContentHub, cancel: &CancellationToken) -> Result<()> {
    let mut items = hub.provider.get_all_items(cancel).await?;
    items.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.path.cmp(&b.path)));

    println!("Items ({}):", items.len());
    for item in items {
        let draft = if item.published { "" } else { " (draft)" };
        println!(
            "  {} - {}{} [{}]",
            item.date.format("%Y-%m-%d"),
            item.title,
            draft,
            item.path
        );
    }
    Ok(())
}

pub async fn tags(hub: &ContentHub, cancel: &CancellationToken) -> Result<()> {
    let tags = hub.provider.get_tags(cancel).await?;
    println!("Tags ({}):", tags.len());
    for tag in tags {
        println!("  {} ({})", tag.name, tag.count);
    }
    Ok(())
}

pub async fn categories(hub: &ContentHub, cancel: &CancellationToken) -> Result<()> {
    let categories = hub.provider.get_categories(cancel).await?;
    println!("Categories ({}):", categories.len());
    for category in categories {
        println!("  {} ({})", category.name, category.count);
    }
    Ok(())
}

/// Print the directory tree, optionally for one locale
pub async fn tree(hub: &ContentHub, locale: Option<&str>, cancel: &CancellationToken) -> Result<()> {
    let roots = hub.provider.get_directories(locale, cancel).await?;
    println!("{}", hub.provider.display_name());
    for directory in &roots {
        print_directory(directory, 1);
    }
    Ok(())
}

fn print_directory(directory: &DirectoryItem, depth: usize) {
    let title = if directory.title != directory.name {
        format!(" \"{}\"", directory.title)
    } else {
        String::new()
    };
    println!(
        "{}{}/{} ({} items)",
        "  ".repeat(depth),
        directory.name,
        title,
        directory.item_count
    );
    for child in &directory.children {
        print_directory(child, depth + 1);
    }
}
