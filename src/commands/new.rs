//! Create a new item or directory

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::content::FrontMatter;
use crate::helpers;
use crate::ContentHub;

/// Create a document titled `title` inside `directory`
///
/// The file name is the slugified title unless `path` names the file explicitly.
pub async fn create_item(
    hub: &ContentHub,
    title: &str,
    directory: Option<&str>,
    path: Option<&str>,
    cancel: &CancellationToken,
) -> Result<()> {
    let now = chrono::Utc::now();
    let file_path = match path {
        Some(p) if hub.config.content.is_allowed_extension(p) => helpers::normalize_path(p),
        Some(p) => format!("{}.md", helpers::normalize_path(p)),
        None => helpers::join_path(
            directory.unwrap_or(""),
            &format!("{}.md", helpers::slugify(title)),
        ),
    };

    let front_matter = FrontMatter {
        title: Some(title.to_string()),
        date: Some(now.format("%Y-%m-%d %H:%M:%S").to_string()),
        ..Default::default()
    };
    let document = front_matter.to_document("")?;

    let response = hub
        .provider
        .create_item(&file_path, &document, &format!("Create {}", file_path), cancel)
        .await?;
    println!("Created: {}", file_path);
    if let Some(token) = response.token() {
        tracing::debug!("New token for {}: {}", file_path, token);
    }
    Ok(())
}

/// Create a directory with a metadata file carrying `title`
pub async fn create_directory(
    hub: &ContentHub,
    path: &str,
    title: Option<&str>,
    cancel: &CancellationToken,
) -> Result<()> {
    let metadata = match title {
        Some(title) => Some(
            FrontMatter {
                title: Some(title.to_string()),
                ..Default::default()
            }
            .to_document("")?,
        ),
        None => None,
    };
    hub.provider
        .create_directory(path, metadata.as_deref(), &format!("Create {}", path), cancel)
        .await?;
    println!("Created directory: {}", helpers::normalize_path(path));
    Ok(())
}
