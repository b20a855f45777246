//! Delete an item or a whole directory

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::error::ContentError;
use crate::ContentHub;

/// Delete the item at `path`, or the directory at `path` when `recursive` is set
pub async fn run(
    hub: &ContentHub,
    path: &str,
    recursive: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let message = format!("Delete {}", path);

    if recursive {
        match hub.provider.delete_directory(path, &message, cancel).await {
            Ok(report) => {
                println!(
                    "Deleted {} ({} files, {} directories)",
                    report.path,
                    report.deleted_files.len(),
                    report.removed_directories.len()
                );
                Ok(())
            }
            Err(e) => {
                if let ContentError::PartialDelete { deleted, .. } = e.root() {
                    for entry in deleted {
                        println!("  deleted {}", entry);
                    }
                }
                Err(e.into())
            }
        }
    } else {
        let Some(item) = hub.provider.get_item_by_path(path, cancel).await? else {
            anyhow::bail!("No item at {}", path);
        };
        hub.provider
            .delete_item(&item.path, &message, &item.provider_specific_id, cancel)
            .await?;
        println!("Deleted {}", item.path);
        Ok(())
    }
}
