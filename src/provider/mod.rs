//! Content providers
//!
//! A [`ContentProvider`] exposes one content source through a uniform read and write
//! surface. [`RepositoryProvider`] implements it over any [`RepositoryBackend`]: a
//! GitHub repository, the local filesystem, or an in-memory store.
//! [`CachingProvider`] wraps any provider and serves repeated reads from the shared
//! [`ContentCache`](crate::cache::ContentCache).

mod caching;
mod filesystem;
mod github;
mod memory;
mod repository;

pub use caching::CachingProvider;
pub use filesystem::{FileSystemBackend, FileSystemProvider, FileWatcher};
pub use github::{GitHubBackend, GitHubProvider};
pub use memory::{MemoryProvider, MemoryRepository};
pub use repository::{RemoteFile, RepositoryBackend, RepositoryProvider, WriteReceipt};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::content::{
    ContentCategory, ContentItem, ContentQuery, ContentTag, DirectoryItem, LocalizationInfo,
};
use crate::error::{ContentError, Result};

/// Result of a successful write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResponse {
    pub success: bool,
    /// The written file; absent for deletions
    pub content: Option<CommittedContent>,
    pub commit_info: CommitInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommittedContent {
    pub path: String,
    /// Token to pass on the next update or delete of this path
    pub new_provider_specific_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub id: String,
}

impl CommitResponse {
    pub fn written(path: impl Into<String>, token: impl Into<String>, commit_id: impl Into<String>) -> Self {
        Self {
            success: true,
            content: Some(CommittedContent {
                path: path.into(),
                new_provider_specific_id: token.into(),
            }),
            commit_info: CommitInfo {
                id: commit_id.into(),
            },
        }
    }

    pub fn deleted(commit_id: impl Into<String>) -> Self {
        Self {
            success: true,
            content: None,
            commit_info: CommitInfo {
                id: commit_id.into(),
            },
        }
    }

    /// Token of the written file, if any
    pub fn token(&self) -> Option<&str> {
        self.content
            .as_ref()
            .map(|c| c.new_provider_specific_id.as_str())
    }
}

/// Outcome of a directory deletion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReport {
    pub path: String,
    /// Files removed, deepest first
    pub deleted_files: Vec<String>,
    /// Directories removed, bottom-up (backends without real directories report none)
    pub removed_directories: Vec<String>,
}

/// Fail fast when the caller has cancelled
pub fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(ContentError::Cancelled)
    } else {
        Ok(())
    }
}

/// Run a backend read, abandoning it as soon as `cancel` fires
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    check_cancelled(cancel)?;
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ContentError::Cancelled),
        result = fut => result,
    }
}

/// Uniform access to one content source
///
/// Every operation takes a [`CancellationToken`]; it is checked before and between
/// backend calls. Errors leave a provider wrapped in
/// [`ContentError::ProviderOperationFailed`]; use [`ContentError::kind`] to classify them.
///
/// Write operations default to [`ContentError::OperationDisallowed`] so read-only
/// sources only implement the read side.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Unique id, also the prefix of every cache key this provider owns
    fn provider_id(&self) -> &str;

    fn display_name(&self) -> &str;

    fn is_read_only(&self) -> bool;

    /// Load the provider's content once so later reads start warm
    async fn initialize(&self, cancel: &CancellationToken) -> Result<()>;

    async fn get_all_items(&self, cancel: &CancellationToken) -> Result<Vec<ContentItem>>;

    async fn get_item_by_id(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ContentItem>>;

    async fn get_item_by_path(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ContentItem>>;

    async fn get_item_by_url(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ContentItem>>;

    async fn get_items_by_query(
        &self,
        query: &ContentQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<ContentItem>>;

    async fn get_categories(&self, cancel: &CancellationToken) -> Result<Vec<ContentCategory>>;

    async fn get_tags(&self, cancel: &CancellationToken) -> Result<Vec<ContentTag>>;

    /// Top-level directories with their subtrees, optionally restricted to one locale
    async fn get_directories(
        &self,
        locale: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<DirectoryItem>>;

    async fn get_directory_by_id(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<DirectoryItem>>;

    async fn get_directory_by_path(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<DirectoryItem>>;

    async fn get_directory_by_url(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<DirectoryItem>>;

    async fn get_localization_info(&self, cancel: &CancellationToken) -> Result<LocalizationInfo>;

    /// Every item sharing `localization_id`, one per locale
    async fn get_content_translations(
        &self,
        localization_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ContentItem>>;

    /// Drop everything cached for this provider
    async fn refresh_cache(&self, cancel: &CancellationToken) -> Result<()>;

    /// Create a new document; fails with `Conflict` if the path exists
    async fn create_item(
        &self,
        path: &str,
        content: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<CommitResponse> {
        let _ = (path, content, message, cancel);
        Err(self.disallowed_write("create_item"))
    }

    /// Replace a document, provided it still carries `expected_token`
    async fn update_item(
        &self,
        path: &str,
        content: &str,
        message: &str,
        expected_token: &str,
        cancel: &CancellationToken,
    ) -> Result<CommitResponse> {
        let _ = (path, content, message, expected_token, cancel);
        Err(self.disallowed_write("update_item"))
    }

    /// Remove a document, provided it still carries `expected_token`
    async fn delete_item(
        &self,
        path: &str,
        message: &str,
        expected_token: &str,
        cancel: &CancellationToken,
    ) -> Result<CommitResponse> {
        let _ = (path, message, expected_token, cancel);
        Err(self.disallowed_write("delete_item"))
    }

    /// Create a directory by writing its metadata file
    async fn create_directory(
        &self,
        path: &str,
        metadata_content: Option<&str>,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<CommitResponse> {
        let _ = (path, metadata_content, message, cancel);
        Err(self.disallowed_write("create_directory"))
    }

    /// Remove a directory and everything below it
    async fn delete_directory(
        &self,
        path: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<DeleteReport> {
        let _ = (path, message, cancel);
        Err(self.disallowed_write("delete_directory"))
    }

    #[doc(hidden)]
    fn disallowed_write(&self, operation: &'static str) -> ContentError {
        ContentError::disallowed(format!("{} is read-only", self.display_name()))
            .in_operation(operation, self.provider_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_commit_response_shape() {
        let response = CommitResponse::written("blog/a.md", "abc", "c1");
        assert!(response.success);
        assert_eq!(response.token(), Some("abc"));

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["content"]["newProviderSpecificId"], "abc");
        assert_eq!(json["commitInfo"]["id"], "c1");

        assert_eq!(CommitResponse::deleted("c2").token(), None);
    }

    #[tokio::test]
    async fn test_cancellable() {
        let cancel = CancellationToken::new();
        let value = cancellable(&cancel, async { Ok(1) }).await.unwrap();
        assert_eq!(value, 1);

        cancel.cancel();
        let err = cancellable(&cancel, async { Ok(2) }).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(check_cancelled(&cancel).is_err());
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_read() {
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            child.cancel();
        });
        let err = cancellable(&cancel, futures::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }
}
