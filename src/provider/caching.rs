//! Read-through caching around any provider

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{CommitResponse, ContentProvider, DeleteReport};
use crate::cache::ContentCache;
use crate::content::{
    ContentCategory, ContentItem, ContentQuery, ContentTag, DirectoryItem, LocalizationInfo,
};
use crate::error::{ErrorKind, Result};
use crate::helpers;

/// Serves reads from a [`ContentCache`] and delegates everything else
///
/// Keys look like `{provider_id}:{method}:{arguments}`. Failures and absent results are
/// never cached. Writes pass through; once one succeeds every key under the provider's
/// prefix is dropped.
///
/// Decorators can be stacked, each with its own cache. Two layers sharing one cache
/// would build the same keys and wait on each other.
pub struct CachingProvider {
    inner: Arc<dyn ContentProvider>,
    cache: Arc<ContentCache>,
    ttl: Option<Duration>,
}

impl CachingProvider {
    pub fn new(inner: Arc<dyn ContentProvider>, cache: Arc<ContentCache>) -> Self {
        Self {
            inner,
            cache,
            ttl: None,
        }
    }

    /// Cache reads for `ttl` instead of the cache's default lifetime
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn inner(&self) -> &Arc<dyn ContentProvider> {
        &self.inner
    }

    fn key(&self, method: &str, args: &str) -> String {
        format!("{}:{}:{}", self.inner.provider_id(), method, args)
    }

    fn invalidate(&self) -> usize {
        self.cache
            .remove_by_prefix(&format!("{}:", self.inner.provider_id()))
    }

    async fn cached<T, F, Fut>(&self, key: String, factory: F) -> Result<Option<T>>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Option<T>>> + Send,
    {
        self.cache.get_or_create(&key, self.ttl, factory).await
    }

    fn after_write<T>(&self, result: Result<T>) -> Result<T> {
        if result.is_ok() {
            let removed = self.invalidate();
            tracing::debug!(
                "Write on '{}' dropped {} cached reads",
                self.inner.provider_id(),
                removed
            );
        }
        result
    }
}

#[async_trait]
impl ContentProvider for CachingProvider {
    fn provider_id(&self) -> &str {
        self.inner.provider_id()
    }

    fn display_name(&self) -> &str {
        self.inner.display_name()
    }

    fn is_read_only(&self) -> bool {
        self.inner.is_read_only()
    }

    async fn initialize(&self, cancel: &CancellationToken) -> Result<()> {
        self.inner.initialize(cancel).await
    }

    async fn get_all_items(&self, cancel: &CancellationToken) -> Result<Vec<ContentItem>> {
        let items = self
            .cached(self.key("get_all_items", ""), || async {
                self.inner.get_all_items(cancel).await.map(Some)
            })
            .await?;
        Ok(items.unwrap_or_default())
    }

    async fn get_item_by_id(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ContentItem>> {
        self.cached(self.key("get_item_by_id", id.trim()), || {
            self.inner.get_item_by_id(id, cancel)
        })
        .await
    }

    async fn get_item_by_path(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ContentItem>> {
        let key = self.key("get_item_by_path", &helpers::normalize_path(path));
        self.cached(key, || self.inner.get_item_by_path(path, cancel))
            .await
    }

    async fn get_item_by_url(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ContentItem>> {
        let key = self.key("get_item_by_url", &helpers::normalize_url(url));
        self.cached(key, || self.inner.get_item_by_url(url, cancel))
            .await
    }

    async fn get_items_by_query(
        &self,
        query: &ContentQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<ContentItem>> {
        let key = self.key("get_items_by_query", &query.cache_key());
        let items = self
            .cached(key, || async {
                self.inner.get_items_by_query(query, cancel).await.map(Some)
            })
            .await?;
        Ok(items.unwrap_or_default())
    }

    async fn get_categories(&self, cancel: &CancellationToken) -> Result<Vec<ContentCategory>> {
        let categories = self
            .cached(self.key("get_categories", ""), || async {
                self.inner.get_categories(cancel).await.map(Some)
            })
            .await?;
        Ok(categories.unwrap_or_default())
    }

    async fn get_tags(&self, cancel: &CancellationToken) -> Result<Vec<ContentTag>> {
        let tags = self
            .cached(self.key("get_tags", ""), || async {
                self.inner.get_tags(cancel).await.map(Some)
            })
            .await?;
        Ok(tags.unwrap_or_default())
    }

    async fn get_directories(
        &self,
        locale: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<DirectoryItem>> {
        let key = self.key("get_directories", locale.map(str::trim).unwrap_or("*"));
        let directories = self
            .cached(key, || async {
                self.inner.get_directories(locale, cancel).await.map(Some)
            })
            .await?;
        Ok(directories.unwrap_or_default())
    }

    async fn get_directory_by_id(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<DirectoryItem>> {
        self.cached(self.key("get_directory_by_id", id.trim()), || {
            self.inner.get_directory_by_id(id, cancel)
        })
        .await
    }

    async fn get_directory_by_path(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<DirectoryItem>> {
        let key = self.key("get_directory_by_path", &helpers::normalize_path(path));
        self.cached(key, || self.inner.get_directory_by_path(path, cancel))
            .await
    }

    async fn get_directory_by_url(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<DirectoryItem>> {
        let key = self.key("get_directory_by_url", &helpers::normalize_url(url));
        self.cached(key, || self.inner.get_directory_by_url(url, cancel))
            .await
    }

    async fn get_localization_info(&self, cancel: &CancellationToken) -> Result<LocalizationInfo> {
        let info = self
            .cached(self.key("get_localization_info", ""), || async {
                self.inner.get_localization_info(cancel).await.map(Some)
            })
            .await?;
        Ok(info.unwrap_or_default())
    }

    async fn get_content_translations(
        &self,
        localization_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ContentItem>> {
        let key = self.key("get_content_translations", localization_id.trim());
        let items = self
            .cached(key, || async {
                self.inner
                    .get_content_translations(localization_id, cancel)
                    .await
                    .map(Some)
            })
            .await?;
        Ok(items.unwrap_or_default())
    }

    async fn refresh_cache(&self, cancel: &CancellationToken) -> Result<()> {
        let removed = self.invalidate();
        tracing::info!(
            "Dropped {} cached reads for '{}'",
            removed,
            self.inner.provider_id()
        );
        self.inner.refresh_cache(cancel).await
    }

    async fn create_item(
        &self,
        path: &str,
        content: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<CommitResponse> {
        let result = self.inner.create_item(path, content, message, cancel).await;
        self.after_write(result)
    }

    async fn update_item(
        &self,
        path: &str,
        content: &str,
        message: &str,
        expected_token: &str,
        cancel: &CancellationToken,
    ) -> Result<CommitResponse> {
        let result = self
            .inner
            .update_item(path, content, message, expected_token, cancel)
            .await;
        self.after_write(result)
    }

    async fn delete_item(
        &self,
        path: &str,
        message: &str,
        expected_token: &str,
        cancel: &CancellationToken,
    ) -> Result<CommitResponse> {
        let result = self
            .inner
            .delete_item(path, message, expected_token, cancel)
            .await;
        self.after_write(result)
    }

    async fn create_directory(
        &self,
        path: &str,
        metadata_content: Option<&str>,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<CommitResponse> {
        let result = self
            .inner
            .create_directory(path, metadata_content, message, cancel)
            .await;
        self.after_write(result)
    }

    async fn delete_directory(
        &self,
        path: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<DeleteReport> {
        let result = self.inner.delete_directory(path, message, cancel).await;
        if let Err(e) = &result {
            // A partial delete still changed the backend
            if e.kind() == ErrorKind::PartialFailure {
                self.invalidate();
            }
        }
        self.after_write(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, ContentOptions};
    use crate::provider::{MemoryProvider, MemoryRepository};

    /// Decorator over a provider whose own cache is off, so every miss reaches the backend
    fn setup() -> (MemoryRepository, Arc<ContentCache>, CachingProvider) {
        let repo = MemoryRepository::new();
        repo.insert("blog/a.md", "---\ntitle: A\ntags: [rust]\n---\n");
        repo.insert("blog/b.md", "---\ntitle: B\n---\n");
        let inner = MemoryProvider::new(
            repo.clone(),
            "mem",
            "Memory",
            ContentOptions::default(),
            ContentCache::shared(CacheConfig {
                enabled: false,
                ..Default::default()
            }),
        );
        let cache = ContentCache::shared(CacheConfig::default());
        let provider = CachingProvider::new(Arc::new(inner), cache.clone());
        (repo, cache, provider)
    }

    #[tokio::test]
    async fn test_reads_are_served_from_cache() {
        let (repo, cache, provider) = setup();
        let cancel = CancellationToken::new();

        assert_eq!(provider.get_all_items(&cancel).await.unwrap().len(), 2);
        assert!(!cache.keys_with_prefix("mem:get_all_items").is_empty());

        repo.set_available(false);
        assert_eq!(provider.get_all_items(&cancel).await.unwrap().len(), 2);

        // Never-requested reads still go to the backend
        let err = provider.get_tags(&cancel).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
        // and the failure is not remembered
        repo.set_available(true);
        assert_eq!(provider.get_tags(&cancel).await.unwrap()[0].name, "rust");
    }

    #[tokio::test]
    async fn test_absent_results_are_not_cached() {
        let (repo, _cache, provider) = setup();
        let cancel = CancellationToken::new();

        assert!(provider.get_item_by_path("blog/c.md", &cancel).await.unwrap().is_none());
        repo.insert("blog/c.md", "---\ntitle: C\n---\n");
        let found = provider.get_item_by_path("Blog/C.md", &cancel).await.unwrap();
        assert_eq!(found.unwrap().title, "C");
    }

    #[tokio::test]
    async fn test_writes_and_refresh_invalidate() {
        let (repo, cache, provider) = setup();
        let cancel = CancellationToken::new();
        let query = ContentQuery::new().with_directory("blog");

        assert_eq!(provider.get_items_by_query(&query, &cancel).await.unwrap().len(), 2);
        provider
            .create_item("blog/c.md", "---\ntitle: C\n---\n", "add", &cancel)
            .await
            .unwrap();
        assert_eq!(provider.get_items_by_query(&query, &cancel).await.unwrap().len(), 3);

        // Out-of-band change stays invisible until a refresh
        repo.insert("blog/d.md", "---\ntitle: D\n---\n");
        assert_eq!(provider.get_items_by_query(&query, &cancel).await.unwrap().len(), 3);
        provider.refresh_cache(&cancel).await.unwrap();
        assert!(cache.keys_with_prefix("mem:").is_empty());
        assert_eq!(provider.get_items_by_query(&query, &cancel).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_cache() {
        let (_repo, cache, provider) = setup();
        let cancel = CancellationToken::new();
        provider.get_all_items(&cancel).await.unwrap();

        let err = provider
            .update_item("blog/a.md", "---\ntitle: A2\n---\n", "edit", "stale", &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(!cache.keys_with_prefix("mem:get_all_items").is_empty());
    }

    #[tokio::test]
    async fn test_decorators_nest() {
        let (_repo, _cache, provider) = setup();
        let outer = CachingProvider::new(
            Arc::new(provider),
            ContentCache::shared(CacheConfig::default()),
        );
        let cancel = CancellationToken::new();
        assert_eq!(outer.provider_id(), "mem");
        assert_eq!(outer.get_all_items(&cancel).await.unwrap().len(), 2);
    }
}
