//! Whole-tree snapshot cache

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::ContentCache;
use crate::content::DirectoryTree;
use crate::error::{ContentError, Result};

/// Caches one provider's directory tree under a single slot
///
/// The tree is assembled from a full backend listing, so it is stored and replaced as a
/// unit rather than per directory.
#[derive(Debug, Clone)]
pub struct DirectoryCacheManager {
    cache: Arc<ContentCache>,
    key: String,
    ttl: Option<Duration>,
}

impl DirectoryCacheManager {
    pub fn new(cache: Arc<ContentCache>, provider_id: &str) -> Self {
        Self {
            cache,
            key: format!("{}:directory-tree", provider_id),
            ttl: None,
        }
    }

    /// Override the cache's default lifetime for the tree
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn cache_key(&self) -> &str {
        &self.key
    }

    /// Return the cached tree, running `loader` on a miss or when `force_refresh` is set
    pub async fn get_cached_directories<F, Fut>(
        &self,
        loader: F,
        force_refresh: bool,
    ) -> Result<Arc<DirectoryTree>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<DirectoryTree>>,
    {
        if force_refresh {
            tracing::debug!("Forcing directory tree refresh for {}", self.key);
            self.invalidate_cache();
        }

        let tree = self
            .cache
            .get_or_create(&self.key, self.ttl, move || async move {
                let tree = loader().await?;
                tracing::info!("Loaded directory tree with {} directories", tree.len());
                Ok::<_, ContentError>(Some(Arc::new(tree)))
            })
            .await?;
        Ok(tree.unwrap_or_default())
    }

    /// The cached tree, if any, without loading
    pub fn cached(&self) -> Option<Arc<DirectoryTree>> {
        self.cache.get(&self.key)
    }

    pub fn invalidate_cache(&self) {
        self.cache.remove(&self.key);
    }
}
