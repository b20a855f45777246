//! Provider over a file store with Git-like write semantics

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{cancellable, check_cancelled, CommitResponse, ContentProvider, DeleteReport};
use crate::cache::{ContentCache, DirectoryCacheManager};
use crate::config::ContentOptions;
use crate::content::{
    taxonomy, ContentCategory, ContentItem, ContentQuery, ContentTag, DirectoryItem,
    DirectoryTree, FrontMatter, ListingEntry, LocalizationInfo, TreeBuilder,
};
use crate::error::{ContentError, ErrorKind, Result};
use crate::helpers;

/// A file read from a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub path: String,
    /// Concurrency token of this revision
    pub token: String,
    pub content: String,
    pub modified: Option<DateTime<Utc>>,
}

/// What a backend reports after a write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    /// New token of the written file; absent for deletions
    pub token: Option<String>,
    pub commit_id: String,
}

/// Storage behind a [`RepositoryProvider`]
///
/// Paths are relative to the content root and already normalized. Writes follow the
/// Git contents model: creating (`expected = None`) over an existing file and writing
/// with a stale token both fail with `Conflict`; updating or deleting a missing file
/// fails with `NotFound`.
#[async_trait]
pub trait RepositoryBackend: Send + Sync {
    /// Short description for logs
    fn describe(&self) -> String;

    /// Every file and directory under the content root
    async fn list_tree(&self) -> Result<Vec<ListingEntry>>;

    /// Like `list_tree`, plus entries hidden from it such as `.gitkeep` placeholders
    async fn list_all(&self) -> Result<Vec<ListingEntry>> {
        self.list_tree().await
    }

    async fn read_file(&self, path: &str) -> Result<RemoteFile>;

    async fn put_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
        expected: Option<&str>,
    ) -> Result<WriteReceipt>;

    /// Delete a file; `expected = None` deletes whatever revision is current
    async fn delete_file(
        &self,
        path: &str,
        message: &str,
        expected: Option<&str>,
    ) -> Result<WriteReceipt>;

    /// Remove an emptied directory; backends without real directories do nothing
    async fn remove_directory(&self, path: &str) -> Result<()> {
        let _ = path;
        Ok(())
    }
}

/// [`ContentProvider`] over any [`RepositoryBackend`]
///
/// Loaded items are kept in the shared cache under `{provider_id}:snapshot` and the
/// directory tree under `{provider_id}:directory-tree`; successful writes drop every key
/// with the `{provider_id}:` prefix.
pub struct RepositoryProvider<B> {
    backend: Arc<B>,
    provider_id: String,
    display_name: String,
    read_only: bool,
    options: ContentOptions,
    cache: Arc<ContentCache>,
    directories: DirectoryCacheManager,
}

impl<B: RepositoryBackend> RepositoryProvider<B> {
    pub fn new(
        backend: B,
        provider_id: impl Into<String>,
        display_name: impl Into<String>,
        options: ContentOptions,
        cache: Arc<ContentCache>,
    ) -> Self {
        let provider_id = provider_id.into();
        let directories = DirectoryCacheManager::new(cache.clone(), &provider_id);
        Self {
            backend: Arc::new(backend),
            display_name: display_name.into(),
            read_only: false,
            options,
            cache,
            directories,
            provider_id,
        }
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn options(&self) -> &ContentOptions {
        &self.options
    }

    pub fn cache(&self) -> &Arc<ContentCache> {
        &self.cache
    }

    fn cache_prefix(&self) -> String {
        format!("{}:", self.provider_id)
    }

    /// Drop every cached value this provider owns
    pub fn invalidate(&self) -> usize {
        self.cache.remove_by_prefix(&self.cache_prefix())
    }

    async fn snapshot(&self, cancel: &CancellationToken) -> Result<Arc<Vec<ContentItem>>> {
        let key = format!("{}:snapshot", self.provider_id);
        let items = self
            .cache
            .get_or_create(&key, None, || async {
                self.load_items(cancel).await.map(|items| Some(Arc::new(items)))
            })
            .await?;
        Ok(items.unwrap_or_default())
    }

    async fn tree(&self, cancel: &CancellationToken) -> Result<Arc<DirectoryTree>> {
        self.directories
            .get_cached_directories(|| self.load_tree(cancel), false)
            .await
    }

    fn is_content_file(&self, entry: &ListingEntry) -> bool {
        entry.is_file()
            && self.options.is_allowed_extension(&entry.path)
            && !self.options.is_metadata_file(&entry.path)
            && !self.options.is_excluded(&entry.path)
            && !excluded_by_ancestor(&self.options, &entry.path)
    }

    async fn load_items(&self, cancel: &CancellationToken) -> Result<Vec<ContentItem>> {
        let entries = cancellable(cancel, self.backend.list_tree()).await?;
        let paths: Vec<String> = entries
            .iter()
            .filter(|e| self.is_content_file(e))
            .map(|e| e.path.clone())
            .collect();
        tracing::debug!(
            "Loading {} documents from {}",
            paths.len(),
            self.backend.describe()
        );

        let results: Vec<Result<Option<ContentItem>>> = stream::iter(paths)
            .map(|path| async move { self.load_item(&path, cancel).await })
            .buffer_unordered(self.options.load_concurrency.max(1))
            .collect()
            .await;

        let mut items = Vec::with_capacity(results.len());
        for result in results {
            if let Some(item) = result? {
                items.push(item);
            }
        }
        items.sort_by(|a, b| a.path.cmp(&b.path));
        check_cancelled(cancel)?;

        tracing::info!(
            "Loaded {} items for provider '{}'",
            items.len(),
            self.provider_id
        );
        Ok(items)
    }

    /// Read and parse one document; unreadable documents are skipped
    async fn load_item(&self, path: &str, cancel: &CancellationToken) -> Result<Option<ContentItem>> {
        let file = match cancellable(cancel, self.backend.read_file(path)).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!("Skipping {}: removed while loading", path);
                return Ok(None);
            }
            Err(e) if e.is_decode() => {
                tracing::warn!("Skipping {}: {}", path, e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        match ContentItem::parse(
            &self.provider_id,
            &file.path,
            &file.content,
            &file.token,
            &self.options,
            file.modified,
        ) {
            Ok(item) => Ok(Some(item)),
            Err(e) => {
                tracing::warn!("Skipping {}: {}", path, e);
                Ok(None)
            }
        }
    }

    async fn load_tree(&self, cancel: &CancellationToken) -> Result<DirectoryTree> {
        let entries = cancellable(cancel, self.backend.list_tree()).await?;
        let builder = TreeBuilder::new(&self.provider_id, &self.options);

        let results: Vec<Result<Option<(String, FrontMatter)>>> =
            stream::iter(builder.metadata_files(&entries))
                .map(|(dir, file)| async move {
                    let remote = match cancellable(cancel, self.backend.read_file(&file)).await {
                        Ok(remote) => remote,
                        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
                        Err(e) if e.is_decode() => {
                            tracing::warn!("Ignoring metadata {}: {}", file, e);
                            return Ok(None);
                        }
                        Err(e) => return Err(e),
                    };
                    match FrontMatter::parse(&remote.content) {
                        Ok((fm, _)) => Ok(Some((dir, fm))),
                        Err(e) => {
                            tracing::warn!("Ignoring metadata in {}: {}", file, e);
                            Ok(None)
                        }
                    }
                })
                .buffer_unordered(self.options.load_concurrency.max(1))
                .collect()
                .await;

        let mut metadata = HashMap::new();
        for result in results {
            if let Some((dir, fm)) = result? {
                metadata.insert(dir, fm);
            }
        }
        check_cancelled(cancel)?;
        Ok(builder.build(&entries, &metadata))
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(ContentError::disallowed(format!(
                "{} is read-only",
                self.display_name
            )));
        }
        Ok(())
    }

    /// Normalize a document path and check its body before anything is sent
    fn validate_document(&self, path: &str, content: &str) -> Result<String> {
        self.ensure_writable()?;
        let path = helpers::normalize_path(path);
        if path.is_empty() {
            return Err(ContentError::validation("path is empty"));
        }
        if !self.options.is_allowed_extension(&path) {
            return Err(ContentError::validation(format!(
                "{} does not have an allowed extension ({})",
                path,
                self.options.allowed_extensions.join(", ")
            )));
        }
        let (fm, _) = FrontMatter::parse(content).map_err(|e| {
            ContentError::validation(format!("invalid front matter in {}: {}", path, e))
        })?;
        if !self.options.is_metadata_file(&path) {
            fm.validate_required(&self.options.required_fields)?;
        }
        Ok(path)
    }

    /// Log and invalidate after a write went through
    fn committed(&self, operation: &str, path: &str, commit_id: &str) {
        let removed = self.invalidate();
        tracing::info!(
            "{} {} on '{}' (commit {}, {} cache entries dropped)",
            operation,
            path,
            self.provider_id,
            commit_id,
            removed
        );
    }

    fn wrap(&self, operation: &'static str) -> impl Fn(ContentError) -> ContentError + '_ {
        move |e| e.in_operation(operation, &self.provider_id)
    }

    async fn create_item_inner(
        &self,
        path: &str,
        content: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<CommitResponse> {
        let path = self.validate_document(path, content)?;
        check_cancelled(cancel)?;
        let receipt = self.backend.put_file(&path, content, message, None).await?;
        self.committed("Created", &path, &receipt.commit_id);
        Ok(self.response(path, content, receipt))
    }

    async fn update_item_inner(
        &self,
        path: &str,
        content: &str,
        message: &str,
        expected_token: &str,
        cancel: &CancellationToken,
    ) -> Result<CommitResponse> {
        let path = self.validate_document(path, content)?;
        if expected_token.trim().is_empty() {
            return Err(ContentError::validation("a concurrency token is required to update"));
        }
        check_cancelled(cancel)?;
        let receipt = self
            .backend
            .put_file(&path, content, message, Some(expected_token))
            .await?;
        self.committed("Updated", &path, &receipt.commit_id);
        Ok(self.response(path, content, receipt))
    }

    async fn delete_item_inner(
        &self,
        path: &str,
        message: &str,
        expected_token: &str,
        cancel: &CancellationToken,
    ) -> Result<CommitResponse> {
        self.ensure_writable()?;
        let path = helpers::normalize_path(path);
        if path.is_empty() {
            return Err(ContentError::validation("path is empty"));
        }
        if expected_token.trim().is_empty() {
            return Err(ContentError::validation("a concurrency token is required to delete"));
        }
        check_cancelled(cancel)?;
        let receipt = self
            .backend
            .delete_file(&path, message, Some(expected_token))
            .await?;
        self.committed("Deleted", &path, &receipt.commit_id);
        Ok(CommitResponse::deleted(receipt.commit_id))
    }

    async fn create_directory_inner(
        &self,
        path: &str,
        metadata_content: Option<&str>,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<CommitResponse> {
        self.ensure_writable()?;
        let dir = helpers::normalize_path(path);
        if dir.is_empty() {
            return Err(ContentError::disallowed("the content root already exists"));
        }
        if self.options.is_excluded(&dir) {
            return Err(ContentError::validation(format!("{} is excluded", dir)));
        }

        let content = match metadata_content {
            Some(content) => content.to_string(),
            None => FrontMatter {
                title: Some(helpers::file_name(&dir).to_string()),
                ..Default::default()
            }
            .to_document("")?,
        };
        let file = helpers::join_path(&dir, &self.options.metadata_file);
        check_cancelled(cancel)?;
        let receipt = self.backend.put_file(&file, &content, message, None).await?;
        self.committed("Created directory", &dir, &receipt.commit_id);
        Ok(self.response(file, &content, receipt))
    }

    async fn delete_directory_inner(
        &self,
        path: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<DeleteReport> {
        self.ensure_writable()?;
        let dir = helpers::normalize_path(path);
        if dir.is_empty() {
            return Err(ContentError::disallowed("the content root cannot be deleted"));
        }

        let entries = cancellable(cancel, self.backend.list_all()).await?;
        let mut files: Vec<&ListingEntry> = entries
            .iter()
            .filter(|e| e.is_file() && helpers::is_under(&e.path, &dir))
            .collect();
        let mut directories: Vec<&ListingEntry> = entries
            .iter()
            .filter(|e| !e.is_file())
            .filter(|e| helpers::same_path(&e.path, &dir) || helpers::is_under(&e.path, &dir))
            .collect();
        if files.is_empty() && directories.is_empty() {
            return Err(ContentError::not_found("directory", dir));
        }

        let deepest_first = |a: &&ListingEntry, b: &&ListingEntry| {
            helpers::path_depth(&b.path)
                .cmp(&helpers::path_depth(&a.path))
                .then_with(|| a.path.cmp(&b.path))
        };
        files.sort_by(deepest_first);
        directories.sort_by(deepest_first);

        let mut report = DeleteReport {
            path: dir.clone(),
            ..Default::default()
        };
        for file in files {
            let result = match check_cancelled(cancel) {
                Ok(()) => self
                    .backend
                    .delete_file(&file.path, message, file.token.as_deref())
                    .await
                    .map(|_| ()),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                return Err(self.partial_delete(report, &file.path, e));
            }
            report.deleted_files.push(file.path.clone());
        }
        for directory in directories {
            if let Err(e) = self.backend.remove_directory(&directory.path).await {
                return Err(self.partial_delete(report, &directory.path, e));
            }
            report.removed_directories.push(directory.path.clone());
        }

        self.committed("Deleted directory", &dir, "-");
        Ok(report)
    }

    /// Turn a failure partway through a directory deletion into `PartialDelete`
    fn partial_delete(&self, report: DeleteReport, failed_path: &str, source: ContentError) -> ContentError {
        if report.deleted_files.is_empty() && report.removed_directories.is_empty() {
            return source;
        }
        // Whatever did go through must not be served from cache
        self.invalidate();
        let mut deleted = report.deleted_files;
        deleted.extend(report.removed_directories);
        tracing::error!(
            "Deleting {} stopped at {} after {} entries: {}",
            report.path,
            failed_path,
            deleted.len(),
            source
        );
        ContentError::PartialDelete {
            path: report.path,
            deleted,
            failed_path: failed_path.to_string(),
            source: Box::new(source),
        }
    }

    fn response(&self, path: String, content: &str, receipt: WriteReceipt) -> CommitResponse {
        let token = receipt
            .token
            .unwrap_or_else(|| helpers::content_token(content));
        CommitResponse::written(path, token, receipt.commit_id)
    }
}

/// True when a directory above `path` matches an exclude pattern
fn excluded_by_ancestor(options: &ContentOptions, path: &str) -> bool {
    let mut current = helpers::parent_path(path);
    while let Some(dir) = current {
        if dir.is_empty() {
            return false;
        }
        if options.is_excluded(&dir) {
            return true;
        }
        current = helpers::parent_path(&dir);
    }
    false
}

#[async_trait]
impl<B: RepositoryBackend> ContentProvider for RepositoryProvider<B> {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    async fn initialize(&self, cancel: &CancellationToken) -> Result<()> {
        tracing::info!(
            "Initializing provider '{}' ({})",
            self.provider_id,
            self.backend.describe()
        );
        let items = self.snapshot(cancel).await.map_err(self.wrap("initialize"))?;
        let tree = self.tree(cancel).await.map_err(self.wrap("initialize"))?;
        tracing::info!(
            "Provider '{}' ready: {} items, {} directories",
            self.provider_id,
            items.len(),
            tree.len()
        );
        Ok(())
    }

    async fn get_all_items(&self, cancel: &CancellationToken) -> Result<Vec<ContentItem>> {
        let items = self.snapshot(cancel).await.map_err(self.wrap("get_all_items"))?;
        Ok(items.as_ref().clone())
    }

    async fn get_item_by_id(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ContentItem>> {
        let items = self.snapshot(cancel).await.map_err(self.wrap("get_item_by_id"))?;
        let id = id.trim();
        Ok(items.iter().find(|i| i.id.eq_ignore_ascii_case(id)).cloned())
    }

    async fn get_item_by_path(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ContentItem>> {
        let items = self.snapshot(cancel).await.map_err(self.wrap("get_item_by_path"))?;
        Ok(items.iter().find(|i| helpers::same_path(&i.path, path)).cloned())
    }

    async fn get_item_by_url(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ContentItem>> {
        let items = self.snapshot(cancel).await.map_err(self.wrap("get_item_by_url"))?;
        let url = helpers::normalize_url(url);
        Ok(items
            .iter()
            .find(|i| helpers::normalize_url(&i.url) == url)
            .cloned())
    }

    async fn get_items_by_query(
        &self,
        query: &ContentQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<ContentItem>> {
        let items = self
            .snapshot(cancel)
            .await
            .map_err(self.wrap("get_items_by_query"))?;
        check_cancelled(cancel).map_err(self.wrap("get_items_by_query"))?;
        Ok(query.apply(items.iter().cloned()))
    }

    async fn get_categories(&self, cancel: &CancellationToken) -> Result<Vec<ContentCategory>> {
        let items = self.snapshot(cancel).await.map_err(self.wrap("get_categories"))?;
        Ok(taxonomy::categories(&items))
    }

    async fn get_tags(&self, cancel: &CancellationToken) -> Result<Vec<ContentTag>> {
        let items = self.snapshot(cancel).await.map_err(self.wrap("get_tags"))?;
        Ok(taxonomy::tags(&items))
    }

    async fn get_directories(
        &self,
        locale: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<DirectoryItem>> {
        let tree = self.tree(cancel).await.map_err(self.wrap("get_directories"))?;
        Ok(tree.for_locale(locale))
    }

    async fn get_directory_by_id(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<DirectoryItem>> {
        let tree = self.tree(cancel).await.map_err(self.wrap("get_directory_by_id"))?;
        Ok(tree.find_by_id(id).cloned())
    }

    async fn get_directory_by_path(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<DirectoryItem>> {
        let tree = self
            .tree(cancel)
            .await
            .map_err(self.wrap("get_directory_by_path"))?;
        Ok(tree.find_by_path(path).cloned())
    }

    async fn get_directory_by_url(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<DirectoryItem>> {
        let tree = self
            .tree(cancel)
            .await
            .map_err(self.wrap("get_directory_by_url"))?;
        Ok(tree.find_by_url(url).cloned())
    }

    async fn get_localization_info(&self, cancel: &CancellationToken) -> Result<LocalizationInfo> {
        let items = self
            .snapshot(cancel)
            .await
            .map_err(self.wrap("get_localization_info"))?;
        Ok(taxonomy::localization_info(&items, &self.options.default_locale))
    }

    async fn get_content_translations(
        &self,
        localization_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ContentItem>> {
        let items = self
            .snapshot(cancel)
            .await
            .map_err(self.wrap("get_content_translations"))?;
        Ok(taxonomy::translations(&items, localization_id))
    }

    async fn refresh_cache(&self, cancel: &CancellationToken) -> Result<()> {
        check_cancelled(cancel).map_err(self.wrap("refresh_cache"))?;
        let removed = self.invalidate();
        tracing::info!(
            "Refreshed provider '{}' ({} cache entries dropped)",
            self.provider_id,
            removed
        );
        Ok(())
    }

    async fn create_item(
        &self,
        path: &str,
        content: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<CommitResponse> {
        self.create_item_inner(path, content, message, cancel)
            .await
            .map_err(self.wrap("create_item"))
    }

    async fn update_item(
        &self,
        path: &str,
        content: &str,
        message: &str,
        expected_token: &str,
        cancel: &CancellationToken,
    ) -> Result<CommitResponse> {
        self.update_item_inner(path, content, message, expected_token, cancel)
            .await
            .map_err(self.wrap("update_item"))
    }

    async fn delete_item(
        &self,
        path: &str,
        message: &str,
        expected_token: &str,
        cancel: &CancellationToken,
    ) -> Result<CommitResponse> {
        self.delete_item_inner(path, message, expected_token, cancel)
            .await
            .map_err(self.wrap("delete_item"))
    }

    async fn create_directory(
        &self,
        path: &str,
        metadata_content: Option<&str>,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<CommitResponse> {
        self.create_directory_inner(path, metadata_content, message, cancel)
            .await
            .map_err(self.wrap("create_directory"))
    }

    async fn delete_directory(
        &self,
        path: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<DeleteReport> {
        self.delete_directory_inner(path, message, cancel)
            .await
            .map_err(self.wrap("delete_directory"))
    }
}
