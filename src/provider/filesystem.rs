//! Local directory backend and change watching

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use walkdir::WalkDir;

use super::{ContentProvider, RemoteFile, RepositoryBackend, RepositoryProvider, WriteReceipt};
use crate::cache::ContentCache;
use crate::config::{ContentOptions, FileSystemConfig};
use crate::content::ListingEntry;
use crate::error::{ContentError, Result};
use crate::helpers;

pub type FileSystemProvider = RepositoryProvider<FileSystemBackend>;

/// Content stored as files under a root directory
///
/// Tokens are content hashes. Writes are serialized by an in-process lock so the token
/// check and the write happen together; other processes are not coordinated with.
#[derive(Debug)]
pub struct FileSystemBackend {
    root: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
    writes: AtomicU64,
}

impl FileSystemBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: tokio::sync::Mutex::new(()),
            writes: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> PathBuf {
        let mut full = self.root.clone();
        for segment in helpers::normalize_path(path).split('/').filter(|s| !s.is_empty()) {
            full.push(segment);
        }
        full
    }

    async fn current_token(&self, path: &str) -> Result<Option<String>> {
        match tokio::fs::read(self.full_path(path)).await {
            Ok(bytes) => Ok(Some(helpers::content_token(&String::from_utf8_lossy(&bytes)))),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Files and directories under the root, optionally including hidden ones
    async fn walk(&self, include_hidden: bool) -> Result<Vec<ListingEntry>> {
        let root = self.root.clone();
        if !tokio::fs::try_exists(&root).await? {
            return Err(ContentError::unavailable(format!(
                "content root {} does not exist",
                root.display()
            )));
        }

        let entries = tokio::task::spawn_blocking(move || {
            let mut entries = Vec::new();
            for entry in WalkDir::new(&root)
                .min_depth(1)
                .follow_links(true)
                .into_iter()
                .filter_entry(|e| {
                    include_hidden
                        || e.depth() == 0
                        || !is_hidden(e.file_name().to_string_lossy().as_ref())
                })
                .filter_map(|e| e.ok())
            {
                let Ok(relative) = entry.path().strip_prefix(&root) else {
                    continue;
                };
                let path = helpers::normalize_path(&relative.to_string_lossy());
                if entry.file_type().is_dir() {
                    entries.push(ListingEntry::directory(path));
                } else if entry.file_type().is_file() {
                    entries.push(ListingEntry::file(path, None));
                }
            }
            entries
        })
        .await
        .map_err(|e| ContentError::unavailable(format!("directory walk failed: {}", e)))?;

        tracing::debug!("Listed {} entries under {}", entries.len(), self.root.display());
        Ok(entries)
    }

    fn next_commit(&self) -> String {
        let n = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        format!("local-{}-{}", Utc::now().timestamp(), n)
    }
}

#[async_trait]
impl RepositoryBackend for FileSystemBackend {
    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }

    async fn list_tree(&self) -> Result<Vec<ListingEntry>> {
        self.walk(false).await
    }

    async fn list_all(&self) -> Result<Vec<ListingEntry>> {
        self.walk(true).await
    }

    async fn read_file(&self, path: &str) -> Result<RemoteFile> {
        let full = self.full_path(path);
        let content = match tokio::fs::read_to_string(&full).await {
            Ok(content) => content,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                return Err(ContentError::not_found("file", path))
            }
            Err(e) if e.kind() == IoErrorKind::InvalidData => {
                return Err(ContentError::Decode(format!("{} is not UTF-8", path)))
            }
            Err(e) => return Err(e.into()),
        };
        let modified = tokio::fs::metadata(&full)
            .await
            .ok()
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Utc>::from);

        Ok(RemoteFile {
            path: helpers::normalize_path(path),
            token: helpers::content_token(&content),
            content,
            modified,
        })
    }

    async fn put_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
        expected: Option<&str>,
    ) -> Result<WriteReceipt> {
        let _guard = self.write_lock.lock().await;

        match (expected, self.current_token(path).await?) {
            (None, Some(actual)) => {
                return Err(ContentError::conflict(path, "<new file>", Some(actual)))
            }
            (Some(_), None) => return Err(ContentError::not_found("file", path)),
            (Some(expected), Some(actual)) if expected != actual => {
                return Err(ContentError::conflict(path, expected, Some(actual)))
            }
            _ => {}
        }

        let full = self.full_path(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, content).await?;
        tracing::debug!("Wrote {} ({})", full.display(), message);

        Ok(WriteReceipt {
            token: Some(helpers::content_token(content)),
            commit_id: self.next_commit(),
        })
    }

    async fn delete_file(
        &self,
        path: &str,
        message: &str,
        expected: Option<&str>,
    ) -> Result<WriteReceipt> {
        let _guard = self.write_lock.lock().await;

        let actual = self
            .current_token(path)
            .await?
            .ok_or_else(|| ContentError::not_found("file", path))?;
        if let Some(expected) = expected {
            if expected != actual {
                return Err(ContentError::conflict(path, expected, Some(actual)));
            }
        }

        let full = self.full_path(path);
        tokio::fs::remove_file(&full).await?;
        tracing::debug!("Removed {} ({})", full.display(), message);

        Ok(WriteReceipt {
            token: None,
            commit_id: self.next_commit(),
        })
    }

    async fn remove_directory(&self, path: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_dir(self.full_path(path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.') || name.ends_with('~')
}

/// Keeps a filesystem watch alive; dropping it stops watching
pub struct FileWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
}

impl RepositoryProvider<FileSystemBackend> {
    pub fn from_config(
        config: &FileSystemConfig,
        options: ContentOptions,
        cache: Arc<ContentCache>,
    ) -> Self {
        RepositoryProvider::new(
            FileSystemBackend::new(&config.root),
            &config.provider_id,
            &config.display_name,
            options,
            cache,
        )
        .read_only(config.read_only)
    }

    /// Invalidate this provider's cache whenever something under its root changes
    pub fn watch(&self) -> Result<FileWatcher> {
        let cache = self.cache().clone();
        let prefix = format!("{}:", self.provider_id());
        let root = self.backend().root().to_path_buf();
        let watched_root = root.clone();

        let mut debouncer = new_debouncer(
            Duration::from_millis(500),
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    let relevant = events.iter().any(|e| {
                        let relative = e.path.strip_prefix(&watched_root).unwrap_or(&e.path);
                        !relative
                            .components()
                            .any(|c| is_hidden(c.as_os_str().to_string_lossy().as_ref()))
                    });
                    if relevant {
                        let removed = cache.remove_by_prefix(&prefix);
                        tracing::info!(
                            "Content changed on disk, dropped {} cache entries",
                            removed
                        );
                    }
                }
                Err(e) => tracing::warn!("Watch error: {:?}", e),
            },
        )
        .map_err(|e| ContentError::unavailable(format!("cannot start watcher: {}", e)))?;

        debouncer
            .watcher()
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| ContentError::unavailable(format!("cannot watch {}: {}", root.display(), e)))?;
        tracing::debug!("Watching: {:?}", root);

        Ok(FileWatcher {
            _debouncer: debouncer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::error::ErrorKind;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn setup() -> (TempDir, FileSystemProvider) {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("blog/drafts")).unwrap();
        std::fs::create_dir_all(root.join("empty")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join(".git/config"), "x").unwrap();
        std::fs::write(root.join("blog/a.md"), "---\ntitle: A\n---\nbody").unwrap();
        std::fs::write(root.join("blog/drafts/b.md"), "---\ntitle: B\npublished: false\n---\n")
            .unwrap();

        let config = FileSystemConfig {
            root: root.to_path_buf(),
            ..Default::default()
        };
        let provider = FileSystemProvider::from_config(
            &config,
            ContentOptions::default(),
            ContentCache::shared(CacheConfig::default()),
        );
        (dir, provider)
    }

    #[tokio::test]
    async fn test_lists_empty_directories_and_skips_hidden() {
        let (_dir, provider) = setup();
        let entries = provider.backend().list_tree().await.unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"empty"));
        assert!(!paths.iter().any(|p| p.starts_with(".git")));

        let cancel = CancellationToken::new();
        let empty = provider.get_directory_by_path("empty", &cancel).await.unwrap();
        assert!(empty.is_some());
    }

    #[tokio::test]
    async fn test_update_and_conflict_on_disk() {
        let (dir, provider) = setup();
        let cancel = CancellationToken::new();

        let item = provider.get_item_by_path("blog/a.md", &cancel).await.unwrap().unwrap();
        let response = provider
            .update_item(
                "blog/a.md",
                "---\ntitle: A2\n---\nnew body",
                "edit",
                &item.provider_specific_id,
                &cancel,
            )
            .await
            .unwrap();
        let on_disk = std::fs::read_to_string(dir.path().join("blog/a.md")).unwrap();
        assert!(on_disk.contains("new body"));
        assert_eq!(response.token(), Some(helpers::content_token(&on_disk).as_str()));

        let err = provider
            .update_item("blog/a.md", "---\ntitle: A3\n---\n", "edit", &item.provider_specific_id, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_delete_directory_removes_folders_bottom_up() {
        let (dir, provider) = setup();
        let cancel = CancellationToken::new();

        let report = provider.delete_directory("blog", "rm", &cancel).await.unwrap();
        assert_eq!(report.deleted_files, vec!["blog/drafts/b.md", "blog/a.md"]);
        assert_eq!(report.removed_directories, vec!["blog/drafts", "blog"]);
        assert!(!dir.path().join("blog").exists());
        assert!(dir.path().join("empty").exists());
    }

    #[tokio::test]
    async fn test_delete_directory_removes_hidden_placeholders() {
        let (dir, provider) = setup();
        std::fs::write(dir.path().join("blog/.gitkeep"), "").unwrap();
        std::fs::write(dir.path().join("blog/drafts/.keep"), "").unwrap();
        let cancel = CancellationToken::new();

        let report = provider.delete_directory("blog", "rm", &cancel).await.unwrap();
        assert!(report.deleted_files.contains(&"blog/.gitkeep".to_string()));
        assert!(report.deleted_files.contains(&"blog/drafts/.keep".to_string()));
        assert!(!dir.path().join("blog").exists());
        assert!(dir.path().join(".git/config").exists());

        // Placeholders stay out of normal listings
        let entries = provider.backend().list_tree().await.unwrap();
        assert!(entries.iter().all(|e| !e.path.contains(".git")));
    }

    #[tokio::test]
    async fn test_non_utf8_file_is_skipped() {
        let (dir, provider) = setup();
        std::fs::write(dir.path().join("blog/latin1.md"), b"---\ntitle: Caf\xe9\n---\n").unwrap();
        let cancel = CancellationToken::new();

        let items = provider.get_all_items(&cancel).await.unwrap();
        let paths: Vec<_> = items.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["blog/a.md", "blog/drafts/b.md"]);
        assert!(provider
            .get_item_by_path("blog/latin1.md", &cancel)
            .await
            .unwrap()
            .is_none());

        let err = provider.backend().read_file("blog/latin1.md").await.unwrap_err();
        assert!(err.is_decode());

        // Unconditional deletes still work on undecodable files
        provider.backend().delete_file("blog/latin1.md", "rm", None).await.unwrap();
        assert!(!dir.path().join("blog/latin1.md").exists());
    }

    #[tokio::test]
    async fn test_create_directory_writes_metadata_file() {
        let (dir, provider) = setup();
        let cancel = CancellationToken::new();
        provider
            .create_directory("guides/setup", Some("---\ntitle: Setup\n---\n"), "mkdir", &cancel)
            .await
            .unwrap();
        assert!(dir.path().join("guides/setup/_index.md").exists());

        let setup = provider
            .get_directory_by_path("guides/setup", &cancel)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(setup.title, "Setup");
    }

    #[tokio::test]
    async fn test_watch_starts() {
        let (_dir, provider) = setup();
        let _watcher = provider.watch().unwrap();
    }

    #[tokio::test]
    async fn test_missing_root_is_unavailable() {
        let provider = FileSystemProvider::new(
            FileSystemBackend::new("/nonexistent/contenthub-root"),
            "fs",
            "Files",
            ContentOptions::default(),
            ContentCache::shared(CacheConfig::default()),
        );
        let err = provider
            .get_all_items(&CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
    }
}
