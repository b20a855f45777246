//! In-process repository backend

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::{RemoteFile, RepositoryBackend, RepositoryProvider, WriteReceipt};
use crate::content::ListingEntry;
use crate::error::{ContentError, Result};
use crate::helpers;

pub type MemoryProvider = RepositoryProvider<MemoryRepository>;

#[derive(Debug, Default)]
struct State {
    files: BTreeMap<String, String>,
    commits: u64,
    available: bool,
    /// Deletions allowed before every further one fails
    delete_budget: Option<usize>,
}

/// A repository held in memory with Git-like write semantics
///
/// Cloning shares the same store. Directories exist only through the files under them.
#[derive(Debug, Clone)]
pub struct MemoryRepository {
    state: Arc<Mutex<State>>,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                available: true,
                ..Default::default()
            })),
        }
    }

    /// Seed a file without recording a commit
    pub fn insert(&self, path: &str, content: &str) {
        self.state
            .lock()
            .files
            .insert(helpers::normalize_path(path), content.to_string());
    }

    pub fn contains(&self, path: &str) -> bool {
        self.state
            .lock()
            .files
            .contains_key(&helpers::normalize_path(path))
    }

    pub fn content(&self, path: &str) -> Option<String> {
        self.state
            .lock()
            .files
            .get(&helpers::normalize_path(path))
            .cloned()
    }

    /// Make every call fail with `ProviderUnavailable` until switched back on
    pub fn set_available(&self, available: bool) {
        self.state.lock().available = available;
    }

    /// Number of commits made through the backend
    pub fn write_count(&self) -> u64 {
        self.state.lock().commits
    }

    /// Let `count` deletions succeed, then fail the rest
    pub fn fail_deletes_after(&self, count: usize) {
        self.state.lock().delete_budget = Some(count);
    }

    fn ensure_available(state: &State) -> Result<()> {
        if state.available {
            Ok(())
        } else {
            Err(ContentError::unavailable("memory repository is offline"))
        }
    }

    fn commit(state: &mut State, message: &str) -> String {
        state.commits += 1;
        tracing::debug!("memory commit {}: {}", state.commits, message);
        format!("commit-{}", state.commits)
    }
}

#[async_trait]
impl RepositoryBackend for MemoryRepository {
    fn describe(&self) -> String {
        "memory repository".to_string()
    }

    async fn list_tree(&self) -> Result<Vec<ListingEntry>> {
        let state = self.state.lock();
        Self::ensure_available(&state)?;

        let mut directories = BTreeSet::new();
        let mut entries = Vec::with_capacity(state.files.len());
        for (path, content) in &state.files {
            let mut parent = helpers::parent_path(path);
            while let Some(dir) = parent.filter(|d| !d.is_empty()) {
                parent = helpers::parent_path(&dir);
                directories.insert(dir);
            }
            entries.push(ListingEntry::file(
                path.clone(),
                Some(helpers::content_token(content)),
            ));
        }
        entries.extend(directories.into_iter().map(ListingEntry::directory));
        Ok(entries)
    }

    async fn read_file(&self, path: &str) -> Result<RemoteFile> {
        let state = self.state.lock();
        Self::ensure_available(&state)?;
        let content = state
            .files
            .get(path)
            .ok_or_else(|| ContentError::not_found("file", path))?;
        Ok(RemoteFile {
            path: path.to_string(),
            token: helpers::content_token(content),
            content: content.clone(),
            modified: None,
        })
    }

    async fn put_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
        expected: Option<&str>,
    ) -> Result<WriteReceipt> {
        let mut state = self.state.lock();
        Self::ensure_available(&state)?;

        let current = state.files.get(path).map(|c| helpers::content_token(c));
        match (expected, current) {
            (None, Some(actual)) => {
                return Err(ContentError::conflict(path, "<new file>", Some(actual)))
            }
            (Some(_), None) => return Err(ContentError::not_found("file", path)),
            (Some(expected), Some(actual)) if expected != actual => {
                return Err(ContentError::conflict(path, expected, Some(actual)))
            }
            _ => {}
        }

        state.files.insert(path.to_string(), content.to_string());
        let commit_id = Self::commit(&mut state, message);
        Ok(WriteReceipt {
            token: Some(helpers::content_token(content)),
            commit_id,
        })
    }

    async fn delete_file(
        &self,
        path: &str,
        message: &str,
        expected: Option<&str>,
    ) -> Result<WriteReceipt> {
        let mut state = self.state.lock();
        Self::ensure_available(&state)?;

        if let Some(budget) = state.delete_budget.as_mut() {
            if *budget == 0 {
                return Err(ContentError::unavailable(format!("cannot delete {}", path)));
            }
            *budget -= 1;
        }

        let actual = state
            .files
            .get(path)
            .map(|c| helpers::content_token(c))
            .ok_or_else(|| ContentError::not_found("file", path))?;
        if let Some(expected) = expected {
            if expected != actual {
                return Err(ContentError::conflict(path, expected, Some(actual)));
            }
        }

        state.files.remove(path);
        let commit_id = Self::commit(&mut state, message);
        Ok(WriteReceipt {
            token: None,
            commit_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::EntryKind;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_listing_synthesizes_directories() {
        let repo = MemoryRepository::new();
        repo.insert("blog/2024/a.md", "a");
        repo.insert("top.md", "t");

        let entries = repo.list_tree().await.unwrap();
        let dirs: Vec<_> = entries
            .iter()
            .filter(|e| e.kind == EntryKind::Directory)
            .map(|e| e.path.as_str())
            .collect();
        assert_eq!(dirs, vec!["blog", "blog/2024"]);
        assert!(entries.iter().all(|e| e.is_file() == e.token.is_some()));
    }

    #[tokio::test]
    async fn test_git_like_writes() {
        let repo = MemoryRepository::new();
        let created = repo.put_file("a.md", "one", "create", None).await.unwrap();
        let token = created.token.unwrap();

        let err = repo.put_file("a.md", "two", "create", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err = repo.put_file("a.md", "two", "edit", Some("stale")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err = repo.put_file("b.md", "two", "edit", Some(&token)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let updated = repo.put_file("a.md", "two", "edit", Some(&token)).await.unwrap();
        assert_ne!(updated.token.as_deref(), Some(token.as_str()));
        assert_eq!(repo.content("a.md").as_deref(), Some("two"));
        assert_eq!(repo.write_count(), 2);
    }

    #[tokio::test]
    async fn test_offline() {
        let repo = MemoryRepository::new();
        repo.insert("a.md", "a");
        repo.set_available(false);
        let err = repo.read_file("a.md").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
        repo.set_available(true);
        assert_eq!(repo.read_file("a.md").await.unwrap().content, "a");
    }
}
