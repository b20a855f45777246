//! contenthub: content providers, caching and directory trees for front-matter sites
//!
//! Content lives as markdown files with front matter, either in a GitHub repository or
//! in a local directory. A [`ContentProvider`](provider::ContentProvider) reads it into
//! [`ContentItem`](content::ContentItem)s and a [`DirectoryTree`](content::DirectoryTree),
//! answers [`ContentQuery`](content::ContentQuery)s, and performs writes guarded by
//! concurrency tokens. [`CachingProvider`](provider::CachingProvider) serves repeated
//! reads from a shared [`ContentCache`](cache::ContentCache).

pub mod cache;
pub mod commands;
pub mod config;
pub mod content;
pub mod error;
pub mod helpers;
pub mod provider;

pub use error::{ContentError, ErrorKind, Result};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cache::ContentCache;
use provider::{CachingProvider, ContentProvider, FileSystemProvider, FileWatcher, GitHubProvider};

/// Name of the configuration file looked up in the base directory
pub const CONFIG_FILE: &str = "content.yml";

/// The configured provider stack for one content directory
#[derive(Clone)]
pub struct ContentHub {
    /// Loaded configuration
    pub config: config::ContentConfig,
    /// Base directory
    pub base_dir: PathBuf,
    /// Cache shared by the provider and its decorator
    pub cache: Arc<ContentCache>,
    /// Provider behind the caching decorator
    pub provider: Arc<dyn ContentProvider>,
    watcher: Option<Arc<FileWatcher>>,
}

impl ContentHub {
    /// Create a hub from a directory, reading `content.yml` when present
    pub fn new<P: AsRef<Path>>(base_dir: P) -> anyhow::Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let config_path = base_dir.join(CONFIG_FILE);

        let config = if config_path.exists() {
            config::ContentConfig::load(&config_path)?
        } else {
            config::ContentConfig::default()
        };
        Self::from_config(base_dir, config)
    }

    /// Build the provider stack described by `config`
    ///
    /// A `github` section selects the repository provider; otherwise content is read
    /// from the local `filesystem.root` (relative to `base_dir`).
    pub fn from_config(base_dir: PathBuf, config: config::ContentConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let cache = ContentCache::shared(config.cache.clone());
        let mut watcher = None;

        let inner: Arc<dyn ContentProvider> = match &config.github {
            Some(github) => {
                tracing::debug!("Using GitHub provider for {}/{}", github.owner, github.repository);
                Arc::new(GitHubProvider::from_config(
                    github,
                    config.content.clone(),
                    cache.clone(),
                )?)
            }
            None => {
                let mut fs_config = config.filesystem.clone().unwrap_or_default();
                if fs_config.root.is_relative() {
                    fs_config.root = base_dir.join(&fs_config.root);
                }
                tracing::debug!("Using filesystem provider at {:?}", fs_config.root);
                let provider =
                    FileSystemProvider::from_config(&fs_config, config.content.clone(), cache.clone());
                if fs_config.watch {
                    watcher = Some(Arc::new(provider.watch()?));
                }
                Arc::new(provider)
            }
        };

        let provider: Arc<dyn ContentProvider> =
            Arc::new(CachingProvider::new(inner, cache.clone()));

        Ok(Self {
            config,
            base_dir,
            cache,
            provider,
            watcher,
        })
    }

    /// Whether the content root is being watched for changes
    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }
}
