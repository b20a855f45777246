//! Content configuration (content.yml)

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::content::KnownField;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ContentConfig {
    pub cache: CacheConfig,
    pub content: ContentOptions,
    pub filesystem: Option<FileSystemConfig>,
    pub github: Option<GitHubConfig>,
}

impl ContentConfig {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: ContentConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        tracing::debug!("Loaded configuration from {:?}", path.as_ref());
        Ok(config)
    }

    /// Reject settings that would make providers misbehave at runtime
    pub fn validate(&self) -> Result<()> {
        if self.cache.set_size_limit && self.cache.size_limit == 0 {
            bail!("cache.size_limit must be greater than zero when set_size_limit is enabled");
        }
        if self.content.allowed_extensions.is_empty() {
            bail!("content.allowed_extensions must list at least one extension");
        }
        for pattern in &self.content.exclude {
            if let Err(e) = glob::Pattern::new(pattern) {
                bail!("Invalid exclude pattern '{}': {}", pattern, e);
            }
        }
        if let Some(github) = &self.github {
            if github.owner.is_empty() || github.repository.is_empty() {
                bail!("github.owner and github.repository are required");
            }
        }
        Ok(())
    }
}

/// Cache settings shared by every provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub default_duration_minutes: u64,
    /// Count every entry as size 1 and cap the store at `size_limit`
    pub set_size_limit: bool,
    pub size_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_duration_minutes: 30,
            set_size_limit: false,
            size_limit: 1024,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_duration_minutes.saturating_mul(60))
    }
}

/// How content files are recognized and interpreted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentOptions {
    pub allowed_extensions: Vec<String>,
    pub required_fields: Vec<KnownField>,
    /// Per-directory metadata file name
    pub metadata_file: String,
    /// Glob patterns (relative to the content root) that are never loaded
    pub exclude: Vec<String>,
    pub include_empty_directories: bool,
    pub default_locale: String,
    pub enable_localization: bool,
    /// Locale codes recognized as a leading path segment; empty accepts any code
    pub supported_locales: Vec<String>,
    /// Maximum concurrent backend reads while loading
    pub load_concurrency: usize,
}

impl Default for ContentOptions {
    fn default() -> Self {
        Self {
            allowed_extensions: vec![".md".to_string(), ".markdown".to_string()],
            required_fields: Vec::new(),
            metadata_file: "_index.md".to_string(),
            exclude: Vec::new(),
            include_empty_directories: true,
            default_locale: "en".to_string(),
            enable_localization: false,
            supported_locales: Vec::new(),
            load_concurrency: 8,
        }
    }
}

impl ContentOptions {
    /// Whether `path` ends with one of the allowed extensions
    pub fn is_allowed_extension(&self, path: &str) -> bool {
        let lower = path.to_lowercase();
        self.allowed_extensions.iter().any(|ext| {
            let ext = ext.to_lowercase();
            let ext = if ext.starts_with('.') {
                ext
            } else {
                format!(".{}", ext)
            };
            lower.ends_with(&ext)
        })
    }

    /// Whether `path` names a directory metadata file
    pub fn is_metadata_file(&self, path: &str) -> bool {
        crate::helpers::file_name(path).eq_ignore_ascii_case(&self.metadata_file)
    }

    /// Whether `path` matches one of the exclude globs
    pub fn is_excluded(&self, path: &str) -> bool {
        crate::helpers::matches_any(path, &self.exclude)
    }
}

/// Local filesystem provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSystemConfig {
    pub provider_id: String,
    pub display_name: String,
    pub root: PathBuf,
    pub read_only: bool,
    /// Invalidate the cache when files under `root` change
    pub watch: bool,
}

impl Default for FileSystemConfig {
    fn default() -> Self {
        Self {
            provider_id: "filesystem".to_string(),
            display_name: "Local Files".to_string(),
            root: PathBuf::from("content"),
            read_only: false,
            watch: false,
        }
    }
}

/// GitHub repository provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub provider_id: String,
    pub display_name: String,
    pub owner: String,
    pub repository: String,
    pub branch: String,
    /// Directory inside the repository holding content
    pub content_path: String,
    pub api_url: String,
    pub token: Option<String>,
    /// Environment variable consulted when `token` is unset
    pub token_env: String,
    pub committer_name: Option<String>,
    pub committer_email: Option<String>,
    pub read_only: bool,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            provider_id: "github".to_string(),
            display_name: "GitHub".to_string(),
            owner: String::new(),
            repository: String::new(),
            branch: "main".to_string(),
            content_path: "content".to_string(),
            api_url: "https://api.github.com".to_string(),
            token: None,
            token_env: "GITHUB_TOKEN".to_string(),
            committer_name: None,
            committer_email: None,
            read_only: false,
        }
    }
}

impl GitHubConfig {
    /// The configured token, falling back to the environment
    pub fn resolve_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var(&self.token_env).ok())
            .filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ContentConfig::default();
        assert!(config.cache.enabled);
        assert_eq!(config.cache.default_duration_minutes, 30);
        assert_eq!(config.content.metadata_file, "_index.md");
        assert!(config.filesystem.is_none());
    }

    #[test]
    fn test_parse_config() {
        let yaml = r#"
cache:
  enabled: false
  default_duration_minutes: 5
content:
  required_fields: [title, author]
  exclude: ["drafts/**"]
  enable_localization: true
filesystem:
  root: ./site/content
  read_only: true
github:
  owner: acme
  repository: docs
"#;
        let config: ContentConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.default_ttl(), Duration::from_secs(300));
        assert_eq!(
            config.content.required_fields,
            vec![KnownField::Title, KnownField::Author]
        );
        assert!(config.content.enable_localization);
        let fs = config.filesystem.as_ref().unwrap();
        assert_eq!(fs.provider_id, "filesystem");
        assert!(fs.read_only);
        let gh = config.github.as_ref().unwrap();
        assert_eq!(gh.branch, "main");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_glob() {
        let mut config = ContentConfig::default();
        config.content.exclude.push("[".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_extension_and_exclude_checks() {
        let mut options = ContentOptions::default();
        options.exclude.push("drafts/**".to_string());
        assert!(options.is_allowed_extension("blog/a.MD"));
        assert!(!options.is_allowed_extension("blog/a.txt"));
        assert!(options.is_metadata_file("blog/_index.md"));
        assert!(options.is_excluded("drafts/wip.md"));
        assert!(!options.is_excluded("blog/wip.md"));
    }
}
