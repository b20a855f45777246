//! GitHub repository backend (REST trees and contents API)

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{RemoteFile, RepositoryBackend, RepositoryProvider, WriteReceipt};
use crate::cache::ContentCache;
use crate::config::{ContentOptions, GitHubConfig};
use crate::content::ListingEntry;
use crate::error::{ContentError, Result};
use crate::helpers;

pub type GitHubProvider = RepositoryProvider<GitHubBackend>;

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Debug, Serialize)]
struct Committer<'a> {
    name: &'a str,
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct PutRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    committer: Option<Committer<'a>>,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    message: &'a str,
    sha: &'a str,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    committer: Option<Committer<'a>>,
}

#[derive(Debug, Deserialize)]
struct CommitResult {
    content: Option<CommitContent>,
    commit: CommitRef,
}

#[derive(Debug, Deserialize)]
struct CommitContent {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct CommitRef {
    sha: String,
}

/// Files in one directory of one branch of a GitHub repository
///
/// Tokens are Git blob SHAs. Directories only exist while they contain files, so empty
/// directories never appear in listings.
#[derive(Debug, Clone)]
pub struct GitHubBackend {
    client: Client,
    config: GitHubConfig,
    token: Option<String>,
}

impl GitHubBackend {
    pub fn new(config: GitHubConfig) -> Result<Self> {
        if config.owner.trim().is_empty() || config.repository.trim().is_empty() {
            return Err(ContentError::validation(
                "github owner and repository must be set",
            ));
        }
        let token = config.resolve_token();
        if token.is_none() {
            tracing::warn!(
                "No GitHub token configured; only public repositories can be read and writes will fail"
            );
        }
        let client = Client::builder()
            .user_agent(concat!("contenthub/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            config,
            token,
        })
    }

    fn content_root(&self) -> String {
        helpers::normalize_path(&self.config.content_path)
    }

    /// Repository path of a content-relative path
    fn repo_path(&self, path: &str) -> String {
        helpers::join_path(&self.content_root(), path)
    }

    fn url(&self, tail: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.owner,
            self.config.repository,
            tail
        )
    }

    fn contents_url(&self, path: &str) -> String {
        self.url(&format!("contents/{}", helpers::encode_path(&self.repo_path(path))))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn committer(&self) -> Option<Committer<'_>> {
        match (&self.config.committer_name, &self.config.committer_email) {
            (Some(name), Some(email)) => Some(Committer { name, email }),
            _ => None,
        }
    }

    async fn send(&self, builder: RequestBuilder, path: &str) -> Result<Response> {
        let response = builder.send().await.map_err(|e| {
            ContentError::unavailable(format!("request to GitHub failed: {}", e))
        })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!("GitHub returned {} for {}: {}", status, path, body);
        Err(status_error(status, path, &body))
    }

    async fn current_sha(&self, path: &str) -> Result<String> {
        Ok(self.read_file(path).await?.token)
    }
}

/// Map a GitHub error status onto the error taxonomy
fn status_error(status: StatusCode, path: &str, body: &str) -> ContentError {
    match status {
        StatusCode::NOT_FOUND => ContentError::not_found("file", path),
        // 409: sha mismatch; 422: sha missing for an existing file
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            ContentError::conflict(path, "<supplied>", None)
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ContentError::unavailable(format!("GitHub rejected the credentials ({})", status))
        }
        _ => ContentError::unavailable(format!(
            "GitHub returned {}: {}",
            status,
            body.chars().take(200).collect::<String>()
        )),
    }
}

fn decode_content(encoding: &str, content: &str) -> Result<String> {
    match encoding {
        "base64" => {}
        // Files over 1 MB come back without a body
        "none" => {
            return Err(ContentError::Decode(
                "file is too large for the contents API".to_string(),
            ))
        }
        _ => return Ok(content.to_string()),
    }
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| ContentError::Decode(format!("invalid base64 content: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| ContentError::Decode(format!("content is not UTF-8: {}", e)))
}

/// Blobs and trees below `root`, with paths made relative to it
///
/// A truncated listing is refused rather than returned partially.
fn tree_entries(tree: TreeResponse, root: &str) -> Result<Vec<ListingEntry>> {
    if tree.truncated {
        return Err(ContentError::unavailable("GitHub truncated the tree listing"));
    }
    let prefix = format!("{}/", root);
    let entries = tree
        .tree
        .into_iter()
        .filter_map(|entry| {
            let relative = if root.is_empty() {
                entry.path
            } else {
                entry.path.strip_prefix(&prefix)?.to_string()
            };
            match entry.kind.as_str() {
                "blob" => Some(ListingEntry::file(relative, Some(entry.sha))),
                "tree" => Some(ListingEntry::directory(relative)),
                _ => None,
            }
        })
        .collect();
    Ok(entries)
}

impl ContentsResponse {
    fn into_remote_file(self, path: &str) -> Result<RemoteFile> {
        Ok(RemoteFile {
            path: helpers::normalize_path(path),
            content: decode_content(&self.encoding, &self.content)?,
            token: self.sha,
            modified: None,
        })
    }
}

impl From<CommitResult> for WriteReceipt {
    fn from(result: CommitResult) -> Self {
        WriteReceipt {
            token: result.content.map(|c| c.sha),
            commit_id: result.commit.sha,
        }
    }
}

#[async_trait]
impl RepositoryBackend for GitHubBackend {
    fn describe(&self) -> String {
        format!(
            "github {}/{}@{}:{}",
            self.config.owner,
            self.config.repository,
            self.config.branch,
            self.content_root()
        )
    }

    async fn list_tree(&self) -> Result<Vec<ListingEntry>> {
        let url = self.url(&format!(
            "git/trees/{}?recursive=1",
            helpers::encode_path(&self.config.branch)
        ));
        let response = self.send(self.request(Method::GET, &url), "").await?;
        let tree: TreeResponse = response.json().await?;
        let entries = tree_entries(tree, &self.content_root())?;
        tracing::debug!("Listed {} entries from {}", entries.len(), self.describe());
        Ok(entries)
    }

    async fn read_file(&self, path: &str) -> Result<RemoteFile> {
        let url = self.contents_url(path);
        let request = self
            .request(Method::GET, &url)
            .query(&[("ref", self.config.branch.as_str())]);
        let response = self.send(request, path).await?;
        let contents: ContentsResponse = response.json().await?;
        contents.into_remote_file(path)
    }

    async fn put_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
        expected: Option<&str>,
    ) -> Result<WriteReceipt> {
        let body = PutRequest {
            message,
            content: STANDARD.encode(content),
            branch: &self.config.branch,
            sha: expected,
            committer: self.committer(),
        };
        let request = self.request(Method::PUT, &self.contents_url(path)).json(&body);
        let result: CommitResult = self.send(request, path).await?.json().await?;
        tracing::debug!("Committed {} as {}", path, result.commit.sha);
        Ok(result.into())
    }

    async fn delete_file(
        &self,
        path: &str,
        message: &str,
        expected: Option<&str>,
    ) -> Result<WriteReceipt> {
        let sha = match expected {
            Some(sha) => sha.to_string(),
            None => self.current_sha(path).await?,
        };
        let body = DeleteRequest {
            message,
            sha: &sha,
            branch: &self.config.branch,
            committer: self.committer(),
        };
        let request = self.request(Method::DELETE, &self.contents_url(path)).json(&body);
        let result: CommitResult = self.send(request, path).await?.json().await?;
        Ok(WriteReceipt {
            token: None,
            ..result.into()
        })
    }
}

impl RepositoryProvider<GitHubBackend> {
    pub fn from_config(
        config: &GitHubConfig,
        options: ContentOptions,
        cache: Arc<ContentCache>,
    ) -> Result<Self> {
        let backend = GitHubBackend::new(config.clone())?;
        Ok(RepositoryProvider::new(
            backend,
            &config.provider_id,
            &config.display_name,
            options,
            cache,
        )
        .read_only(config.read_only))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn backend() -> GitHubBackend {
        GitHubBackend::new(GitHubConfig {
            owner: "acme".to_string(),
            repository: "site".to_string(),
            content_path: "/content/".to_string(),
            token: Some("t".to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_urls() {
        let backend = backend();
        assert_eq!(
            backend.contents_url("blog/hello world.md"),
            "https://api.github.com/repos/acme/site/contents/content/blog/hello%20world.md"
        );
        assert_eq!(backend.describe(), "github acme/site@main:content");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_error(StatusCode::NOT_FOUND, "a.md", "").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            status_error(StatusCode::CONFLICT, "a.md", "").kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            status_error(StatusCode::UNPROCESSABLE_ENTITY, "a.md", "").kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            status_error(StatusCode::UNAUTHORIZED, "a.md", "").kind(),
            ErrorKind::ProviderUnavailable
        );
        assert_eq!(
            status_error(StatusCode::BAD_GATEWAY, "a.md", "").kind(),
            ErrorKind::ProviderUnavailable
        );
    }

    #[test]
    fn test_decode_content() {
        let encoded = "LS0tCnRpdGxlOiBI\nZWxsbwotLS0K\n";
        assert_eq!(
            decode_content("base64", encoded).unwrap(),
            "---\ntitle: Hello\n---\n"
        );
        assert!(decode_content("base64", "!!!").is_err());
        assert_eq!(decode_content("utf-8", "plain").unwrap(), "plain");
        assert!(decode_content("none", "").unwrap_err().is_decode());
    }

    #[test]
    fn test_tree_entries_relative_to_content_path() {
        let payload = r#"{
            "sha": "9fb037999f264ba9a7fc6274d15fa3ae2ab98312",
            "url": "https://api.github.com/repos/acme/site/trees/9fb0379",
            "tree": [
                {"path": "README.md", "mode": "100644", "type": "blob", "sha": "a1", "size": 30},
                {"path": "content", "mode": "040000", "type": "tree", "sha": "t1"},
                {"path": "content/blog", "mode": "040000", "type": "tree", "sha": "t2"},
                {"path": "content/blog/a.md", "mode": "100644", "type": "blob", "sha": "b1", "size": 12},
                {"path": "content/vendor", "mode": "160000", "type": "commit", "sha": "c1"},
                {"path": "contents.md", "mode": "100644", "type": "blob", "sha": "x1", "size": 3}
            ],
            "truncated": false
        }"#;
        let tree: TreeResponse = serde_json::from_str(payload).unwrap();
        assert!(!tree.truncated);

        let entries = tree_entries(tree, "content").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], ListingEntry::directory("blog"));
        assert_eq!(entries[1], ListingEntry::file("blog/a.md", Some("b1".to_string())));

        let tree: TreeResponse = serde_json::from_str(payload).unwrap();
        assert_eq!(tree_entries(tree, "").unwrap().len(), 5);

        let truncated: TreeResponse =
            serde_json::from_str(&payload.replace("\"truncated\": false", "\"truncated\": true"))
                .unwrap();
        let err = tree_entries(truncated, "content").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
    }

    #[test]
    fn test_contents_response_into_file() {
        let payload = r#"{
            "type": "file",
            "encoding": "base64",
            "size": 21,
            "name": "a.md",
            "path": "content/blog/a.md",
            "content": "LS0tCnRpdGxlOiBI\nZWxsbwotLS0K\n",
            "sha": "3d21ec53a331a6f037a91c368710b99387d012c1"
        }"#;
        let contents: ContentsResponse = serde_json::from_str(payload).unwrap();
        let file = contents.into_remote_file("/blog/a.md").unwrap();
        assert_eq!(file.path, "blog/a.md");
        assert_eq!(file.content, "---\ntitle: Hello\n---\n");
        assert_eq!(file.token, "3d21ec53a331a6f037a91c368710b99387d012c1");

        let large = r#"{"type": "file", "encoding": "none", "content": "", "sha": "f0"}"#;
        let contents: ContentsResponse = serde_json::from_str(large).unwrap();
        assert!(contents.into_remote_file("big.md").unwrap_err().is_decode());
    }

    #[test]
    fn test_commit_result_into_receipt() {
        let put = r#"{
            "content": {"name": "a.md", "path": "content/blog/a.md", "sha": "95b966ae1c166bd92f8ae7d1c313e738c731dfc3"},
            "commit": {"sha": "7638417db6d59f3c431d3e1f261cc637155684cd", "message": "edit"}
        }"#;
        let receipt: WriteReceipt = serde_json::from_str::<CommitResult>(put).unwrap().into();
        assert_eq!(
            receipt.token.as_deref(),
            Some("95b966ae1c166bd92f8ae7d1c313e738c731dfc3")
        );
        assert_eq!(receipt.commit_id, "7638417db6d59f3c431d3e1f261cc637155684cd");

        let delete = r#"{"content": null, "commit": {"sha": "c0ffee"}}"#;
        let receipt: WriteReceipt = serde_json::from_str::<CommitResult>(delete).unwrap().into();
        assert_eq!(receipt.token, None);
        assert_eq!(receipt.commit_id, "c0ffee");
    }

    #[test]
    fn test_requires_repository() {
        let err = GitHubBackend::new(GitHubConfig::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    }
}
