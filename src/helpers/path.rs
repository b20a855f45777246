//! Path, locale, glob and slug helpers

use glob::{MatchOptions, Pattern};
use lazy_static::lazy_static;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use regex::Regex;

lazy_static! {
    /// `en`, `fr`, `pt-BR`, `zh-Hant`
    static ref LOCALE_SEGMENT: Regex = Regex::new(r"^[a-z]{2,3}(-[A-Za-z]{2,4})?$").unwrap();
}

/// Characters escaped in a single URL path segment
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/');

/// Normalize a backend path
///
/// Backslashes become slashes, empty and `.` segments are dropped, `..` pops the
/// previous segment, and leading/trailing slashes are removed.
///
/// # Examples
/// ```ignore
/// normalize_path("/blog//./posts/") // -> "blog/posts"
/// ```
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment.trim() {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// Join two paths and normalize the result
pub fn join_path(base: &str, path: &str) -> String {
    normalize_path(&format!("{}/{}", base, path))
}

/// Parent directory of a normalized path; `""` for top-level entries, `None` for the root
pub fn parent_path(path: &str) -> Option<String> {
    let path = normalize_path(path);
    if path.is_empty() {
        return None;
    }
    Some(match path.rfind('/') {
        Some(pos) => path[..pos].to_string(),
        None => String::new(),
    })
}

/// Last segment of a path
pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches(['/', '\\']);
    trimmed
        .rfind(['/', '\\'])
        .map(|pos| &trimmed[pos + 1..])
        .unwrap_or(trimmed)
}

/// Last segment without its extension
pub fn file_stem(path: &str) -> &str {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(pos) => &name[..pos],
    }
}

/// Number of segments in a path (`""` has depth 0)
pub fn path_depth(path: &str) -> usize {
    let path = normalize_path(path);
    if path.is_empty() {
        0
    } else {
        path.split('/').count()
    }
}

/// Whether `path` lies inside directory `dir` (case-insensitive, never the dir itself)
pub fn is_under(path: &str, dir: &str) -> bool {
    let path = normalize_path(path).to_lowercase();
    let dir = normalize_path(dir).to_lowercase();
    if dir.is_empty() {
        return !path.is_empty();
    }
    path.len() > dir.len() && path.starts_with(&dir) && path.as_bytes()[dir.len()] == b'/'
}

/// Case-insensitive comparison of two paths after normalization
pub fn same_path(a: &str, b: &str) -> bool {
    normalize_path(a).eq_ignore_ascii_case(&normalize_path(b))
}

/// Whether `segment` looks like a locale code and, when `supported` is not empty,
/// is one of the supported codes
pub fn is_locale_segment(segment: &str, supported: &[String]) -> bool {
    if !LOCALE_SEGMENT.is_match(segment) {
        return false;
    }
    supported.is_empty() || supported.iter().any(|s| s.eq_ignore_ascii_case(segment))
}

/// Locale taken from the first path segment, if it is one
///
/// # Examples
/// ```ignore
/// extract_locale("fr/blog/post.md", &[]) // -> Some("fr")
/// extract_locale("blog/post.md", &[])    // -> None
/// ```
pub fn extract_locale(path: &str, supported: &[String]) -> Option<String> {
    let path = normalize_path(path);
    let first = path.split('/').next()?;
    // A lone file name is never a locale directory
    if !path.contains('/') {
        return None;
    }
    if is_locale_segment(first, supported) {
        Some(first.to_string())
    } else {
        None
    }
}

/// Remove a leading locale segment from a path
pub fn strip_locale(path: &str, supported: &[String]) -> String {
    let path = normalize_path(path);
    match extract_locale(&path, supported) {
        Some(locale) => path[locale.len()..].trim_start_matches('/').to_string(),
        None => path,
    }
}

/// Whether `path` matches any glob in `patterns`
///
/// Invalid patterns never match; configuration validation reports them.
pub fn matches_any(path: &str, patterns: &[String]) -> bool {
    let path = normalize_path(path);
    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };
    patterns.iter().any(|p| {
        Pattern::new(p)
            .map(|pattern| pattern.matches_with(&path, options))
            .unwrap_or(false)
    })
}

/// URL slug for a single name
pub fn slugify(name: &str) -> String {
    slug::slugify(name)
}

/// Derive a URL path from a content path
///
/// Every segment is slugified, the extension is dropped, and `index` files map to
/// their directory.
///
/// # Examples
/// ```ignore
/// url_from_path("Blog Posts/Hello World.md") // -> "blog-posts/hello-world"
/// url_from_path("docs/index.md")             // -> "docs"
/// ```
pub fn url_from_path(path: &str) -> String {
    let path = normalize_path(path);
    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if let Some(last) = segments.pop() {
        let stem = file_stem(last);
        if !stem.eq_ignore_ascii_case("index") && !stem.eq_ignore_ascii_case("_index") {
            segments.push(stem);
        }
    }
    segments
        .into_iter()
        .map(slug::slugify)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Normalize a URL for comparison (no slashes at either end, lowercase)
pub fn normalize_url(url: &str) -> String {
    url.trim().trim_matches('/').to_lowercase()
}

/// BLAKE3 digest of file content, identical across builds and platforms
pub fn hash_content(content: &[u8]) -> blake3::Hash {
    blake3::hash(content)
}

/// Content hash rendered as a concurrency token
pub fn content_token(content: &str) -> String {
    hash_content(content.as_bytes()).to_hex().to_string()
}

/// Deterministic identifier for a path, stable across refreshes
pub fn stable_id(path: &str) -> String {
    let digest = hash_content(normalize_path(path).to_lowercase().as_bytes());
    digest.to_hex().as_str()[..16].to_string()
}

/// Percent-encode every segment of a path for use in a URL
pub fn encode_path(path: &str) -> String {
    normalize_path(path)
        .split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}
