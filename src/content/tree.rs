//! Directory tree assembly from flat backend listings

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::{DirectoryItem, FrontMatter};
use crate::config::ContentOptions;
use crate::helpers;

/// Kind of a listing entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry of a recursive backend listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingEntry {
    /// Path relative to the content root
    pub path: String,
    pub kind: EntryKind,
    /// Concurrency token, when the backend reports one in listings
    pub token: Option<String>,
}

impl ListingEntry {
    pub fn file(path: impl Into<String>, token: Option<String>) -> Self {
        Self {
            path: helpers::normalize_path(&path.into()),
            kind: EntryKind::File,
            token,
        }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: helpers::normalize_path(&path.into()),
            kind: EntryKind::Directory,
            token: None,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Owning container for the top-level directories of one provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectoryTree {
    roots: Vec<DirectoryItem>,
}

impl DirectoryTree {
    pub fn new(roots: Vec<DirectoryItem>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[DirectoryItem] {
        &self.roots
    }

    /// Every directory, depth-first, parents before children
    pub fn iter(&self) -> impl Iterator<Item = &DirectoryItem> {
        self.roots.iter().flat_map(|root| root.descendants())
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn find_by_path(&self, path: &str) -> Option<&DirectoryItem> {
        let path = helpers::normalize_path(path);
        find(&self.roots, &|d| d.path.eq_ignore_ascii_case(&path))
    }

    pub fn find_by_id(&self, id: &str) -> Option<&DirectoryItem> {
        find(&self.roots, &|d| d.id.eq_ignore_ascii_case(id.trim()))
    }

    pub fn find_by_url(&self, url: &str) -> Option<&DirectoryItem> {
        let url = helpers::normalize_url(url);
        find(&self.roots, &|d| d.url == url)
    }

    pub fn parent_of(&self, directory: &DirectoryItem) -> Option<&DirectoryItem> {
        directory
            .parent_id
            .as_deref()
            .and_then(|id| self.find_by_id(id))
    }

    /// Chain of directories from the top level down to (and including) `id`
    pub fn ancestors(&self, id: &str) -> Vec<&DirectoryItem> {
        let mut chain = Vec::new();
        let mut current = self.find_by_id(id);
        while let Some(dir) = current {
            chain.push(dir);
            current = self.parent_of(dir);
        }
        chain.reverse();
        chain
    }

    /// Directories keyed by id
    pub fn index(&self) -> HashMap<&str, &DirectoryItem> {
        self.iter().map(|d| (d.id.as_str(), d)).collect()
    }

    /// Top-level directories visible for `locale`
    ///
    /// A directory is kept when it has no locale or the requested one; children are
    /// filtered the same way.
    pub fn for_locale(&self, locale: Option<&str>) -> Vec<DirectoryItem> {
        match locale {
            None => self.roots.clone(),
            Some(locale) => filter_locale(&self.roots, locale),
        }
    }
}

fn find<'a>(
    nodes: &'a [DirectoryItem],
    predicate: &dyn Fn(&DirectoryItem) -> bool,
) -> Option<&'a DirectoryItem> {
    for node in nodes {
        if predicate(node) {
            return Some(node);
        }
        if let Some(found) = find(&node.children, predicate) {
            return Some(found);
        }
    }
    None
}

fn filter_locale(nodes: &[DirectoryItem], locale: &str) -> Vec<DirectoryItem> {
    nodes
        .iter()
        .filter(|d| {
            d.locale
                .as_deref()
                .map_or(true, |l| l.eq_ignore_ascii_case(locale))
        })
        .map(|d| {
            let mut d = d.clone();
            d.children = filter_locale(&d.children, locale);
            d
        })
        .collect()
}

/// Builds a [`DirectoryTree`] from a flat listing
///
/// Directories implied by file paths are synthesized, so backends that never list
/// directories (Git trees list blobs and trees, but never empty trees) still produce
/// a complete hierarchy. Whether a directory with no files, no subdirectories and no
/// metadata file is kept depends on `include_empty_directories`; such directories only
/// exist at all when the backend lists them.
pub struct TreeBuilder<'a> {
    provider_id: &'a str,
    options: &'a ContentOptions,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(provider_id: &'a str, options: &'a ContentOptions) -> Self {
        Self {
            provider_id,
            options,
        }
    }

    /// Metadata files present in `entries`, as (directory path, file path)
    pub fn metadata_files(&self, entries: &[ListingEntry]) -> Vec<(String, String)> {
        entries
            .iter()
            .filter(|e| e.is_file() && self.options.is_metadata_file(&e.path))
            .filter(|e| !self.options.is_excluded(&e.path))
            .filter_map(|e| helpers::parent_path(&e.path).map(|dir| (dir, e.path.clone())))
            .filter(|(dir, _)| !dir.is_empty())
            .collect()
    }

    /// Assemble the tree
    ///
    /// `metadata` maps a directory path to the front matter of its metadata file.
    pub fn build(
        &self,
        entries: &[ListingEntry],
        metadata: &HashMap<String, FrontMatter>,
    ) -> DirectoryTree {
        let mut directories: BTreeSet<String> = BTreeSet::new();
        let mut item_counts: HashMap<String, usize> = HashMap::new();

        for entry in entries {
            let path = helpers::normalize_path(&entry.path);
            if path.is_empty() || self.options.is_excluded(&path) {
                continue;
            }
            match entry.kind {
                EntryKind::Directory => {
                    self.add_with_ancestors(&mut directories, &path);
                }
                EntryKind::File => {
                    let Some(parent) = helpers::parent_path(&path) else {
                        continue;
                    };
                    if !parent.is_empty() {
                        self.add_with_ancestors(&mut directories, &parent);
                    }
                    if self.options.is_allowed_extension(&path)
                        && !self.options.is_metadata_file(&path)
                    {
                        *item_counts.entry(parent).or_default() += 1;
                    }
                }
            }
        }

        // Directories under an excluded directory are dropped with it
        directories.retain(|dir| {
            let mut current = Some(dir.clone());
            while let Some(path) = current {
                if path.is_empty() {
                    break;
                }
                if self.options.is_excluded(&path) {
                    return false;
                }
                current = helpers::parent_path(&path);
            }
            true
        });

        let mut children_of: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for dir in &directories {
            if let Some(parent) = helpers::parent_path(dir) {
                children_of.entry(parent).or_default().push(dir.clone());
            }
        }

        let metadata: HashMap<String, &FrontMatter> = metadata
            .iter()
            .map(|(path, fm)| (helpers::normalize_path(path).to_lowercase(), fm))
            .collect();

        let roots = self.build_children("", None, &children_of, &metadata, &item_counts);
        let tree = DirectoryTree::new(roots);
        tracing::debug!(
            "Built directory tree for '{}' with {} directories",
            self.provider_id,
            tree.len()
        );
        tree
    }

    fn add_with_ancestors(&self, directories: &mut BTreeSet<String>, path: &str) {
        let mut current = Some(path.to_string());
        while let Some(dir) = current {
            if dir.is_empty() || !directories.insert(dir.clone()) {
                break;
            }
            current = helpers::parent_path(&dir);
        }
    }

    fn build_children(
        &self,
        parent_path: &str,
        parent_id: Option<&str>,
        children_of: &BTreeMap<String, Vec<String>>,
        metadata: &HashMap<String, &FrontMatter>,
        item_counts: &HashMap<String, usize>,
    ) -> Vec<DirectoryItem> {
        let Some(paths) = children_of.get(parent_path) else {
            return Vec::new();
        };

        let mut children = Vec::with_capacity(paths.len());
        for path in paths {
            let mut node = DirectoryItem::new(self.provider_id, path);
            node.parent_id = parent_id.map(str::to_string);
            node.item_count = item_counts.get(path).copied().unwrap_or(0);
            node.locale = self.path_locale(path);
            if let Some(fm) = metadata.get(&path.to_lowercase()) {
                node.apply_front_matter(fm);
            }

            // Parent exists before its children are attached
            node.children =
                self.build_children(path, Some(&node.id), children_of, metadata, item_counts);

            if node.is_empty() && !self.options.include_empty_directories {
                tracing::debug!("Skipping empty directory {}", path);
                continue;
            }
            children.push(node);
        }

        children.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
        children
    }

    fn path_locale(&self, path: &str) -> Option<String> {
        if !self.options.enable_localization {
            return None;
        }
        let first = path.split('/').next()?;
        helpers::is_locale_segment(first, &self.options.supported_locales)
            .then(|| first.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> Vec<ListingEntry> {
        vec![
            ListingEntry::file("blog/a.md", None),
            ListingEntry::file("blog/b.md", None),
            ListingEntry::file("blog/_index.md", None),
            ListingEntry::file("blog/2024/jan/c.md", None),
            ListingEntry::file("docs/guide/intro.md", None),
            ListingEntry::file("docs/_index.md", None),
            ListingEntry::directory("empty"),
            ListingEntry::file("readme.md", None),
        ]
    }

    fn metadata() -> HashMap<String, FrontMatter> {
        let mut map = HashMap::new();
        let (blog, _) =
            FrontMatter::parse("---\ntitle: The Blog\norder: 2\nicon: pen\n---\n").unwrap();
        let (docs, _) = FrontMatter::parse("---\ntitle: Docs\norder: 1\n---\n").unwrap();
        map.insert("blog".to_string(), blog);
        map.insert("docs".to_string(), docs);
        map
    }

    fn assert_tree_invariant(tree: &DirectoryTree) {
        for node in tree.iter() {
            match tree.parent_of(node) {
                Some(parent) => {
                    let occurrences = parent.children.iter().filter(|c| c.id == node.id).count();
                    assert_eq!(occurrences, 1, "{} appears {} times", node.path, occurrences);
                }
                None => assert!(node.parent_id.is_none(), "orphan {}", node.path),
            }
            let ancestors = tree.ancestors(&node.id);
            let self_count = ancestors.iter().filter(|a| a.id == node.id).count();
            assert_eq!(self_count, 1, "{} is its own ancestor", node.path);
            assert_eq!(ancestors.last().map(|a| a.id.as_str()), Some(node.id.as_str()));
        }
    }

    #[test]
    fn test_build_tree() {
        let options = ContentOptions::default();
        let tree = TreeBuilder::new("local", &options).build(&listing(), &metadata());

        let names: Vec<_> = tree.roots().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["empty", "docs", "blog"]);
        assert_eq!(tree.len(), 6);

        let blog = tree.find_by_path("blog").unwrap();
        assert_eq!(blog.title, "The Blog");
        assert_eq!(blog.item_count, 2);
        assert_eq!(blog.metadata.get("icon").map(String::as_str), Some("pen"));

        let jan = tree.find_by_path("blog/2024/jan").unwrap();
        assert_eq!(jan.title, "jan");
        assert_eq!(jan.order, 0);
        assert_eq!(jan.item_count, 1);
        let chain: Vec<_> = tree.ancestors(&jan.id).iter().map(|d| d.name.clone()).collect();
        assert_eq!(chain, vec!["blog", "2024", "jan"]);

        assert_eq!(tree.find_by_url("/docs/guide/").unwrap().path, "docs/guide");
        assert_eq!(tree.find_by_id(&blog.id).unwrap().path, "blog");
        assert!(tree.find_by_path("missing").is_none());
        assert_tree_invariant(&tree);
    }

    #[test]
    fn test_empty_directories_configurable() {
        let options = ContentOptions {
            include_empty_directories: false,
            ..Default::default()
        };
        let tree = TreeBuilder::new("local", &options).build(&listing(), &metadata());
        assert!(tree.find_by_path("empty").is_none());
        assert!(tree.find_by_path("docs").is_some());
        // Only holds a subdirectory, so it is not empty
        assert!(tree.find_by_path("blog/2024").is_some());
    }

    #[test]
    fn test_excluded_directories_dropped() {
        let options = ContentOptions {
            exclude: vec!["docs".to_string()],
            ..Default::default()
        };
        let tree = TreeBuilder::new("local", &options).build(&listing(), &metadata());
        assert!(tree.find_by_path("docs").is_none());
        assert!(tree.find_by_path("docs/guide").is_none());
        assert_tree_invariant(&tree);
    }

    #[test]
    fn test_ids_stable_across_builds() {
        let options = ContentOptions::default();
        let builder = TreeBuilder::new("local", &options);
        let first = builder.build(&listing(), &metadata());
        let second = builder.build(&listing(), &HashMap::new());
        let first_ids: BTreeSet<_> = first.iter().map(|d| d.id.clone()).collect();
        let second_ids: BTreeSet<_> = second.iter().map(|d| d.id.clone()).collect();
        assert_eq!(first_ids, second_ids);

        let blog = first.find_by_path("blog").unwrap();
        let upper = first.find_by_id(&blog.id.to_uppercase()).unwrap();
        assert_eq!(upper.path, "blog");
    }

    #[test]
    fn test_locale_directories() {
        let options = ContentOptions {
            enable_localization: true,
            ..Default::default()
        };
        let entries = vec![
            ListingEntry::file("en/blog/a.md", None),
            ListingEntry::file("fr/blog/a.md", None),
            ListingEntry::file("shared/x.md", None),
        ];
        let tree = TreeBuilder::new("local", &options).build(&entries, &HashMap::new());
        assert_eq!(tree.find_by_path("fr/blog").unwrap().locale.as_deref(), Some("fr"));

        let french: Vec<_> = tree
            .for_locale(Some("fr"))
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(french, vec!["fr", "shared"]);
        assert_eq!(tree.for_locale(None).len(), 3);
    }

    #[test]
    fn test_metadata_files() {
        let options = ContentOptions::default();
        let files = TreeBuilder::new("local", &options).metadata_files(&listing());
        assert_eq!(
            files,
            vec![
                ("blog".to_string(), "blog/_index.md".to_string()),
                ("docs".to_string(), "docs/_index.md".to_string()),
            ]
        );
    }
}
