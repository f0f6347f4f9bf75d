//! In-memory virtual filesystem for a published site.
//!
//! The tree is a plain nested map structure; the interesting parts are the
//! path-resolution rules layered on top of it. `normalize_path` canonicalizes
//! request paths, `lookup` walks the tree, and `resolve_site_path` adds the
//! fallbacks a static-site server wants: directory indexes, listings, and
//! extensionless `.html` routes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// MIME type served when neither the manifest nor the filename says better.
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// Index filenames probed, in order, for a directory target.
const INDEX_CANDIDATES: &[&str] = &["index.html", "index.htm"];

/// One file in the tree: a content identifier plus optional metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub cid: String,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "mimeType")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// A directory: named files and named subdirectories. Either map may be
/// absent on the wire; an empty node is a valid (empty) directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryNode {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<String, FileEntry>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dirs: BTreeMap<String, DirectoryNode>,
}

impl DirectoryNode {
    /// Merge `other` into `self`: colliding file entries are overwritten by
    /// `other`, subdirectories merge recursively and are never replaced
    /// wholesale.
    pub fn merge_from(&mut self, other: DirectoryNode) {
        for (name, entry) in other.files {
            self.files.insert(name, entry);
        }
        for (name, subtree) in other.dirs {
            self.dirs.entry(name).or_default().merge_from(subtree);
        }
    }

    /// Total number of files in the tree.
    pub fn file_count(&self) -> u64 {
        self.files.len() as u64
            + self.dirs.values().map(DirectoryNode::file_count).sum::<u64>()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty()
    }
}

/// Canonicalize a request path.
///
/// Strips any query/fragment suffix, drops empty and `.` segments, and
/// resolves `..` against the accumulated prefix (a no-op at the root).
/// The result never has leading or trailing slashes. Idempotent.
pub fn normalize_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or("");
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.trim().split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// A resolved file: content identifier plus effective MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHit {
    pub cid: String,
    pub mime_type: String,
    pub size: Option<u64>,
}

/// A directory listing: the files map plus sorted subdirectory names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirListing {
    pub files: BTreeMap<String, FileEntry>,
    pub dirs: Vec<String>,
}

/// Outcome of a raw tree lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    File(FileHit),
    Directory(DirListing),
    NotFound,
}

fn file_hit(name: &str, entry: &FileEntry) -> FileHit {
    let mime_type = entry
        .mime_type
        .clone()
        .or_else(|| mime_guess::from_path(name).first_raw().map(str::to_string))
        .unwrap_or_else(|| DEFAULT_MIME.to_string());
    FileHit {
        cid: entry.cid.clone(),
        mime_type,
        size: entry.size,
    }
}

fn listing_of(node: &DirectoryNode) -> DirListing {
    DirListing {
        files: node.files.clone(),
        dirs: node.dirs.keys().cloned().collect(),
    }
}

/// Walk `path` through the tree.
///
/// The empty path is the root listing, even for an empty tree. All but the
/// final segment must name subdirectories; the final segment prefers a file
/// over a directory of the same name.
pub fn lookup(root: &DirectoryNode, path: &str) -> Lookup {
    let normalized = normalize_path(path);
    if normalized.is_empty() {
        return Lookup::Directory(listing_of(root));
    }

    let segments: Vec<&str> = normalized.split('/').collect();
    let mut node = root;
    for segment in &segments[..segments.len() - 1] {
        match node.dirs.get(*segment) {
            Some(dir) => node = dir,
            None => return Lookup::NotFound,
        }
    }

    let last = segments[segments.len() - 1];
    if let Some(entry) = node.files.get(last) {
        Lookup::File(file_hit(last, entry))
    } else if let Some(dir) = node.dirs.get(last) {
        Lookup::Directory(listing_of(dir))
    } else {
        Lookup::NotFound
    }
}

/// Outcome of full site-path resolution, fallbacks applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A file to serve; `path` is the normalized path that finally matched.
    File { path: String, hit: FileHit },
    /// A directory with no index file; serve a listing.
    Listing { path: String, listing: DirListing },
    NotFound,
}

/// Resolve a request path with static-site fallbacks, first success wins:
/// direct lookup, then `index.html`/`index.htm` for directories, then the
/// directory listing, then the final segment with `.html` appended.
pub fn resolve_site_path(root: &DirectoryNode, raw: &str) -> Resolution {
    let path = normalize_path(raw);
    match lookup(root, &path) {
        Lookup::File(hit) => Resolution::File { path, hit },
        Lookup::Directory(listing) => {
            for candidate in INDEX_CANDIDATES {
                let index_path = if path.is_empty() {
                    (*candidate).to_string()
                } else {
                    format!("{path}/{candidate}")
                };
                if let Lookup::File(hit) = lookup(root, &index_path) {
                    return Resolution::File {
                        path: index_path,
                        hit,
                    };
                }
            }
            Resolution::Listing { path, listing }
        }
        Lookup::NotFound => {
            if !path.is_empty() {
                let html_path = format!("{path}.html");
                if let Lookup::File(hit) = lookup(root, &html_path) {
                    return Resolution::File {
                        path: html_path,
                        hit,
                    };
                }
            }
            Resolution::NotFound
        }
    }
}
