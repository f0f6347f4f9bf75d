//! Site and fragment records, and their assembly into a manifest.
//!
//! Records arrive as JSON with the directory tree in one of two encodings:
//! a flat `{files, dirs}` shape that matches [`DirectoryNode`] directly, or
//! an entry-array shape `{type: "directory", entries: [{name, node}]}` where
//! each node is itself tagged `file` or `directory`. Both are converted to
//! the flat in-memory form exactly once, at parse time; the serving side
//! never sees the wire shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::{ParseError, SiteFetchError};
use crate::pds::PdsClient;
use crate::vfs::{DirectoryNode, FileEntry};

/// Collection holding one record per published site.
pub const SITE_COLLECTION: &str = "dev.plume.site";
/// Collection holding directory subtrees merged into a site's root.
pub const FRAGMENT_COLLECTION: &str = "dev.plume.site.fragment";

/// A complete, merged description of one published site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub site: String,
    pub file_count: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub root: DirectoryNode,
}

/// The serving context for a resident site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteInfo {
    /// Canonical identity owning the site.
    pub did: String,
    /// Display handle, when known.
    pub handle: Option<String>,
    /// Hosting endpoint for record and blob fetches.
    pub pds: Url,
    /// Site name, also the record key.
    pub site: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SiteRecord {
    site: String,
    #[serde(default, rename = "fileCount")]
    file_count: Option<u64>,
    #[serde(default, rename = "createdAt")]
    created_at: Option<DateTime<Utc>>,
    root: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct FragmentRecord {
    /// Record key of the site this fragment belongs to. Fragments without
    /// a target merge into whichever site is being fetched.
    #[serde(default)]
    site: Option<String>,
    root: Value,
}

/// The two recognized blob-reference shapes, decided once at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobRef {
    /// Plain `{link: "<cid>"}`.
    Link(String),
    /// Structured content-identifier object: `{"$link": "<cid>"}` either
    /// directly or under a `ref` key, optionally carrying mime and size.
    Structured {
        cid: String,
        mime_type: Option<String>,
        size: Option<u64>,
    },
}

impl BlobRef {
    pub fn cid(&self) -> &str {
        match self {
            BlobRef::Link(cid) => cid,
            BlobRef::Structured { cid, .. } => cid,
        }
    }
}

/// Pick whichever recognized blob-reference shape is present on a file node.
fn extract_blob_ref(node: &Value) -> Result<BlobRef, ParseError> {
    if let Some(link) = node.get("link").and_then(Value::as_str) {
        return Ok(BlobRef::Link(link.to_string()));
    }
    let structured = node
        .get("blob")
        .or_else(|| node.get("content"))
        .unwrap_or(node);
    let cid = structured
        .get("$link")
        .and_then(Value::as_str)
        .or_else(|| {
            structured
                .get("ref")
                .and_then(|r| r.get("$link"))
                .and_then(Value::as_str)
        });
    match cid {
        Some(cid) => Ok(BlobRef::Structured {
            cid: cid.to_string(),
            mime_type: structured
                .get("mimeType")
                .and_then(Value::as_str)
                .map(str::to_string),
            size: structured.get("size").and_then(Value::as_u64),
        }),
        None => Err(ParseError::new("file node carries no blob reference")),
    }
}

fn validate_cid(cid: &str) -> Result<(), ParseError> {
    cid::Cid::try_from(cid)
        .map(|_| ())
        .map_err(|e| ParseError::new(format!("malformed content id {cid:?}: {e}")))
}

#[derive(Debug, Clone, Deserialize)]
struct TaggedDirectory {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    entries: Vec<TaggedEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct TaggedEntry {
    #[serde(default)]
    name: Option<String>,
    node: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct TaggedFile {
    #[serde(default, rename = "mimeType")]
    mime_type: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

/// Convert the entry-array encoding to the flat in-memory form. Pure and
/// recursive; validation failures name the offending entry.
fn convert_entries(dir: TaggedDirectory) -> Result<DirectoryNode, ParseError> {
    if dir.kind != "directory" {
        return Err(ParseError::new(format!(
            "unrecognized directory type {:?}",
            dir.kind
        )));
    }

    let mut node = DirectoryNode::default();
    for entry in dir.entries {
        let name = entry
            .name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ParseError::new("directory entry missing name"))?;

        match entry.node.get("type").and_then(Value::as_str) {
            Some("file") => {
                let blob = extract_blob_ref(&entry.node)
                    .map_err(|e| ParseError::new(format!("entry {name:?}: {e}")))?;
                validate_cid(blob.cid())
                    .map_err(|e| ParseError::new(format!("entry {name:?}: {e}")))?;
                let meta: TaggedFile = serde_json::from_value(entry.node.clone())
                    .map_err(|e| ParseError::new(format!("entry {name:?}: {e}")))?;
                let (ref_mime, ref_size) = match &blob {
                    BlobRef::Structured {
                        mime_type, size, ..
                    } => (mime_type.clone(), *size),
                    BlobRef::Link(_) => (None, None),
                };
                node.files.insert(
                    name,
                    FileEntry {
                        cid: blob.cid().to_string(),
                        mime_type: meta.mime_type.or(ref_mime),
                        size: meta.size.or(ref_size),
                    },
                );
            }
            Some("directory") => {
                let subdir: TaggedDirectory = serde_json::from_value(entry.node)
                    .map_err(|e| ParseError::new(format!("entry {name:?}: {e}")))?;
                node.dirs.insert(name, convert_entries(subdir)?);
            }
            Some(other) => {
                return Err(ParseError::new(format!(
                    "entry {name:?}: unrecognized node type {other:?}"
                )))
            }
            None => {
                return Err(ParseError::new(format!(
                    "entry {name:?}: node missing type"
                )))
            }
        }
    }
    Ok(node)
}

/// Validate a flat-encoded tree: non-empty names, well-formed content ids.
fn validate_flat(node: &DirectoryNode) -> Result<(), ParseError> {
    for (name, entry) in &node.files {
        if name.is_empty() {
            return Err(ParseError::new("file entry missing name"));
        }
        validate_cid(&entry.cid)
            .map_err(|e| ParseError::new(format!("file {name:?}: {e}")))?;
    }
    for (name, dir) in &node.dirs {
        if name.is_empty() {
            return Err(ParseError::new("directory entry missing name"));
        }
        validate_flat(dir)?;
    }
    Ok(())
}

/// Parse a directory value in either encoding into the canonical form.
pub fn parse_directory(value: &Value) -> Result<DirectoryNode, ParseError> {
    let Some(obj) = value.as_object() else {
        return Err(ParseError::new("directory is not an object"));
    };

    if obj.contains_key("type") {
        let tagged: TaggedDirectory = serde_json::from_value(value.clone())
            .map_err(|e| ParseError::new(format!("malformed directory: {e}")))?;
        convert_entries(tagged)
    } else {
        let node: DirectoryNode = serde_json::from_value(value.clone())
            .map_err(|e| ParseError::new(format!("malformed directory: {e}")))?;
        validate_flat(&node)?;
        Ok(node)
    }
}

/// Fetch and assemble the manifest for one site.
///
/// The site record's root is converted first, then every fragment targeting
/// this site merges into it in fetch order. A missing site record is
/// `Ok(None)`, the distinct no-site signal.
pub async fn fetch_site(
    client: &PdsClient,
    pds: &Url,
    did: &str,
    rkey: &str,
) -> Result<Option<Manifest>, SiteFetchError> {
    let Some(envelope) = client.get_record(pds, did, SITE_COLLECTION, rkey).await? else {
        return Ok(None);
    };
    let record: SiteRecord = serde_json::from_value(envelope.value)
        .map_err(|e| ParseError::new(format!("malformed site record {rkey:?}: {e}")))?;

    let mut root = parse_directory(&record.root)?;

    for fragment_env in client.list_records(pds, did, FRAGMENT_COLLECTION).await? {
        let rkey_of_fragment = fragment_env.rkey().to_string();
        let fragment: FragmentRecord = serde_json::from_value(fragment_env.value)
            .map_err(|e| {
                ParseError::new(format!(
                    "malformed fragment record {rkey_of_fragment:?}: {e}"
                ))
            })?;
        if let Some(target) = &fragment.site {
            if target != rkey {
                continue;
            }
        }
        let subtree = parse_directory(&fragment.root)
            .map_err(|e| ParseError::new(format!("fragment {rkey_of_fragment:?}: {e}")))?;
        root.merge_from(subtree);
    }

    let file_count = record.file_count.unwrap_or_else(|| root.file_count());
    Ok(Some(Manifest {
        site: record.site,
        file_count,
        created_at: record.created_at,
        root,
    }))
}
