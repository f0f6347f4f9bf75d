#![allow(dead_code)]

use url::Url;

use common::manifest::{Manifest, SiteInfo};
use common::vfs::{DirectoryNode, FileEntry};

/// A well-formed CIDv1 (raw codec, sha2-256) derived from a seed byte.
pub fn test_cid(seed: u8) -> String {
    let hash = cid::multihash::Multihash::<64>::wrap(0x12, &[seed; 32]).unwrap();
    cid::Cid::new_v1(0x55, hash).to_string()
}

/// Build a manifest from `(path, cid, mime)` triples. Paths may be nested.
pub fn manifest_with(site: &str, files: &[(&str, String, Option<&str>)]) -> Manifest {
    let mut root = DirectoryNode::default();
    for (path, cid, mime) in files {
        let segments: Vec<&str> = path.split('/').collect();
        let mut node = &mut root;
        for dir in &segments[..segments.len() - 1] {
            node = node.dirs.entry((*dir).to_string()).or_default();
        }
        node.files.insert(
            segments[segments.len() - 1].to_string(),
            FileEntry {
                cid: cid.clone(),
                mime_type: mime.map(str::to_string),
                size: None,
            },
        );
    }
    let file_count = root.file_count();
    Manifest {
        site: site.to_string(),
        file_count,
        created_at: None,
        root,
    }
}

pub fn site_info(did: &str, pds: &Url, site: &str) -> SiteInfo {
    SiteInfo {
        did: did.to_string(),
        handle: Some("alice.example".to_string()),
        pds: pds.clone(),
        site: site.to_string(),
    }
}

pub fn empty_manifest(site: &str) -> Manifest {
    Manifest {
        site: site.to_string(),
        file_count: 0,
        created_at: None,
        root: DirectoryNode::default(),
    }
}
