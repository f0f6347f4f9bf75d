//! Synthesized directory listings for directories without an index file.

use askama::Template;

use common::vfs::{DirListing, DEFAULT_MIME};

use super::rewrite::rewrite_html;

/// Template for the synthesized directory listing.
#[derive(Template)]
#[template(path = "listing.html")]
pub struct ListingTemplate {
    pub title: String,
    /// Site-relative path of the parent directory; `None` at the site root.
    pub parent: Option<String>,
    pub dirs: Vec<ListingDir>,
    pub files: Vec<ListingFile>,
}

pub struct ListingDir {
    pub name: String,
    pub href: String,
}

pub struct ListingFile {
    pub name: String,
    pub href: String,
    pub mime: String,
}

fn child_path(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}/{name}")
    }
}

fn parent_path(path: &str) -> Option<String> {
    if path.is_empty() {
        return None;
    }
    Some(match path.rfind('/') {
        Some(pos) => path[..pos].to_string(),
        None => String::new(),
    })
}

impl ListingTemplate {
    pub fn new(path: &str, listing: &DirListing) -> Self {
        let dirs = listing
            .dirs
            .iter()
            .map(|name| ListingDir {
                name: name.clone(),
                href: child_path(path, name),
            })
            .collect();

        // BTreeMap iteration keeps files sorted by name
        let files = listing
            .files
            .iter()
            .map(|(name, entry)| ListingFile {
                name: name.clone(),
                href: child_path(path, name),
                mime: entry
                    .mime_type
                    .clone()
                    .or_else(|| mime_guess::from_path(name).first_raw().map(str::to_string))
                    .unwrap_or_else(|| DEFAULT_MIME.to_string()),
            })
            .collect();

        Self {
            title: format!("/{path}"),
            parent: parent_path(path),
            dirs,
            files,
        }
    }
}

/// Render a directory listing and run it through the same HTML
/// post-processing as site content.
pub fn render_listing(
    path: &str,
    listing: &DirListing,
    base_href: &str,
) -> Result<String, askama::Error> {
    let html = ListingTemplate::new(path, listing).render()?;
    Ok(rewrite_html(&html, base_href))
}
