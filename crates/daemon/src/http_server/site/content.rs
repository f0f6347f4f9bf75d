//! Blob fetch-or-cache and content serving.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use thiserror::Error;

use common::error::FetchError;
use common::manifest::SiteInfo;
use common::vfs::FileHit;

use crate::state::ServiceState;

use super::decode::{decode_content, DecodeError};
use super::rewrite::{rewrite_css, rewrite_html};

/// Response header marking a blob served from the local cache.
pub const CACHE_HEADER: &str = "x-plume-cache";

#[derive(Debug, Error)]
pub enum ContentError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Serving categories with distinct post-processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCategory {
    Html,
    Css,
    Other,
}

impl ContentCategory {
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime.split(';').next().unwrap_or(mime).trim();
        match essence {
            "text/html" | "application/xhtml+xml" => ContentCategory::Html,
            "text/css" => ContentCategory::Css,
            _ => ContentCategory::Other,
        }
    }
}

/// Return a blob's decompressed bytes plus whether the cache served them.
///
/// Cache miss fetches from the hosting endpoint, sniff-decodes, and admits
/// the result when it passes the size gate. Two concurrent misses for one
/// identifier may both fetch; content is idempotent per identifier, so the
/// duplicate write is harmless.
pub async fn fetch_content(
    state: &ServiceState,
    info: &SiteInfo,
    cid: &str,
) -> Result<(Bytes, bool), ContentError> {
    if let Some(bytes) = state.store().get_blob(cid).await {
        return Ok((bytes, true));
    }

    let raw = state.pds().get_blob(&info.pds, &info.did, cid).await?;
    let decoded = decode_content(raw).await?;
    state.store().put_blob(cid, &decoded).await;
    Ok((decoded, false))
}

/// Serve one resolved file, post-processed per its content category.
pub async fn serve_file(
    state: &ServiceState,
    info: &SiteInfo,
    base_href: &str,
    path: &str,
    hit: &FileHit,
) -> Response {
    let (bytes, cache_hit) = match fetch_content(state, info, &hit.cid).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("failed to serve {path} ({}): {e}", hit.cid);
            return super::error_response(&e.to_string());
        }
    };

    let mut response = match ContentCategory::from_mime(&hit.mime_type) {
        ContentCategory::Html => {
            let text = String::from_utf8_lossy(&bytes);
            super::html_response(rewrite_html(&text, base_href))
        }
        ContentCategory::Css => {
            let text = String::from_utf8_lossy(&bytes);
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
                rewrite_css(&text),
            )
                .into_response()
        }
        ContentCategory::Other => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, hit.mime_type.clone())],
            bytes,
        )
            .into_response(),
    };

    if cache_hit {
        response
            .headers_mut()
            .insert(CACHE_HEADER, axum::http::HeaderValue::from_static("hit"));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_by_mime_essence() {
        assert_eq!(
            ContentCategory::from_mime("text/html"),
            ContentCategory::Html
        );
        assert_eq!(
            ContentCategory::from_mime("text/html; charset=utf-8"),
            ContentCategory::Html
        );
        assert_eq!(ContentCategory::from_mime("text/css"), ContentCategory::Css);
        assert_eq!(
            ContentCategory::from_mime("image/png"),
            ContentCategory::Other
        );
        assert_eq!(
            ContentCategory::from_mime("application/octet-stream"),
            ContentCategory::Other
        );
    }
}
