//! Scoped request handling for the reserved serving path.
//!
//! Only `/{prefix}/{identity}/{siteName}[/*subpath]` lands here; the rest of
//! the router never touches site state. Resolution order for a subpath is
//! direct lookup, then directory index, then directory listing, then the
//! `.html` extension fallback; the first success wins.

mod content;
mod decode;
mod listing;
mod rewrite;

pub use content::CACHE_HEADER;
pub use decode::decode_content;
pub use rewrite::{rewrite_css, rewrite_html};

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use common::vfs::{resolve_site_path, Resolution};

use crate::state::ServiceState;

/// Handler for site-root requests (no subpath).
pub async fn root_handler(
    State(state): State<ServiceState>,
    Path((identity, site_name)): Path<(String, String)>,
) -> Response {
    serve(state, identity, site_name, String::new()).await
}

pub async fn subpath_handler(
    State(state): State<ServiceState>,
    Path((identity, site_name, subpath)): Path<(String, String, String)>,
) -> Response {
    serve(state, identity, site_name, subpath).await
}

async fn serve(
    state: ServiceState,
    identity: String,
    site_name: String,
    subpath: String,
) -> Response {
    let Some(resident) = state.session() else {
        return unavailable_response();
    };

    if resident.info.did != identity {
        return mismatch_response(&identity, &resident.info.did);
    }

    let base_href = format!("/{}/{}/{}/", state.serve_prefix(), identity, site_name);

    match resolve_site_path(&resident.manifest.root, &subpath) {
        Resolution::File { path, hit } => {
            content::serve_file(&state, &resident.info, &base_href, &path, &hit).await
        }
        Resolution::Listing { path, listing } => {
            match listing::render_listing(&path, &listing, &base_href) {
                Ok(html) => html_response(html),
                Err(e) => {
                    tracing::error!("failed to render listing for {path:?}: {e}");
                    error_response("failed to render directory listing")
                }
            }
        }
        Resolution::NotFound => not_found_response(&subpath),
    }
}

pub(crate) fn html_response(html: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        html,
    )
        .into_response()
}

pub(crate) fn error_response(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Error: {message}"),
    )
        .into_response()
}

fn not_found_response(path: &str) -> Response {
    (StatusCode::NOT_FOUND, format!("Not found: /{path}")).into_response()
}

fn unavailable_response() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [(header::RETRY_AFTER, "5")],
        "No site is loaded yet. Install one and try again.",
    )
        .into_response()
}

fn mismatch_response(requested: &str, resident: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        format!("Site mismatch: requested {requested}, resident identity is {resident}"),
    )
        .into_response()
}
