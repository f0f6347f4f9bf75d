//! Gateway HTTP surface.
//!
//! The router owns exactly two things: the status endpoints and the
//! reserved serving scope `/{prefix}/{identity}/{siteName}[/*subpath]`.
//! Requests outside the reserved scope fall through to the router's default
//! not-found handling and never touch site state.

pub mod health;
pub mod site;

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::ServiceState;

pub fn router(state: ServiceState) -> Router {
    let prefix = state.serve_prefix().trim_matches('/').to_string();

    Router::new()
        .route("/_status/livez", get(health::liveness::handler))
        .route("/_status/version", get(health::version::handler))
        .route(
            &format!("/{prefix}/:identity/:site_name"),
            get(site::root_handler),
        )
        .route(
            &format!("/{prefix}/:identity/:site_name/"),
            get(site::root_handler),
        )
        .route(
            &format!("/{prefix}/:identity/:site_name/*subpath"),
            get(site::subpath_handler),
        )
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([http::Method::GET]),
        )
        .with_state(state)
}
