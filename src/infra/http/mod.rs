//! HTTP boundary: serves the virtual filesystem and the peer cache endpoint.

mod middleware;
mod peer;
mod site;
mod state;

use axum::{Router, middleware as axum_middleware, routing::get};

pub use state::{HttpState, SiteHandle};

use middleware::{log_responses, set_request_context};

/// Builds the router serving the site and the peer endpoints.
///
/// The `/_vellum` prefix is claimed by the peer endpoints and shadows any site folder of
/// that name.
pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/_vellum/stats", get(peer::stats))
        .route("/_vellum/{group}/{key}", get(peer::fetch))
        .route("/", get(site::serve_root))
        .route("/{*path}", get(site::serve_path))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            site::apply_site_headers,
        ))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
