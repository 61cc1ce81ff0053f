//! REST API module using Axum
//!
//! Endpoints:
//! - `GET  /health`             liveness
//! - `POST /train`              train, persist and register all bundles
//! - `GET  /registry`           every registry entry
//! - `GET  /summary`            shape and metadata of the current feature table
//! - `GET  /feature-importance` ranked importances of a trained bundle
//! - `GET  /anomalies`          most anomalous time buckets
//! - `GET  /trend`              trailing values of one feature column

pub mod envelope;
pub mod handlers;
mod routes;

pub use handlers::ServiceState;

use axum::http::{header, Method};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::defaults::CORS_ORIGINS_ENV;

/// Build a CORS layer that is restrictive by default (same-origin only).
///
/// Set `MSMS_CORS_ORIGINS` to a comma-separated list of allowed origins.
fn build_cors_layer() -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    match std::env::var(CORS_ORIGINS_ENV) {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            base.allow_origin(allowed)
        }
        Err(_) => base,
    }
}

/// Create the complete application router.
pub fn create_app(state: ServiceState) -> Router {
    routes::api_routes(state)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
}
