//! API route table.

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{self, ServiceState};

/// Build the service router.
pub fn api_routes(state: ServiceState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // Training
        .route("/train", post(handlers::train))
        .route("/registry", get(handlers::registry))
        // Inference
        .route("/summary", get(handlers::summary))
        .route("/feature-importance", get(handlers::feature_importance))
        .route("/anomalies", get(handlers::anomalies))
        .route("/trend", get(handlers::trend))
        .with_state(state)
}
