//! HTTP routing

pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use sequencer::traits::{EnrollmentStore, SequenceStore};

use crate::state::AppState;
use handlers::api;

/// Build the Axum router with all routes
pub fn build_router<S, L>(state: AppState<S, L>) -> Router
where
    S: SequenceStore + 'static,
    L: EnrollmentStore + 'static,
{
    Router::new()
        .route(
            "/api/sequences",
            post(api::upsert_sequence).get(api::list_sequences),
        )
        .route("/api/enrollments", post(api::create_enrollment))
        .route("/api/enrollments/:id", get(api::get_enrollment))
        .route("/api/enrollments/:id/cancel", post(api::cancel_enrollment))
        .route("/api/status", get(api::get_status))
        .route("/health", get(api::health_check))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()).into_inner())
        .with_state(state)
}
