// libs/practitioner-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, PractitionerCellState};

pub fn practitioner_routes(state: Arc<PractitionerCellState>) -> Router {
    let public_routes = Router::new()
        .route("/{practitioner_id}/availability", get(handlers::get_availability));

    // Schedule authoring is staff-facing
    let protected_routes = Router::new()
        .route("/", post(handlers::register_practitioner))
        .route("/{practitioner_id}/weekly-template", put(handlers::set_weekly_template))
        .route("/{practitioner_id}/overrides/{date}", put(handlers::set_date_override))
        .layer(middleware::from_fn_with_state(
            state.config.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
