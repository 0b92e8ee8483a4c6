// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, AppointmentCellState};

pub fn appointment_routes(state: Arc<AppointmentCellState>) -> Router {
    // Slot display is advisory and needs no identity
    let public_routes = Router::new()
        .route("/slots", get(handlers::get_available_slots))
        .route("/slots/next", get(handlers::find_next_available_slot));

    let protected_routes = Router::new()
        .route("/", post(handlers::book_appointment))
        .route("/services", post(handlers::create_service))
        .route("/conflicts/check", get(handlers::check_conflicts))
        .route("/patients/{patient_id}", get(handlers::get_patient_appointments))
        .route(
            "/practitioners/{practitioner_id}",
            get(handlers::get_practitioner_appointments),
        )
        .route(
            "/practitioners/{practitioner_id}/blocked-windows",
            post(handlers::create_blocked_window),
        )
        .route("/{appointment_id}", get(handlers::get_appointment))
        // Patient requests and their resolution
        .route("/{appointment_id}/reschedule-request", post(handlers::request_reschedule))
        .route(
            "/{appointment_id}/reschedule-request/approve",
            post(handlers::approve_reschedule),
        )
        .route(
            "/{appointment_id}/reschedule-request/reject",
            post(handlers::reject_reschedule),
        )
        .route("/{appointment_id}/cancel-request", post(handlers::request_cancel))
        .route(
            "/{appointment_id}/cancel-request/approve",
            post(handlers::approve_cancel),
        )
        .route(
            "/{appointment_id}/cancel-request/reject",
            post(handlers::reject_cancel),
        )
        // Staff status changes
        .route("/{appointment_id}/confirm", post(handlers::confirm_appointment))
        .route("/{appointment_id}/waiting", post(handlers::mark_waiting))
        .route(
            "/{appointment_id}/return-to-confirmed",
            post(handlers::return_to_confirmed),
        )
        .route("/{appointment_id}/complete", post(handlers::complete_appointment))
        .route("/{appointment_id}/missed", post(handlers::mark_missed))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .layer(middleware::from_fn_with_state(
            state.config.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
