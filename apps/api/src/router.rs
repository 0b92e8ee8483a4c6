use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::handlers::AppointmentCellState;
use appointment_cell::router::appointment_routes;
use appointment_cell::services::{
    BookingCoordinator, InMemoryAppointmentRepository, InMemoryServiceRepository,
};
use practitioner_cell::handlers::PractitionerCellState;
use practitioner_cell::router::practitioner_routes;
use practitioner_cell::services::{InMemoryScheduleRepository, ScheduleRepository};
use shared_config::AppConfig;

/// Both cells share one schedule store so bookings see authored hours and blocks.
pub fn create_router(config: Arc<AppConfig>) -> Router {
    let schedules: Arc<dyn ScheduleRepository> = Arc::new(InMemoryScheduleRepository::new());

    let coordinator = Arc::new(BookingCoordinator::new(
        config.scheduling(),
        Arc::clone(&schedules),
        Arc::new(InMemoryServiceRepository::new()),
        Arc::new(InMemoryAppointmentRepository::new()),
    ));

    let practitioner_state = Arc::new(PractitionerCellState {
        config: Arc::clone(&config),
        schedules,
    });
    let appointment_state = Arc::new(AppointmentCellState {
        config,
        coordinator,
    });

    Router::new()
        .route("/", get(|| async { "Scheduling API is running!" }))
        .nest("/practitioners", practitioner_routes(practitioner_state))
        .nest("/appointments", appointment_routes(appointment_state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header::AUTHORIZATION, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

    async fn call(app: &Router, method: &str, uri: &str, auth: &str, body: Value) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header(AUTHORIZATION, auth)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_cells_share_schedule_store() {
        let config = TestConfig::default();
        let app = create_router(config.to_arc());
        let owner = JwtTestUtils::bearer(&TestUser::owner("owner@example.com"), &config);
        let clinic_id = Uuid::new_v4();

        let (status, body) = call(
            &app,
            "POST",
            "/practitioners",
            &owner,
            json!({ "clinic_id": clinic_id, "display_name": "Dr. Shared" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let practitioner_id = body["practitioner"]["id"].as_str().unwrap().to_string();

        let (status, body) = call(
            &app,
            "POST",
            "/appointments/services",
            &owner,
            json!({ "clinic_id": clinic_id, "name": "Check-up", "duration_minutes": 30 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let service_id = body["service"]["id"].as_str().unwrap().to_string();

        // Staff may book outside authored hours; the practitioner must exist in the shared store
        let (status, body) = call(
            &app,
            "POST",
            "/appointments",
            &owner,
            json!({
                "patient_id": Uuid::new_v4(),
                "practitioner_id": practitioner_id,
                "clinic_id": clinic_id,
                "service_id": service_id,
                "date": "2030-01-07",
                "start_time": "10:00:00"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["appointment"]["status"], "confirmed");
    }
}
