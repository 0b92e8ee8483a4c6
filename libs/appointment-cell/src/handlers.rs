// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query, State},
    Json,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use practitioner_cell::models::CreateBlockedWindowRequest;
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::Caller;

use crate::models::{
    Appointment, AppointmentError, BookAppointmentRequest, CancelRequest, Conflict,
    ConflictCheckQuery, CreateServiceRequest, DayQuery, NextSlotQuery, RescheduleRequest,
    SlotQuery,
};
use crate::services::booking::MAX_SEARCH_DAYS;
use crate::services::BookingCoordinator;

const SUGGESTED_ALTERNATIVES: usize = 3;

pub struct AppointmentCellState {
    pub config: Arc<AppConfig>,
    pub coordinator: Arc<BookingCoordinator>,
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::Validation(msg) => AppError::ValidationError(msg),
            AppointmentError::Conflict { ref conflicts } => AppError::ConflictWithDetails {
                message: err.to_string(),
                details: json!({ "conflicts": conflicts, "alternatives": [] }),
            },
            AppointmentError::AppointmentNotFound(_)
            | AppointmentError::PractitionerNotFound(_)
            | AppointmentError::ServiceNotFound(_) => AppError::NotFound(err.to_string()),
            AppointmentError::InvalidStateTransition { .. } => {
                AppError::InvalidStateTransition(err.to_string())
            }
            AppointmentError::Unauthorized(msg) => AppError::Forbidden(msg),
            AppointmentError::Storage(msg) => AppError::Internal(msg),
        }
    }
}

// ==============================================================================
// HELPERS
// ==============================================================================

/// Clinic-local wall time used to hide elapsed slots.
fn clinic_now(state: &AppointmentCellState) -> NaiveDateTime {
    Utc::now()
        .with_timezone(&state.config.scheduling.clinic_offset())
        .naive_local()
}

fn ensure_owner(caller: &Caller, appointment: &Appointment) -> Result<(), AppError> {
    if caller.role.is_privileged() || appointment.patient_id == caller.id {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Patients may only act on their own appointments".to_string(),
        ))
    }
}

async fn load_owned(
    state: &AppointmentCellState,
    caller: &Caller,
    appointment_id: Uuid,
) -> Result<Appointment, AppError> {
    let appointment = state.coordinator.get_appointment(appointment_id).await?;
    ensure_owner(caller, &appointment)?;
    Ok(appointment)
}

async fn resolve_duration(
    state: &AppointmentCellState,
    duration_minutes: Option<u32>,
    service_id: Option<Uuid>,
) -> Result<u32, AppError> {
    match (duration_minutes, service_id) {
        (Some(minutes), _) => Ok(minutes),
        (None, Some(service_id)) => Ok(state.coordinator.service(service_id).await?.duration_minutes),
        (None, None) => Ok(state.config.scheduling.default_service_duration_minutes),
    }
}

/// Turns a conflict into a 409 carrying nearby free starts on the same day.
async fn conflict_response(
    state: &AppointmentCellState,
    conflicts: Vec<Conflict>,
    practitioner_id: Uuid,
    date: NaiveDate,
    around: NaiveTime,
    duration_minutes: u32,
) -> AppError {
    let alternatives = state
        .coordinator
        .suggest_alternatives(
            practitioner_id,
            date,
            around,
            duration_minutes,
            clinic_now(state),
            SUGGESTED_ALTERNATIVES,
        )
        .await
        .unwrap_or_else(|e| {
            warn!("Could not compute alternatives: {}", e);
            Vec::new()
        });

    AppError::ConflictWithDetails {
        message: AppointmentError::Conflict { conflicts: conflicts.clone() }.to_string(),
        details: json!({
            "conflicts": conflicts,
            "alternatives": alternatives,
        }),
    }
}

fn appointment_body(appointment: &Appointment) -> Json<Value> {
    Json(json!({ "success": true, "appointment": appointment }))
}

// ==============================================================================
// SLOT HANDLERS
// ==============================================================================

pub async fn get_available_slots(
    State(state): State<Arc<AppointmentCellState>>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, AppError> {
    let duration = resolve_duration(&state, query.duration_minutes, query.service_id).await?;
    let slots = state
        .coordinator
        .get_available_slots(query.practitioner_id, query.date, duration, clinic_now(&state))
        .await?;

    Ok(Json(json!({
        "practitioner_id": query.practitioner_id,
        "date": query.date,
        "duration_minutes": duration,
        "slots": slots,
    })))
}

pub async fn find_next_available_slot(
    State(state): State<Arc<AppointmentCellState>>,
    Query(query): Query<NextSlotQuery>,
) -> Result<Json<Value>, AppError> {
    let duration = resolve_duration(&state, query.duration_minutes, query.service_id).await?;
    let max_days = query.max_days.unwrap_or(14).min(MAX_SEARCH_DAYS);

    let slot = state
        .coordinator
        .find_next_available_slot(
            query.practitioner_id,
            query.from_date,
            duration,
            max_days,
            clinic_now(&state),
        )
        .await?;

    Ok(Json(json!({ "slot": slot, "searched_days": max_days })))
}

pub async fn check_conflicts(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Query(query): Query<ConflictCheckQuery>,
) -> Result<Json<Value>, AppError> {
    Caller::from_user(&user)?.require_privileged()?;

    let conflicts = state
        .coordinator
        .check_conflicts(
            query.practitioner_id,
            query.date,
            query.start_time,
            query.duration_minutes,
            query.exclude_appointment_id,
        )
        .await?;

    Ok(Json(json!({
        "has_conflict": !conflicts.is_empty(),
        "conflicts": conflicts,
    })))
}

// ==============================================================================
// CATALOG
// ==============================================================================

pub async fn create_service(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateServiceRequest>,
) -> Result<Json<Value>, AppError> {
    Caller::from_user(&user)?.require_privileged()?;
    let service = state.coordinator.add_service(request).await?;
    Ok(Json(json!({ "success": true, "service": service })))
}

pub async fn create_blocked_window(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(practitioner_id): Path<Uuid>,
    Json(request): Json<CreateBlockedWindowRequest>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    caller.require_privileged()?;

    let window = state
        .coordinator
        .add_blocked_window(practitioner_id, request, caller.id)
        .await?;
    Ok(Json(json!({ "success": true, "blocked_window": window })))
}

// ==============================================================================
// BOOKING
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    payload: Result<Json<BookAppointmentRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(request) = payload.map_err(|e| AppError::ValidationError(e.body_text()))?;
    let caller = Caller::from_user(&user)?;

    if !caller.role.is_privileged() && request.patient_id != caller.id {
        return Err(AppError::Forbidden(
            "Patients may only book for themselves".to_string(),
        ));
    }

    match state.coordinator.book(request.clone(), caller.role).await {
        Ok(appointment) => {
            info!("Appointment {} created by {}", appointment.id, caller.role);
            Ok(appointment_body(&appointment))
        }
        Err(AppointmentError::Conflict { conflicts }) => {
            let (Some(date), Some(start_time), Some(service_id)) =
                (request.date, request.start_time, request.service_id)
            else {
                return Err(AppointmentError::Conflict { conflicts }.into());
            };
            let duration = resolve_duration(&state, None, Some(service_id)).await?;
            Err(conflict_response(
                &state,
                conflicts,
                request.practitioner_id,
                date,
                start_time,
                duration,
            )
            .await)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn get_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    let appointment = load_owned(&state, &caller, appointment_id).await?;
    Ok(Json(json!({ "appointment": appointment })))
}

pub async fn get_practitioner_appointments(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(practitioner_id): Path<Uuid>,
    Query(query): Query<DayQuery>,
) -> Result<Json<Value>, AppError> {
    Caller::from_user(&user)?.require_privileged()?;
    let appointments = state
        .coordinator
        .list_practitioner_appointments(practitioner_id, query.date)
        .await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len(),
    })))
}

pub async fn get_patient_appointments(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    if !caller.role.is_privileged() && caller.id != patient_id {
        return Err(AppError::Forbidden(
            "Patients may only view their own appointments".to_string(),
        ));
    }

    let appointments = state.coordinator.list_patient_appointments(patient_id).await?;
    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len(),
    })))
}

// ==============================================================================
// REQUESTS
// ==============================================================================

pub async fn request_reschedule(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    payload: Result<Json<RescheduleRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(request) = payload.map_err(|e| AppError::ValidationError(e.body_text()))?;
    let caller = Caller::from_user(&user)?;
    load_owned(&state, &caller, appointment_id).await?;

    let appointment = state
        .coordinator
        .request_reschedule(appointment_id, request, caller.role)
        .await?;
    Ok(appointment_body(&appointment))
}

pub async fn approve_reschedule(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    // Read before approving: a conflicting approval discards the proposal
    let requested = state.coordinator.get_appointment(appointment_id).await?;

    match state.coordinator.approve_reschedule(appointment_id, caller.role).await {
        Ok(appointment) => Ok(appointment_body(&appointment)),
        Err(AppointmentError::Conflict { conflicts }) => {
            let Some(proposal) = requested.proposal() else {
                return Err(AppointmentError::Conflict { conflicts }.into());
            };
            let duration = resolve_duration(&state, None, Some(proposal.service_id)).await?;
            Err(conflict_response(
                &state,
                conflicts,
                proposal.practitioner_id,
                proposal.date,
                proposal.start_time,
                duration,
            )
            .await)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn reject_reschedule(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    let appointment = state
        .coordinator
        .reject_reschedule(appointment_id, caller.role)
        .await?;
    Ok(appointment_body(&appointment))
}

pub async fn request_cancel(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    payload: Result<Json<CancelRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(request) = payload.map_err(|e| AppError::ValidationError(e.body_text()))?;
    let caller = Caller::from_user(&user)?;
    load_owned(&state, &caller, appointment_id).await?;

    let appointment = state
        .coordinator
        .request_cancel(appointment_id, request.reason, caller.role)
        .await?;
    Ok(appointment_body(&appointment))
}

pub async fn approve_cancel(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    state
        .coordinator
        .approve_cancel(appointment_id, caller.role)
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment_id": appointment_id,
        "status": "cancelled",
    })))
}

pub async fn reject_cancel(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    let appointment = state
        .coordinator
        .reject_cancel(appointment_id, caller.role)
        .await?;
    Ok(appointment_body(&appointment))
}

// ==============================================================================
// STAFF STATUS CHANGES
// ==============================================================================

pub async fn confirm_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    let appointment = state.coordinator.confirm(appointment_id, caller.role).await?;
    Ok(appointment_body(&appointment))
}

pub async fn mark_waiting(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    let appointment = state
        .coordinator
        .mark_waiting(appointment_id, caller.role)
        .await?;
    Ok(appointment_body(&appointment))
}

pub async fn return_to_confirmed(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    let appointment = state
        .coordinator
        .return_to_confirmed(appointment_id, caller.role)
        .await?;
    Ok(appointment_body(&appointment))
}

pub async fn complete_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    let appointment = state.coordinator.complete(appointment_id, caller.role).await?;
    Ok(appointment_body(&appointment))
}

pub async fn mark_missed(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    let appointment = state
        .coordinator
        .mark_missed(appointment_id, caller.role)
        .await?;
    Ok(appointment_body(&appointment))
}

pub async fn cancel_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    let appointment = state.coordinator.cancel(appointment_id, caller.role).await?;
    Ok(appointment_body(&appointment))
}
