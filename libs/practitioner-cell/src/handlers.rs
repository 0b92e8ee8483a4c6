// libs/practitioner-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::Caller;

use crate::models::{
    AvailabilityQuery, DateOverride, OpeningHours, Practitioner, RegisterPractitionerRequest,
    ScheduleError, SetDateOverrideRequest, SetWeeklyTemplateRequest, WeeklyTemplate,
};
use crate::services::{AvailabilityResolver, ScheduleRepository};

pub struct PractitionerCellState {
    pub config: Arc<AppConfig>,
    pub schedules: Arc<dyn ScheduleRepository>,
}

impl From<ScheduleError> for AppError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::PractitionerNotFound(_) => AppError::NotFound(err.to_string()),
            ScheduleError::PractitionerExists(_) => AppError::Conflict(err.to_string()),
            ScheduleError::InvalidHours(_) | ScheduleError::Validation(_) => {
                AppError::ValidationError(err.to_string())
            }
            ScheduleError::Storage(_) => AppError::Internal(err.to_string()),
        }
    }
}

async fn load_practitioner(
    state: &PractitionerCellState,
    practitioner_id: Uuid,
) -> Result<Practitioner, AppError> {
    state
        .schedules
        .get_practitioner(practitioner_id)
        .await?
        .ok_or_else(|| ScheduleError::PractitionerNotFound(practitioner_id).into())
}

pub async fn register_practitioner(
    State(state): State<Arc<PractitionerCellState>>,
    Extension(user): Extension<User>,
    Json(request): Json<RegisterPractitionerRequest>,
) -> Result<Json<Value>, AppError> {
    Caller::from_user(&user)?.require_privileged()?;

    if request.display_name.trim().is_empty() {
        return Err(AppError::ValidationError("display_name is required".to_string()));
    }

    let practitioner = state
        .schedules
        .register_practitioner(Practitioner {
            id: request.id.unwrap_or_else(Uuid::new_v4),
            clinic_id: request.clinic_id,
            display_name: request.display_name.trim().to_string(),
            created_at: Utc::now(),
        })
        .await?;

    info!("Practitioner {} registered at clinic {}", practitioner.id, practitioner.clinic_id);
    Ok(Json(json!({ "success": true, "practitioner": practitioner })))
}

pub async fn get_availability(
    State(state): State<Arc<PractitionerCellState>>,
    Path(practitioner_id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Value>, AppError> {
    let resolver = AvailabilityResolver::new(Arc::clone(&state.schedules));
    let availability = resolver.resolve(practitioner_id, query.date).await?;
    Ok(Json(json!({ "availability": availability })))
}

pub async fn set_weekly_template(
    State(state): State<Arc<PractitionerCellState>>,
    Extension(user): Extension<User>,
    Path(practitioner_id): Path<Uuid>,
    Json(request): Json<SetWeeklyTemplateRequest>,
) -> Result<Json<Value>, AppError> {
    Caller::from_user(&user)?.require_privileged()?;
    load_practitioner(&state, practitioner_id).await?;

    for (weekday, hours) in &request.days {
        hours.validate().map_err(|e| {
            AppError::ValidationError(format!("{}: {}", weekday, e))
        })?;
    }

    let template = state
        .schedules
        .put_weekly_template(WeeklyTemplate {
            practitioner_id,
            days: request.days,
            updated_at: Utc::now(),
        })
        .await?;

    info!("Weekly template updated for practitioner {}", practitioner_id);
    Ok(Json(json!({ "success": true, "weekly_template": template })))
}

pub async fn set_date_override(
    State(state): State<Arc<PractitionerCellState>>,
    Extension(user): Extension<User>,
    Path((practitioner_id, date)): Path<(Uuid, NaiveDate)>,
    Json(request): Json<SetDateOverrideRequest>,
) -> Result<Json<Value>, AppError> {
    Caller::from_user(&user)?.require_privileged()?;
    load_practitioner(&state, practitioner_id).await?;
    request.hours.validate()?;

    let hours = if request.hours.is_open {
        request.hours
    } else {
        OpeningHours::closed()
    };

    let date_override = state
        .schedules
        .put_date_override(DateOverride {
            practitioner_id,
            date,
            hours,
            reason: request.reason,
            created_at: Utc::now(),
        })
        .await?;

    info!("Date override set for practitioner {} on {}", practitioner_id, date);
    Ok(Json(json!({ "success": true, "date_override": date_override })))
}
