// libs/appointment-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use practitioner_cell::models::{ScheduleError, TimeInterval};

// ==============================================================================
// APPOINTMENTS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Waiting,
    RescheduleRequested,
    CancelRequested,
    Completed,
    Missed,
    Cancelled,
}

impl AppointmentStatus {
    /// Active appointments hold their interval against new bookings.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Pending
                | AppointmentStatus::Confirmed
                | AppointmentStatus::Waiting
                | AppointmentStatus::RescheduleRequested
                | AppointmentStatus::CancelRequested
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Missed | AppointmentStatus::Cancelled
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Waiting => write!(f, "waiting"),
            AppointmentStatus::RescheduleRequested => write!(f, "reschedule_requested"),
            AppointmentStatus::CancelRequested => write!(f, "cancel_requested"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Missed => write!(f, "missed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Proposed new slot held while a reschedule waits for staff approval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RescheduleProposal {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub service_id: Uuid,
    pub practitioner_id: Uuid,
    pub clinic_id: Uuid,
    pub notes: Option<String>,
    pub requested_at: DateTime<Utc>,
}

/// Lifecycle state. Pending request data only exists while the request is open.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AppointmentState {
    Pending,
    Confirmed,
    Waiting,
    RescheduleRequested { proposal: RescheduleProposal },
    CancelRequested {
        reason: String,
        resume_to: AppointmentStatus,
    },
    Completed,
    Missed,
    Cancelled,
}

impl AppointmentState {
    pub fn status(&self) -> AppointmentStatus {
        match self {
            AppointmentState::Pending => AppointmentStatus::Pending,
            AppointmentState::Confirmed => AppointmentStatus::Confirmed,
            AppointmentState::Waiting => AppointmentStatus::Waiting,
            AppointmentState::RescheduleRequested { .. } => AppointmentStatus::RescheduleRequested,
            AppointmentState::CancelRequested { .. } => AppointmentStatus::CancelRequested,
            AppointmentState::Completed => AppointmentStatus::Completed,
            AppointmentState::Missed => AppointmentStatus::Missed,
            AppointmentState::Cancelled => AppointmentStatus::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub practitioner_id: Uuid,
    pub clinic_id: Uuid,
    /// Older records may have lost their service reference.
    pub service_id: Option<Uuid>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub notes: Option<String>,
    #[serde(flatten)]
    pub state: AppointmentState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Appointment {
    pub fn status(&self) -> AppointmentStatus {
        self.state.status()
    }

    pub fn is_active(&self) -> bool {
        self.status().is_active()
    }

    pub fn slot_key(&self) -> (Uuid, NaiveDate) {
        (self.practitioner_id, self.date)
    }

    pub fn proposal(&self) -> Option<&RescheduleProposal> {
        match &self.state {
            AppointmentState::RescheduleRequested { proposal } => Some(proposal),
            _ => None,
        }
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        match &self.state {
            AppointmentState::CancelRequested { reason, .. } => Some(reason),
            _ => None,
        }
    }

    pub fn interval(&self, duration_minutes: u32) -> TimeInterval {
        TimeInterval::starting_at(self.date, self.start_time, duration_minutes)
    }
}

// ==============================================================================
// SERVICE CATALOG
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub name: String,
    pub duration_minutes: u32,
    pub created_at: DateTime<Utc>,
}

// ==============================================================================
// CONFLICTS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictSource {
    Appointment {
        appointment_id: Uuid,
        status: AppointmentStatus,
    },
    BlockedWindow {
        blocked_window_id: Uuid,
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conflict {
    #[serde(flatten)]
    pub source: ConflictSource,
    pub interval: TimeInterval,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

/// Date, time and service are optional on the wire so that missing fields
/// surface as validation errors rather than body rejections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Uuid,
    pub practitioner_id: Uuid,
    pub clinic_id: Uuid,
    pub service_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleRequest {
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub service_id: Option<Uuid>,
    pub practitioner_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateServiceRequest {
    pub clinic_id: Uuid,
    pub name: String,
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotQuery {
    pub practitioner_id: Uuid,
    pub date: NaiveDate,
    pub duration_minutes: Option<u32>,
    pub service_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextSlotQuery {
    pub practitioner_id: Uuid,
    pub from_date: NaiveDate,
    pub duration_minutes: Option<u32>,
    pub service_id: Option<Uuid>,
    pub max_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheckQuery {
    pub practitioner_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
    pub exclude_appointment_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayQuery {
    pub date: NaiveDate,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Confirm,
    MarkWaiting,
    ReturnToConfirmed,
    Complete,
    MarkMissed,
    Cancel,
    RequestCancel,
    ApproveCancel,
    RejectCancel,
    RequestReschedule,
    ApproveReschedule,
    RejectReschedule,
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleAction::Confirm => "confirm",
            LifecycleAction::MarkWaiting => "mark_waiting",
            LifecycleAction::ReturnToConfirmed => "return_to_confirmed",
            LifecycleAction::Complete => "complete",
            LifecycleAction::MarkMissed => "mark_missed",
            LifecycleAction::Cancel => "cancel",
            LifecycleAction::RequestCancel => "request_cancel",
            LifecycleAction::ApproveCancel => "approve_cancel",
            LifecycleAction::RejectCancel => "reject_cancel",
            LifecycleAction::RequestReschedule => "request_reschedule",
            LifecycleAction::ApproveReschedule => "approve_reschedule",
            LifecycleAction::RejectReschedule => "reject_reschedule",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Requested time conflicts with {} existing reservation(s)", .conflicts.len())]
    Conflict { conflicts: Vec<Conflict> },

    #[error("Appointment not found: {0}")]
    AppointmentNotFound(Uuid),

    #[error("Practitioner not found: {0}")]
    PractitionerNotFound(Uuid),

    #[error("Service not found: {0}")]
    ServiceNotFound(Uuid),

    #[error("Cannot {action} an appointment that is {from}")]
    InvalidStateTransition {
        from: AppointmentStatus,
        action: LifecycleAction,
    },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<ScheduleError> for AppointmentError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::PractitionerNotFound(id) => AppointmentError::PractitionerNotFound(id),
            ScheduleError::InvalidHours(msg) | ScheduleError::Validation(msg) => {
                AppointmentError::Validation(msg)
            }
            ScheduleError::PractitionerExists(id) => {
                AppointmentError::Storage(format!("duplicate practitioner {}", id))
            }
            ScheduleError::Storage(msg) => AppointmentError::Storage(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(state: AppointmentState) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            practitioner_id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            service_id: None,
            date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            start_time: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
            notes: None,
            state,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn test_active_statuses() {
        assert!(AppointmentStatus::Pending.is_active());
        assert!(AppointmentStatus::CancelRequested.is_active());
        assert!(AppointmentStatus::RescheduleRequested.is_active());
        assert!(!AppointmentStatus::Cancelled.is_active());
        assert!(!AppointmentStatus::Missed.is_active());
        assert!(AppointmentStatus::Completed.is_terminal());
    }

    #[test]
    fn test_state_serializes_flat() {
        let appointment = sample(AppointmentState::CancelRequested {
            reason: "Travelling".to_string(),
            resume_to: AppointmentStatus::Confirmed,
        });
        let value = serde_json::to_value(&appointment).unwrap();

        assert_eq!(value["status"], json!("cancel_requested"));
        assert_eq!(value["reason"], json!("Travelling"));
        assert_eq!(value["resume_to"], json!("confirmed"));
        assert_eq!(appointment.cancellation_reason(), Some("Travelling"));
        assert!(appointment.proposal().is_none());
    }

    #[test]
    fn test_interval_uses_duration() {
        let appointment = sample(AppointmentState::Confirmed);
        let interval = appointment.interval(45);
        assert_eq!(interval.duration_minutes(), 45);
        assert_eq!(interval.end.time(), NaiveTime::from_hms_opt(11, 15, 0).unwrap());
    }
}
