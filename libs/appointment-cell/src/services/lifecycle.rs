// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use shared_models::auth::ActorRole;

use crate::models::{
    Appointment, AppointmentError, AppointmentState, AppointmentStatus, LifecycleAction,
    RescheduleProposal,
};

/// A lifecycle action together with the data it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleCommand {
    Confirm,
    MarkWaiting,
    ReturnToConfirmed,
    Complete,
    MarkMissed,
    Cancel,
    RequestCancel { reason: String },
    ApproveCancel,
    RejectCancel,
    RequestReschedule { proposal: RescheduleProposal },
    ApproveReschedule,
    RejectReschedule,
}

impl LifecycleCommand {
    pub fn action(&self) -> LifecycleAction {
        match self {
            LifecycleCommand::Confirm => LifecycleAction::Confirm,
            LifecycleCommand::MarkWaiting => LifecycleAction::MarkWaiting,
            LifecycleCommand::ReturnToConfirmed => LifecycleAction::ReturnToConfirmed,
            LifecycleCommand::Complete => LifecycleAction::Complete,
            LifecycleCommand::MarkMissed => LifecycleAction::MarkMissed,
            LifecycleCommand::Cancel => LifecycleAction::Cancel,
            LifecycleCommand::RequestCancel { .. } => LifecycleAction::RequestCancel,
            LifecycleCommand::ApproveCancel => LifecycleAction::ApproveCancel,
            LifecycleCommand::RejectCancel => LifecycleAction::RejectCancel,
            LifecycleCommand::RequestReschedule { .. } => LifecycleAction::RequestReschedule,
            LifecycleCommand::ApproveReschedule => LifecycleAction::ApproveReschedule,
            LifecycleCommand::RejectReschedule => LifecycleAction::RejectReschedule,
        }
    }
}

const ALL_ACTIONS: [LifecycleAction; 12] = [
    LifecycleAction::Confirm,
    LifecycleAction::MarkWaiting,
    LifecycleAction::ReturnToConfirmed,
    LifecycleAction::Complete,
    LifecycleAction::MarkMissed,
    LifecycleAction::Cancel,
    LifecycleAction::RequestCancel,
    LifecycleAction::ApproveCancel,
    LifecycleAction::RejectCancel,
    LifecycleAction::RequestReschedule,
    LifecycleAction::ApproveReschedule,
    LifecycleAction::RejectReschedule,
];

/// The transition table. `None` means the action is not accepted from `state`.
pub fn next_status(state: &AppointmentState, action: LifecycleAction) -> Option<AppointmentStatus> {
    use AppointmentStatus as S;
    use LifecycleAction as A;

    match (state, action) {
        (AppointmentState::Pending, A::Confirm) => Some(S::Confirmed),
        (AppointmentState::Confirmed, A::MarkWaiting) => Some(S::Waiting),
        (AppointmentState::Waiting, A::ReturnToConfirmed) => Some(S::Confirmed),
        (AppointmentState::Confirmed, A::Complete) => Some(S::Completed),
        (AppointmentState::Confirmed, A::MarkMissed) => Some(S::Missed),
        (AppointmentState::Pending | AppointmentState::Confirmed, A::Cancel) => Some(S::Cancelled),
        (AppointmentState::Pending | AppointmentState::Confirmed, A::RequestCancel) => {
            Some(S::CancelRequested)
        }
        (AppointmentState::CancelRequested { .. }, A::ApproveCancel) => Some(S::Cancelled),
        (AppointmentState::CancelRequested { resume_to, .. }, A::RejectCancel) => Some(*resume_to),
        (AppointmentState::Confirmed, A::RequestReschedule) => Some(S::RescheduleRequested),
        (AppointmentState::RescheduleRequested { .. }, A::ApproveReschedule) => Some(S::Confirmed),
        (AppointmentState::RescheduleRequested { .. }, A::RejectReschedule) => Some(S::Confirmed),
        _ => None,
    }
}

/// Request actions may come from the patient; everything else is a staff decision.
pub fn requires_privilege(action: LifecycleAction) -> bool {
    !matches!(
        action,
        LifecycleAction::RequestCancel | LifecycleAction::RequestReschedule
    )
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AppointmentLifecycle;

impl AppointmentLifecycle {
    pub fn new() -> Self {
        Self
    }

    /// Actions the table accepts from the appointment's current state.
    pub fn allowed_actions(&self, state: &AppointmentState) -> Vec<LifecycleAction> {
        ALL_ACTIONS
            .into_iter()
            .filter(|action| next_status(state, *action).is_some())
            .collect()
    }

    /// Applies `command` to a copy of `appointment`. The input is never modified,
    /// so a rejected command leaves the stored record as it was.
    pub fn apply(
        &self,
        appointment: &Appointment,
        command: LifecycleCommand,
        actor: ActorRole,
        now: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        let action = command.action();
        let from = appointment.status();

        if requires_privilege(action) && !actor.is_privileged() {
            warn!("{} may not {} appointment {}", actor, action, appointment.id);
            return Err(AppointmentError::Unauthorized(format!(
                "role {} may not {}",
                actor, action
            )));
        }

        let Some(to) = next_status(&appointment.state, action) else {
            warn!(
                "Rejected {} on appointment {} in status {}",
                action, appointment.id, from
            );
            return Err(AppointmentError::InvalidStateTransition { from, action });
        };

        let mut updated = appointment.clone();
        let state = match command {
            LifecycleCommand::RequestCancel { reason } => {
                let reason = reason.trim();
                if reason.is_empty() {
                    return Err(AppointmentError::Validation(
                        "A cancellation reason is required".to_string(),
                    ));
                }
                AppointmentState::CancelRequested {
                    reason: reason.to_string(),
                    resume_to: from,
                }
            }
            LifecycleCommand::RequestReschedule { proposal } => {
                AppointmentState::RescheduleRequested { proposal }
            }
            LifecycleCommand::ApproveReschedule => {
                if let AppointmentState::RescheduleRequested { proposal } = &appointment.state {
                    updated.date = proposal.date;
                    updated.start_time = proposal.start_time;
                    updated.service_id = Some(proposal.service_id);
                    updated.practitioner_id = proposal.practitioner_id;
                    updated.clinic_id = proposal.clinic_id;
                    if proposal.notes.is_some() {
                        updated.notes = proposal.notes.clone();
                    }
                }
                AppointmentState::Confirmed
            }
            _ => plain_state(to)?,
        };
        updated.state = state;

        if to == AppointmentStatus::Completed {
            updated.completed_at = Some(now);
        }
        updated.updated_at = now;

        debug!("Appointment {}: {} --{}--> {}", appointment.id, from, action, to);
        Ok(updated)
    }
}

fn plain_state(status: AppointmentStatus) -> Result<AppointmentState, AppointmentError> {
    match status {
        AppointmentStatus::Pending => Ok(AppointmentState::Pending),
        AppointmentStatus::Confirmed => Ok(AppointmentState::Confirmed),
        AppointmentStatus::Waiting => Ok(AppointmentState::Waiting),
        AppointmentStatus::Completed => Ok(AppointmentState::Completed),
        AppointmentStatus::Missed => Ok(AppointmentState::Missed),
        AppointmentStatus::Cancelled => Ok(AppointmentState::Cancelled),
        AppointmentStatus::RescheduleRequested | AppointmentStatus::CancelRequested => Err(
            AppointmentError::Storage(format!("{} cannot be entered without request data", status)),
        ),
    }
}
