// libs/appointment-cell/src/services/conflict.rs
use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use practitioner_cell::models::{BlockedWindow, TimeInterval};

use crate::models::{Appointment, Conflict, ConflictSource};

/// Everything that can occupy a practitioner's day, read in one pass.
#[derive(Debug, Clone, Default)]
pub struct DaySnapshot {
    pub appointments: Vec<Appointment>,
    /// Clinic-wide and practitioner windows at the practitioner's clinic.
    pub blocked_windows: Vec<BlockedWindow>,
    pub service_durations: HashMap<Uuid, u32>,
}

/// Interval overlap checks against active appointments and blocked windows.
#[derive(Debug, Clone, Copy)]
pub struct ConflictDetector {
    default_duration_minutes: u32,
}

impl ConflictDetector {
    pub fn new(default_duration_minutes: u32) -> Self {
        Self {
            default_duration_minutes: default_duration_minutes.max(1),
        }
    }

    /// Duration of the appointment's service, or the configured default when
    /// the service reference is missing or no longer in the catalog.
    pub fn duration_of(&self, appointment: &Appointment, durations: &HashMap<Uuid, u32>) -> u32 {
        appointment
            .service_id
            .and_then(|id| durations.get(&id).copied())
            .unwrap_or(self.default_duration_minutes)
    }

    pub fn occupied_interval(&self, appointment: &Appointment, durations: &HashMap<Uuid, u32>) -> TimeInterval {
        appointment.interval(self.duration_of(appointment, durations))
    }

    pub fn find_conflicts(
        &self,
        practitioner_id: Uuid,
        clinic_id: Uuid,
        candidate: &TimeInterval,
        snapshot: &DaySnapshot,
        exclude_appointment_id: Option<Uuid>,
    ) -> Vec<Conflict> {
        let mut conflicts: Vec<Conflict> = snapshot
            .appointments
            .iter()
            .filter(|a| a.practitioner_id == practitioner_id)
            .filter(|a| a.is_active())
            .filter(|a| Some(a.id) != exclude_appointment_id)
            .filter_map(|a| {
                let interval = self.occupied_interval(a, &snapshot.service_durations);
                candidate.overlaps(&interval).then(|| Conflict {
                    source: ConflictSource::Appointment {
                        appointment_id: a.id,
                        status: a.status(),
                    },
                    interval,
                })
            })
            .collect();

        conflicts.extend(
            snapshot
                .blocked_windows
                .iter()
                .filter(|w| w.applies_to(practitioner_id, clinic_id))
                .filter(|w| candidate.overlaps(&w.interval()))
                .map(|w| Conflict {
                    source: ConflictSource::BlockedWindow {
                        blocked_window_id: w.id,
                        reason: w.reason.clone(),
                    },
                    interval: w.interval(),
                }),
        );

        if !conflicts.is_empty() {
            debug!(
                "Candidate {} for practitioner {} hits {} conflict(s)",
                candidate,
                practitioner_id,
                conflicts.len()
            );
        }

        conflicts
    }

    pub fn has_conflict(
        &self,
        practitioner_id: Uuid,
        clinic_id: Uuid,
        candidate: &TimeInterval,
        snapshot: &DaySnapshot,
        exclude_appointment_id: Option<Uuid>,
    ) -> bool {
        !self
            .find_conflicts(practitioner_id, clinic_id, candidate, snapshot, exclude_appointment_id)
            .is_empty()
    }
}
