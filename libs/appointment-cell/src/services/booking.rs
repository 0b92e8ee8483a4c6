// libs/appointment-cell/src/services/booking.rs
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use practitioner_cell::models::{
    BlockScope, BlockedWindow, CreateBlockedWindowRequest, Practitioner, TimeInterval, TimeSlot,
};
use practitioner_cell::services::{AvailabilityResolver, ScheduleRepository, SlotGenerator};
use shared_config::SchedulingConfig;
use shared_models::auth::ActorRole;

use crate::models::{
    Appointment, AppointmentError, AppointmentState, BookAppointmentRequest, Conflict,
    ConflictSource, CreateServiceRequest, RescheduleProposal, RescheduleRequest, Service,
};
use crate::services::conflict::{ConflictDetector, DaySnapshot};
use crate::services::lifecycle::{AppointmentLifecycle, LifecycleCommand};
use crate::services::locks::{SlotGuard, SlotLocks};
use crate::services::store::{AppointmentRepository, ServiceRepository};

/// Longest forward scan accepted by `find_next_available_slot`.
pub const MAX_SEARCH_DAYS: u32 = 90;

/// Owns every mutation of appointments. Conflict reads and the writes that
/// depend on them happen under the (practitioner, date) guard.
pub struct BookingCoordinator {
    config: SchedulingConfig,
    schedules: Arc<dyn ScheduleRepository>,
    services: Arc<dyn ServiceRepository>,
    appointments: Arc<dyn AppointmentRepository>,
    resolver: AvailabilityResolver,
    slot_generator: SlotGenerator,
    detector: ConflictDetector,
    lifecycle: AppointmentLifecycle,
    locks: SlotLocks,
}

impl BookingCoordinator {
    pub fn new(
        config: SchedulingConfig,
        schedules: Arc<dyn ScheduleRepository>,
        services: Arc<dyn ServiceRepository>,
        appointments: Arc<dyn AppointmentRepository>,
    ) -> Self {
        Self {
            resolver: AvailabilityResolver::new(Arc::clone(&schedules)),
            slot_generator: SlotGenerator::new(config.slot_granularity_minutes),
            detector: ConflictDetector::new(config.default_service_duration_minutes),
            lifecycle: AppointmentLifecycle::new(),
            locks: SlotLocks::new(),
            config,
            schedules,
            services,
            appointments,
        }
    }

    pub fn config(&self) -> &SchedulingConfig {
        &self.config
    }

    // ==========================================================================
    // LOOKUPS
    // ==========================================================================

    async fn practitioner(&self, practitioner_id: Uuid) -> Result<Practitioner, AppointmentError> {
        self.schedules
            .get_practitioner(practitioner_id)
            .await?
            .ok_or(AppointmentError::PractitionerNotFound(practitioner_id))
    }

    pub async fn service(&self, service_id: Uuid) -> Result<Service, AppointmentError> {
        self.services
            .get_service(service_id)
            .await?
            .ok_or(AppointmentError::ServiceNotFound(service_id))
    }

    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.appointments
            .get(appointment_id)
            .await?
            .ok_or(AppointmentError::AppointmentNotFound(appointment_id))
    }

    pub async fn list_practitioner_appointments(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.practitioner(practitioner_id).await?;
        self.appointments.list_for_practitioner_on(practitioner_id, date).await
    }

    pub async fn list_patient_appointments(&self, patient_id: Uuid) -> Result<Vec<Appointment>, AppointmentError> {
        self.appointments.list_for_patient(patient_id).await
    }

    pub async fn add_service(&self, request: CreateServiceRequest) -> Result<Service, AppointmentError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(AppointmentError::Validation("Service name is required".to_string()));
        }
        if request.duration_minutes == 0 || request.duration_minutes > 24 * 60 {
            return Err(AppointmentError::Validation(
                "Service duration must be between 1 and 1440 minutes".to_string(),
            ));
        }

        let service = self
            .services
            .add_service(Service {
                id: Uuid::new_v4(),
                clinic_id: request.clinic_id,
                name: name.to_string(),
                duration_minutes: request.duration_minutes,
                created_at: Utc::now(),
            })
            .await?;

        info!("Service {} ({} min) added to clinic {}", service.id, service.duration_minutes, service.clinic_id);
        Ok(service)
    }

    /// Adds a blocked window while holding the (practitioner, date) guard of
    /// every practitioner it covers. Windows may not cover active appointments.
    #[instrument(skip(self, request))]
    pub async fn add_blocked_window(
        &self,
        practitioner_id: Uuid,
        request: CreateBlockedWindowRequest,
        created_by: Uuid,
    ) -> Result<BlockedWindow, AppointmentError> {
        if request.start_time >= request.end_time {
            return Err(AppointmentError::Validation(
                "Blocked window start must be before its end".to_string(),
            ));
        }
        let reason = request.reason.trim();
        if reason.is_empty() {
            return Err(AppointmentError::Validation("A reason is required".to_string()));
        }

        let practitioner = self.practitioner(practitioner_id).await?;
        let (scope, covered) = if request.clinic_wide {
            let colleagues = self.schedules.practitioners_at(practitioner.clinic_id).await?;
            (BlockScope::ClinicWide, colleagues)
        } else {
            (BlockScope::Practitioner { practitioner_id }, vec![practitioner.clone()])
        };

        let window = BlockedWindow {
            id: Uuid::new_v4(),
            clinic_id: practitioner.clinic_id,
            scope,
            date: request.date,
            start_time: request.start_time,
            end_time: request.end_time,
            reason: reason.to_string(),
            created_by,
            created_at: Utc::now(),
        };
        let interval = window.interval();

        let keys = covered.iter().map(|p| (p.id, window.date)).collect();
        let _guard = self.locks.acquire_all(keys).await;

        let mut conflicts = Vec::new();
        for colleague in &covered {
            let snapshot = self.snapshot(colleague.id, colleague.clinic_id, window.date).await?;
            conflicts.extend(
                self.detector
                    .find_conflicts(colleague.id, colleague.clinic_id, &interval, &snapshot, None)
                    .into_iter()
                    .filter(|c| matches!(c.source, ConflictSource::Appointment { .. })),
            );
        }
        if !conflicts.is_empty() {
            warn!("Blocked window {} rejected: {} appointment(s) in the way", interval, conflicts.len());
            return Err(AppointmentError::Conflict { conflicts });
        }

        let window = self.schedules.add_blocked_window(window).await?;
        info!("Blocked window {} created for {} ({:?})", window.id, interval, window.scope);
        Ok(window)
    }

    async fn snapshot(
        &self,
        practitioner_id: Uuid,
        clinic_id: Uuid,
        date: NaiveDate,
    ) -> Result<DaySnapshot, AppointmentError> {
        let appointments = self.appointments.list_for_practitioner_on(practitioner_id, date).await?;
        let blocked_windows = self.schedules.blocked_windows_on(clinic_id, date).await?;

        let service_ids: Vec<Uuid> = appointments
            .iter()
            .filter_map(|a| a.service_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let service_durations = self.services.durations(&service_ids).await?;

        Ok(DaySnapshot {
            appointments,
            blocked_windows,
            service_durations,
        })
    }

    async fn duration_of(&self, appointment: &Appointment) -> Result<u32, AppointmentError> {
        let ids: Vec<Uuid> = appointment.service_id.into_iter().collect();
        let durations = self.services.durations(&ids).await?;
        Ok(self.detector.duration_of(appointment, &durations))
    }

    /// Intervals may end exactly at midnight but never spill into the next day.
    fn interval_on(
        &self,
        date: NaiveDate,
        start_time: NaiveTime,
        duration_minutes: u32,
    ) -> Result<TimeInterval, AppointmentError> {
        if duration_minutes == 0 {
            return Err(AppointmentError::Validation(
                "Duration must be positive".to_string(),
            ));
        }
        let interval = TimeInterval::starting_at(date, start_time, duration_minutes);
        let day_end = date
            .succ_opt()
            .ok_or_else(|| AppointmentError::Validation(format!("{} is out of range", date)))?
            .and_time(NaiveTime::MIN);
        if interval.end > day_end {
            return Err(AppointmentError::Validation(
                "Appointment must end on the day it starts".to_string(),
            ));
        }
        Ok(interval)
    }

    async fn ensure_within_open_hours(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
        interval: &TimeInterval,
    ) -> Result<(), AppointmentError> {
        let availability = self.resolver.resolve(practitioner_id, date).await?;
        let within_hours = availability.window().is_some_and(|open| open.contains(interval));
        let hits_break = self
            .config
            .break_window
            .is_some_and(|b| interval.overlaps(&TimeInterval::on_date(date, b.start, b.end)));

        if within_hours && !hits_break {
            Ok(())
        } else {
            Err(AppointmentError::Validation(format!(
                "{} is outside the practitioner's bookable hours",
                interval
            )))
        }
    }

    // ==========================================================================
    // SLOT QUERIES (advisory, unlocked)
    // ==========================================================================

    /// `now` is clinic-local wall time.
    pub async fn get_available_slots(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
        duration_minutes: u32,
        now: NaiveDateTime,
    ) -> Result<Vec<TimeSlot>, AppointmentError> {
        if duration_minutes == 0 {
            return Err(AppointmentError::Validation(
                "Duration must be positive".to_string(),
            ));
        }

        let practitioner = self.practitioner(practitioner_id).await?;
        let availability = self.resolver.resolve(practitioner_id, date).await?;
        let candidates =
            self.slot_generator
                .generate(&availability, duration_minutes, self.config.break_window, now);
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let snapshot = self.snapshot(practitioner_id, practitioner.clinic_id, date).await?;
        let slots: Vec<TimeSlot> = candidates
            .into_iter()
            .filter(|slot| {
                !self.detector.has_conflict(
                    practitioner_id,
                    practitioner.clinic_id,
                    &slot.interval(),
                    &snapshot,
                    None,
                )
            })
            .collect();

        debug!("{} free slots for practitioner {} on {}", slots.len(), practitioner_id, date);
        Ok(slots)
    }

    pub async fn check_conflicts(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        duration_minutes: u32,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<Vec<Conflict>, AppointmentError> {
        let practitioner = self.practitioner(practitioner_id).await?;
        let interval = self.interval_on(date, start_time, duration_minutes)?;
        let snapshot = self.snapshot(practitioner_id, practitioner.clinic_id, date).await?;
        Ok(self.detector.find_conflicts(
            practitioner_id,
            practitioner.clinic_id,
            &interval,
            &snapshot,
            exclude_appointment_id,
        ))
    }

    /// Free slots on the same day, closest to the requested start first.
    pub async fn suggest_alternatives(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
        around: NaiveTime,
        duration_minutes: u32,
        now: NaiveDateTime,
        limit: usize,
    ) -> Result<Vec<TimeSlot>, AppointmentError> {
        let mut slots = self
            .get_available_slots(practitioner_id, date, duration_minutes, now)
            .await?;
        slots.sort_by_key(|slot| (slot.start_time - around).num_minutes().abs());
        slots.truncate(limit);
        slots.sort_by_key(|slot| slot.start_time);
        Ok(slots)
    }

    pub async fn find_next_available_slot(
        &self,
        practitioner_id: Uuid,
        from_date: NaiveDate,
        duration_minutes: u32,
        max_days: u32,
        now: NaiveDateTime,
    ) -> Result<Option<TimeSlot>, AppointmentError> {
        if max_days == 0 || max_days > MAX_SEARCH_DAYS {
            return Err(AppointmentError::Validation(format!(
                "max_days must be between 1 and {}",
                MAX_SEARCH_DAYS
            )));
        }

        let start = from_date.max(now.date());
        for offset in 0..max_days {
            let date = start + Duration::days(i64::from(offset));
            let slots = self
                .get_available_slots(practitioner_id, date, duration_minutes, now)
                .await?;
            if let Some(slot) = slots.into_iter().next() {
                return Ok(Some(slot));
            }
        }

        debug!(
            "No free slot for practitioner {} within {} days of {}",
            practitioner_id, max_days, start
        );
        Ok(None)
    }

    // ==========================================================================
    // BOOKING
    // ==========================================================================

    /// Patients land in `pending` and must stay within open hours; staff and
    /// owners land in `confirmed` and may book outside them.
    #[instrument(skip(self, request), fields(practitioner_id = %request.practitioner_id, patient_id = %request.patient_id))]
    pub async fn book(
        &self,
        request: BookAppointmentRequest,
        actor: ActorRole,
    ) -> Result<Appointment, AppointmentError> {
        let service_id = request
            .service_id
            .ok_or_else(|| AppointmentError::Validation("service_id is required".to_string()))?;
        let date = request
            .date
            .ok_or_else(|| AppointmentError::Validation("date is required".to_string()))?;
        let start_time = request
            .start_time
            .ok_or_else(|| AppointmentError::Validation("start_time is required".to_string()))?;

        let practitioner = self.practitioner(request.practitioner_id).await?;
        if practitioner.clinic_id != request.clinic_id {
            return Err(AppointmentError::Validation(
                "Practitioner does not work at this clinic".to_string(),
            ));
        }
        let service = self.service(service_id).await?;
        if service.clinic_id != request.clinic_id {
            return Err(AppointmentError::Validation(
                "Service is not offered at this clinic".to_string(),
            ));
        }

        let interval = self.interval_on(date, start_time, service.duration_minutes)?;
        if !actor.is_privileged() {
            self.ensure_within_open_hours(practitioner.id, date, &interval).await?;
        }

        let _guard = self.locks.acquire((practitioner.id, date)).await;

        let snapshot = self.snapshot(practitioner.id, practitioner.clinic_id, date).await?;
        let conflicts =
            self.detector
                .find_conflicts(practitioner.id, practitioner.clinic_id, &interval, &snapshot, None);
        if !conflicts.is_empty() {
            warn!("Booking {} rejected: {} conflict(s)", interval, conflicts.len());
            return Err(AppointmentError::Conflict { conflicts });
        }

        let now = Utc::now();
        let state = if actor.is_privileged() {
            AppointmentState::Confirmed
        } else {
            AppointmentState::Pending
        };

        let appointment = self
            .appointments
            .insert(Appointment {
                id: Uuid::new_v4(),
                patient_id: request.patient_id,
                practitioner_id: practitioner.id,
                clinic_id: practitioner.clinic_id,
                service_id: Some(service.id),
                date,
                start_time,
                notes: request.notes,
                state,
                created_at: now,
                updated_at: now,
                completed_at: None,
            })
            .await?;

        info!(
            "Appointment {} booked for {} as {}",
            appointment.id,
            interval,
            appointment.status()
        );
        Ok(appointment)
    }

    // ==========================================================================
    // LIFECYCLE
    // ==========================================================================

    /// Locks the appointment's current (practitioner, date) and returns a fresh
    /// read taken under that guard.
    async fn lock_appointment(&self, appointment_id: Uuid) -> Result<(SlotGuard, Appointment), AppointmentError> {
        loop {
            let seen = self.get_appointment(appointment_id).await?;
            let guard = self.locks.acquire(seen.slot_key()).await;
            let current = self.get_appointment(appointment_id).await?;
            if guard.covers(&current.slot_key()) {
                return Ok((guard, current));
            }
            debug!("Appointment {} moved while locking, retrying", appointment_id);
        }
    }

    async fn transition(
        &self,
        appointment_id: Uuid,
        command: LifecycleCommand,
        actor: ActorRole,
    ) -> Result<Appointment, AppointmentError> {
        let action = command.action();
        let (_guard, current) = self.lock_appointment(appointment_id).await?;

        let updated = self.lifecycle.apply(&current, command, actor, Utc::now())?;
        let saved = self.appointments.update(updated).await?;

        info!(
            "Appointment {} {}: {} -> {}",
            appointment_id,
            action,
            current.status(),
            saved.status()
        );
        Ok(saved)
    }

    #[instrument(skip(self, request))]
    pub async fn request_reschedule(
        &self,
        appointment_id: Uuid,
        request: RescheduleRequest,
        actor: ActorRole,
    ) -> Result<Appointment, AppointmentError> {
        let date = request
            .date
            .ok_or_else(|| AppointmentError::Validation("date is required".to_string()))?;
        let start_time = request
            .start_time
            .ok_or_else(|| AppointmentError::Validation("start_time is required".to_string()))?;

        let current = self.get_appointment(appointment_id).await?;

        let practitioner = self
            .practitioner(request.practitioner_id.unwrap_or(current.practitioner_id))
            .await?;
        if practitioner.clinic_id != current.clinic_id {
            return Err(AppointmentError::Validation(
                "Appointments cannot move between clinics".to_string(),
            ));
        }

        let service_id = request
            .service_id
            .or(current.service_id)
            .ok_or_else(|| AppointmentError::Validation("service_id is required".to_string()))?;
        let service = self.service(service_id).await?;
        let interval = self.interval_on(date, start_time, service.duration_minutes)?;
        if !actor.is_privileged() {
            self.ensure_within_open_hours(practitioner.id, date, &interval).await?;
        }

        let proposal = RescheduleProposal {
            date,
            start_time,
            service_id: service.id,
            practitioner_id: practitioner.id,
            clinic_id: practitioner.clinic_id,
            notes: request.notes,
            requested_at: Utc::now(),
        };

        self.transition(appointment_id, LifecycleCommand::RequestReschedule { proposal }, actor)
            .await
    }

    /// Moves the appointment onto its proposal after re-checking the proposed
    /// interval with both the current and target days locked. A proposal that
    /// now conflicts is discarded and the appointment stays `confirmed` on its
    /// original interval before the conflict is returned.
    #[instrument(skip(self))]
    pub async fn approve_reschedule(
        &self,
        appointment_id: Uuid,
        actor: ActorRole,
    ) -> Result<Appointment, AppointmentError> {
        loop {
            let seen = self.get_appointment(appointment_id).await?;
            let mut keys = vec![seen.slot_key()];
            if let Some(proposal) = seen.proposal() {
                keys.push((proposal.practitioner_id, proposal.date));
            }

            let guard = self.locks.acquire_all(keys).await;
            let current = self.get_appointment(appointment_id).await?;
            let target_locked = current
                .proposal()
                .map_or(true, |p| guard.covers(&(p.practitioner_id, p.date)));
            if !guard.covers(&current.slot_key()) || !target_locked {
                debug!("Appointment {} changed while locking, retrying", appointment_id);
                continue;
            }

            let updated = self.lifecycle.apply(
                &current,
                LifecycleCommand::ApproveReschedule,
                actor,
                Utc::now(),
            )?;

            let interval = updated.interval(self.duration_of(&updated).await?);
            let snapshot = self
                .snapshot(updated.practitioner_id, updated.clinic_id, updated.date)
                .await?;
            let conflicts = self.detector.find_conflicts(
                updated.practitioner_id,
                updated.clinic_id,
                &interval,
                &snapshot,
                Some(appointment_id),
            );
            if !conflicts.is_empty() {
                warn!(
                    "Reschedule of {} to {} rejected: {} conflict(s)",
                    appointment_id,
                    interval,
                    conflicts.len()
                );
                let restored = self.lifecycle.apply(
                    &current,
                    LifecycleCommand::RejectReschedule,
                    actor,
                    Utc::now(),
                )?;
                self.appointments.update(restored).await?;
                return Err(AppointmentError::Conflict { conflicts });
            }

            let saved = self.appointments.update(updated).await?;
            info!("Appointment {} rescheduled to {}", appointment_id, interval);
            return Ok(saved);
        }
    }

    pub async fn reject_reschedule(&self, appointment_id: Uuid, actor: ActorRole) -> Result<Appointment, AppointmentError> {
        self.transition(appointment_id, LifecycleCommand::RejectReschedule, actor)
            .await
    }

    #[instrument(skip(self, reason))]
    pub async fn request_cancel(
        &self,
        appointment_id: Uuid,
        reason: String,
        actor: ActorRole,
    ) -> Result<Appointment, AppointmentError> {
        self.transition(appointment_id, LifecycleCommand::RequestCancel { reason }, actor)
            .await
    }

    /// The record is kept as `cancelled`; archiving is left to the caller.
    #[instrument(skip(self))]
    pub async fn approve_cancel(&self, appointment_id: Uuid, actor: ActorRole) -> Result<(), AppointmentError> {
        self.transition(appointment_id, LifecycleCommand::ApproveCancel, actor)
            .await
            .map(|_| ())
    }

    pub async fn reject_cancel(&self, appointment_id: Uuid, actor: ActorRole) -> Result<Appointment, AppointmentError> {
        self.transition(appointment_id, LifecycleCommand::RejectCancel, actor)
            .await
    }

    pub async fn confirm(&self, appointment_id: Uuid, actor: ActorRole) -> Result<Appointment, AppointmentError> {
        self.transition(appointment_id, LifecycleCommand::Confirm, actor).await
    }

    pub async fn mark_waiting(&self, appointment_id: Uuid, actor: ActorRole) -> Result<Appointment, AppointmentError> {
        self.transition(appointment_id, LifecycleCommand::MarkWaiting, actor)
            .await
    }

    pub async fn return_to_confirmed(
        &self,
        appointment_id: Uuid,
        actor: ActorRole,
    ) -> Result<Appointment, AppointmentError> {
        self.transition(appointment_id, LifecycleCommand::ReturnToConfirmed, actor)
            .await
    }

    pub async fn complete(&self, appointment_id: Uuid, actor: ActorRole) -> Result<Appointment, AppointmentError> {
        self.transition(appointment_id, LifecycleCommand::Complete, actor).await
    }

    pub async fn mark_missed(&self, appointment_id: Uuid, actor: ActorRole) -> Result<Appointment, AppointmentError> {
        self.transition(appointment_id, LifecycleCommand::MarkMissed, actor)
            .await
    }

    pub async fn cancel(&self, appointment_id: Uuid, actor: ActorRole) -> Result<Appointment, AppointmentError> {
        self.transition(appointment_id, LifecycleCommand::Cancel, actor).await
    }
}
