use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use appointment_cell::models::{Appointment, AppointmentState, ConflictSource};
use appointment_cell::services::{ConflictDetector, DaySnapshot};
use practitioner_cell::models::{BlockScope, BlockedWindow, TimeInterval};

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
}

struct Clinic {
    clinic_id: Uuid,
    practitioner_id: Uuid,
    service_id: Uuid,
}

impl Clinic {
    fn new() -> Self {
        Self {
            clinic_id: Uuid::new_v4(),
            practitioner_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
        }
    }

    fn appointment(&self, start: NaiveTime, state: AppointmentState) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            practitioner_id: self.practitioner_id,
            clinic_id: self.clinic_id,
            service_id: Some(self.service_id),
            date: day(),
            start_time: start,
            notes: None,
            state,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
        }
    }

    fn window(&self, scope: BlockScope, start: NaiveTime, end: NaiveTime) -> BlockedWindow {
        BlockedWindow {
            id: Uuid::new_v4(),
            clinic_id: self.clinic_id,
            scope,
            date: day(),
            start_time: start,
            end_time: end,
            reason: "Sterilisation".to_string(),
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    fn snapshot(&self, appointments: Vec<Appointment>, blocked_windows: Vec<BlockedWindow>) -> DaySnapshot {
        DaySnapshot {
            appointments,
            blocked_windows,
            service_durations: HashMap::from([(self.service_id, 30)]),
        }
    }
}

#[test]
fn test_touching_intervals_are_free() {
    let clinic = Clinic::new();
    let detector = ConflictDetector::new(30);
    let snapshot = clinic.snapshot(vec![clinic.appointment(t(10, 0), AppointmentState::Confirmed)], vec![]);

    let before = TimeInterval::on_date(day(), t(9, 30), t(10, 0));
    let after = TimeInterval::on_date(day(), t(10, 30), t(11, 0));
    let inside = TimeInterval::on_date(day(), t(10, 15), t(10, 45));

    assert!(!detector.has_conflict(clinic.practitioner_id, clinic.clinic_id, &before, &snapshot, None));
    assert!(!detector.has_conflict(clinic.practitioner_id, clinic.clinic_id, &after, &snapshot, None));
    assert!(detector.has_conflict(clinic.practitioner_id, clinic.clinic_id, &inside, &snapshot, None));
}

#[test]
fn test_only_active_appointments_occupy_time() {
    let clinic = Clinic::new();
    let detector = ConflictDetector::new(30);
    let candidate = TimeInterval::on_date(day(), t(10, 0), t(10, 30));

    let cancel_requested = AppointmentState::CancelRequested {
        reason: "Sick".to_string(),
        resume_to: appointment_cell::models::AppointmentStatus::Confirmed,
    };
    for state in [AppointmentState::Pending, AppointmentState::Waiting, cancel_requested] {
        let snapshot = clinic.snapshot(vec![clinic.appointment(t(10, 0), state)], vec![]);
        assert!(detector.has_conflict(clinic.practitioner_id, clinic.clinic_id, &candidate, &snapshot, None));
    }

    for state in [AppointmentState::Cancelled, AppointmentState::Completed, AppointmentState::Missed] {
        let snapshot = clinic.snapshot(vec![clinic.appointment(t(10, 0), state)], vec![]);
        assert!(!detector.has_conflict(clinic.practitioner_id, clinic.clinic_id, &candidate, &snapshot, None));
    }
}

#[test]
fn test_excluded_appointment_is_ignored() {
    let clinic = Clinic::new();
    let detector = ConflictDetector::new(30);
    let existing = clinic.appointment(t(10, 0), AppointmentState::Confirmed);
    let existing_id = existing.id;
    let snapshot = clinic.snapshot(vec![existing], vec![]);
    let candidate = TimeInterval::on_date(day(), t(10, 15), t(10, 45));

    assert!(detector.has_conflict(clinic.practitioner_id, clinic.clinic_id, &candidate, &snapshot, None));
    assert!(!detector.has_conflict(
        clinic.practitioner_id,
        clinic.clinic_id,
        &candidate,
        &snapshot,
        Some(existing_id)
    ));
}

#[test]
fn test_other_practitioners_do_not_conflict() {
    let clinic = Clinic::new();
    let detector = ConflictDetector::new(30);
    let snapshot = clinic.snapshot(vec![clinic.appointment(t(10, 0), AppointmentState::Confirmed)], vec![]);
    let candidate = TimeInterval::on_date(day(), t(10, 0), t(10, 30));

    assert!(!detector.has_conflict(Uuid::new_v4(), clinic.clinic_id, &candidate, &snapshot, None));
}

#[test]
fn test_blocked_window_scopes() {
    let clinic = Clinic::new();
    let detector = ConflictDetector::new(30);
    let colleague = Uuid::new_v4();
    let candidate = TimeInterval::on_date(day(), t(14, 0), t(14, 30));

    let snapshot = clinic.snapshot(
        vec![],
        vec![clinic.window(BlockScope::Practitioner { practitioner_id: colleague }, t(14, 0), t(15, 0))],
    );
    assert!(!detector.has_conflict(clinic.practitioner_id, clinic.clinic_id, &candidate, &snapshot, None));
    assert!(detector.has_conflict(colleague, clinic.clinic_id, &candidate, &snapshot, None));

    let snapshot = clinic.snapshot(vec![], vec![clinic.window(BlockScope::ClinicWide, t(13, 45), t(14, 15))]);
    let conflicts = detector.find_conflicts(clinic.practitioner_id, clinic.clinic_id, &candidate, &snapshot, None);
    assert_eq!(conflicts.len(), 1);
    assert!(matches!(conflicts[0].source, ConflictSource::BlockedWindow { .. }));
    assert_eq!(conflicts[0].interval, TimeInterval::on_date(day(), t(13, 45), t(14, 15)));

    // A clinic-wide window from another clinic never applies
    assert!(!detector.has_conflict(clinic.practitioner_id, Uuid::new_v4(), &candidate, &snapshot, None));
}

#[test]
fn test_unknown_service_uses_default_duration() {
    let clinic = Clinic::new();
    let detector = ConflictDetector::new(50);
    let mut legacy = clinic.appointment(t(9, 0), AppointmentState::Confirmed);
    legacy.service_id = None;

    let interval = detector.occupied_interval(&legacy, &HashMap::new());
    assert_eq!(interval.end.time(), t(9, 50));

    let known = clinic.appointment(t(9, 0), AppointmentState::Confirmed);
    let durations = HashMap::from([(clinic.service_id, 30)]);
    assert_eq!(detector.duration_of(&known, &durations), 30);
}
