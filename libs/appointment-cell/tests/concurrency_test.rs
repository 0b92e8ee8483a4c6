mod common;

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Barrier;

use appointment_cell::models::{AppointmentError, AppointmentStatus, RescheduleRequest};
use appointment_cell::services::{AppointmentRepository, ConflictDetector, ServiceRepository};
use practitioner_cell::models::{BlockScope, TimeInterval};
use practitioner_cell::services::ScheduleRepository;
use shared_models::auth::ActorRole;

use common::{fixture, monday, t, Fixture};

/// Active appointments plus blocked windows must never overlap pairwise.
async fn assert_day_is_consistent(fx: &Fixture) {
    let appointments = fx
        .appointments
        .list_for_practitioner_on(fx.practitioner_id, monday())
        .await
        .unwrap();
    let service_ids: Vec<_> = appointments.iter().filter_map(|a| a.service_id).collect();
    let durations: HashMap<_, _> = fx.services.durations(&service_ids).await.unwrap();
    let detector = ConflictDetector::new(30);

    let mut occupied: Vec<TimeInterval> = appointments
        .iter()
        .filter(|a| a.is_active())
        .map(|a| detector.occupied_interval(a, &durations))
        .collect();
    occupied.extend(
        fx.schedules
            .blocked_windows_on(fx.clinic_id, monday())
            .await
            .unwrap()
            .iter()
            .filter(|w| w.applies_to(fx.practitioner_id, fx.clinic_id))
            .map(|w| w.interval()),
    );

    for (i, a) in occupied.iter().enumerate() {
        for b in &occupied[i + 1..] {
            assert!(!a.overlaps(b), "{} overlaps {}", a, b);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_identical_bookings_one_wins() {
    let fx = Arc::new(fixture().await);
    let contenders = 8;
    let barrier = Arc::new(Barrier::new(contenders));

    let handles = (0..contenders).map(|_| {
        let fx = Arc::clone(&fx);
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            barrier.wait().await;
            fx.book(ActorRole::Patient, &fx.short_service, t(10, 0)).await
        })
    });

    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(AppointmentError::Conflict { .. })))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(conflicts, contenders - 1);

    let stored = fx
        .appointments
        .list_for_practitioner_on(fx.practitioner_id, monday())
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_concurrent_traffic_keeps_day_consistent() {
    let fx = Arc::new(fixture().await);
    fx.block(
        BlockScope::Practitioner { practitioner_id: fx.practitioner_id },
        t(15, 0),
        t(15, 30),
    )
    .await;

    // Staff may book across the whole day, so the only guard is the conflict check
    let starts: Vec<_> = (8..18)
        .flat_map(|h| [t(h, 0), t(h, 15), t(h, 30), t(h, 45)])
        .collect();

    let bookings = starts.iter().enumerate().map(|(i, start)| {
        let fx = Arc::clone(&fx);
        let start = *start;
        tokio::spawn(async move {
            let service = if i % 3 == 0 { &fx.long_service } else { &fx.short_service };
            fx.book(ActorRole::Staff, service, start).await
        })
    });
    let booked: Vec<_> = join_all(bookings)
        .await
        .into_iter()
        .filter_map(|joined| joined.unwrap().ok())
        .collect();
    assert!(!booked.is_empty());
    assert_day_is_consistent(&fx).await;

    // Staff move every booked appointment onto the same early slot, outside open hours
    for appointment in &booked {
        fx.coordinator
            .request_reschedule(
                appointment.id,
                RescheduleRequest {
                    date: Some(monday()),
                    start_time: Some(t(7, 0)),
                    service_id: None,
                    practitioner_id: None,
                    notes: None,
                },
                ActorRole::Staff,
            )
            .await
            .unwrap();
    }

    let approvals = booked.iter().map(|appointment| {
        let fx = Arc::clone(&fx);
        let id = appointment.id;
        tokio::spawn(async move { fx.coordinator.approve_reschedule(id, ActorRole::Staff).await })
    });
    let approved = join_all(approvals)
        .await
        .into_iter()
        .filter(|joined| matches!(joined, Ok(Ok(_))))
        .count();

    assert_eq!(approved, 1);
    assert_day_is_consistent(&fx).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_cancel_approvals_one_wins() {
    let fx = Arc::new(fixture().await);
    let appointment = fx.book(ActorRole::Staff, &fx.short_service, t(10, 0)).await.unwrap();
    fx.coordinator
        .request_cancel(appointment.id, "Moving away".to_string(), ActorRole::Patient)
        .await
        .unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let approvals = (0..2).map(|_| {
        let fx = Arc::clone(&fx);
        let barrier = Arc::clone(&barrier);
        let id = appointment.id;
        tokio::spawn(async move {
            barrier.wait().await;
            fx.coordinator.approve_cancel(id, ActorRole::Staff).await
        })
    });
    let results: Vec<_> = join_all(approvals)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(AppointmentError::InvalidStateTransition { .. })))
            .count(),
        1
    );
    let stored = fx.coordinator.get_appointment(appointment.id).await.unwrap();
    assert_eq!(stored.status(), AppointmentStatus::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_reschedule_approvals_one_wins() {
    let fx = Arc::new(fixture().await);
    let appointment = fx.book(ActorRole::Staff, &fx.short_service, t(10, 0)).await.unwrap();
    fx.coordinator
        .request_reschedule(
            appointment.id,
            RescheduleRequest {
                date: Some(monday()),
                start_time: Some(t(14, 0)),
                service_id: None,
                practitioner_id: None,
                notes: None,
            },
            ActorRole::Patient,
        )
        .await
        .unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let approvals = (0..2).map(|_| {
        let fx = Arc::clone(&fx);
        let barrier = Arc::clone(&barrier);
        let id = appointment.id;
        tokio::spawn(async move {
            barrier.wait().await;
            fx.coordinator.approve_reschedule(id, ActorRole::Staff).await
        })
    });
    let results: Vec<_> = join_all(approvals)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(AppointmentError::InvalidStateTransition { .. })))
            .count(),
        1
    );
    let stored = fx.coordinator.get_appointment(appointment.id).await.unwrap();
    assert_eq!(stored.status(), AppointmentStatus::Confirmed);
    assert_eq!(stored.start_time, t(14, 0));
    assert_day_is_consistent(&fx).await;
}
