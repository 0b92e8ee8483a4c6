#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use uuid::Uuid;

use appointment_cell::models::{Appointment, AppointmentError, BookAppointmentRequest, Service};
use appointment_cell::services::{
    BookingCoordinator, InMemoryAppointmentRepository, InMemoryServiceRepository, ServiceRepository,
};
use practitioner_cell::models::{BlockScope, BlockedWindow, OpeningHours, Practitioner, WeeklyTemplate};
use practitioner_cell::services::{InMemoryScheduleRepository, ScheduleRepository};
use shared_config::SchedulingConfig;
use shared_models::auth::ActorRole;

pub fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

// 2025-03-10 is a Monday
pub fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
}

pub fn earlier() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, 1).unwrap().and_time(t(8, 0))
}

pub struct Fixture {
    pub coordinator: Arc<BookingCoordinator>,
    pub schedules: Arc<InMemoryScheduleRepository>,
    pub services: Arc<InMemoryServiceRepository>,
    pub appointments: Arc<InMemoryAppointmentRepository>,
    pub clinic_id: Uuid,
    pub practitioner_id: Uuid,
    pub short_service: Service,
    pub long_service: Service,
}

/// Registers a practitioner open 09:00-17:00 on weekdays.
pub async fn add_practitioner(schedules: &InMemoryScheduleRepository, clinic_id: Uuid) -> Uuid {
    let practitioner_id = Uuid::new_v4();
    schedules
        .register_practitioner(Practitioner {
            id: practitioner_id,
            clinic_id,
            display_name: "Dr. Fixture".to_string(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    let weekdays = [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri];
    schedules
        .put_weekly_template(WeeklyTemplate {
            practitioner_id,
            days: weekdays
                .into_iter()
                .map(|day| (day, OpeningHours::open(t(9, 0), t(17, 0))))
                .collect::<HashMap<_, _>>(),
            updated_at: Utc::now(),
        })
        .await
        .unwrap();

    practitioner_id
}

async fn add_service(services: &InMemoryServiceRepository, clinic_id: Uuid, name: &str, minutes: u32) -> Service {
    services
        .add_service(Service {
            id: Uuid::new_v4(),
            clinic_id,
            name: name.to_string(),
            duration_minutes: minutes,
            created_at: Utc::now(),
        })
        .await
        .unwrap()
}

pub async fn fixture() -> Fixture {
    fixture_with(SchedulingConfig::default()).await
}

pub async fn fixture_with(config: SchedulingConfig) -> Fixture {
    let schedules = Arc::new(InMemoryScheduleRepository::new());
    let services = Arc::new(InMemoryServiceRepository::new());
    let appointments = Arc::new(InMemoryAppointmentRepository::new());

    let clinic_id = Uuid::new_v4();
    let practitioner_id = add_practitioner(&schedules, clinic_id).await;
    let short_service = add_service(&services, clinic_id, "Check-up", 30).await;
    let long_service = add_service(&services, clinic_id, "Filling", 60).await;

    let coordinator = Arc::new(BookingCoordinator::new(
        config,
        schedules.clone(),
        services.clone(),
        appointments.clone(),
    ));

    Fixture {
        coordinator,
        schedules,
        services,
        appointments,
        clinic_id,
        practitioner_id,
        short_service,
        long_service,
    }
}

impl Fixture {
    pub fn request(&self, service: &Service, date: NaiveDate, start: NaiveTime) -> BookAppointmentRequest {
        self.request_for(self.practitioner_id, service, date, start)
    }

    pub fn request_for(
        &self,
        practitioner_id: Uuid,
        service: &Service,
        date: NaiveDate,
        start: NaiveTime,
    ) -> BookAppointmentRequest {
        BookAppointmentRequest {
            patient_id: Uuid::new_v4(),
            practitioner_id,
            clinic_id: self.clinic_id,
            service_id: Some(service.id),
            date: Some(date),
            start_time: Some(start),
            notes: None,
        }
    }

    pub async fn book(&self, role: ActorRole, service: &Service, start: NaiveTime) -> Result<Appointment, AppointmentError> {
        self.coordinator
            .book(self.request(service, monday(), start), role)
            .await
    }

    pub async fn block(&self, scope: BlockScope, start: NaiveTime, end: NaiveTime) -> BlockedWindow {
        self.schedules
            .add_blocked_window(BlockedWindow {
                id: Uuid::new_v4(),
                clinic_id: self.clinic_id,
                scope,
                date: monday(),
                start_time: start,
                end_time: end,
                reason: "Equipment maintenance".to_string(),
                created_by: Uuid::new_v4(),
                created_at: Utc::now(),
            })
            .await
            .unwrap()
    }
}
