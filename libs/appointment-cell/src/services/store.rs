// libs/appointment-cell/src/services/store.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError, Service};

#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError>;

    /// All appointments for the practitioner on that date, in any status.
    async fn list_for_practitioner_on(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    async fn list_for_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>, AppointmentError>;

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, AppointmentError>;

    /// Replaces the stored record; fails when the id is unknown.
    async fn update(&self, appointment: Appointment) -> Result<Appointment, AppointmentError>;
}

#[async_trait]
pub trait ServiceRepository: Send + Sync {
    async fn get_service(&self, service_id: Uuid) -> Result<Option<Service>, AppointmentError>;

    async fn add_service(&self, service: Service) -> Result<Service, AppointmentError>;

    /// Durations for the given ids. Unknown ids are simply absent.
    async fn durations(&self, service_ids: &[Uuid]) -> Result<HashMap<Uuid, u32>, AppointmentError>;
}

/// Process-local appointment store.
#[derive(Default)]
pub struct InMemoryAppointmentRepository {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
}

impl InMemoryAppointmentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn chronological(mut appointments: Vec<Appointment>) -> Vec<Appointment> {
    appointments.sort_by_key(|a| (a.date, a.start_time, a.created_at));
    appointments
}

#[async_trait]
impl AppointmentRepository for InMemoryAppointmentRepository {
    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        Ok(self.appointments.read().await.get(&appointment_id).cloned())
    }

    async fn list_for_practitioner_on(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let appointments = self
            .appointments
            .read()
            .await
            .values()
            .filter(|a| a.practitioner_id == practitioner_id && a.date == date)
            .cloned()
            .collect();
        Ok(chronological(appointments))
    }

    async fn list_for_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>, AppointmentError> {
        let appointments = self
            .appointments
            .read()
            .await
            .values()
            .filter(|a| a.patient_id == patient_id)
            .cloned()
            .collect();
        Ok(chronological(appointments))
    }

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        let mut appointments = self.appointments.write().await;
        if appointments.contains_key(&appointment.id) {
            return Err(AppointmentError::Storage(format!(
                "appointment {} already exists",
                appointment.id
            )));
        }
        debug!("Storing appointment {}", appointment.id);
        appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn update(&self, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        let mut appointments = self.appointments.write().await;
        match appointments.get_mut(&appointment.id) {
            Some(existing) => {
                *existing = appointment.clone();
                Ok(appointment)
            }
            None => Err(AppointmentError::AppointmentNotFound(appointment.id)),
        }
    }
}

#[derive(Default)]
pub struct InMemoryServiceRepository {
    services: RwLock<HashMap<Uuid, Service>>,
}

impl InMemoryServiceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ServiceRepository for InMemoryServiceRepository {
    async fn get_service(&self, service_id: Uuid) -> Result<Option<Service>, AppointmentError> {
        Ok(self.services.read().await.get(&service_id).cloned())
    }

    async fn add_service(&self, service: Service) -> Result<Service, AppointmentError> {
        self.services.write().await.insert(service.id, service.clone());
        Ok(service)
    }

    async fn durations(&self, service_ids: &[Uuid]) -> Result<HashMap<Uuid, u32>, AppointmentError> {
        let services = self.services.read().await;
        Ok(service_ids
            .iter()
            .filter_map(|id| services.get(id).map(|s| (*id, s.duration_minutes)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{NaiveTime, Utc};

    use crate::models::AppointmentState;

    fn appointment(practitioner_id: Uuid, hour: u32) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            practitioner_id,
            clinic_id: Uuid::new_v4(),
            service_id: None,
            date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            start_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            notes: None,
            state: AppointmentState::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn test_list_is_chronological_and_scoped() {
        let repo = InMemoryAppointmentRepository::new();
        let practitioner_id = Uuid::new_v4();

        repo.insert(appointment(practitioner_id, 14)).await.unwrap();
        repo.insert(appointment(practitioner_id, 9)).await.unwrap();
        repo.insert(appointment(Uuid::new_v4(), 10)).await.unwrap();

        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let listed = repo.list_for_practitioner_on(practitioner_id, date).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].start_time < listed[1].start_time);
    }

    #[tokio::test]
    async fn test_update_unknown_fails() {
        let repo = InMemoryAppointmentRepository::new();
        let result = repo.update(appointment(Uuid::new_v4(), 9)).await;
        assert_matches!(result, Err(AppointmentError::AppointmentNotFound(_)));
    }

    #[tokio::test]
    async fn test_durations_skip_unknown_services() {
        let repo = InMemoryServiceRepository::new();
        let service = repo
            .add_service(Service {
                id: Uuid::new_v4(),
                clinic_id: Uuid::new_v4(),
                name: "Cleaning".to_string(),
                duration_minutes: 45,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let durations = repo.durations(&[service.id, Uuid::new_v4()]).await.unwrap();
        assert_eq!(durations.len(), 1);
        assert_eq!(durations[&service.id], 45);
    }
}
