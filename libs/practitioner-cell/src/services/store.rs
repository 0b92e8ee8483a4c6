// libs/practitioner-cell/src/services/store.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::models::{BlockedWindow, DateOverride, Practitioner, ScheduleError, WeeklyTemplate};

/// Read/write access to schedule records authored by clinic staff.
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn register_practitioner(&self, practitioner: Practitioner) -> Result<Practitioner, ScheduleError>;

    async fn get_practitioner(&self, practitioner_id: Uuid) -> Result<Option<Practitioner>, ScheduleError>;

    async fn practitioners_at(&self, clinic_id: Uuid) -> Result<Vec<Practitioner>, ScheduleError>;

    async fn weekly_template(&self, practitioner_id: Uuid) -> Result<Option<WeeklyTemplate>, ScheduleError>;

    async fn put_weekly_template(&self, template: WeeklyTemplate) -> Result<WeeklyTemplate, ScheduleError>;

    async fn date_override(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<DateOverride>, ScheduleError>;

    async fn put_date_override(&self, date_override: DateOverride) -> Result<DateOverride, ScheduleError>;

    /// Every blocked window at the clinic on that date, whatever its scope.
    async fn blocked_windows_on(
        &self,
        clinic_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<BlockedWindow>, ScheduleError>;

    async fn add_blocked_window(&self, window: BlockedWindow) -> Result<BlockedWindow, ScheduleError>;
}

#[derive(Default)]
struct ScheduleTables {
    practitioners: HashMap<Uuid, Practitioner>,
    templates: HashMap<Uuid, WeeklyTemplate>,
    overrides: HashMap<(Uuid, NaiveDate), DateOverride>,
    blocked: HashMap<(Uuid, NaiveDate), Vec<BlockedWindow>>,
}

/// Process-local schedule store.
#[derive(Default)]
pub struct InMemoryScheduleRepository {
    tables: RwLock<ScheduleTables>,
}

impl InMemoryScheduleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn require_practitioner(&self, practitioner_id: Uuid) -> Result<(), ScheduleError> {
        if self.tables.read().await.practitioners.contains_key(&practitioner_id) {
            Ok(())
        } else {
            Err(ScheduleError::PractitionerNotFound(practitioner_id))
        }
    }
}

#[async_trait]
impl ScheduleRepository for InMemoryScheduleRepository {
    async fn register_practitioner(&self, practitioner: Practitioner) -> Result<Practitioner, ScheduleError> {
        let mut tables = self.tables.write().await;
        if tables.practitioners.contains_key(&practitioner.id) {
            return Err(ScheduleError::PractitionerExists(practitioner.id));
        }
        debug!("Registering practitioner {}", practitioner.id);
        tables.practitioners.insert(practitioner.id, practitioner.clone());
        Ok(practitioner)
    }

    async fn get_practitioner(&self, practitioner_id: Uuid) -> Result<Option<Practitioner>, ScheduleError> {
        Ok(self.tables.read().await.practitioners.get(&practitioner_id).cloned())
    }

    async fn practitioners_at(&self, clinic_id: Uuid) -> Result<Vec<Practitioner>, ScheduleError> {
        let mut practitioners: Vec<Practitioner> = self
            .tables
            .read()
            .await
            .practitioners
            .values()
            .filter(|p| p.clinic_id == clinic_id)
            .cloned()
            .collect();
        practitioners.sort_by_key(|p| p.id);
        Ok(practitioners)
    }

    async fn weekly_template(&self, practitioner_id: Uuid) -> Result<Option<WeeklyTemplate>, ScheduleError> {
        Ok(self.tables.read().await.templates.get(&practitioner_id).cloned())
    }

    async fn put_weekly_template(&self, template: WeeklyTemplate) -> Result<WeeklyTemplate, ScheduleError> {
        self.require_practitioner(template.practitioner_id).await?;
        self.tables
            .write()
            .await
            .templates
            .insert(template.practitioner_id, template.clone());
        Ok(template)
    }

    async fn date_override(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<DateOverride>, ScheduleError> {
        Ok(self
            .tables
            .read()
            .await
            .overrides
            .get(&(practitioner_id, date))
            .cloned())
    }

    async fn put_date_override(&self, date_override: DateOverride) -> Result<DateOverride, ScheduleError> {
        self.require_practitioner(date_override.practitioner_id).await?;
        self.tables.write().await.overrides.insert(
            (date_override.practitioner_id, date_override.date),
            date_override.clone(),
        );
        Ok(date_override)
    }

    async fn blocked_windows_on(
        &self,
        clinic_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<BlockedWindow>, ScheduleError> {
        Ok(self
            .tables
            .read()
            .await
            .blocked
            .get(&(clinic_id, date))
            .cloned()
            .unwrap_or_default())
    }

    async fn add_blocked_window(&self, window: BlockedWindow) -> Result<BlockedWindow, ScheduleError> {
        self.tables
            .write()
            .await
            .blocked
            .entry((window.clinic_id, window.date))
            .or_default()
            .push(window.clone());
        Ok(window)
    }
}
