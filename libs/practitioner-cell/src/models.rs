// libs/practitioner-cell/src/models.rs
use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// PRACTITIONER
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Practitioner {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

// ==============================================================================
// OPENING HOURS
// ==============================================================================

/// Hours for one day, as authored in a weekly template or a date override.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpeningHours {
    pub is_open: bool,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl OpeningHours {
    pub fn open(start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self { is_open: true, start_time, end_time }
    }

    pub fn closed() -> Self {
        Self {
            is_open: false,
            start_time: NaiveTime::MIN,
            end_time: NaiveTime::MIN,
        }
    }

    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.is_open && self.start_time >= self.end_time {
            return Err(ScheduleError::InvalidHours(format!(
                "start {} must be before end {}",
                self.start_time, self.end_time
            )));
        }
        Ok(())
    }
}

/// Recurring default week for a practitioner. Missing weekdays are closed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeeklyTemplate {
    pub practitioner_id: Uuid,
    pub days: HashMap<Weekday, OpeningHours>,
    pub updated_at: DateTime<Utc>,
}

impl WeeklyTemplate {
    pub fn hours_for(&self, weekday: Weekday) -> Option<&OpeningHours> {
        self.days.get(&weekday)
    }
}

/// Replaces the weekly template for one date, all-or-nothing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DateOverride {
    pub practitioner_id: Uuid,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub hours: OpeningHours,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilitySource {
    DateOverride,
    WeeklyTemplate,
    NoSchedule,
}

/// Outcome of resolving a practitioner's hours for one date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedAvailability {
    pub practitioner_id: Uuid,
    pub date: NaiveDate,
    pub is_open: bool,
    pub open_start: Option<NaiveTime>,
    pub open_end: Option<NaiveTime>,
    pub source: AvailabilitySource,
}

impl ResolvedAvailability {
    pub fn closed(practitioner_id: Uuid, date: NaiveDate, source: AvailabilitySource) -> Self {
        Self {
            practitioner_id,
            date,
            is_open: false,
            open_start: None,
            open_end: None,
            source,
        }
    }

    /// Open window as datetimes, `None` when closed.
    pub fn window(&self) -> Option<TimeInterval> {
        match (self.is_open, self.open_start, self.open_end) {
            (true, Some(start), Some(end)) => Some(TimeInterval::new(
                self.date.and_time(start),
                self.date.and_time(end),
            )),
            _ => None,
        }
    }
}

// ==============================================================================
// INTERVALS AND SLOTS
// ==============================================================================

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeInterval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeInterval {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    pub fn starting_at(date: NaiveDate, time: NaiveTime, duration_minutes: u32) -> Self {
        let start = date.and_time(time);
        Self {
            start,
            end: start + Duration::minutes(i64::from(duration_minutes)),
        }
    }

    pub fn on_date(date: NaiveDate, start: NaiveTime, end: NaiveTime) -> Self {
        Self::new(date.and_time(start), date.and_time(end))
    }

    /// Touching boundaries (`a.end == b.start`) do not overlap.
    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, other: &TimeInterval) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} - {})", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeSlot {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: u32,
}

impl TimeSlot {
    pub fn interval(&self) -> TimeInterval {
        TimeInterval::starting_at(self.date, self.start_time, self.duration_minutes)
    }
}

// ==============================================================================
// BLOCKED WINDOWS
// ==============================================================================

/// Who a blocked window applies to. Clinic-wide blocking must be chosen explicitly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum BlockScope {
    Practitioner { practitioner_id: Uuid },
    ClinicWide,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockedWindow {
    pub id: Uuid,
    pub clinic_id: Uuid,
    #[serde(flatten)]
    pub scope: BlockScope,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub reason: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl BlockedWindow {
    pub fn applies_to(&self, practitioner_id: Uuid, clinic_id: Uuid) -> bool {
        match self.scope {
            BlockScope::Practitioner { practitioner_id: owner } => owner == practitioner_id,
            BlockScope::ClinicWide => self.clinic_id == clinic_id,
        }
    }

    pub fn interval(&self) -> TimeInterval {
        TimeInterval::on_date(self.date, self.start_time, self.end_time)
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterPractitionerRequest {
    pub id: Option<Uuid>,
    pub clinic_id: Uuid,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetWeeklyTemplateRequest {
    pub days: HashMap<Weekday, OpeningHours>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetDateOverrideRequest {
    #[serde(flatten)]
    pub hours: OpeningHours,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBlockedWindowRequest {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub reason: String,
    #[serde(default)]
    pub clinic_wide: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("Practitioner not found: {0}")]
    PractitionerNotFound(Uuid),

    #[error("Practitioner already registered: {0}")]
    PractitionerExists(Uuid),

    #[error("Invalid opening hours: {0}")]
    InvalidHours(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),
}
