// libs/practitioner-cell/src/services/availability.rs
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{
    AvailabilitySource, DateOverride, OpeningHours, ResolvedAvailability, ScheduleError,
    WeeklyTemplate,
};
use crate::services::store::ScheduleRepository;

/// Decides whether a practitioner is open on a date and which hours apply.
pub struct AvailabilityResolver {
    schedules: Arc<dyn ScheduleRepository>,
}

impl AvailabilityResolver {
    pub fn new(schedules: Arc<dyn ScheduleRepository>) -> Self {
        Self { schedules }
    }

    pub async fn resolve(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
    ) -> Result<ResolvedAvailability, ScheduleError> {
        debug!("Resolving availability for practitioner {} on {}", practitioner_id, date);

        if self.schedules.get_practitioner(practitioner_id).await?.is_none() {
            return Err(ScheduleError::PractitionerNotFound(practitioner_id));
        }

        let date_override = self.schedules.date_override(practitioner_id, date).await?;
        let template = match date_override {
            Some(_) => None,
            None => self.schedules.weekly_template(practitioner_id).await?,
        };

        Ok(resolve_hours(
            practitioner_id,
            date,
            template.as_ref(),
            date_override.as_ref(),
        ))
    }
}

/// Override wins outright; otherwise the weekly template for the weekday; otherwise closed.
pub fn resolve_hours(
    practitioner_id: Uuid,
    date: NaiveDate,
    template: Option<&WeeklyTemplate>,
    date_override: Option<&DateOverride>,
) -> ResolvedAvailability {
    let (hours, source) = if let Some(date_override) = date_override {
        (Some(date_override.hours), AvailabilitySource::DateOverride)
    } else if let Some(template) = template {
        (
            template.hours_for(date.weekday()).copied(),
            AvailabilitySource::WeeklyTemplate,
        )
    } else {
        (None, AvailabilitySource::NoSchedule)
    };

    match hours {
        Some(hours) => from_hours(practitioner_id, date, hours, source),
        None => ResolvedAvailability::closed(practitioner_id, date, source),
    }
}

fn from_hours(
    practitioner_id: Uuid,
    date: NaiveDate,
    hours: OpeningHours,
    source: AvailabilitySource,
) -> ResolvedAvailability {
    if !hours.is_open {
        return ResolvedAvailability::closed(practitioner_id, date, source);
    }

    if hours.validate().is_err() {
        warn!(
            "Ignoring inverted hours {}-{} for practitioner {} on {}",
            hours.start_time, hours.end_time, practitioner_id, date
        );
        return ResolvedAvailability::closed(practitioner_id, date, source);
    }

    ResolvedAvailability {
        practitioner_id,
        date,
        is_open: true,
        open_start: Some(hours.start_time),
        open_end: Some(hours.end_time),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Utc, Weekday};
    use std::collections::HashMap;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_inverted_hours_resolve_closed() {
        let pid = Uuid::new_v4();
        let monday = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let template = WeeklyTemplate {
            practitioner_id: pid,
            days: HashMap::from([(Weekday::Mon, OpeningHours::open(t(17, 0), t(9, 0)))]),
            updated_at: Utc::now(),
        };

        let resolved = resolve_hours(pid, monday, Some(&template), None);
        assert!(!resolved.is_open);
        assert_eq!(resolved.source, AvailabilitySource::WeeklyTemplate);
    }
}
