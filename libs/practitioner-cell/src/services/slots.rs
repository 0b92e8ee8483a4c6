// libs/practitioner-cell/src/services/slots.rs
use chrono::{Duration, NaiveDateTime};
use tracing::debug;

use shared_config::BreakWindow;

use crate::models::{ResolvedAvailability, TimeInterval, TimeSlot};

/// Steps through open hours at a fixed granularity and emits bookable start times.
///
/// Only the schedule shape is considered here: open hours, the daily break and
/// elapsed time. Existing appointments and blocked windows are filtered by the
/// appointment cell.
#[derive(Debug, Clone, Copy)]
pub struct SlotGenerator {
    granularity_minutes: u32,
}

impl SlotGenerator {
    pub fn new(granularity_minutes: u32) -> Self {
        Self {
            granularity_minutes: granularity_minutes.max(1),
        }
    }

    pub fn granularity_minutes(&self) -> u32 {
        self.granularity_minutes
    }

    /// `now` is clinic-local wall time supplied by the caller.
    pub fn generate(
        &self,
        availability: &ResolvedAvailability,
        duration_minutes: u32,
        break_window: Option<BreakWindow>,
        now: NaiveDateTime,
    ) -> Vec<TimeSlot> {
        let Some(open) = availability.window() else {
            return Vec::new();
        };
        if duration_minutes == 0 {
            return Vec::new();
        }

        let date = availability.date;
        let today = now.date();
        if date < today {
            return Vec::new();
        }

        let break_interval = break_window.map(|b| TimeInterval::on_date(date, b.start, b.end));
        let step = Duration::minutes(i64::from(self.granularity_minutes));

        let mut slots = Vec::new();
        let mut cursor = open.start;

        while cursor < open.end {
            let candidate = TimeInterval::new(
                cursor,
                cursor + Duration::minutes(i64::from(duration_minutes)),
            );

            let fits = candidate.end <= open.end;
            let hits_break = break_interval.is_some_and(|b| candidate.overlaps(&b));
            let elapsed = date == today && candidate.start <= now;

            if fits && !hits_break && !elapsed {
                slots.push(TimeSlot {
                    date,
                    start_time: candidate.start.time(),
                    end_time: candidate.end.time(),
                    duration_minutes,
                });
            }

            cursor += step;
        }

        debug!(
            "Generated {} candidate slots for practitioner {} on {}",
            slots.len(),
            availability.practitioner_id,
            date
        );
        slots
    }
}
