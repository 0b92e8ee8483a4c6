use std::env;

use chrono::{FixedOffset, NaiveTime, Offset, Utc};
use tracing::warn;

/// Fixed daily break during which no slot may be offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// Engine-facing subset of the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulingConfig {
    pub slot_granularity_minutes: u32,
    pub default_service_duration_minutes: u32,
    pub break_window: Option<BreakWindow>,
    pub clinic_utc_offset_minutes: i32,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            slot_granularity_minutes: 30,
            default_service_duration_minutes: 30,
            break_window: NaiveTime::from_hms_opt(11, 30, 0)
                .zip(NaiveTime::from_hms_opt(12, 30, 0))
                .map(|(start, end)| BreakWindow { start, end }),
            clinic_utc_offset_minutes: 0,
        }
    }
}

impl SchedulingConfig {
    /// Offset used to turn the server clock into clinic-local time.
    pub fn clinic_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.clinic_utc_offset_minutes * 60).unwrap_or_else(|| {
            warn!("Clinic UTC offset {} out of range, using UTC", self.clinic_utc_offset_minutes);
            Utc.fix()
        })
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub server_port: u16,
    pub scheduling: SchedulingConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = SchedulingConfig::default();

        let config = Self {
            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| {
                warn!("JWT_SECRET not set, using empty value");
                String::new()
            }),
            server_port: parse_var("SERVER_PORT", 3000),
            scheduling: SchedulingConfig {
                slot_granularity_minutes: positive_var(
                    "SLOT_GRANULARITY_MINUTES",
                    defaults.slot_granularity_minutes,
                ),
                default_service_duration_minutes: positive_var(
                    "DEFAULT_SERVICE_DURATION_MINUTES",
                    defaults.default_service_duration_minutes,
                ),
                break_window: break_window_from_env(defaults.break_window),
                clinic_utc_offset_minutes: parse_var(
                    "CLINIC_UTC_OFFSET_MINUTES",
                    defaults.clinic_utc_offset_minutes,
                ),
            },
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.jwt_secret.is_empty()
    }

    pub fn scheduling(&self) -> SchedulingConfig {
        self.scheduling.clone()
    }
}

fn parse_var<T: std::str::FromStr + std::fmt::Display + Copy>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using default {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}

fn positive_var(name: &str, default: u32) -> u32 {
    let value = parse_var(name, default);
    if value == 0 {
        warn!("{} must be greater than zero, using default {}", name, default);
        return default;
    }
    value
}

fn break_window_from_env(default: Option<BreakWindow>) -> Option<BreakWindow> {
    let start = env::var("BREAK_START").ok();
    let end = env::var("BREAK_END").ok();

    match (start.as_deref(), end.as_deref()) {
        (None, None) => default,
        (Some(s), _) if s.eq_ignore_ascii_case("none") => None,
        (Some(s), Some(e)) => match parse_break(s, e) {
            Some(window) => Some(window),
            None => {
                warn!("Invalid break window {}-{}, using default", s, e);
                default
            }
        },
        _ => {
            warn!("BREAK_START and BREAK_END must be set together, using default");
            default
        }
    }
}

fn parse_break(start: &str, end: &str) -> Option<BreakWindow> {
    let start = NaiveTime::parse_from_str(start.trim(), "%H:%M").ok()?;
    let end = NaiveTime::parse_from_str(end.trim(), "%H:%M").ok()?;
    (start < end).then_some(BreakWindow { start, end })
}
