// DriftClock Darkness Policy
// Day/night decision for display dimming from external readings or the sun

use chrono::{DateTime, Datelike, Offset, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::sunriset::{sun_rise_set, SunTimes};

/// How long an external reading overrides the computed fallback.
pub const RECENT_UPDATE_WINDOW_SECS: i64 = 1800;

pub const DEFAULT_LATITUDE: f64 = 41.24824681406314;
pub const DEFAULT_LONGITUDE: f64 = -78.79205590646596;

/// Observer position for the sunrise/sunset fallback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SunLocation {
    pub latitude: f64,
    pub longitude: f64,
    /// Fixed correction from UTC to local hours. `None` uses the offset of
    /// the timestamp being evaluated.
    #[serde(default)]
    pub utc_offset_hours: Option<f64>,
}

impl Default for SunLocation {
    fn default() -> Self {
        Self {
            latitude: DEFAULT_LATITUDE,
            longitude: DEFAULT_LONGITUDE,
            utc_offset_hours: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DarknessMode {
    /// Dark from `dark_from:00` until `light_from:00`.
    FixedHours { dark_from: u32, light_from: u32 },
    Sun(SunLocation),
}

impl Default for DarknessMode {
    fn default() -> Self {
        Self::FixedHours {
            dark_from: 22,
            light_from: 10,
        }
    }
}

/// A day/night report from the external light/weather feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalReading {
    pub is_dark: bool,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DarknessPolicy {
    mode: DarknessMode,
    is_dark: bool,
    last_external: Option<ExternalReading>,
    window: chrono::Duration,
}

impl DarknessPolicy {
    pub fn new(mode: DarknessMode) -> Self {
        Self {
            mode,
            is_dark: false,
            last_external: None,
            window: chrono::Duration::seconds(RECENT_UPDATE_WINDOW_SECS),
        }
    }

    pub fn is_dark(&self) -> bool {
        self.is_dark
    }

    pub fn uses_sun(&self) -> bool {
        matches!(self.mode, DarknessMode::Sun(_))
    }

    /// True when the last external reading is no older than the window.
    /// Readings stamped after `now` (clock moved back) are treated as stale.
    pub fn has_recent_external(&self, now: DateTime<Utc>) -> bool {
        match self.last_external {
            Some(reading) => {
                let age = now.signed_duration_since(reading.at);
                age >= chrono::Duration::zero() && age < self.window
            }
            None => false,
        }
    }

    /// Decide whether it is dark at `now` without touching state.
    pub fn compute<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        if let Some(reading) = self.last_external {
            if self.has_recent_external(now.with_timezone(&Utc)) {
                return reading.is_dark;
            }
        }

        match self.mode {
            DarknessMode::FixedHours {
                dark_from,
                light_from,
            } => in_fixed_dark_hours(now.hour(), dark_from, light_from),
            DarknessMode::Sun(location) => sun_is_down(&location, now),
        }
    }

    /// Re-evaluate and return `Some(new_state)` only when it changed.
    pub fn evaluate<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> Option<bool> {
        let dark = self.compute(now);
        self.set_dark(dark)
    }

    /// Store an external reading and apply it immediately.
    pub fn record_external(&mut self, reading: ExternalReading) -> Option<bool> {
        debug!(
            "External darkness reading: dark={} at {}",
            reading.is_dark, reading.at
        );
        self.last_external = Some(reading);
        self.set_dark(reading.is_dark)
    }

    /// Remember a reading from a previous run without changing the state.
    /// It still takes precedence on the next evaluation if it is fresh.
    pub fn restore_external(&mut self, reading: ExternalReading) {
        self.last_external = Some(reading);
    }

    fn set_dark(&mut self, dark: bool) -> Option<bool> {
        if dark == self.is_dark {
            return None;
        }
        if dark {
            info!("It is now dark outside");
        } else {
            info!("It is now light outside");
        }
        self.is_dark = dark;
        Some(dark)
    }
}

fn in_fixed_dark_hours(hour: u32, dark_from: u32, light_from: u32) -> bool {
    if dark_from > light_from {
        hour >= dark_from || hour < light_from
    } else {
        hour >= dark_from && hour < light_from
    }
}

fn sun_is_down<Tz: TimeZone>(location: &SunLocation, now: &DateTime<Tz>) -> bool {
    let offset = location
        .utc_offset_hours
        .unwrap_or_else(|| now.offset().fix().local_minus_utc() as f64 / 3600.0);

    let times = sun_rise_set(
        now.year(),
        now.month(),
        now.day(),
        location.longitude,
        location.latitude,
    );

    match times {
        SunTimes::Normal { rise, set } => {
            let rise = wrap_hours(rise + offset);
            let set = wrap_hours(set + offset);
            let time_of_day =
                now.hour() as f64 + now.minute() as f64 / 60.0 + now.second() as f64 / 3600.0;
            if rise <= set {
                time_of_day < rise || time_of_day > set
            } else {
                // Daylight spans local midnight
                time_of_day > set && time_of_day < rise
            }
        }
        SunTimes::AlwaysUp => false,
        SunTimes::AlwaysDown => true,
    }
}

fn wrap_hours(hours: f64) -> f64 {
    hours.rem_euclid(24.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn eastern() -> FixedOffset {
        FixedOffset::west_opt(4 * 3600).unwrap()
    }

    fn at(month: u32, day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
        eastern()
            .with_ymd_and_hms(2026, month, day, hour, minute, 0)
            .single()
            .unwrap()
    }

    #[test]
    fn test_fixed_hours_rule() {
        let policy = DarknessPolicy::new(DarknessMode::default());
        assert!(policy.compute(&at(6, 21, 22, 0)));
        assert!(policy.compute(&at(6, 21, 3, 0)));
        assert!(policy.compute(&at(6, 21, 9, 59)));
        assert!(!policy.compute(&at(6, 21, 10, 0)));
        assert!(!policy.compute(&at(6, 21, 21, 59)));
    }

    #[test]
    fn test_fixed_hours_non_wrapping_range() {
        assert!(in_fixed_dark_hours(2, 1, 5));
        assert!(!in_fixed_dark_hours(5, 1, 5));
        assert!(!in_fixed_dark_hours(0, 1, 5));
    }

    #[test]
    fn test_evaluate_reports_transitions_only() {
        let mut policy = DarknessPolicy::new(DarknessMode::default());
        assert_eq!(policy.evaluate(&at(6, 21, 12, 0)), None);
        assert_eq!(policy.evaluate(&at(6, 21, 22, 0)), Some(true));
        assert_eq!(policy.evaluate(&at(6, 21, 23, 0)), None);
        assert!(policy.is_dark());
        assert_eq!(policy.evaluate(&at(6, 22, 10, 0)), Some(false));
    }

    #[test]
    fn test_sun_mode_summer_day() {
        let policy = DarknessPolicy::new(DarknessMode::Sun(SunLocation::default()));
        // Offset taken from the timestamp (EDT)
        assert!(policy.compute(&at(6, 21, 5, 0)));
        assert!(!policy.compute(&at(6, 21, 6, 0)));
        assert!(!policy.compute(&at(6, 21, 20, 30)));
        assert!(policy.compute(&at(6, 21, 21, 15)));
    }

    #[test]
    fn test_sun_mode_fixed_offset_override() {
        let location = SunLocation {
            utc_offset_hours: Some(-5.0),
            ..SunLocation::default()
        };
        let policy = DarknessPolicy::new(DarknessMode::Sun(location));
        // Sunrise is about 4:42 on the -5 clock, so 5:00 is light
        assert!(!policy.compute(&at(6, 21, 5, 0)));
    }

    #[test]
    fn test_sun_mode_daylight_across_midnight() {
        // Sydney evaluated on a UTC clock: local daylight wraps 00:00
        let location = SunLocation {
            latitude: -33.87,
            longitude: 151.2,
            utc_offset_hours: Some(0.0),
        };
        let policy = DarknessPolicy::new(DarknessMode::Sun(location));
        let utc = |h: u32| {
            Utc.with_ymd_and_hms(2026, 6, 21, h, 0, 0)
                .single()
                .unwrap()
        };
        assert!(!policy.compute(&utc(2)));
        assert!(!policy.compute(&utc(22)));
        assert!(policy.compute(&utc(12)));
    }

    #[test]
    fn test_polar_mapping() {
        let location = SunLocation {
            latitude: 80.0,
            longitude: 0.0,
            utc_offset_hours: Some(0.0),
        };
        let policy = DarknessPolicy::new(DarknessMode::Sun(location));
        assert!(!policy.compute(&at(6, 21, 0, 0)));
        assert!(policy.compute(&at(12, 21, 12, 0)));
    }

    #[test]
    fn test_external_reading_takes_precedence_while_fresh() {
        let mut policy = DarknessPolicy::new(DarknessMode::default());
        let noon = at(6, 21, 12, 0);
        let reading = ExternalReading {
            is_dark: true,
            at: noon.with_timezone(&Utc),
        };
        assert_eq!(policy.record_external(reading), Some(true));
        assert!(policy.has_recent_external(noon.with_timezone(&Utc)));

        // 29 minutes later still governed by the reading
        assert_eq!(policy.evaluate(&at(6, 21, 12, 29)), None);
        assert!(policy.is_dark());

        // Past the window the fixed rule applies again
        assert_eq!(policy.evaluate(&at(6, 21, 12, 30)), Some(false));
    }

    #[test]
    fn test_restored_reading_applies_on_evaluate() {
        let mut policy = DarknessPolicy::new(DarknessMode::default());
        policy.restore_external(ExternalReading {
            is_dark: true,
            at: at(6, 21, 11, 50).with_timezone(&Utc),
        });
        assert!(!policy.is_dark());
        assert_eq!(policy.evaluate(&at(6, 21, 12, 0)), Some(true));
    }

    #[test]
    fn test_future_reading_is_stale() {
        let mut policy = DarknessPolicy::new(DarknessMode::default());
        let later = at(6, 21, 13, 0).with_timezone(&Utc);
        policy.record_external(ExternalReading {
            is_dark: true,
            at: later,
        });
        assert!(!policy.has_recent_external(at(6, 21, 12, 0).with_timezone(&Utc)));
        assert!(!policy.compute(&at(6, 21, 12, 0)));
    }
}
