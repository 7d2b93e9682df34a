// DriftClock Alarm Schedule
// One-time, daily and day-of-week alarms with precedence and next-fire search

use chrono::{DateTime, Datelike, Local, LocalResult, NaiveDateTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::alarm_time::AlarmTime;

// ---------------------------------------------------------------------------
// Weekday
// ---------------------------------------------------------------------------

/// Day of week, indexed the way the weekly alarm table is stored
/// (Sunday = 0 ... Saturday = 6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Weekday {
    Sun,
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Self::Sun,
        Self::Mon,
        Self::Tue,
        Self::Wed,
        Self::Thu,
        Self::Fri,
        Self::Sat,
    ];

    /// Convert from `chrono::Weekday` to our `Weekday` enum.
    pub fn from_chrono(day: chrono::Weekday) -> Self {
        match day {
            chrono::Weekday::Sun => Self::Sun,
            chrono::Weekday::Mon => Self::Mon,
            chrono::Weekday::Tue => Self::Tue,
            chrono::Weekday::Wed => Self::Wed,
            chrono::Weekday::Thu => Self::Thu,
            chrono::Weekday::Fri => Self::Fri,
            chrono::Weekday::Sat => Self::Sat,
        }
    }

    /// Position in the weekly table.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn short_name(self) -> &'static str {
        match self {
            Self::Sun => "Sun",
            Self::Mon => "Mon",
            Self::Tue => "Tue",
            Self::Wed => "Wed",
            Self::Thu => "Thu",
            Self::Fri => "Fri",
            Self::Sat => "Sat",
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for Weekday {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|d| lower.starts_with(&d.short_name().to_ascii_lowercase()) && lower.len() >= 3)
            .ok_or_else(|| format!("unknown day of week '{}'", s))
    }
}

// ---------------------------------------------------------------------------
// AlarmSlot
// ---------------------------------------------------------------------------

/// Which entry of the schedule a menu action targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmSlot {
    OneTime,
    Daily,
    Day(Weekday),
}

impl fmt::Display for AlarmSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneTime => f.write_str("one-time"),
            Self::Daily => f.write_str("daily"),
            Self::Day(day) => write!(f, "{}", day),
        }
    }
}

impl FromStr for AlarmSlot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "once" | "one-time" | "onetime" | "one_time" => Ok(Self::OneTime),
            "daily" | "every" => Ok(Self::Daily),
            other => other.parse::<Weekday>().map(Self::Day),
        }
    }
}

// ---------------------------------------------------------------------------
// AlarmSchedule
// ---------------------------------------------------------------------------

/// Result of checking a minute against the schedule.
///
/// `schedule_changed` is set when the check consumed the one-time alarm;
/// the caller is expected to persist the schedule in that case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FireCheck {
    pub fired: bool,
    pub schedule_changed: bool,
}

/// Full alarm configuration.
///
/// For any given day a valid day-of-week entry replaces the daily alarm;
/// the one-time alarm is always checked in addition to whichever of the
/// two applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmSchedule {
    /// Fires once, then clears itself.
    #[serde(rename = "one_time_alarm")]
    pub one_time: AlarmTime,
    /// Recurs every day without a day-of-week override.
    #[serde(rename = "alarm_time")]
    pub daily: AlarmTime,
    /// Per-day overrides, Sunday first.
    #[serde(rename = "daily_alarms")]
    pub weekly: [AlarmTime; 7],
    /// Master toggle.
    #[serde(rename = "enable_alarm")]
    pub enabled: bool,
    /// Turn `enabled` back on at the next midnight after it was switched off.
    #[serde(rename = "auto_enable_at_midnight")]
    pub auto_reenable_at_midnight: bool,
}

impl Default for AlarmSchedule {
    fn default() -> Self {
        Self {
            one_time: AlarmTime::UNSET,
            daily: AlarmTime::UNSET,
            weekly: [AlarmTime::UNSET; 7],
            enabled: false,
            auto_reenable_at_midnight: false,
        }
    }
}

impl AlarmSchedule {
    pub fn get(&self, slot: AlarmSlot) -> AlarmTime {
        match slot {
            AlarmSlot::OneTime => self.one_time,
            AlarmSlot::Daily => self.daily,
            AlarmSlot::Day(day) => self.weekly[day.index()],
        }
    }

    pub fn set(&mut self, slot: AlarmSlot, time: AlarmTime) {
        let target = match slot {
            AlarmSlot::OneTime => &mut self.one_time,
            AlarmSlot::Daily => &mut self.daily,
            AlarmSlot::Day(day) => &mut self.weekly[day.index()],
        };
        *target = time;
    }

    pub fn clear(&mut self, slot: AlarmSlot) {
        self.set(slot, AlarmTime::UNSET);
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Flip the master toggle, returning the new value.
    pub fn toggle_enabled(&mut self) -> bool {
        self.enabled = !self.enabled;
        self.enabled
    }

    /// Number of days with a valid day-of-week override.
    pub fn weekly_count(&self) -> usize {
        self.weekly.iter().filter(|t| t.is_valid()).count()
    }

    /// True when no slot holds a valid time.
    pub fn is_empty(&self) -> bool {
        !self.one_time.is_valid() && !self.daily.is_valid() && self.weekly_count() == 0
    }

    /// Times that apply on `day`: the one-time alarm if set, plus the
    /// day-of-week entry if set, otherwise the daily alarm if set.
    pub fn candidates(&self, day: Weekday) -> Vec<AlarmTime> {
        let mut out = Vec::with_capacity(2);
        if self.one_time.is_valid() {
            out.push(self.one_time);
        }
        let dow = self.weekly[day.index()];
        if dow.is_valid() {
            out.push(dow);
        } else if self.daily.is_valid() {
            out.push(self.daily);
        }
        out
    }

    /// Check whether an alarm belongs to the local minute of `ts`.
    ///
    /// Seconds are ignored, so callers should only ask once per minute.
    /// A matching one-time alarm is cleared as part of the check and
    /// reported through `schedule_changed`. A one-time alarm that coincides
    /// with the daily/day-of-week alarm still yields a single `fired`.
    pub fn should_fire_at<Tz: TimeZone>(&mut self, ts: &DateTime<Tz>) -> FireCheck {
        let day = Weekday::from_chrono(ts.weekday());
        let (hour, minute) = (ts.hour(), ts.minute());

        let fired = self
            .candidates(day)
            .iter()
            .any(|c| c.matches(hour, minute));

        let mut schedule_changed = false;
        if fired && self.one_time.matches(hour, minute) {
            self.one_time.clear();
            schedule_changed = true;
        }

        FireCheck {
            fired,
            schedule_changed,
        }
    }

    /// Earliest candidate on the day of `day_start` at or after its
    /// hour:minute, resolved in `tz`. `None` when nothing is left that day.
    pub fn next_fire_time_on<Tz: TimeZone>(
        &self,
        day_start: NaiveDateTime,
        tz: &Tz,
    ) -> Option<DateTime<Tz>> {
        let day = Weekday::from_chrono(day_start.weekday());
        let start_hour = day_start.hour() as i32;
        let start_minute = day_start.minute() as i32;

        self.candidates(day)
            .into_iter()
            .filter(|c| c.hour > start_hour || (c.hour == start_hour && c.minute >= start_minute))
            .filter_map(|c| {
                let naive = day_start
                    .date()
                    .and_hms_opt(c.hour as u32, c.minute as u32, 0)?;
                resolve_local(tz, naive)
            })
            .min()
    }

    /// Next time any alarm is due, searching from `now` through the
    /// following seven days.
    ///
    /// The weekly table repeats every seven days, so if nothing is found in
    /// that range the schedule is empty and `None` is returned.
    pub fn next_fire_time_from<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = now.timezone();
        let start = now.naive_local().with_second(0)?.with_nanosecond(0)?;

        if let Some(found) = self.next_fire_time_on(start, &tz) {
            return Some(found);
        }

        let today = start.date();
        for offset in 1..=7 {
            let day = today.checked_add_signed(chrono::Duration::days(offset))?;
            let midnight = day.and_hms_opt(0, 0, 0)?;
            if let Some(found) = self.next_fire_time_on(midnight, &tz) {
                return Some(found);
            }
        }
        None
    }

    /// Next fire time from the current local time.
    pub fn next_fire_time(&self) -> Option<DateTime<Local>> {
        self.next_fire_time_from(&Local::now())
    }

    /// Called once for each 00:00 boundary. Returns `true` when the alarm
    /// was re-enabled and the schedule needs persisting.
    pub fn on_midnight_rollover(&mut self) -> bool {
        if self.auto_reenable_at_midnight && !self.enabled {
            self.enabled = true;
            return true;
        }
        false
    }
}

/// Map a local wall-clock time to an instant. Ambiguous times (DST fall
/// back) take the earlier instant; times inside a DST gap move forward one
/// hour.
fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    earliest_instant(tz.from_local_datetime(&naive)).or_else(|| {
        let shifted = naive.checked_add_signed(chrono::Duration::hours(1))?;
        earliest_instant(tz.from_local_datetime(&shifted))
    })
}

// `Local` does not order the two candidates of an ambiguous time
fn earliest_instant<Tz: TimeZone>(result: LocalResult<DateTime<Tz>>) -> Option<DateTime<Tz>> {
    match result {
        LocalResult::Single(t) => Some(t),
        LocalResult::Ambiguous(a, b) => Some(a.min(b)),
        LocalResult::None => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
