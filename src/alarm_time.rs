// DriftClock Alarm Time
// Hour/minute pair with an "unset" sentinel

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::util::format_clock_time;

/// A wall-clock hour and minute at which an alarm goes off.
///
/// `hour == -1` or `minute == -1` means the slot is unset. Only values with
/// `0 <= hour <= 23` and `0 <= minute <= 59` are valid; anything else is
/// never matched by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlarmTime {
    pub hour: i32,
    pub minute: i32,
}

impl AlarmTime {
    pub const UNSET: AlarmTime = AlarmTime {
        hour: -1,
        minute: -1,
    };

    pub const fn new(hour: i32, minute: i32) -> Self {
        Self { hour, minute }
    }

    pub fn is_valid(&self) -> bool {
        (0..=23).contains(&self.hour) && (0..=59).contains(&self.minute)
    }

    /// Reset both fields to the unset sentinel.
    pub fn clear(&mut self) {
        *self = Self::UNSET;
    }

    /// True when this is a valid time equal to `hour:minute`.
    pub fn matches(&self, hour: u32, minute: u32) -> bool {
        self.is_valid() && self.hour as u32 == hour && self.minute as u32 == minute
    }
}

impl Default for AlarmTime {
    fn default() -> Self {
        Self::UNSET
    }
}

impl fmt::Display for AlarmTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            f.write_str(&format_clock_time(self.hour as u32, self.minute as u32))
        } else {
            f.write_str("unset")
        }
    }
}

impl FromStr for AlarmTime {
    type Err = String;

    /// Parse 24-hour `H:MM` or `HH:MM`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, m) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("expected HH:MM, got '{}'", s))?;
        let hour: i32 = h
            .parse()
            .map_err(|_| format!("invalid hour '{}'", h))?;
        let minute: i32 = m
            .parse()
            .map_err(|_| format!("invalid minute '{}'", m))?;
        if m.len() != 2 {
            return Err(format!("minute must have two digits, got '{}'", m));
        }
        let time = AlarmTime::new(hour, minute);
        if !time.is_valid() {
            return Err(format!("{}:{} out of range 00:00-23:59", h, m));
        }
        Ok(time)
    }
}
