// DriftClock - Headless alarm clock engine
// Alarm scheduling, day/night policy and the collaborators around them

pub mod alarm_clock;
pub mod alarm_schedule;
pub mod alarm_time;
pub mod app;
pub mod audio;
pub mod backlight;
pub mod commands;
pub mod config;
pub mod controller;
pub mod darkness;
pub mod error;
pub mod home_assistant;
pub mod logging;
pub mod settings;
pub mod sunriset;
pub mod util;

pub use alarm_clock::{AdvanceReport, AlarmClock, AlarmState, ClockEvent};
pub use alarm_schedule::{AlarmSchedule, AlarmSlot, FireCheck, Weekday};
pub use alarm_time::AlarmTime;
pub use darkness::{DarknessMode, DarknessPolicy, ExternalReading, SunLocation};
pub use error::{ClockError, Result};
