// DriftClock Controller
// Owns schedule, darkness policy and state machine; turns ticks and
// commands into notifications for the surrounding collaborators

use chrono::{DateTime, FixedOffset, Offset, TimeZone, Utc};
use tracing::{info, warn};

use crate::alarm_clock::{AlarmClock, AlarmState, ClockEvent};
use crate::alarm_schedule::{AlarmSchedule, AlarmSlot, Weekday};
use crate::commands::Command;
use crate::darkness::{DarknessMode, DarknessPolicy, ExternalReading};
use crate::settings::Settings;
use crate::util::format_minutes;

/// Darkness is re-evaluated this often.
pub const DARKNESS_INTERVAL_SECS: i64 = 30;

/// State changes reported to the UI/audio/network collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    AlarmStarted { at: DateTime<Utc> },
    AlarmAcknowledged { disabled_until_midnight: bool },
    DarknessChanged { is_dark: bool },
    NextAlarmChanged { next: Option<DateTime<FixedOffset>> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub notifications: Vec<Notification>,
    pub persist_requested: bool,
    /// A midnight boundary was crossed; run backup pruning.
    pub maintenance_due: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    /// Text for the operator.
    pub message: String,
    pub notifications: Vec<Notification>,
    pub persist_requested: bool,
    pub quit: bool,
}

impl Reply {
    fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    fn changed(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            persist_requested: true,
            ..Self::default()
        }
    }
}

/// The whole clock minus its I/O.
#[derive(Debug)]
pub struct ClockCore {
    settings: Settings,
    darkness: DarknessPolicy,
    clock: AlarmClock,
    last_darkness_eval: Option<i64>,
    last_next_alarm: Option<Option<DateTime<Utc>>>,
}

impl ClockCore {
    pub fn new<Tz: TimeZone>(settings: Settings, mode: DarknessMode, now: &DateTime<Tz>) -> Self {
        let mut darkness = DarknessPolicy::new(mode);
        if let Some(reading) = settings.last_external_update {
            darkness.restore_external(reading);
        }
        Self {
            settings,
            darkness,
            clock: AlarmClock::new(now),
            last_darkness_eval: None,
            last_next_alarm: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn schedule(&self) -> &AlarmSchedule {
        &self.settings.schedule
    }

    pub fn state(&self) -> AlarmState {
        self.clock.state()
    }

    pub fn is_alarming(&self) -> bool {
        self.clock.is_alarming()
    }

    pub fn is_dark(&self) -> bool {
        self.darkness.is_dark()
    }

    pub fn uses_sun(&self) -> bool {
        self.darkness.uses_sun()
    }

    /// Whether the backlight should be at its dim level.
    pub fn should_dim(&self) -> bool {
        self.darkness.is_dark() && self.settings.dim_when_dark
    }

    /// Advance to `now`. Call at least once per second.
    pub fn tick<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        let report = self.clock.advance(&mut self.settings.schedule, now);
        outcome.persist_requested = report.persist_requested;
        for event in report.events {
            match event {
                ClockEvent::AlarmStarted { at } => {
                    outcome.notifications.push(Notification::AlarmStarted { at });
                }
                ClockEvent::Midnight { .. } => outcome.maintenance_due = true,
                ClockEvent::AlarmReenabled => {}
                ClockEvent::ClockWentBackwards { .. } => self.last_darkness_eval = None,
            }
        }

        let ts = now.timestamp();
        let darkness_due = self
            .last_darkness_eval
            .map(|last| ts - last >= DARKNESS_INTERVAL_SECS || ts < last)
            .unwrap_or(true);
        if darkness_due {
            self.last_darkness_eval = Some(ts);
            if let Some(is_dark) = self.darkness.evaluate(now) {
                outcome
                    .notifications
                    .push(Notification::DarknessChanged { is_dark });
            }
        }

        let next = self
            .settings
            .schedule
            .next_fire_time_from(now)
            .map(|t| t.with_timezone(&Utc));
        if self.last_next_alarm != Some(next) {
            self.last_next_alarm = Some(next);
            outcome.notifications.push(Notification::NextAlarmChanged {
                next: next.map(|t| t.with_timezone(&now.offset().fix())),
            });
        }

        outcome
    }

    /// Apply a reading from the external light/weather feed.
    pub fn record_external(&mut self, reading: ExternalReading) -> Option<Notification> {
        self.settings.last_external_update = Some(reading);
        self.darkness
            .record_external(reading)
            .map(|is_dark| Notification::DarknessChanged { is_dark })
    }

    pub fn acknowledge(&mut self) -> Option<Notification> {
        let ack = self.clock.acknowledge(&mut self.settings.schedule);
        ack.was_alarming.then_some(Notification::AlarmAcknowledged {
            disabled_until_midnight: ack.disabled_until_midnight,
        })
    }

    /// Handle one operator command at time `now`.
    pub fn apply<Tz: TimeZone>(&mut self, command: Command, now: &DateTime<Tz>) -> Reply
    where
        Tz::Offset: std::fmt::Display,
    {
        match command {
            Command::Acknowledge => match self.acknowledge() {
                Some(notification) => {
                    let disabled = matches!(
                        notification,
                        Notification::AlarmAcknowledged {
                            disabled_until_midnight: true
                        }
                    );
                    let mut reply = if disabled {
                        Reply::changed("Alarm acknowledged, disabled until midnight")
                    } else {
                        Reply::text("Alarm acknowledged")
                    };
                    reply.notifications.push(notification);
                    reply
                }
                None => Reply::text("Not alarming"),
            },
            Command::Enable(enabled) => {
                self.settings.schedule.set_enabled(enabled);
                info!("Alarm {}", if enabled { "enabled" } else { "disabled" });
                Reply::changed(format!("Alarm {}", on_off(enabled)))
            }
            Command::Toggle => {
                let enabled = self.settings.schedule.toggle_enabled();
                info!("Alarm {}", if enabled { "enabled" } else { "disabled" });
                Reply::changed(format!("Alarm {}", on_off(enabled)))
            }
            Command::Set(slot, time) => {
                if !time.is_valid() {
                    warn!("Refusing invalid alarm time {:?}", time);
                    return Reply::text("Invalid time");
                }
                self.settings.schedule.set(slot, time);
                info!("{} alarm set to {}", slot, time);
                Reply::changed(format!("{} alarm set to {}", slot_label(slot), time))
            }
            Command::Clear(slot) => {
                self.settings.schedule.clear(slot);
                info!("{} alarm cleared", slot);
                Reply::changed(format!("{} alarm cleared", slot_label(slot)))
            }
            Command::AutoReenable(on) => {
                self.settings.schedule.auto_reenable_at_midnight = on;
                Reply::changed(format!("Auto re-enable at midnight {}", on_off(on)))
            }
            Command::DimWhenDark(on) => {
                self.settings.dim_when_dark = on;
                Reply::changed(format!("Dim when dark {}", on_off(on)))
            }
            Command::QueryNext => Reply::text(self.describe_next(now)),
            Command::QueryStatus => Reply::text(self.describe_status(now)),
            Command::Quit => Reply {
                message: "Bye".to_string(),
                quit: true,
                ..Reply::default()
            },
        }
    }

    pub fn describe_next<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        match self.settings.schedule.next_fire_time_from(now) {
            Some(next) => {
                let secs = next.timestamp() - now.timestamp();
                let disabled = if self.settings.schedule.enabled {
                    ""
                } else {
                    " (alarm disabled)"
                };
                format!(
                    "Next alarm: {} (in {}){}",
                    next.format("%a %Y-%m-%d %H:%M"),
                    format_minutes(secs),
                    disabled
                )
            }
            None => "No alarm set".to_string(),
        }
    }

    pub fn describe_status<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        let s = &self.settings.schedule;
        let mut lines = vec![
            format!(
                "Alarm:     {}{}",
                if s.enabled { "enabled" } else { "disabled" },
                if s.auto_reenable_at_midnight {
                    ", auto re-enable at midnight"
                } else {
                    ""
                }
            ),
            format!("State:     {:?}", self.clock.state()),
            format!("One-time:  {}", s.one_time),
            format!("Daily:     {}", s.daily),
        ];
        for day in Weekday::ALL {
            lines.push(format!("{}:       {}", day, s.weekly[day.index()]));
        }
        lines.push(format!(
            "Dark:      {}{}",
            if self.darkness.is_dark() { "yes" } else { "no" },
            if self.settings.dim_when_dark {
                ", dimming"
            } else {
                ""
            }
        ));
        lines.push(self.describe_next(now));
        lines.join("\n")
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

fn slot_label(slot: AlarmSlot) -> String {
    match slot {
        AlarmSlot::OneTime => "One-time".to_string(),
        AlarmSlot::Daily => "Daily".to_string(),
        AlarmSlot::Day(day) => day.to_string(),
    }
}
