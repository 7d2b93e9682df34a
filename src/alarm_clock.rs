// DriftClock Alarm State Machine
// Per-minute catch-up over wall-clock time, firing and acknowledgement

use chrono::{DateTime, NaiveDate, TimeZone, Timelike, Utc};
use tracing::{info, warn};

use crate::alarm_schedule::AlarmSchedule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmState {
    Idle,
    Alarming,
}

/// Something that happened while advancing the clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClockEvent {
    /// Idle -> Alarming at the given minute boundary.
    AlarmStarted { at: DateTime<Utc> },
    /// A local 00:00 boundary was crossed; maintenance is due.
    Midnight { date: NaiveDate },
    /// The schedule was switched back on at midnight.
    AlarmReenabled,
    /// `now` was earlier than the last processed second.
    ClockWentBackwards { seconds: i64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvanceReport {
    pub events: Vec<ClockEvent>,
    /// The schedule was mutated and should be saved.
    pub persist_requested: bool,
}

impl AdvanceReport {
    pub fn alarm_started(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, ClockEvent::AlarmStarted { .. }))
    }

    pub fn crossed_midnight(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, ClockEvent::Midnight { .. }))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Acknowledgement {
    /// False when there was nothing to silence.
    pub was_alarming: bool,
    /// The schedule was disabled until the next midnight and should be saved.
    pub disabled_until_midnight: bool,
}

/// Tick-driven controller over an `AlarmSchedule`.
///
/// Every whole-minute boundary in `(last_processed, now]` is evaluated
/// exactly once, so a suspended process or a forward clock jump never
/// skips a firing minute.
#[derive(Debug, Clone)]
pub struct AlarmClock {
    state: AlarmState,
    last_processed: i64,
}

impl AlarmClock {
    pub fn new<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        Self {
            state: AlarmState::Idle,
            last_processed: now.timestamp(),
        }
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    pub fn is_alarming(&self) -> bool {
        self.state == AlarmState::Alarming
    }

    /// Unix second up to which boundaries have been evaluated.
    pub fn last_processed(&self) -> i64 {
        self.last_processed
    }

    /// Process every minute boundary up to and including `now`.
    ///
    /// Local fields (hour, weekday, midnight) are taken in `now`'s zone.
    pub fn advance<Tz: TimeZone>(
        &mut self,
        schedule: &mut AlarmSchedule,
        now: &DateTime<Tz>,
    ) -> AdvanceReport {
        let mut report = AdvanceReport::default();
        let target = now.timestamp();

        if target < self.last_processed {
            let seconds = self.last_processed - target;
            warn!(
                "Clock moved backwards by {}s, skipping without evaluating alarms",
                seconds
            );
            self.last_processed = target;
            report.events.push(ClockEvent::ClockWentBackwards { seconds });
            return report;
        }

        let tz = now.timezone();
        let mut boundary = (self.last_processed.div_euclid(60) + 1) * 60;
        while boundary <= target {
            if let Some(utc) = DateTime::<Utc>::from_timestamp(boundary, 0) {
                let local = utc.with_timezone(&tz);
                self.process_minute(schedule, &local, &mut report);
            }
            boundary += 60;
        }

        self.last_processed = target;
        report
    }

    fn process_minute<Tz: TimeZone>(
        &mut self,
        schedule: &mut AlarmSchedule,
        local: &DateTime<Tz>,
        report: &mut AdvanceReport,
    ) {
        if local.hour() == 0 && local.minute() == 0 {
            report.events.push(ClockEvent::Midnight {
                date: local.date_naive(),
            });
            if schedule.on_midnight_rollover() {
                info!("Re-enabling alarm at midnight");
                report.events.push(ClockEvent::AlarmReenabled);
                report.persist_requested = true;
            }
        }

        if !schedule.enabled {
            return;
        }

        let check = schedule.should_fire_at(local);
        if check.schedule_changed {
            info!("One-time alarm consumed");
            report.persist_requested = true;
        }
        if check.fired && self.state == AlarmState::Idle {
            info!("Alarm!");
            self.state = AlarmState::Alarming;
            report.events.push(ClockEvent::AlarmStarted {
                at: local.with_timezone(&Utc),
            });
        }
    }

    /// Silence a ringing alarm.
    ///
    /// With auto re-enable on, the schedule is also disabled so it cannot
    /// ring again before the next midnight.
    pub fn acknowledge(&mut self, schedule: &mut AlarmSchedule) -> Acknowledgement {
        if self.state != AlarmState::Alarming {
            return Acknowledgement::default();
        }

        info!("Alarm acknowledged");
        self.state = AlarmState::Idle;

        let mut ack = Acknowledgement {
            was_alarming: true,
            disabled_until_midnight: false,
        };
        if schedule.auto_reenable_at_midnight {
            info!("Disabling alarm until midnight");
            schedule.enabled = false;
            ack.disabled_until_midnight = true;
        }
        ack
    }
}
