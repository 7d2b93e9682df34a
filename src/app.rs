// DriftClock Application Loop
// Wires the controller to the backlight, audio, settings writer,
// Home Assistant task and the stdin command channel

use chrono::{Local, Utc};
use std::time::{Duration, Instant, SystemTime};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::audio::{AlarmPlayer, PlayerAction};
use crate::backlight::Backlight;
use crate::commands::Command;
use crate::config::AppConfig;
use crate::controller::{ClockCore, Notification, TickOutcome};
use crate::darkness::ExternalReading;
use crate::error::Result;
use crate::home_assistant::{HomeAssistantClient, HomeAssistantInfo, PublishedState};
use crate::settings::{
    backups_dir, load_settings, prune_backups, save_settings, settings_path, PersistHandle,
    BACKUP_MAX_AGE,
};

/// Load settings, apply one command and save if it changed anything.
/// Returns the reply text.
pub fn run_once(config: &AppConfig, command: Command) -> Result<String> {
    let settings = load_settings(&settings_path(&config.data_dir));
    let now = Local::now();
    let mut core = ClockCore::new(settings, config.darkness, &now);
    let reply = core.apply(command, &now);
    if reply.persist_requested {
        save_settings(core.settings(), &config.data_dir)?;
    }
    Ok(reply.message)
}

/// I/O side of the clock, owned by the control loop.
struct Outputs {
    backlight: Backlight,
    backlight_failed: bool,
    player: AlarmPlayer,
    persist: PersistHandle,
    state_tx: watch::Sender<PublishedState>,
    data_dir: std::path::PathBuf,
}

impl Outputs {
    fn apply_backlight(&mut self, core: &ClockCore) {
        match self.backlight.apply(core.should_dim()) {
            Ok(_) => self.backlight_failed = false,
            Err(e) => {
                if !self.backlight_failed {
                    warn!("Cannot set backlight: {}", e);
                }
                self.backlight_failed = true;
            }
        }
    }

    fn handle_notifications(&mut self, core: &ClockCore, notifications: &[Notification]) {
        for notification in notifications {
            match notification {
                Notification::AlarmStarted { at } => {
                    info!("Alarm started at {}", at.with_timezone(&Local));
                }
                Notification::AlarmAcknowledged {
                    disabled_until_midnight,
                } => {
                    debug!(
                        "Alarm acknowledged (disabled until midnight: {})",
                        disabled_until_midnight
                    );
                    self.player.update(false, Instant::now());
                }
                Notification::DarknessChanged { .. } => self.apply_backlight(core),
                Notification::NextAlarmChanged { next } => match next {
                    Some(t) => info!("Next alarm at {}", t.format("%a %Y-%m-%d %H:%M")),
                    None => info!("No alarm scheduled"),
                },
            }
        }
    }

    fn publish(&self, core: &ClockCore) {
        let state = PublishedState {
            alarming: core.is_alarming(),
            alarm_enabled: core.schedule().enabled,
            next_alarm: core.schedule().next_fire_time(),
        };
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    fn after_tick(&mut self, core: &ClockCore, outcome: &TickOutcome) {
        self.handle_notifications(core, &outcome.notifications);
        if outcome.persist_requested {
            self.persist.request(core.settings().clone());
        }
        if outcome.maintenance_due {
            let dir = backups_dir(&self.data_dir);
            tokio::task::spawn_blocking(move || {
                match prune_backups(&dir, SystemTime::now(), BACKUP_MAX_AGE) {
                    Ok(n) if n > 0 => info!("Pruned {} old backup(s)", n),
                    Ok(_) => {}
                    Err(e) => warn!("Backup pruning failed: {}", e),
                }
            });
        }

        if let PlayerAction::Started(file) = self.player.update(core.is_alarming(), Instant::now())
        {
            debug!("Alarm audio: {}", file.display());
        }
        self.publish(core);
    }
}

fn handle_info(core: &mut ClockCore, info: HomeAssistantInfo, outputs: &mut Outputs) {
    if let Some(weather) = &info.weather {
        debug!(
            "Weather: {} {}{}",
            weather,
            info.temperature.map(|t| format!("{:.0}", t)).unwrap_or_default(),
            info.temperature_unit.as_deref().unwrap_or("")
        );
    }
    // External darkness only drives the clock in sun mode
    if !core.uses_sun() {
        return;
    }
    if let Some(is_dark) = info.is_dark {
        let reading = ExternalReading {
            is_dark,
            at: Utc::now(),
        };
        if let Some(notification) = core.record_external(reading) {
            outputs.handle_notifications(core, &[notification]);
        }
    }
}

/// Run the clock until `quit`, end of a closed control loop, or Ctrl-C.
pub async fn run(config: AppConfig) -> Result<()> {
    let settings = load_settings(&settings_path(&config.data_dir));
    let mut core = ClockCore::new(settings, config.darkness, &Local::now());

    let (persist, persist_task) = PersistHandle::spawn(config.data_dir.clone());
    let (state_tx, state_rx) = watch::channel(PublishedState::default());
    let (info_tx, mut info_rx) = mpsc::channel::<HomeAssistantInfo>(4);

    let ha_task = match config.home_assistant.clone() {
        Some(ha) => match HomeAssistantClient::new(ha) {
            Ok(client) => Some(tokio::spawn(client.run(state_rx, info_tx))),
            Err(e) => {
                warn!("Home Assistant disabled: {}", e);
                None
            }
        },
        None => None,
    };

    let mut outputs = Outputs {
        backlight: Backlight::new(config.backlight.clone()),
        backlight_failed: false,
        player: AlarmPlayer::new(config.audio.clone()),
        persist,
        state_tx,
        data_dir: config.data_dir.clone(),
    };
    outputs.apply_backlight(&core);

    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / config.fps as f64));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Loaded and ready");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let outcome = core.tick(&Local::now());
                outputs.after_tick(&core, &outcome);
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let reply = match line.parse::<Command>() {
                        Ok(command) => core.apply(command, &Local::now()),
                        Err(e) => {
                            println!("{}", e);
                            continue;
                        }
                    };
                    println!("{}", reply.message);
                    outputs.handle_notifications(&core, &reply.notifications);
                    if reply.persist_requested {
                        outputs.persist.request(core.settings().clone());
                    }
                    outputs.apply_backlight(&core);
                    if reply.quit {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("Command input closed");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!("Failed to read command input: {}", e);
                    stdin_open = false;
                }
            },
            Some(info) = info_rx.recv(), if ha_task.is_some() => {
                handle_info(&mut core, info, &mut outputs);
            }
            _ = &mut shutdown => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    outputs.player.stop();
    if let Some(task) = ha_task {
        task.abort();
    }

    // Final snapshot carries the latest external reading
    outputs.persist.request(core.settings().clone());
    let Outputs { persist, .. } = outputs;
    drop(persist);
    if let Err(e) = persist_task.await {
        warn!("Settings writer did not finish cleanly: {}", e);
    }
    info!("Stopped");
    Ok(())
}
