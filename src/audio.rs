// DriftClock Alarm Audio
// Sound discovery and an external player process driven by the alarm state

use rand::seq::SliceRandom;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const SOUND_EXTENSIONS: [&str; 5] = ["wav", "ogg", "mp3", "flac", "opus"];

/// Pause between the end of one playback and the next while alarming.
pub const REPLAY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioConfig {
    pub sounds_dir: PathBuf,
    /// Program invoked as `<player> <file>`.
    pub player: String,
}

/// Audio files directly inside `dir` with a known extension, sorted.
pub fn discover_sounds(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            warn!("Cannot read alarm sounds in {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .map(|ext| {
                    let ext = ext.to_string_lossy().to_ascii_lowercase();
                    SOUND_EXTENSIONS.contains(&ext.as_str())
                })
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerAction {
    Idle,
    Started(PathBuf),
    Stopped,
}

#[derive(Debug)]
pub struct AlarmPlayer {
    config: AudioConfig,
    files: Option<Vec<PathBuf>>,
    child: Option<Child>,
    finished_at: Option<Instant>,
}

impl AlarmPlayer {
    pub fn new(config: AudioConfig) -> Self {
        Self {
            config,
            files: None,
            child: None,
            finished_at: None,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.child.is_some()
    }

    /// Drive playback from the alarm state. Call every tick.
    pub fn update(&mut self, alarming: bool, now: Instant) -> PlayerAction {
        self.reap(now);

        if !alarming {
            self.finished_at = None;
            return if self.stop() {
                PlayerAction::Stopped
            } else {
                PlayerAction::Idle
            };
        }

        if self.child.is_some() {
            return PlayerAction::Idle;
        }
        if let Some(finished) = self.finished_at {
            if now.saturating_duration_since(finished) < REPLAY_DELAY {
                return PlayerAction::Idle;
            }
        }

        match self.start() {
            Some(file) => PlayerAction::Started(file),
            None => {
                // Retry after the usual pause
                self.finished_at = Some(now);
                PlayerAction::Idle
            }
        }
    }

    /// Collect a finished player process.
    pub fn reap(&mut self, now: Instant) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!("Alarm player exited with {}", status);
                self.child = None;
                self.finished_at = Some(now);
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Failed to poll alarm player: {}", e);
                self.child = None;
                self.finished_at = Some(now);
            }
        }
    }

    fn pick(&mut self) -> Option<PathBuf> {
        // Rescan while empty so sounds added later are picked up
        if self.files.as_ref().map_or(true, Vec::is_empty) {
            self.files = Some(discover_sounds(&self.config.sounds_dir));
        }
        self.files
            .as_ref()
            .and_then(|files| files.choose(&mut rand::thread_rng()).cloned())
    }

    fn start(&mut self) -> Option<PathBuf> {
        let Some(file) = self.pick() else {
            warn!(
                "Could not find an alarm audio file in {}",
                self.config.sounds_dir.display()
            );
            return None;
        };

        info!("Playing alarm file {}", file.display());
        let spawned = Command::new(&self.config.player)
            .arg(&file)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(child) => {
                self.child = Some(child);
                Some(file)
            }
            Err(e) => {
                warn!("Failed to start {}: {}", self.config.player, e);
                None
            }
        }
    }

    /// Kill the player if it is running. Returns `true` if one was stopped.
    pub fn stop(&mut self) -> bool {
        let Some(mut child) = self.child.take() else {
            return false;
        };
        if let Err(e) = child.kill() {
            debug!("Alarm player already gone: {}", e);
        }
        let _ = child.wait();
        info!("Alarm audio stopped");
        true
    }
}

impl Drop for AlarmPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}
