// DriftClock Settings Persistence
// settings.json document, lenient loading, dated backups and background saving

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::alarm_schedule::AlarmSchedule;
use crate::alarm_time::AlarmTime;
use crate::darkness::ExternalReading;
use crate::error::{ClockError, Result};

/// Serializes writers of settings.json and its backups.
pub static SETTINGS_WRITE_LOCK: LazyLock<std::sync::Mutex<()>> =
    LazyLock::new(|| std::sync::Mutex::new(()));

pub const SETTINGS_FILE: &str = "settings.json";
pub const BACKUPS_DIR: &str = "backups";

/// Backups older than this are removed by the midnight maintenance pass.
pub const BACKUP_MAX_AGE: Duration = Duration::from_secs(86_400 * 30);

/// Everything the clock remembers between runs. Written with serde, read
/// back field by field through `merge_json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    #[serde(flatten)]
    pub schedule: AlarmSchedule,
    pub dim_when_dark: bool,
    pub flip_clock_style: bool,
    /// Seconds before the menu falls back to the clock face.
    pub screen_timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_pos: Option<[i32; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_external_update: Option<ExternalReading>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schedule: AlarmSchedule::default(),
            dim_when_dark: true,
            flip_clock_style: false,
            screen_timeout: 15,
            window_pos: None,
            last_external_update: None,
        }
    }
}

impl Settings {
    /// Apply every well-formed field of `value` on top of `self`.
    ///
    /// Fields that are missing, of the wrong type or out of range leave the
    /// current value untouched. Returns `false` when `value` is not an object.
    pub fn merge_json(&mut self, value: &Value) -> bool {
        let Some(obj) = value.as_object() else {
            return false;
        };

        if let Some(v) = obj.get("enable_alarm").and_then(Value::as_bool) {
            self.schedule.enabled = v;
        }
        if let Some(v) = obj.get("dim_when_dark").and_then(Value::as_bool) {
            self.dim_when_dark = v;
        }
        if let Some(v) = obj.get("auto_enable_at_midnight").and_then(Value::as_bool) {
            self.schedule.auto_reenable_at_midnight = v;
        }
        if let Some(v) = obj.get("flip_clock_style").and_then(Value::as_bool) {
            self.flip_clock_style = v;
        }
        if let Some(v) = obj.get("screen_timeout").and_then(Value::as_i64) {
            self.screen_timeout = v.max(1) as u64;
        }

        if let Some(v) = obj.get("one_time_alarm") {
            merge_alarm_time(&mut self.schedule.one_time, v);
        }
        if let Some(v) = obj.get("alarm_time") {
            merge_alarm_time(&mut self.schedule.daily, v);
        }
        if let Some(days) = obj.get("daily_alarms").and_then(Value::as_array) {
            for (slot, v) in self.schedule.weekly.iter_mut().zip(days.iter()) {
                merge_alarm_time(slot, v);
            }
        }

        if let Some(pos) = obj.get("window_pos").and_then(parse_point) {
            self.window_pos = Some(pos);
        }
        if let Some(v) = obj.get("last_external_update") {
            match serde_json::from_value::<ExternalReading>(v.clone()) {
                Ok(reading) => self.last_external_update = Some(reading),
                Err(e) => debug!("Ignoring last_external_update: {}", e),
            }
        }
        true
    }
}

/// Merge an `{"hour": h, "minute": m}` object into `target`. The merged
/// value is kept only when it is a valid time or an explicit unset.
fn merge_alarm_time(target: &mut AlarmTime, value: &Value) {
    let Some(obj) = value.as_object() else {
        return;
    };
    let field = |key: &str, current: i32| {
        obj.get(key)
            .and_then(Value::as_i64)
            .and_then(|n| i32::try_from(n).ok())
            .unwrap_or(current)
    };
    let merged = AlarmTime::new(field("hour", target.hour), field("minute", target.minute));

    if merged.is_valid() {
        *target = merged;
    } else if merged.hour == -1 || merged.minute == -1 {
        *target = AlarmTime::UNSET;
    } else {
        debug!("Ignoring out-of-range alarm time {}:{}", merged.hour, merged.minute);
    }
}

fn parse_point(value: &Value) -> Option<[i32; 2]> {
    let arr = value.as_array()?;
    if arr.len() != 2 {
        return None;
    }
    let x = i32::try_from(arr[0].as_i64()?).ok()?;
    let y = i32::try_from(arr[1].as_i64()?).ok()?;
    Some([x, y])
}

pub fn settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SETTINGS_FILE)
}

pub fn backups_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(BACKUPS_DIR)
}

/// Load settings from `path`.
///
/// Returns `Settings::default()` when the file does not exist or cannot be
/// parsed; individual bad fields fall back to their defaults.
pub fn load_settings(path: &Path) -> Settings {
    let mut settings = Settings::default();

    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No settings found at {}. Using defaults.", path.display());
            return settings;
        }
        Err(e) => {
            warn!(
                "Failed to read settings at {}: {}. Using defaults.",
                path.display(),
                e
            );
            return settings;
        }
    };

    match serde_json::from_str::<Value>(&contents) {
        Ok(value) => {
            if settings.merge_json(&value) {
                info!("Settings loaded from {}", path.display());
            } else {
                warn!(
                    "Settings at {} is not a JSON object. Using defaults.",
                    path.display()
                );
            }
        }
        Err(e) => {
            warn!(
                "Failed to parse settings at {}: {}. Using defaults.",
                path.display(),
                e
            );
        }
    }
    settings
}

/// Copy an existing `file` into `backup_dir` as `<name>.YYYYMMDDnn`,
/// picking the first free `nn`. Returns the backup path, or `None` when
/// there was nothing to back up.
pub fn backup_file(file: &Path, backup_dir: &Path, now: DateTime<Local>) -> Result<Option<PathBuf>> {
    if !file.exists() {
        return Ok(None);
    }
    std::fs::create_dir_all(backup_dir).map_err(|e| ClockError::io_at(backup_dir, e))?;

    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ClockError::Config(format!("{} has no file name", file.display())))?;
    let stamp = now.format("%Y%m%d");

    let mut index = 0u32;
    let target = loop {
        let candidate = backup_dir.join(format!("{}.{}{:02}", name, stamp, index));
        if !candidate.exists() {
            break candidate;
        }
        index += 1;
    };

    std::fs::copy(file, &target).map_err(|e| ClockError::io_at(&target, e))?;
    debug!("Backed up {} to {}", file.display(), target.display());
    Ok(Some(target))
}

/// Save settings into `data_dir`, backing up the previous file first.
pub fn save_settings(settings: &Settings, data_dir: &Path) -> Result<()> {
    let _lock = SETTINGS_WRITE_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    std::fs::create_dir_all(data_dir).map_err(|e| ClockError::io_at(data_dir, e))?;
    let path = settings_path(data_dir);
    backup_file(&path, &backups_dir(data_dir), Local::now())?;

    let json = serde_json::to_string_pretty(settings)?;

    // Atomic write: temp file + rename
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &json).map_err(|e| ClockError::io_at(&tmp_path, e))?;
    std::fs::rename(&tmp_path, &path).map_err(|e| ClockError::io_at(&path, e))?;

    info!("Settings saved to {}", path.display());
    Ok(())
}

/// Delete files in `dir` whose modification time is older than
/// `now - max_age`. Dot-files are left alone. Returns the number removed.
pub fn prune_backups(dir: &Path, now: SystemTime, max_age: Duration) -> Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(ClockError::io_at(dir, e)),
    };
    let cutoff = now.checked_sub(max_age).unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = 0;
    for entry in entries.flatten() {
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(m) => m,
            Err(_) => continue,
        };
        if modified > SystemTime::UNIX_EPOCH && modified < cutoff {
            let path = entry.path();
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    info!("Removed old backup file {}", path.display());
                    removed += 1;
                }
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }
    Ok(removed)
}

// ---------------------------------------------------------------------------
// Background writer
// ---------------------------------------------------------------------------

/// Fire-and-forget handle to the settings writer task.
///
/// Requests queued while a save is in progress collapse into the newest
/// one, so the file always ends up with the last snapshot sent.
#[derive(Debug, Clone)]
pub struct PersistHandle {
    tx: mpsc::UnboundedSender<Settings>,
}

impl PersistHandle {
    /// Start the writer. The task ends once every handle has been dropped
    /// and the queue is drained.
    pub fn spawn(data_dir: PathBuf) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Settings>();
        let task = tokio::spawn(async move {
            while let Some(mut latest) = rx.recv().await {
                while let Ok(newer) = rx.try_recv() {
                    latest = newer;
                }
                let dir = data_dir.clone();
                let result =
                    tokio::task::spawn_blocking(move || save_settings(&latest, &dir)).await;
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("Failed to save settings: {}", e),
                    Err(e) => warn!("Settings writer panicked: {}", e),
                }
            }
            debug!("Settings writer stopped");
        });
        (Self { tx }, task)
    }

    /// Queue a snapshot for saving.
    pub fn request(&self, settings: Settings) {
        if self.tx.send(settings).is_err() {
            warn!("Settings writer is gone, dropping save request");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm_schedule::Weekday;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert!(s.dim_when_dark);
        assert!(!s.flip_clock_style);
        assert_eq!(s.screen_timeout, 15);
        assert!(s.schedule.is_empty());
    }

    #[test]
    fn test_merge_full_document() {
        let doc = json!({
            "enable_alarm": true,
            "dim_when_dark": false,
            "auto_enable_at_midnight": true,
            "flip_clock_style": true,
            "screen_timeout": 30,
            "one_time_alarm": {"hour": 6, "minute": 45},
            "alarm_time": {"hour": 7, "minute": 0},
            "daily_alarms": [
                {"hour": -1, "minute": -1},
                {"hour": -1, "minute": -1},
                {"hour": -1, "minute": -1},
                {"hour": 8, "minute": 30},
                {"hour": -1, "minute": -1},
                {"hour": -1, "minute": -1},
                {"hour": -1, "minute": -1}
            ],
            "window_pos": [100, 200]
        });
        let mut s = Settings::default();
        assert!(s.merge_json(&doc));
        assert!(s.schedule.enabled);
        assert!(s.schedule.auto_reenable_at_midnight);
        assert!(!s.dim_when_dark);
        assert!(s.flip_clock_style);
        assert_eq!(s.screen_timeout, 30);
        assert_eq!(s.schedule.one_time, AlarmTime::new(6, 45));
        assert_eq!(s.schedule.daily, AlarmTime::new(7, 0));
        assert_eq!(s.schedule.weekly[Weekday::Wed.index()], AlarmTime::new(8, 30));
        assert_eq!(s.schedule.weekly_count(), 1);
        assert_eq!(s.window_pos, Some([100, 200]));
    }

    #[test]
    fn test_merge_ignores_bad_fields() {
        let mut s = Settings::default();
        s.schedule.daily = AlarmTime::new(7, 0);
        let doc = json!({
            "enable_alarm": "yes",
            "screen_timeout": 0,
            "alarm_time": {"hour": 25, "minute": 0},
            "one_time_alarm": "6:45",
            "daily_alarms": [{"hour": 6, "minute": 99}, {"hour": 9, "minute": 15}],
            "window_pos": [1, 2, 3]
        });
        assert!(s.merge_json(&doc));
        assert!(!s.schedule.enabled);
        // Clamped to the one-second minimum
        assert_eq!(s.screen_timeout, 1);
        assert_eq!(s.schedule.daily, AlarmTime::new(7, 0));
        assert!(!s.schedule.one_time.is_valid());
        assert!(!s.schedule.weekly[0].is_valid());
        assert_eq!(s.schedule.weekly[1], AlarmTime::new(9, 15));
        assert_eq!(s.window_pos, None);
    }

    #[test]
    fn test_merge_partial_alarm_time_and_unset() {
        let mut s = Settings::default();
        s.schedule.daily = AlarmTime::new(7, 0);
        s.merge_json(&json!({"alarm_time": {"minute": 30}}));
        assert_eq!(s.schedule.daily, AlarmTime::new(7, 30));
        s.merge_json(&json!({"alarm_time": {"hour": -1, "minute": -1}}));
        assert_eq!(s.schedule.daily, AlarmTime::UNSET);
    }

    #[test]
    fn test_merge_rejects_non_object() {
        let mut s = Settings::default();
        assert!(!s.merge_json(&json!([1, 2, 3])));
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn test_serialized_keys() {
        let mut s = Settings::default();
        s.schedule.daily = AlarmTime::new(7, 0);
        s.last_external_update = Some(ExternalReading {
            is_dark: true,
            at: Utc.with_ymd_and_hms(2026, 10, 14, 3, 0, 0).single().unwrap(),
        });
        let v = serde_json::to_value(&s).expect("serialize");
        for key in [
            "enable_alarm",
            "auto_enable_at_midnight",
            "one_time_alarm",
            "alarm_time",
            "daily_alarms",
            "dim_when_dark",
            "flip_clock_style",
            "screen_timeout",
            "last_external_update",
        ] {
            assert!(v.get(key).is_some(), "missing {}", key);
        }
        assert!(v.get("window_pos").is_none());

        let mut back = Settings::default();
        back.merge_json(&v);
        assert_eq!(back, s);
    }

    #[test]
    fn test_load_missing_or_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        assert_eq!(load_settings(&path), Settings::default());

        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(load_settings(&path), Settings::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = Settings::default();
        s.schedule.enabled = true;
        s.schedule.weekly[Weekday::Fri.index()] = AlarmTime::new(5, 30);

        save_settings(&s, dir.path()).unwrap();
        let loaded = load_settings(&settings_path(dir.path()));
        assert_eq!(loaded, s);
        assert!(!dir.path().join("settings.json.tmp").exists());
    }

    #[test]
    fn test_save_creates_dated_backups() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::default();
        save_settings(&s, dir.path()).unwrap();
        // First save has nothing to back up
        assert!(!backups_dir(dir.path()).exists());

        save_settings(&s, dir.path()).unwrap();
        save_settings(&s, dir.path()).unwrap();
        let mut names: Vec<String> = std::fs::read_dir(backups_dir(dir.path()))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names.len(), 2);
        assert!(names[0].starts_with("settings.json."));
        assert!(names[0].ends_with("00"));
        assert!(names[1].ends_with("01"));
        assert_eq!(names[0].len(), "settings.json.".len() + 10);
    }

    #[test]
    fn test_backup_file_naming() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("settings.json");
        std::fs::write(&file, "{}").unwrap();
        let now = Local.with_ymd_and_hms(2026, 10, 14, 9, 0, 0).single().unwrap();
        let backups = dir.path().join("backups");

        let first = backup_file(&file, &backups, now).unwrap().unwrap();
        assert_eq!(first, backups.join("settings.json.2026101400"));
        let second = backup_file(&file, &backups, now).unwrap().unwrap();
        assert_eq!(second, backups.join("settings.json.2026101401"));

        let missing = dir.path().join("other.json");
        assert_eq!(backup_file(&missing, &backups, now).unwrap(), None);
    }

    #[test]
    fn test_prune_backups() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("settings.json.2026091400"), "{}").unwrap();
        std::fs::write(dir.path().join(".keep"), "").unwrap();

        // Fresh files survive
        assert_eq!(
            prune_backups(dir.path(), SystemTime::now(), BACKUP_MAX_AGE).unwrap(),
            0
        );

        // Thirty-one days on, the backup is stale but dot-files are kept
        let later = SystemTime::now() + Duration::from_secs(86_400 * 31);
        assert_eq!(prune_backups(dir.path(), later, BACKUP_MAX_AGE).unwrap(), 1);
        assert!(dir.path().join(".keep").exists());

        let missing = dir.path().join("nope");
        assert_eq!(prune_backups(&missing, later, BACKUP_MAX_AGE).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_persist_handle_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, task) = PersistHandle::spawn(dir.path().to_path_buf());

        for minute in 0..5 {
            let mut s = Settings::default();
            s.schedule.daily = AlarmTime::new(7, minute);
            handle.request(s);
        }
        drop(handle);
        task.await.unwrap();

        let loaded = load_settings(&settings_path(dir.path()));
        assert_eq!(loaded.schedule.daily, AlarmTime::new(7, 4));
    }
}
