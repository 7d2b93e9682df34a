// DriftClock Application Configuration
// alarmclock.conf key=value options, command-line overrides and typed config

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use url::Url;

use crate::audio::AudioConfig;
use crate::backlight::BacklightConfig;
use crate::darkness::{DarknessMode, SunLocation, DEFAULT_LATITUDE, DEFAULT_LONGITUDE};
use crate::error::{ClockError, Result};

pub const DEFAULT_CONF_FILE: &str = "alarmclock.conf";
pub const DEFAULT_FPS: u32 = 30;

/// Raw option strings keyed without any leading dash.
///
/// Values set first win: command-line overrides are inserted before the
/// config file is read, and the file never replaces an existing key.
#[derive(Debug, Clone, Default)]
pub struct ArgMap {
    values: HashMap<String, String>,
}

impl ArgMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, replacing any earlier value.
    pub fn set(&mut self, key: &str, value: &str) {
        let key = normalize_key(key);
        self.values.insert(key.clone(), value.to_string());
        self.interpret_negative(&key);
    }

    /// Parse a `key=value` override as given on the command line.
    pub fn set_pair(&mut self, pair: &str) -> Result<()> {
        let (key, value) = pair
            .split_once('=')
            .map(|(k, v)| (k.trim(), v.trim()))
            .unwrap_or((pair.trim(), ""));
        if key.is_empty() {
            return Err(ClockError::Config(format!("empty option name in '{}'", pair)));
        }
        self.set(key, value);
        Ok(())
    }

    /// Merge config file text. Blank lines and lines starting with `#` or
    /// `/` are skipped, as are lines without `=`.
    pub fn merge_conf_str(&mut self, text: &str) {
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('/') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = normalize_key(key.trim());
            if key.is_empty() || self.values.contains_key(&key) {
                continue;
            }
            self.values.insert(key.clone(), value.trim().to_string());
            self.interpret_negative(&key);
        }
    }

    /// Merge a config file. A missing file is not an error and returns `false`.
    pub fn merge_conf_file(&mut self, path: &Path) -> Result<bool> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                self.merge_conf_str(&text);
                info!("Read config file {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("No config file found at {}", path.display());
                Ok(false)
            }
            Err(e) => Err(ClockError::io_at(path, e)),
        }
    }

    /// `nofoo=1` means `foo=0` (and `nofoo=0` means `foo=1`) unless `foo`
    /// is already set.
    fn interpret_negative(&mut self, key: &str) {
        let Some(positive) = key.strip_prefix("no") else {
            return;
        };
        if positive.is_empty() || self.values.contains_key(positive) {
            return;
        }
        let negated = self.get_bool(key, false).unwrap_or(false);
        let value = if negated { "0" } else { "1" };
        self.values.insert(positive.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Value of `key`, or `None` when unset or empty.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    pub fn get_str(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    pub fn get_i64(&self, key: &str, default: i64) -> Result<i64> {
        match self.get_non_empty(key) {
            Some(v) => v
                .parse()
                .map_err(|_| ClockError::Config(format!("{} must be an integer, got '{}'", key, v))),
            None => Ok(default),
        }
    }

    pub fn get_f64(&self, key: &str) -> Result<Option<f64>> {
        match self.get_non_empty(key) {
            Some(v) => v
                .parse()
                .map(Some)
                .map_err(|_| ClockError::Config(format!("{} must be a number, got '{}'", key, v))),
            None => Ok(None),
        }
    }

    /// A key present with an empty value counts as `true`.
    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        let Some(v) = self.get(key) else {
            return Ok(default);
        };
        match v.to_ascii_lowercase().as_str() {
            "" | "true" | "yes" | "on" => Ok(true),
            "false" | "no" | "off" => Ok(false),
            other => other
                .parse::<i64>()
                .map(|n| n != 0)
                .map_err(|_| ClockError::Config(format!("{} must be a boolean, got '{}'", key, v))),
        }
    }
}

fn normalize_key(key: &str) -> String {
    key.trim_start_matches('-').to_string()
}

/// Data directory: explicit path, else the platform data dir, else `./data`.
pub fn resolve_data_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    dirs::data_local_dir()
        .map(|d| d.join("driftclock"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}

/// A bare file name is looked up in the data dir; anything with a path
/// separator is used as given.
pub fn resolve_conf_path(data_dir: &Path, conf: Option<&str>) -> PathBuf {
    let conf = conf.filter(|c| !c.is_empty()).unwrap_or(DEFAULT_CONF_FILE);
    if conf.contains('/') || conf.contains('\\') {
        PathBuf::from(conf)
    } else {
        data_dir.join(conf)
    }
}

// ============ Home Assistant ============

#[derive(Debug, Clone, PartialEq)]
pub struct HomeAssistantConfig {
    /// Base URL, always ending in `/`.
    pub base_url: Url,
    pub token: String,
    pub alarming_entity: Option<String>,
    pub alarm_enabled_entity: Option<String>,
    pub next_alarm_entity: Option<String>,
    pub weather_entity: String,
    pub darkness_entity: String,
}

impl HomeAssistantConfig {
    /// `None` unless both URL and token are configured.
    pub fn from_args(args: &ArgMap) -> Result<Option<Self>> {
        let (Some(url), Some(token)) = (
            args.get_non_empty("home_assistant_url"),
            args.get_non_empty("home_assistant_token"),
        ) else {
            return Ok(None);
        };

        let mut base = url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| ClockError::Config(format!("home_assistant_url '{}': {}", url, e)))?;

        Ok(Some(Self {
            base_url,
            token: token.to_string(),
            alarming_entity: args.get_non_empty("home_assistant_alarming").map(String::from),
            alarm_enabled_entity: args
                .get_non_empty("home_assistant_alarm_enabled")
                .map(String::from),
            next_alarm_entity: args.get_non_empty("home_assistant_next_alarm").map(String::from),
            weather_entity: args.get_str("home_assistant_weather", "weather.openweathermap"),
            darkness_entity: args.get_str(
                "home_assistant_darkness",
                "sensor.custom_day_dark_sleep_w_o_weather",
            ),
        }))
    }

    /// `<base>/api/<path>`.
    pub fn api_url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join("api/")
            .and_then(|u| u.join(path))
            .map_err(|e| ClockError::Config(format!("bad Home Assistant path '{}': {}", path, e)))
    }
}

// ============ Application ============

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub darkness: DarknessMode,
    pub backlight: BacklightConfig,
    pub audio: AudioConfig,
    pub fps: u32,
    pub home_assistant: Option<HomeAssistantConfig>,
}

impl AppConfig {
    pub fn from_args(data_dir: PathBuf, args: &ArgMap) -> Result<Self> {
        let darkness = if args.get_bool("use_sun", false)? {
            DarknessMode::Sun(SunLocation {
                latitude: args.get_f64("latitude")?.unwrap_or(DEFAULT_LATITUDE),
                longitude: args.get_f64("longitude")?.unwrap_or(DEFAULT_LONGITUDE),
                utc_offset_hours: args.get_f64("sun_utc_offset")?,
            })
        } else {
            DarknessMode::default()
        };

        let level = |key: &str, default: i64| -> Result<u8> {
            Ok(args.get_i64(key, default)?.clamp(0, 255) as u8)
        };
        let backlight = BacklightConfig {
            path: PathBuf::from(args.get_str(
                "lcd_brightness_fn",
                "/sys/class/backlight/11-0045/brightness",
            )),
            bright_level: level("lcd_bright_level", 255)?,
            dim_level: level("lcd_dim_level", 50)?,
        };

        let sounds = args.get_str("alarm_sounds", "resources/alarms");
        let sounds_dir = if Path::new(&sounds).is_absolute() {
            PathBuf::from(sounds)
        } else {
            data_dir.join(sounds)
        };
        let audio = AudioConfig {
            sounds_dir,
            player: args.get_str("alarm_player", "aplay"),
        };

        let fps = args.get_i64("fps", DEFAULT_FPS as i64)?.clamp(1, 120) as u32;

        Ok(Self {
            data_dir,
            darkness,
            backlight,
            audio,
            fps,
            home_assistant: HomeAssistantConfig::from_args(args)?,
        })
    }
}
