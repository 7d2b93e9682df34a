// DriftClock Backlight Control
// sysfs brightness file with a cached current level

use std::path::PathBuf;
use tracing::{debug, info};

use crate::error::{ClockError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacklightConfig {
    pub path: PathBuf,
    pub bright_level: u8,
    pub dim_level: u8,
}

#[derive(Debug)]
pub struct Backlight {
    config: BacklightConfig,
    cached: Option<u8>,
}

impl Backlight {
    pub fn new(config: BacklightConfig) -> Self {
        Self {
            config,
            cached: None,
        }
    }

    /// Current brightness (0-255), read from the file once and cached.
    pub fn brightness(&mut self) -> Result<u8> {
        if let Some(level) = self.cached {
            return Ok(level);
        }
        let text = std::fs::read_to_string(&self.config.path)
            .map_err(|e| ClockError::io_at(&self.config.path, e))?;
        let text = text.trim();
        let level = text
            .parse::<u8>()
            .map_err(|_| ClockError::Parse(format!("brightness '{}' is not 0-255", text)))?;
        debug!("Got LCD brightness: {}", level);
        self.cached = Some(level);
        Ok(level)
    }

    /// Write `level` unless it is already the current value.
    /// Returns `true` when the file was written.
    pub fn set_brightness(&mut self, level: u8) -> Result<bool> {
        if matches!(self.brightness(), Ok(current) if current == level) {
            return Ok(false);
        }
        std::fs::write(&self.config.path, level.to_string())
            .map_err(|e| ClockError::io_at(&self.config.path, e))?;
        info!("Set LCD brightness to {}", level);
        self.cached = Some(level);
        Ok(true)
    }

    /// Dim level when `dim` is set, bright level otherwise.
    pub fn apply(&mut self, dim: bool) -> Result<bool> {
        let level = if dim {
            self.config.dim_level
        } else {
            self.config.bright_level
        };
        self.set_brightness(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(initial: &str) -> (tempfile::TempDir, Backlight) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brightness");
        std::fs::write(&path, initial).unwrap();
        let backlight = Backlight::new(BacklightConfig {
            path,
            bright_level: 255,
            dim_level: 50,
        });
        (dir, backlight)
    }

    #[test]
    fn test_reads_and_caches() {
        let (dir, mut bl) = setup("128\n");
        assert_eq!(bl.brightness().unwrap(), 128);
        // Cached: an external change is not picked up
        std::fs::write(dir.path().join("brightness"), "10").unwrap();
        assert_eq!(bl.brightness().unwrap(), 128);
    }

    #[test]
    fn test_apply_writes_only_on_change() {
        let (dir, mut bl) = setup("255");
        assert!(!bl.apply(false).unwrap());
        assert!(bl.apply(true).unwrap());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("brightness")).unwrap(),
            "50"
        );
        assert!(!bl.apply(true).unwrap());
        assert!(bl.apply(false).unwrap());
    }

    #[test]
    fn test_unparseable_file_is_overwritten() {
        let (dir, mut bl) = setup("bogus");
        assert!(bl.brightness().is_err());
        assert!(bl.set_brightness(50).unwrap());
        assert_eq!(bl.brightness().unwrap(), 50);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("brightness")).unwrap(),
            "50"
        );
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut bl = Backlight::new(BacklightConfig {
            path: dir.path().join("nope").join("brightness"),
            bright_level: 255,
            dim_level: 50,
        });
        assert!(bl.brightness().is_err());
        assert!(bl.apply(true).is_err());
    }
}
