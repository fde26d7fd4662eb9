use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::walker::StepRules;

/// File the panel persists settings to, relative to the working directory.
pub const SETTINGS_FILE_NAME: &str = "gridwalk_settings.json";

// Upper bounds, shared with the control panel sliders.
pub const MAX_GRID_SQUARE_SIZE: f32 = 100.0;
pub const MAX_GRID_DIMENSION: u32 = 100;
pub const MAX_WALKERS: u32 = 400;
pub const MAX_START_SIZE: f32 = 3.0;
pub const MAX_WALKER_SEPARATION: u32 = 10;
pub const MAX_CENTER_SEPARATION: u32 = 50;
pub const MAX_WALKER_AGE: u32 = 500;
pub const MAX_LINE_WIDTH: f32 = 10.0;
pub const MAX_STEP_INTERVAL_MS: u64 = 200;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("settings file error: {0}")]
    Io(#[from] io::Error),
    #[error("settings file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// Every tunable parameter. A clone is taken per run and never mutated.
///
/// Unknown keys in the settings file are ignored and missing keys fall back
/// to the defaults, so an old file keeps working after new fields appear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Grid
    pub grid_square_size: f32,
    pub num_columns: u32,
    pub num_rows: u32,

    // Visual
    pub show_grid: bool,
    pub grid_color: [u8; 3],
    pub background_color: [u8; 3],
    pub walker_dot_color: [u8; 3],
    pub walker_line_color: [u8; 3],
    pub walker_line_width: f32,

    // Walkers
    pub num_walkers: u32,
    /// Start dot diameter as a fraction of a grid square.
    pub walker_start_size: f32,
    /// Minimum taxicab distance between two start cells.
    pub walker_separation: u32,
    /// Start cells must be strictly further than this from the grid centre.
    pub walker_center_separation: u32,
    /// Steps each walker may take.
    pub walker_age: u32,
    pub allow_cross_paths: bool,
    pub allow_path_ends_merge: bool,
    pub center_attraction: f32,

    // Playback
    /// Minimum time between two executed draw operations.
    pub step_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grid_square_size: 20.0,
            num_columns: 25,
            num_rows: 12,
            show_grid: true,
            grid_color: [0x22, 0x22, 0x22],
            background_color: [0x11, 0x11, 0x11],
            walker_dot_color: [0xEE, 0xEE, 0xEE],
            walker_line_color: [0xEE, 0xEE, 0xEE],
            walker_line_width: 1.0,
            num_walkers: 30,
            walker_start_size: 0.7,
            walker_separation: 0,
            walker_center_separation: 4,
            walker_age: 500,
            allow_cross_paths: true,
            allow_path_ends_merge: true,
            center_attraction: 1.0,
            step_interval_ms: 20,
        }
    }
}

impl Config {
    /// Reject snapshots the simulation or renderer cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: &'static str) -> Result<(), ConfigError> {
            Err(ConfigError::Invalid { field, reason })
        }

        if !(1..=MAX_GRID_DIMENSION).contains(&self.num_rows) {
            return invalid("num_rows", "must lie in [1, 100]");
        }
        if !(1..=MAX_GRID_DIMENSION).contains(&self.num_columns) {
            return invalid("num_columns", "must lie in [1, 100]");
        }
        if !self.grid_square_size.is_finite()
            || self.grid_square_size <= 0.0
            || self.grid_square_size > MAX_GRID_SQUARE_SIZE
        {
            return invalid("grid_square_size", "must be positive and at most 100");
        }
        if self.num_walkers > MAX_WALKERS {
            return invalid("num_walkers", "must be at most 400");
        }
        if self.walker_separation > MAX_WALKER_SEPARATION {
            return invalid("walker_separation", "must be at most 10");
        }
        if self.walker_center_separation > MAX_CENTER_SEPARATION {
            return invalid("walker_center_separation", "must be at most 50");
        }
        if !(1..=MAX_WALKER_AGE).contains(&self.walker_age) {
            return invalid("walker_age", "must lie in [1, 500]");
        }
        if !(0.0..=1.0).contains(&self.center_attraction) {
            return invalid("center_attraction", "must lie in [0, 1]");
        }
        if !(0.0..=MAX_START_SIZE).contains(&self.walker_start_size) {
            return invalid("walker_start_size", "must lie in [0, 3]");
        }
        if !self.walker_line_width.is_finite()
            || self.walker_line_width <= 0.0
            || self.walker_line_width > MAX_LINE_WIDTH
        {
            return invalid("walker_line_width", "must be positive and at most 10");
        }
        if self.step_interval_ms > MAX_STEP_INTERVAL_MS {
            return invalid("step_interval_ms", "must be at most 200");
        }
        Ok(())
    }

    pub fn step_rules(&self) -> StepRules {
        StepRules {
            allow_cross_paths: self.allow_cross_paths,
            allow_path_ends_merge: self.allow_path_ends_merge,
            center_attraction: self.center_attraction,
        }
    }

    /// Drawing surface size in logical pixels.
    pub fn canvas_size(&self) -> (f32, f32) {
        (
            self.num_columns as f32 * self.grid_square_size,
            self.num_rows as f32 * self.grid_square_size,
        )
    }

    pub fn default_path() -> PathBuf {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(SETTINGS_FILE_NAME)
    }

    /// Read a settings file, merging stored keys over the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`Config::load`], but never fails. Bad files are logged and ignored.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => {
                log::info!("Loaded settings from {}", path.display());
                config
            }
            Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                log::warn!("Ignoring settings at {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Remove a stored settings file. A missing file is not an error.
    pub fn clear(path: &Path) -> Result<(), ConfigError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
