//! # Pipeline Configuration
//!
//! All tunables of the streaming pipeline in one serde-friendly struct.
//! Every field has a default, so a configuration file only needs to list
//! the values it wants to change.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Requested input sample rate in Hz.
    pub sample_rate: u32,
    /// Number of new samples consumed per tick.
    pub hop_size: usize,
    /// Number of samples examined per pitch estimate.
    pub window_size: usize,
    /// Scheduler cadence in milliseconds.
    pub tick_interval_ms: u64,
    /// Octave assumed when a note is entered without one.
    pub default_octave: i32,
    /// Multiplier applied to the mean absolute sample value of a hop.
    pub peak_scale: f32,
    /// Windows quieter than this level (dB relative to full scale) are unvoiced.
    pub silence_threshold_db: f32,
    /// YIN absolute threshold on the normalized difference function.
    pub yin_threshold: f32,
    /// Lowest frequency reported as a pitch, in Hz.
    pub min_frequency: f32,
    /// Highest frequency reported as a pitch, in Hz.
    pub max_frequency: f32,
    /// Number of hops the capture channel can hold before overflowing.
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            hop_size: 1024,
            window_size: 4096,
            tick_interval_ms: 100,
            default_octave: 4,
            peak_scale: 2000.0,
            silence_threshold_db: -70.0,
            yin_threshold: 0.15,
            min_frequency: 27.5,
            max_frequency: 4186.0,
            channel_capacity: 16,
        }
    }
}

impl PipelineConfig {
    /// Loads a configuration from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut file = File::open(path.as_ref())?;
        let mut data = String::new();
        file.read_to_string(&mut data)?;
        let config: PipelineConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Checks the invariants the pipeline relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Zero("sample_rate"));
        }
        if self.hop_size == 0 {
            return Err(ConfigError::Zero("hop_size"));
        }
        if self.window_size == 0 {
            return Err(ConfigError::Zero("window_size"));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Zero("tick_interval_ms"));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Zero("channel_capacity"));
        }
        if self.window_size % self.hop_size != 0 {
            return Err(ConfigError::WindowNotMultipleOfHop {
                window: self.window_size,
                hop: self.hop_size,
            });
        }
        if !self.peak_scale.is_finite() || self.peak_scale < 0.0 {
            return Err(ConfigError::NotFinite {
                name: "peak_scale",
                value: self.peak_scale,
            });
        }
        if !self.yin_threshold.is_finite() || self.yin_threshold < 0.0 {
            return Err(ConfigError::NotFinite {
                name: "yin_threshold",
                value: self.yin_threshold,
            });
        }
        if !(self.min_frequency > 0.0 && self.min_frequency < self.max_frequency)
            || !self.max_frequency.is_finite()
        {
            return Err(ConfigError::FrequencyRange {
                min: self.min_frequency,
                max: self.max_frequency,
            });
        }
        Ok(())
    }
}
