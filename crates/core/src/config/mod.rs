use std::{fmt, path::Path, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{BeatscopeError, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub analyser: AnalyserConfig,
    pub beat: BeatConfig,
}

impl AppConfig {
    /// Parses a JSON document. Missing fields fall back to their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.analyser.validate()?;
        self.beat.validate()
    }
}

/// How each normalised bin magnitude is turned into energy before averaging.
///
/// The threshold multiplier is calibrated against one specific compression,
/// so switching compression usually means retuning the multiplier too.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyCompression {
    /// `v²` for `v = byte / 255`.
    #[default]
    Linear,
    /// `log10(9·v + 1)²`, which lifts quiet bins and narrows the dynamic range.
    Logarithmic,
}

impl EnergyCompression {
    /// Energy of a single normalised magnitude in `[0, 1]`.
    pub fn energy(self, value: f32) -> f32 {
        match self {
            Self::Linear => value * value,
            Self::Logarithmic => {
                let compressed = (9.0 * value + 1.0).log10();
                compressed * compressed
            }
        }
    }
}

/// Policy used to derive the adaptive reference energy from the history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferencePolicy {
    /// Plain arithmetic mean of the window.
    #[default]
    Mean,
    /// Linearly weighted mean, the newest sample weighing `len` times the oldest.
    RecencyWeighted,
}

/// Named tuning profiles for the beat detector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TuningProfile {
    #[default]
    Responsive,
    Steady,
}

impl TuningProfile {
    pub fn beat_config(self) -> BeatConfig {
        match self {
            Self::Responsive => BeatConfig::responsive(),
            Self::Steady => BeatConfig::steady(),
        }
    }
}

impl FromStr for TuningProfile {
    type Err = BeatscopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "responsive" => Ok(Self::Responsive),
            "steady" => Ok(Self::Steady),
            other => Err(BeatscopeError::invalid_config(format!(
                "unknown tuning profile `{other}`"
            ))),
        }
    }
}

impl fmt::Display for TuningProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Responsive => f.write_str("responsive"),
            Self::Steady => f.write_str("steady"),
        }
    }
}

/// Tunables of the beat detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatConfig {
    /// A frame is an onset when its energy exceeds `reference * threshold_multiplier`.
    pub threshold_multiplier: f32,
    /// Capacity of the sliding energy history.
    pub history_len: usize,
    /// Refractory period after a confirmed beat.
    pub cooldown_ms: u64,
    /// Leading share of the bins summed into the bass energy.
    pub bass_fraction: f32,
    /// Bins from this share onwards are summed into the treble energy.
    pub treble_start_fraction: f32,
    pub compression: EnergyCompression,
    pub reference: ReferencePolicy,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self::responsive()
    }
}

impl BeatConfig {
    /// Short history and a low multiplier: follows tempo changes quickly.
    pub fn responsive() -> Self {
        Self {
            threshold_multiplier: 1.15,
            history_len: 20,
            cooldown_ms: 200,
            bass_fraction: 0.10,
            treble_start_fraction: 0.60,
            compression: EnergyCompression::Linear,
            reference: ReferencePolicy::Mean,
        }
    }

    /// Roughly one second of history at 43 frames per second with log
    /// compression. Fewer false positives on dense material.
    pub fn steady() -> Self {
        Self {
            threshold_multiplier: 1.3,
            history_len: 43,
            cooldown_ms: 250,
            bass_fraction: 0.15,
            treble_start_fraction: 0.50,
            compression: EnergyCompression::Logarithmic,
            reference: ReferencePolicy::RecencyWeighted,
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn with_threshold_multiplier(mut self, multiplier: f32) -> Self {
        self.threshold_multiplier = multiplier;
        self
    }

    pub fn with_history_len(mut self, len: usize) -> Self {
        self.history_len = len;
        self
    }

    pub fn with_cooldown_ms(mut self, cooldown_ms: u64) -> Self {
        self.cooldown_ms = cooldown_ms;
        self
    }

    pub fn with_compression(mut self, compression: EnergyCompression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_reference(mut self, reference: ReferencePolicy) -> Self {
        self.reference = reference;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.threshold_multiplier.is_finite() || self.threshold_multiplier <= 0.0 {
            return Err(BeatscopeError::invalid_config(format!(
                "threshold multiplier must be a positive number, got {}",
                self.threshold_multiplier
            )));
        }
        if self.history_len == 0 {
            return Err(BeatscopeError::invalid_config(
                "history length must hold at least one sample",
            ));
        }
        let fractions_ok = self.bass_fraction > 0.0
            && self.bass_fraction <= self.treble_start_fraction
            && self.treble_start_fraction < 1.0;
        if !fractions_ok {
            return Err(BeatscopeError::invalid_config(format!(
                "band split must satisfy 0 < bass ({}) <= treble start ({}) < 1",
                self.bass_fraction, self.treble_start_fraction
            )));
        }
        Ok(())
    }
}

/// Parameters of the built-in [`crate::LiveAnalyser`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyserConfig {
    pub fft_size: usize,
    pub smoothing_time_constant: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            fft_size: 512,
            smoothing_time_constant: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl AnalyserConfig {
    pub const MIN_FFT_SIZE: usize = 32;
    pub const MAX_FFT_SIZE: usize = 32_768;

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn validate(&self) -> Result<()> {
        if !self.fft_size.is_power_of_two()
            || !(Self::MIN_FFT_SIZE..=Self::MAX_FFT_SIZE).contains(&self.fft_size)
        {
            return Err(BeatscopeError::invalid_config(format!(
                "fft size must be a power of two between {} and {}, got {}",
                Self::MIN_FFT_SIZE,
                Self::MAX_FFT_SIZE,
                self.fft_size
            )));
        }
        if !(0.0..=1.0).contains(&self.smoothing_time_constant) {
            return Err(BeatscopeError::invalid_config(format!(
                "smoothing time constant must lie in [0, 1], got {}",
                self.smoothing_time_constant
            )));
        }
        let window_empty = self.min_decibels.is_nan()
            || self.max_decibels.is_nan()
            || self.min_decibels >= self.max_decibels;
        if window_empty {
            return Err(BeatscopeError::invalid_config(format!(
                "decibel window is empty: min {} >= max {}",
                self.min_decibels, self.max_decibels
            )));
        }
        Ok(())
    }
}
