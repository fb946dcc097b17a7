//! Configuration management for analysis parameter tuning
//!
//! This module provides runtime configuration loading from JSON files,
//! enabling fast iteration without recompilation. Frame geometry, tempo
//! priors, onset/energy thresholds, HPSS kernels and keyframe spacing can
//! all be adjusted via the config file. Every section carries defaults so a
//! partial file only overrides what it names.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::AnalysisError;

/// Complete analysis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Resample target in Hz applied when loading audio
    pub sample_rate: u32,
    /// Frame stride in samples
    pub hop_length: usize,
    /// STFT window size in samples
    pub n_fft: usize,
    /// Peak level (dBFS) below which input is treated as silence and
    /// yields no beats, onsets or pulses
    pub silence_db: f32,
    pub rhythm: RhythmConfig,
    pub pulse: PulseConfig,
    pub onset: OnsetConfig,
    pub energy: EnergyConfig,
    pub mood: MoodConfig,
    pub hpss: HpssConfig,
    pub keyframe: KeyframeConfig,
}

/// Tempo estimation and dynamic-programming beat tracking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RhythmConfig {
    /// Tempo prior (BPM); also the tie-break target for near-equal DP paths
    pub start_bpm: f32,
    /// Penalty weight for deviating from the estimated beat period
    pub tightness: f32,
    pub min_bpm: f32,
    pub max_bpm: f32,
    /// Tempo reported when the input has no rhythmic content
    pub silent_tempo_bpm: f32,
    /// Drop weak leading/trailing beats
    pub trim: bool,
}

impl Default for RhythmConfig {
    fn default() -> Self {
        Self {
            start_bpm: 120.0,
            tightness: 100.0,
            min_bpm: 30.0,
            max_bpm: 300.0,
            silent_tempo_bpm: 0.0,
            trim: true,
        }
    }
}

/// Loose peak picking used for the pulse anchor set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    /// Half-width of the local-maximum and local-mean windows
    pub window_ms: f32,
    /// Margin above the local mean (normalized envelope units)
    pub delta: f32,
    /// Minimum distance between consecutive pulses
    pub wait_ms: f32,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            window_ms: 100.0,
            delta: 0.02,
            wait_ms: 100.0,
        }
    }
}

/// Onset peak picking and strong/weak classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnsetConfig {
    pub strong_threshold: f32,
    pub weak_threshold: f32,
    pub pre_max_ms: f32,
    pub post_max_ms: f32,
    pub pre_avg_ms: f32,
    pub post_avg_ms: f32,
    /// Margin above the local mean (normalized envelope units)
    pub delta: f32,
    /// Minimum separation between onsets
    pub wait_ms: f32,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            strong_threshold: 0.7,
            weak_threshold: 0.3,
            pre_max_ms: 30.0,
            post_max_ms: 0.0,
            pre_avg_ms: 100.0,
            post_avg_ms: 100.0,
            delta: 0.07,
            wait_ms: 30.0,
        }
    }
}

/// Frame RMS and drop/break thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyConfig {
    pub frame_length: usize,
    pub drop_threshold: f32,
    pub break_threshold: f32,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            frame_length: 2048,
            drop_threshold: 0.8,
            break_threshold: 0.2,
        }
    }
}

/// Spectral bands used by the mood heuristic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoodConfig {
    pub bright_centroid_hz: f32,
    pub warm_centroid_hz: f32,
    pub dark_centroid_hz: f32,
    pub dark_bandwidth_hz: f32,
}

impl Default for MoodConfig {
    fn default() -> Self {
        Self {
            bright_centroid_hz: 3000.0,
            warm_centroid_hz: 2200.0,
            dark_centroid_hz: 1500.0,
            dark_bandwidth_hz: 2000.0,
        }
    }
}

/// Median-filter harmonic/percussive separation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HpssConfig {
    /// Median kernel along time (frames), must be odd
    pub harmonic_kernel: usize,
    /// Median kernel along frequency (bins), must be odd
    pub percussive_kernel: usize,
    /// Exponent of the soft Wiener masks
    pub mask_power: f32,
}

impl Default for HpssConfig {
    fn default() -> Self {
        Self {
            harmonic_kernel: 31,
            percussive_kernel: 31,
            mask_power: 2.0,
        }
    }
}

/// Keyframe generation spacing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyframeConfig {
    /// How long a beat pulse holds the zoomed value before easing back
    pub pulse_duration_ms: u64,
    /// Closest two keyframes may be (one video frame at 30 fps by default)
    pub min_spacing_ms: u64,
    /// Offset subtracted from every event so outputs are segment-relative
    pub segment_start_ms: f64,
}

impl Default for KeyframeConfig {
    fn default() -> Self {
        Self {
            pulse_duration_ms: 200,
            min_spacing_ms: 34,
            segment_start_ms: 0.0,
        }
    }
}

impl Default for AnalysisConfig {
    /// Default configuration values (fallback if config file not found)
    fn default() -> Self {
        Self {
            sample_rate: 22_050,
            hop_length: 512,
            n_fft: 2048,
            silence_db: -60.0,
            rhythm: RhythmConfig::default(),
            pulse: PulseConfig::default(),
            onset: OnsetConfig::default(),
            energy: EnergyConfig::default(),
            mood: MoodConfig::default(),
            hpss: HpssConfig::default(),
            keyframe: KeyframeConfig::default(),
        }
    }
}

/// Reject thresholds outside [0, 1] or in inverted order.
pub(crate) fn check_threshold_pair(
    high_name: &str,
    high: f32,
    low_name: &str,
    low: f32,
    allow_equal: bool,
) -> Result<(), AnalysisError> {
    for (name, value) in [(high_name, high), (low_name, low)] {
        if !(0.0..=1.0).contains(&value) {
            return Err(AnalysisError::invalid(
                name,
                format!("must lie in [0, 1] (got {})", value),
            ));
        }
    }

    let inverted = if allow_equal { low > high } else { low >= high };
    if inverted {
        return Err(AnalysisError::invalid(
            low_name,
            format!("must be below {} ({} vs {})", high_name, low, high),
        ));
    }

    Ok(())
}

impl AnalysisConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// Loaded configuration, or the defaults if the file is missing or unparsable
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_json_file(&path) {
            Ok(config) => {
                log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                config
            }
            Err(err) => {
                log::warn!(
                    "[Config] Failed to load {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Strict variant of [`AnalysisConfig::load_from_file`]: read, parse and validate.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, AnalysisError> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                AnalysisError::FileNotFound {
                    path: path_ref.display().to_string(),
                }
            } else {
                AnalysisError::Io {
                    path: path_ref.display().to_string(),
                    details: err.to_string(),
                }
            }
        })?;

        let config: AnalysisConfig = serde_json::from_str(&contents)
            .map_err(|err| AnalysisError::invalid("config", err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every invariant the analyzers rely on.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.sample_rate == 0 {
            return Err(AnalysisError::invalid("sample_rate", "must be > 0"));
        }
        if self.hop_length == 0 {
            return Err(AnalysisError::invalid("hop_length", "must be > 0"));
        }
        if self.n_fft < 2 {
            return Err(AnalysisError::invalid("n_fft", "must be at least 2"));
        }
        if self.hop_length > self.n_fft {
            return Err(AnalysisError::invalid(
                "hop_length",
                format!("must not exceed n_fft ({} > {})", self.hop_length, self.n_fft),
            ));
        }
        if !(self.silence_db.is_finite() && self.silence_db <= 0.0) {
            return Err(AnalysisError::invalid(
                "silence_db",
                format!("must be a finite level <= 0 dBFS (got {})", self.silence_db),
            ));
        }

        let rhythm = &self.rhythm;
        if !(rhythm.min_bpm > 0.0 && rhythm.min_bpm < rhythm.max_bpm) {
            return Err(AnalysisError::invalid(
                "rhythm.min_bpm",
                format!(
                    "expected 0 < min_bpm < max_bpm (got {} / {})",
                    rhythm.min_bpm, rhythm.max_bpm
                ),
            ));
        }
        if rhythm.start_bpm <= 0.0 {
            return Err(AnalysisError::invalid("rhythm.start_bpm", "must be > 0"));
        }
        if rhythm.tightness < 0.0 {
            return Err(AnalysisError::invalid("rhythm.tightness", "must be >= 0"));
        }
        if rhythm.silent_tempo_bpm < 0.0 {
            return Err(AnalysisError::invalid(
                "rhythm.silent_tempo_bpm",
                "must be >= 0",
            ));
        }

        check_threshold_pair(
            "onset.strong_threshold",
            self.onset.strong_threshold,
            "onset.weak_threshold",
            self.onset.weak_threshold,
            true,
        )?;
        check_threshold_pair(
            "energy.drop_threshold",
            self.energy.drop_threshold,
            "energy.break_threshold",
            self.energy.break_threshold,
            false,
        )?;
        if self.energy.frame_length == 0 {
            return Err(AnalysisError::invalid("energy.frame_length", "must be > 0"));
        }

        for (name, kernel) in [
            ("hpss.harmonic_kernel", self.hpss.harmonic_kernel),
            ("hpss.percussive_kernel", self.hpss.percussive_kernel),
        ] {
            if kernel == 0 || kernel % 2 == 0 {
                return Err(AnalysisError::invalid(
                    name,
                    format!("must be a positive odd number (got {})", kernel),
                ));
            }
        }
        if self.hpss.mask_power <= 0.0 {
            return Err(AnalysisError::invalid("hpss.mask_power", "must be > 0"));
        }

        if self.keyframe.min_spacing_ms == 0 {
            return Err(AnalysisError::invalid(
                "keyframe.min_spacing_ms",
                "must be > 0",
            ));
        }
        if self.keyframe.segment_start_ms < 0.0 {
            return Err(AnalysisError::invalid(
                "keyframe.segment_start_ms",
                "must be >= 0",
            ));
        }

        Ok(())
    }
}
