// Types module - Analysis result records
//
// Every record is plain data with serde derives. All times are milliseconds
// (f64) measured from the start of the decoded waveform.

use serde::{Deserialize, Serialize};

use super::mood::Mood;

/// Tempo and beat grid of a track.
///
/// A silent or non-rhythmic track yields `beat_count == 0` and the configured
/// sentinel tempo instead of an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatInfo {
    pub tempo_bpm: f64,
    pub beat_times_ms: Vec<f64>,
    pub beat_count: usize,
    pub average_beat_interval_ms: f64,
}

impl BeatInfo {
    /// Build from a tempo and beat list, deriving count and mean interval.
    pub fn new(tempo_bpm: f64, beat_times_ms: Vec<f64>) -> Self {
        let beat_count = beat_times_ms.len();
        let average_beat_interval_ms = mean_interval(&beat_times_ms);
        Self {
            tempo_bpm,
            beat_times_ms,
            beat_count,
            average_beat_interval_ms,
        }
    }

    /// Soft-failure result for audio without a detectable beat.
    pub fn silent(sentinel_bpm: f64) -> Self {
        Self::new(sentinel_bpm, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.beat_count == 0
    }
}

/// Mean of consecutive differences, 0 with fewer than two entries.
pub fn mean_interval(times_ms: &[f64]) -> f64 {
    if times_ms.len() < 2 {
        return 0.0;
    }
    let span = times_ms[times_ms.len() - 1] - times_ms[0];
    span / (times_ms.len() - 1) as f64
}

/// Detected onsets with normalized strengths and strong/weak subsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnsetInfo {
    pub onset_times_ms: Vec<f64>,
    pub onset_strengths: Vec<f32>,
    pub strong_onsets_ms: Vec<f64>,
    pub weak_onsets_ms: Vec<f64>,
    pub onset_count: usize,
}

impl OnsetInfo {
    /// Partition onsets: strength > strong is strong, strength < weak is weak,
    /// anything in between stays only in the full list.
    pub fn classify(
        onset_times_ms: Vec<f64>,
        onset_strengths: Vec<f32>,
        strong_threshold: f32,
        weak_threshold: f32,
    ) -> Self {
        let mut strong_onsets_ms = Vec::new();
        let mut weak_onsets_ms = Vec::new();

        for (&time, &strength) in onset_times_ms.iter().zip(onset_strengths.iter()) {
            if strength > strong_threshold {
                strong_onsets_ms.push(time);
            } else if strength < weak_threshold {
                weak_onsets_ms.push(time);
            }
        }

        Self {
            onset_count: onset_times_ms.len(),
            onset_times_ms,
            onset_strengths,
            strong_onsets_ms,
            weak_onsets_ms,
        }
    }

    /// (time, strength) pairs in time order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f32)> + '_ {
        self.onset_times_ms
            .iter()
            .copied()
            .zip(self.onset_strengths.iter().copied())
    }
}

/// Loudness statistics and drop/break markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyInfo {
    pub average_rms: f32,
    pub peak_rms: f32,
    pub drop_times_ms: Vec<f64>,
    pub break_times_ms: Vec<f64>,
}

/// Averaged spectral shape and the mood derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralInfo {
    pub spectral_centroid_avg: f32,
    pub spectral_bandwidth_avg: f32,
    pub mood: Mood,
    pub suggested_filter_style: Vec<String>,
}

/// Beat/onset detection re-run on the separated components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HpssInfo {
    pub percussive_tempo_bpm: f64,
    pub percussive_beat_times_ms: Vec<f64>,
    pub harmonic_beat_times_ms: Vec<f64>,
}

/// Normalized onset envelope at native frame resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnsetStrengthCurve {
    pub times_ms: Vec<f64>,
    pub strengths: Vec<f32>,
}

/// Everything the analyzer knows about one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullAnalysisResult {
    pub duration_ms: f64,
    pub sample_rate: u32,
    pub beat_info: BeatInfo,
    pub onset_info: OnsetInfo,
    pub energy_info: EnergyInfo,
    pub spectral_info: SpectralInfo,
    pub hpss_info: Option<HpssInfo>,
}

impl FullAnalysisResult {
    /// Nested JSON value of the whole result (`hpss_info` is `null` when absent).
    pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    pub fn to_json(&self, pretty: bool) -> serde_json::Result<String> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
