// OnsetDetector - spectral flux onset envelope and peak picking
//
// The onset envelope measures how much new energy appears in each frame.
// It is computed once per signal and shared by the beat tracker, the pulse
// detector and the onset detector.
//
// Algorithm:
// 1. Power spectrogram converted to dB relative to its loudest bin, floored at -80 dB
// 2. Positive difference from the previous frame per bin: SF[k] = max(0, dB_t[k] - dB_(t-1)[k])
// 3. Mean across frequency bins: flux_t = mean(SF[k]); flux_0 = 0
// 4. Peak pick: local maximum within [t - pre_max, t + post_max), above the
//    local mean of [t - pre_avg, t + post_avg) plus delta, and at least
//    `wait` frames after the previous peak
// 5. Onset strength = envelope value min-max normalized to [0, 1]

use tracing::debug;

use super::features::{frame_to_ms, Spectrogram};
use super::types::OnsetInfo;
use crate::config::{check_threshold_pair, OnsetConfig};
use crate::error::AnalysisError;

/// Dynamic range kept below the reference level (dB)
const TOP_DB: f32 = 80.0;

/// Power floor before the log, avoids log(0)
const AMIN: f32 = 1e-10;

/// Onset strength envelope on the STFT frame grid
#[derive(Debug, Clone, PartialEq)]
pub struct OnsetEnvelope {
    values: Vec<f32>,
    hop_length: usize,
    sample_rate: u32,
}

impl OnsetEnvelope {
    /// Spectral flux envelope of a magnitude spectrogram.
    ///
    /// The dB reference never drops below the level of a -80 dBFS sine, so
    /// digital silence produces an all-zero envelope. Quiet broadband noise
    /// still has flux; callers gate it with [`OnsetEnvelope::muted`].
    pub fn from_spectrogram(spectrogram: &Spectrogram) -> Self {
        let num_frames = spectrogram.num_frames();
        let mut values = vec![0.0f32; num_frames];

        // A full-scale sine peaks at n_fft / 4 after the Hann window
        let full_scale = spectrogram.n_fft as f32 / 4.0;
        let reference_floor = full_scale * full_scale * 1e-8;

        let max_power = spectrogram
            .frames
            .iter()
            .flat_map(|frame| frame.iter())
            .fold(0.0f32, |acc, &mag| acc.max(mag * mag));
        let reference_db = 10.0 * max_power.max(reference_floor).max(AMIN).log10();

        let to_db = |mag: f32| -> f32 {
            let db = 10.0 * (mag * mag).max(AMIN).log10() - reference_db;
            db.max(-TOP_DB)
        };

        let mut previous: Vec<f32> = spectrogram
            .frames
            .first()
            .map(|frame| frame.iter().map(|&m| to_db(m)).collect())
            .unwrap_or_default();

        for (t, frame) in spectrogram.frames.iter().enumerate().skip(1) {
            let current: Vec<f32> = frame.iter().map(|&m| to_db(m)).collect();
            let bins = current.len().max(1);
            let flux: f32 = current
                .iter()
                .zip(previous.iter())
                .map(|(&now, &before)| (now - before).max(0.0))
                .sum();
            values[t] = flux / bins as f32;
            previous = current;
        }

        Self {
            values,
            hop_length: spectrogram.hop_length,
            sample_rate: spectrogram.sample_rate,
        }
    }

    /// Build an envelope from precomputed values (used by tests and tools).
    pub fn from_values(values: Vec<f32>, hop_length: usize, sample_rate: u32) -> Self {
        Self {
            values,
            hop_length: hop_length.max(1),
            sample_rate,
        }
    }

    /// All-zero envelope on the same frame grid, for input below the silence level.
    pub fn muted(mut self) -> Self {
        self.values.iter_mut().for_each(|v| *v = 0.0);
        self
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn hop_length(&self) -> usize {
        self.hop_length
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Envelope frames per second.
    pub fn frame_rate(&self) -> f32 {
        self.sample_rate as f32 / self.hop_length as f32
    }

    pub fn frame_to_ms(&self, frame: usize) -> f64 {
        frame_to_ms(frame, self.hop_length, self.sample_rate)
    }

    /// Convert a duration in milliseconds to whole envelope frames (floor).
    pub fn ms_to_frames(&self, ms: f32) -> usize {
        (ms.max(0.0) / 1000.0 * self.frame_rate()).floor() as usize
    }

    pub fn max(&self) -> f32 {
        self.values.iter().copied().fold(0.0f32, f32::max)
    }

    pub fn min(&self) -> f32 {
        self.values.iter().copied().fold(f32::INFINITY, f32::min)
    }

    /// True when the envelope carries no onset energy at all.
    pub fn is_silent(&self) -> bool {
        self.values.is_empty() || self.max() - self.min() <= 1e-9
    }

    /// Min-max normalized copy in [0, 1]; all zeros when the range is degenerate.
    pub fn normalized(&self) -> Vec<f32> {
        if self.is_silent() {
            return vec![0.0; self.values.len()];
        }
        let min = self.min();
        let range = self.max() - min;
        self.values
            .iter()
            .map(|&v| ((v - min) / range).clamp(0.0, 1.0))
            .collect()
    }
}

/// Peak picking window sizes, all in frames
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakPicker {
    pub pre_max: usize,
    pub post_max: usize,
    pub pre_avg: usize,
    pub post_avg: usize,
    pub delta: f32,
    pub wait: usize,
}

impl PeakPicker {
    /// Onset peak picker from millisecond windows on `envelope`'s frame grid.
    ///
    /// Post windows include the current frame, so they get one extra frame.
    pub fn for_onsets(config: &OnsetConfig, envelope: &OnsetEnvelope) -> Self {
        Self {
            pre_max: envelope.ms_to_frames(config.pre_max_ms),
            post_max: envelope.ms_to_frames(config.post_max_ms) + 1,
            pre_avg: envelope.ms_to_frames(config.pre_avg_ms),
            post_avg: envelope.ms_to_frames(config.post_avg_ms) + 1,
            delta: config.delta,
            wait: envelope.ms_to_frames(config.wait_ms),
        }
    }

    /// Symmetric picker used for pulse detection.
    pub fn symmetric(window: usize, delta: f32, wait: usize) -> Self {
        Self {
            pre_max: window,
            post_max: window + 1,
            pre_avg: window,
            post_avg: window + 1,
            delta,
            wait,
        }
    }

    /// Indices of peaks in `x`, strictly increasing.
    pub fn pick(&self, x: &[f32]) -> Vec<usize> {
        let n = x.len();
        let mut peaks: Vec<usize> = Vec::new();

        for i in 0..n {
            let max_start = i.saturating_sub(self.pre_max);
            let max_end = (i + self.post_max.max(1)).min(n);
            let local_max = x[max_start..max_end]
                .iter()
                .copied()
                .fold(f32::NEG_INFINITY, f32::max);
            if x[i] < local_max {
                continue;
            }

            let avg_start = i.saturating_sub(self.pre_avg);
            let avg_end = (i + self.post_avg.max(1)).min(n);
            let window = &x[avg_start..avg_end];
            let local_mean = window.iter().sum::<f32>() / window.len() as f32;
            if x[i] < local_mean + self.delta {
                continue;
            }

            if let Some(&last) = peaks.last() {
                if i <= last + self.wait {
                    continue;
                }
            }
            peaks.push(i);
        }

        peaks
    }
}

/// OnsetDetector turns an onset envelope into classified onset events
#[derive(Debug, Clone)]
pub struct OnsetDetector {
    config: OnsetConfig,
}

impl OnsetDetector {
    pub fn new(config: OnsetConfig) -> Self {
        Self { config }
    }

    /// Same detector with different strong/weak thresholds.
    ///
    /// # Errors
    /// `InvalidArgument` when a threshold leaves [0, 1] or `weak > strong`.
    pub fn with_thresholds(mut self, strong: f32, weak: f32) -> Result<Self, AnalysisError> {
        check_threshold_pair("strong_threshold", strong, "weak_threshold", weak, true)?;
        self.config.strong_threshold = strong;
        self.config.weak_threshold = weak;
        Ok(self)
    }

    /// Frames of detected onsets.
    pub fn onset_frames(&self, envelope: &OnsetEnvelope) -> Vec<usize> {
        if envelope.is_silent() {
            return Vec::new();
        }
        let normalized = envelope.normalized();
        PeakPicker::for_onsets(&self.config, envelope).pick(&normalized)
    }

    /// Detect onsets and split them into strong and weak by normalized strength.
    pub fn detect(&self, envelope: &OnsetEnvelope) -> OnsetInfo {
        let normalized = envelope.normalized();
        let frames = self.onset_frames(envelope);

        let onset_times_ms: Vec<f64> = frames.iter().map(|&f| envelope.frame_to_ms(f)).collect();
        let strengths: Vec<f32> = frames.iter().map(|&f| normalized[f]).collect();

        debug!(
            "Onset detection: {} onsets over {} frames",
            frames.len(),
            envelope.len()
        );

        OnsetInfo::classify(
            onset_times_ms,
            strengths,
            self.config.strong_threshold,
            self.config.weak_threshold,
        )
    }

    /// Normalized envelope as (times_ms, strengths), one entry per frame.
    pub fn strength_curve(envelope: &OnsetEnvelope) -> (Vec<f64>, Vec<f32>) {
        let times = (0..envelope.len()).map(|f| envelope.frame_to_ms(f)).collect();
        (times, envelope.normalized())
    }
}
