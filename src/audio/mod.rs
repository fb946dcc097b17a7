// Audio module - decoded sample buffers, file loading and resampling

pub mod loader;
pub mod resample;

pub use loader::AudioLoader;
pub use resample::resample;

use crate::error::AnalysisError;

/// Decoded audio: interleaved f32 samples plus their sample rate.
///
/// Produced once by [`AudioLoader`] and shared read-only by every analyzer.
/// Invariants: `sample_rate > 0`, `channels > 0`, every sample finite.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
}

impl Waveform {
    /// Build a waveform from interleaved samples.
    ///
    /// Non-finite samples are replaced by silence so downstream DSP never
    /// sees NaN/Inf. A trailing partial frame is discarded.
    pub fn new(
        mut samples: Vec<f32>,
        channels: usize,
        sample_rate: u32,
    ) -> Result<Self, AnalysisError> {
        if sample_rate == 0 {
            return Err(AnalysisError::invalid("sample_rate", "must be > 0"));
        }
        if channels == 0 {
            return Err(AnalysisError::invalid("channels", "must be > 0"));
        }

        let whole_frames = samples.len() / channels * channels;
        samples.truncate(whole_frames);
        for sample in samples.iter_mut() {
            if !sample.is_finite() {
                *sample = 0.0;
            }
        }

        Ok(Self {
            samples,
            channels,
            sample_rate,
        })
    }

    /// Mono convenience constructor.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self, AnalysisError> {
        Self::new(samples, 1, sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_mono(&self) -> bool {
        self.channels == 1
    }

    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in milliseconds: `frames / sample_rate * 1000`.
    pub fn duration_ms(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64 * 1000.0
    }

    /// Average all channels into one. Returns an identical copy for mono input.
    pub fn to_mono(&self) -> Waveform {
        if self.is_mono() {
            return self.clone();
        }

        let mono = self
            .samples
            .chunks_exact(self.channels)
            .map(|frame| frame.iter().sum::<f32>() / self.channels as f32)
            .collect();

        Waveform {
            samples: mono,
            channels: 1,
            sample_rate: self.sample_rate,
        }
    }

    /// Sample-rate conversion, see [`resample()`].
    pub fn resample(&self, target_rate: u32) -> Result<Waveform, AnalysisError> {
        resample(self, target_rate)
    }

    /// Peak absolute amplitude across all channels.
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()))
    }
}
