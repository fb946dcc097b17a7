//! Deterministic synthetic signals and WAV helpers.
//!
//! Every generator is seeded, so the same `SyntheticSpec` always renders the same
//! samples. Used by the unit/integration tests and by `beatsync_cli synth`
//! to produce reproducible fixtures.

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::path::Path;

use crate::audio::Waveform;
use crate::error::AnalysisError;

/// Click duration in milliseconds
const CLICK_DURATION_MS: f32 = 20.0;

/// Seed for the click burst
const CLICK_SEED: u64 = 42;

/// Seed for white-noise fixtures
const NOISE_SEED: u64 = 0x5A5A_FFF0;

/// Supported deterministic waveform patterns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyntheticPattern {
    /// 20 ms noise bursts on a fixed tempo grid, first click at t = 0
    ClickTrack { bpm: f32 },
    Sine { frequency_hz: f32 },
    WhiteNoise,
    Silence,
}

/// Declarative description of a synthetic mono signal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyntheticSpec {
    pub pattern: SyntheticPattern,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u32,
    #[serde(default = "default_amplitude")]
    pub amplitude: f32,
}

fn default_sample_rate() -> u32 {
    22_050
}

fn default_duration_ms() -> u32 {
    10_000
}

fn default_amplitude() -> f32 {
    0.8
}

impl SyntheticSpec {
    pub fn new(pattern: SyntheticPattern, sample_rate: u32, duration_ms: u32) -> Self {
        Self {
            pattern,
            sample_rate,
            duration_ms,
            amplitude: default_amplitude(),
        }
    }

    /// Render the samples described by this spec.
    pub fn render(&self) -> Vec<f32> {
        let frames = duration_frames(self.duration_ms, self.sample_rate);
        let amplitude = self.amplitude;

        match self.pattern {
            SyntheticPattern::ClickTrack { bpm } => {
                click_track(bpm, self.duration_ms, self.sample_rate, amplitude)
            }
            SyntheticPattern::Sine { frequency_hz } => (0..frames)
                .map(|i| amplitude * (2.0 * PI * frequency_hz * i as f32 / self.sample_rate as f32).sin())
                .collect(),
            SyntheticPattern::WhiteNoise => {
                let mut rng = StdRng::seed_from_u64(NOISE_SEED);
                (0..frames)
                    .map(|_| rng.gen_range(-amplitude..=amplitude))
                    .collect()
            }
            SyntheticPattern::Silence => vec![0.0; frames],
        }
    }

    /// Render into a mono [`Waveform`].
    pub fn waveform(&self) -> Result<Waveform, AnalysisError> {
        Waveform::mono(self.render(), self.sample_rate)
    }
}

fn duration_frames(duration_ms: u32, sample_rate: u32) -> usize {
    ((duration_ms as f64 / 1_000.0) * sample_rate as f64).round() as usize
}

/// Generates a 20ms white-noise click with a fixed seed.
pub fn generate_click_sample(sample_rate: u32) -> Vec<f32> {
    let num_samples = (sample_rate as f32 * CLICK_DURATION_MS / 1000.0) as usize;
    let mut rng = StdRng::seed_from_u64(CLICK_SEED);
    (0..num_samples).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

/// Click track: one click every `60 / bpm` seconds starting at t = 0.
///
/// Click k starts at sample `round(k * 60 / bpm * sample_rate)`, so the
/// grid never drifts for non-integer beat lengths.
pub fn click_track(bpm: f32, duration_ms: u32, sample_rate: u32, amplitude: f32) -> Vec<f32> {
    let frames = duration_frames(duration_ms, sample_rate);
    let mut samples = vec![0.0f32; frames];
    if bpm <= 0.0 {
        return samples;
    }

    let click = generate_click_sample(sample_rate);
    let beat_seconds = 60.0 / bpm as f64;
    let mut k = 0u64;
    loop {
        let start = (k as f64 * beat_seconds * sample_rate as f64).round() as usize;
        if start >= frames {
            break;
        }
        for (slot, &value) in samples[start..].iter_mut().zip(click.iter()) {
            *slot += amplitude * value;
        }
        k += 1;
    }
    samples
}

/// Write interleaved samples as a 32-bit float WAV file.
pub fn write_wav(
    path: &Path,
    samples: &[f32],
    channels: u16,
    sample_rate: u32,
) -> Result<(), AnalysisError> {
    let io_error = |err: hound::Error| AnalysisError::Io {
        path: path.display().to_string(),
        details: err.to_string(),
    };

    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(io_error)?;
    for &sample in samples {
        writer.write_sample(sample).map_err(io_error)?;
    }
    writer.finalize().map_err(io_error)
}

/// Read a PCM WAV file (float, 16/24/32-bit int) into a [`Waveform`].
pub fn read_wav(path: &Path) -> Result<Waveform, AnalysisError> {
    let io_error = |err: hound::Error| AnalysisError::Io {
        path: path.display().to_string(),
        details: err.to_string(),
    };

    let mut reader = hound::WavReader::open(path).map_err(io_error)?;
    let spec = reader.spec();

    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<f32>, _>>()
            .map_err(io_error)?,
        hound::SampleFormat::Int => match spec.bits_per_sample {
            16 => reader
                .samples::<i16>()
                .map(|sample| sample.map(|v| v as f32 / i16::MAX as f32))
                .collect::<Result<Vec<f32>, _>>()
                .map_err(io_error)?,
            24 | 32 => {
                let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|sample| sample.map(|v| v as f32 / scale))
                    .collect::<Result<Vec<f32>, _>>()
                    .map_err(io_error)?
            }
            bits => {
                return Err(AnalysisError::UnsupportedFormat {
                    path: path.display().to_string(),
                    details: format!("unsupported bits_per_sample={}", bits),
                })
            }
        },
    };

    Waveform::new(samples, spec.channels as usize, spec.sample_rate)
}
