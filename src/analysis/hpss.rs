// HPSS - harmonic/percussive source separation by median filtering
//
// Algorithm (Fitzgerald, "Harmonic/Percussive Separation using Median
// Filtering", DAFx 2010):
// 1. Magnitude STFT |X|
// 2. Harmonic enhancement: median of |X| along time (per bin)
// 3. Percussive enhancement: median of |X| along frequency (per frame)
// 4. Soft masks: M_h = H^p / (H^p + P^p), M_p = P^p / (H^p + P^p)
// 5. Inverse STFT of X * M_h and X * M_p back to waveforms
//
// Edges use a truncated window rather than padding.

use rustfft::num_complex::Complex;
use tracing::debug;

use super::features::{ComplexSpectrogram, Stft};
use crate::config::HpssConfig;

/// Below this both enhanced magnitudes are treated as zero
const MASK_FLOOR: f32 = 1e-10;

/// Separated pseudo-waveforms, same length as the input
#[derive(Debug, Clone, PartialEq)]
pub struct HpssComponents {
    pub harmonic: Vec<f32>,
    pub percussive: Vec<f32>,
}

/// Median of `values` (upper median for even lengths). Reorders the slice.
fn median_in_place(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mid = values.len() / 2;
    let (_, median, _) = values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    *median
}

/// Median filter each bin along time with a window of `kernel` frames.
fn median_along_time(magnitudes: &[Vec<f32>], kernel: usize) -> Vec<Vec<f32>> {
    let num_frames = magnitudes.len();
    let num_bins = magnitudes.first().map_or(0, |frame| frame.len());
    let half = kernel / 2;
    let mut output = vec![vec![0.0f32; num_bins]; num_frames];
    let mut scratch = Vec::with_capacity(kernel);

    for k in 0..num_bins {
        for t in 0..num_frames {
            let start = t.saturating_sub(half);
            let end = (t + half + 1).min(num_frames);
            scratch.clear();
            scratch.extend(magnitudes[start..end].iter().map(|frame| frame[k]));
            output[t][k] = median_in_place(&mut scratch);
        }
    }
    output
}

/// Median filter each frame along frequency with a window of `kernel` bins.
fn median_along_frequency(magnitudes: &[Vec<f32>], kernel: usize) -> Vec<Vec<f32>> {
    let half = kernel / 2;
    let mut scratch = Vec::with_capacity(kernel);

    magnitudes
        .iter()
        .map(|frame| {
            let num_bins = frame.len();
            (0..num_bins)
                .map(|k| {
                    let start = k.saturating_sub(half);
                    let end = (k + half + 1).min(num_bins);
                    scratch.clear();
                    scratch.extend_from_slice(&frame[start..end]);
                    median_in_place(&mut scratch)
                })
                .collect()
        })
        .collect()
}

/// Soft mask weight of `target` against `other`.
fn soft_mask(target: f32, other: f32, power: f32) -> f32 {
    let scale = target.max(other);
    if scale < MASK_FLOOR {
        return 0.0;
    }
    // Scale first so large magnitudes don't overflow when raised to `power`
    let t = (target / scale).powf(power);
    let o = (other / scale).powf(power);
    t / (t + o)
}

/// Separate `samples` into harmonic and percussive components.
pub fn separate(samples: &[f32], stft: &Stft, config: &HpssConfig) -> HpssComponents {
    let spectrum = stft.forward(samples);
    let magnitudes = spectrum.magnitudes();

    let harmonic_enhanced = median_along_time(&magnitudes, config.harmonic_kernel);
    let percussive_enhanced = median_along_frequency(&magnitudes, config.percussive_kernel);

    let mut harmonic_frames = Vec::with_capacity(spectrum.num_frames());
    let mut percussive_frames = Vec::with_capacity(spectrum.num_frames());

    for (t, frame) in spectrum.frames.iter().enumerate() {
        let mut harmonic_frame: Vec<Complex<f32>> = Vec::with_capacity(frame.len());
        let mut percussive_frame: Vec<Complex<f32>> = Vec::with_capacity(frame.len());
        for (k, &bin) in frame.iter().enumerate() {
            let h = harmonic_enhanced[t][k];
            let p = percussive_enhanced[t][k];
            harmonic_frame.push(bin * soft_mask(h, p, config.mask_power));
            percussive_frame.push(bin * soft_mask(p, h, config.mask_power));
        }
        harmonic_frames.push(harmonic_frame);
        percussive_frames.push(percussive_frame);
    }

    let rebuild = |frames: Vec<Vec<Complex<f32>>>| {
        let spectrogram = ComplexSpectrogram {
            frames,
            n_fft: spectrum.n_fft,
            hop_length: spectrum.hop_length,
        };
        stft.inverse(&spectrogram, samples.len())
    };

    let harmonic = rebuild(harmonic_frames);
    let percussive = rebuild(percussive_frames);

    debug!(
        "HPSS: {} frames separated (kernels {} x {})",
        spectrum.num_frames(),
        config.harmonic_kernel,
        config.percussive_kernel
    );

    HpssComponents {
        harmonic,
        percussive,
    }
}
