// FFT module - short-time Fourier transform and its inverse
//
// Frames are centered: the signal is zero-padded by n_fft / 2 on both sides,
// so frame t is centered on sample t * hop_length and a signal of N samples
// yields 1 + N / hop_length frames. A periodic Hann window is used, which
// overlap-adds cleanly for the inverse transform.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::types::{ComplexSpectrogram, Spectrogram};

/// STFT processor with pre-planned forward and inverse transforms
#[derive(Clone)]
pub struct Stft {
    n_fft: usize,
    hop_length: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    /// Hann window (pre-computed)
    window: Vec<f32>,
}

impl std::fmt::Debug for Stft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stft")
            .field("n_fft", &self.n_fft)
            .field("hop_length", &self.hop_length)
            .finish()
    }
}

impl Stft {
    /// Create a new STFT processor
    ///
    /// # Arguments
    /// * `n_fft` - Window size in samples (>= 2)
    /// * `hop_length` - Frame stride in samples (>= 1)
    pub fn new(n_fft: usize, hop_length: usize) -> Self {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(n_fft);
        let inverse = planner.plan_fft_inverse(n_fft);

        let window = (0..n_fft)
            .map(|i| 0.5 * (1.0 - ((2.0 * std::f32::consts::PI * i as f32) / n_fft as f32).cos()))
            .collect();

        Self {
            n_fft,
            hop_length: hop_length.max(1),
            forward,
            inverse,
            window,
        }
    }

    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    pub fn hop_length(&self) -> usize {
        self.hop_length
    }

    pub fn num_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Frames produced for a signal of `num_samples` samples.
    pub fn frame_count(&self, num_samples: usize) -> usize {
        1 + num_samples / self.hop_length
    }

    /// Complex STFT of `samples`, positive frequencies only.
    pub fn forward(&self, samples: &[f32]) -> ComplexSpectrogram {
        let pad = self.n_fft / 2;
        let num_frames = self.frame_count(samples.len());
        let num_bins = self.num_bins();
        let mut frames = Vec::with_capacity(num_frames);
        let mut buffer = vec![Complex::new(0.0f32, 0.0f32); self.n_fft];

        for t in 0..num_frames {
            // First sample of this frame in unpadded coordinates (may be negative)
            let start = (t * self.hop_length) as isize - pad as isize;
            for (i, slot) in buffer.iter_mut().enumerate() {
                let idx = start + i as isize;
                let sample = if idx >= 0 && (idx as usize) < samples.len() {
                    samples[idx as usize]
                } else {
                    0.0
                };
                *slot = Complex::new(sample * self.window[i], 0.0);
            }

            self.forward.process(&mut buffer);
            frames.push(buffer[..num_bins].to_vec());
        }

        ComplexSpectrogram {
            frames,
            n_fft: self.n_fft,
            hop_length: self.hop_length,
        }
    }

    /// Magnitude STFT of `samples`.
    pub fn magnitude(&self, samples: &[f32], sample_rate: u32) -> Spectrogram {
        let complex = self.forward(samples);
        Spectrogram {
            frames: complex.magnitudes(),
            n_fft: self.n_fft,
            hop_length: self.hop_length,
            sample_rate,
        }
    }

    /// Inverse STFT by weighted overlap-add, trimmed to `length` samples.
    pub fn inverse(&self, spectrogram: &ComplexSpectrogram, length: usize) -> Vec<f32> {
        let pad = self.n_fft / 2;
        let num_frames = spectrogram.frames.len();
        let total = self.n_fft + self.hop_length * num_frames.saturating_sub(1);
        let mut output = vec![0.0f32; total];
        let mut window_sum = vec![0.0f32; total];
        let mut buffer = vec![Complex::new(0.0f32, 0.0f32); self.n_fft];
        let scale = 1.0 / self.n_fft as f32;

        for (t, frame) in spectrogram.frames.iter().enumerate() {
            // Rebuild the conjugate-symmetric full spectrum
            for (k, slot) in buffer.iter_mut().enumerate() {
                *slot = if k < frame.len() {
                    frame[k]
                } else {
                    frame
                        .get(self.n_fft - k)
                        .map(|c| c.conj())
                        .unwrap_or_default()
                };
            }

            self.inverse.process(&mut buffer);

            let offset = t * self.hop_length;
            for (i, value) in buffer.iter().enumerate() {
                let w = self.window[i];
                output[offset + i] += value.re * scale * w;
                window_sum[offset + i] += w * w;
            }
        }

        for (sample, &norm) in output.iter_mut().zip(window_sum.iter()) {
            if norm > 1e-8 {
                *sample /= norm;
            }
        }

        let mut trimmed: Vec<f32> = output.into_iter().skip(pad).take(length).collect();
        trimmed.resize(length, 0.0);
        trimmed
    }
}
