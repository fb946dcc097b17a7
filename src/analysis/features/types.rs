// Types module - Spectrogram containers shared by the feature extractors

use rustfft::num_complex::Complex;

/// Complex STFT, frame-major: `frames[t][k]` is bin k of frame t.
#[derive(Debug, Clone)]
pub struct ComplexSpectrogram {
    pub frames: Vec<Vec<Complex<f32>>>,
    pub n_fft: usize,
    pub hop_length: usize,
}

impl ComplexSpectrogram {
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Magnitude of every bin, same layout as `frames`.
    pub fn magnitudes(&self) -> Vec<Vec<f32>> {
        self.frames
            .iter()
            .map(|frame| frame.iter().map(|c| c.norm()).collect())
            .collect()
    }
}

/// Magnitude spectrogram with the frame grid it was computed on.
///
/// Frame t is centered on sample `t * hop_length`, so its time is
/// `t * hop_length / sample_rate` seconds.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    pub frames: Vec<Vec<f32>>,
    pub n_fft: usize,
    pub hop_length: usize,
    pub sample_rate: u32,
}

impl Spectrogram {
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Center frequency of bin `k` in Hz.
    pub fn bin_frequency(&self, k: usize) -> f32 {
        k as f32 * self.sample_rate as f32 / self.n_fft as f32
    }
}

/// Convert a frame index on a `hop_length` grid to milliseconds.
pub fn frame_to_ms(frame: usize, hop_length: usize, sample_rate: u32) -> f64 {
    frame as f64 * hop_length as f64 / sample_rate as f64 * 1000.0
}
