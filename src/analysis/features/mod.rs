// Features - DSP building blocks shared by every analyzer
//
// Module organization:
// - types: Spectrogram containers and frame/time conversion
// - fft: Centered STFT and inverse STFT with a Hann window
// - spectral: Frequency-domain features (centroid, bandwidth)
// - temporal: Time-domain features (frame RMS)
//
// Every analyzer works on the same frame grid: frame t is centered on sample
// t * hop_length, so frame indices convert to time with a single formula.

mod fft;
mod spectral;
mod temporal;
mod types;

pub use fft::Stft;
pub use spectral::{SpectralFeatures, SpectralSummary};
pub use temporal::TemporalFeatures;
pub use types::{frame_to_ms, ComplexSpectrogram, Spectrogram};
