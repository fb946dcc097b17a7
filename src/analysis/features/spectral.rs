// Spectral module - Frequency-domain feature extraction
//
// Centroid and bandwidth of magnitude spectra, per frame and averaged over a
// whole spectrogram. Both are reported in Hz.
//
// References:
// - Peeters, G. (2004). A large set of audio features for sound description
// - Klapuri, A. & Davy, M. (2006). Signal Processing Methods for Music Transcription

use super::types::Spectrogram;

/// Below this total magnitude a frame is treated as silent
const MIN_MAGNITUDE_SUM: f32 = 1e-10;

/// Spectral feature computation functions
pub struct SpectralFeatures {
    sample_rate: u32,
    fft_size: usize,
}

/// Mean spectral shape of a whole signal
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpectralSummary {
    /// Mean spectral centroid over non-silent frames (Hz)
    pub centroid_hz: f32,
    /// Mean spectral bandwidth over non-silent frames (Hz)
    pub bandwidth_hz: f32,
    /// Number of frames that carried any energy
    pub active_frames: usize,
}

impl SpectralFeatures {
    /// Create a new spectral features processor
    ///
    /// # Arguments
    /// * `sample_rate` - Audio sample rate in Hz
    /// * `fft_size` - FFT window size
    pub fn new(sample_rate: u32, fft_size: usize) -> Self {
        Self {
            sample_rate,
            fft_size,
        }
    }

    fn bin_width(&self) -> f32 {
        self.sample_rate as f32 / self.fft_size as f32
    }

    /// Compute spectral centroid (weighted mean frequency)
    ///
    /// Formula: centroid = Σ(f_i × |X[i]|) / Σ|X[i]|
    ///
    /// # Returns
    /// Spectral centroid in Hz, 0.0 for a silent frame
    pub fn compute_centroid(&self, spectrum: &[f32]) -> f32 {
        let freq_bin_width = self.bin_width();

        let weighted_sum: f32 = spectrum
            .iter()
            .enumerate()
            .map(|(i, &mag)| i as f32 * freq_bin_width * mag)
            .sum();

        let magnitude_sum: f32 = spectrum.iter().sum();

        if magnitude_sum > MIN_MAGNITUDE_SUM {
            weighted_sum / magnitude_sum
        } else {
            0.0
        }
    }

    /// Compute spectral bandwidth (second-order spread around the centroid)
    ///
    /// Formula: bandwidth = sqrt(Σ |X[i]| × (f_i - centroid)² / Σ|X[i]|)
    pub fn compute_bandwidth(&self, spectrum: &[f32], centroid: f32) -> f32 {
        let freq_bin_width = self.bin_width();
        let magnitude_sum: f32 = spectrum.iter().sum();

        if magnitude_sum <= MIN_MAGNITUDE_SUM {
            return 0.0;
        }

        let spread: f32 = spectrum
            .iter()
            .enumerate()
            .map(|(i, &mag)| {
                let deviation = i as f32 * freq_bin_width - centroid;
                mag * deviation * deviation
            })
            .sum();

        (spread / magnitude_sum).sqrt()
    }

    /// Average centroid and bandwidth over every frame that carries energy.
    pub fn summarize(&self, spectrogram: &Spectrogram) -> SpectralSummary {
        let mut centroid_total = 0.0f64;
        let mut bandwidth_total = 0.0f64;
        let mut active_frames = 0usize;

        for frame in &spectrogram.frames {
            if frame.iter().sum::<f32>() <= MIN_MAGNITUDE_SUM {
                continue;
            }
            let centroid = self.compute_centroid(frame);
            centroid_total += centroid as f64;
            bandwidth_total += self.compute_bandwidth(frame, centroid) as f64;
            active_frames += 1;
        }

        if active_frames == 0 {
            return SpectralSummary::default();
        }

        SpectralSummary {
            centroid_hz: (centroid_total / active_frames as f64) as f32,
            bandwidth_hz: (bandwidth_total / active_frames as f64) as f32,
            active_frames,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centroid_of_single_bin() {
        let features = SpectralFeatures::new(22_050, 2048);
        let mut spectrum = vec![0.0; 1025];
        spectrum[100] = 1.0;
        let expected = 100.0 * 22_050.0 / 2048.0;
        assert!((features.compute_centroid(&spectrum) - expected).abs() < 1e-2);
        assert!(features.compute_bandwidth(&spectrum, expected).abs() < 1e-2);
    }

    #[test]
    fn test_bandwidth_of_two_bins() {
        let features = SpectralFeatures::new(2048, 2048);
        let mut spectrum = vec![0.0; 1025];
        spectrum[100] = 1.0;
        spectrum[300] = 1.0;
        let centroid = features.compute_centroid(&spectrum);
        assert!((centroid - 200.0).abs() < 1e-3);
        assert!((features.compute_bandwidth(&spectrum, centroid) - 100.0).abs() < 1e-2);
    }

    #[test]
    fn test_silent_spectrum() {
        let features = SpectralFeatures::new(22_050, 2048);
        let spectrum = vec![0.0; 1025];
        assert_eq!(features.compute_centroid(&spectrum), 0.0);
        assert_eq!(features.compute_bandwidth(&spectrum, 0.0), 0.0);
    }

    #[test]
    fn test_summary_skips_silent_frames() {
        let features = SpectralFeatures::new(2048, 2048);
        let mut loud = vec![0.0; 1025];
        loud[500] = 2.0;
        let spectrogram = Spectrogram {
            frames: vec![vec![0.0; 1025], loud, vec![0.0; 1025]],
            n_fft: 2048,
            hop_length: 512,
            sample_rate: 2048,
        };
        let summary = features.summarize(&spectrogram);
        assert_eq!(summary.active_frames, 1);
        assert!((summary.centroid_hz - 500.0).abs() < 1e-3);
    }
}
