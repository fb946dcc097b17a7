// Temporal module - Time-domain feature extraction
//
// Frame-wise RMS loudness on the same centered frame grid as the STFT, so
// frame t of the RMS curve lines up with frame t of the spectrogram.
//
// References:
// - Lerch, A. (2012). An Introduction to Audio Content Analysis

/// Temporal feature computation functions
pub struct TemporalFeatures {
    frame_length: usize,
    hop_length: usize,
}

impl TemporalFeatures {
    /// Create a new temporal features processor
    ///
    /// # Arguments
    /// * `frame_length` - Samples per RMS frame
    /// * `hop_length` - Samples between frame centers
    pub fn new(frame_length: usize, hop_length: usize) -> Self {
        Self {
            frame_length: frame_length.max(1),
            hop_length: hop_length.max(1),
        }
    }

    /// Compute RMS of each centered frame
    ///
    /// Formula: RMS[t] = sqrt((1 / L) × Σ x[n]²) over the L samples centered
    /// on `t * hop_length`, zero-padded at the edges.
    ///
    /// # Returns
    /// `1 + audio.len() / hop_length` non-negative values
    pub fn compute_rms(&self, audio: &[f32]) -> Vec<f32> {
        let num_frames = 1 + audio.len() / self.hop_length;
        let half = (self.frame_length / 2) as isize;

        // Prefix sums of squares make each frame O(1)
        let mut prefix = Vec::with_capacity(audio.len() + 1);
        prefix.push(0.0f64);
        let mut running = 0.0f64;
        for &sample in audio {
            running += (sample as f64) * (sample as f64);
            prefix.push(running);
        }

        (0..num_frames)
            .map(|t| {
                let center = (t * self.hop_length) as isize;
                let start = (center - half).clamp(0, audio.len() as isize) as usize;
                let end = (center - half + self.frame_length as isize)
                    .clamp(0, audio.len() as isize) as usize;
                let energy = (prefix[end] - prefix[start]).max(0.0);
                (energy / self.frame_length as f64).sqrt() as f32
            })
            .collect()
    }
}
