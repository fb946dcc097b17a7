// Mood - heuristic tonal classification from averaged spectral shape
//
// Rules, first match wins:
// 1. no spectral energy                                 -> neutral
// 2. centroid >= bright cutoff                          -> bright
// 3. centroid <  dark cutoff and bandwidth < dark width -> dark
// 4. centroid <  warm cutoff                            -> warm
// 5. otherwise                                          -> neutral

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::features::{SpectralFeatures, Spectrogram};
use super::types::SpectralInfo;
use crate::config::MoodConfig;

/// Closed set of moods a track can be classified into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Bright,
    Warm,
    Neutral,
    Dark,
}

impl Mood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Bright => "bright",
            Mood::Warm => "warm",
            Mood::Neutral => "neutral",
            Mood::Dark => "dark",
        }
    }

    /// Filter tags suggested for this mood (fixed lookup table).
    pub fn filter_styles(&self) -> Vec<String> {
        let tags: &[&str] = match self {
            Mood::Bright => &["vivid", "high_contrast", "cool_tone"],
            Mood::Warm => &["vintage", "golden_hour", "soft_glow"],
            Mood::Neutral => &["natural", "clean"],
            Mood::Dark => &["noir", "low_key", "desaturated"],
        };
        tags.iter().map(|tag| tag.to_string()).collect()
    }

    pub fn classify(centroid_hz: f32, bandwidth_hz: f32, config: &MoodConfig) -> Mood {
        if centroid_hz <= 0.0 {
            Mood::Neutral
        } else if centroid_hz >= config.bright_centroid_hz {
            Mood::Bright
        } else if centroid_hz < config.dark_centroid_hz && bandwidth_hz < config.dark_bandwidth_hz
        {
            Mood::Dark
        } else if centroid_hz < config.warm_centroid_hz {
            Mood::Warm
        } else {
            Mood::Neutral
        }
    }
}

impl std::fmt::Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Average centroid/bandwidth over the spectrogram and classify.
pub fn analyze_mood(spectrogram: &Spectrogram, config: &MoodConfig) -> SpectralInfo {
    let features = SpectralFeatures::new(spectrogram.sample_rate, spectrogram.n_fft);
    let summary = features.summarize(spectrogram);
    let mood = Mood::classify(summary.centroid_hz, summary.bandwidth_hz, config);

    debug!(
        "Spectral: centroid {:.0} Hz, bandwidth {:.0} Hz over {} frames -> {}",
        summary.centroid_hz, summary.bandwidth_hz, summary.active_frames, mood
    );

    SpectralInfo {
        spectral_centroid_avg: summary.centroid_hz.max(0.0),
        spectral_bandwidth_avg: summary.bandwidth_hz.max(0.0),
        mood,
        suggested_filter_style: mood.filter_styles(),
    }
}
