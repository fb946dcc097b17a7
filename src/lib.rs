// Beatsync Core - Rust Audio Analysis Service
// Offline beat, onset, energy and mood analysis for beat-synchronized editing

// Module declarations
pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod keyframe;
pub mod testing;

// Re-exports for convenience
pub use analysis::{
    AudioAnalyzer, BeatInfo, EnergyInfo, FullAnalysisResult, HpssInfo, Mood, OnsetInfo,
    OnsetStrengthCurve, SpectralInfo,
};
pub use audio::{AudioLoader, Waveform};
pub use config::AnalysisConfig;
pub use error::{AnalysisError, ErrorCode};
pub use keyframe::{Keyframe, KeyframeGenerator, KeyframeProperty};

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber honouring `RUST_LOG` (defaults to `info`).
///
/// Safe to call more than once; later calls are no-ops, as is calling it
/// after the host application installed its own subscriber.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
