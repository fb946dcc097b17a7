// Analysis module - offline audio analysis pipeline
//
// AudioAnalyzer loads a file once and runs every analyzer over the same
// read-only waveform:
//
//   Loader -> STFT -> onset envelope -+-> BeatTracker   -> BeatInfo
//                                     +-> OnsetDetector -> OnsetInfo
//          -> frame RMS ---------------> EnergyAnalyzer -> EnergyInfo
//          -> STFT magnitudes ---------> mood           -> SpectralInfo
//          -> HPSS (optional) ---------> BeatTracker / OnsetDetector -> HpssInfo
//
// The spectrogram and onset envelope are computed once and shared. Rhythm,
// onset, energy+spectral and HPSS run on scoped worker threads.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::thread::{self, ScopedJoinHandle};
use std::time::{Duration, Instant};

use tracing::{info, warn};

pub mod beat;
pub mod energy;
pub mod features;
pub mod hpss;
pub mod mood;
pub mod onset;
pub mod types;

use beat::{BeatTracker, PulseDetector};
use energy::EnergyAnalyzer;
use features::{Spectrogram, Stft};
use onset::{OnsetDetector, OnsetEnvelope};

/// Amplitude floor before taking the peak level in dB
const SILENCE_FLOOR: f32 = 1e-10;

pub use mood::Mood;
pub use types::{
    BeatInfo, EnergyInfo, FullAnalysisResult, HpssInfo, OnsetInfo, OnsetStrengthCurve,
    SpectralInfo,
};

use crate::audio::{AudioLoader, Waveform};
use crate::config::{check_threshold_pair, AnalysisConfig};
use crate::error::{log_analysis_error, AnalysisError};

/// Audio analysis service
///
/// Cheap to clone: the FFT plans are shared behind `Arc`s.
#[derive(Debug, Clone)]
pub struct AudioAnalyzer {
    config: AnalysisConfig,
    loader: AudioLoader,
    stft: Stft,
}

/// Wait for a scoped worker, turning a panic into an error.
fn join_worker<T>(handle: ScopedJoinHandle<'_, T>, component: &str) -> Result<T, AnalysisError> {
    handle.join().map_err(|_| {
        let err = AnalysisError::WorkerPanicked {
            component: component.to_string(),
        };
        log_analysis_error(&err, "analyze_waveform");
        err
    })
}

impl AudioAnalyzer {
    /// Create an analyzer after validating `config`.
    ///
    /// # Errors
    /// `InvalidArgument` for any configuration value the analyzers cannot use.
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        let loader = AudioLoader::new(config.sample_rate)?;
        let stft = Stft::new(config.n_fft, config.hop_length);
        Ok(Self {
            config,
            loader,
            stft,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Decode `path` at the configured sample rate.
    pub fn load_audio<P: AsRef<Path>>(&self, path: P, mono: bool) -> Result<Waveform, AnalysisError> {
        self.loader.load(path, mono)
    }

    pub fn resample_audio(
        &self,
        waveform: &Waveform,
        target_rate: u32,
    ) -> Result<Waveform, AnalysisError> {
        waveform.resample(target_rate)
    }

    pub fn duration_ms(&self, waveform: &Waveform) -> f64 {
        waveform.duration_ms()
    }

    /// Convert analysis frame indices to milliseconds at `sample_rate`.
    pub fn frames_to_ms(&self, frames: &[usize], sample_rate: u32) -> Vec<f64> {
        frames
            .iter()
            .map(|&frame| features::frame_to_ms(frame, self.config.hop_length, sample_rate))
            .collect()
    }

    fn mono(waveform: &Waveform) -> Cow<'_, Waveform> {
        if waveform.is_mono() {
            Cow::Borrowed(waveform)
        } else {
            Cow::Owned(waveform.to_mono())
        }
    }

    fn spectrogram(&self, waveform: &Waveform) -> Spectrogram {
        self.stft.magnitude(waveform.samples(), waveform.sample_rate())
    }

    /// True when the waveform never rises above the configured silence level.
    fn is_silent(&self, waveform: &Waveform) -> bool {
        let peak_db = 20.0 * waveform.peak().max(SILENCE_FLOOR).log10();
        peak_db < self.config.silence_db
    }

    fn gate(envelope: OnsetEnvelope, silent: bool) -> OnsetEnvelope {
        if silent {
            envelope.muted()
        } else {
            envelope
        }
    }

    /// Spectral-flux onset envelope of `waveform` (downmixed if needed).
    ///
    /// Input whose peak stays below `silence_db` gets an all-zero envelope,
    /// so every envelope consumer reports it as silence.
    pub fn onset_envelope(&self, waveform: &Waveform) -> OnsetEnvelope {
        let mono = Self::mono(waveform);
        let envelope = OnsetEnvelope::from_spectrogram(&self.spectrogram(&mono));
        Self::gate(envelope, self.is_silent(&mono))
    }

    fn beat_tracker(&self) -> BeatTracker {
        BeatTracker::new(self.config.rhythm.clone())
    }

    fn onset_detector(&self) -> OnsetDetector {
        OnsetDetector::new(self.config.onset.clone())
    }

    fn energy_analyzer(&self, drop_threshold: f32, break_threshold: f32) -> EnergyAnalyzer {
        EnergyAnalyzer {
            frame_length: self.config.energy.frame_length,
            hop_length: self.config.hop_length,
            drop_threshold,
            break_threshold,
        }
    }

    /// Tempo and beat grid. Silent input yields `beat_count == 0`.
    pub fn detect_beats(&self, waveform: &Waveform) -> BeatInfo {
        self.beat_tracker().track(&self.onset_envelope(waveform))
    }

    /// Loose pulse anchors in ms, non-empty for any non-silent input.
    pub fn detect_pulse(&self, waveform: &Waveform) -> Vec<f64> {
        PulseDetector::new(self.config.pulse.clone()).detect(&self.onset_envelope(waveform))
    }

    /// Onsets classified with explicit strong/weak thresholds.
    ///
    /// # Errors
    /// `InvalidArgument` when a threshold leaves [0, 1] or `weak > strong`.
    pub fn detect_onsets(
        &self,
        waveform: &Waveform,
        strong_threshold: f32,
        weak_threshold: f32,
    ) -> Result<OnsetInfo, AnalysisError> {
        let detector = self
            .onset_detector()
            .with_thresholds(strong_threshold, weak_threshold)?;
        Ok(detector.detect(&self.onset_envelope(waveform)))
    }

    pub fn onset_strength_curve(&self, waveform: &Waveform) -> OnsetStrengthCurve {
        let (times_ms, strengths) = OnsetDetector::strength_curve(&self.onset_envelope(waveform));
        OnsetStrengthCurve {
            times_ms,
            strengths,
        }
    }

    /// RMS statistics with explicit drop/break thresholds.
    ///
    /// # Errors
    /// `InvalidArgument` when a threshold leaves [0, 1] or `break >= drop`.
    pub fn analyze_energy(
        &self,
        waveform: &Waveform,
        drop_threshold: f32,
        break_threshold: f32,
    ) -> Result<EnergyInfo, AnalysisError> {
        check_threshold_pair(
            "drop_threshold",
            drop_threshold,
            "break_threshold",
            break_threshold,
            false,
        )?;
        let mono = Self::mono(waveform);
        Ok(self
            .energy_analyzer(drop_threshold, break_threshold)
            .analyze(mono.samples(), mono.sample_rate()))
    }

    pub fn analyze_mood(&self, waveform: &Waveform) -> SpectralInfo {
        let mono = Self::mono(waveform);
        mood::analyze_mood(&self.spectrogram(&mono), &self.config.mood)
    }

    /// Beat tracking on the percussive component, onsets on the harmonic one.
    pub fn separate_harmonic_percussive(&self, waveform: &Waveform) -> HpssInfo {
        let mono = Self::mono(waveform);
        self.hpss_info(mono.samples(), mono.sample_rate(), self.is_silent(&mono))
    }

    fn hpss_info(&self, samples: &[f32], sample_rate: u32, silent: bool) -> HpssInfo {
        let started = Instant::now();
        let components = hpss::separate(samples, &self.stft, &self.config.hpss);

        let envelope_of = |component: &[f32]| {
            let spectrogram = self.stft.magnitude(component, sample_rate);
            Self::gate(OnsetEnvelope::from_spectrogram(&spectrogram), silent)
        };

        let percussive = self.beat_tracker().track(&envelope_of(components.percussive.as_slice()));
        let harmonic = self.onset_detector().detect(&envelope_of(components.harmonic.as_slice()));

        info!(
            "HPSS finished in {} ms: percussive {:.1} BPM / {} beats, {} harmonic events",
            started.elapsed().as_millis(),
            percussive.tempo_bpm,
            percussive.beat_count,
            harmonic.onset_count
        );

        HpssInfo {
            percussive_tempo_bpm: percussive.tempo_bpm,
            percussive_beat_times_ms: percussive.beat_times_ms,
            harmonic_beat_times_ms: harmonic.onset_times_ms,
        }
    }

    /// Run every analyzer over an already-loaded waveform.
    ///
    /// Sub-analyzers never fail on degenerate audio; the only error is a
    /// worker thread panicking.
    pub fn analyze_waveform(
        &self,
        waveform: &Waveform,
        include_hpss: bool,
    ) -> Result<FullAnalysisResult, AnalysisError> {
        let started = Instant::now();
        let mono = Self::mono(waveform);
        let samples = mono.samples();
        let sample_rate = mono.sample_rate();

        let spectrogram = self.spectrogram(&mono);
        let silent = self.is_silent(&mono);
        let envelope = Self::gate(OnsetEnvelope::from_spectrogram(&spectrogram), silent);
        if envelope.is_silent() {
            warn!("Input is silent or near-silent; rhythm and onset results will be empty");
        }

        let energy = &self.config.energy;
        let energy_analyzer = self.energy_analyzer(energy.drop_threshold, energy.break_threshold);

        let (beat_info, onset_info, (energy_info, spectral_info), hpss_info) =
            thread::scope(|scope| -> Result<_, AnalysisError> {
                let hpss = include_hpss
                    .then(|| scope.spawn(|| self.hpss_info(samples, sample_rate, silent)));
                let rhythm = scope.spawn(|| self.beat_tracker().track(&envelope));
                let onsets = scope.spawn(|| self.onset_detector().detect(&envelope));
                let dynamics = scope.spawn(|| {
                    (
                        energy_analyzer.analyze(samples, sample_rate),
                        mood::analyze_mood(&spectrogram, &self.config.mood),
                    )
                });

                let beat_info = join_worker(rhythm, "rhythm")?;
                let onset_info = join_worker(onsets, "onset")?;
                let dynamics = join_worker(dynamics, "energy")?;
                let hpss_info = match hpss {
                    Some(handle) => Some(join_worker(handle, "hpss")?),
                    None => None,
                };
                Ok((beat_info, onset_info, dynamics, hpss_info))
            })?;

        info!(
            "Analysis finished in {} ms: {:.1} BPM, {} beats, {} onsets, mood {}",
            started.elapsed().as_millis(),
            beat_info.tempo_bpm,
            beat_info.beat_count,
            onset_info.onset_count,
            spectral_info.mood
        );

        Ok(FullAnalysisResult {
            duration_ms: mono.duration_ms(),
            sample_rate,
            beat_info,
            onset_info,
            energy_info,
            spectral_info,
            hpss_info,
        })
    }

    /// Load `path` once and run the full analysis on it.
    ///
    /// # Errors
    /// The loader's error when the file cannot be decoded.
    pub fn analyze_full<P: AsRef<Path>>(
        &self,
        path: P,
        include_hpss: bool,
    ) -> Result<FullAnalysisResult, AnalysisError> {
        let waveform = self.load_audio(path.as_ref(), true).map_err(|err| {
            log_analysis_error(&err, "analyze_full");
            err
        })?;
        self.analyze_waveform(&waveform, include_hpss)
    }

    /// [`AudioAnalyzer::analyze_full`] on the blocking pool with a deadline.
    ///
    /// On timeout the caller gets `Timeout` immediately; the worker finishes
    /// in the background and its result is discarded.
    pub async fn analyze_full_with_timeout<P: AsRef<Path>>(
        &self,
        path: P,
        include_hpss: bool,
        timeout: Duration,
    ) -> Result<FullAnalysisResult, AnalysisError> {
        let analyzer = self.clone();
        let path: PathBuf = path.as_ref().to_path_buf();
        let task =
            tokio::task::spawn_blocking(move || analyzer.analyze_full(&path, include_hpss));

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(_join_error)) => {
                let err = AnalysisError::WorkerPanicked {
                    component: "analyze_full".to_string(),
                };
                log_analysis_error(&err, "analyze_full_with_timeout");
                Err(err)
            }
            Err(_elapsed) => {
                let err = AnalysisError::Timeout {
                    seconds: timeout.as_secs(),
                };
                log_analysis_error(&err, "analyze_full_with_timeout");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::synth::{SyntheticPattern, SyntheticSpec};

    fn analyzer() -> AudioAnalyzer {
        AudioAnalyzer::new(AnalysisConfig::default()).unwrap()
    }

    fn clicks(bpm: f32, duration_ms: u32) -> Waveform {
        SyntheticSpec::new(SyntheticPattern::ClickTrack { bpm }, 22_050, duration_ms)
            .waveform()
            .unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = AnalysisConfig {
            sample_rate: 0,
            ..AnalysisConfig::default()
        };
        assert!(AudioAnalyzer::new(config).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_frames_to_ms() {
        let times = analyzer().frames_to_ms(&[0, 43, 86], 22_050);
        assert_eq!(times[0], 0.0);
        assert!((times[1] - 998.458).abs() < 0.01);
        assert!((times[2] - 1996.916).abs() < 0.01);
    }

    #[test]
    fn test_detect_onsets_validates_thresholds() {
        let waveform = clicks(120.0, 2_000);
        let err = analyzer().detect_onsets(&waveform, 0.2, 0.5).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(analyzer().detect_onsets(&waveform, 1.5, 0.3).is_err());
        assert!(analyzer().detect_onsets(&waveform, 0.5, 0.5).is_ok());
    }

    #[test]
    fn test_analyze_energy_validates_thresholds() {
        let waveform = clicks(120.0, 2_000);
        assert!(analyzer().analyze_energy(&waveform, 0.2, 0.8).is_err());
        assert!(analyzer().analyze_energy(&waveform, 0.5, 0.5).is_err());
        assert!(analyzer().analyze_energy(&waveform, 0.8, 0.2).is_ok());
    }

    #[test]
    fn test_stereo_input_is_downmixed() {
        let mono = clicks(120.0, 4_000);
        let stereo_samples: Vec<f32> = mono.samples().iter().flat_map(|&s| [s, s]).collect();
        let stereo = Waveform::new(stereo_samples, 2, 22_050).unwrap();

        let analyzer = analyzer();
        assert_eq!(
            analyzer.detect_beats(&stereo),
            analyzer.detect_beats(&mono),
            "identical channels must analyze like the mono signal"
        );
    }

    #[test]
    fn test_analysis_is_deterministic() {
        let waveform = clicks(100.0, 6_000);
        let analyzer = analyzer();
        let first = analyzer.analyze_waveform(&waveform, true).unwrap();
        let second = analyzer.analyze_waveform(&waveform, true).unwrap();
        assert_eq!(first.to_json(false).unwrap(), second.to_json(false).unwrap());
    }

    #[test]
    fn test_near_silent_noise_has_no_rhythm() {
        let waveform = SyntheticSpec {
            amplitude: 1e-5,
            ..SyntheticSpec::new(SyntheticPattern::WhiteNoise, 22_050, 5_000)
        }
        .waveform()
        .unwrap();
        let analyzer = analyzer();

        let result = analyzer.analyze_waveform(&waveform, true).unwrap();
        assert_eq!(result.beat_info.beat_count, 0, "{:?}", result.beat_info);
        assert_eq!(result.beat_info.tempo_bpm, 0.0);
        assert_eq!(result.onset_info.onset_count, 0, "{:?}", result.onset_info);
        let hpss = result.hpss_info.unwrap();
        assert!(hpss.percussive_beat_times_ms.is_empty());
        assert!(hpss.harmonic_beat_times_ms.is_empty());

        assert_eq!(analyzer.detect_beats(&waveform).beat_count, 0);
        assert!(analyzer.detect_pulse(&waveform).is_empty());
        assert_eq!(analyzer.detect_onsets(&waveform, 0.7, 0.3).unwrap().onset_count, 0);
        assert!(analyzer
            .onset_strength_curve(&waveform)
            .strengths
            .iter()
            .all(|&s| s == 0.0));
    }

    #[test]
    fn test_quiet_clicks_above_silence_level_are_tracked() {
        // 0.01 peak is -40 dBFS, well above the default -60 dBFS gate
        let waveform = SyntheticSpec {
            amplitude: 0.01,
            ..SyntheticSpec::new(SyntheticPattern::ClickTrack { bpm: 120.0 }, 22_050, 6_000)
        }
        .waveform()
        .unwrap();
        let beats = analyzer().detect_beats(&waveform);
        assert!(beats.beat_count > 0);
        assert!((beats.tempo_bpm - 120.0).abs() <= 2.0, "tempo {}", beats.tempo_bpm);
    }

    #[test]
    fn test_pulse_on_single_hit() {
        let mut samples = vec![0.0f32; 22_050 * 3];
        let click = crate::testing::synth::generate_click_sample(22_050);
        samples[30_000..30_000 + click.len()].copy_from_slice(&click);
        let waveform = Waveform::mono(samples, 22_050).unwrap();

        let pulses = analyzer().detect_pulse(&waveform);
        assert!(!pulses.is_empty());
        assert!(
            pulses.iter().any(|&t| (t - 1360.5).abs() < 80.0),
            "expected a pulse near the hit, got {:?}",
            pulses
        );
    }

    #[tokio::test]
    async fn test_timeout_on_missing_file_reports_io() {
        let err = analyzer()
            .analyze_full_with_timeout("/nonexistent.wav", false, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.is_io());
    }
}
