//! Integration tests for the analysis service
//!
//! These tests drive the public API end to end on WAV files written into a
//! temporary directory:
//! - Tempo and beat grid of a synthetic click track
//! - Degenerate (silent) input
//! - Result invariants and JSON round trip
//! - Loader resampling and error taxonomy
//! - Keyframe generation from detected beats

use std::path::{Path, PathBuf};
use std::time::Duration;

use beatsync::config::KeyframeConfig;
use beatsync::testing::{write_wav, SyntheticPattern, SyntheticSpec};
use beatsync::{
    AnalysisConfig, AnalysisError, AudioAnalyzer, ErrorCode, FullAnalysisResult,
    KeyframeGenerator, KeyframeProperty, Mood, Waveform,
};
use tempfile::TempDir;

fn analyzer() -> AudioAnalyzer {
    AudioAnalyzer::new(AnalysisConfig::default()).expect("default config is valid")
}

fn write_fixture(dir: &TempDir, name: &str, spec: &SyntheticSpec) -> PathBuf {
    let path = dir.path().join(name);
    write_wav(&path, &spec.render(), 1, spec.sample_rate).expect("write fixture");
    path
}

fn click_fixture(dir: &TempDir) -> PathBuf {
    let spec = SyntheticSpec::new(SyntheticPattern::ClickTrack { bpm: 120.0 }, 22_050, 10_000);
    write_fixture(dir, "click_120.wav", &spec)
}

fn assert_strictly_increasing(times: &[f64], label: &str) {
    for pair in times.windows(2) {
        assert!(pair[0] < pair[1], "{} not increasing: {:?}", label, pair);
    }
}

fn assert_within_duration(times: &[f64], duration_ms: f64, label: &str) {
    for &t in times {
        assert!(
            (0.0..=duration_ms).contains(&t),
            "{} time {} outside [0, {}]",
            label,
            t,
            duration_ms
        );
    }
}

#[test]
fn test_click_track_tempo_and_beats() {
    let dir = TempDir::new().unwrap();
    let path = click_fixture(&dir);

    let result = analyzer().analyze_full(&path, false).unwrap();
    let beats = &result.beat_info;

    assert!(
        (beats.tempo_bpm - 120.0).abs() <= 2.0,
        "tempo {} not within 2 BPM of 120",
        beats.tempo_bpm
    );
    assert!(
        (beats.beat_count as i64 - 20).abs() <= 1,
        "expected 20 +/- 1 beats, got {}",
        beats.beat_count
    );
    assert!(
        (beats.average_beat_interval_ms - 500.0).abs() <= 5.0,
        "average interval {} not near 500 ms",
        beats.average_beat_interval_ms
    );
    assert!(result.hpss_info.is_none());
}

#[test]
fn test_click_track_result_invariants() {
    let dir = TempDir::new().unwrap();
    let path = click_fixture(&dir);

    let result = analyzer().analyze_full(&path, true).unwrap();
    let duration = result.duration_ms;
    assert!((duration - 10_000.0).abs() < 1.0, "duration {}", duration);
    assert_eq!(result.sample_rate, 22_050);

    let beats = &result.beat_info;
    assert_eq!(beats.beat_count, beats.beat_times_ms.len());
    assert_strictly_increasing(&beats.beat_times_ms, "beats");
    assert_within_duration(&beats.beat_times_ms, duration, "beat");

    let onsets = &result.onset_info;
    assert_eq!(onsets.onset_count, onsets.onset_times_ms.len());
    assert_eq!(onsets.onset_times_ms.len(), onsets.onset_strengths.len());
    assert_strictly_increasing(&onsets.onset_times_ms, "onsets");
    assert_within_duration(&onsets.onset_times_ms, duration, "onset");
    assert!(onsets
        .onset_strengths
        .iter()
        .all(|s| (0.0..=1.0).contains(s)));
    let config = AnalysisConfig::default();
    let strength_at = |t: f64| -> f32 {
        let index = onsets
            .onset_times_ms
            .iter()
            .position(|&onset| onset == t)
            .unwrap_or_else(|| panic!("subset time {} not in onsets", t));
        onsets.onset_strengths[index]
    };
    for &t in &onsets.strong_onsets_ms {
        let strength = strength_at(t);
        assert!(
            strength > config.onset.strong_threshold,
            "strong onset at {} has strength {}",
            t,
            strength
        );
    }
    for &t in &onsets.weak_onsets_ms {
        let strength = strength_at(t);
        assert!(
            strength < config.onset.weak_threshold,
            "weak onset at {} has strength {}",
            t,
            strength
        );
    }
    for (t, strength) in onsets.iter() {
        let in_strong = onsets.strong_onsets_ms.contains(&t);
        let in_weak = onsets.weak_onsets_ms.contains(&t);
        assert_eq!(in_strong, strength > config.onset.strong_threshold, "onset at {}", t);
        assert_eq!(in_weak, strength < config.onset.weak_threshold, "onset at {}", t);
    }
    assert!(onsets.onset_count >= 18, "clicks should register as onsets");

    let energy = &result.energy_info;
    assert!(energy.average_rms <= energy.peak_rms);
    assert_within_duration(&energy.drop_times_ms, duration, "drop");
    assert_within_duration(&energy.break_times_ms, duration, "break");

    let spectral = &result.spectral_info;
    assert!(!spectral.suggested_filter_style.is_empty());
    assert_eq!(spectral.suggested_filter_style, spectral.mood.filter_styles());

    let hpss = result.hpss_info.as_ref().expect("hpss requested");
    assert_strictly_increasing(&hpss.percussive_beat_times_ms, "percussive beats");
    assert_strictly_increasing(&hpss.harmonic_beat_times_ms, "harmonic events");
}

#[test]
fn test_silence_is_soft_failure() {
    let dir = TempDir::new().unwrap();
    let spec = SyntheticSpec::new(SyntheticPattern::Silence, 22_050, 3_000);
    let path = write_fixture(&dir, "silence.wav", &spec);

    let result = analyzer().analyze_full(&path, true).unwrap();

    assert_eq!(result.beat_info.beat_count, 0);
    assert_eq!(result.beat_info.tempo_bpm, 0.0);
    assert_eq!(result.onset_info.onset_count, 0);
    assert!(result.energy_info.drop_times_ms.is_empty());
    assert!(result.energy_info.break_times_ms.is_empty());
    assert_eq!(result.energy_info.peak_rms, 0.0);
    assert_eq!(result.spectral_info.mood, Mood::Neutral);
    assert_eq!(result.spectral_info.suggested_filter_style, vec!["natural", "clean"]);
}

#[test]
fn test_pulse_on_silence_is_empty() {
    let waveform = SyntheticSpec::new(SyntheticPattern::Silence, 22_050, 2_000)
        .waveform()
        .unwrap();
    assert!(analyzer().detect_pulse(&waveform).is_empty());
}

#[test]
fn test_pulse_on_clicks_is_non_empty() {
    let waveform = SyntheticSpec::new(SyntheticPattern::ClickTrack { bpm: 100.0 }, 22_050, 5_000)
        .waveform()
        .unwrap();
    let pulse = analyzer().detect_pulse(&waveform);
    assert!(!pulse.is_empty());
    assert_strictly_increasing(&pulse, "pulse");
}

#[test]
fn test_json_round_trip_of_real_result() {
    let dir = TempDir::new().unwrap();
    let path = click_fixture(&dir);
    let result = analyzer().analyze_full(&path, false).unwrap();

    let json = result.to_json(true).unwrap();
    let parsed = FullAnalysisResult::from_json(&json).unwrap();
    assert_eq!(parsed, result);

    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert!(value["hpss_info"].is_null());
    assert!(value["beat_info"]["beat_times_ms"].is_array());
}

#[test]
fn test_stereo_44100_file_is_downmixed_and_resampled() {
    let dir = TempDir::new().unwrap();
    let spec = SyntheticSpec::new(SyntheticPattern::ClickTrack { bpm: 120.0 }, 44_100, 6_000);
    let mono = spec.render();
    let stereo: Vec<f32> = mono.iter().flat_map(|&s| [s, s]).collect();
    let path = dir.path().join("stereo.wav");
    write_wav(&path, &stereo, 2, 44_100).unwrap();

    let analyzer = analyzer();
    let waveform = analyzer.load_audio(&path, true).unwrap();
    assert!(waveform.is_mono());
    assert_eq!(waveform.sample_rate(), 22_050);
    assert!((waveform.frames() as i64 - 132_300).abs() <= 1);

    let beats = analyzer.detect_beats(&waveform);
    assert!(
        (beats.tempo_bpm - 120.0).abs() <= 2.0,
        "tempo {} after resampling",
        beats.tempo_bpm
    );
}

#[test]
fn test_resample_five_seconds_to_16k() {
    let waveform = SyntheticSpec::new(SyntheticPattern::Sine { frequency_hz: 440.0 }, 44_100, 5_000)
        .waveform()
        .unwrap();
    let resampled = analyzer().resample_audio(&waveform, 16_000).unwrap();
    assert_eq!(resampled.sample_rate(), 16_000);
    assert!(
        (resampled.frames() as i64 - 80_000).abs() <= 1,
        "got {} frames",
        resampled.frames()
    );
}

#[test]
fn test_missing_file_is_io_error() {
    let err = analyzer()
        .analyze_full(Path::new("/definitely/not/here.wav"), false)
        .unwrap_err();
    assert!(err.is_io(), "expected IO error, got {}", err);
    assert!(!err.is_invalid_argument());
    assert!(err.code() > 0);
}

#[test]
fn test_garbage_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("noise.mp3");
    std::fs::write(&path, b"this is not audio at all").unwrap();

    let err = analyzer().load_audio(&path, true).unwrap_err();
    assert!(err.is_io(), "expected IO error, got {}", err);
}

#[test]
fn test_invalid_thresholds_rejected() {
    let waveform = Waveform::mono(vec![0.0; 22_050], 22_050).unwrap();
    let analyzer = analyzer();

    assert!(matches!(
        analyzer.detect_onsets(&waveform, 0.2, 0.6),
        Err(AnalysisError::InvalidArgument { .. })
    ));
    assert!(matches!(
        analyzer.analyze_energy(&waveform, 0.3, 0.5),
        Err(AnalysisError::InvalidArgument { .. })
    ));
    assert!(matches!(
        analyzer.detect_onsets(&waveform, 1.5, 0.3),
        Err(AnalysisError::InvalidArgument { .. })
    ));
}

#[test]
fn test_keyframes_from_example_beats() {
    let generator = KeyframeGenerator::new(KeyframeConfig::default());
    let keyframes = generator.from_beats(
        &[0.0, 500.0, 1000.0],
        1.0,
        1.15,
        KeyframeProperty::UniformScale,
    );
    assert_eq!(keyframes.len(), 6);
    for pair in keyframes.windows(2) {
        assert!(pair[0].time_offset_ms() < pair[1].time_offset_ms());
    }
}

#[test]
fn test_keyframes_from_detected_beats() {
    let dir = TempDir::new().unwrap();
    let path = click_fixture(&dir);
    let analyzer = analyzer();
    let waveform = analyzer.load_audio(&path, true).unwrap();
    let beats = analyzer.detect_beats(&waveform);

    let generator = KeyframeGenerator::new(analyzer.config().keyframe.clone());
    let keyframes =
        generator.from_beats(&beats.beat_times_ms, 1.0, 1.2, KeyframeProperty::UniformScale);
    assert_eq!(keyframes.len(), 2 * beats.beat_count);
    for pair in keyframes.windows(2) {
        assert!(pair[0].time_offset_ms() < pair[1].time_offset_ms());
    }
}

#[test]
fn test_analysis_is_deterministic() {
    let dir = TempDir::new().unwrap();
    let path = click_fixture(&dir);
    let analyzer = analyzer();
    let first = analyzer.analyze_full(&path, false).unwrap();
    let second = analyzer.analyze_full(&path, false).unwrap();
    assert_eq!(first, second);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_analysis_with_generous_timeout() {
    let dir = TempDir::new().unwrap();
    let path = click_fixture(&dir);
    let result = analyzer()
        .analyze_full_with_timeout(&path, false, Duration::from_secs(120))
        .await
        .unwrap();
    assert!(result.beat_info.beat_count > 0);
}
