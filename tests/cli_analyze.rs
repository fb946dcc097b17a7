use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use beatsync::testing::{read_wav, write_wav, SyntheticPattern, SyntheticSpec};
use serde_json::Value;
use tempfile::TempDir;

fn cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_beatsync_cli"))
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn synth_click_track(dir: &TempDir, duration_ms: u32) -> PathBuf {
    let path = dir.path().join("clicks.wav");
    let output = cli()
        .args([
            "synth",
            "--bpm",
            "120",
            "--duration-ms",
            &duration_ms.to_string(),
            "--output",
            &path_arg(&path),
        ])
        .output()
        .expect("failed to run beatsync_cli synth");
    assert!(
        output.status.success(),
        "synth exited with {:?}: {}",
        output.status.code(),
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(path.exists(), "synth did not write {}", path.display());
    path
}

fn stdout_json(output: &std::process::Output) -> Value {
    assert!(
        output.status.success(),
        "CLI exited with {:?}: {}",
        output.status.code(),
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8(output.stdout.clone()).expect("stdout UTF-8");
    serde_json::from_str(stdout.trim()).expect("JSON payload on stdout")
}

#[test]
fn analyze_click_track_reports_tempo() {
    let dir = TempDir::new().unwrap();
    let wav = synth_click_track(&dir, 10_000);

    let output = cli()
        .args(["analyze", &path_arg(&wav)])
        .output()
        .expect("failed to run beatsync_cli analyze");
    let json = stdout_json(&output);

    let tempo = json["beat_info"]["tempo_bpm"].as_f64().unwrap_or_default();
    assert!((tempo - 120.0).abs() <= 2.0, "tempo {tempo}");
    assert!(json["hpss_info"].is_null());
    assert!(json["spectral_info"]["mood"].is_string());
}

#[test]
fn analyze_writes_output_file_with_hpss() {
    let dir = TempDir::new().unwrap();
    let wav = synth_click_track(&dir, 4_000);
    let report = dir.path().join("report.json");

    let output = cli()
        .args([
            "analyze",
            &path_arg(&wav),
            "--hpss",
            "--timeout-secs",
            "120",
            "--output",
            &path_arg(&report),
        ])
        .output()
        .expect("failed to run analyze with output");
    assert!(output.status.success(), "exit {:?}", output.status.code());

    let contents = std::fs::read_to_string(&report).expect("report written");
    let json: Value = serde_json::from_str(&contents).expect("report JSON");
    assert!(json["hpss_info"].is_object());
}

#[test]
fn analyze_timeout_exits_without_waiting_for_analysis() {
    let dir = TempDir::new().unwrap();
    let spec = SyntheticSpec::new(SyntheticPattern::WhiteNoise, 22_050, 180_000);
    let wav = dir.path().join("long_noise.wav");
    write_wav(&wav, &spec.render(), 1, spec.sample_rate).expect("write long fixture");

    let started = Instant::now();
    let output = cli()
        .args(["analyze", &path_arg(&wav), "--hpss", "--timeout-secs", "0"])
        .output()
        .expect("failed to run analyze with zero timeout");
    let elapsed = started.elapsed();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).expect("stderr UTF-8");
    assert!(stderr.contains("Timeout"), "stderr was {stderr}");
    assert!(
        elapsed < Duration::from_secs(5),
        "timed-out run took {elapsed:?}, expected an immediate exit"
    );
}

#[test]
fn synth_writes_requested_format() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tone.wav");
    let output = cli()
        .args([
            "synth",
            "--pattern",
            "sine",
            "--frequency-hz",
            "220",
            "--duration-ms",
            "1500",
            "--sample-rate",
            "16000",
            "--output",
            &path_arg(&path),
        ])
        .output()
        .expect("failed to run synth");
    assert!(output.status.success(), "exit {:?}", output.status.code());

    let waveform = read_wav(&path).expect("read synthesized WAV");
    assert_eq!(waveform.sample_rate(), 16_000);
    assert_eq!(waveform.channels(), 1);
    assert_eq!(waveform.frames(), 24_000);
    assert!(waveform.peak() > 0.5);
}

#[test]
fn analyze_missing_file_fails() {
    let output = cli()
        .args(["analyze", "/no/such/track.mp3"])
        .output()
        .expect("failed to run analyze on missing file");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).expect("stderr UTF-8");
    assert!(stderr.contains("FileNotFound"), "stderr was {stderr}");
}

#[test]
fn keyframes_from_beats_are_paired() {
    let dir = TempDir::new().unwrap();
    let wav = synth_click_track(&dir, 5_000);

    let output = cli()
        .args([
            "keyframes",
            &path_arg(&wav),
            "--source",
            "beats",
            "--property",
            "scale_x",
            "--zoom-scale",
            "1.15",
        ])
        .output()
        .expect("failed to run keyframes");
    let json = stdout_json(&output);
    let keyframes = json.as_array().expect("keyframe array");

    assert!(!keyframes.is_empty());
    assert_eq!(keyframes.len() % 2, 0);
    assert_eq!(keyframes[0]["property"], "scale_x");
    assert_eq!(keyframes[0]["value"], 1.15);
    let times: Vec<u64> = keyframes
        .iter()
        .map(|k| k["time_offset_ms"].as_u64().unwrap_or_default())
        .collect();
    assert!(times.windows(2).all(|w| w[0] < w[1]), "times {times:?}");
}

#[test]
fn keyframes_reject_unknown_property() {
    let dir = TempDir::new().unwrap();
    let wav = synth_click_track(&dir, 2_000);

    let output = cli()
        .args([
            "keyframes",
            &path_arg(&wav),
            "--source",
            "onsets",
            "--property",
            "wobble",
        ])
        .output()
        .expect("failed to run keyframes with bad property");
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).expect("stderr UTF-8");
    assert!(stderr.contains("uniform_scale"), "stderr was {stderr}");
}

#[test]
fn curve_matches_frame_grid() {
    let dir = TempDir::new().unwrap();
    let wav = synth_click_track(&dir, 2_000);

    let output = cli()
        .args(["curve", &path_arg(&wav)])
        .output()
        .expect("failed to run curve");
    let json = stdout_json(&output);

    let times = json["times_ms"].as_array().expect("times array");
    let strengths = json["strengths"].as_array().expect("strengths array");
    assert_eq!(times.len(), strengths.len());
    // 1 + 44100 / 512 centered frames
    assert_eq!(times.len(), 87);
    assert!(strengths
        .iter()
        .all(|s| (0.0..=1.0).contains(&s.as_f64().unwrap_or(-1.0))));
}

#[test]
fn invalid_config_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let wav = synth_click_track(&dir, 1_000);
    let config = dir.path().join("config.json");
    std::fs::write(&config, r#"{ "hop_length": 0 }"#).unwrap();

    let output = cli()
        .args(["--config", &path_arg(&config), "curve", &path_arg(&wav)])
        .output()
        .expect("failed to run with invalid config");
    assert_eq!(output.status.code(), Some(1));
}
