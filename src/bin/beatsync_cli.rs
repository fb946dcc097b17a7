use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use beatsync::testing::{write_wav, SyntheticPattern, SyntheticSpec};
use beatsync::{AnalysisConfig, AudioAnalyzer, KeyframeGenerator, KeyframeProperty};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "beatsync_cli",
    about = "Offline beat, onset and energy analysis for beat-synchronized editing"
)]
struct Cli {
    /// Analysis configuration JSON (defaults are used when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full analysis and print the result as JSON
    Analyze {
        path: PathBuf,
        /// Also run harmonic/percussive separation
        #[arg(long)]
        hpss: bool,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Abort the analysis after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Generate editor keyframes from beats, onsets or energy markers
    Keyframes {
        path: PathBuf,
        #[arg(long, value_enum)]
        source: KeyframeSource,
        #[arg(long, default_value = "uniform_scale")]
        property: KeyframeProperty,
        #[arg(long, default_value_t = 1.0)]
        base_scale: f64,
        #[arg(long, default_value_t = 1.2)]
        zoom_scale: f64,
        #[arg(long, default_value_t = 1.0)]
        min_scale: f64,
        #[arg(long, default_value_t = 1.3)]
        max_scale: f64,
        #[arg(long, default_value_t = 1.0)]
        drop_volume: f64,
        #[arg(long, default_value_t = 0.3)]
        break_volume: f64,
        /// Make keyframe times relative to this position in the track
        #[arg(long)]
        segment_start_ms: Option<f64>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the normalized onset-strength curve as JSON
    Curve {
        path: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Write a deterministic synthetic WAV file
    Synth {
        #[arg(long, value_enum, default_value_t = SynthPattern::Click)]
        pattern: SynthPattern,
        #[arg(long, default_value_t = 120.0)]
        bpm: f32,
        /// Tone frequency for the sine pattern
        #[arg(long, default_value_t = 440.0)]
        frequency_hz: f32,
        #[arg(long, default_value_t = 10_000)]
        duration_ms: u32,
        #[arg(long, default_value_t = 22_050)]
        sample_rate: u32,
        #[arg(long)]
        output: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KeyframeSource {
    Beats,
    Onsets,
    Energy,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SynthPattern {
    Click,
    Sine,
    Noise,
    Silence,
}

fn main() -> ExitCode {
    beatsync::init_logging();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AnalysisConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };

    match cli.command {
        Commands::Analyze {
            path,
            hpss,
            output,
            timeout_secs,
        } => run_analyze(config, &path, hpss, timeout_secs, output, cli.pretty),
        Commands::Keyframes {
            path,
            source,
            property,
            base_scale,
            zoom_scale,
            min_scale,
            max_scale,
            drop_volume,
            break_volume,
            segment_start_ms,
            output,
        } => {
            let mut config = config;
            if let Some(start) = segment_start_ms {
                config.keyframe.segment_start_ms = start;
            }
            let request = KeyframeRequest {
                source,
                property,
                base_scale,
                zoom_scale,
                min_scale,
                max_scale,
                drop_volume,
                break_volume,
            };
            run_keyframes(config, &path, &request, output, cli.pretty)
        }
        Commands::Curve { path, output } => run_curve(config, &path, output, cli.pretty),
        Commands::Synth {
            pattern,
            bpm,
            frequency_hz,
            duration_ms,
            sample_rate,
            output,
        } => {
            let pattern = match pattern {
                SynthPattern::Click => SyntheticPattern::ClickTrack { bpm },
                SynthPattern::Sine => SyntheticPattern::Sine { frequency_hz },
                SynthPattern::Noise => SyntheticPattern::WhiteNoise,
                SynthPattern::Silence => SyntheticPattern::Silence,
            };
            run_synth(SyntheticSpec::new(pattern, sample_rate, duration_ms), &output)
        }
    }
}

fn run_analyze(
    config: AnalysisConfig,
    path: &Path,
    hpss: bool,
    timeout_secs: Option<u64>,
    output_path: Option<PathBuf>,
    pretty: bool,
) -> Result<ExitCode> {
    let analyzer = AudioAnalyzer::new(config).context("invalid analysis configuration")?;

    let result = match timeout_secs {
        Some(secs) => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_time()
                .build()
                .context("starting async runtime")?;
            let result = runtime.block_on(analyzer.analyze_full_with_timeout(
                path,
                hpss,
                Duration::from_secs(secs),
            ));
            // A timed-out analysis is still running on the blocking pool;
            // dropping the runtime normally would wait for it
            runtime.shutdown_background();
            result
        }
        None => analyzer.analyze_full(path, hpss),
    }
    .with_context(|| format!("analyzing {}", path.display()))?;

    emit_json(&result, output_path, pretty)?;
    Ok(ExitCode::from(0))
}

struct KeyframeRequest {
    source: KeyframeSource,
    property: KeyframeProperty,
    base_scale: f64,
    zoom_scale: f64,
    min_scale: f64,
    max_scale: f64,
    drop_volume: f64,
    break_volume: f64,
}

fn run_keyframes(
    config: AnalysisConfig,
    path: &Path,
    request: &KeyframeRequest,
    output_path: Option<PathBuf>,
    pretty: bool,
) -> Result<ExitCode> {
    let generator = KeyframeGenerator::new(config.keyframe.clone());
    let analyzer = AudioAnalyzer::new(config).context("invalid analysis configuration")?;
    let waveform = analyzer
        .load_audio(path, true)
        .with_context(|| format!("loading {}", path.display()))?;

    let keyframes = match request.source {
        KeyframeSource::Beats => {
            let beats = analyzer.detect_beats(&waveform);
            generator.from_beats(
                &beats.beat_times_ms,
                request.base_scale,
                request.zoom_scale,
                request.property,
            )
        }
        KeyframeSource::Onsets => {
            let onset = &analyzer.config().onset;
            let onsets =
                analyzer.detect_onsets(&waveform, onset.strong_threshold, onset.weak_threshold)?;
            generator.from_onsets(
                &onsets,
                request.min_scale,
                request.max_scale,
                request.property,
            )
        }
        KeyframeSource::Energy => {
            let energy = &analyzer.config().energy;
            let info =
                analyzer.analyze_energy(&waveform, energy.drop_threshold, energy.break_threshold)?;
            generator.volume_from_energy(&info, request.drop_volume, request.break_volume)
        }
    };

    emit_json(&keyframes, output_path, pretty)?;
    Ok(ExitCode::from(0))
}

fn run_curve(
    config: AnalysisConfig,
    path: &Path,
    output_path: Option<PathBuf>,
    pretty: bool,
) -> Result<ExitCode> {
    let analyzer = AudioAnalyzer::new(config).context("invalid analysis configuration")?;
    let waveform = analyzer
        .load_audio(path, true)
        .with_context(|| format!("loading {}", path.display()))?;
    let curve = analyzer.onset_strength_curve(&waveform);
    emit_json(&curve, output_path, pretty)?;
    Ok(ExitCode::from(0))
}

fn run_synth(spec: SyntheticSpec, output: &Path) -> Result<ExitCode> {
    let samples = spec.render();
    write_wav(output, &samples, 1, spec.sample_rate)
        .with_context(|| format!("writing {}", output.display()))?;
    println!(
        "Wrote {} samples at {} Hz to {}",
        samples.len(),
        spec.sample_rate,
        output.display()
    );
    Ok(ExitCode::from(0))
}

fn emit_json<T: Serialize>(value: &T, output_path: Option<PathBuf>, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    if let Some(path) = output_path {
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    } else {
        println!("{json}");
    }
    Ok(())
}
