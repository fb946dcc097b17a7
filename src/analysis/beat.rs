// BeatTracker - tempo estimation and dynamic-programming beat tracking
//
// Algorithm (after Ellis, "Beat Tracking by Dynamic Programming", 2007):
// 1. Tempo: autocorrelation of the mean-removed onset envelope over the lags
//    allowed by [min_bpm, max_bpm], lightly smoothed, weighted by a log-normal
//    prior centered on start_bpm (one octave std), parabolic peak refinement
// 2. Local score: envelope / std, convolved with a Gaussian of width period/32
// 3. Cumulative score: score[i] = local[i] + max over gaps g in
//    [period/2, 2*period] of (score[i-g] - tightness * ln(g/period)^2)
// 4. Last beat: latest local maximum of the cumulative score above half the
//    median of all its local maxima, then backtrack through the best gaps
// 5. Trim: drop leading/trailing beats whose local score is below half the
//    RMS local score of all beats
//
// The pulse detector is a looser peak picker over the same envelope.

use tracing::{debug, warn};

use super::onset::{OnsetEnvelope, PeakPicker};
use super::types::BeatInfo;
use crate::config::{PulseConfig, RhythmConfig};

/// Prior width in octaves
const TEMPO_STD_OCTAVES: f32 = 1.0;

/// Relative score difference treated as a tie between two DP predecessors
const TIE_EPSILON: f32 = 1e-6;

/// Maximum relative disagreement between the beat-grid tempo and the
/// autocorrelation tempo before the grid is ignored for tempo reporting
const GRID_TEMPO_TOLERANCE: f64 = 0.1;

/// BeatTracker estimates tempo and a globally consistent beat sequence
#[derive(Debug, Clone)]
pub struct BeatTracker {
    config: RhythmConfig,
}

impl BeatTracker {
    pub fn new(config: RhythmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RhythmConfig {
        &self.config
    }

    /// Tempo in BPM from the envelope's periodicity, `None` when the
    /// envelope has no usable periodic structure.
    pub fn estimate_tempo(&self, envelope: &OnsetEnvelope) -> Option<f32> {
        if envelope.is_silent() {
            return None;
        }

        let env = envelope.values();
        let n = env.len();
        let fps = envelope.frame_rate();

        let min_lag = ((60.0 * fps / self.config.max_bpm).floor() as usize).max(1);
        let max_lag = ((60.0 * fps / self.config.min_bpm).ceil() as usize).min(n.saturating_sub(2));
        if max_lag <= min_lag {
            return None;
        }

        let mean = env.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
        let centered: Vec<f64> = env.iter().map(|&v| v as f64 - mean).collect();

        let autocorr: Vec<f64> = (0..=max_lag + 1)
            .map(|lag| {
                centered[..n - lag]
                    .iter()
                    .zip(&centered[lag..])
                    .map(|(a, b)| a * b)
                    .sum()
            })
            .collect();

        // 3-tap smoothing keeps non-integer periods from splitting their peak
        let smoothed = |lag: usize| -> f64 {
            0.25 * autocorr[lag - 1] + 0.5 * autocorr[lag] + 0.25 * autocorr[lag + 1]
        };

        let lag_bpm = |lag: f32| 60.0 * fps / lag;
        let prior = |bpm: f32| {
            let octaves = (bpm / self.config.start_bpm).log2() / TEMPO_STD_OCTAVES;
            (-0.5 * octaves * octaves).exp() as f64
        };

        let mut best: Option<(usize, f64)> = None;
        for lag in min_lag..=max_lag {
            let strength = smoothed(lag);
            if strength <= 0.0 {
                continue;
            }
            let score = strength * prior(lag_bpm(lag as f32));
            best = match best {
                None => Some((lag, score)),
                Some((best_lag, best_score)) => {
                    let tie = (score - best_score).abs() <= TIE_EPSILON as f64 * best_score.abs();
                    let closer = self.prior_distance(lag_bpm(lag as f32))
                        < self.prior_distance(lag_bpm(best_lag as f32));
                    if (score > best_score && !tie) || (tie && closer) {
                        Some((lag, score))
                    } else {
                        Some((best_lag, best_score))
                    }
                }
            };
        }

        let (best_lag, _) = best?;

        // Parabolic interpolation around the winning lag
        let mut offset = 0.0f64;
        if best_lag > min_lag && best_lag < max_lag {
            let a = smoothed(best_lag - 1);
            let b = smoothed(best_lag);
            let c = smoothed(best_lag + 1);
            let denom = a - 2.0 * b + c;
            if denom < 0.0 {
                offset = (0.5 * (a - c) / denom).clamp(-0.5, 0.5);
            }
        }

        let tempo = lag_bpm((best_lag as f64 + offset) as f32);
        debug!("Tempo estimate: {:.2} BPM (lag {} frames)", tempo, best_lag);
        Some(tempo)
    }

    /// Distance of `bpm` from the prior, in octaves.
    fn prior_distance(&self, bpm: f32) -> f32 {
        (bpm / self.config.start_bpm).log2().abs()
    }

    /// Beat frames for an envelope at a known tempo.
    pub fn track_frames(&self, envelope: &OnsetEnvelope, tempo_bpm: f32) -> Vec<usize> {
        let env = envelope.values();
        let n = env.len();
        if n == 0 || tempo_bpm <= 0.0 {
            return Vec::new();
        }

        let period = 60.0 * envelope.frame_rate() / tempo_bpm;
        if period < 1.0 {
            return Vec::new();
        }

        let local_score = local_score(env, period);
        let max_local = local_score.iter().copied().fold(0.0f32, f32::max);
        if max_local <= 0.0 {
            return Vec::new();
        }

        let min_gap = ((period / 2.0).round() as usize).max(1);
        let max_gap = ((2.0 * period).round() as usize).max(min_gap);
        let penalty: Vec<f32> = (0..=max_gap)
            .map(|gap| {
                if gap < min_gap {
                    f32::NEG_INFINITY
                } else {
                    let log_ratio = (gap as f32 / period).ln();
                    -self.config.tightness * log_ratio * log_ratio
                }
            })
            .collect();

        let score_threshold = 0.01 * max_local;
        let mut cumulative = vec![0.0f32; n];
        let mut backlink: Vec<Option<usize>> = vec![None; n];
        let mut first_beat = true;

        for i in 0..n {
            if first_beat && local_score[i] < score_threshold {
                cumulative[i] = local_score[i];
                continue;
            }
            first_beat = false;

            let mut best: Option<(usize, f32)> = None;
            for gap in min_gap..=max_gap.min(i) {
                let candidate = cumulative[i - gap] + penalty[gap];
                best = match best {
                    None => Some((gap, candidate)),
                    Some((best_gap, best_value)) => {
                        let tie = (candidate - best_value).abs()
                            <= TIE_EPSILON * best_value.abs().max(1.0);
                        let closer = (gap as f32 / period).ln().abs()
                            < (best_gap as f32 / period).ln().abs();
                        if (candidate > best_value && !tie) || (tie && closer) {
                            Some((gap, candidate))
                        } else {
                            Some((best_gap, best_value))
                        }
                    }
                };
            }

            match best {
                Some((gap, value)) => {
                    cumulative[i] = local_score[i] + value;
                    backlink[i] = Some(i - gap);
                }
                None => cumulative[i] = local_score[i],
            }
        }

        let Some(last) = last_beat(&cumulative) else {
            return Vec::new();
        };

        let mut beats = vec![last];
        let mut cursor = last;
        while let Some(previous) = backlink[cursor] {
            beats.push(previous);
            cursor = previous;
        }
        beats.reverse();

        if self.config.trim {
            trim_beats(&local_score, &mut beats);
        }
        beats
    }

    /// Full rhythm analysis: tempo plus beat times.
    ///
    /// Silent or aperiodic input returns the configured sentinel tempo with
    /// no beats.
    pub fn track(&self, envelope: &OnsetEnvelope) -> BeatInfo {
        let sentinel = self.config.silent_tempo_bpm as f64;

        let Some(tempo) = self.estimate_tempo(envelope) else {
            warn!("No rhythmic content found, reporting {} BPM", sentinel);
            return BeatInfo::silent(sentinel);
        };

        let frames = self.track_frames(envelope, tempo);
        if frames.is_empty() {
            warn!("Beat tracker found no beats, reporting {} BPM", sentinel);
            return BeatInfo::silent(sentinel);
        }

        let beat_times_ms: Vec<f64> = frames.iter().map(|&f| envelope.frame_to_ms(f)).collect();
        let tempo_bpm = grid_tempo(&beat_times_ms, tempo as f64);

        debug!(
            "Beat tracking: {:.2} BPM, {} beats",
            tempo_bpm,
            beat_times_ms.len()
        );

        BeatInfo::new(tempo_bpm, beat_times_ms)
    }
}

/// Onset envelope normalized by its standard deviation and smoothed with a
/// Gaussian of width period / 32.
fn local_score(env: &[f32], period: f32) -> Vec<f32> {
    let n = env.len();
    let mean = env.iter().sum::<f32>() / n as f32;
    let variance = if n > 1 {
        env.iter().map(|&v| (v - mean) * (v - mean)).sum::<f32>() / (n - 1) as f32
    } else {
        0.0
    };
    let std = variance.sqrt();
    if std <= f32::EPSILON {
        return vec![0.0; n];
    }

    let half = period.round().max(1.0) as isize;
    let kernel: Vec<f32> = (-half..=half)
        .map(|j| {
            let x = j as f32 * 32.0 / period;
            (-0.5 * x * x).exp()
        })
        .collect();

    (0..n as isize)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .filter_map(|(k, &w)| {
                    let idx = i + k as isize - half;
                    (idx >= 0 && (idx as usize) < n).then(|| w * env[idx as usize] / std)
                })
                .sum()
        })
        .collect()
}

/// Latest local maximum of the cumulative score that reaches half the median
/// local-maximum score.
fn last_beat(cumulative: &[f32]) -> Option<usize> {
    let n = cumulative.len();
    let maxima: Vec<usize> = (0..n)
        .filter(|&i| {
            let rising = i == 0 || cumulative[i] > cumulative[i - 1];
            let not_falling = i + 1 == n || cumulative[i] >= cumulative[i + 1];
            rising && not_falling
        })
        .collect();
    if maxima.is_empty() {
        return None;
    }

    let mut values: Vec<f32> = maxima.iter().map(|&i| cumulative[i]).collect();
    values.sort_by(|a, b| a.total_cmp(b));
    let median = if values.len() % 2 == 1 {
        values[values.len() / 2]
    } else {
        0.5 * (values[values.len() / 2 - 1] + values[values.len() / 2])
    };

    maxima
        .into_iter()
        .filter(|&i| cumulative[i] >= 0.5 * median)
        .max()
}

/// Drop weak beats at either end of the sequence.
fn trim_beats(local_score: &[f32], beats: &mut Vec<usize>) {
    if beats.is_empty() {
        return;
    }
    let mean_square =
        beats.iter().map(|&b| local_score[b] * local_score[b]).sum::<f32>() / beats.len() as f32;
    let threshold = 0.5 * mean_square.sqrt();

    let first = beats.iter().position(|&b| local_score[b] > threshold);
    let last = beats.iter().rposition(|&b| local_score[b] > threshold);
    match (first, last) {
        (Some(first), Some(last)) => {
            beats.truncate(last + 1);
            beats.drain(..first);
        }
        _ => beats.clear(),
    }
}

/// Tempo implied by the beat grid (least-squares slope), if it agrees with
/// the periodicity estimate; otherwise the estimate itself.
fn grid_tempo(beat_times_ms: &[f64], estimate_bpm: f64) -> f64 {
    if beat_times_ms.len() < 4 {
        return estimate_bpm;
    }

    let n = beat_times_ms.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = beat_times_ms.iter().sum::<f64>() / n;
    let (mut covariance, mut variance) = (0.0, 0.0);
    for (k, &t) in beat_times_ms.iter().enumerate() {
        let dx = k as f64 - mean_x;
        covariance += dx * (t - mean_y);
        variance += dx * dx;
    }
    let slope_ms = covariance / variance;
    if slope_ms <= 0.0 {
        return estimate_bpm;
    }

    let grid_bpm = 60_000.0 / slope_ms;
    if ((grid_bpm - estimate_bpm) / estimate_bpm).abs() <= GRID_TEMPO_TOLERANCE {
        grid_bpm
    } else {
        estimate_bpm
    }
}

/// PulseDetector - loose peak picking for non-beat-driven material
#[derive(Debug, Clone)]
pub struct PulseDetector {
    config: PulseConfig,
}

impl PulseDetector {
    pub fn new(config: PulseConfig) -> Self {
        Self { config }
    }

    /// Pulse anchors in ms. Never empty unless the envelope is silent: when
    /// no peak passes the picker the strongest frame is returned.
    pub fn detect(&self, envelope: &OnsetEnvelope) -> Vec<f64> {
        if envelope.is_silent() {
            return Vec::new();
        }

        let normalized = envelope.normalized();
        let window = envelope.ms_to_frames(self.config.window_ms).max(1);
        let wait = envelope.ms_to_frames(self.config.wait_ms);
        let mut frames = PeakPicker::symmetric(window, self.config.delta, wait).pick(&normalized);

        if frames.is_empty() {
            let strongest = normalized
                .iter()
                .enumerate()
                .fold((0usize, f32::NEG_INFINITY), |best, (i, &v)| {
                    if v > best.1 {
                        (i, v)
                    } else {
                        best
                    }
                })
                .0;
            frames.push(strongest);
        }

        frames.into_iter().map(|f| envelope.frame_to_ms(f)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 22_050;
    const HOP: usize = 512;

    /// Envelope with a unit spike every `period` frames (fractional periods
    /// rounded per beat), starting at `offset`
    fn spike_envelope(len: usize, period: f32, offset: usize) -> OnsetEnvelope {
        let mut values = vec![0.0f32; len];
        let mut k = 0;
        loop {
            let pos = offset + (k as f32 * period).round() as usize;
            if pos >= len {
                break;
            }
            values[pos] = 1.0;
            if pos + 1 < len {
                values[pos + 1] = 0.3;
            }
            k += 1;
        }
        OnsetEnvelope::from_values(values, HOP, SAMPLE_RATE)
    }

    fn bpm_period(bpm: f32) -> f32 {
        60.0 * SAMPLE_RATE as f32 / HOP as f32 / bpm
    }

    #[test]
    fn test_tempo_of_120_bpm_spikes() {
        let envelope = spike_envelope(862, bpm_period(120.0), 10);
        let tempo = BeatTracker::new(RhythmConfig::default())
            .estimate_tempo(&envelope)
            .unwrap();
        assert!((tempo - 120.0).abs() < 3.0, "expected ~120 BPM, got {}", tempo);
    }

    #[test]
    fn test_tempo_of_90_bpm_spikes() {
        let envelope = spike_envelope(862, bpm_period(90.0), 5);
        let tempo = BeatTracker::new(RhythmConfig::default())
            .estimate_tempo(&envelope)
            .unwrap();
        assert!((tempo - 90.0).abs() < 3.0, "expected ~90 BPM, got {}", tempo);
    }

    #[test]
    fn test_track_follows_spikes() {
        let period = bpm_period(120.0);
        let envelope = spike_envelope(862, period, 10);
        let info = BeatTracker::new(RhythmConfig::default()).track(&envelope);

        assert!(
            (info.beat_count as i64 - 40).abs() <= 1,
            "expected ~40 beats, got {}",
            info.beat_count
        );
        assert!(
            (info.average_beat_interval_ms - 500.0).abs() < 5.0,
            "mean interval {}",
            info.average_beat_interval_ms
        );
        assert!((info.tempo_bpm - 120.0).abs() < 2.0, "tempo {}", info.tempo_bpm);
        assert!(info.beat_times_ms.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_silence_returns_sentinel() {
        let envelope = OnsetEnvelope::from_values(vec![0.0; 500], HOP, SAMPLE_RATE);
        let config = RhythmConfig {
            silent_tempo_bpm: 0.0,
            ..RhythmConfig::default()
        };
        let info = BeatTracker::new(config).track(&envelope);
        assert_eq!(info.beat_count, 0);
        assert_eq!(info.tempo_bpm, 0.0);
        assert_eq!(info.average_beat_interval_ms, 0.0);
    }

    #[test]
    fn test_configured_sentinel_is_reported() {
        let envelope = OnsetEnvelope::from_values(vec![0.0; 500], HOP, SAMPLE_RATE);
        let config = RhythmConfig {
            silent_tempo_bpm: 100.0,
            ..RhythmConfig::default()
        };
        assert_eq!(BeatTracker::new(config).track(&envelope).tempo_bpm, 100.0);
    }

    #[test]
    fn test_last_beat_and_trim() {
        let cumulative = [0.0, 1.0, 0.5, 2.0, 1.0, 3.0, 0.1];
        assert_eq!(last_beat(&cumulative), Some(5));

        let local = [0.05, 1.0, 1.0, 1.0, 0.05];
        let mut beats = vec![0, 1, 2, 3, 4];
        trim_beats(&local, &mut beats);
        assert_eq!(beats, vec![1, 2, 3]);
    }

    #[test]
    fn test_grid_tempo_rejects_disagreeing_grid() {
        let steady: Vec<f64> = (0..8).map(|k| k as f64 * 500.0).collect();
        assert!((grid_tempo(&steady, 119.0) - 120.0).abs() < 1e-6);
        assert_eq!(grid_tempo(&steady, 60.0), 60.0);
        assert_eq!(grid_tempo(&steady[..3], 119.0), 119.0);
    }

    #[test]
    fn test_pulse_finds_sparse_events() {
        let mut values = vec![0.0f32; 400];
        values[100] = 1.0;
        values[300] = 0.8;
        let envelope = OnsetEnvelope::from_values(values, HOP, SAMPLE_RATE);
        let pulses = PulseDetector::new(PulseConfig::default()).detect(&envelope);
        assert_eq!(pulses.len(), 2, "{:?}", pulses);
        assert!((pulses[0] - envelope.frame_to_ms(100)).abs() < 1e-9);
    }

    #[test]
    fn test_pulse_falls_back_to_strongest_frame() {
        // A smooth ramp has no local peak that beats its neighbourhood mean
        let values: Vec<f32> = (0..200).map(|i| i as f32 / 199.0).collect();
        let envelope = OnsetEnvelope::from_values(values, HOP, SAMPLE_RATE);
        let config = PulseConfig {
            delta: 0.5,
            ..PulseConfig::default()
        };
        let pulses = PulseDetector::new(config).detect(&envelope);
        assert_eq!(pulses, vec![envelope.frame_to_ms(199)]);
    }

    #[test]
    fn test_pulse_empty_on_silence() {
        let envelope = OnsetEnvelope::from_values(vec![0.0; 100], HOP, SAMPLE_RATE);
        assert!(PulseDetector::new(PulseConfig::default())
            .detect(&envelope)
            .is_empty());
    }
}
