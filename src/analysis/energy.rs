// Energy - RMS loudness statistics and drop/break markers
//
// The RMS curve is min-max normalized to [0, 1]. A drop is marked at the
// first frame of every run above the drop threshold, a break at the first
// frame of every run below the break threshold. A flat curve (including
// silence) has no dynamics and produces neither.

use tracing::debug;

use super::features::{frame_to_ms, TemporalFeatures};
use super::types::EnergyInfo;

/// RMS range below which the curve is treated as flat
const FLAT_RANGE: f32 = 1e-8;

/// Frame geometry and thresholds for one energy pass
#[derive(Debug, Clone, Copy)]
pub struct EnergyAnalyzer {
    pub frame_length: usize,
    pub hop_length: usize,
    pub drop_threshold: f32,
    pub break_threshold: f32,
}

impl EnergyAnalyzer {
    pub fn analyze(&self, samples: &[f32], sample_rate: u32) -> EnergyInfo {
        let rms = TemporalFeatures::new(self.frame_length, self.hop_length).compute_rms(samples);

        let peak_rms = rms.iter().copied().fold(0.0f32, f32::max);
        let average_rms = if rms.is_empty() {
            0.0
        } else {
            let total: f64 = rms.iter().map(|&v| v as f64).sum();
            ((total / rms.len() as f64) as f32).min(peak_rms)
        };

        let min_rms = rms.iter().copied().fold(f32::INFINITY, f32::min);
        let range = peak_rms - min_rms;

        let (drop_times_ms, break_times_ms) = if rms.is_empty() || range <= FLAT_RANGE {
            (Vec::new(), Vec::new())
        } else {
            let normalized: Vec<f32> = rms.iter().map(|&v| (v - min_rms) / range).collect();
            let to_ms = |frame: usize| frame_to_ms(frame, self.hop_length, sample_rate);

            let drops = run_starts(&normalized, |v| v > self.drop_threshold)
                .into_iter()
                .map(to_ms)
                .collect();
            let breaks = run_starts(&normalized, |v| v < self.break_threshold)
                .into_iter()
                .map(to_ms)
                .collect();
            (drops, breaks)
        };

        debug!(
            "Energy: avg RMS {:.4}, peak RMS {:.4}, {} drop(s), {} break(s)",
            average_rms,
            peak_rms,
            drop_times_ms.len(),
            break_times_ms.len()
        );

        EnergyInfo {
            average_rms,
            peak_rms,
            drop_times_ms,
            break_times_ms,
        }
    }
}

/// Index of the first element of every maximal run satisfying `predicate`.
fn run_starts(values: &[f32], predicate: impl Fn(f32) -> bool) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut in_run = false;
    for (i, &value) in values.iter().enumerate() {
        let hit = predicate(value);
        if hit && !in_run {
            starts.push(i);
        }
        in_run = hit;
    }
    starts
}
