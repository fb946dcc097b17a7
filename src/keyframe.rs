//! Keyframe generation from analysis events.
//!
//! Turns beat, onset and energy events into timeline keyframes for a video
//! editor's animation curves. Every generator returns keyframes with strictly
//! increasing `time_offset_ms`, relative to the configured segment start.
//!
//! Minimum spacing policy:
//! - beats closer than `2 * min_spacing_ms` to the previously kept beat are
//!   dropped, so each kept beat has room for its pulse-up/pulse-down pair
//! - onsets (and energy markers) closer than `min_spacing_ms` to the previous
//!   keyframe are merged into it

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::analysis::{EnergyInfo, OnsetInfo};
use crate::config::KeyframeConfig;
use crate::error::AnalysisError;

/// Animatable clip properties understood by the editing layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyframeProperty {
    PositionX,
    PositionY,
    Rotation,
    ScaleX,
    ScaleY,
    UniformScale,
    Alpha,
    Saturation,
    Contrast,
    Brightness,
}

impl KeyframeProperty {
    pub const ALL: [KeyframeProperty; 10] = [
        KeyframeProperty::PositionX,
        KeyframeProperty::PositionY,
        KeyframeProperty::Rotation,
        KeyframeProperty::ScaleX,
        KeyframeProperty::ScaleY,
        KeyframeProperty::UniformScale,
        KeyframeProperty::Alpha,
        KeyframeProperty::Saturation,
        KeyframeProperty::Contrast,
        KeyframeProperty::Brightness,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyframeProperty::PositionX => "position_x",
            KeyframeProperty::PositionY => "position_y",
            KeyframeProperty::Rotation => "rotation",
            KeyframeProperty::ScaleX => "scale_x",
            KeyframeProperty::ScaleY => "scale_y",
            KeyframeProperty::UniformScale => "uniform_scale",
            KeyframeProperty::Alpha => "alpha",
            KeyframeProperty::Saturation => "saturation",
            KeyframeProperty::Contrast => "contrast",
            KeyframeProperty::Brightness => "brightness",
        }
    }
}

impl fmt::Display for KeyframeProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyframeProperty {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|property| property.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = Self::ALL.iter().map(|p| p.as_str()).collect();
                AnalysisError::invalid(
                    "property",
                    format!("unknown keyframe property '{}', expected one of: {}", s, valid.join(", ")),
                )
            })
    }
}

/// One timeline keyframe: either a property value or a volume level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Keyframe {
    Property {
        time_offset_ms: u64,
        property: KeyframeProperty,
        value: f64,
    },
    Volume {
        time_offset_ms: u64,
        volume: f64,
    },
}

impl Keyframe {
    pub fn time_offset_ms(&self) -> u64 {
        match self {
            Keyframe::Property { time_offset_ms, .. } | Keyframe::Volume { time_offset_ms, .. } => {
                *time_offset_ms
            }
        }
    }

    fn merge_value(&mut self, other: f64) {
        match self {
            Keyframe::Property { value, .. } => *value = value.max(other),
            Keyframe::Volume { volume, .. } => *volume = volume.max(other),
        }
    }
}

/// Maps analysis events onto keyframes
#[derive(Debug, Clone)]
pub struct KeyframeGenerator {
    config: KeyframeConfig,
}

impl KeyframeGenerator {
    pub fn new(config: KeyframeConfig) -> Self {
        Self { config }
    }

    /// Event time relative to the segment start, `None` before the segment.
    fn relative_ms(&self, time_ms: f64) -> Option<u64> {
        let relative = time_ms - self.config.segment_start_ms;
        (relative.is_finite() && relative >= 0.0).then(|| relative.round() as u64)
    }

    /// Pulse animation: `zoom_scale` on each beat, back to `base_scale`
    /// `pulse_duration_ms` later (or halfway to the next beat if sooner).
    pub fn from_beats(
        &self,
        beats_ms: &[f64],
        base_scale: f64,
        zoom_scale: f64,
        property: KeyframeProperty,
    ) -> Vec<Keyframe> {
        let min_gap = 2 * self.config.min_spacing_ms.max(1);
        let mut kept: Vec<u64> = Vec::with_capacity(beats_ms.len());
        for &beat in beats_ms {
            let Some(time) = self.relative_ms(beat) else {
                continue;
            };
            match kept.last() {
                Some(&last) if time < last + min_gap => continue,
                _ => kept.push(time),
            }
        }

        let pulse = self.config.pulse_duration_ms.max(1);
        let mut keyframes = Vec::with_capacity(kept.len() * 2);
        for (i, &time) in kept.iter().enumerate() {
            let hold = match kept.get(i + 1) {
                Some(&next) => pulse.min((next - time) / 2),
                None => pulse,
            };
            keyframes.push(Keyframe::Property {
                time_offset_ms: time,
                property,
                value: zoom_scale,
            });
            keyframes.push(Keyframe::Property {
                time_offset_ms: time + hold,
                property,
                value: base_scale,
            });
        }
        keyframes
    }

    /// One keyframe per onset, value scaled linearly by onset strength.
    pub fn from_onsets(
        &self,
        onsets: &OnsetInfo,
        min_scale: f64,
        max_scale: f64,
        property: KeyframeProperty,
    ) -> Vec<Keyframe> {
        let events = onsets.iter().map(|(time, strength)| {
            let strength = (strength as f64).clamp(0.0, 1.0);
            (time, min_scale + strength * (max_scale - min_scale))
        });
        self.coalesce(events, |time_offset_ms, value| Keyframe::Property {
            time_offset_ms,
            property,
            value,
        })
    }

    /// Volume keyframes: `drop_volume` at each drop, `break_volume` at each break.
    pub fn volume_from_energy(
        &self,
        energy: &EnergyInfo,
        drop_volume: f64,
        break_volume: f64,
    ) -> Vec<Keyframe> {
        let mut events: Vec<(f64, f64)> = energy
            .drop_times_ms
            .iter()
            .map(|&t| (t, drop_volume))
            .chain(energy.break_times_ms.iter().map(|&t| (t, break_volume)))
            .collect();
        events.sort_by(|a, b| a.0.total_cmp(&b.0));

        self.coalesce(events, |time_offset_ms, volume| Keyframe::Volume {
            time_offset_ms,
            volume,
        })
    }

    /// Emit one keyframe per event, merging events that land within the
    /// minimum spacing of the previous keyframe (larger value wins).
    fn coalesce(
        &self,
        events: impl IntoIterator<Item = (f64, f64)>,
        make: impl Fn(u64, f64) -> Keyframe,
    ) -> Vec<Keyframe> {
        let spacing = self.config.min_spacing_ms.max(1);
        let mut keyframes: Vec<Keyframe> = Vec::new();

        for (time_ms, value) in events {
            let Some(time) = self.relative_ms(time_ms) else {
                continue;
            };
            match keyframes.last_mut() {
                Some(last) if time < last.time_offset_ms() + spacing => last.merge_value(value),
                _ => keyframes.push(make(time, value)),
            }
        }
        keyframes
    }
}
