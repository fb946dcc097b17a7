// Resample module - band-limited sample-rate conversion
//
// Uses rubato's sinc interpolator over the whole buffer in one pass, flushes
// the filter tail and removes the filter delay so the output lines up with
// the input in time and has exactly round(frames * target / source) frames.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

use super::Waveform;
use crate::error::AnalysisError;

/// Sinc filter length in taps
const SINC_LEN: usize = 256;

/// Convert `waveform` to `target_rate`, preserving the channel layout.
///
/// Pure function: the input is left untouched. `target_rate` must be > 0.
pub fn resample(waveform: &Waveform, target_rate: u32) -> Result<Waveform, AnalysisError> {
    if target_rate == 0 {
        return Err(AnalysisError::invalid("target_rate", "must be > 0"));
    }

    let source_rate = waveform.sample_rate();
    if source_rate == target_rate {
        return Ok(waveform.clone());
    }

    let channels = waveform.channels();
    let num_frames = waveform.frames();
    let ratio = target_rate as f64 / source_rate as f64;
    let expected_frames = (num_frames as f64 * ratio).round() as usize;

    if num_frames == 0 {
        return Waveform::new(Vec::new(), channels, target_rate);
    }

    // De-interleave into one buffer per channel
    let mut planar: Vec<Vec<f32>> = vec![Vec::with_capacity(num_frames); channels];
    for frame in waveform.samples().chunks_exact(channels) {
        for (channel, &sample) in planar.iter_mut().zip(frame) {
            channel.push(sample);
        }
    }

    let params = SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, num_frames, channels)
        .map_err(|err| AnalysisError::invalid("target_rate", err.to_string()))?;

    let mut output = resampler
        .process(&planar, None)
        .map_err(|err| AnalysisError::invalid("target_rate", err.to_string()))?;

    // Flush the samples still held in the filter
    let tail = resampler
        .process_partial::<Vec<f32>>(None, None)
        .map_err(|err| AnalysisError::invalid("target_rate", err.to_string()))?;
    for (channel, rest) in output.iter_mut().zip(tail) {
        channel.extend(rest);
    }

    let delay = resampler.output_delay();
    let mut interleaved = Vec::with_capacity(expected_frames * channels);
    for i in 0..expected_frames {
        for channel in &output {
            interleaved.push(channel.get(i + delay).copied().unwrap_or(0.0));
        }
    }

    debug!(
        "Resampled {} frames ({} Hz) -> {} frames ({} Hz)",
        num_frames, source_rate, expected_frames, target_rate
    );

    Waveform::new(interleaved, channels, target_rate)
}
