// Audio file loader
//
// Decodes any container/codec symphonia understands (WAV, MP3, FLAC, AAC/M4A,
// OGG/Vorbis) into interleaved f32, optionally downmixes to mono and
// resamples to the analysis rate. The file is decoded exactly once per
// analysis; every analyzer works on the returned `Waveform`.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, warn};

use super::Waveform;
use crate::error::AnalysisError;

/// Decoder + resampler front end for the analysis pipeline
#[derive(Debug, Clone)]
pub struct AudioLoader {
    /// Sample rate of every waveform this loader returns
    target_sample_rate: u32,
}

impl Default for AudioLoader {
    fn default() -> Self {
        Self {
            target_sample_rate: 22_050,
        }
    }
}

impl AudioLoader {
    /// Create a loader resampling to `target_sample_rate` (must be > 0).
    pub fn new(target_sample_rate: u32) -> Result<Self, AnalysisError> {
        if target_sample_rate == 0 {
            return Err(AnalysisError::invalid("sample_rate", "must be > 0"));
        }
        Ok(Self { target_sample_rate })
    }

    /// Decode `path` into a waveform at the target sample rate.
    ///
    /// # Arguments
    /// * `path` - Audio file (any format symphonia can probe)
    /// * `mono` - Average channels into one before resampling
    ///
    /// # Returns
    /// * `Ok(Waveform)` - Finite samples at `target_sample_rate`
    /// * `Err` - `FileNotFound`, `Io`, `UnsupportedFormat` or `Decode`
    pub fn load<P: AsRef<Path>>(&self, path: P, mono: bool) -> Result<Waveform, AnalysisError> {
        let path = path.as_ref();
        let native = decode_file(path)?;

        info!(
            "Loaded {}: {} Hz, {} channel(s), {:.2}s",
            path.display(),
            native.sample_rate(),
            native.channels(),
            native.duration_ms() / 1000.0
        );

        let waveform = if mono { native.to_mono() } else { native };

        if waveform.sample_rate() != self.target_sample_rate {
            debug!(
                "Resampling {} from {} Hz to {} Hz",
                path.display(),
                waveform.sample_rate(),
                self.target_sample_rate
            );
            waveform.resample(self.target_sample_rate)
        } else {
            Ok(waveform)
        }
    }
}

/// Decode the first audio track of `path` at its native rate.
pub fn decode_file(path: &Path) -> Result<Waveform, AnalysisError> {
    let path_str = path.display().to_string();

    let file = File::open(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            AnalysisError::FileNotFound {
                path: path_str.clone(),
            }
        } else {
            AnalysisError::Io {
                path: path_str.clone(),
                details: err.to_string(),
            }
        }
    })?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| AnalysisError::UnsupportedFormat {
            path: path_str.clone(),
            details: err.to_string(),
        })?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AnalysisError::UnsupportedFormat {
            path: path_str.clone(),
            details: "no audio tracks found".to_string(),
        })?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|err| AnalysisError::UnsupportedFormat {
            path: path_str.clone(),
            details: err.to_string(),
        })?;

    let mut sample_rate = codec_params.sample_rate;
    let mut channels = codec_params.channels.map(|c| c.count());
    let mut samples: Vec<f32> = Vec::new();
    let mut skipped_packets = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => {
                return Err(AnalysisError::Decode {
                    path: path_str,
                    details: err.to_string(),
                })
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(reason)) => {
                // Corrupt frame: drop it and keep going
                skipped_packets += 1;
                warn!("Skipping corrupt packet in {}: {}", path_str, reason);
                continue;
            }
            Err(err) => {
                return Err(AnalysisError::Decode {
                    path: path_str,
                    details: err.to_string(),
                })
            }
        };

        let spec = *decoded.spec();
        sample_rate.get_or_insert(spec.rate);
        channels.get_or_insert(spec.channels.count());

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    if skipped_packets > 0 {
        warn!("{}: skipped {} corrupt packet(s)", path_str, skipped_packets);
    }

    let sample_rate = sample_rate.ok_or_else(|| AnalysisError::Decode {
        path: path_str.clone(),
        details: "sample rate not specified in stream".to_string(),
    })?;
    let channels = channels.unwrap_or(1).max(1);

    if samples.is_empty() {
        return Err(AnalysisError::Decode {
            path: path_str,
            details: "stream contains no audio samples".to_string(),
        });
    }

    Waveform::new(samples, channels, sample_rate)
}
