//! WAV decoding to normalized mono at the corpus sample rate.

use crate::error::{CorpusError, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Decoded mono audio with samples in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Whether `start..end` seconds lies entirely within the recording.
    pub fn covers(&self, start: f64, end: f64) -> bool {
        let rate = self.sample_rate as f64;
        start >= 0.0 && start < end && (end * rate).round() as usize <= self.samples.len()
    }

    /// Samples between `start` and `end` seconds, clamped to the recording.
    pub fn slice_seconds(&self, start: f64, end: f64) -> &[f32] {
        let rate = self.sample_rate as f64;
        let to_index = |t: f64| ((t.max(0.0) * rate).round() as usize).min(self.samples.len());
        let from = to_index(start);
        let to = to_index(end).max(from);
        &self.samples[from..to]
    }
}

/// Decode WAV data, downmix to mono and resample to `target_rate`.
///
/// Integer formats of any bit depth and 32-bit float are accepted.
pub fn decode_wav<R: Read>(reader: R, target_rate: u32) -> Result<Waveform> {
    let mut wav_reader = hound::WavReader::new(reader).map_err(|e| CorpusError::AudioDecode {
        message: format!("Failed to parse WAV file: {}", e),
    })?;

    let spec = wav_reader.spec();
    if spec.channels == 0 {
        return Err(CorpusError::AudioDecode {
            message: "WAV file declares zero channels".to_string(),
        });
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => wav_reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>(),
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            wav_reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()
        }
    }
    .map_err(|e| CorpusError::AudioDecode {
        message: format!("Failed to read WAV samples: {}", e),
    })?;

    let mono = downmix(&interleaved, spec.channels as usize);
    let samples = resample(&mono, spec.sample_rate, target_rate);

    tracing::trace!(
        "Decoded {} frames at {} Hz ({} ch) into {} samples at {} Hz",
        mono.len(),
        spec.sample_rate,
        spec.channels,
        samples.len(),
        target_rate
    );

    Ok(Waveform::new(samples, target_rate))
}

/// Decode a WAV file from disk.
pub fn read_wav_file(path: &Path, target_rate: u32) -> Result<Waveform> {
    let file = File::open(path)?;
    decode_wav(BufReader::new(file), target_rate).map_err(|e| match e {
        CorpusError::AudioDecode { message } => CorpusError::AudioDecode {
            message: format!("{}: {}", path.display(), message),
        },
        other => other,
    })
}

fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Simple linear interpolation resampling.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = (source_pos.floor() as usize).min(samples.len() - 1);
            let fraction = (source_pos - source_idx as f64) as f32;

            if source_idx + 1 >= samples.len() {
                samples[source_idx]
            } else {
                let left = samples[source_idx];
                let right = samples[source_idx + 1];
                left + (right - left) * fraction
            }
        })
        .collect()
}
