/// Converts audio delivered by an input (any rate, any channel count) into
/// the encoder's PCM layout.
///
/// Channel adaptation happens before resampling: multi-channel input is
/// averaged down to mono, mono is duplicated up to stereo.
#[derive(Debug, Clone, Copy)]
pub struct PcmConverter {
    pub target_sample_rate: f64,
    pub target_channels: u16,
}

impl PcmConverter {
    pub fn new(target_sample_rate: f64, target_channels: u16) -> Self {
        Self {
            target_sample_rate,
            target_channels,
        }
    }

    /// Interleaved input at `sample_rate` with `channels` → interleaved output
    /// at the target rate and channel count.
    pub fn convert(&self, samples: &[f32], sample_rate: f64, channels: u16) -> Vec<f32> {
        let adapted = remap_channels(samples, channels.max(1), self.target_channels);
        self.resample(&adapted, sample_rate)
    }

    /// Linear interpolation resampling of interleaved audio in the target layout.
    pub fn resample(&self, samples: &[f32], source_sample_rate: f64) -> Vec<f32> {
        if (source_sample_rate - self.target_sample_rate).abs() < 0.01 || samples.is_empty() {
            return samples.to_vec();
        }

        let channels = self.target_channels.max(1) as usize;
        let frame_count = samples.len() / channels;
        let ratio = self.target_sample_rate / source_sample_rate;
        let output_frames = (frame_count as f64 * ratio) as usize;

        let mut output = vec![0.0f32; output_frames * channels];
        for i in 0..output_frames {
            let source_index = i as f64 / ratio;
            let index = source_index as usize;
            let fraction = (source_index - index as f64) as f32;

            for ch in 0..channels {
                output[i * channels + ch] = if index + 1 < frame_count {
                    samples[index * channels + ch] * (1.0 - fraction)
                        + samples[(index + 1) * channels + ch] * fraction
                } else {
                    samples[index.min(frame_count - 1) * channels + ch]
                };
            }
        }
        output
    }
}

fn remap_channels(samples: &[f32], from: u16, to: u16) -> Vec<f32> {
    if from == to {
        return samples.to_vec();
    }
    let from = from as usize;
    let to = to as usize;
    let mono: Vec<f32> = samples
        .chunks_exact(from)
        .map(|frame| frame.iter().sum::<f32>() / from as f32)
        .collect();
    if to == 1 {
        mono
    } else {
        mono.iter().flat_map(|&s| std::iter::repeat(s).take(to)).collect()
    }
}

/// Convert f32 samples `[-1.0, 1.0]` to little-endian signed 16-bit PCM.
///
/// Clamps out-of-range values. Output length = `samples.len() * 2` bytes.
pub fn to_int16_le(samples: &[f32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        data.extend_from_slice(&value.to_le_bytes());
    }
    data
}

/// Inverse of [`to_int16_le`]. A trailing odd byte is ignored.
pub fn from_int16_le(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / i16::MAX as f32)
        .collect()
}

/// RMS level of normalized samples.
pub fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}
