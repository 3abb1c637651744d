//! Sample format conversion.
//!
//! All functions operate on interleaved `f32` samples.

/// Convert between channel counts.
///
/// Mono is duplicated into stereo, stereo is averaged into mono; any other
/// pair keeps the leading channels and fills extra ones from the first.
pub fn convert_channels(samples: &[f32], from: u16, to: u16) -> Vec<f32> {
    if from == to || from == 0 || to == 0 {
        return samples.to_vec();
    }
    let from = usize::from(from);
    let to = usize::from(to);
    let frames = samples.len() / from;
    let mut out = Vec::with_capacity(frames * to);

    for frame in samples.chunks_exact(from) {
        match (from, to) {
            (1, 2) => {
                out.push(frame[0]);
                out.push(frame[0]);
            }
            (2, 1) => out.push((frame[0] + frame[1]) / 2.0),
            _ => {
                for ch in 0..to {
                    out.push(frame.get(ch).copied().unwrap_or(frame[0]));
                }
            }
        }
    }
    out
}

/// Streaming linear-interpolation resampler.
///
/// Blocks are treated as one continuous signal: the read position and the
/// last input frame carry over, so no fraction of a frame is lost at block
/// boundaries. Output trails input by at most one frame.
#[derive(Debug, Clone)]
pub struct Resampler {
    from_rate: u32,
    to_rate: u32,
    channels: usize,
    /// Read position in input frames, relative to `history` when present.
    position: f64,
    history: Vec<f32>,
}

impl Resampler {
    pub fn new(from_rate: u32, to_rate: u32, channels: u16) -> Self {
        Self {
            from_rate,
            to_rate,
            channels: usize::from(channels.max(1)),
            position: 0.0,
            history: Vec::new(),
        }
    }

    pub fn from_rate(&self) -> u32 {
        self.from_rate
    }

    fn is_identity(&self) -> bool {
        self.from_rate == self.to_rate || self.from_rate == 0 || self.to_rate == 0
    }

    /// Resample one interleaved block.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        if self.is_identity() {
            return samples.to_vec();
        }
        let channels = self.channels;
        let mut input = Vec::with_capacity(self.history.len() + samples.len());
        input.extend_from_slice(&self.history);
        input.extend_from_slice(&samples[..samples.len() - samples.len() % channels]);

        let frames = input.len() / channels;
        if frames < 2 {
            self.history = input;
            return Vec::new();
        }

        let ratio = f64::from(self.from_rate) / f64::from(self.to_rate);
        let last = (frames - 1) as f64;
        let mut out = Vec::with_capacity(((last - self.position) / ratio).max(0.0) as usize * channels + channels);
        while self.position < last {
            let idx = self.position as usize;
            let frac = (self.position - idx as f64) as f32;
            for ch in 0..channels {
                let current = input[idx * channels + ch];
                let next = input[(idx + 1) * channels + ch];
                out.push(current + (next - current) * frac);
            }
            self.position += ratio;
        }

        self.position -= last;
        self.history = input[(frames - 1) * channels..].to_vec();
        out
    }
}

/// Gain applied in place. Unity gain leaves samples untouched.
pub fn apply_gain(samples: &mut [f32], gain: f32) {
    if (gain - 1.0).abs() < f32::EPSILON {
        return;
    }
    for sample in samples {
        *sample *= gain;
    }
}

/// Soft knee above ±0.5, asymptotic to ±1.0.
pub fn soft_clip(sample: f32) -> f32 {
    if sample.abs() <= 0.5 {
        sample
    } else if sample > 0.0 {
        0.5 + (1.0 - (-2.0 * (sample - 0.5)).exp()) / 2.0
    } else {
        -0.5 - (1.0 - (-2.0 * (-sample - 0.5)).exp()) / 2.0
    }
}

/// Split interleaved samples into one plane per channel.
pub fn deinterleave(samples: &[f32], channels: u16) -> Vec<Vec<f32>> {
    let channels = usize::from(channels.max(1));
    let frames = samples.len() / channels;
    let mut planes = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (plane, sample) in planes.iter_mut().zip(frame) {
            plane.push(*sample);
        }
    }
    planes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_clip_keeps_quiet_samples() {
        assert!((soft_clip(0.3) - 0.3).abs() < 1e-6);
        assert!((soft_clip(-0.5) + 0.5).abs() < 1e-6);
        assert!(soft_clip(2.0) < 1.0);
        assert!(soft_clip(-2.0) > -1.0);
        assert!(soft_clip(0.9) > soft_clip(0.7));
    }

    #[test]
    fn mono_stereo_conversion() {
        assert_eq!(convert_channels(&[0.5, 1.0], 1, 2), vec![0.5, 0.5, 1.0, 1.0]);
        let mono = convert_channels(&[0.5, 0.5, 1.0, 0.0], 2, 1);
        assert_eq!(mono, vec![0.5, 0.5]);
    }

    #[test]
    fn generic_conversion_fills_from_first_channel() {
        let out = convert_channels(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6], 3, 4);
        assert_eq!(out, vec![0.1, 0.2, 0.3, 0.1, 0.4, 0.5, 0.6, 0.4]);
    }

    #[test]
    fn resampling_interpolates_across_block_boundaries() {
        let mut up = Resampler::new(24000, 48000, 1);
        let mut out = up.process(&[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(out.len(), 6);
        out.extend(up.process(&[4.0, 5.0, 6.0, 7.0]));

        let expected: Vec<f32> = (0..14).map(|k| k as f32 * 0.5).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn resampling_keeps_the_fractional_remainder() {
        let mut resampler = Resampler::new(44100, 48000, 2);
        let block = vec![0.0; 1024 * 2];
        let produced: usize = (0..100).map(|_| resampler.process(&block).len() / 2).sum();

        // 102400 frames at 44.1 kHz are 111455.78 frames at 48 kHz.
        assert!((111_454..=111_456).contains(&produced), "produced {produced}");
    }

    #[test]
    fn equal_rates_pass_through() {
        let input: Vec<f32> = (0..480).map(|i| i as f32).collect();
        let mut resampler = Resampler::new(48000, 48000, 1);
        assert_eq!(resampler.process(&input), input);
    }

    #[test]
    fn deinterleave_splits_planes() {
        let planes = deinterleave(&[1.0, -1.0, 2.0, -2.0, 3.0, -3.0], 2);
        assert_eq!(planes, vec![vec![1.0, 2.0, 3.0], vec![-1.0, -2.0, -3.0]]);
    }

    #[test]
    fn unity_gain_is_identity() {
        let mut samples = vec![0.25, -0.25];
        apply_gain(&mut samples, 1.0);
        assert_eq!(samples, vec![0.25, -0.25]);
        apply_gain(&mut samples, 2.0);
        assert_eq!(samples, vec![0.5, -0.5]);
    }
}
