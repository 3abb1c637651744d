//! Audio capture blocks, mixed frames, and the session audio track.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Physical origin of a captured audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioSourceKind {
    Microphone,
    System,
}

/// Which sources feed the session audio track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioMix {
    #[default]
    None,
    Mic,
    System,
    Both,
}

impl AudioMix {
    /// The mix requested by the capture flags.
    pub fn from_flags(capture_mic: bool, capture_system: bool) -> Self {
        match (capture_mic, capture_system) {
            (false, false) => AudioMix::None,
            (true, false) => AudioMix::Mic,
            (false, true) => AudioMix::System,
            (true, true) => AudioMix::Both,
        }
    }

    /// The mix actually produced by the sources that were acquired.
    pub fn from_sources(kinds: &[AudioSourceKind]) -> Self {
        Self::from_flags(
            kinds.contains(&AudioSourceKind::Microphone),
            kinds.contains(&AudioSourceKind::System),
        )
    }

    /// Sources this mix asks for, microphone first.
    pub fn requested(&self) -> Vec<AudioSourceKind> {
        match self {
            AudioMix::None => vec![],
            AudioMix::Mic => vec![AudioSourceKind::Microphone],
            AudioMix::System => vec![AudioSourceKind::System],
            AudioMix::Both => vec![AudioSourceKind::Microphone, AudioSourceKind::System],
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, AudioMix::None)
    }
}

/// Sample rate and channel layout of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }
}

/// The session's single audio track. Fixed for the session's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioTrack {
    pub source_mix: AudioMix,
    pub sample_rate: u32,
    pub channel_count: u16,
}

impl AudioTrack {
    pub fn format(&self) -> AudioFormat {
        AudioFormat::new(self.sample_rate, self.channel_count)
    }
}

/// Interleaved `f32` samples delivered by one capture device.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    pub source: AudioSourceKind,
    pub format: AudioFormat,
    pub samples: Vec<f32>,
}

impl AudioBlock {
    /// Samples per channel in this block.
    pub fn frames(&self) -> usize {
        let channels = usize::from(self.format.channels.max(1));
        self.samples.len() / channels
    }
}

/// A fixed-size block of mixed, planar samples ready for the audio encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAudioFrame {
    pub sample_rate: u32,
    /// One plane per channel, all of equal length.
    pub planes: Vec<Vec<f32>>,
    /// Cumulative samples per channel emitted before this frame.
    pub sample_offset: u64,
    /// `sample_offset / sample_rate`.
    pub timestamp: Duration,
}

impl RawAudioFrame {
    pub fn channels(&self) -> u16 {
        self.planes.len() as u16
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.planes.first().map_or(0, Vec::len)
    }

    pub fn duration(&self) -> Duration {
        mosaic_common::clock::samples_to_duration(self.frames() as u64, self.sample_rate)
    }

    /// Interleave the planes (`L R L R …`).
    pub fn interleaved(&self) -> Vec<f32> {
        let frames = self.frames();
        let mut out = Vec::with_capacity(frames * self.planes.len());
        for i in 0..frames {
            for plane in &self.planes {
                out.push(plane.get(i).copied().unwrap_or(0.0));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mix_from_flags_and_sources() {
        assert_eq!(AudioMix::from_flags(true, true), AudioMix::Both);
        assert_eq!(AudioMix::from_flags(false, false), AudioMix::None);
        assert_eq!(
            AudioMix::from_sources(&[AudioSourceKind::System]),
            AudioMix::System
        );
        assert_eq!(
            AudioMix::Both.requested(),
            vec![AudioSourceKind::Microphone, AudioSourceKind::System]
        );
    }

    #[test]
    fn raw_frame_interleaves_planes() {
        let frame = RawAudioFrame {
            sample_rate: 48000,
            planes: vec![vec![1.0, 2.0], vec![-1.0, -2.0]],
            sample_offset: 0,
            timestamp: Duration::ZERO,
        };
        assert_eq!(frame.channels(), 2);
        assert_eq!(frame.frames(), 2);
        assert_eq!(frame.interleaved(), vec![1.0, -1.0, 2.0, -2.0]);
    }

    #[test]
    fn block_frames_count_per_channel() {
        let block = AudioBlock {
            source: AudioSourceKind::Microphone,
            format: AudioFormat::new(44100, 2),
            samples: vec![0.0; 10],
        };
        assert_eq!(block.frames(), 5);
    }
}
