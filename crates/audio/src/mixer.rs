//! Audio mixer: N input tracks, one output track.
//!
//! Each input is converted to the session format on arrival and buffered.
//! A single input bypasses the summing node; two inputs are gained, summed,
//! and soft-clipped. Output is cut into fixed-size planar frames whose
//! timestamps come from the cumulative sample offset.

use std::collections::VecDeque;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use mosaic_common::clock::samples_to_duration;
use mosaic_common::config::RecordingDefaults;
use mosaic_media_model::{AudioBlock, AudioFormat, AudioMix, AudioSourceKind, AudioTrack, RawAudioFrame};

use crate::convert::{apply_gain, convert_channels, deinterleave, soft_clip, Resampler};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixerConfig {
    /// Session output format every input is converted to.
    pub format: AudioFormat,
    /// Samples per channel in each emitted frame.
    pub frame_size: usize,
    /// Gains apply in the summing node only; a lone source passes through
    /// at unity gain.
    pub mic_gain: f32,
    pub system_gain: f32,
    /// Once one input has buffered this many frames, missing input from the
    /// other side is padded with silence instead of waited for.
    pub max_lag_frames: usize,
}

impl MixerConfig {
    pub fn from_defaults(defaults: &RecordingDefaults) -> Self {
        let frame_size = defaults.audio_frame_size.max(1);
        Self {
            format: AudioFormat::new(defaults.audio_sample_rate, defaults.audio_channels.max(1)),
            frame_size,
            mic_gain: defaults.mic_gain,
            system_gain: defaults.system_gain,
            max_lag_frames: frame_size * 4,
        }
    }

    fn gain_for(&self, kind: AudioSourceKind) -> f32 {
        match kind {
            AudioSourceKind::Microphone => self.mic_gain,
            AudioSourceKind::System => self.system_gain,
        }
    }
}

struct Input {
    kind: AudioSourceKind,
    gain: f32,
    resampler: Option<Resampler>,
    /// Interleaved samples in the session format.
    buffer: VecDeque<f32>,
}

pub struct AudioMixer {
    config: MixerConfig,
    inputs: Vec<Input>,
    sample_offset: u64,
}

impl AudioMixer {
    pub fn new(config: MixerConfig, kinds: &[AudioSourceKind]) -> Self {
        let mut inputs: Vec<Input> = Vec::new();
        for &kind in kinds {
            if inputs.iter().all(|i| i.kind != kind) {
                inputs.push(Input {
                    kind,
                    gain: config.gain_for(kind),
                    resampler: None,
                    buffer: VecDeque::new(),
                });
            }
        }
        Self {
            config,
            inputs,
            sample_offset: 0,
        }
    }

    /// The track this mixer produces.
    pub fn track(&self) -> AudioTrack {
        let kinds: Vec<_> = self.inputs.iter().map(|i| i.kind).collect();
        AudioTrack {
            source_mix: AudioMix::from_sources(&kinds),
            sample_rate: self.config.format.sample_rate,
            channel_count: self.config.format.channels,
        }
    }

    /// A single input is forwarded without passing through the summing node.
    pub fn is_passthrough(&self) -> bool {
        self.inputs.len() == 1
    }

    /// Samples per channel emitted so far.
    pub fn sample_offset(&self) -> u64 {
        self.sample_offset
    }

    /// Buffer a capture block and return every frame that became ready.
    pub fn push(&mut self, block: AudioBlock) -> Vec<RawAudioFrame> {
        let target = self.config.format;
        let Some(input) = self.inputs.iter_mut().find(|i| i.kind == block.source) else {
            tracing::debug!(source = ?block.source, "Dropping block from a source that is not mixed");
            return Vec::new();
        };

        let converted = convert_channels(&block.samples, block.format.channels, target.channels);
        if input.resampler.as_ref().map(Resampler::from_rate) != Some(block.format.sample_rate) {
            input.resampler = Some(Resampler::new(
                block.format.sample_rate,
                target.sample_rate,
                target.channels,
            ));
        }
        let converted = match &mut input.resampler {
            Some(resampler) => resampler.process(&converted),
            None => converted,
        };
        input.buffer.extend(converted);

        let mut frames = Vec::new();
        while self.frame_ready() {
            frames.push(self.take_frame(self.config.frame_size));
        }
        frames
    }

    /// Emit whatever is still buffered as a final, shorter frame.
    pub fn flush(&mut self) -> Option<RawAudioFrame> {
        let remaining = self
            .inputs
            .iter()
            .map(|i| self.buffered_frames(i))
            .max()
            .unwrap_or(0);
        if remaining == 0 {
            return None;
        }
        Some(self.take_frame(remaining))
    }

    fn buffered_frames(&self, input: &Input) -> usize {
        input.buffer.len() / usize::from(self.config.format.channels)
    }

    fn frame_ready(&self) -> bool {
        let frame_size = self.config.frame_size;
        let buffered: Vec<usize> = self.inputs.iter().map(|i| self.buffered_frames(i)).collect();
        match buffered.as_slice() {
            [] => false,
            [only] => *only >= frame_size,
            many => {
                let all_ready = many.iter().all(|&n| n >= frame_size);
                let lagging = many.iter().any(|&n| n >= self.config.max_lag_frames);
                if !all_ready && lagging {
                    tracing::trace!(?buffered, "Input lagging, padding with silence");
                }
                all_ready || lagging
            }
        }
    }

    fn take_frame(&mut self, frames: usize) -> RawAudioFrame {
        let channels = self.config.format.channels;
        let wanted = frames * usize::from(channels);

        let interleaved: Vec<f32> = if let [input] = self.inputs.as_mut_slice() {
            let available = input.buffer.len().min(wanted);
            let mut samples: Vec<f32> = input.buffer.drain(..available).collect();
            samples.resize(wanted, 0.0);
            samples
        } else {
            let mut mixed = vec![0.0f32; wanted];
            for input in &mut self.inputs {
                let available = input.buffer.len().min(wanted);
                let mut samples: Vec<f32> = input.buffer.drain(..available).collect();
                apply_gain(&mut samples, input.gain);
                for (out, sample) in mixed.iter_mut().zip(samples) {
                    *out += sample;
                }
            }
            for sample in &mut mixed {
                *sample = soft_clip(*sample);
            }
            mixed
        };

        let frame = RawAudioFrame {
            sample_rate: self.config.format.sample_rate,
            planes: deinterleave(&interleaved, channels),
            sample_offset: self.sample_offset,
            timestamp: samples_to_duration(self.sample_offset, self.config.format.sample_rate),
        };
        self.sample_offset += frames as u64;
        frame
    }
}

/// Totals reported when the mixer task ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MixerStats {
    pub frames: u64,
    pub samples_per_channel: u64,
}

pub type MixerHandle = JoinHandle<MixerStats>;

/// Run the mixer until every capture sender is dropped, then flush.
pub fn spawn_mixer(
    mut mixer: AudioMixer,
    mut blocks: mpsc::Receiver<AudioBlock>,
    frames: mpsc::Sender<RawAudioFrame>,
) -> MixerHandle {
    tokio::spawn(async move {
        let mut stats = MixerStats::default();
        while let Some(block) = blocks.recv().await {
            for frame in mixer.push(block) {
                stats.frames += 1;
                if frames.send(frame).await.is_err() {
                    tracing::debug!("Audio encoder gone, mixer exiting");
                    stats.samples_per_channel = mixer.sample_offset();
                    return stats;
                }
            }
        }

        if let Some(last) = mixer.flush() {
            stats.frames += 1;
            let _ = frames.send(last).await;
        }
        stats.samples_per_channel = mixer.sample_offset();
        tracing::debug!(frames = stats.frames, samples = stats.samples_per_channel, "Mixer finished");
        stats
    })
}
