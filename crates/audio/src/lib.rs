//! Mosaic Audio
//!
//! Acquires up to two capture devices (microphone, system loopback) and
//! turns them into one track of fixed-size planar frames.
//!
//! - [`source`]: the [`AudioSource`] seam, acquisition, synthetic tone source
//! - [`convert`]: channel conversion, resampling, gain, soft clipping
//! - [`mixer`]: per-input buffering, summing node, framing and timestamps

pub mod convert;
pub mod mixer;
pub mod source;

pub use mixer::{spawn_mixer, AudioMixer, MixerConfig, MixerHandle};
pub use source::{acquire_sources, AcquiredAudio, AudioSource, ToneSource};
