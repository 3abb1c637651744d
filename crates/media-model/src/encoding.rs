//! Codec, container, and encoder configuration types.

use std::fmt;

use mosaic_common::config::{HardwareAcceleration, RecordingDefaults};
use serde::{Deserialize, Serialize};

/// Video codecs the pipeline can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    Vp8,
    Vp9,
}

impl VideoCodec {
    /// Matroska `CodecID`.
    pub fn codec_id(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "V_MPEG4/ISO/AVC",
            VideoCodec::Vp8 => "V_VP8",
            VideoCodec::Vp9 => "V_VP9",
        }
    }
}

/// Audio codecs the pipeline can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Aac,
    Opus,
}

impl AudioCodec {
    pub fn codec_id(&self) -> &'static str {
        match self {
            AudioCodec::Aac => "A_AAC",
            AudioCodec::Opus => "A_OPUS",
        }
    }
}

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    /// H.264 + AAC, produced by the per-frame strategy.
    Matroska,
    /// VP8 + Opus, produced by the continuous-stream fallback.
    WebM,
}

impl ContainerFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ContainerFormat::Matroska => "video/x-matroska",
            ContainerFormat::WebM => "video/webm",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Matroska => "mkv",
            ContainerFormat::WebM => "webm",
        }
    }

    /// EBML `DocType`.
    pub fn doc_type(&self) -> &'static str {
        match self {
            ContainerFormat::Matroska => "matroska",
            ContainerFormat::WebM => "webm",
        }
    }

    pub fn video_codec(&self) -> VideoCodec {
        match self {
            ContainerFormat::Matroska => VideoCodec::H264,
            ContainerFormat::WebM => VideoCodec::Vp8,
        }
    }

    pub fn audio_codec(&self) -> AudioCodec {
        match self {
            ContainerFormat::Matroska => AudioCodec::Aac,
            ContainerFormat::WebM => AudioCodec::Opus,
        }
    }

    /// Whether `codec` may be stored in this container.
    pub fn accepts_video(&self, codec: VideoCodec) -> bool {
        match self {
            ContainerFormat::Matroska => true,
            ContainerFormat::WebM => matches!(codec, VideoCodec::Vp8 | VideoCodec::Vp9),
        }
    }
}

/// Fixed video encoder parameters for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoEncoderConfig {
    pub codec: VideoCodec,
    pub bitrate_kbps: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub hardware_acceleration: HardwareAcceleration,
    /// A keyframe is forced every this many frames.
    pub keyframe_interval: u64,
}

impl VideoEncoderConfig {
    pub fn from_defaults(codec: VideoCodec, width: u32, height: u32, defaults: &RecordingDefaults) -> Self {
        Self {
            codec,
            bitrate_kbps: defaults.quality.video_bitrate_kbps(),
            width,
            height,
            fps: defaults.fps.max(1),
            hardware_acceleration: defaults.hardware_acceleration,
            keyframe_interval: defaults.keyframe_interval.max(1),
        }
    }

    /// The same parameters retargeted at another codec.
    pub fn with_codec(&self, codec: VideoCodec) -> Self {
        Self {
            codec,
            ..self.clone()
        }
    }
}

/// Fixed audio encoder parameters for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioEncoderConfig {
    pub codec: AudioCodec,
    pub sample_rate: u32,
    pub channels: u16,
    pub bitrate_kbps: u32,
}

/// How the video encoder is fed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EncoderStrategy {
    /// One composited frame per call with explicit timestamp and keyframe flag.
    PerFrame,
    /// Continuous capture of the compositing surface with internal batching.
    Stream,
}

impl EncoderStrategy {
    pub fn container(&self) -> ContainerFormat {
        match self {
            EncoderStrategy::PerFrame => ContainerFormat::Matroska,
            EncoderStrategy::Stream => ContainerFormat::WebM,
        }
    }
}

impl fmt::Display for EncoderStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncoderStrategy::PerFrame => f.write_str("per-frame"),
            EncoderStrategy::Stream => f.write_str("stream"),
        }
    }
}

/// Encoder lifecycle. Frames are accepted only while `Configured`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderState {
    Unconfigured,
    Configured,
    Closed,
    Errored,
}

impl EncoderState {
    pub fn accepts_frames(&self) -> bool {
        matches!(self, EncoderState::Configured)
    }
}

impl fmt::Display for EncoderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EncoderState::Unconfigured => "unconfigured",
            EncoderState::Configured => "configured",
            EncoderState::Closed => "closed",
            EncoderState::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// A concrete encoder implementation known to a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderDescriptor {
    /// Display name, e.g. "VA-API H.264".
    pub name: String,
    /// Backend element or library name, e.g. `vah264enc`.
    pub element: String,
    pub codec: EncoderCodec,
    pub hardware: bool,
}

/// Codec produced by an [`EncoderDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "codec")]
pub enum EncoderCodec {
    Video(VideoCodec),
    Audio(AudioCodec),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn containers_pair_codecs() {
        assert_eq!(ContainerFormat::Matroska.video_codec(), VideoCodec::H264);
        assert_eq!(ContainerFormat::Matroska.audio_codec(), AudioCodec::Aac);
        assert_eq!(ContainerFormat::WebM.mime_type(), "video/webm");
        assert!(!ContainerFormat::WebM.accepts_video(VideoCodec::H264));
        assert_eq!(EncoderStrategy::Stream.container(), ContainerFormat::WebM);
    }

    #[test]
    fn only_configured_encoders_accept_frames() {
        assert!(EncoderState::Configured.accepts_frames());
        for state in [EncoderState::Unconfigured, EncoderState::Closed, EncoderState::Errored] {
            assert!(!state.accepts_frames());
        }
    }

    #[test]
    fn video_config_from_defaults() {
        let defaults = RecordingDefaults::default();
        let config = VideoEncoderConfig::from_defaults(VideoCodec::H264, 1280, 720, &defaults);
        assert_eq!(config.bitrate_kbps, 5000);
        assert_eq!(config.keyframe_interval, 120);
        assert_eq!(config.with_codec(VideoCodec::Vp8).codec, VideoCodec::Vp8);
    }
}
