//! Encoder capability probing.
//!
//! Candidates are listed in priority order (lower is better, hardware
//! first). A backend answers which elements exist; selection applies the
//! session's hardware preference on top.

use serde::Serialize;

use mosaic_common::config::HardwareAcceleration;
use mosaic_media_model::{AudioCodec, EncoderCodec, EncoderDescriptor, VideoCodec};

/// A known encoder implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderCandidate {
    pub name: &'static str,
    pub element: &'static str,
    pub codec: EncoderCodec,
    pub hardware: bool,
    pub priority: u8,
}

impl EncoderCandidate {
    pub fn descriptor(&self) -> EncoderDescriptor {
        EncoderDescriptor {
            name: self.name.to_string(),
            element: self.element.to_string(),
            codec: self.codec,
            hardware: self.hardware,
        }
    }

    /// Name with a hardware/software suffix.
    pub fn display_name(&self) -> String {
        let kind = if self.hardware { "Hardware" } else { "Software" };
        format!("{} ({kind})", self.name)
    }
}

const fn video(name: &'static str, element: &'static str, codec: VideoCodec, hardware: bool, priority: u8) -> EncoderCandidate {
    EncoderCandidate {
        name,
        element,
        codec: EncoderCodec::Video(codec),
        hardware,
        priority,
    }
}

const fn audio(name: &'static str, element: &'static str, codec: AudioCodec, priority: u8) -> EncoderCandidate {
    EncoderCandidate {
        name,
        element,
        codec: EncoderCodec::Audio(codec),
        hardware: false,
        priority,
    }
}

pub const VIDEO_CANDIDATES: &[EncoderCandidate] = &[
    video("VA H.264", "vah264enc", VideoCodec::H264, true, 10),
    video("VA-API H.264", "vaapih264enc", VideoCodec::H264, true, 11),
    video("NVENC H.264", "nvh264enc", VideoCodec::H264, true, 20),
    video("x264 H.264", "x264enc", VideoCodec::H264, false, 100),
    video("VP8", "vp8enc", VideoCodec::Vp8, false, 110),
    video("VP9", "vp9enc", VideoCodec::Vp9, false, 111),
];

pub const AUDIO_CANDIDATES: &[EncoderCandidate] = &[
    audio("FDK AAC", "fdkaacenc", AudioCodec::Aac, 10),
    audio("FFmpeg AAC", "avenc_aac", AudioCodec::Aac, 20),
    audio("VisualOn AAC", "voaacenc", AudioCodec::Aac, 30),
    audio("Opus", "opusenc", AudioCodec::Opus, 10),
];

/// Video candidates for `codec`, best first under `preference`.
pub fn video_candidates(codec: VideoCodec, preference: HardwareAcceleration) -> Vec<EncoderCandidate> {
    let mut candidates: Vec<_> = VIDEO_CANDIDATES
        .iter()
        .copied()
        .filter(|c| c.codec == EncoderCodec::Video(codec))
        .collect();
    match preference {
        HardwareAcceleration::NoPreference | HardwareAcceleration::PreferHardware => {
            candidates.sort_by_key(|c| (!c.hardware, c.priority));
        }
        HardwareAcceleration::PreferSoftware => {
            candidates.sort_by_key(|c| (c.hardware, c.priority));
        }
    }
    candidates
}

pub fn audio_candidates(codec: AudioCodec) -> Vec<EncoderCandidate> {
    let mut candidates: Vec<_> = AUDIO_CANDIDATES
        .iter()
        .copied()
        .filter(|c| c.codec == EncoderCodec::Audio(codec))
        .collect();
    candidates.sort_by_key(|c| c.priority);
    candidates
}

/// Best available video encoder for `codec`.
pub fn select_video(
    codec: VideoCodec,
    preference: HardwareAcceleration,
    available: impl Fn(&str) -> bool,
) -> Option<EncoderDescriptor> {
    video_candidates(codec, preference)
        .into_iter()
        .find(|c| available(c.element))
        .map(|c| c.descriptor())
}

/// Best available audio encoder for `codec`.
pub fn select_audio(codec: AudioCodec, available: impl Fn(&str) -> bool) -> Option<EncoderDescriptor> {
    audio_candidates(codec)
        .into_iter()
        .find(|c| available(c.element))
        .map(|c| c.descriptor())
}

/// What a backend can do on this machine.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProbeReport {
    pub backend: String,
    pub video_encoders: Vec<EncoderDescriptor>,
    pub audio_encoders: Vec<EncoderDescriptor>,
    pub microphone: bool,
    pub system_audio: bool,
}

impl ProbeReport {
    /// Collect every available candidate.
    pub fn collect(backend: impl Into<String>, available: impl Fn(&str) -> bool) -> Self {
        Self {
            backend: backend.into(),
            video_encoders: VIDEO_CANDIDATES
                .iter()
                .filter(|c| available(c.element))
                .map(EncoderCandidate::descriptor)
                .collect(),
            audio_encoders: AUDIO_CANDIDATES
                .iter()
                .filter(|c| available(c.element))
                .map(EncoderCandidate::descriptor)
                .collect(),
            microphone: false,
            system_audio: false,
        }
    }

    pub fn supports_video(&self, codec: VideoCodec) -> bool {
        self.video_encoders
            .iter()
            .any(|d| d.codec == EncoderCodec::Video(codec))
    }

    pub fn supports_audio(&self, codec: AudioCodec) -> bool {
        self.audio_encoders
            .iter()
            .any(|d| d.codec == EncoderCodec::Audio(codec))
    }
}
