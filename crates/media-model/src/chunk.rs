//! Encoded payloads travelling from the encoders to the muxer.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which elementary stream a chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Video,
    Audio,
}

/// One compressed access unit (video frame or audio frame).
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    pub kind: ChunkKind,
    pub payload: Vec<u8>,
    /// Presentation time relative to session start.
    pub timestamp: Duration,
    pub duration: Duration,
    pub is_keyframe: bool,
    /// Codec-private data (avcC, AudioSpecificConfig, OpusHead), attached the
    /// first time the encoder knows it.
    pub decoder_config: Option<Vec<u8>>,
}

impl EncodedChunk {
    pub fn video(payload: Vec<u8>, timestamp: Duration, duration: Duration, is_keyframe: bool) -> Self {
        Self {
            kind: ChunkKind::Video,
            payload,
            timestamp,
            duration,
            is_keyframe,
            decoder_config: None,
        }
    }

    /// Audio frames are always independently decodable.
    pub fn audio(payload: Vec<u8>, timestamp: Duration, duration: Duration) -> Self {
        Self {
            kind: ChunkKind::Audio,
            payload,
            timestamp,
            duration,
            is_keyframe: true,
            decoder_config: None,
        }
    }

    pub fn with_decoder_config(mut self, config: Vec<u8>) -> Self {
        self.decoder_config = Some(config);
        self
    }

    pub fn end(&self) -> Duration {
        self.timestamp + self.duration
    }
}

impl fmt::Debug for EncodedChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedChunk")
            .field("kind", &self.kind)
            .field("bytes", &self.payload.len())
            .field("timestamp", &self.timestamp)
            .field("duration", &self.duration)
            .field("is_keyframe", &self.is_keyframe)
            .field("decoder_config", &self.decoder_config.as_ref().map(Vec::len))
            .finish()
    }
}
