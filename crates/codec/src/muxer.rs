//! Muxer: collects encoded chunks and finalizes the container exactly once.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use mosaic_common::{MosaicError, MosaicResult};
use mosaic_media_model::{AudioCodec, ChunkKind, ContainerFormat, EncodedChunk, VideoCodec};

use crate::matroska::{write_container, ContainerLayout, TrackHeader};
use crate::video::ChunkCallback;

/// Why finalize produced no container. `Clone` so a repeated finalize can
/// hand back the identical result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MuxError {
    #[error("no video chunks were muxed")]
    NoVideoChunks,

    #[error("container assembly failed: {0}")]
    Assembly(String),
}

impl From<MuxError> for MosaicError {
    fn from(err: MuxError) -> Self {
        match err {
            MuxError::NoVideoChunks => MosaicError::NoVideoFrames,
            MuxError::Assembly(message) => MosaicError::mux(message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoTrackInfo {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioTrackInfo {
    pub codec: AudioCodec,
    pub sample_rate: u32,
    pub channels: u16,
}

/// A finalized container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxOutput {
    pub bytes: Arc<[u8]>,
    pub container: ContainerFormat,
    pub video_chunks: u64,
    pub audio_chunks: u64,
    pub duration: Duration,
}

pub struct Muxer {
    writing_app: String,
    container: Option<ContainerFormat>,
    video: Option<VideoTrackInfo>,
    audio: Option<AudioTrackInfo>,
    chunks: Vec<EncodedChunk>,
    video_config: Option<Vec<u8>>,
    audio_config: Option<Vec<u8>>,
    video_chunks: u64,
    audio_chunks: u64,
    video_end: Option<Duration>,
    audio_end: Option<Duration>,
    late_chunks: u64,
    result: Option<Result<MuxOutput, MuxError>>,
    finalize_runs: u32,
}

impl Muxer {
    pub fn new(writing_app: impl Into<String>) -> Self {
        Self {
            writing_app: writing_app.into(),
            container: None,
            video: None,
            audio: None,
            chunks: Vec::new(),
            video_config: None,
            audio_config: None,
            video_chunks: 0,
            audio_chunks: 0,
            video_end: None,
            audio_end: None,
            late_chunks: 0,
            result: None,
            finalize_runs: 0,
        }
    }

    /// Fix the container and video track once the encoder strategy is chosen.
    pub fn set_video_track(&mut self, container: ContainerFormat, info: VideoTrackInfo) -> MosaicResult<()> {
        if !container.accepts_video(info.codec) {
            return Err(MosaicError::mux(format!(
                "{} cannot carry {:?} video",
                container.doc_type(),
                info.codec
            )));
        }
        self.container = Some(container);
        self.video = Some(info);
        Ok(())
    }

    pub fn set_audio_track(&mut self, info: AudioTrackInfo) {
        self.audio = Some(info);
    }

    pub fn container(&self) -> Option<ContainerFormat> {
        self.container
    }

    pub fn has_audio_track(&self) -> bool {
        self.audio.is_some()
    }

    /// Accept one chunk. Chunks arriving after finalize are discarded.
    pub fn push(&mut self, chunk: EncodedChunk) -> bool {
        if self.result.is_some() {
            self.late_chunks += 1;
            tracing::debug!(kind = ?chunk.kind, "Chunk arrived after finalize, discarded");
            return false;
        }

        let end = chunk.end();
        match chunk.kind {
            ChunkKind::Video => {
                self.video_chunks += 1;
                self.video_end = Some(self.video_end.map_or(end, |e| e.max(end)));
                if let Some(config) = &chunk.decoder_config {
                    self.video_config = Some(config.clone());
                }
            }
            ChunkKind::Audio => {
                self.audio_chunks += 1;
                self.audio_end = Some(self.audio_end.map_or(end, |e| e.max(end)));
                if let Some(config) = &chunk.decoder_config {
                    self.audio_config = Some(config.clone());
                }
            }
        }
        self.chunks.push(chunk);
        true
    }

    pub fn video_chunks(&self) -> u64 {
        self.video_chunks
    }

    pub fn audio_chunks(&self) -> u64 {
        self.audio_chunks
    }

    pub fn late_chunks(&self) -> u64 {
        self.late_chunks
    }

    /// End of the last video and audio chunk, for drift reporting.
    pub fn stream_ends(&self) -> (Option<Duration>, Option<Duration>) {
        (self.video_end, self.audio_end)
    }

    pub fn is_finalized(&self) -> bool {
        self.result.is_some()
    }

    /// How many times container assembly actually ran. Never exceeds one.
    pub fn finalize_runs(&self) -> u32 {
        self.finalize_runs
    }

    /// Assemble the container.
    ///
    /// Callers flush both encoders first. With zero video chunks no
    /// container is produced. The first outcome is cached and returned
    /// unchanged by every later call.
    pub fn finalize(&mut self) -> Result<MuxOutput, MuxError> {
        if let Some(result) = &self.result {
            tracing::debug!("Muxer already finalized, returning cached result");
            return result.clone();
        }

        self.finalize_runs += 1;
        let result = self.assemble();
        self.chunks = Vec::new();

        match &result {
            Ok(output) => tracing::info!(
                container = output.container.doc_type(),
                video_chunks = output.video_chunks,
                audio_chunks = output.audio_chunks,
                bytes = output.bytes.len(),
                "Container finalized"
            ),
            Err(e) => tracing::warn!(error = %e, "Container not produced"),
        }
        self.result = Some(result.clone());
        result
    }

    fn assemble(&self) -> Result<MuxOutput, MuxError> {
        if self.video_chunks == 0 {
            return Err(MuxError::NoVideoChunks);
        }
        let (Some(container), Some(video)) = (self.container, self.video) else {
            return Err(MuxError::Assembly("video track was never configured".into()));
        };

        let layout = ContainerLayout {
            format: container,
            video_codec: video.codec,
            video: TrackHeader {
                kind: ChunkKind::Video,
                codec_id: video.codec.codec_id(),
                codec_private: self.video_config.clone(),
                default_duration_ns: Some(1_000_000_000 / u64::from(video.fps.max(1))),
                width: video.width,
                height: video.height,
                sample_rate: 0,
                channels: 0,
            },
            audio: self.audio.map(|audio| TrackHeader {
                kind: ChunkKind::Audio,
                codec_id: audio.codec.codec_id(),
                codec_private: self.audio_config.clone(),
                default_duration_ns: None,
                width: 0,
                height: 0,
                sample_rate: audio.sample_rate,
                channels: audio.channels,
            }),
            writing_app: self.writing_app.clone(),
        };

        let bytes = write_container(&layout, &self.chunks).map_err(|e| MuxError::Assembly(e.to_string()))?;
        let duration = self.video_end.max(self.audio_end).unwrap_or_default();

        Ok(MuxOutput {
            bytes: bytes.into(),
            container,
            video_chunks: self.video_chunks,
            audio_chunks: if self.audio.is_some() { self.audio_chunks } else { 0 },
            duration,
        })
    }
}

/// Shared handle used by encoder callbacks and the session.
#[derive(Clone)]
pub struct MuxerHandle {
    inner: Arc<Mutex<Muxer>>,
}

impl MuxerHandle {
    pub fn new(muxer: Muxer) -> Self {
        Self {
            inner: Arc::new(Mutex::new(muxer)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Muxer> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Callback that routes encoder output into this muxer.
    pub fn chunk_sink(&self) -> ChunkCallback {
        let handle = self.clone();
        Arc::new(move |chunk| {
            handle.lock().push(chunk);
        })
    }

    pub fn push(&self, chunk: EncodedChunk) -> bool {
        self.lock().push(chunk)
    }

    pub fn finalize(&self) -> Result<MuxOutput, MuxError> {
        self.lock().finalize()
    }

    pub fn video_chunks(&self) -> u64 {
        self.lock().video_chunks()
    }

    pub fn audio_chunks(&self) -> u64 {
        self.lock().audio_chunks()
    }
}
