//! Media backends: where encoders and capture devices come from.

use mosaic_audio::AudioSource;
use mosaic_codec::{AudioEncoder, ChunkCallback, FrameEncoder, ProbeReport, StreamEncoder};
use mosaic_common::MosaicResult;
use mosaic_media_model::{AudioEncoderConfig, AudioFormat, AudioSourceKind, VideoEncoderConfig};

#[cfg(feature = "gstreamer")]
pub mod gstreamer;

#[cfg(feature = "gstreamer")]
pub use self::gstreamer::GstBackend;

/// Builds the per-session encoders and capture sources.
///
/// Every call constructs a fresh instance; nothing is reused across
/// sessions. Errors here are init failures: the session decides whether
/// they are fatal (no video encoder at all) or degrade it.
pub trait MediaBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Primary strategy: one composited frame per call.
    fn frame_encoder(&self, config: &VideoEncoderConfig, output: ChunkCallback) -> MosaicResult<Box<dyn FrameEncoder>>;

    /// Fallback strategy: continuous stream with internal batching.
    fn stream_encoder(&self, config: &VideoEncoderConfig) -> MosaicResult<Box<dyn StreamEncoder>>;

    fn audio_encoder(&self, config: &AudioEncoderConfig, output: ChunkCallback) -> MosaicResult<Box<dyn AudioEncoder>>;

    /// Open (but do not start) a capture device delivering `format`.
    fn audio_source(&self, kind: AudioSourceKind, format: AudioFormat) -> MosaicResult<Box<dyn AudioSource>>;

    fn capabilities(&self) -> ProbeReport;
}

/// Get the default backend for this build.
#[cfg(feature = "gstreamer")]
pub fn default_backend() -> MosaicResult<Box<dyn MediaBackend>> {
    Ok(Box::new(GstBackend::new()?))
}

#[cfg(not(feature = "gstreamer"))]
pub fn default_backend() -> MosaicResult<Box<dyn MediaBackend>> {
    Err(mosaic_common::MosaicError::unsupported(
        "built without a media backend; enable the `gstreamer` feature",
    ))
}
