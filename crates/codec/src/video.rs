//! Video encoder seams and the per-session pipeline.
//!
//! A session holds exactly one [`VideoPipeline`], built once at start with
//! either the per-frame strategy or the continuous-stream fallback. The
//! strategy never changes while the session runs, so one container never
//! mixes output from both.

use std::sync::Arc;

use async_trait::async_trait;

use mosaic_common::{MosaicError, MosaicResult};
use mosaic_media_model::{CompositeFrame, EncodedChunk, EncoderDescriptor, EncoderState, EncoderStrategy};

use crate::stream::StreamCaptureEncoder;

/// Receives encoded chunks as they are produced.
pub type ChunkCallback = Arc<dyn Fn(EncodedChunk) + Send + Sync>;

/// Receives asynchronous encoder failures.
pub type ErrorCallback = Arc<dyn Fn(MosaicError) + Send + Sync>;

/// Per-frame encoder: one composited frame per call.
///
/// Output is delivered through the [`ChunkCallback`] the encoder was
/// created with, possibly after `encode` returns.
#[async_trait]
pub trait FrameEncoder: Send {
    fn descriptor(&self) -> &EncoderDescriptor;

    async fn encode(&mut self, frame: &CompositeFrame, keyframe: bool) -> MosaicResult<()>;

    /// Drain every pending chunk through the callback.
    async fn flush(&mut self) -> MosaicResult<()>;
}

/// Continuous-stream encoder that batches output internally.
#[async_trait]
pub trait StreamEncoder: Send {
    fn descriptor(&self) -> &EncoderDescriptor;

    /// Feed one captured view of the surface.
    async fn push(&mut self, frame: &CompositeFrame) -> MosaicResult<()>;

    /// Output completed since the last drain.
    async fn drain(&mut self) -> MosaicResult<Vec<EncodedChunk>>;

    /// End the stream and return everything still buffered.
    async fn finish(&mut self) -> MosaicResult<Vec<EncodedChunk>>;
}

enum Strategy {
    PerFrame(Box<dyn FrameEncoder>),
    Stream(StreamCaptureEncoder),
}

/// The session's video encoder, fixed at start.
pub struct VideoPipeline {
    strategy: Strategy,
    state: EncoderState,
    submitted: u64,
}

impl VideoPipeline {
    pub fn per_frame(encoder: Box<dyn FrameEncoder>) -> Self {
        Self {
            strategy: Strategy::PerFrame(encoder),
            state: EncoderState::Configured,
            submitted: 0,
        }
    }

    pub fn stream(encoder: StreamCaptureEncoder) -> Self {
        Self {
            strategy: Strategy::Stream(encoder),
            state: EncoderState::Configured,
            submitted: 0,
        }
    }

    pub fn strategy(&self) -> EncoderStrategy {
        match self.strategy {
            Strategy::PerFrame(_) => EncoderStrategy::PerFrame,
            Strategy::Stream(_) => EncoderStrategy::Stream,
        }
    }

    pub fn descriptor(&self) -> &EncoderDescriptor {
        match &self.strategy {
            Strategy::PerFrame(encoder) => encoder.descriptor(),
            Strategy::Stream(encoder) => encoder.descriptor(),
        }
    }

    pub fn state(&self) -> EncoderState {
        self.state
    }

    /// Frames accepted so far.
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    /// Encode one frame. The keyframe flag only applies to the per-frame
    /// strategy; the stream encoder places keyframes itself.
    ///
    /// Any failure moves the pipeline to `Errored`; it accepts no further frames.
    pub async fn encode(&mut self, frame: &CompositeFrame, keyframe: bool) -> MosaicResult<()> {
        if !self.state.accepts_frames() {
            return Err(MosaicError::EncoderNotConfigured {
                state: self.state.to_string(),
            });
        }

        let result = match &mut self.strategy {
            Strategy::PerFrame(encoder) => encoder.encode(frame, keyframe).await,
            Strategy::Stream(encoder) => encoder.submit(frame),
        };

        match result {
            Ok(()) => {
                self.submitted += 1;
                Ok(())
            }
            Err(e) => {
                self.state = EncoderState::Errored;
                Err(e)
            }
        }
    }

    /// Flush remaining output and close. Safe to call more than once; an
    /// errored pipeline has nothing left to flush.
    pub async fn finish(&mut self) -> MosaicResult<()> {
        if self.state != EncoderState::Configured {
            return Ok(());
        }

        let result = match &mut self.strategy {
            Strategy::PerFrame(encoder) => encoder.flush().await,
            Strategy::Stream(encoder) => encoder.finish().await,
        };

        self.state = match result {
            Ok(()) => EncoderState::Closed,
            Err(_) => EncoderState::Errored,
        };
        result
    }

    /// Give up on a flush that did not complete in time.
    pub fn abandon(&mut self) {
        if self.state == EncoderState::Configured {
            self.state = EncoderState::Closed;
        }
    }
}
