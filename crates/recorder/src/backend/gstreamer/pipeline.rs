//! appsrc → … → appsink pipelines shared by the GStreamer encoders and sources.

use std::sync::OnceLock;
use std::time::Duration;

use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;

use mosaic_common::{MosaicError, MosaicResult};
use mosaic_media_model::{ChunkKind, EncodedChunk};

const STATE_CHANGE_TIMEOUT_SECS: u64 = 10;
const EOS_TIMEOUT_SECS: u64 = 10;

pub(crate) fn init_gstreamer() -> MosaicResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    let init_res = GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string()));
    match init_res {
        Ok(()) => Ok(()),
        Err(e) => Err(MosaicError::unsupported(format!("Failed to initialize GStreamer: {e}"))),
    }
}

pub(crate) fn element_available(name: &str) -> bool {
    gst::ElementFactory::find(name).is_some()
}

/// A launched pipeline with an optional `appsrc` named `src` and an
/// `appsink` named `sink`.
pub(crate) struct AppPipeline {
    name: String,
    pipeline: gst::Pipeline,
    appsrc: Option<gst_app::AppSrc>,
    appsink: gst_app::AppSink,
}

impl AppPipeline {
    pub fn from_launch(name: impl Into<String>, launch: &str) -> MosaicResult<Self> {
        init_gstreamer()?;
        let name = name.into();

        let element = gst::parse::launch(launch)
            .map_err(|e| MosaicError::encoder_init(format!("Failed to build {name} pipeline: {e}")))?;
        let pipeline = element
            .dynamic_cast::<gst::Pipeline>()
            .map_err(|_| MosaicError::encoder_init("Launch string did not produce a pipeline"))?;

        let appsrc = pipeline
            .by_name("src")
            .and_then(|e| e.dynamic_cast::<gst_app::AppSrc>().ok());
        let appsink = pipeline
            .by_name("sink")
            .and_then(|e| e.dynamic_cast::<gst_app::AppSink>().ok())
            .ok_or_else(|| MosaicError::encoder_init(format!("{name} pipeline has no appsink named `sink`")))?;

        tracing::debug!(pipeline = %name, launch, "Pipeline built");
        Ok(Self {
            name,
            pipeline,
            appsrc,
            appsink,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn appsink(&self) -> &gst_app::AppSink {
        &self.appsink
    }

    /// Set Playing and wait until the pipeline gets there.
    pub fn play(&self) -> MosaicResult<()> {
        self.pipeline.set_state(gst::State::Playing).map_err(|e| {
            MosaicError::encoder_init(format!("Failed to start {} pipeline: {e:?}", self.name))
        })?;

        match self.pipeline.state(gst::ClockTime::from_seconds(STATE_CHANGE_TIMEOUT_SECS)) {
            (Ok(_), gst::State::Playing, _) => Ok(()),
            (Ok(_), state, _) => {
                tracing::warn!(pipeline = %self.name, ?state, "Pipeline did not reach Playing state within timeout");
                Ok(())
            }
            (Err(e), _, _) => Err(MosaicError::encoder_init(format!(
                "{} pipeline failed to reach Playing state: {e:?}",
                self.name
            ))),
        }
    }

    pub fn push(&self, buffer: gst::Buffer) -> MosaicResult<()> {
        if let Some(message) = self.pending_error() {
            return Err(MosaicError::encode(message));
        }
        let appsrc = self
            .appsrc
            .as_ref()
            .ok_or_else(|| MosaicError::encode(format!("{} pipeline has no appsrc", self.name)))?;
        appsrc
            .push_buffer(buffer)
            .map_err(|e| MosaicError::encode(format!("{} pipeline refused buffer: {e:?}", self.name)))?;
        Ok(())
    }

    /// Ask the encoder for a keyframe on the next buffer.
    pub fn request_keyframe(&self) {
        let event = gstreamer_video::UpstreamForceKeyUnitEvent::builder()
            .all_headers(true)
            .build();
        if !self.appsink.send_event(event) {
            tracing::debug!(pipeline = %self.name, "Keyframe request not handled");
        }
    }

    /// Samples already available, without blocking.
    pub fn try_pull(&self) -> Vec<gst::Sample> {
        let mut samples = Vec::new();
        while let Some(sample) = self.appsink.try_pull_sample(gst::ClockTime::ZERO) {
            samples.push(sample);
        }
        samples
    }

    /// Send EOS into the appsrc and collect every sample until it reaches the sink.
    pub async fn end_of_stream(&self) -> MosaicResult<Vec<gst::Sample>> {
        if let Some(appsrc) = &self.appsrc {
            if appsrc.end_of_stream().is_err() {
                tracing::warn!(pipeline = %self.name, "Failed to send EOS event; output may be truncated");
            }
        }

        let appsink = self.appsink.clone();
        let name = self.name.clone();
        let samples = tokio::task::spawn_blocking(move || {
            let mut samples = Vec::new();
            let deadline = gst::ClockTime::from_seconds(EOS_TIMEOUT_SECS);
            loop {
                match appsink.try_pull_sample(deadline) {
                    Some(sample) => samples.push(sample),
                    None => {
                        if !appsink.is_eos() {
                            tracing::warn!(pipeline = %name, "EOS drain timed out");
                        }
                        break;
                    }
                }
            }
            samples
        })
        .await
        .map_err(|e| MosaicError::encode(format!("{} drain task failed: {e}", self.name)))?;

        if let Some(message) = self.pending_error() {
            return Err(MosaicError::encode(message));
        }
        tracing::debug!(pipeline = %self.name, samples = samples.len(), "EOS received; pipeline drained");
        Ok(samples)
    }

    /// First error posted on the bus, if any.
    pub fn pending_error(&self) -> Option<String> {
        let bus = self.pipeline.bus()?;
        while let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error]) {
            if let gst::MessageView::Error(e) = msg.view() {
                return Some(format!("{} pipeline error: {}", self.name, e.error()));
            }
        }
        None
    }

    pub fn shutdown(&self) {
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            tracing::warn!(pipeline = %self.name, error = ?e, "Failed to stop pipeline");
        }
    }
}

impl Drop for AppPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub(crate) fn clock_time(at: Duration) -> gst::ClockTime {
    gst::ClockTime::from_nseconds(at.as_nanos() as u64)
}

/// Turns appsink samples into chunks, attaching codec-private data once.
pub(crate) struct ChunkReader {
    kind: ChunkKind,
    default_duration: Duration,
    next_timestamp: Duration,
    config_sent: bool,
}

impl ChunkReader {
    pub fn new(kind: ChunkKind, default_duration: Duration) -> Self {
        Self {
            kind,
            default_duration,
            next_timestamp: Duration::ZERO,
            config_sent: false,
        }
    }

    pub fn read(&mut self, sample: &gst::Sample) -> MosaicResult<EncodedChunk> {
        let buffer = sample
            .buffer()
            .ok_or_else(|| MosaicError::encode("encoder produced a sample without a buffer"))?;
        let map = buffer
            .map_readable()
            .map_err(|e| MosaicError::encode(format!("unreadable encoder output: {e}")))?;

        let timestamp = buffer
            .pts()
            .map(|t| Duration::from_nanos(t.nseconds()))
            .unwrap_or(self.next_timestamp);
        let duration = buffer
            .duration()
            .map(|t| Duration::from_nanos(t.nseconds()))
            .unwrap_or(self.default_duration);
        self.next_timestamp = timestamp + duration;

        let mut chunk = match self.kind {
            ChunkKind::Video => EncodedChunk::video(
                map.as_slice().to_vec(),
                timestamp,
                duration,
                !buffer.flags().contains(gst::BufferFlags::DELTA_UNIT),
            ),
            ChunkKind::Audio => EncodedChunk::audio(map.as_slice().to_vec(), timestamp, duration),
        };

        if !self.config_sent {
            if let Some(config) = codec_private(sample) {
                chunk = chunk.with_decoder_config(config);
                self.config_sent = true;
            }
        }
        Ok(chunk)
    }
}

/// `codec_data` (avcC, AudioSpecificConfig) or the first stream header (OpusHead).
fn codec_private(sample: &gst::Sample) -> Option<Vec<u8>> {
    let structure = sample.caps()?.structure(0)?;
    let buffer = structure.get::<gst::Buffer>("codec_data").ok().or_else(|| {
        structure
            .get::<gst::Array>("streamheader")
            .ok()
            .and_then(|headers| headers.as_slice().first().and_then(|v| v.get::<gst::Buffer>().ok()))
    })?;
    let map = buffer.map_readable().ok()?;
    Some(map.as_slice().to_vec())
}
