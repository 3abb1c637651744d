//! Recording session lifecycle.
//!
//! A [`RecordingSession`] owns every timer, counter, encoder, and the muxer
//! of one recording. Nothing survives into the next session.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use serde::Serialize;
use tokio::sync::mpsc;

use mosaic_audio::{acquire_sources, spawn_mixer, AcquiredAudio, AudioMixer, MixerConfig, MixerHandle};
use mosaic_codec::{
    spawn_audio_encoder, suggested_name, AudioEncoderHandle, AudioTrackInfo, ErrorCallback, Muxer, MuxerHandle,
    OutputSink, StreamCaptureEncoder, VideoPipeline, VideoTrackInfo,
};
use mosaic_common::clock::{DriftMeasurement, FrameInterval, RecordingClock};
use mosaic_common::config::RecordingDefaults;
use mosaic_common::{MosaicError, MosaicResult};
use mosaic_compositor::FrameCompositor;
use mosaic_media_model::{
    AudioEncoderConfig, AudioFormat, AudioMix, AudioTrack, ContainerFormat, EncoderStrategy, SessionId,
    SessionState, SourceProvider, VideoCodec, VideoEncoderConfig,
};

use crate::backend::MediaBackend;
use crate::events::{EventBus, PipelineEvent};
use crate::pacer::{FrameScheduler, SchedulerContext, SharedPipeline};

const WRITING_APP: &str = concat!("mosaic ", env!("CARGO_PKG_VERSION"));
const AUDIO_BLOCK_QUEUE: usize = 64;
const AUDIO_FRAME_QUEUE: usize = 16;
const DRIFT_WARN_MS: f64 = 100.0;

/// Parameters for one recording.
#[derive(Clone)]
pub struct SessionConfig {
    /// Read on every tick.
    pub sources: Arc<dyn SourceProvider>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub capture_mic: bool,
    pub capture_system_audio: bool,
}

impl SessionConfig {
    /// Output size, rate, and capture flags taken from the recording defaults.
    pub fn from_defaults(sources: Arc<dyn SourceProvider>, defaults: &RecordingDefaults) -> Self {
        Self {
            sources,
            width: defaults.width,
            height: defaults.height,
            fps: defaults.fps,
            capture_mic: defaults.capture_mic,
            capture_system_audio: defaults.capture_system_audio,
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("fps", &self.fps)
            .field("capture_mic", &self.capture_mic)
            .field("capture_system_audio", &self.capture_system_audio)
            .finish_non_exhaustive()
    }
}

/// Live view of a running session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub id: SessionId,
    pub state: SessionState,
    pub started_at: String,
    pub elapsed_ms: u64,
    pub frames: u64,
    pub dropped: u64,
    pub video_chunks: u64,
    pub audio_chunks: u64,
    pub strategy: EncoderStrategy,
    pub audio_mix: AudioMix,
    pub encoding_halted: bool,
}

/// What a finished session produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub state: SessionState,
    pub frames: u64,
    pub dropped: u64,
    pub video_chunks: u64,
    pub audio_chunks: u64,
    pub duration_ms: u64,
    pub strategy: EncoderStrategy,
    pub container: ContainerFormat,
    pub audio_mix: AudioMix,
    pub path: Option<PathBuf>,
    pub error: Option<String>,
}

struct AudioChain {
    sources: AcquiredAudio,
    mixer: MixerHandle,
    encoder: AudioEncoderHandle,
    track: AudioTrack,
}

pub struct RecordingSession {
    id: SessionId,
    state: SessionState,
    clock: RecordingClock,
    settings: RecordingDefaults,
    events: EventBus,
    muxer: MuxerHandle,
    pipeline: SharedPipeline,
    strategy: EncoderStrategy,
    container: ContainerFormat,
    scheduler: FrameScheduler,
    audio: Option<AudioChain>,
}

impl RecordingSession {
    /// Build encoders and audio, then start ticking.
    ///
    /// Only the absence of any video encoder (or an invalid configuration)
    /// fails the start; audio problems degrade to video-only.
    pub async fn start(
        backend: &dyn MediaBackend,
        config: SessionConfig,
        settings: &RecordingDefaults,
        events: EventBus,
    ) -> MosaicResult<Self> {
        let id = SessionId::new();
        tracing::info!(
            session = %id,
            backend = backend.name(),
            width = config.width,
            height = config.height,
            fps = config.fps,
            mic = config.capture_mic,
            system_audio = config.capture_system_audio,
            "Starting recording session"
        );
        events.emit(PipelineEvent::StateChanged {
            session: id,
            state: SessionState::Starting,
        });

        match Self::build(id, backend, config, settings, &events).await {
            Ok(mut session) => {
                session.transition(SessionState::Running);
                Ok(session)
            }
            Err(e) => {
                tracing::error!(session = %id, error = %e, "Recording session failed to start");
                events.emit(PipelineEvent::StateChanged {
                    session: id,
                    state: SessionState::Failed,
                });
                events.emit(PipelineEvent::SessionFailed {
                    session: id,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn build(
        id: SessionId,
        backend: &dyn MediaBackend,
        config: SessionConfig,
        settings: &RecordingDefaults,
        events: &EventBus,
    ) -> MosaicResult<Self> {
        if config.fps == 0 {
            return Err(MosaicError::config("frame rate must be at least 1"));
        }
        let compositor = FrameCompositor::new(config.width, config.height)?;
        let muxer = MuxerHandle::new(Muxer::new(WRITING_APP));

        let mut video_config = VideoEncoderConfig::from_defaults(VideoCodec::H264, config.width, config.height, settings);
        video_config.fps = config.fps;

        let pipeline = open_video_pipeline(backend, &video_config, &muxer, settings.stream_timeslice())?;
        let strategy = pipeline.strategy();
        let container = strategy.container();
        muxer.lock().set_video_track(
            container,
            VideoTrackInfo {
                codec: container.video_codec(),
                width: config.width,
                height: config.height,
                fps: config.fps,
            },
        )?;
        tracing::info!(
            session = %id,
            %strategy,
            encoder = %pipeline.descriptor().name,
            container = container.doc_type(),
            "Video encoder ready"
        );

        let clock = RecordingClock::start();

        let requested = AudioMix::from_flags(config.capture_mic, config.capture_system_audio);
        let audio = if requested.is_none() {
            None
        } else {
            start_audio(id, backend, requested, container, settings, &muxer, events).await
        };

        let pipeline: SharedPipeline = Arc::new(tokio::sync::Mutex::new(pipeline));
        let scheduler = FrameScheduler::start(SchedulerContext {
            session: id,
            clock: clock.clone(),
            interval: FrameInterval::from_fps(config.fps),
            keyframe_interval: settings.keyframe_interval,
            sources: config.sources,
            compositor,
            pipeline: pipeline.clone(),
            events: events.clone(),
            watchdog_period: settings.watchdog_period(),
            stall_factor: settings.stall_factor,
        });

        Ok(Self {
            id,
            state: SessionState::Starting,
            clock,
            settings: settings.clone(),
            events: events.clone(),
            muxer,
            pipeline,
            strategy,
            container,
            scheduler,
            audio,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn strategy(&self) -> EncoderStrategy {
        self.strategy
    }

    /// The mix actually recorded, which may be narrower than requested.
    pub fn audio_mix(&self) -> AudioMix {
        self.audio
            .as_ref()
            .map_or(AudioMix::None, |chain| chain.track.source_mix)
    }

    pub fn audio_track(&self) -> Option<AudioTrack> {
        self.audio.as_ref().map(|chain| chain.track)
    }

    pub fn status(&self) -> SessionStatus {
        let pacer = self.scheduler.pacer();
        let muxer = self.muxer.lock();
        SessionStatus {
            id: self.id,
            state: self.state,
            started_at: self.clock.epoch_wall().to_string(),
            elapsed_ms: self.clock.elapsed().as_millis() as u64,
            frames: pacer.frames(),
            dropped: pacer.dropped(),
            video_chunks: muxer.video_chunks(),
            audio_chunks: muxer.audio_chunks(),
            strategy: self.strategy,
            audio_mix: self.audio_mix(),
            encoding_halted: pacer.is_halted(),
        }
    }

    /// Halt ticks, flush both encoders, finalize the container, and persist it.
    ///
    /// Consumes the session, so finalize and persistence run at most once.
    pub async fn stop(mut self, sink: &dyn OutputSink) -> (MosaicResult<PathBuf>, SessionSummary) {
        self.transition(SessionState::Stopping);
        self.scheduler.cancel().await;
        let audio_mix = self.audio_mix();

        self.drain_video().await;
        self.drain_audio().await;

        let result = self.finalize_and_save(sink).await;
        let (path, error, duration) = match &result {
            Ok((path, duration)) => {
                tracing::info!(session = %self.id, path = %path.display(), "Recording saved");
                self.events.emit(PipelineEvent::RecordingSaved {
                    session: self.id,
                    path: path.clone(),
                });
                self.transition(SessionState::Completed);
                (Some(path.clone()), None, *duration)
            }
            Err(e) => {
                tracing::error!(session = %self.id, error = %e, "Recording session failed");
                self.transition(SessionState::Failed);
                self.events.emit(PipelineEvent::SessionFailed {
                    session: self.id,
                    message: e.to_string(),
                });
                (None, Some(e.to_string()), self.clock.elapsed())
            }
        };

        let counts = self.scheduler.pacer().counts();
        let summary = SessionSummary {
            id: self.id,
            state: self.state,
            frames: counts.frames,
            dropped: counts.dropped,
            video_chunks: self.muxer.video_chunks(),
            audio_chunks: self.muxer.audio_chunks(),
            duration_ms: duration.as_millis() as u64,
            strategy: self.strategy,
            container: self.container,
            audio_mix,
            path,
            error,
        };
        tracing::info!(
            session = %self.id,
            state = %summary.state,
            frames = summary.frames,
            dropped = summary.dropped,
            video_chunks = summary.video_chunks,
            audio_chunks = summary.audio_chunks,
            "Recording session ended"
        );

        (result.map(|(path, _)| path), summary)
    }

    /// Wait for the last encode, then flush the video encoder.
    async fn drain_video(&mut self) {
        let in_flight = self.scheduler.take_in_flight();
        let abort = in_flight.as_ref().map(|task| task.abort_handle());
        let pipeline = self.pipeline.clone();

        let drain = async move {
            if let Some(task) = in_flight {
                if let Err(e) = task.await {
                    tracing::warn!(error = %e, "Encode task ended abnormally");
                }
            }
            pipeline.lock().await.finish().await
        };

        match within(self.settings.flush_timeout(), drain).await {
            Some(Ok(())) => tracing::debug!(session = %self.id, "Video encoder flushed"),
            Some(Err(e)) => {
                tracing::warn!(session = %self.id, error = %e, "Video encoder flush failed");
                self.events.emit(PipelineEvent::EncoderError {
                    session: self.id,
                    message: e.to_string(),
                });
            }
            None => {
                if let Some(abort) = abort {
                    abort.abort();
                }
                self.pipeline.lock().await.abandon();
                let message = format!(
                    "video encoder flush did not finish within {} ms",
                    self.settings.flush_timeout_ms.unwrap_or_default()
                );
                tracing::warn!(session = %self.id, %message, "Abandoning video encoder flush");
                self.events.emit(PipelineEvent::EncoderError {
                    session: self.id,
                    message,
                });
            }
        }
    }

    /// Stop capture, let the mixer emit its last frame, and wait for the
    /// audio encoder to flush.
    async fn drain_audio(&mut self) {
        let Some(mut chain) = self.audio.take() else {
            return;
        };
        chain.sources.stop_all().await;

        let mixer_abort = chain.mixer.abort_handle();
        let encoder_abort = chain.encoder.abort_handle();
        let drain = async move { (chain.mixer.await, chain.encoder.await) };

        match within(self.settings.flush_timeout(), drain).await {
            Some((mixer, encoder)) => {
                match mixer {
                    Ok(stats) => tracing::debug!(
                        frames = stats.frames,
                        samples = stats.samples_per_channel,
                        "Audio mixer drained"
                    ),
                    Err(e) => tracing::warn!(error = %e, "Audio mixer ended abnormally"),
                }
                match encoder {
                    Ok(stats) => tracing::debug!(
                        frames = stats.frames_encoded,
                        failed = stats.failed,
                        "Audio encoder drained"
                    ),
                    Err(e) => tracing::warn!(error = %e, "Audio encoder ended abnormally"),
                }
            }
            None => {
                mixer_abort.abort();
                encoder_abort.abort();
                let message = format!(
                    "audio encoder flush did not finish within {} ms",
                    self.settings.flush_timeout_ms.unwrap_or_default()
                );
                tracing::warn!(session = %self.id, %message, "Abandoning audio encoder flush");
                self.events.emit(PipelineEvent::EncoderError {
                    session: self.id,
                    message,
                });
            }
        }
    }

    async fn finalize_and_save(&self, sink: &dyn OutputSink) -> MosaicResult<(PathBuf, Duration)> {
        let output = self.muxer.finalize()?;
        self.log_drift();

        let name = suggested_name(output.container, Local::now());
        let path = sink
            .save(&output.bytes, &name, output.container.mime_type())
            .await?;
        Ok((path, output.duration))
    }

    /// A/V drift is measured, never corrected.
    fn log_drift(&self) {
        let (video_end, audio_end) = self.muxer.lock().stream_ends();
        let (Some(video), Some(audio)) = (video_end, audio_end) else {
            return;
        };
        let measurement = DriftMeasurement {
            reference_ns: video.as_nanos() as u64,
            measured_ns: audio.as_nanos() as u64,
        };
        let drift_ms = measurement.drift_ms();
        if measurement.exceeds_threshold_ms(DRIFT_WARN_MS) {
            tracing::warn!(session = %self.id, drift_ms, "Audio/video drift exceeds 100ms");
        } else {
            tracing::info!(session = %self.id, drift_ms, "Audio/video drift within threshold");
        }
    }

    fn transition(&mut self, next: SessionState) {
        if !self.state.can_transition_to(next) {
            tracing::warn!(session = %self.id, from = %self.state, to = %next, "Ignoring illegal state transition");
            return;
        }
        tracing::info!(session = %self.id, from = %self.state, to = %next, "Session state changed");
        self.state = next;
        self.events.emit(PipelineEvent::StateChanged {
            session: self.id,
            state: next,
        });
    }
}

/// Choose the video strategy once: per-frame if the backend can build it,
/// otherwise the continuous stream.
fn open_video_pipeline(
    backend: &dyn MediaBackend,
    config: &VideoEncoderConfig,
    muxer: &MuxerHandle,
    timeslice: Duration,
) -> MosaicResult<VideoPipeline> {
    let primary = match backend.frame_encoder(config, muxer.chunk_sink()) {
        Ok(encoder) => return Ok(VideoPipeline::per_frame(encoder)),
        Err(e) => e,
    };
    tracing::warn!(error = %primary, "Per-frame encoder unavailable, falling back to stream capture");

    let fallback_config = config.with_codec(EncoderStrategy::Stream.container().video_codec());
    let encoder = backend.stream_encoder(&fallback_config).map_err(|fallback| {
        MosaicError::encoder_init(format!(
            "no video encoder available (per-frame: {primary}; stream: {fallback})"
        ))
    })?;

    Ok(VideoPipeline::stream(StreamCaptureEncoder::start(
        encoder,
        fallback_config.fps,
        timeslice,
        muxer.chunk_sink(),
    )))
}

/// Acquire the requested sources and wire mixer and encoder. Returns `None`
/// (video-only) when nothing could be acquired or no encoder exists.
async fn start_audio(
    session: SessionId,
    backend: &dyn MediaBackend,
    requested: AudioMix,
    container: ContainerFormat,
    settings: &RecordingDefaults,
    muxer: &MuxerHandle,
    events: &EventBus,
) -> Option<AudioChain> {
    let format = AudioFormat::new(settings.audio_sample_rate, settings.audio_channels.max(1));
    let (block_tx, block_rx) = mpsc::channel(AUDIO_BLOCK_QUEUE);

    let candidates = requested
        .requested()
        .into_iter()
        .map(|kind| (kind, backend.audio_source(kind, format)))
        .collect();
    let mut acquired = acquire_sources(candidates, &block_tx).await;
    drop(block_tx);

    if acquired.is_empty() {
        tracing::info!(session = %session, ?requested, "No audio source acquired, recording video only");
        return None;
    }

    let mixer = AudioMixer::new(MixerConfig::from_defaults(settings), &acquired.kinds());
    let track = mixer.track();
    let encoder_config = AudioEncoderConfig {
        codec: container.audio_codec(),
        sample_rate: track.sample_rate,
        channels: track.channel_count,
        bitrate_kbps: settings.quality.audio_bitrate_kbps(),
    };

    let encoder = match backend.audio_encoder(&encoder_config, muxer.chunk_sink()) {
        Ok(encoder) => encoder,
        Err(e) => {
            tracing::warn!(session = %session, error = %e, "Audio encoder unavailable, recording video only");
            acquired.stop_all().await;
            return None;
        }
    };

    muxer.lock().set_audio_track(AudioTrackInfo {
        codec: encoder_config.codec,
        sample_rate: encoder_config.sample_rate,
        channels: encoder_config.channels,
    });

    let (frame_tx, frame_rx) = mpsc::channel(AUDIO_FRAME_QUEUE);
    let mixer = spawn_mixer(mixer, block_rx, frame_tx);

    let error_events = events.clone();
    let on_error: ErrorCallback = Arc::new(move |e: MosaicError| {
        error_events.emit(PipelineEvent::EncoderError {
            session,
            message: e.to_string(),
        });
    });
    let encoder = spawn_audio_encoder(encoder, frame_rx, on_error);

    tracing::info!(
        session = %session,
        mix = ?track.source_mix,
        sample_rate = track.sample_rate,
        channels = track.channel_count,
        codec = ?encoder_config.codec,
        "Audio track ready"
    );

    Some(AudioChain {
        sources: acquired,
        mixer,
        encoder,
        track,
    })
}

async fn within<F: Future>(limit: Option<Duration>, work: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, work).await.ok(),
        None => Some(work.await),
    }
}
