#![allow(dead_code)]

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use mosaic_audio::{AudioSource, ToneSource};
use mosaic_codec::{AudioEncoder, ChunkCallback, FrameEncoder, OutputSink, ProbeReport, StreamEncoder};
use mosaic_common::config::RecordingDefaults;
use mosaic_common::{MosaicError, MosaicResult};
use mosaic_compositor::SourceRegistry;
use mosaic_media_model::{
    AudioEncoderConfig, AudioFormat, AudioSourceKind, CompositeFrame, EncodedChunk, EncoderCodec, EncoderDescriptor,
    FrameSource, RawAudioFrame, SectionSource, SourceFrame, VideoCodec, VideoEncoderConfig,
};
use mosaic_recorder::{MediaBackend, PipelineEvent, Recorder, SessionConfig};

pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 48;
pub const FPS: u32 = 10;

/// Open/closed switch every mock encode waits on.
#[derive(Clone)]
pub struct Gate {
    tx: Arc<watch::Sender<bool>>,
}

impl Gate {
    pub fn new(open: bool) -> Self {
        let (tx, _) = watch::channel(open);
        Self { tx: Arc::new(tx) }
    }

    pub fn set_open(&self, open: bool) {
        self.tx.send_replace(open);
    }

    async fn pass(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }
}

#[derive(Default, Clone)]
pub struct MockOptions {
    pub primary_fails: bool,
    pub stream_fails: bool,
    pub mic_fails: bool,
    pub system_fails: bool,
    pub audio_encoder_fails: bool,
    /// 1-based encode call that fails.
    pub fail_encode_at: Option<u64>,
    pub encode_delay: Option<Duration>,
    pub hang_flush: bool,
}

/// Frames seen by the per-frame encoder, with their keyframe flag.
pub type EncodedLog = Arc<Mutex<Vec<(CompositeFrame, bool)>>>;

pub struct MockBackend {
    options: MockOptions,
    pub gate: Gate,
    pub encoded: EncodedLog,
    pub stream_pushes: Arc<AtomicU64>,
}

impl MockBackend {
    pub fn new(options: MockOptions) -> Self {
        Self {
            options,
            gate: Gate::new(true),
            encoded: Arc::new(Mutex::new(Vec::new())),
            stream_pushes: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn encoded(&self) -> Vec<(CompositeFrame, bool)> {
        self.encoded.lock().unwrap().clone()
    }
}

fn video_descriptor(codec: VideoCodec) -> EncoderDescriptor {
    EncoderDescriptor {
        name: format!("mock {codec:?}"),
        element: "mockenc".into(),
        codec: EncoderCodec::Video(codec),
        hardware: false,
    }
}

impl MediaBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn frame_encoder(&self, config: &VideoEncoderConfig, output: ChunkCallback) -> MosaicResult<Box<dyn FrameEncoder>> {
        if self.options.primary_fails {
            return Err(MosaicError::encoder_init("mock per-frame encoder unavailable"));
        }
        Ok(Box::new(MockFrameEncoder {
            descriptor: video_descriptor(config.codec),
            period: Duration::from_millis(1000 / u64::from(config.fps)),
            output,
            gate: self.gate.clone(),
            log: self.encoded.clone(),
            calls: 0,
            fail_at: self.options.fail_encode_at,
            delay: self.options.encode_delay,
            hang_flush: self.options.hang_flush,
        }))
    }

    fn stream_encoder(&self, config: &VideoEncoderConfig) -> MosaicResult<Box<dyn StreamEncoder>> {
        if self.options.stream_fails {
            return Err(MosaicError::encoder_init("mock stream encoder unavailable"));
        }
        Ok(Box::new(MockStreamEncoder {
            descriptor: video_descriptor(config.codec),
            period: Duration::from_millis(1000 / u64::from(config.fps)),
            pending: Vec::new(),
            emitted: 0,
            pushes: self.stream_pushes.clone(),
        }))
    }

    fn audio_encoder(&self, config: &AudioEncoderConfig, output: ChunkCallback) -> MosaicResult<Box<dyn AudioEncoder>> {
        if self.options.audio_encoder_fails {
            return Err(MosaicError::encoder_init("mock audio encoder unavailable"));
        }
        Ok(Box::new(MockAudioEncoder {
            descriptor: EncoderDescriptor {
                name: "mock audio".into(),
                element: "mockaudioenc".into(),
                codec: EncoderCodec::Audio(config.codec),
                hardware: false,
            },
            output,
            first: true,
        }))
    }

    fn audio_source(&self, kind: AudioSourceKind, format: AudioFormat) -> MosaicResult<Box<dyn AudioSource>> {
        let denied = match kind {
            AudioSourceKind::Microphone => self.options.mic_fails,
            AudioSourceKind::System => self.options.system_fails,
        };
        if denied {
            return Err(MosaicError::audio_acquisition(format!("{kind:?} permission denied")));
        }
        Ok(Box::new(ToneSource::new(kind, format, 440.0)))
    }

    fn capabilities(&self) -> ProbeReport {
        ProbeReport::collect("mock", |_| true)
    }
}

struct MockFrameEncoder {
    descriptor: EncoderDescriptor,
    period: Duration,
    output: ChunkCallback,
    gate: Gate,
    log: EncodedLog,
    calls: u64,
    fail_at: Option<u64>,
    delay: Option<Duration>,
    hang_flush: bool,
}

#[async_trait]
impl FrameEncoder for MockFrameEncoder {
    fn descriptor(&self) -> &EncoderDescriptor {
        &self.descriptor
    }

    async fn encode(&mut self, frame: &CompositeFrame, keyframe: bool) -> MosaicResult<()> {
        self.gate.pass().await;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls += 1;
        if Some(self.calls) == self.fail_at {
            return Err(MosaicError::encode("mock encoder fault"));
        }
        self.log.lock().unwrap().push((frame.clone(), keyframe));
        let mut chunk = EncodedChunk::video(vec![0x65; 16], frame.timestamp, self.period, keyframe);
        if self.calls == 1 {
            chunk = chunk.with_decoder_config(vec![1, 0x64, 0, 0x1f]);
        }
        (self.output)(chunk);
        Ok(())
    }

    async fn flush(&mut self) -> MosaicResult<()> {
        if self.hang_flush {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

struct MockStreamEncoder {
    descriptor: EncoderDescriptor,
    period: Duration,
    pending: Vec<Duration>,
    emitted: u64,
    pushes: Arc<AtomicU64>,
}

impl MockStreamEncoder {
    fn take(&mut self) -> Vec<EncodedChunk> {
        let period = self.period;
        let chunks: Vec<_> = self
            .pending
            .drain(..)
            .enumerate()
            .map(|(i, ts)| EncodedChunk::video(vec![0x9d; 12], ts, period, self.emitted + i as u64 == 0))
            .collect();
        self.emitted += chunks.len() as u64;
        chunks
    }
}

#[async_trait]
impl StreamEncoder for MockStreamEncoder {
    fn descriptor(&self) -> &EncoderDescriptor {
        &self.descriptor
    }

    async fn push(&mut self, frame: &CompositeFrame) -> MosaicResult<()> {
        self.pushes.fetch_add(1, Ordering::Relaxed);
        self.pending.push(frame.timestamp);
        Ok(())
    }

    async fn drain(&mut self) -> MosaicResult<Vec<EncodedChunk>> {
        Ok(self.take())
    }

    async fn finish(&mut self) -> MosaicResult<Vec<EncodedChunk>> {
        Ok(self.take())
    }
}

struct MockAudioEncoder {
    descriptor: EncoderDescriptor,
    output: ChunkCallback,
    first: bool,
}

#[async_trait]
impl AudioEncoder for MockAudioEncoder {
    fn descriptor(&self) -> &EncoderDescriptor {
        &self.descriptor
    }

    async fn encode(&mut self, frame: &RawAudioFrame) -> MosaicResult<()> {
        let mut chunk = EncodedChunk::audio(vec![0x21; 8], frame.timestamp, frame.duration());
        if std::mem::take(&mut self.first) {
            chunk = chunk.with_decoder_config(vec![0x11, 0x90]);
        }
        (self.output)(chunk);
        Ok(())
    }

    async fn flush(&mut self) -> MosaicResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SavedFile {
    pub bytes: Vec<u8>,
    pub name: String,
    pub mime_type: String,
}

#[derive(Default)]
pub struct MockSink {
    pub fail: Option<io::ErrorKind>,
    saved: Mutex<Vec<SavedFile>>,
}

impl MockSink {
    pub fn failing(kind: io::ErrorKind) -> Self {
        Self {
            fail: Some(kind),
            saved: Mutex::new(Vec::new()),
        }
    }

    pub fn saved(&self) -> Vec<SavedFile> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl OutputSink for MockSink {
    async fn save(&self, bytes: &[u8], suggested_name: &str, mime_type: &str) -> io::Result<PathBuf> {
        if let Some(kind) = self.fail {
            return Err(io::Error::new(kind, "disk is read-only"));
        }
        self.saved.lock().unwrap().push(SavedFile {
            bytes: bytes.to_vec(),
            name: suggested_name.to_string(),
            mime_type: mime_type.to_string(),
        });
        Ok(PathBuf::from("/recordings").join(suggested_name))
    }
}

pub struct Harness {
    pub recorder: Recorder,
    pub backend: Arc<MockBackend>,
    pub sink: Arc<MockSink>,
    pub registry: Arc<SourceRegistry>,
    pub events: broadcast::Receiver<PipelineEvent>,
}

impl Harness {
    pub fn new(options: MockOptions) -> Self {
        Self::with(options, MockSink::default(), settings())
    }

    pub fn with(options: MockOptions, sink: MockSink, settings: RecordingDefaults) -> Self {
        let backend = Arc::new(MockBackend::new(options));
        let sink = Arc::new(sink);
        let recorder = Recorder::new(backend.clone(), sink.clone(), settings);
        let events = recorder.subscribe();
        Self {
            recorder,
            backend,
            sink,
            registry: Arc::new(SourceRegistry::new()),
            events,
        }
    }

    pub fn config(&self, capture_mic: bool, capture_system_audio: bool) -> SessionConfig {
        SessionConfig {
            sources: self.registry.clone(),
            width: WIDTH,
            height: HEIGHT,
            fps: FPS,
            capture_mic,
            capture_system_audio,
        }
    }

    /// Every event received so far.
    pub fn events(&mut self) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn settings() -> RecordingDefaults {
    RecordingDefaults {
        fps: FPS,
        width: WIDTH,
        height: HEIGHT,
        ..RecordingDefaults::default()
    }
}

pub async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Pixel at the centre of quadrant `index` (row-major, 0 = top-left).
pub fn quadrant_centre(frame: &CompositeFrame, index: usize) -> [u8; 4] {
    let x = if index % 2 == 0 { frame.width / 4 } else { frame.width * 3 / 4 };
    let y = if index < 2 { frame.height / 4 } else { frame.height * 3 / 4 };
    frame.pixel(x, y).unwrap()
}

/// Feed that always returns the same frame.
pub struct StillFeed(pub SourceFrame);

impl FrameSource for StillFeed {
    fn label(&self) -> &str {
        "still"
    }

    fn current_frame(&self) -> Option<SourceFrame> {
        Some(self.0.clone())
    }
}

/// Sized to one quadrant, so it is blitted without scaling.
pub fn solid_feed(rgba: [u8; 4]) -> SectionSource {
    SectionSource::LiveFeed(Arc::new(StillFeed(SourceFrame::solid(WIDTH / 2, HEIGHT / 2, rgba))))
}

/// A frame whose buffer is shorter than its dimensions claim.
pub fn truncated_feed() -> SectionSource {
    SectionSource::LiveFeed(Arc::new(StillFeed(SourceFrame::new(8, 8, vec![0u8; 10]))))
}
