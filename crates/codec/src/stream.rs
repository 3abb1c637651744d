//! Continuous-stream fallback.
//!
//! The scheduler publishes each composited frame to a shared surface. A
//! capture task samples that surface at the target rate, feeds new frames to
//! the [`StreamEncoder`], and hands its batched output to the muxer once per
//! timeslice.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use mosaic_common::{MosaicError, MosaicResult};
use mosaic_media_model::{CompositeFrame, EncodedChunk, EncoderDescriptor};

use crate::video::{ChunkCallback, StreamEncoder};

#[derive(Default)]
struct SurfaceState {
    frame: Option<CompositeFrame>,
    generation: u64,
    captured: u64,
}

/// Latest composited frame plus a generation counter, so the capture side
/// never feeds the same frame twice.
#[derive(Default)]
struct Surface {
    state: Mutex<SurfaceState>,
}

impl Surface {
    fn lock(&self) -> MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, frame: CompositeFrame) {
        let mut state = self.lock();
        state.frame = Some(frame);
        state.generation += 1;
    }

    fn take_new(&self) -> Option<CompositeFrame> {
        let mut state = self.lock();
        if state.generation == state.captured {
            return None;
        }
        state.captured = state.generation;
        state.frame.clone()
    }
}

type SharedEncoder = Arc<tokio::sync::Mutex<Box<dyn StreamEncoder>>>;
type Failure = Arc<Mutex<Option<String>>>;

pub struct StreamCaptureEncoder {
    descriptor: EncoderDescriptor,
    surface: Arc<Surface>,
    encoder: SharedEncoder,
    failure: Failure,
    output: ChunkCallback,
    delivered: Arc<AtomicU64>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl StreamCaptureEncoder {
    /// Start capturing at `fps`, delivering output every `timeslice`.
    pub fn start(encoder: Box<dyn StreamEncoder>, fps: u32, timeslice: Duration, output: ChunkCallback) -> Self {
        let descriptor = encoder.descriptor().clone();
        let surface = Arc::new(Surface::default());
        let encoder: SharedEncoder = Arc::new(tokio::sync::Mutex::new(encoder));
        let failure: Failure = Arc::new(Mutex::new(None));
        let delivered = Arc::new(AtomicU64::new(0));
        let (stop_tx, stop_rx) = oneshot::channel();

        let period = Duration::from_millis(1000 / u64::from(fps.max(1))).max(Duration::from_millis(1));
        let timeslice = timeslice.max(period);

        tracing::info!(
            encoder = %descriptor.name,
            fps,
            timeslice_ms = timeslice.as_millis() as u64,
            "Starting continuous-stream capture"
        );

        let task = tokio::spawn(capture_loop(CaptureLoop {
            surface: surface.clone(),
            encoder: encoder.clone(),
            failure: failure.clone(),
            output: output.clone(),
            delivered: delivered.clone(),
            period,
            timeslice,
            stop: stop_rx,
        }));

        Self {
            descriptor,
            surface,
            encoder,
            failure,
            output,
            delivered,
            stop: Some(stop_tx),
            task: Some(task),
        }
    }

    pub fn descriptor(&self) -> &EncoderDescriptor {
        &self.descriptor
    }

    /// Chunks handed to the output callback so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Publish a freshly composited frame to the capture surface.
    pub fn submit(&mut self, frame: &CompositeFrame) -> MosaicResult<()> {
        if let Some(message) = self.failure_message() {
            return Err(MosaicError::encode(message));
        }
        self.surface.publish(frame.clone());
        Ok(())
    }

    /// Stop capturing, feed any frame the capture task had not seen yet, and
    /// deliver the encoder's remaining output.
    pub async fn finish(&mut self) -> MosaicResult<()> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Stream capture task ended abnormally");
            }
        }

        if let Some(message) = self.failure_message() {
            return Err(MosaicError::encode(message));
        }

        let mut encoder = self.encoder.lock().await;
        if let Some(frame) = self.surface.take_new() {
            encoder.push(&frame).await?;
        }
        let remaining = encoder.finish().await?;
        deliver(&self.output, &self.delivered, remaining);
        Ok(())
    }

    fn failure_message(&self) -> Option<String> {
        self.failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Drop for StreamCaptureEncoder {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct CaptureLoop {
    surface: Arc<Surface>,
    encoder: SharedEncoder,
    failure: Failure,
    output: ChunkCallback,
    delivered: Arc<AtomicU64>,
    period: Duration,
    timeslice: Duration,
    stop: oneshot::Receiver<()>,
}

async fn capture_loop(mut ctx: CaptureLoop) {
    let start = Instant::now();
    let mut capture = interval_at(start + ctx.period, ctx.period);
    capture.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut slice = interval_at(start + ctx.timeslice, ctx.timeslice);
    slice.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let step = tokio::select! {
            _ = &mut ctx.stop => break,
            _ = capture.tick() => match ctx.surface.take_new() {
                Some(frame) => ctx.encoder.lock().await.push(&frame).await,
                None => Ok(()),
            },
            _ = slice.tick() => {
                let drained = ctx.encoder.lock().await.drain().await;
                drained.map(|chunks| deliver(&ctx.output, &ctx.delivered, chunks))
            }
        };

        if let Err(e) = step {
            tracing::error!(error = %e, "Stream encoder failed, capture stopped");
            *ctx.failure.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(e.to_string());
            break;
        }
    }
}

fn deliver(output: &ChunkCallback, delivered: &AtomicU64, chunks: Vec<EncodedChunk>) {
    if chunks.is_empty() {
        return;
    }
    tracing::trace!(chunks = chunks.len(), "Delivering stream batch");
    delivered.fetch_add(chunks.len() as u64, Ordering::Relaxed);
    for chunk in chunks {
        output(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mosaic_media_model::{EncoderCodec, VideoCodec};

    struct Batching {
        descriptor: EncoderDescriptor,
        pending: Vec<EncodedChunk>,
        pushed: Arc<AtomicU64>,
        fail_on_push: bool,
    }

    impl Batching {
        fn new(pushed: Arc<AtomicU64>, fail_on_push: bool) -> Self {
            Self {
                descriptor: EncoderDescriptor {
                    name: "batching".into(),
                    element: "vp8enc".into(),
                    codec: EncoderCodec::Video(VideoCodec::Vp8),
                    hardware: false,
                },
                pending: Vec::new(),
                pushed,
                fail_on_push,
            }
        }
    }

    #[async_trait]
    impl StreamEncoder for Batching {
        fn descriptor(&self) -> &EncoderDescriptor {
            &self.descriptor
        }

        async fn push(&mut self, frame: &CompositeFrame) -> MosaicResult<()> {
            if self.fail_on_push {
                return Err(MosaicError::encode("stream encoder crashed"));
            }
            let first = self.pushed.fetch_add(1, Ordering::SeqCst) == 0;
            self.pending.push(EncodedChunk::video(
                vec![1, 2, 3],
                frame.timestamp,
                Duration::from_millis(100),
                first,
            ));
            Ok(())
        }

        async fn drain(&mut self) -> MosaicResult<Vec<EncodedChunk>> {
            Ok(std::mem::take(&mut self.pending))
        }

        async fn finish(&mut self) -> MosaicResult<Vec<EncodedChunk>> {
            Ok(std::mem::take(&mut self.pending))
        }
    }

    fn collector() -> (ChunkCallback, Arc<Mutex<Vec<EncodedChunk>>>) {
        let store = Arc::new(Mutex::new(Vec::new()));
        let sink = store.clone();
        let callback: ChunkCallback = Arc::new(move |chunk| sink.lock().unwrap().push(chunk));
        (callback, store)
    }

    fn frame(ms: u64) -> CompositeFrame {
        CompositeFrame::new(2, 2, vec![0u8; 16], Duration::from_millis(ms))
    }

    #[tokio::test(start_paused = true)]
    async fn output_is_delivered_per_timeslice() {
        let pushed = Arc::new(AtomicU64::new(0));
        let (callback, store) = collector();
        let mut stream = StreamCaptureEncoder::start(
            Box::new(Batching::new(pushed.clone(), false)),
            10,
            Duration::from_millis(500),
            callback,
        );

        stream.submit(&frame(0)).unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(pushed.load(Ordering::SeqCst), 1);
        assert!(store.lock().unwrap().is_empty());

        stream.submit(&frame(150)).unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(store.lock().unwrap().len(), 2);

        stream.finish().await.unwrap();
        assert_eq!(stream.delivered(), 2);
        assert!(store.lock().unwrap()[0].is_keyframe);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_surface_is_not_recaptured() {
        let pushed = Arc::new(AtomicU64::new(0));
        let (callback, store) = collector();
        let mut stream = StreamCaptureEncoder::start(
            Box::new(Batching::new(pushed.clone(), false)),
            30,
            Duration::from_secs(1),
            callback,
        );

        stream.submit(&frame(0)).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(pushed.load(Ordering::SeqCst), 1);

        stream.submit(&frame(500)).unwrap();
        stream.finish().await.unwrap();
        assert_eq!(pushed.load(Ordering::SeqCst), 2);
        assert_eq!(store.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn background_failure_surfaces_on_next_submit() {
        let pushed = Arc::new(AtomicU64::new(0));
        let (callback, _store) = collector();
        let mut stream = StreamCaptureEncoder::start(
            Box::new(Batching::new(pushed, true)),
            10,
            Duration::from_secs(1),
            callback,
        );

        stream.submit(&frame(0)).unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(matches!(
            stream.submit(&frame(150)),
            Err(MosaicError::Encode { .. })
        ));
        assert!(stream.finish().await.is_err());
    }
}
