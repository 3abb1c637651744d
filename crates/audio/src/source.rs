//! Audio capture sources and acquisition.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use mosaic_common::{MosaicError, MosaicResult};
use mosaic_media_model::{AudioBlock, AudioFormat, AudioSourceKind};

/// A capture device delivering interleaved blocks.
///
/// `start` begins delivery into `sender`; the source keeps its clone of the
/// sender until `stop`, so the mixer sees end-of-stream once every started
/// source has stopped.
#[async_trait]
pub trait AudioSource: Send + Sync {
    fn kind(&self) -> AudioSourceKind;

    /// Native format of delivered blocks.
    fn format(&self) -> AudioFormat;

    async fn start(&self, sender: mpsc::Sender<AudioBlock>) -> MosaicResult<()>;

    async fn stop(&self) -> MosaicResult<()>;
}

/// Sources that started successfully.
#[derive(Default)]
pub struct AcquiredAudio {
    pub sources: Vec<Box<dyn AudioSource>>,
    /// Requested sources that could not be opened or started.
    pub failures: Vec<(AudioSourceKind, MosaicError)>,
}

impl AcquiredAudio {
    pub fn kinds(&self) -> Vec<AudioSourceKind> {
        self.sources.iter().map(|s| s.kind()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Stop every source. Failures are logged; stopping never fails the session.
    pub async fn stop_all(&mut self) {
        for source in self.sources.drain(..) {
            if let Err(e) = source.stop().await {
                tracing::warn!(kind = ?source.kind(), error = %e, "Audio source failed to stop cleanly");
            }
        }
    }
}

/// Start each opened source, keeping those that succeed.
///
/// Failure to open or start a source is never fatal: the session continues
/// with whatever was acquired, or without audio.
pub async fn acquire_sources(
    candidates: Vec<(AudioSourceKind, MosaicResult<Box<dyn AudioSource>>)>,
    sender: &mpsc::Sender<AudioBlock>,
) -> AcquiredAudio {
    let mut acquired = AcquiredAudio::default();

    for (kind, opened) in candidates {
        let started = match opened {
            Ok(source) => match source.start(sender.clone()).await {
                Ok(()) => Ok(source),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        match started {
            Ok(source) => {
                let format = source.format();
                tracing::info!(
                    ?kind,
                    sample_rate = format.sample_rate,
                    channels = format.channels,
                    "Audio source acquired"
                );
                acquired.sources.push(source);
            }
            Err(e) => {
                tracing::warn!(?kind, error = %e, "Audio source unavailable, continuing without it");
                acquired.failures.push((kind, e));
            }
        }
    }

    acquired
}

/// Synthetic sine source, used for pipeline checks without a capture device.
pub struct ToneSource {
    kind: AudioSourceKind,
    format: AudioFormat,
    frequency: f32,
    amplitude: f32,
    block: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ToneSource {
    pub fn new(kind: AudioSourceKind, format: AudioFormat, frequency: f32) -> Self {
        Self {
            kind,
            format,
            frequency,
            amplitude: 0.25,
            block: Duration::from_millis(20),
            task: Mutex::new(None),
        }
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    pub fn with_block(mut self, block: Duration) -> Self {
        self.block = block.max(Duration::from_millis(1));
        self
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl AudioSource for ToneSource {
    fn kind(&self) -> AudioSourceKind {
        self.kind
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    async fn start(&self, sender: mpsc::Sender<AudioBlock>) -> MosaicResult<()> {
        let mut slot = self.slot();
        if slot.is_some() {
            return Err(MosaicError::audio_acquisition("tone source already started"));
        }

        let kind = self.kind;
        let format = self.format;
        let channels = usize::from(format.channels.max(1));
        let frames_per_block =
            (u64::from(format.sample_rate) * self.block.as_micros() as u64 / 1_000_000) as usize;
        let step = std::f32::consts::TAU * self.frequency / format.sample_rate.max(1) as f32;
        let amplitude = self.amplitude;
        let block = self.block;

        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(block);
            let mut phase = 0.0f32;
            loop {
                ticker.tick().await;
                let mut samples = Vec::with_capacity(frames_per_block * channels);
                for _ in 0..frames_per_block {
                    let value = phase.sin() * amplitude;
                    phase = (phase + step) % std::f32::consts::TAU;
                    samples.extend(std::iter::repeat(value).take(channels));
                }
                let block = AudioBlock {
                    source: kind,
                    format,
                    samples,
                };
                if sender.send(block).await.is_err() {
                    break;
                }
            }
        }));
        Ok(())
    }

    async fn stop(&self) -> MosaicResult<()> {
        if let Some(task) = self.slot().take() {
            task.abort();
        }
        Ok(())
    }
}
