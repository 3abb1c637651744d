//! Capture devices: default microphone and system loopback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use gstreamer as gst;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use mosaic_audio::AudioSource;
use mosaic_common::{MosaicError, MosaicResult};
use mosaic_media_model::{AudioBlock, AudioFormat, AudioSourceKind};

use super::audio::raw_audio_caps;
use super::pipeline::AppPipeline;

const PULL_TIMEOUT_MS: u64 = 100;

/// Capture element for each source kind.
pub(crate) fn capture_element(kind: AudioSourceKind) -> &'static str {
    match kind {
        AudioSourceKind::Microphone => "autoaudiosrc",
        AudioSourceKind::System => "pulsesrc device=@DEFAULT_MONITOR@",
    }
}

fn launch_line(kind: AudioSourceKind, format: AudioFormat) -> String {
    format!(
        "{source} ! audioconvert ! audioresample ! {caps} ! appsink name=sink sync=false max-buffers=64",
        source = capture_element(kind),
        caps = raw_audio_caps(format.sample_rate, format.channels),
    )
}

struct Running {
    pipeline: Arc<AppPipeline>,
    stop: Arc<AtomicBool>,
    reader: JoinHandle<u64>,
}

/// Delivers blocks already converted to the session format.
pub struct GstAudioSource {
    kind: AudioSourceKind,
    format: AudioFormat,
    running: Mutex<Option<Running>>,
}

impl GstAudioSource {
    pub fn new(kind: AudioSourceKind, format: AudioFormat) -> Self {
        Self {
            kind,
            format,
            running: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl AudioSource for GstAudioSource {
    fn kind(&self) -> AudioSourceKind {
        self.kind
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    async fn start(&self, sender: mpsc::Sender<AudioBlock>) -> MosaicResult<()> {
        let pipeline = AppPipeline::from_launch(format!("{:?}", self.kind).to_lowercase(), &launch_line(self.kind, self.format))
            .map_err(|e| MosaicError::audio_acquisition(e.to_string()))?;
        pipeline
            .play()
            .map_err(|e| MosaicError::audio_acquisition(e.to_string()))?;
        if let Some(message) = pipeline.pending_error() {
            return Err(MosaicError::audio_acquisition(message));
        }

        let pipeline = Arc::new(pipeline);
        let stop = Arc::new(AtomicBool::new(false));
        let kind = self.kind;
        let format = self.format;
        let reader = {
            let pipeline = pipeline.clone();
            let stop = stop.clone();
            tokio::task::spawn_blocking(move || {
                let appsink = pipeline.appsink();
                let mut blocks = 0u64;
                while !stop.load(Ordering::Acquire) {
                    let Some(sample) = appsink.try_pull_sample(gst::ClockTime::from_mseconds(PULL_TIMEOUT_MS)) else {
                        if appsink.is_eos() {
                            break;
                        }
                        continue;
                    };
                    let Some(samples) = sample.buffer().and_then(|b| b.map_readable().ok()).map(|map| {
                        map.as_slice()
                            .chunks_exact(4)
                            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                            .collect::<Vec<f32>>()
                    }) else {
                        continue;
                    };
                    if sender.blocking_send(AudioBlock { source: kind, format, samples }).is_err() {
                        break;
                    }
                    blocks += 1;
                }
                blocks
            })
        };

        *self.slot() = Some(Running { pipeline, stop, reader });
        Ok(())
    }

    async fn stop(&self) -> MosaicResult<()> {
        let Some(running) = self.slot().take() else {
            return Ok(());
        };
        running.stop.store(true, Ordering::Release);
        let blocks = running
            .reader
            .await
            .map_err(|e| MosaicError::audio_acquisition(format!("capture reader failed: {e}")))?;
        running.pipeline.shutdown();
        tracing::debug!(kind = ?self.kind, blocks, "Audio capture stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_audio_reads_the_default_monitor() {
        let line = launch_line(AudioSourceKind::System, AudioFormat::new(48000, 2));
        assert!(line.starts_with("pulsesrc device=@DEFAULT_MONITOR@"));
        assert!(line.contains("format=F32LE"));
    }
}
