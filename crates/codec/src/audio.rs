//! Audio encoder seam and its consuming task.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use mosaic_common::MosaicResult;
use mosaic_media_model::{EncoderDescriptor, RawAudioFrame};

use crate::video::ErrorCallback;

/// Encodes mixed audio frames. Output goes through the chunk callback the
/// encoder was created with.
#[async_trait]
pub trait AudioEncoder: Send {
    fn descriptor(&self) -> &EncoderDescriptor;

    async fn encode(&mut self, frame: &RawAudioFrame) -> MosaicResult<()>;

    async fn flush(&mut self) -> MosaicResult<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioEncoderStats {
    pub frames_encoded: u64,
    /// Whether encoding stopped early because of an encoder error.
    pub failed: bool,
}

pub type AudioEncoderHandle = JoinHandle<AudioEncoderStats>;

/// Consume mixed frames until the mixer closes the channel, then flush.
///
/// An encode error is reported once through `on_error` and ends encoding for
/// the session; chunks already delivered stay muxed.
pub fn spawn_audio_encoder(
    mut encoder: Box<dyn AudioEncoder>,
    mut frames: mpsc::Receiver<RawAudioFrame>,
    on_error: ErrorCallback,
) -> AudioEncoderHandle {
    tokio::spawn(async move {
        let mut stats = AudioEncoderStats::default();
        tracing::debug!(encoder = %encoder.descriptor().name, "Audio encoder running");

        while let Some(frame) = frames.recv().await {
            if let Err(e) = encoder.encode(&frame).await {
                tracing::error!(error = %e, frames = stats.frames_encoded, "Audio encoding failed");
                on_error(e);
                stats.failed = true;
                return stats;
            }
            stats.frames_encoded += 1;
        }

        if let Err(e) = encoder.flush().await {
            tracing::error!(error = %e, "Audio encoder flush failed");
            on_error(e);
            stats.failed = true;
        }
        stats
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use mosaic_common::MosaicError;
    use mosaic_media_model::{AudioCodec, EncodedChunk, EncoderCodec};

    use crate::video::ChunkCallback;

    struct Counting {
        descriptor: EncoderDescriptor,
        output: ChunkCallback,
        fail_after: Option<u64>,
        encoded: u64,
        flushed: Arc<Mutex<bool>>,
    }

    #[async_trait]
    impl AudioEncoder for Counting {
        fn descriptor(&self) -> &EncoderDescriptor {
            &self.descriptor
        }

        async fn encode(&mut self, frame: &RawAudioFrame) -> MosaicResult<()> {
            if Some(self.encoded) == self.fail_after {
                return Err(MosaicError::encode("codec rejected frame"));
            }
            self.encoded += 1;
            (self.output)(EncodedChunk::audio(vec![0xAA], frame.timestamp, frame.duration()));
            Ok(())
        }

        async fn flush(&mut self) -> MosaicResult<()> {
            *self.flushed.lock().unwrap() = true;
            Ok(())
        }
    }

    fn encoder(fail_after: Option<u64>) -> (Counting, Arc<Mutex<Vec<EncodedChunk>>>, Arc<Mutex<bool>>) {
        let chunks = Arc::new(Mutex::new(Vec::new()));
        let sink = chunks.clone();
        let flushed = Arc::new(Mutex::new(false));
        let encoder = Counting {
            descriptor: EncoderDescriptor {
                name: "counting".into(),
                element: "avenc_aac".into(),
                codec: EncoderCodec::Audio(AudioCodec::Aac),
                hardware: false,
            },
            output: Arc::new(move |c| sink.lock().unwrap().push(c)),
            fail_after,
            encoded: 0,
            flushed: flushed.clone(),
        };
        (encoder, chunks, flushed)
    }

    fn raw(offset: u64) -> RawAudioFrame {
        RawAudioFrame {
            sample_rate: 48000,
            planes: vec![vec![0.0; 480], vec![0.0; 480]],
            sample_offset: offset,
            timestamp: mosaic_common::clock::samples_to_duration(offset, 48000),
        }
    }

    #[tokio::test]
    async fn encodes_until_channel_closes_then_flushes() {
        let (enc, chunks, flushed) = encoder(None);
        let (tx, rx) = mpsc::channel(4);
        let handle = spawn_audio_encoder(Box::new(enc), rx, Arc::new(|_| {}));

        tx.send(raw(0)).await.unwrap();
        tx.send(raw(480)).await.unwrap();
        drop(tx);

        let stats = handle.await.unwrap();
        assert_eq!(stats.frames_encoded, 2);
        assert!(!stats.failed);
        assert!(*flushed.lock().unwrap());
        let chunks = chunks.lock().unwrap();
        assert_eq!(chunks[1].timestamp, Duration::from_millis(10));
    }

    #[tokio::test]
    async fn error_is_reported_once_and_stops_encoding() {
        let (enc, chunks, flushed) = encoder(Some(1));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let seen = errors.clone();
        let (tx, rx) = mpsc::channel(4);
        let handle = spawn_audio_encoder(
            Box::new(enc),
            rx,
            Arc::new(move |e| seen.lock().unwrap().push(e.to_string())),
        );

        tx.send(raw(0)).await.unwrap();
        tx.send(raw(480)).await.unwrap();
        let stats = handle.await.unwrap();

        assert!(stats.failed);
        assert_eq!(stats.frames_encoded, 1);
        assert_eq!(chunks.lock().unwrap().len(), 1);
        assert_eq!(errors.lock().unwrap().len(), 1);
        assert!(!*flushed.lock().unwrap());
        assert!(tx.send(raw(960)).await.is_err());
    }
}
