use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use mosaic_codec::{
    inspect, spawn_audio_encoder, suggested_name, AudioEncoder, AudioTrackInfo, ChunkCallback, DirectorySink,
    ErrorCallback, FrameEncoder, Muxer, MuxerHandle, OutputSink, VideoPipeline, VideoTrackInfo,
};
use mosaic_common::MosaicResult;
use mosaic_media_model::{
    AudioCodec, ChunkKind, CompositeFrame, ContainerFormat, EncodedChunk, EncoderCodec, EncoderDescriptor,
    RawAudioFrame, VideoCodec,
};

const FPS: u64 = 30;
const FRAME_MS: u64 = 1000 / FPS;

struct Passthrough {
    descriptor: EncoderDescriptor,
    output: ChunkCallback,
}

#[async_trait]
impl FrameEncoder for Passthrough {
    fn descriptor(&self) -> &EncoderDescriptor {
        &self.descriptor
    }

    async fn encode(&mut self, frame: &CompositeFrame, keyframe: bool) -> MosaicResult<()> {
        let mut chunk = EncodedChunk::video(
            frame.pixels[..8].to_vec(),
            frame.timestamp,
            Duration::from_millis(FRAME_MS),
            keyframe,
        );
        if frame.timestamp.is_zero() {
            chunk = chunk.with_decoder_config(vec![1, 0x42, 0, 0x1e]);
        }
        (self.output)(chunk);
        Ok(())
    }

    async fn flush(&mut self) -> MosaicResult<()> {
        Ok(())
    }
}

struct Silence {
    descriptor: EncoderDescriptor,
    output: ChunkCallback,
}

#[async_trait]
impl AudioEncoder for Silence {
    fn descriptor(&self) -> &EncoderDescriptor {
        &self.descriptor
    }

    async fn encode(&mut self, frame: &RawAudioFrame) -> MosaicResult<()> {
        (self.output)(EncodedChunk::audio(vec![0; 4], frame.timestamp, frame.duration()));
        Ok(())
    }

    async fn flush(&mut self) -> MosaicResult<()> {
        Ok(())
    }
}

fn descriptor(codec: EncoderCodec) -> EncoderDescriptor {
    EncoderDescriptor {
        name: "test".into(),
        element: "test".into(),
        codec,
        hardware: false,
    }
}

fn audio_frame(index: u64) -> RawAudioFrame {
    let samples = 4800;
    RawAudioFrame {
        sample_rate: 48000,
        planes: vec![vec![0.0; samples], vec![0.0; samples]],
        sample_offset: index * samples as u64,
        timestamp: Duration::from_millis(index * 100),
    }
}

#[tokio::test]
async fn two_seconds_of_av_land_on_disk_intact() {
    let muxer = MuxerHandle::new(Muxer::new("mosaic-test"));
    muxer
        .lock()
        .set_video_track(
            ContainerFormat::Matroska,
            VideoTrackInfo {
                codec: VideoCodec::H264,
                width: 16,
                height: 16,
                fps: FPS as u32,
            },
        )
        .unwrap();
    muxer.lock().set_audio_track(AudioTrackInfo {
        codec: AudioCodec::Aac,
        sample_rate: 48000,
        channels: 2,
    });

    let (tx, rx) = mpsc::channel(4);
    let on_error: ErrorCallback = Arc::new(|e| panic!("audio encoder failed: {e}"));
    let audio = spawn_audio_encoder(
        Box::new(Silence {
            descriptor: descriptor(EncoderCodec::Audio(AudioCodec::Aac)),
            output: muxer.chunk_sink(),
        }),
        rx,
        on_error,
    );

    let mut video = VideoPipeline::per_frame(Box::new(Passthrough {
        descriptor: descriptor(EncoderCodec::Video(VideoCodec::H264)),
        output: muxer.chunk_sink(),
    }));
    for i in 0..60u64 {
        let frame = CompositeFrame::new(16, 16, vec![i as u8; 16 * 16 * 4], Duration::from_millis(i * FRAME_MS));
        video.encode(&frame, i % 30 == 0).await.unwrap();
        if i % 3 == 0 {
            tx.send(audio_frame(i / 3)).await.unwrap();
        }
    }
    drop(tx);
    video.finish().await.unwrap();
    assert_eq!(audio.await.unwrap().frames_encoded, 20);

    let output = muxer.finalize().unwrap();
    assert_eq!(output.video_chunks, 60);
    assert_eq!(output.audio_chunks, 20);

    let tmp = tempfile::tempdir().unwrap();
    let sink = DirectorySink::new(tmp.path());
    let name = suggested_name(output.container, chrono::Local::now());
    let path = sink
        .save(&output.bytes, &name, output.container.mime_type())
        .await
        .unwrap();
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("mkv"));

    let summary = inspect(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(summary.doc_type, "matroska");
    assert_eq!(summary.blocks(ChunkKind::Video), 60);
    assert_eq!(summary.blocks(ChunkKind::Audio), 20);
    assert_eq!(summary.cue_points, 2);
    assert!(summary.clusters >= 2);

    let v = summary.track(ChunkKind::Video).unwrap();
    assert_eq!(v.keyframes, 2);
    assert_eq!(v.codec_private_len, 4);
    assert_eq!((v.first_ms, v.last_ms), (Some(0), Some(59 * FRAME_MS)));
    assert_eq!(summary.track(ChunkKind::Audio).unwrap().last_ms, Some(1900));
}
