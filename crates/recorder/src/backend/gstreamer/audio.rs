//! GStreamer audio encoder (AAC or Opus).

use std::time::Duration;

use async_trait::async_trait;
use gstreamer as gst;

use mosaic_codec::{AudioEncoder, ChunkCallback};
use mosaic_common::{MosaicError, MosaicResult};
use mosaic_media_model::{AudioCodec, AudioEncoderConfig, ChunkKind, EncoderDescriptor, RawAudioFrame};

use super::pipeline::{clock_time, AppPipeline, ChunkReader};

pub(crate) fn raw_audio_caps(sample_rate: u32, channels: u16) -> String {
    format!("audio/x-raw,format=F32LE,layout=interleaved,rate={sample_rate},channels={channels}")
}

fn launch_line(element: &str, config: &AudioEncoderConfig) -> String {
    let bps = u64::from(config.bitrate_kbps) * 1000;
    let tail = match config.codec {
        AudioCodec::Aac => "aacparse ! audio/mpeg,mpegversion=4,stream-format=raw ! ",
        AudioCodec::Opus => "",
    };
    format!(
        "appsrc name=src is-live=true format=time caps={caps} \
         ! queue ! audioconvert ! {element} bitrate={bps} ! {tail}appsink name=sink sync=false",
        caps = raw_audio_caps(config.sample_rate, config.channels),
    )
}

pub(crate) fn f32_le_bytes(samples: &[f32]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

pub struct GstAudioEncoder {
    descriptor: EncoderDescriptor,
    pipeline: AppPipeline,
    reader: ChunkReader,
    output: ChunkCallback,
}

impl GstAudioEncoder {
    pub fn new(descriptor: EncoderDescriptor, config: &AudioEncoderConfig, output: ChunkCallback) -> MosaicResult<Self> {
        let pipeline = AppPipeline::from_launch(
            format!("audio-{}", descriptor.element),
            &launch_line(&descriptor.element, config),
        )?;
        pipeline.play()?;
        tracing::info!(
            encoder = %descriptor.name,
            sample_rate = config.sample_rate,
            channels = config.channels,
            "Audio encoder initialized"
        );
        Ok(Self {
            descriptor,
            pipeline,
            reader: ChunkReader::new(ChunkKind::Audio, Duration::from_millis(20)),
            output,
        })
    }

    fn deliver(&mut self, samples: Vec<gst::Sample>) -> MosaicResult<()> {
        for sample in &samples {
            let chunk = self.reader.read(sample)?;
            (self.output)(chunk);
        }
        Ok(())
    }
}

#[async_trait]
impl AudioEncoder for GstAudioEncoder {
    fn descriptor(&self) -> &EncoderDescriptor {
        &self.descriptor
    }

    async fn encode(&mut self, frame: &RawAudioFrame) -> MosaicResult<()> {
        let mut buffer = gst::Buffer::from_slice(f32_le_bytes(&frame.interleaved()));
        {
            let buffer_mut = buffer
                .get_mut()
                .ok_or_else(|| MosaicError::encode("audio buffer is shared"))?;
            buffer_mut.set_pts(clock_time(frame.timestamp));
            buffer_mut.set_duration(clock_time(frame.duration()));
        }
        self.pipeline.push(buffer)?;
        let ready = self.pipeline.try_pull();
        self.deliver(ready)
    }

    async fn flush(&mut self) -> MosaicResult<()> {
        let remaining = self.pipeline.end_of_stream().await?;
        self.deliver(remaining)?;
        self.pipeline.shutdown();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aac_output_is_raw_for_matroska() {
        let line = launch_line(
            "avenc_aac",
            &AudioEncoderConfig {
                codec: AudioCodec::Aac,
                sample_rate: 48000,
                channels: 2,
                bitrate_kbps: 192,
            },
        );
        assert!(line.contains("avenc_aac bitrate=192000"));
        assert!(line.contains("stream-format=raw"));
        assert!(line.contains("rate=48000,channels=2"));
    }

    #[test]
    fn samples_are_little_endian_floats() {
        assert_eq!(f32_le_bytes(&[1.0]), 1.0f32.to_le_bytes().to_vec());
    }
}
