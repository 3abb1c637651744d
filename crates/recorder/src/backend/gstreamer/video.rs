//! GStreamer video encoders for both strategies.

use std::time::Duration;

use async_trait::async_trait;
use gstreamer as gst;

use mosaic_codec::{ChunkCallback, FrameEncoder, StreamEncoder};
use mosaic_common::{MosaicError, MosaicResult};
use mosaic_media_model::{ChunkKind, CompositeFrame, EncodedChunk, EncoderDescriptor, VideoCodec, VideoEncoderConfig};

use super::pipeline::{clock_time, AppPipeline, ChunkReader};

/// Launch fragment for `element` with bitrate and keyframe spacing applied.
pub(crate) fn encoder_fragment(element: &str, config: &VideoEncoderConfig) -> String {
    let kbps = config.bitrate_kbps;
    let keyint = config.keyframe_interval.max(1);
    match element {
        "x264enc" => format!("x264enc tune=zerolatency speed-preset=veryfast bitrate={kbps} key-int-max={keyint}"),
        "vah264enc" => format!("vah264enc bitrate={kbps} key-int-max={keyint}"),
        "vaapih264enc" => format!("vaapih264enc bitrate={kbps} keyframe-period={keyint}"),
        "nvh264enc" => format!("nvh264enc bitrate={kbps} gop-size={keyint}"),
        "vp8enc" | "vp9enc" => format!(
            "{element} deadline=1 target-bitrate={} keyframe-max-dist={keyint}",
            u64::from(kbps) * 1000
        ),
        other => other.to_string(),
    }
}

fn launch_line(element: &str, config: &VideoEncoderConfig) -> String {
    let encoder = encoder_fragment(element, config);
    let tail = match config.codec {
        VideoCodec::H264 => "h264parse ! video/x-h264,stream-format=avc,alignment=au ! ",
        VideoCodec::Vp8 | VideoCodec::Vp9 => "",
    };
    format!(
        "appsrc name=src is-live=true format=time do-timestamp=false \
         caps=video/x-raw,format=RGBA,width={w},height={h},framerate={fps}/1 \
         ! queue max-size-buffers=8 ! videoconvert ! {encoder} ! {tail}appsink name=sink sync=false",
        w = config.width,
        h = config.height,
        fps = config.fps.max(1),
    )
}

fn frame_period(config: &VideoEncoderConfig) -> Duration {
    Duration::from_nanos(1_000_000_000 / u64::from(config.fps.max(1)))
}

fn frame_buffer(frame: &CompositeFrame, duration: Duration) -> MosaicResult<gst::Buffer> {
    let mut buffer = gst::Buffer::from_slice(frame.pixels.clone());
    let buffer_mut = buffer
        .get_mut()
        .ok_or_else(|| MosaicError::encode("frame buffer is shared"))?;
    buffer_mut.set_pts(clock_time(frame.timestamp));
    buffer_mut.set_duration(clock_time(duration));
    Ok(buffer)
}

fn read_all(reader: &mut ChunkReader, samples: Vec<gst::Sample>) -> MosaicResult<Vec<EncodedChunk>> {
    samples.iter().map(|sample| reader.read(sample)).collect()
}

/// Per-frame H.264 encoder.
pub struct GstFrameEncoder {
    descriptor: EncoderDescriptor,
    pipeline: AppPipeline,
    reader: ChunkReader,
    period: Duration,
    output: ChunkCallback,
}

impl GstFrameEncoder {
    pub fn new(descriptor: EncoderDescriptor, config: &VideoEncoderConfig, output: ChunkCallback) -> MosaicResult<Self> {
        let pipeline = AppPipeline::from_launch(
            format!("video-{}", descriptor.element),
            &launch_line(&descriptor.element, config),
        )?;
        pipeline.play()?;
        let period = frame_period(config);
        tracing::info!(encoder = %descriptor.name, hardware = descriptor.hardware, "Per-frame encoder initialized");
        Ok(Self {
            descriptor,
            pipeline,
            reader: ChunkReader::new(ChunkKind::Video, period),
            period,
            output,
        })
    }

    fn deliver(&mut self, samples: Vec<gst::Sample>) -> MosaicResult<()> {
        for chunk in read_all(&mut self.reader, samples)? {
            (self.output)(chunk);
        }
        Ok(())
    }
}

#[async_trait]
impl FrameEncoder for GstFrameEncoder {
    fn descriptor(&self) -> &EncoderDescriptor {
        &self.descriptor
    }

    async fn encode(&mut self, frame: &CompositeFrame, keyframe: bool) -> MosaicResult<()> {
        if keyframe {
            self.pipeline.request_keyframe();
        }
        self.pipeline.push(frame_buffer(frame, self.period)?)?;
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

/// Continuous-stream VP8/VP9 encoder; output is collected until drained.
pub struct GstStreamEncoder {
    descriptor: EncoderDescriptor,
    pipeline: AppPipeline,
    reader: ChunkReader,
    period: Duration,
}

impl GstStreamEncoder {
    pub fn new(descriptor: EncoderDescriptor, config: &VideoEncoderConfig) -> MosaicResult<Self> {
        let pipeline = AppPipeline::from_launch(
            format!("stream-{}", descriptor.element),
            &launch_line(&descriptor.element, config),
        )?;
        pipeline.play()?;
        let period = frame_period(config);
        tracing::info!(encoder = %descriptor.name, "Stream encoder initialized");
        Ok(Self {
            descriptor,
            pipeline,
            reader: ChunkReader::new(ChunkKind::Video, period),
            period,
        })
    }
}

#[async_trait]
impl StreamEncoder for GstStreamEncoder {
    fn descriptor(&self) -> &EncoderDescriptor {
        &self.descriptor
    }

    async fn push(&mut self, frame: &CompositeFrame) -> MosaicResult<()> {
        self.pipeline.push(frame_buffer(frame, self.period)?)
    }

    async fn drain(&mut self) -> MosaicResult<Vec<EncodedChunk>> {
        let ready = self.pipeline.try_pull();
        read_all(&mut self.reader, ready)
    }

    async fn finish(&mut self) -> MosaicResult<Vec<EncodedChunk>> {
        let mut chunks = self.drain().await?;
        let remaining = self.pipeline.end_of_stream().await?;
        chunks.extend(read_all(&mut self.reader, remaining)?);
        self.pipeline.shutdown();
        Ok(chunks)
    }
}
