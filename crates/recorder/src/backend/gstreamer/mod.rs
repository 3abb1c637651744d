//! GStreamer media backend.
//!
//! Encoders are appsrc → encoder → appsink pipelines, so encoded output
//! comes back into the process and is muxed by Mosaic's own writer.

mod audio;
mod pipeline;
mod source;
mod video;

use mosaic_audio::AudioSource;
use mosaic_codec::{
    select_audio, select_video, AudioEncoder, ChunkCallback, FrameEncoder, ProbeReport, StreamEncoder,
};
use mosaic_common::{MosaicError, MosaicResult};
use mosaic_media_model::{AudioEncoderConfig, AudioFormat, AudioSourceKind, VideoEncoderConfig};

use crate::backend::MediaBackend;

pub use self::audio::GstAudioEncoder;
pub use self::source::GstAudioSource;
pub use self::video::{GstFrameEncoder, GstStreamEncoder};

use self::pipeline::{element_available, init_gstreamer};

pub struct GstBackend {
    report: ProbeReport,
}

impl GstBackend {
    pub fn new() -> MosaicResult<Self> {
        init_gstreamer()?;
        let mut report = ProbeReport::collect("gstreamer", element_available);
        report.microphone = element_available("autoaudiosrc");
        report.system_audio = element_available("pulsesrc");
        tracing::info!(
            video_encoders = report.video_encoders.len(),
            audio_encoders = report.audio_encoders.len(),
            microphone = report.microphone,
            system_audio = report.system_audio,
            "GStreamer backend ready"
        );
        Ok(Self { report })
    }
}

impl MediaBackend for GstBackend {
    fn name(&self) -> &str {
        "gstreamer"
    }

    fn frame_encoder(&self, config: &VideoEncoderConfig, output: ChunkCallback) -> MosaicResult<Box<dyn FrameEncoder>> {
        let descriptor = select_video(config.codec, config.hardware_acceleration, element_available)
            .ok_or_else(|| MosaicError::encoder_init(format!("no {:?} encoder installed", config.codec)))?;
        Ok(Box::new(GstFrameEncoder::new(descriptor, config, output)?))
    }

    fn stream_encoder(&self, config: &VideoEncoderConfig) -> MosaicResult<Box<dyn StreamEncoder>> {
        let descriptor = select_video(config.codec, config.hardware_acceleration, element_available)
            .ok_or_else(|| MosaicError::encoder_init(format!("no {:?} encoder installed", config.codec)))?;
        Ok(Box::new(GstStreamEncoder::new(descriptor, config)?))
    }

    fn audio_encoder(&self, config: &AudioEncoderConfig, output: ChunkCallback) -> MosaicResult<Box<dyn AudioEncoder>> {
        let descriptor = select_audio(config.codec, element_available)
            .ok_or_else(|| MosaicError::encoder_init(format!("no {:?} encoder installed", config.codec)))?;
        Ok(Box::new(GstAudioEncoder::new(descriptor, config, output)?))
    }

    fn audio_source(&self, kind: AudioSourceKind, format: AudioFormat) -> MosaicResult<Box<dyn AudioSource>> {
        let available = match kind {
            AudioSourceKind::Microphone => self.report.microphone,
            AudioSourceKind::System => self.report.system_audio,
        };
        if !available {
            return Err(MosaicError::audio_acquisition(format!(
                "no capture element for {kind:?} audio"
            )));
        }
        Ok(Box::new(GstAudioSource::new(kind, format)))
    }

    fn capabilities(&self) -> ProbeReport {
        self.report.clone()
    }
}
