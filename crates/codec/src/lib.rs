//! Mosaic Codec
//!
//! Everything between a composited frame and a file on disk:
//! - [`video`]: encoder seams and the per-session [`VideoPipeline`]
//! - [`stream`]: continuous-stream fallback fed from the compositing surface
//! - [`audio`]: audio encoder seam and its consuming task
//! - [`probe`]: ordered encoder candidates and selection
//! - [`muxer`]: chunk collection and exactly-once finalize
//! - [`matroska`]: EBML container writer and inspector
//! - [`sink`]: output persistence

pub mod audio;
pub mod matroska;
pub mod muxer;
pub mod probe;
pub mod sink;
pub mod stream;
pub mod video;

pub use audio::{spawn_audio_encoder, AudioEncoder, AudioEncoderHandle, AudioEncoderStats};
pub use matroska::{inspect, ContainerSummary, TrackSummary};
pub use muxer::{AudioTrackInfo, MuxError, MuxOutput, Muxer, MuxerHandle, VideoTrackInfo};
pub use probe::{select_audio, select_video, EncoderCandidate, ProbeReport};
pub use sink::{suggested_name, DirectorySink, OutputSink};
pub use stream::StreamCaptureEncoder;
pub use video::{ChunkCallback, ErrorCallback, FrameEncoder, StreamEncoder, VideoPipeline};
