//! Mosaic Recorder
//!
//! Runs real-time recording sessions: paces composite+encode cycles,
//! watches for stalls, drives audio capture, and finalizes one container
//! per session.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                  RecordingSession                    │
//! │  ┌───────────┐   ┌────────────┐   ┌───────────────┐  │
//! │  │ Scheduler │──▶│ Compositor │──▶│ VideoPipeline │──┼─┐
//! │  │ +watchdog │   └────────────┘   └───────────────┘  │ │
//! │  └───────────┘                                       │ ▼
//! │  ┌───────────┐   ┌────────────┐   ┌───────────────┐  │ ┌───────┐   ┌──────┐
//! │  │ Audio src │──▶│   Mixer    │──▶│ AudioEncoder  │──┼▶│ Muxer │──▶│ Sink │
//! │  └───────────┘   └────────────┘   └───────────────┘  │ └───────┘   └──────┘
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod events;
pub mod pacer;
pub mod recorder;
pub mod session;
pub mod watchdog;

pub use backend::{default_backend, MediaBackend};
pub use events::{EventBus, PipelineEvent};
pub use pacer::{Admission, FramePacer, FrameScheduler, PacerCounts};
pub use recorder::Recorder;
pub use session::{RecordingSession, SessionConfig, SessionStatus, SessionSummary};
