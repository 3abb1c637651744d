//! Notifications published while a session runs.

use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::broadcast;

use mosaic_media_model::{SessionId, SessionState};

const EVENT_CAPACITY: usize = 256;

/// Everything a UI layer needs to follow a session.
///
/// Non-fatal problems (`FrameError`, `Stalled`, `EncoderError`) never change
/// the session state by themselves.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    StateChanged {
        session: SessionId,
        state: SessionState,
    },
    /// A section could not be drawn and was replaced by the placeholder.
    FrameError {
        session: SessionId,
        section: usize,
        message: String,
    },
    /// No frame completed within the stall threshold.
    Stalled {
        session: SessionId,
        since_last_frame_ms: u64,
        threshold_ms: u64,
    },
    /// Encoding stopped for this session; muxed chunks are kept.
    EncoderError { session: SessionId, message: String },
    SessionFailed { session: SessionId, message: String },
    RecordingSaved { session: SessionId, path: PathBuf },
}

impl PipelineEvent {
    pub fn session(&self) -> SessionId {
        match self {
            Self::StateChanged { session, .. }
            | Self::FrameError { session, .. }
            | Self::Stalled { session, .. }
            | Self::EncoderError { session, .. }
            | Self::SessionFailed { session, .. }
            | Self::RecordingSaved { session, .. } => *session,
        }
    }
}

/// Fan-out of [`PipelineEvent`]s. Emitting with no subscribers is fine.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: PipelineEvent) {
        tracing::trace!(?event, "Pipeline event");
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_a_tag() {
        let session = SessionId::new();
        let json = serde_json::to_value(PipelineEvent::RecordingSaved {
            session,
            path: PathBuf::from("/tmp/a.mkv"),
        })
        .unwrap();
        assert_eq!(json["event"], "recording_saved");
        assert_eq!(json["path"], "/tmp/a.mkv");
    }

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let session = SessionId::new();
        bus.emit(PipelineEvent::EncoderError {
            session,
            message: "boom".into(),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.session(), session);
    }

    #[test]
    fn emitting_without_subscribers_is_silent() {
        EventBus::new().emit(PipelineEvent::SessionFailed {
            session: SessionId::new(),
            message: "x".into(),
        });
    }
}
