//! The recorder facade handed to UI layers.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;

use mosaic_codec::OutputSink;
use mosaic_common::config::RecordingDefaults;
use mosaic_common::{MosaicError, MosaicResult};
use mosaic_media_model::{SessionId, SessionState};

use crate::backend::MediaBackend;
use crate::events::{EventBus, PipelineEvent};
use crate::session::{RecordingSession, SessionConfig, SessionStatus, SessionSummary};

/// What the recorder is doing right now.
enum Slot {
    Idle,
    Starting,
    Running(RecordingSession),
    /// Stop is draining; holds the status captured when it was requested.
    Stopping(SessionStatus),
}

/// Puts the slot back to `Idle` unless settled, so a cancelled start or
/// stop never leaves the recorder wedged.
struct SlotGuard<'a> {
    slot: &'a Mutex<Slot>,
    armed: bool,
}

impl<'a> SlotGuard<'a> {
    fn new(slot: &'a Mutex<Slot>) -> Self {
        Self { slot, armed: true }
    }

    fn settle(mut self, next: Slot) {
        self.armed = false;
        *lock(self.slot) = next;
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            *lock(self.slot) = Slot::Idle;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Starts and stops recordings. At most one session is live at a time.
///
/// Callers hold only this handle; all timers and counters live inside the
/// session it manages. The slot lock is never held across an await, so
/// `status()` answers while a start or stop is in progress.
pub struct Recorder {
    backend: Arc<dyn MediaBackend>,
    sink: Arc<dyn OutputSink>,
    settings: RecordingDefaults,
    events: EventBus,
    slot: Mutex<Slot>,
    last_summary: Mutex<Option<SessionSummary>>,
}

impl Recorder {
    pub fn new(backend: Arc<dyn MediaBackend>, sink: Arc<dyn OutputSink>, settings: RecordingDefaults) -> Self {
        Self {
            backend,
            sink,
            settings,
            events: EventBus::new(),
            slot: Mutex::new(Slot::Idle),
            last_summary: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &RecordingDefaults {
        &self.settings
    }

    pub fn backend(&self) -> &dyn MediaBackend {
        self.backend.as_ref()
    }

    /// Events of every session started after subscribing.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Begin a recording. Fails with `AlreadyRunning` while a session is
    /// starting, live, or still stopping.
    pub async fn start(&self, config: SessionConfig) -> MosaicResult<SessionId> {
        {
            let mut slot = lock(&self.slot);
            if !matches!(*slot, Slot::Idle) {
                return Err(MosaicError::AlreadyRunning);
            }
            *slot = Slot::Starting;
        }
        let guard = SlotGuard::new(&self.slot);

        let session =
            RecordingSession::start(self.backend.as_ref(), config, &self.settings, self.events.clone()).await?;
        let id = session.id();
        guard.settle(Slot::Running(session));
        Ok(id)
    }

    /// Halt capture, finalize, and persist. Returns the saved path, or the
    /// error that prevented it. A second call finds no session.
    pub async fn stop(&self) -> MosaicResult<PathBuf> {
        let session = {
            let mut slot = lock(&self.slot);
            match std::mem::replace(&mut *slot, Slot::Idle) {
                Slot::Running(session) => {
                    let mut status = session.status();
                    status.state = SessionState::Stopping;
                    *slot = Slot::Stopping(status);
                    session
                }
                other => {
                    *slot = other;
                    return Err(MosaicError::NotRunning);
                }
            }
        };
        let guard = SlotGuard::new(&self.slot);

        let (result, summary) = session.stop(self.sink.as_ref()).await;
        *lock(&self.last_summary) = Some(summary);
        guard.settle(Slot::Idle);
        result
    }

    /// While stopping, the counters are those at the moment stop was called.
    pub async fn status(&self) -> Option<SessionStatus> {
        match &*lock(&self.slot) {
            Slot::Running(session) => Some(session.status()),
            Slot::Stopping(status) => Some(status.clone()),
            Slot::Idle | Slot::Starting => None,
        }
    }

    pub async fn is_recording(&self) -> bool {
        matches!(*lock(&self.slot), Slot::Running(_) | Slot::Stopping(_))
    }

    /// Outcome of the most recently stopped session.
    pub fn last_summary(&self) -> Option<SessionSummary> {
        lock(&self.last_summary).clone()
    }
}
