//! Frame scheduler.
//!
//! A timer task ticks at the target rate. Each tick either starts one
//! composite+encode cycle or, when the previous cycle is still in flight,
//! counts a dropped frame. Cycles never overlap and are never queued.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};

use mosaic_codec::VideoPipeline;
use mosaic_common::clock::{FrameInterval, RecordingClock};
use mosaic_compositor::{FaultKind, FrameCompositor};
use mosaic_media_model::{CompositeFrame, SessionId, SourceProvider, SECTION_COUNT};

use crate::events::{EventBus, PipelineEvent};
use crate::watchdog::{spawn_watchdog, WatchdogContext};

/// The session's video pipeline, shared with the encode task of the current cycle.
pub type SharedPipeline = Arc<tokio::sync::Mutex<VideoPipeline>>;

/// Outcome of one tick's admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Previous cycle still running; this tick is dropped.
    Dropped,
    /// Encoding stopped for the session.
    Halted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacerCounts {
    pub frames: u64,
    pub dropped: u64,
}

/// Admission control and counters. The in-flight flag is the only thing
/// deciding whether a cycle may start.
#[derive(Debug, Default)]
pub struct FramePacer {
    in_flight: AtomicBool,
    halted: AtomicBool,
    frames: AtomicU64,
    dropped: AtomicU64,
    last_frame_ns: AtomicU64,
}

impl FramePacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_admit(&self) -> Admission {
        if self.halted.load(Ordering::Acquire) {
            return Admission::Halted;
        }
        match self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Admission::Admitted,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::AcqRel);
                Admission::Dropped
            }
        }
    }

    /// A cycle finished with its frame accepted by the encoder at `at`
    /// (time since session start).
    pub fn complete(&self, at: Duration) {
        self.last_frame_ns.store(at.as_nanos() as u64, Ordering::Release);
        self.frames.fetch_add(1, Ordering::AcqRel);
        self.in_flight.store(false, Ordering::Release);
    }

    /// A cycle finished without producing a frame.
    pub fn release(&self) {
        self.in_flight.store(false, Ordering::Release);
    }

    /// Refuse every later tick.
    pub fn halt(&self) {
        self.halted.store(true, Ordering::Release);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Acquire)
    }

    pub fn counts(&self) -> PacerCounts {
        PacerCounts {
            frames: self.frames(),
            dropped: self.dropped(),
        }
    }

    /// Session time of the last completed frame.
    pub fn last_frame(&self) -> Option<Duration> {
        if self.frames() == 0 {
            return None;
        }
        Some(Duration::from_nanos(self.last_frame_ns.load(Ordering::Acquire)))
    }
}

type EncodeSlot = Arc<Mutex<Option<JoinHandle<()>>>>;

fn lock_slot(slot: &EncodeSlot) -> MutexGuard<'_, Option<JoinHandle<()>>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Everything the tick task owns or shares.
pub(crate) struct SchedulerContext {
    pub session: SessionId,
    pub clock: RecordingClock,
    pub interval: FrameInterval,
    pub keyframe_interval: u64,
    pub sources: Arc<dyn SourceProvider>,
    pub compositor: FrameCompositor,
    pub pipeline: SharedPipeline,
    pub events: EventBus,
    pub watchdog_period: Duration,
    pub stall_factor: u32,
}

/// Running tick and watchdog tasks of one session.
pub struct FrameScheduler {
    pacer: Arc<FramePacer>,
    ticks: Option<JoinHandle<()>>,
    watchdog: Option<JoinHandle<()>>,
    encode: EncodeSlot,
}

impl FrameScheduler {
    pub(crate) fn start(ctx: SchedulerContext) -> Self {
        let pacer = Arc::new(FramePacer::new());
        let encode: EncodeSlot = Arc::new(Mutex::new(None));

        let watchdog = spawn_watchdog(WatchdogContext {
            session: ctx.session,
            pacer: pacer.clone(),
            clock: ctx.clock.clone(),
            period: ctx.watchdog_period,
            threshold: ctx.interval.stall_threshold(ctx.stall_factor),
            events: ctx.events.clone(),
        });

        tracing::info!(
            interval_ms = ctx.interval.as_millis(),
            keyframe_interval = ctx.keyframe_interval,
            "Frame scheduler started"
        );
        let ticks = tokio::spawn(run_ticks(ctx, pacer.clone(), encode.clone()));

        Self {
            pacer,
            ticks: Some(ticks),
            watchdog: Some(watchdog),
            encode,
        }
    }

    pub fn pacer(&self) -> &Arc<FramePacer> {
        &self.pacer
    }

    /// Cancel every future tick and the watchdog. A composite already in
    /// progress completes; an encode already started keeps running.
    pub async fn cancel(&mut self) {
        for task in [self.ticks.take(), self.watchdog.take()].into_iter().flatten() {
            task.abort();
            let _ = task.await;
        }
    }

    /// The encode started by the most recent admitted tick.
    pub(crate) fn take_in_flight(&self) -> Option<JoinHandle<()>> {
        lock_slot(&self.encode).take()
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        for task in [self.ticks.take(), self.watchdog.take()].into_iter().flatten() {
            task.abort();
        }
    }
}

async fn run_ticks(mut ctx: SchedulerContext, pacer: Arc<FramePacer>, encode: EncodeSlot) {
    let period = ctx.interval.period();
    let mut ticker = interval_at(ctx.clock.epoch() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last_timestamp: Option<Duration> = None;
    let mut reported: [Option<String>; SECTION_COUNT] = Default::default();

    loop {
        ticker.tick().await;

        match pacer.try_admit() {
            Admission::Admitted => {}
            Admission::Dropped => {
                tracing::trace!(dropped = pacer.dropped(), "Encode in flight, tick dropped");
                continue;
            }
            Admission::Halted => {
                tracing::info!("Encoding halted, frame scheduler exiting");
                return;
            }
        }

        let mut timestamp = ctx.clock.elapsed();
        if let Some(last) = last_timestamp {
            if timestamp <= last {
                timestamp = last + Duration::from_millis(1);
            }
        }
        last_timestamp = Some(timestamp);

        // Sources are re-read every tick.
        let sections = ctx.sources.sections();
        let output = ctx.compositor.compose(&sections, timestamp);
        report_faults(&ctx, &output.faults, &mut reported);

        let keyframe = pacer.frames() % ctx.keyframe_interval.max(1) == 0;
        let job = tokio::spawn(encode_frame(
            ctx.session,
            ctx.pipeline.clone(),
            pacer.clone(),
            ctx.clock.clone(),
            ctx.events.clone(),
            output.frame,
            keyframe,
        ));
        *lock_slot(&encode) = Some(job);
    }
}

/// Forward draw failures, once per section until its message changes or the
/// section recovers.
fn report_faults(
    ctx: &SchedulerContext,
    faults: &[mosaic_compositor::SectionFault],
    reported: &mut [Option<String>; SECTION_COUNT],
) {
    let mut failing = [false; SECTION_COUNT];
    for fault in faults {
        let FaultKind::DrawFailed(message) = &fault.kind else {
            continue;
        };
        let Some(slot) = reported.get_mut(fault.index) else {
            continue;
        };
        failing[fault.index] = true;
        if slot.as_deref() == Some(message.as_str()) {
            continue;
        }
        *slot = Some(message.clone());
        ctx.events.emit(PipelineEvent::FrameError {
            session: ctx.session,
            section: fault.index,
            message: message.clone(),
        });
    }
    for (slot, failing) in reported.iter_mut().zip(failing) {
        if !failing {
            *slot = None;
        }
    }
}

async fn encode_frame(
    session: SessionId,
    pipeline: SharedPipeline,
    pacer: Arc<FramePacer>,
    clock: RecordingClock,
    events: EventBus,
    frame: CompositeFrame,
    keyframe: bool,
) {
    let result = pipeline.lock().await.encode(&frame, keyframe).await;
    match result {
        Ok(()) => pacer.complete(clock.elapsed()),
        Err(e) => {
            pacer.halt();
            pacer.release();
            tracing::error!(
                error = %e,
                frames = pacer.frames(),
                "Video encoding failed; keeping muxed frames and stopping encode"
            );
            events.emit(PipelineEvent::EncoderError {
                session,
                message: e.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_cycle_is_admitted_at_a_time() {
        let pacer = FramePacer::new();
        assert_eq!(pacer.try_admit(), Admission::Admitted);
        assert_eq!(pacer.try_admit(), Admission::Dropped);
        assert_eq!(pacer.try_admit(), Admission::Dropped);
        assert_eq!(pacer.counts(), PacerCounts { frames: 0, dropped: 2 });

        pacer.complete(Duration::from_millis(33));
        assert!(!pacer.is_in_flight());
        assert_eq!(pacer.try_admit(), Admission::Admitted);
        assert_eq!(pacer.counts(), PacerCounts { frames: 1, dropped: 2 });
    }

    #[test]
    fn halted_pacer_admits_nothing_and_counts_nothing() {
        let pacer = FramePacer::new();
        assert_eq!(pacer.try_admit(), Admission::Admitted);
        pacer.halt();
        pacer.release();
        assert_eq!(pacer.try_admit(), Admission::Halted);
        assert_eq!(pacer.counts(), PacerCounts::default());
    }

    #[test]
    fn last_frame_tracks_completions() {
        let pacer = FramePacer::new();
        assert_eq!(pacer.last_frame(), None);
        pacer.try_admit();
        pacer.complete(Duration::from_millis(100));
        assert_eq!(pacer.last_frame(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn released_cycle_does_not_count_a_frame() {
        let pacer = FramePacer::new();
        pacer.try_admit();
        pacer.release();
        assert_eq!(pacer.frames(), 0);
        assert_eq!(pacer.try_admit(), Admission::Admitted);
    }
}
