//! Stall watchdog.
//!
//! Runs on its own fixed period and only reports. It never touches the
//! encoder, the pacer, or the session state.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};

use mosaic_common::clock::RecordingClock;
use mosaic_media_model::SessionId;

use crate::events::{EventBus, PipelineEvent};
use crate::pacer::FramePacer;

pub(crate) struct WatchdogContext {
    pub session: SessionId,
    pub pacer: Arc<FramePacer>,
    pub clock: RecordingClock,
    pub period: Duration,
    pub threshold: Duration,
    pub events: EventBus,
}

/// Time since the last frame (or since start), if it exceeds `threshold`.
pub fn stall_duration(now: Duration, last_frame: Option<Duration>, threshold: Duration) -> Option<Duration> {
    let since = now.saturating_sub(last_frame.unwrap_or(Duration::ZERO));
    (since > threshold).then_some(since)
}

pub(crate) fn spawn_watchdog(ctx: WatchdogContext) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = ctx.period.max(Duration::from_millis(1));
        let mut ticker = interval_at(ctx.clock.epoch() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if ctx.pacer.is_halted() {
                continue;
            }
            let Some(since) = stall_duration(ctx.clock.elapsed(), ctx.pacer.last_frame(), ctx.threshold) else {
                continue;
            };
            tracing::warn!(
                since_last_frame_ms = since.as_millis() as u64,
                threshold_ms = ctx.threshold.as_millis() as u64,
                frames = ctx.pacer.frames(),
                dropped = ctx.pacer.dropped(),
                "Frame pipeline stalled"
            );
            ctx.events.emit(PipelineEvent::Stalled {
                session: ctx.session,
                since_last_frame_ms: since.as_millis() as u64,
                threshold_ms: ctx.threshold.as_millis() as u64,
            });
        }
    })
}
