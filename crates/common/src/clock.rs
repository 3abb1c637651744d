//! Clock and timing utilities for frame pacing and stream timestamps.
//!
//! Every session is anchored to a monotonic epoch recorded at `start()`.
//! This module provides utilities for:
//! - Capturing the epoch
//! - Deriving the frame interval and stall threshold from a frame rate
//! - Converting cumulative audio sample offsets into timestamps
//! - Calculating stream drift

use std::time::Duration;

use tokio::time::Instant;

/// A recording clock that provides monotonic timestamps relative to
/// a fixed epoch (the moment the session started).
///
/// Built on `tokio::time::Instant` so paused-time tests observe the same
/// clock the scheduler does.
#[derive(Debug, Clone)]
pub struct RecordingClock {
    /// The instant recording started.
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339 string).
    epoch_wall: String,
}

impl RecordingClock {
    /// Create a new recording clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Time elapsed since recording start.
    pub fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }

    /// Nanoseconds elapsed since recording start.
    pub fn elapsed_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Seconds elapsed since recording start.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time at recording start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }

    /// The underlying epoch instant.
    pub fn epoch(&self) -> Instant {
        self.epoch
    }
}

/// Frame interval derived from a target frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInterval {
    period: Duration,
}

impl FrameInterval {
    /// `1000 / fps` milliseconds, never below 1 ms.
    pub fn from_fps(fps: u32) -> Self {
        let ms = 1000 / u64::from(fps.max(1));
        Self {
            period: Duration::from_millis(ms.max(1)),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn as_millis(&self) -> u64 {
        self.period.as_millis() as u64
    }

    /// Time without a completed frame after which the pipeline counts as stalled.
    pub fn stall_threshold(&self, factor: u32) -> Duration {
        self.period * factor.max(1)
    }
}

/// Timestamp of the sample at `offset` in a stream running at `sample_rate`.
pub fn samples_to_duration(offset: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let rate = u64::from(sample_rate);
    let secs = offset / rate;
    let rem = offset % rate;
    Duration::from_secs(secs) + Duration::from_nanos(rem * 1_000_000_000 / rate)
}

/// Drift measurement between two streams.
#[derive(Debug, Clone, Copy)]
pub struct DriftMeasurement {
    /// Timestamp in the reference stream (ns).
    pub reference_ns: u64,
    /// Timestamp in the measured stream (ns).
    pub measured_ns: u64,
}

impl DriftMeasurement {
    /// Drift in nanoseconds (positive = measured is ahead).
    pub fn drift_ns(&self) -> i64 {
        self.measured_ns as i64 - self.reference_ns as i64
    }

    /// Drift in milliseconds.
    pub fn drift_ms(&self) -> f64 {
        self.drift_ns() as f64 / 1_000_000.0
    }

    /// Whether drift exceeds an acceptable threshold.
    pub fn exceeds_threshold_ms(&self, threshold_ms: f64) -> bool {
        self.drift_ms().abs() > threshold_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_clock_follows_tokio_time() {
        let clock = RecordingClock::start();
        tokio::time::advance(Duration::from_millis(250)).await;
        assert_eq!(clock.elapsed(), Duration::from_millis(250));
        assert!(!clock.epoch_wall().is_empty());
    }

    #[test]
    fn test_frame_interval_from_fps() {
        assert_eq!(FrameInterval::from_fps(30).as_millis(), 33);
        assert_eq!(FrameInterval::from_fps(60).as_millis(), 16);
        assert_eq!(FrameInterval::from_fps(5000).as_millis(), 1);
        assert_eq!(FrameInterval::from_fps(0).as_millis(), 1000);
        assert_eq!(
            FrameInterval::from_fps(30).stall_threshold(3),
            Duration::from_millis(99)
        );
    }

    #[test]
    fn test_samples_to_duration() {
        assert_eq!(samples_to_duration(0, 48000), Duration::ZERO);
        assert_eq!(samples_to_duration(48000, 48000), Duration::from_secs(1));
        assert_eq!(samples_to_duration(4096, 48000).as_nanos(), 85_333_333);
        assert_eq!(samples_to_duration(10, 0), Duration::ZERO);
    }

    #[test]
    fn test_drift_measurement() {
        let drift = DriftMeasurement {
            reference_ns: 1_000_000_000,
            measured_ns: 1_050_000_000,
        };
        assert_eq!(drift.drift_ns(), 50_000_000);
        assert!((drift.drift_ms() - 50.0).abs() < 1e-9);
        assert!(drift.exceeds_threshold_ms(10.0));
        assert!(!drift.exceeds_threshold_ms(100.0));
    }
}
