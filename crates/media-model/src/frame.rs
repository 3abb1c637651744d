//! Composited output frames.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A fully painted `width × height` RGBA8 frame produced by one scheduler tick.
///
/// Ownership is transient: the frame is handed to the video encoder
/// immediately after composition.
#[derive(Clone)]
pub struct CompositeFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<[u8]>,
    /// Presentation time relative to session start.
    pub timestamp: Duration,
}

impl CompositeFrame {
    pub fn new(width: u32, height: u32, pixels: impl Into<Arc<[u8]>>, timestamp: Duration) -> Self {
        Self {
            width,
            height,
            pixels: pixels.into(),
            timestamp,
        }
    }

    /// Bytes a fully painted frame of this size must hold.
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 4
    }

    /// RGBA value at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.pixels.get(offset..offset + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp.as_millis() as u64
    }
}

impl fmt::Debug for CompositeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}
