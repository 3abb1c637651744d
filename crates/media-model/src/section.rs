//! Grid sections and the video feeds assigned to them.
//!
//! The composite grid always has exactly [`SECTION_COUNT`] sections laid out
//! 2×2. Sections are never added or removed, only reassigned.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Number of fixed sections in the composite grid.
pub const SECTION_COUNT: usize = 4;

/// One RGBA8 frame held by a feed.
#[derive(Clone)]
pub struct SourceFrame {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8 pixels, `width * height * 4` bytes.
    pub pixels: Arc<[u8]>,
}

impl SourceFrame {
    pub fn new(width: u32, height: u32, pixels: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            pixels: pixels.into(),
        }
    }

    /// A frame filled with a single colour.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels: Vec<u8> = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self::new(width, height, pixels)
    }

    pub fn has_area(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

impl fmt::Debug for SourceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// A live video feed (camera, screen share, test pattern).
///
/// Implementations are owned by the layer that acquired the device; the
/// pipeline only ever reads the most recent frame.
pub trait FrameSource: Send + Sync {
    /// Human-readable label for logs.
    fn label(&self) -> &str {
        "feed"
    }

    /// The most recently buffered frame, if the feed has produced one.
    fn current_frame(&self) -> Option<SourceFrame>;

    /// Release the underlying device. Called when the feed leaves its section.
    fn release(&self) {}
}

/// Shared handle to a feed.
pub type FeedHandle = Arc<dyn FrameSource>;

/// Rectangle in source-pixel coordinates selecting part of a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Intersect with a `frame_width × frame_height` frame.
    ///
    /// Returns `None` when nothing of the region lies inside the frame.
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> Option<CropRegion> {
        if self.x >= frame_width || self.y >= frame_height {
            return None;
        }
        let width = self.width.min(frame_width - self.x);
        let height = self.height.min(frame_height - self.y);
        if width == 0 || height == 0 {
            return None;
        }
        Some(CropRegion::new(self.x, self.y, width, height))
    }
}

/// Kind of content currently assigned to a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Empty,
    LiveFeed,
    CroppedFeed,
}

/// What a section displays.
#[derive(Clone, Default)]
pub enum SectionSource {
    #[default]
    Empty,
    LiveFeed(FeedHandle),
    CroppedFeed { feed: FeedHandle, crop: CropRegion },
}

impl SectionSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            SectionSource::Empty => SourceKind::Empty,
            SectionSource::LiveFeed(_) => SourceKind::LiveFeed,
            SectionSource::CroppedFeed { .. } => SourceKind::CroppedFeed,
        }
    }

    /// Backing feed, if any.
    pub fn feed(&self) -> Option<&FeedHandle> {
        match self {
            SectionSource::Empty => None,
            SectionSource::LiveFeed(feed) => Some(feed),
            SectionSource::CroppedFeed { feed, .. } => Some(feed),
        }
    }
}

impl fmt::Debug for SectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionSource::Empty => f.write_str("Empty"),
            SectionSource::LiveFeed(feed) => write!(f, "LiveFeed({})", feed.label()),
            SectionSource::CroppedFeed { feed, crop } => {
                write!(f, "CroppedFeed({}, {:?})", feed.label(), crop)
            }
        }
    }
}

/// One of the four fixed grid slots.
#[derive(Debug, Clone)]
pub struct Section {
    /// Position in the grid, `0..4` (top-left, top-right, bottom-left, bottom-right).
    pub index: usize,
    pub source: SectionSource,
}

impl Section {
    pub fn empty(index: usize) -> Self {
        Self {
            index,
            source: SectionSource::Empty,
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.source.kind()
    }

    /// Four empty sections, indices `0..4`.
    pub fn empty_grid() -> [Section; SECTION_COUNT] {
        std::array::from_fn(Section::empty)
    }
}

/// Pull accessor for the current section assignment.
///
/// The scheduler calls [`SourceProvider::sections`] on every tick; callers
/// must not cache the returned snapshot across ticks.
pub trait SourceProvider: Send + Sync {
    fn sections(&self) -> [Section; SECTION_COUNT];
}
