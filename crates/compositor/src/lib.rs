//! Mosaic Compositor
//!
//! Holds the four section slots and paints them into one frame per tick:
//! - [`SourceRegistry`]: live section assignment, re-read on every tick
//! - [`layout`]: fixed 2×2 quadrant geometry
//! - [`FrameCompositor`]: placeholder fallback, per-section fault containment,
//!   separator overlay

pub mod compositor;
pub mod layout;
pub mod registry;

pub use compositor::{ComposeOutput, CompositorStyle, FaultKind, FrameCompositor, SectionFault};
pub use layout::Quadrant;
pub use registry::SourceRegistry;
