//! Mosaic Media Model
//!
//! Defines the data contracts shared by every pipeline stage:
//! - **Sections:** the four fixed grid slots and the feeds assigned to them
//! - **Frames:** composited RGBA frames produced once per scheduler tick
//! - **Chunks:** encoded video/audio payloads travelling to the muxer
//! - **Audio:** capture blocks, mixed planar frames, and the session track
//! - **Encoding:** codec, container, and encoder configuration types
//! - **Session:** lifecycle state and identifiers

pub mod audio;
pub mod chunk;
pub mod encoding;
pub mod frame;
pub mod section;
pub mod session;

pub use audio::*;
pub use chunk::*;
pub use encoding::*;
pub use frame::*;
pub use section::*;
pub use session::*;
