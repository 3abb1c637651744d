//! Quadrant geometry of the composite grid.

use mosaic_media_model::SECTION_COUNT;

/// Pixel rectangle of one quadrant inside the output frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quadrant {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Quadrant {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }
}

/// Quadrants in section order: top-left, top-right, bottom-left, bottom-right.
///
/// Left/top quadrants are `width / 2 × height / 2`; with odd dimensions the
/// right/bottom quadrants take the remaining column/row so the four always
/// tile the frame exactly.
pub fn quadrants(width: u32, height: u32) -> [Quadrant; SECTION_COUNT] {
    let left = width / 2;
    let top = height / 2;
    let right = width - left;
    let bottom = height - top;
    [
        Quadrant::new(0, 0, left, top),
        Quadrant::new(left, 0, right, top),
        Quadrant::new(0, top, left, bottom),
        Quadrant::new(left, top, right, bottom),
    ]
}
