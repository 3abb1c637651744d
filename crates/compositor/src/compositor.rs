//! Frame compositor: paints four sections into one 2×2 frame.
//!
//! `compose` never fails. A section that is not ready, or whose feed
//! misbehaves while being drawn, is painted with the placeholder colour and
//! reported as a [`SectionFault`] alongside the finished frame.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use image::imageops::{self, FilterType};
use image::{GenericImageView, ImageBuffer, Rgba, RgbaImage};

use mosaic_common::{MosaicError, MosaicResult};
use mosaic_media_model::{
    CompositeFrame, CropRegion, FrameSource, Section, SectionSource, SourceFrame, SECTION_COUNT,
};

use crate::layout::{quadrants, Quadrant};

/// Colours and separator geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositorStyle {
    /// Fill for sections without a drawable source.
    pub placeholder: [u8; 4],
    pub separator: [u8; 4],
    /// Separator thickness in pixels. Zero disables separators.
    pub separator_width: u32,
}

impl Default for CompositorStyle {
    fn default() -> Self {
        Self {
            placeholder: [0x1e, 0x1e, 0x24, 0xff],
            separator: [0x3c, 0x3c, 0x46, 0xff],
            separator_width: 2,
        }
    }
}

/// Why a section was painted with the placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultKind {
    /// The feed has no frame yet or its frame has no area. Expected while
    /// devices warm up; not an error.
    Unavailable,
    /// Drawing failed. The message is forwarded to the frame-error channel.
    DrawFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionFault {
    pub index: usize,
    pub kind: FaultKind,
}

impl SectionFault {
    pub fn is_error(&self) -> bool {
        matches!(self.kind, FaultKind::DrawFailed(_))
    }

    /// The error to surface, if this fault is one.
    pub fn to_error(&self) -> Option<MosaicError> {
        match &self.kind {
            FaultKind::Unavailable => None,
            FaultKind::DrawFailed(message) => Some(MosaicError::compose(self.index, message.clone())),
        }
    }
}

/// Result of one composition.
#[derive(Debug, Clone)]
pub struct ComposeOutput {
    pub frame: CompositeFrame,
    pub faults: Vec<SectionFault>,
}

impl ComposeOutput {
    pub fn errors(&self) -> impl Iterator<Item = &SectionFault> {
        self.faults.iter().filter(|f| f.is_error())
    }
}

/// Owns the reusable canvas. Only the scheduler tick touches it.
pub struct FrameCompositor {
    canvas: RgbaImage,
    quadrants: [Quadrant; SECTION_COUNT],
    style: CompositorStyle,
}

impl FrameCompositor {
    pub fn new(width: u32, height: u32) -> MosaicResult<Self> {
        Self::with_style(width, height, CompositorStyle::default())
    }

    pub fn with_style(width: u32, height: u32, style: CompositorStyle) -> MosaicResult<Self> {
        if width < 2 || height < 2 {
            return Err(MosaicError::config(format!(
                "output must be at least 2x2 pixels, got {width}x{height}"
            )));
        }
        Ok(Self {
            canvas: RgbaImage::from_pixel(width, height, Rgba(style.placeholder)),
            quadrants: quadrants(width, height),
            style,
        })
    }

    pub fn width(&self) -> u32 {
        self.canvas.width()
    }

    pub fn height(&self) -> u32 {
        self.canvas.height()
    }

    pub fn style(&self) -> &CompositorStyle {
        &self.style
    }

    /// Paint all four sections and the separators, then snapshot the canvas.
    pub fn compose(&mut self, sections: &[Section; SECTION_COUNT], timestamp: Duration) -> ComposeOutput {
        let mut faults = Vec::new();

        for (slot, section) in sections.iter().enumerate() {
            let quadrant = self.quadrants[slot];
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                draw_section(&mut self.canvas, quadrant, &section.source)
            }));

            let kind = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(kind)) => Some(kind),
                Err(payload) => Some(FaultKind::DrawFailed(format!(
                    "feed panicked: {}",
                    panic_message(payload.as_ref())
                ))),
            };

            if let Some(kind) = kind {
                if let FaultKind::DrawFailed(message) = &kind {
                    tracing::warn!(section = slot, %message, "Section draw failed, using placeholder");
                }
                fill(&mut self.canvas, quadrant, self.style.placeholder);
                faults.push(SectionFault { index: slot, kind });
            }
        }

        self.draw_separators();

        let frame = CompositeFrame::new(
            self.canvas.width(),
            self.canvas.height(),
            Arc::<[u8]>::from(self.canvas.as_raw().as_slice()),
            timestamp,
        );
        ComposeOutput { frame, faults }
    }

    fn draw_separators(&mut self) {
        let thickness = self.style.separator_width;
        if thickness == 0 {
            return;
        }
        let (width, height) = self.canvas.dimensions();
        let vertical = band(width, thickness);
        let horizontal = band(height, thickness);

        fill(
            &mut self.canvas,
            Quadrant::new(vertical.0, 0, vertical.1, height),
            self.style.separator,
        );
        fill(
            &mut self.canvas,
            Quadrant::new(0, horizontal.0, width, horizontal.1),
            self.style.separator,
        );
    }
}

/// Start and length of a `thickness` band centred on the midpoint of `extent`.
fn band(extent: u32, thickness: u32) -> (u32, u32) {
    let thickness = thickness.min(extent);
    let start = (extent / 2).saturating_sub(thickness / 2);
    let start = start.min(extent - thickness);
    (start, thickness)
}

fn draw_section(canvas: &mut RgbaImage, quadrant: Quadrant, source: &SectionSource) -> Result<(), FaultKind> {
    match source {
        SectionSource::Empty => Err(FaultKind::Unavailable),
        SectionSource::LiveFeed(feed) => {
            let frame = ready_frame(feed.as_ref())?;
            let crop = CropRegion::new(0, 0, frame.width, frame.height);
            blit(canvas, quadrant, &frame, crop)
        }
        SectionSource::CroppedFeed { feed, crop } => {
            let frame = ready_frame(feed.as_ref())?;
            let crop = crop.clamp_to(frame.width, frame.height).ok_or_else(|| {
                FaultKind::DrawFailed(format!(
                    "crop region {crop:?} lies outside the {}x{} source",
                    frame.width, frame.height
                ))
            })?;
            blit(canvas, quadrant, &frame, crop)
        }
    }
}

fn ready_frame(feed: &dyn FrameSource) -> Result<SourceFrame, FaultKind> {
    match feed.current_frame() {
        Some(frame) if frame.has_area() => Ok(frame),
        _ => Err(FaultKind::Unavailable),
    }
}

/// Scale `crop` of `frame` into `quadrant`.
fn blit(canvas: &mut RgbaImage, quadrant: Quadrant, frame: &SourceFrame, crop: CropRegion) -> Result<(), FaultKind> {
    let view: ImageBuffer<Rgba<u8>, &[u8]> =
        ImageBuffer::from_raw(frame.width, frame.height, &frame.pixels[..]).ok_or_else(|| {
            FaultKind::DrawFailed(format!(
                "{}x{} frame carries {} bytes",
                frame.width,
                frame.height,
                frame.pixels.len()
            ))
        })?;

    let region = imageops::crop_imm(&view, crop.x, crop.y, crop.width, crop.height);
    let scaled = if crop.width == quadrant.width && crop.height == quadrant.height {
        RgbaImage::from_fn(crop.width, crop.height, |x, y| region.get_pixel(x, y))
    } else {
        imageops::resize(&*region, quadrant.width, quadrant.height, FilterType::Triangle)
    };
    imageops::replace(canvas, &scaled, i64::from(quadrant.x), i64::from(quadrant.y));
    Ok(())
}

fn fill(canvas: &mut RgbaImage, area: Quadrant, colour: [u8; 4]) {
    let pixel = Rgba(colour);
    for y in area.y..(area.y + area.height).min(canvas.height()) {
        for x in area.x..(area.x + area.width).min(canvas.width()) {
            canvas.put_pixel(x, y, pixel);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
