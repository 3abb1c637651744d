//! Synthetic section feeds for recording without cameras.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use mosaic_media_model::{CropRegion, FeedHandle, FrameSource, SectionSource, SourceFrame, SECTION_COUNT};

const FEED_WIDTH: u32 = 320;
const FEED_HEIGHT: u32 = 240;

const BARS: [[u8; 4]; 7] = [
    [192, 192, 192, 255],
    [192, 192, 0, 255],
    [0, 192, 192, 255],
    [0, 192, 0, 255],
    [192, 0, 192, 255],
    [192, 0, 0, 255],
    [0, 0, 192, 255],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Bars,
    Grid,
    /// Horizontal gradient that scrolls over time.
    Gradient,
}

impl Pattern {
    fn parse(name: &str) -> anyhow::Result<Self> {
        match name {
            "bars" => Ok(Self::Bars),
            "grid" => Ok(Self::Grid),
            "gradient" => Ok(Self::Gradient),
            other => bail!("unknown pattern '{other}' (expected bars, grid, or gradient)"),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Bars => "bars",
            Self::Grid => "grid",
            Self::Gradient => "gradient",
        }
    }

    /// Render one frame; `phase` advances animated patterns.
    pub fn render(&self, width: u32, height: u32, phase: u32) -> SourceFrame {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for x in 0..width {
                let rgba = match self {
                    Self::Bars => BARS[(x as usize * BARS.len()) / width.max(1) as usize],
                    Self::Grid => {
                        if x % 32 == 0 || y % 32 == 0 {
                            [235, 235, 235, 255]
                        } else {
                            [16, 16, 16, 255]
                        }
                    }
                    Self::Gradient => {
                        let v = ((x + phase) % width.max(1)) * 255 / width.max(1);
                        [v as u8, (255 - v) as u8, (y * 255 / height.max(1)) as u8, 255]
                    }
                };
                pixels.extend_from_slice(&rgba);
            }
        }
        SourceFrame::new(width, height, pixels)
    }
}

/// A test pattern presented as a live feed.
pub struct PatternFeed {
    pattern: Pattern,
    started: Instant,
}

impl PatternFeed {
    pub fn new(pattern: Pattern) -> Self {
        Self {
            pattern,
            started: Instant::now(),
        }
    }
}

impl FrameSource for PatternFeed {
    fn label(&self) -> &str {
        self.pattern.label()
    }

    fn current_frame(&self) -> Option<SourceFrame> {
        let phase = (self.started.elapsed().as_millis() / 10) as u32;
        Some(self.pattern.render(FEED_WIDTH, FEED_HEIGHT, phase))
    }
}

/// Parse one section spec: `empty`, a pattern name, or `crop:<pattern>`
/// (the centre quarter of the pattern).
pub fn parse_section(spec: &str) -> anyhow::Result<SectionSource> {
    let spec = spec.trim();
    if spec == "empty" {
        return Ok(SectionSource::Empty);
    }
    if let Some(name) = spec.strip_prefix("crop:") {
        let feed: FeedHandle = Arc::new(PatternFeed::new(Pattern::parse(name)?));
        let crop = CropRegion::new(FEED_WIDTH / 4, FEED_HEIGHT / 4, FEED_WIDTH / 2, FEED_HEIGHT / 2);
        return Ok(SectionSource::CroppedFeed { feed, crop });
    }
    let feed: FeedHandle = Arc::new(PatternFeed::new(Pattern::parse(spec)?));
    Ok(SectionSource::LiveFeed(feed))
}

/// Parse the comma-separated list of exactly four section specs.
pub fn parse_sections(list: &str) -> anyhow::Result<Vec<SectionSource>> {
    let specs: Vec<&str> = list.split(',').collect();
    if specs.len() != SECTION_COUNT {
        bail!("expected {SECTION_COUNT} sections, got {}", specs.len());
    }
    specs
        .iter()
        .enumerate()
        .map(|(index, spec)| parse_section(spec).with_context(|| format!("section {index}")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_media_model::SourceKind;

    #[test]
    fn parses_all_section_kinds() {
        let sections = parse_sections("bars, empty,crop:grid,gradient").unwrap();
        let kinds: Vec<SourceKind> = sections.iter().map(SectionSource::kind).collect();
        assert_eq!(
            kinds,
            vec![
                SourceKind::LiveFeed,
                SourceKind::Empty,
                SourceKind::CroppedFeed,
                SourceKind::LiveFeed
            ]
        );
    }

    #[test]
    fn wrong_count_is_rejected() {
        assert!(parse_sections("bars,grid").is_err());
    }

    #[test]
    fn unknown_pattern_names_the_section() {
        let err = parse_sections("bars,grid,plaid,empty").unwrap_err();
        assert!(format!("{err:#}").contains("section 2"));
        assert!(format!("{err:#}").contains("plaid"));
    }

    #[test]
    fn rendered_frames_are_fully_painted() {
        for pattern in [Pattern::Bars, Pattern::Grid, Pattern::Gradient] {
            let frame = pattern.render(33, 17, 5);
            assert_eq!(frame.pixels.len(), 33 * 17 * 4);
        }
    }

    #[test]
    fn bars_span_the_width() {
        let frame = Pattern::Bars.render(70, 1, 0);
        assert_eq!(&frame.pixels[..4], &BARS[0]);
        assert_eq!(&frame.pixels[69 * 4..], &BARS[6]);
    }
}
