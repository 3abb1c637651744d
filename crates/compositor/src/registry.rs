//! Live section assignment.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use mosaic_common::{MosaicError, MosaicResult};
use mosaic_media_model::{Section, SectionSource, SourceKind, SourceProvider, SECTION_COUNT};

/// The four section slots.
///
/// The UI layer mutates slots while a session runs; the scheduler pulls a
/// fresh snapshot through [`SourceProvider::sections`] on every tick.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    slots: RwLock<[SectionSource; SECTION_COUNT]>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `source` to section `index`, releasing the feed it displaces.
    pub fn assign(&self, index: usize, source: SectionSource) -> MosaicResult<()> {
        check_index(index)?;
        let previous = {
            let mut slots = self.write();
            std::mem::replace(&mut slots[index], source.clone())
        };
        release_displaced(&previous, &source);
        tracing::debug!(index, kind = ?source.kind(), "Section assigned");
        Ok(())
    }

    /// Reset section `index` to empty.
    pub fn clear(&self, index: usize) -> MosaicResult<()> {
        self.assign(index, SectionSource::Empty)
    }

    pub fn kind(&self, index: usize) -> MosaicResult<SourceKind> {
        check_index(index)?;
        Ok(self.read()[index].kind())
    }

    /// Empty every section, releasing all feeds.
    pub fn clear_all(&self) {
        let previous = std::mem::take(&mut *self.write());
        for source in &previous {
            if let Some(feed) = source.feed() {
                feed.release();
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, [SectionSource; SECTION_COUNT]> {
        self.slots.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, [SectionSource; SECTION_COUNT]> {
        self.slots.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SourceProvider for SourceRegistry {
    fn sections(&self) -> [Section; SECTION_COUNT] {
        let slots = self.read();
        std::array::from_fn(|index| Section {
            index,
            source: slots[index].clone(),
        })
    }
}

fn check_index(index: usize) -> MosaicResult<()> {
    if index >= SECTION_COUNT {
        return Err(MosaicError::config(format!(
            "section index {index} out of range (0..{SECTION_COUNT})"
        )));
    }
    Ok(())
}

/// Reassigning the same feed (e.g. only changing its crop) keeps it alive.
fn release_displaced(previous: &SectionSource, next: &SectionSource) {
    let Some(old) = previous.feed() else {
        return;
    };
    let kept = next.feed().is_some_and(|new| Arc::ptr_eq(old, new));
    if !kept {
        old.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_media_model::{CropRegion, FeedHandle, FrameSource, SourceFrame};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingFeed {
        released: AtomicUsize,
    }

    impl FrameSource for CountingFeed {
        fn current_frame(&self) -> Option<SourceFrame> {
            None
        }

        fn release(&self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn starts_with_four_empty_sections() {
        let registry = SourceRegistry::new();
        let sections = registry.sections();
        assert_eq!(sections.len(), SECTION_COUNT);
        assert!(sections.iter().all(|s| s.kind() == SourceKind::Empty));
    }

    #[test]
    fn snapshot_reflects_latest_assignment() {
        let registry = SourceRegistry::new();
        let before = registry.sections();
        let feed: FeedHandle = Arc::new(CountingFeed::default());
        registry.assign(2, SectionSource::LiveFeed(feed)).unwrap();

        assert_eq!(before[2].kind(), SourceKind::Empty);
        assert_eq!(registry.sections()[2].kind(), SourceKind::LiveFeed);
        assert_eq!(registry.kind(2).unwrap(), SourceKind::LiveFeed);
    }

    #[test]
    fn clear_releases_backing_feed() {
        let registry = SourceRegistry::new();
        let feed = Arc::new(CountingFeed::default());
        registry
            .assign(0, SectionSource::LiveFeed(feed.clone()))
            .unwrap();
        registry.clear(0).unwrap();
        assert_eq!(feed.released.load(Ordering::SeqCst), 1);
        assert_eq!(registry.kind(0).unwrap(), SourceKind::Empty);
    }

    #[test]
    fn recropping_same_feed_keeps_it() {
        let registry = SourceRegistry::new();
        let feed = Arc::new(CountingFeed::default());
        let handle: FeedHandle = feed.clone();
        registry
            .assign(1, SectionSource::LiveFeed(handle.clone()))
            .unwrap();
        registry
            .assign(
                1,
                SectionSource::CroppedFeed {
                    feed: handle,
                    crop: CropRegion::new(0, 0, 10, 10),
                },
            )
            .unwrap();
        assert_eq!(feed.released.load(Ordering::SeqCst), 0);
        assert_eq!(registry.kind(1).unwrap(), SourceKind::CroppedFeed);

        registry.clear_all();
        assert_eq!(feed.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let registry = SourceRegistry::new();
        assert!(matches!(
            registry.clear(4),
            Err(MosaicError::Config { .. })
        ));
        assert!(registry.kind(9).is_err());
    }
}
