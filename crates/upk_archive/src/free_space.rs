//! Bookkeeping of archive space no longer referenced by any export

use tracing::trace;

/// A released byte range
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FreeExtent {
    pub start: u64,
    pub length: u64,
}

impl FreeExtent {
    pub fn end(&self) -> u64 {
        self.start + self.length
    }
}

/// First fit allocator over released extents.
///
/// Extents are assumed not to overlap. Adjacent extents are merged as they are added.
#[derive(Debug, Default, Clone)]
pub struct FreeSpace {
    extents: Vec<FreeExtent>,
}

impl FreeSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Release `length` bytes at `start`, merging with the extents ending or starting there
    pub fn add(&mut self, start: u64, length: u64) {
        if length == 0 {
            return;
        }

        let mut extent = FreeExtent { start, length };

        if let Some(index) = self.extents.iter().position(|e| e.end() == extent.start) {
            let before = self.extents.remove(index);
            extent.start = before.start;
            extent.length += before.length;
        }

        if let Some(index) = self.extents.iter().position(|e| e.start == extent.end()) {
            let after = self.extents.remove(index);
            extent.length += after.length;
        }

        trace!(
            start = format_args!("{:#010X}", extent.start),
            length = extent.length,
            "free extent"
        );
        self.extents.push(extent);
    }

    /// Take `length` bytes from the front of the first extent large enough to hold them
    pub fn allocate(&mut self, length: u64) -> Option<u64> {
        let index = self.extents.iter().position(|e| e.length >= length)?;
        let extent = &mut self.extents[index];

        let start = extent.start;
        extent.start += length;
        extent.length -= length;
        if extent.length == 0 {
            self.extents.remove(index);
        }

        trace!(start = format_args!("{start:#010X}"), length, "allocate");
        Some(start)
    }

    pub fn extents(&self) -> &[FreeExtent] {
        &self.extents
    }

    /// Whether any of the `length` bytes at `start` are already free
    pub fn overlaps(&self, start: u64, length: u64) -> bool {
        let end = start + length;
        length > 0 && self.extents.iter().any(|e| e.start < end && start < e.end())
    }

    /// Total number of free bytes
    pub fn total(&self) -> u64 {
        self.extents.iter().map(|e| e.length).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.extents.is_empty()
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::free_space::{FreeExtent, FreeSpace};

    #[test]
    fn coalesce_neighbours() {
        let mut space = FreeSpace::new();
        space.add(0, 10);
        space.add(20, 10);
        assert_eq!(space.extents().len(), 2);

        space.add(10, 10);
        assert_eq!(space.extents(), &[FreeExtent { start: 0, length: 30 }]);
    }

    #[test]
    fn first_fit_shrinks_from_front() {
        let mut space = FreeSpace::new();
        space.add(0x100, 5);
        space.add(0x200, 20);

        assert_eq!(space.allocate(10), Some(0x200));
        assert_eq!(
            space.extents(),
            &[
                FreeExtent { start: 0x100, length: 5 },
                FreeExtent { start: 0x20A, length: 10 },
            ]
        );

        assert_eq!(space.allocate(11), None);
        assert_eq!(space.allocate(5), Some(0x100));
        assert_eq!(space.extents(), &[FreeExtent { start: 0x20A, length: 10 }]);
        assert_eq!(space.total(), 10);
    }

    #[test]
    fn empty_extents_ignored() {
        let mut space = FreeSpace::new();
        space.add(0x40, 0);
        assert!(space.is_empty());
        assert_eq!(space.allocate(1), None);
    }

    #[test]
    fn overlapping_ranges() {
        let mut space = FreeSpace::new();
        space.add(0x100, 0x10);

        assert!(space.overlaps(0x10F, 4));
        assert!(space.overlaps(0xF0, 0x20));
        assert!(!space.overlaps(0x110, 4));
        assert!(!space.overlaps(0xF0, 0x10));
        assert!(!space.overlaps(0x104, 0));
    }
}
