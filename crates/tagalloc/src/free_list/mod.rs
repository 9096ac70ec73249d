//! Free-block tracking policies.
//!
//! The allocation engine talks to the free blocks only through
//! [`FreeCollection`]. Three policies implement it:
//!
//! - [`ScanningList`] keeps no state and walks the physical blocks.
//! - [`LinkedList`] threads one doubly-linked list through the free payloads.
//! - [`SegregatedList`] keeps one sorted [`LinkedList`] per size class.
//!
//! A policy is chosen once per heap through [`FitPolicy`] and held in a
//! [`FreeTracker`].

use alloc::string::String;
use core::str::FromStr;

use dataview::DataView;
use snafu::Snafu;
use snafu_utils::Location;

pub use self::{
    linked::{Iter, LinkedList},
    scanning::ScanningList,
    segregated::SegregatedList,
};
use crate::{block::BlockRef, check::CheckError};

mod linked;
mod scanning;
mod segregated;

/// Bookkeeping of the free blocks of a heap.
///
/// Membership is non-owning: blocks live in the region regardless of whether
/// a collection tracks them. The caller guarantees that a block is free (its
/// tags written with the allocated bit clear) whenever it is inserted or
/// removed, and that its size does not change while it is tracked.
pub trait FreeCollection {
    /// Returns a free block of at least `size` bytes, if one is tracked.
    fn find_fit(&self, view: &DataView, size: usize) -> Option<BlockRef>;

    /// Starts tracking the free block `block`.
    fn insert(&mut self, view: &mut DataView, block: BlockRef);

    /// Stops tracking the free block `block`.
    fn remove(&mut self, view: &mut DataView, block: BlockRef);

    /// Returns the size class `size` belongs to.
    ///
    /// Policies without size classes put every size in class 0.
    fn bucket_of(&self, size: usize) -> usize {
        let _ = size;
        0
    }

    /// Forgets every tracked block.
    fn reset(&mut self);

    /// Verifies the policy's own structure against the region.
    ///
    /// # Returns
    ///
    /// The number of tracked blocks, or `None` if membership is implicit in
    /// the boundary tags.
    fn audit(&self, view: &DataView) -> Result<Option<usize>, CheckError>;
}

/// Selects the free-list policy of a heap.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum FitPolicy {
    /// First fit over all physical blocks.
    #[display("scanning")]
    Scanning,
    /// First fit over one LIFO list of free blocks.
    #[display("linked")]
    Linked,
    /// First fit over size classes kept sorted by size.
    #[default]
    #[display("segregated")]
    Segregated,
}

impl FitPolicy {
    pub const ALL: [Self; 3] = [Self::Scanning, Self::Linked, Self::Segregated];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Scanning => "scanning",
            Self::Linked => "linked",
            Self::Segregated => "segregated",
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(display(
    "unknown free-list policy `{input}`, expected one of scanning, linked, segregated"
))]
pub struct ParseFitPolicyError {
    input: String,
    #[snafu(implicit)]
    location: Location,
}

impl FromStr for FitPolicy {
    type Err = ParseFitPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|policy| policy.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseFitPolicySnafu { input: s }.build())
    }
}

/// The free collection of a heap, holding the policy chosen at construction.
#[derive(Debug, Clone)]
pub enum FreeTracker {
    Scanning(ScanningList),
    Linked(LinkedList),
    Segregated(SegregatedList),
}

impl FreeTracker {
    #[must_use]
    pub fn new(policy: FitPolicy) -> Self {
        match policy {
            FitPolicy::Scanning => Self::Scanning(ScanningList::new()),
            FitPolicy::Linked => Self::Linked(LinkedList::new()),
            FitPolicy::Segregated => Self::Segregated(SegregatedList::new()),
        }
    }

    #[must_use]
    pub fn policy(&self) -> FitPolicy {
        match self {
            Self::Scanning(_) => FitPolicy::Scanning,
            Self::Linked(_) => FitPolicy::Linked,
            Self::Segregated(_) => FitPolicy::Segregated,
        }
    }

    fn as_dyn(&self) -> &dyn FreeCollection {
        match self {
            Self::Scanning(list) => list,
            Self::Linked(list) => list,
            Self::Segregated(list) => list,
        }
    }

    fn as_dyn_mut(&mut self) -> &mut dyn FreeCollection {
        match self {
            Self::Scanning(list) => list,
            Self::Linked(list) => list,
            Self::Segregated(list) => list,
        }
    }
}

impl FreeCollection for FreeTracker {
    fn find_fit(&self, view: &DataView, size: usize) -> Option<BlockRef> {
        self.as_dyn().find_fit(view, size)
    }

    fn insert(&mut self, view: &mut DataView, block: BlockRef) {
        self.as_dyn_mut().insert(view, block);
    }

    fn remove(&mut self, view: &mut DataView, block: BlockRef) {
        self.as_dyn_mut().remove(view, block);
    }

    fn bucket_of(&self, size: usize) -> usize {
        self.as_dyn().bucket_of(size)
    }

    fn reset(&mut self) {
        self.as_dyn_mut().reset();
    }

    fn audit(&self, view: &DataView) -> Result<Option<usize>, CheckError> {
        self.as_dyn().audit(view)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use alloc::vec::Vec;

    use super::*;
    use crate::block::{self, TagFlags};

    /// Lays out free and allocated blocks of the given sizes after a
    /// prologue, terminated by an epilogue, and returns them.
    pub(crate) fn layout_blocks(view: &mut DataView, blocks: &[(usize, bool)]) -> Vec<BlockRef> {
        block::write_tags(view, BlockRef::new(16), 16, TagFlags::ALLOCATED);
        let mut refs = Vec::new();
        let mut block = BlockRef::new(32);
        for &(size, allocated) in blocks {
            let flags = if allocated {
                TagFlags::ALLOCATED
            } else {
                TagFlags::empty()
            };
            block::write_tags(view, block, size, flags);
            refs.push(block);
            block = block::next(view, block);
        }
        block::write_epilogue(view, block);
        refs
    }

    pub(crate) fn with_test_view<F>(len: usize, test_fn: F)
    where
        F: FnOnce(&mut DataView),
    {
        let mut words = vec![0_u128; len / 16];
        test_fn(DataView::from_mut(&mut words[..]));
    }

    #[test]
    fn test_policy_names() {
        for policy in FitPolicy::ALL {
            assert_eq!(policy.to_string(), policy.name());
            assert_eq!(policy.name().parse::<FitPolicy>().unwrap(), policy);
        }
        assert_eq!("Linked".parse::<FitPolicy>().unwrap(), FitPolicy::Linked);
        assert!("best-fit".parse::<FitPolicy>().is_err());
        assert_eq!(FitPolicy::default(), FitPolicy::Segregated);
    }

    #[test]
    fn test_tracker_forwards_to_policy() {
        with_test_view(512, |view| {
            let blocks = layout_blocks(view, &[(64, false), (32, true), (128, false)]);
            for policy in FitPolicy::ALL {
                let mut tracker = FreeTracker::new(policy);
                assert_eq!(tracker.policy(), policy);
                tracker.insert(view, blocks[0]);
                tracker.insert(view, blocks[2]);
                assert_eq!(tracker.find_fit(view, 100), Some(blocks[2]));
                tracker.remove(view, blocks[2]);
                if policy == FitPolicy::Scanning {
                    assert_eq!(tracker.find_fit(view, 100), Some(blocks[2]));
                    assert_eq!(tracker.audit(view).unwrap(), None);
                } else {
                    assert_eq!(tracker.find_fit(view, 100), None);
                    assert_eq!(tracker.audit(view).unwrap(), Some(1));
                }
            }
        });
    }
}
