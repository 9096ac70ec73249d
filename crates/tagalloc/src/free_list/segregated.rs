//! Size-classed free lists.
//!
//! Free blocks are spread over [`SIZE_CLASS_COUNT`] independent
//! [`LinkedList`]s. A block of `size` bytes belongs to class
//! `ceil(log2(size))`, clamped to the last class, which therefore collects
//! every large block. Each class is kept sorted by ascending size, so the
//! first fit found in a class is the best fit of that class. Every block in
//! a later class is at least as large as any request that maps to an earlier
//! one, so the search never has to look back.

use dataview::DataView;
use snafu::ensure;

use super::{FreeCollection, LinkedList};
use crate::{
    SIZE_CLASS_COUNT,
    block::{self, BlockRef},
    check::CheckError,
};

#[derive(Debug, Clone)]
pub struct SegregatedList {
    buckets: [LinkedList; SIZE_CLASS_COUNT],
}

impl Default for SegregatedList {
    fn default() -> Self {
        Self::new()
    }
}

impl SegregatedList {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buckets: [const { LinkedList::new() }; SIZE_CLASS_COUNT],
        }
    }

    /// Returns the list holding size class `bucket`.
    ///
    /// # Panics
    ///
    /// Panics if `bucket` is not below [`SIZE_CLASS_COUNT`].
    #[must_use]
    pub fn bucket(&self, bucket: usize) -> &LinkedList {
        &self.buckets[bucket]
    }

    /// Returns the index of the smallest power of two that is at least
    /// `size`, clamped to the last size class.
    #[must_use]
    pub fn class_of(size: usize) -> usize {
        if size == 0 {
            return 0;
        }
        size.checked_next_power_of_two()
            .map_or(SIZE_CLASS_COUNT - 1, |pow| {
                (pow.trailing_zeros() as usize).min(SIZE_CLASS_COUNT - 1)
            })
    }
}

impl FreeCollection for SegregatedList {
    fn find_fit(&self, view: &DataView, size: usize) -> Option<BlockRef> {
        self.buckets[Self::class_of(size)..]
            .iter()
            .find_map(|bucket| {
                bucket
                    .iter(view)
                    .find(|&block| block::size(view, block) >= size)
            })
    }

    fn insert(&mut self, view: &mut DataView, block: BlockRef) {
        let size = block::size(view, block);
        let bucket = &mut self.buckets[Self::class_of(size)];
        let after = bucket
            .iter(view)
            .take_while(|&member| block::size(view, member) < size)
            .last();
        bucket.insert_after(view, block, after);
    }

    fn remove(&mut self, view: &mut DataView, block: BlockRef) {
        let size = block::size(view, block);
        self.buckets[Self::class_of(size)].unlink(view, block);
    }

    fn bucket_of(&self, size: usize) -> usize {
        Self::class_of(size)
    }

    fn reset(&mut self) {
        for bucket in &mut self.buckets {
            bucket.reset();
        }
    }

    fn audit(&self, view: &DataView) -> Result<Option<usize>, CheckError> {
        #[cfg_attr(not(test), expect(clippy::wildcard_imports))]
        use crate::check::check_error::*;

        let mut total = 0;
        for (index, bucket) in self.buckets.iter().enumerate() {
            let mut last_size = 0;
            total += bucket.audit_with(view, |block| {
                let size = block::size(view, block);
                let expected = Self::class_of(size);
                ensure!(
                    expected == index,
                    WrongBucketSnafu {
                        block,
                        size,
                        bucket: index,
                        expected,
                    }
                );
                ensure!(
                    size >= last_size,
                    UnsortedBucketSnafu {
                        block,
                        bucket: index,
                    }
                );
                last_size = size;
                Ok(())
            })?;
        }
        Ok(Some(total))
    }
}
