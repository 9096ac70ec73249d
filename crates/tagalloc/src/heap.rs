//! The allocation engine.
//!
//! A [`Heap`] owns a [`Region`] and a [`FreeTracker`] and implements
//! allocation, release and resize on top of the boundary-tag framing in
//! [`block`](crate::block).
//!
//! # Algorithm
//!
//! - **Allocation**: the request is padded with the boundary tags and
//!   rounded up to [`ALIGNMENT`]. The free collection is asked for a fit; on
//!   a miss the region grows by at least the configured chunk size. The
//!   chosen block is split when the remainder can form a block of its own.
//! - **Release**: the block is marked free and merged with every free
//!   physical neighbour before it is handed to the free collection, so no
//!   two adjacent blocks are ever both free.
//! - **Resize**: shrinks in place, grows into a free successor or
//!   predecessor when they are large enough, and only then falls back to
//!   allocate, copy and release.

use core::fmt;

use dataview::DataView;
use log::{debug, trace, warn};
use snafu::{OptionExt as _, ResultExt as _, ensure};

use crate::{
    ALIGNMENT, DOUBLE_WORD, MIN_BLOCK_SIZE, WORD_SIZE, adjusted_size,
    block::{self, BlockRef, TagFlags},
    check::{self, CheckError},
    config::HeapConfig,
    error::{AllocError, InitError},
    free_list::{FitPolicy, FreeCollection as _, FreeTracker},
    region::{GrowError, MemRegion, Region},
};

/// Payload offset of the prologue block.
pub(crate) const PROLOGUE: BlockRef = BlockRef::new(2 * WORD_SIZE);

/// Payload offset of the first block after the prologue.
pub(crate) const FIRST_BLOCK: BlockRef = BlockRef::new(4 * WORD_SIZE);

/// Bytes occupied by the padding word, the prologue and the epilogue.
pub(crate) const INITIAL_SIZE: usize = 4 * WORD_SIZE;

/// A heap with its own region and free collection.
///
/// Blocks handed out by a heap are identified by [`BlockRef`]s, which stay
/// valid until the block is released or moved by a resize. Using a
/// [`BlockRef`] that is not live is a logic error: it cannot corrupt memory
/// outside the region but will corrupt the heap itself. Debug builds catch
/// most such misuse with assertions.
pub struct Heap<R = MemRegion> {
    region: R,
    free: FreeTracker,
    config: HeapConfig,
}

impl fmt::Debug for Heap<MemRegion> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("policy", &self.policy())
            .field("heap_size", &self.heap_size())
            .field("free", &self.free)
            .finish_non_exhaustive()
    }
}

impl Heap<MemRegion> {
    /// Creates a heap backed by a [`MemRegion`] capped at the configured
    /// heap limit.
    pub fn new(config: HeapConfig) -> Result<Self, InitError> {
        Self::with_region(MemRegion::new(config.heap_limit()), config)
    }
}

impl<R> Heap<R>
where
    R: Region,
{
    /// Creates a heap on top of `region`, discarding its current contents.
    pub fn with_region(region: R, config: HeapConfig) -> Result<Self, InitError> {
        config.validate()?;
        let mut heap = Self {
            region,
            free: FreeTracker::new(config.policy()),
            config,
        };
        heap.init()?;
        Ok(heap)
    }

    /// Drops every block and rebuilds the initial heap.
    ///
    /// All [`BlockRef`]s handed out before become invalid.
    pub fn reset(&mut self) -> Result<(), InitError> {
        self.init()
    }

    fn init(&mut self) -> Result<(), InitError> {
        #[cfg_attr(not(test), expect(clippy::wildcard_imports))]
        use crate::error::init_error::*;

        self.region.reset();
        self.free.reset();

        let base = self.region.grow(INITIAL_SIZE).context(GrowSnafu)?;
        assert_eq!(base, 0, "region must be empty after a reset");
        let view = self.region.view_mut();
        view.write(0, &0_usize);
        block::write_tags(view, PROLOGUE, DOUBLE_WORD, TagFlags::ALLOCATED);
        block::write_epilogue(view, FIRST_BLOCK);

        self.extend(self.config.chunk_size()).context(GrowSnafu)?;
        debug!(
            "heap initialized: policy={}, size={}",
            self.policy(),
            self.heap_size()
        );
        Ok(())
    }

    #[must_use]
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    #[must_use]
    pub fn policy(&self) -> FitPolicy {
        self.free.policy()
    }

    #[must_use]
    pub fn region(&self) -> &R {
        &self.region
    }

    /// Returns the current size of the region, sentinels included.
    #[must_use]
    pub fn heap_size(&self) -> usize {
        self.region.len()
    }

    /// Grows the region by at least `bytes` and returns the resulting free
    /// block, already merged with a free predecessor and tracked.
    fn extend(&mut self, bytes: usize) -> Result<BlockRef, GrowError> {
        let size = bytes.next_multiple_of(ALIGNMENT);
        let old_len = self.region.grow(size)?;

        // the old epilogue header becomes the header of the new block
        let block = BlockRef::new(old_len);
        let view = self.region.view_mut();
        block::write_tags(view, block, size, TagFlags::empty());
        block::write_epilogue(view, block::next(view, block));
        debug!("heap extended by {size} bytes to {}", old_len + size);

        Ok(self.coalesce(block))
    }

    /// Merges the free, untracked `block` with its free neighbours and
    /// tracks the result.
    fn coalesce(&mut self, block: BlockRef) -> BlockRef {
        let view = self.region.view_mut();
        let prev = block::prev(view, block);
        let next = block::next(view, block);

        let mut start = block;
        let mut size = block::size(view, block);
        if !block::is_allocated(view, next) {
            self.free.remove(view, next);
            size += block::size(view, next);
        }
        if !block::is_allocated(view, prev) {
            self.free.remove(view, prev);
            size += block::size(view, prev);
            start = prev;
        }

        block::write_tags(view, start, size, TagFlags::empty());
        self.free.insert(view, start);
        start
    }

    /// Hands out the first `asize` bytes of the tracked free `block`.
    fn place(&mut self, block: BlockRef, asize: usize) {
        let view = self.region.view_mut();
        self.free.remove(view, block);

        let size = block::size(view, block);
        debug_assert!(size >= asize);
        if size - asize >= MIN_BLOCK_SIZE {
            block::write_tags(view, block, asize, TagFlags::ALLOCATED);
            let rest = block::next(view, block);
            block::write_tags(view, rest, size - asize, TagFlags::empty());
            self.free.insert(view, rest);
        } else {
            block::write_tags(view, block, size, TagFlags::ALLOCATED);
        }
    }

    /// Marks the untracked `block` allocated with `asize` of its `size`
    /// bytes, giving any large enough tail back to the free collection.
    fn trim(&mut self, block: BlockRef, size: usize, asize: usize) {
        let view = self.region.view_mut();
        if size - asize >= MIN_BLOCK_SIZE {
            block::write_tags(view, block, asize, TagFlags::ALLOCATED);
            let rest = block::next(view, block);
            block::write_tags(view, rest, size - asize, TagFlags::empty());
            self.coalesce(rest);
        } else {
            block::write_tags(view, block, size, TagFlags::ALLOCATED);
        }
    }

    /// Allocates a block with at least `size` bytes of payload.
    ///
    /// # Errors
    ///
    /// - [`AllocError::ZeroSize`] if `size` is zero.
    /// - [`AllocError::SizeOverflow`] if `size` plus the block overhead does
    ///   not fit in a `usize`.
    /// - [`AllocError::OutOfMemory`] if no free block fits and the region
    ///   cannot grow.
    pub fn try_allocate(&mut self, size: usize) -> Result<BlockRef, AllocError> {
        #[cfg_attr(not(test), expect(clippy::wildcard_imports))]
        use crate::error::alloc_error::*;

        ensure!(size != 0, ZeroSizeSnafu);
        let asize = adjusted_size(size).context(SizeOverflowSnafu { requested: size })?;

        let block = match self.free.find_fit(self.region.view(), asize) {
            Some(block) => block,
            None => self
                .extend(asize.max(self.config.chunk_size()))
                .inspect_err(|err| warn!("allocate({size}) failed: {err}"))
                .context(OutOfMemorySnafu { requested: size })?,
        };
        self.place(block, asize);

        trace!("allocate({size}) -> {block}");
        self.verify("allocate");
        Ok(block)
    }

    /// Allocates a block with at least `size` bytes of payload.
    ///
    /// Returns `None` if `size` is zero or the request cannot be served.
    pub fn allocate(&mut self, size: usize) -> Option<BlockRef> {
        self.try_allocate(size).ok()
    }

    /// Releases the live `block`.
    ///
    /// # Panics
    ///
    /// Panics if `block` is not a block of this heap. Debug builds also
    /// panic if it is not allocated.
    pub fn release(&mut self, block: BlockRef) {
        self.assert_live(block);

        let view = self.region.view_mut();
        let size = block::size(view, block);
        block::write_tags(view, block, size, TagFlags::empty());
        let merged = self.coalesce(block);

        trace!("release({block}) -> free {merged}");
        self.verify("release");
    }

    /// Resizes the live `block` to hold at least `size` bytes of payload.
    ///
    /// The first `min(old, new)` payload bytes are preserved. The returned
    /// block may differ from `block`, in which case `block` is no longer
    /// live. A `size` of zero shrinks the block to the minimum block size.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::SizeOverflow`] or [`AllocError::OutOfMemory`]
    /// if the block has to move and no block of the new size can be
    /// allocated. `block` is left untouched in that case.
    pub fn try_resize(&mut self, block: BlockRef, size: usize) -> Result<BlockRef, AllocError> {
        #[cfg_attr(not(test), expect(clippy::wildcard_imports))]
        use crate::error::alloc_error::*;

        self.assert_live(block);
        let asize = adjusted_size(size).context(SizeOverflowSnafu { requested: size })?;

        let resized = self.resize_block(block, size, asize)?;
        trace!("resize({block}, {size}) -> {resized}");
        self.verify("resize");
        Ok(resized)
    }

    /// Resizes the live `block`, returning `None` if it has to move and
    /// cannot.
    pub fn resize(&mut self, block: BlockRef, size: usize) -> Option<BlockRef> {
        self.try_resize(block, size).ok()
    }

    fn resize_block(
        &mut self,
        block: BlockRef,
        size: usize,
        asize: usize,
    ) -> Result<BlockRef, AllocError> {
        let view = self.region.view_mut();
        let old_size = block::size(view, block);

        if asize <= old_size {
            self.trim(block, old_size, asize);
            return Ok(block);
        }

        let next = block::next(view, block);
        let next_size = block::size(view, next);
        if !block::is_allocated(view, next) && old_size + next_size >= asize {
            self.free.remove(view, next);
            self.trim(block, old_size + next_size, asize);
            return Ok(block);
        }

        let prev = block::prev(view, block);
        let prev_size = block::size(view, prev);
        if !block::is_allocated(view, prev) && old_size + prev_size >= asize {
            self.free.remove(view, prev);
            let payload = block::payload_range(view, block);
            view.as_mut().copy_within(payload, prev.offset());
            self.trim(prev, old_size + prev_size, asize);
            return Ok(prev);
        }

        let moved = self.try_allocate(size)?;
        let view = self.region.view_mut();
        let src = block::payload_range(view, block);
        let dst = block::payload_range(view, moved);
        let len = src.len().min(dst.len());
        view.as_mut().copy_within(src.start..src.start + len, dst.start);
        self.release(block);
        Ok(moved)
    }

    fn assert_live(&self, block: BlockRef) {
        let view = self.region.view();
        assert!(
            block >= FIRST_BLOCK
                && block.offset() < view.len()
                && block.offset().is_multiple_of(ALIGNMENT),
            "{block} is not a block of this heap"
        );
        debug_assert!(
            block::is_allocated(view, block) && block::size(view, block) != 0,
            "{block} is not an allocated block"
        );
    }

    fn verify(&self, op: &str) {
        if cfg!(debug_assertions)
            && self.config.verify()
            && let Err(err) = self.check()
        {
            panic!("heap corrupted after {op}: {err}");
        }
    }

    /// Returns the payload of the live `block`.
    ///
    /// The payload is [`usable_size`](Self::usable_size) bytes long, which
    /// may be more than was requested.
    #[must_use]
    pub fn payload(&self, block: BlockRef) -> &[u8] {
        let view = self.region.view();
        &view.as_ref()[block::payload_range(view, block)]
    }

    /// Returns the payload of the live `block` for writing.
    #[must_use]
    pub fn payload_mut(&mut self, block: BlockRef) -> &mut [u8] {
        let range = block::payload_range(self.region.view(), block);
        &mut self.region.view_mut().as_mut()[range]
    }

    /// Returns the number of payload bytes of `block`.
    #[must_use]
    pub fn usable_size(&self, block: BlockRef) -> usize {
        block::payload_range(self.region.view(), block).len()
    }

    /// Returns the size of `block`, boundary tags included.
    #[must_use]
    pub fn block_size(&self, block: BlockRef) -> usize {
        block::size(self.region.view(), block)
    }

    /// Verifies every invariant of the heap.
    pub fn check(&self) -> Result<(), CheckError> {
        check::check_heap(self.region.view(), &self.free)
    }

    /// Returns an iterator over every block between the sentinels, in
    /// address order.
    #[must_use]
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            view: self.region.view(),
            cursor: FIRST_BLOCK,
        }
    }

    /// Summarizes the blocks of the heap.
    #[must_use]
    pub fn stats(&self) -> HeapStats {
        self.blocks().fold(
            HeapStats {
                heap_size: self.heap_size(),
                ..HeapStats::default()
            },
            |mut stats, info| {
                if info.allocated {
                    stats.allocated_blocks += 1;
                    stats.allocated_bytes += info.size;
                } else {
                    stats.free_blocks += 1;
                    stats.free_bytes += info.size;
                    stats.largest_free = stats.largest_free.max(info.size);
                }
                stats
            },
        )
    }
}

/// A block as seen by [`Heap::blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub block: BlockRef,
    pub size: usize,
    pub allocated: bool,
}

/// Iterator over the blocks of a [`Heap`].
pub struct Blocks<'a> {
    view: &'a DataView,
    cursor: BlockRef,
}

impl Iterator for Blocks<'_> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.cursor;
        let tag = block::header(self.view, block);
        if tag.size() == 0 {
            return None;
        }
        self.cursor = block::next(self.view, block);
        Some(BlockInfo {
            block,
            size: tag.size(),
            allocated: tag.is_allocated(),
        })
    }
}

/// Block counts and byte totals of a heap, sentinels excluded.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    /// Size of the region in bytes.
    pub heap_size: usize,
    pub allocated_blocks: usize,
    /// Bytes in allocated blocks, boundary tags included.
    pub allocated_bytes: usize,
    pub free_blocks: usize,
    pub free_bytes: usize,
    /// Size of the largest free block.
    pub largest_free: usize,
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;
    use crate::{CHUNK_SIZE, free_list::FitPolicy};

    fn with_test_heap<F>(policy: FitPolicy, test_fn: F)
    where
        F: FnOnce(&mut Heap),
    {
        let config = HeapConfig::default()
            .with_policy(policy)
            .with_verify(true);
        let mut heap = Heap::new(config).unwrap();
        test_fn(&mut heap);
        heap.check().unwrap();
    }

    fn for_each_policy<F>(test_fn: F)
    where
        F: Fn(&mut Heap),
    {
        for policy in FitPolicy::ALL {
            with_test_heap(policy, &test_fn);
        }
    }

    fn layout(heap: &Heap) -> Vec<(usize, usize, bool)> {
        heap.blocks()
            .map(|info| (info.block.offset(), info.size, info.allocated))
            .collect()
    }

    #[test]
    fn test_initial_layout() {
        for_each_policy(|heap| {
            assert_eq!(heap.heap_size(), INITIAL_SIZE + CHUNK_SIZE);
            assert_eq!(layout(heap), [(32, CHUNK_SIZE, false)]);
            let view = heap.region().view();
            assert_eq!(block::size(view, PROLOGUE), DOUBLE_WORD);
            assert!(block::is_allocated(view, PROLOGUE));
            let epilogue = BlockRef::new(heap.heap_size());
            assert_eq!(block::size(view, epilogue), 0);
            assert!(block::is_allocated(view, epilogue));
        });
    }

    #[test]
    fn test_allocate_splits() {
        for_each_policy(|heap| {
            let block = heap.allocate(100).unwrap();
            assert_eq!(block, FIRST_BLOCK);
            assert_eq!(heap.block_size(block), 128);
            assert_eq!(heap.usable_size(block), 112);
            assert_eq!(heap.payload(block).len(), 112);
            assert_eq!(
                layout(heap),
                [(32, 128, true), (160, CHUNK_SIZE - 128, false)]
            );
        });
    }

    #[test]
    fn test_allocate_consumes_small_remainder() {
        for_each_policy(|heap| {
            // leaves 16 bytes, too small to split off
            let block = heap.allocate(CHUNK_SIZE - 32).unwrap();
            assert_eq!(heap.block_size(block), CHUNK_SIZE);
            assert_eq!(heap.stats().free_blocks, 0);
        });
    }

    #[test]
    fn test_allocate_zero() {
        for_each_policy(|heap| {
            assert!(heap.try_allocate(0).unwrap_err().is_zero_size());
            assert_eq!(heap.allocate(0), None);
            assert_eq!(layout(heap), [(32, CHUNK_SIZE, false)]);
        });
    }

    #[test]
    fn test_allocate_overflow() {
        for_each_policy(|heap| {
            let err = heap.try_allocate(usize::MAX - 4).unwrap_err();
            assert!(err.is_size_overflow());
        });
    }

    #[test]
    fn test_extend_merges_with_free_tail() {
        for_each_policy(|heap| {
            let a = heap.allocate(1000).unwrap();
            // 4096 - 1024 free at the tail, not enough for 4000
            let b = heap.allocate(4000).unwrap();
            assert_eq!(b.offset(), a.offset() + 1024);
            assert_eq!(heap.heap_size(), INITIAL_SIZE + 2 * CHUNK_SIZE);
            assert_eq!(
                layout(heap),
                [(32, 1024, true), (1056, 4016, true), (5072, 3152, false)]
            );
        });
    }

    fn fill(heap: &mut Heap, block: BlockRef, len: usize, seed: u8) {
        let pattern = (0..=u8::MAX).cycle();
        for (byte, value) in heap.payload_mut(block)[..len].iter_mut().zip(pattern) {
            *byte = seed.wrapping_add(value);
        }
    }

    fn assert_filled(heap: &Heap, block: BlockRef, len: usize, seed: u8) {
        let pattern = (0..=u8::MAX).cycle();
        for (i, (&byte, value)) in heap.payload(block)[..len].iter().zip(pattern).enumerate() {
            assert_eq!(byte, seed.wrapping_add(value), "byte {i} of {block}");
        }
    }

    #[test]
    fn test_release_coalesces_all_four_cases() {
        for_each_policy(|heap| {
            let a = heap.allocate(100).unwrap();
            let b = heap.allocate(100).unwrap();
            let c = heap.allocate(100).unwrap();
            let d = heap.allocate(100).unwrap();
            let tail = CHUNK_SIZE - 4 * 128;

            // neither neighbour free
            heap.release(a);
            assert_eq!(layout(heap)[0], (32, 128, false));

            // predecessor free
            heap.release(b);
            assert_eq!(
                layout(heap),
                [(32, 256, false), (288, 128, true), (416, 128, true), (544, tail, false)]
            );

            // successor free
            heap.release(d);
            assert_eq!(
                layout(heap),
                [(32, 256, false), (288, 128, true), (416, 128 + tail, false)]
            );

            // both free
            heap.release(c);
            assert_eq!(layout(heap), [(32, CHUNK_SIZE, false)]);

            let block = heap.allocate(CHUNK_SIZE - DOUBLE_WORD).unwrap();
            assert_eq!(block, FIRST_BLOCK);
            assert_eq!(heap.heap_size(), INITIAL_SIZE + CHUNK_SIZE);
        });
    }

    #[test]
    fn test_resize_same_size() {
        for_each_policy(|heap| {
            let block = heap.allocate(100).unwrap();
            assert_eq!(heap.resize(block, 110), Some(block));
            assert_eq!(heap.resize(block, 100), Some(block));
            assert_eq!(heap.block_size(block), 128);
        });
    }

    #[test]
    fn test_shrink_coalesces_with_free_successor() {
        for_each_policy(|heap| {
            let block = heap.allocate(4000).unwrap();
            assert_eq!(layout(heap), [(32, 4016, true), (4048, 80, false)]);
            fill(heap, block, 8, 7);

            assert_eq!(heap.resize(block, 10), Some(block));
            assert_eq!(layout(heap), [(32, 32, true), (64, 4064, false)]);
            assert_filled(heap, block, 8, 7);
        });
    }

    #[test]
    fn test_shrink_keeps_small_remainder() {
        for_each_policy(|heap| {
            let block = heap.allocate(100).unwrap();
            assert_eq!(heap.resize(block, 90), Some(block));
            assert_eq!(heap.block_size(block), 128);
        });
    }

    #[test]
    fn test_resize_to_zero_shrinks_to_minimum() {
        for_each_policy(|heap| {
            let block = heap.allocate(500).unwrap();
            assert_eq!(heap.resize(block, 0), Some(block));
            assert_eq!(heap.block_size(block), MIN_BLOCK_SIZE);
            assert_eq!(layout(heap), [(32, 32, true), (64, CHUNK_SIZE - 32, false)]);
        });
    }

    #[test]
    fn test_grow_into_successor() {
        for_each_policy(|heap| {
            let block = heap.allocate(100).unwrap();
            fill(heap, block, 100, 1);
            assert_eq!(heap.resize(block, 200), Some(block));
            assert_eq!(layout(heap), [(32, 224, true), (256, CHUNK_SIZE - 224, false)]);
            assert_filled(heap, block, 100, 1);
        });
    }

    #[test]
    fn test_grow_into_predecessor() {
        for_each_policy(|heap| {
            let a = heap.allocate(100).unwrap();
            let b = heap.allocate(100).unwrap();
            let _c = heap.allocate(100).unwrap();
            fill(heap, b, 112, 9);
            heap.release(a);

            let moved = heap.resize(b, 200).unwrap();
            assert_eq!(moved, a);
            assert_eq!(layout(heap)[..3], [(32, 224, true), (256, 32, false), (288, 128, true)]);
            assert_filled(heap, moved, 112, 9);
        });
    }

    #[test]
    fn test_grow_into_predecessor_merges_remainder_with_successor() {
        for_each_policy(|heap| {
            let a = heap.allocate(100).unwrap();
            let b = heap.allocate(100).unwrap();
            let c = heap.allocate(16).unwrap();
            let _d = heap.allocate(100).unwrap();
            fill(heap, b, 112, 3);
            heap.release(c);
            heap.release(a);

            // successor too small, predecessor large enough
            let moved = heap.resize(b, 200).unwrap();
            assert_eq!(moved, a);
            assert_eq!(
                layout(heap)[..3],
                [(32, 224, true), (256, 64, false), (320, 128, true)]
            );
            assert_filled(heap, moved, 112, 3);
        });
    }

    #[test]
    fn test_resize_relocates() {
        for_each_policy(|heap| {
            let a = heap.allocate(100).unwrap();
            let _b = heap.allocate(100).unwrap();
            fill(heap, a, 112, 5);

            let moved = heap.resize(a, 1000).unwrap();
            assert_ne!(moved, a);
            assert_eq!(moved.offset(), 288);
            assert_filled(heap, moved, 112, 5);
            assert_eq!(layout(heap)[0], (32, 128, false));
        });
    }

    #[test]
    fn test_failed_resize_leaves_block_untouched() {
        for policy in FitPolicy::ALL {
            let config = HeapConfig::default()
                .with_policy(policy)
                .with_heap_limit(INITIAL_SIZE + CHUNK_SIZE)
                .with_verify(true);
            let mut heap = Heap::new(config).unwrap();
            let a = heap.allocate(100).unwrap();
            let _b = heap.allocate(100).unwrap();
            fill(&mut heap, a, 112, 11);
            let before = layout(&heap);

            let err = heap.try_resize(a, 2 * CHUNK_SIZE).unwrap_err();
            assert!(err.is_out_of_memory());
            assert_eq!(layout(&heap), before);
            assert_filled(&heap, a, 112, 11);
            assert_eq!(heap.resize(a, 2 * CHUNK_SIZE), None);
            heap.check().unwrap();
        }
    }

    #[test]
    fn test_out_of_memory() {
        for policy in FitPolicy::ALL {
            let config = HeapConfig::default()
                .with_policy(policy)
                .with_heap_limit(INITIAL_SIZE + 3 * CHUNK_SIZE);
            let mut heap = Heap::new(config).unwrap();
            let err = heap.try_allocate(3 * CHUNK_SIZE).unwrap_err();
            assert!(matches!(err, AllocError::OutOfMemory { .. }));
            // a request that fits after one extension still succeeds
            let block = heap.allocate(CHUNK_SIZE).unwrap();
            assert_eq!(block, FIRST_BLOCK);
            heap.check().unwrap();
        }
    }

    #[test]
    fn test_reset() {
        for_each_policy(|heap| {
            for size in [10, 200, 3000, 9000] {
                heap.allocate(size).unwrap();
            }
            heap.reset().unwrap();
            assert_eq!(layout(heap), [(32, CHUNK_SIZE, false)]);
            assert_eq!(heap.heap_size(), INITIAL_SIZE + CHUNK_SIZE);
            assert_eq!(heap.allocate(100), Some(FIRST_BLOCK));
        });
    }

    #[test]
    fn test_stats() {
        for_each_policy(|heap| {
            let a = heap.allocate(100).unwrap();
            let _b = heap.allocate(1000).unwrap();
            heap.release(a);
            assert_eq!(
                heap.stats(),
                HeapStats {
                    heap_size: INITIAL_SIZE + CHUNK_SIZE,
                    allocated_blocks: 1,
                    allocated_bytes: 1024,
                    free_blocks: 2,
                    free_bytes: CHUNK_SIZE - 1024,
                    largest_free: CHUNK_SIZE - 1024 - 128,
                }
            );
        });
    }

    #[test]
    fn test_with_custom_region() {
        let region = MemRegion::new(1 << 16);
        let config = HeapConfig::default().with_chunk_size(256);
        let mut heap = Heap::with_region(region, config).unwrap();
        assert_eq!(heap.heap_size(), INITIAL_SIZE + 256);
        assert_eq!(heap.region().limit(), 1 << 16);
        let block = heap.allocate(1000).unwrap();
        assert_eq!(heap.block_size(block), 1024);
        assert_eq!(heap.heap_size(), INITIAL_SIZE + 256 + 1024);
        heap.check().unwrap();
    }

    #[test]
    #[should_panic = "not a block of this heap"]
    fn test_release_sentinel_panics() {
        let mut heap = Heap::new(HeapConfig::default()).unwrap();
        heap.release(PROLOGUE);
    }
}
