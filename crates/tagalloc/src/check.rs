//! Heap consistency checker.
//!
//! Walks every block between the sentinels and verifies the boundary tags,
//! then lets the free collection verify its own structure. Used by
//! [`Heap::check`](crate::Heap::check) and, when enabled in the
//! [`HeapConfig`](crate::HeapConfig), after every mutating operation.

use dataview::DataView;
use snafu::{Snafu, ensure};
use snafu_utils::{Located, Location};

use crate::{
    ALIGNMENT, DOUBLE_WORD, MIN_BLOCK_SIZE,
    block::{self, BlockRef, Tag, TagFlags},
    free_list::FreeCollection,
    heap::{FIRST_BLOCK, INITIAL_SIZE, PROLOGUE},
};

#[derive(Debug, Snafu)]
#[snafu(module, visibility(pub(crate)))]
pub enum CheckError {
    #[snafu(display("region of {len} bytes cannot hold the sentinels"))]
    RegionTooSmall {
        len: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("corrupted prologue: header {header:?}, footer {footer:?}"))]
    BadPrologue {
        header: Tag,
        footer: Tag,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("bad epilogue {tag:?} at {offset:#x}"))]
    BadEpilogue {
        offset: usize,
        tag: Tag,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("block {block} is not aligned to {ALIGNMENT} bytes"))]
    Misaligned {
        block: BlockRef,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("block {block} has invalid size {size}"))]
    BadSize {
        block: BlockRef,
        size: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("block {block} of {size} bytes runs past the region end {len:#x}"))]
    OutOfRegion {
        block: BlockRef,
        size: usize,
        len: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("header {header:?} and footer {footer:?} of block {block} disagree"))]
    TagMismatch {
        block: BlockRef,
        header: Tag,
        footer: Tag,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("adjacent free blocks {block} and {next} were not coalesced"))]
    AdjacentFree {
        block: BlockRef,
        next: BlockRef,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("free list loops back through block {block}"))]
    FreeListCycle {
        block: BlockRef,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("free list entry {block} is outside the region"))]
    LinkOutOfRegion {
        block: BlockRef,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("allocated block {block} is in a free list"))]
    AllocatedInFreeList {
        block: BlockRef,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display(
        "free list entry {block} links back to {found:?} instead of {expected:?}"
    ))]
    BrokenLink {
        block: BlockRef,
        expected: Option<BlockRef>,
        found: Option<BlockRef>,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display(
        "free block {block} of {size} bytes is in size class {bucket} instead of {expected}"
    ))]
    WrongBucket {
        block: BlockRef,
        size: usize,
        bucket: usize,
        expected: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("size class {bucket} is not sorted at block {block}"))]
    UnsortedBucket {
        block: BlockRef,
        bucket: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("{walked} free blocks in the heap but {tracked} in the free list"))]
    FreeCountMismatch {
        walked: usize,
        tracked: usize,
        #[snafu(implicit)]
        location: Location,
    },
}

impl Located for CheckError {
    fn location(&self) -> Option<Location> {
        let (Self::RegionTooSmall { location, .. }
        | Self::BadPrologue { location, .. }
        | Self::BadEpilogue { location, .. }
        | Self::Misaligned { location, .. }
        | Self::BadSize { location, .. }
        | Self::OutOfRegion { location, .. }
        | Self::TagMismatch { location, .. }
        | Self::AdjacentFree { location, .. }
        | Self::FreeListCycle { location, .. }
        | Self::LinkOutOfRegion { location, .. }
        | Self::AllocatedInFreeList { location, .. }
        | Self::BrokenLink { location, .. }
        | Self::WrongBucket { location, .. }
        | Self::UnsortedBucket { location, .. }
        | Self::FreeCountMismatch { location, .. }) = self;
        Some(*location)
    }
}

/// Verifies the whole heap laid out in `view` and tracked by `free`.
pub(crate) fn check_heap<F>(view: &DataView, free: &F) -> Result<(), CheckError>
where
    F: FreeCollection + ?Sized,
{
    #[cfg_attr(not(test), expect(clippy::wildcard_imports))]
    use self::check_error::*;

    let len = view.len();
    ensure!(len >= INITIAL_SIZE, RegionTooSmallSnafu { len });

    let header = block::header(view, PROLOGUE);
    let footer = block::footer(view, PROLOGUE);
    ensure!(
        header == Tag::new(DOUBLE_WORD, TagFlags::ALLOCATED) && footer == header,
        BadPrologueSnafu { header, footer }
    );

    let mut walked = 0;
    let mut prev_free = None;
    let mut block = FIRST_BLOCK;
    loop {
        let header = block::header(view, block);
        let size = header.size();
        if size == 0 {
            ensure!(
                header.is_allocated() && block.offset() == len,
                BadEpilogueSnafu {
                    offset: block::header_offset(block),
                    tag: header,
                }
            );
            break;
        }

        ensure!(
            block.offset().is_multiple_of(ALIGNMENT),
            MisalignedSnafu { block }
        );
        ensure!(size >= MIN_BLOCK_SIZE, BadSizeSnafu { block, size });
        ensure!(
            block.offset() + size <= len,
            OutOfRegionSnafu { block, size, len }
        );
        let footer = block::footer(view, block);
        ensure!(
            header == footer,
            TagMismatchSnafu {
                block,
                header,
                footer,
            }
        );

        if header.is_allocated() {
            prev_free = None;
        } else {
            if let Some(prev) = prev_free {
                return AdjacentFreeSnafu { block: prev, next: block }.fail();
            }
            prev_free = Some(block);
            walked += 1;
        }
        block = block::next(view, block);
    }

    if let Some(tracked) = free.audit(view)? {
        ensure!(tracked == walked, FreeCountMismatchSnafu { walked, tracked });
    }

    Ok(())
}
