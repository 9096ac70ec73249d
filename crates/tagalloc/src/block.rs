//! Boundary-tag framing of heap blocks.
//!
//! Every block starts with a header word and ends with a footer word. Both
//! hold the same [`Tag`]: the block size with the [`TagFlags`] packed into
//! the low bits, which are always zero in a size because sizes are multiples
//! of [`ALIGNMENT`].
//!
//! ```text
//!            bp - 8     bp                         bp + size - 16
//!            ┌────────┬──────────────────────────┬────────┐
//! allocated: │ header │ payload                  │ footer │
//!            ├────────┼────────┬────────┬────────┼────────┤
//! free:      │ header │ pred   │ succ   │ ...    │ footer │
//!            └────────┴────────┴────────┴────────┴────────┘
//! ```
//!
//! The functions in this module are the only place where offsets inside the
//! region are computed from a [`BlockRef`].

use core::{fmt, ops::Range};

use bitflags::bitflags;
use dataview::{DataView, Pod};

use crate::{ALIGNMENT, DOUBLE_WORD, WORD_SIZE};

bitflags! {
    /// Flags stored in the low bits of a boundary tag.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TagFlags: usize {
        /// Allocated Bit of a boundary tag.
        ///
        /// If set, the block is handed out (or is a sentinel) and its payload
        /// is opaque. If clear, the payload starts with [`FreeLinks`].
        const ALLOCATED = 1 << 0;
    }
}

const FLAGS_MASK: usize = ALIGNMENT - 1;
const SIZE_MASK: usize = !FLAGS_MASK;

const _: () = assert!(FLAGS_MASK.count_ones() == ALIGNMENT.trailing_zeros());
const _: () = assert!(FLAGS_MASK & TagFlags::all().bits() == TagFlags::all().bits());

/// A header or footer word.
#[repr(transparent)]
#[derive(Pod, Clone, Copy, PartialEq, Eq)]
pub struct Tag(usize);

impl Tag {
    /// Packs `size` and `flags` into a tag.
    ///
    /// # Panics
    ///
    /// Panics if `size` is not a multiple of [`ALIGNMENT`].
    #[must_use]
    pub fn new(size: usize, flags: TagFlags) -> Self {
        assert!(
            size & SIZE_MASK == size,
            "block size must be a multiple of the alignment"
        );
        Self(size | flags.bits())
    }

    #[must_use]
    pub fn size(self) -> usize {
        self.0 & SIZE_MASK
    }

    #[must_use]
    pub fn flags(self) -> TagFlags {
        TagFlags::from_bits_retain(self.0 & FLAGS_MASK)
    }

    #[must_use]
    pub fn is_allocated(self) -> bool {
        self.flags().contains(TagFlags::ALLOCATED)
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tag")
            .field("size", &self.size())
            .field("flags", &self.flags())
            .finish()
    }
}

/// A block, identified by the offset of its payload inside the region.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display,
)]
#[display("{_0:#x}")]
pub struct BlockRef(usize);

impl BlockRef {
    #[must_use]
    pub const fn new(offset: usize) -> Self {
        Self(offset)
    }

    /// Returns the payload offset of this block.
    #[must_use]
    pub const fn offset(self) -> usize {
        self.0
    }

    fn encode(block: Option<Self>) -> usize {
        block.map_or(0, Self::offset)
    }

    fn decode(offset: usize) -> Option<Self> {
        (offset != 0).then_some(Self(offset))
    }
}

/// In-payload layout of the link words of a free block.
#[repr(C)]
#[derive(Pod, Clone, Copy)]
struct RawLinks {
    pred: usize,
    succ: usize,
}
const _: () = assert!(size_of::<RawLinks>() + DOUBLE_WORD <= crate::MIN_BLOCK_SIZE);

/// Neighbours of a free block inside a free list.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FreeLinks {
    pub pred: Option<BlockRef>,
    pub succ: Option<BlockRef>,
}

#[must_use]
pub fn header_offset(block: BlockRef) -> usize {
    block.0 - WORD_SIZE
}

#[must_use]
pub fn footer_offset(view: &DataView, block: BlockRef) -> usize {
    block.0 + size(view, block) - DOUBLE_WORD
}

#[must_use]
pub fn header(view: &DataView, block: BlockRef) -> Tag {
    view.read(header_offset(block))
}

#[must_use]
pub fn footer(view: &DataView, block: BlockRef) -> Tag {
    view.read(footer_offset(view, block))
}

/// Returns the size of `block` as recorded in its header.
#[must_use]
pub fn size(view: &DataView, block: BlockRef) -> usize {
    header(view, block).size()
}

#[must_use]
pub fn is_allocated(view: &DataView, block: BlockRef) -> bool {
    header(view, block).is_allocated()
}

/// Returns the block physically following `block`.
///
/// For the last real block this is the epilogue.
#[must_use]
pub fn next(view: &DataView, block: BlockRef) -> BlockRef {
    BlockRef(block.0 + size(view, block))
}

/// Returns the block physically preceding `block`, found through its footer.
///
/// For the first real block this is the prologue.
#[must_use]
pub fn prev(view: &DataView, block: BlockRef) -> BlockRef {
    let prev_footer: Tag = view.read(block.0 - DOUBLE_WORD);
    BlockRef(block.0 - prev_footer.size())
}

/// Returns the byte range of the payload of `block` inside the region.
#[must_use]
pub fn payload_range(view: &DataView, block: BlockRef) -> Range<usize> {
    block.0..footer_offset(view, block)
}

/// Writes matching header and footer words for a block of `size` bytes.
pub fn write_tags(view: &mut DataView, block: BlockRef, size: usize, flags: TagFlags) {
    assert!(size >= DOUBLE_WORD, "block must hold its boundary tags");
    let tag = Tag::new(size, flags);
    view.write(header_offset(block), &tag);
    view.write(block.0 + size - DOUBLE_WORD, &tag);
}

/// Writes the epilogue header: an allocated block of size zero at `block`.
pub fn write_epilogue(view: &mut DataView, block: BlockRef) {
    view.write(header_offset(block), &Tag::new(0, TagFlags::ALLOCATED));
}

/// Reads the free-list links of `block`.
///
/// # Panics
///
/// Panics if `block` is allocated: its payload belongs to the caller.
#[must_use]
pub fn links(view: &DataView, block: BlockRef) -> FreeLinks {
    assert!(
        !is_allocated(view, block),
        "free-list links of allocated block {block} accessed"
    );
    let raw: RawLinks = view.read(block.0);
    FreeLinks {
        pred: BlockRef::decode(raw.pred),
        succ: BlockRef::decode(raw.succ),
    }
}

/// Overwrites the free-list links of `block`.
///
/// # Panics
///
/// Panics if `block` is allocated.
pub fn set_links(view: &mut DataView, block: BlockRef, links: FreeLinks) {
    assert!(
        !is_allocated(view, block),
        "free-list links of allocated block {block} accessed"
    );
    let raw = RawLinks {
        pred: BlockRef::encode(links.pred),
        succ: BlockRef::encode(links.succ),
    };
    view.write(block.0, &raw);
}

pub fn set_pred(view: &mut DataView, block: BlockRef, pred: Option<BlockRef>) {
    let links = links(view, block);
    set_links(view, block, FreeLinks { pred, ..links });
}

pub fn set_succ(view: &mut DataView, block: BlockRef, succ: Option<BlockRef>) {
    let links = links(view, block);
    set_links(view, block, FreeLinks { succ, ..links });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_test_view<F>(len: usize, test_fn: F)
    where
        F: FnOnce(&mut DataView),
    {
        let mut bytes = vec![0x11_u8; len];
        test_fn(DataView::from_mut(&mut bytes[..]));
    }

    #[test]
    fn test_tag_packing() {
        let tag = Tag::new(4096, TagFlags::ALLOCATED);
        assert_eq!(tag.size(), 4096);
        assert!(tag.is_allocated());

        let tag = Tag::new(32, TagFlags::empty());
        assert_eq!(tag.size(), 32);
        assert!(!tag.is_allocated());
        assert_eq!(tag.flags(), TagFlags::empty());
    }

    #[test]
    #[should_panic = "multiple of the alignment"]
    fn test_tag_rejects_unaligned_size() {
        let _ = Tag::new(40, TagFlags::empty());
    }

    #[test]
    fn test_tags_and_neighbours() {
        with_test_view(256, |view| {
            let a = BlockRef::new(32);
            write_tags(view, a, 64, TagFlags::ALLOCATED);
            let b = next(view, a);
            assert_eq!(b, BlockRef::new(96));
            write_tags(view, b, 48, TagFlags::empty());

            assert_eq!(header(view, a), footer(view, a));
            assert_eq!(header(view, b), footer(view, b));
            assert_eq!(size(view, a), 64);
            assert_eq!(size(view, b), 48);
            assert!(is_allocated(view, a));
            assert!(!is_allocated(view, b));
            assert_eq!(prev(view, b), a);
            assert_eq!(header_offset(b), 88);
            assert_eq!(footer_offset(view, b), 128);
            assert_eq!(payload_range(view, a), 32..80);

            let epilogue = next(view, b);
            write_epilogue(view, epilogue);
            assert_eq!(size(view, epilogue), 0);
            assert!(is_allocated(view, epilogue));
        });
    }

    #[test]
    fn test_links() {
        with_test_view(256, |view| {
            let block = BlockRef::new(32);
            write_tags(view, block, 64, TagFlags::empty());
            set_links(view, block, FreeLinks::default());
            assert_eq!(links(view, block), FreeLinks::default());

            set_succ(view, block, Some(BlockRef::new(128)));
            set_pred(view, block, Some(BlockRef::new(160)));
            assert_eq!(
                links(view, block),
                FreeLinks {
                    pred: Some(BlockRef::new(160)),
                    succ: Some(BlockRef::new(128)),
                }
            );
        });
    }

    #[test]
    #[should_panic = "allocated block"]
    fn test_links_of_allocated_block_panics() {
        with_test_view(256, |view| {
            let block = BlockRef::new(32);
            write_tags(view, block, 64, TagFlags::ALLOCATED);
            let _ = links(view, block);
        });
    }

    #[test]
    fn test_block_ref_display() {
        assert_eq!(BlockRef::new(0x120).to_string(), "0x120");
    }
}
