//! Boundary-tag heap allocator with pluggable free-list policies.
//!
//! This crate manages variable-sized blocks inside one contiguous, growable
//! memory region. Every block carries a header and a footer word that encode
//! its size and an allocated flag, so both physical neighbours of a block can
//! be found in constant time. Free blocks are merged with their neighbours as
//! soon as they are released.
//!
//! The region is an arena: blocks are identified by the byte offset of their
//! payload ([`BlockRef`]) instead of raw pointers, and all framing is done
//! through [`dataview::DataView`].
//!
//! # Free-list policies
//!
//! ## [`Scanning`](FitPolicy::Scanning)
//!
//! No auxiliary structure. A fit is found by walking every physical block
//! from the start of the heap.
//!
//! **Performance**: O(blocks) allocation, O(1) release.
//!
//! ## [`Linked`](FitPolicy::Linked)
//!
//! One doubly-linked list threaded through the payloads of the free blocks.
//! Released blocks are pushed at the head, so the most recently freed block
//! is tried first.
//!
//! **Performance**: O(free blocks) allocation, O(1) release.
//!
//! ## [`Segregated`](FitPolicy::Segregated)
//!
//! [`SIZE_CLASS_COUNT`] lists keyed by power-of-two size class, each kept
//! sorted by block size. The first fit in the first non-empty class is close
//! to a best fit.
//!
//! **Performance**: allocation and release scan a single class in the common
//! case.
//!
//! # Memory Layout
//!
//! ```text
//! offset 0    16          32                                  len - 8
//! ┌──────┬────┬────┬──────┬──────────────────────┬─────┬─────┬──────┐
//! │ pad  │ hdr│ ftr│ hdr  │ payload ...          │ ftr │ ... │ epi  │
//! └──────┴────┴────┴──────┴──────────────────────┴─────┴─────┴──────┘
//!         prologue  first block                              epilogue
//! ```
//!
//! # Usage Example
//!
//! ```rust
//! use tagalloc::{FitPolicy, Heap, HeapConfig};
//!
//! let mut heap = Heap::new(HeapConfig::default().with_policy(FitPolicy::Linked)).unwrap();
//!
//! let block = heap.allocate(100).unwrap();
//! heap.payload_mut(block)[..5].copy_from_slice(b"hello");
//!
//! let block = heap.resize(block, 3000).unwrap();
//! assert_eq!(&heap.payload(block)[..5], b"hello");
//!
//! heap.release(block);
//! heap.check().unwrap();
//! ```
//!
//! # Thread Safety
//!
//! A [`Heap`] is a plain value with no interior mutability. It can be moved
//! between threads but requires external synchronization for shared use.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub use self::{
    block::{BlockRef, FreeLinks, TagFlags},
    check::CheckError,
    config::HeapConfig,
    error::{AllocError, InitError},
    free_list::{FitPolicy, FreeCollection, FreeTracker},
    heap::{BlockInfo, Blocks, Heap, HeapStats},
    region::{GrowError, MemRegion, Region},
};

pub mod block;
pub mod check;
pub mod config;
pub mod error;
pub mod free_list;
pub mod heap;
pub mod region;

/// Size of a header, footer or link word.
pub const WORD_SIZE: usize = size_of::<usize>();

/// Header plus footer overhead of every block.
pub const DOUBLE_WORD: usize = 2 * WORD_SIZE;

/// Alignment of every payload offset and every block size.
pub const ALIGNMENT: usize = DOUBLE_WORD;

/// Smallest block that can hold its boundary tags and both free-list links.
pub const MIN_BLOCK_SIZE: usize = 4 * WORD_SIZE;

/// Default number of bytes the heap grows by when no fit exists.
pub const CHUNK_SIZE: usize = 1 << 12;

/// Number of size classes used by the segregated policy.
pub const SIZE_CLASS_COUNT: usize = 20;

/// Default cap of a [`MemRegion`].
pub const DEFAULT_HEAP_LIMIT: usize = 20 << 20;

const _: () = assert!(MIN_BLOCK_SIZE.is_multiple_of(ALIGNMENT));
const _: () = assert!(CHUNK_SIZE.is_multiple_of(ALIGNMENT));

/// Rounds `value` up to the next multiple of `align`, or `None` on overflow.
///
/// `align` must be a power of two.
#[must_use]
pub const fn align_up(value: usize, align: usize) -> Option<usize> {
    assert!(align.is_power_of_two());
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

/// Returns the block size needed to serve a request of `size` payload bytes.
///
/// The result covers the boundary tags, is a multiple of [`ALIGNMENT`] and is
/// never smaller than [`MIN_BLOCK_SIZE`]. Returns `None` on overflow.
#[must_use]
pub const fn adjusted_size(size: usize) -> Option<usize> {
    let Some(with_tags) = size.checked_add(DOUBLE_WORD) else {
        return None;
    };
    match align_up(with_tags, ALIGNMENT) {
        Some(asize) if asize < MIN_BLOCK_SIZE => Some(MIN_BLOCK_SIZE),
        other => other,
    }
}
