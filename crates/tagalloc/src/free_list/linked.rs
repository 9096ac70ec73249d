//! Unordered doubly-linked free list.
//!
//! The list is threaded through the [`FreeLinks`](crate::block::FreeLinks)
//! stored at the start of each free payload, so it needs no memory of its
//! own beyond the head offset. New blocks are pushed at the head: the most
//! recently freed block is the first one tried by [`find_fit`].
//!
//! [`find_fit`]: FreeCollection::find_fit

use dataview::DataView;
use snafu::ensure;

use super::FreeCollection;
use crate::{
    ALIGNMENT, MIN_BLOCK_SIZE, WORD_SIZE,
    block::{self, BlockRef, FreeLinks},
    check::CheckError,
};

#[derive(Debug, Default, Clone)]
pub struct LinkedList {
    head: Option<BlockRef>,
}

impl LinkedList {
    #[must_use]
    pub const fn new() -> Self {
        Self { head: None }
    }

    #[must_use]
    pub fn head(&self) -> Option<BlockRef> {
        self.head
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Returns an iterator over the blocks of the list, head first.
    #[must_use]
    pub fn iter<'a>(&self, view: &'a DataView) -> Iter<'a> {
        Iter {
            view,
            cursor: self.head,
        }
    }

    /// Links `block` in as the new head of the list.
    pub fn push_front(&mut self, view: &mut DataView, block: BlockRef) {
        block::set_links(
            view,
            block,
            FreeLinks {
                pred: None,
                succ: self.head,
            },
        );
        if let Some(head) = self.head {
            block::set_pred(view, head, Some(block));
        }
        self.head = Some(block);
    }

    /// Links `block` in right after `after`, or at the head if `after` is
    /// `None`.
    pub fn insert_after(&mut self, view: &mut DataView, block: BlockRef, after: Option<BlockRef>) {
        let Some(after) = after else {
            self.push_front(view, block);
            return;
        };

        let succ = block::links(view, after).succ;
        block::set_links(
            view,
            block,
            FreeLinks {
                pred: Some(after),
                succ,
            },
        );
        block::set_succ(view, after, Some(block));
        if let Some(succ) = succ {
            block::set_pred(view, succ, Some(block));
        }
    }

    /// Splices `block` out of the list.
    ///
    /// # Panics
    ///
    /// Panics if `block` has no predecessor but is not the head, which means
    /// it is not a member of this list.
    pub fn unlink(&mut self, view: &mut DataView, block: BlockRef) {
        let FreeLinks { pred, succ } = block::links(view, block);
        if let Some(pred) = pred {
            block::set_succ(view, pred, succ);
        } else {
            assert_eq!(self.head, Some(block), "block {block} is not in this list");
            self.head = succ;
        }
        if let Some(succ) = succ {
            block::set_pred(view, succ, pred);
        }
    }

    /// Walks the list, checking every link, and calls `visit` on each block.
    ///
    /// Returns the number of blocks in the list.
    pub(crate) fn audit_with<F>(&self, view: &DataView, mut visit: F) -> Result<usize, CheckError>
    where
        F: FnMut(BlockRef) -> Result<(), CheckError>,
    {
        #[cfg_attr(not(test), expect(clippy::wildcard_imports))]
        use crate::check::check_error::*;

        let max_len = view.len() / MIN_BLOCK_SIZE;
        let mut count = 0;
        let mut pred = None;
        let mut cursor = self.head;
        while let Some(block) = cursor {
            ensure!(count < max_len, FreeListCycleSnafu { block });
            let offset = block.offset();
            ensure!(
                offset.is_multiple_of(ALIGNMENT)
                    && offset >= WORD_SIZE
                    && offset + 2 * WORD_SIZE <= view.len(),
                LinkOutOfRegionSnafu { block }
            );
            ensure!(
                !block::is_allocated(view, block),
                AllocatedInFreeListSnafu { block }
            );
            let links = block::links(view, block);
            ensure!(
                links.pred == pred,
                BrokenLinkSnafu {
                    block,
                    expected: pred,
                    found: links.pred,
                }
            );
            visit(block)?;
            count += 1;
            pred = Some(block);
            cursor = links.succ;
        }
        Ok(count)
    }
}

impl FreeCollection for LinkedList {
    fn find_fit(&self, view: &DataView, size: usize) -> Option<BlockRef> {
        self.iter(view)
            .find(|&block| block::size(view, block) >= size)
    }

    fn insert(&mut self, view: &mut DataView, block: BlockRef) {
        self.push_front(view, block);
    }

    fn remove(&mut self, view: &mut DataView, block: BlockRef) {
        self.unlink(view, block);
    }

    fn reset(&mut self) {
        self.head = None;
    }

    fn audit(&self, view: &DataView) -> Result<Option<usize>, CheckError> {
        self.audit_with(view, |_| Ok(())).map(Some)
    }
}

/// Iterator over the blocks of a [`LinkedList`].
pub struct Iter<'a> {
    view: &'a DataView,
    cursor: Option<BlockRef>,
}

impl Iterator for Iter<'_> {
    type Item = BlockRef;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.cursor?;
        self.cursor = block::links(self.view, block).succ;
        Some(block)
    }
}
