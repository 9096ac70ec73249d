//! Stateless policy that finds free blocks by walking the whole heap.

use dataview::DataView;

use super::FreeCollection;
use crate::{
    block::{self, BlockRef},
    check::CheckError,
    heap::FIRST_BLOCK,
};

/// Free "list" whose membership is the allocated bit of every block.
///
/// [`insert`](FreeCollection::insert) and [`remove`](FreeCollection::remove)
/// do nothing; [`find_fit`](FreeCollection::find_fit) returns the first free
/// block in address order that is large enough.
#[derive(Debug, Default, Clone)]
pub struct ScanningList {}

impl ScanningList {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }
}

impl FreeCollection for ScanningList {
    fn find_fit(&self, view: &DataView, size: usize) -> Option<BlockRef> {
        let mut block = FIRST_BLOCK;
        loop {
            let tag = block::header(view, block);
            if tag.size() == 0 {
                return None;
            }
            if !tag.is_allocated() && tag.size() >= size {
                return Some(block);
            }
            block = block::next(view, block);
        }
    }

    fn insert(&mut self, _view: &mut DataView, _block: BlockRef) {}

    fn remove(&mut self, _view: &mut DataView, _block: BlockRef) {}

    fn reset(&mut self) {}

    fn audit(&self, _view: &DataView) -> Result<Option<usize>, CheckError> {
        Ok(None)
    }
}
