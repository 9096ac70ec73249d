//! Runs a parsed trace against a fresh heap.

use std::collections::HashMap;

use log::{debug, trace};
use snafu::{OptionExt as _, ResultExt as _, Snafu, ensure};
use snafu_utils::{Located, Location};
use tagalloc::{AllocError, BlockRef, CheckError, Heap, HeapConfig, InitError};

use crate::trace::{OpKind, Trace, TraceOp};

#[derive(Debug, Snafu)]
#[snafu(module)]
pub enum ReplayError {
    #[snafu(display("failed to create the heap"))]
    Init {
        #[snafu(source)]
        source: InitError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("line {line}: id {id} is allocated twice"))]
    DuplicateId {
        line: usize,
        id: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("line {line}: id {id} is not allocated"))]
    UnknownId {
        line: usize,
        id: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("line {line}: request of {size} bytes for id {id} failed"))]
    OutOfMemory {
        line: usize,
        id: usize,
        size: usize,
        #[snafu(source)]
        source: AllocError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("line {line}: payload of id {id} was overwritten at byte {index}"))]
    Corrupted {
        line: usize,
        id: usize,
        index: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("line {line}: heap is inconsistent"))]
    Check {
        line: usize,
        #[snafu(source)]
        source: CheckError,
        #[snafu(implicit)]
        location: Location,
    },
}

impl Located for ReplayError {
    fn location(&self) -> Option<Location> {
        let (Self::Init { location, .. }
        | Self::DuplicateId { location, .. }
        | Self::UnknownId { location, .. }
        | Self::OutOfMemory { location, .. }
        | Self::Corrupted { location, .. }
        | Self::Check { location, .. }) = self;
        Some(*location)
    }
}

/// Outcome of replaying one trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    pub ops: usize,
    /// Largest sum of requested bytes live at the same time.
    pub peak_payload: usize,
    pub heap_size: usize,
}

impl ReplayStats {
    /// Peak payload as a percentage of the final heap size.
    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn utilization(&self) -> f64 {
        100.0 * self.peak_payload as f64 / self.heap_size as f64
    }
}

/// A live trace id. Zero-byte requests own no block.
///
/// Slots are keyed by id, so memory follows the live ids rather than the id
/// count announced by the trace header.
#[derive(Debug, Clone, Copy)]
struct Slot {
    block: Option<BlockRef>,
    len: usize,
}

struct Replay {
    heap: Heap,
    slots: HashMap<usize, Slot>,
    live_payload: usize,
    peak_payload: usize,
    check: bool,
}

/// Replays `trace` on a new heap built from `config`.
///
/// With `check` set the whole heap is verified after every operation.
pub fn replay(trace: &Trace, config: HeapConfig, check: bool) -> Result<ReplayStats, ReplayError> {
    #[cfg_attr(not(test), expect(clippy::wildcard_imports))]
    use self::replay_error::*;

    let mut replay = Replay {
        heap: Heap::new(config).context(InitSnafu)?,
        slots: HashMap::new(),
        live_payload: 0,
        peak_payload: 0,
        check,
    };
    for op in &trace.ops {
        replay.step(*op)?;
    }

    let stats = ReplayStats {
        ops: trace.ops.len(),
        peak_payload: replay.peak_payload,
        heap_size: replay.heap.heap_size(),
    };
    debug!("{} replayed: {stats:?}", config.policy());
    Ok(stats)
}

impl Replay {
    fn step(&mut self, op: TraceOp) -> Result<(), ReplayError> {
        #[cfg_attr(not(test), expect(clippy::wildcard_imports))]
        use self::replay_error::*;

        let TraceOp { line, kind } = op;
        let id = kind.id();
        trace!("line {line}: {kind:?}");

        match kind {
            OpKind::Allocate { size, .. } => {
                ensure!(!self.slots.contains_key(&id), DuplicateIdSnafu { line, id });
                let block = self.allocate(line, id, size)?;
                self.slots.insert(id, Slot { block, len: size });
                self.live_payload += size;
            }
            OpKind::Resize { size, .. } => {
                let slot = *self.slots.get(&id).context(UnknownIdSnafu { line, id })?;
                self.verify(line, id, slot, slot.len)?;
                let block = match slot.block {
                    Some(block) => Some(
                        self.heap
                            .try_resize(block, size)
                            .context(OutOfMemorySnafu { line, id, size })?,
                    ),
                    None => self.allocate(line, id, size)?,
                };
                let resized = Slot { block, len: size };
                self.verify(line, id, resized, slot.len.min(size))?;
                self.fill(id, resized);
                self.slots.insert(id, resized);
                self.live_payload = self.live_payload - slot.len + size;
            }
            OpKind::Release { .. } => {
                let slot = self.slots.remove(&id).context(UnknownIdSnafu { line, id })?;
                self.verify(line, id, slot, slot.len)?;
                if let Some(block) = slot.block {
                    self.heap.release(block);
                }
                self.live_payload -= slot.len;
            }
        }
        self.peak_payload = self.peak_payload.max(self.live_payload);

        if self.check {
            self.heap.check().context(CheckSnafu { line })?;
        }
        Ok(())
    }

    fn allocate(
        &mut self,
        line: usize,
        id: usize,
        size: usize,
    ) -> Result<Option<BlockRef>, ReplayError> {
        #[cfg_attr(not(test), expect(clippy::wildcard_imports))]
        use self::replay_error::*;

        if size == 0 {
            return Ok(None);
        }
        let block = self
            .heap
            .try_allocate(size)
            .context(OutOfMemorySnafu { line, id, size })?;
        self.fill(id, Slot {
            block: Some(block),
            len: size,
        });
        Ok(Some(block))
    }

    fn fill(&mut self, id: usize, slot: Slot) {
        let Some(block) = slot.block else {
            return;
        };
        for (index, byte) in self.heap.payload_mut(block)[..slot.len]
            .iter_mut()
            .enumerate()
        {
            *byte = pattern(id, index);
        }
    }

    fn verify(&self, line: usize, id: usize, slot: Slot, len: usize) -> Result<(), ReplayError> {
        #[cfg_attr(not(test), expect(clippy::wildcard_imports))]
        use self::replay_error::*;

        let Some(block) = slot.block else {
            return Ok(());
        };
        let mismatch = self.heap.payload(block)[..len]
            .iter()
            .enumerate()
            .find(|&(index, &byte)| byte != pattern(id, index));
        if let Some((index, _)) = mismatch {
            return CorruptedSnafu { line, id, index }.fail();
        }
        Ok(())
    }
}

fn pattern(id: usize, index: usize) -> u8 {
    id.wrapping_mul(0x9e37).wrapping_add(index).to_le_bytes()[0]
}
