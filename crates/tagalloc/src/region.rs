//! Growable backing memory of a heap.
//!
//! A [`Region`] is the only capability the allocation engine needs from the
//! outside world: a contiguous byte range that can be extended at its end.
//! The engine never shrinks a region and never assumes that a growth request
//! was partially granted.

use alloc::{collections::TryReserveError, vec::Vec};

use dataview::{DataView, Pod};
use snafu::{ResultExt as _, Snafu, ensure};
use snafu_utils::Location;

use crate::{ALIGNMENT, DEFAULT_HEAP_LIMIT};

#[derive(Debug, Snafu)]
#[snafu(module)]
pub enum GrowError {
    #[snafu(display(
        "heap limit exceeded: {current} + {requested} bytes is over the {limit} byte limit"
    ))]
    LimitExceeded {
        current: usize,
        requested: usize,
        limit: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("failed to reserve {requested} bytes of backing memory"))]
    Reserve {
        requested: usize,
        #[snafu(source)]
        source: TryReserveError,
        #[snafu(implicit)]
        location: Location,
    },
}

impl snafu_utils::Located for GrowError {
    fn location(&self) -> Option<Location> {
        match self {
            Self::LimitExceeded { location, .. } | Self::Reserve { location, .. } => {
                Some(*location)
            }
        }
    }
}

/// A contiguous byte range that only grows.
pub trait Region {
    /// Returns the current length of the region in bytes.
    fn len(&self) -> usize;

    /// Returns `true` if nothing has been granted yet.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends `bytes` bytes at the end of the region.
    ///
    /// # Returns
    ///
    /// The length of the region before the call, which is the offset of the
    /// first new byte.
    ///
    /// # Errors
    ///
    /// Returns [`GrowError`] if the region cannot supply `bytes` more bytes.
    /// The region is unchanged in that case.
    fn grow(&mut self, bytes: usize) -> Result<usize, GrowError>;

    /// Drops every byte of the region, leaving it empty.
    fn reset(&mut self);

    /// Returns a view of the whole region.
    fn view(&self) -> &DataView;

    /// Returns a mutable view of the whole region.
    fn view_mut(&mut self) -> &mut DataView;
}

/// Backing storage unit of [`MemRegion`].
///
/// Keeping the vector's element aligned to [`ALIGNMENT`] makes offset
/// alignment and address alignment the same thing.
#[repr(C, align(16))]
#[derive(Pod, Clone, Copy)]
struct Unit([u8; ALIGNMENT]);
const _: () = assert!(size_of::<Unit>() == ALIGNMENT && align_of::<Unit>() == ALIGNMENT);

const ZERO_UNIT: Unit = Unit([0; ALIGNMENT]);

/// A [`Region`] backed by heap memory of the host, capped at a fixed limit.
pub struct MemRegion {
    units: Vec<Unit>,
    limit: usize,
}

impl Default for MemRegion {
    fn default() -> Self {
        Self::new(DEFAULT_HEAP_LIMIT)
    }
}

impl MemRegion {
    /// Creates an empty region that refuses to grow past `limit` bytes.
    #[must_use]
    pub const fn new(limit: usize) -> Self {
        Self {
            units: Vec::new(),
            limit,
        }
    }

    /// Returns the maximum length this region may reach.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Region for MemRegion {
    fn len(&self) -> usize {
        self.units.len() * ALIGNMENT
    }

    fn grow(&mut self, bytes: usize) -> Result<usize, GrowError> {
        #[cfg_attr(not(test), expect(clippy::wildcard_imports))]
        use self::grow_error::*;

        let current = self.len();
        ensure!(
            bytes.is_multiple_of(ALIGNMENT)
                && current
                    .checked_add(bytes)
                    .is_some_and(|end| end <= self.limit),
            LimitExceededSnafu {
                current,
                requested: bytes,
                limit: self.limit,
            }
        );

        let count = bytes / ALIGNMENT;
        self.units
            .try_reserve_exact(count)
            .context(ReserveSnafu { requested: bytes })?;
        self.units.resize(self.units.len() + count, ZERO_UNIT);

        Ok(current)
    }

    fn reset(&mut self) {
        self.units.clear();
    }

    fn view(&self) -> &DataView {
        DataView::from(&self.units[..])
    }

    fn view_mut(&mut self) -> &mut DataView {
        DataView::from_mut(&mut self.units[..])
    }
}
