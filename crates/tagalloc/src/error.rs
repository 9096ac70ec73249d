use alloc::string::String;

use snafu::Snafu;
use snafu_utils::{Located, Location};

use crate::region::GrowError;

/// Failure to set up a heap.
#[derive(Debug, Snafu)]
#[snafu(module, visibility(pub(crate)))]
pub enum InitError {
    #[snafu(display("invalid heap configuration: {reason}"))]
    InvalidConfig {
        reason: String,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("failed to create the initial heap"))]
    Grow {
        #[snafu(source)]
        source: GrowError,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Failure of an allocation or resize request.
///
/// The heap is unchanged whenever one of these is returned.
#[derive(Debug, Snafu, derive_more::IsVariant)]
#[snafu(module, visibility(pub(crate)))]
pub enum AllocError {
    #[snafu(display("zero-sized allocation request"))]
    ZeroSize {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("request of {requested} bytes overflows the block size"))]
    SizeOverflow {
        requested: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("out of memory serving a request of {requested} bytes"))]
    OutOfMemory {
        requested: usize,
        #[snafu(source)]
        source: GrowError,
        #[snafu(implicit)]
        location: Location,
    },
}

impl Located for InitError {
    fn location(&self) -> Option<Location> {
        match self {
            Self::InvalidConfig { location, .. } | Self::Grow { location, .. } => Some(*location),
        }
    }
}

impl Located for AllocError {
    fn location(&self) -> Option<Location> {
        match self {
            Self::ZeroSize { location }
            | Self::SizeOverflow { location, .. }
            | Self::OutOfMemory { location, .. } => Some(*location),
        }
    }
}
