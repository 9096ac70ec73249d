//! Construction-time settings of a heap.

use alloc::format;

use snafu::ensure;

use crate::{
    ALIGNMENT, CHUNK_SIZE, DEFAULT_HEAP_LIMIT, error::InitError, free_list::FitPolicy,
    heap::INITIAL_SIZE,
};

/// Settings fixed for the lifetime of a [`Heap`](crate::Heap).
///
/// ```rust
/// use tagalloc::{FitPolicy, HeapConfig};
///
/// let config = HeapConfig::default()
///     .with_policy(FitPolicy::Scanning)
///     .with_chunk_size(1 << 16)
///     .with_heap_limit(1 << 24);
/// assert_eq!(config.policy(), FitPolicy::Scanning);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    policy: FitPolicy,
    chunk_size: usize,
    heap_limit: usize,
    verify: bool,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            policy: FitPolicy::default(),
            chunk_size: CHUNK_SIZE,
            heap_limit: DEFAULT_HEAP_LIMIT,
            verify: false,
        }
    }
}

impl HeapConfig {
    #[must_use]
    pub fn with_policy(self, policy: FitPolicy) -> Self {
        Self { policy, ..self }
    }

    /// Sets the minimum number of bytes the heap grows by.
    #[must_use]
    pub fn with_chunk_size(self, chunk_size: usize) -> Self {
        Self { chunk_size, ..self }
    }

    /// Sets the largest size the backing region may reach.
    ///
    /// Only used by [`Heap::new`](crate::Heap::new), which creates the
    /// region itself.
    #[must_use]
    pub fn with_heap_limit(self, heap_limit: usize) -> Self {
        Self { heap_limit, ..self }
    }

    /// Makes every mutating operation run [`Heap::check`](crate::Heap::check)
    /// afterwards in debug builds.
    #[must_use]
    pub fn with_verify(self, verify: bool) -> Self {
        Self { verify, ..self }
    }

    #[must_use]
    pub fn policy(&self) -> FitPolicy {
        self.policy
    }

    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[must_use]
    pub fn heap_limit(&self) -> usize {
        self.heap_limit
    }

    #[must_use]
    pub fn verify(&self) -> bool {
        self.verify
    }

    /// Checks that a heap can be built with these settings.
    pub fn validate(&self) -> Result<(), InitError> {
        #[cfg_attr(not(test), expect(clippy::wildcard_imports))]
        use crate::error::init_error::*;

        ensure!(
            self.chunk_size != 0 && self.chunk_size.is_multiple_of(ALIGNMENT),
            InvalidConfigSnafu {
                reason: format!(
                    "chunk size {} is not a non-zero multiple of {ALIGNMENT}",
                    self.chunk_size
                ),
            }
        );
        ensure!(
            INITIAL_SIZE
                .checked_add(self.chunk_size)
                .is_some_and(|size| size <= self.heap_limit),
            InvalidConfigSnafu {
                reason: format!(
                    "heap limit {} cannot hold the initial heap of {INITIAL_SIZE} + {} bytes",
                    self.heap_limit, self.chunk_size
                ),
            }
        );
        Ok(())
    }
}
