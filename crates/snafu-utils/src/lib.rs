//! Error-handling helpers shared by the workspace crates.
//!
//! - [`Location`] is captured implicitly by `snafu` context selectors, so
//!   every error variant records the call site that raised it.
//! - [`GenericError`] is a `whatever`-style error for binaries and tests that
//!   only need a message and a source chain.
//! - [`Report`] renders an error followed by its chain of causes.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

use alloc::{boxed::Box, string::String};
use core::{error::Error, fmt};

use snafu::{GenerateImplicitData, Snafu};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Location(&'static core::panic::Location<'static>);

impl Default for Location {
    #[track_caller]
    fn default() -> Self {
        Self(core::panic::Location::caller())
    }
}

impl GenerateImplicitData for Location {
    #[track_caller]
    fn generate() -> Self {
        Self::default()
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Errors that expose the call site they were raised at.
///
/// [`Report`] cannot ask an arbitrary `dyn Error` for its location on stable
/// Rust. It prints the location of the top-level error through this trait,
/// and the location of each link of the chain through its [`Locator`].
pub trait Located {
    fn location(&self) -> Option<Location>;
}

#[derive(Debug, Snafu)]
#[snafu(whatever, display("{message}"))]
pub struct GenericError {
    message: String,
    #[snafu(implicit)]
    location: Location,
    #[snafu(source(from(Box<dyn core::error::Error>, Some)))]
    source: Option<Box<dyn core::error::Error>>,
}

impl Located for GenericError {
    fn location(&self) -> Option<Location> {
        Some(self.location)
    }
}

/// Finds the location of one link of an error chain.
///
/// A locator typically downcasts to the concrete error types of a program
/// and asks them through [`Located`].
pub type Locator = fn(&(dyn Error + 'static)) -> Option<Location>;

/// Returns the location of `err` if it is a [`GenericError`].
#[must_use]
pub fn generic_location(err: &(dyn Error + 'static)) -> Option<Location> {
    err.downcast_ref::<GenericError>()
        .and_then(Located::location)
}

/// Returns the location of `err` if it is an `E`.
#[must_use]
pub fn location_of<E>(err: &(dyn Error + 'static)) -> Option<Location>
where
    E: Error + Located + 'static,
{
    err.downcast_ref::<E>().and_then(Located::location)
}

pub struct Report<E> {
    error: E,
    locator: Locator,
}

impl<E> fmt::Debug for Report<E>
where
    E: Error + Located + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<E> fmt::Display for Report<E>
where
    E: Error + Located + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Error: {}", self.error)?;
        if let Some(loc) = self.error.location() {
            writeln!(f, "  at {loc}")?;
        }
        let mut source = self.error.source();
        if source.is_some() {
            writeln!(f)?;
            writeln!(f, "Caused by:")?;
        }
        let mut index = 0;
        while let Some(s) = source {
            writeln!(f, "{index:4}: {s}")?;
            if let Some(loc) = (self.locator)(s).or_else(|| generic_location(s)) {
                writeln!(f, "      at {loc}")?;
            }
            source = s.source();
            index += 1;
        }
        Ok(())
    }
}

impl<E> Report<E> {
    /// Creates a report that locates [`GenericError`] links only.
    pub fn new(error: E) -> Self {
        Self {
            error,
            locator: generic_location,
        }
    }

    /// Uses `locator` to find the location of each link of the chain.
    #[must_use]
    pub fn with_locator(self, locator: Locator) -> Self {
        Self { locator, ..self }
    }
}

#[cfg(test)]
mod tests {
    use snafu::{ResultExt as _, whatever};

    use super::*;

    fn inner() -> Result<(), GenericError> {
        whatever!("heap region refused to grow")
    }

    fn outer() -> Result<(), GenericError> {
        inner().whatever_context("failed to replay trace")
    }

    #[test]
    fn report_lists_causes_in_order() {
        let err = outer().unwrap_err();
        let report = Report::new(err).to_string();

        let lines = report.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "Error: failed to replay trace");
        assert!(lines[1].starts_with("  at "));
        assert!(lines[1].contains("lib.rs"));
        assert_eq!(lines[3], "Caused by:");
        assert_eq!(lines[4], "   0: heap region refused to grow");
        assert!(lines[5].starts_with("      at "));
    }

    #[test]
    fn location_points_at_caller() {
        let loc = Location::generate();
        assert!(loc.to_string().contains("lib.rs:"));
    }

    #[derive(Debug, Snafu)]
    #[snafu(display("region exhausted"))]
    struct ExhaustedError {
        #[snafu(implicit)]
        location: Location,
    }

    impl Located for ExhaustedError {
        fn location(&self) -> Option<Location> {
            Some(self.location)
        }
    }

    fn exhausted() -> Result<(), GenericError> {
        let err = ExhaustedSnafu.build();
        Err(err).whatever_context("failed to extend heap")
    }

    #[test]
    fn typed_links_need_a_locator() {
        let report = Report::new(exhausted().unwrap_err()).to_string();
        let lines = report.lines().collect::<Vec<_>>();
        assert_eq!(lines[4], "   0: region exhausted");
        assert_eq!(lines.len(), 5);

        let report = Report::new(exhausted().unwrap_err())
            .with_locator(location_of::<ExhaustedError>)
            .to_string();
        let lines = report.lines().collect::<Vec<_>>();
        assert_eq!(lines[4], "   0: region exhausted");
        assert!(lines[5].starts_with("      at "));
        assert!(lines[5].contains("lib.rs"));
    }
}
