//! malloc-lab trace files.
//!
//! A trace starts with four numbers: the suggested heap size, the number of
//! distinct block ids, the number of operations and a weight. One operation
//! per line follows:
//!
//! ```text
//! a <id> <bytes>    allocate
//! r <id> <bytes>    resize
//! f <id>            release
//! ```

use std::{num::ParseIntError, str::SplitWhitespace};

use snafu::{OptionExt as _, ResultExt as _, Snafu, ensure};
use snafu_utils::{Located, Location};

#[derive(Debug, Snafu)]
#[snafu(module)]
pub enum ParseTraceError {
    #[snafu(display("trace ends before its header is complete"))]
    MissingHeader {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("line {line}: invalid number `{token}`"))]
    InvalidNumber {
        line: usize,
        token: String,
        #[snafu(source)]
        source: ParseIntError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("line {line}: unknown operation `{op}`"))]
    UnknownOp {
        line: usize,
        op: String,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("line {line}: missing {field}"))]
    MissingField {
        line: usize,
        field: &'static str,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("line {line}: unexpected trailing `{token}`"))]
    TrailingToken {
        line: usize,
        token: String,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("line {line}: id {id} is not below the id count {count}"))]
    IdOutOfRange {
        line: usize,
        id: usize,
        count: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("header announces {expected} operations but the trace has {found}"))]
    OpCountMismatch {
        expected: usize,
        found: usize,
        #[snafu(implicit)]
        location: Location,
    },
}

impl Located for ParseTraceError {
    fn location(&self) -> Option<Location> {
        let (Self::MissingHeader { location }
        | Self::InvalidNumber { location, .. }
        | Self::UnknownOp { location, .. }
        | Self::MissingField { location, .. }
        | Self::TrailingToken { location, .. }
        | Self::IdOutOfRange { location, .. }
        | Self::OpCountMismatch { location, .. }) = self;
        Some(*location)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Allocate { id: usize, size: usize },
    Resize { id: usize, size: usize },
    Release { id: usize },
}

impl OpKind {
    #[must_use]
    pub fn id(self) -> usize {
        match self {
            Self::Allocate { id, .. } | Self::Resize { id, .. } | Self::Release { id } => id,
        }
    }
}

/// One operation of a trace with the line it was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceOp {
    pub line: usize,
    pub kind: OpKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub suggested_heap_size: usize,
    pub id_count: usize,
    pub weight: usize,
    pub ops: Vec<TraceOp>,
}

struct Fields<'a> {
    line: usize,
    tokens: SplitWhitespace<'a>,
}

impl Fields<'_> {
    fn number(&mut self, field: &'static str) -> Result<usize, ParseTraceError> {
        #[cfg_attr(not(test), expect(clippy::wildcard_imports))]
        use self::parse_trace_error::*;

        let line = self.line;
        let token = self.tokens.next().context(MissingFieldSnafu { line, field })?;
        token
            .parse()
            .context(InvalidNumberSnafu { line, token })
    }

    fn finish(mut self) -> Result<(), ParseTraceError> {
        #[cfg_attr(not(test), expect(clippy::wildcard_imports))]
        use self::parse_trace_error::*;

        match self.tokens.next() {
            Some(token) => TrailingTokenSnafu {
                line: self.line,
                token,
            }
            .fail(),
            None => Ok(()),
        }
    }
}

impl Trace {
    /// Parses the text of a trace file.
    pub fn parse(text: &str) -> Result<Self, ParseTraceError> {
        #[cfg_attr(not(test), expect(clippy::wildcard_imports))]
        use self::parse_trace_error::*;

        let mut lines = text
            .lines()
            .enumerate()
            .map(|(index, line)| (index + 1, line))
            .filter(|(_, line)| !line.trim().is_empty());

        let mut header = [0; 4];
        for value in &mut header {
            let (line, text) = lines.next().context(MissingHeaderSnafu)?;
            let mut fields = Fields {
                line,
                tokens: text.split_whitespace(),
            };
            *value = fields.number("header value")?;
            fields.finish()?;
        }
        let [suggested_heap_size, id_count, op_count, weight] = header;

        let mut ops = Vec::new();
        for (line, text) in lines {
            let mut fields = Fields {
                line,
                tokens: text.split_whitespace(),
            };
            let Some(op) = fields.tokens.next() else {
                continue;
            };
            let kind = match op {
                "a" => OpKind::Allocate {
                    id: fields.number("id")?,
                    size: fields.number("size")?,
                },
                "r" => OpKind::Resize {
                    id: fields.number("id")?,
                    size: fields.number("size")?,
                },
                "f" => OpKind::Release {
                    id: fields.number("id")?,
                },
                _ => return UnknownOpSnafu { line, op }.fail(),
            };
            fields.finish()?;

            let id = kind.id();
            ensure!(
                id < id_count,
                IdOutOfRangeSnafu {
                    line,
                    id,
                    count: id_count,
                }
            );
            ops.push(TraceOp { line, kind });
        }

        ensure!(
            ops.len() == op_count,
            OpCountMismatchSnafu {
                expected: op_count,
                found: ops.len(),
            }
        );

        Ok(Self {
            suggested_heap_size,
            id_count,
            weight,
            ops,
        })
    }
}
