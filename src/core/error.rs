use std::fmt;
use std::io;
use thiserror::Error;

/// Why an input line was rejected.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MalformedKind {
    MissingHeader,
    ColumnCount { expected: usize, found: usize },
    /// The stream ended inside a row: an unterminated last line with the wrong width.
    TruncatedRow { expected: usize, found: usize },
    InvalidUtf8,
}

impl fmt::Display for MalformedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedKind::MissingHeader => write!(f, "missing header row"),
            MalformedKind::ColumnCount { expected, found } => {
                write!(f, "expected {expected} columns, found {found}")
            }
            MalformedKind::TruncatedRow { expected, found } => write!(
                f,
                "stream ended mid-row ({found} of {expected} columns, no trailing newline)"
            ),
            MalformedKind::InvalidUtf8 => write!(f, "invalid UTF-8"),
        }
    }
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Header or column-count problem; `line` is 1-based and counts the header.
    #[error("malformed input at line {line}: {kind}")]
    MalformedInput { line: u64, kind: MalformedKind },

    /// No row of the table has a defined mean, so nothing can be ranked.
    #[error("no gene with a defined mean among {rows} rows; cannot select top genes")]
    EmptyTable { rows: usize },

    #[error("I/O error while reading input: {0}")]
    Io(#[from] io::Error),
}

impl AnalysisError {
    pub fn malformed(line: u64, kind: MalformedKind) -> Self {
        AnalysisError::MalformedInput { line, kind }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
