use std::{fmt, num::ParseFloatError};

use network::NetworkError;

pub type Result<T, E = LearnError> = std::result::Result<T, E>;

/// Which of the two feature files a problem was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// Bass and treble chromagram, the stream that declares song identities.
    Chroma,
    ConstantQ,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Chroma => f.write_str("chromagram"),
            Stream::ConstantQ => f.write_str("constant-Q"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RowError {
    #[error("missing {0} field")]
    MissingField(&'static str),
    #[error("field {field} is not a number: {text:?}")]
    NotNumeric {
        field: usize,
        text: String,
        #[source]
        source: ParseFloatError,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DesyncKind {
    Identity { chroma: String, constant_q: String },
    Timestamp { chroma: f64, constant_q: f64 },
}

impl fmt::Display for DesyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DesyncKind::Identity { chroma, constant_q } => write!(
                f,
                "identity mismatch (chromagram {chroma:?}, constant-Q {constant_q:?})"
            ),
            DesyncKind::Timestamp { chroma, constant_q } => write!(
                f,
                "timestamp mismatch (chromagram {chroma}, constant-Q {constant_q})"
            ),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LearnError {
    #[error("failed to read {stream} features")]
    Io {
        stream: Stream,
        #[source]
        source: std::io::Error,
    },
    #[error("{stream} line {line}: {source}")]
    Parse {
        stream: Stream,
        line: usize,
        #[source]
        source: RowError,
    },
    #[error("feature files out of sync at step {step}: {kind}")]
    Desync { step: usize, kind: DesyncKind },
    #[error("first chromagram row (line {line}) does not name a song")]
    OrphanRow { line: usize },
    #[error("{longer} features continue past line {lines} where the other file ends")]
    LengthMismatch { longer: Stream, lines: usize },
    #[error("{which} row {row} has width {actual}, batch started with width {expected}")]
    RaggedBatch {
        which: &'static str,
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Network(#[from] NetworkError),
}
