use std::borrow::Cow;
use std::io;

/// Result type used across the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Taxonomy of failures the engine can surface, per the error handling design.
///
/// Parse-level failures (`ParseFieldError`, `MalformedRow`, `SchemaChange`) never reach this
/// type directly; they degrade to counters on the affected chunk instead. This enum carries
/// only the failures that are fatal to an `open`, or that abort an in-flight fetch.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The file contains no header line at all.
    #[error("file has no header line")]
    NoHeader,

    /// The file is entirely empty (zero bytes).
    #[error("file is empty")]
    EmptyFile,

    /// Every candidate column was dropped by the column filter.
    #[error("no numeric columns survived filtering")]
    NoNumericColumns,

    /// The axis column is not monotonically non-decreasing.
    #[error("axis column is not monotonically non-decreasing at row {row_index}")]
    NonMonotonicAxis { row_index: u64 },

    /// I/O failure while reading or seeking the underlying file.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The file shrank or disappeared while a ranged read was in flight.
    #[error("file truncated or removed during read: {details}")]
    TruncatedRead { details: Cow<'static, str> },

    /// The watched file vanished between polls.
    #[error("file no longer exists: {path}")]
    FileGone { path: Cow<'static, str> },

    /// A previously built row index no longer matches the file's prefix.
    #[error("row index invalidated: {details}")]
    IndexInvalidated { details: Cow<'static, str> },

    /// The handle has already been closed.
    #[error("engine handle is closed")]
    HandleClosed,
}
