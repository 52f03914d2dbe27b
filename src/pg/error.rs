//! Error types for the PostgreSQL wire decoding and result streaming.
//!
//! Two layers:
//! - `DecodeError`: the caller asked for something the tuple cannot give
//!   (wrong type, short buffer, no row). These are contract violations.
//! - `PgError`: operational failures (I/O, server errors, protocol desync)
//!   that a caller is expected to handle.

use std::fmt;
use std::io;

use thiserror::Error;

use super::types::Oid;

/// Result type for PostgreSQL operations.
pub type PgResult<T> = Result<T, PgError>;

/// Errors raised while decoding a column of the current tuple.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Requested Rust type does not match the column's server type.
    #[error("type mismatch: requested {expected}, column is {actual}")]
    TypeMismatch { expected: Oid, actual: Oid },

    /// Not enough bytes left for a fixed-width or array read.
    #[error("truncated value: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// Array with more (or fewer) than one dimension.
    #[error("unsupported array dimensionality: {0}")]
    UnsupportedDimensionality(i32),

    /// Accessor called while the stream is not positioned on a tuple.
    #[error("no active row")]
    NoActiveRow,

    /// Column index past the end of the tuple.
    #[error("column {column} out of range ({count} columns)")]
    ColumnOutOfRange { column: usize, count: usize },

    /// Value length is not valid for the type (e.g. "char" longer than 1 byte).
    #[error("invalid length {len} for {oid}")]
    InvalidLength { oid: Oid, len: usize },

    /// Bytes left over after a fixed-width value was decoded.
    #[error("{extra} trailing bytes after {oid} value")]
    TrailingBytes { oid: Oid, extra: usize },

    /// Text column holds invalid UTF-8.
    #[error("invalid UTF-8 in text column")]
    InvalidUtf8,

    /// Binary accessor used on a column delivered in text format.
    #[error("column {column} was sent in text format")]
    TextFormat { column: usize },

    /// No column carries the requested name.
    #[error("no column named {0:?}")]
    UnknownColumn(String),
}

/// Diagnostic fields of a server ErrorResponse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerError {
    pub severity: String,
    pub code: String,
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
}

impl ServerError {
    /// SQLSTATE sent when a statement is stopped by a cancel request.
    pub const QUERY_CANCELED: &'static str = "57014";

    /// Whether the statement was stopped by a cancel request.
    pub fn is_query_canceled(&self) -> bool {
        self.code == Self::QUERY_CANCELED
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.severity, self.message, self.code)?;
        if let Some(d) = &self.detail {
            write!(f, "\nDetail: {}", d)?;
        }
        if let Some(h) = &self.hint {
            write!(f, "\nHint: {}", h)?;
        }
        Ok(())
    }
}

/// Errors that can occur during PostgreSQL operations.
#[derive(Error, Debug)]
pub enum PgError {
    /// I/O error during communication.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed message or unexpected message type.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Server rejected the session outside of a query (startup, auth).
    #[error("{0}")]
    Server(ServerError),

    /// Server reported a fatal or bad-response status for the query.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Message sequence the stream cannot recover from.
    #[error("Protocol desynchronized: {0}")]
    ProtocolDesync(String),

    /// Operation called in a state that does not allow it.
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    /// Connection is closed.
    #[error("Connection is closed")]
    ConnectionClosed,

    /// Column decode failure.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl PgError {
    /// True for errors reported by the server for the current request.
    pub fn is_execution_failure(&self) -> bool {
        matches!(self, PgError::ExecutionFailed(_) | PgError::Server(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mismatch_names_both_oids() {
        let err = DecodeError::TypeMismatch {
            expected: Oid::INT4,
            actual: Oid::TEXT,
        };
        let msg = err.to_string();
        assert!(msg.contains("int4"));
        assert!(msg.contains("text"));
    }

    #[test]
    fn test_server_error_display() {
        let err = ServerError {
            severity: "ERROR".to_string(),
            code: "42P01".to_string(),
            message: "relation \"foo\" does not exist".to_string(),
            detail: None,
            hint: Some("check the table name".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "ERROR: relation \"foo\" does not exist (42P01)\nHint: check the table name"
        );
    }

    #[test]
    fn test_decode_error_converts() {
        let err: PgError = DecodeError::NoActiveRow.into();
        assert!(matches!(err, PgError::Decode(DecodeError::NoActiveRow)));
        assert!(!err.is_execution_failure());
    }
}
