//! One unit of server response, as handed to a `ResultStream`.
//!
//! In single-row delivery each tuple arrives as its own `RawResult`
//! (`SingleTuple`), followed by a zero-row `TuplesOk` that closes the
//! statement. Commands that return no rows produce one `CommandOk`.

use std::sync::Arc;

use bytes::Bytes;

use super::error::ServerError;
use super::protocol::SharedColumns;

/// Status of a `RawResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    /// The query string was empty.
    EmptyQuery,
    /// A command that returns no rows completed.
    CommandOk,
    /// A row-returning statement completed; no tuple attached.
    TuplesOk,
    /// Exactly one tuple of a row-returning statement.
    SingleTuple,
    /// The server's response could not be understood.
    BadResponse,
    /// The server reported an error.
    FatalError,
}

impl ResultStatus {
    pub fn is_error(self) -> bool {
        matches!(self, ResultStatus::BadResponse | ResultStatus::FatalError)
    }
}

/// A server response holding at most one tuple.
#[derive(Debug, Clone)]
pub struct RawResult {
    status: ResultStatus,
    columns: SharedColumns,
    tuple: Vec<Option<Bytes>>,
    command_tag: Option<String>,
    error: Option<ServerError>,
}

impl RawResult {
    fn with_status(status: ResultStatus, columns: SharedColumns) -> Self {
        Self {
            status,
            columns,
            tuple: Vec::new(),
            command_tag: None,
            error: None,
        }
    }

    /// One tuple of a row-returning statement.
    pub fn single_tuple(columns: SharedColumns, tuple: Vec<Option<Bytes>>) -> Self {
        Self {
            tuple,
            ..Self::with_status(ResultStatus::SingleTuple, columns)
        }
    }

    /// End of a row-returning statement.
    pub fn tuples_ok(columns: SharedColumns, tag: impl Into<String>) -> Self {
        Self {
            command_tag: Some(tag.into()),
            ..Self::with_status(ResultStatus::TuplesOk, columns)
        }
    }

    /// Completion of a command that returns no rows.
    pub fn command_ok(tag: impl Into<String>) -> Self {
        Self {
            command_tag: Some(tag.into()),
            ..Self::with_status(ResultStatus::CommandOk, Arc::default())
        }
    }

    pub fn empty_query() -> Self {
        Self::with_status(ResultStatus::EmptyQuery, Arc::default())
    }

    /// Server-reported error.
    pub fn fatal(error: ServerError) -> Self {
        Self {
            error: Some(error),
            ..Self::with_status(ResultStatus::FatalError, Arc::default())
        }
    }

    /// Response that could not be parsed.
    pub fn bad_response(message: impl Into<String>) -> Self {
        Self {
            error: Some(ServerError {
                severity: "ERROR".to_string(),
                message: message.into(),
                ..ServerError::default()
            }),
            ..Self::with_status(ResultStatus::BadResponse, Arc::default())
        }
    }

    #[inline]
    pub fn status(&self) -> ResultStatus {
        self.status
    }

    #[inline]
    pub fn columns(&self) -> &SharedColumns {
        &self.columns
    }

    /// Number of tuples held: 1 for `SingleTuple`, 0 otherwise.
    pub fn ntuples(&self) -> usize {
        usize::from(self.status == ResultStatus::SingleTuple)
    }

    /// Column values of the held tuple.
    pub fn tuple(&self) -> Option<&[Option<Bytes>]> {
        (self.status == ResultStatus::SingleTuple).then_some(self.tuple.as_slice())
    }

    pub fn command_tag(&self) -> Option<&str> {
        self.command_tag.as_deref()
    }

    pub fn error(&self) -> Option<&ServerError> {
        self.error.as_ref()
    }

    /// Row count reported in the command tag.
    ///
    /// Tags of commands that do not count rows (e.g. `CREATE TABLE`) yield 0.
    pub fn rows_affected(&self) -> Option<u64> {
        self.command_tag.as_deref().map(rows_affected)
    }
}

/// Parse the row count out of a command tag such as `INSERT 0 5` or `UPDATE 3`.
pub fn rows_affected(tag: &str) -> u64 {
    let mut words = tag.split_whitespace();
    let counted = matches!(
        words.next(),
        Some("INSERT" | "UPDATE" | "DELETE" | "SELECT" | "MOVE" | "FETCH" | "COPY" | "MERGE")
    );
    if !counted {
        return 0;
    }
    words
        .next_back()
        .and_then(|n| n.parse::<u64>().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pg::protocol::FieldDescription;
    use crate::pg::types::Oid;

    #[test]
    fn test_rows_affected_from_tags() {
        assert_eq!(rows_affected("SELECT 3"), 3);
        assert_eq!(rows_affected("UPDATE 5"), 5);
        assert_eq!(rows_affected("INSERT 0 12"), 12);
        assert_eq!(rows_affected("DELETE 0"), 0);
        assert_eq!(rows_affected("CREATE TABLE"), 0);
        assert_eq!(rows_affected(""), 0);
    }

    #[test]
    fn test_only_single_tuple_exposes_values() {
        let columns = Arc::new(vec![FieldDescription::binary("n", Oid::INT4)]);
        let row = RawResult::single_tuple(columns.clone(), vec![None]);
        assert_eq!(row.ntuples(), 1);
        assert_eq!(row.tuple().map(|t| t.len()), Some(1));

        let done = RawResult::tuples_ok(columns, "SELECT 1");
        assert_eq!(done.ntuples(), 0);
        assert!(done.tuple().is_none());
        assert_eq!(done.rows_affected(), Some(1));
    }

    #[test]
    fn test_error_statuses() {
        assert!(RawResult::bad_response("garbled").status().is_error());
        assert!(RawResult::fatal(ServerError::default()).status().is_error());
        assert!(!RawResult::empty_query().status().is_error());
    }
}
