//! The capabilities a `ResultStream` needs from its connection.

use super::error::PgResult;
use super::message::RawResult;

/// Connection side of an in-flight request.
///
/// Implementations deliver one `RawResult` per call, blocking until it is
/// available, and `None` once every result of the current request has been
/// handed out. A connection whose request still has undelivered results
/// cannot accept a new one.
pub trait Session {
    /// Pull the next result of the active request.
    fn next_result(&mut self) -> PgResult<Option<RawResult>>;

    /// Ask the server to abandon the active request. Results already in
    /// flight are still delivered and must be read.
    fn cancel(&mut self) -> PgResult<()>;

    /// Most recent server-reported diagnostic.
    fn last_error(&self) -> String;
}
