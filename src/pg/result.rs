//! Forward-only streaming over single-row results.
//!
//! A `ResultStream` owns the fetch/drain state machine for one request:
//!
//! ```text
//! Idle --first()--> AwaitingFirst --+--> PositionedOnTuple(1) --advance()--> PositionedOnTuple(n+1)
//!                                   |           |
//!                                   |           +--> Exhausted        (zero-row TuplesOk)
//!                                   +--> Exhausted / CommandOnly
//!                 any fetch ------------------------> Errored          (server error, desync, I/O)
//! ```
//!
//! Exactly one `RawResult` is held at a time; it is dropped before the next
//! one is fetched, so memory stays bounded by one tuple whatever the size of
//! the result.
//!
//! Reaching `Exhausted` or `CommandOnly` does not end the request: the
//! connection still owes the end-of-request marker, and a multi-statement
//! request may owe further results. Call `drain()` (or `finish()`) before
//! reusing the connection. Dropping an undrained stream leaves the
//! connection busy; nothing drains it implicitly.

use tracing::{debug, trace, warn};

use super::error::{DecodeError, PgError, PgResult, ServerError};
use super::message::{RawResult, ResultStatus};
use super::row::Row;
use super::session::Session;

/// Where a stream is in its result sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No result fetched yet.
    Idle,
    /// First fetch in progress.
    AwaitingFirst,
    /// Holding tuple `n` (1-based).
    PositionedOnTuple(u64),
    /// The row-returning statement has no more tuples.
    Exhausted,
    /// The statement returned no rows, only a completion.
    CommandOnly,
    /// The server reported an error or the message sequence broke.
    Errored,
}

impl StreamState {
    /// No further tuple can be reached by advancing.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StreamState::Exhausted | StreamState::CommandOnly | StreamState::Errored
        )
    }
}

/// Stream behaviour settings.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Compare each requested type with the column's type tag before
    /// decoding (default: true). Turning this off skips the comparison only;
    /// every read stays bounds-checked.
    pub validate_types: bool,
    /// Tuples `drain()` may read and discard before it sends a cancel
    /// request (default: 1).
    pub drain_row_budget: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            validate_types: true,
            drain_row_budget: 1,
        }
    }
}

impl StreamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable type-tag validation.
    pub fn validate_types(mut self, validate: bool) -> Self {
        self.validate_types = validate;
        self
    }

    /// Set how many tuples a drain discards before cancelling.
    pub fn drain_row_budget(mut self, budget: u64) -> Self {
        self.drain_row_budget = budget;
        self
    }
}

/// Streaming view over the results of one request.
pub struct ResultStream<'c, S: Session> {
    session: &'c mut S,
    config: StreamConfig,
    state: StreamState,
    /// The one live server result.
    current: Option<RawResult>,
    /// Tuples seen for the streamed statement.
    rows: u64,
    /// Command tag of the streamed statement, once it completed.
    command_tag: Option<String>,
    completed: bool,
    /// The session reported the end of the request.
    request_done: bool,
}

impl<'c, S: Session> ResultStream<'c, S> {
    /// Bind a stream to the request currently active on `session`.
    pub fn new(session: &'c mut S, config: StreamConfig) -> Self {
        Self {
            session,
            config,
            state: StreamState::Idle,
            current: None,
            rows: 0,
            command_tag: None,
            completed: false,
            request_done: false,
        }
    }

    #[inline]
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Number of tuples of the streamed statement received so far,
    /// including those `drain` discarded.
    #[inline]
    pub fn row_number(&self) -> u64 {
        self.rows
    }

    /// Command tag of the streamed statement, once completed.
    pub fn command_tag(&self) -> Option<&str> {
        self.command_tag.as_deref()
    }

    /// Whether the session has delivered every result of the request.
    pub fn is_complete(&self) -> bool {
        self.request_done
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Fetch the first result. Returns `true` when positioned on a tuple.
    pub fn first(&mut self) -> PgResult<bool> {
        if self.state != StreamState::Idle {
            return Err(PgError::InvalidState("first() called on a started stream"));
        }
        self.rows = 0;
        self.state = StreamState::AwaitingFirst;
        let next = self.fetch()?;
        self.apply(next, true)
    }

    /// Move to the next tuple. Returns `true` when positioned on a tuple.
    ///
    /// Once a terminal state is reached this keeps returning `false`.
    pub fn advance(&mut self) -> PgResult<bool> {
        match self.state {
            StreamState::PositionedOnTuple(_) => {
                let next = self.fetch()?;
                self.apply(next, false)
            }
            StreamState::Idle | StreamState::AwaitingFirst => {
                Err(PgError::InvalidState("advance() called before first()"))
            }
            StreamState::Exhausted | StreamState::CommandOnly | StreamState::Errored => Ok(false),
        }
    }

    /// The tuple the stream is positioned on.
    pub fn row(&self) -> Result<Row<'_>, DecodeError> {
        match (self.state, self.current.as_ref()) {
            (StreamState::PositionedOnTuple(n), Some(result)) => {
                Ok(Row::new(result, n, self.config.validate_types))
            }
            _ => Err(DecodeError::NoActiveRow),
        }
    }

    /// Yield the next tuple, starting the stream if needed.
    ///
    /// ```ignore
    /// while let Some(row) = stream.next_row()? {
    ///     let id: i32 = row.get(0)?;
    /// }
    /// ```
    pub fn next_row(&mut self) -> PgResult<Option<Row<'_>>> {
        let positioned = match self.state {
            StreamState::Idle => self.first()?,
            _ => self.advance()?,
        };
        if !positioned {
            return Ok(None);
        }
        Ok(Some(self.row()?))
    }

    /// Iterate the remaining tuples, decoding each with `f`.
    pub fn map<T, F>(&mut self, f: F) -> MappedRows<'_, 'c, S, F>
    where
        F: FnMut(Row<'_>) -> Result<T, DecodeError>,
    {
        MappedRows {
            stream: self,
            f,
            done: false,
        }
    }

    /// Rows affected by the streamed statement, from its command tag.
    ///
    /// Only available once the statement completed (`Exhausted` or
    /// `CommandOnly`).
    pub fn affected_row_count(&self) -> PgResult<u64> {
        if !self.completed {
            return Err(PgError::InvalidState(
                "affected_row_count() called before command completion",
            ));
        }
        Ok(self
            .command_tag
            .as_deref()
            .map(super::message::rows_affected)
            .unwrap_or(0))
    }

    /// Discard everything the request still owes, leaving the connection
    /// ready for a new request.
    ///
    /// Mid-stream, up to `drain_row_budget` tuples are read and dropped;
    /// if the server keeps sending tuples a cancel request is issued and
    /// the remaining messages are read until the end of the request. Only a
    /// `query_canceled` error is expected after the cancel; any other
    /// server error (or desync) met while draining is kept, and the first
    /// one is returned after the drain has finished.
    pub fn drain(&mut self) -> PgResult<()> {
        let mut first_error: Option<PgError> = None;
        let mut cancelled = false;

        if matches!(
            self.state,
            StreamState::Idle | StreamState::PositionedOnTuple(_)
        ) {
            cancelled = self.drain_statement(&mut first_error)?;
        }

        // Tuples still belong to the streamed statement until its completion.
        let mut in_statement = cancelled && !self.completed;

        while !self.request_done {
            self.current = None;
            let Some(result) = self.fetch_raw()? else {
                break;
            };
            match result.status() {
                ResultStatus::SingleTuple if cancelled => {
                    if in_statement {
                        self.rows += 1;
                    }
                }
                ResultStatus::SingleTuple => {
                    // Rows of a later statement nobody will read.
                    warn!("tuple received while draining completed statement, cancelling");
                    first_error.get_or_insert_with(|| {
                        PgError::ProtocolDesync(
                            "tuple received after command completion".to_string(),
                        )
                    });
                    self.session.cancel()?;
                    cancelled = true;
                }
                ResultStatus::TuplesOk | ResultStatus::CommandOk | ResultStatus::EmptyQuery => {
                    in_statement = false;
                    trace!(tag = ?result.command_tag(), "discarded completion while draining");
                }
                ResultStatus::FatalError | ResultStatus::BadResponse
                    if cancelled && result.error().is_some_and(ServerError::is_query_canceled) =>
                {
                    in_statement = false;
                    debug!("cancellation acknowledged by server");
                }
                ResultStatus::FatalError | ResultStatus::BadResponse => {
                    let message = self.error_message(&result);
                    in_statement = false;
                    debug!(%message, "server error while draining");
                    first_error.get_or_insert(PgError::ExecutionFailed(message));
                }
            }
        }

        if let Some(err) = first_error {
            self.state = StreamState::Errored;
            return Err(err);
        }
        if !self.state.is_terminal() {
            self.state = StreamState::Exhausted;
        }
        Ok(())
    }

    /// Drain and return the affected row count, if the statement completed.
    pub fn finish(mut self) -> PgResult<Option<u64>> {
        self.drain()?;
        Ok(self.affected_row_count().ok())
    }

    // ========================================================================
    // Private helpers
    // ========================================================================

    /// Drop the held result, then pull the next one.
    fn fetch_raw(&mut self) -> PgResult<Option<RawResult>> {
        self.current = None;
        match self.session.next_result() {
            Ok(Some(result)) => Ok(Some(result)),
            Ok(None) => {
                self.request_done = true;
                Ok(None)
            }
            Err(e) => {
                self.state = StreamState::Errored;
                Err(e)
            }
        }
    }

    fn fetch(&mut self) -> PgResult<Option<RawResult>> {
        if self.request_done {
            self.state = StreamState::Errored;
            return Err(PgError::ProtocolDesync(
                "request already ended".to_string(),
            ));
        }
        self.fetch_raw()
    }

    /// Apply a fetched result to the state machine.
    fn apply(&mut self, result: Option<RawResult>, first: bool) -> PgResult<bool> {
        let Some(result) = result else {
            return Err(self.desync("request ended before the statement completed"));
        };

        match result.status() {
            ResultStatus::SingleTuple => {
                self.rows += 1;
                self.state = StreamState::PositionedOnTuple(self.rows);
                trace!(row = self.rows, "fetched tuple");
                self.current = Some(result);
                Ok(true)
            }
            ResultStatus::TuplesOk => {
                debug!(rows = self.rows, tag = ?result.command_tag(), "result exhausted");
                self.complete_with(result, StreamState::Exhausted);
                Ok(false)
            }
            ResultStatus::CommandOk | ResultStatus::EmptyQuery if first => {
                debug!(tag = ?result.command_tag(), "command completed without rows");
                self.complete_with(result, StreamState::CommandOnly);
                Ok(false)
            }
            ResultStatus::CommandOk | ResultStatus::EmptyQuery => {
                Err(self.desync("command completion received in the middle of a row stream"))
            }
            ResultStatus::FatalError | ResultStatus::BadResponse => {
                let message = self.error_message(&result);
                debug!(%message, "statement failed");
                self.state = StreamState::Errored;
                self.current = Some(result);
                Err(PgError::ExecutionFailed(message))
            }
        }
    }

    fn complete_with(&mut self, result: RawResult, state: StreamState) {
        self.command_tag = result.command_tag().map(str::to_owned);
        self.completed = true;
        self.state = state;
        self.current = Some(result);
    }

    fn desync(&mut self, what: &str) -> PgError {
        warn!(state = ?self.state, "{}", what);
        self.state = StreamState::Errored;
        PgError::ProtocolDesync(what.to_string())
    }

    fn error_message(&self, result: &RawResult) -> String {
        let message = self.session.last_error();
        if !message.is_empty() {
            return message;
        }
        result
            .error()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown server error".to_string())
    }

    /// Finish the statement being streamed. Returns whether a cancel was sent.
    fn drain_statement(&mut self, first_error: &mut Option<PgError>) -> PgResult<bool> {
        let mut budget = self.config.drain_row_budget;

        loop {
            let Some(result) = self.fetch_raw()? else {
                if self.state != StreamState::Idle {
                    first_error.get_or_insert_with(|| {
                        PgError::ProtocolDesync(
                            "request ended before the statement completed".to_string(),
                        )
                    });
                }
                return Ok(false);
            };

            match result.status() {
                ResultStatus::SingleTuple if budget == 0 => {
                    self.rows += 1;
                    warn!(rows = self.rows, "abandoning result stream, sending cancel request");
                    self.session.cancel()?;
                    return Ok(true);
                }
                ResultStatus::SingleTuple => {
                    budget -= 1;
                    self.rows += 1;
                    trace!(row = self.rows, "discarded tuple");
                }
                ResultStatus::TuplesOk => {
                    self.complete_with(result, StreamState::Exhausted);
                    self.current = None;
                    return Ok(false);
                }
                ResultStatus::CommandOk | ResultStatus::EmptyQuery => {
                    self.complete_with(result, StreamState::CommandOnly);
                    self.current = None;
                    return Ok(false);
                }
                ResultStatus::FatalError | ResultStatus::BadResponse => {
                    let message = self.error_message(&result);
                    first_error.get_or_insert(PgError::ExecutionFailed(message));
                    self.state = StreamState::Errored;
                    return Ok(false);
                }
            }
        }
    }
}

impl<S: Session> Drop for ResultStream<'_, S> {
    fn drop(&mut self) {
        if !self.request_done {
            warn!(
                state = ?self.state,
                "result stream dropped before the request was drained; the connection stays busy"
            );
        }
    }
}

/// Iterator returned by [`ResultStream::map`].
pub struct MappedRows<'s, 'c, S: Session, F> {
    stream: &'s mut ResultStream<'c, S>,
    f: F,
    done: bool,
}

impl<'s, 'c, S: Session, F> MappedRows<'s, 'c, S, F> {
    /// The underlying stream, e.g. to drain it after iteration.
    pub fn stream(&mut self) -> &mut ResultStream<'c, S> {
        &mut *self.stream
    }
}

impl<T, S, F> Iterator for MappedRows<'_, '_, S, F>
where
    S: Session,
    F: FnMut(Row<'_>) -> Result<T, DecodeError>,
{
    type Item = PgResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.stream.next_row() {
            Ok(Some(row)) => Some((self.f)(row).map_err(PgError::from)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
