//! pgstream - PostgreSQL binary result decoding with single-row streaming.
//!
//! Rows are fetched one at a time and decoded straight from the server's
//! binary wire format into Rust values, so memory stays flat no matter how
//! large the result is.

pub mod pg;

pub use pg::{
    Client, DecodeError, FromColumn, PgConfig, PgConnection, PgError, PgResult, PgValue,
    RawResult, ResultStatus, ResultStream, Row, Session, StreamConfig, StreamState,
};
