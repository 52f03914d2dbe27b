//! PostgreSQL binary row decoding and single-row result streaming.
//!
//! Architecture:
//! - `wire`: Bounds-checked big-endian reads over a column's bytes
//! - `types`: Type OIDs, epoch-rebased temporal values, parameter values
//! - `decode`: Binary decoders per supported type, plus 1-D arrays
//! - `row`: Typed view over the tuple a stream is positioned on
//! - `message`: One server result holding at most one tuple
//! - `session`: What a stream needs from its connection
//! - `result`: Fetch/advance/drain state machine over a request's results
//! - `protocol`: Low-level wire protocol encoding/decoding
//! - `connection`: Async connection, startup, request submission
//! - `client`: Blocking client implementing `Session`

pub mod client;
pub mod connection;
pub mod decode;
pub mod error;
pub mod message;
pub mod protocol;
pub mod result;
pub mod row;
pub mod scram;
pub mod session;
pub mod types;
pub mod wire;


pub use client::Client;
pub use connection::{PgConfig, PgConnection};
pub use decode::{ArrayElement, FromColumn};
pub use error::{DecodeError, PgError, PgResult, ServerError};
pub use message::{RawResult, ResultStatus};
pub use protocol::{FieldDescription, Format, SharedColumns};
pub use result::{MappedRows, ResultStream, StreamConfig, StreamState};
pub use row::Row;
pub use session::Session;
pub use types::{Date, Interval, Oid, PgValue, Time, TimeTz, Timestamp, TimestampTz};
pub use wire::WireReader;
