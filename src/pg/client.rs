//! Blocking client that drives a `PgConnection` on its own runtime.

use tokio::runtime::{Builder, Runtime};
use tracing::debug;

use super::connection::{PgConfig, PgConnection};
use super::error::PgResult;
use super::message::RawResult;
use super::result::{ResultStream, StreamConfig};
use super::session::Session;
use super::types::PgValue;

/// Synchronous connection handle.
///
/// Each request returns a `ResultStream` that borrows the client mutably, so
/// a second request cannot start until the stream is gone. The stream must
/// be drained (`drain()` / `finish()`) before the next request; otherwise
/// the next `execute` fails with `PgError::InvalidState`.
///
/// ```ignore
/// let mut client = Client::connect("postgresql://postgres@localhost/postgres")?;
/// let mut stream = client.execute("SELECT id FROM jobs WHERE queue = $1", &[PgValue::Text("mail".into())])?;
/// while let Some(row) = stream.next_row()? {
///     let id: i64 = row.get(0)?;
/// }
/// stream.drain()?;
/// ```
pub struct Client {
    runtime: Runtime,
    conn: PgConnection,
    stream_config: StreamConfig,
}

impl Client {
    /// Connect using a `postgresql://` URL.
    pub fn connect(url: &str) -> PgResult<Self> {
        Self::connect_with_config(PgConfig::from_url(url)?)
    }

    pub fn connect_with_config(config: PgConfig) -> PgResult<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let conn = runtime.block_on(PgConnection::connect_with_config(config))?;
        Ok(Self {
            runtime,
            conn,
            stream_config: StreamConfig::default(),
        })
    }

    /// Settings applied to every stream this client creates.
    pub fn with_stream_config(mut self, config: StreamConfig) -> Self {
        self.stream_config = config;
        self
    }

    pub fn set_stream_config(&mut self, config: StreamConfig) {
        self.stream_config = config;
    }

    /// Run one statement with binary parameters; rows come back in binary
    /// format, one tuple at a time.
    pub fn execute(&mut self, sql: &str, params: &[PgValue]) -> PgResult<ResultStream<'_, Self>> {
        self.runtime
            .block_on(self.conn.send_query_params(sql, params))?;
        let config = self.stream_config.clone();
        Ok(ResultStream::new(self, config))
    }

    /// Run a `;`-separated batch through the simple protocol. Columns arrive
    /// in text format, so only text accessors apply to its rows.
    pub fn batch(&mut self, sql: &str) -> PgResult<ResultStream<'_, Self>> {
        self.runtime.block_on(self.conn.send_query(sql))?;
        let config = self.stream_config.clone();
        Ok(ResultStream::new(self, config))
    }

    /// The underlying async connection.
    pub fn connection(&self) -> &PgConnection {
        &self.conn
    }

    /// Send Terminate and close the socket.
    pub fn close(mut self) -> PgResult<()> {
        self.runtime.block_on(self.conn.close())
    }
}

impl Session for Client {
    fn next_result(&mut self) -> PgResult<Option<RawResult>> {
        self.runtime.block_on(self.conn.next_result())
    }

    fn cancel(&mut self) -> PgResult<()> {
        self.runtime.block_on(self.conn.cancel())
    }

    fn last_error(&self) -> String {
        self.conn
            .last_error()
            .map(|e| e.to_string())
            .unwrap_or_default()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if !self.conn.is_closed() {
            debug!(pid = self.conn.backend_pid(), "closing connection");
            let _ = self.runtime.block_on(self.conn.close());
        }
    }
}
