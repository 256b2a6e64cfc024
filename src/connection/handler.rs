//! Connection Handler
//!
//! One handler per client connection, each running in its own task. The
//! handler owns the inbound byte buffer and drives the read-decode-execute-
//! respond loop:
//!
//! ```text
//! read bytes -> append to buffer -> decode_command -> execute -> reply
//!                     ^                                            |
//!                     └────────────── loop ──────────────────────-─┘
//! ```
//!
//! TCP delivers arbitrary chunks, so the buffer may hold half a command or
//! several at once; the decoder's `consumed` count keeps framing exact, and
//! pipelined commands are answered in arrival order.
//!
//! ## Error policy
//!
//! Command-level errors are ordinary replies and never close the
//! connection. A protocol error also stays on the connection: the handler
//! sends one `-ERR` reply, drops whatever is buffered, and resynchronizes
//! on the next read. Only I/O failure, the buffer cap, QUIT, or the peer
//! closing tears a connection down.

use crate::commands::CommandHandler;
use crate::protocol::{decode_command, Reply};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// Maximum size for the read buffer (64 KB)
const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Counters shared by every connection.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    pub connections_accepted: AtomicU64,
    pub active_connections: AtomicU64,
    pub commands_processed: AtomicU64,
    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed between commands
    #[error("client disconnected")]
    ClientDisconnected,

    /// Peer closed mid-command
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// A single command overflowed the buffer cap
    #[error("read buffer limit exceeded")]
    BufferFull,
}

/// Drives one client connection to completion.
pub struct ConnectionHandler {
    stream: BufWriter<TcpStream>,
    addr: SocketAddr,
    buffer: BytesMut,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandler {
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();
        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            stats,
        }
    }

    /// Runs the connection loop until the client goes away or QUITs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected"),
            Err(ConnectionError::ClientDisconnected) => {
                debug!(client = %self.addr, "Client disconnected")
            }
            Err(ConnectionError::Io(err))
                if err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(err) => warn!(client = %self.addr, error = %err, "Connection error"),
        }

        self.stats.connection_closed();
        result
    }

    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            // Drain every complete command already buffered
            while !self.buffer.is_empty() {
                match decode_command(&self.buffer) {
                    Ok(Some((args, consumed))) => {
                        let _ = self.buffer.split_to(consumed);
                        trace!(
                            client = %self.addr,
                            consumed,
                            remaining = self.buffer.len(),
                            "Decoded command"
                        );

                        let (reply, close) = self.command_handler.execute(args);
                        self.stats.commands_processed.fetch_add(1, Ordering::Relaxed);
                        self.send_reply(&reply).await?;

                        if close {
                            // QUIT: the +OK above has flushed, close now
                            return Ok(());
                        }
                    }
                    Ok(None) => break, // incomplete, wait for more bytes
                    Err(err) => {
                        // One error reply, drop the buffered bytes, and
                        // resynchronize at the next read
                        warn!(client = %self.addr, error = %err, "Protocol error");
                        self.send_reply(&Reply::error(err.to_string())).await?;
                        self.buffer.clear();
                        break;
                    }
                }
            }

            self.read_more().await?;
        }
    }

    /// Reads at least one byte from the socket into the buffer.
    async fn read_more(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            warn!(
                client = %self.addr,
                size = self.buffer.len(),
                "Read buffer limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
        if n == 0 {
            return if self.buffer.is_empty() {
                Err(ConnectionError::ClientDisconnected)
            } else {
                Err(ConnectionError::UnexpectedEof)
            };
        }

        self.stats.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
        trace!(client = %self.addr, bytes = n, "Read data");
        Ok(())
    }

    async fn send_reply(&mut self, reply: &Reply) -> Result<(), ConnectionError> {
        let bytes = reply.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats
            .bytes_written
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        Ok(())
    }
}

/// Creates a handler for the connection and runs it to completion,
/// swallowing the errors that just mean "the client went away".
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) {
    let handler = ConnectionHandler::new(stream, addr, command_handler, stats);
    if let Err(err) = handler.run().await {
        match err {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::Io(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => debug!(client = %addr, error = %err, "Connection ended with error"),
        }
    }
}
