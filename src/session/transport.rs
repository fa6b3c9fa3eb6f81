//! Trait for duplex transports carrying the enrichment session.

use std::future::Future;

use thiserror::Error;

/// Transport-level failure. The session treats every variant the same
/// way: log, tear the connection down, and reconnect with backoff.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("transport I/O error: {0}")]
    Io(String),
}

/// A factory for connections to the oracle endpoint.
///
/// Implement this to plug in any duplex, text-frame transport. The
/// session channel owns the reconnect loop; a transport only has to
/// produce one connection at a time.
pub trait Transport: Send + 'static {
    type Conn: Connection;

    /// Attempt a single connection.
    fn connect(&mut self) -> impl Future<Output = Result<Self::Conn, TransportError>> + Send;
}

/// One established duplex connection.
///
/// `recv` resolves to `None` on orderly close and `Some(Err(_))` on
/// failure; either ends the connection from the session's point of view.
pub trait Connection: Send {
    fn send(&mut self, text: String) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn recv(
        &mut self,
    ) -> impl Future<Output = Option<Result<String, TransportError>>> + Send;
}
