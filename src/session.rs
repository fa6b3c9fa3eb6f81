//! Reconnecting session channel to the enrichment oracle.

mod backoff;
mod channel;
mod transport;

#[cfg(feature = "ws-transport")]
mod ws;

pub use backoff::Backoff;
pub use channel::{ChannelHandle, SessionChannel, SessionState};
pub use transport::{Connection, Transport, TransportError};

#[cfg(feature = "ws-transport")]
pub use ws::{WsConnection, WsTransport};
