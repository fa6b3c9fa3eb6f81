//! WebSocket transport backed by tokio-tungstenite.

use std::future::Future;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::session::transport::{Connection, Transport, TransportError};

/// WebSocket client transport for the oracle's enrichment endpoint.
///
/// ```ignore
/// use visiontrack_rs::session::{SessionChannel, WsTransport};
///
/// let transport = WsTransport::new("ws://localhost:8000/enrich");
/// let (handle, replies) = SessionChannel::spawn(transport);
/// ```
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Transport for WsTransport {
    type Conn = WsConnection;

    fn connect(&mut self) -> impl Future<Output = Result<Self::Conn, TransportError>> + Send {
        let url = self.url.clone();
        async move {
            let (stream, _response) = connect_async(url.as_str())
                .await
                .map_err(|err| TransportError::Connect(err.to_string()))?;
            Ok(WsConnection { stream })
        }
    }
}

/// One established WebSocket connection.
pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Connection for WsConnection {
    fn send(&mut self, text: String) -> impl Future<Output = Result<(), TransportError>> + Send {
        async move {
            self.stream
                .send(Message::Text(text))
                .await
                .map_err(|err| TransportError::Io(err.to_string()))
        }
    }

    fn recv(&mut self) -> impl Future<Output = Option<Result<String, TransportError>>> + Send {
        async move {
            // Control frames are handled by tungstenite; binary frames are
            // not part of the protocol and get skipped.
            loop {
                match self.stream.next().await {
                    Some(Ok(Message::Text(text))) => return Some(Ok(text)),
                    Some(Ok(Message::Close(_))) | None => return None,
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => return Some(Err(TransportError::Io(err.to_string()))),
                }
            }
        }
    }
}
