//! Reconnecting duplex session with the enrichment oracle.

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::enrichment::{
    DispatchError, EnrichmentRequest, EnrichmentSink, ReplyEvent, parse_reply,
};
use crate::session::backoff::Backoff;
use crate::session::transport::{Connection, Transport, TransportError};

/// Connection state of the session channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Never connected, or shut down
    Disconnected,
    /// Connection attempt in flight
    Connecting,
    /// Duplex session established
    Connected,
    /// Waiting out the backoff delay after a failure or unexpected close
    Reconnecting,
}

/// The reconnecting session channel.
///
/// Owns nothing itself; `spawn` starts the session task and hands back the
/// caller-side pieces.
pub struct SessionChannel;

impl SessionChannel {
    /// Spawn the session task on the current tokio runtime.
    ///
    /// Returns the non-blocking handle used for dispatch and state checks,
    /// and the stream of parsed oracle replies. Malformed inbound frames
    /// never surface here; they are logged and dropped by the task.
    pub fn spawn<T: Transport>(
        transport: T,
    ) -> (ChannelHandle, mpsc::UnboundedReceiver<ReplyEvent>) {
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);
        tokio::spawn(run_session(transport, out_rx, reply_tx, state_tx));
        (
            ChannelHandle {
                state: state_rx,
                outbound: out_tx,
            },
            reply_rx,
        )
    }
}

/// Caller-side handle to the session task.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    state: watch::Receiver<SessionState>,
    outbound: mpsc::UnboundedSender<EnrichmentRequest>,
}

impl ChannelHandle {
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Connected
    }
}

impl EnrichmentSink for ChannelHandle {
    /// Enqueue a request without blocking. Fails fast when the session is
    /// not connected; the gate maps that to the track's Error state.
    fn dispatch(&self, request: EnrichmentRequest) -> Result<(), DispatchError> {
        if !self.is_open() {
            return Err(DispatchError::NotConnected);
        }
        self.outbound
            .send(request)
            .map_err(|_| DispatchError::Closed)
    }
}

enum Step {
    Outbound(Option<EnrichmentRequest>),
    Inbound(Option<Result<String, TransportError>>),
}

async fn run_session<T: Transport>(
    mut transport: T,
    mut outbound: mpsc::UnboundedReceiver<EnrichmentRequest>,
    replies: mpsc::UnboundedSender<ReplyEvent>,
    state: watch::Sender<SessionState>,
) {
    let mut backoff = Backoff::new();
    loop {
        let _ = state.send(SessionState::Connecting);
        let mut conn = match transport.connect().await {
            Ok(conn) => {
                backoff.reset();
                conn
            }
            Err(err) => {
                warn!(%err, "session connect failed");
                let _ = state.send(SessionState::Reconnecting);
                if !drain_outbound(&mut outbound) {
                    let _ = state.send(SessionState::Disconnected);
                    return;
                }
                tokio::time::sleep(backoff.next_delay()).await;
                continue;
            }
        };
        let _ = state.send(SessionState::Connected);
        info!("enrichment session connected");

        loop {
            // Resolve the race first, then touch the connection: the
            // recv future borrows it until the select completes.
            let step = tokio::select! {
                request = outbound.recv() => Step::Outbound(request),
                inbound = conn.recv() => Step::Inbound(inbound),
            };

            match step {
                Step::Outbound(Some(request)) => {
                    let text = match serde_json::to_string(&request) {
                        Ok(text) => text,
                        Err(err) => {
                            warn!(%err, "failed to encode request, dropping");
                            continue;
                        }
                    };
                    if let Err(err) = conn.send(text).await {
                        warn!(%err, "session send failed");
                        break;
                    }
                    debug!(id = %request.track_id, "request sent");
                }
                // Every handle dropped: shut the session down for good.
                Step::Outbound(None) => {
                    let _ = state.send(SessionState::Disconnected);
                    return;
                }
                Step::Inbound(Some(Ok(text))) => match parse_reply(&text) {
                    Ok(reply) => {
                        let _ = replies.send(reply);
                    }
                    Err(err) => warn!(%err, "malformed reply dropped"),
                },
                Step::Inbound(Some(Err(err))) => {
                    warn!(%err, "session receive failed");
                    break;
                }
                Step::Inbound(None) => {
                    info!("session closed by peer");
                    break;
                }
            }
        }

        let _ = state.send(SessionState::Reconnecting);
        if !drain_outbound(&mut outbound) {
            let _ = state.send(SessionState::Disconnected);
            return;
        }
        tokio::time::sleep(backoff.next_delay()).await;
    }
}

/// Drop requests queued while the connection was down; they never reached
/// the oracle, so their identities stay Pending and wait. Returns false
/// once every handle has been dropped and the session should shut down.
fn drain_outbound(outbound: &mut mpsc::UnboundedReceiver<EnrichmentRequest>) -> bool {
    let mut dropped = 0usize;
    loop {
        match outbound.try_recv() {
            Ok(_) => dropped += 1,
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => return false,
        }
    }
    if dropped > 0 {
        warn!(dropped, "dropped queued requests while disconnected");
    }
    true
}
