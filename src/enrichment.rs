//! Enrichment gating and the oracle wire protocol.

mod gate;
mod protocol;

pub use gate::{DispatchError, EnrichmentGate, EnrichmentSink, GateConfig};
pub use protocol::{EnrichmentRequest, ReplyEvent, ReplyParseError, parse_reply};
