//! Wire format shared with the identification oracle.
//!
//! One JSON text frame per message in both directions, correlated purely
//! by `trackId`. Reply payloads are carried opaquely; the core never
//! interprets the oracle's fields.

use serde::Serialize;
use thiserror::Error;

use crate::tracker::{EnrichmentResult, TrackId};

/// Outbound identification request, one discrete message per track.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentRequest {
    pub track_id: TrackId,
    pub label: String,
    pub confidence: f32,
    pub crop_base64: String,
}

/// A parsed oracle reply, ready to merge into the store.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyEvent {
    /// Successful identification for a track
    Ready {
        id: TrackId,
        result: EnrichmentResult,
    },
    /// The oracle reported failure for a track
    Failed { id: TrackId },
}

impl ReplyEvent {
    pub fn id(&self) -> TrackId {
        match self {
            ReplyEvent::Ready { id, .. } | ReplyEvent::Failed { id } => *id,
        }
    }
}

/// A reply frame that cannot be correlated to any identity.
#[derive(Debug, Error)]
pub enum ReplyParseError {
    #[error("reply is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("reply carries no usable trackId")]
    MissingTrackId,
}

/// Parse one inbound text frame.
///
/// Frames without a numeric `trackId` are unparseable and get dropped by
/// the caller. A frame with `"error": true`, or one missing its
/// identification/enrichment body, is an oracle failure for that identity.
pub fn parse_reply(text: &str) -> Result<ReplyEvent, ReplyParseError> {
    let value: serde_json::Value = serde_json::from_str(text)?;

    let id = value
        .get("trackId")
        .and_then(|v| v.as_u64())
        .map(TrackId::from_raw)
        .ok_or(ReplyParseError::MissingTrackId)?;

    if value
        .get("error")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
    {
        return Ok(ReplyEvent::Failed { id });
    }

    match (value.get("identification"), value.get("enrichment")) {
        (Some(identification), Some(enrichment)) => Ok(ReplyEvent::Ready {
            id,
            result: EnrichmentResult {
                identification: identification.clone(),
                enrichment: enrichment.clone(),
            },
        }),
        _ => Ok(ReplyEvent::Failed { id }),
    }
}
