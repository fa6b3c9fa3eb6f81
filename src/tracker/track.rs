//! Tracked object record and identity allocation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::tracker::Detection;
use crate::tracker::rect::Rect;
use crate::tracker::smoother::smooth;

/// Global track ID counter for unique ID generation.
static TRACK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Reset the global track ID counter (useful for testing).
pub fn reset_track_id_counter() {
    TRACK_ID_COUNTER.store(0, Ordering::SeqCst);
}

/// Persistent identity of a tracked object.
///
/// Monotonically increasing and unique for the lifetime of the process;
/// a destroyed identity is never reissued.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TrackId(u64);

impl TrackId {
    /// Allocate the next unique track ID.
    pub(crate) fn next() -> Self {
        TrackId(TRACK_ID_COUNTER.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Reconstruct an ID from its wire representation.
    pub fn from_raw(raw: u64) -> Self {
        TrackId(raw)
    }

    /// The wire representation of the ID.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Oracle-provided detail attached to a track at most once.
///
/// The payloads are carried verbatim from the reply and never interpreted
/// here; only the presentation layer gives them meaning.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentResult {
    pub identification: serde_json::Value,
    pub enrichment: serde_json::Value,
}

/// Enrichment state machine for a single track.
///
/// Legal transitions: None -> Pending -> (Ready | Error), and
/// Error -> None on an explicit user retry. Nothing else.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum EnrichmentState {
    /// Not yet requested
    #[default]
    None,
    /// Request dispatched, reply outstanding
    Pending,
    /// First valid reply applied
    Ready(EnrichmentResult),
    /// Dispatch or oracle failure, user-recoverable
    Error,
}

impl EnrichmentState {
    pub fn is_none(&self) -> bool {
        matches!(self, EnrichmentState::None)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, EnrichmentState::Pending)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, EnrichmentState::Ready(_))
    }
}

/// A persistent tracked object.
///
/// Owned exclusively by the `LifecycleStore`; everything outside the store
/// sees clones or snapshots.
#[derive(Debug, Clone)]
pub struct TrackedObject {
    /// Unique track identifier
    pub id: TrackId,
    /// Class label from the detector
    pub label: String,
    /// Confidence of the most recent matched detection
    pub score: f32,
    /// Most recent raw detection box
    pub raw_rect: Rect,
    /// Jitter-filtered box shown to the presentation layer
    pub smoothed_rect: Rect,
    /// When the track was created
    pub first_seen: Instant,
    /// When the track last matched a detection
    pub last_seen: Instant,
    /// True iff absent from the latest cycle with an unfired grace deadline
    pub fading: bool,
    /// Enrichment state machine
    pub enrichment: EnrichmentState,
    /// User-toggled detail expansion
    pub expanded: bool,
    /// Armed grace deadline, if any. An expiry event must carry an equal
    /// deadline to destroy the track; re-matching clears it.
    pub(crate) grace_deadline: Option<Instant>,
}

impl TrackedObject {
    /// Create a track from its first detection. Smoothing is bypassed:
    /// the raw box is the smoothed box.
    pub(crate) fn from_detection(detection: &Detection, now: Instant) -> Self {
        Self {
            id: TrackId::next(),
            label: detection.label.clone(),
            score: detection.score,
            raw_rect: detection.rect,
            smoothed_rect: detection.rect,
            first_seen: now,
            last_seen: now,
            fading: false,
            enrichment: EnrichmentState::None,
            expanded: false,
            grace_deadline: None,
        }
    }

    /// Fold a matched detection into the track: cancel any grace deadline,
    /// refresh score and boxes, advance `last_seen`.
    pub(crate) fn observe(&mut self, detection: &Detection, smoothing: f32, now: Instant) {
        self.fading = false;
        self.grace_deadline = None;
        self.score = detection.score;
        self.raw_rect = detection.rect;
        self.smoothed_rect = smooth(&self.smoothed_rect, &detection.rect, smoothing);
        self.last_seen = now;
    }

    /// Time the track has existed, the stability clock read by the gate.
    pub fn age(&self, now: Instant) -> std::time::Duration {
        now.duration_since(self.first_seen)
    }
}
