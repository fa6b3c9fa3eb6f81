//! Persistent identity tracking with asynchronous oracle enrichment.
//!
//! Turns an unordered stream of anonymous per-frame detections into a
//! small set of stable tracked identities, each enriched at most once by
//! a slow external identification oracle over a reconnecting duplex
//! session.
//!
//! The pieces:
//! - [`tracker`]: IoU association, box smoothing, and the lifecycle
//!   store that owns every identity.
//! - [`enrichment`]: the eligibility gate and the oracle wire protocol.
//! - [`session`]: the reconnecting session channel and its transport
//!   seam.
//! - [`layout`]: per-frame overlay card placement.
//! - [`engine`]: the single-writer event loop tying it all together.
//! - [`integration`]: traits for plugging in detection and crop
//!   encoding backends.

pub mod engine;
pub mod enrichment;
pub mod integration;
pub mod layout;
pub mod session;
pub mod tracker;

pub use engine::{Engine, EngineConfig, EngineHandle, Event, OverlayView, TrackView, spawn_engine};
pub use enrichment::{
    EnrichmentGate, EnrichmentRequest, EnrichmentSink, GateConfig, ReplyEvent,
};
pub use integration::{
    CropSource, DetectionBuilder, DetectionSource, DetectorFeed, PlaceholderCrop,
};
pub use layout::{LayoutConfig, Placement, resolve_layout};
pub use session::{ChannelHandle, SessionChannel, SessionState, Transport};
pub use tracker::{
    Detection, EnrichmentResult, EnrichmentState, LifecycleStore, Rect, TrackId, TrackedObject,
    TrackerConfig,
};
