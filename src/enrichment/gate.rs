//! Eligibility gating and dispatch of enrichment requests.

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::enrichment::protocol::EnrichmentRequest;
use crate::integration::CropSource;
use crate::tracker::{LifecycleStore, TrackId};

/// Synchronous dispatch failure, observed at send time.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("session channel is not connected")]
    NotConnected,
    #[error("session channel is closed")]
    Closed,
}

/// Where the gate pushes requests. Implemented by the session channel
/// handle; tests substitute their own sinks.
///
/// `dispatch` must never block: it either enqueues the request or fails
/// immediately. Completion is only ever observed on the reply path.
pub trait EnrichmentSink {
    fn dispatch(&self, request: EnrichmentRequest) -> Result<(), DispatchError>;
}

/// Configuration for the enrichment gate.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Confidence a track must exceed to be enriched
    pub min_confidence: f32,
    /// How long a track must have existed before it is considered stable
    pub stability: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.8,
            stability: Duration::from_millis(1500),
        }
    }
}

/// Decides, once per detection cycle, which identities get sent to the
/// oracle, and drives their enrichment state machine.
pub struct EnrichmentGate {
    config: GateConfig,
}

impl EnrichmentGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Run one gating pass over the store's exposed view.
    ///
    /// Eligible tracks are marked Pending *before* dispatch; that
    /// check-and-set is the only de-duplication of oracle requests, so
    /// this method must run inside the single serialized mutation path:
    /// no reply, timer, or retry may interleave. Crop or dispatch failure
    /// degrades the track to Error, recoverable by user retry.
    ///
    /// Returns the number of requests dispatched.
    pub fn run_cycle<C, S>(
        &self,
        store: &mut LifecycleStore,
        crops: &mut C,
        sink: &S,
        now: Instant,
    ) -> usize
    where
        C: CropSource,
        S: EnrichmentSink,
    {
        let eligible: Vec<TrackId> = store
            .exposed()
            .iter()
            .filter(|t| {
                t.enrichment.is_none()
                    && t.score > self.config.min_confidence
                    && t.age(now) > self.config.stability
            })
            .map(|t| t.id)
            .collect();

        let mut dispatched = 0;
        for id in eligible {
            if !store.begin_enrichment(id) {
                continue;
            }
            let Some(track) = store.get(id) else {
                continue;
            };

            let crop = match crops.encode_crop(&track.smoothed_rect) {
                Ok(crop) => crop,
                Err(err) => {
                    warn!(%id, %err, "crop encoding failed");
                    store.fail_enrichment(id);
                    continue;
                }
            };

            let request = EnrichmentRequest {
                track_id: id,
                label: track.label.clone(),
                confidence: track.score,
                crop_base64: crop,
            };

            match sink.dispatch(request) {
                Ok(()) => {
                    debug!(%id, "enrichment request dispatched");
                    dispatched += 1;
                }
                Err(err) => {
                    debug!(%id, %err, "enrichment dispatch failed");
                    store.fail_enrichment(id);
                }
            }
        }

        dispatched
    }
}
