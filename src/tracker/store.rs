//! Authoritative identity store and lifecycle state machine.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::tracker::associator::{Detection, TrackCandidate, associate};
use crate::tracker::track::{EnrichmentResult, EnrichmentState, TrackId, TrackedObject};

/// Configuration for the lifecycle store.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Minimum IoU for a detection to match a live track (exclusive)
    pub match_thresh: f32,
    /// Exponential smoothing factor in [0, 1]; 0 is passthrough, 1 freezes
    pub smoothing: f32,
    /// How long an unmatched track survives before destruction
    pub grace: Duration,
    /// Maximum number of tracks exposed to presentation and enrichment
    pub overlay_cap: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            match_thresh: 0.5,
            smoothing: 0.6,
            grace: Duration::from_millis(1000),
            overlay_cap: 3,
        }
    }
}

/// A grace deadline armed during a cycle. The runtime schedules a timer
/// that fires an expiry event carrying this exact deadline back into the
/// store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraceTimer {
    pub id: TrackId,
    pub deadline: Instant,
}

/// What a detection cycle changed.
#[derive(Debug, Default)]
pub struct CycleOutcome {
    /// Identities created this cycle
    pub created: Vec<TrackId>,
    /// Grace deadlines armed this cycle
    pub timers: Vec<GraceTimer>,
}

/// Identity -> record map owning every live track.
///
/// All mutation enters through the methods below, and callers are expected
/// to serialize them: one cycle, reply, expiry, or user action at a time.
pub struct LifecycleStore {
    tracks: BTreeMap<TrackId, TrackedObject>,
    config: TrackerConfig,
}

impl LifecycleStore {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            tracks: BTreeMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Apply one detection cycle: match detections against live tracks,
    /// fold matches in, create fresh identities for unmatched detections,
    /// and start fading every track the cycle did not touch.
    pub fn apply_cycle(&mut self, detections: &[Detection], now: Instant) -> CycleOutcome {
        let assignment = {
            let candidates: Vec<TrackCandidate<'_>> = self
                .tracks
                .values()
                .map(|t| TrackCandidate {
                    id: t.id,
                    label: &t.label,
                    rect: t.smoothed_rect,
                })
                .collect();
            associate(detections, &candidates, self.config.match_thresh)
        };

        let mut outcome = CycleOutcome::default();
        let mut touched = BTreeSet::new();

        for (detection, slot) in detections.iter().zip(assignment) {
            match slot {
                Some(id) => {
                    if let Some(track) = self.tracks.get_mut(&id) {
                        track.observe(detection, self.config.smoothing, now);
                        touched.insert(id);
                    }
                }
                None => {
                    let track = TrackedObject::from_detection(detection, now);
                    debug!(id = %track.id, label = %track.label, "track created");
                    touched.insert(track.id);
                    outcome.created.push(track.id);
                    self.tracks.insert(track.id, track);
                }
            }
        }

        for track in self.tracks.values_mut() {
            if touched.contains(&track.id) {
                continue;
            }
            track.fading = true;
            if track.grace_deadline.is_none() {
                let deadline = now + self.config.grace;
                track.grace_deadline = Some(deadline);
                outcome.timers.push(GraceTimer {
                    id: track.id,
                    deadline,
                });
            }
        }

        outcome
    }

    /// Handle a grace timer firing. Destroys the track only if the armed
    /// deadline is still exactly the one the timer carries; a re-match in
    /// the meantime cleared or replaced it, making the timer stale.
    /// Destruction is permanent.
    pub fn expire(&mut self, id: TrackId, deadline: Instant) -> bool {
        match self.tracks.get(&id) {
            Some(track) if track.grace_deadline == Some(deadline) => {
                self.tracks.remove(&id);
                debug!(%id, "track destroyed after grace period");
                true
            }
            _ => false,
        }
    }

    /// The capped view visible to presentation and to the enrichment gate:
    /// at most `overlay_cap` tracks, confidence descending, ties by
    /// identity order. Excluded tracks stay live internally.
    pub fn exposed(&self) -> Vec<&TrackedObject> {
        let mut view: Vec<&TrackedObject> = self.tracks.values().collect();
        view.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        view.truncate(self.config.overlay_cap);
        view
    }

    pub fn get(&self, id: TrackId) -> Option<&TrackedObject> {
        self.tracks.get(&id)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Mark a track Pending ahead of dispatch. Returns false unless the
    /// track exists in state None; this check-and-set is the sole
    /// de-duplication of oracle requests and relies on the caller holding
    /// the single mutation path.
    pub fn begin_enrichment(&mut self, id: TrackId) -> bool {
        match self.tracks.get_mut(&id) {
            Some(track) if track.enrichment.is_none() => {
                track.enrichment = EnrichmentState::Pending;
                true
            }
            _ => false,
        }
    }

    /// Apply a successful oracle reply. The first reply for a Pending
    /// track wins; replies for tracks in any other state are ignored and
    /// replies for unknown identities are dropped (both expected).
    pub fn complete_enrichment(&mut self, id: TrackId, result: EnrichmentResult) {
        match self.tracks.get_mut(&id) {
            Some(track) if track.enrichment.is_pending() => {
                debug!(%id, "enrichment ready");
                track.enrichment = EnrichmentState::Ready(result);
            }
            Some(_) => debug!(%id, "duplicate enrichment reply ignored"),
            None => debug!(%id, "enrichment reply for destroyed track dropped"),
        }
    }

    /// Record a dispatch or oracle failure for a Pending track.
    pub fn fail_enrichment(&mut self, id: TrackId) {
        match self.tracks.get_mut(&id) {
            Some(track) if track.enrichment.is_pending() => {
                debug!(%id, "enrichment failed");
                track.enrichment = EnrichmentState::Error;
            }
            Some(_) => debug!(%id, "stale enrichment failure ignored"),
            None => debug!(%id, "enrichment failure for destroyed track dropped"),
        }
    }

    /// User retry: an Error track re-enters gating as None next cycle.
    pub fn retry_enrichment(&mut self, id: TrackId) -> bool {
        match self.tracks.get_mut(&id) {
            Some(track) if track.enrichment == EnrichmentState::Error => {
                track.enrichment = EnrichmentState::None;
                true
            }
            _ => false,
        }
    }

    /// User toggle of the detail expansion flag.
    pub fn set_expanded(&mut self, id: TrackId, expanded: bool) {
        if let Some(track) = self.tracks.get_mut(&id) {
            track.expanded = expanded;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::rect::Rect;

    fn det(label: &str, score: f32, x: f32, y: f32) -> Detection {
        Detection::new(label, score, Rect::new(x, y, 100.0, 100.0))
    }

    #[test]
    fn test_cycle_creates_and_matches() {
        let mut store = LifecycleStore::new(TrackerConfig::default());
        let t0 = Instant::now();

        let outcome = store.apply_cycle(&[det("cup", 0.9, 10.0, 10.0)], t0);
        assert_eq!(outcome.created.len(), 1);
        let id = outcome.created[0];

        let outcome = store.apply_cycle(
            &[det("cup", 0.9, 12.0, 12.0)],
            t0 + Duration::from_millis(33),
        );
        assert!(outcome.created.is_empty());
        assert_eq!(store.len(), 1);
        assert_eq!(store.exposed()[0].id, id);
    }

    #[test]
    fn test_unmatched_track_starts_fading_once() {
        let mut store = LifecycleStore::new(TrackerConfig::default());
        let t0 = Instant::now();

        let id = store.apply_cycle(&[det("cup", 0.9, 10.0, 10.0)], t0).created[0];

        let outcome = store.apply_cycle(&[], t0 + Duration::from_millis(33));
        assert_eq!(outcome.timers.len(), 1);
        assert_eq!(outcome.timers[0].id, id);
        assert!(store.get(id).is_some_and(|t| t.fading));

        // Still absent: the deadline is already armed, no second timer.
        let outcome = store.apply_cycle(&[], t0 + Duration::from_millis(66));
        assert!(outcome.timers.is_empty());
    }

    #[test]
    fn test_rematch_cancels_grace_timer() {
        let mut store = LifecycleStore::new(TrackerConfig::default());
        let t0 = Instant::now();

        let id = store.apply_cycle(&[det("cup", 0.9, 10.0, 10.0)], t0).created[0];
        let timer = store.apply_cycle(&[], t0 + Duration::from_millis(33)).timers[0];

        store.apply_cycle(
            &[det("cup", 0.9, 11.0, 11.0)],
            t0 + Duration::from_millis(66),
        );
        assert!(!store.get(id).is_some_and(|t| t.fading));

        // The stale timer fires anyway and must not destroy the track.
        assert!(!store.expire(timer.id, timer.deadline));
        assert!(store.get(id).is_some());
    }

    #[test]
    fn test_expiry_destroys_permanently() {
        let mut store = LifecycleStore::new(TrackerConfig::default());
        let t0 = Instant::now();

        let id = store.apply_cycle(&[det("cup", 0.9, 10.0, 10.0)], t0).created[0];
        let timer = store.apply_cycle(&[], t0 + Duration::from_millis(33)).timers[0];

        assert!(store.expire(timer.id, timer.deadline));
        assert!(store.get(id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_exposed_cap_orders_by_confidence() {
        let mut store = LifecycleStore::new(TrackerConfig {
            overlay_cap: 3,
            ..TrackerConfig::default()
        });
        let t0 = Instant::now();

        // Eight disjoint tracks with distinct confidences.
        let dets: Vec<Detection> = (0..8)
            .map(|i| det("cup", 0.1 + 0.1 * i as f32, 200.0 * i as f32, 0.0))
            .collect();
        store.apply_cycle(&dets, t0);
        assert_eq!(store.len(), 8);

        let exposed = store.exposed();
        assert_eq!(exposed.len(), 3);
        assert!(exposed[0].score >= exposed[1].score);
        assert!(exposed[1].score >= exposed[2].score);
        assert!((exposed[2].score - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_enrichment_transitions() {
        let mut store = LifecycleStore::new(TrackerConfig::default());
        let t0 = Instant::now();
        let id = store.apply_cycle(&[det("cup", 0.9, 10.0, 10.0)], t0).created[0];

        assert!(store.begin_enrichment(id));
        // Already pending: the gate must never double-dispatch.
        assert!(!store.begin_enrichment(id));

        let result = EnrichmentResult {
            identification: serde_json::json!({"name": "mug"}),
            enrichment: serde_json::json!({"summary": "a mug"}),
        };
        store.complete_enrichment(id, result.clone());
        assert!(store.get(id).is_some_and(|t| t.enrichment.is_ready()));

        // A duplicate reply is ignored.
        store.complete_enrichment(
            id,
            EnrichmentResult {
                identification: serde_json::json!({"name": "other"}),
                enrichment: serde_json::json!({}),
            },
        );
        assert_eq!(
            store.get(id).map(|t| t.enrichment.clone()),
            Some(EnrichmentState::Ready(result))
        );
    }

    #[test]
    fn test_retry_only_from_error() {
        let mut store = LifecycleStore::new(TrackerConfig::default());
        let t0 = Instant::now();
        let id = store.apply_cycle(&[det("cup", 0.9, 10.0, 10.0)], t0).created[0];

        assert!(!store.retry_enrichment(id));

        store.begin_enrichment(id);
        store.fail_enrichment(id);
        assert!(store.retry_enrichment(id));
        assert!(store.get(id).is_some_and(|t| t.enrichment.is_none()));
    }
}
