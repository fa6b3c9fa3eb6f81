//! Single-writer engine state composing the tracking pipeline.

use tokio::time::Instant;

use crate::enrichment::{EnrichmentGate, EnrichmentSink, GateConfig, ReplyEvent};
use crate::integration::CropSource;
use crate::layout::{LayoutConfig, Placement, resolve_layout};
use crate::tracker::{
    Detection, EnrichmentState, GraceTimer, LifecycleStore, Rect, TrackId, TrackedObject,
    TrackerConfig,
};

/// One serialized mutation of the engine state.
///
/// Every mutation source (detection cycle, oracle reply, grace timer,
/// user action) is an event; nothing writes to the store directly.
#[derive(Debug)]
pub enum Event {
    /// A detection cycle from the perception pipeline
    Frame(Vec<Detection>),
    /// A parsed oracle reply
    Reply(ReplyEvent),
    /// A grace timer fired
    GraceExpired { id: TrackId, deadline: Instant },
    /// User retry of a failed enrichment
    Retry(TrackId),
    /// User toggle of a track's detail expansion
    SetExpanded { id: TrackId, expanded: bool },
}

/// Side effects the runtime must carry out after an event.
#[derive(Debug, Default)]
pub struct EngineOutput {
    /// Grace timers to schedule
    pub timers: Vec<GraceTimer>,
}

/// Read-only snapshot of one exposed track.
#[derive(Debug, Clone)]
pub struct TrackView {
    pub id: TrackId,
    pub label: String,
    pub score: f32,
    pub rect: Rect,
    pub fading: bool,
    pub expanded: bool,
    pub enrichment: EnrichmentState,
}

impl From<&TrackedObject> for TrackView {
    fn from(track: &TrackedObject) -> Self {
        Self {
            id: track.id,
            label: track.label.clone(),
            score: track.score,
            rect: track.smoothed_rect,
            fading: track.fading,
            expanded: track.expanded,
            enrichment: track.enrichment.clone(),
        }
    }
}

/// Immutable presentation snapshot: the capped track view plus card
/// placements. This is the entire surface presentation may read.
#[derive(Debug, Clone, Default)]
pub struct OverlayView {
    pub tracks: Vec<TrackView>,
    pub placements: Vec<Placement>,
}

/// Aggregate configuration for the engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub tracker: TrackerConfig,
    pub gate: GateConfig,
    pub layout: LayoutConfig,
}

/// The pipeline behind one serialized call site.
///
/// `handle_event` is the only mutation path; the tokio runtime wrapper
/// funnels all event sources into it from a single task.
pub struct Engine<C, S> {
    store: LifecycleStore,
    gate: EnrichmentGate,
    layout: LayoutConfig,
    crops: C,
    sink: S,
}

impl<C, S> Engine<C, S>
where
    C: CropSource,
    S: EnrichmentSink,
{
    pub fn new(config: EngineConfig, crops: C, sink: S) -> Self {
        Self {
            store: LifecycleStore::new(config.tracker),
            gate: EnrichmentGate::new(config.gate),
            layout: config.layout,
            crops,
            sink,
        }
    }

    /// Apply one event at the given time.
    ///
    /// A frame event runs the full cycle: association and lifecycle
    /// update, then the enrichment gate over the exposed view. The gate's
    /// mark-Pending-then-dispatch runs to completion inside this call,
    /// which is what makes it atomic with respect to every other event.
    pub fn handle_event(&mut self, event: Event, now: Instant) -> EngineOutput {
        match event {
            Event::Frame(detections) => {
                let outcome = self.store.apply_cycle(&detections, now);
                self.gate
                    .run_cycle(&mut self.store, &mut self.crops, &self.sink, now);
                EngineOutput {
                    timers: outcome.timers,
                }
            }
            Event::Reply(ReplyEvent::Ready { id, result }) => {
                self.store.complete_enrichment(id, result);
                EngineOutput::default()
            }
            Event::Reply(ReplyEvent::Failed { id }) => {
                self.store.fail_enrichment(id);
                EngineOutput::default()
            }
            Event::GraceExpired { id, deadline } => {
                self.store.expire(id, deadline);
                EngineOutput::default()
            }
            Event::Retry(id) => {
                self.store.retry_enrichment(id);
                EngineOutput::default()
            }
            Event::SetExpanded { id, expanded } => {
                self.store.set_expanded(id, expanded);
                EngineOutput::default()
            }
        }
    }

    /// Presentation snapshot of the current exposed view.
    pub fn view(&self) -> OverlayView {
        let exposed = self.store.exposed();
        let placements = resolve_layout(&exposed, &self.layout);
        let tracks = exposed.into_iter().map(TrackView::from).collect();
        OverlayView { tracks, placements }
    }

    pub fn store(&self) -> &LifecycleStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::time::Duration;

    use crate::enrichment::{DispatchError, EnrichmentRequest};
    use crate::integration::PlaceholderCrop;
    use crate::tracker::EnrichmentResult;

    struct RecordingSink {
        requests: RefCell<Vec<EnrichmentRequest>>,
    }

    impl EnrichmentSink for RecordingSink {
        fn dispatch(&self, request: EnrichmentRequest) -> Result<(), DispatchError> {
            self.requests.borrow_mut().push(request);
            Ok(())
        }
    }

    fn engine() -> Engine<PlaceholderCrop, RecordingSink> {
        Engine::new(
            EngineConfig::default(),
            PlaceholderCrop,
            RecordingSink {
                requests: RefCell::new(Vec::new()),
            },
        )
    }

    fn frame(score: f32) -> Event {
        Event::Frame(vec![Detection::new(
            "cup",
            score,
            Rect::new(10.0, 10.0, 100.0, 100.0),
        )])
    }

    #[test]
    fn test_frame_reply_roundtrip() {
        let mut engine = engine();
        let t0 = Instant::now();

        engine.handle_event(frame(0.9), t0);
        let id = engine.view().tracks[0].id;

        // Past the stability window a second frame dispatches.
        engine.handle_event(frame(0.9), t0 + Duration::from_secs(2));
        assert_eq!(engine.sink.requests.borrow().len(), 1);

        let result = EnrichmentResult {
            identification: serde_json::json!({"name": "mug"}),
            enrichment: serde_json::json!({"summary": "a mug"}),
        };
        engine.handle_event(
            Event::Reply(ReplyEvent::Ready { id, result }),
            t0 + Duration::from_secs(3),
        );
        assert!(engine.view().tracks[0].enrichment.is_ready());
    }

    #[test]
    fn test_stale_reply_for_destroyed_track_is_dropped() {
        let mut engine = engine();
        let t0 = Instant::now();

        let timers = engine.handle_event(frame(0.9), t0).timers;
        assert!(timers.is_empty());
        let id = engine.view().tracks[0].id;

        let timers = engine
            .handle_event(Event::Frame(vec![]), t0 + Duration::from_millis(33))
            .timers;
        assert_eq!(timers.len(), 1);

        engine.handle_event(
            Event::GraceExpired {
                id: timers[0].id,
                deadline: timers[0].deadline,
            },
            timers[0].deadline,
        );
        assert!(engine.view().tracks.is_empty());

        // Reply arrives after destruction: silently dropped, no panic.
        engine.handle_event(
            Event::Reply(ReplyEvent::Ready {
                id,
                result: EnrichmentResult {
                    identification: serde_json::json!({}),
                    enrichment: serde_json::json!({}),
                },
            }),
            t0 + Duration::from_secs(5),
        );
        assert!(engine.view().tracks.is_empty());
    }

    #[test]
    fn test_view_includes_placements() {
        let mut engine = engine();
        let t0 = Instant::now();
        engine.handle_event(frame(0.9), t0);

        let view = engine.view();
        assert_eq!(view.tracks.len(), 1);
        assert_eq!(view.placements.len(), 1);
        assert_eq!(view.placements[0].id, view.tracks[0].id);
    }
}
