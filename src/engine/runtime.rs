//! Tokio task owning the engine: the serialization point for all events.

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::engine::core::{Engine, Event, OverlayView};
use crate::enrichment::{EnrichmentSink, ReplyEvent};
use crate::integration::CropSource;
use crate::tracker::{Detection, TrackId};

/// Handle used by the detector feed, user actions, and presentation.
///
/// All methods are non-blocking; they enqueue events for the engine task.
/// Presentation only ever reads published `OverlayView` snapshots.
#[derive(Clone)]
pub struct EngineHandle {
    events: mpsc::UnboundedSender<Event>,
    view: watch::Receiver<OverlayView>,
}

impl EngineHandle {
    /// Feed one detection cycle into the engine.
    pub fn submit_frame(&self, detections: Vec<Detection>) {
        let _ = self.events.send(Event::Frame(detections));
    }

    /// Retry a failed enrichment.
    pub fn retry(&self, id: TrackId) {
        let _ = self.events.send(Event::Retry(id));
    }

    /// Toggle a track's detail expansion.
    pub fn set_expanded(&self, id: TrackId, expanded: bool) {
        let _ = self.events.send(Event::SetExpanded { id, expanded });
    }

    /// The most recently published presentation snapshot.
    pub fn view(&self) -> OverlayView {
        self.view.borrow().clone()
    }

    /// Subscribe to snapshot updates.
    pub fn watch_view(&self) -> watch::Receiver<OverlayView> {
        self.view.clone()
    }
}

/// Spawn the engine task on the current tokio runtime.
///
/// `replies` is the reply stream handed out by `SessionChannel::spawn`;
/// pass a fresh channel's receiver when running without a session.
pub fn spawn_engine<C, S>(
    engine: Engine<C, S>,
    replies: mpsc::UnboundedReceiver<ReplyEvent>,
) -> EngineHandle
where
    C: CropSource + Send + 'static,
    S: EnrichmentSink + Send + 'static,
{
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (view_tx, view_rx) = watch::channel(OverlayView::default());
    tokio::spawn(run_engine(engine, event_rx, replies, view_tx));
    EngineHandle {
        events: event_tx,
        view: view_rx,
    }
}

async fn run_engine<C, S>(
    mut engine: Engine<C, S>,
    mut events: mpsc::UnboundedReceiver<Event>,
    mut replies: mpsc::UnboundedReceiver<ReplyEvent>,
    view: watch::Sender<OverlayView>,
) where
    C: CropSource + Send,
    S: EnrichmentSink + Send,
{
    // Grace timers feed back through their own queue so that dropping the
    // last external handle still shuts the task down.
    let (timer_tx, mut timers) = mpsc::unbounded_channel();
    let mut replies_open = true;

    loop {
        let event = tokio::select! {
            event = events.recv() => match event {
                Some(event) => event,
                // Every external handle dropped: stop.
                None => break,
            },
            Some(event) = timers.recv() => event,
            reply = replies.recv(), if replies_open => match reply {
                Some(reply) => Event::Reply(reply),
                None => {
                    replies_open = false;
                    continue;
                }
            },
        };

        // Time is stamped here, once per event, at the serialization
        // point; handle_event runs to completion before the next event.
        let now = Instant::now();
        let output = engine.handle_event(event, now);

        for timer in output.timers {
            let tx = timer_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep_until(timer.deadline).await;
                let _ = tx.send(Event::GraceExpired {
                    id: timer.id,
                    deadline: timer.deadline,
                });
            });
        }

        view.send_replace(engine.view());
    }
}
