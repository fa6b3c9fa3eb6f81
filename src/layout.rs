//! Per-frame placement of overlay cards.
//!
//! Stateless: the pass is recomputed from scratch every cycle with no
//! cross-frame memory, so placement can shift when the confidence order
//! changes.

use std::cmp::Ordering;

use crate::tracker::{Rect, TrackId, TrackedObject};

/// Configuration for the layout pass.
#[derive(Debug, Clone)]
pub struct LayoutConfig {
    /// Nominal card width in pixels
    pub card_width: f32,
    /// Nominal card height in pixels
    pub card_height: f32,
    /// Vertical gap kept between nudged cards
    pub margin: f32,
    /// Maximum push-down attempts per card before overlap is accepted
    pub max_nudges: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            card_width: 220.0,
            card_height: 72.0,
            margin: 8.0,
            max_nudges: 3,
        }
    }
}

/// Resolved anchor rectangle for one track's card.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub id: TrackId,
    pub anchor: Rect,
}

/// Place one card per exposed track, most confident first.
///
/// Each card starts at its track's smoothed top-left corner. A card that
/// overlaps an already-placed card is pushed below it (other card's height
/// plus the margin) and retested, at most `max_nudges` times; after that
/// the overlap is accepted rather than cascading further.
pub fn resolve_layout(tracks: &[&TrackedObject], config: &LayoutConfig) -> Vec<Placement> {
    let mut order: Vec<&TrackedObject> = tracks.to_vec();
    order.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut placements: Vec<Placement> = Vec::with_capacity(order.len());
    for track in order {
        let mut anchor = Rect::new(
            track.smoothed_rect.x,
            track.smoothed_rect.y,
            config.card_width,
            config.card_height,
        );

        let mut nudges = 0;
        while nudges < config.max_nudges {
            let overlap = placements.iter().find(|p| p.anchor.intersects(&anchor));
            match overlap {
                Some(placed) => {
                    anchor.y += placed.anchor.height + config.margin;
                    nudges += 1;
                }
                None => break,
            }
        }

        placements.push(Placement {
            id: track.id,
            anchor,
        });
    }

    placements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::Detection;
    use tokio::time::Instant;

    fn tracks_from(dets: &[Detection]) -> Vec<TrackedObject> {
        use crate::tracker::{LifecycleStore, TrackerConfig};
        let mut store = LifecycleStore::new(TrackerConfig {
            overlay_cap: usize::MAX,
            ..TrackerConfig::default()
        });
        store.apply_cycle(dets, Instant::now());
        store.exposed().into_iter().cloned().collect()
    }

    #[test]
    fn test_disjoint_cards_keep_their_anchors() {
        let tracks = tracks_from(&[
            Detection::new("cup", 0.9, Rect::new(0.0, 0.0, 100.0, 100.0)),
            Detection::new("cup", 0.8, Rect::new(500.0, 0.0, 100.0, 100.0)),
        ]);
        let refs: Vec<&TrackedObject> = tracks.iter().collect();

        let placements = resolve_layout(&refs, &LayoutConfig::default());
        assert_eq!(placements.len(), 2);
        assert_eq!(placements[0].anchor.x, 0.0);
        assert_eq!(placements[1].anchor.x, 500.0);
        assert_eq!(placements[0].anchor.y, 0.0);
        assert_eq!(placements[1].anchor.y, 0.0);
    }

    #[test]
    fn test_overlapping_card_is_pushed_down() {
        let config = LayoutConfig::default();
        let tracks = tracks_from(&[
            Detection::new("cup", 0.9, Rect::new(0.0, 0.0, 100.0, 100.0)),
            Detection::new("cup", 0.8, Rect::new(10.0, 10.0, 100.0, 100.0)),
        ]);
        let refs: Vec<&TrackedObject> = tracks.iter().collect();

        let placements = resolve_layout(&refs, &config);
        // The less confident card ends up below the winner's card.
        assert_eq!(placements[1].anchor.y, 10.0 + config.card_height + config.margin);
        assert!(!placements[0].anchor.intersects(&placements[1].anchor));
    }

    #[test]
    fn test_nudges_are_bounded() {
        let config = LayoutConfig::default();
        // Five cards piled on the same corner: only 3 nudges each, so the
        // later ones are allowed to overlap instead of cascading forever.
        let dets: Vec<Detection> = (0..5)
            .map(|i| {
                Detection::new(
                    "cup",
                    0.9 - 0.01 * i as f32,
                    Rect::new(0.0, 0.0, 100.0, 100.0),
                )
            })
            .collect();
        let tracks = tracks_from(&dets);
        let refs: Vec<&TrackedObject> = tracks.iter().collect();

        let placements = resolve_layout(&refs, &config);
        assert_eq!(placements.len(), 5);
        let step = config.card_height + config.margin;
        for placement in &placements {
            assert!(placement.anchor.y <= config.max_nudges as f32 * step + 1e-3);
        }
    }

    #[test]
    fn test_priority_order_is_confidence_descending() {
        let tracks = tracks_from(&[
            Detection::new("cup", 0.5, Rect::new(0.0, 0.0, 100.0, 100.0)),
            Detection::new("cup", 0.9, Rect::new(5.0, 5.0, 100.0, 100.0)),
        ]);
        let refs: Vec<&TrackedObject> = tracks.iter().collect();

        let placements = resolve_layout(&refs, &LayoutConfig::default());
        // The confident track is placed first and keeps its corner.
        assert_eq!(placements[0].anchor.y, 5.0);
    }
}
