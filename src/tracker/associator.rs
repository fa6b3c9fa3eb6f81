//! Per-frame association of anonymous detections with live tracks.

use crate::tracker::rect::{Rect, iou_matrix};
use crate::tracker::track::TrackId;

/// Detection input for the tracker.
///
/// Ephemeral, carries no identity; the associator decides which live track
/// (if any) each detection belongs to.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Class label reported by the detector
    pub label: String,
    /// Detection confidence score in [0, 1]
    pub score: f32,
    /// Bounding box in TLWH format
    pub rect: Rect,
}

impl Detection {
    pub fn new(label: impl Into<String>, score: f32, rect: Rect) -> Self {
        Self {
            label: label.into(),
            score,
            rect,
        }
    }
}

/// A live track as seen by the associator: identity, label, and the box to
/// match against (the smoothed state).
#[derive(Debug, Clone)]
pub struct TrackCandidate<'a> {
    pub id: TrackId,
    pub label: &'a str,
    pub rect: Rect,
}

/// Match each detection against the live tracks.
///
/// Returns one slot per detection, in input order: the matched track's ID,
/// or `None` for detections that should become fresh identities.
///
/// A match requires an identical label and IoU strictly above
/// `iou_threshold`; among qualifying tracks the highest IoU wins, with
/// ties going to the earliest-created identity. Matching is greedy, not
/// globally optimal: each track takes at most one detection per cycle, and
/// detections are visited in confidence-descending order so that of two
/// near-identical same-label boxes the more confident one keeps the track.
pub fn associate(
    detections: &[Detection],
    tracks: &[TrackCandidate<'_>],
    iou_threshold: f32,
) -> Vec<Option<TrackId>> {
    let mut assignment: Vec<Option<TrackId>> = vec![None; detections.len()];
    if detections.is_empty() || tracks.is_empty() {
        return assignment;
    }

    let det_rects: Vec<Rect> = detections.iter().map(|d| d.rect).collect();
    let track_rects: Vec<Rect> = tracks.iter().map(|t| t.rect).collect();
    let scores = iou_matrix(&det_rects, &track_rects);

    // Confidence-descending visit order, stable on ties.
    let mut order: Vec<usize> = (0..detections.len()).collect();
    order.sort_by(|&a, &b| {
        detections[b]
            .score
            .partial_cmp(&detections[a].score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut taken = vec![false; tracks.len()];
    for det_idx in order {
        let detection = &detections[det_idx];
        let mut best: Option<(usize, f32)> = None;

        for (track_idx, track) in tracks.iter().enumerate() {
            if taken[track_idx] || track.label != detection.label {
                continue;
            }
            let score = scores[[det_idx, track_idx]];
            if score <= iou_threshold {
                continue;
            }
            let better = match best {
                None => true,
                Some((best_idx, best_score)) => {
                    score > best_score
                        || (score == best_score && track.id < tracks[best_idx].id)
                }
            };
            if better {
                best = Some((track_idx, score));
            }
        }

        if let Some((track_idx, _)) = best {
            taken[track_idx] = true;
            assignment[det_idx] = Some(tracks[track_idx].id);
        }
    }

    assignment
}
