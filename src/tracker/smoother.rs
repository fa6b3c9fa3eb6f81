//! Exponential smoothing of per-track bounding boxes.

use crate::tracker::rect::Rect;

/// Blend the previous smoothed box with the current raw box.
///
/// Each field is filtered independently: `new = prev * factor + current * (1 - factor)`.
/// A factor of 0.0 passes the raw box through; a factor of 1.0 freezes the
/// previous box. The first observation of a track has no previous box and
/// bypasses smoothing entirely (the store uses the raw box as-is).
pub fn smooth(prev: &Rect, current: &Rect, factor: f32) -> Rect {
    let keep = factor;
    let take = 1.0 - factor;
    Rect {
        x: prev.x * keep + current.x * take,
        y: prev.y * keep + current.y * take,
        width: prev.width * keep + current.width * take,
        height: prev.height * keep + current.height * take,
    }
}
