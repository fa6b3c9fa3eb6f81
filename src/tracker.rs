mod associator;
mod rect;
mod smoother;
mod store;
mod track;

pub use associator::{Detection, TrackCandidate, associate};
pub use rect::{Rect, iou_matrix};
pub use smoother::smooth;
pub use store::{CycleOutcome, GraceTimer, LifecycleStore, TrackerConfig};
pub use track::{EnrichmentResult, EnrichmentState, TrackId, TrackedObject, reset_track_id_counter};
