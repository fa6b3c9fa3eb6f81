//! The single-writer event loop composing the tracking pipeline.

mod core;
mod runtime;

pub use self::core::{Engine, EngineConfig, EngineOutput, Event, OverlayView, TrackView};
pub use self::runtime::{EngineHandle, spawn_engine};
