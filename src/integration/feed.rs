//! Bridge from a detection backend to the engine.

use crate::engine::EngineHandle;

use super::DetectionSource;

/// Couples a `DetectionSource` to a running engine.
///
/// Call `process_frame` at the detector's own cadence; detections are
/// handed to the engine as one cycle and the call never waits on the
/// engine or the network.
pub struct DetectorFeed<D: DetectionSource> {
    source: D,
    handle: EngineHandle,
}

impl<D: DetectionSource> DetectorFeed<D> {
    /// Create a new feed from a detector and an engine handle.
    pub fn new(source: D, handle: EngineHandle) -> Self {
        Self { source, handle }
    }

    /// Run inference on one frame and submit the result as a cycle.
    ///
    /// # Arguments
    /// * `input` - Raw image bytes
    /// * `width` - Image width in pixels
    /// * `height` - Image height in pixels
    pub fn process_frame(
        &mut self,
        input: &[u8],
        width: u32,
        height: u32,
    ) -> Result<(), D::Error> {
        let detections = self.source.detect(input, width, height)?;
        self.handle.submit_frame(detections);
        Ok(())
    }

    /// Get a reference to the underlying detector.
    pub fn source(&self) -> &D {
        &self.source
    }

    /// Get a mutable reference to the underlying detector.
    pub fn source_mut(&mut self) -> &mut D {
        &mut self.source
    }
}
