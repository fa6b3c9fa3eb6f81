//! Trait for image crop encoding backends.

use std::convert::Infallible;

use crate::tracker::Rect;

/// Produces the encoded image crop attached to an enrichment request.
///
/// Cropping and encoding are outside the core: an implementation typically
/// clips the given region out of the most recent frame and base64-encodes
/// it. The gate treats a failure here exactly like a dispatch failure.
pub trait CropSource {
    /// Error type for crop failures.
    type Error: std::fmt::Display;

    /// Encode the crop for the given region of the current frame.
    fn encode_crop(&mut self, region: &Rect) -> Result<String, Self::Error>;
}

/// Crop source that produces an empty encoding.
///
/// Useful for tests and for headless deployments where the oracle is
/// driven by label and confidence alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderCrop;

impl CropSource for PlaceholderCrop {
    type Error = Infallible;

    fn encode_crop(&mut self, _region: &Rect) -> Result<String, Self::Error> {
        Ok(String::new())
    }
}
