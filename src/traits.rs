use crate::errors::Result;
use image::DynamicImage;
use ndarray::prelude::*;

/// Abstraction over the inference engine.
///
/// The pipeline depends on this trait rather than on the ONNX session, so the
/// hosting layer owns the model's lifecycle and tests can inject a mock.
pub trait SegmentationModel: Send + Sync {
    /// Runs the full inference for one image and returns the prediction tensor,
    /// either `(height, width, num_classes)` or single-channel `(height, width)`.
    fn segment_image(&self, img: &DynamicImage) -> Result<ArrayD<f32>>;

    /// Spatial input size `(width, height)` the model expects.
    fn get_image_size(&self) -> (u32, u32);

    /// Raw tensor prediction (low-level API).
    fn predict(&self, tensor: ArrayView4<f32>) -> Result<ArrayD<f32>>;
}
