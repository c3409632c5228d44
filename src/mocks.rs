use crate::catalog::ClassId;
use crate::errors::Result;
use crate::model::{normalize_output, preprocess, TensorLayout};
use crate::traits::SegmentationModel;
use image::DynamicImage;
use ndarray::prelude::*;

/// Test model that answers every image with a fixed prediction tensor.
#[derive(Debug, Clone)]
pub struct MockSegmentationModel {
    pub prediction: ArrayD<f32>,
}

impl MockSegmentationModel {
    /// `prediction` is `(height, width, num_classes)` or `(height, width)`.
    pub fn new(prediction: ArrayD<f32>) -> Self {
        Self { prediction }
    }

    /// Every pixel predicted as `class_id`.
    pub fn uniform(height: usize, width: usize, num_classes: usize, class_id: ClassId) -> Self {
        let classes = Array2::from_elem((height, width), class_id);
        Self::new(one_hot(&classes, num_classes).into_dyn())
    }
}

impl SegmentationModel for MockSegmentationModel {
    fn segment_image(&self, img: &DynamicImage) -> Result<ArrayD<f32>> {
        let (width, height) = self.get_image_size();
        let tensor = preprocess(img, width, height, TensorLayout::Nhwc);
        normalize_output(self.predict(tensor.view())?, TensorLayout::Nhwc)
    }

    fn get_image_size(&self) -> (u32, u32) {
        let shape = self.prediction.shape();
        (shape[1] as u32, shape[0] as u32)
    }

    /// Returns the fixed prediction shaped like a batched NHWC model output.
    fn predict(&self, _tensor: ArrayView4<f32>) -> Result<ArrayD<f32>> {
        let mut output = self.prediction.clone();
        if output.ndim() == 2 {
            output = output.insert_axis(Axis(2));
        }
        Ok(output.insert_axis(Axis(0)))
    }
}

/// One-hot scores for the given per-pixel class IDs.
pub fn one_hot(classes: &Array2<ClassId>, num_classes: usize) -> Array3<f32> {
    let (height, width) = classes.dim();
    Array3::from_shape_fn((height, width, num_classes), |(y, x, c)| {
        if usize::from(classes[[y, x]]) == c {
            1.0
        } else {
            0.0
        }
    })
}

/// `(height, width)` class IDs where the first `count` pixels in row-major order are
/// `class_id` and the rest are background.
pub fn leading_pixels(height: usize, width: usize, class_id: ClassId, count: usize) -> Array2<ClassId> {
    Array2::from_shape_fn((height, width), |(y, x)| {
        if y * width + x < count {
            class_id
        } else {
            0
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_mock_model_image_size() {
        let mock = MockSegmentationModel::uniform(12, 20, 5, 1);
        assert_eq!(mock.get_image_size(), (20, 12));
    }

    #[test]
    fn test_mock_model_segment_image() -> Result<()> {
        let mock = MockSegmentationModel::uniform(16, 16, 5, 3);
        let test_image = DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 100, Rgb([255, 0, 0])));

        let prediction = mock.segment_image(&test_image)?;
        assert_eq!(prediction.shape(), &[16, 16, 5]);
        assert_eq!(prediction[[4, 9, 3]], 1.0);
        Ok(())
    }

    #[test]
    fn test_mock_model_single_channel() -> Result<()> {
        let mock = MockSegmentationModel::new(Array2::<f32>::ones((8, 8)).into_dyn());
        let input_tensor = Array4::<f32>::zeros((1, 8, 8, 3));

        assert_eq!(mock.predict(input_tensor.view())?.shape(), &[1, 8, 8, 1]);
        let test_image = DynamicImage::new_rgb8(8, 8);
        assert_eq!(mock.segment_image(&test_image)?.shape(), &[8, 8]);
        Ok(())
    }

    #[test]
    fn test_leading_pixels() {
        let classes = leading_pixels(3, 4, 2, 5);
        assert_eq!(classes.iter().filter(|&&id| id == 2).count(), 5);
        assert_eq!(classes[[1, 0]], 2);
        assert_eq!(classes[[1, 1]], 0);
    }
}
