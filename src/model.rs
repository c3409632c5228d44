use std::path::Path;

use crate::{
    errors::{DentalSegError, Result},
    traits::SegmentationModel,
};
use clap::ValueEnum;
use image::{imageops, imageops::FilterType, DynamicImage};
use ndarray::prelude::*;
use ort::value::TensorRef;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
};
use parking_lot::Mutex;
use tracing::{debug, info};

/// Memory layout of the model's input and output tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TensorLayout {
    /// `(batch, height, width, channels)`, as exported from Keras.
    Nhwc,
    /// `(batch, channels, height, width)`, as exported from PyTorch.
    Nchw,
}

impl TensorLayout {
    /// Axes holding `(height, width)` in a batched tensor.
    const fn spatial_axes(self) -> (usize, usize) {
        match self {
            Self::Nhwc => (1, 2),
            Self::Nchw => (2, 3),
        }
    }

    fn batch_shape(self, width: u32, height: u32) -> (usize, usize, usize, usize) {
        let (w, h) = (width as usize, height as usize);
        match self {
            Self::Nhwc => (1, h, w, 3),
            Self::Nchw => (1, 3, h, w),
        }
    }
}

pub struct Model {
    image_size: (u32, u32),
    layout: TensorLayout,
    input_name: String,
    output_name: String,
    session: Mutex<Session>,
}

impl Model {
    /// Loads an ONNX segmentation model.
    ///
    /// Spatial dimensions the model leaves dynamic fall back to `fallback_size`.
    pub fn new(
        model_path: &Path,
        device_id: i32,
        layout: TensorLayout,
        fallback_size: u32,
    ) -> Result<Self> {
        let mut session = SessionBuilder::new()
            .map_err(|e| DentalSegError::model("create session builder", e))?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ])
            .map_err(|e| DentalSegError::model("register execution providers", e))?
            .with_memory_pattern(true)
            .map_err(|e| DentalSegError::model("enable memory pattern", e))?
            .commit_from_file(model_path)
            .map_err(|e| {
                DentalSegError::model(format!("load model file {}", model_path.display()), e)
            })?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| DentalSegError::model("read model inputs", "model declares no inputs"))?;
        let input_name = input.name.clone();
        let dims = input
            .input_type
            .tensor_shape()
            .map(|shape| shape.to_vec())
            .unwrap_or_default();
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| DentalSegError::model("read model outputs", "model declares no outputs"))?;

        let (h_axis, w_axis) = layout.spatial_axes();
        let dim = |axis: usize| {
            dims.get(axis)
                .copied()
                .filter(|&d| d > 0)
                .map_or(fallback_size, |d| d as u32)
        };
        let image_size = (dim(w_axis), dim(h_axis));
        info!(
            input = %input_name,
            output = %output_name,
            width = image_size.0,
            height = image_size.1,
            ?layout,
            "model loaded from {}",
            model_path.display()
        );

        // initialize model
        let data = Array4::<f32>::zeros(layout.batch_shape(image_size.0, image_size.1));
        session
            .run(ort::inputs![input_name.as_str() => TensorRef::from_array_view(&data)?])
            .map_err(|e| DentalSegError::model("warm-up run", e))?;

        Ok(Self {
            image_size,
            layout,
            input_name,
            output_name,
            session: Mutex::new(session),
        })
    }

    pub const fn layout(&self) -> TensorLayout {
        self.layout
    }
}

impl SegmentationModel for Model {
    fn segment_image(&self, img: &DynamicImage) -> Result<ArrayD<f32>> {
        let (width, height) = self.image_size;
        let tensor = preprocess(img, width, height, self.layout);
        let output = self.predict(tensor.view())?;
        debug!(shape = ?output.shape(), "raw model output");
        normalize_output(output, self.layout)
    }

    fn get_image_size(&self) -> (u32, u32) {
        self.image_size
    }

    fn predict(&self, tensor: ArrayView4<f32>) -> Result<ArrayD<f32>> {
        let mut binding = self.session.lock();
        let outputs = binding.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(&tensor.as_standard_layout())?
        ])?;
        let mask = outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .to_owned();
        Ok(mask)
    }
}

/// Resizes to `width`x`height` with Lanczos3, scales to `[0, 1]` and adds a batch axis.
pub fn preprocess(img: &DynamicImage, width: u32, height: u32, layout: TensorLayout) -> Array4<f32> {
    let image = imageops::resize(&img.to_rgb8(), width, height, FilterType::Lanczos3);
    let hwc = Array3::from_shape_fn((height as usize, width as usize, 3), |(y, x, c)| {
        f32::from(image.get_pixel(x as u32, y as u32)[c]) / 255.0
    });
    let tensor = hwc.insert_axis(Axis(0));
    match layout {
        TensorLayout::Nhwc => tensor,
        TensorLayout::Nchw => tensor.permuted_axes([0, 3, 1, 2]),
    }
}

/// Brings a raw model output into prediction-tensor form.
///
/// Drops the batch axis, moves channels last and collapses a single channel
/// (sigmoid output) into the `(height, width)` binary form.
pub fn normalize_output(output: ArrayD<f32>, layout: TensorLayout) -> Result<ArrayD<f32>> {
    let mut prediction = match output.ndim() {
        4 if output.shape()[0] == 1 => output.index_axis_move(Axis(0), 0),
        4 => {
            return Err(DentalSegError::shape(format!(
                "expected a batch of one, got output shape {:?}",
                output.shape()
            )))
        }
        2 | 3 => output,
        rank => {
            return Err(DentalSegError::shape(format!(
                "model output has unsupported rank {rank}"
            )))
        }
    };

    if layout == TensorLayout::Nchw && prediction.ndim() == 3 {
        prediction = prediction.permuted_axes(vec![1, 2, 0]);
    }
    if prediction.ndim() == 3 && prediction.shape()[2] == 1 {
        prediction = prediction.index_axis_move(Axis(2), 0);
    }
    Ok(prediction.as_standard_layout().into_owned())
}
