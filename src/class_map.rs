use ndarray::prelude::*;

use crate::catalog::{ClassCatalog, ClassId, BACKGROUND};
use crate::errors::{DentalSegError, Result};

/// Score above which a pixel of a single-channel prediction is foreground.
pub const BINARY_THRESHOLD: f32 = 0.5;

/// Per-pixel class IDs derived from a prediction tensor.
///
/// Every value is a valid key of the catalog the map was built against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMap {
    classes: Array2<ClassId>,
    num_classes: usize,
}

impl ClassMap {
    /// Argmax over the class axis of an `(height, width, num_classes)` tensor, or a
    /// threshold at [`BINARY_THRESHOLD`] of a `(height, width)` tensor.
    ///
    /// Ties go to the lowest class ID. A NaN score never wins a pixel, unlike a
    /// numpy-style argmax which would pick the first NaN.
    pub fn from_prediction(prediction: ArrayViewD<f32>, catalog: &ClassCatalog) -> Result<Self> {
        match prediction.ndim() {
            3 => {
                let scores = prediction.into_dimensionality::<Ix3>()?;
                let (height, width, depth) = scores.dim();
                if depth != catalog.len() {
                    return Err(DentalSegError::shape(format!(
                        "class axis has length {depth}, catalog has {} classes",
                        catalog.len()
                    )));
                }
                let classes = Array2::from_shape_fn((height, width), |(y, x)| {
                    argmax(scores.slice(s![y, x, ..]))
                });
                Ok(Self {
                    classes,
                    num_classes: catalog.len(),
                })
            }
            2 => {
                let foreground = catalog.normal_class().map(|c| c.id).ok_or_else(|| {
                    DentalSegError::shape(
                        "single-channel prediction needs a catalog with a normal-structure class",
                    )
                })?;
                let scores = prediction.into_dimensionality::<Ix2>()?;
                let classes = scores.mapv(|score| {
                    if score > BINARY_THRESHOLD {
                        foreground
                    } else {
                        BACKGROUND
                    }
                });
                Ok(Self {
                    classes,
                    num_classes: catalog.len(),
                })
            }
            rank => Err(DentalSegError::shape(format!(
                "prediction has rank {rank} with shape {:?}, expected 2 or 3",
                prediction.shape()
            ))),
        }
    }

    /// Wraps already-decided class IDs, checking each one against the catalog.
    pub fn from_class_ids(classes: Array2<ClassId>, catalog: &ClassCatalog) -> Result<Self> {
        if let Some(&id) = classes.iter().find(|&&id| catalog.get(id).is_none()) {
            return Err(DentalSegError::shape(format!(
                "class id {id} is not in a catalog of {} classes",
                catalog.len()
            )));
        }
        Ok(Self {
            classes,
            num_classes: catalog.len(),
        })
    }

    /// `(height, width)`
    pub fn dim(&self) -> (usize, usize) {
        self.classes.dim()
    }

    pub fn total_pixels(&self) -> usize {
        self.classes.len()
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn view(&self) -> ArrayView2<'_, ClassId> {
        self.classes.view()
    }

    pub fn get(&self, y: usize, x: usize) -> Option<ClassId> {
        self.classes.get((y, x)).copied()
    }

    /// Pixel count per class ID, background included.
    pub fn counts(&self) -> Vec<u64> {
        let mut counts = vec![0u64; self.num_classes];
        for &id in &self.classes {
            counts[usize::from(id)] += 1;
        }
        counts
    }
}

fn argmax(scores: ArrayView1<f32>) -> ClassId {
    let mut best = 0;
    let mut best_score = f32::NEG_INFINITY;
    for (index, &score) in scores.iter().enumerate() {
        if score > best_score {
            best = index;
            best_score = score;
        }
    }
    best as ClassId
}
