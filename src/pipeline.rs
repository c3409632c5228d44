use image::{DynamicImage, RgbImage};
use tracing::debug;

use crate::analyzer::{analyze_class_map, AnalysisResult};
use crate::catalog::ClassCatalog;
use crate::class_map::ClassMap;
use crate::errors::{DentalSegError, Result};
use crate::overlay::{self, check_alpha, DEFAULT_ALPHA};
use crate::traits::SegmentationModel;

/// Everything produced for one uploaded image.
#[derive(Debug, Clone)]
pub struct Diagnosis {
    pub analysis: AnalysisResult,
    pub overlay: RgbImage,
}

impl Diagnosis {
    pub fn overlay_png(&self) -> Result<Vec<u8>> {
        overlay::encode_png(&self.overlay)
    }

    pub fn overlay_data_uri(&self) -> Result<String> {
        overlay::to_data_uri(&self.overlay)
    }
}

/// Decode, inference, analysis and overlay for single images.
///
/// The model is injected by the hosting layer; the pipeline holds no state
/// between calls.
pub struct SegmentationPipeline<M: SegmentationModel> {
    model: M,
    catalog: ClassCatalog,
    alpha: f32,
}

impl<M: SegmentationModel> SegmentationPipeline<M> {
    pub fn new(model: M, catalog: ClassCatalog) -> Self {
        Self {
            model,
            catalog,
            alpha: DEFAULT_ALPHA,
        }
    }

    pub fn with_alpha(mut self, alpha: f32) -> Result<Self> {
        check_alpha(alpha)?;
        self.alpha = alpha;
        Ok(self)
    }

    pub fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    pub fn process_bytes(&self, bytes: &[u8]) -> Result<Diagnosis> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| DentalSegError::image("image decode", e))?;
        debug!(width = img.width(), height = img.height(), "decoded upload");
        self.process_image(&img)
    }

    pub fn process_image(&self, img: &DynamicImage) -> Result<Diagnosis> {
        let prediction = self.model.segment_image(img)?;
        debug!(shape = ?prediction.shape(), "prediction ready");

        let class_map = ClassMap::from_prediction(prediction.view(), &self.catalog)?;
        let analysis = analyze_class_map(&class_map, &self.catalog, class_map.total_pixels())?;
        debug!(
            severity = %analysis.severity,
            dominant = %analysis.dominant_condition,
            "analysis complete"
        );

        let overlay = overlay::render_class_map(img, &class_map, &self.catalog, self.alpha)?;
        Ok(Diagnosis { analysis, overlay })
    }
}
