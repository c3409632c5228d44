use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use ndarray::prelude::*;

use dental_seg_rs::mocks::{leading_pixels, one_hot};
use dental_seg_rs::overlay::{encode_png, DEFAULT_ALPHA};
use dental_seg_rs::{
    analyze, render, ClassCatalog, ClassMap, SegmentationModel, SegmentationPipeline, Severity,
};

// Mock model defined locally for the integration tests
#[derive(Debug, Clone)]
struct TestMockModel {
    classes: Array2<u8>,
    num_classes: usize,
}

impl TestMockModel {
    fn new(classes: Array2<u8>, num_classes: usize) -> Self {
        Self {
            classes,
            num_classes,
        }
    }
}

impl SegmentationModel for TestMockModel {
    fn segment_image(&self, _img: &DynamicImage) -> dental_seg_rs::Result<ArrayD<f32>> {
        Ok(one_hot(&self.classes, self.num_classes).into_dyn())
    }

    fn get_image_size(&self) -> (u32, u32) {
        let (height, width) = self.classes.dim();
        (width as u32, height as u32)
    }

    fn predict(&self, tensor: ArrayView4<f32>) -> dental_seg_rs::Result<ArrayD<f32>> {
        let shape = tensor.shape();
        Ok(ArrayD::zeros(IxDyn(&[shape[0], shape[1], shape[2], self.num_classes])))
    }
}

/// Deterministic scores that exercise every class, ties included.
fn scrambled_scores(height: usize, width: usize, seed: u64) -> Array3<f32> {
    let mut state = seed;
    Array3::from_shape_fn((height, width, 5), |_| {
        state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        ((state >> 33) % 4) as f32 / 4.0
    })
}

#[test]
fn test_counts_sum_to_total_pixels() {
    let catalog = ClassCatalog::dental();
    for seed in 0..8 {
        let scores = scrambled_scores(23, 17, seed);
        let map = ClassMap::from_prediction(scores.view().into_dyn(), &catalog).unwrap();
        let result = analyze(scores.view().into_dyn(), &catalog, 23 * 17).unwrap();

        let background = map.counts()[0];
        let foreground: u64 = result.class_pixel_counts.values().sum();
        assert_eq!(background + foreground, 23 * 17);
    }
}

#[test]
fn test_percentages_match_counts() {
    let catalog = ClassCatalog::dental();
    let total = 31 * 29;
    for seed in 10..16 {
        let scores = scrambled_scores(31, 29, seed);
        let result = analyze(scores.view().into_dyn(), &catalog, total).unwrap();

        for (name, &percentage) in &result.class_percentages {
            let count = result.class_pixel_counts[name] as f64;
            let expected = (100.0 * count / total as f64 * 100.0).round_ties_even() / 100.0;
            assert!((0.0..=100.0).contains(&percentage));
            assert_eq!(percentage, expected, "class {name}");
        }
    }
}

#[test]
fn test_percentages_at_model_resolution() {
    let catalog = ClassCatalog::dental();
    let cases = [(512, 3.12), (1_536, 9.38), (2_560, 15.62), (163, 0.99), (164, 1.0)];
    for (count, expected) in cases {
        let scores = one_hot(&leading_pixels(128, 128, 4, count), 5);
        let result = analyze(scores.view().into_dyn(), &catalog, 128 * 128).unwrap();
        assert_eq!(result.class_percentages["crack"], expected, "count {count}");
    }
}

#[test]
fn test_analysis_is_idempotent() {
    let catalog = ClassCatalog::dental();
    let scores = scrambled_scores(16, 16, 42);
    let first = analyze(scores.view().into_dyn(), &catalog, 256).unwrap();
    let second = analyze(scores.view().into_dyn(), &catalog, 256).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_all_tooth_is_normal_structure() {
    let scores = one_hot(&Array2::from_elem((128, 128), 1), 5);
    let result = analyze(scores.view().into_dyn(), &ClassCatalog::dental(), 128 * 128).unwrap();

    assert_eq!(result.dominant_condition, "healthy");
    assert_eq!(result.detected_class, "Normal tooth structure detected");
    assert_eq!(result.severity, Severity::Healthy);
    assert_eq!(result.class_percentages["tooth"], 100.0);
}

#[test]
fn test_twenty_percent_cavity_is_severe() {
    let scores = one_hot(&leading_pixels(100, 100, 3, 2_000), 5);
    let result = analyze(scores.view().into_dyn(), &ClassCatalog::dental(), 10_000).unwrap();

    assert_eq!(result.class_percentages["cavity"], 20.0);
    for name in ["tooth", "caries", "crack"] {
        assert_eq!(result.class_percentages[name], 0.0);
    }
    assert_eq!(result.severity, Severity::Severe);
    assert_eq!(result.dominant_condition, "cavity");
    assert_eq!(result.detected_class, "Dental condition detected: Cavity");
}

#[test]
fn test_single_channel_prediction_counts_only_tooth() {
    let scores = Array2::from_shape_fn((10, 10), |(y, _)| if y < 3 { 0.8_f32 } else { 0.2 });
    let result = analyze(scores.view().into_dyn(), &ClassCatalog::dental(), 100).unwrap();

    assert_eq!(result.class_pixel_counts["tooth"], 30);
    assert_eq!(result.class_pixel_counts["cavity"], 0);
    assert_eq!(result.class_percentages["caries"], 0.0);
    assert_eq!(result.dominant_condition, "healthy");
}

#[test]
fn test_all_background_overlay_equals_resized_original() {
    let original = DynamicImage::ImageRgb8(RgbImage::from_fn(200, 150, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
    }));
    let scores = one_hot(&Array2::zeros((128, 128)), 5);

    let overlay = render(
        &original,
        scores.view().into_dyn(),
        &ClassCatalog::dental(),
        DEFAULT_ALPHA,
    )
    .unwrap();
    let expected = imageops::resize(&original.to_rgb8(), 128, 128, FilterType::Lanczos3);
    assert_eq!(overlay, expected);
}

#[test]
fn test_overlay_png_round_trip() {
    let original = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, Rgb([12, 34, 56])));
    let scores = scrambled_scores(32, 32, 7);
    let overlay = render(&original, scores.view().into_dyn(), &ClassCatalog::dental(), 0.6).unwrap();

    let decoded = image::load_from_memory(&encode_png(&overlay).unwrap())
        .unwrap()
        .into_rgb8();
    assert_eq!(decoded.as_raw(), overlay.as_raw());
}

#[test]
fn test_pipeline_with_trait_object_model() {
    let model = TestMockModel::new(leading_pixels(20, 20, 2, 40), 5);
    assert_eq!(model.get_image_size(), (20, 20));

    let pipeline = SegmentationPipeline::new(model, ClassCatalog::dental());
    let diagnosis = pipeline
        .process_image(&DynamicImage::new_rgb8(300, 300))
        .unwrap();

    assert_eq!(diagnosis.analysis.class_pixel_counts["caries"], 40);
    assert_eq!(diagnosis.analysis.severity, Severity::Moderate);
    assert_eq!(diagnosis.overlay.dimensions(), (20, 20));
}

#[test]
fn test_custom_catalog_from_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("catalog.json");
    std::fs::write(
        &path,
        r#"{ "classes": [
            { "id": 0, "name": "background", "color": [0, 0, 0], "legend": "Black", "role": "background" },
            { "id": 1, "name": "enamel", "color": [255, 255, 255], "legend": "White - Enamel", "role": "normal" },
            { "id": 2, "name": "plaque", "color": [0, 0, 255], "legend": "Blue - Plaque", "role": "condition" }
        ] }"#,
    )?;
    let catalog = ClassCatalog::from_json_file(&path)?;

    let model = TestMockModel::new(leading_pixels(10, 10, 2, 7), catalog.len());
    let diagnosis = SegmentationPipeline::new(model, catalog)
        .process_image(&DynamicImage::new_rgb8(10, 10))?;

    assert_eq!(diagnosis.analysis.class_percentages["plaque"], 7.0);
    assert_eq!(diagnosis.analysis.dominant_condition, "plaque");
    assert_eq!(diagnosis.analysis.severity, Severity::Moderate);
    assert_eq!(*diagnosis.overlay.get_pixel(0, 0), Rgb([0, 0, 153]));
    Ok(())
}

#[test]
fn test_missing_catalog_file_is_filesystem_error() {
    let err = ClassCatalog::from_json_file(std::path::Path::new("no/such/catalog.json")).unwrap_err();
    assert!(matches!(err, dental_seg_rs::DentalSegError::FileSystem { .. }));
}
