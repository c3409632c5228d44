use std::collections::BTreeMap;
use std::fmt;

use ndarray::ArrayViewD;
use serde::{Deserialize, Serialize};

use crate::catalog::{ClassCatalog, ClassRole};
use crate::class_map::ClassMap;
use crate::errors::{DentalSegError, Result};

/// Below this share of the image no class counts as a finding.
pub const HEALTHY_THRESHOLD: f64 = 1.0;
pub const MODERATE_THRESHOLD: f64 = 5.0;
pub const SEVERE_THRESHOLD: f64 = 15.0;

pub const HEALTHY: &str = "healthy";
pub const HEALTHY_LABEL: &str = "Healthy — no significant condition detected";
pub const NORMAL_STRUCTURE_LABEL: &str = "Normal tooth structure detected";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Healthy,
    Mild,
    Moderate,
    Severe,
}

impl Severity {
    /// Tier for a pathological class covering `percentage` of the image.
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage < MODERATE_THRESHOLD {
            Self::Mild
        } else if percentage < SEVERE_THRESHOLD {
            Self::Moderate
        } else {
            Self::Severe
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Mild => "mild",
            Self::Moderate => "moderate",
            Self::Severe => "severe",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub detected_class: String,
    pub severity: Severity,
    pub class_percentages: BTreeMap<String, f64>,
    pub class_pixel_counts: BTreeMap<String, u64>,
    pub dominant_condition: String,
    pub total_pixels: u64,
}

/// Analyzes a raw prediction tensor. See [`analyze_class_map`].
pub fn analyze(
    prediction: ArrayViewD<f32>,
    catalog: &ClassCatalog,
    total_pixels: usize,
) -> Result<AnalysisResult> {
    let class_map = ClassMap::from_prediction(prediction, catalog)?;
    analyze_class_map(&class_map, catalog, total_pixels)
}

/// Turns per-pixel class IDs into area statistics and a diagnosis.
///
/// `total_pixels` must equal the map's `height * width`. Zero pixels is rejected
/// rather than reported as 0%.
pub fn analyze_class_map(
    class_map: &ClassMap,
    catalog: &ClassCatalog,
    total_pixels: usize,
) -> Result<AnalysisResult> {
    if total_pixels == 0 {
        return Err(DentalSegError::EmptyImage);
    }
    if total_pixels != class_map.total_pixels() {
        let (height, width) = class_map.dim();
        return Err(DentalSegError::shape(format!(
            "total pixel count {total_pixels} does not match the {height}x{width} prediction"
        )));
    }
    if class_map.num_classes() != catalog.len() {
        return Err(DentalSegError::shape(format!(
            "class map was built for {} classes, catalog has {}",
            class_map.num_classes(),
            catalog.len()
        )));
    }

    let counts = class_map.counts();
    let mut class_percentages = BTreeMap::new();
    let mut class_pixel_counts = BTreeMap::new();
    let mut dominant = None;

    for class in catalog.foreground() {
        let count = counts[usize::from(class.id)];
        let percentage = round2(100.0 * count as f64 / total_pixels as f64);
        class_percentages.insert(class.name.clone(), percentage);
        class_pixel_counts.insert(class.name.clone(), count);

        // strict comparison keeps the lowest ID on ties
        if dominant.map_or(true, |(_, best)| percentage > best) {
            dominant = Some((class, percentage));
        }
    }

    let (detected_class, severity, dominant_condition) = match dominant {
        Some((class, percentage)) if percentage >= HEALTHY_THRESHOLD => match class.role {
            ClassRole::Normal => (
                NORMAL_STRUCTURE_LABEL.to_string(),
                Severity::Healthy,
                HEALTHY.to_string(),
            ),
            _ => (
                format!("Dental condition detected: {}", capitalize(&class.name)),
                Severity::from_percentage(percentage),
                class.name.clone(),
            ),
        },
        _ => (
            HEALTHY_LABEL.to_string(),
            Severity::Healthy,
            HEALTHY.to_string(),
        ),
    };

    Ok(AnalysisResult {
        detected_class,
        severity,
        class_percentages,
        class_pixel_counts,
        dominant_condition,
        total_pixels: total_pixels as u64,
    })
}

/// Two decimals, exact halves to even (`312.5 -> 312`).
fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// First character upper-cased, the rest lower-cased.
fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
