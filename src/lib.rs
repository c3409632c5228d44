pub mod analyzer;
pub mod catalog;
pub mod class_map;
pub mod config;
pub mod errors;
pub mod history;
pub mod model;
pub mod overlay;
pub mod pipeline;
pub mod server;
pub mod traits;

pub mod mocks;

pub use analyzer::{analyze, analyze_class_map, AnalysisResult, Severity};
pub use catalog::{ClassCatalog, ClassId, ClassRole, SegmentationClass, BACKGROUND};
pub use class_map::ClassMap;
pub use config::Config;
pub use errors::{DentalSegError, Result};
pub use history::{AnalysisHistory, HistoryEntry};
pub use model::{Model, TensorLayout};
pub use overlay::{render, render_class_map, DEFAULT_ALPHA};
pub use pipeline::{Diagnosis, SegmentationPipeline};
pub use traits::*;
