use std::path::PathBuf;
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Structured error types for the dental segmentation service.
///
/// # Why structured errors
///
/// Each variant captures context specific to its error domain (tensor shape, image
/// processing, model operations, etc.), so the HTTP layer can decide on a status code
/// without parsing error strings. Sources are `Send + Sync` because results cross from
/// blocking inference threads back into the async request handlers.
#[derive(Error, Debug)]
pub enum DentalSegError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Shape error: {reason}")]
    Shape { reason: String },

    #[error("Empty image: prediction covers zero pixels")]
    EmptyImage,

    #[error("Image processing error: {operation} failed: {source}")]
    ImageProcessing {
        operation: String,
        #[source]
        source: BoxedSource,
    },

    #[error("Model error: {operation} failed: {source}")]
    Model {
        operation: String,
        #[source]
        source: BoxedSource,
    },

    #[error("Validation error: {field} {reason}")]
    Validation { field: String, reason: String },
}

pub type Result<T> = std::result::Result<T, DentalSegError>;

impl DentalSegError {
    pub(crate) fn shape(reason: impl Into<String>) -> Self {
        Self::Shape {
            reason: reason.into(),
        }
    }

    pub(crate) fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn image(operation: impl Into<String>, source: impl Into<BoxedSource>) -> Self {
        Self::ImageProcessing {
            operation: operation.into(),
            source: source.into(),
        }
    }

    pub(crate) fn model(operation: impl Into<String>, source: impl Into<BoxedSource>) -> Self {
        Self::Model {
            operation: operation.into(),
            source: source.into(),
        }
    }
}

/// Convert I/O errors to filesystem errors.
///
/// # Why default values for context
///
/// Some I/O errors occur without specific path/operation context. Code that has
/// context should construct `DentalSegError::FileSystem` directly.
impl From<std::io::Error> for DentalSegError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

impl From<image::ImageError> for DentalSegError {
    fn from(err: image::ImageError) -> Self {
        Self::image("image processing", err)
    }
}

impl From<ort::Error> for DentalSegError {
    fn from(err: ort::Error) -> Self {
        Self::model("ort operation", err)
    }
}

/// Convert ndarray shape errors.
///
/// # Why shape error category
///
/// ndarray only fails here when a model output cannot be viewed with the rank the
/// analyzer expects, which is the same contract violation as a wrong class axis.
impl From<ndarray::ShapeError> for DentalSegError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::shape(err.to_string())
    }
}

impl From<serde_json::Error> for DentalSegError {
    fn from(err: serde_json::Error) -> Self {
        Self::Configuration {
            message: err.to_string(),
        }
    }
}
