//! Error types for terraclass

use thiserror::Error;

/// Main error type for terraclass operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Singular transform matrix (determinant {det:e})")]
    SingularMatrix { det: f64 },

    #[error("Unsupported pixel format: {0}")]
    UnsupportedFormat(String),

    #[error("Position ({x:.3}, {y:.3}) is outside the extent of layer '{layer}'")]
    OutOfExtent { layer: String, x: f64, y: f64 },

    #[error("No data at ({x:.3}, {y:.3}) in layer '{layer}'")]
    NoData { layer: String, x: f64, y: f64 },

    #[error("Classifier has not been trained")]
    NotTrained,

    #[error("Feature layers do not overlap")]
    NoOverlap,

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Feature vector has {actual} values, expected {expected}")]
    FeatureLength { expected: usize, actual: usize },

    #[error("Band set mismatch: model expects [{expected}], session provides [{actual}]")]
    DescriptorMismatch { expected: String, actual: String },

    #[error("Layers not loaded: {}", .0.join(", "))]
    MissingLayers(Vec<String>),

    #[error("training cancelled")]
    TrainingCancelled,

    #[error("operation cancelled")]
    Cancelled,

    #[error("Training file line {line}: {reason}")]
    TrainingFormat { line: usize, reason: String },

    #[error("Training failed: {0}")]
    Training(String),

    #[error("GDAL error: {0}")]
    #[cfg(feature = "gdal")]
    Gdal(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Errors a bulk sweep absorbs per pixel instead of aborting.
    ///
    /// Only sampling failures qualify; matrix and format errors always
    /// propagate.
    pub fn is_recoverable_per_pixel(&self) -> bool {
        matches!(self, Error::OutOfExtent { .. } | Error::NoData { .. })
    }
}

#[cfg(feature = "gdal")]
impl From<gdal::errors::GdalError> for Error {
    fn from(e: gdal::errors::GdalError) -> Self {
        Error::Gdal(e.to_string())
    }
}

/// Result type alias for terraclass operations
pub type Result<T> = std::result::Result<T, Error>;
