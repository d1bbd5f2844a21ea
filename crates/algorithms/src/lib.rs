//! # terraclass Algorithms
//!
//! Land-cover classification from raster bands and elevation.
//!
//! ## Modules
//!
//! - **terrain**: Slope, aspect and multi-scale curvature from a DEM
//! - **features**: Band-set descriptors and feature vectors at world positions
//! - **classification**: Training sets, built-in classifiers, background training
//! - **prediction**: Row-parallel bulk classification over the common extent
//! - **majority**: 3x3 majority filter for label grids
//! - **export**: Class masks, coverage and heightmap images

pub mod classification;
pub mod export;
pub mod features;
pub mod majority;
pub mod prediction;
pub mod terrain;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classification::{
        AdapterStatus, ClassificationModel, ClassifiedFeatureVector, ClassifierAdapter, ClassifierKind,
        ClassifierParams, TrainedClassifier, TrainingEvent, TrainingHandle, TrainingSet,
    };
    pub use crate::export::{ExportLayer, ExportParams, ExportPipeline, QuantizeParams, quantize};
    pub use crate::features::{BandSetDescriptor, FeatureAssembler, FeatureMode, FeatureParams};
    pub use crate::majority::majority_filter;
    pub use crate::prediction::{BulkPredictionEngine, ClassificationGrid, PredictionParams, ProbabilityGrid};
    pub use crate::terrain::{
        CurvatureParams, SlopeAspectParams, aspect_slope, layer_aspect_slope, multiscale_curvature,
        slope_aspect_grid,
    };
    pub use terraclass_core::prelude::*;
}
