//! Export of classification results as images
//!
//! An export layer is a named set of land-cover classes; each becomes one
//! binary mask image. The pipeline can also write the colour-coded coverage
//! and a 16-bit heightmap, optionally resized to a quantized landscape size.

mod heightmap;
mod masks;
mod quantize;

pub use heightmap::{heightmap, sample_dem, stretch_to_u16};
pub use masks::{MASK_SET, class_mask, probability_mask, resample_nearest};
pub use quantize::{LandscapeSize, QuantizeParams, SECTION_COUNTS, SECTION_SIZES, quantize};

use crate::prediction::ClassificationGrid;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use terraclass_colormap::{ImageEncoder, classes_to_rgba, heights_to_gray16, mask_to_gray};
use terraclass_core::{Error, LandcoverType, RasterLayer, Result};
use terraclass_parallel::ProcessingMode;
use tracing::{debug, info};

/// A named group of classes exported as one mask
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportLayer {
    /// File stem of the mask image
    pub name: String,
    pub classes: Vec<LandcoverType>,
}

impl ExportLayer {
    pub fn new(name: impl Into<String>, classes: impl Into<Vec<LandcoverType>>) -> Self {
        Self {
            name: name.into(),
            classes: classes.into(),
        }
    }

    fn validate(&self) -> Result<()> {
        let bad = self.name.is_empty()
            || self.name == "."
            || self.name == ".."
            || self.name.contains(['/', '\\']);
        if bad {
            return Err(Error::InvalidParameter {
                name: "export layer name",
                value: self.name.clone(),
                reason: "must be a plain file name".into(),
            });
        }
        Ok(())
    }
}

/// What [`ExportPipeline`] writes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportParams {
    pub layers: Vec<ExportLayer>,
    /// Also set mask pixels whose summed class probability reaches this
    /// value; needs a probability grid
    pub probability_threshold: Option<f32>,
    /// Write the colour-coded classification as `coverage`
    pub coverage: bool,
    /// Resize outputs to a quantized landscape size
    pub quantize: bool,
    /// Write the DEM as a 16-bit `heightmap`
    pub heightmap: bool,
    pub quantize_params: QuantizeParams,
}

impl Default for ExportParams {
    fn default() -> Self {
        Self {
            layers: Vec::new(),
            probability_threshold: None,
            coverage: true,
            quantize: false,
            heightmap: false,
            quantize_params: QuantizeParams::default(),
        }
    }
}

/// Writes masks, coverage and heightmap images for a classification grid
#[derive(Debug, Clone, Default)]
pub struct ExportPipeline {
    params: ExportParams,
    mode: ProcessingMode,
}

impl ExportPipeline {
    pub fn new(params: ExportParams) -> Self {
        Self {
            params,
            mode: ProcessingMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: ProcessingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn params(&self) -> &ExportParams {
        &self.params
    }

    /// Output size in pixels, quantized when requested
    pub fn output_size(&self, grid: &ClassificationGrid) -> Result<(usize, usize, Option<LandscapeSize>)> {
        if !self.params.quantize {
            return Ok((grid.cols(), grid.rows(), None));
        }
        let size = quantize(grid.cols(), grid.rows(), &self.params.quantize_params)?;
        Ok((size.width, size.height, Some(size)))
    }

    /// Write every requested image into `out_dir`, returning the paths in
    /// write order.
    ///
    /// `dem` is required when the heightmap is requested.
    pub fn run(
        &self,
        grid: &ClassificationGrid,
        dem: Option<&RasterLayer>,
        encoder: &dyn ImageEncoder,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        for layer in &self.params.layers {
            layer.validate()?;
        }
        let probabilities = match self.params.probability_threshold {
            Some(threshold) => {
                let p = grid.probabilities.as_ref().ok_or_else(|| {
                    Error::UnsupportedOperation("probability export needs a probability grid".into())
                })?;
                Some((p, threshold))
            }
            None => None,
        };
        let dem = match (self.params.heightmap, dem) {
            (true, None) => {
                return Err(Error::InvalidParameter {
                    name: "dem",
                    value: "none".into(),
                    reason: "heightmap export needs a DEM layer".into(),
                });
            }
            (true, Some(dem)) => Some(dem),
            (false, _) => None,
        };

        let (width, height, landscape) = self.output_size(grid)?;
        if let Some(size) = &landscape {
            info!(
                width,
                height,
                components_x = size.components_x,
                components_y = size.components_y,
                quads_per_section = size.quads_per_section,
                sections_per_component = size.sections_per_component,
                exact = size.exact,
                "quantized landscape size"
            );
        }
        std::fs::create_dir_all(out_dir)?;
        let path_for = |stem: &str| out_dir.join(format!("{}.{}", stem, encoder.extension()));
        let mut written = Vec::new();

        if self.params.coverage {
            let labels = resample_nearest(&grid.labels, width, height);
            let path = path_for("coverage");
            encoder.encode(&classes_to_rgba(&labels), &path)?;
            debug!(path = %path.display(), "wrote coverage");
            written.push(path);
        }

        for layer in &self.params.layers {
            let mask = match probabilities {
                Some((p, threshold)) => probability_mask(&grid.labels, p, &layer.classes, threshold)?,
                None => class_mask(&grid.labels, &layer.classes),
            };
            let mask = resample_nearest(&mask, width, height);
            let path = path_for(&layer.name);
            encoder.encode(&mask_to_gray(&mask), &path)?;
            debug!(path = %path.display(), classes = layer.classes.len(), "wrote mask");
            written.push(path);
        }

        if let Some(dem) = dem {
            let heights = heightmap(
                dem,
                grid.labels.transform(),
                grid.rows(),
                grid.cols(),
                width,
                height,
                self.mode,
            )?;
            let path = path_for("heightmap");
            encoder.encode(&heights_to_gray16(&heights)?, &path)?;
            debug!(path = %path.display(), "wrote heightmap");
            written.push(path);
        }

        info!(files = written.len(), dir = %out_dir.display(), "export completed");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::ProbabilityGrid;
    use ndarray::Array3;
    use std::sync::Mutex;
    use terraclass_colormap::{EncodeError, ImageBuffer, ImageFormat};
    use terraclass_core::{Extent, GeoTransform, Raster};

    /// Keeps encoded images in memory
    #[derive(Default)]
    struct Recorder {
        images: Mutex<Vec<(PathBuf, ImageBuffer)>>,
    }

    impl ImageEncoder for Recorder {
        fn extension(&self) -> &'static str {
            "png"
        }

        fn encode(&self, image: &ImageBuffer, path: &Path) -> std::result::Result<(), EncodeError> {
            self.images.lock().unwrap().push((path.to_path_buf(), image.clone()));
            Ok(())
        }
    }

    fn grid() -> ClassificationGrid {
        // left column Water, right column Tree, one unclassified pixel
        let mut labels = Raster::from_vec(vec![5, 4, 5, 4, 9, 4], 3, 2).unwrap();
        labels.set_transform(GeoTransform::new(0.0, 3.0, 1.0, -1.0));
        labels.set_nodata(Some(9));
        ClassificationGrid {
            labels,
            probabilities: None,
            reference: "b1".into(),
            extent: Extent::new(0.0, 0.0, 2.0, 3.0),
        }
    }

    #[test]
    fn test_masks_and_coverage() {
        let dir = tempfile::tempdir().unwrap();
        let params = ExportParams {
            layers: vec![
                ExportLayer::new("water", [LandcoverType::Water]),
                ExportLayer::new("vegetation", [LandcoverType::Tree, LandcoverType::Grass]),
            ],
            ..Default::default()
        };
        let recorder = Recorder::default();
        let paths = ExportPipeline::new(params).run(&grid(), None, &recorder, dir.path()).unwrap();

        let names: Vec<_> = paths.iter().map(|p| p.file_name().unwrap().to_str().unwrap().to_string()).collect();
        assert_eq!(names, vec!["coverage.png", "water.png", "vegetation.png"]);

        let images = recorder.images.into_inner().unwrap();
        let coverage = &images[0].1;
        assert_eq!(coverage.format, ImageFormat::Rgba8);
        assert_eq!(coverage.pixel(0, 0).unwrap(), &[0, 0, 255, 255]);
        assert_eq!(coverage.pixel(0, 2).unwrap()[3], 0);

        let water = &images[1].1;
        assert_eq!(water.format, ImageFormat::Gray8);
        assert_eq!(water.data, vec![255, 0, 255, 0, 0, 0]);
        let vegetation = &images[2].1;
        assert_eq!(vegetation.data, vec![0, 255, 0, 255, 0, 255]);
    }

    #[test]
    fn test_threshold_without_probabilities() {
        let params = ExportParams {
            layers: vec![ExportLayer::new("water", [LandcoverType::Water])],
            probability_threshold: Some(0.5),
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let err = ExportPipeline::new(params)
            .run(&grid(), None, &Recorder::default(), dir.path())
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperation(_)));
    }

    #[test]
    fn test_threshold_with_probabilities() {
        let mut g = grid();
        let mut p = Array3::<f32>::zeros((LandcoverType::COUNT, 3, 2));
        p[(LandcoverType::Water.index() as usize, 0, 1)] = 0.45;
        p[(LandcoverType::Tree.index() as usize, 0, 1)] = 0.55;
        g.probabilities = Some(ProbabilityGrid::new(p).unwrap());
        let params = ExportParams {
            layers: vec![ExportLayer::new("water", [LandcoverType::Water])],
            probability_threshold: Some(0.4),
            coverage: false,
            ..Default::default()
        };
        let recorder = Recorder::default();
        let dir = tempfile::tempdir().unwrap();
        ExportPipeline::new(params).run(&g, None, &recorder, dir.path()).unwrap();
        let images = recorder.images.into_inner().unwrap();
        assert_eq!(images[0].1.data, vec![255, 255, 255, 0, 0, 0]);
    }

    #[test]
    fn test_rejects_path_names() {
        let params = ExportParams {
            layers: vec![ExportLayer::new("../escape", [LandcoverType::Water])],
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let err = ExportPipeline::new(params)
            .run(&grid(), None, &Recorder::default(), dir.path())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }

    #[test]
    fn test_heightmap_needs_dem() {
        let params = ExportParams { heightmap: true, ..Default::default() };
        let dir = tempfile::tempdir().unwrap();
        let err = ExportPipeline::new(params)
            .run(&grid(), None, &Recorder::default(), dir.path())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "dem", .. }));
    }

    #[test]
    fn test_quantized_output_size() {
        let params = ExportParams {
            quantize: true,
            quantize_params: QuantizeParams { section_size: 7, ..Default::default() },
            ..Default::default()
        };
        let recorder = Recorder::default();
        let dir = tempfile::tempdir().unwrap();
        ExportPipeline::new(params).run(&grid(), None, &recorder, dir.path()).unwrap();
        let images = recorder.images.into_inner().unwrap();
        // 2x3 grid: one 7-quad component per axis
        assert_eq!((images[0].1.width, images[0].1.height), (8, 8));
    }
}
