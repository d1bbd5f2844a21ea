//! Bulk prediction over the common extent of the feature layers
//!
//! The output grid is the finest feature layer's pixel grid, restricted to
//! pixels whose centres fall inside the intersection of every layer's world
//! bounds. Rows are independent and run in parallel; each worker assembles a
//! row of feature vectors into private scratch buffers and classifies the
//! whole row in one batch.
//!
//! Pixels whose features cannot be sampled (outside a layer, no-data) are
//! labelled `None` instead of failing the sweep.

use crate::classification::TrainedClassifier;
use crate::features::FeatureAssembler;
use crate::majority::majority_filter;
use ndarray::{Array2, Array3, ArrayView2};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use terraclass_core::{Error, Extent, LandcoverType, LayerId, Raster, RasterLayer, Result};
use terraclass_parallel::{CancelToken, ParallelStrategy, ProcessingMode, ProgressCounter};
use tracing::{debug, info, warn};

const CLASSES: usize = LandcoverType::COUNT;

/// Tolerance for pixel centres lying on the extent boundary
const EDGE_EPSILON: f64 = 1e-9;

/// Options for [`BulkPredictionEngine`]
#[derive(Debug, Clone, Copy, Default)]
pub struct PredictionParams {
    /// Also compute per-class probabilities (ignored with a warning when the
    /// classifier cannot produce them)
    pub probabilities: bool,
    /// Smooth the label grid with one pass of the majority filter
    pub majority_filter: bool,
    pub mode: ProcessingMode,
}

/// Per-class probabilities, indexed `(class, row, col)`
#[derive(Debug, Clone)]
pub struct ProbabilityGrid {
    data: Array3<f32>,
}

impl ProbabilityGrid {
    pub fn new(data: Array3<f32>) -> Result<Self> {
        if data.dim().0 != CLASSES {
            return Err(Error::InvalidParameter {
                name: "probability grid",
                value: format!("{} planes", data.dim().0),
                reason: format!("expected one plane per class ({})", CLASSES),
            });
        }
        Ok(Self { data })
    }

    pub fn rows(&self) -> usize {
        self.data.dim().1
    }

    pub fn cols(&self) -> usize {
        self.data.dim().2
    }

    pub fn get(&self, class: LandcoverType, row: usize, col: usize) -> Option<f32> {
        self.data.get((class.index() as usize, row, col)).copied()
    }

    /// Probability plane of one class
    pub fn plane(&self, class: LandcoverType) -> ArrayView2<'_, f32> {
        self.data.index_axis(ndarray::Axis(0), class.index() as usize)
    }

    /// Summed probability of `classes` per pixel
    pub fn cumulative(&self, classes: &[LandcoverType]) -> Array2<f32> {
        let mut sum = Array2::zeros((self.rows(), self.cols()));
        for class in classes {
            sum += &self.plane(*class);
        }
        sum
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }
}

/// Result of a prediction sweep
#[derive(Debug, Clone)]
pub struct ClassificationGrid {
    /// Class indices; `None` marks pixels that could not be classified
    pub labels: Raster<u8>,
    pub probabilities: Option<ProbabilityGrid>,
    /// Layer whose pixel grid the output follows
    pub reference: LayerId,
    /// Intersection of the layers' world bounds
    pub extent: Extent,
}

impl ClassificationGrid {
    pub fn rows(&self) -> usize {
        self.labels.rows()
    }

    pub fn cols(&self) -> usize {
        self.labels.cols()
    }

    pub fn label(&self, row: usize, col: usize) -> Option<LandcoverType> {
        self.labels.get(row, col).ok().and_then(LandcoverType::from_index)
    }

    /// Pixel count per class index
    pub fn class_counts(&self) -> [usize; CLASSES] {
        let mut counts = [0; CLASSES];
        for &v in self.labels.data().iter() {
            if let Some(c) = counts.get_mut(v as usize) {
                *c += 1;
            }
        }
        counts
    }
}

/// Output grid geometry in reference-layer pixels
#[derive(Debug, Clone, Copy)]
struct GridWindow {
    col0: usize,
    row0: usize,
    cols: usize,
    rows: usize,
}

struct RowOutput {
    labels: Vec<u8>,
    /// `cols * CLASSES` values, class-minor
    probabilities: Vec<f32>,
}

/// Classifies every pixel of the common extent
#[derive(Debug, Clone, Default)]
pub struct BulkPredictionEngine {
    params: PredictionParams,
}

impl BulkPredictionEngine {
    pub fn new(params: PredictionParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &PredictionParams {
        &self.params
    }

    /// Run the sweep.
    ///
    /// `progress` receives the fraction of rows completed. Cancelling
    /// `cancel` stops the sweep at the next row with `Error::Cancelled`.
    pub fn run(
        &self,
        assembler: &FeatureAssembler,
        classifier: &TrainedClassifier,
        progress: &(dyn Fn(f64) + Sync),
        cancel: &CancelToken,
    ) -> Result<ClassificationGrid> {
        classifier.descriptor().check_compatible(assembler.descriptor())?;

        let extent = common_extent(assembler)?;
        let reference = reference_layer(assembler)?;
        let window = output_window(reference, &extent)?;

        let with_probabilities = self.params.probabilities && classifier.supports_probability();
        if self.params.probabilities && !with_probabilities {
            warn!(
                classifier = %classifier.kind(),
                "classifier does not produce probabilities, computing labels only"
            );
        }

        info!(
            reference = %reference.id(),
            rows = window.rows,
            cols = window.cols,
            features = assembler.len(),
            classifier = %classifier.kind(),
            "prediction started"
        );

        let counter = ProgressCounter::new(window.rows, progress);
        let abort = AtomicBool::new(false);
        let fatal: Mutex<Option<Error>> = Mutex::new(None);

        let rows: Vec<Option<RowOutput>> = self.params.mode.par_map(0..window.rows, |r| {
            if abort.load(Ordering::Relaxed) || cancel.is_cancelled() {
                return None;
            }
            match predict_row(assembler, classifier, reference, &window, r, with_probabilities) {
                Ok(row) => {
                    counter.increment();
                    Some(row)
                }
                Err(e) => {
                    abort.store(true, Ordering::Relaxed);
                    let mut slot = fatal.lock().unwrap_or_else(|p| p.into_inner());
                    slot.get_or_insert(e);
                    None
                }
            }
        });

        if let Some(e) = fatal.into_inner().unwrap_or_else(|p| p.into_inner()) {
            return Err(e);
        }
        if cancel.is_cancelled() {
            info!("prediction cancelled");
            return Err(Error::Cancelled);
        }

        let mut label_data = Vec::with_capacity(window.rows * window.cols);
        let mut probabilities = with_probabilities.then(|| Array3::<f32>::zeros((CLASSES, window.rows, window.cols)));
        for (r, row) in rows.into_iter().enumerate() {
            let row = row.ok_or(Error::Cancelled)?;
            label_data.extend_from_slice(&row.labels);
            if let Some(grid) = probabilities.as_mut() {
                for (c, pixel) in row.probabilities.chunks_exact(CLASSES).enumerate() {
                    for (k, &p) in pixel.iter().enumerate() {
                        grid[(k, r, c)] = p;
                    }
                }
            }
        }

        let mut labels = Raster::from_vec(label_data, window.rows, window.cols)?;
        labels.set_transform(reference.geotransform().window(window.col0, window.row0));
        labels.set_nodata(Some(LandcoverType::None.index()));

        if self.params.majority_filter {
            debug!("applying majority filter");
            labels = majority_filter(&labels, self.params.mode);
        }

        let grid = ClassificationGrid {
            labels,
            probabilities: probabilities.map(ProbabilityGrid::new).transpose()?,
            reference: reference.id().clone(),
            extent,
        };
        let unclassified = grid.class_counts()[LandcoverType::None.index() as usize];
        info!(
            rows = grid.rows(),
            cols = grid.cols(),
            unclassified,
            "prediction completed"
        );
        Ok(grid)
    }
}

/// Intersection of the world bounds of every layer the assembler reads
fn common_extent(assembler: &FeatureAssembler) -> Result<Extent> {
    let mut layers = assembler.all_layers();
    let first = layers.next().ok_or(Error::NoOverlap)?.world_bounds();
    layers.try_fold(first, |acc, layer| acc.intersect(&layer.world_bounds()).ok_or(Error::NoOverlap))
}

/// Finest feature layer; the first one on ties
fn reference_layer(assembler: &FeatureAssembler) -> Result<&Arc<RasterLayer>> {
    let mut best: Option<&Arc<RasterLayer>> = None;
    for layer in assembler.layers() {
        if best.is_none_or(|b| layer.scale_x() < b.scale_x()) {
            best = Some(layer);
        }
    }
    best.ok_or_else(|| Error::InvalidParameter {
        name: "feature layers",
        value: "0".into(),
        reason: "prediction needs at least one feature layer".into(),
    })
}

/// Reference pixels whose centres lie inside `extent`
fn output_window(reference: &RasterLayer, extent: &Extent) -> Result<GridWindow> {
    let image = reference
        .world_to_image()
        .map_rect(extent.min_x, extent.min_y, extent.max_x, extent.max_y);

    let span = |lo: f64, hi: f64, size: usize| -> Option<(usize, usize)> {
        let first = (lo + EDGE_EPSILON).ceil().max(0.0);
        let last = (hi - EDGE_EPSILON).floor().min(size as f64 - 1.0);
        (first <= last).then(|| (first as usize, (last - first) as usize + 1))
    };
    let (col0, cols) = span(image.min_x, image.max_x, reference.width()).ok_or(Error::NoOverlap)?;
    let (row0, rows) = span(image.min_y, image.max_y, reference.height()).ok_or(Error::NoOverlap)?;
    Ok(GridWindow { col0, row0, cols, rows })
}

fn predict_row(
    assembler: &FeatureAssembler,
    classifier: &TrainedClassifier,
    reference: &RasterLayer,
    window: &GridWindow,
    r: usize,
    with_probabilities: bool,
) -> Result<RowOutput> {
    let width = assembler.len();
    let y = (window.row0 + r) as f64;
    let mut features = Vec::with_capacity(window.cols * width);
    let mut valid = Vec::with_capacity(window.cols);
    let mut scratch = Vec::with_capacity(width);

    for c in 0..window.cols {
        let world = reference.image_to_world().apply(((window.col0 + c) as f64, y));
        match assembler.assemble_into(world, &mut scratch) {
            Ok(()) => {
                features.extend_from_slice(&scratch);
                valid.push(true);
            }
            Err(e) if e.is_recoverable_per_pixel() => valid.push(false),
            Err(e) => return Err(e),
        }
    }

    let mut predicted = Vec::with_capacity(window.cols);
    classifier.predict_rows(&features, &mut predicted)?;

    let mut probabilities = Vec::new();
    if with_probabilities {
        probabilities.resize(window.cols * CLASSES, 0.0);
        let mut vectors = features.chunks_exact(width);
        for (pixel, _) in probabilities.chunks_exact_mut(CLASSES).zip(&valid).filter(|(_, v)| **v) {
            if let Some(vector) = vectors.next() {
                let p = classifier.class_probabilities(vector)?;
                for (dst, src) in pixel.iter_mut().zip(p) {
                    *dst = src as f32;
                }
            }
        }
    }

    let mut predicted = predicted.into_iter();
    let labels = valid
        .iter()
        .map(|&ok| {
            let class = if ok { predicted.next() } else { None };
            class.unwrap_or(LandcoverType::None).index()
        })
        .collect();

    Ok(RowOutput { labels, probabilities })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::{
        ClassificationModel, ClassifiedFeatureVector, MinimumDistance, NaiveBayes, Samples, TrainingContext,
    };
    use crate::features::FeatureParams;
    use approx::assert_relative_eq;
    use terraclass_core::io::{RawBuffer, RawRaster};
    use terraclass_core::{CutoffParams, GeoTransform, LayerStack};
    use terraclass_parallel::ignore_progress;

    /// 4x4 Gray16 layer, pixel size 1; value = 100 * (row * 4 + col)
    fn layer(id: &str, origin: (f64, f64)) -> RasterLayer {
        RasterLayer::from_raw(
            id.into(),
            RawRaster {
                buffer: RawBuffer::Gray16((0..16u16).map(|v| v * 100).collect()),
                width: 4,
                height: 4,
                geotransform: GeoTransform::new(origin.0, origin.1, 1.0, -1.0),
                nodata: None,
                projection: String::new(),
            },
            &CutoffParams::default(),
        )
        .unwrap()
    }

    fn stack(layers: Vec<RasterLayer>) -> LayerStack {
        let mut stack = LayerStack::new();
        for l in layers {
            stack.add(l, true).unwrap();
        }
        stack
    }

    /// Water below 750 in every band, Rock above
    fn classifier(assembler: &FeatureAssembler, bayes: bool) -> TrainedClassifier {
        let n = assembler.len();
        let descriptor = assembler.descriptor().clone();
        let samples: Vec<_> = [(LandcoverType::Water, 0.0), (LandcoverType::Water, 100.0), (LandcoverType::Rock, 1400.0), (LandcoverType::Rock, 1500.0)]
            .iter()
            .map(|&(label, v)| ClassifiedFeatureVector { label, vector: vec![v; n], position: None })
            .collect();
        let model = ClassificationModel { descriptor: descriptor.clone(), samples: samples.into() };
        let samples = Samples::from_model(&model).unwrap();
        let cancel = CancelToken::new();
        let ctx = TrainingContext { cancel: &cancel, progress: &ignore_progress };
        if bayes {
            TrainedClassifier::fit(&NaiveBayes::default(), descriptor, &samples, &ctx).unwrap()
        } else {
            TrainedClassifier::fit(&MinimumDistance, descriptor, &samples, &ctx).unwrap()
        }
    }

    #[test]
    fn test_single_layer_sweep() {
        let stack = stack(vec![layer("b1", (0.0, 4.0))]);
        let assembler = FeatureAssembler::from_stack(&stack, &FeatureParams::default()).unwrap();
        let model = classifier(&assembler, false);
        let grid = BulkPredictionEngine::default()
            .run(&assembler, &model, &ignore_progress, &CancelToken::new())
            .unwrap();

        assert_eq!((grid.rows(), grid.cols()), (4, 4));
        assert_eq!(grid.reference.as_str(), "b1");
        for row in 0..4 {
            for col in 0..4 {
                let expected = if row * 4 + col < 8 { LandcoverType::Water } else { LandcoverType::Rock };
                assert_eq!(grid.label(row, col), Some(expected), "pixel ({}, {})", row, col);
            }
        }
        assert_eq!(grid.labels.transform(), &GeoTransform::new(0.0, 4.0, 1.0, -1.0));
        assert!(grid.probabilities.is_none());
    }

    #[test]
    fn test_window_follows_overlap() {
        // second layer shifted one pixel right and one down
        let stack = stack(vec![layer("a", (0.0, 4.0)), layer("b", (1.0, 3.0))]);
        let assembler = FeatureAssembler::from_stack(&stack, &FeatureParams::default()).unwrap();
        let model = classifier(&assembler, false);
        let grid = BulkPredictionEngine::default()
            .run(&assembler, &model, &ignore_progress, &CancelToken::new())
            .unwrap();

        assert_eq!((grid.rows(), grid.cols()), (3, 3));
        assert_eq!(grid.extent, Extent::new(1.0, 0.0, 4.0, 3.0));
        let gt = grid.labels.transform();
        assert_relative_eq!(gt.origin_x, 1.0);
        assert_relative_eq!(gt.origin_y, 3.0);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let stack = stack(vec![layer("b1", (0.0, 4.0))]);
        let assembler = FeatureAssembler::from_stack(&stack, &FeatureParams::default()).unwrap();
        let model = classifier(&assembler, true);
        let engine = BulkPredictionEngine::new(PredictionParams { probabilities: true, ..Default::default() });
        let grid = engine.run(&assembler, &model, &ignore_progress, &CancelToken::new()).unwrap();

        let probs = grid.probabilities.as_ref().unwrap();
        let total = probs.cumulative(&[LandcoverType::Water, LandcoverType::Rock]);
        for &p in total.iter() {
            assert_relative_eq!(p, 1.0, epsilon = 1e-5);
        }
        assert!(probs.get(LandcoverType::Water, 0, 0).unwrap() > 0.9);
        assert!(probs.get(LandcoverType::Rock, 3, 3).unwrap() > 0.9);
    }

    #[test]
    fn test_probabilities_skipped_when_unsupported() {
        let stack = stack(vec![layer("b1", (0.0, 4.0))]);
        let assembler = FeatureAssembler::from_stack(&stack, &FeatureParams::default()).unwrap();
        let model = classifier(&assembler, false);
        let engine = BulkPredictionEngine::new(PredictionParams { probabilities: true, ..Default::default() });
        let grid = engine.run(&assembler, &model, &ignore_progress, &CancelToken::new()).unwrap();
        assert!(grid.probabilities.is_none());
    }

    #[test]
    fn test_no_overlap() {
        let stack = stack(vec![layer("a", (0.0, 4.0)), layer("b", (10.0, 4.0))]);
        let assembler = FeatureAssembler::from_stack(&stack, &FeatureParams::default()).unwrap();
        let model = classifier(&assembler, false);
        let err = BulkPredictionEngine::default()
            .run(&assembler, &model, &ignore_progress, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, Error::NoOverlap));
    }

    #[test]
    fn test_cancelled_sweep() {
        let stack = stack(vec![layer("b1", (0.0, 4.0))]);
        let assembler = FeatureAssembler::from_stack(&stack, &FeatureParams::default()).unwrap();
        let model = classifier(&assembler, false);
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = BulkPredictionEngine::default()
            .run(&assembler, &model, &ignore_progress, &cancel)
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_descriptor_mismatch() {
        let one = stack(vec![layer("b1", (0.0, 4.0))]);
        let two = stack(vec![layer("b1", (0.0, 4.0)), layer("b2", (0.0, 4.0))]);
        let model = classifier(&FeatureAssembler::from_stack(&one, &FeatureParams::default()).unwrap(), false);
        let assembler = FeatureAssembler::from_stack(&two, &FeatureParams::default()).unwrap();
        let err = BulkPredictionEngine::default()
            .run(&assembler, &model, &ignore_progress, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, Error::DescriptorMismatch { .. }));
    }

    #[test]
    fn test_progress_reports_every_row() {
        let stack = stack(vec![layer("b1", (0.0, 4.0))]);
        let assembler = FeatureAssembler::from_stack(&stack, &FeatureParams::default()).unwrap();
        let model = classifier(&assembler, false);
        let seen = Mutex::new(Vec::new());
        let record = |f: f64| seen.lock().unwrap().push(f);
        let engine = BulkPredictionEngine::new(PredictionParams { mode: ProcessingMode::Sequential, ..Default::default() });
        engine.run(&assembler, &model, &record, &CancelToken::new()).unwrap();
        assert_eq!(seen.into_inner().unwrap(), vec![0.25, 0.5, 0.75, 1.0]);
    }
}
