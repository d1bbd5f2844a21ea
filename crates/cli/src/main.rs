//! terraclass CLI - land-cover classification from raster bands and elevation

mod session;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use session::SessionConfig;
use terraclass_algorithms::classification::{ClassifierAdapter, ClassifierKind, TrainingEvent, TrainingSet};
use terraclass_algorithms::export::{ExportPipeline, heightmap, quantize};
use terraclass_algorithms::features::FeatureAssembler;
use terraclass_algorithms::prediction::BulkPredictionEngine;
use terraclass_algorithms::terrain::{CurvatureParams, SlopeAspectParams, multiscale_curvature, slope_aspect_grid};
use terraclass_colormap::{ImageEncoder, PngEncoder, band_to_gray, heights_to_gray16};
use terraclass_core::io::{GeoTiffOptions, RasterReader, default_reader, write_geotiff};
use terraclass_core::{
    CutoffParams, IntensityScaling, LandcoverType, LayerId, LayerStack, Raster, RasterLayer,
};
use terraclass_parallel::{CancelToken, ProcessingMode};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "terraclass")]
#[command(author, version, about = "Land-cover classification from raster bands", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster band
    Info {
        /// Input raster file
        input: PathBuf,
        /// Also write an 8-bit grayscale preview
        #[arg(long)]
        preview: Option<PathBuf>,
        /// Stretch the preview between the contrast cutoffs
        #[arg(long)]
        stretch: bool,
    },
    /// Slope, aspect and multiscale curvature from a DEM
    Derive {
        /// Input DEM file
        input: PathBuf,
        /// Output directory
        output: PathBuf,
        /// Curvature levels (step 2^k cells at level k)
        #[arg(short, long, default_value = "3")]
        levels: usize,
        /// Z-factor applied to the cell size
        #[arg(short, long)]
        z_factor: Option<f64>,
        /// Worker threads (all cores when omitted)
        #[arg(short, long)]
        threads: Option<usize>,
    },
    /// Add labelled samples to a session's training file
    Label {
        /// Session file (JSON)
        session: PathBuf,
        /// Class name or index
        #[arg(short, long)]
        class: String,
        /// World position 'x,y'; repeatable
        #[arg(short, long = "at", required = true)]
        points: Vec<String>,
    },
    /// Train on a session's samples, classify the common extent and export
    Classify {
        /// Session file (JSON)
        session: PathBuf,
        /// Classifier: decision-tree, naive-bayes, svm, minimum-distance
        #[arg(short, long)]
        classifier: Option<String>,
        /// Compute per-class probabilities
        #[arg(short, long)]
        probabilities: bool,
        /// Apply the 3x3 majority filter to the labels
        #[arg(short, long)]
        majority_filter: bool,
        /// Worker threads (all cores when omitted)
        #[arg(short, long)]
        threads: Option<usize>,
        /// Output directory, overriding the session's
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Export the session's DEM as a 16-bit heightmap
    Heightmap {
        /// Session file (JSON)
        session: PathBuf,
        /// Output image
        output: PathBuf,
        /// Resize to a quantized landscape size
        #[arg(short, long)]
        quantize: bool,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Setting default subscriber failed")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

const BAR_STEPS: u64 = 1000;

/// Bar driven by a completed fraction in `[0, 1]`
fn fraction_bar(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(BAR_STEPS);
    if let Ok(style) = ProgressStyle::default_bar().template("{msg} [{bar:40.cyan/blue}] {percent}% ({elapsed})") {
        pb.set_style(style.progress_chars("=> "));
    }
    pb.set_message(msg.to_string());
    pb
}

fn set_fraction(pb: &ProgressBar, fraction: f64) {
    pb.set_position((fraction.clamp(0.0, 1.0) * BAR_STEPS as f64) as u64);
}

fn read_layer(path: &Path) -> Result<RasterLayer> {
    let pb = spinner("Reading raster...");
    let raw = default_reader().read(path).context("Failed to read raster")?;
    let id = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "layer".into());
    let layer = RasterLayer::from_raw(LayerId::new(id), raw, &CutoffParams::default())
        .context("Failed to build layer")?
        .with_source(path);
    pb.finish_and_clear();
    info!("Input: {} x {}", layer.width(), layer.height());
    Ok(layer)
}

fn write_result(raster: &Raster<f64>, path: &Path, epsg: Option<u32>) -> Result<()> {
    write_geotiff(raster, path, Some(GeoTiffOptions { epsg, ..Default::default() }))
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn load_stack(session: &SessionConfig) -> Result<LayerStack> {
    let pb = spinner(&format!("Loading {} layers...", session.layers.len()));
    let mut stack = LayerStack::new();
    let reader = default_reader();
    stack
        .load_all(&session.layers, reader.as_ref(), &session.cutoffs, session.prediction.mode())
        .context("Failed to load layers")?;
    pb.finish_and_clear();
    Ok(stack)
}

/// The session's training set; empty, with the session's band set, when
/// the file does not exist yet
fn load_training(session: &SessionConfig, stack: &LayerStack) -> Result<TrainingSet> {
    let assembler = FeatureAssembler::from_stack(stack, &session.features).context("Invalid band set")?;
    let mut training = TrainingSet::new(assembler.descriptor().clone());
    if session.training.exists() {
        training
            .import_from_text(&session.training, stack)
            .with_context(|| format!("Failed to import {}", session.training.display()))?;
    }
    Ok(training)
}

fn parse_point(s: &str) -> Result<(f64, f64)> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 2 {
        anyhow::bail!("Position must be 'x,y', got: {}", s);
    }
    let x: f64 = parts[0].trim().parse().context("Invalid x")?;
    let y: f64 = parts[1].trim().parse().context("Invalid y")?;
    Ok((x, y))
}

fn parse_classifier(s: &str) -> Result<ClassifierKind> {
    let wanted = s.to_lowercase().replace('_', "-");
    ClassifierKind::ALL
        .into_iter()
        .find(|k| k.name() == wanted)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown classifier: {}. Use decision-tree, naive-bayes, svm, or minimum-distance.",
                s
            )
        })
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

// ─── Commands ───────────────────────────────────────────────────────────

fn info_command(input: &Path, preview: Option<&Path>, stretch: bool) -> Result<()> {
    let layer = read_layer(input)?;
    let gt = layer.geotransform();
    let bounds = layer.world_bounds();
    let stats = layer.statistics();
    let cells = layer.width() * layer.height();

    println!("File: {}", input.display());
    println!("Format: {:?}", layer.format());
    println!("Dimensions: {} x {} ({} cells)", layer.width(), layer.height(), cells);
    println!("Pixel size: {} x {}", gt.pixel_width, gt.pixel_height);
    println!(
        "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
        bounds.min_x, bounds.min_y, bounds.max_x, bounds.max_y
    );
    if let Some(crs) = layer.crs() {
        println!("CRS: {}", crs);
    }
    if let Some(nodata) = layer.nodata() {
        println!("NoData: {}", nodata);
    }
    println!("\nStatistics:");
    println!("  Min: {:.4}", stats.data_min);
    println!("  Max: {:.4}", stats.data_max);
    println!("  Cutoffs: {:.4} - {:.4}", stats.min_cutoff, stats.max_cutoff);
    println!(
        "  Valid cells: {} ({:.1}%)",
        stats.valid_count,
        100.0 * stats.valid_count as f64 / cells.max(1) as f64
    );

    if let Some(path) = preview {
        let scaling = if stretch { IntensityScaling::ContrastStretch } else { IntensityScaling::Raw };
        let image = band_to_gray(&layer, scaling).context("Failed to render preview")?;
        PngEncoder.encode(&image, path).context("Failed to write preview")?;
        println!("Preview saved to: {}", path.display());
    }
    Ok(())
}

fn derive_command(input: &Path, output: &Path, levels: usize, z_factor: Option<f64>, threads: Option<usize>) -> Result<()> {
    let layer = read_layer(input)?;
    let epsg = layer.crs().and_then(|c| c.epsg());
    let dem = layer.to_grid().context("Failed to read elevations")?;
    let mode = ProcessingMode::from_threads(threads);
    std::fs::create_dir_all(output).with_context(|| format!("Failed to create {}", output.display()))?;

    let start = Instant::now();
    let grids = slope_aspect_grid(&dem, &SlopeAspectParams { z_factor, mode })
        .context("Failed to calculate slope and aspect")?;
    let curvature =
        multiscale_curvature(&dem, &CurvatureParams { levels, mode }).context("Failed to calculate curvature")?;
    let elapsed = start.elapsed();

    let pb = spinner("Writing output...");
    write_result(&grids.slope, &output.join("slope.tif"), epsg)?;
    write_result(&grids.aspect, &output.join("aspect.tif"), epsg)?;
    for (level, grid) in curvature.iter().enumerate() {
        write_result(grid, &output.join(format!("curvature_{}.tif", level)), epsg)?;
    }
    pb.finish_and_clear();
    done("Terrain derivatives", output, elapsed);
    Ok(())
}

fn label_command(session_path: &Path, class: &str, points: &[String]) -> Result<()> {
    let session = SessionConfig::load(session_path)?;
    let label: LandcoverType = class.parse()?;
    let points = points.iter().map(|p| parse_point(p)).collect::<Result<Vec<_>>>()?;

    let stack = load_stack(&session)?;
    let mut training = load_training(&session, &stack)?;
    let assembler =
        FeatureAssembler::for_descriptor(&stack, training.descriptor()).context("Training file does not fit the layers")?;

    for &world in &points {
        training
            .add_at(&assembler, label, world)
            .with_context(|| format!("Cannot label ({}, {})", world.0, world.1))?;
    }
    training
        .export_to_text(&session.training)
        .with_context(|| format!("Failed to write {}", session.training.display()))?;

    println!("Added {} {} samples to {}", points.len(), label, session.training.display());
    for (class, count) in training.class_counts() {
        println!("  {}: {}", class, count);
    }
    Ok(())
}

fn classify_command(
    session_path: &Path,
    classifier: Option<&str>,
    probabilities: bool,
    majority_filter: bool,
    threads: Option<usize>,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut session = SessionConfig::load(session_path)?;
    if let Some(name) = classifier {
        session.classifier.kind = parse_classifier(name)?;
    }
    session.prediction.probabilities |= probabilities;
    session.prediction.majority_filter |= majority_filter;
    if threads.is_some() {
        session.prediction.threads = threads;
    }
    if let Some(dir) = output {
        session.export.directory = dir;
    }
    if session.export.params.probability_threshold.is_some() && !session.prediction.probabilities {
        warn!("probability threshold set; computing probabilities");
        session.prediction.probabilities = true;
    }

    let stack = load_stack(&session)?;
    let training = load_training(&session, &stack)?;
    if training.is_empty() {
        anyhow::bail!("No training samples in {}", session.training.display());
    }
    let assembler =
        FeatureAssembler::for_descriptor(&stack, training.descriptor()).context("Training file does not fit the layers")?;
    info!(
        samples = training.count(),
        columns = %training.descriptor().column_names().join(","),
        "training set ready"
    );

    let start = Instant::now();
    let adapter = ClassifierAdapter::new(session.classifier.kind, session.classifier.params.clone());
    let handle = adapter.train(training.snapshot()).context("Failed to start training")?;
    let pb = fraction_bar(&format!("Training {}", adapter.kind()));
    for event in handle.events().iter() {
        match event {
            TrainingEvent::Progress(f) => set_fraction(&pb, f),
            TrainingEvent::Completed { samples, classes } => {
                info!(samples, classes, "model trained");
            }
            TrainingEvent::Cancelled | TrainingEvent::Failed(_) => {}
        }
    }
    handle.wait().context("Training failed")?;
    pb.finish_and_clear();
    let model = adapter.trained()?;

    let pb = fraction_bar("Classifying");
    let engine = BulkPredictionEngine::new(session.prediction.params());
    let grid = engine
        .run(&assembler, &model, &|f: f64| set_fraction(&pb, f), &CancelToken::new())
        .context("Classification failed")?;
    pb.finish_and_clear();
    let elapsed = start.elapsed();

    println!("Classified {} x {} pixels on the grid of '{}'", grid.cols(), grid.rows(), grid.reference);
    let counts = grid.class_counts();
    let total = (grid.rows() * grid.cols()).max(1) as f64;
    for class in LandcoverType::ALL {
        let n = counts[class.index() as usize];
        if n > 0 {
            println!("  {:<12} {:>10} ({:.1}%)", class.name(), n, 100.0 * n as f64 / total);
        }
    }

    let pb = spinner("Exporting...");
    let export = ExportPipeline::new(session.export.params.clone()).with_mode(session.prediction.mode());
    let written = export
        .run(&grid, stack.dem().map(|d| d.as_ref()), &PngEncoder, &session.export.directory)
        .context("Export failed")?;
    pb.finish_and_clear();
    for path in &written {
        println!("  {}", path.display());
    }
    done("Classification", &session.export.directory, elapsed);
    Ok(())
}

fn heightmap_command(session_path: &Path, output: &Path, quantized: bool) -> Result<()> {
    let session = SessionConfig::load(session_path)?;
    let stack = load_stack(&session)?;
    let dem = stack
        .dem()
        .context("Session has no elevation layer (set \"dem\": true on one layer)")?;

    let (rows, cols) = (dem.height(), dem.width());
    let (width, height) = if quantized {
        let size = quantize(cols, rows, &session.export.params.quantize_params)?;
        info!(
            components_x = size.components_x,
            components_y = size.components_y,
            exact = size.exact,
            "quantized landscape size"
        );
        (size.width, size.height)
    } else {
        (cols, rows)
    };

    let start = Instant::now();
    let heights = heightmap(dem, dem.geotransform(), rows, cols, width, height, session.prediction.mode())
        .context("Failed to build heightmap")?;
    let image = heights_to_gray16(&heights)?;
    if let Some(dir) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    PngEncoder.encode(&image, output).context("Failed to write heightmap")?;
    done("Heightmap", output, start.elapsed());
    Ok(())
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Info { input, preview, stretch } => info_command(&input, preview.as_deref(), stretch),
        Commands::Derive {
            input,
            output,
            levels,
            z_factor,
            threads,
        } => derive_command(&input, &output, levels, z_factor, threads),
        Commands::Label { session, class, points } => label_command(&session, &class, &points),
        Commands::Classify {
            session,
            classifier,
            probabilities,
            majority_filter,
            threads,
            output,
        } => classify_command(&session, classifier.as_deref(), probabilities, majority_filter, threads, output),
        Commands::Heightmap { session, output, quantize } => heightmap_command(&session, &output, quantize),
    }
}
