//! Labelled feature vectors and their text exchange format
//!
//! File layout, one record per line, `;`-separated:
//!
//! ```text
//! label;b1;b2;b3
//! Water;812;1530;402
//! Tree;2044;3011;1875
//! ```
//!
//! The header names the feature columns ([`BandSetDescriptor::column_names`]),
//! so terrain-mode files end in `@altitude;@slope;@aspect`. Labels are class
//! names; reading also accepts any letter case and numeric class indices.

use crate::features::{BandSetDescriptor, FeatureAssembler, FeatureMode, FeatureParams, FeatureVector, TERRAIN_COLUMNS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use terraclass_core::layer::{LayerId, LayerStack};
use terraclass_core::{Error, LandcoverType, Result};
use tracing::info;

const LABEL_COLUMN: &str = "label";
const SEPARATOR: char = ';';

/// One training sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedFeatureVector {
    pub label: LandcoverType,
    pub vector: FeatureVector,
    /// World position the sample was taken at, when known
    pub position: Option<(f64, f64)>,
}

/// Immutable training snapshot handed to a classifier
#[derive(Debug, Clone)]
pub struct ClassificationModel {
    pub descriptor: BandSetDescriptor,
    pub samples: Arc<[ClassifiedFeatureVector]>,
}

impl ClassificationModel {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Mutable collection of labelled vectors sharing one descriptor
#[derive(Debug, Clone)]
pub struct TrainingSet {
    descriptor: BandSetDescriptor,
    entries: Vec<ClassifiedFeatureVector>,
}

impl TrainingSet {
    pub fn new(descriptor: BandSetDescriptor) -> Self {
        Self {
            descriptor,
            entries: Vec::new(),
        }
    }

    pub fn descriptor(&self) -> &BandSetDescriptor {
        &self.descriptor
    }

    /// Add a sample. The vector length must match the descriptor and the
    /// label must be an assignable class.
    pub fn add(
        &mut self,
        label: LandcoverType,
        vector: FeatureVector,
        position: Option<(f64, f64)>,
    ) -> Result<()> {
        if label == LandcoverType::None {
            return Err(Error::InvalidParameter {
                name: "label",
                value: label.to_string(),
                reason: "unclassified samples cannot be used for training".into(),
            });
        }
        if vector.len() != self.descriptor.len() {
            return Err(Error::FeatureLength {
                expected: self.descriptor.len(),
                actual: vector.len(),
            });
        }
        self.entries.push(ClassifiedFeatureVector { label, vector, position });
        Ok(())
    }

    /// Label the vector at a world position. Assembly errors propagate: a
    /// point outside any layer is the caller's mistake.
    pub fn add_at(
        &mut self,
        assembler: &FeatureAssembler,
        label: LandcoverType,
        world: (f64, f64),
    ) -> Result<()> {
        self.descriptor.check_compatible(assembler.descriptor())?;
        let vector = assembler.assemble(world)?;
        self.add(label, vector, Some(world))
    }

    pub fn remove(&mut self, index: usize) -> Option<ClassifiedFeatureVector> {
        (index < self.entries.len()).then(|| self.entries.remove(index))
    }

    /// Remove the first entry equal to `entry`
    pub fn remove_entry(&mut self, entry: &ClassifiedFeatureVector) -> bool {
        match self.entries.iter().position(|e| e == entry) {
            Some(i) => {
                self.entries.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ClassifiedFeatureVector] {
        &self.entries
    }

    pub fn entries_for(&self, label: LandcoverType) -> impl Iterator<Item = &ClassifiedFeatureVector> {
        self.entries.iter().filter(move |e| e.label == label)
    }

    /// Sample count per class, classes without samples omitted
    pub fn class_counts(&self) -> BTreeMap<LandcoverType, usize> {
        let mut counts = BTreeMap::new();
        for e in &self.entries {
            *counts.entry(e.label).or_insert(0) += 1;
        }
        counts
    }

    /// Copy the current samples into an immutable model
    pub fn snapshot(&self) -> ClassificationModel {
        ClassificationModel {
            descriptor: self.descriptor.clone(),
            samples: self.entries.clone().into(),
        }
    }

    /// Write header and samples to `writer`
    pub fn write_text<W: Write>(&self, mut writer: W) -> Result<()> {
        let mut header = vec![LABEL_COLUMN.to_string()];
        header.extend(self.descriptor.column_names());
        writeln!(writer, "{}", header.join(&SEPARATOR.to_string()))?;
        for e in &self.entries {
            write!(writer, "{}", e.label.name())?;
            for v in &e.vector {
                write!(writer, "{}{}", SEPARATOR, v)?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }

    pub fn export_to_text<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        self.write_text(&mut writer)?;
        writer.flush()?;
        info!(path = %path.as_ref().display(), samples = self.count(), "training set exported");
        Ok(())
    }

    /// Read samples from `reader`, appending them.
    ///
    /// Every column layer must be loaded in `stack`. An empty set adopts the
    /// file's band set (keeping its own scaling); a non-empty set requires
    /// the file to match its descriptor. Nothing is added when any line
    /// fails. Returns the number of samples read.
    pub fn read_text<R: BufRead>(&mut self, reader: R, stack: &LayerStack) -> Result<usize> {
        let mut lines = reader.lines().enumerate();
        let (header_no, header) = loop {
            match lines.next() {
                Some((i, line)) => {
                    let line = line?;
                    if !line.trim().is_empty() {
                        break (i + 1, line);
                    }
                }
                None => {
                    return Err(Error::TrainingFormat {
                        line: 0,
                        reason: "file has no header".into(),
                    });
                }
            }
        };

        let columns = parse_header(&header, header_no)?;
        let missing = stack.missing(&columns.layers);
        if !missing.is_empty() {
            return Err(Error::MissingLayers(missing.iter().map(|id| id.to_string()).collect()));
        }
        let dem = match columns.mode {
            FeatureMode::Bands => None,
            FeatureMode::Terrain => Some(
                stack
                    .dem()
                    .map(|l| l.id().clone())
                    .ok_or_else(|| Error::InvalidParameter {
                        name: "dem",
                        value: "none".into(),
                        reason: "terrain columns need an elevation layer".into(),
                    })?,
            ),
        };
        let params = FeatureParams {
            mode: columns.mode,
            ..self.descriptor.params()
        };
        let descriptor = BandSetDescriptor::new(columns.layers.clone(), dem, &params)?;
        if !self.is_empty() {
            self.descriptor.check_compatible(&descriptor)?;
        }

        // file column for each descriptor column
        let order: Vec<usize> = descriptor
            .column_names()
            .iter()
            .map(|name| columns.names.iter().position(|c| c == name).unwrap_or(usize::MAX))
            .collect();

        let mut parsed = Vec::new();
        for (i, line) in lines {
            let line = line?;
            let line_no = i + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            parsed.push(parse_row(trimmed, line_no, &order, columns.names.len())?);
        }

        self.descriptor = descriptor;
        let count = parsed.len();
        self.entries.extend(parsed);
        Ok(count)
    }

    pub fn import_from_text<P: AsRef<Path>>(&mut self, path: P, stack: &LayerStack) -> Result<usize> {
        let file = File::open(path.as_ref())?;
        let count = self.read_text(BufReader::new(file), stack)?;
        info!(path = %path.as_ref().display(), samples = count, "training set imported");
        Ok(count)
    }
}

struct HeaderColumns {
    /// Feature column names in file order
    names: Vec<String>,
    layers: Vec<LayerId>,
    mode: FeatureMode,
}

fn parse_header(header: &str, line: usize) -> Result<HeaderColumns> {
    let format_err = |reason: String| Error::TrainingFormat { line, reason };
    let mut fields = header.split(SEPARATOR).map(str::trim);
    match fields.next() {
        Some(first) if first.eq_ignore_ascii_case(LABEL_COLUMN) => {}
        _ => return Err(format_err("header must start with 'label'".into())),
    }
    let names: Vec<String> = fields.map(str::to_string).collect();

    let terrain = names.len() >= TERRAIN_COLUMNS.len()
        && names[names.len() - TERRAIN_COLUMNS.len()..]
            .iter()
            .zip(TERRAIN_COLUMNS)
            .all(|(a, b)| a == b);
    let layer_count = names.len() - if terrain { TERRAIN_COLUMNS.len() } else { 0 };

    let mut layers = Vec::with_capacity(layer_count);
    for name in &names[..layer_count] {
        if name.is_empty() || name.starts_with('@') {
            return Err(format_err(format!("invalid layer column '{}'", name)));
        }
        let id = LayerId::from(name.as_str());
        if layers.contains(&id) {
            return Err(format_err(format!("duplicate layer column '{}'", name)));
        }
        layers.push(id);
    }
    if layers.is_empty() {
        return Err(format_err("no layer columns".into()));
    }

    Ok(HeaderColumns {
        names,
        layers,
        mode: if terrain { FeatureMode::Terrain } else { FeatureMode::Bands },
    })
}

fn parse_row(line: &str, line_no: usize, order: &[usize], width: usize) -> Result<ClassifiedFeatureVector> {
    let format_err = |reason: String| Error::TrainingFormat { line: line_no, reason };
    let mut fields = line.split(SEPARATOR).map(str::trim);
    let label_field = fields.next().unwrap_or_default();
    let label: LandcoverType = label_field
        .parse()
        .map_err(|_| format_err(format!("unknown class '{}'", label_field)))?;
    if label == LandcoverType::None {
        return Err(format_err("class 'None' cannot be a training label".into()));
    }

    let values = fields
        .map(|f| f.parse::<f64>().map_err(|_| format_err(format!("invalid number '{}'", f))))
        .collect::<Result<Vec<f64>>>()?;
    if values.len() != width {
        return Err(format_err(format!("expected {} values, found {}", width, values.len())));
    }

    let vector = order
        .iter()
        .map(|&i| values.get(i).copied().ok_or_else(|| format_err("column out of range".into())))
        .collect::<Result<Vec<f64>>>()?;

    Ok(ClassifiedFeatureVector { label, vector, position: None })
}

#[cfg(test)]
mod tests {
    use super::*;
    use terraclass_core::io::{RawBuffer, RawRaster};
    use terraclass_core::layer::CutoffParams;
    use terraclass_core::{GeoTransform, RasterLayer};

    fn layer(id: &str) -> RasterLayer {
        RasterLayer::from_raw(
            id.into(),
            RawRaster {
                buffer: RawBuffer::Gray16((0..9).collect()),
                width: 3,
                height: 3,
                geotransform: GeoTransform::new(0.0, 3.0, 1.0, -1.0),
                nodata: None,
                projection: String::new(),
            },
            &CutoffParams::default(),
        )
        .unwrap()
    }

    fn stack(ids: &[&str]) -> LayerStack {
        let mut stack = LayerStack::new();
        for id in ids {
            stack.add(layer(id), true).unwrap();
        }
        stack
    }

    fn descriptor(ids: &[&str]) -> BandSetDescriptor {
        BandSetDescriptor::new(ids.iter().map(|&i| i.into()).collect(), None, &FeatureParams::default()).unwrap()
    }

    #[test]
    fn test_add_checks_length_and_label() {
        let mut set = TrainingSet::new(descriptor(&["b1", "b2"]));
        set.add(LandcoverType::Water, vec![1.0, 2.0], None).unwrap();
        assert!(matches!(
            set.add(LandcoverType::Water, vec![1.0], None),
            Err(Error::FeatureLength { expected: 2, actual: 1 })
        ));
        assert!(set.add(LandcoverType::None, vec![1.0, 2.0], None).is_err());
        assert_eq!(set.count(), 1);
    }

    #[test]
    fn test_add_at_world_position() {
        let s = stack(&["b1"]);
        let assembler = FeatureAssembler::from_stack(&s, &FeatureParams::default()).unwrap();
        let mut set = TrainingSet::new(assembler.descriptor().clone());
        set.add_at(&assembler, LandcoverType::Rock, (2.5, 0.5)).unwrap();
        assert_eq!(set.entries()[0].vector, vec![8.0]);
        assert_eq!(set.entries()[0].position, Some((2.5, 0.5)));
        assert!(set.add_at(&assembler, LandcoverType::Rock, (7.0, 0.5)).is_err());
    }

    #[test]
    fn test_counts_and_removal() {
        let mut set = TrainingSet::new(descriptor(&["b1"]));
        set.add(LandcoverType::Tree, vec![1.0], None).unwrap();
        set.add(LandcoverType::Water, vec![2.0], None).unwrap();
        set.add(LandcoverType::Tree, vec![3.0], None).unwrap();

        let counts = set.class_counts();
        assert_eq!(counts[&LandcoverType::Tree], 2);
        assert_eq!(counts[&LandcoverType::Water], 1);
        assert_eq!(set.entries_for(LandcoverType::Tree).count(), 2);

        let entry = set.entries()[1].clone();
        assert!(set.remove_entry(&entry));
        assert!(!set.remove_entry(&entry));
        assert_eq!(set.remove(5), None);
        assert_eq!(set.remove(0).map(|e| e.vector), Some(vec![1.0]));

        let snapshot = set.snapshot();
        set.clear();
        assert_eq!(snapshot.len(), 1);
        assert!(set.is_empty());
    }

    #[test]
    fn test_text_roundtrip() {
        let mut set = TrainingSet::new(descriptor(&["b2", "b1"]));
        set.add(LandcoverType::Water, vec![0.1, 1530.0], None).unwrap();
        set.add(LandcoverType::Agriculture, vec![2044.5, 1e-7], None).unwrap();

        let mut buf = Vec::new();
        set.write_text(&mut buf).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with("label;b1;b2\nWater;0.1;1530\n"));

        let mut loaded = TrainingSet::new(descriptor(&["b1"]));
        let n = loaded.read_text(buf.as_slice(), &stack(&["b1", "b2"])).unwrap();
        assert_eq!(n, 2);
        assert_eq!(loaded.descriptor(), set.descriptor());
        assert_eq!(loaded.entries(), set.entries());
    }

    #[test]
    fn test_read_reorders_unsorted_columns() {
        let text = "label;b2;b1\n\n# comment\nsnow;20;10\n2;21;11\n";
        let mut set = TrainingSet::new(descriptor(&["b1"]));
        set.read_text(text.as_bytes(), &stack(&["b1", "b2"])).unwrap();
        assert_eq!(set.entries()[0].label, LandcoverType::Snow);
        assert_eq!(set.entries()[0].vector, vec![10.0, 20.0]);
        assert_eq!(set.entries()[1].label, LandcoverType::Rock);
        assert_eq!(set.entries()[1].vector, vec![11.0, 21.0]);
    }

    #[test]
    fn test_read_rejects_missing_layers() {
        let text = "label;b1;b9\nWater;1;2\n";
        let mut set = TrainingSet::new(descriptor(&["b1"]));
        match set.read_text(text.as_bytes(), &stack(&["b1"])) {
            Err(Error::MissingLayers(ids)) => assert_eq!(ids, ["b9"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_read_is_all_or_nothing() {
        let text = "label;b1\nWater;1\nTree;1;2\n";
        let mut set = TrainingSet::new(descriptor(&["b1"]));
        let err = set.read_text(text.as_bytes(), &stack(&["b1"])).unwrap_err();
        assert!(matches!(err, Error::TrainingFormat { line: 3, .. }));
        assert!(set.is_empty());

        let bad_label = "label;b1\nLava;1\n";
        assert!(matches!(
            set.read_text(bad_label.as_bytes(), &stack(&["b1"])),
            Err(Error::TrainingFormat { line: 2, .. })
        ));
    }

    #[test]
    fn test_read_into_non_empty_set_requires_same_band_set() {
        let mut set = TrainingSet::new(descriptor(&["b1"]));
        set.add(LandcoverType::Water, vec![1.0], None).unwrap();
        let text = "label;b1;b2\nWater;1;2\n";
        assert!(matches!(
            set.read_text(text.as_bytes(), &stack(&["b1", "b2"])),
            Err(Error::DescriptorMismatch { .. })
        ));
        let same = "label;b1\nTree;4\n";
        assert_eq!(set.read_text(same.as_bytes(), &stack(&["b1"])).unwrap(), 1);
        assert_eq!(set.count(), 2);
    }
}
