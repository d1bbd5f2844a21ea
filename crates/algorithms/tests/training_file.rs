//! Training sets through the text exchange format on disk

use std::fs;
use terraclass_algorithms::classification::TrainingSet;
use terraclass_algorithms::features::{BandSetDescriptor, FeatureAssembler, FeatureParams};
use terraclass_core::io::{RawBuffer, RawRaster};
use terraclass_core::{CutoffParams, Error, GeoTransform, LandcoverType, LayerStack, RasterLayer};

/// 8x8 Gray16 band over (0..8, 0..8); value = base + 10 * col + row
fn band(id: &str, base: u16) -> RasterLayer {
    let values = (0..64u16).map(|i| base + 10 * (i % 8) + i / 8).collect();
    RasterLayer::from_raw(
        id.into(),
        RawRaster {
            buffer: RawBuffer::Gray16(values),
            width: 8,
            height: 8,
            geotransform: GeoTransform::new(0.0, 8.0, 1.0, -1.0),
            nodata: None,
            projection: String::new(),
        },
        &CutoffParams::default(),
    )
    .unwrap()
}

fn stack() -> LayerStack {
    let mut stack = LayerStack::new();
    stack.add(band("red", 1000), true).unwrap();
    stack.add(band("nir", 3000), true).unwrap();
    stack.add(band("blue", 500), true).unwrap();
    stack
}

fn placeholder() -> TrainingSet {
    let descriptor = BandSetDescriptor::new(vec!["x".into()], None, &FeatureParams::default()).unwrap();
    TrainingSet::new(descriptor)
}

#[test]
fn export_then_import() {
    let stack = stack();
    let assembler = FeatureAssembler::from_stack(&stack, &FeatureParams::default()).unwrap();
    let mut training = TrainingSet::new(assembler.descriptor().clone());
    training.add_at(&assembler, LandcoverType::Water, (0.5, 7.5)).unwrap();
    training.add_at(&assembler, LandcoverType::Water, (1.5, 6.5)).unwrap();
    training.add_at(&assembler, LandcoverType::Agriculture, (6.5, 1.5)).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("samples.txt");
    training.export_to_text(&path).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("label;blue;nir;red"));
    assert_eq!(lines.next(), Some("Water;500;3000;1000"));
    assert_eq!(lines.next(), Some("Water;511;3011;1011"));
    assert_eq!(lines.next(), Some("Agriculture;566;3066;1066"));

    let mut imported = placeholder();
    assert_eq!(imported.import_from_text(&path, &stack).unwrap(), 3);
    assert_eq!(imported.descriptor(), training.descriptor());
    let vectors: Vec<_> = imported.entries().iter().map(|e| (e.label, e.vector.clone())).collect();
    let expected: Vec<_> = training.entries().iter().map(|e| (e.label, e.vector.clone())).collect();
    assert_eq!(vectors, expected);
    assert_eq!(imported.class_counts()[&LandcoverType::Water], 2);
}

#[test]
fn import_reorders_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("handmade.txt");
    fs::write(&path, "label;red;blue\n# hand labelled\nsnow;40000;38000\n\n3;12;900\n").unwrap();

    let mut imported = placeholder();
    assert_eq!(imported.import_from_text(&path, &stack()).unwrap(), 2);
    let layers: Vec<_> = imported.descriptor().layers().iter().map(|l| l.to_string()).collect();
    assert_eq!(layers, vec!["blue", "red"]);
    assert_eq!(imported.entries()[0].label, LandcoverType::Snow);
    assert_eq!(imported.entries()[0].vector, vec![38000.0, 40000.0]);
    assert_eq!(imported.entries()[1].label, LandcoverType::Snow);
    assert_eq!(imported.entries()[1].vector, vec![900.0, 12.0]);
}

#[test]
fn import_needs_loaded_layers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("other.txt");
    fs::write(&path, "label;red;swir\nRock;1;2\n").unwrap();

    let mut imported = placeholder();
    let err = imported.import_from_text(&path, &stack()).unwrap_err();
    match err {
        Error::MissingLayers(missing) => assert_eq!(missing, vec!["swir".to_string()]),
        other => panic!("unexpected error: {}", other),
    }
    assert!(imported.is_empty());
}

#[test]
fn bad_row_adds_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.txt");
    fs::write(&path, "label;red\nTree;1\nTree;oops\n").unwrap();

    let mut imported = placeholder();
    let err = imported.import_from_text(&path, &stack()).unwrap_err();
    assert!(matches!(err, Error::TrainingFormat { line: 3, .. }));
    assert!(imported.is_empty());
}
