//! The session's collection of loaded layers

use super::histogram::CutoffParams;
use super::raster_layer::RasterLayer;
use super::LayerId;
use crate::error::{Error, Result};
use crate::io::RasterReader;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use terraclass_parallel::{ParallelStrategy, ProcessingMode};
use tracing::{info, warn};

/// A layer to load: where it lives and what role it plays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSource {
    pub id: LayerId,
    pub path: PathBuf,
    /// Participates in feature vectors
    #[serde(default = "default_true")]
    pub feature: bool,
    /// Serves as the elevation model
    #[serde(default)]
    pub dem: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone)]
struct Entry {
    layer: Arc<RasterLayer>,
    is_feature: bool,
}

/// Loaded layers in insertion order, plus the feature flags, the DEM
/// designation and the single visible layer.
///
/// Visibility is a derived property: at most one layer is selected and every
/// other layer is hidden, so toggling never cascades through peers.
#[derive(Debug, Clone, Default)]
pub struct LayerStack {
    entries: Vec<Entry>,
    dem: Option<LayerId>,
    selected_visible: Option<LayerId>,
}

impl LayerStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, id: &LayerId) -> Option<usize> {
        self.entries.iter().position(|e| e.layer.id() == id)
    }

    fn require(&self, id: &LayerId) -> Result<usize> {
        self.position(id)
            .ok_or_else(|| Error::MissingLayers(vec![id.to_string()]))
    }

    /// Add a layer. Identifiers are unique within a stack.
    pub fn add(&mut self, layer: RasterLayer, is_feature: bool) -> Result<()> {
        if self.position(layer.id()).is_some() {
            return Err(Error::InvalidParameter {
                name: "layer id",
                value: layer.id().to_string(),
                reason: "a layer with this identifier is already loaded".into(),
            });
        }
        let session_crs = self.entries.iter().find_map(|e| e.layer.crs());
        if let (Some(existing), Some(crs)) = (session_crs, layer.crs()) {
            if !existing.is_equivalent(crs) {
                warn!(
                    layer = %layer.id(),
                    crs = %crs,
                    session_crs = %existing,
                    "layer projection differs from the session; no reprojection is applied"
                );
            }
        }
        self.entries.push(Entry {
            layer: Arc::new(layer),
            is_feature,
        });
        Ok(())
    }

    /// Remove a layer, clearing any role it held
    pub fn remove(&mut self, id: &LayerId) -> Option<Arc<RasterLayer>> {
        let pos = self.position(id)?;
        if self.dem.as_ref() == Some(id) {
            self.dem = None;
        }
        if self.selected_visible.as_ref() == Some(id) {
            self.selected_visible = None;
        }
        Some(self.entries.remove(pos).layer)
    }

    pub fn get(&self, id: &LayerId) -> Option<&Arc<RasterLayer>> {
        self.position(id).map(|i| &self.entries[i].layer)
    }

    pub fn contains(&self, id: &LayerId) -> bool {
        self.position(id).is_some()
    }

    /// All layers in insertion order
    pub fn layers(&self) -> impl Iterator<Item = &Arc<RasterLayer>> {
        self.entries.iter().map(|e| &e.layer)
    }

    pub fn set_feature(&mut self, id: &LayerId, is_feature: bool) -> Result<()> {
        let pos = self.require(id)?;
        self.entries[pos].is_feature = is_feature;
        Ok(())
    }

    pub fn is_feature(&self, id: &LayerId) -> bool {
        self.position(id).is_some_and(|i| self.entries[i].is_feature)
    }

    /// Feature layers sorted by identifier.
    ///
    /// This order is the column order of every feature vector.
    pub fn feature_layers(&self) -> Vec<Arc<RasterLayer>> {
        let mut layers: Vec<_> = self
            .entries
            .iter()
            .filter(|e| e.is_feature)
            .map(|e| Arc::clone(&e.layer))
            .collect();
        layers.sort_by(|a, b| a.id().cmp(b.id()));
        layers
    }

    /// Designate (or clear) the elevation layer
    pub fn set_dem(&mut self, id: Option<&LayerId>) -> Result<()> {
        if let Some(id) = id {
            self.require(id)?;
        }
        self.dem = id.cloned();
        Ok(())
    }

    pub fn dem(&self) -> Option<&Arc<RasterLayer>> {
        self.dem.as_ref().and_then(|id| self.get(id))
    }

    /// Make `id` the only visible layer, or hide everything with `None`
    pub fn select_visible(&mut self, id: Option<&LayerId>) -> Result<()> {
        if let Some(id) = id {
            self.require(id)?;
        }
        self.selected_visible = id.cloned();
        Ok(())
    }

    pub fn selected_visible(&self) -> Option<&LayerId> {
        self.selected_visible.as_ref()
    }

    pub fn is_visible(&self, id: &LayerId) -> bool {
        self.selected_visible.as_ref() == Some(id)
    }

    /// Identifiers from `ids` that are not loaded, in the given order
    pub fn missing<'a>(&self, ids: impl IntoIterator<Item = &'a LayerId>) -> Vec<LayerId> {
        ids.into_iter()
            .filter(|id| !self.contains(id))
            .cloned()
            .collect()
    }

    /// Read and construct every source in parallel, then merge the results
    /// into the stack on the calling thread.
    ///
    /// Nothing is merged when any source fails; the first failure in source
    /// order is returned.
    pub fn load_all(
        &mut self,
        sources: &[LayerSource],
        reader: &dyn RasterReader,
        cutoffs: &CutoffParams,
        mode: ProcessingMode,
    ) -> Result<Vec<LayerId>> {
        cutoffs.validate()?;
        let loaded: Vec<Result<RasterLayer>> = mode.par_map(0..sources.len(), |i| {
            let source = &sources[i];
            let raw = reader.read(&source.path)?;
            Ok(RasterLayer::from_raw(source.id.clone(), raw, cutoffs)?.with_source(&source.path))
        });

        let layers = loaded.into_iter().collect::<Result<Vec<_>>>()?;

        let mut ids = Vec::with_capacity(layers.len());
        for (layer, source) in layers.into_iter().zip(sources) {
            ids.push(layer.id().clone());
            self.add(layer, source.feature)?;
            if source.dem {
                self.set_dem(Some(&source.id))?;
            }
        }
        info!(count = ids.len(), "layers loaded");
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{RawBuffer, RawRaster};
    use crate::raster::GeoTransform;
    use std::collections::HashMap;
    use std::path::Path;

    fn raw(projection: &str) -> RawRaster {
        RawRaster {
            buffer: RawBuffer::Gray16(vec![1; 4]),
            width: 2,
            height: 2,
            geotransform: GeoTransform::new(0.0, 2.0, 1.0, -1.0),
            nodata: None,
            projection: projection.into(),
        }
    }

    fn layer(id: &str, projection: &str) -> RasterLayer {
        RasterLayer::from_raw(id.into(), raw(projection), &CutoffParams::default()).unwrap()
    }

    struct MemoryReader(HashMap<PathBuf, RawRaster>);

    impl RasterReader for MemoryReader {
        fn read(&self, path: &Path) -> Result<RawRaster> {
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| Error::Io(std::io::Error::from(std::io::ErrorKind::NotFound)))
        }
    }

    #[test]
    fn test_feature_layers_sorted_by_id() {
        let mut stack = LayerStack::new();
        stack.add(layer("b3", ""), true).unwrap();
        stack.add(layer("b1", ""), true).unwrap();
        stack.add(layer("dem", ""), false).unwrap();
        stack.add(layer("b2", ""), true).unwrap();

        let ids: Vec<_> = stack.feature_layers().iter().map(|l| l.id().to_string()).collect();
        assert_eq!(ids, ["b1", "b2", "b3"]);

        stack.set_feature(&"b2".into(), false).unwrap();
        assert_eq!(stack.feature_layers().len(), 2);
        assert!(stack.set_feature(&"nope".into(), true).is_err());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut stack = LayerStack::new();
        stack.add(layer("b1", ""), true).unwrap();
        assert!(stack.add(layer("b1", ""), true).is_err());
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_single_visible_layer() {
        let mut stack = LayerStack::new();
        stack.add(layer("b1", ""), true).unwrap();
        stack.add(layer("b2", ""), true).unwrap();

        stack.select_visible(Some(&"b1".into())).unwrap();
        assert!(stack.is_visible(&"b1".into()));
        stack.select_visible(Some(&"b2".into())).unwrap();
        assert!(!stack.is_visible(&"b1".into()));
        assert!(stack.is_visible(&"b2".into()));

        stack.remove(&"b2".into()).unwrap();
        assert_eq!(stack.selected_visible(), None);
    }

    #[test]
    fn test_dem_role_cleared_on_remove() {
        let mut stack = LayerStack::new();
        stack.add(layer("dem", ""), false).unwrap();
        stack.set_dem(Some(&"dem".into())).unwrap();
        assert!(stack.dem().is_some());
        stack.remove(&"dem".into());
        assert!(stack.dem().is_none());
        assert!(stack.set_dem(Some(&"dem".into())).is_err());
    }

    #[test]
    fn test_missing_reports_unloaded_ids() {
        let mut stack = LayerStack::new();
        stack.add(layer("b1", "EPSG:4326"), true).unwrap();
        // a different projection only warns
        stack.add(layer("b2", "EPSG:32633"), true).unwrap();
        let wanted: Vec<LayerId> = vec!["b1".into(), "b7".into(), "b2".into(), "b9".into()];
        assert_eq!(stack.missing(&wanted), vec![LayerId::from("b7"), LayerId::from("b9")]);
    }

    #[test]
    fn test_load_all_merges_in_source_order() {
        let mut files = HashMap::new();
        for name in ["a.tif", "b.tif", "dem.tif"] {
            files.insert(PathBuf::from(name), raw(""));
        }
        let reader = MemoryReader(files);
        let sources = vec![
            LayerSource { id: "b".into(), path: "b.tif".into(), feature: true, dem: false },
            LayerSource { id: "a".into(), path: "a.tif".into(), feature: true, dem: false },
            LayerSource { id: "dem".into(), path: "dem.tif".into(), feature: false, dem: true },
        ];

        let mut stack = LayerStack::new();
        let ids = stack
            .load_all(&sources, &reader, &CutoffParams::default(), ProcessingMode::Parallel)
            .unwrap();
        assert_eq!(ids, vec![LayerId::from("b"), LayerId::from("a"), LayerId::from("dem")]);
        assert_eq!(stack.dem().map(|l| l.id().to_string()), Some("dem".into()));
        assert_eq!(stack.get(&"a".into()).and_then(|l| l.source()), Some(Path::new("a.tif")));

        let bad = vec![LayerSource { id: "x".into(), path: "missing.tif".into(), feature: true, dem: false }];
        assert!(stack.load_all(&bad, &reader, &CutoffParams::default(), ProcessingMode::Sequential).is_err());
        assert_eq!(stack.len(), 3);
    }
}
