//! Map and layer configuration snapshot.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::sources::{Coverage, LayerKind, MapSourceInfo};
use super::CatalogError;
use crate::coord::{TileId, MAX_LEVEL};

/// Default tile level of a newly discovered layer.
pub const DEFAULT_LAYER_LEVEL: u16 = 13;

/// Per-view configuration of one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerViewSettings {
    pub level: u16,
    pub visible: bool,
    pub tile_borders: bool,
}

impl LayerViewSettings {
    pub fn new(level: u16) -> Self {
        Self {
            level: level.min(MAX_LEVEL),
            visible: true,
            tile_borders: true,
        }
    }
}

impl Default for LayerViewSettings {
    fn default() -> Self {
        Self::new(DEFAULT_LAYER_LEVEL)
    }
}

/// One layer of one map, with its settings for every view.
#[derive(Debug, Clone, PartialEq)]
pub struct MapLayerInfo {
    map_id: String,
    layer_id: String,
    kind: LayerKind,
    coverage: Vec<Coverage>,
    zoom_levels: Vec<u16>,
    views: Vec<LayerViewSettings>,
}

impl MapLayerInfo {
    /// Creates a layer with default settings in `num_views` views.
    pub fn new(
        map_id: impl Into<String>,
        layer_id: impl Into<String>,
        kind: LayerKind,
        num_views: usize,
        level: u16,
    ) -> Self {
        Self {
            map_id: map_id.into(),
            layer_id: layer_id.into(),
            kind,
            coverage: vec![Coverage::Tile(TileId::from_raw(0))],
            zoom_levels: Vec::new(),
            views: vec![LayerViewSettings::new(level); num_views.max(1)],
        }
    }

    pub fn map_id(&self) -> &str {
        &self.map_id
    }

    pub fn layer_id(&self) -> &str {
        &self.layer_id
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    pub fn coverage(&self) -> &[Coverage] {
        &self.coverage
    }

    pub fn zoom_levels(&self) -> &[u16] {
        &self.zoom_levels
    }

    /// Whether tiles of this layer are streamed into the cache.
    pub fn is_streamable(&self) -> bool {
        self.kind == LayerKind::Features
    }

    /// Settings in `view`; unknown views read as view 0.
    pub fn settings(&self, view: usize) -> LayerViewSettings {
        self.views
            .get(view)
            .or_else(|| self.views.first())
            .copied()
            .unwrap_or_default()
    }

    pub fn level(&self, view: usize) -> u16 {
        self.settings(view).level
    }

    /// Whether the layer is shown in `view`. Non-feature layers never are.
    pub fn is_visible(&self, view: usize) -> bool {
        self.is_streamable() && self.settings(view).visible
    }

    pub fn tile_borders(&self, view: usize) -> bool {
        self.settings(view).tile_borders
    }

    fn resize_views(&mut self, num_views: usize) {
        let template = self.settings(0);
        self.views.resize(num_views.max(1), template);
    }
}

/// All maps and layers known to the engine.
///
/// Layer settings are stored per view. With view sync enabled every setter
/// applies to all views at once.
#[derive(Debug, Clone)]
pub struct MapCatalog {
    maps: BTreeMap<String, BTreeMap<String, MapLayerInfo>>,
    num_views: usize,
    default_level: u16,
    view_sync: bool,
}

impl Default for MapCatalog {
    fn default() -> Self {
        Self::new(1, DEFAULT_LAYER_LEVEL)
    }
}

impl MapCatalog {
    pub fn new(num_views: usize, default_level: u16) -> Self {
        Self {
            maps: BTreeMap::new(),
            num_views: num_views.max(1),
            default_level: default_level.min(MAX_LEVEL),
            view_sync: false,
        }
    }

    /// Replaces the catalog contents with the server's map list.
    ///
    /// Add-on maps are skipped. Layers that were already known keep their
    /// per-view settings.
    ///
    /// # Returns
    ///
    /// The number of maps now in the catalog.
    pub fn apply_sources(&mut self, sources: Vec<MapSourceInfo>) -> usize {
        let mut previous = std::mem::take(&mut self.maps);
        for source in sources.into_iter().filter(|s| !s.add_on) {
            let known = previous.remove(&source.map_id).unwrap_or_default();
            let mut layers = BTreeMap::new();
            for (layer_id, info) in source.layers {
                let mut layer = MapLayerInfo::new(
                    source.map_id.clone(),
                    layer_id.clone(),
                    info.kind,
                    self.num_views,
                    self.default_level,
                );
                if !info.coverage.is_empty() {
                    layer.coverage = info.coverage;
                }
                layer.zoom_levels = info.zoom_levels;
                if let Some(existing) = known.get(&layer_id) {
                    layer.views = existing.views.clone();
                    layer.resize_views(self.num_views);
                }
                layers.insert(layer_id, layer);
            }
            self.maps.insert(source.map_id, layers);
        }
        debug!(maps = self.maps.len(), "Map catalog updated");
        self.maps.len()
    }

    /// Adds (or replaces) a single layer.
    pub fn insert_layer(&mut self, layer: MapLayerInfo) {
        let mut layer = layer;
        layer.resize_views(self.num_views);
        self.maps
            .entry(layer.map_id.clone())
            .or_default()
            .insert(layer.layer_id.clone(), layer);
    }

    pub fn num_views(&self) -> usize {
        self.num_views
    }

    /// Changes the number of views. New views copy view 0's settings.
    pub fn set_num_views(&mut self, num_views: usize) {
        self.num_views = num_views.max(1);
        let n = self.num_views;
        self.layers_mut().for_each(|layer| layer.resize_views(n));
    }

    pub fn view_sync(&self) -> bool {
        self.view_sync
    }

    /// Enables or disables view sync. Enabling copies view 0's settings to
    /// every other view.
    pub fn set_view_sync(&mut self, enabled: bool) {
        self.view_sync = enabled;
        if enabled {
            self.layers_mut().for_each(|layer| {
                let template = layer.settings(0);
                layer.views.iter_mut().for_each(|s| *s = template);
            });
        }
    }

    pub fn map_ids(&self) -> impl Iterator<Item = &str> {
        self.maps.keys().map(String::as_str)
    }

    pub fn layer(&self, map_id: &str, layer_id: &str) -> Option<&MapLayerInfo> {
        self.maps.get(map_id)?.get(layer_id)
    }

    /// Iterates all layers of all maps.
    pub fn layers(&self) -> impl Iterator<Item = &MapLayerInfo> {
        self.maps.values().flat_map(|layers| layers.values())
    }

    /// Iterates the layers shown in `view`.
    pub fn visible_layers(&self, view: usize) -> impl Iterator<Item = &MapLayerInfo> {
        self.layers().filter(move |layer| layer.is_visible(view))
    }

    /// Distinct levels of the layers shown in `view`.
    pub fn visible_levels(&self, view: usize) -> BTreeSet<u16> {
        self.visible_layers(view).map(|l| l.level(view)).collect()
    }

    pub fn is_layer_visible(&self, view: usize, map_id: &str, layer_id: &str) -> bool {
        self.layer(map_id, layer_id)
            .map(|layer| layer.is_visible(view))
            .unwrap_or(false)
    }

    pub fn set_layer_visible(
        &mut self,
        view: usize,
        map_id: &str,
        layer_id: &str,
        visible: bool,
    ) -> Result<(), CatalogError> {
        self.update_layer(view, map_id, layer_id, |s| s.visible = visible)
    }

    /// Shows or hides every layer of a map.
    pub fn set_map_visible(
        &mut self,
        view: usize,
        map_id: &str,
        visible: bool,
    ) -> Result<(), CatalogError> {
        let layer_ids: Vec<String> = self
            .maps
            .get(map_id)
            .ok_or_else(|| CatalogError::UnknownMap(map_id.to_string()))?
            .keys()
            .cloned()
            .collect();
        for layer_id in layer_ids {
            self.set_layer_visible(view, map_id, &layer_id, visible)?;
        }
        Ok(())
    }

    /// Sets the tile level of a layer, clamped to the supported range.
    pub fn set_layer_level(
        &mut self,
        view: usize,
        map_id: &str,
        layer_id: &str,
        level: u16,
    ) -> Result<(), CatalogError> {
        let level = level.min(MAX_LEVEL);
        self.update_layer(view, map_id, layer_id, |s| s.level = level)
    }

    pub fn set_tile_borders(
        &mut self,
        view: usize,
        map_id: &str,
        layer_id: &str,
        enabled: bool,
    ) -> Result<(), CatalogError> {
        self.update_layer(view, map_id, layer_id, |s| s.tile_borders = enabled)
    }

    fn update_layer<F>(
        &mut self,
        view: usize,
        map_id: &str,
        layer_id: &str,
        update: F,
    ) -> Result<(), CatalogError>
    where
        F: Fn(&mut LayerViewSettings),
    {
        if view >= self.num_views {
            return Err(CatalogError::UnknownView {
                view,
                num_views: self.num_views,
            });
        }
        let sync = self.view_sync;
        let layer = self
            .maps
            .get_mut(map_id)
            .and_then(|layers| layers.get_mut(layer_id))
            .ok_or_else(|| CatalogError::UnknownLayer {
                map_id: map_id.to_string(),
                layer_id: layer_id.to_string(),
            })?;
        if sync {
            layer.views.iter_mut().for_each(&update);
        } else {
            update(&mut layer.views[view]);
        }
        Ok(())
    }

    fn layers_mut(&mut self) -> impl Iterator<Item = &mut MapLayerInfo> {
        self.maps.values_mut().flat_map(|layers| layers.values_mut())
    }
}
