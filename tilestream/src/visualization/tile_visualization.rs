//! Visualization state of one tile under one style in one view.

use std::fmt;

use crate::cache::{FeatureTile, MapTileKey};

/// Identifies a visualization: view, style and tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VisualizationId {
    pub view: usize,
    pub style_id: String,
    pub tile_key: MapTileKey,
}

impl VisualizationId {
    pub fn new(view: usize, style_id: impl Into<String>, tile_key: MapTileKey) -> Self {
        Self {
            view,
            style_id: style_id.into(),
            tile_key,
        }
    }
}

impl fmt::Display for VisualizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.tile_key, self.style_id, self.view)
    }
}

/// What was last handed to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderedState {
    pub high_detail: bool,
    pub border: bool,
}

/// Pairing of a cached tile and a style within one view.
///
/// A visualization is dirty when it was never rendered or when what was
/// rendered differs from what is now wanted.
#[derive(Debug, Clone)]
pub struct TileVisualization {
    id: VisualizationId,
    num_features: u32,
    prevent_culling: bool,
    high_detail: bool,
    show_border: bool,
    rendered: Option<RenderedState>,
    pub(super) queued: bool,
}

impl TileVisualization {
    pub fn new(id: VisualizationId, tile: &FeatureTile, high_detail: bool, show_border: bool) -> Self {
        Self {
            id,
            num_features: tile.num_features(),
            prevent_culling: tile.prevent_culling(),
            high_detail: high_detail || tile.prevent_culling(),
            show_border,
            rendered: None,
            queued: false,
        }
    }

    pub fn id(&self) -> &VisualizationId {
        &self.id
    }

    pub fn tile_key(&self) -> &MapTileKey {
        &self.id.tile_key
    }

    /// Whether the tile counts as high detail in its view.
    pub fn is_high_detail(&self) -> bool {
        self.high_detail
    }

    pub fn set_high_detail(&mut self, high_detail: bool) {
        self.high_detail = high_detail || self.prevent_culling;
    }

    pub fn show_border(&self) -> bool {
        self.show_border
    }

    pub fn set_show_border(&mut self, show_border: bool) {
        self.show_border = show_border;
    }

    /// Whether the next render draws full detail. Empty tiles stay low
    /// detail unless pinned.
    pub fn wants_high_detail(&self) -> bool {
        self.high_detail && (self.num_features > 0 || self.prevent_culling)
    }

    pub fn rendered(&self) -> Option<RenderedState> {
        self.rendered
    }

    pub fn is_dirty(&self) -> bool {
        match self.rendered {
            None => true,
            Some(rendered) => {
                rendered.high_detail != self.wants_high_detail()
                    || rendered.border != self.show_border
            }
        }
    }

    pub fn is_queued(&self) -> bool {
        self.queued
    }

    pub(super) fn mark_rendered(&mut self) {
        self.rendered = Some(RenderedState {
            high_detail: self.wants_high_detail(),
            border: self.show_border,
        });
    }
}
