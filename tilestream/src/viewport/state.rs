//! Per-view state.

use super::{ResolvedTiles, Viewport};
use crate::coord::TileId;

/// One independently configured camera context.
///
/// All views share the tile cache. Each keeps its own viewport and the tile
/// sets last resolved for it.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    viewport: Viewport,
    tiles: ResolvedTiles,
}

impl ViewState {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            tiles: ResolvedTiles::default(),
        }
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn tiles(&self) -> &ResolvedTiles {
        &self.tiles
    }

    pub fn set_tiles(&mut self, tiles: ResolvedTiles) {
        self.tiles = tiles;
    }

    pub fn is_visible(&self, id: TileId) -> bool {
        self.tiles.is_visible(id)
    }

    pub fn is_high_detail(&self, id: TileId) -> bool {
        self.tiles.is_high_detail(id)
    }
}
