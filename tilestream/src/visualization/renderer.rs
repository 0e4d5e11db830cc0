//! Renderer seam.

use thiserror::Error;

use super::tile_visualization::VisualizationId;
use crate::cache::FeatureTile;

/// Error reported by a [`Renderer`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Render failed: {0}")]
pub struct RenderError(pub String);

/// What the renderer is asked to draw.
#[derive(Debug, Clone, Copy)]
pub struct RenderJob<'a> {
    pub id: &'a VisualizationId,
    pub tile: &'a FeatureTile,
    /// Full style rendering rather than a low-detail placeholder.
    pub high_detail: bool,
    pub show_border: bool,
}

/// External rendering backend.
pub trait Renderer {
    /// Draws (or redraws) a visualization.
    fn render(&mut self, job: RenderJob<'_>) -> Result<(), RenderError>;

    /// Releases everything drawn for a visualization.
    ///
    /// May be called for visualizations that were never rendered or are
    /// already destroyed.
    fn destroy(&mut self, id: &VisualizationId);

    /// Takes a tile that left the cache.
    ///
    /// Every visualization of the tile is destroyed before it is released.
    fn release(&mut self, _tile: FeatureTile) {}
}
