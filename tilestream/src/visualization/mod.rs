//! Visualization dispatch.
//!
//! For every view, style and cached tile relevant to the view, the
//! [`VisualizationDispatcher`] keeps a [`TileVisualization`] recording the
//! detail level the tile should be drawn at and what was last drawn. When the
//! two disagree the visualization is dirty and goes into its view's queue.
//!
//! ```text
//!  update cycle ──► refresh_view ──► dirty? ──► queue (once) ──► dispatch ──► Renderer
//!  tile parsed  ──► add ─────────────┘
//!  evict/style  ──► remove_tile / remove_style ─────────────────────────────► destroy
//! ```

mod dispatcher;
mod renderer;
mod style;
mod tile_visualization;

pub use dispatcher::{DesiredState, VisualizationDispatcher};
pub use renderer::{RenderError, RenderJob, Renderer};
pub use style::{StyleRegistry, StyleSheet};
pub use tile_visualization::{RenderedState, TileVisualization, VisualizationId};

#[cfg(test)]
pub(crate) use renderer::tests::RecordingRenderer;
