//! Map and layer catalog.
//!
//! The catalog is the engine's snapshot of which maps and layers exist and how
//! each view shows them (visibility, tile level, tile borders). It is filled
//! from the server's `/sources` response and changed by the host through the
//! setters on [`MapCatalog`].

mod catalog;
mod sources;

use thiserror::Error;

pub use catalog::{LayerViewSettings, MapCatalog, MapLayerInfo, DEFAULT_LAYER_LEVEL};
pub use sources::{parse_sources, Coverage, LayerKind, LayerSourceInfo, MapSourceInfo};

/// Errors raised by catalog updates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// The `/sources` document could not be parsed.
    #[error("Invalid sources document: {0}")]
    InvalidSources(String),

    #[error("Unknown map: {0}")]
    UnknownMap(String),

    #[error("Unknown layer {map_id}/{layer_id}")]
    UnknownLayer { map_id: String, layer_id: String },

    #[error("Unknown view {view} (have {num_views})")]
    UnknownView { view: usize, num_views: usize },
}
