//! Wire format of the `/sources` endpoint.
//!
//! ```text
//! [
//!   {
//!     "mapId": "island",
//!     "addOn": false,
//!     "layers": {
//!       "roads": {"type": "Features", "coverage": [1, {"min": 2, "max": 9}], "zoomLevels": [9, 13]}
//!     }
//!   }
//! ]
//! ```
//!
//! Attributes not needed for tile streaming are ignored.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::CatalogError;
use crate::coord::TileId;

/// One map offered by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapSourceInfo {
    pub map_id: String,
    #[serde(default)]
    pub layers: BTreeMap<String, LayerSourceInfo>,
    /// Add-on maps only augment other maps and are never streamed directly.
    #[serde(default)]
    pub add_on: bool,
}

/// One layer of a map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerSourceInfo {
    #[serde(rename = "type", default)]
    pub kind: LayerKind,
    #[serde(default)]
    pub coverage: Vec<Coverage>,
    #[serde(default)]
    pub zoom_levels: Vec<u16>,
}

/// Kind of data a layer serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LayerKind {
    /// Feature tiles, streamed by the engine.
    #[default]
    Features,
    /// Raw source data, fetched on demand by inspection tools only.
    SourceData,
    /// Any kind this client does not handle.
    #[serde(other)]
    Other,
}

/// A coverage entry: a single tile or an inclusive tile id range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Coverage {
    Tile(TileId),
    Range { min: TileId, max: TileId },
}

impl Coverage {
    /// A representative tile, e.g. for "zoom to layer".
    pub fn first_tile(&self) -> TileId {
        match self {
            Coverage::Tile(id) => *id,
            Coverage::Range { min, .. } => *min,
        }
    }
}

/// Parses the `/sources` response body.
pub fn parse_sources(json: &[u8]) -> Result<Vec<MapSourceInfo>, CatalogError> {
    serde_json::from_slice(json).map_err(|e| CatalogError::InvalidSources(e.to_string()))
}
