//! JSON body of a batched tile request.
//!
//! ```text
//! {
//!   "requests": [{"mapId": "m1", "layerId": "layerA", "tileIds": [42]}],
//!   "stringPoolOffsets": [0]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::coord::TileId;

/// Tiles wanted from one map layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerTileRequest {
    pub map_id: String,
    pub layer_id: String,
    pub tile_ids: Vec<TileId>,
}

impl LayerTileRequest {
    pub fn new(map_id: impl Into<String>, layer_id: impl Into<String>, tile_ids: Vec<TileId>) -> Self {
        Self {
            map_id: map_id.into(),
            layer_id: layer_id.into(),
            tile_ids,
        }
    }
}

/// Body posted to the tile endpoint.
///
/// `string_pool_offsets` tells the server how much of each field dictionary
/// the client already holds, so only the missing entries are streamed back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileRequestBody {
    pub requests: Vec<LayerTileRequest>,
    pub string_pool_offsets: Vec<u64>,
}

impl TileRequestBody {
    /// Whether the body asks for no tiles at all.
    pub fn is_empty(&self) -> bool {
        self.requests.iter().all(|r| r.tile_ids.is_empty())
    }

    /// Total number of tile ids requested.
    pub fn num_tiles(&self) -> usize {
        self.requests.iter().map(|r| r.tile_ids.len()).sum()
    }
}
