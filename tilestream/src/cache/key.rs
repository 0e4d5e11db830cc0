//! Composite cache key of a feature tile.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::coord::TileId;

const KEY_PREFIX: &str = "Features";

/// Error parsing a [`MapTileKey`] from its string form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid tile key '{0}': expected Features:<map>:<layer>:<tile>")]
pub struct KeyParseError(pub String);

/// Identifies one tile of one map layer.
///
/// The string form is `Features:<map>:<layer>:<tile>`, e.g.
/// `Features:island:roads:4294967297`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MapTileKey {
    pub map_id: String,
    pub layer_id: String,
    pub tile_id: TileId,
}

impl MapTileKey {
    pub fn new(map_id: impl Into<String>, layer_id: impl Into<String>, tile_id: TileId) -> Self {
        Self {
            map_id: map_id.into(),
            layer_id: layer_id.into(),
            tile_id,
        }
    }

    /// Whether the key belongs to the given map layer.
    pub fn is_in_layer(&self, map_id: &str, layer_id: &str) -> bool {
        self.map_id == map_id && self.layer_id == layer_id
    }
}

impl fmt::Display for MapTileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            KEY_PREFIX, self.map_id, self.layer_id, self.tile_id
        )
    }
}

impl FromStr for MapTileKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || KeyParseError(s.to_string());
        let rest = s
            .strip_prefix(KEY_PREFIX)
            .and_then(|r| r.strip_prefix(':'))
            .ok_or_else(err)?;
        // Map ids may contain ':'; the layer and tile parts never do
        let (rest, tile) = rest.rsplit_once(':').ok_or_else(err)?;
        let (map_id, layer_id) = rest.rsplit_once(':').ok_or_else(err)?;
        if map_id.is_empty() || layer_id.is_empty() {
            return Err(err());
        }
        let tile_id = tile.parse::<u64>().map_err(|_| err())?;
        Ok(Self::new(map_id, layer_id, TileId::from_raw(tile_id)))
    }
}
