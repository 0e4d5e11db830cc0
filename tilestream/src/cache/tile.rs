//! Cached feature tile entries.

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;

use super::key::MapTileKey;
use crate::coord::TileId;
use crate::decoder::TileLayerMetadata;

/// Lifecycle state of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileState {
    /// The tile holds its serialized payload.
    Live(Bytes),
    /// The tile was evicted or replaced; its payload is released.
    Disposed,
}

/// Per-tile statistics shown in diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileStats {
    /// Size of the serialized payload.
    pub payload_bytes: usize,
    /// Time spent decoding the tile, one sample per parse.
    pub parse_times: Vec<Duration>,
    /// Time spent rendering the tile, per style.
    pub render_times: BTreeMap<String, Vec<Duration>>,
    /// Decoder-reported numbers.
    pub scalars: BTreeMap<String, f64>,
}

impl TileStats {
    pub fn record_render(&mut self, style_id: &str, elapsed: Duration) {
        self.render_times
            .entry(style_id.to_string())
            .or_default()
            .push(elapsed);
    }
}

/// One tile of one map layer, kept as serialized bytes.
///
/// Tiles are created live. Only the cache disposes them, when they are
/// evicted or replaced by a fresher instance with the same key.
#[derive(Debug, Clone)]
pub struct FeatureTile {
    key: MapTileKey,
    num_features: u32,
    legal_info: Option<String>,
    prevent_culling: bool,
    state: TileState,
    stats: TileStats,
}

impl FeatureTile {
    /// Creates a live tile.
    pub fn new(key: MapTileKey, payload: Bytes, num_features: u32) -> Self {
        let stats = TileStats {
            payload_bytes: payload.len(),
            ..TileStats::default()
        };
        Self {
            key,
            num_features,
            legal_info: None,
            prevent_culling: false,
            state: TileState::Live(payload),
            stats,
        }
    }

    /// Creates a live tile from decoded metadata.
    pub fn from_metadata(metadata: TileLayerMetadata, payload: Bytes) -> Self {
        let key = metadata.key();
        let mut tile = Self::new(key, payload, metadata.num_features);
        tile.legal_info = metadata.legal_info.filter(|info| !info.is_empty());
        tile.stats.scalars = metadata.scalar_stats;
        tile
    }

    pub fn with_legal_info(mut self, legal_info: impl Into<String>) -> Self {
        self.legal_info = Some(legal_info.into());
        self
    }

    /// Exempts the tile from visibility-based eviction.
    pub fn with_prevent_culling(mut self, prevent_culling: bool) -> Self {
        self.prevent_culling = prevent_culling;
        self
    }

    pub fn key(&self) -> &MapTileKey {
        &self.key
    }

    pub fn map_id(&self) -> &str {
        &self.key.map_id
    }

    pub fn layer_id(&self) -> &str {
        &self.key.layer_id
    }

    pub fn tile_id(&self) -> TileId {
        self.key.tile_id
    }

    pub fn num_features(&self) -> u32 {
        self.num_features
    }

    pub fn legal_info(&self) -> Option<&str> {
        self.legal_info.as_deref()
    }

    pub fn prevent_culling(&self) -> bool {
        self.prevent_culling
    }

    pub fn state(&self) -> &TileState {
        &self.state
    }

    /// The serialized payload, `None` once disposed.
    pub fn payload(&self) -> Option<&Bytes> {
        match &self.state {
            TileState::Live(payload) => Some(payload),
            TileState::Disposed => None,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.state == TileState::Disposed
    }

    pub fn stats(&self) -> &TileStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut TileStats {
        &mut self.stats
    }

    pub(crate) fn dispose(&mut self) {
        self.state = TileState::Disposed;
    }
}
