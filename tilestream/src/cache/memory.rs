//! In-memory tile cache shared by all views.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use super::key::MapTileKey;
use super::tile::FeatureTile;

/// Owned mapping from [`MapTileKey`] to live [`FeatureTile`]s.
///
/// Holds at most one entry per key. Replaced and removed tiles are disposed
/// and parked in a disposal list until [`drain_disposed`](Self::drain_disposed)
/// hands them to whoever releases their render resources.
///
/// The cache does not know about visualizations. Callers destroy any
/// visualization of a tile before or while removing it.
#[derive(Debug, Default)]
pub struct TileCache {
    entries: HashMap<MapTileKey, FeatureTile>,
    known_empty: HashSet<MapTileKey>,
    disposed: Vec<FeatureTile>,
}

impl TileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &MapTileKey) -> Option<&FeatureTile> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &MapTileKey) -> Option<&mut FeatureTile> {
        self.entries.get_mut(key)
    }

    pub fn contains(&self, key: &MapTileKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Inserts a tile, disposing any previous entry with the same key.
    ///
    /// # Returns
    ///
    /// `true` if an entry was replaced.
    pub fn put(&mut self, tile: FeatureTile) -> bool {
        match self.entries.insert(tile.key().clone(), tile) {
            Some(previous) => {
                trace!(key = %previous.key(), "Replacing cached tile");
                self.dispose(previous);
                true
            }
            None => false,
        }
    }

    /// Disposes and removes the entry for `key`.
    ///
    /// # Returns
    ///
    /// `true` if an entry existed.
    pub fn remove(&mut self, key: &MapTileKey) -> bool {
        match self.entries.remove(key) {
            Some(tile) => {
                self.dispose(tile);
                true
            }
            None => false,
        }
    }

    /// Iterates all live entries.
    pub fn values(&self) -> impl Iterator<Item = &FeatureTile> {
        self.entries.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &MapTileKey> {
        self.entries.keys()
    }

    /// Disposes every entry for which `keep` returns false.
    ///
    /// # Returns
    ///
    /// Keys of the removed entries.
    pub fn retain<F>(&mut self, mut keep: F) -> Vec<MapTileKey>
    where
        F: FnMut(&FeatureTile) -> bool,
    {
        let evicted: Vec<MapTileKey> = self
            .entries
            .values()
            .filter(|tile| !keep(tile))
            .map(|tile| tile.key().clone())
            .collect();
        for key in &evicted {
            self.remove(key);
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total size of all live payloads.
    pub fn payload_bytes(&self) -> usize {
        self.entries.values().map(|t| t.stats().payload_bytes).sum()
    }

    /// Remembers that the server answered `key` with an empty tile.
    pub fn mark_empty(&mut self, key: MapTileKey) {
        self.known_empty.insert(key);
    }

    pub fn is_known_empty(&self, key: &MapTileKey) -> bool {
        self.known_empty.contains(key)
    }

    /// Forgets all empty-tile answers, e.g. after the map list changed.
    pub fn clear_known_empty(&mut self) {
        self.known_empty.clear();
    }

    /// Takes the tiles disposed since the last call.
    pub fn drain_disposed(&mut self) -> Vec<FeatureTile> {
        std::mem::take(&mut self.disposed)
    }

    /// Number of disposed tiles waiting to be drained.
    pub fn num_disposed(&self) -> usize {
        self.disposed.len()
    }

    /// Disposes every entry.
    pub fn clear(&mut self) {
        let tiles: Vec<FeatureTile> = self.entries.drain().map(|(_, tile)| tile).collect();
        for tile in tiles {
            self.dispose(tile);
        }
    }

    fn dispose(&mut self, mut tile: FeatureTile) {
        tile.dispose();
        self.disposed.push(tile);
    }
}
