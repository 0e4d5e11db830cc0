//! Orchestrator types.

use std::time::Duration;

use crate::cache::MapTileKey;
use crate::protocol::Frame;

/// Capacity of the engine event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Notifications broadcast by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A tile carrying attribution text for this map was inserted.
    LegalInfoUpdated { map_id: String },
    /// A tile entered the cache.
    TileLoaded(MapTileKey),
    /// A tile was evicted because no view needs it.
    TileEvicted(MapTileKey),
    /// The map catalog was reloaded.
    MapsUpdated,
}

/// What one [`TileEngine::tick`](super::TileEngine::tick) did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    /// Frames taken from the pending fetch.
    pub frames_received: usize,
    /// Frames parsed from the queue.
    pub frames_parsed: usize,
    pub visualizations_rendered: usize,
    /// Frames still queued.
    pub parse_backlog: usize,
    /// Visualizations still queued.
    pub visualization_backlog: usize,
    /// Whether a fetch is still running.
    pub fetch_active: bool,
    /// When to tick next.
    pub next_delay: Duration,
}

impl TickReport {
    /// Whether there is nothing left to do until the next update.
    pub fn is_idle(&self) -> bool {
        !self.fetch_active && self.parse_backlog == 0 && self.visualization_backlog == 0
    }
}

/// A received frame waiting to be parsed, tagged with its fetch.
#[derive(Debug)]
pub(super) struct ParseTask {
    pub generation: u64,
    pub frame: Frame,
}
