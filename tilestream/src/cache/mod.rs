//! Tile cache.
//!
//! One [`TileCache`] is shared by every view. Entries are keyed by the value
//! type [`MapTileKey`] and keep the tile payload serialized, which bounds
//! memory to roughly the bytes received.
//!
//! # Lifecycle
//!
//! ```text
//! parse ──► FeatureTile (Live) ──► put ──► cache
//!                                           │ evict / replace
//!                                           ▼
//!                               FeatureTile (Disposed) ──► drain_disposed
//! ```

mod key;
mod memory;
mod tile;

pub use key::{KeyParseError, MapTileKey};
pub use memory::TileCache;
pub use tile::{FeatureTile, TileState, TileStats};
