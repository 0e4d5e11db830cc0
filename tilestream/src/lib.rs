//! Tilestream - Streaming feature tiles for interactive map views
//!
//! This library keeps the feature tiles needed by one or more camera views
//! cached and visualized. Every update cycle works out which tiles each
//! view needs, evicts the rest and fetches what is missing from a tile
//! server in a single streamed request. Frames are parsed and handed to the
//! renderer in time-budgeted slices so the host stays responsive.
//!
//! # Modules
//!
//! - [`coord`] - Tile grid and [`TileId`](coord::TileId) encoding
//! - [`protocol`] - Frame codec and request bodies
//! - [`transport`] - Abortable HTTP fetches
//! - [`cache`] - Tile cache
//! - [`maps`] - Map and layer catalog
//! - [`viewport`] - Viewport to tile-set resolution
//! - [`visualization`] - Visualization bookkeeping and dispatch
//! - [`orchestrator`] - The [`TileEngine`] driving it all

pub mod cache;
pub mod config;
pub mod coord;
pub mod decoder;
pub mod error;
pub mod executor;
pub mod logging;
pub mod maps;
pub mod orchestrator;
pub mod protocol;
pub mod selection;
pub mod telemetry;
pub mod transport;
pub mod viewport;
pub mod visualization;

pub use config::EngineConfig;
pub use error::EngineError;
pub use orchestrator::{EngineEvent, TickReport, TileEngine};
