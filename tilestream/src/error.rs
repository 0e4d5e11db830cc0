//! Top-level engine errors.

use thiserror::Error;

use crate::config::ConfigError;
use crate::decoder::DecodeError;
use crate::maps::CatalogError;
use crate::transport::TransportError;

/// Errors returned by [`TileEngine`](crate::orchestrator::TileEngine)
/// operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The engine was created outside a tokio runtime.
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),

    #[error("View {view} out of range ({num_views} views)")]
    UnknownView { view: usize, num_views: usize },

    #[error("Unknown style: {0}")]
    UnknownStyle(String),
}
