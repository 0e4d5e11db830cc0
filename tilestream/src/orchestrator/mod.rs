//! Update cycle orchestration.
//!
//! [`TileEngine`] ties the pieces together. Every update cycle recomputes
//! what each view needs, evicts what nothing needs any more, and requests
//! what is missing in one batched call:
//!
//! ```text
//!                update()                            tick()
//!  viewports ──► resolve ──► evict ──► request ···► frames ──► parse ──► cache
//!                                        │                               │
//!                             abort previous fetch            visualizations ──► Renderer
//! ```
//!
//! Only the HTTP fetch runs on the tokio runtime. Parsing and rendering
//! happen in [`TileEngine::tick`], each within its own time budget, so the
//! host stays responsive.
//!
//! # Example
//!
//! ```ignore
//! let mut engine = TileEngine::new(config, backend, decoder, renderer)?;
//! engine.reload_sources().await?;
//! engine.set_viewport(0, viewport)?;
//! engine.run_until_idle().await;
//! ```

mod engine;
mod types;
mod visibility;

pub use engine::TileEngine;
pub use types::{EngineEvent, TickReport, EVENT_CHANNEL_CAPACITY};
