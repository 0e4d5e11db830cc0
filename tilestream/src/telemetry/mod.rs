//! Engine telemetry for diagnostics.
//!
//! Counters are plain integers: the engine is single-threaded and owns its
//! metrics. A [`TelemetrySnapshot`] combines them with aggregates over the
//! tile cache at one point in time.
//!
//! # Architecture
//!
//! ```text
//! Update cycle / parse / dispatch ───► EngineMetrics ───► TelemetrySnapshot ───► host UI
//!                                      (counters)        (+ cache aggregates)
//! ```
//!
//! # Example
//!
//! ```ignore
//! let snapshot = engine.telemetry();
//! println!("{}", snapshot);
//! println!("Mean parse time: {:.2} ms", snapshot.parse_ms_mean);
//! ```

mod metrics;
mod snapshot;

pub use metrics::EngineMetrics;
pub use snapshot::TelemetrySnapshot;
