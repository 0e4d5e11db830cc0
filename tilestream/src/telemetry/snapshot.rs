//! Point-in-time engine statistics.

use std::collections::BTreeMap;
use std::fmt;

use super::metrics::EngineMetrics;

/// Counters plus cache aggregates, taken at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    pub counters: EngineMetrics,
    pub cached_tiles: usize,
    pub cached_bytes: usize,
    pub visualizations: usize,
    pub queued_visualizations: usize,
    pub parse_ms_mean: f64,
    pub parse_ms_max: f64,
    /// Mean render time per style.
    pub render_ms_mean: BTreeMap<String, f64>,
}

impl fmt::Display for TelemetrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tiles ({:.1} KiB), {} visualizations ({} queued), parse {:.2}/{:.2} ms mean/max, {} fetches ({} aborted, {} failed)",
            self.cached_tiles,
            self.cached_bytes as f64 / 1024.0,
            self.visualizations,
            self.queued_visualizations,
            self.parse_ms_mean,
            self.parse_ms_max,
            self.counters.fetches_started,
            self.counters.fetches_aborted,
            self.counters.fetches_failed,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let snapshot = TelemetrySnapshot {
            counters: EngineMetrics::default(),
            cached_tiles: 2,
            cached_bytes: 2048,
            visualizations: 3,
            queued_visualizations: 1,
            parse_ms_mean: 1.5,
            parse_ms_max: 2.0,
            render_ms_mean: BTreeMap::new(),
        };
        assert_eq!(
            snapshot.to_string(),
            "2 tiles (2.0 KiB), 3 visualizations (1 queued), parse 1.50/2.00 ms mean/max, 0 fetches (0 aborted, 0 failed)"
        );
    }
}
