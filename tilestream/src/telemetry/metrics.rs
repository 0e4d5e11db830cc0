//! Engine counters.

use std::collections::BTreeMap;
use std::time::Duration;

use super::snapshot::TelemetrySnapshot;
use crate::cache::TileCache;

/// Counters updated by the engine as it works.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineMetrics {
    pub update_cycles: u64,
    pub fetches_started: u64,
    pub fetches_aborted: u64,
    pub fetches_failed: u64,
    pub tiles_requested: u64,
    pub frames_received: u64,
    pub frames_discarded: u64,
    pub bytes_received: u64,
    pub tiles_parsed: u64,
    pub tiles_rejected: u64,
    pub empty_tiles: u64,
    pub decode_failures: u64,
    pub tiles_evicted: u64,
    pub visualizations_rendered: u64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cycle_started(&mut self) {
        self.update_cycles += 1;
    }

    pub fn fetch_started(&mut self, num_tiles: usize) {
        self.fetches_started += 1;
        self.tiles_requested += num_tiles as u64;
    }

    pub fn fetch_aborted(&mut self) {
        self.fetches_aborted += 1;
    }

    /// Records frames dropped unparsed when a cycle was superseded.
    pub fn frames_discarded(&mut self, count: usize) {
        self.frames_discarded += count as u64;
    }

    pub fn fetch_failed(&mut self) {
        self.fetches_failed += 1;
    }

    pub fn frame_received(&mut self, frame_len: usize) {
        self.frames_received += 1;
        self.bytes_received += frame_len as u64;
    }

    pub fn tile_parsed(&mut self, num_features: u32) {
        self.tiles_parsed += 1;
        if num_features == 0 {
            self.empty_tiles += 1;
        }
    }

    pub fn tile_rejected(&mut self) {
        self.tiles_rejected += 1;
    }

    pub fn decode_failed(&mut self) {
        self.decode_failures += 1;
    }

    pub fn tiles_evicted(&mut self, count: usize) {
        self.tiles_evicted += count as u64;
    }

    pub fn visualizations_rendered(&mut self, count: usize) {
        self.visualizations_rendered += count as u64;
    }

    /// Combines the counters with aggregates over `cache`.
    pub fn snapshot(&self, cache: &TileCache, visualizations: usize, queued: usize) -> TelemetrySnapshot {
        let parse_times: Vec<Duration> = cache
            .values()
            .flat_map(|tile| tile.stats().parse_times.iter().copied())
            .collect();

        let mut render_times: BTreeMap<String, Vec<Duration>> = BTreeMap::new();
        for tile in cache.values() {
            for (style, samples) in &tile.stats().render_times {
                render_times
                    .entry(style.clone())
                    .or_default()
                    .extend(samples.iter().copied());
            }
        }

        TelemetrySnapshot {
            counters: self.clone(),
            cached_tiles: cache.len(),
            cached_bytes: cache.payload_bytes(),
            visualizations,
            queued_visualizations: queued,
            parse_ms_mean: mean_ms(&parse_times),
            parse_ms_max: max_ms(&parse_times),
            render_ms_mean: render_times
                .iter()
                .map(|(style, samples)| (style.clone(), mean_ms(samples)))
                .collect(),
        }
    }
}

fn mean_ms(samples: &[Duration]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let total: Duration = samples.iter().sum();
    total.as_secs_f64() * 1000.0 / samples.len() as f64
}

fn max_ms(samples: &[Duration]) -> f64 {
    samples
        .iter()
        .max()
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{FeatureTile, MapTileKey};
    use crate::coord::TileId;
    use bytes::Bytes;

    #[test]
    fn test_counters() {
        let mut metrics = EngineMetrics::new();
        metrics.fetch_started(12);
        metrics.fetch_aborted();
        metrics.frames_discarded(3);
        metrics.tile_parsed(0);
        metrics.tile_parsed(4);
        metrics.frame_received(100);
        assert_eq!(metrics.tiles_requested, 12);
        assert_eq!(metrics.fetches_aborted, 1);
        assert_eq!(metrics.frames_discarded, 3);
        assert_eq!(metrics.tiles_parsed, 2);
        assert_eq!(metrics.empty_tiles, 1);
        assert_eq!(metrics.bytes_received, 100);
    }

    #[test]
    fn test_snapshot_aggregates_cache() {
        let mut cache = TileCache::new();
        let mut tile = FeatureTile::new(
            MapTileKey::new("m", "l", TileId::from_raw(1)),
            Bytes::from_static(b"1234"),
            1,
        );
        tile.stats_mut().parse_times.push(Duration::from_millis(2));
        tile.stats_mut().parse_times.push(Duration::from_millis(4));
        tile.stats_mut().record_render("s", Duration::from_millis(6));
        cache.put(tile);

        let snapshot = EngineMetrics::new().snapshot(&cache, 1, 0);
        assert_eq!(snapshot.cached_tiles, 1);
        assert_eq!(snapshot.cached_bytes, 4);
        assert!((snapshot.parse_ms_mean - 3.0).abs() < 1e-9);
        assert!((snapshot.parse_ms_max - 4.0).abs() < 1e-9);
        assert!((snapshot.render_ms_mean["s"] - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_of_empty_cache() {
        let snapshot = EngineMetrics::new().snapshot(&TileCache::new(), 0, 0);
        assert_eq!(snapshot.parse_ms_mean, 0.0);
        assert!(snapshot.render_ms_mean.is_empty());
    }
}
