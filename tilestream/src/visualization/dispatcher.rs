//! Per-view visualization bookkeeping and time-budgeted dispatch.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use super::renderer::{RenderJob, Renderer};
use super::tile_visualization::{TileVisualization, VisualizationId};
use crate::cache::{FeatureTile, MapTileKey, TileCache};
use crate::executor::{Deadline, DrainReport};

/// Desired flags of a visualization after a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesiredState {
    pub high_detail: bool,
    pub show_border: bool,
}

/// Visualizations and dispatch queue of one view.
#[derive(Debug, Default)]
struct ViewVisualizations {
    by_style: BTreeMap<String, HashMap<MapTileKey, TileVisualization>>,
    queue: VecDeque<(String, MapTileKey)>,
}

impl ViewVisualizations {
    fn get_mut(&mut self, style_id: &str, key: &MapTileKey) -> Option<&mut TileVisualization> {
        self.by_style.get_mut(style_id)?.get_mut(key)
    }

    fn enqueue_if_dirty(&mut self, style_id: &str, key: &MapTileKey) {
        let Some(vis) = self.by_style.get_mut(style_id).and_then(|m| m.get_mut(key)) else {
            return;
        };
        if !vis.queued && vis.is_dirty() {
            vis.queued = true;
            self.queue.push_back((style_id.to_string(), key.clone()));
        }
    }

    fn len(&self) -> usize {
        self.by_style.values().map(HashMap::len).sum()
    }
}

/// Tracks, per view and style, which cached tiles are visualized and which
/// of those need to be (re)rendered.
///
/// Dirty visualizations sit in their view's queue at most once. The queues
/// are drained round-robin across views within a time budget.
#[derive(Debug)]
pub struct VisualizationDispatcher {
    views: Vec<ViewVisualizations>,
    budget: Duration,
    next_view: usize,
}

impl VisualizationDispatcher {
    pub fn new(num_views: usize, budget: Duration) -> Self {
        Self {
            views: (0..num_views.max(1))
                .map(|_| ViewVisualizations::default())
                .collect(),
            budget,
            next_view: 0,
        }
    }

    pub fn num_views(&self) -> usize {
        self.views.len()
    }

    /// Changes the number of views, destroying the visualizations of views
    /// that go away.
    pub fn set_num_views(&mut self, num_views: usize, renderer: &mut dyn Renderer) {
        let num_views = num_views.max(1);
        while self.views.len() > num_views {
            if let Some(view) = self.views.pop() {
                for vis in view.by_style.into_values().flat_map(HashMap::into_values) {
                    renderer.destroy(vis.id());
                }
            }
        }
        self.views
            .resize_with(num_views, ViewVisualizations::default);
        self.next_view %= num_views;
    }

    /// Visualizes `tile` under `style_id` in `view`.
    ///
    /// An existing visualization gets the new flags instead. Either way it is
    /// queued if it needs rendering.
    ///
    /// # Returns
    ///
    /// `true` if a visualization was created.
    pub fn add(
        &mut self,
        view: usize,
        style_id: &str,
        tile: &FeatureTile,
        desired: DesiredState,
    ) -> bool {
        let Some(state) = self.views.get_mut(view) else {
            return false;
        };
        let key = tile.key();
        let created = match state.get_mut(style_id, key) {
            Some(vis) => {
                vis.set_high_detail(desired.high_detail);
                vis.set_show_border(desired.show_border);
                false
            }
            None => {
                let id = VisualizationId::new(view, style_id, key.clone());
                let vis = TileVisualization::new(id, tile, desired.high_detail, desired.show_border);
                state
                    .by_style
                    .entry(style_id.to_string())
                    .or_default()
                    .insert(key.clone(), vis);
                true
            }
        };
        state.enqueue_if_dirty(style_id, key);
        created
    }

    pub fn get(&self, view: usize, style_id: &str, key: &MapTileKey) -> Option<&TileVisualization> {
        self.views.get(view)?.by_style.get(style_id)?.get(key)
    }

    pub fn contains(&self, view: usize, style_id: &str, key: &MapTileKey) -> bool {
        self.get(view, style_id, key).is_some()
    }

    /// Destroys every visualization of a tile, in every view and style.
    ///
    /// # Returns
    ///
    /// Number of visualizations destroyed.
    pub fn remove_tile(&mut self, key: &MapTileKey, renderer: &mut dyn Renderer) -> usize {
        let mut destroyed = 0;
        for state in &mut self.views {
            for visualizations in state.by_style.values_mut() {
                if let Some(vis) = visualizations.remove(key) {
                    renderer.destroy(vis.id());
                    destroyed += 1;
                }
            }
            state.queue.retain(|(_, queued)| queued != key);
        }
        destroyed
    }

    /// Destroys every visualization of a style, in every view.
    pub fn remove_style(&mut self, style_id: &str, renderer: &mut dyn Renderer) -> usize {
        let mut destroyed = 0;
        for state in &mut self.views {
            if let Some(visualizations) = state.by_style.remove(style_id) {
                for vis in visualizations.into_values() {
                    renderer.destroy(vis.id());
                    destroyed += 1;
                }
            }
            state.queue.retain(|(style, _)| style != style_id);
        }
        destroyed
    }

    /// Re-evaluates every visualization of `view` and rebuilds its queue.
    ///
    /// `desired` returns the wanted flags, or `None` to destroy the
    /// visualization (tile no longer needed, style gone).
    ///
    /// # Returns
    ///
    /// Number of visualizations destroyed.
    pub fn refresh_view<F>(&mut self, view: usize, mut desired: F, renderer: &mut dyn Renderer) -> usize
    where
        F: FnMut(&str, &TileVisualization) -> Option<DesiredState>,
    {
        let Some(state) = self.views.get_mut(view) else {
            return 0;
        };
        let mut destroyed = 0;
        for (style_id, visualizations) in state.by_style.iter_mut() {
            visualizations.retain(|_, vis| match desired(style_id.as_str(), vis) {
                Some(wanted) => {
                    vis.set_high_detail(wanted.high_detail);
                    vis.set_show_border(wanted.show_border);
                    true
                }
                None => {
                    renderer.destroy(vis.id());
                    destroyed += 1;
                    false
                }
            });
        }
        state.by_style.retain(|_, visualizations| !visualizations.is_empty());

        state.queue.clear();
        let mut dirty: Vec<(String, MapTileKey)> = Vec::new();
        for (style_id, visualizations) in state.by_style.iter_mut() {
            for (key, vis) in visualizations.iter_mut() {
                vis.queued = false;
                if vis.is_dirty() {
                    dirty.push((style_id.clone(), key.clone()));
                }
            }
        }
        dirty.sort();
        for (style_id, key) in dirty {
            state.enqueue_if_dirty(&style_id, &key);
        }
        destroyed
    }

    /// Hands queued visualizations to the renderer until all queues are
    /// empty or the budget is spent. Views take turns.
    pub fn dispatch(&mut self, cache: &mut TileCache, renderer: &mut dyn Renderer) -> DrainReport {
        let deadline = Deadline::start(self.budget);
        let num_views = self.views.len();
        let mut processed = 0;

        while !deadline.expired() {
            let Some(view) = (0..num_views)
                .map(|offset| (self.next_view + offset) % num_views)
                .find(|&v| !self.views[v].queue.is_empty())
            else {
                break;
            };
            self.next_view = (view + 1) % num_views;

            let state = &mut self.views[view];
            let Some((style_id, key)) = state.queue.pop_front() else {
                continue;
            };
            let Some(vis) = state.get_mut(&style_id, &key) else {
                continue;
            };
            vis.queued = false;
            if !vis.is_dirty() {
                continue;
            }
            let Some(tile) = cache.get(&key) else {
                trace!(key = %key, "Skipping visualization of uncached tile");
                continue;
            };

            let started = Instant::now();
            let job = RenderJob {
                id: vis.id(),
                tile,
                high_detail: vis.wants_high_detail(),
                show_border: vis.show_border(),
            };
            if let Err(err) = renderer.render(job) {
                warn!(visualization = %vis.id(), error = %err, "Render failed");
            }
            vis.mark_rendered();
            let elapsed = started.elapsed();
            if let Some(tile) = cache.get_mut(&key) {
                tile.stats_mut().record_render(&style_id, elapsed);
            }
            processed += 1;
        }

        DrainReport {
            processed,
            remaining: self.queued(),
        }
    }

    /// Number of queued visualizations across all views.
    pub fn queued(&self) -> usize {
        self.views.iter().map(|v| v.queue.len()).sum()
    }

    /// Queued visualizations of `view`, in dispatch order.
    pub fn queued_in(&self, view: usize) -> Vec<VisualizationId> {
        self.views
            .get(view)
            .map(|state| {
                state
                    .queue
                    .iter()
                    .map(|(style_id, key)| VisualizationId::new(view, style_id.clone(), key.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Iterates the visualizations of `view`.
    pub fn visualizations(&self, view: usize) -> impl Iterator<Item = &TileVisualization> {
        self.views
            .get(view)
            .into_iter()
            .flat_map(|state| state.by_style.values().flat_map(HashMap::values))
    }

    /// Number of visualizations across all views.
    pub fn len(&self) -> usize {
        self.views.iter().map(ViewVisualizations::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::TileId;
    use crate::visualization::renderer::tests::RecordingRenderer;
    use bytes::Bytes;

    const BUDGET: Duration = Duration::from_secs(10);

    fn tile(id: u64) -> FeatureTile {
        FeatureTile::new(
            MapTileKey::new("m1", "l1", TileId::from_raw(id)),
            Bytes::from_static(b"payload"),
            5,
        )
    }

    fn low() -> DesiredState {
        DesiredState {
            high_detail: false,
            show_border: false,
        }
    }

    fn high() -> DesiredState {
        DesiredState {
            high_detail: true,
            show_border: false,
        }
    }

    fn setup(ids: &[u64]) -> (TileCache, VisualizationDispatcher, RecordingRenderer) {
        let mut cache = TileCache::new();
        for &id in ids {
            cache.put(tile(id));
        }
        (cache, VisualizationDispatcher::new(1, BUDGET), RecordingRenderer::default())
    }

    #[test]
    fn test_add_queues_new_visualization() {
        let (mut cache, mut dispatcher, mut renderer) = setup(&[1]);
        let t = tile(1);
        assert!(dispatcher.add(0, "default", &t, low()));
        assert!(!dispatcher.add(0, "default", &t, low()));
        assert_eq!(dispatcher.queued(), 1);

        let report = dispatcher.dispatch(&mut cache, &mut renderer);
        assert_eq!(report.processed, 1);
        assert_eq!(report.remaining, 0);
        assert_eq!(renderer.rendered.len(), 1);
        assert!(!renderer.rendered[0].1);
        assert_eq!(cache.get(t.key()).unwrap().stats().render_times["default"].len(), 1);
    }

    #[test]
    fn test_dirty_queued_once_per_state_change() {
        let (mut cache, mut dispatcher, mut renderer) = setup(&[1]);
        let t = tile(1);
        dispatcher.add(0, "default", &t, low());
        dispatcher.dispatch(&mut cache, &mut renderer);
        assert_eq!(dispatcher.queued(), 0);

        // Desired state flips to high detail: queued exactly once
        dispatcher.refresh_view(0, |_, _| Some(high()), &mut renderer);
        dispatcher.refresh_view(0, |_, _| Some(high()), &mut renderer);
        dispatcher.add(0, "default", &t, high());
        let vis = dispatcher.get(0, "default", t.key()).unwrap();
        assert!(vis.is_dirty());
        assert_eq!(dispatcher.queued_in(0).len(), 1);

        dispatcher.dispatch(&mut cache, &mut renderer);
        assert!(renderer.rendered.last().unwrap().1);
        assert_eq!(dispatcher.queued(), 0);

        // Unchanged state: nothing queued
        dispatcher.refresh_view(0, |_, _| Some(high()), &mut renderer);
        assert_eq!(dispatcher.queued(), 0);

        // Next change queues it again
        dispatcher.refresh_view(0, |_, _| Some(low()), &mut renderer);
        assert_eq!(dispatcher.queued(), 1);
    }

    #[test]
    fn test_flip_back_before_dispatch_skips_render() {
        let (mut cache, mut dispatcher, mut renderer) = setup(&[1]);
        let t = tile(1);
        dispatcher.add(0, "default", &t, low());
        dispatcher.dispatch(&mut cache, &mut renderer);

        dispatcher.add(0, "default", &t, high());
        dispatcher.add(0, "default", &t, low());
        let report = dispatcher.dispatch(&mut cache, &mut renderer);
        assert_eq!(report.processed, 0);
        assert_eq!(renderer.rendered.len(), 1);
    }

    #[test]
    fn test_refresh_destroys_unwanted() {
        let (_, mut dispatcher, mut renderer) = setup(&[]);
        dispatcher.add(0, "default", &tile(1), low());
        dispatcher.add(0, "default", &tile(2), low());

        let destroyed = dispatcher.refresh_view(
            0,
            |_, vis| (vis.tile_key().tile_id == TileId::from_raw(2)).then(low),
            &mut renderer,
        );
        assert_eq!(destroyed, 1);
        assert_eq!(dispatcher.len(), 1);
        assert_eq!(renderer.destroyed.len(), 1);
        assert_eq!(dispatcher.queued(), 1);
    }

    #[test]
    fn test_remove_tile_across_views_and_styles() {
        let (_, mut dispatcher, mut renderer) = setup(&[]);
        dispatcher.set_num_views(2, &mut renderer);
        let t = tile(1);
        dispatcher.add(0, "a", &t, low());
        dispatcher.add(0, "b", &t, low());
        dispatcher.add(1, "a", &t, low());
        dispatcher.add(1, "a", &tile(2), low());

        assert_eq!(dispatcher.remove_tile(t.key(), &mut renderer), 3);
        assert_eq!(dispatcher.len(), 1);
        assert_eq!(dispatcher.queued(), 1);
    }

    #[test]
    fn test_remove_style() {
        let (_, mut dispatcher, mut renderer) = setup(&[]);
        dispatcher.add(0, "a", &tile(1), low());
        dispatcher.add(0, "b", &tile(1), low());
        assert_eq!(dispatcher.remove_style("a", &mut renderer), 1);
        assert!(!dispatcher.contains(0, "a", tile(1).key()));
        assert!(dispatcher.contains(0, "b", tile(1).key()));
        assert_eq!(dispatcher.queued(), 1);
    }

    #[test]
    fn test_round_robin_across_views() {
        let (mut cache, mut dispatcher, mut renderer) = setup(&[1, 2, 3, 4]);
        dispatcher.set_num_views(2, &mut renderer);
        for id in [1, 2] {
            dispatcher.add(0, "s", &tile(id), low());
        }
        for id in [3, 4] {
            dispatcher.add(1, "s", &tile(id), low());
        }
        dispatcher.dispatch(&mut cache, &mut renderer);
        let views: Vec<usize> = renderer.rendered.iter().map(|(id, _, _)| id.view).collect();
        assert_eq!(views, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_budget_limits_dispatch() {
        let (mut cache, _, _) = setup(&[1, 2, 3]);
        let mut dispatcher = VisualizationDispatcher::new(1, Duration::from_millis(1));
        let mut renderer = RecordingRenderer {
            delay: Duration::from_millis(5),
            ..RecordingRenderer::default()
        };
        for id in [1, 2, 3] {
            dispatcher.add(0, "s", &tile(id), low());
        }
        let report = dispatcher.dispatch(&mut cache, &mut renderer);
        assert_eq!(report.processed, 1);
        assert_eq!(report.remaining, 2);
    }

    #[test]
    fn test_shrinking_views_destroys_their_visualizations() {
        let (_, mut dispatcher, mut renderer) = setup(&[]);
        dispatcher.set_num_views(2, &mut renderer);
        dispatcher.add(1, "s", &tile(1), low());
        dispatcher.set_num_views(1, &mut renderer);
        assert_eq!(renderer.destroyed.len(), 1);
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn test_render_failure_is_not_retried() {
        let (mut cache, mut dispatcher, _) = setup(&[1]);
        let mut renderer = RecordingRenderer {
            fail: true,
            ..RecordingRenderer::default()
        };
        dispatcher.add(0, "s", &tile(1), low());
        assert_eq!(dispatcher.dispatch(&mut cache, &mut renderer).processed, 1);
        assert_eq!(dispatcher.queued(), 0);
    }
}
