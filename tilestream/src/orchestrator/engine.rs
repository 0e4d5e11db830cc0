//! The tile engine.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tokio::runtime::Handle;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info, trace, warn};

use super::types::{EngineEvent, ParseTask, TickReport, EVENT_CHANNEL_CAPACITY};
use super::visibility;
use crate::cache::{FeatureTile, MapTileKey, TileCache};
use crate::config::EngineConfig;
use crate::decoder::TileLayerDecoder;
use crate::error::EngineError;
use crate::executor::{next_delay, BudgetedQueue, Deadline};
use crate::maps::{parse_sources, MapCatalog, MapSourceInfo};
use crate::protocol::{Frame, FrameType, LayerTileRequest, TileRequestBody};
use crate::selection::{SelectionError, SelectionResult, SelectionTileRequest};
use crate::telemetry::{EngineMetrics, TelemetrySnapshot};
use crate::transport::{
    CompletionMode, HttpBackend, PendingFetch, ReqwestBackend, Transport, TransportEvent,
};
use crate::viewport::{TileLimits, TileSetResolver, ViewState, Viewport, ViewportResolver};
use crate::visualization::{Renderer, StyleRegistry, StyleSheet, VisualizationDispatcher};

/// Streams feature tiles for one or more views and keeps their
/// visualizations current.
///
/// The engine is plain owned state driven by the host: [`update`](Self::update)
/// after anything that changes what is needed, [`tick`](Self::tick) on a
/// timer (or [`run_until_idle`](Self::run_until_idle)) to process what
/// arrives. At most one fetch is in flight; starting a cycle aborts it.
pub struct TileEngine {
    config: EngineConfig,
    runtime: Handle,
    backend: Arc<dyn HttpBackend>,
    decoder: Box<dyn TileLayerDecoder>,
    renderer: Box<dyn Renderer>,
    resolver: Box<dyn TileSetResolver>,

    catalog: MapCatalog,
    cache: TileCache,
    views: Vec<ViewState>,
    styles: StyleRegistry,
    dispatcher: VisualizationDispatcher,

    parse_queue: BudgetedQueue<ParseTask>,
    fetch: Option<PendingFetch>,
    generation: u64,
    finished_generation: Option<u64>,
    selections: Vec<SelectionTileRequest>,

    legal_info: BTreeMap<String, BTreeSet<String>>,
    events: broadcast::Sender<EngineEvent>,
    metrics: EngineMetrics,
}

impl TileEngine {
    /// Creates an engine with the geometric [`ViewportResolver`].
    ///
    /// Must be called from within a tokio runtime; fetches are spawned on it.
    ///
    /// # Arguments
    ///
    /// * `config` - Engine configuration
    /// * `backend` - HTTP client used for all requests
    /// * `decoder` - Decoder for tile payloads and field dictionaries
    /// * `renderer` - Receives visualization jobs
    pub fn new(
        config: EngineConfig,
        backend: Arc<dyn HttpBackend>,
        decoder: Box<dyn TileLayerDecoder>,
        renderer: Box<dyn Renderer>,
    ) -> Result<Self, EngineError> {
        let runtime = Handle::try_current().map_err(|e| EngineError::NoRuntime(e.to_string()))?;
        let num_views = config.num_views.max(1);

        let mut catalog = MapCatalog::new(num_views, config.default_level);
        catalog.set_view_sync(config.view_sync);

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            runtime,
            backend,
            decoder,
            renderer,
            resolver: Box::new(ViewportResolver),
            catalog,
            cache: TileCache::new(),
            views: (0..num_views)
                .map(|_| ViewState::new(Viewport::default()))
                .collect(),
            styles: StyleRegistry::new(),
            dispatcher: VisualizationDispatcher::new(num_views, config.visualization_budget),
            parse_queue: BudgetedQueue::new(config.parse_budget),
            fetch: None,
            generation: 0,
            finished_generation: None,
            selections: Vec::new(),
            legal_info: BTreeMap::new(),
            events,
            metrics: EngineMetrics::new(),
            config,
        })
    }

    /// Creates an engine talking to the tile server through reqwest.
    pub fn connect(
        config: EngineConfig,
        decoder: Box<dyn TileLayerDecoder>,
        renderer: Box<dyn Renderer>,
    ) -> Result<Self, EngineError> {
        let backend = ReqwestBackend::with_timeout(config.request_timeout)?;
        Self::new(config, Arc::new(backend), decoder, renderer)
    }

    /// Replaces the tile set resolver.
    pub fn with_resolver(mut self, resolver: impl TileSetResolver + 'static) -> Self {
        self.set_resolver(resolver);
        self
    }

    /// Replaces the tile set resolver. Takes effect at the next update.
    pub fn set_resolver(&mut self, resolver: impl TileSetResolver + 'static) {
        self.resolver = Box::new(resolver);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &MapCatalog {
        &self.catalog
    }

    /// Direct catalog access. Call [`update`](Self::update) after changes.
    pub fn catalog_mut(&mut self) -> &mut MapCatalog {
        &mut self.catalog
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn views(&self) -> &[ViewState] {
        &self.views
    }

    pub fn view(&self, view: usize) -> Option<&ViewState> {
        self.views.get(view)
    }

    pub fn styles(&self) -> &StyleRegistry {
        &self.styles
    }

    pub fn dispatcher(&self) -> &VisualizationDispatcher {
        &self.dispatcher
    }

    /// Number of the most recent update cycle.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a fetch is in flight.
    pub fn is_fetching(&self) -> bool {
        self.fetch.is_some()
    }

    /// Frames received but not parsed yet.
    pub fn parse_backlog(&self) -> usize {
        self.parse_queue.len()
    }

    /// Attribution strings collected per map.
    pub fn legal_info(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.legal_info
    }

    /// Subscribes to engine notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.metrics
            .snapshot(&self.cache, self.dispatcher.len(), self.dispatcher.queued())
    }


    // =========================================================================
    // Views and layers
    // =========================================================================

    /// Moves the camera of `view` and runs an update.
    pub fn set_viewport(&mut self, view: usize, viewport: Viewport) -> Result<(), EngineError> {
        let num_views = self.views.len();
        let state = self
            .views
            .get_mut(view)
            .ok_or(EngineError::UnknownView { view, num_views })?;
        state.set_viewport(viewport);
        self.update();
        Ok(())
    }

    /// Changes the number of views and runs an update.
    ///
    /// New views start with the viewport of view 0. Visualizations of
    /// removed views are destroyed.
    pub fn set_num_views(&mut self, num_views: usize) {
        let num_views = num_views.max(1);
        let template = self
            .views
            .first()
            .map(|view| *view.viewport())
            .unwrap_or_default();
        self.views.truncate(num_views);
        self.views
            .resize_with(num_views, || ViewState::new(template));
        self.catalog.set_num_views(num_views);
        self.dispatcher
            .set_num_views(num_views, self.renderer.as_mut());
        info!(num_views, "View count changed");
        self.update();
    }

    pub fn set_layer_visible(
        &mut self,
        view: usize,
        map_id: &str,
        layer_id: &str,
        visible: bool,
    ) -> Result<(), EngineError> {
        self.catalog
            .set_layer_visible(view, map_id, layer_id, visible)?;
        self.update();
        Ok(())
    }

    pub fn set_layer_level(
        &mut self,
        view: usize,
        map_id: &str,
        layer_id: &str,
        level: u16,
    ) -> Result<(), EngineError> {
        self.catalog
            .set_layer_level(view, map_id, layer_id, level)?;
        self.update();
        Ok(())
    }

    pub fn set_tile_borders(
        &mut self,
        view: usize,
        map_id: &str,
        layer_id: &str,
        enabled: bool,
    ) -> Result<(), EngineError> {
        self.catalog
            .set_tile_borders(view, map_id, layer_id, enabled)?;
        self.update();
        Ok(())
    }

    // =========================================================================
    // Styles
    // =========================================================================

    /// Registers a style, replacing one with the same id.
    ///
    /// An enabled style is applied to every cached tile right away.
    pub fn add_style(&mut self, style: StyleSheet) {
        let style_id = style.id().to_string();
        if self.styles.insert(style).is_some() {
            self.dispatcher
                .remove_style(&style_id, self.renderer.as_mut());
        }
        if self.styles.is_enabled(&style_id) {
            self.visualize_style(&style_id);
        }
    }

    /// Unregisters a style and destroys its visualizations.
    pub fn remove_style(&mut self, style_id: &str) -> bool {
        let removed = self.styles.remove(style_id).is_some();
        if removed {
            self.dispatcher
                .remove_style(style_id, self.renderer.as_mut());
        }
        removed
    }

    pub fn set_style_enabled(&mut self, style_id: &str, enabled: bool) -> Result<(), EngineError> {
        let changed = self
            .styles
            .set_enabled(style_id, enabled)
            .ok_or_else(|| EngineError::UnknownStyle(style_id.to_string()))?;
        if !changed {
            return Ok(());
        }
        if enabled {
            self.visualize_style(style_id);
        } else {
            let destroyed = self
                .dispatcher
                .remove_style(style_id, self.renderer.as_mut());
            debug!(style = style_id, destroyed, "Style disabled");
        }
        Ok(())
    }

    fn visualize_style(&mut self, style_id: &str) {
        let mut created = 0;
        for tile in self.cache.values() {
            created += visibility::visualize_tile(
                &mut self.dispatcher,
                &self.styles,
                &self.catalog,
                &self.views,
                tile,
                Some(style_id),
            );
        }
        debug!(style = style_id, created, "Style applied to cached tiles");
    }

    // =========================================================================
    // Map sources
    // =========================================================================

    /// Fetches the source catalog and applies it.
    ///
    /// # Returns
    ///
    /// The number of maps in the catalog.
    pub async fn reload_sources(&mut self) -> Result<usize, EngineError> {
        let url = self.config.sources_url();
        let raw = Transport::get(Arc::clone(&self.backend), url.as_str())
            .fetch_bytes()
            .await?;
        let sources = parse_sources(&raw)?;
        self.decoder.set_data_source_info(&raw)?;
        let num_maps = self.apply_sources(sources);
        info!(url = %url, maps = num_maps, "Map sources loaded");
        Ok(num_maps)
    }

    /// Applies an already parsed source catalog and runs an update.
    pub fn apply_sources(&mut self, sources: Vec<MapSourceInfo>) -> usize {
        let num_maps = self.catalog.apply_sources(sources);
        self.cache.clear_known_empty();
        let _ = self.events.send(EngineEvent::MapsUpdated);
        self.update();
        num_maps
    }

    // =========================================================================
    // Selection requests
    // =========================================================================

    /// Requests one tile regardless of visibility.
    ///
    /// Answered right away from the cache, otherwise the request joins the
    /// next tile request, which is issued immediately.
    pub fn request_tile(&mut self, key: MapTileKey) -> oneshot::Receiver<SelectionResult> {
        let (selection, rx) = SelectionTileRequest::new(key);
        if let Some(tile) = self.cache.get(selection.key()) {
            selection.resolve(tile);
            return rx;
        }
        self.selections.push(selection);
        self.update();
        rx
    }

    // =========================================================================
    // Update cycle
    // =========================================================================

    /// Runs one update cycle.
    ///
    /// Resolves every view, aborts the running fetch, evicts tiles no view
    /// needs, refreshes visualizations and requests the missing tiles.
    pub fn update(&mut self) {
        self.generation += 1;
        self.metrics.cycle_started();

        self.resolve_views();
        self.abort_fetch();
        self.evict_tiles();
        self.refresh_visualizations();
        self.release_disposed();

        let body = self.build_request_body();
        if body.is_empty() {
            debug!(generation = self.generation, "No tiles to request");
            return;
        }
        self.start_fetch(&body);
    }

    /// Drops every cached tile and the fetch in flight.
    ///
    /// Visualizations are destroyed and the tiles released to the renderer.
    /// Nothing is requested until the next update.
    pub fn clear_tiles(&mut self) {
        let keys: Vec<MapTileKey> = self.cache.keys().cloned().collect();
        for key in &keys {
            self.dispatcher.remove_tile(key, self.renderer.as_mut());
        }
        self.cache.clear();
        self.abort_fetch();
        self.release_disposed();
        debug!(tiles = keys.len(), "Cleared all tiles");
    }

    fn resolve_views(&mut self) {
        let limits = TileLimits::new(self.config.max_load_tiles, self.config.max_visu_tiles)
            .per_view(self.views.len());
        for (index, view) in self.views.iter_mut().enumerate() {
            let levels = self.catalog.visible_levels(index);
            let tiles = self.resolver.resolve(view.viewport(), &levels, limits);
            trace!(
                view = index,
                visible = tiles.visible().len(),
                high_detail = tiles.high_detail().len(),
                "View resolved"
            );
            view.set_tiles(tiles);
        }
    }

    fn abort_fetch(&mut self) {
        if let Some(mut fetch) = self.fetch.take() {
            fetch.abort();
            self.metrics.fetch_aborted();
            trace!(generation = fetch.generation(), "Aborted superseded fetch");
        }
        let unparsed = self.parse_queue.len();
        if unparsed > 0 {
            trace!(frames = unparsed, "Dropping frames of previous cycle");
            self.metrics.frames_discarded(unparsed);
        }
        self.parse_queue.clear();
        self.finished_generation = None;
    }

    fn evict_tiles(&mut self) {
        let catalog = &self.catalog;
        let views = &self.views;
        let evicted = self.cache.retain(|tile| {
            tile.prevent_culling() || visibility::needed_by_any(catalog, views, tile.key())
        });
        if evicted.is_empty() {
            return;
        }

        for key in &evicted {
            self.dispatcher.remove_tile(key, self.renderer.as_mut());
            let _ = self.events.send(EngineEvent::TileEvicted(key.clone()));
        }
        self.metrics.tiles_evicted(evicted.len());
        debug!(
            generation = self.generation,
            evicted = evicted.len(),
            cached = self.cache.len(),
            "Evicted tiles"
        );
    }

    /// Hands tiles that left the cache to the renderer.
    fn release_disposed(&mut self) {
        for tile in self.cache.drain_disposed() {
            self.renderer.release(tile);
        }
    }

    fn refresh_visualizations(&mut self) {
        for (index, view) in self.views.iter().enumerate() {
            let catalog = &self.catalog;
            let styles = &self.styles;
            let cache = &self.cache;
            self.dispatcher.refresh_view(
                index,
                |style_id, vis| {
                    let key = vis.tile_key();
                    let style = styles.get(style_id).filter(|s| s.is_enabled())?;
                    let tile = cache.get(key).filter(|tile| !tile.is_disposed())?;
                    if !style.applies_to(&key.layer_id) {
                        return None;
                    }
                    if !tile.prevent_culling() && !visibility::needed_in_view(catalog, view, index, key) {
                        return None;
                    }
                    Some(visibility::desired_state(catalog, view, index, key))
                },
                self.renderer.as_mut(),
            );
        }

        for tile in self.cache.values() {
            visibility::visualize_tile(
                &mut self.dispatcher,
                &self.styles,
                &self.catalog,
                &self.views,
                tile,
                None,
            );
        }
    }

    fn build_request_body(&mut self) -> TileRequestBody {
        let mut requests = Vec::new();

        for layer in self.catalog.layers().filter(|layer| layer.is_streamable()) {
            let mut seen = HashSet::new();
            let mut tile_ids = Vec::new();
            for (index, view) in self.views.iter().enumerate() {
                if !layer.is_visible(index) {
                    continue;
                }
                for &tile_id in view.tiles().tile_ids(layer.level(index)) {
                    if !seen.insert(tile_id) {
                        continue;
                    }
                    let key = MapTileKey::new(layer.map_id(), layer.layer_id(), tile_id);
                    if self.cache.contains(&key) || self.cache.is_known_empty(&key) {
                        continue;
                    }
                    tile_ids.push(tile_id);
                }
            }
            if !tile_ids.is_empty() {
                requests.push(LayerTileRequest::new(
                    layer.map_id(),
                    layer.layer_id(),
                    tile_ids,
                ));
            }
        }

        let mut pending = Vec::new();
        for mut selection in std::mem::take(&mut self.selections) {
            let key = selection.key();
            if self.catalog.layer(&key.map_id, &key.layer_id).is_none() {
                let error = SelectionError::LayerUnavailable {
                    map_id: key.map_id.clone(),
                    layer_id: key.layer_id.clone(),
                };
                debug!(key = %key, "Rejecting selection of unknown layer");
                selection.reject(error);
                continue;
            }
            selection.set_generation(self.generation);
            requests.push(selection.layer_request());
            pending.push(selection);
        }
        self.selections = pending;

        TileRequestBody {
            requests,
            string_pool_offsets: self.decoder.field_dict_offsets(),
        }
    }

    fn start_fetch(&mut self, body: &TileRequestBody) {
        let transport = match Transport::post(Arc::clone(&self.backend), self.config.tiles_url())
            .with_json_body(body)
        {
            Ok(transport) => transport.with_mode(CompletionMode::Chunked),
            Err(err) => {
                warn!(error = %err, "Failed to encode tile request");
                return;
            }
        };

        debug!(
            generation = self.generation,
            layers = body.requests.len(),
            tiles = body.num_tiles(),
            "Requesting tiles"
        );
        self.metrics.fetch_started(body.num_tiles());
        self.fetch = Some(transport.start(&self.runtime, self.generation));
    }

    // =========================================================================
    // Scheduler
    // =========================================================================

    /// Runs one scheduler step.
    ///
    /// Takes what the fetch delivered, parses frames within the parse budget
    /// and renders visualizations within the visualization budget.
    pub fn tick(&mut self) -> TickReport {
        let frames_received = self.pull_deliveries();

        let deadline = Deadline::start(self.parse_queue.budget());
        let mut frames_parsed = 0;
        while let Some(task) = self.parse_queue.next_within(&deadline) {
            self.handle_frame(task);
            frames_parsed += 1;
        }
        self.settle_finished_fetch();

        let rendered = self
            .dispatcher
            .dispatch(&mut self.cache, self.renderer.as_mut());
        self.metrics.visualizations_rendered(rendered.processed);

        let parse_backlog = self.parse_queue.len();
        let backlog = parse_backlog > 0 || rendered.remaining > 0;
        TickReport {
            frames_received,
            frames_parsed,
            visualizations_rendered: rendered.processed,
            parse_backlog,
            visualization_backlog: rendered.remaining,
            fetch_active: self.fetch.is_some(),
            next_delay: next_delay(backlog, self.config.idle_delay),
        }
    }

    /// Ticks until no fetch is running and nothing is queued.
    pub async fn run_until_idle(&mut self) {
        loop {
            let report = self.tick();
            if report.is_idle() {
                return;
            }
            if report.next_delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(report.next_delay).await;
            }
        }
    }

    fn pull_deliveries(&mut self) -> usize {
        let Some(fetch) = self.fetch.as_mut() else {
            return 0;
        };
        let generation = fetch.generation();
        let mut received = 0;

        while let Some(event) = fetch.try_next() {
            match event {
                TransportEvent::Frame(frame) => {
                    self.metrics.frame_received(frame.len());
                    self.parse_queue.push(ParseTask { generation, frame });
                    received += 1;
                }
                TransportEvent::Failed(err) => {
                    warn!(generation, url = fetch.url(), error = %err, "Tile request failed");
                    self.metrics.fetch_failed();
                }
                TransportEvent::Finished => {
                    debug!(generation, "Tile response complete");
                }
                TransportEvent::Blob(_) | TransportEvent::Json { .. } => {
                    trace!(generation, "Ignoring non-frame delivery");
                }
            }
        }

        if fetch.is_finished() {
            self.fetch = None;
            self.finished_generation = Some(generation);
        }
        received
    }

    /// Rejects the selections of a finished fetch once all its frames are
    /// parsed.
    fn settle_finished_fetch(&mut self) {
        let Some(generation) = self.finished_generation else {
            return;
        };
        if self.parse_queue.iter().any(|task| task.generation == generation) {
            return;
        }
        self.finished_generation = None;

        let (undelivered, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.selections)
            .into_iter()
            .partition(|selection| selection.generation() == Some(generation));
        self.selections = pending;
        for selection in undelivered {
            let key = selection.key().clone();
            debug!(key = %key, "Selected tile not delivered");
            selection.reject(SelectionError::NotDelivered(key));
        }
    }

    fn handle_frame(&mut self, task: ParseTask) {
        let ParseTask { generation, frame } = task;
        match frame.kind() {
            FrameType::Fields => {
                if let Err(err) = self.decoder.read_field_dict_update(frame.as_bytes()) {
                    warn!(generation, error = %err, "Failed to apply field dictionary update");
                    self.metrics.decode_failed();
                }
            }
            FrameType::Features => self.parse_feature_tile(generation, &frame),
            FrameType::SourceData => {
                debug!(generation, bytes = frame.len(), "Ignoring source data frame");
            }
            FrameType::EndOfStream => {}
            FrameType::Unknown(tag) => {
                error!(generation, tag, "Dropping frame of unknown type");
            }
        }
    }

    fn parse_feature_tile(&mut self, generation: u64, frame: &Frame) {
        let started = Instant::now();
        let metadata = match self.decoder.read_tile_layer_metadata(frame.payload()) {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(generation, error = %err, "Dropping undecodable tile");
                self.metrics.decode_failed();
                return;
            }
        };
        let mut tile = FeatureTile::from_metadata(metadata, frame.payload_bytes());
        tile.stats_mut().parse_times.push(started.elapsed());
        self.metrics.tile_parsed(tile.num_features());
        self.insert_tile(tile);
    }

    /// Inserts a parsed tile.
    ///
    /// Tiles no view needs are dropped unless they were explicitly requested
    /// or are exempt from culling. A tile with the same key is replaced.
    ///
    /// # Returns
    ///
    /// `true` if the tile was cached.
    pub fn insert_tile(&mut self, tile: FeatureTile) -> bool {
        let key = tile.key().clone();
        let (selected, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.selections)
            .into_iter()
            .partition(|selection| selection.key() == &key);
        self.selections = pending;

        if selected.is_empty()
            && !tile.prevent_culling()
            && !visibility::needed_by_any(&self.catalog, &self.views, &key)
        {
            trace!(key = %key, "Dropping tile no view needs");
            self.metrics.tile_rejected();
            return false;
        }

        if tile.num_features() == 0 {
            self.cache.mark_empty(key.clone());
        }
        if self.cache.contains(&key) {
            self.dispatcher.remove_tile(&key, self.renderer.as_mut());
        }
        if let Some(info) = tile.legal_info() {
            self.legal_info
                .entry(key.map_id.clone())
                .or_default()
                .insert(info.to_string());
            let _ = self.events.send(EngineEvent::LegalInfoUpdated {
                map_id: key.map_id.clone(),
            });
        }
        for selection in selected {
            selection.resolve(&tile);
        }

        self.cache.put(tile);
        self.release_disposed();
        if let Some(tile) = self.cache.get(&key) {
            visibility::visualize_tile(
                &mut self.dispatcher,
                &self.styles,
                &self.catalog,
                &self.views,
                tile,
                None,
            );
        }
        trace!(key = %key, "Tile cached");
        let _ = self.events.send(EngineEvent::TileLoaded(key));
        true
    }
}

impl Drop for TileEngine {
    fn drop(&mut self) {
        for selection in self.selections.drain(..) {
            let key = selection.key().clone();
            selection.reject(SelectionError::EngineDropped(key));
        }
    }
}

impl std::fmt::Debug for TileEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileEngine")
            .field("generation", &self.generation)
            .field("views", &self.views.len())
            .field("cached_tiles", &self.cache.len())
            .field("fetching", &self.fetch.is_some())
            .field("parse_backlog", &self.parse_queue.len())
            .finish()
    }
}
