//! Which view needs which tile.

use crate::cache::{FeatureTile, MapTileKey};
use crate::maps::MapCatalog;
use crate::viewport::ViewState;
use crate::visualization::{DesiredState, StyleRegistry, VisualizationDispatcher};

/// Whether view `index` shows the tile's layer at the tile's level and has
/// the tile visible.
pub(super) fn needed_in_view(
    catalog: &MapCatalog,
    view: &ViewState,
    index: usize,
    key: &MapTileKey,
) -> bool {
    let Some(layer) = catalog.layer(&key.map_id, &key.layer_id) else {
        return false;
    };
    layer.is_visible(index)
        && layer.level(index) == key.tile_id.level()
        && view.is_visible(key.tile_id)
}

pub(super) fn needed_by_any(catalog: &MapCatalog, views: &[ViewState], key: &MapTileKey) -> bool {
    views
        .iter()
        .enumerate()
        .any(|(index, view)| needed_in_view(catalog, view, index, key))
}

pub(super) fn desired_state(
    catalog: &MapCatalog,
    view: &ViewState,
    index: usize,
    key: &MapTileKey,
) -> DesiredState {
    let show_border = catalog
        .layer(&key.map_id, &key.layer_id)
        .map(|layer| layer.tile_borders(index))
        .unwrap_or(false);
    DesiredState {
        high_detail: view.is_high_detail(key.tile_id),
        show_border,
    }
}

/// Creates the missing visualizations of `tile` in every view that needs it.
///
/// Restricted to `only_style` when given.
///
/// # Returns
///
/// Number of visualizations created.
pub(super) fn visualize_tile(
    dispatcher: &mut VisualizationDispatcher,
    styles: &StyleRegistry,
    catalog: &MapCatalog,
    views: &[ViewState],
    tile: &FeatureTile,
    only_style: Option<&str>,
) -> usize {
    let key = tile.key();
    let mut created = 0;
    for (index, view) in views.iter().enumerate() {
        if !tile.prevent_culling() && !needed_in_view(catalog, view, index, key) {
            continue;
        }
        let desired = desired_state(catalog, view, index, key);
        let matching = styles
            .enabled()
            .filter(|style| style.applies_to(tile.layer_id()))
            .filter(|style| only_style.map_or(true, |id| id == style.id()));
        for style in matching {
            if dispatcher.contains(index, style.id(), key) {
                continue;
            }
            if dispatcher.add(index, style.id(), tile, desired) {
                created += 1;
            }
        }
    }
    created
}
