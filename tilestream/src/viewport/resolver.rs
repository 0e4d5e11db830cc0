//! Tile set computation for one view.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::f64::consts::PI;

use tracing::warn;

use super::{TileLimits, Viewport};
use crate::coord::{self, tile_width, GeoPoint, GeoRect, TileId, MAX_LEVEL};

/// Height-to-width ratio of the fallback rectangle used when the viewport
/// holds more tiles than the load limit.
const LIMITED_ASPECT_RATIO: f64 = 0.7;

/// Tiles required by one view.
///
/// `high_detail` is always a subset of `visible`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedTiles {
    per_level: BTreeMap<u16, Vec<TileId>>,
    visible: HashSet<TileId>,
    high_detail: HashSet<TileId>,
}

impl ResolvedTiles {
    /// Builds the tile sets from prioritized per-level lists.
    ///
    /// The first `max_visu_tiles` entries of each list are high detail.
    pub fn from_levels(per_level: BTreeMap<u16, Vec<TileId>>, max_visu_tiles: usize) -> Self {
        let mut visible = HashSet::new();
        let mut high_detail = HashSet::new();
        for ids in per_level.values() {
            visible.extend(ids.iter().copied());
            high_detail.extend(ids.iter().take(max_visu_tiles).copied());
        }
        Self {
            per_level,
            visible,
            high_detail,
        }
    }

    /// Prioritized tiles of `level`, nearest first.
    pub fn tile_ids(&self, level: u16) -> &[TileId] {
        self.per_level.get(&level).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn levels(&self) -> impl Iterator<Item = u16> + '_ {
        self.per_level.keys().copied()
    }

    pub fn visible(&self) -> &HashSet<TileId> {
        &self.visible
    }

    pub fn high_detail(&self) -> &HashSet<TileId> {
        &self.high_detail
    }

    pub fn is_visible(&self, id: TileId) -> bool {
        self.visible.contains(&id)
    }

    pub fn is_high_detail(&self, id: TileId) -> bool {
        self.high_detail.contains(&id)
    }
}

/// Computes the tiles a view needs.
pub trait TileSetResolver {
    /// # Arguments
    ///
    /// * `viewport` - Camera viewport of the view
    /// * `levels` - Distinct levels of the layers shown in the view
    /// * `limits` - Caps for this view
    fn resolve(&self, viewport: &Viewport, levels: &BTreeSet<u16>, limits: TileLimits)
        -> ResolvedTiles;
}

/// Geometric resolver over the tile grid.
#[derive(Debug, Clone, Copy, Default)]
pub struct ViewportResolver;

impl TileSetResolver for ViewportResolver {
    fn resolve(
        &self,
        viewport: &Viewport,
        levels: &BTreeSet<u16>,
        limits: TileLimits,
    ) -> ResolvedTiles {
        let mut per_level = BTreeMap::new();
        for &level in levels {
            if level > MAX_LEVEL {
                warn!(level, "Skipping unsupported tile level");
                continue;
            }
            per_level.insert(
                level,
                prioritized_tile_ids(viewport, level, limits.max_load_tiles),
            );
        }
        ResolvedTiles::from_levels(per_level, limits.max_visu_tiles)
    }
}

/// Resolver returning preset tile lists whatever the viewport.
///
/// For hosts that decide visibility themselves. Lists are cut to the
/// limits like geometric results are.
#[derive(Debug, Clone, Default)]
pub struct StaticTileSet {
    per_level: BTreeMap<u16, Vec<TileId>>,
}

impl StaticTileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds tiles to the list of `level`, keeping insertion order.
    ///
    /// The ids are used as given; they need not encode `level`.
    pub fn with_tiles<I>(mut self, level: u16, tiles: I) -> Self
    where
        I: IntoIterator<Item = TileId>,
    {
        let list = self.per_level.entry(level).or_default();
        for id in tiles {
            if !list.contains(&id) {
                list.push(id);
            }
        }
        self
    }
}

impl TileSetResolver for StaticTileSet {
    fn resolve(
        &self,
        _viewport: &Viewport,
        levels: &BTreeSet<u16>,
        limits: TileLimits,
    ) -> ResolvedTiles {
        let per_level = levels
            .iter()
            .filter_map(|level| {
                let ids = self.per_level.get(level)?;
                let ids = ids.iter().copied().take(limits.max_load_tiles).collect();
                Some((*level, ids))
            })
            .collect();
        ResolvedTiles::from_levels(per_level, limits.max_visu_tiles)
    }
}

/// Tiles of `level` inside the viewport, nearest to the camera first.
///
/// When the viewport holds more than `limit` tiles, a rectangle of about
/// `limit` tiles centered on the camera is used instead. The result never
/// exceeds `limit` entries and holds no duplicates.
pub fn prioritized_tile_ids(viewport: &Viewport, level: u16, limit: usize) -> Vec<TileId> {
    if limit == 0 {
        return Vec::new();
    }
    let mut rect = viewport.rect();
    if coord::num_tile_ids(&rect, level) > limit as u64 {
        rect = limited_rect(viewport.camera(), limit, level);
    }

    let mut scored: Vec<(TileId, f64)> = coord::tile_ids_in(&rect, level)
        .into_iter()
        .map(|id| (id, tile_priority(viewport, id)))
        .collect();
    scored.sort_by(|a, b| a.1.total_cmp(&b.1));

    let mut seen = HashSet::with_capacity(scored.len());
    scored
        .into_iter()
        .map(|(id, _)| id)
        .filter(|id| seen.insert(*id))
        .take(limit)
        .collect()
}

/// Priority of a tile for the camera of `viewport`; lower loads first.
///
/// The distance from the camera to the tile center, weighted up to twice for
/// tiles behind the camera heading.
pub fn tile_priority(viewport: &Viewport, id: TileId) -> f64 {
    let center = id.center();
    let camera = viewport.camera();
    let dx = (center.lon - camera.lon + 180.0).rem_euclid(360.0) - 180.0;
    let dy = center.lat - camera.lat;
    let distance = dx.hypot(dy);

    // Compass bearing: 0 towards north, clockwise
    let bearing = dx.atan2(dy);
    let mut off_heading = (bearing - viewport.orientation).rem_euclid(2.0 * PI);
    if off_heading > PI {
        off_heading = 2.0 * PI - off_heading;
    }
    distance * (1.0 + off_heading / PI)
}

fn limited_rect(camera: GeoPoint, limit: usize, level: u16) -> GeoRect {
    let size = (limit as f64).sqrt() * tile_width(level);
    let width = (size / LIMITED_ASPECT_RATIO).min(360.0);
    let height = (size * LIMITED_ASPECT_RATIO).min(180.0);
    GeoRect::centered(camera, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn viewport(west: f64, south: f64, width: f64, height: f64) -> Viewport {
        Viewport::from_rect(GeoRect::from_corner(west, south, width, height))
    }

    #[test]
    fn test_small_viewport_single_tile() {
        let vp = viewport(10.0, 10.0, 1.0, 1.0);
        let ids = prioritized_tile_ids(&vp, 2, 100);
        assert_eq!(ids, vec![coord::from_wgs84(GeoPoint::new(10.5, 10.5), 2).unwrap()]);
    }

    #[test]
    fn test_nearest_tile_first() {
        let vp = viewport(0.0, 0.0, 40.0, 20.0).with_camera(35.0, 5.0, 0.0);
        let ids = prioritized_tile_ids(&vp, 4, 100);
        let camera_tile = coord::from_wgs84(GeoPoint::new(35.0, 5.0), 4).unwrap();
        assert_eq!(ids[0], camera_tile);
    }

    #[test]
    fn test_limit_truncates() {
        let vp = Viewport::default();
        let ids = prioritized_tile_ids(&vp, 8, 50);
        assert_eq!(ids.len(), 50);
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 50);
    }

    #[test]
    fn test_zero_limit() {
        assert!(prioritized_tile_ids(&Viewport::default(), 3, 0).is_empty());
    }

    #[test]
    fn test_tiles_ahead_before_tiles_behind() {
        let here = coord::from_wgs84(GeoPoint::new(0.5, 0.5), 6).unwrap();
        let north = here.neighbor(0, -1);
        let south = here.neighbor(0, 1);
        let camera = here.center();

        let vp = Viewport::default().with_camera(camera.lon, camera.lat, 0.0);
        assert!(tile_priority(&vp, north) < tile_priority(&vp, south));

        let facing_south = vp.with_camera(camera.lon, camera.lat, PI);
        assert!(tile_priority(&facing_south, south) < tile_priority(&facing_south, north));
    }

    #[test]
    fn test_priority_wraps_antimeridian() {
        let vp = Viewport::default().with_camera(179.9, 0.0, PI / 2.0);
        let across = coord::from_wgs84(GeoPoint::new(-179.9, 0.0), 8).unwrap();
        let far = coord::from_wgs84(GeoPoint::new(170.0, 0.0), 8).unwrap();
        assert!(tile_priority(&vp, across) < tile_priority(&vp, far));
    }

    #[test]
    fn test_resolve_groups_levels() {
        let vp = viewport(10.0, 10.0, 20.0, 10.0);
        let levels: BTreeSet<u16> = [3, 5].into_iter().collect();
        let resolved = ViewportResolver.resolve(&vp, &levels, TileLimits::new(100, 2));

        assert_eq!(resolved.levels().collect::<Vec<_>>(), vec![3, 5]);
        assert_eq!(
            resolved.visible().len(),
            resolved.tile_ids(3).len() + resolved.tile_ids(5).len()
        );
        assert_eq!(resolved.high_detail().len(), 4);
        for level in [3, 5] {
            for id in resolved.tile_ids(level).iter().take(2) {
                assert!(resolved.is_high_detail(*id));
            }
        }
    }

    #[test]
    fn test_static_tile_set_respects_levels_and_limits() {
        let a = TileId::new(0, 0, 5);
        let b = TileId::new(1, 0, 5);
        let c = TileId::new(0, 0, 6);
        let resolver = StaticTileSet::new()
            .with_tiles(5, [a, b, a])
            .with_tiles(6, [c]);

        let levels: BTreeSet<u16> = [5].into_iter().collect();
        let resolved = resolver.resolve(&Viewport::default(), &levels, TileLimits::new(1, 1));
        assert_eq!(resolved.tile_ids(5), &[a]);
        assert!(resolved.tile_ids(6).is_empty());
        assert!(!resolved.is_visible(b));
    }

    #[test]
    fn test_resolve_skips_unsupported_level() {
        let levels: BTreeSet<u16> = [MAX_LEVEL + 1].into_iter().collect();
        let resolved = ViewportResolver.resolve(&Viewport::default(), &levels, TileLimits::new(10, 5));
        assert!(resolved.visible().is_empty());
    }

    proptest! {
        #[test]
        fn prop_high_detail_subset_of_visible(
            west in -200.0f64..180.0,
            south in -90.0f64..80.0,
            width in 0.01f64..360.0,
            height in 0.01f64..100.0,
            cam_dx in 0.0f64..1.0,
            cam_dy in 0.0f64..1.0,
            orientation in 0.0f64..6.3,
            levels in proptest::collection::btree_set(0u16..=14, 1..4),
            max_load in 0usize..300,
            max_visu in 0usize..300,
        ) {
            let vp = viewport(west, south, width, height).with_camera(
                west + width * cam_dx,
                south + height * cam_dy,
                orientation,
            );
            let resolved = ViewportResolver.resolve(&vp, &levels, TileLimits::new(max_load, max_visu));
            prop_assert!(resolved.high_detail().is_subset(resolved.visible()));
            for level in levels {
                prop_assert!(resolved.tile_ids(level).len() <= max_load);
                prop_assert!(resolved.tile_ids(level).iter().all(|id| id.level() == level));
            }
        }
    }
}
