//! Tile coordinate module
//!
//! Provides the quadtree tile id used to key cached tile data, plus the
//! conversions between WGS84 positions and tiles that the viewport resolver
//! needs to enumerate the tiles covering a rectangle.

mod types;

pub use types::{
    num_columns, num_rows, tile_width, CoordError, GeoPoint, GeoRect, TileId, MAX_LAT, MAX_LEVEL,
    MAX_LON, MIN_LAT, MIN_LON,
};

/// Nudge applied to rectangle edges that fall exactly on a tile boundary,
/// so the neighbouring tile outside the rectangle is not included.
const EDGE_EPSILON: f64 = 180.0 / (1u64 << 24) as f64;

/// Converts a geographic position to the tile containing it.
///
/// # Arguments
///
/// * `point` - Position in degrees; out-of-range values are clamped to the grid
/// * `level` - Tile level (0 to [`MAX_LEVEL`])
///
/// # Returns
///
/// The tile id, or an error if the level is unsupported or the position is
/// not finite.
#[inline]
pub fn from_wgs84(point: GeoPoint, level: u16) -> Result<TileId, CoordError> {
    if level > MAX_LEVEL {
        return Err(CoordError::InvalidLevel(level));
    }
    if !point.lon.is_finite() || !point.lat.is_finite() {
        return Err(CoordError::NonFinite {
            lon: point.lon,
            lat: point.lat,
        });
    }
    Ok(TileId::new(
        column_of(point.lon, level) as u32,
        row_of(point.lat, level) as u16,
        level,
    ))
}

/// Number of tiles at `level` covering `rect`, counting both halves of a
/// rectangle crossing the antimeridian.
pub fn num_tile_ids(rect: &GeoRect, level: u16) -> u64 {
    if level > MAX_LEVEL || !rect.is_valid() {
        return 0;
    }
    rect.split_at_antimeridian()
        .iter()
        .map(|part| {
            let (x0, x1, y0, y1) = tile_span(part, level);
            (x1 - x0 + 1) * (y1 - y0 + 1)
        })
        .sum()
}

/// Enumerates the tiles at `level` covering `rect`.
///
/// Tiles are produced column by column, west to east, and north to south
/// within a column. Invalid rectangles and unsupported levels yield no tiles.
pub fn tile_ids_in(rect: &GeoRect, level: u16) -> Vec<TileId> {
    if level > MAX_LEVEL || !rect.is_valid() {
        return Vec::new();
    }
    let mut result = Vec::new();
    for part in rect.split_at_antimeridian() {
        let (x0, x1, y0, y1) = tile_span(&part, level);
        for x in x0..=x1 {
            for y in y0..=y1 {
                result.push(TileId::new(x as u32, y as u16, level));
            }
        }
    }
    result
}

/// Inclusive column and row range of a normalized rectangle.
fn tile_span(rect: &GeoRect, level: u16) -> (u64, u64, u64, u64) {
    let x0 = column_of(rect.west, level);
    let x1 = column_of((rect.east - EDGE_EPSILON).max(rect.west), level).max(x0);
    let y0 = row_of(rect.north, level);
    let y1 = row_of((rect.south + EDGE_EPSILON).min(rect.north), level).max(y0);
    (x0, x1, y0, y1)
}

fn column_of(lon: f64, level: u16) -> u64 {
    let max = num_columns(level) - 1;
    let col = ((lon - MIN_LON) / tile_width(level)).floor();
    if col <= 0.0 {
        0
    } else {
        (col as u64).min(max)
    }
}

fn row_of(lat: f64, level: u16) -> u64 {
    let max = num_rows(level) - 1;
    let row = ((MAX_LAT - lat) / tile_width(level)).floor();
    if row <= 0.0 {
        0
    } else {
        (row as u64).min(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_tile_id_packing() {
        let id = TileId::new(5, 3, 2);
        assert_eq!(id.raw(), (5u64 << 32) | (3u64 << 16) | 2);
        assert_eq!(id.x(), 5);
        assert_eq!(id.y(), 3);
        assert_eq!(id.level(), 2);
    }

    #[test]
    fn test_level_zero_has_two_tiles() {
        assert_eq!(num_columns(0), 2);
        assert_eq!(num_rows(0), 1);

        let west = from_wgs84(GeoPoint::new(-90.0, 0.0), 0).unwrap();
        let east = from_wgs84(GeoPoint::new(90.0, 0.0), 0).unwrap();
        assert_eq!(west, TileId::new(0, 0, 0));
        assert_eq!(east, TileId::new(1, 0, 0));
    }

    #[test]
    fn test_from_wgs84_clamps_edges() {
        let ne = from_wgs84(GeoPoint::new(180.0, 90.0), 3).unwrap();
        assert_eq!(ne.x() as u64, num_columns(3) - 1);
        assert_eq!(ne.y(), 0);

        let sw = from_wgs84(GeoPoint::new(-180.0, -90.0), 3).unwrap();
        assert_eq!(sw.x(), 0);
        assert_eq!(sw.y() as u64, num_rows(3) - 1);
    }

    #[test]
    fn test_from_wgs84_rejects_invalid_input() {
        assert_eq!(
            from_wgs84(GeoPoint::new(0.0, 0.0), MAX_LEVEL + 1),
            Err(CoordError::InvalidLevel(MAX_LEVEL + 1))
        );
        assert!(from_wgs84(GeoPoint::new(f64::NAN, 0.0), 1).is_err());
    }

    #[test]
    fn test_neighbor_wraps_columns() {
        let level = 2;
        let last = TileId::new(num_columns(level) as u32 - 1, 1, level);
        assert_eq!(last.neighbor(1, 0), TileId::new(0, 1, level));
        assert_eq!(TileId::new(0, 1, level).neighbor(-1, 0), last);
    }

    #[test]
    fn test_neighbor_clamps_rows() {
        let top = TileId::new(2, 0, 2);
        assert_eq!(top.neighbor(0, -1), top);
        let bottom = TileId::new(2, 3, 2);
        assert_eq!(bottom.neighbor(0, 1), bottom);
        assert_eq!(bottom.neighbor(0, -1), TileId::new(2, 2, 2));
    }

    #[test]
    fn test_bounds_and_center() {
        let id = TileId::new(1, 0, 0);
        let bounds = id.bounds();
        assert_eq!(bounds, GeoRect::new(0.0, -90.0, 180.0, 90.0));
        assert_eq!(id.center(), GeoPoint::new(90.0, 0.0));
    }

    #[test]
    fn test_tile_ids_in_single_tile() {
        // A small rectangle strictly inside one level-1 tile
        let rect = GeoRect::new(10.0, 10.0, 20.0, 20.0);
        assert_eq!(tile_ids_in(&rect, 1), vec![TileId::new(2, 0, 1)]);
        assert_eq!(num_tile_ids(&rect, 1), 1);
    }

    #[test]
    fn test_tile_ids_in_excludes_touching_neighbours() {
        // Exactly one level-1 tile; edges lie on tile boundaries
        let rect = GeoRect::new(0.0, 0.0, 90.0, 90.0);
        assert_eq!(tile_ids_in(&rect, 1), vec![TileId::new(2, 0, 1)]);
    }

    #[test]
    fn test_tile_ids_in_crossing_antimeridian() {
        let rect = GeoRect::new(170.0, 10.0, 190.0, 20.0);
        let ids = tile_ids_in(&rect, 0);
        assert_eq!(ids, vec![TileId::new(1, 0, 0), TileId::new(0, 0, 0)]);
        assert_eq!(num_tile_ids(&rect, 0), 2);
    }

    #[test]
    fn test_invalid_rect_yields_nothing() {
        let rect = GeoRect::new(10.0, 10.0, 5.0, 20.0);
        assert!(tile_ids_in(&rect, 3).is_empty());
        assert_eq!(num_tile_ids(&rect, 3), 0);
    }

    proptest! {
        #[test]
        fn prop_tile_contains_its_point(
            lon in -179.99f64..179.99,
            lat in -89.99f64..89.99,
            level in 0u16..=MAX_LEVEL,
        ) {
            let id = from_wgs84(GeoPoint::new(lon, lat), level).unwrap();
            prop_assert_eq!(id.level(), level);
            prop_assert!(id.bounds().contains(GeoPoint::new(lon, lat)));
        }

        #[test]
        fn prop_enumeration_matches_count(
            west in -180.0f64..170.0,
            south in -80.0f64..70.0,
            width in 0.1f64..40.0,
            height in 0.1f64..15.0,
            level in 0u16..6,
        ) {
            let rect = GeoRect::from_corner(west, south, width, height);
            let ids = tile_ids_in(&rect, level);
            prop_assert_eq!(ids.len() as u64, num_tile_ids(&rect, level));
            prop_assert!(ids.contains(&from_wgs84(rect.center(), level).unwrap()));
        }
    }
}
