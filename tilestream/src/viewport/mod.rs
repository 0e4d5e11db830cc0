//! Viewport to tile-set resolution.
//!
//! Each view owns a [`Viewport`]. The [`TileSetResolver`] turns it, together
//! with the levels of the layers shown in that view, into the tiles the view
//! needs ([`ResolvedTiles`]):
//!
//! ```text
//! Viewport ─┐
//!           ├─► per level: tiles by camera priority ─► visible (≤ max load)
//! levels ───┘                                       └► high detail (≤ max visu)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tilestream::viewport::{TileLimits, TileSetResolver, Viewport, ViewportResolver};
//!
//! let resolved = ViewportResolver.resolve(&viewport, &levels, TileLimits::new(2048, 512));
//! assert!(resolved.high_detail().iter().all(|id| resolved.is_visible(*id)));
//! ```

mod resolver;
mod state;

use serde::{Deserialize, Serialize};

use crate::coord::{GeoPoint, GeoRect};

pub use resolver::{
    prioritized_tile_ids, tile_priority, ResolvedTiles, StaticTileSet, TileSetResolver,
    ViewportResolver,
};
pub use state::ViewState;

/// Camera viewport of one view, in degrees; orientation in radians,
/// clockwise from north.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub south: f64,
    pub west: f64,
    pub width: f64,
    pub height: f64,
    pub cam_pos_lon: f64,
    pub cam_pos_lat: f64,
    pub orientation: f64,
}

impl Viewport {
    /// Viewport over `rect` with the camera at its center, facing north.
    pub fn from_rect(rect: GeoRect) -> Self {
        let center = rect.center();
        Self {
            south: rect.south,
            west: rect.west,
            width: rect.width(),
            height: rect.height(),
            cam_pos_lon: center.lon,
            cam_pos_lat: center.lat,
            orientation: 0.0,
        }
    }

    pub fn with_camera(mut self, lon: f64, lat: f64, orientation: f64) -> Self {
        self.cam_pos_lon = lon;
        self.cam_pos_lat = lat;
        self.orientation = orientation;
        self
    }

    pub fn rect(&self) -> GeoRect {
        GeoRect::from_corner(self.west, self.south, self.width, self.height)
    }

    pub fn camera(&self) -> GeoPoint {
        GeoPoint::new(self.cam_pos_lon, self.cam_pos_lat)
    }
}

impl Default for Viewport {
    /// The whole globe, camera at (0, 0).
    fn default() -> Self {
        Self::from_rect(GeoRect::new(-180.0, -90.0, 180.0, 90.0))
    }
}

/// Tile count caps applied per level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLimits {
    /// Maximum tiles requested per level.
    pub max_load_tiles: usize,
    /// Maximum high-detail tiles per level.
    pub max_visu_tiles: usize,
}

impl TileLimits {
    pub fn new(max_load_tiles: usize, max_visu_tiles: usize) -> Self {
        Self {
            max_load_tiles,
            max_visu_tiles,
        }
    }

    /// Share of the limits for one of `num_views` views.
    pub fn per_view(&self, num_views: usize) -> Self {
        let n = num_views.max(1);
        Self {
            max_load_tiles: self.max_load_tiles / n,
            max_visu_tiles: self.max_visu_tiles / n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_view_limits() {
        let limits = TileLimits::new(2048, 512);
        assert_eq!(limits.per_view(2), TileLimits::new(1024, 256));
        assert_eq!(limits.per_view(0), limits);
    }

    #[test]
    fn test_viewport_wire_names() {
        let json = serde_json::json!({
            "south": 1.0, "west": 2.0, "width": 3.0, "height": 4.0,
            "camPosLon": 3.5, "camPosLat": 3.0, "orientation": 0.5
        });
        let viewport: Viewport = serde_json::from_value(json).unwrap();
        assert_eq!(viewport.camera(), GeoPoint::new(3.5, 3.0));
        assert_eq!(viewport.rect(), GeoRect::new(2.0, 1.0, 5.0, 5.0));
    }

    #[test]
    fn test_default_covers_globe() {
        let viewport = Viewport::default();
        assert_eq!(viewport.width, 360.0);
        assert_eq!(viewport.height, 180.0);
        assert_eq!(viewport.camera(), GeoPoint::new(0.0, 0.0));
    }
}
