//! Core types for the tile coordinate system.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Highest supported tile level.
///
/// Rows are stored in 16 bits, and level 16 is the last level whose
/// `2^level` rows still fit.
pub const MAX_LEVEL: u16 = 16;

/// Minimum latitude of the tile grid.
pub const MIN_LAT: f64 = -90.0;

/// Maximum latitude of the tile grid.
pub const MAX_LAT: f64 = 90.0;

/// Minimum longitude of the tile grid.
pub const MIN_LON: f64 = -180.0;

/// Maximum longitude of the tile grid.
pub const MAX_LON: f64 = 180.0;

/// Errors that can occur while constructing tile ids.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordError {
    /// Level exceeds [`MAX_LEVEL`].
    InvalidLevel(u16),
    /// Latitude or longitude is not a finite number.
    NonFinite { lon: f64, lat: f64 },
}

impl fmt::Display for CoordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordError::InvalidLevel(level) => {
                write!(f, "Invalid tile level: {} (max {})", level, MAX_LEVEL)
            }
            CoordError::NonFinite { lon, lat } => {
                write!(f, "Non-finite coordinate: lon={}, lat={}", lon, lat)
            }
        }
    }
}

impl std::error::Error for CoordError {}

/// A quadtree tile identifier.
///
/// The 64-bit value packs the column into the high 32 bits, the row into
/// bits 16..32 and the level into the low 16 bits:
///
/// ```text
/// 63            32 31      16 15       0
/// ┌──────────────┬──────────┬──────────┐
/// │      x       │    y     │  level   │
/// └──────────────┴──────────┴──────────┘
/// ```
///
/// At level `z` there are `2^(z+1)` columns starting at longitude -180 and
/// `2^z` rows starting at latitude +90, each tile `180 / 2^z` degrees wide.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TileId(u64);

impl TileId {
    /// Wraps a raw tile id value.
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Builds a tile id from its components.
    pub const fn new(x: u32, y: u16, level: u16) -> Self {
        Self(((x as u64) << 32) | ((y as u64) << 16) | level as u64)
    }

    /// Returns the raw 64-bit value.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Column of the tile.
    pub const fn x(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Row of the tile.
    pub const fn y(self) -> u16 {
        ((self.0 >> 16) & 0xFFFF) as u16
    }

    /// Level of the tile.
    pub const fn level(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// Returns the tile offset by `(dx, dy)` at the same level.
    ///
    /// The column wraps around the antimeridian; the row is clamped at the
    /// poles.
    pub fn neighbor(self, dx: i64, dy: i64) -> Self {
        let level = self.level();
        let columns = num_columns(level) as i64;
        let rows = num_rows(level) as i64;
        let x = (self.x() as i64 + dx).rem_euclid(columns);
        let y = (self.y() as i64 + dy).clamp(0, rows - 1);
        Self::new(x as u32, y as u16, level)
    }

    /// Width (and height) of a tile at this id's level, in degrees.
    pub fn size_degrees(self) -> f64 {
        tile_width(self.level())
    }

    /// Geographic bounds of the tile.
    pub fn bounds(self) -> GeoRect {
        let width = self.size_degrees();
        let west = MIN_LON + self.x() as f64 * width;
        let north = MAX_LAT - self.y() as f64 * width;
        GeoRect::new(west, north - width, west + width, north)
    }

    /// Geographic center of the tile.
    pub fn center(self) -> GeoPoint {
        self.bounds().center()
    }
}

impl From<u64> for TileId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<TileId> for u64 {
    fn from(id: TileId) -> Self {
        id.0
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Number of tile columns at `level`.
#[inline]
pub fn num_columns(level: u16) -> u64 {
    1u64 << (level as u32 + 1)
}

/// Number of tile rows at `level`.
#[inline]
pub fn num_rows(level: u16) -> u64 {
    1u64 << level as u32
}

/// Tile width in degrees at `level`.
#[inline]
pub fn tile_width(level: u16) -> f64 {
    180.0 / num_rows(level) as f64
}

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub const fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// An axis-aligned geographic rectangle in degrees.
///
/// `east` may exceed 180 when the rectangle crosses the antimeridian;
/// [`GeoRect::split_at_antimeridian`] normalizes such rectangles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoRect {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl GeoRect {
    /// Creates a rectangle from its edges.
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Creates a rectangle from its south-west corner and size.
    ///
    /// The height is cut so the rectangle does not extend past the north
    /// pole.
    pub fn from_corner(west: f64, south: f64, width: f64, height: f64) -> Self {
        let north = (south + height).min(MAX_LAT);
        Self::new(west, south.max(MIN_LAT), west + width, north)
    }

    /// Creates a rectangle of the given size around `center`.
    pub fn centered(center: GeoPoint, width: f64, height: f64) -> Self {
        Self::from_corner(
            center.lon - width * 0.5,
            center.lat - height * 0.5,
            width,
            height,
        )
    }

    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.west + self.east) * 0.5,
            (self.south + self.north) * 0.5,
        )
    }

    /// Whether the rectangle has a usable, finite extent.
    pub fn is_valid(&self) -> bool {
        let finite = [self.west, self.south, self.east, self.north]
            .iter()
            .all(|v| v.is_finite());
        finite
            && self.width() >= 0.0
            && self.height() >= 0.0
            && self.width() <= 360.0
            && self.height() <= 180.0
    }

    /// Whether `point` lies inside the rectangle (edges inclusive).
    pub fn contains(&self, point: GeoPoint) -> bool {
        point.lon >= self.west
            && point.lon <= self.east
            && point.lat >= self.south
            && point.lat <= self.north
    }

    /// Splits the rectangle into parts lying within [-180, 180].
    pub fn split_at_antimeridian(&self) -> Vec<GeoRect> {
        let mut west = self.west;
        let mut east = self.east;
        // Shift so the west edge lies in [-180, 180).
        if west < MIN_LON || west >= MAX_LON {
            let shift = (west - MIN_LON).div_euclid(360.0) * 360.0;
            west -= shift;
            east -= shift;
        }
        if east <= MAX_LON {
            return vec![GeoRect::new(west, self.south, east, self.north)];
        }
        vec![
            GeoRect::new(west, self.south, MAX_LON, self.north),
            GeoRect::new(MIN_LON, self.south, east - 360.0, self.north),
        ]
    }
}
