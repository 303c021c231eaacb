use crate::core::geo::MercatorCoordinate;
use crate::tiles::tile_id::OverscaledTileID;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Minimum and maximum elevation in meters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElevationRange {
    pub min: f64,
    pub max: f64,
}

impl ElevationRange {
    pub fn new(min: f64, max: f64) -> Self {
        debug_assert!(min <= max);
        Self { min, max }
    }
}

/// A loaded terrain tile that is currently on screen
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemTile {
    pub tile_id: OverscaledTileID,
    /// `None` until the tile's elevation has been decoded
    pub range: Option<ElevationRange>,
}

/// Read access to already loaded terrain data.
///
/// Every call is a synchronous lookup; missing data is reported through
/// `None` or the caller's default so the transform can fall back to the
/// flat plane.
pub trait Elevation: Send + Sync {
    /// Elevation in meters at a mercator position, or `default` when no
    /// terrain has been loaded there. The exaggeration is applied.
    fn get_at_point(&self, coord: &MercatorCoordinate, default: f64) -> f64;

    fn get_at_point_or_zero(&self, coord: &MercatorCoordinate) -> f64 {
        self.get_at_point(coord, 0.0)
    }

    /// Elevation range of one tile with exaggeration applied
    fn get_min_max_for_tile(&self, tile_id: &OverscaledTileID) -> Option<ElevationRange>;

    /// Elevation range over every visible terrain tile
    fn get_min_max_for_visible_tiles(&self) -> Option<ElevationRange>;

    /// Lowest elevation below mean sea level, in meters, as a negative number
    fn get_min_elevation_below_msl(&self) -> f64 {
        0.0
    }

    fn exaggeration(&self) -> f64;

    /// Distance along `dir` from `origin` to the first terrain hit. The xy
    /// components are mercator units and z is in meters.
    fn raycast(&self, origin: &Vector3<f64>, dir: &Vector3<f64>, exaggeration: f64) -> Option<f64>;

    fn visible_dem_tiles(&self) -> &[DemTile];

    /// True when terrain is sampled from a flat placeholder source
    fn is_using_mock_source(&self) -> bool {
        false
    }
}
