//! Options for building a transform and for requesting a tile cover
//!
//! Everything here is plain serde data so a host application can keep its
//! camera setup in a JSON file.

use crate::core::constants::{
    DEFAULT_MAX_PITCH, DEFAULT_MAX_ZOOM, DEFAULT_MIN_PITCH, DEFAULT_MIN_ZOOM, TILE_SIZE,
};
use crate::core::geo::LatLngBounds;
use crate::projection::ProjectionSpec;
use crate::Result;
use serde::{Deserialize, Serialize};

/// What the camera altitude is measured from when terrain is enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraElevationReference {
    /// The camera follows the terrain under the map center
    #[default]
    Ground,
    /// The camera keeps its altitude above sea level
    Sea,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformOptions {
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Degrees
    pub min_pitch: f64,
    /// Degrees
    pub max_pitch: f64,
    pub render_world_copies: bool,
    pub projection: Option<ProjectionSpec>,
    pub max_bounds: Option<LatLngBounds>,
    pub camera_elevation_reference: CameraElevationReference,
    /// Blend toward an orthographic projection when nearly top-down
    pub ortho_at_low_pitch: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            min_pitch: DEFAULT_MIN_PITCH,
            max_pitch: DEFAULT_MAX_PITCH,
            render_world_copies: true,
            projection: None,
            max_bounds: None,
            camera_elevation_reference: CameraElevationReference::Ground,
            ortho_at_low_pitch: false,
        }
    }
}

impl TransformOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_zoom_range(mut self, min_zoom: f64, max_zoom: f64) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    pub fn with_pitch_range(mut self, min_pitch: f64, max_pitch: f64) -> Self {
        self.min_pitch = min_pitch;
        self.max_pitch = max_pitch;
        self
    }

    pub fn with_render_world_copies(mut self, render_world_copies: bool) -> Self {
        self.render_world_copies = render_world_copies;
        self
    }

    pub fn with_projection(mut self, projection: ProjectionSpec) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_max_bounds(mut self, bounds: LatLngBounds) -> Self {
        self.max_bounds = Some(bounds);
        self
    }
}

/// Parameters of a tile cover request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoveringTilesOptions {
    /// Tile size of the source in pixels
    pub tile_size: f64,
    pub min_zoom: Option<u8>,
    pub max_zoom: Option<u8>,
    /// Round the covering zoom instead of flooring it
    pub round_zoom: bool,
    /// Emit tiles with the traversal zoom as their overscaled zoom
    pub reparse_overscaled: bool,
    /// The source is a terrain elevation source
    pub is_terrain_dem: bool,
    pub calculate_quadrant_visibility: bool,
}

impl Default for CoveringTilesOptions {
    fn default() -> Self {
        Self {
            tile_size: TILE_SIZE,
            min_zoom: None,
            max_zoom: None,
            round_zoom: false,
            reparse_overscaled: false,
            is_terrain_dem: false,
            calculate_quadrant_visibility: false,
        }
    }
}

impl CoveringTilesOptions {
    pub fn new(tile_size: f64) -> Self {
        Self {
            tile_size,
            ..Default::default()
        }
    }

    pub fn with_min_zoom(mut self, min_zoom: u8) -> Self {
        self.min_zoom = Some(min_zoom);
        self
    }

    pub fn with_max_zoom(mut self, max_zoom: u8) -> Self {
        self.max_zoom = Some(max_zoom);
        self
    }

    pub fn with_round_zoom(mut self, round_zoom: bool) -> Self {
        self.round_zoom = round_zoom;
        self
    }

    pub fn with_reparse_overscaled(mut self, reparse_overscaled: bool) -> Self {
        self.reparse_overscaled = reparse_overscaled;
        self
    }

    pub fn with_terrain_dem(mut self, is_terrain_dem: bool) -> Self {
        self.is_terrain_dem = is_terrain_dem;
        self
    }

    pub fn with_quadrant_visibility(mut self, calculate: bool) -> Self {
        self.calculate_quadrant_visibility = calculate;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = TransformOptions::default();
        assert_eq!(options.min_zoom, 0.0);
        assert_eq!(options.max_zoom, 22.0);
        assert_eq!(options.max_pitch, 60.0);
        assert!(options.render_world_copies);
        assert_eq!(options.camera_elevation_reference, CameraElevationReference::Ground);
    }

    #[test]
    fn test_options_from_partial_json() {
        let options = TransformOptions::from_json(
            r#"{"max_zoom": 18, "projection": {"name": "globe"}, "camera_elevation_reference": "sea"}"#,
        )
        .unwrap();
        assert_eq!(options.max_zoom, 18.0);
        assert_eq!(options.min_zoom, 0.0);
        assert_eq!(options.projection.unwrap().name, "globe");
        assert_eq!(options.camera_elevation_reference, CameraElevationReference::Sea);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(TransformOptions::from_json(r#"{"max_zoom": "x"}"#).is_err());
        assert!(TransformOptions::from_json("{").is_err());
    }

    #[test]
    fn test_covering_options_builder() {
        let options = CoveringTilesOptions::new(256.0)
            .with_min_zoom(2)
            .with_max_zoom(14)
            .with_round_zoom(true);
        assert_eq!(options.tile_size, 256.0);
        assert_eq!(options.min_zoom, Some(2));
        assert_eq!(options.max_zoom, Some(14));
        assert!(options.round_zoom && !options.reparse_overscaled);
    }
}
