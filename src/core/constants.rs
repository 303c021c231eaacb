//! Engine-wide constants for the camera transform and the tile-cover traversal.
//! Keeping them in a single place makes it easier to tweak engine-wide magic numbers.

use std::f64::consts::PI;

/// Default square tile size in pixels.
pub const TILE_SIZE: f64 = 512.0;

/// Integer extent of a tile's local coordinate space.
pub const EXTENT: f64 = 8192.0;

/// Mean earth radius in meters.
pub const EARTH_RADIUS: f64 = 6_371_008.8;

/// Earth circumference at the equator in meters.
pub const EARTH_CIRCUMFERENCE: f64 = 2.0 * PI * EARTH_RADIUS;

/// Largest latitude representable in web mercator.
pub const MAX_MERCATOR_LATITUDE: f64 = 85.051129;

pub const DEFAULT_MIN_ZOOM: f64 = 0.0;
pub const DEFAULT_MAX_ZOOM: f64 = 22.0;

/// Hard ceiling for `max_zoom`.
pub const MAX_ZOOM_LIMIT: f64 = 25.5;

pub const DEFAULT_MIN_PITCH: f64 = 0.0;
pub const DEFAULT_MAX_PITCH: f64 = 60.0;

/// Hard ceiling for `max_pitch`.
pub const MAX_PITCH_LIMIT: f64 = 85.0;

/// Vertical field of view in radians (36.87 degrees).
pub const DEFAULT_FOV: f64 = 0.6435011087932844;

/// Fraction of the viewport kept below the horizon line.
pub const HORIZON_SHIFT: f64 = 0.1;

/// World copies rendered on either side of the primary one.
pub const NUM_WORLD_COPIES: i32 = 3;

/// Pitch at which level-of-detail splitting kicks in.
pub const MIN_LOD_PITCH: f64 = 60.0;

/// Pitch below which the orthographic blend applies, in degrees.
pub const ORTHOGRAPHIC_PITCH_TRANSITION: f64 = 15.0;

/// Overzoom allowed when draping terrain.
pub const MAX_DRAPE_OVERZOOM: f64 = 4.0;

/// Distance cap, in tiles from the camera, for tiles added by `extend_tile_cover`.
pub const EXTEND_TILE_COVER_LIMIT: i32 = 4;

/// Cosine of the viewing angle under which split distances stretch.
pub const ACUTE_ANGLE_THRESHOLD: f64 = 0.707;

/// Growth base of the acute-angle stretch.
pub const ACUTE_ANGLE_SCALE: f64 = 1.1;

/// Factor on `zoom_split_distance` when zoom levels are floored.
pub const FLOOR_ZOOM_SPLIT_FACTOR: f64 = 0.502;

/// Iterations of the biased horizon search in `point_coordinate_3d`.
pub const HORIZON_SEARCH_STEPS: u32 = 10;
