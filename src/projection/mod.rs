//! Projection models for the camera transform.
//!
//! A [`Projection`] is a plain value: a [`ProjectionKind`] tag plus the
//! capability flags the transform and the tile cover consult. Swapping it on
//! a transform invalidates every derived matrix.

pub mod adjustments;
pub mod globe;
pub mod tile_transform;

use crate::core::constants::EXTENT;
use crate::core::geo::{
    lat_from_mercator_y, lerp, lng_from_mercator_x, mercator_x_from_lng, mercator_y_from_lat,
    mercator_z_from_altitude, LatLng, Point,
};
use crate::core::transform::Transform;
use crate::tiles::tile_id::UnwrappedTileID;
use crate::{Error, Result};
use nalgebra::{Matrix4, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionKind {
    Mercator,
    Globe,
    Equirectangular,
}

impl ProjectionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProjectionKind::Mercator => "mercator",
            ProjectionKind::Globe => "globe",
            ProjectionKind::Equirectangular => "equirectangular",
        }
    }
}

impl fmt::Display for ProjectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProjectionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mercator" => Ok(ProjectionKind::Mercator),
            "globe" => Ok(ProjectionKind::Globe),
            "equirectangular" => Ok(ProjectionKind::Equirectangular),
            other => Err(Error::InvalidProjection(other.to_string())),
        }
    }
}

/// Unit of the z axis in world space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZAxisUnit {
    Meters,
    Pixels,
}

/// User-facing projection descriptor, as found in a style or options file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallels: Option<[f64; 2]>,
}

impl ProjectionSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            center: None,
            parallels: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl From<ProjectionKind> for ProjectionSpec {
    fn from(kind: ProjectionKind) -> Self {
        ProjectionSpec::new(kind.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub kind: ProjectionKind,
    /// Geographic center as `[lng, lat]`
    pub center: [f64; 2],
    pub parallels: Option<[f64; 2]>,
    /// Longitudes wrap around the antimeridian
    pub wrap: bool,
    pub supports_world_copies: bool,
    pub supports_terrain: bool,
    pub supports_fog: bool,
    pub supports_free_camera: bool,
    /// Tiles are reprojected from mercator in tile space
    pub is_reprojected_in_tile_space: bool,
    pub requires_draping: bool,
    pub z_axis_unit: ZAxisUnit,
    /// Zoom range, for a 1024px viewport, over which low-zoom distortion
    /// is unskewed
    pub range: Option<[f64; 2]>,
}

impl Default for Projection {
    fn default() -> Self {
        Projection::mercator()
    }
}

impl Projection {
    pub fn mercator() -> Self {
        Self {
            kind: ProjectionKind::Mercator,
            center: [0.0, 0.0],
            parallels: None,
            wrap: true,
            supports_world_copies: true,
            supports_terrain: true,
            supports_fog: true,
            supports_free_camera: true,
            is_reprojected_in_tile_space: false,
            requires_draping: false,
            z_axis_unit: ZAxisUnit::Meters,
            range: None,
        }
    }

    pub fn globe() -> Self {
        Self {
            kind: ProjectionKind::Globe,
            supports_world_copies: false,
            requires_draping: true,
            z_axis_unit: ZAxisUnit::Pixels,
            range: Some([3.0, 5.0]),
            ..Projection::mercator()
        }
    }

    pub fn equirectangular() -> Self {
        Self {
            kind: ProjectionKind::Equirectangular,
            supports_terrain: false,
            supports_fog: false,
            supports_free_camera: false,
            is_reprojected_in_tile_space: true,
            range: Some([3.5, 7.0]),
            ..Projection::mercator()
        }
    }

    /// Resolves a descriptor. No descriptor means mercator.
    pub fn from_spec(spec: Option<&ProjectionSpec>) -> Result<Self> {
        let Some(spec) = spec else {
            return Ok(Projection::mercator());
        };
        let kind: ProjectionKind = spec.name.parse()?;
        let mut projection = match kind {
            ProjectionKind::Mercator => Projection::mercator(),
            ProjectionKind::Globe => Projection::globe(),
            ProjectionKind::Equirectangular => Projection::equirectangular(),
        };
        // Only reprojected kinds honor a custom center and parallels
        if projection.is_reprojected_in_tile_space {
            if let Some(center) = spec.center {
                projection.center = center;
            }
            projection.parallels = spec.parallels;
        }
        Ok(projection)
    }

    /// Normalized descriptor, used to detect a real projection change
    pub fn spec(&self) -> ProjectionSpec {
        let reprojected = self.is_reprojected_in_tile_space;
        ProjectionSpec {
            name: self.kind.name().to_string(),
            center: reprojected.then_some(self.center),
            parallels: if reprojected { self.parallels } else { None },
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn is_globe(&self) -> bool {
        self.kind == ProjectionKind::Globe
    }

    pub fn is_mercator(&self) -> bool {
        self.kind == ProjectionKind::Mercator
    }

    /// Longitude and latitude to the unit square of this projection.
    /// Globe tiles are addressed in mercator, so it projects like mercator.
    pub fn project(&self, lng: f64, lat: f64) -> Point {
        match self.kind {
            ProjectionKind::Mercator | ProjectionKind::Globe => Point::new(
                mercator_x_from_lng(lng),
                mercator_y_from_lat(lat),
            ),
            ProjectionKind::Equirectangular => Point::new(0.5 + lng / 360.0, 0.5 - lat / 360.0),
        }
    }

    /// Inverse of [`Projection::project`]; latitude is clamped
    pub fn unproject(&self, x: f64, y: f64) -> LatLng {
        match self.kind {
            ProjectionKind::Mercator | ProjectionKind::Globe => {
                LatLng::new(LatLng::clamp_lat(lat_from_mercator_y(y)), lng_from_mercator_x(x))
            }
            ProjectionKind::Equirectangular => LatLng::new(
                LatLng::clamp_lat((0.5 - y) * 360.0),
                (x - 0.5) * 360.0,
            ),
        }
    }

    pub fn pixels_per_meter(&self, lat: f64, world_size: f64) -> f64 {
        match self.kind {
            ProjectionKind::Globe => mercator_z_from_altitude(1.0, 0.0) * world_size,
            _ => mercator_z_from_altitude(1.0, lat) * world_size,
        }
    }

    /// Ratio of this projection's pixels per meter to the scale the camera
    /// distance is computed at. Only globe differs from 1, blending from a
    /// fixed reference latitude to the center latitude with `t`.
    pub fn pixel_space_conversion(&self, lat: f64, world_size: f64, t: f64) -> f64 {
        if !self.is_globe() {
            return 1.0;
        }
        let center_scale = mercator_z_from_altitude(1.0, lat) * world_size;
        let reference_scale =
            mercator_z_from_altitude(1.0, globe::GLOBE_SCALE_MATCH_LATITUDE) * world_size;
        let combined_scale = lerp(reference_scale, center_scale, t);
        self.pixels_per_meter(lat, world_size) / combined_scale
    }

    /// Distance in pixels from the camera to the farthest visible point,
    /// used as the far plane
    pub fn farthest_pixel_distance(&self, tr: &Transform) -> f64 {
        let pixels_per_meter = self.pixels_per_meter(tr.center.lat, tr.world_size());
        if !self.is_globe() {
            return farthest_pixel_distance_on_plane(tr, pixels_per_meter);
        }

        let globe_distance = globe::farthest_pixel_distance_on_sphere(tr, pixels_per_meter);
        let t = globe::globe_to_mercator_transition(tr.zoom());
        if t > 0.0 {
            let mercator_ppm = mercator_z_from_altitude(1.0, tr.center.lat) * tr.world_size();
            let mercator_distance = farthest_pixel_distance_on_plane(tr, mercator_ppm);
            let pixel_radius = tr.world_size() / (2.0 * std::f64::consts::PI);
            let arc_half_angle =
                tr.width.max(tr.height) / tr.world_size() * std::f64::consts::PI;
            let padding = pixel_radius * (1.0 - arc_half_angle.cos());
            // Dampened so distant geometry is still culled mid-transition
            return lerp(globe_distance, mercator_distance + padding, t.powi(10));
        }
        globe_distance
    }

    /// Matrix from tile-local coordinates in `[0, EXTENT]` to world pixels
    pub fn create_tile_matrix(&self, tr: &Transform, world_size: f64, id: &UnwrappedTileID) -> Matrix4<f64> {
        let canonical = id.canonical;
        match self.kind {
            ProjectionKind::Globe => {
                let bounds = globe::globe_tile_bounds(&canonical);
                tr.globe_matrix * globe::globe_denormalize_ecef(&bounds)
            }
            ProjectionKind::Mercator => {
                let scale = world_size / 2f64.powi(canonical.z as i32);
                let translation = Vector3::new(id.unwrapped_x() as f64 * scale, canonical.y as f64 * scale, 0.0);
                Matrix4::new_translation(&translation)
                    * Matrix4::new_nonuniform_scaling(&Vector3::new(scale / EXTENT, scale / EXTENT, 1.0))
            }
            ProjectionKind::Equirectangular => {
                let tt = tile_transform::TileTransform::new(&canonical, self);
                let scale = world_size / tt.scale;
                let translation = Vector3::new(
                    (tt.x + id.wrap as f64 * tt.scale) * scale,
                    tt.y * scale,
                    0.0,
                );
                Matrix4::new_translation(&translation)
                    * Matrix4::new_nonuniform_scaling(&Vector3::new(scale / EXTENT, scale / EXTENT, 1.0))
            }
        }
    }
}

/// Far plane for a flat map: the distance to where the top of the frustum
/// meets sea level, capped at the shifted horizon
pub fn farthest_pixel_distance_on_plane(tr: &Transform, pixels_per_meter: f64) -> f64 {
    let fov_above_center = tr.fov_above_center();
    let pitch = tr.pitch_radians();
    // Negative terrain pushes the far plane further out
    let min_elevation_pixels = tr
        .elevation
        .as_ref()
        .map_or(0.0, |e| e.get_min_elevation_below_msl() * pixels_per_meter);
    let camera_to_sea_level =
        (tr.camera.position.z * tr.world_size() - min_elevation_pixels) / pitch.cos();
    let top_half_surface = fov_above_center.sin() * camera_to_sea_level
        / (std::f64::consts::FRAC_PI_2 - pitch - fov_above_center)
            .max(0.01)
            .sin();
    let furthest = pitch.sin() * top_half_surface + camera_to_sea_level;
    let horizon = camera_to_sea_level * (1.0 / tr.horizon_shift);
    (furthest * 1.01).min(horizon)
}
