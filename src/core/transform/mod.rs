//! The map camera transform.
//!
//! [`Transform`] owns the view parameters (center, zoom, pitch, bearing,
//! field of view, padding and viewport size) together with everything derived
//! from them. Setters clamp their input, re-apply the geographic constraints
//! and then recompute all matrices in one pass, so the derived state is never
//! read in a stale combination.

mod coords;
mod matrices;

pub use coords::RayIntersection;
pub use matrices::DistanceTileData;

use crate::core::config::{CameraElevationReference, CoveringTilesOptions, TransformOptions};
use crate::core::constants::{
    DEFAULT_FOV, HORIZON_SHIFT, MAX_DRAPE_OVERZOOM, MAX_MERCATOR_LATITUDE, MAX_PITCH_LIMIT,
    MAX_ZOOM_LIMIT, MIN_LOD_PITCH, ORTHOGRAPHIC_PITCH_TRANSITION, TILE_SIZE,
};
use crate::core::edge_insets::{EdgeInsets, PaddingOptions};
use crate::core::elevation::Elevation;
use crate::core::geo::{
    clamp, ease_in, lat_from_mercator_y, lerp, mercator_x_from_lng, mercator_y_from_lat,
    mercator_z_from_altitude, wrap, LatLng, LatLngBounds, MercatorCoordinate, Point,
};
use crate::projection::adjustments::projection_interpolation_t;
use crate::projection::globe::GLOBE_ZOOM_THRESHOLD_MAX;
use crate::projection::{Projection, ProjectionSpec};
use crate::rendering::camera::{orientation_from_frame, FreeCamera, FreeCameraOptions};
use crate::spatial::culling::{Frustum, FrustumCorners};
use crate::Result;
use matrices::TileCaches;
use nalgebra::{Matrix2, Matrix4, UnitQuaternion, Vector3};
use std::f64::consts::PI;
use std::fmt;
use std::sync::{Arc, Once};

static TERRAIN_UNSUPPORTED: Once = Once::new();

/// Camera and viewport state of a map, with the matrices derived from it.
///
/// Cloning copies the view state and shares the elevation provider; the
/// per-tile matrix caches of the clone start empty.
#[derive(Clone)]
pub struct Transform {
    /// Size of a tile in pixels at integer zoom levels
    pub(crate) tile_size: f64,
    pub(crate) width: f64,
    pub(crate) height: f64,
    /// `2^zoom`
    pub(crate) scale: f64,
    pub(crate) tile_zoom: f64,
    pub(crate) zoom_fraction: f64,
    zoom: f64,
    /// Bearing in radians, counter-clockwise
    pub(crate) angle: f64,
    /// Radians
    pub(crate) pitch: f64,
    /// Vertical field of view in radians
    pub(crate) fov: f64,
    /// Fraction of the space between horizon and center kept free
    pub(crate) horizon_shift: f64,
    pub(crate) center: LatLng,
    pub(crate) edge_insets: EdgeInsets,

    min_zoom: f64,
    max_zoom: f64,
    /// Degrees
    min_pitch: f64,
    /// Degrees
    max_pitch: f64,
    render_world_copies: bool,
    max_bounds: Option<LatLngBounds>,
    min_lng: f64,
    max_lng: f64,
    min_lat: f64,
    max_lat: f64,
    world_min_x: f64,
    world_max_x: f64,
    world_min_y: f64,
    world_max_y: f64,

    pub(crate) projection: Projection,
    mercator_from_transition: bool,
    ortho_at_low_pitch: bool,

    pub(crate) camera: FreeCamera,
    pub(crate) elevation: Option<Arc<dyn Elevation>>,
    /// Terrain elevation at the center in meters
    pub(crate) center_altitude: f64,
    center_altitude_valid_for_exaggeration: Option<f64>,
    sea_level_zoom: Option<f64>,
    average_elevation: f64,
    camera_elevation_reference: CameraElevationReference,

    pub(crate) camera_to_center_distance: f64,
    pub(crate) pixels_per_mercator_pixel: f64,
    pub(crate) mercator_scale_ratio: f64,
    pub(crate) near_z: f64,
    pub(crate) far_z: f64,
    pub(crate) pixels_to_gl_units: [f64; 2],
    pub(crate) globe_radius: f64,
    pub(crate) globe_center_in_view_space: Vector3<f64>,

    pub(crate) proj_matrix: Matrix4<f64>,
    pub(crate) inv_proj_matrix: Matrix4<f64>,
    pub(crate) aligned_proj_matrix: Matrix4<f64>,
    pub(crate) expanded_far_z_proj_matrix: Matrix4<f64>,
    pub(crate) mercator_matrix: Matrix4<f64>,
    pub(crate) label_plane_matrix: Matrix4<f64>,
    pub(crate) gl_coord_matrix: Matrix4<f64>,
    pub(crate) pixel_matrix: Matrix4<f64>,
    pub(crate) pixel_matrix_inverse: Matrix4<f64>,
    pub(crate) globe_matrix: Matrix4<f64>,
    pub(crate) inverse_adjustment_matrix: Matrix2<f64>,
    pub(crate) mercator_fog_matrix: Matrix4<f64>,
    pub(crate) world_to_fog_matrix: Matrix4<f64>,
    pub(crate) frustum_corners: Option<FrustumCorners>,
    pub(crate) camera_frustum: Option<Frustum>,

    unmodified: bool,
    /// Re-entrancy latch for `constrain`
    constraining: bool,
    is_camera_constrained: bool,
    allow_world_under_zoom: bool,
    freeze_tile_coverage: bool,
    fog_cull_dist_sq: Option<f64>,
    /// Name of the matrix whose inversion failed in the last recalculation
    matrix_error: Option<&'static str>,

    caches: TileCaches,
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("center", &self.center)
            .field("zoom", &self.zoom)
            .field("pitch", &self.pitch())
            .field("bearing", &self.bearing())
            .field("fov", &self.fov())
            .field("padding", &self.edge_insets)
            .field("projection", &self.projection.kind)
            .field("has_elevation", &self.elevation.is_some())
            .finish()
    }
}

impl Default for Transform {
    fn default() -> Self {
        Transform::from_parts(TransformOptions::default(), Projection::mercator())
    }
}

impl Transform {
    /// Creates a transform with a zero-sized viewport. Call
    /// [`Transform::resize`] before issuing queries.
    pub fn new(options: TransformOptions) -> Result<Self> {
        let projection = Projection::from_spec(options.projection.as_ref())?;
        Ok(Transform::from_parts(options, projection))
    }

    fn from_parts(options: TransformOptions, projection: Projection) -> Self {
        let min_zoom = options.min_zoom.max(0.0);
        let max_zoom = options.max_zoom.min(MAX_ZOOM_LIMIT);
        let min_pitch = options.min_pitch.max(0.0);
        let max_pitch = options.max_pitch.min(MAX_PITCH_LIMIT);

        let mut tr = Self {
            tile_size: TILE_SIZE,
            width: 0.0,
            height: 0.0,
            scale: 1.0,
            tile_zoom: 0.0,
            zoom_fraction: 0.0,
            zoom: 0.0,
            angle: 0.0,
            pitch: 0.0,
            fov: DEFAULT_FOV,
            horizon_shift: HORIZON_SHIFT,
            center: LatLng::new(0.0, 0.0),
            edge_insets: EdgeInsets::default(),
            min_zoom,
            max_zoom,
            min_pitch,
            max_pitch,
            render_world_copies: options.render_world_copies,
            max_bounds: None,
            min_lng: -180.0,
            max_lng: 180.0,
            min_lat: -MAX_MERCATOR_LATITUDE,
            max_lat: MAX_MERCATOR_LATITUDE,
            world_min_x: 0.0,
            world_max_x: 0.0,
            world_min_y: 0.0,
            world_max_y: 0.0,
            projection,
            mercator_from_transition: false,
            ortho_at_low_pitch: options.ortho_at_low_pitch,
            camera: FreeCamera::default(),
            elevation: None,
            center_altitude: 0.0,
            center_altitude_valid_for_exaggeration: None,
            sea_level_zoom: None,
            average_elevation: 0.0,
            camera_elevation_reference: options.camera_elevation_reference,
            camera_to_center_distance: 0.0,
            pixels_per_mercator_pixel: 1.0,
            mercator_scale_ratio: 1.0,
            near_z: 0.0,
            far_z: 0.0,
            pixels_to_gl_units: [0.0, 0.0],
            globe_radius: 0.0,
            globe_center_in_view_space: Vector3::zeros(),
            proj_matrix: Matrix4::identity(),
            inv_proj_matrix: Matrix4::identity(),
            aligned_proj_matrix: Matrix4::identity(),
            expanded_far_z_proj_matrix: Matrix4::identity(),
            mercator_matrix: Matrix4::identity(),
            label_plane_matrix: Matrix4::identity(),
            gl_coord_matrix: Matrix4::identity(),
            pixel_matrix: Matrix4::identity(),
            pixel_matrix_inverse: Matrix4::identity(),
            globe_matrix: Matrix4::identity(),
            inverse_adjustment_matrix: Matrix2::identity(),
            mercator_fog_matrix: Matrix4::identity(),
            world_to_fog_matrix: Matrix4::identity(),
            frustum_corners: None,
            camera_frustum: None,
            unmodified: true,
            constraining: false,
            is_camera_constrained: false,
            allow_world_under_zoom: false,
            freeze_tile_coverage: false,
            fog_cull_dist_sq: None,
            matrix_error: None,
            caches: TileCaches::default(),
        };
        tr.set_max_bounds(options.max_bounds);
        tr.apply_zoom(clamp(0.0, tr.min_zoom, tr.max_zoom));
        tr
    }

    // Viewport

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn size(&self) -> Point {
        Point::new(self.width, self.height)
    }

    pub fn aspect(&self) -> f64 {
        self.width / self.height
    }

    pub fn tile_size(&self) -> f64 {
        self.tile_size
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
        self.pixels_to_gl_units = [2.0 / width, -2.0 / height];
        self.constrain();
        self.calc_matrices();
    }

    pub fn pixels_to_gl_units(&self) -> [f64; 2] {
        self.pixels_to_gl_units
    }

    /// True until the first user-driven change of the view
    pub fn unmodified(&self) -> bool {
        self.unmodified
    }

    // Projection

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Swaps the projection. Returns whether the normalized descriptor
    /// changed, in which case all matrices are recomputed.
    pub fn set_projection(&mut self, spec: Option<&ProjectionSpec>) -> Result<bool> {
        let projection = Projection::from_spec(spec)?;
        let old = self.projection.spec();
        self.projection = projection;
        let changed = old != self.projection.spec();
        if changed {
            log::debug!("projection changed from {} to {}", old.name, self.projection.name());
            self.calc_matrices();
        }
        self.mercator_from_transition = false;
        Ok(changed)
    }

    /// Normalized descriptor of the active projection
    pub fn get_projection(&self) -> ProjectionSpec {
        self.projection.spec()
    }

    /// Switches to mercator at the end of a globe transition while keeping
    /// globe-style constraints and the globe matrix
    pub fn set_mercator_from_transition(&mut self) -> bool {
        let old = self.projection.kind;
        self.mercator_from_transition = true;
        self.projection = Projection::mercator();
        let changed = old != self.projection.kind;
        if changed {
            self.calc_matrices();
        }
        changed
    }

    pub fn mercator_from_transition(&self) -> bool {
        self.mercator_from_transition
    }

    pub fn set_orthographic_projection_at_low_pitch(&mut self, enabled: bool) -> bool {
        if self.ortho_at_low_pitch == enabled {
            return false;
        }
        self.ortho_at_low_pitch = enabled;
        self.calc_matrices();
        true
    }

    pub fn is_orthographic(&self) -> bool {
        !self.projection.is_globe()
            && self.ortho_at_low_pitch
            && self.pitch() < ORTHOGRAPHIC_PITCH_TRANSITION
    }

    // Zoom

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn tile_zoom(&self) -> f64 {
        self.tile_zoom
    }

    pub fn zoom_fraction(&self) -> f64 {
        self.zoom_fraction
    }

    pub fn world_size(&self) -> f64 {
        self.tile_size * self.scale
    }

    pub fn zoom_scale(zoom: f64) -> f64 {
        2f64.powf(zoom)
    }

    pub fn scale_zoom(scale: f64) -> f64 {
        scale.log2()
    }

    /// Sets the zoom, clamped to the zoom range
    pub fn set_zoom(&mut self, zoom: f64) {
        let z = clamp(zoom, self.min_zoom, self.max_zoom);
        if self.zoom == z {
            return;
        }
        self.unmodified = false;
        self.apply_zoom(z);
        self.update_sea_level_zoom();
        self.constrain();
        self.calc_matrices();
    }

    fn apply_zoom(&mut self, z: f64) {
        self.zoom = z;
        self.scale = Transform::zoom_scale(z);
        self.tile_zoom = z.floor();
        self.zoom_fraction = z - self.tile_zoom;
    }

    pub fn min_zoom(&self) -> f64 {
        self.min_zoom
    }

    pub fn set_min_zoom(&mut self, zoom: f64) {
        if self.min_zoom == zoom {
            return;
        }
        self.min_zoom = zoom;
        self.set_zoom(self.zoom.max(zoom));
    }

    pub fn max_zoom(&self) -> f64 {
        self.max_zoom
    }

    pub fn set_max_zoom(&mut self, zoom: f64) {
        if self.max_zoom == zoom {
            return;
        }
        self.max_zoom = zoom;
        self.set_zoom(self.zoom.min(zoom));
    }

    /// Integer zoom of the tiles that cover the view for a source with the
    /// given tile size
    pub fn covering_zoom_level(&self, options: &CoveringTilesOptions) -> u8 {
        let z = self.zoom + Transform::scale_zoom(self.tile_size / options.tile_size);
        let z = if options.round_zoom { z.round() } else { z.floor() };
        z.max(0.0) as u8
    }

    // Pitch, bearing and field of view

    /// Degrees
    pub fn pitch(&self) -> f64 {
        self.pitch.to_degrees()
    }

    pub fn pitch_radians(&self) -> f64 {
        self.pitch
    }

    /// Sets the pitch in degrees, clamped to the pitch range
    pub fn set_pitch(&mut self, pitch: f64) {
        let p = clamp(pitch, self.min_pitch, self.max_pitch).to_radians();
        if self.pitch == p {
            return;
        }
        self.unmodified = false;
        self.pitch = p;
        self.calc_matrices();
    }

    pub fn min_pitch(&self) -> f64 {
        self.min_pitch
    }

    pub fn set_min_pitch(&mut self, pitch: f64) {
        if self.min_pitch == pitch {
            return;
        }
        self.min_pitch = pitch;
        self.set_pitch(self.pitch().max(pitch));
    }

    pub fn max_pitch(&self) -> f64 {
        self.max_pitch
    }

    pub fn set_max_pitch(&mut self, pitch: f64) {
        if self.max_pitch == pitch {
            return;
        }
        self.max_pitch = pitch.min(MAX_PITCH_LIMIT);
        self.set_pitch(self.pitch().min(self.max_pitch));
    }

    /// Bearing in degrees, in `(-180, 180]`
    pub fn bearing(&self) -> f64 {
        wrap(self.rotation(), -180.0, 180.0)
    }

    pub fn set_bearing(&mut self, bearing: f64) {
        self.set_rotation(bearing);
    }

    /// Unwrapped bearing in degrees
    pub fn rotation(&self) -> f64 {
        -self.angle.to_degrees()
    }

    pub fn set_rotation(&mut self, rotation: f64) {
        let b = -rotation.to_radians();
        if self.angle == b {
            return;
        }
        self.unmodified = false;
        self.angle = b;
        self.calc_matrices();
    }

    /// Bearing in radians as used by the matrices
    pub fn angle(&self) -> f64 {
        self.angle
    }

    /// 2D rotation by the map angle
    pub fn rotation_matrix(&self) -> Matrix2<f64> {
        let (sin, cos) = self.angle.sin_cos();
        Matrix2::new(cos, -sin, sin, cos)
    }

    /// Vertical field of view in degrees
    pub fn fov(&self) -> f64 {
        self.fov.to_degrees()
    }

    /// Sets the field of view in degrees, clamped to `[0.01, 60]`
    pub fn set_fov(&mut self, fov: f64) {
        let fov = clamp(fov, 0.01, 60.0).to_radians();
        if self.fov == fov {
            return;
        }
        self.unmodified = false;
        self.fov = fov;
        self.calc_matrices();
    }

    pub fn fov_x(&self) -> f64 {
        self.fov
    }

    pub fn fov_y(&self) -> f64 {
        let focal_length = 1.0 / (self.fov_x() * 0.5).tan();
        2.0 * ((1.0 / self.aspect()) / focal_length).atan()
    }

    /// Part of the field of view above the padded center, in radians
    pub fn fov_above_center(&self) -> f64 {
        self.fov * (0.5 + self.center_offset().y / self.height)
    }

    // Center and padding

    pub fn center(&self) -> LatLng {
        self.center
    }

    pub fn set_center(&mut self, center: LatLng) {
        if center.lat == self.center.lat && center.lng == self.center.lng {
            return;
        }
        self.unmodified = false;
        self.center = center;
        if self.terrain_enabled() {
            match self.camera_elevation_reference {
                CameraElevationReference::Ground => self.update_camera_on_terrain(),
                CameraElevationReference::Sea => self.update_zoom_from_elevation(),
            }
        }
        self.constrain();
        self.calc_matrices();
    }

    pub fn padding(&self) -> EdgeInsets {
        self.edge_insets
    }

    pub fn set_padding(&mut self, padding: PaddingOptions) {
        if self.is_padding_equal(&padding) {
            return;
        }
        self.unmodified = false;
        let start = self.edge_insets;
        self.edge_insets.interpolate(&start, &padding, 1.0);
        self.calc_matrices();
    }

    pub fn is_padding_equal(&self, padding: &PaddingOptions) -> bool {
        PaddingOptions::from(self.edge_insets) == *padding
    }

    pub fn interpolate_padding(&mut self, start: &EdgeInsets, target: &PaddingOptions, t: f64) {
        self.unmodified = false;
        self.edge_insets.interpolate(start, target, t);
        self.constrain();
        self.calc_matrices();
    }

    /// Screen position of the padded center
    pub fn center_point(&self) -> Point {
        self.edge_insets.center(self.width, self.height)
    }

    /// Offset of the padded center from the viewport middle
    pub fn center_offset(&self) -> Point {
        self.center_point().subtract(&self.size().multiply(0.5))
    }

    // Bounds and world copies

    pub fn render_world_copies(&self) -> bool {
        self.render_world_copies && self.projection.supports_world_copies
    }

    pub fn set_render_world_copies(&mut self, render_world_copies: bool) {
        self.render_world_copies = render_world_copies;
    }

    pub fn max_bounds(&self) -> Option<LatLngBounds> {
        self.max_bounds.clone()
    }

    /// Sets or clears the geographic bounds the view is kept inside
    pub fn set_max_bounds(&mut self, bounds: Option<LatLngBounds>) {
        self.max_bounds = bounds.clone();
        self.min_lat = -MAX_MERCATOR_LATITUDE;
        self.max_lat = MAX_MERCATOR_LATITUDE;
        self.min_lng = -180.0;
        self.max_lng = 180.0;

        if let Some(bounds) = bounds {
            self.min_lat = bounds.south();
            self.max_lat = bounds.north();
            self.min_lng = bounds.west();
            self.max_lng = bounds.east();
            if self.max_lng < self.min_lng {
                self.max_lng += 360.0;
            }
        }

        self.world_min_x = mercator_x_from_lng(self.min_lng) * self.tile_size;
        self.world_max_x = mercator_x_from_lng(self.max_lng) * self.tile_size;
        self.world_min_y = mercator_y_from_lat(self.max_lat) * self.tile_size;
        self.world_max_y = mercator_y_from_lat(self.min_lat) * self.tile_size;

        self.constrain();
    }

    /// Lets the view zoom out past the point where the world fills it
    pub fn set_allow_world_under_zoom(&mut self, allow: bool) {
        self.allow_world_under_zoom = allow;
    }

    /// Flag for callers inspecting a fixed tile cover
    pub fn freeze_tile_coverage(&self) -> bool {
        self.freeze_tile_coverage
    }

    pub fn set_freeze_tile_coverage(&mut self, freeze: bool) {
        self.freeze_tile_coverage = freeze;
    }

    pub fn fog_cull_dist_sq(&self) -> Option<f64> {
        self.fog_cull_dist_sq
    }

    /// Squared fog distance past which tiles are dropped from the cover
    pub fn set_fog_cull_dist_sq(&mut self, dist_sq: Option<f64>) {
        self.fog_cull_dist_sq = dist_sq;
    }

    /// True if the last terrain constraint left the camera below its
    /// minimum height instead of lifting it
    pub fn is_camera_constrained(&self) -> bool {
        self.is_camera_constrained
    }

    /// Level-of-detail splitting is off: the cover then uses a single zoom
    pub fn is_lod_disabled(&self, check_pitch: bool) -> bool {
        (!check_pitch || self.pitch() <= MIN_LOD_PITCH)
            && self.edge_insets.top <= self.edge_insets.bottom
            && self.elevation.is_none()
            && !self.projection.is_reprojected_in_tile_space
    }

    // Scale conversions

    pub fn pixels_per_meter(&self) -> f64 {
        self.projection.pixels_per_meter(self.center.lat, self.world_size())
    }

    pub fn camera_pixels_per_meter(&self) -> f64 {
        mercator_z_from_altitude(1.0, self.center.lat) * self.camera_world_size_for_fog()
    }

    /// World size at which the camera sits at its distance from the average
    /// elevation
    pub fn camera_world_size_for_fog(&self) -> f64 {
        let distance = self
            .camera
            .distance_to_elevation(self.average_elevation)
            .max(f64::EPSILON);
        self.world_size_from_zoom(self.zoom_from_mercator_z(distance))
    }

    pub fn camera_world_size(&self) -> f64 {
        self.camera_world_size_for_fog()
    }

    pub fn camera_to_center_distance(&self) -> f64 {
        self.camera_to_center_distance
    }

    pub fn near_z(&self) -> f64 {
        self.near_z
    }

    pub fn far_z(&self) -> f64 {
        self.far_z
    }

    pub fn globe_radius(&self) -> f64 {
        self.globe_radius
    }

    pub fn globe_center_in_view_space(&self) -> Vector3<f64> {
        self.globe_center_in_view_space
    }

    fn world_size_from_zoom(&self, zoom: f64) -> f64 {
        2f64.powf(zoom) * self.tile_size
    }

    /// Camera altitude in mercator units that corresponds to `zoom`
    pub fn mercator_z_from_zoom(&self, zoom: f64) -> f64 {
        self.camera_to_center_distance / self.world_size_from_zoom(zoom)
    }

    /// Zoom at which the camera sits `z` mercator units above the center
    pub fn zoom_from_mercator_z(&self, z: f64) -> f64 {
        Transform::scale_zoom(self.camera_to_center_distance / (z.max(0.0) * self.tile_size))
    }

    /// Camera to center distance that `projection` would use at `zoom`
    pub fn camera_to_center_distance_for(
        &self,
        projection: &Projection,
        zoom: f64,
        world_size: f64,
    ) -> f64 {
        let t = projection_interpolation_t(projection, zoom, self.width, self.height, 1024.0);
        let scaler = projection.pixel_space_conversion(self.center.lat, world_size, t);
        let distance = 0.5 / (self.fov * 0.5).tan() * self.height * scaler;
        if self.is_orthographic() {
            let mix = (self.pitch() / ORTHOGRAPHIC_PITCH_TRANSITION).min(1.0);
            return lerp(1.0, distance, ease_in(mix));
        }
        distance
    }

    /// Globe variant of [`Transform::zoom_from_mercator_z`]: the camera
    /// distance itself depends on zoom there, so the zoom is searched for
    pub fn zoom_from_mercator_z_adjusted(&self, mercator_z: f64) -> f64 {
        debug_assert!(self.projection.is_globe());
        debug_assert!(mercator_z != 0.0);

        let mut zoom_low = 0.0;
        let mut zoom_high = GLOBE_ZOOM_THRESHOLD_MAX;
        let mut zoom = 0.0;
        let mut min_zoom_diff = f64::INFINITY;
        const EPSILON: f64 = 1e-6;

        while zoom_high - zoom_low > EPSILON && zoom_high > zoom_low {
            let zoom_mid = zoom_low + (zoom_high - zoom_low) * 0.5;
            let world_size = self.tile_size * 2f64.powf(zoom_mid);
            let d = self.camera_to_center_distance_for(&self.projection, zoom_mid, world_size);
            let new_zoom = Transform::scale_zoom(d / (mercator_z.max(0.0) * self.tile_size));

            let diff = (zoom_mid - new_zoom).abs();
            if diff < min_zoom_diff {
                min_zoom_diff = diff;
                zoom = zoom_mid;
            }
            if zoom_mid < new_zoom {
                zoom_low = zoom_mid;
            } else {
                zoom_high = zoom_mid;
            }
        }
        zoom
    }

    /// Camera movement along its view ray that changes the zoom by `zoom_delta`
    pub fn zoom_delta_to_movement(&self, center: &Vector3<f64>, zoom_delta: f64) -> f64 {
        let distance = (self.camera.position - center).norm();
        let relative_zoom = self.zoom_from_mercator_z(distance) + zoom_delta;
        distance - self.mercator_z_from_zoom(relative_zoom)
    }

    // Elevation

    pub fn elevation(&self) -> Option<&Arc<dyn Elevation>> {
        self.elevation.as_ref()
    }

    /// Attaches or detaches a terrain provider. The same provider is a no-op.
    pub fn set_elevation(&mut self, elevation: Option<Arc<dyn Elevation>>) {
        let same = match (&self.elevation, &elevation) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if same {
            return;
        }
        self.elevation = elevation;
        self.update_camera_on_terrain();
        self.calc_matrices();
    }

    /// Re-reads the terrain after new data was loaded or the exaggeration
    /// changed. With `constrain_camera` the camera is kept above the ground,
    /// and `adapt_camera_altitude` lifts it instead of just flagging it.
    pub fn update_elevation(&mut self, constrain_camera: bool, adapt_camera_altitude: bool) {
        let center_altitude_changed = self.elevation.as_ref().map_or(false, |e| {
            Some(e.exaggeration()) != self.center_altitude_valid_for_exaggeration
        });
        if self.sea_level_zoom.is_none() || center_altitude_changed {
            self.update_camera_on_terrain();
        }
        if constrain_camera || center_altitude_changed {
            self.constrain_camera(adapt_camera_altitude);
        }
        self.calc_matrices();
    }

    /// Terrain elevation under the center in meters
    pub fn center_altitude(&self) -> f64 {
        self.center_altitude
    }

    pub fn sea_level_zoom(&self) -> Option<f64> {
        self.sea_level_zoom
    }

    pub fn average_elevation(&self) -> f64 {
        self.average_elevation
    }

    pub fn set_average_elevation(&mut self, average_elevation: f64) {
        self.average_elevation = average_elevation;
        self.calc_fog_matrices();
        self.caches.distance.clear();
    }

    pub fn camera_elevation_reference(&self) -> CameraElevationReference {
        self.camera_elevation_reference
    }

    pub fn set_camera_elevation_reference(&mut self, reference: CameraElevationReference) {
        self.camera_elevation_reference = reference;
    }

    /// The elevation provider, unless the projection cannot drape terrain
    pub(crate) fn terrain(&self) -> Option<&Arc<dyn Elevation>> {
        self.elevation.as_ref().filter(|_| self.projection.supports_terrain)
    }

    fn terrain_enabled(&self) -> bool {
        if self.elevation.is_none() {
            return false;
        }
        if !self.projection.supports_terrain {
            TERRAIN_UNSUPPORTED.call_once(|| {
                log::warn!(
                    "terrain is not supported with the {} projection, use mercator or globe",
                    self.projection.name()
                );
            });
            return false;
        }
        true
    }

    fn update_camera_on_terrain(&mut self) {
        let Some(elevation) = self.elevation.clone() else {
            self.reset_center_altitude();
            return;
        };
        let exaggeration = elevation.exaggeration();
        let coord = self.location_coordinate(&self.center, None);
        let mut at_center = elevation.get_at_point(&coord, f64::NEG_INFINITY);
        if at_center.is_nan() {
            log::warn!("elevation provider returned NaN at {:?}", self.center);
            at_center = f64::NEG_INFINITY;
        }

        let previous = self.center_altitude_valid_for_exaggeration.filter(|e| *e != 0.0);
        let use_previous_center = at_center == f64::NEG_INFINITY
            && !elevation.visible_dem_tiles().is_empty()
            && exaggeration > 0.0
            && previous.is_some();
        if at_center == f64::NEG_INFINITY && !(use_previous_center && self.center_altitude != 0.0) {
            self.reset_center_altitude();
            return;
        }

        match previous {
            Some(prev)
                if use_previous_center
                    || (self.center_altitude != 0.0 && exaggeration != 0.0 && prev != exaggeration) =>
            {
                self.center_altitude = self.center_altitude / prev * exaggeration;
            }
            _ => self.center_altitude = at_center,
        }
        self.center_altitude_valid_for_exaggeration = Some(exaggeration);
        self.update_sea_level_zoom();
    }

    fn reset_center_altitude(&mut self) {
        self.center_altitude = 0.0;
        self.sea_level_zoom = None;
        self.center_altitude_valid_for_exaggeration = None;
    }

    fn update_sea_level_zoom(&mut self) {
        if self.center_altitude_valid_for_exaggeration.is_none() {
            return;
        }
        let height = self.camera_to_center_distance;
        let terrain_elevation = self.pixels_per_meter() * self.center_altitude;
        let mercator_z = ((terrain_elevation + height) / self.world_size()).max(0.0);
        self.sea_level_zoom = Some(self.zoom_from_mercator_z(mercator_z));
    }

    /// Keeps the camera at its sea-level altitude as the ground under the
    /// center changes
    fn update_zoom_from_elevation(&mut self) {
        let (Some(sea_level_zoom), Some(elevation)) = (self.sea_level_zoom, self.elevation.as_ref())
        else {
            return;
        };
        let at_center = elevation.get_at_point_or_zero(&self.location_coordinate(&self.center, None));
        let mercator_elevation = self.pixels_per_meter() / self.world_size() * at_center;
        let altitude = self.mercator_z_from_zoom(sea_level_zoom);
        let min_height = self.mercator_z_from_zoom(self.max_zoom);
        let height = (altitude - mercator_elevation).max(min_height);
        self.apply_zoom(self.zoom_from_mercator_z(height));
    }

    fn minimum_height_over_terrain(&self) -> f64 {
        let zoom = self.sea_level_zoom.unwrap_or(self.zoom).min(self.max_zoom) + MAX_DRAPE_OVERZOOM;
        self.mercator_z_from_zoom(zoom)
    }

    /// Moves the center to where the view ray meets the terrain, keeping the
    /// camera where it is
    pub fn recenter_on_terrain(&mut self) {
        if self.projection.is_globe() {
            return;
        }
        let Some(elevation) = self.elevation.clone() else {
            return;
        };
        self.update_camera_state();

        let merc_pixels_per_meter = mercator_z_from_altitude(1.0, self.center.lat) * self.world_size();
        let mut start = self.compute_camera_position(Some(merc_pixels_per_meter));
        let mut dir = self.camera.forward();

        // The raycast expects z in meters
        let meters_to_merc = mercator_z_from_altitude(1.0, self.center.lat);
        start.z /= meters_to_merc;
        dir.z /= meters_to_merc;
        let dir = dir.normalize();

        let Some(t) = elevation.raycast(&start, &dir, elevation.exaggeration()) else {
            return;
        };
        let point = start + dir * t;
        let new_center = MercatorCoordinate::new(
            point.x,
            point.y,
            mercator_z_from_altitude(point.z, lat_from_mercator_y(point.y)),
        );
        let cam_to_new = Vector3::new(
            new_center.x - start.x,
            new_center.y - start.y,
            new_center.z - start.z * meters_to_merc,
        );
        let max_altitude = (new_center.z + cam_to_new.norm()) * self.pixels_per_mercator_pixel;
        self.sea_level_zoom = Some(self.zoom_from_mercator_z(max_altitude));

        self.center_altitude = new_center.to_altitude();
        self.center = self.coordinate_location(&new_center);
        self.update_zoom_from_elevation();
        self.constrain();
        self.calc_matrices();
    }

    // Camera

    pub fn camera(&self) -> &FreeCamera {
        &self.camera
    }

    pub(crate) fn update_camera_state(&mut self) {
        if self.height == 0.0 {
            return;
        }
        self.camera.set_pitch_bearing(self.pitch, self.angle);
        self.camera.position = self.compute_camera_position(None);
    }

    /// Camera position in mercator units for the current center, zoom and
    /// orientation. Heights are expressed with `target_pixels_per_meter`.
    fn compute_camera_position(&self, target_pixels_per_meter: Option<f64>) -> Vector3<f64> {
        let pixels_per_meter = self.pixels_per_meter();
        let target = target_pixels_per_meter.unwrap_or(pixels_per_meter);
        let conversion = target / pixels_per_meter;
        let ws = self.world_size();

        let dir = self.camera.forward();
        let center = self.point();
        let zoom = self.sea_level_zoom.filter(|z| *z != 0.0).unwrap_or(self.zoom);
        let altitude = self.mercator_z_from_zoom(zoom) * conversion;
        let distance = altitude - target / ws * self.center_altitude;

        Vector3::new(
            center.x / ws - dir.x * distance,
            center.y / ws - dir.y * distance,
            target / ws * self.center_altitude - dir.z * distance,
        )
    }

    /// Derives center, zoom, pitch and bearing from the free camera
    fn update_state_from_camera(&mut self) {
        let mut position = self.camera.position;
        let dir = self.camera.forward();
        let (pitch, bearing) = self.camera.pitch_bearing();

        let center_altitude = mercator_z_from_altitude(self.center_altitude, self.center.lat)
            * self.pixels_per_mercator_pixel;
        let min_height = self.mercator_z_from_zoom(self.max_zoom) * self.max_pitch.to_radians().cos();
        let height = ((position.z - center_altitude) / pitch.cos()).max(min_height);
        let zoom = self.zoom_from_mercator_z(height);

        position += dir * height;

        self.pitch = clamp(pitch, self.min_pitch.to_radians(), self.max_pitch.to_radians());
        self.angle = wrap(bearing, -PI, PI);
        self.apply_zoom(clamp(zoom, self.min_zoom, self.max_zoom));
        self.update_sea_level_zoom();

        self.center = self.coordinate_location(&MercatorCoordinate::new(position.x, position.y, position.z));
        self.unmodified = false;
        self.constrain();
        self.calc_matrices();
    }

    /// Camera position and orientation
    pub fn get_free_camera_options(&mut self) -> FreeCameraOptions {
        self.update_camera_state();
        let pos = self.camera.position;
        let mut options = FreeCameraOptions::new(
            Some(MercatorCoordinate::new(pos.x, pos.y, pos.z)),
            Some(self.camera.orientation),
        );
        options.render_world_copies = self.render_world_copies();
        options
    }

    /// Drives the view from a camera position and orientation. Returns
    /// whether anything changed; an orientation looking up from below the
    /// horizon is rejected and leaves the state untouched.
    pub fn set_free_camera_options(&mut self, options: &FreeCameraOptions) -> bool {
        if self.height == 0.0 {
            return false;
        }
        let position = options.position();
        if position.is_none() && options.orientation.is_none() {
            return false;
        }
        self.update_camera_state();

        let mut changed = false;
        if let Some(orientation) = options.orientation {
            if orientation != self.camera.orientation {
                changed = self.set_camera_orientation(&orientation);
            }
        }
        if let Some(position) = position {
            let new_position = Vector3::new(position.x, position.y, position.z);
            if new_position != self.camera.position {
                self.set_camera_position(new_position);
                changed = true;
            }
        }
        if changed {
            self.update_state_from_camera();
            self.recenter_on_terrain();
        }
        changed
    }

    fn set_camera_orientation(&mut self, orientation: &UnitQuaternion<f64>) -> bool {
        let forward = orientation * Vector3::new(0.0, 0.0, -1.0);
        let up = orientation * Vector3::new(0.0, -1.0, 0.0);
        if up.z < 0.0 {
            return false;
        }
        match orientation_from_frame(&forward, &up) {
            Some(updated) => {
                self.camera.orientation = updated;
                true
            }
            None => false,
        }
    }

    fn set_camera_position(&mut self, mut position: Vector3<f64>) {
        let min_world_size = Transform::zoom_scale(self.min_zoom) * self.tile_size;
        let max_world_size = Transform::zoom_scale(self.max_zoom) * self.tile_size;
        let dist_to_center = self.camera_to_center_distance;
        position.z = clamp(
            position.z,
            dist_to_center / max_world_size,
            dist_to_center / min_world_size,
        );
        self.camera.position = position;
    }

    /// Zoom the camera would have if its distance to `position` became the
    /// center distance
    pub fn compute_zoom_relative_to(&self, position: &MercatorCoordinate) -> f64 {
        let intersection = self.point_ray_intersection(&self.center_point(), Some(position.to_altitude()));
        let on_target_altitude = self.ray_intersection_coordinate(&intersection);

        let target = if position.z < self.camera.position.z {
            Vector3::new(on_target_altitude.x, on_target_altitude.y, on_target_altitude.z)
        } else {
            Vector3::new(position.x, position.y, position.z)
        };
        let dist_to_target = (self.camera.position - target).norm();
        clamp(self.zoom_from_mercator_z(dist_to_target), self.min_zoom, self.max_zoom)
    }

    /// Moves the camera by `translation`, not letting it rise past the
    /// altitude at which the bounded world still fills the view
    pub fn translate_camera_constrained(&mut self, translation: &Vector3<f64>) {
        let max_distance = self.max_camera_bounds_distance();
        let max_z = max_distance * self.pitch.cos();
        let z = self.camera.position.z;
        let delta_z = translation.z;

        if self.projection.wrap {
            self.center = self.center.wrap();
        }
        let t = if delta_z > 0.0 {
            ((max_z - z) / delta_z).min(1.0)
        } else {
            1.0
        };
        self.camera.position += translation * t;
        self.update_state_from_camera();
    }

    fn min_zoom_for_bounds(&self) -> f64 {
        let mut min_zoom = Transform::scale_zoom(self.height.max(0.0) / (self.world_max_y - self.world_min_y)).max(0.0);
        if self.max_bounds.is_some() {
            min_zoom = min_zoom.max(Transform::scale_zoom(self.width / (self.world_max_x - self.world_min_x)));
        }
        min_zoom
    }

    fn max_camera_bounds_distance(&self) -> f64 {
        self.mercator_z_from_zoom(self.min_zoom_for_bounds())
    }

    // Constraints

    /// Keeps the camera above the terrain. With `adapt_camera_altitude` (or
    /// when the camera is underground) it is lifted while keeping its
    /// distance to the center; otherwise it is only flagged as constrained.
    fn constrain_camera(&mut self, adapt_camera_altitude: bool) {
        let Some(elevation) = self.elevation.clone() else {
            return;
        };
        let merc_pixels_per_meter = mercator_z_from_altitude(1.0, self.center.lat) * self.world_size();
        let pos = self.compute_camera_position(Some(merc_pixels_per_meter));
        let elevation_at_camera = elevation.get_at_point_or_zero(&MercatorCoordinate::new(pos.x, pos.y, pos.z));
        let terrain_elevation = self.pixels_per_meter() / self.world_size() * elevation_at_camera;
        let min_height = self.minimum_height_over_terrain();
        let camera_height = pos.z - terrain_elevation;

        if camera_height > min_height {
            return;
        }
        if camera_height < 0.0 || adapt_camera_altitude {
            let center = self.location_coordinate(&self.center, Some(self.center_altitude));
            let mut camera_to_center = Vector3::new(pos.x, pos.y, center.z - pos.z);
            let prev_dist = camera_to_center.norm();
            camera_to_center.z -= (min_height - camera_height) / self.pixels_per_mercator_pixel;
            let new_dist = camera_to_center.norm();
            if new_dist == 0.0 {
                return;
            }
            camera_to_center *= prev_dist / new_dist * self.pixels_per_mercator_pixel;
            log::debug!("lifting camera {} above terrain", min_height - camera_height);
            self.camera.position = Vector3::new(
                pos.x,
                pos.y,
                center.z * self.pixels_per_mercator_pixel - camera_to_center.z,
            );
            self.update_state_from_camera();
        } else {
            self.is_camera_constrained = true;
        }
    }

    /// Re-centers and rescales the view so the configured bounds are
    /// respected. Guarded against re-entry from the setters it calls.
    fn constrain(&mut self) {
        if self.width == 0.0 || self.height == 0.0 || self.constraining {
            return;
        }
        self.constraining = true;
        let is_globe = self.projection.is_globe() || self.mercator_from_transition;

        if self.projection.is_reprojected_in_tile_space || is_globe {
            self.center.lat = clamp(self.center.lat, self.min_lat, self.max_lat);
            if self.max_bounds.is_some() || !(self.render_world_copies() || is_globe) {
                self.center.lng = clamp(self.center.lng, self.min_lng, self.max_lng);
            }
            self.constraining = false;
            return;
        }

        let unmodified = self.unmodified;
        let Point { x, y } = self.point();
        let mut s: f64 = 0.0;
        let mut x2 = x;
        let mut y2 = y;
        let w2 = self.width / 2.0;
        let h2 = self.height / 2.0;

        let min_y = self.world_min_y * self.scale;
        let max_y = self.world_max_y * self.scale;
        if y - h2 < min_y {
            y2 = min_y + h2;
        }
        if y + h2 > max_y {
            y2 = max_y - h2;
        }
        if max_y - min_y < self.height {
            s = s.max(self.height / (max_y - min_y));
            y2 = (max_y + min_y) / 2.0;
        }

        if self.max_bounds.is_some() || !self.render_world_copies || !self.projection.wrap {
            let min_x = self.world_min_x * self.scale;
            let max_x = self.world_max_x * self.scale;
            let ws = self.world_size();

            // Shift so that the map snaps to the nearest edge
            let shift = ws / 2.0 - (min_x + max_x) / 2.0;
            x2 = (x + shift + ws) % ws - shift;

            if x2 - w2 < min_x {
                x2 = min_x + w2;
            }
            if x2 + w2 > max_x {
                x2 = max_x - w2;
            }
            if max_x - min_x < self.width {
                s = s.max(self.width / (max_x - min_x));
                x2 = (max_x + min_x) / 2.0;
            }
        }

        if (x2 != x || y2 != y) && !self.allow_world_under_zoom {
            log::debug!("constraining center from ({x}, {y}) to ({x2}, {y2})");
            let center = self.unproject(&Point::new(x2, y2));
            self.set_center(center);
        }
        if s != 0.0 && !self.allow_world_under_zoom {
            self.set_zoom(self.zoom + Transform::scale_zoom(s));
        }

        self.constrain_camera(false);
        self.unmodified = unmodified;
        self.constraining = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn sized() -> Transform {
        let mut tr = Transform::default();
        tr.resize(512.0, 512.0);
        tr
    }

    #[test]
    fn test_defaults() {
        let tr = Transform::default();
        assert_eq!(tr.tile_size(), 512.0);
        assert_eq!(tr.world_size(), 512.0);
        assert_eq!(tr.zoom(), 0.0);
        assert_eq!(tr.min_zoom(), 0.0);
        assert_eq!(tr.max_zoom(), 22.0);
        assert_eq!(tr.max_pitch(), 60.0);
        assert!(approx_eq(tr.fov(), 36.86989764584402));
        assert!(tr.render_world_copies());
        assert!(tr.unmodified());
    }

    #[test]
    fn test_zoom_is_clamped() {
        let mut tr = sized();
        tr.set_zoom(30.0);
        assert_eq!(tr.zoom(), 22.0);
        tr.set_zoom(-4.0);
        assert_eq!(tr.zoom(), 0.0);
        tr.set_zoom(3.25);
        assert_eq!(tr.tile_zoom(), 3.0);
        assert_eq!(tr.zoom_fraction(), 0.25);
        assert_eq!(tr.world_size(), 512.0 * 2f64.powf(3.25));
        assert!(!tr.unmodified());
    }

    #[test]
    fn test_min_and_max_zoom_pull_zoom_along() {
        let mut tr = sized();
        tr.set_zoom(5.0);
        tr.set_max_zoom(4.0);
        assert_eq!(tr.zoom(), 4.0);
        // An inverted range resolves to the max zoom
        tr.set_min_zoom(4.5);
        assert_eq!(tr.zoom(), 4.0);

        let mut tr = sized();
        tr.set_zoom(2.0);
        tr.set_min_zoom(3.0);
        assert_eq!(tr.zoom(), 3.0);
    }

    #[test]
    fn test_frozen_tile_coverage_still_constrains() {
        let mut tr = sized();
        tr.set_zoom(3.0);
        tr.set_freeze_tile_coverage(true);
        tr.set_center(LatLng::new(89.0, 0.0));
        assert!(tr.freeze_tile_coverage());
        assert!(tr.center().lat < 85.06);
    }

    #[test]
    fn test_pitch_is_clamped_and_stored_in_radians() {
        let mut tr = sized();
        tr.set_pitch(90.0);
        assert!(approx_eq(tr.pitch(), 60.0));
        assert!(approx_eq(tr.pitch_radians(), 60f64.to_radians()));
        tr.set_max_pitch(45.0);
        assert!(approx_eq(tr.pitch(), 45.0));
        tr.set_pitch(-10.0);
        assert_eq!(tr.pitch(), 0.0);
    }

    #[test]
    fn test_bearing_wraps() {
        let mut tr = sized();
        tr.set_bearing(190.0);
        assert!(approx_eq(tr.bearing(), -170.0));
        assert!(approx_eq(tr.rotation(), 190.0));
        tr.set_bearing(-180.0);
        assert!(approx_eq(tr.bearing(), 180.0));
    }

    #[test]
    fn test_fov_is_clamped() {
        let mut tr = sized();
        tr.set_fov(120.0);
        assert!(approx_eq(tr.fov(), 60.0));
        tr.set_fov(0.0);
        assert!(approx_eq(tr.fov(), 0.01));
    }

    #[test]
    fn test_padding_moves_center_point() {
        let mut tr = sized();
        tr.set_padding(PaddingOptions {
            top: Some(100.0),
            ..Default::default()
        });
        assert_eq!(tr.center_point(), Point::new(256.0, 306.0));
        assert_eq!(tr.center_offset(), Point::new(0.0, 50.0));
        assert!(tr.fov_above_center() > tr.fov_x() * 0.5);
        assert!(!tr.is_padding_equal(&PaddingOptions::default()));
        assert!(tr.is_padding_equal(&PaddingOptions::from(EdgeInsets::new(100.0, 0.0, 0.0, 0.0))));
    }

    #[test]
    fn test_covering_zoom_level() {
        let mut tr = sized();
        tr.set_zoom(3.6);
        assert_eq!(tr.covering_zoom_level(&CoveringTilesOptions::new(512.0)), 3);
        assert_eq!(tr.covering_zoom_level(&CoveringTilesOptions::new(512.0).with_round_zoom(true)), 4);
        assert_eq!(tr.covering_zoom_level(&CoveringTilesOptions::new(256.0)), 4);
        tr.set_zoom(0.0);
        assert_eq!(tr.covering_zoom_level(&CoveringTilesOptions::new(1024.0)), 0);
    }

    #[test]
    fn test_mercator_z_and_zoom_are_inverse() {
        let mut tr = sized();
        tr.set_zoom(7.0);
        let z = tr.mercator_z_from_zoom(9.5);
        assert!(approx_eq(tr.zoom_from_mercator_z(z), 9.5));
    }

    #[test]
    fn test_set_projection_reports_change() {
        let mut tr = sized();
        assert!(!tr.set_projection(None).unwrap());
        assert!(tr.set_projection(Some(&ProjectionSpec::new("globe"))).unwrap());
        assert!(tr.projection().is_globe());
        assert!(!tr.render_world_copies());
        assert!(tr.set_projection(Some(&ProjectionSpec::new("unknown"))).is_err());
        assert!(tr.projection().is_globe());
    }

    #[test]
    fn test_constrain_keeps_world_in_view() {
        let mut tr = sized();
        tr.set_zoom(1.0);
        tr.set_center(LatLng::new(85.0, 0.0));
        // At zoom 1 the world is 1024px tall; the top edge may not leave the top
        let p = tr.point();
        assert!((p.y - 256.0).abs() < 1e-3);
        assert!(tr.center().lat < 85.0);
    }

    #[test]
    fn test_constrain_zooms_in_to_fill_view() {
        let mut tr = Transform::default();
        tr.resize(1024.0, 1024.0);
        // The world is only 512px tall at zoom 0. The latitude clamp makes it
        // a hair taller than that.
        assert!((tr.zoom() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_constrain_is_idempotent() {
        let mut tr = sized();
        tr.set_zoom(2.0);
        tr.set_center(LatLng::new(80.0, 170.0));
        let (center, zoom) = (tr.center(), tr.zoom());
        tr.constrain();
        tr.constrain();
        assert!((tr.center().lat - center.lat).abs() < 1e-9);
        assert!((tr.center().lng - center.lng).abs() < 1e-9);
        assert_eq!(tr.zoom(), zoom);
    }

    #[test]
    fn test_max_bounds_clamp_center() {
        let mut tr = sized();
        tr.set_zoom(8.0);
        tr.set_max_bounds(Some(LatLngBounds::from_coords(40.0, -75.0, 41.0, -73.0)));
        tr.set_center(LatLng::new(10.0, 10.0));
        let center = tr.center();
        assert!(center.lat >= 40.0 && center.lat <= 41.0);
        assert!(center.lng >= -75.0 && center.lng <= -73.0);
    }

    #[test]
    fn test_free_camera_round_trip() {
        let mut tr = sized();
        tr.set_zoom(10.0);
        tr.set_center(LatLng::new(40.0, -74.0));
        tr.set_pitch(30.0);
        tr.set_bearing(45.0);
        let options = tr.get_free_camera_options();

        let mut other = sized();
        assert!(other.set_free_camera_options(&options));
        assert!((other.zoom() - 10.0).abs() < 1e-6);
        assert!((other.pitch() - 30.0).abs() < 1e-6);
        assert!((other.bearing() - 45.0).abs() < 1e-6);
        assert!((other.center().lat - 40.0).abs() < 1e-6);
        assert!((other.center().lng + 74.0).abs() < 1e-6);
    }

    #[test]
    fn test_free_camera_rejects_upside_down_orientation() {
        let mut tr = sized();
        tr.set_zoom(4.0);
        let before = tr.get_free_camera_options();
        let upside_down = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.5);
        let options = FreeCameraOptions::new(None, Some(upside_down));
        assert!(!tr.set_free_camera_options(&options));
        assert_eq!(tr.get_free_camera_options(), before);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut tr = sized();
        tr.set_zoom(3.0);
        let clone = tr.clone();
        tr.set_zoom(5.0);
        assert_eq!(clone.zoom(), 3.0);
        assert_eq!(*clone.proj_matrix(), {
            let mut again = sized();
            again.set_zoom(3.0);
            *again.proj_matrix()
        });
    }
}
