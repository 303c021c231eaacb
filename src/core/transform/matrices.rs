use super::Transform;
use crate::core::constants::{EXTENT, ORTHOGRAPHIC_PITCH_TRANSITION};
use crate::core::geo::{ease_in, lerp, mercator_z_from_altitude};
use crate::projection::adjustments::{projection_adjustment_inverted, projection_adjustments, projection_interpolation_t};
use crate::projection::globe::{calculate_globe_matrix, GLOBE_SCALE_MATCH_LATITUDE};
use crate::projection::tile_transform::TileTransform;
use crate::projection::ZAxisUnit;
use crate::rendering::camera::{orthographic, perspective};
use crate::spatial::culling::{Frustum, FrustumCorners};
use crate::tiles::tile_id::{OverscaledTileID, UnwrappedTileID};
use crate::prelude::HashMap;
use crate::{Error, Result};
use nalgebra::{Matrix2, Matrix4, Vector3, Vector4};

/// Values a shader needs to compute the distance of a feature from the
/// camera's center line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceTileData {
    /// Unit vector pointing up the screen
    pub bearing: [f64; 2],
    /// Map center relative to the tile, in map heights
    pub center: [f64; 2],
    /// Tile units to map heights
    pub scale: f64,
}

/// Per-tile results that only depend on the current matrices. Emptied
/// whenever those are recomputed; a cloned transform starts without them.
#[derive(Debug, Default)]
pub(crate) struct TileCaches {
    pub(crate) proj: HashMap<u64, Matrix4<f64>>,
    pub(crate) aligned: HashMap<u64, Matrix4<f64>>,
    pub(crate) expanded: HashMap<u64, Matrix4<f64>>,
    pub(crate) fog: HashMap<u64, Matrix4<f64>>,
    pub(crate) distance: HashMap<u64, DistanceTileData>,
    pub(crate) pixels_to_tile_units: HashMap<u64, Matrix2<f64>>,
}

impl Clone for TileCaches {
    fn clone(&self) -> Self {
        TileCaches::default()
    }
}

impl TileCaches {
    pub(crate) fn clear(&mut self) {
        self.proj.clear();
        self.aligned.clear();
        self.expanded.clear();
        self.fog.clear();
        self.distance.clear();
        self.pixels_to_tile_units.clear();
    }
}

fn lerp_matrix(a: &Matrix4<f64>, b: &Matrix4<f64>, t: f64) -> Matrix4<f64> {
    a.zip_map(b, |x, y| lerp(x, y, t))
}

impl Transform {
    /// Recomputes every derived matrix and scalar from the view state
    pub(crate) fn calc_matrices(&mut self) {
        if self.height == 0.0 {
            return;
        }
        let offset = self.center_offset();
        let is_globe = self.projection.is_globe();
        let pixels_per_meter = self.pixels_per_meter();
        let ws = self.world_size();

        if is_globe {
            self.mercator_scale_ratio = mercator_z_from_altitude(1.0, self.center.lat)
                / mercator_z_from_altitude(1.0, GLOBE_SCALE_MATCH_LATITUDE);
        }

        let t = projection_interpolation_t(&self.projection, self.zoom(), self.width, self.height, 1024.0);
        self.pixels_per_mercator_pixel = self.projection.pixel_space_conversion(self.center.lat, ws, t);
        self.camera_to_center_distance =
            0.5 / (self.fov * 0.5).tan() * self.height * self.pixels_per_mercator_pixel;

        self.update_camera_state();

        self.far_z = self.projection.farthest_pixel_distance(self);
        self.near_z = self.height / 50.0;

        let z_unit = match self.projection.z_axis_unit {
            ZAxisUnit::Meters => pixels_per_meter,
            ZAxisUnit::Pixels => 1.0,
        };
        let world_to_camera = self.camera.world_to_camera(ws, z_unit);

        let aspect = self.aspect();
        let mut camera_to_clip_perspective = perspective(self.fov, aspect, self.near_z, self.far_z);
        camera_to_clip_perspective[(0, 2)] = -offset.x * 2.0 / self.width;
        camera_to_clip_perspective[(1, 2)] = offset.y * 2.0 / self.height;

        let camera_to_clip = if self.is_orthographic() {
            let distance = 0.5 * self.height / (self.fov / 2.0).tan();
            let mut top = distance * (self.fov * 0.5).tan();
            let mut right = top * aspect;
            let mut left = -right;
            let mut bottom = -top;
            right -= offset.x;
            left -= offset.x;
            top += offset.y;
            bottom += offset.y;
            let ortho = orthographic(left, right, bottom, top, self.near_z, self.far_z);
            let mix = (self.pitch() / ORTHOGRAPHIC_PITCH_TRANSITION).min(1.0);
            lerp_matrix(&ortho, &camera_to_clip_perspective, ease_in(mix))
        } else {
            camera_to_clip_perspective
        };

        let mut world_to_clip_perspective = camera_to_clip_perspective * world_to_camera;
        let mut m = camera_to_clip * world_to_camera;

        if self.projection.is_reprojected_in_tile_space {
            let mc = self.location_coordinate(&self.center, None);
            let adjustments = Matrix4::new_translation(&Vector3::new(mc.x * ws, mc.y * ws, 0.0))
                * projection_adjustments(self, false)
                * Matrix4::new_translation(&Vector3::new(-mc.x * ws, -mc.y * ws, 0.0));
            m *= adjustments;
            world_to_clip_perspective *= adjustments;
            self.inverse_adjustment_matrix = projection_adjustment_inverted(self).unwrap_or_else(|| {
                log::warn!("projection adjustment is singular, falling back to identity");
                Matrix2::identity()
            });
        } else {
            self.inverse_adjustment_matrix = Matrix2::identity();
        }

        self.mercator_matrix = m * Matrix4::new_nonuniform_scaling(&Vector3::new(ws, ws, ws / z_unit));
        self.proj_matrix = m;

        // Tile cover works on the base matrix; tile elevations are relative
        // to the center elevation
        let mut matrix_error = None;
        match m.try_inverse() {
            Some(inv) => self.inv_proj_matrix = inv,
            None => matrix_error = Some("projection matrix"),
        }

        self.expanded_far_z_proj_matrix = if is_globe {
            let mut expanded = perspective(self.fov, aspect, self.near_z, f64::INFINITY);
            expanded[(0, 2)] = -offset.x * 2.0 / self.width;
            expanded[(1, 2)] = offset.y * 2.0 / self.height;
            expanded * world_to_camera
        } else {
            self.proj_matrix
        };

        match camera_to_clip.try_inverse() {
            Some(clip_to_camera) => {
                self.frustum_corners = Some(FrustumCorners::from_inv_projection_matrix(
                    &clip_to_camera,
                    self.horizon_line_from_top(true),
                    self.height,
                ));
            }
            None => {
                self.frustum_corners = None;
                matrix_error.get_or_insert("camera to clip matrix");
            }
        }
        self.camera_frustum = matrix_error
            .is_none()
            .then(|| Frustum::from_inv_projection_matrix(&self.inv_proj_matrix, ws, 0.0, !is_globe));

        // Snap raster tiles to the pixel grid. Odd viewport sizes shift by
        // half a pixel, rotated with the map and kept within half a pixel.
        let point = self.point();
        let (x, y) = (point.x, point.y);
        let x_shift = (self.width % 2.0) / 2.0;
        let y_shift = (self.height % 2.0) / 2.0;
        let (angle_sin, angle_cos) = self.angle.sin_cos();
        let dx = x - x.round() + angle_cos * x_shift + angle_sin * y_shift;
        let dy = y - y.round() + angle_cos * y_shift + angle_sin * x_shift;
        self.aligned_proj_matrix = m * Matrix4::new_translation(&Vector3::new(
            if dx > 0.5 { dx - 1.0 } else { dx },
            if dy > 0.5 { dy - 1.0 } else { dy },
            0.0,
        ));

        self.label_plane_matrix = Matrix4::new_nonuniform_scaling(&Vector3::new(self.width / 2.0, -self.height / 2.0, 1.0))
            * Matrix4::new_translation(&Vector3::new(1.0, -1.0, 0.0));

        self.gl_coord_matrix = Matrix4::new_nonuniform_scaling(&Vector3::new(1.0, -1.0, 1.0))
            * Matrix4::new_translation(&Vector3::new(-1.0, -1.0, 0.0))
            * Matrix4::new_nonuniform_scaling(&Vector3::new(2.0 / self.width, 2.0 / self.height, 1.0));

        // Location to screen
        self.pixel_matrix = self.label_plane_matrix * world_to_clip_perspective;

        self.calc_fog_matrices();

        let Some(pixel_inverse) = self.pixel_matrix.try_inverse() else {
            log::error!("pixel matrix is singular, keeping the previous inverse");
            self.matrix_error = Some("pixel matrix");
            self.caches.clear();
            return;
        };
        self.pixel_matrix_inverse = pixel_inverse;

        if is_globe || self.mercator_from_transition {
            self.globe_matrix = calculate_globe_matrix(self);
            let center: Vector4<f64> = self.globe_matrix.column(3).into_owned();
            self.globe_center_in_view_space = (world_to_camera * center).xyz();
            self.globe_radius = ws / 2.0 / std::f64::consts::PI - 1.0;
        } else {
            self.globe_matrix = pixel_inverse;
        }

        if let Some(name) = matrix_error {
            log::error!("failed to invert the {name}");
        }
        self.matrix_error = matrix_error;
        self.caches.clear();
    }

    /// Fog space is camera-relative and measured in map heights
    pub(crate) fn calc_fog_matrices(&mut self) {
        self.caches.fog.clear();

        let camera_world_size = self.camera_world_size_for_fog();
        let camera_pixels_per_meter = self.camera_pixels_per_meter();
        let window_scale = 1.0 / self.height / self.pixels_per_mercator_pixel;

        let meters_to_pixel = Vector3::new(camera_world_size, camera_world_size, camera_pixels_per_meter) * window_scale;
        let camera_pos = (-self.camera.position).component_mul(&meters_to_pixel);

        self.mercator_fog_matrix =
            Matrix4::new_translation(&camera_pos) * Matrix4::new_nonuniform_scaling(&meters_to_pixel);
        self.world_to_fog_matrix =
            self.camera
                .world_to_camera_position(camera_world_size, camera_pixels_per_meter, window_scale);
    }

    /// Fails with the name of the matrix that could not be inverted during
    /// the last recalculation
    pub fn validate(&self) -> Result<()> {
        match self.matrix_error {
            Some(name) => Err(Error::SingularMatrix(name)),
            None => Ok(()),
        }
    }

    pub fn matrix_error(&self) -> Option<Error> {
        self.matrix_error.map(Error::SingularMatrix)
    }

    pub fn proj_matrix(&self) -> &Matrix4<f64> {
        &self.proj_matrix
    }

    pub fn inv_proj_matrix(&self) -> &Matrix4<f64> {
        &self.inv_proj_matrix
    }

    pub fn aligned_proj_matrix(&self) -> &Matrix4<f64> {
        &self.aligned_proj_matrix
    }

    pub fn expanded_far_z_proj_matrix(&self) -> &Matrix4<f64> {
        &self.expanded_far_z_proj_matrix
    }

    /// Mercator unit square to clip space
    pub fn mercator_matrix(&self) -> &Matrix4<f64> {
        &self.mercator_matrix
    }

    pub fn label_plane_matrix(&self) -> &Matrix4<f64> {
        &self.label_plane_matrix
    }

    pub fn gl_coord_matrix(&self) -> &Matrix4<f64> {
        &self.gl_coord_matrix
    }

    /// World pixels to screen pixels
    pub fn pixel_matrix(&self) -> &Matrix4<f64> {
        &self.pixel_matrix
    }

    pub fn pixel_matrix_inverse(&self) -> &Matrix4<f64> {
        &self.pixel_matrix_inverse
    }

    pub fn globe_matrix(&self) -> &Matrix4<f64> {
        &self.globe_matrix
    }

    pub fn mercator_fog_matrix(&self) -> &Matrix4<f64> {
        &self.mercator_fog_matrix
    }

    pub fn world_to_fog_matrix(&self) -> &Matrix4<f64> {
        &self.world_to_fog_matrix
    }

    pub fn inverse_adjustment_matrix(&self) -> &Matrix2<f64> {
        &self.inverse_adjustment_matrix
    }

    pub fn frustum_corners(&self) -> Option<&FrustumCorners> {
        self.frustum_corners.as_ref()
    }

    /// Frustum in mercator units built with the last matrices
    pub fn camera_frustum(&self) -> Option<&Frustum> {
        self.camera_frustum.as_ref()
    }

    /// Frustum in tile units of `zoom`
    pub fn frustum(&self, zoom: f64) -> Frustum {
        let z_in_meters = self.projection.z_axis_unit == ZAxisUnit::Meters;
        Frustum::from_inv_projection_matrix(&self.inv_proj_matrix, self.world_size(), zoom, z_in_meters)
    }

    pub fn custom_layer_matrix(&self) -> Matrix4<f64> {
        self.mercator_matrix
    }

    /// Globe space to mercator units, only defined for the globe projection
    pub fn globe_to_mercator_matrix(&self) -> Option<Matrix4<f64>> {
        if !self.projection.is_globe() {
            return None;
        }
        let pixels_to_merc = 1.0 / self.world_size();
        Some(Matrix4::new_scaling(pixels_to_merc) * self.globe_matrix)
    }

    pub fn world_to_camera_matrix(&self) -> Matrix4<f64> {
        let z_unit = match self.projection.z_axis_unit {
            ZAxisUnit::Meters => self.pixels_per_meter(),
            ZAxisUnit::Pixels => 1.0,
        };
        let world_to_camera = self.camera.world_to_camera(self.world_size(), z_unit);
        if self.projection.is_globe() {
            world_to_camera * self.globe_matrix
        } else {
            world_to_camera
        }
    }

    /// Tile units to world pixels
    pub fn calculate_pos_matrix(&self, id: &UnwrappedTileID, world_size: f64) -> Matrix4<f64> {
        self.projection.create_tile_matrix(self, world_size, id)
    }

    /// Tile units to clip space, without caching
    pub(crate) fn tile_proj_matrix(&self, id: &UnwrappedTileID, aligned: bool, expanded: bool) -> Matrix4<f64> {
        let pos_matrix = self.calculate_pos_matrix(id, self.world_size());
        let proj_matrix = if self.projection.is_reprojected_in_tile_space {
            &self.mercator_matrix
        } else if expanded {
            debug_assert!(!aligned);
            &self.expanded_far_z_proj_matrix
        } else if aligned {
            &self.aligned_proj_matrix
        } else {
            &self.proj_matrix
        };
        proj_matrix * pos_matrix
    }

    /// Tile units to clip space. `aligned` snaps to the pixel grid and
    /// `expanded` uses the infinite far plane; they are exclusive.
    pub fn calculate_proj_matrix(&mut self, id: &UnwrappedTileID, aligned: bool, expanded: bool) -> Matrix4<f64> {
        let key = id.key();
        let cached = if expanded {
            self.caches.expanded.get(&key)
        } else if aligned {
            self.caches.aligned.get(&key)
        } else {
            self.caches.proj.get(&key)
        };
        if let Some(m) = cached {
            return *m;
        }
        let m = self.tile_proj_matrix(id, aligned, expanded);
        let cache = if expanded {
            &mut self.caches.expanded
        } else if aligned {
            &mut self.caches.aligned
        } else {
            &mut self.caches.proj
        };
        cache.insert(key, m);
        m
    }

    pub(crate) fn tile_fog_matrix(&self, id: &UnwrappedTileID) -> Matrix4<f64> {
        let pos_matrix = self
            .projection
            .create_tile_matrix(self, self.camera_world_size_for_fog(), id);
        self.world_to_fog_matrix * pos_matrix
    }

    /// Tile units to camera-relative fog space
    pub fn calculate_fog_tile_matrix(&mut self, id: &UnwrappedTileID) -> Matrix4<f64> {
        let key = id.key();
        if let Some(m) = self.caches.fog.get(&key) {
            return *m;
        }
        let m = self.tile_fog_matrix(id);
        self.caches.fog.insert(key, m);
        m
    }

    pub fn calculate_distance_tile_data(&mut self, id: &UnwrappedTileID) -> DistanceTileData {
        let key = id.key();
        if let Some(data) = self.caches.distance.get(&key) {
            return *data;
        }

        let canonical = id.canonical;
        let window_scale = 1.0 / self.height;
        let cws = self.camera_world_size();
        let scale = cws / Transform::zoom_scale(canonical.z as f64);
        let tile_x = id.unwrapped_x() as f64 * scale;
        let tile_y = canonical.y as f64 * scale;

        // Bring the center into the same space as the tile offset
        let center = self.point().multiply(cws / self.world_size());

        let data = DistanceTileData {
            bearing: [(-self.angle).sin(), -(-self.angle).cos()],
            center: [(center.x - tile_x) * window_scale, (center.y - tile_y) * window_scale],
            scale: scale / EXTENT * window_scale,
        };
        self.caches.distance.insert(key, data);
        data
    }

    /// Screen pixels to tile units for a tile drawn with `tile_size`
    pub fn calculate_pixels_to_tile_units_matrix(&mut self, id: &OverscaledTileID, tile_size: f64) -> Matrix2<f64> {
        let key = id.key;
        if let Some(m) = self.caches.pixels_to_tile_units.get(&key) {
            return *m;
        }
        let tile_transform = TileTransform::new(&id.canonical, &self.projection);
        let zoom_diff = self.zoom() - id.overscaled_z as f64 + id.canonical.z as f64;
        let s = tile_transform.scale * EXTENT / (tile_size * 2f64.powf(zoom_diff));
        let m = self.inverse_adjustment_matrix * s;
        self.caches.pixels_to_tile_units.insert(key, m);
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::LatLng;
    use crate::projection::ProjectionSpec;
    use crate::tiles::tile_id::CanonicalTileID;

    fn transform(width: f64, height: f64) -> Transform {
        let mut tr = Transform::default();
        tr.resize(width, height);
        tr
    }

    fn to_screen(tr: &Transform, m: &Matrix4<f64>, x: f64, y: f64) -> (f64, f64) {
        let p = m * Vector4::new(x, y, 0.0, 1.0);
        let (nx, ny) = (p.x / p.w, p.y / p.w);
        ((nx + 1.0) / 2.0 * tr.width(), (1.0 - ny) / 2.0 * tr.height())
    }

    #[test]
    fn test_zero_height_skips_recalculation() {
        let tr = Transform::default();
        assert_eq!(*tr.proj_matrix(), Matrix4::identity());
        assert!(tr.camera_frustum().is_none());
        assert!(tr.validate().is_ok());
    }

    #[test]
    fn test_center_projects_to_viewport_middle() {
        let mut tr = transform(512.0, 512.0);
        tr.set_zoom(3.0);
        tr.set_center(LatLng::new(20.0, 30.0));
        tr.set_pitch(40.0);
        let p = tr.point();
        let (sx, sy) = to_screen(&tr, tr.proj_matrix(), p.x, p.y);
        assert!((sx - 256.0).abs() < 1e-6);
        assert!((sy - 256.0).abs() < 1e-6);
        assert!(tr.validate().is_ok());
    }

    #[test]
    fn test_mercator_matrix_uses_unit_square() {
        let mut tr = transform(512.0, 512.0);
        tr.set_zoom(2.0);
        let (sx, sy) = to_screen(&tr, tr.mercator_matrix(), 0.5, 0.5);
        assert!((sx - 256.0).abs() < 1e-6);
        assert!((sy - 256.0).abs() < 1e-6);
    }

    #[test]
    fn test_pixel_matrix_inverse() {
        let mut tr = transform(800.0, 600.0);
        tr.set_zoom(4.0);
        tr.set_pitch(30.0);
        let product = tr.pixel_matrix() * tr.pixel_matrix_inverse();
        assert!((product - Matrix4::identity()).abs().max() < 1e-6);
    }

    #[test]
    fn test_aligned_matrix_stays_within_half_pixel() {
        let mut tr = transform(513.0, 512.0);
        tr.set_zoom(1.3);
        let p = tr.point();
        let (ax, ay) = to_screen(&tr, tr.aligned_proj_matrix(), p.x, p.y);
        let (sx, sy) = to_screen(&tr, tr.proj_matrix(), p.x, p.y);
        assert!((ax - sx).abs() <= 0.5 + 1e-9);
        assert!((ay - sy).abs() <= 0.5 + 1e-9);
    }

    #[test]
    fn test_expanded_matrix_only_differs_on_globe() {
        let mut tr = transform(512.0, 512.0);
        assert_eq!(tr.expanded_far_z_proj_matrix(), tr.proj_matrix());
        tr.set_projection(Some(&ProjectionSpec::new("globe"))).unwrap();
        assert_ne!(tr.expanded_far_z_proj_matrix(), tr.proj_matrix());
        assert!(tr.globe_to_mercator_matrix().is_some());
        assert!(tr.globe_radius() > 0.0);
    }

    #[test]
    fn test_tile_matrices_are_cached_until_recalculation() {
        let mut tr = transform(512.0, 512.0);
        tr.set_zoom(1.0);
        let id = UnwrappedTileID::new(0, CanonicalTileID::new(1, 1, 0));
        let a = tr.calculate_proj_matrix(&id, false, false);
        assert_eq!(tr.caches.proj.len(), 1);
        assert_eq!(tr.calculate_proj_matrix(&id, false, false), a);
        tr.calculate_fog_tile_matrix(&id);
        tr.calculate_distance_tile_data(&id);
        tr.set_zoom(1.5);
        assert!(tr.caches.proj.is_empty());
        assert!(tr.caches.fog.is_empty());
        assert!(tr.caches.distance.is_empty());
        assert_ne!(tr.calculate_proj_matrix(&id, false, false), a);
    }

    #[test]
    fn test_clone_drops_caches() {
        let mut tr = transform(512.0, 512.0);
        let id = UnwrappedTileID::new(0, CanonicalTileID::new(0, 0, 0));
        tr.calculate_proj_matrix(&id, true, false);
        let clone = tr.clone();
        assert!(clone.caches.aligned.is_empty());
        assert_eq!(tr.caches.aligned.len(), 1);
    }

    #[test]
    fn test_tile_corner_lands_on_world_corner() {
        let mut tr = transform(512.0, 512.0);
        tr.set_zoom(0.0);
        let id = UnwrappedTileID::new(0, CanonicalTileID::new(0, 0, 0));
        let m = tr.calculate_proj_matrix(&id, false, false);
        let (sx, sy) = to_screen(&tr, &m, EXTENT, EXTENT);
        assert!((sx - 512.0).abs() < 1e-6);
        assert!((sy - 512.0).abs() < 1e-6);
    }

    #[test]
    fn test_distance_tile_data() {
        let mut tr = transform(512.0, 512.0);
        let id = UnwrappedTileID::new(0, CanonicalTileID::new(0, 0, 0));
        let data = tr.calculate_distance_tile_data(&id);
        assert!((data.bearing[0]).abs() < 1e-12);
        assert!((data.bearing[1] + 1.0).abs() < 1e-12);
        assert!(data.scale > 0.0);
    }

    #[test]
    fn test_pixels_to_tile_units() {
        let mut tr = transform(512.0, 512.0);
        tr.set_zoom(2.0);
        let id = OverscaledTileID::new(2, 0, 2, 1, 1);
        let m = tr.calculate_pixels_to_tile_units_matrix(&id, 512.0);
        // One screen pixel is EXTENT / 512 tile units at the tile's own zoom
        assert!((m[(0, 0)] - EXTENT / 512.0).abs() < 1e-9);
        assert!((m[(1, 1)] - EXTENT / 512.0).abs() < 1e-9);
        assert_eq!(m[(0, 1)], 0.0);
    }

    #[test]
    fn test_orthographic_at_low_pitch() {
        let mut tr = transform(512.0, 512.0);
        tr.set_zoom(3.0);
        assert!(!tr.is_orthographic());
        assert!(tr.set_orthographic_projection_at_low_pitch(true));
        assert!(tr.is_orthographic());
        let p = tr.point();
        let (sx, sy) = to_screen(&tr, tr.proj_matrix(), p.x, p.y);
        assert!((sx - 256.0).abs() < 1e-6);
        assert!((sy - 256.0).abs() < 1e-6);
        tr.set_pitch(20.0);
        assert!(!tr.is_orthographic());
    }
}
