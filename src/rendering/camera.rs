use crate::core::geo::{
    lat_from_mercator_y, mercator_z_from_altitude, wrap, LatLng, MercatorCoordinate,
};
use nalgebra::{Matrix4, Translation3, UnitQuaternion, Vector3};

/// Orientation with clockwise pitch around x and bearing around z, both in
/// radians. The angles are negated for the left-handed map space.
pub fn orientation_from_pitch_bearing(pitch: f64, bearing: f64) -> UnitQuaternion<f64> {
    UnitQuaternion::from_axis_angle(&Vector3::z_axis(), -bearing)
        * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -pitch)
}

/// Orientation looking along `forward` with `up` as the up hint. Roll is
/// removed. Returns `None` when the frame is degenerate.
pub fn orientation_from_frame(forward: &Vector3<f64>, up: &Vector3<f64>) -> Option<UnitQuaternion<f64>> {
    const EPSILON: f64 = 1e-15;
    let xy_forward = Vector3::new(forward.x, forward.y, 0.0);
    let mut up = *up;

    if xy_forward.norm() >= EPSILON {
        // Project the up hint onto the forward direction to cancel roll
        let xy_dir = xy_forward.normalize();
        let xy_up = xy_dir * Vector3::new(up.x, up.y, 0.0).dot(&xy_dir);
        up.x = xy_up.x;
        up.y = xy_up.y;
    }

    let right = up.cross(forward);
    if right.norm() < EPSILON {
        return None;
    }

    let bearing = (-right.y).atan2(right.x);
    let pitch = forward.x.hypot(forward.y).atan2(-forward.z);
    Some(orientation_from_pitch_bearing(pitch, bearing))
}

/// OpenGL style perspective projection. An infinite `far` yields the
/// limit matrix with the far plane at infinity.
pub fn perspective(fovy: f64, aspect: f64, near: f64, far: f64) -> Matrix4<f64> {
    let f = 1.0 / (fovy / 2.0).tan();
    let mut m = Matrix4::zeros();
    m[(0, 0)] = f / aspect;
    m[(1, 1)] = f;
    m[(3, 2)] = -1.0;
    if far.is_finite() {
        let nf = 1.0 / (near - far);
        m[(2, 2)] = (far + near) * nf;
        m[(2, 3)] = 2.0 * far * near * nf;
    } else {
        m[(2, 2)] = -1.0;
        m[(2, 3)] = -2.0 * near;
    }
    m
}

/// OpenGL style orthographic projection
pub fn orthographic(left: f64, right: f64, bottom: f64, top: f64, near: f64, far: f64) -> Matrix4<f64> {
    let lr = 1.0 / (left - right);
    let bt = 1.0 / (bottom - top);
    let nf = 1.0 / (near - far);
    let mut m = Matrix4::identity();
    m[(0, 0)] = -2.0 * lr;
    m[(1, 1)] = -2.0 * bt;
    m[(2, 2)] = 2.0 * nf;
    m[(0, 3)] = (left + right) * lr;
    m[(1, 3)] = (top + bottom) * bt;
    m[(2, 3)] = (far + near) * nf;
    m
}

/// Camera placed in mercator space. Position is in mercator units, with z
/// being the altitude in mercator units as well.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreeCamera {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

impl Default for FreeCamera {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
        }
    }
}

impl FreeCamera {
    pub fn new(position: Vector3<f64>, orientation: UnitQuaternion<f64>) -> Self {
        Self {
            position,
            orientation,
        }
    }

    pub fn mercator_position(&self) -> MercatorCoordinate {
        MercatorCoordinate::new(self.position.x, self.position.y, self.position.z)
    }

    /// Forward points down the negative z axis of the camera frame
    pub fn forward(&self) -> Vector3<f64> {
        -(self.orientation * Vector3::z())
    }

    /// Up is flipped since the map's y axis points south
    pub fn up(&self) -> Vector3<f64> {
        -(self.orientation * Vector3::y())
    }

    pub fn right(&self) -> Vector3<f64> {
        self.orientation * Vector3::x()
    }

    /// Pitch and bearing in radians
    pub fn pitch_bearing(&self) -> (f64, f64) {
        let f = self.forward();
        let r = self.right();
        let bearing = (-r.y).atan2(r.x);
        let pitch = f.x.hypot(f.y).atan2(-f.z);
        (pitch, bearing)
    }

    /// Sets the orientation from pitch and bearing in radians
    pub fn set_pitch_bearing(&mut self, pitch: f64, bearing: f64) {
        self.orientation = orientation_from_pitch_bearing(pitch, bearing);
    }

    /// Pixel-space world matrix to camera space. Heights in meters are scaled
    /// by `pixels_per_meter` and the y axis is flipped.
    pub fn world_to_camera(&self, world_size: f64, pixels_per_meter: f64) -> Matrix4<f64> {
        let inv_rotation = self.orientation.conjugate().to_homogeneous();
        let translation = Translation3::from(self.position * -world_size).to_homogeneous();
        let mut m = inv_rotation * translation;

        m.row_mut(1).scale_mut(-1.0);
        m.column_mut(2).scale_mut(pixels_per_meter);
        m
    }

    /// World position relative to the camera without its rotation, scaled
    /// uniformly. Heights in meters are scaled by `pixels_per_meter` first.
    pub fn world_to_camera_position(
        &self,
        world_size: f64,
        pixels_per_meter: f64,
        uniform_scale: f64,
    ) -> Matrix4<f64> {
        let translation = Translation3::from(self.position * -world_size).to_homogeneous();
        let mut m = Matrix4::new_scaling(uniform_scale) * translation;
        m.column_mut(2).scale_mut(pixels_per_meter);
        m
    }

    /// Inverse of [`FreeCamera::world_to_camera`]; `None` if it is singular
    pub fn camera_to_world(&self, world_size: f64, pixels_per_meter: f64) -> Option<Matrix4<f64>> {
        self.world_to_camera(world_size, pixels_per_meter).try_inverse()
    }

    pub fn camera_to_clip_perspective(&self, fovy: f64, aspect: f64, near: f64, far: f64) -> Matrix4<f64> {
        perspective(fovy, aspect, near, far)
    }

    pub fn camera_to_clip_orthographic(
        &self,
        left: f64,
        right: f64,
        bottom: f64,
        top: f64,
        near: f64,
        far: f64,
    ) -> Matrix4<f64> {
        orthographic(left, right, bottom, top, near, far)
    }

    /// Distance along the forward vector to a plane at the given elevation
    pub fn distance_to_elevation(&self, elevation_meters: f64) -> f64 {
        let z0 = if elevation_meters == 0.0 {
            0.0
        } else {
            mercator_z_from_altitude(elevation_meters, lat_from_mercator_y(self.position.y))
        };
        (z0 - self.position.z) / self.forward().z
    }
}

/// Position and orientation for driving the camera directly instead of
/// through center, zoom, pitch and bearing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FreeCameraOptions {
    position: Option<MercatorCoordinate>,
    pub orientation: Option<UnitQuaternion<f64>>,
    pub(crate) render_world_copies: bool,
}

impl FreeCameraOptions {
    pub fn new(
        position: Option<MercatorCoordinate>,
        orientation: Option<UnitQuaternion<f64>>,
    ) -> Self {
        let mut options = Self {
            position: None,
            orientation,
            render_world_copies: false,
        };
        options.set_position(position);
        options
    }

    pub fn position(&self) -> Option<MercatorCoordinate> {
        self.position
    }

    /// With world copies on, x is wrapped back into the primary world
    pub fn set_position(&mut self, position: Option<MercatorCoordinate>) {
        self.position = position.map(|mut p| {
            if self.render_world_copies {
                p.x = wrap(p.x, 0.0, 1.0);
            }
            p
        });
    }

    /// Orients the camera toward a location at the given ground altitude.
    /// Clears the orientation when no position is set or the frame is
    /// degenerate.
    pub fn look_at_point(&mut self, location: &LatLng, ground_altitude: f64, up: Option<Vector3<f64>>) {
        self.orientation = None;
        let Some(pos) = self.position else {
            return;
        };
        let target = MercatorCoordinate::from_lat_lng(location, ground_altitude);
        let forward = Vector3::new(target.x - pos.x, target.y - pos.y, target.z - pos.z);
        let mut up = up.unwrap_or_else(Vector3::z);
        up.z = up.z.abs();
        self.orientation = orientation_from_frame(&forward, &up);
    }

    /// Pitch and bearing in degrees
    pub fn set_pitch_bearing(&mut self, pitch: f64, bearing: f64) {
        self.orientation = Some(orientation_from_pitch_bearing(
            pitch.to_radians(),
            (-bearing).to_radians(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_identity_camera_looks_down() {
        let camera = FreeCamera::default();
        assert_eq!(camera.forward(), Vector3::new(0.0, 0.0, -1.0));
        assert_eq!(camera.up(), Vector3::new(0.0, -1.0, 0.0));
        assert_eq!(camera.right(), Vector3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_pitch_bearing_round_trip() {
        let mut camera = FreeCamera::default();
        camera.set_pitch_bearing(0.7, -0.3);
        let (pitch, bearing) = camera.pitch_bearing();
        assert!(approx(pitch, 0.7));
        assert!(approx(bearing, -0.3));
    }

    #[test]
    fn test_orientation_from_frame() {
        let forward = Vector3::new(0.0, -1.0, -1.0);
        let q = orientation_from_frame(&forward, &Vector3::z()).unwrap();
        let camera = FreeCamera::new(Vector3::zeros(), q);
        let (pitch, bearing) = camera.pitch_bearing();
        assert!(approx(pitch, std::f64::consts::FRAC_PI_4));
        assert!(approx(bearing, 0.0));
    }

    #[test]
    fn test_degenerate_frame_is_rejected() {
        let forward = Vector3::new(0.0, 0.0, -1.0);
        assert!(orientation_from_frame(&forward, &Vector3::new(0.0, 0.0, 1.0)).is_none());
    }

    #[test]
    fn test_world_to_camera_moves_camera_to_origin() {
        let camera = FreeCamera::new(Vector3::new(0.5, 0.5, 0.1), UnitQuaternion::identity());
        let m = camera.world_to_camera(512.0, 1.0);
        let p = m * nalgebra::Vector4::new(256.0, 256.0, 0.0, 1.0);
        assert!(approx(p.x, 0.0));
        assert!(approx(p.y, 0.0));
        assert!(approx(p.z, -51.2));
    }

    #[test]
    fn test_world_to_camera_position_ignores_rotation() {
        let mut camera = FreeCamera::new(Vector3::new(0.5, 0.5, 0.0), UnitQuaternion::identity());
        camera.set_pitch_bearing(0.5, 1.0);
        let m = camera.world_to_camera_position(512.0, 2.0, 0.5);
        let p = m * nalgebra::Vector4::new(266.0, 256.0, 3.0, 1.0);
        assert!(approx(p.x, 5.0));
        assert!(approx(p.y, 0.0));
        assert!(approx(p.z, 3.0));
    }

    #[test]
    fn test_infinite_far_perspective() {
        let m = perspective(1.0, 1.0, 1.0, f64::INFINITY);
        assert_eq!(m[(2, 2)], -1.0);
        assert_eq!(m[(2, 3)], -2.0);
        assert_eq!(m[(3, 2)], -1.0);
    }

    #[test]
    fn test_options_wrap_position() {
        let mut options = FreeCameraOptions::default();
        options.render_world_copies = true;
        options.set_position(Some(MercatorCoordinate::new(1.25, 0.5, 0.0)));
        assert!(approx(options.position().unwrap().x, 0.25));
    }
}
