//! Low-zoom corrections for projections reprojected in tile space.
//!
//! Such projections are drawn undistorted around the map center once zoomed
//! in: the shear, scale and rotation they introduce relative to mercator are
//! removed progressively over the projection's zoom range.

use crate::core::constants::MAX_MERCATOR_LATITUDE;
use crate::core::geo::{smoothstep, LatLng, MercatorCoordinate};
use crate::core::transform::Transform;
use crate::projection::Projection;
use nalgebra::{Matrix2, Matrix4, Rotation3, Vector3};

/// Roughly one kilometer in degrees of longitude times 1/180
const OFFSET: f64 = 1.0 / 40000.0;

/// Blend factor over the projection's range, shifted for viewports other
/// than 1024px. Zero for projections without a range.
pub fn projection_interpolation_t(
    projection: &Projection,
    zoom: f64,
    width: f64,
    height: f64,
    max_size: f64,
) -> f64 {
    let Some([zoom_a, zoom_b]) = projection.range else {
        return 0.0;
    };
    let size = max_size.min(width.max(height));
    let adjustment = (size / 1024.0).log2();
    smoothstep(zoom_a + adjustment, zoom_b + adjustment, zoom)
}

/// log2 of the mercator to projected length ratio along x at `loc`
pub fn zoom_adjustment(projection: &Projection, loc: &LatLng) -> f64 {
    let lat = loc.lat.clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE);
    let west = LatLng::new(lat, loc.lng - 180.0 * OFFSET);
    let east = LatLng::new(lat, loc.lng + 180.0 * OFFSET);
    let p1 = projection.project(west.lng, lat);
    let p2 = projection.project(east.lng, lat);
    let m1 = MercatorCoordinate::from_lat_lng(&west, 0.0);
    let m2 = MercatorCoordinate::from_lat_lng(&east, 0.0);
    let (pdx, pdy) = (p2.x - p1.x, p2.y - p1.y);
    let (mdx, mdy) = (m2.x - m1.x, m2.y - m1.y);
    ((mdx * mdx + mdy * mdy) / (pdx * pdx + pdy * pdy)).sqrt().log2()
}

fn rotate(x: f64, y: f64, angle: f64) -> (f64, f64) {
    let (sin, cos) = angle.sin_cos();
    (x * cos - y * sin, x * sin + y * cos)
}

fn rotation_z(angle: f64) -> Matrix4<f64> {
    Rotation3::from_axis_angle(&Vector3::z_axis(), angle).to_homogeneous()
}

/// Rotation, skew and aspect correction that make east-west horizontal and
/// the east and south directions orthogonal and equally long at `loc`
pub fn shear_adjustment(projection: &Projection, loc: &LatLng, t: f64, without_rotation: bool) -> Matrix4<f64> {
    let pw = projection.project(loc.lng - 180.0 * OFFSET, loc.lat);
    let pe = projection.project(loc.lng + 180.0 * OFFSET, loc.lat);
    let angle_adjust = -(pe.y - pw.y).atan2(pe.x - pw.x);

    // Stay inside mercator bounds near the poles
    let mut mc2 = MercatorCoordinate::from_lat_lng(loc, 0.0);
    mc2.y = mc2.y.clamp(-1.0 + OFFSET, 1.0 - OFFSET);
    let loc2 = mc2.to_lat_lng();
    let p2 = projection.project(loc2.lng, loc2.lat);

    let mut mc3 = MercatorCoordinate::from_lat_lng(&loc2, 0.0);
    mc3.x += OFFSET;
    let loc3 = mc3.to_lat_lng();
    let p3 = projection.project(loc3.lng, loc3.lat);
    let delta3 = rotate(p3.x - p2.x, p3.y - p2.y, angle_adjust);

    let mut mc4 = MercatorCoordinate::from_lat_lng(&loc2, 0.0);
    mc4.y += OFFSET;
    let loc4 = mc4.to_lat_lng();
    let p4 = projection.project(loc4.lng, loc4.lat);
    let delta4 = rotate(p4.x - p2.x, p4.y - p2.y, angle_adjust);

    let scale = delta3.0.abs() / delta4.1.abs();

    let unrotate = rotation_z(-angle_adjust * (1.0 - if without_rotation { 0.0 } else { t }));
    let mut shear = Matrix4::new_nonuniform_scaling(&Vector3::new(1.0, 1.0 - (1.0 - scale) * t, 1.0));
    shear[(0, 1)] = -delta4.0 / delta4.1 * t;
    unrotate * shear * rotation_z(angle_adjust)
}

/// Scale that keeps the projected map at mercator size around the center
pub fn scale_adjustment(tr: &Transform) -> f64 {
    let projection = &tr.projection;
    let t = projection_interpolation_t(projection, tr.zoom(), tr.width, tr.height, f64::INFINITY);
    let za = zoom_adjustment(projection, &tr.center);
    let origin = LatLng::new(projection.center[1], projection.center[0]);
    let za_origin = zoom_adjustment(projection, &origin);
    2f64.powf(za * t + (1.0 - t) * za_origin)
}

/// Full adjustment matrix applied around the map center
pub fn projection_adjustments(tr: &Transform, without_rotation: bool) -> Matrix4<f64> {
    let projection = &tr.projection;
    let t = projection_interpolation_t(projection, tr.zoom(), tr.width, tr.height, f64::INFINITY);
    let scale = scale_adjustment(tr);
    shear_adjustment(projection, &tr.center, t, without_rotation)
        * Matrix4::new_nonuniform_scaling(&Vector3::new(scale, scale, 1.0))
}

/// Inverse of the 2D part of the adjustments, without rotation. `None` if
/// the adjustment collapsed.
pub fn projection_adjustment_inverted(tr: &Transform) -> Option<Matrix2<f64>> {
    let m = projection_adjustments(tr, true);
    Matrix2::new(m[(0, 0)], m[(0, 1)], m[(1, 0)], m[(1, 1)]).try_inverse()
}
