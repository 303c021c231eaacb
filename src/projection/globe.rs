//! Globe geometry: the ECEF frame tiles are placed in, the matrix that puts
//! the globe in world pixel space, and per-tile bounds on the sphere.

use crate::core::constants::EXTENT;
use crate::core::geo::{lat_from_mercator_y, smoothstep};
use crate::core::transform::Transform;
use crate::spatial::culling::{Aabb, Ray};
use crate::tiles::tile_id::CanonicalTileID;
use nalgebra::{Matrix4, Rotation3, Vector3, Vector4};
use std::f64::consts::PI;

pub const GLOBE_ZOOM_THRESHOLD_MIN: f64 = 5.0;
pub const GLOBE_ZOOM_THRESHOLD_MAX: f64 = 6.0;

/// Latitude whose mercator scale the globe matches at low zoom
pub const GLOBE_SCALE_MATCH_LATITUDE: f64 = 45.0;

/// Globe radius in ECEF units, one tile extent per circumference
pub const GLOBE_RADIUS: f64 = EXTENT / PI / 2.0;

/// Range of the 16-bit signed integers ECEF tile positions are packed into
const GLOBE_NORMALIZATION_BIT_RANGE: f64 = 32767.0;

/// Samples per tile edge used to bound a tile's surface patch
const TILE_BOUNDS_SAMPLES: usize = 5;

/// Zoom-driven blend from globe (0) to mercator (1)
pub fn globe_to_mercator_transition(zoom: f64) -> f64 {
    smoothstep(GLOBE_ZOOM_THRESHOLD_MIN, GLOBE_ZOOM_THRESHOLD_MAX, zoom)
}

/// Earth-centered position for a latitude and longitude in degrees. The y
/// axis points south so that it lines up with screen space.
pub fn lat_lng_to_ecef(lat: f64, lng: f64, radius: f64) -> Vector3<f64> {
    let (lat, lng) = (lat.to_radians(), lng.to_radians());
    Vector3::new(
        lat.cos() * lng.sin() * radius,
        -lat.sin() * radius,
        lat.cos() * lng.cos() * radius,
    )
}

pub fn globe_ecef_units_to_pixel_scale(world_size: f64) -> f64 {
    let local_radius = EXTENT / (2.0 * PI);
    let ws_radius = world_size / (2.0 * PI);
    ws_radius / local_radius
}

/// ECEF to world pixels: the map center ends up under the screen center
/// point with the globe surface at z = 0 there.
pub fn calculate_globe_matrix(tr: &Transform) -> Matrix4<f64> {
    let point = tr.point();
    let ws = tr.world_size();
    let scale = globe_ecef_units_to_pixel_scale(ws);
    Matrix4::new_translation(&Vector3::new(point.x, point.y, -ws / (2.0 * PI)))
        * Rotation3::from_axis_angle(&Vector3::x_axis(), -tr.center.lat.to_radians()).to_homogeneous()
        * Rotation3::from_axis_angle(&Vector3::y_axis(), -tr.center.lng.to_radians()).to_homogeneous()
        * Matrix4::new_scaling(scale)
}

fn tile_lng(x: f64, z: u8) -> f64 {
    x / 2f64.powi(z as i32) * 360.0 - 180.0
}

fn tile_lat(y: f64, z: u8) -> f64 {
    lat_from_mercator_y(y / 2f64.powi(z as i32))
}

/// Grid of ECEF points over the tile plus the largest angular step
/// between neighbouring samples
fn sample_tile_surface(id: &CanonicalTileID, to_pole: Option<f64>) -> (Vec<Vector3<f64>>, f64) {
    let n = TILE_BOUNDS_SAMPLES;
    let west = tile_lng(id.x as f64, id.z);
    let east = tile_lng(id.x as f64 + 1.0, id.z);
    let mut north = tile_lat(id.y as f64, id.z);
    let mut south = tile_lat(id.y as f64 + 1.0, id.z);
    match to_pole {
        Some(pole) if pole > 0.0 => north = pole,
        Some(pole) => south = pole,
        None => {}
    }

    let mut points = Vec::with_capacity(n * n);
    for j in 0..n {
        let lat = south + (north - south) * j as f64 / (n - 1) as f64;
        for i in 0..n {
            let lng = west + (east - west) * i as f64 / (n - 1) as f64;
            points.push(lat_lng_to_ecef(lat, lng, GLOBE_RADIUS));
        }
    }
    let step = ((east - west).max(north - south) / (n - 1) as f64).to_radians();
    (points, step)
}

/// Bulge of the sphere between two samples `step` radians apart
fn sagitta(radius: f64, step: f64) -> f64 {
    radius * (1.0 - (step.min(PI) / 2.0).cos())
}

/// Bounds of a tile's surface patch in ECEF
pub fn globe_tile_bounds(id: &CanonicalTileID) -> Aabb {
    if id.z == 0 {
        return Aabb::new(Vector3::repeat(-GLOBE_RADIUS), Vector3::repeat(GLOBE_RADIUS));
    }
    let (points, step) = sample_tile_surface(id, None);
    let bounds = Aabb::from_points(&points);
    let pad = Vector3::repeat(sagitta(GLOBE_RADIUS, step));
    Aabb::new(bounds.min - pad, bounds.max + pad)
}

/// Bounds of a tile on the rendered globe in units of tiles at the zoom
/// where the world is `num_tiles` wide. With `extend_to_pole` the polar cap
/// beyond the mercator range is included for the first and last rows.
pub fn aabb_for_tile_on_globe(
    tr: &Transform,
    num_tiles: f64,
    id: &CanonicalTileID,
    extend_to_pole: bool,
) -> Aabb {
    let scale = num_tiles / tr.world_size();
    let m = Matrix4::new_nonuniform_scaling(&Vector3::new(scale, scale, scale)) * tr.globe_matrix;

    let last_row = (1u32 << id.z) - 1;
    let pole = match (extend_to_pole, id.y) {
        (true, 0) => Some(90.0),
        (true, y) if y == last_row => Some(-90.0),
        _ => None,
    };
    let (points, step) = if id.z == 0 {
        sample_tile_surface(id, None)
    } else {
        sample_tile_surface(id, pole)
    };
    let mut transformed: Vec<Vector3<f64>> = points
        .iter()
        .map(|p| (m * Vector4::new(p.x, p.y, p.z, 1.0)).xyz())
        .collect();
    if id.z == 0 || pole.is_some() {
        transformed.push((m * Vector4::new(0.0, -GLOBE_RADIUS, 0.0, 1.0)).xyz());
        transformed.push((m * Vector4::new(0.0, GLOBE_RADIUS, 0.0, 1.0)).xyz());
    }
    let bounds = Aabb::from_points(&transformed);
    let radius_in_tiles = tr.world_size() / (2.0 * PI) * scale;
    let pad = Vector3::repeat(sagitta(radius_in_tiles, step));
    Aabb::new(bounds.min - pad, bounds.max + pad)
}

/// Scale and offset that map tile bounds onto the 16-bit integer range
pub fn globe_normalize_ecef(bounds: &Aabb) -> Matrix4<f64> {
    let size = bounds.max - bounds.min;
    let max_extent = size.x.max(size.y).max(size.z);
    let st = GLOBE_NORMALIZATION_BIT_RANGE / max_extent;
    Matrix4::new_scaling(st) * Matrix4::new_translation(&-bounds.min)
}

pub fn globe_denormalize_ecef(bounds: &Aabb) -> Matrix4<f64> {
    let size = bounds.max - bounds.min;
    let max_extent = size.x.max(size.y).max(size.z);
    let st = max_extent / GLOBE_NORMALIZATION_BIT_RANGE;
    Matrix4::new_translation(&bounds.min) * Matrix4::new_scaling(st)
}

/// Whether the north and south poles are on screen and facing the camera
pub fn poles_in_viewport(tr: &Transform) -> (bool, bool) {
    let ws = tr.world_size();
    let camera = tr.camera.position * ws;
    let globe_center = tr.globe_matrix.column(3).xyz();
    let to_screen = tr.pixel_matrix * tr.globe_matrix;

    let visible = |ecef: Vector4<f64>| {
        let world = (tr.globe_matrix * ecef).xyz();
        let faces_camera = (world - globe_center).dot(&(camera - world)) > 0.0;
        let p = to_screen * ecef;
        if p.w <= 0.0 || !faces_camera {
            return false;
        }
        let (x, y) = (p.x / p.w, p.y / p.w);
        x >= 0.0 && x <= tr.width && y >= 0.0 && y <= tr.height
    };
    (
        visible(Vector4::new(0.0, -GLOBE_RADIUS, 0.0, 1.0)),
        visible(Vector4::new(0.0, GLOBE_RADIUS, 0.0, 1.0)),
    )
}

/// Far plane for the globe: the distance to where the frustum corner rays
/// meet the sphere, or to the horizon when they miss it
pub fn farthest_pixel_distance_on_sphere(tr: &Transform, pixels_per_meter: f64) -> f64 {
    let camera_distance = tr.camera_to_center_distance;
    let center_pixel_altitude = tr.center_altitude * pixels_per_meter;
    let forward = tr.camera.forward();
    let camera_position = forward * -camera_distance + Vector3::new(0.0, 0.0, center_pixel_altitude);

    let globe_radius = tr.world_size() / (2.0 * PI);
    let globe_center = Vector3::new(0.0, 0.0, -globe_radius);

    let aspect = tr.width / tr.height;
    let tan_half_fov = tr.fov_above_center().tan();
    let dir = forward + tr.camera.up() * tan_half_fov + tr.camera.right() * (tan_half_fov * aspect);
    let ray = Ray::new(camera_position, dir.normalize());

    let (point_on_sphere, hit) = ray.closest_point_on_sphere(&globe_center, globe_radius);
    let distance = if hit {
        let closest = point_on_sphere + globe_center;
        tr.fov_above_center().cos() * (closest - camera_position).norm()
    } else {
        // The globe does not fill the frustum, use the horizon distance
        let center_to_camera = camera_position - globe_center;
        let camera_to_globe = (globe_center - camera_position).normalize();
        let camera_height = center_to_camera.norm() - globe_radius;
        let horizon = (camera_height * (camera_height + 2.0 * globe_radius)).sqrt();
        let angle = (horizon / (globe_radius + camera_height)).acos()
            - forward.dot(&camera_to_globe).clamp(-1.0, 1.0).acos();
        horizon * angle.cos()
    };
    distance * 1.01
}
