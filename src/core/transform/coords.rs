use super::Transform;
use crate::core::constants::{EXTENT, HORIZON_SEARCH_STEPS, NUM_WORLD_COPIES};
use crate::core::geo::{
    lat_from_mercator_y, lerp, mercator_x_from_lng, mercator_y_from_lat, mercator_z_from_altitude,
    shortest_angle, LatLng, LatLngBounds, MercatorCoordinate, Point,
};
use crate::projection::globe::{lat_lng_to_ecef, poles_in_viewport, GLOBE_RADIUS, GLOBE_ZOOM_THRESHOLD_MAX};
use crate::projection::ProjectionKind;
use crate::spatial::culling::Ray;
use crate::tiles::tile_id::{CanonicalTileID, UnwrappedTileID};
use nalgebra::{Vector3, Vector4};

/// Two points on a screen ray in world pixels (z in meters) and the
/// fraction along them where the ray meets a horizontal plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayIntersection {
    pub p0: Vector4<f64>,
    pub p1: Vector4<f64>,
    pub t: f64,
}

/// Samples for the average terrain elevation as fractions of the width and
/// of the space between horizon and bottom
const ELEVATION_SAMPLE_POINTS: [[f64; 2]; 5] = [[0.5, 0.2], [0.3, 0.5], [0.5, 0.5], [0.7, 0.5], [0.5, 0.8]];

impl Transform {
    /// Geographic to world pixels. Latitude is clamped to the mercator range.
    pub fn project(&self, lat_lng: &LatLng) -> Point {
        let lat = LatLng::clamp_lat(lat_lng.lat);
        let p = self.projection.project(lat_lng.lng, lat);
        p.multiply(self.world_size())
    }

    pub fn unproject(&self, point: &Point) -> LatLng {
        let ws = self.world_size();
        self.projection.unproject(point.x / ws, point.y / ws)
    }

    /// The center in world pixels
    pub fn point(&self) -> Point {
        self.project(&self.center)
    }

    /// The center in the unit square
    pub fn point_merc(&self) -> Point {
        self.point().multiply(1.0 / self.world_size())
    }

    /// Moves the map so that `lat_lng` ends up under the screen `point`
    pub fn set_location_at_point(&mut self, lat_lng: &LatLng, point: &Point) {
        let center_point = self.center_point();
        let (x, y) = if self.projection.is_globe() {
            // Pixel deltas are applied directly to the globe
            let ws = self.world_size();
            ((point.x - center_point.x) / ws, (point.y - center_point.y) / ws)
        } else {
            let a = self.point_coordinate(point, None);
            let b = self.point_coordinate(&center_point, None);
            (a.x - b.x, a.y - b.y)
        };
        let loc = self.location_coordinate(lat_lng, None);
        self.set_location(&MercatorCoordinate::new(loc.x - x, loc.y - y, 0.0));
    }

    pub fn set_location(&mut self, location: &MercatorCoordinate) {
        let mut center = self.coordinate_location(location);
        if self.projection.wrap {
            center = center.wrap();
        }
        self.set_center(center);
    }

    /// Screen point of a location on the plane at the center altitude, plus
    /// `altitude` meters
    pub fn location_point(&self, lat_lng: &LatLng, altitude: Option<f64>) -> Point {
        self.projected_location_point(lat_lng, altitude, false)
    }

    /// Like [`Transform::location_point`] but standing on the terrain
    pub fn location_point_3d(&self, lat_lng: &LatLng, altitude: Option<f64>) -> Point {
        self.projected_location_point(lat_lng, altitude, true)
    }

    fn projected_location_point(&self, lat_lng: &LatLng, altitude: Option<f64>, terrain: bool) -> Point {
        if !self.projection.is_globe() {
            return self.coordinate_point(&self.location_coordinate(lat_lng, altitude), terrain);
        }
        let mut pos = lat_lng_to_ecef(lat_lng.lat, lat_lng.lng, GLOBE_RADIUS);
        let up = pos.normalize();
        let elevation = match &self.elevation {
            Some(e) => e.get_at_point(&self.location_coordinate(lat_lng, None), self.center_altitude),
            None => self.center_altitude,
        } + altitude.unwrap_or(0.0);
        pos += up * (mercator_z_from_altitude(1.0, 0.0) * EXTENT * elevation);

        let p = self.pixel_matrix * self.globe_matrix * Vector4::new(pos.x, pos.y, pos.z, 1.0);
        Point::new(p.x / p.w, p.y / p.w)
    }

    /// Screen point of a mercator coordinate. Points behind the camera map
    /// to `f64::MAX`.
    pub(crate) fn coordinate_point(&self, coord: &MercatorCoordinate, sample_terrain: bool) -> Point {
        let elevation = match (&self.elevation, sample_terrain) {
            (Some(e), true) => e.get_at_point(coord, self.center_altitude),
            _ => self.center_altitude,
        };
        let ws = self.world_size();
        let p = self.pixel_matrix * Vector4::new(coord.x * ws, coord.y * ws, elevation + coord.to_altitude(), 1.0);
        if p.w > 0.0 {
            Point::new(p.x / p.w, p.y / p.w)
        } else {
            Point::new(f64::MAX, f64::MAX)
        }
    }

    pub fn point_location(&self, point: &Point) -> LatLng {
        self.coordinate_location(&self.point_coordinate(point, None))
    }

    /// Location under a screen point, on the terrain when there is one
    pub fn point_location_3d(&self, point: &Point, altitude: Option<f64>) -> LatLng {
        self.coordinate_location(&self.point_coordinate_3d(point, altitude))
    }

    /// Geographic to mercator through the active projection. A zero altitude
    /// leaves z at 0.
    pub fn location_coordinate(&self, lat_lng: &LatLng, altitude: Option<f64>) -> MercatorCoordinate {
        let z = altitude
            .filter(|a| *a != 0.0)
            .map_or(0.0, |a| mercator_z_from_altitude(a, lat_lng.lat));
        let p = self.projection.project(lat_lng.lng, lat_lng.lat);
        MercatorCoordinate::new(p.x, p.y, z)
    }

    pub fn coordinate_location(&self, coord: &MercatorCoordinate) -> LatLng {
        self.projection.unproject(coord.x, coord.y)
    }

    /// Casts the screen ray and finds where it crosses the plane at `z`
    /// meters, by default the center altitude
    pub fn point_ray_intersection(&self, point: &Point, z: Option<f64>) -> RayIntersection {
        let target_z = z.unwrap_or(self.center_altitude);
        let (p0, p1) = self.unproject_screen_ray(point);
        let (z0, z1) = (p0.z, p1.z);
        let t = if z0 == z1 { 0.0 } else { (target_z - z0) / (z1 - z0) };
        RayIntersection { p0, p1, t }
    }

    /// Near and far points of a screen ray in world pixels, z in meters
    fn unproject_screen_ray(&self, point: &Point) -> (Vector4<f64>, Vector4<f64>) {
        let p0 = self.pixel_matrix_inverse * Vector4::new(point.x, point.y, 0.0, 1.0);
        let p1 = self.pixel_matrix_inverse * Vector4::new(point.x, point.y, 1.0, 1.0);
        (p0 / p0.w, p1 / p1.w)
    }

    /// Screen ray in mercator units
    pub fn screen_point_to_mercator_ray(&self, point: &Point) -> Ray {
        let (p0, p1) = self.unproject_screen_ray(point);
        let ws = self.world_size();
        let to_mercator = |p: Vector4<f64>| {
            Vector3::new(
                p.x / ws,
                p.y / ws,
                mercator_z_from_altitude(p.z, self.center.lat),
            )
        };
        let (a, b) = (to_mercator(p0), to_mercator(p1));
        Ray::new(a, (b - a).normalize())
    }

    pub fn ray_intersection_coordinate(&self, intersection: &RayIntersection) -> MercatorCoordinate {
        let RayIntersection { p0, p1, t } = *intersection;
        let z0 = mercator_z_from_altitude(p0.z, self.center.lat);
        let z1 = mercator_z_from_altitude(p1.z, self.center.lat);
        let ws = self.world_size();
        MercatorCoordinate::new(lerp(p0.x, p1.x, t) / ws, lerp(p0.y, p1.y, t) / ws, lerp(z0, z1, t))
    }

    /// Mercator coordinate under a screen point on the plane at `z` meters,
    /// by default the center altitude. Points above the horizon are pulled
    /// down onto it.
    pub fn point_coordinate(&self, point: &Point, z: Option<f64>) -> MercatorCoordinate {
        if self.projection.is_globe() {
            return self
                .globe_point_coordinate(point, true)
                .unwrap_or(MercatorCoordinate::new(0.0, 0.0, 0.0));
        }
        let horizon = self.horizon_line_from_top(false);
        let clamped = Point::new(point.x, point.y.max(horizon));
        self.ray_intersection_coordinate(&self.point_ray_intersection(&clamped, z))
    }

    /// Intersection of the screen ray with the globe. Rays missing the globe
    /// give the closest point on its silhouette when `clamp_to_horizon` is set
    /// and `None` otherwise.
    pub(crate) fn globe_point_coordinate(&self, point: &Point, clamp_to_horizon: bool) -> Option<MercatorCoordinate> {
        let ws = self.world_size();
        let p0 = self.camera.position * ws;
        let p1 = self.pixel_matrix_inverse * Vector4::new(point.x, point.y, 1.0, 1.0);
        let p1 = p1.xyz() / p1.w;
        let ray = Ray::new(p0, (p1 - p0).normalize());

        let m = &self.globe_matrix;
        let globe_center = m.fixed_view::<3, 1>(0, 3).into_owned();
        let radius = ws / 2.0 / std::f64::consts::PI;
        let (on_globe, hit) = ray.closest_point_on_sphere(&globe_center, radius);
        if !hit && !clamp_to_horizon {
            return None;
        }

        let axis = |i: usize| m.fixed_view::<3, 1>(0, i).into_owned().normalize();
        let xp = axis(0).dot(&on_globe);
        let yp = axis(1).dot(&on_globe);
        let zp = axis(2).dot(&on_globe);

        let lat = (-yp / radius).clamp(-1.0, 1.0).asin().to_degrees();
        let lng = xp.atan2(zp).to_degrees();
        let lng = self.center.lng + shortest_angle(self.center.lng, lng);
        Some(MercatorCoordinate::new(
            mercator_x_from_lng(lng),
            mercator_y_from_lat(lat).clamp(0.0, 1.0),
            0.0,
        ))
    }

    /// Terrain hit under a screen point as `[x, y, z]` in mercator units and
    /// the elevation in meters
    pub(crate) fn terrain_point_coordinate(&self, point: &Point) -> Option<[f64; 4]> {
        let elevation = self.elevation.as_ref()?;
        let ws = self.world_size();
        let (p0, p1) = self.unproject_screen_ray(point);
        // xy to mercator units, z stays in meters
        let start = Vector3::new(p0.x / ws, p0.y / ws, p0.z);
        let end = Vector3::new(p1.x / ws, p1.y / ws, p1.z);
        let dir = end - start;
        let t = elevation
            .raycast(&start, &dir, elevation.exaggeration())
            .filter(|t| *t != 0.0)?;
        let hit = start + dir * t;
        Some([
            hit.x,
            hit.y,
            mercator_z_from_altitude(hit.z, lat_from_mercator_y(hit.y)),
            hit.z,
        ])
    }

    fn projection_point_coordinate_3d(&self, point: &Point) -> Option<MercatorCoordinate> {
        match self.projection.kind {
            ProjectionKind::Globe => Some(self.point_coordinate(point, Some(0.0))),
            _ if self.elevation.is_some() => self
                .terrain_point_coordinate(point)
                .map(|[x, y, z, _]| MercatorCoordinate::new(x, y, z)),
            _ => Some(self.point_coordinate(point, Some(0.0))),
        }
    }

    /// Mercator coordinate under a screen point on the terrain. Above the
    /// terrain silhouette the search walks down toward the horizon to find
    /// the farthest hit.
    pub fn point_coordinate_3d(&self, point: &Point, altitude: Option<f64>) -> MercatorCoordinate {
        if self.elevation.is_none() {
            return self.point_coordinate(point, altitude);
        }
        if let Some(hit) = self.projection_point_coordinate_3d(point) {
            return hit;
        }
        let mut start = 0.0;
        let mut end = self.horizon_line_from_top(true);
        if point.y > end {
            // Holes between tiles below the horizon
            return self.point_coordinate(point, altitude);
        }
        let threshold = 0.02 * end;
        let mut sample = *point;
        let mut found = None;
        for _ in 0..HORIZON_SEARCH_STEPS {
            if end - start <= threshold {
                break;
            }
            // Biased toward the horizon
            sample.y = lerp(start, end, 0.66);
            match self.projection_point_coordinate_3d(&sample) {
                Some(hit) => {
                    end = sample.y;
                    found = Some(hit);
                }
                None => start = sample.y,
            }
        }
        found.unwrap_or_else(|| self.point_coordinate(point, None))
    }

    pub fn is_point_above_horizon(&self, point: &Point) -> bool {
        if self.projection.is_globe() && self.zoom() < GLOBE_ZOOM_THRESHOLD_MAX {
            return self.globe_point_coordinate(point, false).is_none();
        }
        match &self.elevation {
            Some(e) if !e.visible_dem_tiles().is_empty() => {
                self.projection_point_coordinate_3d(point).is_none()
            }
            _ => point.y < self.horizon_line_from_top(true),
        }
    }

    /// Whether a screen point shows map rather than sky or empty space
    pub fn is_point_on_surface(&self, point: &Point) -> bool {
        if point.y < 0.0 || point.y > self.height || point.x < 0.0 || point.x > self.width {
            return false;
        }
        if self.elevation.is_some() || self.zoom() >= GLOBE_ZOOM_THRESHOLD_MAX {
            return !self.is_point_above_horizon(point);
        }
        let coord = self.point_coordinate(point, None);
        coord.y >= 0.0 && coord.y <= 1.0
    }

    /// Distance of the horizon from the top of the viewport in pixels.
    /// Negative when it is above the viewport, unless clamped to 0.
    pub fn horizon_line_from_top(&self, clamp_to_top: bool) -> f64 {
        let h = self.height / 2.0 / (self.fov / 2.0).tan() / self.pitch.max(0.1).tan() - self.center_offset().y;
        let offset = self.height / 2.0 - h * (1.0 - self.horizon_shift);
        if clamp_to_top {
            offset.max(0.0)
        } else {
            offset
        }
    }

    pub fn is_horizon_visible(&self) -> bool {
        const HORIZON_ANGLE_EPSILON: f64 = 2.0;
        if self.pitch() + self.fov_above_center().to_degrees() > 90.0 - HORIZON_ANGLE_EPSILON {
            return true;
        }
        self.any_corner_off_edge(&Point::new(0.0, 0.0), &Point::new(self.width, self.height))
    }

    /// Whether any corner of the screen box between `p0` and `p1` lies above
    /// the horizon or outside the rendered worlds
    pub fn any_corner_off_edge(&self, p0: &Point, p1: &Point) -> bool {
        let (min_x, max_x) = (p0.x.min(p1.x), p0.x.max(p1.x));
        let (min_y, max_y) = (p0.y.min(p1.y), p0.y.max(p1.y));

        if min_y < self.horizon_line_from_top(false) {
            return true;
        }
        if !self.projection.is_mercator() {
            return false;
        }

        let (min_wx, max_wx) = if self.render_world_copies() {
            (-NUM_WORLD_COPIES as f64, 1.0 + NUM_WORLD_COPIES as f64)
        } else {
            (0.0, 1.0)
        };
        let corners = [
            Point::new(min_x, min_y),
            Point::new(max_x, max_y),
            Point::new(min_x, max_y),
            Point::new(max_x, min_y),
        ];
        corners.iter().any(|corner| {
            let intersection = self.point_ray_intersection(corner, None);
            if intersection.t < 0.0 {
                return true;
            }
            let c = self.ray_intersection_coordinate(&intersection);
            c.x < min_wx || c.y < 0.0 || c.x > max_wx || c.y > 1.0
        })
    }

    /// Geographic bounds of the padded viewport
    pub fn get_bounds(&self) -> LatLngBounds {
        match self.projection.kind {
            ProjectionKind::Mercator | ProjectionKind::Equirectangular => {
                if self.terrain_enabled() {
                    self.bounds_rectangular_terrain()
                } else {
                    self.bounds_rectangular(0.0, 0.0)
                }
            }
            ProjectionKind::Globe => self.bounds_non_rectangular(),
        }
    }

    fn padded_rect(&self) -> (f64, f64, f64, f64) {
        let insets = &self.edge_insets;
        (insets.top, insets.left, self.height - insets.bottom, self.width - insets.right)
    }

    /// Bounds from the screen corners, far corners on the plane at `min`
    /// and near ones at `max` meters
    fn bounds_rectangular(&self, min: f64, max: f64) -> LatLngBounds {
        debug_assert!(self.projection.supports_world_copies);
        let (top, left, bottom, right) = self.padded_rect();

        let mut tl = self.point_coordinate(&Point::new(left, top), Some(min));
        let mut tr = self.point_coordinate(&Point::new(right, top), Some(min));
        let br = self.point_coordinate(&Point::new(right, bottom), Some(max));
        let bl = self.point_coordinate(&Point::new(left, bottom), Some(max));

        // Top corners past the poles move to where the screen edge meets the
        // map edge
        let slope = |a: &MercatorCoordinate, b: &MercatorCoordinate| (b.y - a.y) / (b.x - a.x);
        if tl.y > 1.0 && tr.y >= 0.0 {
            tl = MercatorCoordinate::new((1.0 - bl.y) / slope(&bl, &tl) + bl.x, 1.0, 0.0);
        } else if tl.y < 0.0 && tr.y <= 1.0 {
            tl = MercatorCoordinate::new(-bl.y / slope(&bl, &tl) + bl.x, 0.0, 0.0);
        }
        if tr.y > 1.0 && tl.y >= 0.0 {
            tr = MercatorCoordinate::new((1.0 - br.y) / slope(&br, &tr) + br.x, 1.0, 0.0);
        } else if tr.y < 0.0 && tl.y <= 1.0 {
            tr = MercatorCoordinate::new(-br.y / slope(&br, &tr) + br.x, 0.0, 0.0);
        }

        let first = self.coordinate_location(&tl);
        let mut bounds = LatLngBounds::new(first, first);
        for c in [&tr, &bl, &br] {
            bounds.extend(&self.coordinate_location(c));
        }
        bounds
    }

    fn bounds_rectangular_terrain(&self) -> LatLngBounds {
        let Some(elevation) = &self.elevation else {
            return self.bounds_rectangular(0.0, 0.0);
        };
        if elevation.is_using_mock_source() {
            return self.bounds_rectangular(0.0, 0.0);
        }
        let range = elevation
            .visible_dem_tiles()
            .iter()
            .filter_map(|t| t.range)
            .fold(None, |acc: Option<(f64, f64)>, r| match acc {
                Some((min, max)) => Some((min.min(r.min), max.max(r.max))),
                None => Some((r.min, r.max.max(0.0))),
            });
        match range {
            Some((min, max)) => {
                let exaggeration = elevation.exaggeration();
                self.bounds_rectangular(min * exaggeration, max * exaggeration)
            }
            None => self.bounds_rectangular(0.0, 0.0),
        }
    }

    /// Bounds from recursively refined screen edge midpoints, for
    /// projections whose extremes are not at the corners
    fn bounds_non_rectangular(&self) -> LatLngBounds {
        debug_assert!(!self.projection.supports_world_copies);
        let (top, left, bottom, right) = self.padded_rect();

        let corners = [
            Point::new(left, top),
            Point::new(right, top),
            Point::new(right, bottom),
            Point::new(left, bottom),
        ];
        let first = self.point_location_3d(&corners[0], None);
        let mut west = first.lng;
        let mut east = first.lng;
        let mut south = first.lat;
        let mut north = first.lat;
        for corner in &corners[1..] {
            let loc = self.point_location_3d(corner, None);
            west = west.min(loc.lng);
            east = east.max(loc.lng);
            south = south.min(loc.lat);
            north = north.max(loc.lat);
        }

        // 270 roughly converts mercator units to degrees
        let max_err = 2f64.powf(-self.zoom()) / 16.0 * 270.0;
        let min_recursions = if self.projection.is_globe() { 1 } else { 4 };

        let mut segments: Vec<(Point, Point, u32)> = (0..4).map(|i| (corners[i], corners[(i + 1) % 4], 1)).collect();
        // Processed in the same order a depth-first recursion would visit them
        segments.reverse();
        while let Some((a, b, depth)) = segments.pop() {
            let mid = Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0);
            let LatLng { lat, lng } = self.point_location_3d(&mid, None);
            let err = 0f64.max(west - lng).max(south - lat).max(lng - east).max(lat - north);

            west = west.min(lng);
            east = east.max(lng);
            south = south.min(lat);
            north = north.max(lat);

            if depth < min_recursions || err > max_err {
                segments.push((mid, b, depth + 1));
                segments.push((a, mid, depth + 1));
            }
        }

        if self.projection.is_globe() {
            let (north_visible, south_visible) = poles_in_viewport(self);
            if north_visible {
                north = 90.0;
                east = 180.0;
                west = -180.0;
            } else if south_visible {
                south = -90.0;
                east = 180.0;
                west = -180.0;
            }
        }

        LatLngBounds::new(LatLng::new(south, west), LatLng::new(north, east))
    }

    /// Copies of a tile across the visible world copies, including one extra
    /// copy on each side
    pub fn get_visible_unwrapped_coordinates(&self, tile_id: &CanonicalTileID) -> Vec<UnwrappedTileID> {
        let mut result = vec![UnwrappedTileID::new(0, *tile_id)];
        if !self.render_world_copies() {
            return result;
        }
        let xs = [
            self.point_coordinate(&Point::new(0.0, 0.0), None).x,
            self.point_coordinate(&Point::new(self.width, 0.0), None).x,
            self.point_coordinate(&Point::new(self.width, self.height), None).x,
            self.point_coordinate(&Point::new(0.0, self.height), None).x,
        ];
        let w0 = xs.iter().copied().fold(f64::INFINITY, f64::min).floor() as i32;
        let w1 = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max).floor() as i32;
        const EXTRA_WORLD_COPY: i32 = 1;
        for w in (w0 - EXTRA_WORLD_COPY)..=(w1 + EXTRA_WORLD_COPY) {
            if w != 0 {
                result.push(UnwrappedTileID::new(w, *tile_id));
            }
        }
        result
    }

    /// Screen position of the ground point under the camera
    pub fn camera_point(&self) -> Point {
        if self.projection.is_globe() {
            let c = self.globe_matrix.column(3);
            let p = self.pixel_matrix * Vector4::new(c.x, c.y, c.z, 1.0);
            let w = 1.0 / p.w.max(1e-6);
            return Point::new(p.x * w, p.y * w);
        }
        let distance = if self.camera_to_center_distance != 0.0 {
            self.camera_to_center_distance
        } else {
            1.0
        };
        let y_offset = self.pitch.tan() * distance;
        self.center_point().add(&Point::new(0.0, y_offset))
    }

    /// Distance weighted terrain elevation over a few points below the
    /// horizon. `None` without terrain or when nothing was hit.
    pub fn sample_average_elevation(&self) -> Option<f64> {
        self.elevation.as_ref()?;
        let horizon = self.horizon_line_from_top(true);

        let mut elevation_sum = 0.0;
        let mut weight_sum = 0.0;
        for [fx, fy] in ELEVATION_SAMPLE_POINTS {
            let p = Point::new(fx * self.width, horizon + fy * (self.height - horizon));
            let Some(hit) = self.terrain_point_coordinate(&p) else {
                continue;
            };
            let distance = (hit[0] - self.camera.position.x).hypot(hit[1] - self.camera.position.y);
            let weight = 1.0 / distance;
            elevation_sum += hit[3] * weight;
            weight_sum += weight;
        }
        (weight_sum != 0.0).then(|| elevation_sum / weight_sum)
    }
}
