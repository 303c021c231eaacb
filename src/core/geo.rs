use crate::core::constants::{EARTH_CIRCUMFERENCE, MAX_MERCATOR_LATITUDE};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Represents a geographical coordinate with latitude and longitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new LatLng coordinate
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Returns a copy with the longitude wrapped into (-180, 180]
    pub fn wrap(&self) -> LatLng {
        LatLng::new(self.lat, wrap(self.lng, -180.0, 180.0))
    }

    /// Clamps latitude to the range web mercator can represent
    pub fn clamp_lat(lat: f64) -> f64 {
        lat.clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE)
    }
}

impl Default for LatLng {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Represents a point in screen or projected coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn add(&self, other: &Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    pub fn subtract(&self, other: &Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    pub fn multiply(&self, scalar: f64) -> Point {
        Point::new(self.x * scalar, self.y * scalar)
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn round(&self) -> Point {
        Point::new(self.x.round(), self.y.round())
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Represents a bounding box of geographical coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatLngBounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl LatLngBounds {
    pub fn new(south_west: LatLng, north_east: LatLng) -> Self {
        Self {
            south_west,
            north_east,
        }
    }

    /// Creates bounds from individual coordinates
    pub fn from_coords(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self::new(LatLng::new(south, west), LatLng::new(north, east))
    }

    /// Creates the smallest bounds containing every point
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a LatLng>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let mut bounds = LatLngBounds::new(first, first);
        for p in iter {
            bounds.extend(p);
        }
        Some(bounds)
    }

    pub fn west(&self) -> f64 {
        self.south_west.lng
    }

    pub fn east(&self) -> f64 {
        self.north_east.lng
    }

    pub fn south(&self) -> f64 {
        self.south_west.lat
    }

    pub fn north(&self) -> f64 {
        self.north_east.lat
    }

    /// Checks if the bounds contain a point
    pub fn contains(&self, point: &LatLng) -> bool {
        point.lat >= self.south_west.lat
            && point.lat <= self.north_east.lat
            && point.lng >= self.south_west.lng
            && point.lng <= self.north_east.lng
    }

    /// Extends the bounds to include a point
    pub fn extend(&mut self, point: &LatLng) {
        self.south_west.lat = self.south_west.lat.min(point.lat);
        self.south_west.lng = self.south_west.lng.min(point.lng);
        self.north_east.lat = self.north_east.lat.max(point.lat);
        self.north_east.lng = self.north_east.lng.max(point.lng);
    }

    /// Gets the center point of the bounds
    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south_west.lat + self.north_east.lat) / 2.0,
            (self.south_west.lng + self.north_east.lng) / 2.0,
        )
    }
}

/// A position in the unit square of the web mercator world, with `z` in
/// mercator units (meters scaled by the circumference at the latitude).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MercatorCoordinate {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl MercatorCoordinate {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn from_lat_lng(lat_lng: &LatLng, altitude: f64) -> Self {
        Self::new(
            mercator_x_from_lng(lat_lng.lng),
            mercator_y_from_lat(lat_lng.lat),
            mercator_z_from_altitude(altitude, lat_lng.lat),
        )
    }

    pub fn to_lat_lng(&self) -> LatLng {
        LatLng::new(lat_from_mercator_y(self.y), lng_from_mercator_x(self.x))
    }

    pub fn to_altitude(&self) -> f64 {
        altitude_from_mercator_z(self.z, self.y)
    }

    /// Size of one meter in mercator units at this coordinate's latitude
    pub fn meter_in_mercator_units(&self) -> f64 {
        1.0 / EARTH_CIRCUMFERENCE * mercator_scale(lat_from_mercator_y(self.y))
    }
}

pub fn circumference_at_latitude(latitude: f64) -> f64 {
    EARTH_CIRCUMFERENCE * (latitude * PI / 180.0).cos()
}

pub fn mercator_x_from_lng(lng: f64) -> f64 {
    (180.0 + lng) / 360.0
}

pub fn mercator_y_from_lat(lat: f64) -> f64 {
    (180.0 - (180.0 / PI * (PI / 4.0 + lat * PI / 360.0).tan().ln())) / 360.0
}

pub fn mercator_z_from_altitude(altitude: f64, lat: f64) -> f64 {
    altitude / circumference_at_latitude(lat)
}

pub fn lng_from_mercator_x(x: f64) -> f64 {
    x * 360.0 - 180.0
}

pub fn lat_from_mercator_y(y: f64) -> f64 {
    let y2 = 180.0 - y * 360.0;
    360.0 / PI * (y2 * PI / 180.0).exp().atan() - 90.0
}

pub fn altitude_from_mercator_z(z: f64, y: f64) -> f64 {
    z * circumference_at_latitude(lat_from_mercator_y(y))
}

/// Mercator scale factor at a latitude
pub fn mercator_scale(lat: f64) -> f64 {
    1.0 / (lat * PI / 180.0).cos()
}

/// Wraps `n` into `(min, max]`
pub fn wrap(n: f64, min: f64, max: f64) -> f64 {
    let d = max - min;
    let w = ((n - min) % d + d) % d + min;
    if w == min {
        max
    } else {
        w
    }
}

/// Clamps without panicking when `min > max`; `max` wins
pub fn clamp(n: f64, min: f64, max: f64) -> f64 {
    n.max(min).min(max)
}

/// Cubic hermite step between two edges
pub fn smoothstep(e0: f64, e1: f64, x: f64) -> f64 {
    let t = ((x - e0) / (e1 - e0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

pub fn ease_in(x: f64) -> f64 {
    x.powi(5)
}

pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a * (1.0 - t) + b * t
}

/// Signed shortest angular distance in degrees from `a` to `b`
pub fn shortest_angle(a: f64, b: f64) -> f64 {
    wrap(b - a, -180.0, 180.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lat_lng_creation() {
        let coord = LatLng::new(40.7128, -74.0060);
        assert_eq!(coord.lat, 40.7128);
        assert_eq!(coord.lng, -74.0060);
    }

    #[test]
    fn test_wrap_upper_bound_is_inclusive() {
        assert_eq!(wrap(180.0, -180.0, 180.0), 180.0);
        assert_eq!(wrap(-180.0, -180.0, 180.0), 180.0);
        assert_eq!(wrap(190.0, -180.0, 180.0), -170.0);
        assert_eq!(wrap(-540.0, -180.0, 180.0), 180.0);
    }

    #[test]
    fn test_mercator_coordinate_conversion() {
        let coord = MercatorCoordinate::from_lat_lng(&LatLng::new(0.0, 0.0), 0.0);
        assert_eq!(coord.x, 0.5);
        assert!((coord.y - 0.5).abs() < 1e-12);

        let sf = LatLng::new(37.7749, -122.4194);
        let back = MercatorCoordinate::from_lat_lng(&sf, 0.0).to_lat_lng();
        assert!((back.lat - sf.lat).abs() < 1e-9);
        assert!((back.lng - sf.lng).abs() < 1e-9);
    }

    #[test]
    fn test_max_latitude_maps_to_unit_square_edge() {
        assert!(mercator_y_from_lat(MAX_MERCATOR_LATITUDE).abs() < 1e-6);
        assert!((mercator_y_from_lat(-MAX_MERCATOR_LATITUDE) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_altitude_round_trip() {
        let z = mercator_z_from_altitude(1000.0, 45.0);
        let y = mercator_y_from_lat(45.0);
        assert!((altitude_from_mercator_z(z, y) - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn test_bounds_contains() {
        let bounds = LatLngBounds::from_coords(40.0, -75.0, 41.0, -73.0);
        let point_inside = LatLng::new(40.5, -74.0);
        let point_outside = LatLng::new(42.0, -74.0);

        assert!(bounds.contains(&point_inside));
        assert!(!bounds.contains(&point_outside));
    }
}
