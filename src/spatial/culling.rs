use crate::core::geo::Point;
use nalgebra::{Matrix4, Vector3, Vector4};

pub const NEAR_TL: usize = 0;
pub const NEAR_TR: usize = 1;
pub const NEAR_BR: usize = 2;
pub const NEAR_BL: usize = 3;
pub const FAR_TL: usize = 4;
pub const FAR_TR: usize = 5;
pub const FAR_BR: usize = 6;
pub const FAR_BL: usize = 7;

/// Outcome of testing a box against a frustum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntersectResult {
    None,
    Partial,
    Full,
}

impl IntersectResult {
    pub fn intersects(self) -> bool {
        self != IntersectResult::None
    }
}

/// Axis-aligned bounding box in tile-space coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vector3<f64>,
    pub max: Vector3<f64>,
    pub center: Vector3<f64>,
}

impl Aabb {
    pub fn new(min: Vector3<f64>, max: Vector3<f64>) -> Self {
        Self {
            min,
            max,
            center: (min + max) * 0.5,
        }
    }

    /// Smallest box containing every point
    pub fn from_points(points: &[Vector3<f64>]) -> Self {
        let mut min = Vector3::repeat(f64::INFINITY);
        let mut max = Vector3::repeat(f64::NEG_INFINITY);
        for p in points {
            min = min.inf(p);
            max = max.sup(p);
        }
        Self::new(min, max)
    }

    /// One of the four xy quadrants: 0 top-left, 1 top-right, 2 bottom-left,
    /// 3 bottom-right. The vertical extent is kept whole.
    pub fn quadrant(&self, index: usize) -> Aabb {
        let split = [index % 2 == 0, index < 2];
        let mut q_min = self.min;
        let mut q_max = self.max;
        for (axis, lower) in split.iter().enumerate() {
            q_min[axis] = if *lower { self.min[axis] } else { self.center[axis] };
            q_max[axis] = if *lower { self.center[axis] } else { self.max[axis] };
        }
        q_max.z = self.max.z;
        Aabb::new(q_min, q_max)
    }

    /// Signed gap along x from `point` to the box, zero when inside the span
    pub fn distance_x(&self, point: &[f64]) -> f64 {
        point[0].max(self.min.x).min(self.max.x) - point[0]
    }

    pub fn distance_y(&self, point: &[f64]) -> f64 {
        point[1].max(self.min.y).min(self.max.y) - point[1]
    }

    pub fn distance_z(&self, point: &[f64]) -> f64 {
        point[2].max(self.min.z).min(self.max.z) - point[2]
    }

    pub fn corners(&self) -> [Vector3<f64>; 8] {
        let (mn, mx) = (self.min, self.max);
        [
            Vector3::new(mn.x, mn.y, mn.z),
            Vector3::new(mx.x, mn.y, mn.z),
            Vector3::new(mx.x, mx.y, mn.z),
            Vector3::new(mn.x, mx.y, mn.z),
            Vector3::new(mn.x, mn.y, mx.z),
            Vector3::new(mx.x, mn.y, mx.z),
            Vector3::new(mx.x, mx.y, mx.z),
            Vector3::new(mn.x, mx.y, mx.z),
        ]
    }

    fn flat_corners(&self) -> [Vector3<f64>; 4] {
        [
            Vector3::new(self.min.x, self.min.y, 0.0),
            Vector3::new(self.max.x, self.min.y, 0.0),
            Vector3::new(self.max.x, self.max.y, 0.0),
            Vector3::new(self.min.x, self.max.y, 0.0),
        ]
    }

    /// Conservative plane test of all eight corners against the frustum
    pub fn intersects(&self, frustum: &Frustum) -> IntersectResult {
        if !self.intersects_aabb(&frustum.bounds) {
            return IntersectResult::None;
        }
        intersects_frustum(frustum, &self.corners())
    }

    /// Same as [`Aabb::intersects`] against the box flattened onto z = 0
    pub fn intersects_flat(&self, frustum: &Frustum) -> IntersectResult {
        if !self.intersects_aabb_xy(&frustum.bounds) {
            return IntersectResult::None;
        }
        intersects_frustum(frustum, &self.flat_corners())
    }

    /// Separating-axis test over the frustum edge axes. With `edge_cases_only`
    /// the cheap plane test is assumed to have passed already.
    pub fn intersects_precise(&self, frustum: &Frustum, edge_cases_only: bool) -> IntersectResult {
        if !edge_cases_only && !self.intersects(frustum).intersects() {
            return IntersectResult::None;
        }
        intersects_frustum_precise(frustum, &self.corners())
    }

    pub fn intersects_precise_flat(
        &self,
        frustum: &Frustum,
        edge_cases_only: bool,
    ) -> IntersectResult {
        if !edge_cases_only && !self.intersects_flat(frustum).intersects() {
            return IntersectResult::None;
        }
        intersects_frustum_precise(frustum, &self.flat_corners())
    }

    pub fn intersects_aabb(&self, other: &Aabb) -> bool {
        (0..3).all(|axis| self.min[axis] <= other.max[axis] && other.min[axis] <= self.max[axis])
    }

    pub fn intersects_aabb_xy(&self, other: &Aabb) -> bool {
        (0..2).all(|axis| self.min[axis] <= other.max[axis] && other.min[axis] <= self.max[axis])
    }

    pub fn encapsulate(&mut self, other: &Aabb) {
        *self = Aabb::new(self.min.inf(&other.min), self.max.sup(&other.max));
    }

    pub fn closest_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        point.sup(&self.min).inf(&self.max)
    }
}

fn project_points(points: &[Vector3<f64>], origin: &Vector3<f64>, axis: &Vector3<f64>) -> (f64, f64) {
    points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), p| {
        let projection = (p - origin).dot(axis);
        (min.min(projection), max.max(projection))
    })
}

/// Points this close to a plane count as outside, so boxes that only touch
/// the frustum are culled
const PLANE_EPSILON: f64 = 1e-9;

fn intersects_frustum(frustum: &Frustum, points: &[Vector3<f64>]) -> IntersectResult {
    let mut fully_inside = true;
    for plane in &frustum.planes {
        let normal = plane.xyz();
        let inside = points
            .iter()
            .filter(|p| normal.dot(*p) + plane.w > PLANE_EPSILON)
            .count();
        if inside == 0 {
            return IntersectResult::None;
        }
        if inside != points.len() {
            fully_inside = false;
        }
    }
    if fully_inside {
        IntersectResult::Full
    } else {
        IntersectResult::Partial
    }
}

fn intersects_frustum_precise(frustum: &Frustum, points: &[Vector3<f64>]) -> IntersectResult {
    for proj in &frustum.projections {
        let (min, max) = project_points(points, &frustum.points[0], &proj.axis);
        if proj.range.1 < min || proj.range.0 > max {
            return IntersectResult::None;
        }
    }
    IntersectResult::Partial
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct AxisProjection {
    axis: Vector3<f64>,
    range: (f64, f64),
}

/// Camera frustum in tile space: 8 corners and 6 inward-facing planes.
#[derive(Debug, Clone, PartialEq)]
pub struct Frustum {
    pub points: [Vector3<f64>; 8],
    /// Plane normal in xyz and distance in w; `n·p + d >= 0` is inside
    pub planes: [Vector4<f64>; 6],
    pub bounds: Aabb,
    projections: Vec<AxisProjection>,
}

impl Frustum {
    pub fn new(points: [Vector3<f64>; 8], planes: [Vector4<f64>; 6]) -> Self {
        let bounds = Aabb::from_points(&points);
        let edges = [
            points[NEAR_BR] - points[NEAR_BL],
            points[NEAR_TL] - points[NEAR_BL],
            points[FAR_TL] - points[NEAR_TL],
            points[FAR_TR] - points[NEAR_TR],
            points[FAR_BR] - points[NEAR_BR],
            points[FAR_BL] - points[NEAR_BL],
        ];
        // Candidate separating axes: x and y box edges crossed with frustum edges
        let mut projections = Vec::with_capacity(edges.len() * 2);
        for edge in &edges {
            for axis in [
                Vector3::new(0.0, -edge.z, edge.y),
                Vector3::new(edge.z, 0.0, -edge.x),
            ] {
                projections.push(AxisProjection {
                    axis,
                    range: project_points(&points, &points[0], &axis),
                });
            }
        }
        Self {
            points,
            planes,
            bounds,
            projections,
        }
    }

    /// Builds the frustum from an inverse view-projection matrix. Points are
    /// expressed in tiles of zoom `zoom`; with `z_in_meters` the z axis is
    /// left in the matrix's vertical unit instead of being scaled to tiles.
    pub fn from_inv_projection_matrix(
        inv_proj: &Matrix4<f64>,
        world_size: f64,
        zoom: f64,
        z_in_meters: bool,
    ) -> Self {
        const CLIP_CORNERS: [[f64; 3]; 8] = [
            [-1.0, 1.0, -1.0],
            [1.0, 1.0, -1.0],
            [1.0, -1.0, -1.0],
            [-1.0, -1.0, -1.0],
            [-1.0, 1.0, 1.0],
            [1.0, 1.0, 1.0],
            [1.0, -1.0, 1.0],
            [-1.0, -1.0, 1.0],
        ];
        let scale = 2f64.powf(zoom);
        let mut points = [Vector3::zeros(); 8];
        for (point, c) in points.iter_mut().zip(CLIP_CORNERS.iter()) {
            let s = inv_proj * Vector4::new(c[0], c[1], c[2], 1.0);
            let k = 1.0 / s.w / world_size * scale;
            let kz = if z_in_meters { 1.0 / s.w } else { k };
            *point = Vector3::new(s.x * k, s.y * k, s.z * kz);
        }

        const PLANE_INDICES: [[usize; 3]; 6] = [
            [NEAR_TL, NEAR_TR, NEAR_BR],
            [FAR_BR, FAR_TR, FAR_TL],
            [NEAR_TL, NEAR_BL, FAR_BL],
            [NEAR_BR, NEAR_TR, FAR_TR],
            [NEAR_BL, NEAR_BR, FAR_BR],
            [NEAR_TL, FAR_TL, FAR_TR],
        ];
        let mut planes = [Vector4::zeros(); 6];
        for (plane, idx) in planes.iter_mut().zip(PLANE_INDICES.iter()) {
            let a = points[idx[0]] - points[idx[1]];
            let b = points[idx[2]] - points[idx[1]];
            let n = a.cross(&b).normalize();
            let d = -n.dot(&points[idx[1]]);
            *plane = Vector4::new(n.x, n.y, n.z, d);
        }

        Frustum::new(points, planes)
    }

    pub fn contains_point(&self, point: &Vector3<f64>) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.xyz().dot(point) + plane.w >= 0.0)
    }
}

/// The four far-plane corners of the view frustum, used for fog and sky.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrustumCorners {
    pub tl: Vector3<f64>,
    pub tr: Vector3<f64>,
    pub br: Vector3<f64>,
    pub bl: Vector3<f64>,
    /// Horizon position as a fraction of the viewport height from the top
    pub horizon: f64,
}

impl FrustumCorners {
    pub fn from_inv_projection_matrix(
        inv_proj: &Matrix4<f64>,
        horizon_from_top: f64,
        viewport_height: f64,
    ) -> Self {
        let unproject = |x: f64, y: f64| -> Vector3<f64> {
            let p = inv_proj * Vector4::new(x, y, 1.0, 1.0);
            p.xyz() / p.w
        };
        Self {
            tl: unproject(-1.0, 1.0),
            tr: unproject(1.0, 1.0),
            br: unproject(1.0, -1.0),
            bl: unproject(-1.0, -1.0),
            horizon: horizon_from_top / viewport_height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub pos: Vector3<f64>,
    pub dir: Vector3<f64>,
}

impl Ray {
    pub fn new(pos: Vector3<f64>, dir: Vector3<f64>) -> Self {
        Self { pos, dir }
    }

    /// Intersection with the plane through `pt` with `normal`; `None` when
    /// the ray runs parallel to it
    pub fn intersects_plane(&self, pt: &Vector3<f64>, normal: &Vector3<f64>) -> Option<Vector3<f64>> {
        let d = normal.dot(&self.dir);
        if d.abs() < 1e-6 {
            return None;
        }
        let t = (pt - self.pos).dot(normal) / d;
        Some(self.pos + self.dir * t)
    }

    /// Closest point on a sphere, relative to its center. The flag is true
    /// only when the ray hits the sphere in front of its origin; otherwise the
    /// point is where the ray passes closest to the surface.
    pub fn closest_point_on_sphere(&self, center: &Vector3<f64>, r: f64) -> (Vector3<f64>, bool) {
        debug_assert!(self.dir.norm_squared() > 0.0 && r >= 0.0);
        if self.pos == *center || r == 0.0 {
            return (Vector3::zeros(), false);
        }
        let d = self.dir;
        let p = self.pos - center;
        let a = d.norm_squared();
        let b = 2.0 * p.dot(&d);
        let c = p.norm_squared() - r * r;
        let disc = b * b - 4.0 * a * c;

        if disc < 0.0 {
            let t = (-b / 2.0).max(0.0);
            let g = p + d * t;
            return (g * (r / g.norm()), false);
        }
        let t = (-b - disc.sqrt()) / (2.0 * a);
        if t < 0.0 {
            (p * (r / p.norm()), false)
        } else {
            (p + d * t, true)
        }
    }
}

fn is_counter_clockwise(a: &Point, b: &Point, c: &Point) -> bool {
    (c.y - a.y) * (b.x - a.x) > (b.y - a.y) * (c.x - a.x)
}

/// Whether the segment `e1`-`e2` crosses the box given by its corners in
/// order top-left, top-right, bottom-right, bottom-left
pub fn edge_intersects_box(e1: &Point, e2: &Point, corners: &[Point; 4]) -> bool {
    let tl = corners[0];
    let br = corners[2];
    if (e1.x < tl.x && e2.x < tl.x)
        || (e1.x > br.x && e2.x > br.x)
        || (e1.y < tl.y && e2.y < tl.y)
        || (e1.y > br.y && e2.y > br.y)
    {
        return false;
    }
    let dir = is_counter_clockwise(e1, e2, &corners[0]);
    corners[1..]
        .iter()
        .any(|c| is_counter_clockwise(e1, e2, c) != dir)
}

/// Squared 2D distance from `point` to the box `[min, max]`, zero inside
pub fn aabb_point_square_dist(min: &[f64; 2], max: &[f64; 2], point: Option<&[f64; 2]>) -> f64 {
    let mut sq_dist = 0.0;
    for i in 0..2 {
        let v = point.map_or(0.0, |p| p[i]);
        debug_assert!(min[i] < max[i], "aabb min must be below max");
        if min[i] > v {
            sq_dist += (min[i] - v) * (min[i] - v);
        }
        if max[i] < v {
            sq_dist += (v - max[i]) * (v - max[i]);
        }
    }
    sq_dist
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_frustum() -> Frustum {
        // Axis-aligned box-shaped frustum spanning [-1, 1] on every axis
        let inv = Matrix4::identity();
        Frustum::from_inv_projection_matrix(&inv, 1.0, 0.0, false)
    }

    #[test]
    fn test_frustum_planes_face_inward() {
        let frustum = unit_frustum();
        let origin = Vector3::zeros();
        for plane in &frustum.planes {
            assert!(plane.xyz().dot(&origin) + plane.w > 0.0);
        }
    }

    #[test]
    fn test_aabb_intersection_states() {
        let frustum = unit_frustum();

        let inside = Aabb::new(Vector3::new(-0.5, -0.5, -0.5), Vector3::new(0.5, 0.5, 0.5));
        assert_eq!(inside.intersects(&frustum), IntersectResult::Full);

        let straddling = Aabb::new(Vector3::new(0.5, 0.5, 0.0), Vector3::new(2.0, 2.0, 0.5));
        assert_eq!(straddling.intersects(&frustum), IntersectResult::Partial);

        let outside = Aabb::new(Vector3::new(3.0, 3.0, 0.0), Vector3::new(4.0, 4.0, 1.0));
        assert_eq!(outside.intersects(&frustum), IntersectResult::None);
        assert_eq!(outside.intersects_precise(&frustum, false), IntersectResult::None);

        let touching = Aabb::new(Vector3::new(1.0, -0.5, -0.5), Vector3::new(2.0, 0.5, 0.5));
        assert_eq!(touching.intersects(&frustum), IntersectResult::None);
    }

    #[test]
    fn test_quadrants_partition_box() {
        let aabb = Aabb::new(Vector3::new(0.0, 0.0, 0.0), Vector3::new(2.0, 2.0, 5.0));
        let q0 = aabb.quadrant(0);
        assert_eq!(q0.min, Vector3::new(0.0, 0.0, 0.0));
        assert_eq!(q0.max, Vector3::new(1.0, 1.0, 5.0));
        let q3 = aabb.quadrant(3);
        assert_eq!(q3.min, Vector3::new(1.0, 1.0, 0.0));
        assert_eq!(q3.max, Vector3::new(2.0, 2.0, 5.0));
        let q1 = aabb.quadrant(1);
        assert_eq!(q1.min.x, 1.0);
        assert_eq!(q1.max.y, 1.0);
    }

    #[test]
    fn test_axis_distances() {
        let aabb = Aabb::new(Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
        let p = [0.5, 3.0, -2.0];
        assert_eq!(aabb.distance_x(&p), 0.0);
        assert_eq!(aabb.distance_y(&p), -2.0);
        assert_eq!(aabb.distance_z(&p), 2.0);
    }

    #[test]
    fn test_ray_plane_intersection() {
        let ray = Ray::new(Vector3::new(0.0, 0.0, 10.0), Vector3::new(0.0, 0.0, -1.0));
        let hit = ray
            .intersects_plane(&Vector3::zeros(), &Vector3::new(0.0, 0.0, 1.0))
            .unwrap();
        assert_eq!(hit, Vector3::new(0.0, 0.0, 0.0));

        let parallel = Ray::new(Vector3::new(0.0, 0.0, 10.0), Vector3::new(1.0, 0.0, 0.0));
        assert!(parallel
            .intersects_plane(&Vector3::zeros(), &Vector3::new(0.0, 0.0, 1.0))
            .is_none());
    }

    #[test]
    fn test_ray_sphere_hit_and_miss() {
        let center = Vector3::zeros();
        let hit = Ray::new(Vector3::new(0.0, 0.0, 10.0), Vector3::new(0.0, 0.0, -1.0));
        let (p, intersects) = hit.closest_point_on_sphere(&center, 2.0);
        assert!(intersects);
        assert!((p - Vector3::new(0.0, 0.0, 2.0)).norm() < 1e-9);

        let miss = Ray::new(Vector3::new(5.0, 0.0, 10.0), Vector3::new(0.0, 0.0, -1.0));
        let (p, intersects) = miss.closest_point_on_sphere(&center, 2.0);
        assert!(!intersects);
        assert!((p.norm() - 2.0).abs() < 1e-9);
        assert!((p - Vector3::new(2.0, 0.0, 0.0)).norm() < 1e-9);
    }

    #[test]
    fn test_edge_intersects_box() {
        let corners = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        assert!(edge_intersects_box(&Point::new(-5.0, 5.0), &Point::new(15.0, 5.0), &corners));
        assert!(!edge_intersects_box(&Point::new(-5.0, -5.0), &Point::new(-1.0, 20.0), &corners));
        assert!(!edge_intersects_box(&Point::new(-5.0, 4.0), &Point::new(4.0, -5.0), &corners));
    }

    #[test]
    fn test_aabb_point_square_dist() {
        assert_eq!(aabb_point_square_dist(&[0.0, 0.0], &[1.0, 1.0], Some(&[0.5, 0.5])), 0.0);
        assert_eq!(aabb_point_square_dist(&[1.0, 1.0], &[2.0, 2.0], None), 2.0);
        assert_eq!(aabb_point_square_dist(&[0.0, 0.0], &[1.0, 1.0], Some(&[4.0, 0.5])), 9.0);
    }
}
