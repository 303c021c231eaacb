use crate::core::geo::{lat_from_mercator_y, lng_from_mercator_x};
use crate::core::transform::Transform;
use crate::projection::{globe, Projection, ProjectionKind};
use crate::spatial::culling::Aabb;
use crate::tiles::tile_id::CanonicalTileID;
use nalgebra::Vector3;

/// Points sampled along each tile edge to bound its projected shape
const EDGE_SAMPLES: usize = 8;

/// Placement of a mercator tile in a projection's unit square. The tile is
/// drawn as a square of side `1 / scale` anchored at the projected bounding
/// box's top-left corner; `x, y, x2, y2` are that box scaled by `scale`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileTransform {
    pub scale: f64,
    pub x: f64,
    pub y: f64,
    pub x2: f64,
    pub y2: f64,
}

impl TileTransform {
    pub fn new(id: &CanonicalTileID, projection: &Projection) -> Self {
        let [min_x, min_y, max_x, max_y] = projected_tile_bounds(id, projection);
        let scale = 1.0 / (max_x - min_x).max(max_y - min_y);
        Self {
            scale,
            x: min_x * scale,
            y: min_y * scale,
            x2: max_x * scale,
            y2: max_y * scale,
        }
    }
}

/// Bounding box `[min_x, min_y, max_x, max_y]` of a mercator tile once
/// projected into the unit square
pub fn projected_tile_bounds(id: &CanonicalTileID, projection: &Projection) -> [f64; 4] {
    let n = 2f64.powi(id.z as i32);
    if projection.kind != ProjectionKind::Equirectangular {
        return [
            id.x as f64 / n,
            id.y as f64 / n,
            (id.x + 1) as f64 / n,
            (id.y + 1) as f64 / n,
        ];
    }

    let mut bounds = [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY];
    let mut include = |mx: f64, my: f64| {
        let p = projection.project(lng_from_mercator_x(mx), lat_from_mercator_y(my));
        bounds[0] = bounds[0].min(p.x);
        bounds[1] = bounds[1].min(p.y);
        bounds[2] = bounds[2].max(p.x);
        bounds[3] = bounds[3].max(p.y);
    };
    for i in 0..=EDGE_SAMPLES {
        let t = i as f64 / EDGE_SAMPLES as f64;
        let (x, y) = (id.x as f64, id.y as f64);
        include((x + t) / n, y / n);
        include((x + t) / n, (y + 1.0) / n);
        include(x / n, (y + t) / n);
        include((x + 1.0) / n, (y + t) / n);
    }
    bounds
}

/// Bounds of a tile in units of tiles at the zoom where the world is
/// `num_tiles` wide, with the vertical range `[min_z, max_z]`
#[allow(clippy::too_many_arguments)]
pub fn tile_aabb(
    tr: &Transform,
    num_tiles: f64,
    z: u8,
    x: u32,
    y: u32,
    wrap: i32,
    min_z: f64,
    max_z: f64,
) -> Aabb {
    let projection = &tr.projection;
    if projection.is_globe() {
        return globe::aabb_for_tile_on_globe(tr, num_tiles, &CanonicalTileID::new(z, x, y), false);
    }
    let [min_x, min_y, max_x, max_y] = projected_tile_bounds(&CanonicalTileID::new(z, x, y), projection);
    let offset = wrap as f64;
    Aabb::new(
        Vector3::new((offset + min_x) * num_tiles, min_y * num_tiles, min_z),
        Vector3::new((offset + max_x) * num_tiles, max_y * num_tiles, max_z),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mercator_tile_transform_is_grid() {
        let tt = TileTransform::new(&CanonicalTileID::new(3, 5, 2), &Projection::mercator());
        assert_eq!(tt.scale, 8.0);
        assert_eq!((tt.x, tt.y, tt.x2, tt.y2), (5.0, 2.0, 6.0, 3.0));
    }

    #[test]
    fn test_equirectangular_bounds_follow_latitude() {
        let projection = Projection::equirectangular();
        let [min_x, min_y, max_x, max_y] = projected_tile_bounds(&CanonicalTileID::new(0, 0, 0), &projection);
        assert!((min_x - 0.0).abs() < 1e-9 && (max_x - 1.0).abs() < 1e-9);
        // The mercator world reaches about 85 degrees, a quarter turn in y
        assert!((min_y - (0.5 - 85.0511287798 / 360.0)).abs() < 1e-6);
        assert!((max_y - (0.5 + 85.0511287798 / 360.0)).abs() < 1e-6);
    }
}
