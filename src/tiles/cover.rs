//! Visible tile selection.
//!
//! [`Transform::covering_tiles`] walks the tile quadtree of every rendered
//! world copy, culls nodes against the camera frustum and splits nodes that
//! are close enough to the camera to need more detail. The two `extend_*`
//! methods add neighbours that a renderer may want to prefetch.

use crate::core::config::CoveringTilesOptions;
use crate::core::constants::{
    ACUTE_ANGLE_SCALE, ACUTE_ANGLE_THRESHOLD, EXTEND_TILE_COVER_LIMIT, EXTENT,
    FLOOR_ZOOM_SPLIT_FACTOR, NUM_WORLD_COPIES,
};
use crate::core::geo::{
    circumference_at_latitude, lat_from_mercator_y, mercator_z_from_altitude, MercatorCoordinate, Point,
};
use crate::core::transform::Transform;
use crate::prelude::HashSet;
use crate::projection::adjustments::scale_adjustment;
use crate::projection::globe::{aabb_for_tile_on_globe, GLOBE_ZOOM_THRESHOLD_MIN};
use crate::projection::tile_transform::tile_aabb;
use crate::spatial::culling::{
    aabb_point_square_dist, edge_intersects_box, Aabb, Frustum, IntersectResult, FAR_BL, FAR_BR, NEAR_BL,
    NEAR_BR,
};
use crate::tiles::tile_id::{calculate_key, quadrant, CanonicalTileID, OverscaledTileID};
use nalgebra::{Vector3, Vector4};

/// Tile corners in the order top-left, top-right, bottom-right, bottom-left
const TILE_CORNERS: [[f64; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

/// Corner of a tile, in tile units, that lies farthest along `bearing`
/// degrees
pub fn furthest_tile_corner(bearing: f64) -> [f64; 2] {
    let aligned = ((bearing + 45.0) + 360.0) % 360.0;
    let index = (aligned / 90.0).round() as usize % 4;
    TILE_CORNERS[index]
}

/// Point where the segment from `near` toward `far` reaches z = 0
pub fn project_to_ground(near: &Vector3<f64>, far: &Vector3<f64>) -> Vector3<f64> {
    debug_assert!(far.z < near.z, "far point must be below the near point");
    near.lerp(far, near.z / (near.z - far.z))
}

/// Factor applied to the split distance of tiles seen at a grazing angle.
/// Past the threshold angle each further step of `dz` may be stretched by
/// the scale again, following a geometric series.
fn dist_to_split_scale(dz: f64, d: f64) -> f64 {
    if d * ACUTE_ANGLE_THRESHOLD < dz {
        return 1.0;
    }
    let r = d / dz;
    let k = r - 1.0 / ACUTE_ANGLE_THRESHOLD;
    r / (1.0 / ACUTE_ANGLE_THRESHOLD + (ACUTE_ANGLE_SCALE.powf(k + 1.0) - 1.0) / (ACUTE_ANGLE_SCALE - 1.0) - 1.0)
}

#[derive(Debug, Clone, Copy)]
enum NodeState {
    Unvisited,
    /// The split decision was made early, while refining the box from
    /// elevation data
    Evaluated {
        should_split: bool,
        tile_id: OverscaledTileID,
    },
}

/// A quadtree node waiting on the traversal stack
#[derive(Debug, Clone, Copy)]
struct Node {
    aabb: Aabb,
    zoom: u8,
    x: u32,
    y: u32,
    wrap: i32,
    min_z: f64,
    max_z: f64,
    /// An ancestor was fully inside the frustum
    fully_visible: bool,
    state: NodeState,
}

/// Values shared by every node of one traversal
struct Traversal<'a> {
    tr: &'a Transform,
    num_tiles: f64,
    max_zoom: u8,
    min_zoom: u8,
    actual_z: u8,
    overscaled_z: u8,
    center_point: [f64; 3],
    camera_point: [f64; 3],
    center_latitude: f64,
    camera_height: f64,
    meter_to_tile: f64,
    zoom_split_distance: f64,
    scale_adjustment: f64,
    use_elevation_data: bool,
}

impl Traversal<'_> {
    fn is_globe(&self) -> bool {
        self.tr.projection.is_globe()
    }

    fn is_mercator(&self) -> bool {
        self.tr.projection.is_mercator()
    }

    fn root(&self, wrap: i32, min_z: f64, max_z: f64) -> Node {
        Node {
            aabb: tile_aabb(self.tr, self.num_tiles, 0, 0, 0, wrap, min_z, max_z),
            zoom: 0,
            x: 0,
            y: 0,
            wrap,
            min_z,
            max_z,
            fully_visible: false,
            state: NodeState::Unvisited,
        }
    }

    fn tile_zoom(&self, zoom: u8) -> u8 {
        if zoom == self.max_zoom {
            self.overscaled_z
        } else {
            zoom
        }
    }

    /// Size of a small mercator square after reprojection, relative to its
    /// mercator size
    fn relative_scale_at(&self, mc: &MercatorCoordinate) -> f64 {
        const OFFSET: f64 = 1.0 / 40000.0;
        let east = MercatorCoordinate::new(mc.x + OFFSET, mc.y, mc.z);
        let south = MercatorCoordinate::new(mc.x, mc.y + OFFSET, mc.z);

        let p = self.tr.location_coordinate(&mc.to_lat_lng(), None);
        let p_east = self.tr.location_coordinate(&east.to_lat_lng(), None);
        let p_south = self.tr.location_coordinate(&south.to_lat_lng(), None);

        let dx = (p_east.x - p.x).hypot(p_east.y - p.y);
        let dy = (p_south.x - p.x).hypot(p_south.y - p.y);
        (dx * dy).sqrt() * self.scale_adjustment / OFFSET
    }

    fn should_split(&self, node: &Node) -> bool {
        if node.zoom < self.min_zoom {
            return true;
        }
        if node.zoom == self.max_zoom {
            return false;
        }
        if let NodeState::Evaluated { should_split, .. } = node.state {
            return should_split;
        }

        let aabb = &node.aabb;
        let dx = aabb.distance_x(&self.camera_point);
        let dy = aabb.distance_y(&self.camera_point);
        let mut dz = self.camera_height;
        let mut tile_scale_adjustment = 1.0;

        if self.is_globe() {
            dz = aabb.distance_z(&self.camera_point);
            // Tiles toward the poles are physically smaller and can use a
            // coarser level
            let tiles_at_zoom = 2f64.powi(node.zoom as i32);
            let min_lat = lat_from_mercator_y((node.y + 1) as f64 / tiles_at_zoom);
            let max_lat = lat_from_mercator_y(node.y as f64 / tiles_at_zoom);
            let closest_lat = self.center_latitude.max(min_lat).min(max_lat);
            let relative_tile_scale =
                circumference_at_latitude(closest_lat) / circumference_at_latitude(self.center_latitude);

            let mercator_scale_ratio = self.tr.mercator_scale_ratio;
            tile_scale_adjustment = if closest_lat == self.center_latitude {
                const MAX_DIVERGENCE: f64 = 0.3;
                1.0 / (mercator_scale_ratio - MAX_DIVERGENCE).max(1.0)
            } else {
                (relative_tile_scale / mercator_scale_ratio).min(1.0)
            };

            // Keep the tiles around the center on the center's level
            if self.tr.zoom() <= GLOBE_ZOOM_THRESHOLD_MIN
                && node.zoom + 1 == self.max_zoom
                && relative_tile_scale >= 0.9
            {
                return true;
            }
        } else {
            if self.use_elevation_data {
                dz = aabb.distance_z(&self.camera_point) * self.meter_to_tile;
            }
            if self.tr.projection.is_reprojected_in_tile_space && self.actual_z <= 5 {
                // Reprojected tiles differ in size at low zoom
                let n = 2f64.powi(node.zoom as i32);
                let center = MercatorCoordinate::new((node.x as f64 + 0.5) / n, (node.y as f64 + 0.5) / n, 0.0);
                let relative_scale = self.relative_scale_at(&center);
                tile_scale_adjustment = if relative_scale > 0.85 { 1.0 } else { relative_scale };
            }
        }

        let level_scale = (1u64 << (self.max_zoom - node.zoom)) as f64;
        if !self.is_mercator() {
            let distance = (dx * dx + dy * dy + dz * dz).sqrt();
            let dist_to_split = level_scale * self.zoom_split_distance * tile_scale_adjustment
                * dist_to_split_scale(dz.max(self.camera_height), distance);
            return distance < dist_to_split;
        }

        let camera = Vector3::from(self.camera_point);
        let forward = self.tr.camera.forward();
        let mut closest_distance = f64::MAX;
        let mut closest_elevation = 0.0;
        for corner in aabb.corners() {
            let mut d = corner - camera;
            if self.use_elevation_data {
                d.z *= self.meter_to_tile;
            } else {
                d.z = self.camera_height;
            }
            let dist = d.dot(&forward);
            if dist < closest_distance {
                closest_distance = dist;
                closest_elevation = d.z.abs();
            }
        }

        let dist_to_split = level_scale * self.zoom_split_distance * tile_scale_adjustment
            * dist_to_split_scale(closest_elevation.max(self.camera_height), closest_distance);
        if closest_distance < dist_to_split {
            return true;
        }

        // At steep pitch the center can fall outside the max zoom distance;
        // the tile right under it still gets full detail
        let closest = aabb.closest_point(&Vector3::from(self.center_point));
        closest.x == self.center_point[0] && closest.y == self.center_point[1]
    }

    /// Narrows the box of a child to its loaded elevation range. Without
    /// data, leaf tiles are assumed to sit at the center altitude.
    fn refine_from_elevation(&self, node: &mut Node, tile_id: OverscaledTileID) {
        let Some(elevation) = self.tr.terrain() else {
            return;
        };
        if !self.is_mercator() {
            node.state = NodeState::Unvisited;
            return;
        }
        match elevation.get_min_max_for_tile(&tile_id) {
            Some(range) => {
                node.aabb = Aabb::new(
                    Vector3::new(node.aabb.min.x, node.aabb.min.y, range.min),
                    Vector3::new(node.aabb.max.x, node.aabb.max.y, range.max),
                );
            }
            None => {
                let should_split = self.should_split(node);
                if !should_split {
                    let z = self.tr.center_altitude;
                    node.aabb = Aabb::new(
                        Vector3::new(node.aabb.min.x, node.aabb.min.y, z),
                        Vector3::new(node.aabb.max.x, node.aabb.max.y, z),
                    );
                }
                node.state = NodeState::Evaluated { should_split, tile_id };
            }
        }
    }
}

impl Transform {
    /// Tiles needed to draw the current view, nearest to the view center
    /// first. No returned tile is an ancestor of another.
    pub fn covering_tiles(&self, options: &CoveringTilesOptions) -> Vec<OverscaledTileID> {
        let mut z = self.covering_zoom_level(options);
        let actual_z = z;

        let elevation = self.terrain();
        let has_exaggeration = elevation.is_some_and(|e| e.exaggeration() != 0.0);
        let use_elevation_data = has_exaggeration && !options.is_terrain_dem;

        if options.min_zoom.is_some_and(|min| z < min) {
            return Vec::new();
        }
        if let Some(max) = options.max_zoom {
            z = z.min(max);
        }

        let is_globe = self.projection.is_globe();
        let z_in_meters = !is_globe;
        let num_tiles = (1u64 << z) as f64;
        let center_coord = self.location_coordinate(&self.center, None);
        let center_point = [num_tiles * center_coord.x, num_tiles * center_coord.y, 0.0];
        let frustum = Frustum::from_inv_projection_matrix(&self.inv_proj_matrix, self.world_size(), z as f64, z_in_meters);

        let camera_coord = if is_globe {
            self.camera.mercator_position()
        } else {
            self.point_coordinate(&self.camera_point(), None)
        };
        let meter_in_merc = mercator_z_from_altitude(1.0, self.center.lat);
        let meter_to_tile = num_tiles * meter_in_merc;
        let camera_altitude = self.camera.position.z / meter_in_merc;
        let camera_point = [
            num_tiles * camera_coord.x,
            num_tiles * camera_coord.y,
            camera_altitude * if z_in_meters { 1.0 } else { meter_to_tile },
        ];
        let vertical_frustum_intersect = is_globe || has_exaggeration;

        // Without rounding, tile zoom z covers zooms up to z + 1, so the
        // split distance is taken from the far end of that range
        let zoom_split_distance = self.camera_to_center_distance / options.tile_size
            * if options.round_zoom { 1.0 } else { FLOOR_ZOOM_SPLIT_FACTOR };

        // Deep boxes for terrain so that raised ground still meets the frustum
        let max_range = match elevation {
            Some(e) if options.is_terrain_dem => e.exaggeration() * 10000.0,
            Some(e) => e
                .get_min_max_for_visible_tiles()
                .map_or(self.center_altitude, |range| range.max),
            None => self.center_altitude,
        };
        let min_range = if options.is_terrain_dem {
            -max_range
        } else {
            elevation.map_or(0.0, |e| e.get_min_elevation_below_msl())
        };

        let traversal = Traversal {
            tr: self,
            num_tiles,
            max_zoom: z,
            min_zoom: if self.is_lod_disabled(true) { z } else { 0 },
            actual_z,
            overscaled_z: if options.reparse_overscaled { actual_z } else { z },
            center_point,
            camera_point,
            center_latitude: self.center.lat,
            camera_height: (camera_altitude - self.center_altitude) * meter_to_tile,
            meter_to_tile,
            zoom_split_distance,
            scale_adjustment: if self.projection.is_reprojected_in_tile_space {
                scale_adjustment(self)
            } else {
                1.0
            },
            use_elevation_data,
        };

        let mut stack = Vec::with_capacity(64);
        if self.render_world_copies() {
            for i in 1..=NUM_WORLD_COPIES {
                stack.push(traversal.root(-i, min_range, max_range));
                stack.push(traversal.root(i, min_range, max_range));
            }
        }
        stack.push(traversal.root(0, min_range, max_range));

        let pole_aabb = |node: &Node| -> Option<Aabb> {
            let last_row = (1u32 << node.zoom) - 1;
            (is_globe && (node.y == 0 || node.y == last_row)).then(|| {
                aabb_for_tile_on_globe(self, num_tiles, &CanonicalTileID::new(node.zoom, node.x, node.y), true)
            })
        };

        let mut result: Vec<(OverscaledTileID, f64)> = Vec::new();
        while let Some(node) = stack.pop() {
            let mut fully_visible = node.fully_visible;

            if !fully_visible {
                let mut hit = if vertical_frustum_intersect {
                    node.aabb.intersects(&frustum)
                } else {
                    node.aabb.intersects_flat(&frustum)
                };
                if hit == IntersectResult::None {
                    if let Some(pole) = pole_aabb(&node) {
                        hit = pole.intersects(&frustum);
                    }
                }
                if hit == IntersectResult::None {
                    continue;
                }
                fully_visible = hit == IntersectResult::Full;
            }

            if node.zoom == traversal.max_zoom || !traversal.should_split(&node) {
                let tile_zoom = traversal.tile_zoom(node.zoom);
                if options.min_zoom.is_some_and(|min| min > tile_zoom) {
                    continue;
                }

                let mut visibility = 0u8;
                if !fully_visible {
                    let mut hit = if vertical_frustum_intersect {
                        node.aabb.intersects_precise(&frustum, false)
                    } else {
                        node.aabb.intersects_precise_flat(&frustum, false)
                    };
                    if hit == IntersectResult::None {
                        if let Some(pole) = pole_aabb(&node) {
                            hit = pole.intersects_precise(&frustum, false);
                        }
                    }
                    if hit == IntersectResult::None {
                        continue;
                    }

                    if options.calculate_quadrant_visibility {
                        if frustum.contains_point(&node.aabb.center) {
                            visibility = quadrant::ALL;
                        } else {
                            for i in 0..4 {
                                if node.aabb.quadrant(i).intersects(&frustum).intersects() {
                                    visibility |= 1 << i;
                                }
                            }
                        }
                    }
                }

                let level_scale = (1u64 << (z - node.zoom)) as f64;
                let world_offset = (node.wrap as i64 * (1i64 << node.zoom)) as f64;
                let dx = center_point[0] - (0.5 + node.x as f64 + world_offset) * level_scale;
                let dy = center_point[1] - 0.5 - node.y as f64;
                let mut id = match node.state {
                    NodeState::Evaluated { tile_id, .. } => tile_id,
                    NodeState::Unvisited => {
                        OverscaledTileID::new(tile_zoom, node.wrap, node.zoom, node.x, node.y)
                    }
                };
                if options.calculate_quadrant_visibility {
                    id.visible_quadrants = Some(visibility);
                }
                result.push((id, dx * dx + dy * dy));
                continue;
            }

            for i in 0..4u32 {
                let child_x = (node.x << 1) + (i % 2);
                let child_y = (node.y << 1) + (i >> 1);
                let child_zoom = node.zoom + 1;
                let aabb = if traversal.is_mercator() {
                    node.aabb.quadrant(i as usize)
                } else {
                    tile_aabb(self, num_tiles, child_zoom, child_x, child_y, node.wrap, node.min_z, node.max_z)
                };
                let mut child = Node {
                    aabb,
                    zoom: child_zoom,
                    x: child_x,
                    y: child_y,
                    wrap: node.wrap,
                    min_z: node.min_z,
                    max_z: node.max_z,
                    fully_visible,
                    state: NodeState::Unvisited,
                };
                if use_elevation_data && !is_globe {
                    let tile_id = OverscaledTileID::new(
                        traversal.tile_zoom(child_zoom),
                        node.wrap,
                        child_zoom,
                        child_x,
                        child_y,
                    );
                    traversal.refine_from_elevation(&mut child, tile_id);
                }
                stack.push(child);
            }
        }

        if let Some(fog_cull_dist_sq) = self.fog_cull_dist_sq().filter(|d| *d != 0.0) {
            let horizon = self.horizon_line_from_top(true);
            result.retain(|(id, _)| {
                self.survives_fog_cull(id, fog_cull_dist_sq, horizon, options.is_terrain_dem, min_range, max_range)
            });
        }

        result.sort_by(|a, b| a.1.total_cmp(&b.1));
        let cover: Vec<OverscaledTileID> = result.into_iter().map(|(id, _)| id).collect();

        if let Some(first) = cover.first() {
            if first.overscaled_z != traversal.overscaled_z {
                log::debug!(
                    "nearest tile is at z{} instead of z{}",
                    first.overscaled_z,
                    traversal.overscaled_z
                );
            }
        }
        log::trace!("covering {} tiles at z{}", cover.len(), z);
        cover
    }

    /// Keeps tiles within the fog range, plus tiles whose terrain may reach
    /// above the horizon line
    fn survives_fog_cull(
        &self,
        id: &OverscaledTileID,
        fog_cull_dist_sq: f64,
        horizon: f64,
        is_terrain_dem: bool,
        min_range: f64,
        max_range: f64,
    ) -> bool {
        let unwrapped = id.to_unwrapped();
        let fog_matrix = self.tile_fog_matrix(&unwrapped);
        let tl = fog_matrix * Vector4::new(0.0, 0.0, 0.0, 1.0);
        let br = fog_matrix * Vector4::new(EXTENT, EXTENT, 0.0, 1.0);

        // The fog matrix can flip the corners
        let min = [tl.x.min(br.x), tl.y.min(br.y)];
        let max = [tl.x.max(br.x), tl.y.max(br.y)];
        let sq_dist = aabb_point_square_dist(&min, &max, None);
        if sq_dist == 0.0 {
            return true;
        }
        if sq_dist < fog_cull_dist_sq {
            return true;
        }

        let Some(elevation) = self.terrain() else {
            return false;
        };
        if horizon == 0.0 {
            return false;
        }

        let range = if is_terrain_dem {
            None
        } else {
            elevation.get_min_max_for_tile(id)
        };
        let max_elevation = range.map_or(max_range, |r| r.max);
        debug_assert!(min_range <= max_range);

        let corner = furthest_tile_corner(self.rotation());
        let proj_matrix = self.tile_proj_matrix(&unwrapped, false, false);
        let far = proj_matrix * Vector4::new(corner[0] * EXTENT, corner[1] * EXTENT, max_elevation, 1.0);
        let screen_y = (1.0 - far.y / far.w) * self.height * 0.5;
        screen_y < horizon
    }

    /// Neighbours of `covering_tiles` that are not in the cover yet. With a
    /// `direction` the neighbours opposite to the movement are added;
    /// without one, the neighbours next to each tile's visible quadrants,
    /// kept within a few tiles of the camera.
    pub fn extend_tile_cover(
        &self,
        covering_tiles: &[OverscaledTileID],
        max_zoom: u8,
        direction: Option<&Vector3<f64>>,
    ) -> Vec<OverscaledTileID> {
        let mut out: Vec<OverscaledTileID> = Vec::new();
        let extend_quadrants = direction.is_none();
        if extend_quadrants && self.zoom() < max_zoom as f64 {
            return out;
        }
        if direction.is_some_and(|d| d.x == 0.0 && d.y == 0.0) {
            return out;
        }

        let mut added: HashSet<u64> = HashSet::default();
        let mut add = |oz: u8, wrap: i32, z: u8, x: u32, y: u32| {
            if added.insert(calculate_key(wrap, oz, z, x, y)) {
                out.push(OverscaledTileID::new(oz, wrap, z, x, y));
            }
        };

        for id in covering_tiles {
            if extend_quadrants && id.canonical.z != max_zoom {
                continue;
            }
            let CanonicalTileID { z, x, y } = id.canonical;
            let oz = id.overscaled_z;
            let wrap = id.wrap;
            let tiles = 1u32 << z;

            let x_max_inside = x + 1 < tiles;
            let x_min_inside = x > 0;
            let y_max_inside = y + 1 < tiles;
            let y_min_inside = y > 0;

            let left_wrap = if x_min_inside { wrap } else { wrap - 1 };
            let right_wrap = if x_max_inside { wrap } else { wrap + 1 };
            let left_x = if x_min_inside { x - 1 } else { tiles - 1 };
            let right_x = if x_max_inside { x + 1 } else { 0 };

            match direction {
                Some(d) => {
                    let side = if d.x < 0.0 {
                        Some((right_wrap, right_x))
                    } else if d.x > 0.0 {
                        Some((left_wrap, left_x))
                    } else {
                        None
                    };
                    match side {
                        Some((side_wrap, side_x)) => {
                            add(oz, side_wrap, z, side_x, y);
                            if d.y < 0.0 && y_max_inside {
                                add(oz, wrap, z, x, y + 1);
                                add(oz, side_wrap, z, side_x, y + 1);
                            }
                            if d.y > 0.0 && y_min_inside {
                                add(oz, wrap, z, x, y - 1);
                                add(oz, side_wrap, z, side_x, y - 1);
                            }
                        }
                        None => {
                            if d.y < 0.0 && y_max_inside {
                                add(oz, wrap, z, x, y + 1);
                            } else if y_min_inside {
                                add(oz, wrap, z, x, y - 1);
                            }
                        }
                    }
                }
                None => {
                    debug_assert!(id.visible_quadrants.is_some(), "cover was built without quadrant visibility");
                    let visibility = id.visible_quadrants.unwrap_or(0);
                    let sides = [
                        (quadrant::TOP_LEFT, left_wrap, left_x, false),
                        (quadrant::TOP_RIGHT, right_wrap, right_x, false),
                        (quadrant::BOTTOM_LEFT, left_wrap, left_x, true),
                        (quadrant::BOTTOM_RIGHT, right_wrap, right_x, true),
                    ];
                    for (bit, side_wrap, side_x, bottom) in sides {
                        if visibility & bit == 0 {
                            continue;
                        }
                        add(oz, side_wrap, z, side_x, y);
                        if bottom && y_max_inside {
                            add(oz, wrap, z, x, y + 1);
                            add(oz, side_wrap, z, side_x, y + 1);
                        } else if !bottom && y_min_inside {
                            add(oz, wrap, z, x, y - 1);
                            add(oz, side_wrap, z, side_x, y - 1);
                        }
                    }
                }
            }
        }

        // New tiles covered by other new tiles go first, then anything
        // already in the cover or overlapping it
        let non_overlapping: Vec<OverscaledTileID> = out
            .iter()
            .filter(|id| !out.iter().any(|ancestor| id.is_child_of(ancestor)))
            .copied()
            .collect();
        out = non_overlapping
            .into_iter()
            .filter(|new_id| {
                !covering_tiles.iter().any(|old| {
                    (new_id.overscaled_z < max_zoom && old.is_child_of(new_id))
                        || new_id == old
                        || new_id.is_child_of(old)
                })
            })
            .collect();

        if extend_quadrants {
            let num_tiles = (1u64 << max_zoom) as f64;
            let camera_coord = if self.projection.is_globe() {
                self.camera.mercator_position()
            } else {
                self.point_coordinate(&self.camera_point(), None)
            };
            let camera = [num_tiles * camera_coord.x, num_tiles * camera_coord.y];
            let limit_sq = (EXTEND_TILE_COVER_LIMIT * EXTEND_TILE_COVER_LIMIT) as f64;
            out.retain(|id| {
                let dx = id.canonical.x as f64 + 0.5 - camera[0];
                let dy = id.canonical.y as f64 + 0.5 - camera[1];
                dx * dx + dy * dy < limit_sq
            });
        }

        out
    }

    /// Tiles at `max_zoom` crossed by the ground projection of the lower
    /// frustum edges, which the cover can miss right under the camera.
    /// `frustum` is expected in tile units of `max_zoom`.
    pub fn extend_tile_cover_to_near_plane(
        &self,
        tiles: &[OverscaledTileID],
        frustum: &Frustum,
        max_zoom: u8,
    ) -> Vec<OverscaledTileID> {
        let mut out = Vec::new();
        let mut added: HashSet<u64> = tiles.iter().map(|t| t.key).collect();

        let overscaled_z = tiles.iter().map(|t| t.overscaled_z).fold(max_zoom, u8::max);
        let num_tiles = 1i64 << max_zoom;
        let tile_corners = [
            Point::new(0.0, 0.0),
            Point::new(EXTENT, 0.0),
            Point::new(EXTENT, EXTENT),
            Point::new(0.0, EXTENT),
        ];

        let mut find_intersections = |e1: &Vector3<f64>, e2: &Vector3<f64>| {
            let (e1_x, e1_y) = (e1.x.floor(), e1.y.floor());
            let (e2_x, e2_y) = (e2.x.floor(), e2.y.floor());
            let e1_tile = Point::new((e1.x - e1_x) * EXTENT, (e1.y - e1_y) * EXTENT);
            let e2_tile = Point::new((e2.x - e2_x) * EXTENT, (e2.y - e2_y) * EXTENT);

            // A 3x3 neighbourhood around the near point is enough
            for dx in -1i64..=1 {
                let x = e1_x as i64 + dx;
                if x < 0 || x >= num_tiles {
                    continue;
                }
                for dy in -1i64..=1 {
                    let y = e1_y as i64 + dy;
                    if y < 0 || y >= num_tiles {
                        continue;
                    }
                    // Both ends in the space of tile (x, y)
                    let p1 = Point::new(
                        e1_tile.x - dx as f64 * EXTENT,
                        e1_tile.y - dy as f64 * EXTENT,
                    );
                    let p2 = Point::new(
                        e2_tile.x - (x as f64 - e2_x) * EXTENT,
                        e2_tile.y - (y as f64 - e2_y) * EXTENT,
                    );
                    if edge_intersects_box(&p1, &p2, &tile_corners) {
                        let (x, y) = (x as u32, y as u32);
                        if added.insert(calculate_key(0, overscaled_z, max_zoom, x, y)) {
                            out.push(OverscaledTileID::new(overscaled_z, 0, max_zoom, x, y));
                        }
                    }
                }
            }
        };

        let points = &frustum.points;
        let near_bl = points[NEAR_BL];
        let near_br = points[NEAR_BR];
        let far_bl = project_to_ground(&near_bl, &points[FAR_BL]);
        let far_br = project_to_ground(&near_br, &points[FAR_BR]);

        find_intersections(&near_bl, &far_bl);
        find_intersections(&near_br, &far_br);

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::TransformOptions;
    use crate::core::geo::LatLng;

    fn transform(width: f64, height: f64, zoom: f64) -> Transform {
        let mut tr = Transform::new(TransformOptions::default()).unwrap();
        tr.resize(width, height);
        tr.set_zoom(zoom);
        tr
    }

    fn id(z: u8, x: u32, y: u32) -> OverscaledTileID {
        OverscaledTileID::new(z, 0, z, x, y)
    }

    #[test]
    fn test_furthest_tile_corner() {
        assert_eq!(furthest_tile_corner(0.0), [1.0, 0.0]);
        assert_eq!(furthest_tile_corner(90.0), [1.0, 1.0]);
        assert_eq!(furthest_tile_corner(180.0), [0.0, 1.0]);
        assert_eq!(furthest_tile_corner(-90.0), [0.0, 0.0]);
    }

    #[test]
    fn test_project_to_ground() {
        let near = Vector3::new(0.0, 0.0, 2.0);
        let far = Vector3::new(4.0, 2.0, -2.0);
        assert_eq!(project_to_ground(&near, &far), Vector3::new(2.0, 1.0, 0.0));
    }

    #[test]
    fn test_split_scale_for_acute_angles() {
        assert_eq!(dist_to_split_scale(1.0, 1.0), 1.0);
        let scale = dist_to_split_scale(1.0, 10.0);
        assert!(scale < 1.0);
        // Flatter views shrink the split distance further
        assert!(dist_to_split_scale(1.0, 20.0) < scale);
    }

    #[test]
    fn test_single_tile_at_zoom_zero() {
        let mut tr = transform(512.0, 512.0, 0.0);
        tr.set_render_world_copies(false);
        let tiles = tr.covering_tiles(&CoveringTilesOptions::new(512.0));
        assert_eq!(tiles, vec![id(0, 0, 0)]);
    }

    #[test]
    fn test_cover_below_min_zoom_is_empty() {
        let tr = transform(512.0, 512.0, 1.0);
        let tiles = tr.covering_tiles(&CoveringTilesOptions::new(512.0).with_min_zoom(3));
        assert!(tiles.is_empty());
    }

    #[test]
    fn test_reparse_overscaled() {
        let tr = transform(512.0, 512.0, 5.0);
        let options = CoveringTilesOptions::new(512.0).with_max_zoom(3);
        let tiles = tr.covering_tiles(&options);
        assert!(!tiles.is_empty());
        assert!(tiles.iter().all(|t| t.canonical.z == 3 && t.overscaled_z == 3));

        let tiles = tr.covering_tiles(&options.with_reparse_overscaled(true));
        assert!(tiles.iter().all(|t| t.canonical.z == 3 && t.overscaled_z == 5));
    }

    #[test]
    fn test_quadrant_visibility_is_reported() {
        let mut tr = transform(512.0, 512.0, 3.0);
        tr.set_center(LatLng::new(0.0, 0.0));
        let tiles = tr.covering_tiles(&CoveringTilesOptions::new(512.0).with_quadrant_visibility(true));
        assert!(tiles.iter().all(|t| t.visible_quadrants.is_some()));
        assert!(tiles.iter().any(|t| t.visible_quadrants != Some(0)));
    }

    #[test]
    fn test_extend_by_direction() {
        let tr = transform(512.0, 512.0, 3.0);
        let cover = [id(3, 4, 4)];

        let left = tr.extend_tile_cover(&cover, 3, Some(&Vector3::new(1.0, 0.0, 0.0)));
        assert_eq!(left, vec![id(3, 3, 4)]);

        let diagonal = tr.extend_tile_cover(&cover, 3, Some(&Vector3::new(-1.0, -1.0, 0.0)));
        assert_eq!(diagonal, vec![id(3, 5, 4), id(3, 4, 5), id(3, 5, 5)]);

        assert!(tr.extend_tile_cover(&cover, 3, Some(&Vector3::new(0.0, 0.0, 1.0))).is_empty());
    }

    #[test]
    fn test_extend_wraps_across_antimeridian() {
        let tr = transform(512.0, 512.0, 2.0);
        let cover = [id(2, 3, 1)];
        let extended = tr.extend_tile_cover(&cover, 2, Some(&Vector3::new(-1.0, 0.0, 0.0)));
        assert_eq!(extended, vec![OverscaledTileID::new(2, 1, 2, 0, 1)]);
    }

    #[test]
    fn test_extend_skips_tiles_already_covered() {
        let tr = transform(512.0, 512.0, 3.0);
        let cover = [id(3, 4, 4), id(3, 3, 4)];
        let extended = tr.extend_tile_cover(&cover, 3, Some(&Vector3::new(1.0, 0.0, 0.0)));
        assert_eq!(extended, vec![id(3, 2, 4)]);
    }

    #[test]
    fn test_extend_by_quadrants_stays_near_camera() {
        let mut tr = transform(512.0, 512.0, 6.0);
        tr.set_center(LatLng::new(0.0, 0.0));
        let mut far = id(6, 60, 32);
        far.visible_quadrants = Some(quadrant::ALL);
        let mut near = id(6, 32, 32);
        near.visible_quadrants = Some(quadrant::TOP_LEFT);

        let extended = tr.extend_tile_cover(&[near, far], 6, None);
        assert_eq!(extended, vec![id(6, 31, 32), id(6, 32, 31), id(6, 31, 31)]);

        // Below the cover zoom nothing is added
        assert!(tr.extend_tile_cover(&[near], 7, None).is_empty());
    }

    #[test]
    fn test_extend_to_near_plane() {
        let mut tr = transform(512.0, 512.0, 10.0);
        tr.set_pitch(60.0);
        let cover = tr.covering_tiles(&CoveringTilesOptions::new(512.0));
        let z = cover.iter().map(|t| t.canonical.z).max().unwrap_or(0);
        let frustum = Frustum::from_inv_projection_matrix(tr.inv_proj_matrix(), tr.world_size(), z as f64, true);
        let extra = tr.extend_tile_cover_to_near_plane(&cover, &frustum, z);
        for tile in &extra {
            assert_eq!(tile.canonical.z, z);
            assert_eq!(tile.wrap, 0);
            assert!(!cover.contains(tile));
        }
        let keys: HashSet<u64> = extra.iter().map(|t| t.key).collect();
        assert_eq!(keys.len(), extra.len());
    }

    #[test]
    fn test_fog_cull_drops_far_tiles() {
        let mut tr = transform(512.0, 512.0, 12.0);
        tr.set_pitch(60.0);
        let options = CoveringTilesOptions::new(512.0);
        let all = tr.covering_tiles(&options);
        // Fog space is measured in viewport heights
        tr.set_fog_cull_dist_sq(Some(4.0));
        let culled = tr.covering_tiles(&options);
        assert!(!culled.is_empty());
        assert!(culled.len() < all.len());
        assert!(culled.iter().all(|t| all.contains(t)));
    }
}
