use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Bit flags for the screen quadrants a tile intersects
pub mod quadrant {
    pub const TOP_LEFT: u8 = 1;
    pub const TOP_RIGHT: u8 = 1 << 1;
    pub const BOTTOM_LEFT: u8 = 1 << 2;
    pub const BOTTOM_RIGHT: u8 = 1 << 3;
    pub const ALL: u8 = TOP_LEFT | TOP_RIGHT | BOTTOM_LEFT | BOTTOM_RIGHT;
}

/// Packs wrap, zoom and position into one integer. x and y use at most 22
/// bits each and the wrap is zigzag-encoded into the bits left over.
pub fn calculate_key(wrap: i32, overscaled_z: u8, z: u8, x: u32, y: u32) -> u64 {
    debug_assert!(overscaled_z >= z);
    let dim: u64 = 1 << z.min(22);
    let mut xy = dim * (y as u64 % dim) + (x as u64 % dim);

    if wrap != 0 && z < 22 {
        let bits_available = 2 * (22 - z as u32);
        let zigzag = if wrap < 0 {
            (-2 * wrap as i64 - 1) as u64
        } else {
            2 * wrap as u64
        };
        xy += dim * dim * (zigzag % (1u64 << bits_available));
    }

    ((xy * 32) + z as u64) * 16 + (overscaled_z - z) as u64
}

/// Position of a tile in the quadtree of one world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalTileID {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl CanonicalTileID {
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        debug_assert!(z <= 25);
        debug_assert!((x as u64) < (1u64 << z) && (y as u64) < (1u64 << z));
        Self { z, x, y }
    }

    /// Checked constructor for coordinates coming from outside the traversal
    pub fn try_new(z: u8, x: u32, y: u32) -> Result<Self> {
        if z > 25 || (x as u64) >= (1u64 << z) || (y as u64) >= (1u64 << z) {
            return Err(Error::InvalidTileId { z, x, y });
        }
        Ok(Self { z, x, y })
    }

    pub fn key(&self) -> u64 {
        calculate_key(0, self.z, self.z, self.x, self.y)
    }

    /// True if `self` lies strictly below `parent` in the quadtree
    pub fn is_child_of(&self, parent: &CanonicalTileID) -> bool {
        if parent.z >= self.z {
            return false;
        }
        let dz = self.z - parent.z;
        parent.x == self.x >> dz && parent.y == self.y >> dz
    }
}

impl fmt::Display for CanonicalTileID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// A canonical tile in a particular world copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnwrappedTileID {
    pub wrap: i32,
    pub canonical: CanonicalTileID,
}

impl UnwrappedTileID {
    pub fn new(wrap: i32, canonical: CanonicalTileID) -> Self {
        Self { wrap, canonical }
    }

    pub fn key(&self) -> u64 {
        calculate_key(
            self.wrap,
            self.canonical.z,
            self.canonical.z,
            self.canonical.x,
            self.canonical.y,
        )
    }

    /// Column index across world copies
    pub fn unwrapped_x(&self) -> i64 {
        self.canonical.x as i64 + self.wrap as i64 * (1i64 << self.canonical.z)
    }
}

/// A tile to render. `overscaled_z` may exceed the canonical zoom when the
/// data of a lower zoom is reused at a finer scale.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OverscaledTileID {
    pub overscaled_z: u8,
    pub wrap: i32,
    pub canonical: CanonicalTileID,
    pub key: u64,
    /// Quadrant bits from [`quadrant`], set when the cover was asked for them
    pub visible_quadrants: Option<u8>,
}

impl OverscaledTileID {
    pub fn new(overscaled_z: u8, wrap: i32, z: u8, x: u32, y: u32) -> Self {
        debug_assert!(overscaled_z >= z);
        let canonical = CanonicalTileID::new(z, x, y);
        let key = if wrap == 0 && overscaled_z == z {
            canonical.key()
        } else {
            calculate_key(wrap, overscaled_z, z, x, y)
        };
        Self {
            overscaled_z,
            wrap,
            canonical,
            key,
            visible_quadrants: None,
        }
    }

    /// Same wrap, and `parent` is a strict quadtree ancestor at a lower
    /// overscaled zoom
    pub fn is_child_of(&self, parent: &OverscaledTileID) -> bool {
        if parent.wrap != self.wrap || parent.overscaled_z >= self.overscaled_z {
            return false;
        }
        if parent.overscaled_z == 0 {
            return true;
        }
        let dz = self.canonical.z.saturating_sub(parent.canonical.z);
        parent.canonical.x == self.canonical.x >> dz && parent.canonical.y == self.canonical.y >> dz
    }

    /// The ancestor or overscaled copy of this tile at `target_z`
    pub fn scaled_to(&self, target_z: u8) -> OverscaledTileID {
        debug_assert!(target_z <= self.overscaled_z);
        let z_diff = self.canonical.z.saturating_sub(target_z);
        if target_z > self.canonical.z {
            OverscaledTileID::new(target_z, self.wrap, self.canonical.z, self.canonical.x, self.canonical.y)
        } else {
            OverscaledTileID::new(
                target_z,
                self.wrap,
                target_z,
                self.canonical.x >> z_diff,
                self.canonical.y >> z_diff,
            )
        }
    }

    /// The four children, or one overscaled copy past `source_max_zoom`
    pub fn children(&self, source_max_zoom: u8) -> Vec<OverscaledTileID> {
        if self.overscaled_z >= source_max_zoom {
            return vec![OverscaledTileID::new(
                self.overscaled_z + 1,
                self.wrap,
                self.canonical.z,
                self.canonical.x,
                self.canonical.y,
            )];
        }
        let z = self.canonical.z + 1;
        let x = self.canonical.x * 2;
        let y = self.canonical.y * 2;
        (0..4)
            .map(|i| OverscaledTileID::new(z, self.wrap, z, x + (i % 2), y + (i >> 1)))
            .collect()
    }

    pub fn wrapped(&self) -> OverscaledTileID {
        OverscaledTileID::new(self.overscaled_z, 0, self.canonical.z, self.canonical.x, self.canonical.y)
    }

    pub fn unwrap_to(&self, wrap: i32) -> OverscaledTileID {
        OverscaledTileID::new(self.overscaled_z, wrap, self.canonical.z, self.canonical.x, self.canonical.y)
    }

    pub fn overscale_factor(&self) -> f64 {
        2f64.powi(self.overscaled_z as i32 - self.canonical.z as i32)
    }

    pub fn to_unwrapped(&self) -> UnwrappedTileID {
        UnwrappedTileID::new(self.wrap, self.canonical)
    }
}

impl PartialEq for OverscaledTileID {
    fn eq(&self, other: &Self) -> bool {
        self.overscaled_z == other.overscaled_z
            && self.wrap == other.wrap
            && self.canonical == other.canonical
    }
}

impl Eq for OverscaledTileID {}

impl Hash for OverscaledTileID {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for OverscaledTileID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.overscaled_z, self.canonical.x, self.canonical.y
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::HashSet;

    #[test]
    fn test_keys_are_unique_across_wraps_and_zooms() {
        let ids = [
            OverscaledTileID::new(2, 0, 2, 1, 1),
            OverscaledTileID::new(2, 1, 2, 1, 1),
            OverscaledTileID::new(2, -1, 2, 1, 1),
            OverscaledTileID::new(3, 0, 2, 1, 1),
            OverscaledTileID::new(3, 0, 3, 2, 2),
            OverscaledTileID::new(2, 0, 2, 2, 1),
        ];
        let keys: HashSet<u64> = ids.iter().map(|id| id.key).collect();
        assert_eq!(keys.len(), ids.len());
    }

    #[test]
    fn test_equal_ids_share_key() {
        let a = OverscaledTileID::new(5, -2, 5, 10, 12);
        let b = OverscaledTileID::new(5, -2, 5, 10, 12);
        assert_eq!(a, b);
        assert_eq!(a.key, b.key);
        assert_eq!(a.key, calculate_key(-2, 5, 5, 10, 12));
    }

    #[test]
    fn test_primary_world_key_matches_canonical() {
        let id = OverscaledTileID::new(4, 0, 4, 3, 7);
        assert_eq!(id.key, id.canonical.key());
        assert_eq!(id.to_unwrapped().key(), id.key);
    }

    #[test]
    fn test_is_child_of() {
        let parent = OverscaledTileID::new(1, 0, 1, 1, 0);
        let child = OverscaledTileID::new(3, 0, 3, 5, 2);
        let other_wrap = OverscaledTileID::new(3, 1, 3, 5, 2);
        let not_child = OverscaledTileID::new(3, 0, 3, 1, 2);

        assert!(child.is_child_of(&parent));
        assert!(!parent.is_child_of(&child));
        assert!(!other_wrap.is_child_of(&parent));
        assert!(!not_child.is_child_of(&parent));
        assert!(!parent.is_child_of(&parent));
    }

    #[test]
    fn test_root_is_ancestor_of_same_wrap() {
        let root = OverscaledTileID::new(0, 0, 0, 0, 0);
        assert!(OverscaledTileID::new(6, 0, 6, 40, 17).is_child_of(&root));
        assert!(!root.is_child_of(&root));
    }

    #[test]
    fn test_children_and_scaled_to() {
        let id = OverscaledTileID::new(2, 0, 2, 1, 3);
        let children = id.children(10);
        assert_eq!(children.len(), 4);
        for child in &children {
            assert!(child.is_child_of(&id));
            assert_eq!(child.scaled_to(2), id);
        }
        let overscaled = id.children(2);
        assert_eq!(overscaled.len(), 1);
        assert_eq!(overscaled[0].canonical, id.canonical);
        assert_eq!(overscaled[0].overscale_factor(), 2.0);
    }

    #[test]
    fn test_try_new_rejects_out_of_grid() {
        assert!(CanonicalTileID::try_new(2, 3, 3).is_ok());
        assert!(CanonicalTileID::try_new(2, 4, 0).is_err());
        assert!(CanonicalTileID::try_new(26, 0, 0).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(OverscaledTileID::new(7, 0, 5, 3, 4).to_string(), "7/3/4");
    }
}
