//! Prelude module for common mapcam types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use mapcam::prelude::*;`

pub use crate::core::{
    config::{CameraElevationReference, CoveringTilesOptions, TransformOptions},
    edge_insets::{EdgeInsets, PaddingOptions},
    elevation::{DemTile, Elevation, ElevationRange},
    geo::{LatLng, LatLngBounds, MercatorCoordinate, Point},
    transform::Transform,
};

pub use crate::projection::{Projection, ProjectionKind, ProjectionSpec};

pub use crate::rendering::camera::{FreeCamera, FreeCameraOptions};

pub use crate::spatial::culling::{Aabb, Frustum, IntersectResult, Ray};

pub use crate::tiles::tile_id::{quadrant, CanonicalTileID, OverscaledTileID, UnwrappedTileID};

pub use crate::{Error, Result};

pub use std::sync::Arc;

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet, FxHasher};
