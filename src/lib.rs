//! # mapcam
//!
//! Camera transform and tile cover for interactive map renderers.
//!
//! A [`Transform`] holds the view (center, zoom, pitch, bearing, field of
//! view, padding and viewport size) and derives the matrices that take
//! geographic coordinates to the screen and back. [`Transform::covering_tiles`]
//! turns the view into the list of quadtree tiles a renderer has to draw,
//! for flat mercator, equirectangular and globe projections, optionally over
//! terrain supplied through the [`Elevation`] trait.

pub mod core;
pub mod prelude;
pub mod projection;
pub mod rendering;
pub mod spatial;
pub mod tiles;
pub use crate::core::constants;

// Re-export public API
pub use crate::core::{
    config::{CameraElevationReference, CoveringTilesOptions, TransformOptions},
    edge_insets::{EdgeInsets, PaddingOptions},
    elevation::{DemTile, Elevation, ElevationRange},
    geo::{LatLng, LatLngBounds, MercatorCoordinate, Point},
    transform::{DistanceTileData, RayIntersection, Transform},
};

pub use projection::{Projection, ProjectionKind, ProjectionSpec};

pub use rendering::camera::{FreeCamera, FreeCameraOptions};

pub use spatial::culling::{Aabb, Frustum, IntersectResult};

pub use tiles::tile_id::{CanonicalTileID, OverscaledTileID, UnwrappedTileID};

/// Installs `env_logger` as the `log` backend, configured through `RUST_LOG`.
/// Safe to call more than once.
#[cfg(feature = "debug")]
pub fn init_logger() {
    let _ = env_logger::Builder::from_default_env().try_init();
}

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Singular matrix: could not invert the {0}")]
    SingularMatrix(&'static str),

    #[error("Invalid projection: {0}")]
    InvalidProjection(String),

    #[error("Invalid tile id {z}/{x}/{y}")]
    InvalidTileId { z: u8, x: u32, y: u32 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
