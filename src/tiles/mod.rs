pub mod cover;
pub mod tile_id;

// Re-exports for convenience
pub use tile_id::{CanonicalTileID, OverscaledTileID, UnwrappedTileID};
