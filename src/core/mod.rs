pub mod config;
pub mod constants;
pub mod edge_insets;
pub mod elevation;
pub mod geo;
pub mod transform;
