pub mod culling;

pub use culling::{Aabb, Frustum, FrustumCorners, IntersectResult, Ray};
