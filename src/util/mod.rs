pub mod clip;
pub mod geometry;
pub mod vec2;
