pub mod color;
pub mod coord;
pub mod loader;
pub mod rng;
