#[macro_use]
extern crate lazy_static;

pub mod bxdf;
pub mod core;
pub mod loader;
