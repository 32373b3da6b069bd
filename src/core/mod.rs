//! Value types, coordinate grids, viewport math and configuration.

pub mod config;
pub mod constants;
pub mod geo;
pub mod grid;
pub mod render;
pub mod tile;
pub mod viewport;
