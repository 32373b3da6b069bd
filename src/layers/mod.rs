pub mod base;
pub mod mutable;
pub mod registry;

pub use base::LayerProperties;
pub use mutable::{MutableTileLayer, TileEvent, TileState};
pub use registry::{LayerRegistry, SwapObserver};
