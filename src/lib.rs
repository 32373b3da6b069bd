//! # skytiles
//!
//! Tile delivery for sky-survey map viewers.
//!
//! Turns a viewport's need for raster tiles into fetched or streamed images
//! over two transports: a stateless HTTP URL-template transport and a
//! persistent streaming connection with request/response correlation. Render
//! parameters (color map, intensity window) can change at any time and force
//! a full redraw of the visible tiles.

pub mod catalog;
pub mod core;
pub mod layers;
pub mod prelude;
pub mod runtime;
pub mod tiles;
pub mod traits;
pub mod transport;
pub use crate::core::constants;

// Re-export public API
pub use crate::core::{
    config::{DeliveryProfile, TileDeliveryConfig},
    geo::{LatLng, LatLngBounds, Point},
    grid::Crs,
    render::RenderParameters,
    tile::{RowOrigin, TileAddress, TileId},
    viewport::Viewport,
};

pub use crate::layers::{
    mutable::{MutableTileLayer, TileState},
    registry::LayerRegistry,
};

pub use crate::transport::{
    completion_channel, ConnectionState, HttpTileTransport, StreamingTileTransport, TileError,
    TileImage, TileOutcome, TileRequestCorrelator, TileTransport,
};

pub use crate::catalog::{CatalogClient, CatalogSource, MapDescriptor};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP status {0}")]
    Http(u16),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid tile template: {0}")]
    InvalidTemplate(String),

    #[error("Layer error: {0}")]
    Layer(String),

    #[error("Config error: {0}")]
    Config(String),
}

/// Error type alias for convenience
pub type Error = MapError;

/// Installs `env_logger` honoring `RUST_LOG`. Safe to call more than once.
#[cfg(feature = "debug")]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
