//! Prelude module for common skytiles types and traits
//!
//! Brings the layer, transport and catalog types into scope with
//! `use skytiles::prelude::*;`

pub use crate::core::{
    config::{DeliveryProfile, HttpConfig, LayerConfig, ReconnectConfig, StreamingConfig, TileDeliveryConfig},
    geo::{LatLng, LatLngBounds, Point},
    grid::Crs,
    render::RenderParameters,
    tile::{RowOrigin, TileAddress, TileId},
    viewport::Viewport,
};

pub use crate::layers::{
    LayerRegistry, MutableTileLayer, SwapObserver, TileEvent, TileState,
};

pub use crate::transport::{
    completion_channel, ConnectionState, Connector, HttpTileTransport, StreamingTileTransport,
    TileError, TileImage, TileOutcome, TileReceiver, TileRequestCorrelator, TileTransport,
};

pub use crate::catalog::{CatalogClient, CatalogSource, MapDescriptor};

pub use crate::tiles::{HttpImageLoader, ImageLoader, UrlTemplate};

pub use crate::runtime::{runtime, spawn, AsyncHandle, AsyncSpawner};

pub use crate::{MapError, Result};

pub use std::{
    sync::Arc,
    time::{Duration, Instant},
};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};

#[cfg(feature = "tokio-runtime")]
pub use futures::Future;
