//! Tile transports
//!
//! A transport turns a [`TileRequest`] into a [`TileOutcome`] delivered through a
//! single-use [`TileCompletion`]. Two variants exist:
//! - [`HttpTileTransport`]: stateless, URL template plus query string, fetch
//!   delegated to an [`crate::tiles::ImageLoader`]
//! - [`StreamingTileTransport`]: one persistent connection speaking a JSON
//!   request/response protocol, correlated by tile id

pub mod correlator;
pub mod http;
pub mod memory;
pub mod protocol;
pub mod streaming;
#[cfg(feature = "websocket")]
pub mod websocket;

pub use correlator::TileRequestCorrelator;
pub use http::HttpTileTransport;
pub use streaming::{ConnectionLink, Connector, LinkEvent, StreamingTileTransport};

use crate::core::{
    render::RenderParameters,
    tile::{RowOrigin, TileAddress, TileId},
};
use futures::channel::oneshot;
use std::{fmt, sync::Arc, time::Instant};

/// Undecoded tile image payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TileImage {
    pub mime: Option<String>,
    pub bytes: Arc<Vec<u8>>,
}

impl TileImage {
    pub fn new(mime: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime,
            bytes: Arc::new(bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Why a single tile failed. Never affects other tiles.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TileError {
    #[error("server reported: {0}")]
    Server(String),

    #[error("HTTP status {0}")]
    Http(u16),

    #[error("network error: {0}")]
    Network(String),

    #[error("undecodable image payload: {0}")]
    Payload(String),

    #[error("no response within {0} ms")]
    Timeout(u64),

    #[error("failed to send request: {0}")]
    Send(String),
}

/// Final state of one tile request.
#[derive(Debug, Clone, PartialEq)]
pub enum TileOutcome {
    Loaded(TileImage),
    Failed(TileError),
    /// The request will never complete (tile left the view, layer detached,
    /// connection lost). Distinct from a failure reported by the server.
    Cancelled,
}

impl TileOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, TileOutcome::Loaded(_))
    }
}

/// Single-use handle that finalizes a tile.
#[derive(Debug)]
pub struct TileCompletion {
    tx: oneshot::Sender<TileOutcome>,
}

impl TileCompletion {
    /// Delivers the outcome. A receiver that has gone away is not an error.
    pub fn complete(self, outcome: TileOutcome) {
        let _ = self.tx.send(outcome);
    }

    /// True when nobody is waiting for this tile anymore.
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_canceled()
    }
}

/// What a [`TileReceiver`] currently holds.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Pending,
    Ready(TileOutcome),
    /// The completion was dropped without an outcome: an overwritten
    /// registration or a request that was never sent.
    Abandoned,
}

/// Receiving end of a [`TileCompletion`].
#[derive(Debug)]
pub struct TileReceiver {
    rx: oneshot::Receiver<TileOutcome>,
}

impl TileReceiver {
    /// Non-blocking check, meant for a cooperative update loop.
    pub fn try_take(&mut self) -> Delivery {
        match self.rx.try_recv() {
            Ok(Some(outcome)) => Delivery::Ready(outcome),
            Ok(None) => Delivery::Pending,
            Err(oneshot::Canceled) => Delivery::Abandoned,
        }
    }

    /// Waits for the outcome; `None` when the completion was abandoned.
    pub async fn wait(self) -> Option<TileOutcome> {
        self.rx.await.ok()
    }
}

/// Creates a linked completion/receiver pair.
pub fn completion_channel() -> (TileCompletion, TileReceiver) {
    let (tx, rx) = oneshot::channel();
    (TileCompletion { tx }, TileReceiver { rx })
}

/// One tile request as handed to a transport.
///
/// `address.row` is already in the transport's row convention.
#[derive(Debug, Clone, PartialEq)]
pub struct TileRequest {
    pub id: TileId,
    pub address: TileAddress,
    pub map: String,
    pub band: u32,
    pub render: Arc<RenderParameters>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Http,
    Streaming,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Http => write!(f, "http"),
            TransportKind::Streaming => write!(f, "streaming"),
        }
    }
}

/// Connection lifecycle. The HTTP transport only ever reports
/// `Disconnected`, `Open` or `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    Closed,
}

/// Result of handing a request to a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The completion now belongs to the transport and will be finalized.
    Sent,
    /// The transport is not open; the request was dropped without a trace.
    Unavailable,
}

/// Something the owning layer must react to, reported by [`TileTransport::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The transport just became `Open`; every visible tile must be re-requested.
    Ready,
    /// The connection went away; all pending tiles were cancelled.
    Lost { reason: Option<String> },
}

/// Capability shared by both transports; the layer picks one explicitly.
pub trait TileTransport: Send {
    fn kind(&self) -> TransportKind;

    /// Row convention the transport expects in [`TileRequest::address`].
    fn row_origin(&self) -> RowOrigin;

    fn state(&self) -> ConnectionState;

    fn open(&mut self) -> crate::Result<()>;

    fn close(&mut self);

    fn request_tile(&mut self, request: TileRequest, completion: TileCompletion) -> Dispatch;

    /// Drops interest in one request; a later response for it is discarded.
    fn cancel(&mut self, id: &TileId);

    /// Parameters used from now on. Tiles already delivered are not altered.
    fn set_parameters(&mut self, parameters: &RenderParameters);

    /// Drives inbound traffic, timeouts and reconnects.
    fn poll(&mut self, now: Instant) -> Vec<TransportEvent>;

    /// Number of requests awaiting a response.
    fn pending(&self) -> usize {
        0
    }
}
