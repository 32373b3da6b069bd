//! In-process streaming link.
//!
//! [`MemoryServer`] plays the server side of [`super::StreamingTileTransport`]
//! without sockets: it sees every request envelope, decides when a connection
//! is accepted and can answer, fail or drop connections at will. Useful for
//! tests and for embedding a tile renderer in the same process.

use super::protocol::TileRequestEnvelope;
use super::streaming::{ConnectionLink, Connector, LinkEvent};
use crate::core::tile::TileId;
use crate::MapError;
use base64::Engine as _;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

struct ServerSide {
    events: Sender<LinkEvent>,
    requests: Receiver<String>,
    client_closed: Arc<AtomicBool>,
}

#[derive(Default)]
struct ServerState {
    connections: Vec<ServerSide>,
    auto_accept: bool,
    refuse: bool,
}

/// Server half. Cheap to clone; clones share the same connections.
#[derive(Clone, Default)]
pub struct MemoryServer {
    state: Arc<Mutex<ServerState>>,
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector::new(self)
    }

    /// Accept new connections as soon as they are opened.
    pub fn set_auto_accept(&self, auto_accept: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.auto_accept = auto_accept;
        }
    }

    /// Make further `connect` calls fail.
    pub fn refuse_connections(&self, refuse: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.refuse = refuse;
        }
    }

    /// Completes the handshake of the newest connection.
    pub fn accept(&self) {
        self.push(LinkEvent::Connected);
    }

    /// Number of connections ever opened.
    pub fn connection_count(&self) -> usize {
        self.state.lock().map(|state| state.connections.len()).unwrap_or(0)
    }

    /// Whether the client closed the newest connection.
    pub fn client_closed(&self) -> bool {
        self.state
            .lock()
            .ok()
            .and_then(|state| {
                state
                    .connections
                    .last()
                    .map(|side| side.client_closed.load(Ordering::SeqCst))
            })
            .unwrap_or(false)
    }

    /// Drains every request received so far, over all connections.
    pub fn take_requests(&self) -> Vec<TileRequestEnvelope> {
        let Ok(state) = self.state.lock() else {
            return Vec::new();
        };
        state
            .connections
            .iter()
            .flat_map(|side| side.requests.try_iter().collect::<Vec<_>>())
            .filter_map(|text| match serde_json::from_str(&text) {
                Ok(envelope) => Some(envelope),
                Err(e) => {
                    log::warn!("memory server received a non-request frame: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Sends a raw text frame on the newest connection.
    pub fn reply(&self, text: impl Into<String>) {
        self.push(LinkEvent::Message(text.into()));
    }

    /// Answers `tile_id` with `bytes` as a WebP data URI.
    pub fn reply_image(&self, tile_id: &TileId, bytes: &[u8]) {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        let message = serde_json::json!({
            "tile_id": tile_id,
            "image": format!("data:image/webp;base64,{}", encoded),
        });
        self.reply(message.to_string());
    }

    pub fn reply_error(&self, tile_id: &TileId, error: &str) {
        let message = serde_json::json!({ "tile_id": tile_id, "error": error });
        self.reply(message.to_string());
    }

    /// Drops the newest connection from the server side.
    pub fn drop_connection(&self, reason: Option<&str>) {
        self.push(LinkEvent::Closed(reason.map(str::to_string)));
    }

    fn push(&self, event: LinkEvent) {
        if let Ok(state) = self.state.lock() {
            if let Some(side) = state.connections.last() {
                let _ = side.events.send(event);
            }
        }
    }

    fn open(&self) -> crate::Result<MemoryLink> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| MapError::Connection("memory server poisoned".into()))?;
        if state.refuse {
            return Err(MapError::Connection("connection refused".into()).into());
        }

        let (event_tx, event_rx) = unbounded();
        let (request_tx, request_rx) = unbounded();
        let client_closed = Arc::new(AtomicBool::new(false));
        if state.auto_accept {
            let _ = event_tx.send(LinkEvent::Connected);
        }
        state.connections.push(ServerSide {
            events: event_tx,
            requests: request_rx,
            client_closed: Arc::clone(&client_closed),
        });

        Ok(MemoryLink {
            events: event_rx,
            requests: request_tx,
            closed: client_closed,
        })
    }
}

/// Client half handed to the transport.
pub struct MemoryConnector {
    server: MemoryServer,
}

impl MemoryConnector {
    pub fn new(server: &MemoryServer) -> Self {
        Self {
            server: server.clone(),
        }
    }
}

impl Connector for MemoryConnector {
    fn connect(&mut self, endpoint: &str) -> crate::Result<Box<dyn ConnectionLink>> {
        log::debug!("opening in-memory link for {}", endpoint);
        Ok(Box::new(self.server.open()?))
    }
}

struct MemoryLink {
    events: Receiver<LinkEvent>,
    requests: Sender<String>,
    closed: Arc<AtomicBool>,
}

impl ConnectionLink for MemoryLink {
    fn send(&mut self, text: String) -> crate::Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MapError::Connection("link closed".into()).into());
        }
        self.requests
            .send(text)
            .map_err(|e| MapError::Connection(e.to_string()))?;
        Ok(())
    }

    fn try_recv(&mut self) -> Option<LinkEvent> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        self.events.try_recv().ok()
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
