//! Persistent-connection transport.
//!
//! One link per transport. Requests are JSON envelopes tagged with a tile id;
//! responses may come back in any order and are matched through the
//! [`TileRequestCorrelator`]. Anything that cannot be matched is dropped.

use super::{
    correlator::TileRequestCorrelator,
    protocol::{self, InboundEnvelope},
    ConnectionState, Dispatch, TileCompletion, TileError, TileOutcome, TileRequest, TileTransport,
    TransportEvent, TransportKind,
};
use crate::core::{
    config::StreamingConfig,
    render::RenderParameters,
    tile::{RowOrigin, TileId},
};
use crate::traits::{should_retry_with_backoff, RetryLogic};
use crate::MapError;
use std::time::Instant;

/// What a link reports back to its transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The connection handshake finished.
    Connected,
    /// One inbound text frame.
    Message(String),
    /// The connection ended, with a reason when one is known.
    Closed(Option<String>),
}

/// Non-blocking handle on one bidirectional text connection.
pub trait ConnectionLink: Send {
    fn send(&mut self, text: String) -> crate::Result<()>;

    /// Next pending event, if any. Never blocks.
    fn try_recv(&mut self) -> Option<LinkEvent>;

    fn close(&mut self);
}

/// Opens links. The link reports [`LinkEvent::Connected`] once usable.
pub trait Connector: Send {
    fn connect(&mut self, endpoint: &str) -> crate::Result<Box<dyn ConnectionLink>>;
}

pub struct StreamingTileTransport {
    endpoint: String,
    connector: Box<dyn Connector>,
    link: Option<Box<dyn ConnectionLink>>,
    state: ConnectionState,
    correlator: TileRequestCorrelator,
    config: StreamingConfig,
    parameters: RenderParameters,
    reconnect_pending: bool,
    retry_count: u32,
    last_retry_time: Option<Instant>,
}

impl StreamingTileTransport {
    pub fn new(endpoint: impl Into<String>, connector: Box<dyn Connector>, config: StreamingConfig) -> Self {
        Self {
            endpoint: endpoint.into(),
            connector,
            link: None,
            state: ConnectionState::Disconnected,
            correlator: TileRequestCorrelator::new(),
            config,
            parameters: RenderParameters::default(),
            reconnect_pending: false,
            retry_count: 0,
            last_retry_time: None,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn correlator(&self) -> &TileRequestCorrelator {
        &self.correlator
    }

    pub fn parameters(&self) -> &RenderParameters {
        &self.parameters
    }

    /// Whether a dropped connection is waiting to be re-established.
    pub fn is_reconnecting(&self) -> bool {
        self.reconnect_pending
    }

    fn connect(&mut self) -> crate::Result<()> {
        self.state = ConnectionState::Connecting;
        match self.connector.connect(&self.endpoint) {
            Ok(link) => {
                log::debug!("connecting to {}", self.endpoint);
                self.link = Some(link);
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(MapError::Connection(format!("{}: {}", self.endpoint, e)).into())
            }
        }
    }

    fn try_reconnect(&mut self, now: Instant) {
        let reconnect = &self.config.reconnect;
        if self.retry_count >= reconnect.max_retries {
            log::error!(
                "giving up on {} after {} reconnect attempts",
                self.endpoint,
                self.retry_count
            );
            self.reconnect_pending = false;
            self.state = ConnectionState::Closed;
            return;
        }
        let (max_retries, retry_delay_ms, exponential_backoff) = (
            reconnect.max_retries,
            reconnect.retry_delay_ms,
            reconnect.exponential_backoff,
        );
        if !self.should_retry(now, max_retries, retry_delay_ms, exponential_backoff) {
            return;
        }

        self.retry_count += 1;
        self.last_retry_time = Some(now);
        log::info!("reconnecting to {} (attempt {})", self.endpoint, self.retry_count);
        match self.connect() {
            Ok(()) => self.reconnect_pending = false,
            Err(e) => log::warn!("reconnect failed: {}", e),
        }
    }

    fn handle_link_event(&mut self, event: LinkEvent, now: Instant, events: &mut Vec<TransportEvent>) {
        match event {
            LinkEvent::Connected => {
                log::info!("connected to {}", self.endpoint);
                self.state = ConnectionState::Open;
                self.retry_count = 0;
                self.last_retry_time = None;
                events.push(TransportEvent::Ready);
            }
            LinkEvent::Message(text) => self.handle_message(&text),
            LinkEvent::Closed(reason) => {
                let was_open = self.state == ConnectionState::Open;
                self.link = None;
                let cancelled = self.correlator.cancel_all();
                log::warn!(
                    "connection to {} closed ({}); {} tiles cancelled",
                    self.endpoint,
                    reason.as_deref().unwrap_or("no reason"),
                    cancelled
                );

                if self.config.reconnect.enabled {
                    self.state = ConnectionState::Disconnected;
                    self.reconnect_pending = true;
                    self.last_retry_time = Some(now);
                } else {
                    self.state = ConnectionState::Closed;
                }
                if was_open {
                    events.push(TransportEvent::Lost { reason });
                }
            }
        }
    }

    fn handle_message(&mut self, text: &str) {
        match protocol::decode_response(text) {
            Ok(InboundEnvelope::Failure { tile_id, error }) => {
                log::debug!("server failed tile {}: {}", tile_id, error);
                self.correlator
                    .resolve(&tile_id, TileOutcome::Failed(TileError::Server(error)));
            }
            Ok(InboundEnvelope::Image { tile_id, image }) => {
                if !self.correlator.contains(&tile_id) {
                    log::debug!("dropping image for unknown tile id {}", tile_id);
                    return;
                }
                let outcome = match protocol::decode_image_payload(&image) {
                    Ok(image) => TileOutcome::Loaded(image),
                    Err(e) => TileOutcome::Failed(TileError::Payload(e)),
                };
                self.correlator.resolve(&tile_id, outcome);
            }
            Err(e) => log::warn!("ignoring inbound message: {}", e),
        }
    }
}

impl RetryLogic for StreamingTileTransport {
    fn should_retry(
        &self,
        now: Instant,
        max_retries: u32,
        retry_delay_ms: u64,
        exponential_backoff: bool,
    ) -> bool {
        should_retry_with_backoff(
            self.retry_count,
            self.last_retry_time,
            now,
            max_retries,
            retry_delay_ms,
            exponential_backoff,
        )
    }

    fn get_retry_count(&self) -> u32 {
        self.retry_count
    }

    fn get_last_retry_time(&self) -> Option<Instant> {
        self.last_retry_time
    }
}

impl TileTransport for StreamingTileTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Streaming
    }

    fn row_origin(&self) -> RowOrigin {
        RowOrigin::from_tms(self.config.tms)
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn open(&mut self) -> crate::Result<()> {
        if matches!(self.state, ConnectionState::Open | ConnectionState::Connecting) {
            return Ok(());
        }
        self.reconnect_pending = false;
        self.retry_count = 0;
        self.last_retry_time = None;
        self.connect()
    }

    fn close(&mut self) {
        self.state = ConnectionState::Closed;
        self.reconnect_pending = false;
        self.correlator.cancel_all();
        if let Some(mut link) = self.link.take() {
            link.close();
        }
    }

    fn request_tile(&mut self, request: TileRequest, completion: TileCompletion) -> Dispatch {
        if self.state != ConnectionState::Open {
            return Dispatch::Unavailable;
        }
        let Some(link) = self.link.as_mut() else {
            return Dispatch::Unavailable;
        };
        debug_assert_eq!(request.address.origin, RowOrigin::from_tms(self.config.tms));

        let text = match protocol::encode_request(&request) {
            Ok(text) => text,
            Err(e) => {
                completion.complete(TileOutcome::Failed(TileError::Send(e.to_string())));
                return Dispatch::Sent;
            }
        };

        self.correlator.register(request.id.clone(), completion);
        if let Err(e) = link.send(text) {
            log::warn!("failed to send tile request {}: {}", request.id, e);
            self.correlator
                .resolve(&request.id, TileOutcome::Failed(TileError::Send(e.to_string())));
        }
        Dispatch::Sent
    }

    fn cancel(&mut self, id: &TileId) {
        self.correlator.cancel(id);
    }

    fn set_parameters(&mut self, parameters: &RenderParameters) {
        self.parameters = parameters.clone();
    }

    fn poll(&mut self, now: Instant) -> Vec<TransportEvent> {
        let mut events = Vec::new();

        if self.reconnect_pending {
            self.try_reconnect(now);
        }

        while let Some(event) = self.link.as_mut().and_then(|link| link.try_recv()) {
            let closed = matches!(event, LinkEvent::Closed(_));
            self.handle_link_event(event, now, &mut events);
            if closed {
                break;
            }
        }

        if let Some(timeout) = self.config.request_timeout() {
            self.correlator.expire(now, timeout);
        }

        events
    }

    fn pending(&self) -> usize {
        self.correlator.len()
    }
}
