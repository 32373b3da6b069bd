//! Tile layer whose render parameters can change while it is on screen.
//!
//! The layer tracks the set of tiles the viewport currently needs. Tiles
//! entering the set are requested through the layer's transport, tiles leaving
//! it are cancelled, and a parameter change re-requests every required tile.

use super::base::LayerProperties;
use crate::catalog::MapDescriptor;
use crate::core::{
    config::TileDeliveryConfig,
    grid::Crs,
    render::RenderParameters,
    tile::{RowOrigin, TileAddress, TileId},
    viewport::Viewport,
};
use crate::tiles::ImageLoader;
use crate::transport::{
    completion_channel, ConnectionState, Connector, Delivery, Dispatch, HttpTileTransport,
    StreamingTileTransport, TileError, TileImage, TileOutcome, TileReceiver, TileRequest,
    TileTransport, TransportEvent,
};
use fxhash::FxHashMap;
use std::sync::Arc;
use std::time::Instant;

/// Where one required tile stands.
#[derive(Debug, Clone, PartialEq)]
pub enum TileState {
    /// Not requested, or the request went nowhere. Picked up by the next redraw.
    Unfulfilled,
    Pending,
    Loaded(TileImage),
    Failed(TileError),
}

/// Completion observed during [`MutableTileLayer::poll`].
#[derive(Debug, Clone, PartialEq)]
pub enum TileEvent {
    Loaded(TileAddress),
    Failed(TileAddress, TileError),
    Cancelled(TileAddress),
}

#[derive(Debug)]
struct TileSlot {
    state: TileState,
    request: Option<(TileId, TileReceiver)>,
}

impl TileSlot {
    fn new() -> Self {
        Self {
            state: TileState::Unfulfilled,
            request: None,
        }
    }
}

pub struct MutableTileLayer {
    properties: LayerProperties,
    descriptor: MapDescriptor,
    crs: Crs,
    tile_size: u32,
    transport: Box<dyn TileTransport>,
    parameters: Arc<RenderParameters>,
    /// Required tiles in top-origin rows, in the order they were required.
    required: Vec<TileAddress>,
    tiles: FxHashMap<TileAddress, TileSlot>,
    /// Bumped on every redraw so re-requests get fresh ids.
    epoch: u64,
}

impl MutableTileLayer {
    pub fn new(descriptor: MapDescriptor, transport: Box<dyn TileTransport>, config: &TileDeliveryConfig) -> Self {
        let properties = LayerProperties::new(descriptor.name.clone(), descriptor.name.clone());
        let parameters = Arc::new(descriptor.recommended_render_parameters.clone());
        let mut layer = Self {
            properties,
            descriptor,
            crs: config.layer.crs,
            tile_size: config.layer.tile_size,
            transport,
            parameters,
            required: Vec::new(),
            tiles: FxHashMap::default(),
            epoch: 0,
        };
        layer.transport.set_parameters(&layer.parameters);
        layer
    }

    /// Layer over the descriptor's URL template.
    pub fn http(
        descriptor: MapDescriptor,
        loader: Arc<dyn ImageLoader>,
        config: &TileDeliveryConfig,
    ) -> crate::Result<Self> {
        let transport =
            HttpTileTransport::new(&descriptor.endpoint, config.layer.crs, descriptor.tms, loader)?;
        Ok(Self::new(descriptor, Box::new(transport), config))
    }

    /// Layer streaming from the descriptor's endpoint.
    pub fn streaming(
        descriptor: MapDescriptor,
        connector: Box<dyn Connector>,
        config: &TileDeliveryConfig,
    ) -> Self {
        let mut streaming = config.streaming.clone();
        streaming.tms = descriptor.tms;
        let transport = StreamingTileTransport::new(descriptor.endpoint.clone(), connector, streaming);
        Self::new(descriptor, Box::new(transport), config)
    }

    pub fn name(&self) -> &str {
        &self.properties.name
    }

    pub fn properties(&self) -> &LayerProperties {
        &self.properties
    }

    pub fn descriptor(&self) -> &MapDescriptor {
        &self.descriptor
    }

    pub fn render_parameters(&self) -> &RenderParameters {
        &self.parameters
    }

    pub fn transport_state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn is_attached(&self) -> bool {
        self.properties.visible
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn required_tiles(&self) -> &[TileAddress] {
        &self.required
    }

    pub fn tile_state(&self, address: &TileAddress) -> Option<&TileState> {
        let address = address.to_origin(RowOrigin::Top, &self.crs);
        self.tiles.get(&address).map(|slot| &slot.state)
    }

    pub fn loaded_tiles(&self) -> Vec<(TileAddress, &TileImage)> {
        self.required
            .iter()
            .filter_map(|address| match self.tiles.get(address).map(|slot| &slot.state) {
                Some(TileState::Loaded(image)) => Some((*address, image)),
                _ => None,
            })
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.tiles
            .values()
            .filter(|slot| slot.state == TileState::Pending)
            .count()
    }

    pub fn is_loading(&self) -> bool {
        self.pending_count() > 0
    }

    /// Opens the transport and requests every required tile once it is usable.
    ///
    /// On error the layer stays detached.
    pub fn attach(&mut self) -> crate::Result<()> {
        self.transport.set_parameters(&self.parameters);
        if let Err(e) = self.transport.open() {
            log::error!("layer {} failed to open its transport: {}", self.name(), e);
            return Err(e);
        }
        self.properties.visible = true;
        log::info!("layer {} attached over {}", self.name(), self.transport.kind());
        if self.transport.state() == ConnectionState::Open {
            self.redraw();
        }
        Ok(())
    }

    /// Closes the transport. Required tiles are kept and requested again on the next attach.
    pub fn detach(&mut self) {
        self.properties.visible = false;
        self.transport.close();
        for slot in self.tiles.values_mut() {
            slot.request = None;
            slot.state = TileState::Unfulfilled;
        }
        log::info!("layer {} detached", self.name());
    }

    /// Replaces the required set. Entering tiles are requested, leaving tiles cancelled.
    pub fn set_required_tiles<I>(&mut self, addresses: I)
    where
        I: IntoIterator<Item = TileAddress>,
    {
        let mut next = Vec::new();
        for address in addresses {
            let address = address.to_origin(RowOrigin::Top, &self.crs);
            if address.is_valid(&self.crs) && !next.contains(&address) {
                next.push(address);
            }
        }

        let leaving: Vec<TileAddress> = self
            .required
            .iter()
            .filter(|address| !next.contains(address))
            .copied()
            .collect();
        for address in leaving {
            if let Some(slot) = self.tiles.remove(&address) {
                if let Some((id, _)) = slot.request {
                    self.transport.cancel(&id);
                }
            }
        }

        let entering: Vec<TileAddress> = next
            .iter()
            .filter(|address| !self.tiles.contains_key(address))
            .copied()
            .collect();
        self.required = next;
        for address in entering {
            self.tiles.insert(address, TileSlot::new());
            self.issue(address);
        }
    }

    /// Recomputes the required set from `viewport`.
    pub fn update_viewport(&mut self, viewport: &Viewport) {
        if viewport.zoom > self.descriptor.max_zoom as f64 || viewport.zoom < 0.0 {
            log::debug!("zoom {} outside layer {} range", viewport.zoom, self.name());
            self.set_required_tiles(Vec::new());
            return;
        }
        let bounds = self.descriptor.bounds();
        let tiles = viewport.required_tiles(
            &self.crs,
            self.tile_size,
            &self.descriptor.native_zoom(),
            Some(&bounds),
        );
        self.set_required_tiles(tiles);
    }

    /// Stores `parameters` and re-requests every required tile with them.
    pub fn set_render_parameters(&mut self, parameters: RenderParameters) {
        log::debug!(
            "layer {} render parameters {} -> {}",
            self.name(),
            self.parameters.query_string(),
            parameters.query_string()
        );
        self.parameters = Arc::new(parameters);
        self.transport.set_parameters(&self.parameters);
        self.redraw();
    }

    /// Re-requests every required tile under a fresh epoch.
    pub fn redraw(&mut self) {
        self.epoch += 1;
        let required = self.required.clone();
        for address in required {
            self.issue(address);
        }
    }

    fn issue(&mut self, address: TileAddress) {
        let Some(slot) = self.tiles.get_mut(&address) else {
            return;
        };
        if let Some((stale, _)) = slot.request.take() {
            self.transport.cancel(&stale);
        }

        let id = TileId::for_address(&address, self.epoch);
        let request = TileRequest {
            id: id.clone(),
            address: address.to_origin(self.transport.row_origin(), &self.crs),
            map: self.descriptor.name.clone(),
            band: self.descriptor.band,
            render: Arc::clone(&self.parameters),
        };
        let (completion, receiver) = completion_channel();

        match self.transport.request_tile(request, completion) {
            Dispatch::Sent => {
                slot.request = Some((id, receiver));
                slot.state = TileState::Pending;
            }
            Dispatch::Unavailable => {
                slot.state = TileState::Unfulfilled;
            }
        }
    }

    /// Drives the transport and folds finished requests into tile state.
    pub fn poll(&mut self, now: Instant) -> Vec<TileEvent> {
        for event in self.transport.poll(now) {
            match event {
                TransportEvent::Ready => self.redraw(),
                TransportEvent::Lost { reason } => {
                    log::warn!(
                        "layer {} lost its connection: {}",
                        self.name(),
                        reason.as_deref().unwrap_or("unknown reason")
                    );
                }
            }
        }

        let mut events = Vec::new();
        for address in &self.required {
            let Some(slot) = self.tiles.get_mut(address) else {
                continue;
            };
            let Some((_, receiver)) = slot.request.as_mut() else {
                continue;
            };
            let event = match receiver.try_take() {
                Delivery::Pending => continue,
                Delivery::Ready(TileOutcome::Loaded(image)) => {
                    slot.state = TileState::Loaded(image);
                    TileEvent::Loaded(*address)
                }
                Delivery::Ready(TileOutcome::Failed(error)) => {
                    slot.state = TileState::Failed(error.clone());
                    TileEvent::Failed(*address, error)
                }
                Delivery::Ready(TileOutcome::Cancelled) | Delivery::Abandoned => {
                    slot.state = TileState::Unfulfilled;
                    TileEvent::Cancelled(*address)
                }
            };
            slot.request = None;
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{TileCompletion, TransportKind};
    use std::sync::Mutex;

    /// Transport double that records requests and keeps completions for the test to finish.
    #[derive(Clone, Default)]
    struct Recorder {
        sent: Arc<Mutex<Vec<TileRequest>>>,
        completions: Arc<Mutex<FxHashMap<TileId, TileCompletion>>>,
        cancelled: Arc<Mutex<Vec<TileId>>>,
    }

    struct FakeTransport {
        recorder: Recorder,
        state: ConnectionState,
        origin: RowOrigin,
        events: Vec<TransportEvent>,
    }

    impl TileTransport for FakeTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::Streaming
        }

        fn row_origin(&self) -> RowOrigin {
            self.origin
        }

        fn state(&self) -> ConnectionState {
            self.state
        }

        fn open(&mut self) -> crate::Result<()> {
            self.state = ConnectionState::Open;
            Ok(())
        }

        fn close(&mut self) {
            self.state = ConnectionState::Closed;
            for (_, completion) in self.recorder.completions.lock().unwrap().drain() {
                completion.complete(TileOutcome::Cancelled);
            }
        }

        fn request_tile(&mut self, request: TileRequest, completion: TileCompletion) -> Dispatch {
            if self.state != ConnectionState::Open {
                return Dispatch::Unavailable;
            }
            self.recorder
                .completions
                .lock()
                .unwrap()
                .insert(request.id.clone(), completion);
            self.recorder.sent.lock().unwrap().push(request);
            Dispatch::Sent
        }

        fn cancel(&mut self, id: &TileId) {
            self.recorder.cancelled.lock().unwrap().push(id.clone());
            if let Some(completion) = self.recorder.completions.lock().unwrap().remove(id) {
                completion.complete(TileOutcome::Cancelled);
            }
        }

        fn set_parameters(&mut self, _parameters: &RenderParameters) {}

        fn poll(&mut self, _now: Instant) -> Vec<TransportEvent> {
            std::mem::take(&mut self.events)
        }
    }

    impl Recorder {
        fn take_sent(&self) -> Vec<TileRequest> {
            std::mem::take(&mut *self.sent.lock().unwrap())
        }

        fn finish(&self, id: &TileId, outcome: TileOutcome) -> bool {
            match self.completions.lock().unwrap().remove(id) {
                Some(completion) => {
                    completion.complete(outcome);
                    true
                }
                None => false,
            }
        }
    }

    fn layer(origin: RowOrigin) -> (MutableTileLayer, Recorder) {
        let recorder = Recorder::default();
        let transport = FakeTransport {
            recorder: recorder.clone(),
            state: ConnectionState::Disconnected,
            origin,
            events: Vec::new(),
        };
        let descriptor = MapDescriptor::new("m31", "ws://sky.test");
        let layer = MutableTileLayer::new(descriptor, Box::new(transport), &TileDeliveryConfig::default());
        (layer, recorder)
    }

    fn image() -> TileOutcome {
        TileOutcome::Loaded(TileImage::new(None, vec![1]))
    }

    #[test]
    fn test_entering_and_leaving_tiles() {
        let (mut layer, recorder) = layer(RowOrigin::Top);
        layer.attach().unwrap();

        layer.set_required_tiles([TileAddress::new(2, 1, 1), TileAddress::new(2, 2, 1)]);
        assert_eq!(recorder.take_sent().len(), 2);
        assert_eq!(layer.pending_count(), 2);

        // (2,1,1) leaves, (2,3,1) enters, (2,2,1) is untouched.
        layer.set_required_tiles([TileAddress::new(2, 2, 1), TileAddress::new(2, 3, 1)]);
        let sent = recorder.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].address, TileAddress::new(2, 3, 1));
        assert_eq!(
            recorder.cancelled.lock().unwrap().as_slice(),
            [TileId::for_address(&TileAddress::new(2, 1, 1), 1)]
        );
        assert!(layer.tile_state(&TileAddress::new(2, 1, 1)).is_none());
    }

    #[test]
    fn test_rows_are_inverted_once_for_bottom_origin_transports() {
        let (mut layer, recorder) = layer(RowOrigin::Bottom);
        layer.attach().unwrap();

        // Zoom 3: eight rows.
        layer.set_required_tiles([TileAddress::new(3, 4, 1)]);
        let sent = recorder.take_sent();
        assert_eq!(sent[0].address.row, 6);
        assert_eq!(sent[0].address.origin, RowOrigin::Bottom);

        // A caller already speaking bottom-origin rows is not inverted again.
        layer.set_required_tiles([TileAddress::with_origin(3, 4, 6, RowOrigin::Bottom)]);
        assert!(recorder.take_sent().is_empty());
        assert_eq!(layer.required_tiles(), [TileAddress::new(3, 4, 1)]);
    }

    #[test]
    fn test_parameter_change_redraws_every_required_tile() {
        let (mut layer, recorder) = layer(RowOrigin::Top);
        layer.attach().unwrap();
        layer.set_required_tiles([TileAddress::new(2, 1, 1), TileAddress::new(2, 2, 1)]);
        let first = recorder.take_sent();
        recorder.finish(&first[1].id, image());
        layer.poll(Instant::now());

        let inferno = RenderParameters::new("inferno", -100.0, 100.0);
        layer.set_render_parameters(inferno.clone());

        let sent = recorder.take_sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|request| *request.render == inferno));
        assert!(sent.iter().all(|request| request.id != first[0].id && request.id != first[1].id));

        // The stale request for the still-pending tile no longer reaches anything.
        assert!(!recorder.finish(&first[0].id, image()));
        assert_eq!(layer.pending_count(), 2);
    }

    #[test]
    fn test_parameter_change_skips_tiles_that_left_the_view() {
        let (mut layer, recorder) = layer(RowOrigin::Top);
        layer.attach().unwrap();
        layer.set_required_tiles([TileAddress::new(2, 1, 1), TileAddress::new(2, 2, 1)]);
        recorder.take_sent();

        layer.set_required_tiles([TileAddress::new(2, 2, 1)]);
        assert!(recorder.take_sent().is_empty());

        let inferno = RenderParameters::new("inferno", -100.0, 100.0);
        layer.set_render_parameters(inferno.clone());
        let sent = recorder.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].address, TileAddress::new(2, 2, 1));
        assert_eq!(*sent[0].render, inferno);
    }

    #[test]
    fn test_tms_http_layer_fills_inverted_row_placeholder_once() {
        use crate::runtime::AsyncHandle;

        #[derive(Default)]
        struct UrlLog(Mutex<Vec<String>>);

        impl ImageLoader for UrlLog {
            fn load(&self, url: String, _completion: TileCompletion) -> Option<Box<dyn AsyncHandle>> {
                self.0.lock().unwrap().push(url);
                None
            }
        }

        let loader = Arc::new(UrlLog::default());
        let mut descriptor = MapDescriptor::new("m31", "http://h/{z}/{x}/{-y}.png");
        descriptor.tms = true;
        let mut layer =
            MutableTileLayer::http(descriptor, loader.clone(), &TileDeliveryConfig::default()).unwrap();
        layer.attach().unwrap();

        // Zoom 3 has eight rows: top row 1 is TMS row 6.
        layer.set_required_tiles([TileAddress::new(3, 4, 1)]);
        let urls = loader.0.lock().unwrap().clone();
        assert_eq!(urls.len(), 1);
        assert!(urls[0].starts_with("http://h/3/4/6.png?"), "{}", urls[0]);
    }

    #[test]
    fn test_failures_stay_on_their_tile() {
        let (mut layer, recorder) = layer(RowOrigin::Top);
        layer.attach().unwrap();
        layer.set_required_tiles([TileAddress::new(1, 0, 0), TileAddress::new(1, 1, 0)]);
        let sent = recorder.take_sent();

        recorder.finish(&sent[0].id, TileOutcome::Failed(TileError::Http(500)));
        let events = layer.poll(Instant::now());

        assert_eq!(
            events,
            vec![TileEvent::Failed(TileAddress::new(1, 0, 0), TileError::Http(500))]
        );
        assert_eq!(layer.tile_state(&TileAddress::new(1, 1, 0)), Some(&TileState::Pending));
    }

    #[test]
    fn test_requests_while_closed_leave_tiles_unfulfilled() {
        let (mut layer, recorder) = layer(RowOrigin::Top);
        layer.set_required_tiles([TileAddress::new(1, 0, 0)]);
        assert!(recorder.take_sent().is_empty());
        assert_eq!(layer.tile_state(&TileAddress::new(1, 0, 0)), Some(&TileState::Unfulfilled));

        layer.attach().unwrap();
        assert_eq!(recorder.take_sent().len(), 1);
    }

    #[test]
    fn test_detach_cancels_and_keeps_required_set() {
        let (mut layer, recorder) = layer(RowOrigin::Top);
        layer.attach().unwrap();
        layer.set_required_tiles([TileAddress::new(1, 0, 0)]);
        recorder.take_sent();

        layer.detach();
        assert!(!layer.is_attached());
        assert_eq!(layer.pending_count(), 0);
        assert_eq!(layer.required_tiles().len(), 1);
    }

    #[test]
    fn test_invalid_and_out_of_range_tiles_are_ignored() {
        let (mut layer, recorder) = layer(RowOrigin::Top);
        layer.attach().unwrap();
        layer.set_required_tiles([TileAddress::new(0, 2, 0), TileAddress::new(0, 1, 0)]);
        assert_eq!(recorder.take_sent().len(), 1);

        let too_deep = Viewport::new(Default::default(), 12.0, crate::core::geo::Point::new(256.0, 256.0));
        layer.update_viewport(&too_deep);
        assert!(layer.required_tiles().is_empty());
    }
}
