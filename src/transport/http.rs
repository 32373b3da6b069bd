//! Stateless URL-template transport.

use super::{
    ConnectionState, Dispatch, TileCompletion, TileRequest, TileTransport, TransportEvent,
    TransportKind,
};
use crate::core::{
    grid::Crs,
    render::RenderParameters,
    tile::{RowOrigin, TileAddress, TileId},
};
use crate::runtime::AsyncHandle;
use crate::tiles::{ImageLoader, TileSource, UrlTemplate};
use fxhash::FxHashMap;
use std::sync::Arc;
use std::time::Instant;

/// Builds one deterministic URL per tile and hands it to an [`ImageLoader`].
///
/// Render parameters become a query suffix computed once per parameter set:
/// `?cmap=..&vmin=..&vmax=..&`. Equal parameters give byte-identical URLs,
/// which is what lets the loader's cache deduplicate.
pub struct HttpTileTransport {
    source: Box<dyn TileSource>,
    loader: Arc<dyn ImageLoader>,
    row_origin: RowOrigin,
    separator: char,
    query: String,
    state: ConnectionState,
    in_flight: FxHashMap<TileId, Box<dyn AsyncHandle>>,
}

impl HttpTileTransport {
    /// Parses `template`; `tms` declares that the server numbers rows from the bottom.
    pub fn new(
        template: &str,
        crs: Crs,
        tms: bool,
        loader: Arc<dyn ImageLoader>,
    ) -> crate::Result<Self> {
        let template = UrlTemplate::parse(template)?.with_crs(crs);
        let separator = if template.has_query() { '&' } else { '?' };
        Ok(Self::with_source(Box::new(template), loader, RowOrigin::from_tms(tms)).with_separator(separator))
    }

    /// Uses a custom URL source instead of a parsed template.
    pub fn with_source(
        source: Box<dyn TileSource>,
        loader: Arc<dyn ImageLoader>,
        row_origin: RowOrigin,
    ) -> Self {
        Self {
            source,
            loader,
            row_origin,
            separator: '?',
            query: RenderParameters::default().query_string(),
            state: ConnectionState::Disconnected,
            in_flight: FxHashMap::default(),
        }
    }

    fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    /// URL for `address` (already in this transport's row convention) under `parameters`.
    pub fn url_for(&self, address: &TileAddress, parameters: &RenderParameters) -> String {
        self.compose(address, &parameters.query_string())
    }

    fn compose(&self, address: &TileAddress, query: &str) -> String {
        format!("{}{}{}&", self.source.url(address), self.separator, query)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

impl TileTransport for HttpTileTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    fn row_origin(&self) -> RowOrigin {
        self.row_origin
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn open(&mut self) -> crate::Result<()> {
        self.state = ConnectionState::Open;
        Ok(())
    }

    fn close(&mut self) {
        for (_, handle) in self.in_flight.drain() {
            handle.cancel();
        }
        self.state = ConnectionState::Closed;
    }

    fn request_tile(&mut self, request: TileRequest, completion: TileCompletion) -> Dispatch {
        if self.state != ConnectionState::Open {
            return Dispatch::Unavailable;
        }

        // The request carries the snapshot it was issued with.
        let url = if request.render.query_string() == self.query {
            self.compose(&request.address, &self.query)
        } else {
            self.url_for(&request.address, &request.render)
        };
        log::debug!("requesting tile {} from {}", request.id, url);

        if let Some(handle) = self.loader.load(url, completion) {
            if let Some(previous) = self.in_flight.insert(request.id, handle) {
                previous.cancel();
            }
        }
        Dispatch::Sent
    }

    fn cancel(&mut self, id: &TileId) {
        if let Some(handle) = self.in_flight.remove(id) {
            handle.cancel();
        }
    }

    fn set_parameters(&mut self, parameters: &RenderParameters) {
        self.query = parameters.query_string();
    }

    fn poll(&mut self, _now: Instant) -> Vec<TransportEvent> {
        self.in_flight.retain(|_, handle| !handle.is_finished());
        Vec::new()
    }

    fn pending(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{completion_channel, Delivery, TileImage, TileOutcome};
    use std::sync::Mutex;

    /// Records URLs and answers every load with a one-byte image.
    #[derive(Default)]
    struct RecordingLoader {
        urls: Mutex<Vec<String>>,
    }

    impl ImageLoader for RecordingLoader {
        fn load(&self, url: String, completion: TileCompletion) -> Option<Box<dyn AsyncHandle>> {
            self.urls.lock().unwrap().push(url);
            completion.complete(TileOutcome::Loaded(TileImage::new(None, vec![1])));
            None
        }
    }

    fn request(address: TileAddress, render: RenderParameters) -> TileRequest {
        TileRequest {
            id: TileId::for_address(&address, 0),
            address,
            map: "survey".into(),
            band: 0,
            render: Arc::new(render),
        }
    }

    #[test]
    fn test_url_shape_with_trailing_ampersand() {
        let loader = Arc::new(RecordingLoader::default());
        let transport = HttpTileTransport::new(
            "http://localhost:5000/m31.fits/{z}/tile_{x}_{y}.webp",
            Crs::Epsg4326,
            true,
            loader,
        )
        .unwrap();

        let url = transport.url_for(
            &TileAddress::with_origin(2, 1, 2, RowOrigin::Bottom),
            &RenderParameters::new("viridis", -500.0, 500.0),
        );
        assert_eq!(
            url,
            "http://localhost:5000/m31.fits/2/tile_1_2.webp?cmap=viridis&vmin=-500&vmax=500&"
        );
        assert_eq!(transport.row_origin(), RowOrigin::Bottom);
    }

    #[test]
    fn test_identical_parameters_give_identical_urls() {
        let loader = Arc::new(RecordingLoader::default());
        let transport =
            HttpTileTransport::new("https://h/{z}/{y}/{x}?key=1", Crs::Epsg3857, false, loader).unwrap();
        let address = TileAddress::new(4, 3, 2);
        let a = transport.url_for(&address, &RenderParameters::new("magma", 0.0, 1.5));
        let b = transport.url_for(&address, &RenderParameters::new("magma", 0.0, 1.5));
        assert_eq!(a, b);
        assert_eq!(a, "https://h/4/2/3?key=1&cmap=magma&vmin=0&vmax=1.5&");
    }

    #[test]
    fn test_requests_before_open_are_dropped() {
        let loader = Arc::new(RecordingLoader::default());
        let mut transport =
            HttpTileTransport::new("https://h/{z}/{x}/{y}.png", Crs::Epsg4326, false, loader.clone()).unwrap();

        let (completion, mut receiver) = completion_channel();
        let dispatch = transport.request_tile(
            request(TileAddress::new(1, 0, 0), RenderParameters::default()),
            completion,
        );
        assert_eq!(dispatch, Dispatch::Unavailable);
        assert_eq!(receiver.try_take(), Delivery::Abandoned);
        assert!(loader.urls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_request_uses_its_own_parameter_snapshot() {
        let loader = Arc::new(RecordingLoader::default());
        let mut transport =
            HttpTileTransport::new("https://h/{z}/{x}/{y}.png", Crs::Epsg4326, false, loader.clone()).unwrap();
        transport.open().unwrap();
        transport.set_parameters(&RenderParameters::new("inferno", -100.0, 100.0));

        let (completion, mut receiver) = completion_channel();
        transport.request_tile(
            request(TileAddress::new(1, 0, 0), RenderParameters::new("inferno", -100.0, 100.0)),
            completion,
        );
        assert!(matches!(receiver.try_take(), Delivery::Ready(TileOutcome::Loaded(_))));
        assert_eq!(
            loader.urls.lock().unwrap().as_slice(),
            ["https://h/1/0/0.png?cmap=inferno&vmin=-100&vmax=100&"]
        );
    }
}
