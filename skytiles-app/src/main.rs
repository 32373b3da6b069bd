use anyhow::{anyhow, Context};
use skytiles::{
    catalog::{CatalogClient, CatalogSource},
    core::config::TileDeliveryConfig,
    layers::{LayerRegistry, MutableTileLayer, TileEvent},
    tiles::HttpImageLoader,
    transport::websocket::WebSocketConnector,
    LatLng, Point, Viewport,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Headless driver: lists the catalog, shows the first map and logs every
/// tile as it arrives.
///
/// Usage: `skytiles-app <catalog-url> [stream-endpoint]`. A JSON config is read
/// from `SKYTILES_CONFIG` when set.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    skytiles::init_logging();

    let mut args = std::env::args().skip(1);
    let server = args
        .next()
        .unwrap_or_else(|| "http://localhost:5000".to_string());
    let stream_endpoint = args.next();

    let config = match std::env::var("SKYTILES_CONFIG") {
        Ok(path) => {
            let json =
                std::fs::read_to_string(&path).with_context(|| format!("reading {}", path))?;
            TileDeliveryConfig::from_json(&json).map_err(|e| anyhow!(e))?
        }
        Err(_) => TileDeliveryConfig::default(),
    };

    let catalog = CatalogClient::new(server.clone(), &config.http).map_err(|e| anyhow!(e))?;
    let mut descriptors = catalog.descriptors().await.map_err(|e| anyhow!(e))?;
    log::info!("{} lists {} maps", catalog.server(), descriptors.len());

    let mut registry = match &stream_endpoint {
        Some(endpoint) => {
            for descriptor in &mut descriptors {
                descriptor.endpoint = endpoint.clone();
            }
            LayerRegistry::from_descriptors(descriptors, |descriptor| {
                Ok(MutableTileLayer::streaming(
                    descriptor,
                    Box::new(WebSocketConnector::new()),
                    &config,
                ))
            })
        }
        None => {
            let loader = Arc::new(HttpImageLoader::new(&config.http).map_err(|e| anyhow!(e))?);
            LayerRegistry::from_descriptors(descriptors, |descriptor| {
                MutableTileLayer::http(descriptor, loader.clone(), &config)
            })
        }
    }
    .map_err(|e| anyhow!(e))?;

    registry.update_viewport(Viewport::new(
        LatLng::new(-20.0, 0.0),
        2.0,
        Point::new(1200.0, 800.0),
    ));
    registry.add_to_map(None).map_err(|e| anyhow!(e))?;

    let deadline = Instant::now() + Duration::from_secs(30);
    let mut ticker = tokio::time::interval(Duration::from_millis(50));
    let (mut loaded, mut failed) = (0usize, 0usize);
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut interrupted => {
                log::info!("interrupted");
                break;
            }
        }

        for event in registry.poll(Instant::now()) {
            match event {
                TileEvent::Loaded(address) => {
                    loaded += 1;
                    log::info!("tile {} loaded", address);
                }
                TileEvent::Failed(address, error) => {
                    failed += 1;
                    log::warn!("tile {} failed: {}", address, error);
                }
                TileEvent::Cancelled(address) => log::debug!("tile {} cancelled", address),
            }
        }

        let Some(layer) = registry.current() else {
            break;
        };
        let settled =
            !layer.is_loading() && !layer.required_tiles().is_empty() && loaded + failed > 0;
        if settled || Instant::now() >= deadline {
            break;
        }
    }

    log::info!(
        "{}: {} tiles loaded, {} failed",
        registry.current_name().unwrap_or("<none>"),
        loaded,
        failed
    );
    Ok(())
}
