use super::cache::ImageCache;
use crate::core::config::HttpConfig;
use crate::runtime::AsyncHandle;
use crate::transport::{TileCompletion, TileError, TileImage, TileOutcome};
use once_cell::sync::Lazy;

/// Shared async HTTP client with the default delivery settings. Building the
/// client once avoids TLS and connection pool setup for every tile.
pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    build_client(&HttpConfig::default()).expect("failed to build reqwest async client")
});

fn build_client(config: &HttpConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(config.timeout())
        .tcp_keepalive(std::time::Duration::from_secs(30))
        .pool_idle_timeout(std::time::Duration::from_secs(90))
        .pool_max_idle_per_host(16)
        .build()
}

/// Host image-loading primitive used by the HTTP transport.
///
/// Implementations must finalize `completion` exactly once, or drop it when
/// the fetch could not even be started.
pub trait ImageLoader: Send + Sync {
    /// Starts loading `url`. The returned handle, if any, aborts the fetch.
    fn load(&self, url: String, completion: TileCompletion) -> Option<Box<dyn AsyncHandle>>;
}

/// reqwest-backed loader with a URL-keyed LRU cache in front.
#[derive(Debug, Clone)]
pub struct HttpImageLoader {
    client: reqwest::Client,
    cache: ImageCache,
}

impl HttpImageLoader {
    pub fn new(config: &HttpConfig) -> crate::Result<Self> {
        let client = build_client(config).map_err(crate::MapError::from)?;
        Ok(Self {
            client,
            cache: ImageCache::new(config.cache_size),
        })
    }

    /// Loader on the process-wide client.
    pub fn shared(cache_size: usize) -> Self {
        Self {
            client: HTTP_CLIENT.clone(),
            cache: ImageCache::new(cache_size),
        }
    }

    pub fn cache(&self) -> &ImageCache {
        &self.cache
    }

    async fn fetch(client: &reqwest::Client, url: &str) -> Result<TileImage, TileError> {
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| TileError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TileError::Http(status.as_u16()));
        }

        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TileError::Network(e.to_string()))?;

        Ok(TileImage::new(mime, bytes.to_vec()))
    }
}

impl Default for HttpImageLoader {
    fn default() -> Self {
        Self::shared(HttpConfig::default().cache_size)
    }
}

impl ImageLoader for HttpImageLoader {
    fn load(&self, url: String, completion: TileCompletion) -> Option<Box<dyn AsyncHandle>> {
        if let Some(image) = self.cache.get(&url) {
            log::debug!("tile cache hit {}", url);
            completion.complete(TileOutcome::Loaded(image));
            return None;
        }

        let client = self.client.clone();
        let cache = self.cache.clone();
        crate::runtime::spawn(async move {
            if completion.is_abandoned() {
                return;
            }
            match Self::fetch(&client, &url).await {
                Ok(image) => {
                    log::debug!("downloaded tile {} ({} bytes)", url, image.len());
                    cache.insert(url, image.clone());
                    completion.complete(TileOutcome::Loaded(image));
                }
                Err(e) => {
                    log::warn!("tile {} failed: {}", url, e);
                    completion.complete(TileOutcome::Failed(e));
                }
            }
        })
    }
}
