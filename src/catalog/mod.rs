//! Catalog of available maps
//!
//! The catalog server lists survey files at `GET <server>` as
//! `{"files": [{"name": ..}]}` and describes each one at
//! `GET <server>/<name>`. Descriptors are built from that metadata with the
//! survey defaults filled in.

pub mod descriptor;

pub use descriptor::{descriptor_from_metadata, MapDescriptor, MapMetadata};

use crate::core::config::HttpConfig;
use crate::MapError;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
struct FileInfo {
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct FileList {
    files: Vec<FileInfo>,
}

/// Anything that can enumerate maps and report their metadata.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Base URL tile templates are built from.
    fn server(&self) -> &str;

    async fn list_maps(&self) -> crate::Result<Vec<String>>;

    async fn metadata(&self, name: &str) -> crate::Result<MapMetadata>;
}

/// Fetches a fresh map list and one descriptor per map, in catalog order.
pub async fn load_descriptors(source: &dyn CatalogSource) -> crate::Result<Vec<MapDescriptor>> {
    let names = source.list_maps().await?;
    let mut descriptors = Vec::with_capacity(names.len());
    for name in names {
        let metadata = source.metadata(&name).await?;
        if !metadata.initialized {
            log::warn!("map {} is not initialized on the server yet", name);
        }
        descriptors.push(descriptor_from_metadata(source.server(), &name, &metadata));
    }
    log::info!("catalog lists {} maps", descriptors.len());
    Ok(descriptors)
}

/// reqwest-backed catalog client.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    server: String,
    client: reqwest::Client,
}

impl CatalogClient {
    pub fn new(server: impl Into<String>, config: &HttpConfig) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .build()
            .map_err(MapError::from)?;
        Ok(Self {
            server: server.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub async fn descriptors(&self) -> crate::Result<Vec<MapDescriptor>> {
        load_descriptors(self).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> crate::Result<T> {
        log::debug!("GET {}", url);
        let response = self.client.get(url).send().await.map_err(MapError::from)?;
        let status = response.status();
        if !status.is_success() {
            return Err(MapError::Http(status.as_u16()).into());
        }
        Ok(response.json::<T>().await.map_err(MapError::from)?)
    }
}

#[async_trait]
impl CatalogSource for CatalogClient {
    fn server(&self) -> &str {
        &self.server
    }

    async fn list_maps(&self) -> crate::Result<Vec<String>> {
        let list: FileList = self.get_json(&self.server).await?;
        Ok(list.files.into_iter().map(|file| file.name).collect())
    }

    async fn metadata(&self, name: &str) -> crate::Result<MapMetadata> {
        self.get_json(&format!("{}/{}", self.server, name)).await
    }
}
