//! Configuration for tile delivery
//!
//! Settings are grouped per concern (HTTP fetching, the streaming connection,
//! layer geometry) and resolved from a profile, so callers can pick a preset
//! or supply a fully custom configuration loaded from JSON.

use super::grid::Crs;
use crate::{MapError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum DeliveryProfile {
    #[default]
    Balanced,
    LowLatency,
    Conservative,
    Custom(TileDeliveryConfig),
}

impl DeliveryProfile {
    pub fn resolve(&self) -> TileDeliveryConfig {
        match self {
            Self::Balanced => TileDeliveryConfig {
                http: HttpConfig {
                    user_agent: default_user_agent(),
                    timeout_ms: 30_000,
                    cache_size: 1024,
                },
                streaming: StreamingConfig {
                    request_timeout_ms: Some(30_000),
                    tms: true,
                    reconnect: ReconnectConfig {
                        enabled: true,
                        max_retries: 5,
                        retry_delay_ms: 1_000,
                        exponential_backoff: true,
                    },
                },
                layer: LayerConfig::default(),
            },
            Self::LowLatency => TileDeliveryConfig {
                http: HttpConfig {
                    user_agent: default_user_agent(),
                    timeout_ms: 5_000,
                    cache_size: 4096,
                },
                streaming: StreamingConfig {
                    request_timeout_ms: Some(5_000),
                    tms: true,
                    reconnect: ReconnectConfig {
                        enabled: true,
                        max_retries: 10,
                        retry_delay_ms: 250,
                        exponential_backoff: false,
                    },
                },
                layer: LayerConfig::default(),
            },
            Self::Conservative => TileDeliveryConfig {
                http: HttpConfig {
                    user_agent: default_user_agent(),
                    timeout_ms: 60_000,
                    cache_size: 256,
                },
                streaming: StreamingConfig {
                    request_timeout_ms: Some(60_000),
                    tms: true,
                    reconnect: ReconnectConfig {
                        enabled: true,
                        max_retries: 3,
                        retry_delay_ms: 2_000,
                        exponential_backoff: true,
                    },
                },
                layer: LayerConfig::default(),
            },
            Self::Custom(config) => config.clone(),
        }
    }
}

/// Everything the transports and layers read at construction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileDeliveryConfig {
    pub http: HttpConfig,
    pub streaming: StreamingConfig,
    pub layer: LayerConfig,
}

impl Default for TileDeliveryConfig {
    fn default() -> Self {
        DeliveryProfile::default().resolve()
    }
}

impl TileDeliveryConfig {
    /// Parses a JSON document; missing sections fall back to the balanced profile.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(MapError::from)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.http.cache_size == 0 {
            return Err(MapError::Config("http.cache_size must be at least 1".into()).into());
        }
        if self.http.timeout_ms == 0 {
            return Err(MapError::Config("http.timeout_ms must be positive".into()).into());
        }
        if self.streaming.request_timeout_ms == Some(0) {
            return Err(MapError::Config(
                "streaming.request_timeout_ms must be positive or null".into(),
            )
            .into());
        }
        if self.layer.tile_size == 0 {
            return Err(MapError::Config("layer.tile_size must be positive".into()).into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout_ms: u64,
    /// Number of tile images kept in the URL-keyed cache.
    pub cache_size: usize,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        DeliveryProfile::Balanced.resolve().http
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Pending tiles older than this resolve as failed; `None` waits forever.
    pub request_timeout_ms: Option<u64>,
    /// Whether the server numbers rows from the bottom.
    pub tms: bool,
    pub reconnect: ReconnectConfig,
}

impl StreamingConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        DeliveryProfile::Balanced.resolve().streaming
    }
}

/// Reconnection after the server drops the connection. An explicit close
/// never triggers a reconnect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub enabled: bool,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub exponential_backoff: bool,
}

impl ReconnectConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        DeliveryProfile::Balanced.resolve().streaming.reconnect
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    pub crs: Crs,
    pub tile_size: u32,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            crs: Crs::Epsg4326,
            tile_size: super::constants::TILE_SIZE,
        }
    }
}

fn default_user_agent() -> String {
    format!("skytiles/{}", env!("CARGO_PKG_VERSION"))
}
