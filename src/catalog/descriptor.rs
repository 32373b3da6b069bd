use crate::core::{
    constants::{
        DEFAULT_BOUNDS_BOTTOM_RIGHT, DEFAULT_BOUNDS_TOP_LEFT, DEFAULT_NATIVE_ZOOM_MAX,
        DEFAULT_NATIVE_ZOOM_MIN, OVERZOOM_LEVELS,
    },
    geo::{LatLng, LatLngBounds},
    render::RenderParameters,
};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Per-map metadata as returned by the catalog server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapMetadata {
    pub initialized: bool,
    pub refinement_levels: u32,
    pub base_grid_size: u32,
}

/// Everything a layer needs to know about one selectable map/band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapDescriptor {
    pub name: String,
    #[serde(default)]
    pub band: u32,
    pub bounds_top_left: LatLng,
    pub bounds_bottom_right: LatLng,
    pub native_zoom_min: u8,
    pub native_zoom_max: u8,
    /// Refinement levels the server computed for this map.
    pub levels: u32,
    /// Deepest display zoom; past the native range tiles are stretched.
    pub max_zoom: u8,
    /// Whether tile rows count from the bottom.
    pub tms: bool,
    pub recommended_render_parameters: RenderParameters,
    /// URL template (HTTP) or connection URL (streaming).
    pub endpoint: String,
}

impl MapDescriptor {
    /// Descriptor with the survey defaults.
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            band: 0,
            bounds_top_left: LatLng::new(DEFAULT_BOUNDS_TOP_LEFT.0, DEFAULT_BOUNDS_TOP_LEFT.1),
            bounds_bottom_right: LatLng::new(
                DEFAULT_BOUNDS_BOTTOM_RIGHT.0,
                DEFAULT_BOUNDS_BOTTOM_RIGHT.1,
            ),
            native_zoom_min: DEFAULT_NATIVE_ZOOM_MIN,
            native_zoom_max: DEFAULT_NATIVE_ZOOM_MAX,
            levels: 0,
            max_zoom: DEFAULT_NATIVE_ZOOM_MAX + OVERZOOM_LEVELS,
            tms: true,
            recommended_render_parameters: RenderParameters::default(),
            endpoint: endpoint.into(),
        }
    }

    pub fn with_band(mut self, band: u32) -> Self {
        self.band = band;
        self
    }

    pub fn bounds(&self) -> LatLngBounds {
        LatLngBounds::from_corners(self.bounds_top_left, self.bounds_bottom_right)
    }

    pub fn native_zoom(&self) -> RangeInclusive<u8> {
        self.native_zoom_min..=self.native_zoom_max.max(self.native_zoom_min)
    }
}

/// Builds the HTTP descriptor for `name` served under `server`.
pub fn descriptor_from_metadata(server: &str, name: &str, metadata: &MapMetadata) -> MapDescriptor {
    let server = server.trim_end_matches('/');
    let template = format!("{}/{}/{{z}}/tile_{{x}}_{{y}}.webp", server, name);
    let max_zoom = metadata
        .refinement_levels
        .saturating_add(OVERZOOM_LEVELS as u32)
        .min(u8::MAX as u32) as u8;

    MapDescriptor {
        levels: metadata.refinement_levels,
        max_zoom,
        ..MapDescriptor::new(name, template)
    }
}
