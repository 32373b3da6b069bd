//! Core constants shared by the transports and the layer orchestration.
//! Keeping them in a single place makes it easier to tweak engine-wide magic numbers.

/// Square tile size in pixels. The sky viewer always addresses tiles on a
/// 256px grid, even when the server renders larger images.
pub const TILE_SIZE: u32 = 256;

/// Color map applied when a catalog entry carries no recommendation.
pub const DEFAULT_COLOR_MAP: &str = "viridis";

/// Lower intensity bound applied when a catalog entry carries no recommendation.
pub const DEFAULT_VMIN: f64 = -500.0;

/// Upper intensity bound applied when a catalog entry carries no recommendation.
pub const DEFAULT_VMAX: f64 = 500.0;

/// Top-left corner (lat, lng) of a survey footprint when the catalog does not report one.
pub const DEFAULT_BOUNDS_TOP_LEFT: (f64, f64) = (23.0, -180.0);

/// Bottom-right corner (lat, lng) of a survey footprint when the catalog does not report one.
pub const DEFAULT_BOUNDS_BOTTOM_RIGHT: (f64, f64) = (-63.0, 180.0);

/// Lowest zoom the tile server renders natively.
pub const DEFAULT_NATIVE_ZOOM_MIN: u8 = 0;

/// Highest zoom the tile server renders natively.
pub const DEFAULT_NATIVE_ZOOM_MAX: u8 = 5;

/// Extra display zoom levels allowed past a map's refinement levels.
pub const OVERZOOM_LEVELS: u8 = 3;

/// Deepest zoom any grid computation accepts; keeps `1 << zoom` well inside `u32`.
pub const MAX_ZOOM: u8 = 30;
