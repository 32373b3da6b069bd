//! Tile addressing and request identity.

use super::grid::Crs;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Row numbering convention of a tile address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowOrigin {
    /// Row 0 is the northernmost row (XYZ / slippy-map numbering).
    #[default]
    Top,
    /// Row 0 is the southernmost row (TMS numbering).
    Bottom,
}

impl RowOrigin {
    pub fn from_tms(tms: bool) -> Self {
        if tms {
            RowOrigin::Bottom
        } else {
            RowOrigin::Top
        }
    }
}

/// A tile at one zoom level, tagged with the row convention its `row` is expressed in.
///
/// The tag makes row inversion idempotent per target: converting an address
/// that already uses the target convention returns it unchanged, so a request
/// path can never invert twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileAddress {
    pub zoom: u8,
    pub col: u32,
    pub row: u32,
    pub origin: RowOrigin,
}

impl TileAddress {
    /// Creates a top-origin address, the convention viewports work in.
    pub fn new(zoom: u8, col: u32, row: u32) -> Self {
        Self {
            zoom,
            col,
            row,
            origin: RowOrigin::Top,
        }
    }

    pub fn with_origin(zoom: u8, col: u32, row: u32, origin: RowOrigin) -> Self {
        Self {
            zoom,
            col,
            row,
            origin,
        }
    }

    /// Re-expresses this address in `target` numbering.
    ///
    /// `inverted_row = rows_at_zoom - 1 - row`, applied only when the conventions differ.
    pub fn to_origin(self, target: RowOrigin, crs: &Crs) -> Self {
        if self.origin == target {
            return self;
        }
        let rows = crs.tile_rows(self.zoom);
        Self {
            row: rows.saturating_sub(1).saturating_sub(self.row),
            origin: target,
            ..self
        }
    }

    /// Whether the address lies inside the world grid at its zoom.
    pub fn is_valid(&self, crs: &Crs) -> bool {
        self.col < crs.tile_columns(self.zoom) && self.row < crs.tile_rows(self.zoom)
    }

    /// Leaflet-style `x:y:z` key.
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.col, self.row, self.zoom)
    }
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.col, self.row)
    }
}

/// Opaque correlation id echoed by the streaming server.
///
/// Ids are derived from the top-origin tile key plus the issuing layer's
/// request epoch, so the same tile re-requested in a later epoch gets a fresh
/// id and late answers for the old one no longer match anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileId(String);

impl TileId {
    pub fn for_address(address: &TileAddress, epoch: u64) -> Self {
        Self(format!("{}@{}", address.key(), epoch))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TileId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TileId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_inversion_uses_rows_at_zoom() {
        // Zoom 3 has 8 rows in both supported grids.
        for crs in [Crs::Epsg4326, Crs::Epsg3857] {
            for r in 0..8 {
                let top = TileAddress::new(3, 1, r);
                let bottom = top.to_origin(RowOrigin::Bottom, &crs);
                assert_eq!(bottom.row, 8 - 1 - r);
                assert_eq!(bottom.origin, RowOrigin::Bottom);
            }
        }
    }

    #[test]
    fn test_inversion_never_applies_twice() {
        let crs = Crs::Epsg4326;
        let top = TileAddress::new(3, 2, 1);
        let once = top.to_origin(RowOrigin::Bottom, &crs);
        let twice = once.to_origin(RowOrigin::Bottom, &crs);
        assert_eq!(once, twice);
        assert_eq!(twice.row, 6);

        // Converting back restores the viewport row.
        assert_eq!(once.to_origin(RowOrigin::Top, &crs), top);
    }

    #[test]
    fn test_validity_against_grid() {
        let crs = Crs::Epsg4326;
        assert!(TileAddress::new(0, 1, 0).is_valid(&crs));
        assert!(!TileAddress::new(0, 2, 0).is_valid(&crs));
        assert!(!TileAddress::new(0, 0, 1).is_valid(&crs));
    }

    #[test]
    fn test_tile_id_is_deterministic_per_epoch() {
        let address = TileAddress::new(2, 1, 1);
        assert_eq!(TileId::for_address(&address, 0).as_str(), "1:1:2@0");
        assert_eq!(
            TileId::for_address(&address, 4),
            TileId::for_address(&TileAddress::new(2, 1, 1), 4)
        );
        assert_ne!(
            TileId::for_address(&address, 4),
            TileId::for_address(&address, 5)
        );
    }
}
