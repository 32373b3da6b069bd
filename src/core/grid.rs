//! Tile grid geometry for the coordinate reference systems the viewer supports.
//!
//! Pixel math follows Leaflet's CRS definitions so that tile numbering matches
//! what a browser client would request for the same view.

use super::constants::{MAX_ZOOM, TILE_SIZE};
use super::geo::{LatLng, LatLngBounds, Point};
use serde::{Deserialize, Serialize};

/// Coordinate reference system of a tiled map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Crs {
    /// Plate carrée; two columns and one row at zoom 0. Used by sky surveys.
    #[default]
    #[serde(rename = "EPSG:4326")]
    Epsg4326,
    /// Spherical web mercator; one tile at zoom 0.
    #[serde(rename = "EPSG:3857")]
    Epsg3857,
}

impl Crs {
    /// Pixel width of one degree-free "world unit" at `zoom`.
    pub fn scale(zoom: f64) -> f64 {
        TILE_SIZE as f64 * 2_f64.powf(zoom)
    }

    /// Number of tile columns covering the world at `zoom`.
    pub fn tile_columns(&self, zoom: u8) -> u32 {
        let zoom = zoom.min(MAX_ZOOM) as u32;
        match self {
            Crs::Epsg4326 => 1u32 << (zoom + 1),
            Crs::Epsg3857 => 1u32 << zoom,
        }
    }

    /// Number of tile rows covering the world at `zoom`.
    pub fn tile_rows(&self, zoom: u8) -> u32 {
        1u32 << zoom.min(MAX_ZOOM) as u32
    }

    /// Projects a coordinate to global pixel space at `zoom` (y grows southward).
    pub fn project(&self, lat_lng: &LatLng, zoom: f64) -> Point {
        let scale = Self::scale(zoom);
        match self {
            Crs::Epsg4326 => Point::new(
                scale * (lat_lng.lng / 180.0 + 1.0),
                scale * (0.5 - lat_lng.lat / 180.0),
            ),
            Crs::Epsg3857 => {
                let meters = lat_lng.to_mercator();
                let extent = 2.0 * LatLng::mercator_half_extent();
                Point::new(
                    scale * (0.5 + meters.x / extent),
                    scale * (0.5 - meters.y / extent),
                )
            }
        }
    }

    /// Inverse of [`Crs::project`].
    pub fn unproject(&self, point: &Point, zoom: f64) -> LatLng {
        let scale = Self::scale(zoom);
        match self {
            Crs::Epsg4326 => LatLng::new(
                (0.5 - point.y / scale) * 180.0,
                (point.x / scale - 1.0) * 180.0,
            ),
            Crs::Epsg3857 => {
                let extent = 2.0 * LatLng::mercator_half_extent();
                LatLng::from_mercator(Point::new(
                    (point.x / scale - 0.5) * extent,
                    (0.5 - point.y / scale) * extent,
                ))
            }
        }
    }

    /// Geographic footprint of a top-origin tile.
    pub fn tile_bounds(&self, col: u32, row: u32, zoom: u8) -> LatLngBounds {
        let size = TILE_SIZE as f64;
        let zoom = zoom as f64;
        let nw = self.unproject(&Point::new(col as f64 * size, row as f64 * size), zoom);
        let se = self.unproject(
            &Point::new((col + 1) as f64 * size, (row + 1) as f64 * size),
            zoom,
        );
        LatLngBounds::from_corners(nw, se)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_dimensions() {
        assert_eq!(Crs::Epsg4326.tile_columns(0), 2);
        assert_eq!(Crs::Epsg4326.tile_rows(0), 1);
        assert_eq!(Crs::Epsg4326.tile_rows(3), 8);
        assert_eq!(Crs::Epsg3857.tile_columns(3), 8);
        assert_eq!(Crs::Epsg3857.tile_rows(3), 8);
    }

    #[test]
    fn test_plate_carree_projection() {
        let crs = Crs::Epsg4326;
        let origin = crs.project(&LatLng::new(0.0, 0.0), 0.0);
        assert_eq!(origin, Point::new(256.0, 128.0));

        let north_west = crs.project(&LatLng::new(90.0, -180.0), 1.0);
        assert_eq!(north_west, Point::new(0.0, 0.0));

        let back = crs.unproject(&Point::new(300.0, 50.0), 0.0);
        let again = crs.project(&back, 0.0);
        assert!((again.x - 300.0).abs() < 1e-9);
        assert!((again.y - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_tile_bounds_plate_carree() {
        let bounds = Crs::Epsg4326.tile_bounds(0, 0, 0);
        assert_eq!(bounds.south_west, LatLng::new(-90.0, -180.0));
        assert_eq!(bounds.north_east, LatLng::new(90.0, 0.0));
    }

    #[test]
    fn test_crs_serde_names() {
        let json = serde_json::to_string(&Crs::Epsg4326).unwrap();
        assert_eq!(json, "\"EPSG:4326\"");
        let crs: Crs = serde_json::from_str("\"EPSG:3857\"").unwrap();
        assert_eq!(crs, Crs::Epsg3857);
    }
}
