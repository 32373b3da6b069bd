use crate::core::geo::{LatLng, LatLngBounds, Point};
use crate::core::grid::Crs;
use crate::core::tile::TileAddress;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// The visible part of the map: center, fractional zoom and screen size in pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub center: LatLng,
    pub zoom: f64,
    pub size: Point,
}

impl Viewport {
    pub fn new(center: LatLng, zoom: f64, size: Point) -> Self {
        Self { center, zoom, size }
    }

    /// Zoom at which tiles are requested: the display zoom snapped to an
    /// integer and clamped to what the server renders natively. Past the
    /// native range the nearest native level is stretched instead.
    pub fn tile_zoom(&self, native_zoom: &RangeInclusive<u8>) -> u8 {
        let snapped = self.zoom.round().max(0.0);
        let snapped = if snapped > u8::MAX as f64 { u8::MAX } else { snapped as u8 };
        snapped.clamp(*native_zoom.start(), *native_zoom.end())
    }

    /// Pixel bounds of the view projected at `tile_zoom`.
    /// This matches Leaflet's `_getTiledPixelBounds`.
    pub fn tiled_pixel_bounds(&self, crs: &Crs, tile_zoom: u8) -> (Point, Point) {
        let scale = 2_f64.powf(self.zoom - tile_zoom as f64);
        let pixel_center = crs.project(&self.center, tile_zoom as f64);
        let half_size = Point::new(self.size.x / (scale * 2.0), self.size.y / (scale * 2.0));

        (pixel_center.subtract(&half_size), pixel_center.add(&half_size))
    }

    /// Top-origin tiles needed to cover the view, nearest to the center first.
    ///
    /// Tiles outside the world grid are skipped (no wrapping), as are tiles that
    /// do not overlap `bounds` when given.
    pub fn required_tiles(
        &self,
        crs: &Crs,
        tile_size: u32,
        native_zoom: &RangeInclusive<u8>,
        bounds: Option<&LatLngBounds>,
    ) -> Vec<TileAddress> {
        let zoom = self.tile_zoom(native_zoom);
        let (min, max) = self.tiled_pixel_bounds(crs, zoom);
        let size = tile_size.max(1) as f64;

        // Leaflet's _pxBoundsToTileRange
        let min_col = (min.x / size).floor() as i64;
        let min_row = (min.y / size).floor() as i64;
        let max_col = (max.x / size).ceil() as i64 - 1;
        let max_row = (max.y / size).ceil() as i64 - 1;

        let columns = crs.tile_columns(zoom) as i64;
        let rows = crs.tile_rows(zoom) as i64;

        let mut tiles = Vec::new();
        for row in min_row.max(0)..=max_row.min(rows - 1) {
            for col in min_col.max(0)..=max_col.min(columns - 1) {
                let address = TileAddress::new(zoom, col as u32, row as u32);
                if let Some(bounds) = bounds {
                    if !bounds.overlaps(&crs.tile_bounds(address.col, address.row, zoom)) {
                        continue;
                    }
                }
                tiles.push(address);
            }
        }

        let center_col = (min.x + max.x) / (2.0 * size);
        let center_row = (min.y + max.y) / (2.0 * size);
        let distance = |a: &TileAddress| {
            let dx = a.col as f64 + 0.5 - center_col;
            let dy = a.row as f64 + 0.5 - center_row;
            dx * dx + dy * dy
        };
        tiles.sort_by(|a, b| {
            distance(a)
                .partial_cmp(&distance(b))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then((a.row, a.col).cmp(&(b.row, b.col)))
        });
        tiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sky_bounds() -> LatLngBounds {
        LatLngBounds::from_corners(LatLng::new(23.0, -180.0), LatLng::new(-63.0, 180.0))
    }

    #[test]
    fn test_tile_zoom_clamps_to_native_range() {
        let viewport = Viewport::new(LatLng::default(), 7.4, Point::new(512.0, 512.0));
        assert_eq!(viewport.tile_zoom(&(0..=5)), 5);

        let viewport = Viewport::new(LatLng::default(), 1.6, Point::new(512.0, 512.0));
        assert_eq!(viewport.tile_zoom(&(0..=5)), 2);
        assert_eq!(viewport.tile_zoom(&(3..=5)), 3);
    }

    #[test]
    fn test_whole_world_at_zoom_zero() {
        let viewport = Viewport::new(LatLng::default(), 0.0, Point::new(512.0, 256.0));
        let tiles = viewport.required_tiles(&Crs::Epsg4326, 256, &(0..=5), None);
        assert_eq!(tiles.len(), 2);
        assert!(tiles.contains(&TileAddress::new(0, 0, 0)));
        assert!(tiles.contains(&TileAddress::new(0, 1, 0)));
    }

    #[test]
    fn test_center_view_at_zoom_two() {
        // At zoom 2 the plate carrée grid is 8x4 tiles; a 512x512 view at the
        // origin covers columns 3..=4 and rows 1..=2.
        let viewport = Viewport::new(LatLng::default(), 2.0, Point::new(512.0, 512.0));
        let tiles = viewport.required_tiles(&Crs::Epsg4326, 256, &(0..=5), None);
        assert_eq!(tiles.len(), 4);
        for (col, row) in [(3, 1), (4, 1), (3, 2), (4, 2)] {
            assert!(tiles.contains(&TileAddress::new(2, col, row)));
        }
    }

    #[test]
    fn test_bounds_exclude_tiles_outside_the_survey() {
        // Zoom 1 grid is 4x2 and the view covers the whole world.
        let viewport = Viewport::new(LatLng::default(), 1.0, Point::new(1024.0, 512.0));
        let all = viewport.required_tiles(&Crs::Epsg4326, 256, &(0..=5), None);
        assert_eq!(all.len(), 8);

        // At zoom 3 rows are 22.5 degrees tall; rows 0 and 1 lie north of 23N.
        let viewport = Viewport::new(LatLng::new(60.0, 0.0), 3.0, Point::new(256.0, 512.0));
        let clipped = viewport.required_tiles(&Crs::Epsg4326, 256, &(0..=5), Some(&sky_bounds()));
        assert!(!clipped.is_empty());
        assert!(clipped.iter().all(|t| t.row == 2));
        assert!(clipped.iter().all(|t| {
            sky_bounds().overlaps(&Crs::Epsg4326.tile_bounds(t.col, t.row, t.zoom))
        }));
    }

    #[test]
    fn test_nearest_tiles_come_first() {
        let viewport = Viewport::new(LatLng::new(0.0, 10.0), 2.0, Point::new(1024.0, 512.0));
        let tiles = viewport.required_tiles(&Crs::Epsg4326, 256, &(0..=5), None);
        let first = tiles[0];
        let last = tiles[tiles.len() - 1];
        let center = Crs::Epsg4326.project(&viewport.center, 2.0);
        let dist = |t: &TileAddress| {
            let dx = (t.col as f64 + 0.5) * 256.0 - center.x;
            let dy = (t.row as f64 + 0.5) * 256.0 - center.y;
            dx * dx + dy * dy
        };
        assert!(dist(&first) <= dist(&last));
    }
}
