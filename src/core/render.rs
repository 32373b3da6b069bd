//! Render parameters attached to every tile request.

use super::constants::{DEFAULT_COLOR_MAP, DEFAULT_VMAX, DEFAULT_VMIN};
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Color map and intensity window used to turn survey data into pixels.
///
/// Treated as an immutable snapshot: a change replaces the whole value, and a
/// request keeps the snapshot it was issued with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderParameters {
    #[serde(rename = "cmap")]
    pub color_map: String,
    #[serde(rename = "vmin")]
    pub min: f64,
    #[serde(rename = "vmax")]
    pub max: f64,
}

impl RenderParameters {
    pub fn new(color_map: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            color_map: color_map.into(),
            min,
            max,
        }
    }

    /// Query string form, keys always in `cmap`, `vmin`, `vmax` order and
    /// values percent-encoded, so equal parameters give byte-identical URLs.
    pub fn query_string(&self) -> String {
        let pairs = [
            ("cmap", self.color_map.clone()),
            ("vmin", self.min.to_string()),
            ("vmax", self.max.to_string()),
        ];
        // The base is a constant and always parses.
        Url::parse_with_params("http://localhost/", &pairs)
            .ok()
            .and_then(|url| url.query().map(str::to_string))
            .unwrap_or_default()
    }
}

impl Default for RenderParameters {
    fn default() -> Self {
        Self::new(DEFAULT_COLOR_MAP, DEFAULT_VMIN, DEFAULT_VMAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_string_order_and_numbers() {
        let params = RenderParameters::new("viridis", -500.0, 500.0);
        assert_eq!(params.query_string(), "cmap=viridis&vmin=-500&vmax=500");

        let fractional = RenderParameters::new("inferno", -0.25, 12.5);
        assert_eq!(fractional.query_string(), "cmap=inferno&vmin=-0.25&vmax=12.5");
    }

    #[test]
    fn test_query_string_is_stable() {
        let a = RenderParameters::new("gray r", 1.0, 2.0);
        let b = RenderParameters::new("gray r", 1.0, 2.0);
        assert_eq!(a.query_string(), b.query_string());
        assert!(!a.query_string().contains(' '));
    }

    #[test]
    fn test_wire_field_names() {
        let params = RenderParameters::new("viridis", -500.0, 500.0);
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["cmap"], "viridis");
        assert_eq!(value["vmin"], -500.0);
        assert_eq!(value["vmax"], 500.0);
    }
}
