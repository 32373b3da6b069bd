use crate::core::{
    grid::Crs,
    tile::{RowOrigin, TileAddress},
};
use crate::MapError;

/// Trait representing anything that can produce tile URLs for a given address.
pub trait TileSource: Send + Sync {
    /// Build a URL for `address`; its row is already in the server's convention.
    fn url(&self, address: &TileAddress) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Zoom,
    Col,
    Row,
    /// `{-y}`: the bottom-origin (TMS) row, whatever the address convention.
    InvertedRow,
    Subdomain,
}

/// Server-provided URL template such as `https://host/survey/{z}/tile_{x}_{y}.webp`.
///
/// Supports the Leaflet placeholders `{z}`, `{x}`, `{y}`, `{-y}` and `{s}`.
/// The template is parsed once; any other placeholder is rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct UrlTemplate {
    raw: String,
    segments: Vec<Segment>,
    subdomains: Vec<String>,
    crs: Crs,
}

impl UrlTemplate {
    pub fn parse(template: &str) -> crate::Result<Self> {
        let mut segments = Vec::new();
        let mut rest = template;

        while let Some(start) = rest.find('{') {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + 1..];
            let end = after.find('}').ok_or_else(|| {
                MapError::InvalidTemplate(format!("unclosed placeholder in {}", template))
            })?;
            let segment = match &after[..end] {
                "z" => Segment::Zoom,
                "x" => Segment::Col,
                "y" => Segment::Row,
                "-y" => Segment::InvertedRow,
                "s" => Segment::Subdomain,
                other => {
                    return Err(MapError::InvalidTemplate(format!(
                        "unknown placeholder {{{}}} in {}",
                        other, template
                    ))
                    .into())
                }
            };
            segments.push(segment);
            rest = &after[end + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        for (required, name) in [(Segment::Zoom, "{z}"), (Segment::Col, "{x}")] {
            if !segments.contains(&required) {
                return Err(MapError::InvalidTemplate(format!("{} missing in {}", name, template)).into());
            }
        }
        if !segments.contains(&Segment::Row) && !segments.contains(&Segment::InvertedRow) {
            return Err(MapError::InvalidTemplate(format!("{{y}} missing in {}", template)).into());
        }

        Ok(Self {
            raw: template.to_string(),
            segments,
            subdomains: vec!["a".into(), "b".into(), "c".into()],
            crs: Crs::default(),
        })
    }

    pub fn with_subdomains(mut self, subdomains: Vec<String>) -> Self {
        self.subdomains = subdomains;
        self
    }

    /// Grid used to resolve `{-y}`.
    pub fn with_crs(mut self, crs: Crs) -> Self {
        self.crs = crs;
        self
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the template already carries a query string.
    pub fn has_query(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, Segment::Literal(text) if text.contains('?')))
    }
}

impl TileSource for UrlTemplate {
    fn url(&self, address: &TileAddress) -> String {
        let mut url = String::with_capacity(self.raw.len() + 16);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => url.push_str(text),
                Segment::Zoom => url.push_str(&address.zoom.to_string()),
                Segment::Col => url.push_str(&address.col.to_string()),
                Segment::Row => url.push_str(&address.row.to_string()),
                Segment::InvertedRow => {
                    let bottom = address.to_origin(RowOrigin::Bottom, &self.crs);
                    url.push_str(&bottom.row.to_string());
                }
                Segment::Subdomain => {
                    // Same rotation as Leaflet: (x + y) mod subdomain count.
                    if !self.subdomains.is_empty() {
                        let index = (address.col as usize + address.row as usize) % self.subdomains.len();
                        url.push_str(&self.subdomains[index]);
                    }
                }
            }
        }
        url
    }
}
