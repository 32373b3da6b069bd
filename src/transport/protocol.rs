//! JSON envelopes spoken over the streaming connection.
//!
//! Outbound: one [`TileRequestEnvelope`] per tile. Inbound: either a failure
//! (`{tile_id, error}`) or an image (`{tile_id, image}`); anything else is an
//! [`DecodeError::UnknownShape`].

use super::{TileImage, TileRequest};
use crate::core::{render::RenderParameters, tile::TileId};
use base64::Engine as _;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileRequestEnvelope {
    pub tile_id: TileId,
    pub map: String,
    pub band: u32,
    pub x: u32,
    pub y: u32,
    pub level: u8,
    pub render_options: RenderParameters,
}

impl From<&TileRequest> for TileRequestEnvelope {
    fn from(request: &TileRequest) -> Self {
        Self {
            tile_id: request.id.clone(),
            map: request.map.clone(),
            band: request.band,
            x: request.address.col,
            y: request.address.row,
            level: request.address.zoom,
            render_options: (*request.render).clone(),
        }
    }
}

/// Serializes a request into the text frame sent to the server.
pub fn encode_request(request: &TileRequest) -> crate::Result<String> {
    let envelope = TileRequestEnvelope::from(request);
    Ok(serde_json::to_string(&envelope).map_err(crate::MapError::from)?)
}

/// Inbound message. The failure shape is tried first, so a message carrying
/// both `error` and `image` counts as a failure.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum InboundEnvelope {
    Failure { tile_id: TileId, error: String },
    Image { tile_id: TileId, image: String },
}

impl InboundEnvelope {
    pub fn tile_id(&self) -> &TileId {
        match self {
            InboundEnvelope::Failure { tile_id, .. } | InboundEnvelope::Image { tile_id, .. } => {
                tile_id
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("message is not valid JSON: {0}")]
    Malformed(String),

    #[error("message has no tile_id with an image or error field")]
    UnknownShape,
}

pub fn decode_response(text: &str) -> Result<InboundEnvelope, DecodeError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    serde_json::from_value(value).map_err(|_| DecodeError::UnknownShape)
}

/// Decodes an `image` field, either a `data:<mime>;base64,<data>` URI or bare base64.
pub fn decode_image_payload(payload: &str) -> Result<TileImage, String> {
    let engine = base64::engine::general_purpose::STANDARD;

    let (mime, data) = match payload.strip_prefix("data:") {
        Some(rest) => {
            let (header, data) = rest
                .split_once(',')
                .ok_or_else(|| "data URI without a comma".to_string())?;
            let mime = header
                .strip_suffix(";base64")
                .ok_or_else(|| format!("data URI is not base64 encoded: {}", header))?;
            let mime = (!mime.is_empty()).then(|| mime.to_string());
            (mime, data)
        }
        None => (None, payload),
    };

    let bytes = engine.decode(data.trim()).map_err(|e| e.to_string())?;
    Ok(TileImage::new(mime, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tile::TileAddress;
    use std::sync::Arc;

    #[test]
    fn test_request_wire_format() {
        let request = TileRequest {
            id: TileId::from("1:1:2@0"),
            address: TileAddress::new(2, 1, 2),
            map: "survey.fits".into(),
            band: 3,
            render: Arc::new(RenderParameters::default()),
        };
        let value: serde_json::Value =
            serde_json::from_str(&encode_request(&request).unwrap()).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "tile_id": "1:1:2@0",
                "map": "survey.fits",
                "band": 3,
                "x": 1,
                "y": 2,
                "level": 2,
                "render_options": { "cmap": "viridis", "vmin": -500.0, "vmax": 500.0 }
            })
        );
    }

    #[test]
    fn test_decode_both_envelopes() {
        let image = decode_response(r#"{"tile_id":"a","image":"AAEC"}"#).unwrap();
        assert_eq!(
            image,
            InboundEnvelope::Image {
                tile_id: "a".into(),
                image: "AAEC".into()
            }
        );

        let failure = decode_response(r#"{"tile_id":"b","error":"out of range"}"#).unwrap();
        assert_eq!(failure.tile_id().as_str(), "b");
        assert!(matches!(failure, InboundEnvelope::Failure { .. }));

        let both = decode_response(r#"{"tile_id":"c","error":"x","image":"AAEC"}"#).unwrap();
        assert!(matches!(both, InboundEnvelope::Failure { .. }));
    }

    #[test]
    fn test_decode_failures_are_distinct() {
        assert!(matches!(decode_response("not json"), Err(DecodeError::Malformed(_))));
        assert_eq!(decode_response(r#"{"tile_id":"a"}"#), Err(DecodeError::UnknownShape));
        assert_eq!(decode_response(r#"{"image":"AAEC"}"#), Err(DecodeError::UnknownShape));
        assert_eq!(decode_response(r#"[1,2]"#), Err(DecodeError::UnknownShape));
    }

    #[test]
    fn test_image_payload_forms() {
        let uri = decode_image_payload("data:image/webp;base64,AAEC").unwrap();
        assert_eq!(uri.mime.as_deref(), Some("image/webp"));
        assert_eq!(*uri.bytes, vec![0, 1, 2]);

        let bare = decode_image_payload("AAEC").unwrap();
        assert_eq!(bare.mime, None);
        assert_eq!(*bare.bytes, vec![0, 1, 2]);

        assert!(decode_image_payload("data:image/png,rawpixels").is_err());
        assert!(decode_image_payload("%%%").is_err());
    }
}
