//! Tile layer decoder seam.
//!
//! Feature payloads and field dictionary updates are opaque to the engine.
//! A [`TileLayerDecoder`] turns them into the little metadata the engine needs
//! to key, cache and account for a tile, and keeps the shared field dictionary
//! whose offsets go out with every tile request.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::cache::MapTileKey;
use crate::coord::TileId;

/// Errors reported by a [`TileLayerDecoder`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// The payload is truncated or structurally invalid.
    #[error("Malformed tile layer: {0}")]
    Malformed(String),

    /// The payload references a field dictionary entry not received yet.
    #[error("Unknown field dictionary entry: {0}")]
    MissingField(String),

    /// The data source description could not be applied.
    #[error("Invalid data source info: {0}")]
    DataSourceInfo(String),
}

/// Metadata read from a feature tile payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TileLayerMetadata {
    pub map_id: String,
    pub layer_id: String,
    pub tile_id: TileId,
    pub num_features: u32,
    /// Attribution text required by the data owner.
    pub legal_info: Option<String>,
    /// Decoder-specific numeric statistics, e.g. parse sub-timings.
    pub scalar_stats: BTreeMap<String, f64>,
}

impl TileLayerMetadata {
    /// Cache key of the described tile.
    pub fn key(&self) -> MapTileKey {
        MapTileKey::new(self.map_id.clone(), self.layer_id.clone(), self.tile_id)
    }
}

/// External decoder for tile layer payloads and field dictionaries.
pub trait TileLayerDecoder {
    /// Reads the metadata of a feature tile.
    ///
    /// `payload` is the frame payload without the 11-byte header.
    fn read_tile_layer_metadata(&mut self, payload: &[u8]) -> Result<TileLayerMetadata, DecodeError>;

    /// Merges a field dictionary update into the shared dictionary.
    ///
    /// `frame` is the complete frame, header included.
    fn read_field_dict_update(&mut self, frame: &[u8]) -> Result<(), DecodeError>;

    /// Dictionary offsets already known, sent with each tile request.
    fn field_dict_offsets(&self) -> Vec<u64>;

    /// Receives the raw data source description fetched from the server.
    fn set_data_source_info(&mut self, _json: &[u8]) -> Result<(), DecodeError> {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::protocol::FRAME_HEADER_SIZE;
    use serde::{Deserialize, Serialize};
    use std::sync::{Arc, Mutex};

    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct TestPayload {
        map_id: String,
        layer_id: String,
        tile_id: TileId,
        num_features: u32,
        legal_info: Option<String>,
        /// Dictionary nodes the payload refers to.
        #[serde(default)]
        fields: Vec<String>,
    }

    /// Decoder for JSON test payloads.
    ///
    /// Feature payloads are JSON objects built with [`JsonTestDecoder::payload`];
    /// field dictionary frames carry a JSON object of node id to offset. A
    /// payload naming a node the dictionary lacks fails with
    /// [`DecodeError::MissingField`].
    #[derive(Default)]
    pub struct JsonTestDecoder {
        pub offsets: BTreeMap<String, u64>,
        pub source_info: Arc<Mutex<Option<Vec<u8>>>>,
    }

    impl JsonTestDecoder {
        pub fn payload(
            map_id: &str,
            layer_id: &str,
            tile_id: TileId,
            num_features: u32,
            legal_info: Option<&str>,
        ) -> Vec<u8> {
            serde_json::to_vec(&TestPayload {
                map_id: map_id.to_string(),
                layer_id: layer_id.to_string(),
                tile_id,
                num_features,
                legal_info: legal_info.map(str::to_string),
                fields: Vec::new(),
            })
            .unwrap()
        }

        /// Payload that needs the dictionary nodes `fields` to decode.
        pub fn payload_with_fields(
            map_id: &str,
            layer_id: &str,
            tile_id: TileId,
            fields: &[&str],
        ) -> Vec<u8> {
            serde_json::to_vec(&TestPayload {
                map_id: map_id.to_string(),
                layer_id: layer_id.to_string(),
                tile_id,
                num_features: 1,
                legal_info: None,
                fields: fields.iter().map(|f| f.to_string()).collect(),
            })
            .unwrap()
        }
    }

    impl TileLayerDecoder for JsonTestDecoder {
        fn read_tile_layer_metadata(&mut self, payload: &[u8]) -> Result<TileLayerMetadata, DecodeError> {
            let parsed: TestPayload =
                serde_json::from_slice(payload).map_err(|e| DecodeError::Malformed(e.to_string()))?;
            if let Some(missing) = parsed.fields.iter().find(|f| !self.offsets.contains_key(*f)) {
                return Err(DecodeError::MissingField(missing.clone()));
            }
            Ok(TileLayerMetadata {
                map_id: parsed.map_id,
                layer_id: parsed.layer_id,
                tile_id: parsed.tile_id,
                num_features: parsed.num_features,
                legal_info: parsed.legal_info,
                scalar_stats: BTreeMap::new(),
            })
        }

        fn read_field_dict_update(&mut self, frame: &[u8]) -> Result<(), DecodeError> {
            let body = frame
                .get(FRAME_HEADER_SIZE..)
                .ok_or_else(|| DecodeError::Malformed("truncated frame".to_string()))?;
            let update: BTreeMap<String, u64> =
                serde_json::from_slice(body).map_err(|e| DecodeError::Malformed(e.to_string()))?;
            self.offsets.extend(update);
            Ok(())
        }

        fn field_dict_offsets(&self) -> Vec<u64> {
            self.offsets.values().copied().collect()
        }

        fn set_data_source_info(&mut self, json: &[u8]) -> Result<(), DecodeError> {
            *self.source_info.lock().unwrap() = Some(json.to_vec());
            Ok(())
        }
    }

    #[test]
    fn test_metadata_key() {
        let metadata = TileLayerMetadata {
            map_id: "m".to_string(),
            layer_id: "l".to_string(),
            tile_id: TileId::from_raw(9),
            ..TileLayerMetadata::default()
        };
        assert_eq!(metadata.key(), MapTileKey::new("m", "l", TileId::from_raw(9)));
    }

    #[test]
    fn test_json_decoder_reads_payload() {
        let mut decoder = JsonTestDecoder::default();
        let payload = JsonTestDecoder::payload("m", "l", TileId::from_raw(3), 2, Some("(c)"));
        let metadata = decoder.read_tile_layer_metadata(&payload).unwrap();
        assert_eq!(metadata.num_features, 2);
        assert_eq!(metadata.legal_info.as_deref(), Some("(c)"));
        assert!(decoder.read_tile_layer_metadata(b"nope").is_err());
    }

    #[test]
    fn test_json_decoder_requires_dictionary_nodes() {
        let mut decoder = JsonTestDecoder::default();
        let payload = JsonTestDecoder::payload_with_fields("m", "l", TileId::from_raw(3), &["name"]);
        assert_eq!(
            decoder.read_tile_layer_metadata(&payload),
            Err(DecodeError::MissingField("name".to_string()))
        );

        decoder.offsets.insert("name".to_string(), 4);
        assert!(decoder.read_tile_layer_metadata(&payload).is_ok());
    }
}
