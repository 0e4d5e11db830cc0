//! Out-of-band tile requests.
//!
//! A host that needs one specific tile (e.g. to inspect a selected feature)
//! asks for it with a [`SelectionTileRequest`]. The request rides along with
//! the next batched tile request and is answered through a oneshot channel
//! once the tile is parsed, or rejected when the fetch finishes without it.

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::cache::{FeatureTile, MapTileKey};
use crate::protocol::LayerTileRequest;

/// A tile delivered to a selection request.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedTile {
    pub key: MapTileKey,
    pub num_features: u32,
    pub legal_info: Option<String>,
    pub payload: Bytes,
}

/// Why a selection request failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    /// The map layer is not in the catalog.
    #[error("Layer {map_id}/{layer_id} is not available")]
    LayerUnavailable { map_id: String, layer_id: String },

    /// The fetch finished without delivering the tile.
    #[error("Tile {0} was not delivered")]
    NotDelivered(MapTileKey),

    /// The engine was dropped with the request pending.
    #[error("Tile engine dropped before tile {0} arrived")]
    EngineDropped(MapTileKey),
}

pub type SelectionResult = Result<SelectedTile, SelectionError>;

/// A pending request for one tile.
#[derive(Debug)]
pub struct SelectionTileRequest {
    key: MapTileKey,
    generation: Option<u64>,
    responder: oneshot::Sender<SelectionResult>,
}

impl SelectionTileRequest {
    /// Creates a request and the receiver its answer arrives on.
    pub fn new(key: MapTileKey) -> (Self, oneshot::Receiver<SelectionResult>) {
        let (responder, rx) = oneshot::channel();
        let request = Self {
            key,
            generation: None,
            responder,
        };
        (request, rx)
    }

    pub fn key(&self) -> &MapTileKey {
        &self.key
    }

    /// Generation of the fetch currently carrying this request.
    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    pub fn set_generation(&mut self, generation: u64) {
        self.generation = Some(generation);
    }

    /// The request entry sent to the server.
    pub fn layer_request(&self) -> LayerTileRequest {
        LayerTileRequest::new(
            self.key.map_id.clone(),
            self.key.layer_id.clone(),
            vec![self.key.tile_id],
        )
    }

    /// Answers with `tile`. Disposed tiles count as not delivered.
    pub fn resolve(self, tile: &FeatureTile) {
        let result = match tile.payload() {
            Some(payload) => Ok(SelectedTile {
                key: tile.key().clone(),
                num_features: tile.num_features(),
                legal_info: tile.legal_info().map(str::to_string),
                payload: payload.clone(),
            }),
            None => Err(SelectionError::NotDelivered(self.key.clone())),
        };
        // The requester may have stopped waiting
        let _ = self.responder.send(result);
    }

    pub fn reject(self, error: SelectionError) {
        let _ = self.responder.send(Err(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::TileId;

    fn key() -> MapTileKey {
        MapTileKey::new("m1", "l1", TileId::from_raw(7))
    }

    #[test]
    fn test_layer_request() {
        let (request, _rx) = SelectionTileRequest::new(key());
        assert_eq!(
            request.layer_request(),
            LayerTileRequest::new("m1", "l1", vec![TileId::from_raw(7)])
        );
        assert_eq!(request.generation(), None);
    }

    #[tokio::test]
    async fn test_resolve() {
        let (request, rx) = SelectionTileRequest::new(key());
        let tile = FeatureTile::new(key(), Bytes::from_static(b"data"), 3).with_legal_info("(c) owner");
        request.resolve(&tile);

        let selected = rx.await.unwrap().unwrap();
        assert_eq!(selected.key, key());
        assert_eq!(selected.num_features, 3);
        assert_eq!(selected.legal_info.as_deref(), Some("(c) owner"));
        assert_eq!(selected.payload, Bytes::from_static(b"data"));
    }

    #[tokio::test]
    async fn test_reject() {
        let (request, rx) = SelectionTileRequest::new(key());
        request.reject(SelectionError::NotDelivered(key()));
        assert_eq!(rx.await.unwrap(), Err(SelectionError::NotDelivered(key())));
    }
}
