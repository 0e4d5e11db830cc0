//! Wire formats spoken with the tile server.
//!
//! - [`frame`]: the VTLV framing of the streamed response
//! - [`request`]: the JSON body of a batched tile request

pub mod frame;
pub mod request;

pub use frame::{encode_frame, Frame, FrameDecoder, FrameType, Frames, FRAME_HEADER_SIZE, VERSION_SIZE};
pub use request::{LayerTileRequest, TileRequestBody};
