//! VTLV frame codec for the chunked tile stream.
//!
//! Every frame starts with an 11-byte header followed by its payload:
//!
//! ```text
//! ┌─────────────────┬──────┬──────────────┬───────────────┐
//! │ version (6 B)   │ type │ length (4 B) │ payload (L B) │
//! │ opaque          │ u8   │ LE u32       │               │
//! └─────────────────┴──────┴──────────────┴───────────────┘
//! ```
//!
//! The decoder accepts bytes in whatever chunks the network delivers and
//! yields complete frames only. A partial frame at the end of the buffer is
//! kept until the rest of it arrives.
//!
//! # Example
//!
//! ```ignore
//! use tilestream::protocol::{encode_frame, FrameDecoder, FrameType};
//!
//! let bytes = encode_frame([0; 6], FrameType::Features, b"payload");
//! let mut decoder = FrameDecoder::new();
//!
//! // Feed the first half: nothing complete yet
//! assert_eq!(decoder.push(&bytes[..5]).count(), 0);
//!
//! // Feed the rest: one frame comes out
//! let frames: Vec<_> = decoder.push(&bytes[5..]).collect();
//! assert_eq!(frames[0].payload(), b"payload");
//! ```

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the opaque version field.
pub const VERSION_SIZE: usize = 6;

/// Size of the complete frame header.
pub const FRAME_HEADER_SIZE: usize = VERSION_SIZE + 1 + 4;

/// Frame type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Field dictionary update.
    Fields,
    /// Feature tile layer payload.
    Features,
    /// Source data layer payload.
    SourceData,
    /// Marks the end of the response stream.
    EndOfStream,
    /// A type this client does not know. The raw tag is preserved.
    Unknown(u8),
}

impl FrameType {
    /// Decodes a type tag.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => FrameType::Fields,
            2 => FrameType::Features,
            3 => FrameType::SourceData,
            128 => FrameType::EndOfStream,
            other => FrameType::Unknown(other),
        }
    }

    /// Encodes the type tag.
    pub fn as_u8(self) -> u8 {
        match self {
            FrameType::Fields => 1,
            FrameType::Features => 2,
            FrameType::SourceData => 3,
            FrameType::EndOfStream => 128,
            FrameType::Unknown(other) => other,
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameType::Fields => write!(f, "FIELDS"),
            FrameType::Features => write!(f, "FEATURES"),
            FrameType::SourceData => write!(f, "SOURCE_DATA"),
            FrameType::EndOfStream => write!(f, "END_OF_STREAM"),
            FrameType::Unknown(tag) => write!(f, "UNKNOWN({})", tag),
        }
    }
}

/// One complete frame, header included.
///
/// The frame shares its storage with the decoder buffer it was split from,
/// so handing it to a queue does not copy the payload.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    kind: FrameType,
    bytes: Bytes,
}

impl Frame {
    /// Builds a frame from its parts.
    pub fn new(version: [u8; VERSION_SIZE], kind: FrameType, payload: &[u8]) -> Self {
        Self {
            kind,
            bytes: encode_frame(version, kind, payload),
        }
    }

    /// The decoded frame type.
    pub fn kind(&self) -> FrameType {
        self.kind
    }

    /// The opaque version bytes.
    pub fn version(&self) -> [u8; VERSION_SIZE] {
        let mut version = [0u8; VERSION_SIZE];
        version.copy_from_slice(&self.bytes[..VERSION_SIZE]);
        version
    }

    /// The payload, without the header.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[FRAME_HEADER_SIZE..]
    }

    /// The payload as a shared buffer, without the header.
    pub fn payload_bytes(&self) -> Bytes {
        self.bytes.slice(FRAME_HEADER_SIZE..)
    }

    /// The complete frame, header included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Total frame length (`11 + L`).
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.len() == FRAME_HEADER_SIZE
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("kind", &self.kind)
            .field("payload_len", &(self.bytes.len() - FRAME_HEADER_SIZE))
            .finish()
    }
}

/// Serializes one frame.
pub fn encode_frame(version: [u8; VERSION_SIZE], kind: FrameType, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.put_slice(&version);
    buf.put_u8(kind.as_u8());
    buf.put_u32_le(payload.len() as u32);
    buf.put_slice(payload);
    buf.freeze()
}

/// Incremental frame decoder.
///
/// Holds the bytes received so far. Each [`push`](Self::push) appends a chunk
/// and returns an iterator over the frames that became complete. Frames are
/// split off the front of the buffer as they are yielded, so consumed bytes
/// never accumulate.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and iterates the frames now complete.
    ///
    /// Dropping the iterator early is fine: frames not yet yielded stay
    /// buffered and come out of the next `push` or [`frames`](Self::frames).
    pub fn push(&mut self, chunk: &[u8]) -> Frames<'_> {
        self.buffer.extend_from_slice(chunk);
        Frames { decoder: self }
    }

    /// Iterates the complete frames already buffered.
    pub fn frames(&mut self) -> Frames<'_> {
        Frames { decoder: self }
    }

    /// Splits the next complete frame off the buffer, if any.
    pub fn next_frame(&mut self) -> Option<Frame> {
        if self.buffer.len() < FRAME_HEADER_SIZE {
            return None;
        }
        let kind = FrameType::from_u8(self.buffer[VERSION_SIZE]);
        let mut len_field = &self.buffer[VERSION_SIZE + 1..FRAME_HEADER_SIZE];
        let payload_len = len_field.get_u32_le() as usize;
        let total = FRAME_HEADER_SIZE + payload_len;
        if self.buffer.len() < total {
            return None;
        }
        let bytes = self.buffer.split_to(total).freeze();
        Some(Frame { kind, bytes })
    }

    /// Number of bytes waiting for completion.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drops all accumulated bytes.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

/// Lazy iterator over complete frames in a [`FrameDecoder`].
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.decoder.next_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const VERSION: [u8; VERSION_SIZE] = [1, 0, 2, 0, 0, 0];

    fn stream(frames: &[(FrameType, Vec<u8>)]) -> Vec<u8> {
        frames
            .iter()
            .flat_map(|(kind, payload)| encode_frame(VERSION, *kind, payload).to_vec())
            .collect()
    }

    fn decode_in_chunks(bytes: &[u8], cuts: &[usize]) -> Vec<(FrameType, Vec<u8>)> {
        let mut decoder = FrameDecoder::new();
        let mut out = Vec::new();
        let mut start = 0;
        for &cut in cuts.iter().chain(std::iter::once(&bytes.len())) {
            let end = cut.clamp(start, bytes.len());
            out.extend(
                decoder
                    .push(&bytes[start..end])
                    .map(|f| (f.kind(), f.payload().to_vec())),
            );
            start = end;
        }
        assert_eq!(decoder.buffered_len(), 0);
        out
    }

    #[test]
    fn test_frame_type_tags() {
        assert_eq!(FrameType::from_u8(1), FrameType::Fields);
        assert_eq!(FrameType::from_u8(2), FrameType::Features);
        assert_eq!(FrameType::from_u8(3), FrameType::SourceData);
        assert_eq!(FrameType::from_u8(128), FrameType::EndOfStream);
        assert_eq!(FrameType::from_u8(7), FrameType::Unknown(7));
        assert_eq!(FrameType::Unknown(7).as_u8(), 7);
    }

    #[test]
    fn test_header_layout() {
        let bytes = encode_frame(VERSION, FrameType::Features, &[9, 9, 9]);
        assert_eq!(bytes.len(), FRAME_HEADER_SIZE + 3);
        assert_eq!(&bytes[..6], &VERSION);
        assert_eq!(bytes[6], 2);
        assert_eq!(&bytes[7..11], &[3, 0, 0, 0]);
    }

    #[test]
    fn test_partial_frame_is_retained() {
        let bytes = encode_frame(VERSION, FrameType::Fields, b"dictionary");
        let mut decoder = FrameDecoder::new();

        assert_eq!(decoder.push(&bytes[..4]).count(), 0);
        assert_eq!(decoder.push(&bytes[4..12]).count(), 0);
        assert_eq!(decoder.buffered_len(), 12);

        let frames: Vec<_> = decoder.push(&bytes[12..]).collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind(), FrameType::Fields);
        assert_eq!(frames[0].version(), VERSION);
        assert_eq!(frames[0].payload(), b"dictionary");
        assert_eq!(frames[0].as_bytes(), &bytes[..]);
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_whole_stream_at_once() {
        let input = vec![
            (FrameType::Fields, b"f".to_vec()),
            (FrameType::Features, b"tile-a".to_vec()),
            (FrameType::Features, Vec::new()),
            (FrameType::EndOfStream, Vec::new()),
        ];
        assert_eq!(decode_in_chunks(&stream(&input), &[]), input);
    }

    #[test]
    fn test_one_byte_at_a_time() {
        let input = vec![
            (FrameType::Fields, vec![0xAA; 17]),
            (FrameType::SourceData, vec![1, 2, 3]),
            (FrameType::Features, vec![0x55; 300]),
        ];
        let bytes = stream(&input);
        let cuts: Vec<usize> = (1..bytes.len()).collect();
        assert_eq!(decode_in_chunks(&bytes, &cuts), input);
    }

    #[test]
    fn test_early_drop_keeps_remaining_frames() {
        let input = vec![
            (FrameType::Features, b"one".to_vec()),
            (FrameType::Features, b"two".to_vec()),
        ];
        let bytes = stream(&input);
        let mut decoder = FrameDecoder::new();

        let first = decoder.push(&bytes).next().unwrap();
        assert_eq!(first.payload(), b"one");

        let rest: Vec<_> = decoder.frames().collect();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].payload(), b"two");
    }

    #[test]
    fn test_reset_drops_partial_frame() {
        let bytes = encode_frame(VERSION, FrameType::Features, b"abc");
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.push(&bytes[..8]).count(), 0);
        decoder.reset();
        assert_eq!(decoder.buffered_len(), 0);
        assert_eq!(decoder.push(&bytes).count(), 1);
    }

    #[test]
    fn test_payload_bytes_shares_frame() {
        let frame = Frame::new(VERSION, FrameType::Features, b"xyz");
        assert_eq!(frame.payload_bytes(), Bytes::from_static(b"xyz"));
        assert_eq!(frame.len(), FRAME_HEADER_SIZE + 3);
        assert!(!frame.is_empty());
    }

    fn frame_strategy() -> impl Strategy<Value = (FrameType, Vec<u8>)> {
        (
            prop_oneof![
                Just(FrameType::Fields),
                Just(FrameType::Features),
                Just(FrameType::SourceData),
                Just(FrameType::EndOfStream),
            ],
            proptest::collection::vec(any::<u8>(), 0..64),
        )
    }

    proptest! {
        #[test]
        fn prop_fragmentation_independent(
            input in proptest::collection::vec(frame_strategy(), 0..8),
            mut cuts in proptest::collection::vec(0usize..600, 0..20),
        ) {
            let bytes = stream(&input);
            cuts.sort_unstable();
            prop_assert_eq!(decode_in_chunks(&bytes, &cuts), input);
        }
    }
}
