//! Fixed 4-byte big-endian length-prefixed framing shared by every TCP channel.
//!
//! Wire shape: `u32_be length ‖ bytes[length]`. Unlike the variable-length
//! RustDesk header (1-4 bytes, low bits encoding header width) this agent's
//! wire contract always uses a 4-byte header, matching `qToBigEndian`/
//! `qFromBigEndian` framing in the original C++ sockets.

use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const HEADER_LEN: usize = 4;

/// Encode a message with the fixed 4-byte big-endian length prefix.
pub fn encode_frame(data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + data.len());
    buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
    buf.extend_from_slice(data);
    buf
}

fn encode_frame_into(data: &[u8], buf: &mut BytesMut) {
    buf.reserve(HEADER_LEN + data.len());
    buf.put_u32(data.len() as u32);
    buf.extend_from_slice(data);
}

/// Write one framed message and flush immediately; the relay/rendezvous
/// sockets never buffer a partial frame across calls.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    let mut buf = BytesMut::new();
    encode_frame_into(data, &mut buf);
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message from an async reader, blocking until it is complete.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<BytesMut> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await?;
    let len = u32::from_be_bytes(header) as usize;

    let mut buf = BytesMut::with_capacity(len);
    buf.resize(len, 0);
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Incremental decode state for a per-connection receive buffer, mirroring
/// the teacher's stateful `BytesCodec` shape but with a fixed header width.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameDecoder {
    state: DecodeState,
}

#[derive(Debug, Clone, Copy)]
enum DecodeState {
    Head,
    Data(usize),
}

impl Default for DecodeState {
    fn default() -> Self {
        DecodeState::Head
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to pull one complete frame out of `src`. Returns `Ok(None)` when
    /// more bytes are needed; never drops bytes belonging to a subsequent
    /// frame once the current one decodes.
    pub fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<BytesMut>> {
        let needed = match self.state {
            DecodeState::Head => match self.decode_head(src) {
                Some(n) => {
                    self.state = DecodeState::Data(n);
                    n
                }
                None => return Ok(None),
            },
            DecodeState::Data(n) => n,
        };

        if src.len() < needed {
            return Ok(None);
        }
        self.state = DecodeState::Head;
        Ok(Some(src.split_to(needed)))
    }

    fn decode_head(&self, src: &mut BytesMut) -> Option<usize> {
        if src.len() < HEADER_LEN {
            return None;
        }
        let len = u32::from_be_bytes(src[..HEADER_LEN].try_into().unwrap()) as usize;
        src.advance(HEADER_LEN);
        Some(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(data: &[u8]) {
        let encoded = encode_frame(data);
        assert_eq!(encoded.len(), 4 + data.len());
        let mut buf = BytesMut::from(&encoded[..]);
        let mut decoder = FrameDecoder::new();
        let decoded = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&decoded[..], data);
        assert!(buf.is_empty());
    }

    #[test]
    fn round_trip_empty() {
        roundtrip(&[]);
    }

    #[test]
    fn round_trip_one_byte() {
        roundtrip(&[0x42]);
    }

    #[test]
    fn round_trip_exactly_header_len() {
        roundtrip(&[1, 2, 3, 4]);
    }

    #[test]
    fn round_trip_64k_boundary() {
        roundtrip(&vec![7u8; 1 << 16]);
    }

    #[test]
    fn resync_after_partial_prefix() {
        let first = encode_frame(b"abc");
        let second = encode_frame(b"hello world");

        let mut buf = BytesMut::new();
        // Only the first 2 bytes of the header arrive.
        buf.extend_from_slice(&first[..2]);
        let mut decoder = FrameDecoder::new();
        assert!(decoder.decode(&mut buf).unwrap().is_none());

        // Rest of frame one, plus all of frame two, arrive together.
        buf.extend_from_slice(&first[2..]);
        buf.extend_from_slice(&second);

        let got_first = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&got_first[..], b"abc");
        let got_second = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&got_second[..], b"hello world");
    }

    #[test]
    fn two_frames_back_to_back() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encode_frame(b"one"));
        buf.extend_from_slice(&encode_frame(b"two"));

        let mut decoder = FrameDecoder::new();
        assert_eq!(&decoder.decode(&mut buf).unwrap().unwrap()[..], b"one");
        assert_eq!(&decoder.decode(&mut buf).unwrap().unwrap()[..], b"two");
        assert!(decoder.decode(&mut buf).unwrap().is_none());
    }
}
