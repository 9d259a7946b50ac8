//! Frame codec for the text wire protocol
//!
//! Inbound, [`FrameCodec`] splits the byte stream into CRLF-delimited
//! frames, carrying an incomplete trailing fragment across reads in the
//! `BytesMut` buffer. Outbound, it renders [`ClientOp`] values into their
//! wire form.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::frames::ClientOp;

/// Frame separator on the wire
pub const SEPARATOR: &[u8] = b"\r\n";

/// Maximum frame size (1 MB)
///
/// Bounds buffering when the peer never sends a separator.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Protocol codec error
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Malformed {kind} frame: {detail}")]
    BadFrame { kind: &'static str, detail: String },
}

/// Codec for one connection's byte stream.
///
/// Decoding yields raw frames with the separator stripped; assigning a
/// protocol meaning to a frame is [`crate::frames::classify`]'s job.
#[derive(Debug, Default)]
pub struct FrameCodec {
    // Bytes already scanned for a separator, so a frame arriving in many
    // small reads is not rescanned from the start each time.
    scanned: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, ProtocolError> {
        // The previously scanned tail may end in CR with the LF only now
        // arriving, so back up one byte.
        let start = self.scanned.saturating_sub(1);
        let found = src[start..]
            .windows(SEPARATOR.len())
            .position(|w| w == SEPARATOR)
            .map(|p| p + start);

        match found {
            Some(pos) => {
                let frame = src.split_to(pos).freeze();
                src.advance(SEPARATOR.len());
                self.scanned = 0;
                Ok(Some(frame))
            }
            None => {
                if src.len() > MAX_FRAME_SIZE {
                    return Err(ProtocolError::FrameTooLarge {
                        size: src.len(),
                        max: MAX_FRAME_SIZE,
                    });
                }
                self.scanned = src.len();
                Ok(None)
            }
        }
    }
}

impl Encoder<ClientOp> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, op: ClientOp, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        match op {
            ClientOp::Connect(info) => {
                let body = serde_json::to_vec(&info)?;
                dst.reserve(b"CONNECT ".len() + body.len() + SEPARATOR.len());
                dst.put_slice(b"CONNECT ");
                dst.put_slice(&body);
                dst.put_slice(SEPARATOR);
            }
            ClientOp::Pong => {
                dst.put_slice(b"PONG\r\n");
            }
            ClientOp::Pub {
                subject,
                reply,
                payload,
            } => {
                let header = match reply {
                    Some(reply) => format!("PUB {} {} {}\r\n", subject, reply, payload.len()),
                    None => format!("PUB {} {}\r\n", subject, payload.len()),
                };
                dst.reserve(header.len() + payload.len() + SEPARATOR.len());
                dst.put_slice(header.as_bytes());
                dst.put_slice(&payload);
                dst.put_slice(SEPARATOR);
            }
            ClientOp::Sub { subject, sid } => {
                dst.put_slice(format!("SUB {} {}\r\n", subject, sid).as_bytes());
            }
            ClientOp::Unsub { sid, max_msgs } => {
                let line = match max_msgs {
                    Some(max) => format!("UNSUB {} {}\r\n", sid, max),
                    None => format!("UNSUB {}\r\n", sid),
                };
                dst.put_slice(line.as_bytes());
            }
        }
        Ok(())
    }
}
