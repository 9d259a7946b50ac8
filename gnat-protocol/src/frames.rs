//! Inbound frame classification and outbound operations

use bytes::Bytes;

use crate::codec::ProtocolError;
use crate::types::{ConnectInfo, ServerInfo};

/// Operations the client writes to the server
#[derive(Debug, Clone)]
pub enum ClientOp {
    /// Handshake reply to the server's INFO frame
    Connect(ConnectInfo),

    /// Keepalive reply
    Pong,

    /// Publish a payload on a subject, optionally asking for a reply
    Pub {
        subject: String,
        reply: Option<String>,
        payload: Bytes,
    },

    /// Subscribe to a subject under a client-chosen sid
    Sub { subject: String, sid: u64 },

    /// Unsubscribe, optionally after `max_msgs` more deliveries
    Unsub { sid: u64, max_msgs: Option<u64> },
}

/// One classified inbound frame
#[derive(Debug, Clone)]
pub enum ServerFrame {
    /// Server identity/capability object, first frame of a connection
    Info(ServerInfo),
    /// Keepalive probe, must be answered with PONG
    Ping,
    /// Keepalive reply, ignored
    Pong,
    /// Acknowledgement, ignored
    Ok,
    /// Non-fatal protocol warning from the server
    Err(String),
    /// Message announcement; the payload arrives as the next frame
    Msg(MsgHeader),
    /// Payload belonging to the most recent announcement
    Payload(Bytes),
}

/// Parsed `MSG` announcement header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsgHeader {
    pub subject: String,
    pub sid: u64,
    pub reply: Option<String>,
    /// Declared payload length. Informational only: the payload boundary
    /// is the next separator, not this count.
    pub declared_len: usize,
}

impl MsgHeader {
    /// Parse `MSG <subject> <sid> [<reply>] <len>`
    fn parse(frame: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(frame).map_err(|e| ProtocolError::BadFrame {
            kind: "MSG",
            detail: format!("header is not UTF-8: {}", e),
        })?;

        let fields: Vec<&str> = text.split_ascii_whitespace().collect();
        let (subject, sid, reply, len) = match fields.as_slice() {
            ["MSG", subject, sid, len] => (*subject, *sid, None, *len),
            ["MSG", subject, sid, reply, len] => (*subject, *sid, Some(*reply), *len),
            _ => {
                return Err(ProtocolError::BadFrame {
                    kind: "MSG",
                    detail: format!("expected 4 or 5 fields, got {}: {:?}", fields.len(), text),
                })
            }
        };

        let sid = sid.parse().map_err(|_| ProtocolError::BadFrame {
            kind: "MSG",
            detail: format!("bad sid {:?}", sid),
        })?;
        let declared_len = len.parse().map_err(|_| ProtocolError::BadFrame {
            kind: "MSG",
            detail: format!("bad byte count {:?}", len),
        })?;

        Ok(Self {
            subject: subject.to_string(),
            sid,
            reply: reply.map(str::to_string),
            declared_len,
        })
    }
}

/// Classify one complete frame.
///
/// Pure function of the frame and the caller-owned pending-announcement
/// flag: `awaiting_payload` is true when the previous frame was a `MSG`
/// announcement whose payload has not arrived yet. Recognized tokens are
/// checked first, case-sensitively, so a control frame interleaved between
/// an announcement and its payload is still handled as a control frame.
pub fn classify(frame: &Bytes, awaiting_payload: bool) -> Result<ServerFrame, ProtocolError> {
    let bytes: &[u8] = frame.as_ref();

    if bytes == b"PING" {
        Ok(ServerFrame::Ping)
    } else if bytes == b"PONG" {
        Ok(ServerFrame::Pong)
    } else if bytes == b"+OK" {
        Ok(ServerFrame::Ok)
    } else if let Some(rest) = bytes.strip_prefix(b"-ERR") {
        Ok(ServerFrame::Err(
            String::from_utf8_lossy(rest).trim().to_string(),
        ))
    } else if let Some(rest) = bytes.strip_prefix(b"INFO ") {
        let info: ServerInfo = serde_json::from_slice(rest)?;
        Ok(ServerFrame::Info(info))
    } else if bytes.starts_with(b"MSG ") {
        Ok(ServerFrame::Msg(MsgHeader::parse(bytes)?))
    } else if awaiting_payload {
        Ok(ServerFrame::Payload(frame.clone()))
    } else {
        Err(ProtocolError::BadFrame {
            kind: "unknown",
            detail: format!("unrecognized frame: {:?}", String::from_utf8_lossy(bytes)),
        })
    }
}
