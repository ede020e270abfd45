//! NDT wire frames.
//!
//! Every message on the control channel is a small binary frame:
//! one type byte, a two-byte big-endian length, and a UTF-8 payload.
//! Except for the extended-login frame the payload is a JSON object
//! with a single `msg` field.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Deserialize;

use crate::error::{NdtError, Result};
use crate::params;

/// The twelve NDT message type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Unrecoverable communication failure.
    CommFailure = 0,
    /// Queue position or keepalive update from the server.
    SrvQueue = 1,
    /// Login handshake, also carries the scheduled test list.
    MsgLogin = 2,
    /// A sub-test is about to start; body carries the data port.
    TestPrepare = 3,
    /// A sub-test's measurement phase begins now.
    TestStart = 4,
    /// Sub-test payload message.
    TestMsg = 5,
    /// A sub-test is over.
    TestFinalize = 6,
    /// Server-side error report.
    MsgError = 7,
    /// Final results dump.
    MsgResults = 8,
    /// Server is done with the session.
    MsgLogout = 9,
    /// Client keepalive reply while queued.
    MsgWaiting = 10,
    /// Extended login (fixed legacy layout, see [`extended_login`]).
    MsgExtendedLogin = 11,
}

impl MessageType {
    /// Map a wire code to a message type. Unknown codes are rejected by
    /// [`Frame::decode`] as fatal.
    pub fn from_code(code: u8) -> Option<MessageType> {
        use MessageType::*;
        match code {
            0 => Some(CommFailure),
            1 => Some(SrvQueue),
            2 => Some(MsgLogin),
            3 => Some(TestPrepare),
            4 => Some(TestStart),
            5 => Some(TestMsg),
            6 => Some(TestFinalize),
            7 => Some(MsgError),
            8 => Some(MsgResults),
            9 => Some(MsgLogout),
            10 => Some(MsgWaiting),
            11 => Some(MsgExtendedLogin),
            _ => None,
        }
    }
}

/// A decoded NDT frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message type from the first byte.
    pub kind: MessageType,
    /// Length field from bytes 1-2. Informational only; it is not
    /// cross-checked against the actual payload size.
    pub declared_len: u16,
    /// Raw payload bytes. JSON on the control channel, opaque fill on a
    /// data connection.
    pub payload: Bytes,
}

#[derive(Deserialize)]
struct Envelope {
    msg: String,
}

impl Frame {
    /// Decode a frame from raw WebSocket message bytes.
    pub fn decode(data: &[u8]) -> Result<Frame> {
        if data.len() < 3 {
            return Err(NdtError::ProtocolViolation(format!(
                "frame too short: {} bytes",
                data.len()
            )));
        }
        let kind = MessageType::from_code(data[0]).ok_or_else(|| {
            NdtError::ProtocolViolation(format!("unknown message type {}", data[0]))
        })?;
        Ok(Frame {
            kind,
            declared_len: u16::from_be_bytes([data[1], data[2]]),
            payload: Bytes::copy_from_slice(&data[3..]),
        })
    }

    /// Extract the `msg` field of a control-channel payload.
    ///
    /// Data-connection payloads are never passed through here; they are
    /// byte-counted without parsing.
    pub fn control_text(&self) -> Result<String> {
        let text = std::str::from_utf8(&self.payload)
            .map_err(|_| NdtError::ProtocolViolation("payload is not UTF-8".into()))?;
        let envelope: Envelope = serde_json::from_str(text).map_err(|e| {
            NdtError::ProtocolViolation(format!("malformed control payload {text:?}: {e}"))
        })?;
        Ok(envelope.msg)
    }
}

/// Encode a control message: type byte, big-endian length, and the JSON
/// envelope `{ "msg": "<text>" } ` (trailing space included, as the wire
/// format has always carried it). The text is JSON-escaped, so any string
/// round-trips through [`Frame::control_text`].
pub fn encode(kind: MessageType, msg: &str) -> Result<Bytes> {
    let body = format!("{{ \"msg\": {} }} ", serde_json::to_string(msg)?);
    if body.len() > usize::from(u16::MAX) {
        return Err(NdtError::OversizeBody(body.len()));
    }
    let mut out = BytesMut::with_capacity(body.len() + 3);
    out.put_u8(kind as u8);
    out.put_u16(body.len() as u16);
    out.put_slice(body.as_bytes());
    Ok(out.freeze())
}

// The legacy login layout predates the JSON envelope and must be produced
// byte-for-byte, leading space included. The single 'X' placeholder
// carries the test-selection mask.
const LOGIN_TEMPLATE: &[u8] = b" { \"msg\": \"Xv3.5.5\" }";

/// Build the MSG_EXTENDED_LOGIN frame for the given test-selection mask.
///
/// The status bit ([`params::TEST_STATUS`]) is always added: a v3.5.5+
/// client must accept server status updates.
pub fn extended_login(test_mask: u8) -> Bytes {
    let mut out = BytesMut::with_capacity(LOGIN_TEMPLATE.len() + 3);
    out.put_u8(MessageType::MsgExtendedLogin as u8);
    out.put_u16(LOGIN_TEMPLATE.len() as u16);
    for &b in LOGIN_TEMPLATE {
        out.put_u8(if b == b'X' {
            test_mask | params::TEST_STATUS
        } else {
            b
        });
    }
    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_all_types() {
        for code in 0u8..=11 {
            let kind = MessageType::from_code(code).unwrap();
            let bytes = encode(kind, "hello world").unwrap();
            let frame = Frame::decode(&bytes).unwrap();
            assert_eq!(frame.kind, kind);
            assert_eq!(frame.control_text().unwrap(), "hello world");
        }
    }

    #[test]
    fn round_trip_escapes_specials() {
        // Multi-line result bodies and quotes must survive the envelope.
        for msg in [
            "MinRTT: 420\nCountRTT: 17",
            "quote \" and backslash \\",
            "trailing tab\t",
        ] {
            let bytes = encode(MessageType::TestMsg, msg).unwrap();
            let frame = Frame::decode(&bytes).unwrap();
            assert_eq!(frame.control_text().unwrap(), msg);
        }
    }

    #[test]
    fn encoded_layout() {
        let bytes = encode(MessageType::TestMsg, "42").unwrap();
        let body = br#"{ "msg": "42" } "#;
        assert_eq!(bytes[0], 5);
        assert_eq!(&bytes[1..3], &(body.len() as u16).to_be_bytes());
        assert_eq!(&bytes[3..], body);
    }

    #[test]
    fn unknown_type_is_fatal() {
        let err = Frame::decode(&[12, 0, 0]).unwrap_err();
        assert!(matches!(err, NdtError::ProtocolViolation(_)));
    }

    #[test]
    fn short_frame_is_fatal() {
        assert!(Frame::decode(&[5, 0]).is_err());
    }

    #[test]
    fn declared_length_is_informational() {
        // Length field disagrees with the actual payload; decoding still
        // succeeds and keeps the field as sent.
        let frame = Frame::decode(&[5, 0, 99, b'{', b'}']).unwrap();
        assert_eq!(frame.declared_len, 99);
        assert_eq!(frame.payload.len(), 2);
    }

    #[test]
    fn oversize_body_rejected() {
        let msg = "x".repeat(70_000);
        assert!(matches!(
            encode(MessageType::TestMsg, &msg),
            Err(NdtError::OversizeBody(_))
        ));
    }

    #[test]
    fn login_frame_layout() {
        let mask = params::TEST_C2S | params::TEST_S2C | params::TEST_META;
        let bytes = extended_login(mask);
        assert_eq!(bytes.len(), 24);
        assert_eq!(bytes[0], 11);
        assert_eq!(&bytes[1..3], &[0, 21]);
        // Body matches the template with the placeholder substituted.
        assert_eq!(&bytes[3..14], &LOGIN_TEMPLATE[..11]);
        assert_eq!(bytes[14], mask | params::TEST_STATUS);
        assert_eq!(&bytes[15..], &LOGIN_TEMPLATE[12..]);
    }

    #[test]
    fn login_always_sets_status_bit() {
        for mask in [0u8, 2, 4, 32, 2 | 4, 2 | 4 | 32] {
            let bytes = extended_login(mask);
            assert_eq!(bytes[14], mask | 16);
        }
    }
}
