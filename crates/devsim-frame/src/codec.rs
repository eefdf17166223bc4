use std::collections::HashMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::message::{Message, MessageKind};

/// Frame header: magic (2) + kind (1) + reserved (1) + body length (4) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Magic bytes: "DS" (0x44 0x53).
pub const MAGIC: [u8; 2] = [0x44, 0x53];

/// Default maximum frame body size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

const MAX_FIELD_LEN: usize = u16::MAX as usize;

/// Encode a message into the wire format.
///
/// Wire format (all integers little-endian):
/// ```text
/// ┌────────────┬──────────┬──────────┬────────────┬──────────────────────┐
/// │ Magic (2B) │ Kind (1B)│ Rsvd (1B)│ BodyLen 4B │ Body (BodyLen bytes) │
/// │ "DS"       │ 0 req    │ 0        │            │                      │
/// │            │ 1 resp   │          │            │                      │
/// └────────────┴──────────┴──────────┴────────────┴──────────────────────┘
///
/// Body:
///   resource_len (2B) resource
///   header_count (2B)
///   header_count × [ key_len (2B) key  value_len (2B) value ]
///   payload (rest of body)
/// ```
///
/// Headers are written in key order so equal messages encode identically.
pub fn encode_message(msg: &Message, dst: &mut BytesMut) -> Result<()> {
    check_field("resource", msg.resource.len())?;
    if msg.headers.len() > MAX_FIELD_LEN {
        return Err(FrameError::TooManyHeaders(msg.headers.len()));
    }
    let mut headers: Vec<(&String, &String)> = msg.headers.iter().collect();
    headers.sort();
    for (key, value) in &headers {
        check_field("header key", key.len())?;
        check_field("header value", value.len())?;
    }

    let body_len = msg.body_wire_size();
    if body_len > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: body_len,
            max: u32::MAX as usize,
        });
    }

    dst.reserve(HEADER_SIZE + body_len);
    dst.put_slice(&MAGIC);
    dst.put_u8(msg.kind.as_u8());
    dst.put_u8(0);
    dst.put_u32_le(body_len as u32);

    dst.put_u16_le(msg.resource.len() as u16);
    dst.put_slice(msg.resource.as_bytes());
    dst.put_u16_le(headers.len() as u16);
    for (key, value) in headers {
        dst.put_u16_le(key.len() as u16);
        dst.put_slice(key.as_bytes());
        dst.put_u16_le(value.len() as u16);
        dst.put_slice(value.as_bytes());
    }
    dst.put_slice(&msg.body);
    Ok(())
}

/// Decode one message from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_message(src: &mut BytesMut, max_payload: usize) -> Result<Option<Message>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    if src[0..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }
    let kind = MessageKind::from_u8(src[2]).ok_or(FrameError::UnknownKind(src[2]))?;
    if src[3] != 0 {
        return Err(FrameError::Malformed(format!(
            "reserved byte is {:#04x}",
            src[3]
        )));
    }

    let body_len = u32::from_le_bytes([src[4], src[5], src[6], src[7]]) as usize;
    if body_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: body_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + body_len;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let body = src.split_to(body_len).freeze();
    decode_body(kind, body).map(Some)
}

fn decode_body(kind: MessageKind, mut body: Bytes) -> Result<Message> {
    let resource = take_string(&mut body, "resource")?;

    let count = take_u16(&mut body, "header count")? as usize;
    let mut headers = HashMap::with_capacity(count);
    for _ in 0..count {
        let key = take_string(&mut body, "header key")?;
        let value = take_string(&mut body, "header value")?;
        if headers.contains_key(&key) {
            return Err(FrameError::DuplicateHeader(key));
        }
        headers.insert(key, value);
    }

    Ok(Message {
        kind,
        resource,
        headers,
        body,
    })
}

fn take_u16(body: &mut Bytes, field: &'static str) -> Result<u16> {
    if body.remaining() < 2 {
        return Err(FrameError::Malformed(format!("truncated {field} length")));
    }
    Ok(body.get_u16_le())
}

fn take_string(body: &mut Bytes, field: &'static str) -> Result<String> {
    let len = take_u16(body, field)? as usize;
    if body.remaining() < len {
        return Err(FrameError::Malformed(format!(
            "{field} claims {len} bytes, {} remain",
            body.remaining()
        )));
    }
    let raw = body.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| FrameError::InvalidUtf8(field))
}

fn check_field(field: &'static str, len: usize) -> Result<()> {
    if len > MAX_FIELD_LEN {
        return Err(FrameError::FieldTooLong { field, len });
    }
    Ok(())
}

/// Limits applied when encoding or decoding frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameConfig {
    /// Maximum frame body size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}
