use std::collections::HashMap;

use bytes::{Bytes, BytesMut};

use crate::codec::{encode_message, HEADER_SIZE};
use crate::error::Result;

/// Direction of a protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Request,
    Response,
}

impl MessageKind {
    /// Wire tag of this kind.
    pub fn as_u8(self) -> u8 {
        match self {
            MessageKind::Request => 0,
            MessageKind::Response => 1,
        }
    }

    /// Parse a wire tag.
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(MessageKind::Request),
            1 => Some(MessageKind::Response),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Request => "request",
            MessageKind::Response => "response",
        }
    }
}

/// One decoded protocol unit: a resource, a header mapping and an opaque body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    /// Resource the message is addressed to (e.g. `device`, `control`).
    pub resource: String,
    /// Header mapping; keys are unique, order is irrelevant.
    pub headers: HashMap<String, String>,
    /// Opaque body, usually a JSON-RPC envelope.
    pub body: Bytes,
}

impl Message {
    /// Create a request with no headers.
    pub fn request(resource: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::new(MessageKind::Request, resource, body)
    }

    /// Create a response with no headers.
    pub fn response(resource: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::new(MessageKind::Response, resource, body)
    }

    pub fn new(kind: MessageKind, resource: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            kind,
            resource: resource.into(),
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Builder-style header insertion. A repeated key replaces the old value.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    pub fn is_request(&self) -> bool {
        self.kind == MessageKind::Request
    }

    pub fn is_response(&self) -> bool {
        self.kind == MessageKind::Response
    }

    /// Size of the encoded frame body (everything after the fixed header).
    pub fn body_wire_size(&self) -> usize {
        let headers: usize = self
            .headers
            .iter()
            .map(|(k, v)| 4 + k.len() + v.len())
            .sum();
        2 + self.resource.len() + 2 + headers + self.body.len()
    }

    /// The total wire size of this message (fixed header + body).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.body_wire_size()
    }

    /// Serialize into a self-delimiting buffer ready for transmission.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.wire_size());
        encode_message(self, &mut buf)?;
        Ok(buf.freeze())
    }
}
