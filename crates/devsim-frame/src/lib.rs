//! Self-delimiting message framing for the gateway protocol.
//!
//! Every message carries a resource identifier, a header mapping and an
//! opaque body. Frames start with:
//! - A 2-byte magic number ("DS") for stream synchronization
//! - A 1-byte message kind (request/response) and a reserved byte
//! - A 4-byte little-endian body length
//!
//! [`Decoder`] reassembles frames from arbitrarily fragmented input and
//! reports each completed [`Message`] through a completion handler.

pub mod codec;
pub mod decoder;
pub mod error;
pub mod message;
pub mod reader;
pub mod resource;
pub mod writer;

pub use codec::{decode_message, encode_message, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use decoder::{CompletionHandler, Decoder};
pub use error::{FrameError, Result};
pub use message::{Message, MessageKind};
pub use reader::FrameReader;
pub use resource::{CONTROL, DEVICE};
pub use writer::FrameWriter;
