//! Blocking reader for the gateway end of a link.
//!
//! Fake gateways, the session tests and other tooling that plays the
//! gateway read the simulator's frames with this. The simulator itself never
//! blocks on a socket; its multiplexer feeds a [`Decoder`](crate::Decoder).

use std::io::{ErrorKind, Read};

use bytes::BytesMut;

use crate::codec::{decode_message, FrameConfig};
use crate::error::{FrameError, Result};
use crate::message::Message;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete messages from a blocking `Read` stream.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_message(&mut self) -> Result<Message> {
        loop {
            if let Some(msg) = decode_message(&mut self.buf, self.config.max_payload_size)? {
                return Ok(msg);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::codec::{encode_message, MAGIC};

    #[test]
    fn read_multiple_messages() {
        let mut wire = BytesMut::new();
        encode_message(&Message::request("device", "one"), &mut wire).unwrap();
        encode_message(&Message::response("device", "two"), &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let m1 = reader.read_message().unwrap();
        let m2 = reader.read_message().unwrap();

        assert_eq!((m1.is_request(), m1.body.as_ref()), (true, b"one".as_ref()));
        assert_eq!((m2.is_response(), m2.body.as_ref()), (true, b"two".as_ref()));
    }

    #[test]
    fn read_message_with_large_body() {
        let body = vec![0xAB; 64 * 1024];
        let mut wire = BytesMut::new();
        encode_message(&Message::request("device", body.clone()), &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let msg = reader.read_message().unwrap();
        assert_eq!(msg.body.as_ref(), body.as_slice());
    }

    #[test]
    fn oversized_announced_body_is_rejected() {
        let mut wire = BytesMut::new();
        encode_message(&Message::request("device", vec![0u8; 128]), &mut wire).unwrap();

        let config = FrameConfig {
            max_payload_size: 64,
        };
        let mut reader = FrameReader::with_config(Cursor::new(wire.to_vec()), config);
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { max: 64, .. }));
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let mut partial = BytesMut::new();
        partial.put_slice(&MAGIC);
        partial.put_u8(0);
        partial.put_u8(0);
        partial.put_u32_le(16);
        partial.put_slice(b"only-part");

        let mut reader = FrameReader::new(Cursor::new(partial.to_vec()));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn interrupted_read_retries() {
        let mut wire = BytesMut::new();
        encode_message(&Message::request("control", "ok"), &mut wire).unwrap();

        let reader = InterruptedThenData {
            interrupted: false,
            inner: Cursor::new(wire.to_vec()),
        };
        let mut framed = FrameReader::new(reader);
        let msg = framed.read_message().unwrap();
        assert_eq!(msg.resource, "control");
    }

    struct InterruptedThenData {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }

    #[test]
    fn roundtrip_over_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        writer
            .write_message(&Message::request("device", "ping").with_header("x", "1"))
            .unwrap();
        let msg = reader.read_message().unwrap();
        assert_eq!(msg.header("x"), Some("1"));
        assert_eq!(msg.body.as_ref(), b"ping");
    }
}
