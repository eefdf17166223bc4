use bytes::BytesMut;
use tracing::{trace, warn};

use crate::codec::{decode_message, FrameConfig};
use crate::error::{FrameError, Result};
use crate::message::Message;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Completion handler invoked once per reassembled message.
///
/// Runs on whichever thread calls [`Decoder::parse`]; it must not block.
pub type CompletionHandler = Box<dyn FnMut(Message) + Send>;

/// Incremental frame reassembler.
///
/// Bytes are pushed in with [`parse`](Decoder::parse) in whatever chunks the
/// socket delivers; every frame that becomes complete is handed to the
/// completion handler in arrival order. A frame boundary may fall anywhere,
/// and one call may complete any number of frames.
///
/// A decode error poisons the decoder: the stream position is lost, so every
/// later call fails with [`FrameError::Poisoned`].
pub struct Decoder {
    buf: BytesMut,
    config: FrameConfig,
    on_message: CompletionHandler,
    poisoned: bool,
}

impl Decoder {
    /// Create a decoder with default configuration.
    pub fn new(on_message: impl FnMut(Message) + Send + 'static) -> Self {
        Self::with_config(FrameConfig::default(), on_message)
    }

    /// Create a decoder with explicit configuration.
    pub fn with_config(config: FrameConfig, on_message: impl FnMut(Message) + Send + 'static) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            on_message: Box::new(on_message),
            poisoned: false,
        }
    }

    /// Append `bytes` and emit every message they complete.
    ///
    /// Returns the number of messages completed by this call.
    pub fn parse(&mut self, bytes: &[u8]) -> Result<usize> {
        if self.poisoned {
            return Err(FrameError::Poisoned);
        }

        self.buf.extend_from_slice(bytes);
        let mut completed = 0usize;
        loop {
            match decode_message(&mut self.buf, self.config.max_payload_size) {
                Ok(Some(message)) => {
                    trace!(
                        kind = message.kind.as_str(),
                        resource = %message.resource,
                        body_len = message.body.len(),
                        "message reassembled"
                    );
                    completed += 1;
                    (self.on_message)(message);
                }
                Ok(None) => return Ok(completed),
                Err(err) => {
                    warn!(error = %err, buffered = self.buf.len(), "frame decode failed");
                    self.poisoned = true;
                    self.buf.clear();
                    return Err(err);
                }
            }
        }
    }

    /// Bytes held for a frame that is not complete yet.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("buffered", &self.buf.len())
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use bytes::{BufMut, BytesMut};
    use proptest::prelude::*;

    use super::*;
    use crate::codec::{encode_message, MAGIC};

    fn collecting_decoder() -> (Decoder, Arc<Mutex<Vec<Message>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let decoder = Decoder::new(move |msg| sink.lock().unwrap().push(msg));
        (decoder, seen)
    }

    fn wire(messages: &[Message]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for msg in messages {
            encode_message(msg, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn three_chunks_complete_once_after_last() {
        let msg = Message::request("control", "{\"method\":\"power_on\"}").with_header("a", "b");
        let bytes = wire(std::slice::from_ref(&msg));
        let (mut decoder, seen) = collecting_decoder();

        let third = bytes.len() / 3;
        assert_eq!(decoder.parse(&bytes[..third]).unwrap(), 0);
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(decoder.parse(&bytes[third..2 * third]).unwrap(), 0);
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(decoder.parse(&bytes[2 * third..]).unwrap(), 1);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], msg);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn several_messages_in_one_call() {
        let msgs = vec![
            Message::request("control", "one"),
            Message::response("device", "two"),
            Message::request("control", "three"),
        ];
        let (mut decoder, seen) = collecting_decoder();
        assert_eq!(decoder.parse(&wire(&msgs)).unwrap(), 3);
        assert_eq!(*seen.lock().unwrap(), msgs);
    }

    #[test]
    fn byte_by_byte_delivery() {
        let msgs = vec![Message::request("a", "x"), Message::response("b", "yy")];
        let bytes = wire(&msgs);
        let (mut decoder, seen) = collecting_decoder();
        for byte in &bytes {
            decoder.parse(std::slice::from_ref(byte)).unwrap();
        }
        assert_eq!(*seen.lock().unwrap(), msgs);
    }

    #[test]
    fn error_poisons_decoder() {
        let (mut decoder, seen) = collecting_decoder();
        let err = decoder.parse(&[0u8; 8]).unwrap_err();
        assert!(matches!(err, FrameError::InvalidMagic));
        assert!(decoder.is_poisoned());

        let good = wire(&[Message::request("a", "b")]);
        let err = decoder.parse(&good).unwrap_err();
        assert!(matches!(err, FrameError::Poisoned));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn messages_before_error_are_delivered() {
        let mut bytes = wire(&[Message::request("a", "ok")]);
        bytes.extend_from_slice(&[0xEE; 8]);
        let (mut decoder, seen) = collecting_decoder();
        assert!(decoder.parse(&bytes).is_err());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn oversized_frame_rejected() {
        let mut header = BytesMut::new();
        header.put_slice(&MAGIC);
        header.put_u8(0);
        header.put_u8(0);
        header.put_u32_le(1024);

        let cfg = FrameConfig {
            max_payload_size: 16,
        };
        let mut decoder = Decoder::with_config(cfg, |_| {});
        let err = decoder.parse(&header).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }

    fn arb_message() -> impl Strategy<Value = Message> {
        (
            any::<bool>(),
            "[a-z]{0,12}",
            proptest::collection::hash_map("[a-z-]{1,8}", "[ -~]{0,16}", 0..4),
            proptest::collection::vec(any::<u8>(), 0..64),
        )
            .prop_map(|(req, resource, headers, body)| {
                let mut msg = if req {
                    Message::request(resource, body)
                } else {
                    Message::response(resource, body)
                };
                msg.headers = headers;
                msg
            })
    }

    proptest! {
        #[test]
        fn any_fragmentation_yields_all_messages_in_order(
            msgs in proptest::collection::vec(arb_message(), 1..8),
            cuts in proptest::collection::vec(any::<usize>(), 0..16),
        ) {
            let bytes = wire(&msgs);
            let mut points: Vec<usize> = cuts.iter().map(|c| c % (bytes.len() + 1)).collect();
            points.push(0);
            points.push(bytes.len());
            points.sort_unstable();
            points.dedup();

            let (mut decoder, seen) = collecting_decoder();
            let mut total = 0usize;
            for window in points.windows(2) {
                total += decoder.parse(&bytes[window[0]..window[1]]).unwrap();
            }

            prop_assert_eq!(total, msgs.len());
            prop_assert_eq!(&*seen.lock().unwrap(), &msgs);
            prop_assert_eq!(decoder.buffered(), 0);
        }
    }
}
