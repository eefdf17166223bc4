//! Transport multiplexer: the readiness loop that owns all socket I/O.

use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Buf, Bytes};
use devsim_frame::{Decoder, FrameConfig, Message};
use devsim_transport::{waker_pair, Connection, Interest, Selector, Token, WakeReceiver, Waker};
use tracing::{debug, info, trace, warn};

use crate::error::MultiplexerError;
use crate::lifecycle::{ConnectionId, Registry};
use crate::queue::Queue;

/// Receive chunk size used when none is configured.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 8192;

const WAKER_TOKEN: Token = Token(u64::MAX);

/// Item carried from the multiplexer thread to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A fully reassembled message.
    Message(Message),
    /// The last connection closed; the gateway link is down.
    LinkDown,
}

/// Multiplexer tuning.
#[derive(Debug, Clone)]
pub struct MultiplexerConfig {
    /// Upper bound on bytes taken from a socket per read-ready event.
    pub read_chunk_size: usize,
    /// Frame limits applied to every connection's decoder.
    pub frame: FrameConfig,
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            frame: FrameConfig::default(),
        }
    }
}

/// Cross-thread handle that asks a running multiplexer to stop.
#[derive(Debug, Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
    waker: Waker,
}

impl StopHandle {
    /// Set the stop flag and interrupt the current wait.
    ///
    /// The loop observes the flag at the top of its next iteration, then
    /// closes every remaining connection.
    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
        if let Err(err) = self.waker.wake() {
            warn!(error = %err, "failed to wake multiplexer");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

enum Status {
    Open,
    Closed,
}

/// Drives reads and writes for every registered connection.
///
/// Construct it, [`register`](Multiplexer::register) at least one connection,
/// then call [`run`](Multiplexer::run) on a dedicated thread. Decoded
/// messages land on the inbound queue; outbound buffers are taken from the
/// outbound queue one per write-ready event.
pub struct Multiplexer {
    registry: Registry,
    selector: Selector,
    wake_rx: WakeReceiver,
    waker: Waker,
    stop: Arc<AtomicBool>,
    outbound: Queue<Bytes>,
    inbound: Queue<InboundEvent>,
    config: MultiplexerConfig,
    read_buf: Vec<u8>,
}

impl Multiplexer {
    pub fn new(
        outbound: Queue<Bytes>,
        inbound: Queue<InboundEvent>,
        config: MultiplexerConfig,
    ) -> devsim_transport::Result<Self> {
        let (waker, wake_rx) = waker_pair()?;
        Ok(Self {
            registry: Registry::new(),
            selector: Selector::new(),
            wake_rx,
            waker,
            stop: Arc::new(AtomicBool::new(false)),
            outbound,
            inbound,
            read_buf: vec![0u8; config.read_chunk_size.max(1)],
            config,
        })
    }

    /// Add a connection with read and write interest armed.
    pub fn register(&mut self, connection: Connection) -> ConnectionId {
        let inbound = self.inbound.clone();
        let decoder = Decoder::with_config(self.config.frame.clone(), move |msg| {
            inbound.put(InboundEvent::Message(msg));
        });
        let id = self.registry.insert(connection, decoder);
        info!(%id, "connection added to multiplexer");
        id
    }

    /// Handle for stopping the loop from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            flag: Arc::clone(&self.stop),
            waker: self.waker.clone(),
        }
    }

    /// Waker to signal after queueing outbound data.
    pub fn waker(&self) -> Waker {
        self.waker.clone()
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Run the readiness loop until stopped or until the last connection
    /// closes.
    ///
    /// Returns [`MultiplexerError::NoConnections`] immediately when nothing
    /// is registered, so a finished multiplexer needs a fresh
    /// [`register`](Self::register) before it can run again.
    pub fn run(&mut self) -> Result<(), MultiplexerError> {
        if self.registry.is_empty() {
            return Err(MultiplexerError::NoConnections);
        }
        info!(connections = self.registry.len(), "multiplexer running");

        loop {
            if self.stop.load(Ordering::SeqCst) {
                let closed = self.registry.drain();
                info!(closed, "multiplexer stopped on request");
                return Ok(());
            }

            self.prepare_selector();
            let events = match self.selector.select(None) {
                Ok(events) => events,
                Err(err) => {
                    warn!(error = %err, "readiness selection failed");
                    self.registry.drain();
                    self.inbound.put(InboundEvent::LinkDown);
                    return Err(MultiplexerError::Poll(err));
                }
            };

            for event in events {
                if event.token == WAKER_TOKEN {
                    if let Err(err) = self.wake_rx.drain() {
                        warn!(error = %err, "failed to drain waker");
                    }
                    continue;
                }

                let id = ConnectionId(event.token.0);
                let readiness = event.readiness;
                if readiness.invalid {
                    warn!(%id, "descriptor reported invalid");
                    self.registry.close(id);
                } else {
                    let mut status = Status::Open;
                    if readiness.readable {
                        status = self.handle_readable(id);
                    }
                    if readiness.writable && matches!(status, Status::Open) {
                        self.handle_writable(id);
                    }
                }

                if self.registry.is_empty() {
                    info!("last connection closed, link down");
                    self.inbound.put(InboundEvent::LinkDown);
                    return Ok(());
                }
            }
        }
    }

    fn prepare_selector(&mut self) {
        let outbound_waiting = !self.outbound.is_empty();
        self.selector.clear();
        self.selector
            .add(WAKER_TOKEN, self.wake_rx.as_raw_fd(), Interest::READABLE);
        for tracked in self.registry.iter() {
            self.selector.add(
                tracked.id.token(),
                tracked.connection.as_raw_fd(),
                tracked.interest(outbound_waiting),
            );
        }
    }

    /// One receive call; zero bytes is an orderly close.
    fn handle_readable(&mut self, id: ConnectionId) -> Status {
        let Some(tracked) = self.registry.get_mut(id) else {
            return Status::Closed;
        };

        match tracked.connection.read(&mut self.read_buf) {
            Ok(0) => {
                info!(%id, "gateway closed the connection");
                tracked.alive = false;
            }
            Ok(n) => {
                trace!(%id, bytes = n, "received");
                match tracked.decoder.parse(&self.read_buf[..n]) {
                    Ok(_) => return Status::Open,
                    Err(err) => {
                        warn!(%id, error = %err, "undecodable stream, dropping connection");
                        tracked.alive = false;
                    }
                }
            }
            Err(err) if is_transient(&err) => return Status::Open,
            Err(err) => {
                warn!(%id, error = %err, "read failed, dropping connection");
                tracked.alive = false;
            }
        }

        self.registry.close(id);
        Status::Closed
    }

    /// Send from the connection's unsent remainder, or start on the next
    /// queued buffer. Whatever one send leaves over stays pending.
    fn handle_writable(&mut self, id: ConnectionId) -> Status {
        let Some(tracked) = self.registry.get_mut(id) else {
            return Status::Closed;
        };

        if tracked.pending.is_empty() {
            match self.outbound.get_nonblocking() {
                Some(buf) => tracked.pending.extend_from_slice(&buf),
                None => return Status::Open,
            }
        }

        match tracked.connection.write(&tracked.pending) {
            Ok(0) => {
                warn!(%id, "connection accepted no bytes, dropping");
                tracked.alive = false;
            }
            Ok(n) => {
                tracked.pending.advance(n);
                if tracked.pending.is_empty() {
                    trace!(%id, bytes = n, "sent");
                } else {
                    debug!(%id, sent = n, remaining = tracked.pending.len(), "partial write");
                }
                return Status::Open;
            }
            Err(err) if is_transient(&err) => return Status::Open,
            Err(err) => {
                warn!(%id, error = %err, "write failed, dropping connection");
                tracked.alive = false;
            }
        }

        self.registry.close(id);
        Status::Closed
    }
}

impl std::fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multiplexer")
            .field("connections", &self.registry.len())
            .field("stopped", &self.stop.load(Ordering::SeqCst))
            .field("config", &self.config)
            .finish()
    }
}

fn is_transient(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted)
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;
    use std::thread;
    use std::time::Duration;

    use bytes::BytesMut;
    use devsim_frame::{encode_message, FrameReader};

    use super::*;

    fn mux() -> (Multiplexer, Queue<Bytes>, Queue<InboundEvent>) {
        let outbound = Queue::new();
        let inbound = Queue::new();
        let mux = Multiplexer::new(outbound.clone(), inbound.clone(), MultiplexerConfig::default())
            .unwrap();
        (mux, outbound, inbound)
    }

    fn nonblocking_pair() -> (Connection, UnixStream) {
        let (left, right) = UnixStream::pair().unwrap();
        left.set_nonblocking(true).unwrap();
        (Connection::from_unix(left, "pair"), right)
    }

    fn drain(inbound: &Queue<InboundEvent>) -> Vec<InboundEvent> {
        std::iter::from_fn(|| inbound.get_nonblocking()).collect()
    }

    #[test]
    fn run_without_connections_fails() {
        let (mut mux, _, _) = mux();
        assert!(matches!(mux.run(), Err(MultiplexerError::NoConnections)));
    }

    #[test]
    fn orderly_close_emits_one_link_down_and_terminates() {
        let (mut mux, _outbound, inbound) = mux();
        let (conn, gateway) = nonblocking_pair();
        mux.register(conn);
        drop(gateway);

        mux.run().unwrap();
        assert_eq!(drain(&inbound), vec![InboundEvent::LinkDown]);
        assert_eq!(mux.connection_count(), 0);

        // Not re-enterable without a fresh registration.
        assert!(matches!(mux.run(), Err(MultiplexerError::NoConnections)));
        assert!(inbound.is_empty());
    }

    #[test]
    fn fragmented_inbound_messages_arrive_in_order() {
        let (mut mux, _outbound, inbound) = mux();
        let (conn, mut gateway) = nonblocking_pair();
        mux.register(conn);

        let first = Message::request("control", "{\"method\":\"power_on\"}");
        let second = Message::response("device", "{\"result\":true,\"id\":1}");
        let mut wire = BytesMut::new();
        encode_message(&first, &mut wire).unwrap();
        encode_message(&second, &mut wire).unwrap();

        let writer = thread::spawn(move || {
            for chunk in wire.chunks(5) {
                gateway.write_all(chunk).unwrap();
                thread::sleep(Duration::from_millis(1));
            }
        });

        let handle = thread::spawn(move || {
            mux.run().unwrap();
            mux
        });
        writer.join().unwrap();
        let _mux = handle.join().unwrap();

        assert_eq!(
            drain(&inbound),
            vec![
                InboundEvent::Message(first),
                InboundEvent::Message(second),
                InboundEvent::LinkDown,
            ]
        );
    }

    #[test]
    fn outbound_buffers_are_sent_in_order() {
        let (mut mux, outbound, inbound) = mux();
        let (conn, gateway) = nonblocking_pair();
        mux.register(conn);

        outbound.put(Message::request("device", "one").to_bytes().unwrap());
        outbound.put(Message::request("device", "two").to_bytes().unwrap());

        let handle = thread::spawn(move || mux.run());

        let mut reader = FrameReader::new(gateway);
        assert_eq!(reader.read_message().unwrap().body.as_ref(), b"one");
        assert_eq!(reader.read_message().unwrap().body.as_ref(), b"two");
        drop(reader);

        handle.join().unwrap().unwrap();
        assert!(outbound.is_empty());
        assert_eq!(drain(&inbound), vec![InboundEvent::LinkDown]);
    }

    #[test]
    fn partial_writes_keep_remainder_ahead_of_next_buffer() {
        let (mut mux, outbound, _inbound) = mux();
        let (conn, gateway) = nonblocking_pair();
        mux.register(conn);

        // Far larger than a socket buffer, so sends come back short.
        let big = vec![0x5A; 4 * 1024 * 1024];
        outbound.put(Message::request("device", big.clone()).to_bytes().unwrap());
        outbound.put(Message::request("device", "after").to_bytes().unwrap());

        let handle = thread::spawn(move || mux.run());

        let mut reader = FrameReader::new(gateway);
        let first = reader.read_message().unwrap();
        assert_eq!(first.body.len(), big.len());
        assert!(first.body.iter().all(|b| *b == 0x5A));
        assert_eq!(reader.read_message().unwrap().body.as_ref(), b"after");
        drop(reader);

        handle.join().unwrap().unwrap();
    }

    #[test]
    fn queued_data_after_start_is_sent() {
        let (mut mux, outbound, _inbound) = mux();
        let (conn, gateway) = nonblocking_pair();
        mux.register(conn);
        let waker = mux.waker();

        let handle = thread::spawn(move || mux.run());
        thread::sleep(Duration::from_millis(20));

        outbound.put(Message::request("device", "late").to_bytes().unwrap());
        waker.wake().unwrap();

        let mut reader = FrameReader::new(gateway);
        assert_eq!(reader.read_message().unwrap().body.as_ref(), b"late");
        drop(reader);
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn stop_wakes_idle_loop_and_closes_connections() {
        let (mut mux, _outbound, inbound) = mux();
        let (conn, mut gateway) = nonblocking_pair();
        mux.register(conn);
        let stop = mux.stop_handle();

        let handle = thread::spawn(move || {
            let result = mux.run();
            (result, mux.connection_count())
        });
        thread::sleep(Duration::from_millis(20));
        stop.stop();
        assert!(stop.is_stopped());

        let (result, remaining) = handle.join().unwrap();
        result.unwrap();
        assert_eq!(remaining, 0);
        assert!(inbound.is_empty(), "explicit stop must not report link down");

        let mut buf = [0u8; 8];
        assert_eq!(gateway.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn decode_error_drops_connection() {
        let (mut mux, _outbound, inbound) = mux();
        let (conn, mut gateway) = nonblocking_pair();
        mux.register(conn);

        gateway.write_all(&[0xEE; 16]).unwrap();
        mux.run().unwrap();

        assert_eq!(drain(&inbound), vec![InboundEvent::LinkDown]);
        let mut buf = [0u8; 8];
        assert_eq!(gateway.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn connection_reset_drops_connection_and_reports_link_down() {
        use std::net::{TcpListener, TcpStream};

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (gateway, _) = listener.accept().unwrap();

        // Closing with unread bytes makes the gateway side send RST.
        client.write_all(b"never read").unwrap();
        let mut byte = [0u8; 1];
        assert_eq!(gateway.peek(&mut byte).unwrap(), 1);
        drop(gateway);

        client.set_nonblocking(true).unwrap();
        let (mut mux, _outbound, inbound) = mux();
        mux.register(Connection::from_tcp(client, "reset"));

        mux.run().unwrap();
        assert_eq!(drain(&inbound), vec![InboundEvent::LinkDown]);
        assert_eq!(mux.connection_count(), 0);
    }

    #[test]
    fn closing_one_of_two_connections_keeps_running() {
        let (mut mux, _outbound, inbound) = mux();
        let (first, first_gw) = nonblocking_pair();
        let (second, second_gw) = nonblocking_pair();
        mux.register(first);
        mux.register(second);

        let handle = thread::spawn(move || mux.run());

        drop(first_gw);
        thread::sleep(Duration::from_millis(50));
        assert!(inbound.is_empty(), "first close must not report link down");
        assert!(!handle.is_finished());

        drop(second_gw);
        handle.join().unwrap().unwrap();
        assert_eq!(drain(&inbound), vec![InboundEvent::LinkDown]);
    }
}
