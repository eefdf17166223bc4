use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use devsim_frame::{resource, FrameConfig, Message};
use devsim_transport::{connect, Endpoint, Waker, DEFAULT_CONNECT_TIMEOUT};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::consumer::{Consumer, Poll};
use crate::correlation::{CallbackRegistry, Completion, DEFAULT_RPC_TIMEOUT};
use crate::device::DeviceDescriptor;
use crate::error::{MultiplexerError, Result, SessionError};
use crate::jsonrpc::RpcRequest;
use crate::multiplexer::{Multiplexer, MultiplexerConfig, StopHandle, DEFAULT_READ_CHUNK_SIZE};
use crate::queue::Queue;

/// Name of the thread running the multiplexer loop.
pub const MULTIPLEXER_THREAD_NAME: &str = "devsim-mux";

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Gateway to connect to.
    pub endpoint: Endpoint,
    /// Bound on the initial TCP connect. Default: 10 seconds.
    pub connect_timeout: Duration,
    /// Receive chunk size. Default: 8192 bytes.
    pub read_chunk_size: usize,
    /// Frame limits for inbound decoding.
    pub frame: FrameConfig,
    /// How long a correlated request may wait. Default: 30 seconds.
    pub rpc_timeout: Duration,
    /// Device announced by the bootstrap `add_device` request.
    pub device: DeviceDescriptor,
}

impl SessionConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            frame: FrameConfig::default(),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            device: DeviceDescriptor::default(),
        }
    }

    pub fn with_device(mut self, device: DeviceDescriptor) -> Self {
        self.device = device;
        self
    }

    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }
}

/// A connected session whose multiplexer thread has not started yet.
///
/// The bootstrap `add_device` request is already queued; inspect it with
/// [`outbound_len`](Self::outbound_len) or start I/O with
/// [`start`](Self::start).
#[derive(Debug)]
pub struct Established {
    multiplexer: Multiplexer,
    consumer: Consumer,
    registry: Arc<CallbackRegistry>,
    outbound: Queue<Bytes>,
    endpoint: Endpoint,
}

impl Established {
    /// Number of buffers waiting to be written.
    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    /// Consumer, for installing handlers before any traffic is dispatched.
    pub fn consumer_mut(&mut self) -> &mut Consumer {
        &mut self.consumer
    }

    /// Spawn the multiplexer thread.
    pub fn start(self) -> Result<Session> {
        let Established {
            mut multiplexer,
            consumer,
            registry,
            outbound,
            endpoint,
        } = self;

        let stop = multiplexer.stop_handle();
        let waker = multiplexer.waker();
        let thread = thread::Builder::new()
            .name(MULTIPLEXER_THREAD_NAME.to_string())
            .spawn(move || multiplexer.run())
            .map_err(SessionError::ThreadSpawn)?;
        info!(%endpoint, "session started");

        Ok(Session {
            outbound,
            consumer,
            registry,
            waker,
            stop,
            thread: Some(thread),
        })
    }
}

/// A running gateway session.
///
/// Owns the multiplexer thread. The owning thread drives inbound dispatch
/// through [`poll_once`](Self::poll_once); every other call only queues
/// work and never blocks on the socket. Dropping a session stops and joins
/// the multiplexer.
pub struct Session {
    outbound: Queue<Bytes>,
    consumer: Consumer,
    registry: Arc<CallbackRegistry>,
    waker: Waker,
    stop: StopHandle,
    thread: Option<JoinHandle<std::result::Result<(), MultiplexerError>>>,
}

impl Session {
    /// Connect to the gateway and queue the device announcement.
    ///
    /// Connection failures are reported here, synchronously. No thread is
    /// started until [`Established::start`].
    pub fn connect(config: &SessionConfig) -> Result<Established> {
        let connection = connect(&config.endpoint, config.connect_timeout)?;

        let outbound = Queue::new();
        let inbound = Queue::new();
        let registry = Arc::new(CallbackRegistry::with_timeout(config.rpc_timeout));

        let mut multiplexer = Multiplexer::new(
            outbound.clone(),
            inbound.clone(),
            MultiplexerConfig {
                read_chunk_size: config.read_chunk_size,
                frame: config.frame.clone(),
            },
        )?;
        multiplexer.register(connection);

        let mut consumer = Consumer::new(inbound, Arc::clone(&registry));
        consumer.handle(resource::CONTROL, log_control_request);

        let id = registry.allocate_id();
        let request = config.device.add_device_request(id)?;
        registry.register(id, Box::new(log_add_device))?;
        outbound.put(request.to_message(resource::DEVICE)?.to_bytes()?);
        debug!(id, device_type = %config.device.device_type, "queued add_device");

        Ok(Established {
            multiplexer,
            consumer,
            registry,
            outbound,
            endpoint: config.endpoint.clone(),
        })
    }

    /// Queue a message and wake the multiplexer.
    pub fn send(&self, message: &Message) -> Result<()> {
        self.enqueue(message.to_bytes()?)
    }

    /// Send a correlated JSON-RPC request on the `device` resource.
    ///
    /// The callback is registered before the request is queued and runs on
    /// the thread calling [`poll_once`](Self::poll_once), either with the
    /// response or with [`Completion::Expired`].
    pub fn call(
        &self,
        method: &str,
        params: Value,
        callback: impl FnOnce(Completion) + Send + 'static,
    ) -> Result<u64> {
        self.ensure_running()?;
        let id = self.registry.allocate_id();
        let message = RpcRequest::new(method, params, id).to_message(resource::DEVICE)?;
        let buf = message.to_bytes()?;
        self.registry.register(id, Box::new(callback))?;
        if let Err(err) = self.enqueue(buf) {
            self.registry.cancel(id);
            return Err(err);
        }
        Ok(id)
    }

    /// Send an uncorrelated JSON-RPC notification on the `device` resource.
    pub fn notify(&self, method: &str, params: Value) -> Result<()> {
        let message = RpcRequest::notification(method, params).to_message(resource::DEVICE)?;
        self.send(&message)
    }

    /// Announce another device.
    pub fn add_device(
        &self,
        device: &DeviceDescriptor,
        callback: impl FnOnce(Completion) + Send + 'static,
    ) -> Result<u64> {
        self.call(crate::device::ADD_DEVICE, serde_json::to_value(device)?, callback)
    }

    pub fn consumer(&self) -> &Consumer {
        &self.consumer
    }

    pub fn consumer_mut(&mut self) -> &mut Consumer {
        &mut self.consumer
    }

    /// One consumer step; see [`Consumer::poll_once`].
    pub fn poll_once(&mut self) -> Poll {
        self.consumer.poll_once()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// True while the multiplexer thread is alive and no stop was requested.
    pub fn is_running(&self) -> bool {
        !self.stop.is_stopped()
            && self
                .thread
                .as_ref()
                .is_some_and(|thread| !thread.is_finished())
    }

    /// Stop the multiplexer, close every connection and join the thread.
    ///
    /// Responses already queued stay available to
    /// [`poll_once`](Self::poll_once).
    pub fn disconnect(&mut self) -> Result<()> {
        self.stop.stop();
        match self.thread.take() {
            Some(thread) => match thread.join() {
                Ok(result) => result.map_err(SessionError::from),
                Err(_) => Err(SessionError::MultiplexerPanicked),
            },
            None => Ok(()),
        }
    }

    fn enqueue(&self, buf: Bytes) -> Result<()> {
        self.ensure_running()?;
        self.outbound.put(buf);
        if let Err(err) = self.waker.wake() {
            // The multiplexer exited between the check and the wake.
            if !self.is_running() {
                return Err(SessionError::Stopped);
            }
            return Err(err.into());
        }
        Ok(())
    }

    fn ensure_running(&self) -> Result<()> {
        if !self.is_running() {
            return Err(SessionError::Stopped);
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.thread.is_some() {
            if let Err(err) = self.disconnect() {
                warn!(error = %err, "session ended with error");
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("outbound", &self.outbound.len())
            .field("pending_rpc", &self.registry.pending())
            .field("running", &self.is_running())
            .finish()
    }
}

fn log_add_device(completion: Completion) {
    match completion {
        Completion::Response(response) => match response.into_result() {
            Ok(result) => info!(%result, "device registered"),
            Err(err) => warn!(error = %err, "gateway rejected device"),
        },
        Completion::Expired => warn!("add_device got no response"),
    }
}

fn log_control_request(message: &Message) {
    match RpcRequest::from_message(message) {
        Ok(request) => info!(method = %request.method, params = %request.params, "control request"),
        Err(err) => warn!(error = %err, bytes = message.body.len(), "unparseable control request"),
    }
}
