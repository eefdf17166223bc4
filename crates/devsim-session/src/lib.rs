//! Gateway session engine for the device simulator.
//!
//! A dedicated multiplexer thread owns every socket and moves bytes between
//! the network and two FIFO queues. The application thread drives a
//! [`Consumer`] that dispatches inbound requests, correlates JSON-RPC
//! responses with their callbacks and reports when the link goes down.
//! [`Session`] wires the pieces together.

pub mod consumer;
pub mod correlation;
pub mod device;
pub mod error;
pub mod jsonrpc;
pub mod lifecycle;
pub mod multiplexer;
pub mod queue;
pub mod session;

pub use consumer::{Consumer, Poll, RequestHandler};
pub use correlation::{Callback, CallbackRegistry, Completion, DEFAULT_RPC_TIMEOUT};
pub use device::{
    DeviceDescriptor, ADD_DEVICE, DEVICE_TYPE_HEATER, DEVICE_TYPE_LIGHTING, OP_POWER_OFF,
    OP_POWER_ON,
};
pub use error::{MultiplexerError, Result, SessionError};
pub use jsonrpc::{RpcError, RpcRequest, RpcResponse, CONTENT_TYPE_HEADER, CONTENT_TYPE_JSON};
pub use lifecycle::{ConnectionId, Registry};
pub use multiplexer::{
    InboundEvent, Multiplexer, MultiplexerConfig, StopHandle, DEFAULT_READ_CHUNK_SIZE,
};
pub use queue::Queue;
pub use session::{Established, Session, SessionConfig, MULTIPLEXER_THREAD_NAME};
