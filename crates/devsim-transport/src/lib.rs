//! Gateway transport for the device simulator.
//!
//! Provides the lowest layer of devsim:
//! - endpoint selection (Unix domain socket path or TCP host/port)
//! - synchronous connect with a bounded timeout, yielding a non-blocking
//!   [`Connection`]
//! - `poll(2)` readiness selection ([`Selector`]) and a cross-thread
//!   [`Waker`] that interrupts an indefinite wait
//!
//! Everything else builds on top of the [`Connection`] type provided here.

#[cfg(not(unix))]
compile_error!("devsim-transport requires a Unix platform (poll(2) readiness selection)");

pub mod connection;
pub mod endpoint;
pub mod error;
pub mod selector;
pub mod waker;

pub use connection::{connect, Connection, DEFAULT_CONNECT_TIMEOUT};
pub use endpoint::{AddressFamily, Endpoint, DEFAULT_GATEWAY_PORT};
pub use error::{Result, TransportError};
pub use selector::{Event, Interest, Readiness, Selector, Token};
pub use waker::{waker_pair, WakeReceiver, Waker};
