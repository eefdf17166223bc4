//! Smart-device simulator client for home gateways.
//!
//! # Crate Structure
//!
//! - [`transport`]: gateway endpoints, non-blocking connections, readiness selection
//! - [`frame`]: message model and self-delimiting framing
//! - [`session`]: multiplexer thread, queue bridge, JSON-RPC correlation and the `Session` facade

/// Re-export transport types.
pub mod transport {
    pub use devsim_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use devsim_frame::*;
}

/// Re-export session types.
pub mod session {
    pub use devsim_session::*;
}

pub use devsim_session::{Session, SessionConfig};
