/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error (connect, resolve, socket I/O).
    #[error("transport error: {0}")]
    Transport(#[from] devsim_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] devsim_frame::FrameError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An RPC id was registered twice.
    #[error("rpc id {0} is already registered")]
    DuplicateRpcId(u64),

    /// The multiplexer thread could not be started.
    #[error("failed to spawn multiplexer thread: {0}")]
    ThreadSpawn(std::io::Error),

    /// The multiplexer loop ended with an error.
    #[error("multiplexer error: {0}")]
    Multiplexer(#[from] MultiplexerError),

    /// The multiplexer thread panicked.
    #[error("multiplexer thread panicked")]
    MultiplexerPanicked,

    /// The session is no longer running.
    #[error("session stopped")]
    Stopped,
}

/// Errors that end a multiplexer run.
#[derive(Debug, thiserror::Error)]
pub enum MultiplexerError {
    /// `run()` was called with an empty registration set.
    #[error("no registered connections")]
    NoConnections,

    /// Readiness selection itself failed.
    #[error("readiness selection failed: {0}")]
    Poll(std::io::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
