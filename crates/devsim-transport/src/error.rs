use std::path::PathBuf;

/// Errors that can occur while reaching or driving a gateway transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Host name resolution failed.
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        source: std::io::Error,
    },

    /// Host name resolved to an empty address list.
    #[error("{host} did not resolve to any address")]
    NoAddresses { host: String },

    /// A TCP endpoint was selected without a port.
    #[error("tcp endpoint {host} requires a port")]
    MissingPort { host: String },

    /// Failed to connect to the specified endpoint (refused, timed out, ...).
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },
}

impl TransportError {
    /// True when the error was raised while establishing the connection.
    pub fn is_connect_error(&self) -> bool {
        matches!(
            self,
            TransportError::Resolve { .. }
                | TransportError::NoAddresses { .. }
                | TransportError::MissingPort { .. }
                | TransportError::Connect { .. }
                | TransportError::PathTooLong { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
