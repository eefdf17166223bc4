/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic (expected 0x4453 \"DS\")")]
    InvalidMagic,

    /// The frame header names a message kind this decoder does not know.
    #[error("unknown message kind {0:#04x}")]
    UnknownKind(u8),

    /// The frame body exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A length-prefixed field does not fit its 16-bit length.
    #[error("{field} too long ({len} bytes, max 65535)")]
    FieldTooLong { field: &'static str, len: usize },

    /// More headers than the 16-bit header count can carry.
    #[error("too many headers ({0}, max 65535)")]
    TooManyHeaders(usize),

    /// The frame body is structurally inconsistent.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// A text field is not valid UTF-8.
    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),

    /// The same header key appears twice in one frame.
    #[error("duplicate header '{0}'")]
    DuplicateHeader(String),

    /// An earlier decode error left the reassembly buffer unusable.
    #[error("decoder poisoned by an earlier error")]
    Poisoned,

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
