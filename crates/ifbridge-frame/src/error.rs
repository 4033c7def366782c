/// Errors that can occur during packet encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The buffer is shorter than the fixed packet header.
    #[error("malformed packet ({len} bytes, header needs {min})")]
    MalformedPacket { len: usize, min: usize },

    /// The header does not start with the protocol signature.
    #[error("invalid packet signature 0x{found:04X} (expected 0x{expected:04X})")]
    InvalidSignature { found: u16, expected: u16 },

    /// The header declares more payload than the buffer holds.
    #[error("truncated payload (declared {declared} bytes, {available} available)")]
    TruncatedPayload { declared: usize, available: usize },

    /// The payload exceeds the configured or representable maximum.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The header's payload length disagrees with the attached payload.
    #[error("payload length mismatch (header {declared}, actual {actual})")]
    PayloadLengthMismatch { declared: usize, actual: usize },

    /// An I/O error occurred while reading packets.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended before a complete packet was received.
    #[error("connection closed (incomplete packet)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
