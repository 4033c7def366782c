/// Errors that can occur while sending bytes to a controller.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport has been closed and accepts no more data.
    #[error("transport closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
