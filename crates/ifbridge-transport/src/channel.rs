use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// Transport that forwards each sent buffer into a tokio channel.
///
/// The receiving half is typically owned by a task that writes to the real
/// device, or by an in-process controller simulator.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl ChannelTransport {
    /// Create a transport and the receiver that observes its output.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, bytes: &[u8]) -> Result<()> {
        self.tx
            .send(Bytes::copy_from_slice(bytes))
            .map_err(|_| TransportError::Closed)
    }

    fn name(&self) -> &str {
        "channel"
    }
}
