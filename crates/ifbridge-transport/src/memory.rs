use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use bytes::Bytes;

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// Transport that records every sent buffer in memory.
///
/// Useful for dry runs and for driving a codec against a scripted controller.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<Bytes>>,
    closed: AtomicBool,
}

impl MemoryTransport {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything sent so far, oldest first.
    pub fn take_sent(&self) -> Vec<Bytes> {
        match self.sent.lock() {
            Ok(mut sent) => std::mem::take(&mut *sent),
            Err(_) => Vec::new(),
        }
    }

    /// Number of buffers sent and not yet taken.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or(0)
    }

    /// Make every subsequent send fail with [`TransportError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Accept sends again after [`MemoryTransport::close`].
    pub fn reopen(&self) {
        self.closed.store(false, Ordering::SeqCst);
    }
}

impl Transport for MemoryTransport {
    fn send(&self, bytes: &[u8]) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.sent
            .lock()
            .map_err(|_| TransportError::Closed)?
            .push(Bytes::copy_from_slice(bytes));
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
