use std::io::{ErrorKind, Write};
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::error::{Result, TransportError};

/// Outbound half of a controller connection.
///
/// Implementations must deliver each call's bytes in order and without
/// interleaving them with bytes from a concurrent call. Chunking on the wire
/// is irrelevant: the receiving side re-frames the stream.
pub trait Transport: Send + Sync {
    /// Send one encoded packet.
    fn send(&self, bytes: &[u8]) -> Result<()>;

    /// Transport name for diagnostics.
    fn name(&self) -> &str {
        "transport"
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, bytes: &[u8]) -> Result<()> {
        (**self).send(bytes)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Transport over any blocking `Write` sink (serial port handle, file, pipe).
pub struct WriteTransport<W> {
    inner: Mutex<Option<W>>,
}

impl<W: Write + Send> WriteTransport<W> {
    /// Wrap a writer.
    pub fn new(inner: W) -> Self {
        Self {
            inner: Mutex::new(Some(inner)),
        }
    }

    /// Close the transport and return the inner writer.
    ///
    /// Subsequent sends fail with [`TransportError::Closed`].
    pub fn close(&self) -> Option<W> {
        self.inner.lock().ok().and_then(|mut guard| guard.take())
    }
}

impl<W: Write + Send> Transport for WriteTransport<W> {
    fn send(&self, bytes: &[u8]) -> Result<()> {
        let mut guard = self.inner.lock().map_err(|_| TransportError::Closed)?;
        let writer = guard.as_mut().ok_or(TransportError::Closed)?;

        let mut offset = 0usize;
        while offset < bytes.len() {
            match writer.write(&bytes[offset..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }

        loop {
            match writer.flush() {
                Ok(()) => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }

        trace!(len = bytes.len(), "wrote packet");
        Ok(())
    }

    fn name(&self) -> &str {
        "writer"
    }
}

impl<W> std::fmt::Debug for WriteTransport<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteTransport").finish_non_exhaustive()
    }
}
