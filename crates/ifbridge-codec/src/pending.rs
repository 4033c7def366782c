//! Pending request table.
//!
//! Controllers do not echo a request id, so a reply is matched to its request
//! by the bytes that provoked it: `ifTypeUnit`, `command` and `params`. Each
//! key owns a FIFO of completion handles; identical in-flight requests are
//! answered in submission order.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};

use ifbridge_frame::{Packet, PacketHeader, CORRELATION_LEN};
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::{CodecError, Result};

/// Correlation key: header bytes `16..52` exactly as they appear on the wire.
///
/// Displays as the lowercase hex encoding of those bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingKey([u8; CORRELATION_LEN]);

impl PendingKey {
    pub fn of(header: &PacketHeader) -> Self {
        Self(header.correlation_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; CORRELATION_LEN] {
        &self.0
    }
}

impl From<&Packet> for PendingKey {
    fn from(packet: &Packet) -> Self {
        Self::of(&packet.header)
    }
}

impl fmt::Display for PendingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for PendingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PendingKey({self})")
    }
}

/// The caller-side half of one outstanding request.
///
/// Consumed by [`Completion::resolve`] or [`Completion::reject`], so a request
/// completes at most once.
pub struct Completion {
    id: u64,
    tx: oneshot::Sender<Result<Packet>>,
}

impl Completion {
    /// Complete the request with a reply packet.
    pub fn resolve(self, packet: Packet) {
        if self.tx.send(Ok(packet)).is_err() {
            trace!(id = self.id, "reply arrived after caller gave up");
        }
    }

    /// Complete the request with an error.
    pub fn reject(self, err: CodecError) {
        if self.tx.send(Err(err)).is_err() {
            trace!(id = self.id, "rejection arrived after caller gave up");
        }
    }

    /// Table-unique handle id.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion").field("id", &self.id).finish()
    }
}

#[derive(Default)]
struct Queues {
    by_key: HashMap<PendingKey, VecDeque<Completion>>,
    next_id: u64,
}

/// Map from [`PendingKey`] to the FIFO of its outstanding requests.
#[derive(Default)]
pub struct PendingTable {
    inner: Mutex<Queues>,
}

impl PendingTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn queues(&self) -> MutexGuard<'_, Queues> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a completion handle for `key` and return the matching reply future.
    pub fn register(self: &Arc<Self>, key: PendingKey) -> PendingReply {
        let (tx, rx) = oneshot::channel();
        let id = {
            let mut queues = self.queues();
            let id = queues.next_id;
            queues.next_id = queues.next_id.wrapping_add(1);
            queues
                .by_key
                .entry(key)
                .or_default()
                .push_back(Completion { id, tx });
            id
        };
        trace!(%key, id, "registered pending request");

        PendingReply {
            rx,
            table: Arc::downgrade(self),
            key,
            id,
            settled: false,
        }
    }

    /// Pop the oldest handle for `key`. Empty queues are removed.
    pub fn take_oldest(&self, key: &PendingKey) -> Option<Completion> {
        let mut queues = self.queues();
        let queue = queues.by_key.get_mut(key)?;
        let completion = queue.pop_front();
        if queue.is_empty() {
            queues.by_key.remove(key);
        }
        completion
    }

    /// Remove one specific handle. Returns false if it is no longer queued.
    pub fn remove(&self, key: &PendingKey, id: u64) -> bool {
        let mut queues = self.queues();
        let Some(queue) = queues.by_key.get_mut(key) else {
            return false;
        };
        let before = queue.len();
        queue.retain(|completion| completion.id != id);
        let removed = queue.len() != before;
        if queue.is_empty() {
            queues.by_key.remove(key);
        }
        removed
    }

    /// Empty the table, returning every outstanding handle.
    pub fn drain(&self) -> Vec<Completion> {
        let mut queues = self.queues();
        queues
            .by_key
            .drain()
            .flat_map(|(_, queue)| queue.into_iter())
            .collect()
    }

    /// Outstanding handles across all keys.
    pub fn len(&self) -> usize {
        self.queues().by_key.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues().by_key.is_empty()
    }

    /// Number of distinct keys with at least one outstanding handle.
    pub fn key_count(&self) -> usize {
        self.queues().by_key.len()
    }
}

impl fmt::Debug for PendingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTable")
            .field("outstanding", &self.len())
            .finish()
    }
}

/// Future of one request's reply.
///
/// Dropping it before the reply arrives (which is what an expired timeout
/// does) removes its handle from the table. A late reply then finds no queue
/// and is handled as an unsolicited packet.
#[must_use = "the request stays pending until its reply is awaited or this is dropped"]
pub struct PendingReply {
    rx: oneshot::Receiver<Result<Packet>>,
    table: Weak<PendingTable>,
    key: PendingKey,
    id: u64,
    settled: bool,
}

impl PendingReply {
    pub fn key(&self) -> &PendingKey {
        &self.key
    }
}

impl Future for PendingReply {
    type Output = Result<Packet>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let outcome = match Pin::new(&mut self.rx).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Ok(outcome)) => outcome,
            Poll::Ready(Err(_)) => Err(CodecError::Disconnected(
                "request dropped without a reply".to_string(),
            )),
        };
        self.settled = true;
        Poll::Ready(outcome)
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Some(table) = self.table.upgrade() {
            if table.remove(&self.key, self.id) {
                debug!(key = %self.key, id = self.id, "purged abandoned request");
            }
        }
    }
}

impl fmt::Debug for PendingReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingReply")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use ifbridge_frame::{Address, GPIO, PARAM_COUNT};

    use super::*;

    fn request(mask: u32) -> Packet {
        let mut params = [0u32; PARAM_COUNT];
        params[0] = mask;
        Packet::command(Address::new(GPIO, 0), 3, params)
    }

    #[test]
    fn key_covers_address_command_and_params() {
        let a = PendingKey::from(&request(1));
        let b = PendingKey::from(&request(1).with_status(7).with_payload(&b"x"[..]));
        let c = PendingKey::from(&request(2));
        assert_eq!(a, b);
        assert_ne!(a, c);

        let hex = a.to_string();
        assert_eq!(hex.len(), CORRELATION_LEN * 2);
        assert!(hex.starts_with("00040300"));
    }

    #[tokio::test]
    async fn fifo_per_key() {
        let table = PendingTable::new();
        let key = PendingKey::from(&request(1));
        let first = table.register(key);
        let second = table.register(key);
        assert_eq!(table.len(), 2);
        assert_eq!(table.key_count(), 1);

        table
            .take_oldest(&key)
            .unwrap()
            .resolve(request(1).with_status(1));
        table
            .take_oldest(&key)
            .unwrap()
            .resolve(request(1).with_status(2));

        assert_eq!(first.await.unwrap().status(), 1);
        assert_eq!(second.await.unwrap().status(), 2);
        assert!(table.is_empty());
    }

    #[test]
    fn dropping_reply_purges_entry() {
        let table = PendingTable::new();
        let key = PendingKey::from(&request(4));
        let keep = table.register(key);
        let abandoned = table.register(key);

        drop(abandoned);
        assert_eq!(table.len(), 1);

        drop(keep);
        assert!(table.is_empty());
        assert!(table.take_oldest(&key).is_none());
    }

    #[tokio::test]
    async fn drain_returns_every_handle_once() {
        let table = PendingTable::new();
        let a = table.register(PendingKey::from(&request(1)));
        let b = table.register(PendingKey::from(&request(2)));

        let handles = table.drain();
        assert_eq!(handles.len(), 2);
        assert!(table.is_empty());
        assert!(table.drain().is_empty());

        for handle in handles {
            handle.reject(CodecError::Disconnected("interface reset".into()));
        }
        assert!(matches!(a.await, Err(CodecError::Disconnected(_))));
        assert!(matches!(b.await, Err(CodecError::Disconnected(_))));
    }

    #[tokio::test]
    async fn dropped_completion_reports_disconnect() {
        let table = PendingTable::new();
        let key = PendingKey::from(&request(9));
        let reply = table.register(key);
        drop(table.take_oldest(&key));
        assert!(matches!(reply.await, Err(CodecError::Disconnected(_))));
    }
}
