//! Interface base: request/response correlation shared by every interface.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use ifbridge_config::Directive;
use ifbridge_frame::{Address, FrameConfig, Packet, PARAM_COUNT};
use ifbridge_transport::Transport;
use tracing::{debug, trace};

use crate::error::{CodecError, DirectiveOutcome, Result};
use crate::pending::{Completion, PendingKey, PendingReply, PendingTable};
use crate::transfer::{Assembly, TransferAssembler};

/// Opcodes shared by every interface.
pub const ENABLE: u16 = 0;
pub const CONFIG: u16 = 1;
pub const WRITE: u16 = 2;
pub const READ: u16 = 3;

/// Message used to reject requests drained by a disconnect.
pub const RESET_MESSAGE: &str = "interface reset";

/// Eight 32-bit command parameters.
pub type Params = [u32; PARAM_COUNT];

/// Future of an operation's result. The request is already on the wire.
pub type Reply<T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'static>>;

/// Per-command reply handler. Decides whether the popped request resolves or rejects.
pub type ReplyHandler = Arc<dyn Fn(Packet, Completion) + Send + Sync>;

/// Receives packets that match no outstanding request.
pub type EventCallback = Arc<dyn Fn(Packet) + Send + Sync>;

/// Build a parameter vector from its leading words.
pub fn params(leading: &[u32]) -> Params {
    let mut out = [0u32; PARAM_COUNT];
    for (slot, value) in out.iter_mut().zip(leading) {
        *slot = *value;
    }
    out
}

/// Map a reply packet into an operation result once it arrives.
pub fn reply<T, F>(pending: Result<PendingReply>, map: F) -> Reply<T>
where
    T: Send + 'static,
    F: FnOnce(Packet) -> Result<T> + Send + 'static,
{
    Box::pin(async move { map(pending?.await?) })
}

/// Acknowledgement-only operation.
pub fn ack(pending: Result<PendingReply>) -> Reply<()> {
    reply(pending, |_| Ok(()))
}

/// Operation that failed before anything was transmitted.
pub fn failed<T: Send + 'static>(err: CodecError) -> Reply<T> {
    Box::pin(std::future::ready(Err(err)))
}

/// Error for a reply with non-zero status.
///
/// The message is the ASCII text carried in the payload, or a generic
/// per-operation string when the payload is empty.
pub fn rejection(packet: &Packet, operation: &str) -> CodecError {
    let text: String = packet
        .payload
        .iter()
        .take_while(|byte| **byte != 0)
        .filter(|byte| byte.is_ascii() && !byte.is_ascii_control())
        .map(|byte| char::from(*byte))
        .collect();
    let message = if text.trim().is_empty() {
        format!("{operation} failed")
    } else {
        text.trim().to_string()
    };

    CodecError::FirmwareRejected {
        command: packet.command_code(),
        status: packet.status(),
        message,
    }
}

/// Default reply semantics: status 0 resolves with the packet, anything else rejects.
pub fn status_reply(operation: &'static str) -> ReplyHandler {
    Arc::new(move |packet: Packet, completion: Completion| {
        if packet.status() == 0 {
            completion.resolve(packet);
        } else {
            completion.reject(rejection(&packet, operation));
        }
    })
}

/// State shared by every interface: addressing, the pending request table,
/// reply handlers and the unsolicited-event callback.
pub struct InterfaceBase {
    name: String,
    if_type: u8,
    unit: u8,
    transport: Arc<dyn Transport>,
    pending: Arc<PendingTable>,
    handlers: RwLock<HashMap<u16, ReplyHandler>>,
    events: RwLock<Option<EventCallback>>,
    transfers: Mutex<TransferAssembler>,
    sequence: RwLock<Vec<Directive>>,
}

impl InterfaceBase {
    pub fn new(
        name: impl Into<String>,
        if_type: u8,
        unit: u8,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            name: name.into(),
            if_type,
            unit,
            transport,
            pending: PendingTable::new(),
            handlers: RwLock::new(HashMap::new()),
            events: RwLock::new(None),
            transfers: Mutex::new(TransferAssembler::new()),
            sequence: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn if_type(&self) -> u8 {
        self.if_type
    }

    /// Unit used by configuration directives that do not name one.
    pub fn unit(&self) -> u8 {
        self.unit
    }

    pub fn address(&self, unit: u8) -> Address {
        Address::new(self.if_type, unit)
    }

    /// Configuration sequence applied on connect.
    pub fn sequence(&self) -> Vec<Directive> {
        self.sequence
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_sequence(&self, sequence: Vec<Directive>) {
        *self.sequence.write().unwrap_or_else(PoisonError::into_inner) = sequence;
    }

    /// Install the reply handler for `command`, replacing any previous one.
    pub fn register_handler(&self, command: u16, handler: ReplyHandler) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(command, handler);
    }

    /// Install the callback for packets that match no outstanding request.
    pub fn set_event_callback(&self, callback: EventCallback) {
        *self.events.write().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    pub fn clear_event_callback(&self) {
        *self.events.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Register a pending request and transmit `packet`.
    ///
    /// `payloadLen` is recomputed from the payload. If transmission fails the
    /// request is unregistered before the error is returned.
    pub fn h2c_command(&self, mut packet: Packet) -> Result<PendingReply> {
        packet.sync_payload_len();
        let key = PendingKey::from(&packet);
        let reply = self.pending.register(key);

        let sent = packet
            .encode()
            .map_err(CodecError::from)
            .and_then(|wire| self.transport.send(&wire).map_err(CodecError::from));
        if let Err(err) = sent {
            // Dropping the unsettled reply removes its table entry.
            drop(reply);
            return Err(err);
        }

        debug!(
            interface = %self.name,
            address = %packet.address(),
            command = packet.command_code(),
            payload_len = packet.payload.len(),
            "sent request"
        );
        Ok(reply)
    }

    /// Build and transmit a request for `unit`.
    pub fn request(&self, unit: u8, command: u16, params: Params) -> Result<PendingReply> {
        self.h2c_command(Packet::command(self.address(unit), command, params))
    }

    /// Build and transmit a request carrying a payload.
    pub fn request_with_payload(
        &self,
        unit: u8,
        command: u16,
        params: Params,
        payload: Bytes,
    ) -> Result<PendingReply> {
        self.h2c_command(Packet::command(self.address(unit), command, params).with_payload(payload))
    }

    /// Dispatch an inbound packet addressed to this interface.
    ///
    /// Pops the oldest request for the packet's key and hands both to the
    /// command's reply handler; without a handler the request resolves with
    /// the raw packet. Packets with no outstanding request go to the event
    /// callback. Always returns true.
    pub fn decode(&self, packet: Packet) -> bool {
        let packet = if TransferAssembler::is_slice(&packet) {
            let assembled = self.transfers_guard().accept(packet);
            match assembled {
                Assembly::Complete(packet) => packet,
                Assembly::Incomplete | Assembly::Dropped => return true,
            }
        } else {
            packet
        };

        let key = PendingKey::from(&packet);
        let Some(completion) = self.pending.take_oldest(&key) else {
            let callback = self
                .events
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            match callback {
                Some(callback) => callback(packet),
                None => debug!(
                    interface = %self.name,
                    %key,
                    command = packet.command_code(),
                    "unsolicited packet ignored"
                ),
            }
            return true;
        };

        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&packet.command_code())
            .cloned();
        trace!(interface = %self.name, %key, id = completion.id(), "matched reply");
        match handler {
            Some(handler) => handler(packet, completion),
            None => completion.resolve(packet),
        }
        true
    }

    /// Bound multi-packet reassembly by `config`. Buffered transfers are discarded.
    pub fn set_transfer_limits(&self, config: &FrameConfig) {
        self.transfers_guard().set_limits(config);
    }

    /// Buffered multi-packet transfers.
    pub fn transfers_in_progress(&self) -> usize {
        self.transfers_guard().in_progress()
    }

    /// Reject every outstanding request with the reset error and clear the table.
    pub fn disconnect(&self) {
        let drained = self.pending.drain();
        self.transfers_guard().clear();
        if !drained.is_empty() {
            debug!(interface = %self.name, count = drained.len(), "rejecting pending requests");
        }
        for completion in drained {
            completion.reject(CodecError::Disconnected(RESET_MESSAGE.to_string()));
        }
    }

    /// Outstanding requests.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn transfers_guard(&self) -> MutexGuard<'_, TransferAssembler> {
        self.transfers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for InterfaceBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceBase")
            .field("name", &self.name)
            .field("if_type", &self.if_type)
            .field("unit", &self.unit)
            .field("transport", &self.transport.name())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

/// A hardware interface reachable through the codec.
#[async_trait]
pub trait Interface: Send + Sync {
    fn base(&self) -> &InterfaceBase;

    /// Interface kind for diagnostics (`gpio`, `uart`, ...).
    fn kind(&self) -> &'static str;

    /// Translate one configuration directive into a transmitted request.
    fn apply_directive(&self, directive: &Directive) -> Reply<()>;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    fn name(&self) -> &str {
        self.base().name()
    }

    fn if_type(&self) -> u8 {
        self.base().if_type()
    }

    fn decode(&self, packet: Packet) -> bool {
        self.base().decode(packet)
    }

    fn disconnect(&self) {
        self.base().disconnect()
    }

    /// Run a configuration sequence: transmit every directive, then wait for all.
    ///
    /// Fails if any directive failed; the error lists every directive's outcome.
    async fn configure_firmware(&self, sequence: &[Directive]) -> Result<()> {
        let launched = sequence
            .iter()
            .map(|directive| (directive.command_name(), self.apply_directive(directive)))
            .collect();
        settle(self.name(), launched).await
    }
}

/// Await every launched directive and fold the outcomes.
pub async fn settle(interface: &str, launched: Vec<(&'static str, Reply<()>)>) -> Result<()> {
    let mut outcomes = Vec::with_capacity(launched.len());
    for (index, (command, reply)) in launched.into_iter().enumerate() {
        let error = reply.await.err().map(|err| err.to_string());
        outcomes.push(DirectiveOutcome {
            index,
            command,
            error,
        });
    }

    let failures = outcomes.iter().filter(|outcome| !outcome.is_ok()).count();
    if failures == 0 {
        debug!(interface, directives = outcomes.len(), "configuration sequence applied");
        return Ok(());
    }
    Err(CodecError::Configuration {
        interface: interface.to_string(),
        failures,
        outcomes,
    })
}

/// Error for a directive an interface has no request for.
pub fn unsupported(kind: &str, directive: &Directive) -> CodecError {
    CodecError::Config(ifbridge_config::ConfigError::InvalidSettings {
        command: directive.command_name(),
        message: format!("not supported by {kind} interfaces"),
    })
}
