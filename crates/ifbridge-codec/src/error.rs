use std::fmt;
use std::time::Duration;

use ifbridge_frame::Address;

use crate::codec::CodecState;

/// Errors that can occur while talking to a controller.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A bounded operation did not complete in time.
    #[error("no response to {operation} within {timeout:?}")]
    NoResponse {
        operation: &'static str,
        timeout: Duration,
    },

    /// The reply carried a non-zero status.
    #[error("firmware rejected command {command} with status {status}: {message}")]
    FirmwareRejected {
        command: u16,
        status: u32,
        message: String,
    },

    /// The command word returned by a register read failed its parity or address check.
    #[error("parity check failed: sent command word 0x{sent:04X}, controller returned 0x{returned:04X}")]
    ParityError { sent: u16, returned: u16 },

    /// A payload checksum did not match its contents.
    #[error("checksum mismatch: expected 0x{expected:08X}, computed 0x{computed:08X}")]
    ChecksumMismatch { expected: u32, computed: u32 },

    /// An inbound packet addressed an interface type nobody registered.
    #[error("no interface registered for {0}")]
    UnroutablePacket(Address),

    /// The request was still pending when its interface was reset.
    #[error("disconnected: {0}")]
    Disconnected(String),

    /// The caller's firmware check refused the controller.
    #[error("firmware incompatible: {0}")]
    FirmwareIncompatible(String),

    /// At least one directive of an interface configuration sequence failed.
    #[error("configuring '{interface}' failed ({failures} of {} directives)", .outcomes.len())]
    Configuration {
        interface: String,
        failures: usize,
        outcomes: Vec<DirectiveOutcome>,
    },

    /// The operation is not allowed in the codec's current state.
    #[error("{operation} not allowed while {state}")]
    InvalidState {
        operation: &'static str,
        state: CodecState,
    },

    /// No interface with this name is registered.
    #[error("unknown interface '{0}'")]
    UnknownInterface(String),

    /// Request arguments cannot be encoded.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A successful reply carried a payload the operation cannot interpret.
    #[error("invalid reply: {0}")]
    InvalidReply(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] ifbridge_transport::TransportError),

    /// Packet-level error.
    #[error("frame error: {0}")]
    Frame(#[from] ifbridge_frame::FrameError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ifbridge_config::ConfigError),
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// How one directive of a configuration sequence ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveOutcome {
    /// Position in the sequence.
    pub index: usize,
    /// Directive command name (`enable`, `config`, `write`, `registerInt`).
    pub command: &'static str,
    /// Failure message, `None` when the directive succeeded.
    pub error: Option<String>,
}

impl DirectiveOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl fmt::Display for DirectiveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            None => write!(f, "#{} {}: ok", self.index, self.command),
            Some(err) => write!(f, "#{} {}: {err}", self.index, self.command),
        }
    }
}
