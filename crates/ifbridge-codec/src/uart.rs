//! Serial ports.

use std::any::Any;
use std::sync::Arc;

use bytes::Bytes;
use ifbridge_config::{parse_settings, ConfigError, Directive};
use ifbridge_frame::{Packet, DEFAULT_MAX_PAYLOAD, UART};
use ifbridge_transport::Transport;
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, Result};
use crate::interface::{
    ack, failed, params, reply, status_reply, unsupported, Interface, InterfaceBase, Reply,
    CONFIG, ENABLE, READ, WRITE,
};

/// Stop the receiver without disabling the port.
pub const DISABLE_RX: u16 = 4;

/// Parity setting, sent as `p1` of CONFIG.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UartParity {
    #[default]
    None,
    Odd,
    Even,
}

impl UartParity {
    pub fn code(self) -> u32 {
        match self {
            UartParity::None => 0,
            UartParity::Odd => 1,
            UartParity::Even => 2,
        }
    }
}

/// Line settings. CONFIG carries them as `p0..p3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UartSettings {
    pub baud: u32,
    pub parity: UartParity,
    pub data_bits: u8,
    pub stop_bits: u8,
}

impl Default for UartSettings {
    fn default() -> Self {
        Self {
            baud: 115_200,
            parity: UartParity::None,
            data_bits: 8,
            stop_bits: 1,
        }
    }
}

impl UartSettings {
    fn check(&self) -> Result<()> {
        if self.baud == 0 {
            return Err(CodecError::InvalidRequest("baud rate must be non-zero".into()));
        }
        if !(5..=9).contains(&self.data_bits) {
            return Err(CodecError::InvalidRequest(format!(
                "data bits must be 5-9, got {}",
                self.data_bits
            )));
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(CodecError::InvalidRequest(format!(
                "stop bits must be 1 or 2, got {}",
                self.stop_bits
            )));
        }
        Ok(())
    }
}

/// Data received without a matching read request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UartData {
    pub unit: u8,
    pub data: Bytes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteSettings {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    hex: Option<String>,
}

impl WriteSettings {
    fn into_bytes(self) -> std::result::Result<Bytes, ConfigError> {
        match (self.text, self.hex) {
            (Some(text), None) => Ok(Bytes::from(text.into_bytes())),
            (None, Some(hex)) => hex::decode(hex.trim())
                .map(Bytes::from)
                .map_err(|err| ConfigError::InvalidSettings {
                    command: "write",
                    message: format!("invalid hex data: {err}"),
                }),
            _ => Err(ConfigError::InvalidSettings {
                command: "write",
                message: "exactly one of `text` or `hex` is required".into(),
            }),
        }
    }
}

/// UART interface (type `0x01`).
#[derive(Debug)]
pub struct UartInterface {
    base: InterfaceBase,
}

impl UartInterface {
    pub fn new(name: impl Into<String>, unit: u8, transport: Arc<dyn Transport>) -> Self {
        Self::with_type(name, UART, unit, transport)
    }

    pub fn with_type(
        name: impl Into<String>,
        if_type: u8,
        unit: u8,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let base = InterfaceBase::new(name, if_type, unit, transport);
        base.register_handler(ENABLE, status_reply("uart enable"));
        base.register_handler(CONFIG, status_reply("uart config"));
        base.register_handler(WRITE, status_reply("uart write"));
        base.register_handler(READ, status_reply("uart read"));
        base.register_handler(DISABLE_RX, status_reply("uart disable receiver"));
        Self { base }
    }

    pub fn enable(&self, unit: u8, on: bool) -> Reply<()> {
        ack(self.base.request(unit, ENABLE, params(&[u32::from(on)])))
    }

    pub fn configure(&self, unit: u8, settings: UartSettings) -> Reply<()> {
        if let Err(err) = settings.check() {
            return failed(err);
        }
        ack(self.base.request(
            unit,
            CONFIG,
            params(&[
                settings.baud,
                settings.parity.code(),
                u32::from(settings.data_bits),
                u32::from(settings.stop_bits),
            ]),
        ))
    }

    /// Transmit `data` (`p0` = length, data as payload).
    pub fn write(&self, unit: u8, data: impl Into<Bytes>) -> Reply<()> {
        let data = data.into();
        if data.len() > DEFAULT_MAX_PAYLOAD {
            return failed(CodecError::InvalidRequest(format!(
                "uart write of {} bytes exceeds the {DEFAULT_MAX_PAYLOAD} byte payload limit",
                data.len()
            )));
        }
        let len = data.len() as u32;
        ack(self
            .base
            .request_with_payload(unit, WRITE, params(&[len]), data))
    }

    /// Read up to `max_len` buffered bytes.
    pub fn read(&self, unit: u8, max_len: u32) -> Reply<Bytes> {
        reply(self.base.request(unit, READ, params(&[max_len])), |packet| {
            Ok(packet.payload)
        })
    }

    pub fn disable_receiver(&self, unit: u8) -> Reply<()> {
        ack(self.base.request(unit, DISABLE_RX, params(&[])))
    }

    /// Receive data the controller pushes without a read request.
    pub fn on_receive<F>(&self, callback: F)
    where
        F: Fn(UartData) + Send + Sync + 'static,
    {
        self.base.set_event_callback(Arc::new(move |packet: Packet| {
            if packet.command_code() != READ || packet.payload.is_empty() {
                return;
            }
            callback(UartData {
                unit: packet.header.unit(),
                data: packet.payload,
            });
        }));
    }

    fn directive_reply(&self, directive: &Directive) -> Result<Reply<()>> {
        let unit = directive.unit().unwrap_or(self.base.unit());
        Ok(match directive {
            Directive::Enable { enable, .. } => self.enable(unit, *enable),
            Directive::Config { settings, .. } => {
                self.configure(unit, parse_settings("config", settings)?)
            }
            Directive::Write { settings, .. } => {
                let settings: WriteSettings = parse_settings("write", settings)?;
                self.write(unit, settings.into_bytes()?)
            }
            Directive::RegisterInt { .. } => return Err(unsupported("uart", directive)),
        })
    }
}

impl Interface for UartInterface {
    fn base(&self) -> &InterfaceBase {
        &self.base
    }

    fn kind(&self) -> &'static str {
        "uart"
    }

    fn apply_directive(&self, directive: &Directive) -> Reply<()> {
        self.directive_reply(directive).unwrap_or_else(failed)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
