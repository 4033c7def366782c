//! Custom interfaces.
//!
//! A custom interface lives at a configured interface type and speaks the
//! common opcodes with caller-chosen parameters. Reads and writes can be
//! taken over by a [`CustomOps`] strategy, and payloads can carry a trailing
//! checksum.

use std::any::Any;
use std::sync::Arc;

use bytes::Bytes;
use ifbridge_config::{parse_settings, ConfigError, Directive};
use ifbridge_frame::{Packet, PARAM_COUNT};
use ifbridge_transport::Transport;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::crc::{seal, unseal, Checksum};
use crate::error::Result;
use crate::interface::{
    ack, failed, params, rejection, reply, status_reply, unsupported, Interface, InterfaceBase,
    Params, Reply, CONFIG, ENABLE, READ, WRITE,
};

/// Replacement implementation of a custom interface's data path.
///
/// When installed, [`CustomInterface::read`] and [`CustomInterface::write`]
/// delegate here instead of sending the default READ/WRITE packets. The base
/// is passed so implementations can still issue their own requests.
pub trait CustomOps: Send + Sync {
    fn read(&self, base: &InterfaceBase, unit: u8, params: Params) -> Reply<Bytes>;

    fn write(&self, base: &InterfaceBase, unit: u8, params: Params, payload: Bytes) -> Reply<()>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomSettings {
    #[serde(default)]
    params: Vec<u32>,
    #[serde(default)]
    payload: Option<String>,
}

impl CustomSettings {
    fn parse(
        command: &'static str,
        settings: &Map<String, Value>,
    ) -> std::result::Result<(Params, Bytes), ConfigError> {
        let settings: CustomSettings = parse_settings(command, settings)?;
        if settings.params.len() > PARAM_COUNT {
            return Err(ConfigError::InvalidSettings {
                command,
                message: format!(
                    "at most {PARAM_COUNT} params allowed, got {}",
                    settings.params.len()
                ),
            });
        }
        let payload = match settings.payload {
            Some(hex) => hex::decode(hex.trim())
                .map(Bytes::from)
                .map_err(|err| ConfigError::InvalidSettings {
                    command,
                    message: format!("invalid hex payload: {err}"),
                })?,
            None => Bytes::new(),
        };
        Ok((params(&settings.params), payload))
    }
}

/// Interface at a configured type with optional data-path override and checksum.
pub struct CustomInterface {
    base: InterfaceBase,
    ops: Option<Arc<dyn CustomOps>>,
    checksum: Option<Arc<dyn Checksum>>,
}

impl CustomInterface {
    pub fn new(
        name: impl Into<String>,
        if_type: u8,
        unit: u8,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let base = InterfaceBase::new(name, if_type, unit, transport);
        base.register_handler(ENABLE, status_reply("custom enable"));
        base.register_handler(CONFIG, status_reply("custom config"));
        base.register_handler(WRITE, status_reply("custom write"));
        base.register_handler(READ, status_reply("custom read"));
        Self {
            base,
            ops: None,
            checksum: None,
        }
    }

    pub fn with_ops(mut self, ops: Arc<dyn CustomOps>) -> Self {
        self.ops = Some(ops);
        self
    }

    /// Append a checksum to written payloads and verify it on read replies.
    pub fn with_checksum(mut self, checksum: Arc<dyn Checksum>) -> Self {
        self.checksum = Some(checksum);
        self
    }

    pub fn has_ops(&self) -> bool {
        self.ops.is_some()
    }

    pub fn enable(&self, unit: u8, on: bool) -> Reply<()> {
        ack(self.base.request(unit, ENABLE, params(&[u32::from(on)])))
    }

    pub fn configure(&self, unit: u8, params: Params) -> Reply<()> {
        ack(self.base.request(unit, CONFIG, params))
    }

    pub fn write(&self, unit: u8, params: Params, payload: impl Into<Bytes>) -> Reply<()> {
        let payload = payload.into();
        if let Some(ops) = &self.ops {
            return ops.write(&self.base, unit, params, payload);
        }
        let payload = match &self.checksum {
            Some(checksum) => seal(checksum.as_ref(), &payload),
            None => payload,
        };
        ack(self.base.request_with_payload(unit, WRITE, params, payload))
    }

    pub fn read(&self, unit: u8, params: Params) -> Reply<Bytes> {
        if let Some(ops) = &self.ops {
            return ops.read(&self.base, unit, params);
        }
        let checksum = self.checksum.clone();
        reply(self.base.request(unit, READ, params), move |packet| {
            match checksum {
                Some(checksum) => unseal(checksum.as_ref(), &packet.payload),
                None => Ok(packet.payload),
            }
        })
    }

    /// Send an arbitrary opcode and return the raw reply.
    ///
    /// A non-zero reply status rejects with [`CodecError::FirmwareRejected`],
    /// the same as for the common opcodes.
    ///
    /// [`CodecError::FirmwareRejected`]: crate::error::CodecError::FirmwareRejected
    pub fn command(
        &self,
        unit: u8,
        opcode: u16,
        params: Params,
        payload: impl Into<Bytes>,
    ) -> Reply<Packet> {
        reply(
            self.base
                .request_with_payload(unit, opcode, params, payload.into()),
            |packet| match packet.status() {
                0 => Ok(packet),
                _ => Err(rejection(&packet, "custom command")),
            },
        )
    }

    fn directive_reply(&self, directive: &Directive) -> Result<Reply<()>> {
        let unit = directive.unit().unwrap_or(self.base.unit());
        Ok(match directive {
            Directive::Enable { enable, .. } => self.enable(unit, *enable),
            Directive::Config { settings, .. } => {
                let (params, payload) = CustomSettings::parse("config", settings)?;
                if payload.is_empty() {
                    self.configure(unit, params)
                } else {
                    ack(self
                        .base
                        .request_with_payload(unit, CONFIG, params, payload))
                }
            }
            Directive::Write { settings, .. } => {
                let (params, payload) = CustomSettings::parse("write", settings)?;
                self.write(unit, params, payload)
            }
            Directive::RegisterInt { .. } => return Err(unsupported("custom", directive)),
        })
    }
}

impl std::fmt::Debug for CustomInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomInterface")
            .field("base", &self.base)
            .field("ops", &self.ops.is_some())
            .field("checksum", &self.checksum.is_some())
            .finish()
    }
}

impl Interface for CustomInterface {
    fn base(&self) -> &InterfaceBase {
        &self.base
    }

    fn kind(&self) -> &'static str {
        "custom"
    }

    fn apply_directive(&self, directive: &Directive) -> Reply<()> {
        self.directive_reply(directive).unwrap_or_else(failed)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
