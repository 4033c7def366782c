//! Controller housekeeping: identity, system configuration and liveness.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use ifbridge_config::{Directive, SYSTEM_INTERFACE_NAME};
use ifbridge_frame::SYSTEM;
use ifbridge_transport::Transport;
use serde::Serialize;

use crate::error::{CodecError, Result};
use crate::interface::{
    ack, failed, params, reply, status_reply, unsupported, Interface, InterfaceBase, Reply,
    CONFIG, ENABLE, WRITE,
};

pub const IDENTIFY: u16 = 3;
pub const PING: u16 = 5;

/// Fixed part of an IDENTIFY reply: major, minor and patch as `u16`.
const VERSION_LEN: usize = 6;

/// Firmware identity reported by IDENTIFY.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FirmwareInfo {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
    pub name: String,
}

impl FirmwareInfo {
    pub fn new(name: impl Into<String>, major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
            name: name.into(),
        }
    }

    pub fn version(&self) -> (u16, u16, u16) {
        (self.major, self.minor, self.patch)
    }

    /// Parse an IDENTIFY payload: `major u16, minor u16, patch u16` then a UTF-8 name.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() < VERSION_LEN {
            return Err(CodecError::InvalidReply(format!(
                "identify returned {} bytes, expected at least {VERSION_LEN}",
                payload.len()
            )));
        }
        let word = |at: usize| u16::from_le_bytes([payload[at], payload[at + 1]]);
        let name = String::from_utf8_lossy(&payload[VERSION_LEN..])
            .trim_end_matches('\0')
            .to_string();
        Ok(Self {
            major: word(0),
            minor: word(2),
            patch: word(4),
            name,
        })
    }

    /// Encode as an IDENTIFY payload.
    pub fn to_payload(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(VERSION_LEN + self.name.len());
        out.put_u16_le(self.major);
        out.put_u16_le(self.minor);
        out.put_u16_le(self.patch);
        out.put_slice(self.name.as_bytes());
        out.freeze()
    }
}

impl fmt::Display for FirmwareInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{}.{}", self.name, self.major, self.minor, self.patch)
    }
}

/// Deployment policy deciding whether a controller's firmware is usable.
pub trait FirmwareCheck: Send + Sync {
    /// `Err` carries the reason the firmware was refused.
    fn check(&self, info: &FirmwareInfo) -> std::result::Result<(), String>;
}

impl<F> FirmwareCheck for F
where
    F: Fn(&FirmwareInfo) -> std::result::Result<(), String> + Send + Sync,
{
    fn check(&self, info: &FirmwareInfo) -> std::result::Result<(), String> {
        self(info)
    }
}

/// Accept any firmware.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAny;

impl FirmwareCheck for AcceptAny {
    fn check(&self, _info: &FirmwareInfo) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Require the same major version and at least the given minor/patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinimumVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl FirmwareCheck for MinimumVersion {
    fn check(&self, info: &FirmwareInfo) -> std::result::Result<(), String> {
        let wanted = (self.major, self.minor, self.patch);
        if info.major != self.major || info.version() < wanted {
            return Err(format!(
                "firmware {}.{}.{} does not satisfy ^{}.{}.{}",
                info.major, info.minor, info.patch, self.major, self.minor, self.patch
            ));
        }
        Ok(())
    }
}

/// The reserved `system` interface (type `0x00`).
#[derive(Debug)]
pub struct SystemInterface {
    base: InterfaceBase,
}

impl SystemInterface {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let base = InterfaceBase::new(SYSTEM_INTERFACE_NAME, SYSTEM, 0, transport);
        base.register_handler(ENABLE, status_reply("system enable"));
        base.register_handler(CONFIG, status_reply("system config"));
        base.register_handler(WRITE, status_reply("system write"));
        base.register_handler(IDENTIFY, status_reply("identify"));
        base.register_handler(PING, status_reply("ping"));
        Self { base }
    }

    pub fn identify(&self) -> Reply<FirmwareInfo> {
        reply(self.base.request(0, IDENTIFY, params(&[])), |packet| {
            FirmwareInfo::parse(&packet.payload)
        })
    }

    pub fn ping(&self) -> Reply<()> {
        ack(self.base.request(0, PING, params(&[])))
    }

    /// Apply the system-level configuration sequence.
    pub async fn apply_configuration(&self, sequence: &[Directive]) -> Result<()> {
        self.configure_firmware(sequence).await
    }

    /// `config`/`write` settings travel as a JSON payload; the controller
    /// interprets the keys.
    fn directive_reply(&self, directive: &Directive) -> Result<Reply<()>> {
        let unit = directive.unit().unwrap_or(0);
        Ok(match directive {
            Directive::Enable { mask, enable, .. } => ack(self.base.request(
                unit,
                ENABLE,
                params(&[*mask, u32::from(*enable)]),
            )),
            Directive::Config { settings, .. } => {
                let payload = serde_json::to_vec(settings).map_err(|err| {
                    CodecError::InvalidRequest(format!("system config settings: {err}"))
                })?;
                ack(self
                    .base
                    .request_with_payload(unit, CONFIG, params(&[]), payload.into()))
            }
            Directive::Write { settings, .. } => {
                let payload = serde_json::to_vec(settings).map_err(|err| {
                    CodecError::InvalidRequest(format!("system write settings: {err}"))
                })?;
                ack(self
                    .base
                    .request_with_payload(unit, WRITE, params(&[]), payload.into()))
            }
            Directive::RegisterInt { .. } => return Err(unsupported("system", directive)),
        })
    }
}

impl Interface for SystemInterface {
    fn base(&self) -> &InterfaceBase {
        &self.base
    }

    fn kind(&self) -> &'static str {
        "system"
    }

    fn apply_directive(&self, directive: &Directive) -> Reply<()> {
        self.directive_reply(directive).unwrap_or_else(failed)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
