//! SPI-like register bus.
//!
//! Register accesses carry a 16-bit command word in `p0`:
//!
//! ```text
//!  15      14     13                      0
//! ┌──────┬──────┬──────────────────────────┐
//! │parity│ read │ register address         │
//! └──────┴──────┴──────────────────────────┘
//! ```
//!
//! The parity bit covers bits 14..0. A read reply echoes the command word the
//! device actually saw, followed by the register value; a word that fails the
//! parity check or names another register fails the read.

use std::any::Any;
use std::sync::Arc;

use ifbridge_config::{parse_settings, Directive, ParityMode};
use ifbridge_frame::{Packet, SPI};
use ifbridge_transport::Transport;
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, Result};
use crate::interface::{
    ack, failed, params, rejection, reply, status_reply, unsupported, Interface, InterfaceBase,
    Reply, CONFIG, ENABLE, READ, WRITE,
};
use crate::pending::Completion;

pub const ADDRESS_MASK: u16 = 0x3FFF;
pub const READ_FLAG: u16 = 1 << 14;
pub const PARITY_BIT: u16 = 1 << 15;

/// Length of a read reply: returned command word plus the value.
const READ_REPLY_LEN: usize = 6;

/// Parity bit that makes `word` (bits 14..0) satisfy `mode`.
pub fn parity_bit(word: u16, mode: ParityMode) -> bool {
    let odd_ones = (word & !PARITY_BIT).count_ones() % 2 == 1;
    match mode {
        ParityMode::Even => odd_ones,
        ParityMode::Odd => !odd_ones,
    }
}

/// True if the parity bit of `word` is correct for `mode`.
pub fn check_parity(word: u16, mode: ParityMode) -> bool {
    (word & PARITY_BIT != 0) == parity_bit(word, mode)
}

/// Build the command word for a register access.
pub fn command_word(address: u16, read: bool, mode: ParityMode) -> Result<u16> {
    if address > ADDRESS_MASK {
        return Err(CodecError::InvalidRequest(format!(
            "register address 0x{address:04X} exceeds 0x{ADDRESS_MASK:04X}"
        )));
    }
    let mut word = address;
    if read {
        word |= READ_FLAG;
    }
    if parity_bit(word, mode) {
        word |= PARITY_BIT;
    }
    Ok(word)
}

/// Bus settings. CONFIG carries them as `p0..p2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpiSettings {
    pub clock_hz: u32,
    /// Clock polarity/phase mode, 0-3.
    pub mode: u8,
    pub lsb_first: bool,
}

impl Default for SpiSettings {
    fn default() -> Self {
        Self {
            clock_hz: 1_000_000,
            mode: 0,
            lsb_first: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegisterWrite {
    address: u16,
    value: u32,
}

/// Register interface (type `0x02`).
#[derive(Debug)]
pub struct RegisterInterface {
    base: InterfaceBase,
    parity: ParityMode,
}

impl RegisterInterface {
    pub fn new(
        name: impl Into<String>,
        unit: u8,
        parity: ParityMode,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self::with_type(name, SPI, unit, parity, transport)
    }

    pub fn with_type(
        name: impl Into<String>,
        if_type: u8,
        unit: u8,
        parity: ParityMode,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let base = InterfaceBase::new(name, if_type, unit, transport);
        base.register_handler(ENABLE, status_reply("register enable"));
        base.register_handler(CONFIG, status_reply("register config"));
        base.register_handler(WRITE, status_reply("register write"));
        base.register_handler(
            READ,
            Arc::new(move |packet: Packet, completion: Completion| {
                check_read_reply(packet, completion, parity)
            }),
        );
        Self { base, parity }
    }

    pub fn parity(&self) -> ParityMode {
        self.parity
    }

    pub fn enable(&self, unit: u8, on: bool) -> Reply<()> {
        ack(self.base.request(unit, ENABLE, params(&[u32::from(on)])))
    }

    pub fn configure(&self, unit: u8, settings: SpiSettings) -> Reply<()> {
        if settings.mode > 3 {
            return failed(CodecError::InvalidRequest(format!(
                "spi mode must be 0-3, got {}",
                settings.mode
            )));
        }
        ack(self.base.request(
            unit,
            CONFIG,
            params(&[
                settings.clock_hz,
                u32::from(settings.mode),
                u32::from(settings.lsb_first),
            ]),
        ))
    }

    pub fn write_register(&self, unit: u8, address: u16, value: u32) -> Reply<()> {
        match command_word(address, false, self.parity) {
            Ok(word) => ack(self
                .base
                .request(unit, WRITE, params(&[u32::from(word), value]))),
            Err(err) => failed(err),
        }
    }

    /// Read a register. Fails with [`CodecError::ParityError`] if the echoed
    /// command word does not check out.
    pub fn read_register(&self, unit: u8, address: u16) -> Reply<u32> {
        let word = match command_word(address, true, self.parity) {
            Ok(word) => word,
            Err(err) => return failed(err),
        };
        reply(
            self.base.request(unit, READ, params(&[u32::from(word)])),
            |packet| match packet.payload.get(2..READ_REPLY_LEN) {
                Some(value) => Ok(u32::from_le_bytes([value[0], value[1], value[2], value[3]])),
                None => Err(CodecError::InvalidReply("register value missing".into())),
            },
        )
    }

    fn directive_reply(&self, directive: &Directive) -> Result<Reply<()>> {
        let unit = directive.unit().unwrap_or(self.base.unit());
        Ok(match directive {
            Directive::Enable { enable, .. } => self.enable(unit, *enable),
            Directive::Config { settings, .. } => {
                self.configure(unit, parse_settings("config", settings)?)
            }
            Directive::Write { settings, .. } => {
                let write: RegisterWrite = parse_settings("write", settings)?;
                self.write_register(unit, write.address, write.value)
            }
            Directive::RegisterInt { .. } => return Err(unsupported("register", directive)),
        })
    }
}

/// READ reply handler: status, length, then parity and address of the echoed word.
fn check_read_reply(packet: Packet, completion: Completion, parity: ParityMode) {
    if packet.status() != 0 {
        completion.reject(rejection(&packet, "register read"));
        return;
    }
    if packet.payload.len() < READ_REPLY_LEN {
        completion.reject(CodecError::InvalidReply(format!(
            "register read returned {} bytes, expected {READ_REPLY_LEN}",
            packet.payload.len()
        )));
        return;
    }

    let sent = packet.params()[0] as u16;
    let returned = u16::from_le_bytes([packet.payload[0], packet.payload[1]]);
    if !check_parity(returned, parity) || returned & ADDRESS_MASK != sent & ADDRESS_MASK {
        completion.reject(CodecError::ParityError { sent, returned });
        return;
    }
    completion.resolve(packet);
}

impl Interface for RegisterInterface {
    fn base(&self) -> &InterfaceBase {
        &self.base
    }

    fn kind(&self) -> &'static str {
        "spi"
    }

    fn apply_directive(&self, directive: &Directive) -> Reply<()> {
        self.directive_reply(directive).unwrap_or_else(failed)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
