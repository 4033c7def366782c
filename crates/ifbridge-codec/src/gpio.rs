//! GPIO banks.

use std::any::Any;
use std::sync::Arc;

use bytes::Bytes;
use ifbridge_config::{parse_settings, Directive, Edge};
use ifbridge_frame::{Packet, GPIO};
use ifbridge_transport::Transport;
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, Result};
use crate::interface::{
    ack, failed, params, reply, status_reply, Interface, InterfaceBase, Reply,
    CONFIG, ENABLE, READ, WRITE,
};

/// Register (or re-arm) a pin-change interrupt.
pub const REGISTER_INT: u16 = 4;

/// Pin mode, sent as `p1` of CONFIG.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PinMode {
    #[default]
    Input,
    Output,
    OpenDrain,
    PullUp,
    PullDown,
}

impl PinMode {
    pub fn code(self) -> u32 {
        match self {
            PinMode::Input => 0,
            PinMode::Output => 1,
            PinMode::OpenDrain => 2,
            PinMode::PullUp => 3,
            PinMode::PullDown => 4,
        }
    }
}

/// Interrupt trigger options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterruptOptions {
    pub edge: Edge,
    pub debounce_ms: u32,
}

/// Unsolicited pin-change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioInterrupt {
    pub unit: u8,
    /// Pins that triggered.
    pub mask: u32,
    /// Pin levels at the time of the interrupt.
    pub values: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigSettings {
    #[serde(default = "all_pins")]
    mask: u32,
    #[serde(default)]
    mode: PinMode,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteSettings {
    #[serde(default = "all_pins")]
    mask: u32,
    value: u32,
}

fn all_pins() -> u32 {
    u32::MAX
}

/// GPIO interface (type `0x04`).
#[derive(Debug)]
pub struct GpioInterface {
    base: InterfaceBase,
}

impl GpioInterface {
    pub fn new(name: impl Into<String>, unit: u8, transport: Arc<dyn Transport>) -> Self {
        Self::with_type(name, GPIO, unit, transport)
    }

    /// GPIO interface mounted at a non-default interface type.
    pub fn with_type(
        name: impl Into<String>,
        if_type: u8,
        unit: u8,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let base = InterfaceBase::new(name, if_type, unit, transport);
        base.register_handler(ENABLE, status_reply("gpio enable"));
        base.register_handler(CONFIG, status_reply("gpio config"));
        base.register_handler(WRITE, status_reply("gpio write"));
        base.register_handler(READ, status_reply("gpio read"));
        base.register_handler(REGISTER_INT, status_reply("gpio register interrupt"));
        Self { base }
    }

    /// Enable or disable the pins in `mask`.
    pub fn enable(&self, unit: u8, mask: u32, on: bool) -> Reply<()> {
        ack(self.base.request(unit, ENABLE, params(&[mask, u32::from(on)])))
    }

    /// Set the mode of the pins in `mask`.
    pub fn configure(&self, unit: u8, mask: u32, mode: PinMode) -> Reply<()> {
        ack(self.base.request(unit, CONFIG, params(&[mask, mode.code()])))
    }

    /// Drive the pins in `mask` to the matching bits of `value`.
    pub fn write(&self, unit: u8, mask: u32, value: u32) -> Reply<()> {
        ack(self.base.request(unit, WRITE, params(&[mask, value])))
    }

    /// Write two `(mask, value)` pairs in one request.
    pub fn write_banks(&self, unit: u8, first: (u32, u32), second: (u32, u32)) -> Reply<()> {
        ack(self.base.request(
            unit,
            WRITE,
            params(&[first.0, first.1, second.0, second.1]),
        ))
    }

    /// Read the raw reply payload for the pins in `mask`.
    pub fn read(&self, unit: u8, mask: u32) -> Reply<Bytes> {
        reply(self.base.request(unit, READ, params(&[mask])), |packet| {
            Ok(packet.payload)
        })
    }

    /// Read pin levels as a little-endian word.
    pub fn read_pins(&self, unit: u8, mask: u32) -> Reply<u32> {
        reply(self.base.request(unit, READ, params(&[mask])), |packet| {
            let Some(word) = packet.payload.get(..4) else {
                return Err(CodecError::InvalidReply(format!(
                    "gpio read returned {} bytes, expected 4",
                    packet.payload.len()
                )));
            };
            Ok(u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
        })
    }

    /// Ask the controller to report changes on the pins in `mask`.
    pub fn register_interrupt(&self, unit: u8, mask: u32, options: InterruptOptions) -> Reply<()> {
        ack(self.base.request(
            unit,
            REGISTER_INT,
            params(&[mask, options.edge.code(), options.debounce_ms]),
        ))
    }

    /// Receive pin-change notifications.
    ///
    /// Other unsolicited packets are ignored.
    pub fn on_interrupt<F>(&self, callback: F)
    where
        F: Fn(GpioInterrupt) + Send + Sync + 'static,
    {
        self.base.set_event_callback(Arc::new(move |packet: Packet| {
            if packet.command_code() != REGISTER_INT {
                return;
            }
            callback(GpioInterrupt {
                unit: packet.header.unit(),
                mask: packet.params()[0],
                values: packet.params()[1],
            });
        }));
    }

    fn directive_reply(&self, directive: &Directive) -> Result<Reply<()>> {
        let unit = directive.unit().unwrap_or(self.base.unit());
        Ok(match directive {
            Directive::Enable { mask, enable, .. } => self.enable(unit, *mask, *enable),
            Directive::Config { settings, .. } => {
                let settings: ConfigSettings = parse_settings("config", settings)?;
                self.configure(unit, settings.mask, settings.mode)
            }
            Directive::Write { settings, .. } => {
                let settings: WriteSettings = parse_settings("write", settings)?;
                self.write(unit, settings.mask, settings.value)
            }
            Directive::RegisterInt {
                mask,
                edge,
                debounce_ms,
                ..
            } => self.register_interrupt(
                unit,
                *mask,
                InterruptOptions {
                    edge: *edge,
                    debounce_ms: *debounce_ms,
                },
            ),
        })
    }
}

impl Interface for GpioInterface {
    fn base(&self) -> &InterfaceBase {
        &self.base
    }

    fn kind(&self) -> &'static str {
        "gpio"
    }

    fn apply_directive(&self, directive: &Directive) -> Reply<()> {
        self.directive_reply(directive).unwrap_or_else(failed)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use ifbridge_frame::{HEADER_SIZE, PARAM_COUNT};
    use ifbridge_transport::MemoryTransport;
    use serde_json::json;

    use super::*;

    fn setup() -> (Arc<MemoryTransport>, GpioInterface) {
        let transport = Arc::new(MemoryTransport::new());
        let gpio = GpioInterface::new("pins", 0, transport.clone());
        (transport, gpio)
    }

    fn last_sent(transport: &MemoryTransport) -> Packet {
        let mut sent = transport.take_sent();
        Packet::decode(&sent.pop().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn write_request_layout() {
        let (transport, gpio) = setup();
        let reply = gpio.write(0, 0x0F, 0x05);

        let sent = transport.take_sent();
        assert_eq!(sent[0].len(), HEADER_SIZE);
        let request = Packet::decode(&sent[0]).unwrap();
        assert_eq!(request.header.command, WRITE);
        assert_eq!(request.header.if_type_unit, 0x0400);
        assert_eq!(request.params()[0], 0x0F);
        assert_eq!(request.params()[1], 0x05);
        assert_eq!(request.header.payload_len, 0);

        gpio.decode(request);
        reply.await.unwrap();
    }

    #[tokio::test]
    async fn read_pins_decodes_word() {
        let (transport, gpio) = setup();
        let reply = gpio.read_pins(2, 0xFF);
        let request = last_sent(&transport);
        assert_eq!(request.header.unit(), 2);

        gpio.decode(request.with_payload(0xA5u32.to_le_bytes().to_vec()));
        assert_eq!(reply.await.unwrap(), 0xA5);
    }

    #[tokio::test]
    async fn short_read_is_invalid_reply() {
        let (transport, gpio) = setup();
        let reply = gpio.read_pins(0, 0x01);
        gpio.decode(last_sent(&transport).with_payload(&[1u8][..]));
        assert!(matches!(reply.await, Err(CodecError::InvalidReply(_))));
    }

    #[tokio::test]
    async fn same_key_reads_resolve_in_submission_order() {
        let (transport, gpio) = setup();
        let first = gpio.read(0, 0x0F);
        let second = gpio.read(0, 0x0F);
        let other = gpio.read(0, 0xF0);
        let sent: Vec<Packet> = transport
            .take_sent()
            .iter()
            .map(|bytes| Packet::decode(bytes).unwrap())
            .collect();

        gpio.decode(sent[2].clone().with_payload(&b"other"[..]));
        gpio.decode(sent[1].clone().with_payload(&b"one"[..]));
        gpio.decode(sent[0].clone().with_payload(&b"two"[..]));

        assert_eq!(&first.await.unwrap()[..], b"one");
        assert_eq!(&second.await.unwrap()[..], b"two");
        assert_eq!(&other.await.unwrap()[..], b"other");
    }

    #[tokio::test]
    async fn non_zero_status_rejects_with_code() {
        let (transport, gpio) = setup();
        let reply = gpio.enable(0, 0x3, true);
        let request = last_sent(&transport);
        assert_eq!(request.params()[1], 1);

        gpio.decode(request.with_status(0x42));
        let err = reply.await.unwrap_err();
        assert!(err.to_string().contains("status 66"));
    }

    #[tokio::test]
    async fn interrupts_are_delivered_to_callback() {
        let (transport, gpio) = setup();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        gpio.on_interrupt(move |event| sink.lock().unwrap().push(event));

        let reply = gpio.register_interrupt(
            1,
            0x01,
            InterruptOptions {
                edge: Edge::Falling,
                debounce_ms: 20,
            },
        );
        let request = last_sent(&transport);
        assert_eq!(request.command_code(), REGISTER_INT);
        assert_eq!(&request.params()[..3], &[0x01, 2, 20]);
        gpio.decode(request);
        reply.await.unwrap();

        let mut notification = [0u32; PARAM_COUNT];
        notification[0] = 0x01;
        notification[1] = 0x00;
        gpio.decode(Packet::command(gpio.base().address(1), REGISTER_INT, notification));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![GpioInterrupt {
                unit: 1,
                mask: 0x01,
                values: 0x00
            }]
        );
    }

    #[tokio::test]
    async fn directives_map_to_requests() {
        let (transport, gpio) = setup();
        let sequence: Vec<Directive> = serde_json::from_value(json!([
            {"command": "enable", "mask": 15},
            {"command": "config", "mask": 15, "mode": "output"},
            {"command": "write", "unit": 3, "mask": 15, "value": 5},
            {"command": "registerInt", "mask": 1}
        ]))
        .unwrap();

        let replies: Vec<Reply<()>> = sequence.iter().map(|d| gpio.apply_directive(d)).collect();
        let sent: Vec<Packet> = transport
            .take_sent()
            .iter()
            .map(|bytes| Packet::decode(bytes).unwrap())
            .collect();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[1].params()[1], PinMode::Output.code());
        assert_eq!(sent[2].header.unit(), 3);
        assert_eq!(sent[3].params()[1], Edge::Both.code());

        for packet in sent {
            gpio.decode(packet);
        }
        for reply in replies {
            reply.await.unwrap();
        }
    }

    #[tokio::test]
    async fn bad_settings_fail_without_transmitting() {
        let (transport, gpio) = setup();
        let directive: Directive =
            serde_json::from_value(json!({"command": "write", "mask": 1})).unwrap();
        let err = gpio.apply_directive(&directive).await.unwrap_err();
        assert!(matches!(err, CodecError::Config(_)));
        assert_eq!(transport.sent_count(), 0);
    }
}
