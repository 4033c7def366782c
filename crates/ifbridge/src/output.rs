use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use ifbridge_frame::{interface_type_name, Packet, PARAM_COUNT};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// JSON view of one packet.
#[derive(Debug, Serialize)]
pub struct PacketOutput {
    pub interface: &'static str,
    pub if_type: u8,
    pub unit: u8,
    pub command: u16,
    pub status: u32,
    pub packet_num: u16,
    pub transfer_len: u32,
    pub params: [u32; PARAM_COUNT],
    pub payload_len: usize,
    pub payload: String,
}

impl From<&Packet> for PacketOutput {
    fn from(packet: &Packet) -> Self {
        let address = packet.address();
        Self {
            interface: interface_type_name(address.if_type),
            if_type: address.if_type,
            unit: address.unit,
            command: packet.command_code(),
            status: packet.status(),
            packet_num: packet.header.packet_num,
            transfer_len: packet.header.transfer_len,
            params: *packet.params(),
            payload_len: packet.payload.len(),
            payload: hex::encode(&packet.payload),
        }
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

pub fn print_packets(packets: &[Packet], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out: Vec<PacketOutput> = packets.iter().map(PacketOutput::from).collect();
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = new_table(vec![
                "ADDRESS", "CMD", "STATUS", "PKT", "PARAMS", "SIZE", "PAYLOAD",
            ]);
            for packet in packets {
                table.add_row(vec![
                    packet.address().to_string(),
                    packet.command_code().to_string(),
                    packet.status().to_string(),
                    packet.header.packet_num.to_string(),
                    params_preview(packet.params()),
                    packet.payload.len().to_string(),
                    payload_preview(&packet.payload),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for packet in packets {
                println!(
                    "{} cmd={} status={} params=[{}] size={} payload={}",
                    packet.address(),
                    packet.command_code(),
                    packet.status(),
                    params_preview(packet.params()),
                    packet.payload.len(),
                    payload_preview(&packet.payload)
                );
            }
        }
        OutputFormat::Raw => {
            for packet in packets {
                print_raw(&packet.payload);
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Non-zero parameters up to the last one set.
fn params_preview(params: &[u32; PARAM_COUNT]) -> String {
    let used = params.iter().rposition(|&p| p != 0).map_or(0, |i| i + 1);
    params[..used]
        .iter()
        .map(|p| format!("0x{p:X}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) if text.chars().all(|c| !c.is_control() || c == '\n') => text.to_string(),
        _ => hex::encode(payload),
    }
}

#[cfg(test)]
mod tests {
    use ifbridge_frame::{Address, GPIO};

    use super::*;

    #[test]
    fn params_preview_trims_trailing_zeros() {
        let mut params = [0; PARAM_COUNT];
        params[0] = 0x0F;
        params[2] = 5;
        assert_eq!(params_preview(&params), "0xF,0x0,0x5");
        assert_eq!(params_preview(&[0; PARAM_COUNT]), "");
    }

    #[test]
    fn binary_payloads_preview_as_hex() {
        assert_eq!(payload_preview(b"hello"), "hello");
        assert_eq!(payload_preview(&[0x00, 0xFF]), "00ff");
    }

    #[test]
    fn packet_output_fields() {
        let packet = Packet::command(Address::new(GPIO, 1), 2, [0; PARAM_COUNT])
            .with_payload(&b"\x01"[..]);
        let out = PacketOutput::from(&packet);
        assert_eq!(out.interface, "GPIO");
        assert_eq!(out.unit, 1);
        assert_eq!(out.payload, "01");
    }
}
