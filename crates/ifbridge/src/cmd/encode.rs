use ifbridge_frame::{Address, Packet, PARAM_COUNT};
use serde::Serialize;
use tracing::debug;

use crate::cmd::{parse_bounded, parse_interface, EncodeArgs};
use crate::exit::{frame_error, io_error, CliError, CliResult, SUCCESS};
use crate::output::{new_table, print_json, print_raw, OutputFormat, PacketOutput};

#[derive(Serialize)]
struct EncodeOutput {
    packet: PacketOutput,
    size: usize,
    bytes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    written_to: Option<String>,
}

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let packet = build_packet(&args)?;
    let encoded = packet
        .encode()
        .map_err(|err| frame_error("encoding packet", err))?;
    debug!(address = %packet.address(), size = encoded.len(), "packet encoded");

    if let Some(path) = &args.output {
        std::fs::write(path, &encoded)
            .map_err(|err| io_error(&format!("writing {}", path.display()), err))?;
    }

    match format {
        OutputFormat::Raw => {
            if args.output.is_none() {
                print_raw(&encoded);
            }
        }
        OutputFormat::Json => print_json(&EncodeOutput {
            packet: PacketOutput::from(&packet),
            size: encoded.len(),
            bytes: hex::encode(&encoded),
            written_to: args.output.as_ref().map(|p| p.display().to_string()),
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["FIELD", "VALUE"]);
            table
                .add_row(vec!["address".to_string(), packet.address().to_string()])
                .add_row(vec![
                    "command".to_string(),
                    packet.command_code().to_string(),
                ])
                .add_row(vec![
                    "payload".to_string(),
                    format!("{} bytes", packet.payload.len()),
                ])
                .add_row(vec!["size".to_string(), encoded.len().to_string()])
                .add_row(vec!["bytes".to_string(), hex::encode(&encoded)]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", hex::encode(&encoded)),
    }

    Ok(SUCCESS)
}

fn build_packet(args: &EncodeArgs) -> CliResult<Packet> {
    let if_type = parse_interface(&args.interface)?;
    let unit: u8 = parse_bounded("unit", &args.unit)?;
    let command: u16 = parse_bounded("command", &args.command)?;

    if args.params.len() > PARAM_COUNT {
        return Err(CliError::usage(format!(
            "at most {PARAM_COUNT} params allowed, got {}",
            args.params.len()
        )));
    }
    let mut params = [0u32; PARAM_COUNT];
    for (slot, text) in params.iter_mut().zip(&args.params) {
        *slot = parse_bounded("param", text)?;
    }

    let payload = match (&args.payload, &args.text) {
        (Some(hex_text), _) => {
            let compact: String = hex_text.split_whitespace().collect();
            hex::decode(&compact)
                .map_err(|err| CliError::usage(format!("invalid hex payload: {err}")))?
        }
        (None, Some(text)) => text.clone().into_bytes(),
        (None, None) => Vec::new(),
    };

    Ok(Packet::command(Address::new(if_type, unit), command, params).with_payload(payload))
}

#[cfg(test)]
mod tests {
    use ifbridge_frame::GPIO;

    use super::*;

    fn args(params: &[&str]) -> EncodeArgs {
        EncodeArgs {
            interface: "gpio".into(),
            unit: "0".into(),
            command: "2".into(),
            params: params.iter().map(|p| p.to_string()).collect(),
            payload: None,
            text: None,
            output: None,
        }
    }

    #[test]
    fn builds_gpio_write() {
        let packet = build_packet(&args(&["0x0F", "0x05"])).unwrap();
        assert_eq!(packet.address(), Address::new(GPIO, 0));
        assert_eq!(packet.header.if_type_unit, 0x0400);
        assert_eq!(packet.command_code(), 2);
        assert_eq!(&packet.params()[..3], &[0x0F, 0x05, 0]);
    }

    #[test]
    fn rejects_too_many_params() {
        let err = build_packet(&args(&["1"; 9])).unwrap_err();
        assert_eq!(err.code, crate::exit::USAGE);
    }

    #[test]
    fn hex_payload_ignores_whitespace() {
        let mut args = args(&[]);
        args.payload = Some("de ad\nbe ef".into());
        let packet = build_packet(&args).unwrap();
        assert_eq!(&packet.payload[..], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(packet.header.payload_len, 4);
    }
}
