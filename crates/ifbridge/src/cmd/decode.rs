use std::io::Read;
use std::path::Path;

use ifbridge_frame::{FrameConfig, FrameDecoder, Packet};
use tracing::{info, warn};

use crate::cmd::DecodeArgs;
use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_packets, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let raw = read_input(args.input.as_deref())?;
    let bytes = if args.hex { parse_hex(&raw)? } else { raw };

    let config = FrameConfig {
        max_payload_size: args.max_payload,
        ..FrameConfig::default()
    };
    let (packets, decoder) = decode_stream(&bytes, &config);

    info!(
        input = bytes.len(),
        packets = packets.len(),
        discarded = decoder.discarded(),
        "stream decoded"
    );
    if decoder.buffered() > 0 {
        warn!(
            trailing = decoder.buffered(),
            "stream ends with an incomplete packet"
        );
    }

    if packets.is_empty() {
        return Err(CliError::new(
            DATA_INVALID,
            format!(
                "no packets recovered from {} bytes ({} discarded)",
                bytes.len(),
                decoder.discarded()
            ),
        ));
    }

    print_packets(&packets, format);
    Ok(SUCCESS)
}

fn decode_stream(bytes: &[u8], config: &FrameConfig) -> (Vec<Packet>, FrameDecoder) {
    let mut decoder = FrameDecoder::with_config(config);
    let packets = decoder.push(bytes);
    (packets, decoder)
}

fn read_input(path: Option<&Path>) -> CliResult<Vec<u8>> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::read(path)
            .map_err(|err| io_error(&format!("reading {}", path.display()), err)),
        _ => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .map_err(|err| io_error("reading stdin", err))?;
            Ok(buf)
        }
    }
}

fn parse_hex(raw: &[u8]) -> CliResult<Vec<u8>> {
    let text = std::str::from_utf8(raw)
        .map_err(|err| CliError::new(DATA_INVALID, format!("hex input is not text: {err}")))?;
    let compact: String = text.split_whitespace().collect();
    hex::decode(compact)
        .map_err(|err| CliError::new(DATA_INVALID, format!("invalid hex input: {err}")))
}
