use clap::{Args, Subcommand};
use std::path::PathBuf;

use ifbridge_frame::{DEFAULT_MAX_PAYLOAD, GPIO, SPI, SYSTEM, UART};

use crate::exit::{CliError, CliResult};
use crate::output::OutputFormat;

pub mod check;
pub mod decode;
pub mod encode;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build one request packet.
    Encode(EncodeArgs),
    /// Recover packets from a captured byte stream.
    Decode(DecodeArgs),
    /// Validate a device configuration file and summarise it.
    Check(CheckArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Check(args) => check::run(args, format),
        Command::Version(args) => version::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Interface type: gpio, uart, spi, system or a number (e.g. 0x82).
    #[arg(long, short = 'i')]
    pub interface: String,
    /// Hardware unit within the interface.
    #[arg(long, short = 'u', default_value = "0")]
    pub unit: String,
    /// Command opcode.
    #[arg(long, short = 'c')]
    pub command: String,
    /// Command parameters (comma-separated, decimal or 0x-prefixed), at most 8.
    #[arg(long = "param", short = 'p', value_delimiter = ',')]
    pub params: Vec<String>,
    /// Payload as hex.
    #[arg(long, conflicts_with = "text")]
    pub payload: Option<String>,
    /// Payload as UTF-8 text.
    #[arg(long, conflicts_with = "payload")]
    pub text: Option<String>,
    /// Write the encoded packet to this file.
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Captured stream; stdin when omitted or `-`.
    pub input: Option<PathBuf>,
    /// Input is hex text (whitespace ignored).
    #[arg(long)]
    pub hex: bool,
    /// Largest payload accepted before a header is treated as corrupt.
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD)]
    pub max_payload: usize,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Device file, or a directory of `*.device.json` files.
    pub path: PathBuf,
    /// Reject unknown properties.
    #[arg(long)]
    pub strict: bool,
    /// Skip JSON Schema validation.
    #[arg(long)]
    pub no_schema: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse a decimal or `0x`-prefixed integer.
pub fn parse_number(what: &str, text: &str) -> CliResult<u64> {
    let text = text.trim();
    let parsed = match text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        Some(digits) => u64::from_str_radix(&digits.replace('_', ""), 16),
        None => text.replace('_', "").parse::<u64>(),
    };
    parsed.map_err(|err| CliError::usage(format!("invalid {what} '{text}': {err}")))
}

/// Parse an integer that must fit the target type.
pub fn parse_bounded<T: TryFrom<u64>>(what: &str, text: &str) -> CliResult<T> {
    let value = parse_number(what, text)?;
    T::try_from(value).map_err(|_| CliError::usage(format!("{what} {value} is out of range")))
}

/// Resolve an interface type by name or number.
pub fn parse_interface(text: &str) -> CliResult<u8> {
    match text.to_ascii_lowercase().as_str() {
        "system" => Ok(SYSTEM),
        "uart" => Ok(UART),
        "spi" | "register" => Ok(SPI),
        "gpio" => Ok(GPIO),
        _ => parse_bounded("interface type", text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_accept_hex_and_decimal() {
        assert_eq!(parse_number("param", "0x0F").unwrap(), 15);
        assert_eq!(parse_number("param", "1_000").unwrap(), 1000);
        assert!(parse_number("param", "ten").is_err());
    }

    #[test]
    fn bounded_rejects_overflow() {
        assert_eq!(parse_bounded::<u8>("unit", "255").unwrap(), 255);
        let err = parse_bounded::<u8>("unit", "256").unwrap_err();
        assert_eq!(err.code, crate::exit::USAGE);
    }

    #[test]
    fn interface_names_resolve() {
        assert_eq!(parse_interface("GPIO").unwrap(), GPIO);
        assert_eq!(parse_interface("register").unwrap(), SPI);
        assert_eq!(parse_interface("0x82").unwrap(), 0x82);
        assert!(parse_interface("can").is_err());
    }
}
