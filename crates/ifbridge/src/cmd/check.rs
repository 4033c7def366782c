use std::path::Path;
use std::sync::Arc;

use ifbridge_codec::Codec;
use ifbridge_config::{load_directory, load_file, DeviceConfig, LoaderConfig, Timeouts};
use ifbridge_transport::MemoryTransport;
use serde::Serialize;
use tracing::info;

use crate::cmd::CheckArgs;
use crate::exit::{codec_error, config_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{new_table, print_json, OutputFormat};

#[derive(Debug, Serialize)]
struct InterfaceSummary {
    name: String,
    kind: &'static str,
    if_type: u8,
    unit: u8,
    directives: usize,
}

#[derive(Debug, Serialize)]
struct DeviceSummary {
    name: String,
    timeouts: Timeouts,
    system_directives: usize,
    interfaces: Vec<InterfaceSummary>,
}

pub fn run(args: CheckArgs, format: OutputFormat) -> CliResult<i32> {
    let config = LoaderConfig {
        strict_mode: args.strict,
        validate_schema: !args.no_schema,
        ..LoaderConfig::default()
    };
    let context = format!("checking {}", args.path.display());
    let devices = load(&args.path, &config).map_err(|err| config_error(&context, err))?;
    if devices.is_empty() {
        return Err(CliError::new(
            DATA_INVALID,
            format!("{context}: no *.device.json files found"),
        ));
    }

    let mut summaries = Vec::with_capacity(devices.len());
    for device in &devices {
        summaries.push(summarize(device).map_err(|err| {
            codec_error(&format!("{context}: device '{}'", device.name), err)
        })?);
    }
    info!(devices = summaries.len(), "configuration valid");

    print_summaries(&summaries, format);
    Ok(SUCCESS)
}

fn load(path: &Path, config: &LoaderConfig) -> ifbridge_config::Result<Vec<DeviceConfig>> {
    if path.is_dir() {
        load_directory(path, config)
    } else {
        load_file(path, config).map(|device| vec![device])
    }
}

/// Build a codec for the device against a throwaway transport, so every
/// interface entry is instantiated exactly as `connect` would use it.
fn summarize(device: &DeviceConfig) -> ifbridge_codec::Result<DeviceSummary> {
    let codec = Codec::from_config(device, Arc::new(MemoryTransport::new()))?;
    let mut interfaces = Vec::with_capacity(device.interfaces.len());
    for entry in &device.interfaces {
        let built = codec.interface(&entry.name)?;
        interfaces.push(InterfaceSummary {
            name: entry.name.clone(),
            kind: entry.kind.as_str(),
            if_type: built.if_type(),
            unit: entry.unit,
            directives: entry.sequence.len(),
        });
    }
    Ok(DeviceSummary {
        name: device.name.clone(),
        timeouts: device.timeouts,
        system_directives: device.system.len(),
        interfaces,
    })
}

fn print_summaries(summaries: &[DeviceSummary], format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => print_json(summaries),
        OutputFormat::Table => {
            for summary in summaries {
                println!(
                    "{} (identify {} ms, configure {} ms, ping {} ms)",
                    summary.name,
                    summary.timeouts.identify_ms,
                    summary.timeouts.configure_ms,
                    summary.timeouts.ping_ms
                );
                let mut table = new_table(vec!["INTERFACE", "KIND", "TYPE", "UNIT", "DIRECTIVES"]);
                table.add_row(vec![
                    "system".to_string(),
                    "system".to_string(),
                    "0x00".to_string(),
                    "0".to_string(),
                    summary.system_directives.to_string(),
                ]);
                for interface in &summary.interfaces {
                    table.add_row(vec![
                        interface.name.clone(),
                        interface.kind.to_string(),
                        format!("0x{:02X}", interface.if_type),
                        interface.unit.to_string(),
                        interface.directives.to_string(),
                    ]);
                }
                println!("{table}");
            }
        }
        OutputFormat::Pretty => {
            for summary in summaries {
                println!("{}: ok", summary.name);
                for interface in &summary.interfaces {
                    println!(
                        "  {} {} type=0x{:02X} unit={} directives={}",
                        interface.name,
                        interface.kind,
                        interface.if_type,
                        interface.unit,
                        interface.directives
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn summary_resolves_default_types() {
        let device: DeviceConfig = serde_json::from_value(json!({
            "name": "bench",
            "interfaces": [
                {"name": "pins", "kind": "gpio", "sequence": [{"command": "enable"}]},
                {"name": "dac", "kind": "custom", "type": 130}
            ]
        }))
        .unwrap();

        let summary = summarize(&device).unwrap();
        assert_eq!(summary.interfaces.len(), 2);
        assert_eq!(summary.interfaces[0].if_type, 0x04);
        assert_eq!(summary.interfaces[0].directives, 1);
        assert_eq!(summary.interfaces[1].if_type, 0x82);
    }

    #[test]
    fn duplicate_types_fail_summary() {
        let device: DeviceConfig = serde_json::from_value(json!({
            "name": "bench",
            "interfaces": [
                {"name": "a", "kind": "gpio"},
                {"name": "b", "kind": "custom", "type": 4}
            ]
        }))
        .unwrap();
        assert!(summarize(&device).is_err());
    }
}
