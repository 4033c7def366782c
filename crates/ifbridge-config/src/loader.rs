use std::io::Read;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::config::LoaderConfig;
use crate::device::DeviceConfig;
use crate::error::{ConfigError, Result};
use crate::validator::DeviceSchema;

const DEVICE_FILE_SUFFIX: &str = ".device.json";

/// Parse, validate and check a device configuration document.
pub fn load_str(json: &str, config: &LoaderConfig) -> Result<DeviceConfig> {
    let document: Value = serde_json::from_str(json)?;
    if config.validate_schema {
        DeviceSchema::compile(config.strict_mode)?.validate(&document)?;
    }

    let device: DeviceConfig = serde_json::from_value(document)?;
    device.check()?;
    Ok(device)
}

/// Load a device configuration file.
pub fn load_file(path: &Path, config: &LoaderConfig) -> Result<DeviceConfig> {
    let file = std::fs::File::open(path)
        .map_err(|err| ConfigError::LoadFailed(format!("{}: {err}", path.display())))?;
    let metadata = file
        .metadata()
        .map_err(|err| ConfigError::LoadFailed(format!("{}: {err}", path.display())))?;
    if metadata.len() > config.max_file_size as u64 {
        return Err(ConfigError::LoadFailed(format!(
            "configuration file too large ({} bytes): {}",
            metadata.len(),
            path.display()
        )));
    }

    let read_limit = u64::try_from(config.max_file_size.saturating_add(1)).unwrap_or(u64::MAX);
    let mut content = String::new();
    file.take(read_limit)
        .read_to_string(&mut content)
        .map_err(|err| ConfigError::LoadFailed(format!("{}: {err}", path.display())))?;
    if content.len() > config.max_file_size {
        return Err(ConfigError::LoadFailed(format!(
            "configuration file too large while reading: {}",
            path.display()
        )));
    }

    debug!(path = %path.display(), "loaded device configuration");
    load_str(&content, config)
}

/// Load every `*.device.json` file in a directory, sorted by file name.
pub fn load_directory(path: &Path, config: &LoaderConfig) -> Result<Vec<DeviceConfig>> {
    let entries = std::fs::read_dir(path)
        .map_err(|err| ConfigError::LoadFailed(format!("{}: {err}", path.display())))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| ConfigError::LoadFailed(err.to_string()))?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !file_name.ends_with(DEVICE_FILE_SUFFIX) {
            continue;
        }
        let file_type = entry
            .file_type()
            .map_err(|err| ConfigError::LoadFailed(err.to_string()))?;
        if !file_type.is_file() {
            continue;
        }
        files.push(entry.path());
    }

    if files.len() > config.max_files_from_directory {
        return Err(ConfigError::LoadFailed(format!(
            "device file count exceeds configured max ({}): {}",
            config.max_files_from_directory,
            files.len()
        )));
    }

    files.sort();
    files.iter().map(|file| load_file(file, config)).collect()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::device::{Directive, InterfaceKind};

    const DEVICE: &str = r#"{
        "name": "bench",
        "timeouts": {"identifyMs": 100},
        "system": [{"command": "config", "clockHz": 48000000}],
        "interfaces": [
            {
                "name": "pins",
                "kind": "gpio",
                "sequence": [
                    {"command": "enable", "mask": 15},
                    {"command": "config", "mask": 15, "mode": "output"},
                    {"command": "write", "mask": 15, "value": 5}
                ]
            },
            {"name": "console", "kind": "uart", "unit": 1}
        ]
    }"#;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "ifbridge-config-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn load_str_builds_model() {
        let device = load_str(DEVICE, &LoaderConfig::default()).unwrap();
        assert_eq!(device.name, "bench");
        assert_eq!(device.timeouts.identify_ms, 100);
        assert_eq!(device.system.len(), 1);
        assert_eq!(device.interfaces.len(), 2);

        let pins = device.interface("pins").unwrap();
        assert_eq!(pins.kind, InterfaceKind::Gpio);
        assert_eq!(pins.sequence.len(), 3);
        assert!(matches!(pins.sequence[0], Directive::Enable { mask: 15, .. }));
        assert_eq!(device.interface("console").unwrap().unit, 1);
    }

    #[test]
    fn schema_errors_surface_before_deserialization() {
        let doc = r#"{"name": "", "interfaces": []}"#;
        assert!(matches!(
            load_str(doc, &LoaderConfig::default()),
            Err(ConfigError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn skipping_schema_still_checks_model() {
        let doc = r#"{"name": "x", "interfaces": [{"name": "system", "kind": "gpio"}]}"#;
        let config = LoaderConfig {
            validate_schema: false,
            ..LoaderConfig::default()
        };
        assert!(matches!(load_str(doc, &config), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_json_reported() {
        assert!(matches!(
            load_str("{not json", &LoaderConfig::default()),
            Err(ConfigError::InvalidJson(_))
        ));
    }

    #[test]
    fn load_file_respects_size_limit() {
        let dir = temp_dir("size");
        let path = dir.join("big.device.json");
        std::fs::write(&path, DEVICE).unwrap();

        let config = LoaderConfig {
            max_file_size: 16,
            ..LoaderConfig::default()
        };
        assert!(matches!(
            load_file(&path, &config),
            Err(ConfigError::LoadFailed(_))
        ));
        assert!(load_file(&path, &LoaderConfig::default()).is_ok());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn load_directory_picks_device_files_in_order() {
        let dir = temp_dir("dir");
        std::fs::write(dir.join("b.device.json"), DEVICE.replace("bench", "second")).unwrap();
        std::fs::write(dir.join("a.device.json"), DEVICE).unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let devices = load_directory(&dir, &LoaderConfig::default()).unwrap();
        let names: Vec<&str> = devices.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["bench", "second"]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_is_load_error() {
        let result = load_file(Path::new("/nonexistent/ifbridge.device.json"), &LoaderConfig::default());
        assert!(matches!(result, Err(ConfigError::LoadFailed(_))));
    }
}
