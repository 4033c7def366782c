use std::collections::HashSet;
use std::time::Duration;

use ifbridge_frame::{GPIO, SPI, SYSTEM, UART};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConfigError, Result};

/// Reserved name of the controller's system interface.
pub const SYSTEM_INTERFACE_NAME: &str = "system";

/// One controller and the interfaces it exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    /// Human-readable device name.
    pub name: String,
    /// Bounded-operation timeouts.
    #[serde(default)]
    pub timeouts: Timeouts,
    /// Directives applied through the system interface before any other interface.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub system: Vec<Directive>,
    /// Interfaces, configured in this order on connect.
    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,
}

impl DeviceConfig {
    /// Check cross-field rules the schema cannot express.
    pub fn check(&self) -> Result<()> {
        let mut names = HashSet::new();
        let mut types = HashSet::new();

        for interface in &self.interfaces {
            if interface.name == SYSTEM_INTERFACE_NAME {
                return Err(ConfigError::Invalid(format!(
                    "interface name '{SYSTEM_INTERFACE_NAME}' is reserved"
                )));
            }
            if !names.insert(interface.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate interface name '{}'",
                    interface.name
                )));
            }

            let if_type = interface.interface_type()?;
            if if_type == SYSTEM {
                return Err(ConfigError::Invalid(format!(
                    "interface '{}' uses the reserved system type",
                    interface.name
                )));
            }
            if !types.insert(if_type) {
                return Err(ConfigError::Invalid(format!(
                    "interface type 0x{if_type:02X} used by more than one interface ('{}')",
                    interface.name
                )));
            }
        }

        Ok(())
    }

    /// Look up an interface by name.
    pub fn interface(&self, name: &str) -> Option<&InterfaceConfig> {
        self.interfaces.iter().find(|i| i.name == name)
    }
}

/// Timeouts for bounded operations, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Timeouts {
    /// Firmware identity query during connect.
    pub identify_ms: u64,
    /// Full interface configuration during connect.
    pub configure_ms: u64,
    /// Liveness ping.
    pub ping_ms: u64,
}

impl Timeouts {
    pub fn identify(&self) -> Duration {
        Duration::from_millis(self.identify_ms)
    }

    pub fn configure(&self) -> Duration {
        Duration::from_millis(self.configure_ms)
    }

    pub fn ping(&self) -> Duration {
        Duration::from_millis(self.ping_ms)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            identify_ms: 250,
            configure_ms: 2000,
            ping_ms: 2000,
        }
    }
}

/// Kind of hardware interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceKind {
    Gpio,
    Uart,
    Spi,
    Custom,
}

impl InterfaceKind {
    /// Interface type used when the configuration does not override it.
    pub fn default_type(self) -> Option<u8> {
        match self {
            InterfaceKind::Gpio => Some(GPIO),
            InterfaceKind::Uart => Some(UART),
            InterfaceKind::Spi => Some(SPI),
            InterfaceKind::Custom => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InterfaceKind::Gpio => "gpio",
            InterfaceKind::Uart => "uart",
            InterfaceKind::Spi => "spi",
            InterfaceKind::Custom => "custom",
        }
    }
}

/// Parity rule for register command words.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParityMode {
    #[default]
    Even,
    Odd,
}

/// Interrupt trigger edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    Rising,
    Falling,
    #[default]
    Both,
}

impl Edge {
    /// Wire code carried in the register-interrupt parameters.
    pub fn code(self) -> u32 {
        match self {
            Edge::Rising => 1,
            Edge::Falling => 2,
            Edge::Both => 3,
        }
    }
}

/// One interface entry of a device file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceConfig {
    /// Symbolic name used for API access.
    pub name: String,
    pub kind: InterfaceKind,
    /// Interface type override; required for custom interfaces.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub if_type: Option<u8>,
    /// Default unit for directives that do not name one.
    #[serde(default)]
    pub unit: u8,
    /// Command-word parity (register interfaces).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parity: Option<ParityMode>,
    /// Append and verify CRC32 on payloads (custom interfaces).
    #[serde(default)]
    pub checksum: bool,
    /// Ordered configuration sequence applied on connect.
    #[serde(default)]
    pub sequence: Vec<Directive>,
}

impl InterfaceConfig {
    /// Effective interface type.
    pub fn interface_type(&self) -> Result<u8> {
        self.if_type
            .or_else(|| self.kind.default_type())
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "interface '{}' of kind {} needs an explicit type",
                    self.name,
                    self.kind.as_str()
                ))
            })
    }
}

/// One configuration directive.
///
/// `config` and `write` carry interface-specific fields; the interface that
/// executes the directive parses them with [`parse_settings`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum Directive {
    Enable {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<u8>,
        #[serde(default = "all_bits")]
        mask: u32,
        #[serde(default = "enabled")]
        enable: bool,
    },
    Config {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<u8>,
        #[serde(flatten)]
        settings: Map<String, Value>,
    },
    Write {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<u8>,
        #[serde(flatten)]
        settings: Map<String, Value>,
    },
    #[serde(rename_all = "camelCase")]
    RegisterInt {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<u8>,
        mask: u32,
        #[serde(default)]
        edge: Edge,
        #[serde(default)]
        debounce_ms: u32,
    },
}

impl Directive {
    /// The directive's `command` tag.
    pub fn command_name(&self) -> &'static str {
        match self {
            Directive::Enable { .. } => "enable",
            Directive::Config { .. } => "config",
            Directive::Write { .. } => "write",
            Directive::RegisterInt { .. } => "registerInt",
        }
    }

    /// Unit named by the directive, if any.
    pub fn unit(&self) -> Option<u8> {
        match self {
            Directive::Enable { unit, .. }
            | Directive::Config { unit, .. }
            | Directive::Write { unit, .. }
            | Directive::RegisterInt { unit, .. } => *unit,
        }
    }
}

fn all_bits() -> u32 {
    u32::MAX
}

fn enabled() -> bool {
    true
}

/// Deserialize the interface-specific fields of a `config`/`write` directive.
pub fn parse_settings<T: DeserializeOwned>(
    command: &'static str,
    settings: &Map<String, Value>,
) -> Result<T> {
    serde_json::from_value(Value::Object(settings.clone())).map_err(|err| {
        ConfigError::InvalidSettings {
            command,
            message: err.to_string(),
        }
    })
}
