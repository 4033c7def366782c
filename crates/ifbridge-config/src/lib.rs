//! Device configuration for ifbridge controllers.
//!
//! A device file names the interfaces a controller exposes and the ordered
//! configuration sequence (enable/config/write/registerInt directives) applied
//! to each of them on connect. Documents are validated against an embedded
//! JSON Schema before they are deserialized.

pub mod config;
pub mod device;
pub mod error;
pub mod loader;
pub mod validator;

pub use config::LoaderConfig;
pub use device::{
    parse_settings, DeviceConfig, Directive, Edge, InterfaceConfig, InterfaceKind, ParityMode,
    Timeouts, SYSTEM_INTERFACE_NAME,
};
pub use error::{ConfigError, Result};
pub use loader::{load_directory, load_file, load_str};
pub use validator::DeviceSchema;
