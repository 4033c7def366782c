//! Request/response correlation, hardware interfaces and connection lifecycle
//! for ifbridge controllers.
//!
//! A [`Codec`] sits between the host API and a byte-stream [`Transport`]:
//! - outbound, each interface builds command packets and registers a pending
//!   reply keyed by address, command and parameters
//! - inbound, received bytes are framed, routed by interface type and matched
//!   to the oldest pending request with the same key
//!
//! Interfaces: GPIO, UART, register (SPI-like, with command-word parity),
//! custom and the reserved `system` interface.
//!
//! [`Transport`]: ifbridge_transport::Transport

pub mod builder;
pub mod codec;
pub mod config;
pub mod crc;
pub mod custom;
pub mod error;
pub mod gpio;
pub mod interface;
pub mod pending;
pub mod register;
pub mod registry;
pub mod system;
pub mod transfer;
pub mod uart;

pub use builder::build_interface;
pub use codec::{Codec, CodecState};
pub use config::CodecConfig;
pub use crc::{Checksum, Crc32, CHECKSUM_LEN};
pub use custom::{CustomInterface, CustomOps};
pub use error::{CodecError, DirectiveOutcome, Result};
pub use gpio::{GpioInterface, GpioInterrupt, InterruptOptions, PinMode};
pub use interface::{
    params, EventCallback, Interface, InterfaceBase, Params, Reply, ReplyHandler, CONFIG, ENABLE,
    READ, WRITE,
};
pub use pending::{Completion, PendingKey, PendingReply, PendingTable};
pub use register::{RegisterInterface, SpiSettings};
pub use registry::InterfaceRegistry;
pub use system::{AcceptAny, FirmwareCheck, FirmwareInfo, MinimumVersion, SystemInterface};
pub use uart::{UartData, UartInterface, UartParity, UartSettings};
