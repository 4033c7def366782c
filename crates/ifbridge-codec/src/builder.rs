//! Building a codec from a device file.

use std::sync::Arc;

use ifbridge_config::{DeviceConfig, InterfaceConfig, InterfaceKind};
use ifbridge_transport::Transport;
use tracing::debug;

use crate::codec::Codec;
use crate::config::CodecConfig;
use crate::crc::Crc32;
use crate::custom::CustomInterface;
use crate::error::Result;
use crate::gpio::GpioInterface;
use crate::interface::Interface;
use crate::register::RegisterInterface;
use crate::uart::UartInterface;

/// Instantiate the interface described by one device-file entry, with its
/// configuration sequence attached.
pub fn build_interface(
    config: &InterfaceConfig,
    transport: Arc<dyn Transport>,
) -> Result<Arc<dyn Interface>> {
    let if_type = config.interface_type()?;
    let name = config.name.clone();
    let interface: Arc<dyn Interface> = match config.kind {
        InterfaceKind::Gpio => Arc::new(GpioInterface::with_type(
            name,
            if_type,
            config.unit,
            transport,
        )),
        InterfaceKind::Uart => Arc::new(UartInterface::with_type(
            name,
            if_type,
            config.unit,
            transport,
        )),
        InterfaceKind::Spi => Arc::new(RegisterInterface::with_type(
            name,
            if_type,
            config.unit,
            config.parity.unwrap_or_default(),
            transport,
        )),
        InterfaceKind::Custom => {
            let custom = CustomInterface::new(name, if_type, config.unit, transport);
            if config.checksum {
                Arc::new(custom.with_checksum(Arc::new(Crc32)))
            } else {
                Arc::new(custom)
            }
        }
    };
    interface.base().set_sequence(config.sequence.clone());
    debug!(
        interface = %config.name,
        kind = config.kind.as_str(),
        if_type,
        directives = config.sequence.len(),
        "interface built"
    );
    Ok(interface)
}

impl Codec {
    /// Build a configured codec for `device`, sending through `transport`.
    pub fn from_config(device: &DeviceConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        device.check()?;
        let codec = Codec::with_config(
            transport.clone(),
            CodecConfig::from_timeouts(&device.timeouts),
        );
        codec.system().base().set_sequence(device.system.clone());

        let interfaces = device
            .interfaces
            .iter()
            .map(|interface| build_interface(interface, transport.clone()))
            .collect::<Result<Vec<_>>>()?;
        codec.configure(interfaces)?;
        Ok(codec)
    }
}
