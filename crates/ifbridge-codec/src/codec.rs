//! Codec / router: owns the frame decoder and the interface registry, routes
//! inbound packets by interface type and sequences connect/disconnect.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use ifbridge_config::SYSTEM_INTERFACE_NAME;
use ifbridge_frame::{FrameDecoder, SYSTEM};
use ifbridge_transport::Transport;
use tracing::{debug, info, warn};

use crate::config::CodecConfig;
use crate::error::{CodecError, Result};
use crate::interface::Interface;
use crate::registry::InterfaceRegistry;
use crate::system::{FirmwareCheck, FirmwareInfo, SystemInterface};

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecState {
    Unconfigured,
    Configured,
    Connecting,
    Connected,
    Disconnected,
}

impl fmt::Display for CodecState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CodecState::Unconfigured => "unconfigured",
            CodecState::Configured => "configured",
            CodecState::Connecting => "connecting",
            CodecState::Connected => "connected",
            CodecState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Host side of one controller connection.
///
/// Outbound requests go straight to the transport; whoever owns the read
/// side feeds received bytes to [`Codec::decode`].
pub struct Codec {
    transport: Arc<dyn Transport>,
    config: CodecConfig,
    state: Mutex<CodecState>,
    decoder: Mutex<FrameDecoder>,
    registry: RwLock<InterfaceRegistry>,
    system: Arc<SystemInterface>,
    firmware: Mutex<Option<FirmwareInfo>>,
}

impl Codec {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, CodecConfig::default())
    }

    pub fn with_config(transport: Arc<dyn Transport>, config: CodecConfig) -> Self {
        let system = Arc::new(SystemInterface::new(transport.clone()));
        Self {
            decoder: Mutex::new(FrameDecoder::with_config(&config.frame)),
            transport,
            config,
            state: Mutex::new(CodecState::Unconfigured),
            registry: RwLock::new(InterfaceRegistry::new()),
            system,
            firmware: Mutex::new(None),
        }
    }

    /// The transport interfaces of this codec should send through.
    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn state(&self) -> CodecState {
        *self.state_guard()
    }

    pub fn system(&self) -> Arc<SystemInterface> {
        self.system.clone()
    }

    /// Firmware identity from the last successful connect.
    pub fn firmware(&self) -> Option<FirmwareInfo> {
        self.firmware
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn interface(&self, name: &str) -> Result<Arc<dyn Interface>> {
        self.registry_read()
            .by_name(name)
            .ok_or_else(|| CodecError::UnknownInterface(name.to_string()))
    }

    /// Look up an interface by name as its concrete type.
    pub fn interface_as<T: Interface + 'static>(&self, name: &str) -> Result<Arc<T>> {
        let interface = self.interface(name)?;
        let kind = interface.kind();
        interface.into_any().downcast::<T>().map_err(|_| {
            CodecError::InvalidRequest(format!("interface '{name}' is a {kind} interface"))
        })
    }

    /// Registered interface names, `system` first.
    pub fn interface_names(&self) -> Vec<String> {
        self.registry_read().names()
    }

    /// Replace the interface set. Not allowed while connecting or connected.
    ///
    /// The previous registry is discarded entirely; the `system` interface is
    /// always registered first.
    pub fn configure(&self, interfaces: Vec<Arc<dyn Interface>>) -> Result<()> {
        let mut state = self.state_guard();
        if matches!(*state, CodecState::Connecting | CodecState::Connected) {
            return Err(CodecError::InvalidState {
                operation: "configure",
                state: *state,
            });
        }

        let mut registry = InterfaceRegistry::new();
        registry.insert(self.system.clone())?;
        for interface in interfaces {
            if interface.name() == SYSTEM_INTERFACE_NAME || interface.if_type() == SYSTEM {
                return Err(ifbridge_config::ConfigError::Invalid(format!(
                    "interface '{}' collides with the reserved system interface",
                    interface.name()
                ))
                .into());
            }
            registry.insert(interface)?;
        }
        for interface in registry.interfaces() {
            interface.base().set_transfer_limits(&self.config.frame);
        }

        info!(interfaces = ?registry.names(), "codec configured");
        *self.registry_write() = registry;
        self.decoder_guard().reset();
        *state = CodecState::Configured;
        Ok(())
    }

    /// Identify the controller, check its firmware, then apply the system and
    /// interface configuration sequences in registration order.
    ///
    /// The first failure stops later steps, rejects every pending request and
    /// leaves the codec [`CodecState::Disconnected`].
    pub async fn connect<C>(&self, check: &C) -> Result<FirmwareInfo>
    where
        C: FirmwareCheck + ?Sized,
    {
        {
            let mut state = self.state_guard();
            if matches!(*state, CodecState::Connecting | CodecState::Connected) {
                return Err(CodecError::InvalidState {
                    operation: "connect",
                    state: *state,
                });
            }
            *state = CodecState::Connecting;
        }
        info!(transport = self.transport.name(), "connecting");

        match self.run_connect(check).await {
            Ok(firmware) => {
                *self.firmware.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some(firmware.clone());
                self.set_state(CodecState::Connected);
                info!(%firmware, "connected");
                Ok(firmware)
            }
            Err(err) => {
                warn!(error = %err, "connect failed");
                self.drain();
                self.set_state(CodecState::Disconnected);
                Err(err)
            }
        }
    }

    async fn run_connect<C>(&self, check: &C) -> Result<FirmwareInfo>
    where
        C: FirmwareCheck + ?Sized,
    {
        self.ensure_system()?;

        let firmware = bounded(
            "identify",
            self.config.identify_timeout,
            self.system.identify(),
        )
        .await?;
        debug!(%firmware, "controller identified");
        check
            .check(&firmware)
            .map_err(CodecError::FirmwareIncompatible)?;

        let interfaces: Vec<Arc<dyn Interface>> = self
            .registry_read()
            .interfaces()
            .into_iter()
            .filter(|interface| interface.if_type() != SYSTEM)
            .collect();
        let system = self.system.clone();
        bounded("configure", self.config.configure_timeout, async move {
            let sequence = system.base().sequence();
            system.apply_configuration(&sequence).await?;
            for interface in &interfaces {
                let sequence = interface.base().sequence();
                interface.configure_firmware(&sequence).await?;
                debug!(interface = interface.name(), "interface configured");
            }
            Ok::<(), CodecError>(())
        })
        .await?;

        Ok(firmware)
    }

    /// Feed received bytes. Returns false if any recovered packet addressed an
    /// unregistered interface type.
    ///
    /// Malformed input never fails this call; the decoder resynchronizes.
    pub fn decode(&self, bytes: &[u8]) -> Result<bool> {
        let state = self.state();
        if state == CodecState::Unconfigured {
            return Err(CodecError::InvalidState {
                operation: "decode",
                state,
            });
        }

        let packets = self.decoder_guard().push(bytes);
        let mut routed = true;
        for packet in packets {
            let target = self.registry_read().by_type(packet.header.if_type());
            match target {
                Some(interface) => {
                    interface.decode(packet);
                }
                None => {
                    let err = CodecError::UnroutablePacket(packet.address());
                    warn!(command = packet.command_code(), "{err}");
                    routed = false;
                }
            }
        }
        Ok(routed)
    }

    /// Reject every pending request on every interface. The registry is kept
    /// so a later `connect` reuses the same wiring.
    pub fn disconnect(&self) {
        self.drain();
        let mut state = self.state_guard();
        if *state != CodecState::Unconfigured {
            *state = CodecState::Disconnected;
        }
        info!("disconnected");
    }

    /// Round-trip a PING through the system interface.
    pub async fn ping(&self) -> Result<Duration> {
        let state = self.state();
        if state == CodecState::Unconfigured {
            return Err(CodecError::InvalidState {
                operation: "ping",
                state,
            });
        }
        self.ensure_system()?;

        let started = Instant::now();
        bounded("ping", self.config.ping_timeout, self.system.ping()).await?;
        let rtt = started.elapsed();
        debug!(?rtt, "ping");
        Ok(rtt)
    }

    /// True if the controller answers a ping in time.
    pub async fn is_still_connected(&self) -> bool {
        match self.ping().await {
            Ok(_) => true,
            Err(err) => {
                debug!(error = %err, "liveness check failed");
                false
            }
        }
    }

    /// Outstanding requests across every interface.
    pub fn pending_count(&self) -> usize {
        self.registry_read()
            .interfaces()
            .iter()
            .map(|interface| interface.base().pending_count())
            .sum()
    }

    fn ensure_system(&self) -> Result<()> {
        let mut registry = self.registry_write();
        if !registry.contains_type(SYSTEM) {
            registry.insert(self.system.clone())?;
        }
        Ok(())
    }

    fn drain(&self) {
        let interfaces = self.registry_read().interfaces();
        for interface in interfaces {
            interface.disconnect();
        }
    }

    fn set_state(&self, next: CodecState) {
        *self.state_guard() = next;
    }

    fn state_guard(&self) -> MutexGuard<'_, CodecState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn decoder_guard(&self) -> MutexGuard<'_, FrameDecoder> {
        self.decoder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry_read(&self) -> RwLockReadGuard<'_, InterfaceRegistry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry_write(&self) -> RwLockWriteGuard<'_, InterfaceRegistry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec")
            .field("transport", &self.transport.name())
            .field("state", &self.state())
            .field("interfaces", &self.interface_names())
            .finish_non_exhaustive()
    }
}

/// Bound `operation` by `limit`. Dropping the inner future on expiry purges
/// its pending requests.
async fn bounded<T, F>(operation: &'static str, limit: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(CodecError::NoResponse {
            operation,
            timeout: limit,
        }),
    }
}

#[cfg(test)]
mod tests {
    use ifbridge_frame::{Address, Packet, GPIO, PARAM_COUNT};
    use ifbridge_transport::MemoryTransport;

    use super::*;
    use crate::gpio::GpioInterface;
    use crate::system::AcceptAny;
    use crate::uart::UartInterface;

    fn codec() -> (Arc<MemoryTransport>, Codec) {
        let transport = Arc::new(MemoryTransport::new());
        let codec = Codec::new(transport.clone());
        (transport, codec)
    }

    #[test]
    fn decode_requires_configuration() {
        let (_, codec) = codec();
        assert!(matches!(
            codec.decode(&[0x5A, 0xA5]),
            Err(CodecError::InvalidState {
                state: CodecState::Unconfigured,
                ..
            })
        ));
    }

    #[test]
    fn transfer_limits_apply_to_registered_interfaces() {
        let transport = Arc::new(MemoryTransport::new());
        let mut config = CodecConfig::default();
        config.frame.max_transfer_size = 64;
        config.frame.max_transfers = 2;
        let codec = Codec::with_config(transport.clone(), config);
        let pins = Arc::new(GpioInterface::new("pins", 0, transport.clone()));
        codec
            .configure(vec![pins.clone() as Arc<dyn Interface>])
            .unwrap();

        let slice = |mask: u32, transfer_len: u32| {
            let mut params = [0; PARAM_COUNT];
            params[0] = mask;
            let mut packet =
                Packet::command(Address::new(GPIO, 0), 3, params).with_payload(&b"ab"[..]);
            packet.header.transfer_len = transfer_len;
            packet.encode().unwrap()
        };

        assert!(codec.decode(&slice(1, u32::MAX)).unwrap());
        assert_eq!(pins.base().transfers_in_progress(), 0);

        for mask in 0..10 {
            assert!(codec.decode(&slice(mask, 16)).unwrap());
        }
        assert_eq!(pins.base().transfers_in_progress(), 2);
    }

    #[test]
    fn configure_registers_system_first() {
        let (transport, codec) = codec();
        codec
            .configure(vec![Arc::new(GpioInterface::new("pins", 0, transport.clone()))])
            .unwrap();
        assert_eq!(codec.state(), CodecState::Configured);
        assert_eq!(codec.interface_names(), vec!["system", "pins"]);
        assert!(codec.interface_as::<GpioInterface>("pins").is_ok());
        assert!(matches!(
            codec.interface_as::<UartInterface>("pins"),
            Err(CodecError::InvalidRequest(_))
        ));
        assert!(matches!(
            codec.interface("nope"),
            Err(CodecError::UnknownInterface(_))
        ));
    }

    #[test]
    fn reconfigure_replaces_registry() {
        let (transport, codec) = codec();
        codec
            .configure(vec![Arc::new(GpioInterface::new("pins", 0, transport.clone()))])
            .unwrap();
        codec
            .configure(vec![Arc::new(UartInterface::new("console", 0, transport.clone()))])
            .unwrap();
        assert_eq!(codec.interface_names(), vec!["system", "console"]);
    }

    #[test]
    fn reserved_name_rejected() {
        let (transport, codec) = codec();
        let result = codec.configure(vec![Arc::new(GpioInterface::new(
            "system",
            0,
            transport.clone(),
        ))]);
        assert!(matches!(result, Err(CodecError::Config(_))));
        assert_eq!(codec.state(), CodecState::Unconfigured);
    }

    #[test]
    fn unroutable_packets_are_contained() {
        let (transport, codec) = codec();
        codec
            .configure(vec![Arc::new(GpioInterface::new("pins", 0, transport.clone()))])
            .unwrap();

        let stray = Packet::command(Address::new(0x90, 0), 1, [0; PARAM_COUNT])
            .encode()
            .unwrap();
        assert!(!codec.decode(&stray).unwrap());

        let routed = Packet::command(Address::new(GPIO, 0), 4, [0; PARAM_COUNT])
            .encode()
            .unwrap();
        assert!(codec.decode(&routed).unwrap());
        assert!(codec.decode(&[0xDE, 0xAD, 0xBE, 0xEF]).unwrap());
    }

    #[tokio::test]
    async fn connect_without_reply_times_out() {
        let transport = Arc::new(MemoryTransport::new());
        let config = CodecConfig {
            identify_timeout: Duration::from_millis(20),
            ..CodecConfig::default()
        };
        let codec = Codec::with_config(transport.clone(), config);

        let err = codec.connect(&AcceptAny).await.unwrap_err();
        assert!(matches!(
            err,
            CodecError::NoResponse {
                operation: "identify",
                ..
            }
        ));
        assert_eq!(codec.state(), CodecState::Disconnected);
        assert_eq!(codec.pending_count(), 0);
        assert_eq!(transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn ping_requires_configuration() {
        let (_, codec) = codec();
        assert!(matches!(
            codec.ping().await,
            Err(CodecError::InvalidState { .. })
        ));
        assert!(!codec.is_still_connected().await);
    }

    #[test]
    fn disconnect_keeps_registry() {
        let (transport, codec) = codec();
        codec
            .configure(vec![Arc::new(GpioInterface::new("pins", 0, transport.clone()))])
            .unwrap();
        codec.disconnect();
        assert_eq!(codec.state(), CodecState::Disconnected);
        assert_eq!(codec.interface_names(), vec!["system", "pins"]);
    }

    #[test]
    fn state_display() {
        assert_eq!(CodecState::Connecting.to_string(), "connecting");
    }
}
