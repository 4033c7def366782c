use std::time::Duration;

use ifbridge_config::Timeouts;
use ifbridge_frame::FrameConfig;

/// Codec timeouts and framing limits.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Bound on the IDENTIFY exchange at the start of `connect`.
    pub identify_timeout: Duration,
    /// Bound on applying the system and interface configuration sequences.
    pub configure_timeout: Duration,
    /// Bound on a liveness ping.
    pub ping_timeout: Duration,
    /// Inbound framing limits.
    pub frame: FrameConfig,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self::from_timeouts(&Timeouts::default())
    }
}

impl CodecConfig {
    /// Take timeouts from a device file, keeping default framing limits.
    pub fn from_timeouts(timeouts: &Timeouts) -> Self {
        Self {
            identify_timeout: timeouts.identify(),
            configure_timeout: timeouts.configure(),
            ping_timeout: timeouts.ping(),
            frame: FrameConfig::default(),
        }
    }
}
