//! Host-side codec for USB hardware-interface bridge controllers.
//!
//! A bridge controller exposes GPIO banks, serial ports, register buses and
//! vendor-specific interfaces over a single byte stream. This crate talks to
//! it with fixed-header packets and correlates each reply with its request.
//!
//! # Crate Structure
//!
//! - [`transport`]: the byte-stream contract and in-memory/channel transports
//! - [`frame`]: the 52-byte packet header and the stream framer
//! - [`config`]: device configuration files and their JSON Schema
//! - [`codec`]: interfaces, request correlation and the connect lifecycle

/// Re-export transport types.
pub mod transport {
    pub use ifbridge_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use ifbridge_frame::*;
}

/// Re-export configuration types.
pub mod config {
    pub use ifbridge_config::*;
}

/// Re-export codec types.
pub mod codec {
    pub use ifbridge_codec::*;
}

pub use ifbridge_codec::{Codec, CodecError, CodecState};
