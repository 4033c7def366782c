//! Byte-stream transport contract.
//!
//! The controller is only reachable through an ordered byte stream (USB bulk
//! endpoints, a serial port, a socket to a simulator). The codec needs exactly
//! one capability from it: send a buffer. Received bytes are pushed into the
//! codec by whoever owns the read side.
//!
//! This crate provides the [`Transport`] trait plus three implementations:
//! - [`WriteTransport`]: any `std::io::Write` sink
//! - [`MemoryTransport`]: records outbound frames (tests, dry runs)
//! - [`ChannelTransport`]: tokio unbounded channel (behind `async` feature)

pub mod error;
pub mod memory;
pub mod traits;

#[cfg(feature = "async")]
pub mod channel;

pub use error::{Result, TransportError};
pub use memory::MemoryTransport;
pub use traits::{Transport, WriteTransport};

#[cfg(feature = "async")]
pub use channel::ChannelTransport;
