//! Fixed-header packet format and stream framing for ifbridge controllers.
//!
//! Every packet carries a 52-byte little-endian header:
//! - A 2-byte signature (`0xA55A`) for stream synchronization
//! - Type, status, multi-packet transfer length and sequence number
//! - The payload length, the `(interface type, unit)` address and command
//! - Eight 32-bit command parameters
//!
//! followed by up to 65535 payload bytes. [`FrameDecoder`] recovers packets
//! from an arbitrarily chunked byte stream.

pub mod address;
pub mod codec;
pub mod decoder;
pub mod error;
pub mod reader;

#[cfg(feature = "async")]
pub mod framed;

pub use address::{interface_type_name, Address, CUSTOM_TYPE_START, GPIO, SPI, SYSTEM, UART};
pub use codec::{
    packet_length, FrameConfig, Packet, PacketHeader, CORRELATION_LEN, DEFAULT_MAX_PAYLOAD,
    DEFAULT_MAX_TRANSFER, DEFAULT_MAX_TRANSFERS, HEADER_SIZE, PACKET_TYPE_COMMAND, PARAM_COUNT,
    SIGNATURE,
};
pub use decoder::{DecoderState, FrameDecoder};
pub use error::{FrameError, Result};
pub use reader::PacketReader;

#[cfg(feature = "async")]
pub use framed::PacketCodec;
