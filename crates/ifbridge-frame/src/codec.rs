use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::address::Address;
use crate::error::{FrameError, Result};

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 52;

/// Frame start signature (`5A A5` on the wire).
pub const SIGNATURE: u16 = 0xA55A;

/// Signature as it appears in the byte stream.
pub const SIGNATURE_BYTES: [u8; 2] = SIGNATURE.to_le_bytes();

/// Packet type for command frames (the only type currently defined).
pub const PACKET_TYPE_COMMAND: u16 = 0x0001;

/// Number of 32-bit parameter words in every header.
pub const PARAM_COUNT: usize = 8;

/// Byte offset of the little-endian `payloadLen` field.
pub const PAYLOAD_LEN_OFFSET: usize = 14;

/// Byte offset where the correlation range (address, command, params) starts.
pub const CORRELATION_OFFSET: usize = 16;

/// Length of the correlation range: address (2) + command (2) + params (32).
pub const CORRELATION_LEN: usize = HEADER_SIZE - CORRELATION_OFFSET;

/// Largest payload a single packet can carry.
pub const DEFAULT_MAX_PAYLOAD: usize = u16::MAX as usize;

/// Default cap on a reassembled multi-packet transfer (1 MiB).
pub const DEFAULT_MAX_TRANSFER: usize = 1024 * 1024;

/// Default number of multi-packet transfers buffered at once per interface.
pub const DEFAULT_MAX_TRANSFERS: usize = 16;

/// Decoded packet header.
///
/// Wire format (all fields little-endian):
/// ```text
/// ┌───────────┬────────┬──────────┬─────────────┬───────────┬────────────┐
/// │ signature │ type   │ status   │ transferLen │ packetNum │ payloadLen │
/// │ (2B)      │ (2B)   │ (4B)     │ (4B)        │ (2B)      │ (2B)       │
/// ├───────────┴┬───────┴──┬───────┴─────────────┴───────────┴────────────┤
/// │ ifTypeUnit │ command  │ params: 8 × u32                              │
/// │ (2B)       │ (2B)     │ (32B)                                        │
/// └────────────┴──────────┴──────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub signature: u16,
    pub packet_type: u16,
    /// 0 on success, firmware error code otherwise.
    pub status: u32,
    /// Total bytes of a multi-packet transfer (0 or `payload_len` for single packets).
    pub transfer_len: u32,
    /// Sequence number within a multi-packet transfer.
    pub packet_num: u16,
    pub payload_len: u16,
    pub if_type_unit: u16,
    pub command: u16,
    pub params: [u32; PARAM_COUNT],
}

impl PacketHeader {
    /// Header for an outbound command with an empty payload.
    pub fn command(address: Address, command: u16, params: [u32; PARAM_COUNT]) -> Self {
        Self {
            signature: SIGNATURE,
            packet_type: PACKET_TYPE_COMMAND,
            status: 0,
            transfer_len: 0,
            packet_num: 0,
            payload_len: 0,
            if_type_unit: address.to_raw(),
            command,
            params,
        }
    }

    /// The addressed interface and unit.
    pub fn address(&self) -> Address {
        Address::from_raw(self.if_type_unit)
    }

    /// Interface type (top byte of `ifTypeUnit`).
    pub fn if_type(&self) -> u8 {
        (self.if_type_unit >> 8) as u8
    }

    /// Unit (low byte of `ifTypeUnit`).
    pub fn unit(&self) -> u8 {
        (self.if_type_unit & 0xFF) as u8
    }

    /// Serialize the header.
    pub fn write_to(&self, dst: &mut impl BufMut) {
        dst.put_u16_le(self.signature);
        dst.put_u16_le(self.packet_type);
        dst.put_u32_le(self.status);
        dst.put_u32_le(self.transfer_len);
        dst.put_u16_le(self.packet_num);
        dst.put_u16_le(self.payload_len);
        self.write_correlation(dst);
    }

    /// The bytes that identify which request a reply answers:
    /// `ifTypeUnit`, `command` and `params`, exactly as they appear on the wire.
    pub fn correlation_bytes(&self) -> [u8; CORRELATION_LEN] {
        let mut out = [0u8; CORRELATION_LEN];
        let mut dst = &mut out[..];
        self.write_correlation(&mut dst);
        out
    }

    fn write_correlation(&self, dst: &mut impl BufMut) {
        dst.put_u16_le(self.if_type_unit);
        dst.put_u16_le(self.command);
        for param in self.params {
            dst.put_u32_le(param);
        }
    }

    /// Parse a header from the first [`HEADER_SIZE`] bytes of `src`.
    ///
    /// Validates length and signature only.
    pub fn parse(src: &[u8]) -> Result<Self> {
        if src.len() < HEADER_SIZE {
            return Err(FrameError::MalformedPacket {
                len: src.len(),
                min: HEADER_SIZE,
            });
        }

        let mut cur = &src[..HEADER_SIZE];
        let signature = cur.get_u16_le();
        if signature != SIGNATURE {
            return Err(FrameError::InvalidSignature {
                found: signature,
                expected: SIGNATURE,
            });
        }

        let packet_type = cur.get_u16_le();
        let status = cur.get_u32_le();
        let transfer_len = cur.get_u32_le();
        let packet_num = cur.get_u16_le();
        let payload_len = cur.get_u16_le();
        let if_type_unit = cur.get_u16_le();
        let command = cur.get_u16_le();
        let mut params = [0u32; PARAM_COUNT];
        for param in &mut params {
            *param = cur.get_u32_le();
        }

        Ok(Self {
            signature,
            packet_type,
            status,
            transfer_len,
            packet_num,
            payload_len,
            if_type_unit,
            command,
            params,
        })
    }
}

/// One protocol packet: fixed header plus variable payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Bytes,
}

impl Packet {
    /// Build an outbound command packet with an empty payload.
    pub fn command(address: Address, command: u16, params: [u32; PARAM_COUNT]) -> Self {
        Self {
            header: PacketHeader::command(address, command, params),
            payload: Bytes::new(),
        }
    }

    /// Attach a payload, recomputing `payload_len`.
    ///
    /// Payloads longer than `u16::MAX` are rejected later by [`Packet::encode`].
    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.set_payload(payload);
        self
    }

    /// Replace the payload, recomputing `payload_len`.
    pub fn set_payload(&mut self, payload: impl Into<Bytes>) {
        self.payload = payload.into();
        self.header.payload_len = u16::try_from(self.payload.len()).unwrap_or(u16::MAX);
    }

    /// Make `payload_len` agree with the attached payload.
    pub fn sync_payload_len(&mut self) {
        self.header.payload_len = u16::try_from(self.payload.len()).unwrap_or(u16::MAX);
    }

    /// Set the reply status (used when building replies).
    pub fn with_status(mut self, status: u32) -> Self {
        self.header.status = status;
        self
    }

    pub fn address(&self) -> Address {
        self.header.address()
    }

    pub fn command_code(&self) -> u16 {
        self.header.command
    }

    pub fn status(&self) -> u32 {
        self.header.status
    }

    pub fn params(&self) -> &[u32; PARAM_COUNT] {
        &self.header.params
    }

    /// True if this packet is one slice of a larger transfer.
    pub fn is_partial_transfer(&self) -> bool {
        self.header.transfer_len as usize > self.payload.len()
    }

    /// The total wire size of this packet (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Encode into a new buffer of exactly [`Packet::wire_size`] bytes.
    pub fn encode(&self) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(self.wire_size());
        self.encode_into(&mut dst)?;
        Ok(dst.freeze())
    }

    /// Append the encoded packet to `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<()> {
        if self.payload.len() > DEFAULT_MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLarge {
                size: self.payload.len(),
                max: DEFAULT_MAX_PAYLOAD,
            });
        }
        if self.header.payload_len as usize != self.payload.len() {
            return Err(FrameError::PayloadLengthMismatch {
                declared: self.header.payload_len as usize,
                actual: self.payload.len(),
            });
        }

        dst.reserve(self.wire_size());
        self.header.write_to(dst);
        dst.put_slice(&self.payload);
        Ok(())
    }

    /// Decode one packet from the start of `src`.
    ///
    /// The payload is a zero-copy slice of `src`. Trailing bytes after the
    /// declared payload are ignored.
    pub fn decode(src: &Bytes) -> Result<Self> {
        let header = PacketHeader::parse(src)?;
        let declared = header.payload_len as usize;
        let available = src.len() - HEADER_SIZE;
        if declared > available {
            return Err(FrameError::TruncatedPayload {
                declared,
                available,
            });
        }

        let payload = src.slice(HEADER_SIZE..HEADER_SIZE + declared);
        Ok(Self { header, payload })
    }

    /// Decode one packet from a borrowed buffer, copying the payload.
    pub fn decode_slice(src: &[u8]) -> Result<Self> {
        let header = PacketHeader::parse(src)?;
        let declared = header.payload_len as usize;
        let available = src.len() - HEADER_SIZE;
        if declared > available {
            return Err(FrameError::TruncatedPayload {
                declared,
                available,
            });
        }

        let payload = Bytes::copy_from_slice(&src[HEADER_SIZE..HEADER_SIZE + declared]);
        Ok(Self { header, payload })
    }
}

/// Total packet length for a header starting at `offset`.
///
/// Returns 0 when fewer than [`HEADER_SIZE`] bytes are available from
/// `offset` (need more data).
pub fn packet_length(buf: &[u8], offset: usize) -> usize {
    if buf.len() < offset.saturating_add(HEADER_SIZE) {
        return 0;
    }
    let at = offset + PAYLOAD_LEN_OFFSET;
    let payload_len = u16::from_le_bytes([buf[at], buf[at + 1]]) as usize;
    HEADER_SIZE + payload_len
}

/// Configuration for packet decoding.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum accepted payload size in bytes. Default: `u16::MAX`.
    pub max_payload_size: usize,
    /// Largest `transferLen` accepted for multi-packet reassembly.
    pub max_transfer_size: usize,
    /// Transfers an interface buffers at once; the oldest is evicted beyond this.
    pub max_transfers: usize,
    /// Read timeout for blocking readers.
    pub read_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            max_transfer_size: DEFAULT_MAX_TRANSFER,
            max_transfers: DEFAULT_MAX_TRANSFERS,
            read_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::GPIO;

    fn params(values: &[u32]) -> [u32; PARAM_COUNT] {
        let mut out = [0u32; PARAM_COUNT];
        out[..values.len()].copy_from_slice(values);
        out
    }

    #[test]
    fn test_header_is_52_bytes() {
        let packet = Packet::command(Address::new(GPIO, 0), 2, [0; PARAM_COUNT]);
        assert_eq!(packet.encode().unwrap().len(), 52);
        assert_eq!(HEADER_SIZE, 2 + 2 + 4 + 4 + 2 + 2 + 2 + 2 + 32);
    }

    #[test]
    fn test_gpio_write_layout() {
        let packet = Packet::command(Address::new(GPIO, 0), 2, params(&[0x0F, 0x05]));
        let wire = packet.encode().unwrap();

        assert_eq!(&wire[0..2], &SIGNATURE_BYTES);
        assert_eq!(u16::from_le_bytes([wire[14], wire[15]]), 0);
        assert_eq!(u16::from_le_bytes([wire[16], wire[17]]), 0x0400);
        assert_eq!(u16::from_le_bytes([wire[18], wire[19]]), 2);
        assert_eq!(&wire[20..24], &0x0Fu32.to_le_bytes());
        assert_eq!(&wire[24..28], &0x05u32.to_le_bytes());

        let decoded = Packet::decode(&wire).unwrap();
        assert_eq!(decoded.header.command, 2);
        assert_eq!(decoded.header.if_type_unit, 0x0400);
        assert_eq!(decoded.header.params[0], 0x0F);
        assert_eq!(decoded.header.params[1], 0x05);
        assert_eq!(decoded.header.payload_len, 0);
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_encode_decode_roundtrip_with_payload() {
        let mut packet = Packet::command(Address::new(0x81, 2), 7, params(&[1, 2, 3]))
            .with_payload(&b"hello"[..])
            .with_status(9);
        packet.header.transfer_len = 1024;
        packet.header.packet_num = 3;

        let wire = packet.encode().unwrap();
        assert_eq!(wire.len(), packet.wire_size());

        let decoded = Packet::decode(&wire).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.header.transfer_len, 1024);
        assert_eq!(decoded.header.packet_num, 3);
        assert!(decoded.is_partial_transfer());
    }

    #[test]
    fn test_decode_short_buffer() {
        let buf = Bytes::from_static(&[0x5A, 0xA5, 0x01]);
        assert!(matches!(
            Packet::decode(&buf),
            Err(FrameError::MalformedPacket { len: 3, min: HEADER_SIZE })
        ));
    }

    #[test]
    fn test_decode_invalid_signature() {
        let mut wire = BytesMut::from(
            Packet::command(Address::new(GPIO, 0), 0, [0; PARAM_COUNT])
                .encode()
                .unwrap()
                .as_ref(),
        );
        wire[0] = 0xFF;
        let result = Packet::decode(&wire.freeze());
        assert!(matches!(
            result,
            Err(FrameError::InvalidSignature { found: 0xA5FF, .. })
        ));
    }

    #[test]
    fn test_decode_truncated_payload() {
        let packet =
            Packet::command(Address::new(GPIO, 0), 3, [0; PARAM_COUNT]).with_payload(&b"abcd"[..]);
        let wire = packet.encode().unwrap();
        let cut = wire.slice(..HEADER_SIZE + 2);
        assert!(matches!(
            Packet::decode(&cut),
            Err(FrameError::TruncatedPayload {
                declared: 4,
                available: 2
            })
        ));
    }

    #[test]
    fn test_encode_guards_payload_len() {
        let mut packet =
            Packet::command(Address::new(GPIO, 0), 3, [0; PARAM_COUNT]).with_payload(&b"abcd"[..]);
        packet.header.payload_len = 1;
        assert!(matches!(
            packet.encode(),
            Err(FrameError::PayloadLengthMismatch {
                declared: 1,
                actual: 4
            })
        ));

        packet.sync_payload_len();
        assert!(packet.encode().is_ok());
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let packet = Packet::command(Address::new(GPIO, 0), 2, [0; PARAM_COUNT])
            .with_payload(vec![0u8; DEFAULT_MAX_PAYLOAD + 1]);
        assert!(matches!(
            packet.encode(),
            Err(FrameError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_decoded_payload_shares_source() {
        let packet =
            Packet::command(Address::new(GPIO, 0), 3, [0; PARAM_COUNT]).with_payload(&b"xyz"[..]);
        let wire = packet.encode().unwrap();
        let decoded = Packet::decode(&wire).unwrap();
        assert_eq!(decoded.payload.as_ptr(), wire[HEADER_SIZE..].as_ptr());
        assert_eq!(Packet::decode_slice(&wire).unwrap(), decoded);
    }

    #[test]
    fn test_packet_length() {
        let packet =
            Packet::command(Address::new(GPIO, 0), 3, [0; PARAM_COUNT]).with_payload(&b"abcd"[..]);
        let wire = packet.encode().unwrap();

        assert_eq!(packet_length(&wire, 0), HEADER_SIZE + 4);
        assert_eq!(packet_length(&wire[..HEADER_SIZE - 1], 0), 0);
        assert_eq!(packet_length(&wire, 10), 0);
    }

    #[test]
    fn test_correlation_bytes_match_wire() {
        let packet = Packet::command(Address::new(GPIO, 1), 3, params(&[0xFF, 0, 7]));
        let wire = packet.encode().unwrap();
        assert_eq!(
            &packet.header.correlation_bytes()[..],
            &wire[CORRELATION_OFFSET..HEADER_SIZE]
        );
    }
}
