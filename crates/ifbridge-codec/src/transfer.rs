//! Multi-packet reply reassembly.
//!
//! A reply whose `transferLen` exceeds its own payload is one slice of a
//! larger transfer. Slices for one key arrive with consecutive `packetNum`s
//! starting at 0 and may interleave with traffic for other keys.
//!
//! `transferLen` comes off the wire, so it is capped, buffers grow only as
//! slices arrive, and at most a fixed number of transfers are held at once.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use ifbridge_frame::{
    FrameConfig, Packet, PacketHeader, DEFAULT_MAX_TRANSFER, DEFAULT_MAX_TRANSFERS,
};
use tracing::{debug, warn};

use crate::pending::PendingKey;

/// Result of offering a packet to the assembler.
#[derive(Debug)]
pub enum Assembly {
    /// Single packet, or the last slice of a transfer. Carries the full payload.
    Complete(Packet),
    /// More slices are needed.
    Incomplete,
    /// The slice was out of sequence or over the size limit and was discarded.
    Dropped,
}

#[derive(Debug)]
struct PartialTransfer {
    header: PacketHeader,
    expected: usize,
    next_packet: u16,
    started: u64,
    data: BytesMut,
}

/// Per-interface buffer of partially received transfers.
#[derive(Debug)]
pub struct TransferAssembler {
    partial: HashMap<PendingKey, PartialTransfer>,
    max_size: usize,
    max_transfers: usize,
    started: u64,
}

impl Default for TransferAssembler {
    fn default() -> Self {
        Self::with_limits(DEFAULT_MAX_TRANSFER, DEFAULT_MAX_TRANSFERS)
    }
}

impl TransferAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(max_size: usize, max_transfers: usize) -> Self {
        Self {
            partial: HashMap::new(),
            max_size,
            max_transfers: max_transfers.max(1),
            started: 0,
        }
    }

    pub fn with_config(config: &FrameConfig) -> Self {
        Self::with_limits(config.max_transfer_size, config.max_transfers)
    }

    /// Apply new limits. Buffered transfers are discarded.
    pub fn set_limits(&mut self, config: &FrameConfig) {
        *self = Self::with_config(config);
    }

    /// True if `packet` belongs to a multi-packet transfer.
    pub fn is_slice(packet: &Packet) -> bool {
        packet.header.packet_num > 0 || packet.is_partial_transfer()
    }

    /// Offer an inbound packet.
    pub fn accept(&mut self, packet: Packet) -> Assembly {
        if !Self::is_slice(&packet) {
            return Assembly::Complete(packet);
        }

        let key = PendingKey::from(&packet);
        let packet_num = packet.header.packet_num;

        if packet_num == 0 {
            if self.partial.remove(&key).is_some() {
                warn!(%key, "new transfer started before previous one completed");
            }
            let expected = packet.header.transfer_len as usize;
            if expected > self.max_size {
                warn!(
                    %key,
                    transfer_len = expected,
                    max = self.max_size,
                    "transfer exceeds size limit, dropping"
                );
                return Assembly::Dropped;
            }
            if self.partial.len() >= self.max_transfers {
                self.evict_oldest();
            }
            self.started += 1;
            self.partial.insert(
                key,
                PartialTransfer {
                    header: packet.header,
                    expected,
                    next_packet: 1,
                    started: self.started,
                    data: BytesMut::from(&packet.payload[..]),
                },
            );
        } else {
            let Some(transfer) = self.partial.get_mut(&key) else {
                warn!(%key, packet_num, "slice without a transfer start, dropping");
                return Assembly::Dropped;
            };
            if packet_num != transfer.next_packet {
                warn!(
                    %key,
                    expected = transfer.next_packet,
                    found = packet_num,
                    "out-of-sequence slice, dropping partial transfer"
                );
                self.partial.remove(&key);
                return Assembly::Dropped;
            }
            transfer.next_packet = transfer.next_packet.wrapping_add(1);
            transfer.data.extend_from_slice(&packet.payload);
            if transfer.header.status == 0 {
                transfer.header.status = packet.header.status;
            }
        }

        let done = self
            .partial
            .get(&key)
            .is_some_and(|transfer| transfer.data.len() >= transfer.expected);
        if !done {
            debug!(%key, packet_num, "buffered transfer slice");
            return Assembly::Incomplete;
        }

        match self.partial.remove(&key) {
            Some(transfer) => Assembly::Complete(finish(transfer)),
            None => Assembly::Incomplete,
        }
    }

    /// Transfers still waiting for slices.
    pub fn in_progress(&self) -> usize {
        self.partial.len()
    }

    /// Forget every partial transfer.
    pub fn clear(&mut self) {
        self.partial.clear();
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .partial
            .iter()
            .min_by_key(|(_, transfer)| transfer.started)
            .map(|(key, _)| *key);
        if let Some(key) = oldest {
            warn!(%key, "too many transfers in progress, evicting oldest");
            self.partial.remove(&key);
        }
    }
}

fn finish(transfer: PartialTransfer) -> Packet {
    let mut data = transfer.data;
    data.truncate(transfer.expected);
    let payload: Bytes = data.freeze();

    let mut header = transfer.header;
    header.packet_num = 0;
    let mut packet = Packet { header, payload };
    packet.sync_payload_len();
    packet
}

#[cfg(test)]
mod tests {
    use ifbridge_frame::{Address, PARAM_COUNT, UART};

    use super::*;

    fn slice(mask: u32, total: u32, num: u16, data: &'static [u8]) -> Packet {
        let mut params = [0u32; PARAM_COUNT];
        params[0] = mask;
        let mut packet = Packet::command(Address::new(UART, 0), 3, params).with_payload(data);
        packet.header.transfer_len = total;
        packet.header.packet_num = num;
        packet
    }

    #[test]
    fn single_packet_passes_through() {
        let mut assembler = TransferAssembler::new();
        let packet = slice(1, 3, 0, b"abc");
        match assembler.accept(packet.clone()) {
            Assembly::Complete(out) => assert_eq!(out, packet),
            other => panic!("unexpected {other:?}"),
        }

        let plain = slice(1, 0, 0, b"xy");
        assert!(matches!(assembler.accept(plain), Assembly::Complete(_)));
    }

    #[test]
    fn slices_are_joined_in_order() {
        let mut assembler = TransferAssembler::new();
        assert!(matches!(
            assembler.accept(slice(1, 7, 0, b"abc")),
            Assembly::Incomplete
        ));
        assert!(matches!(
            assembler.accept(slice(1, 7, 1, b"de")),
            Assembly::Incomplete
        ));
        match assembler.accept(slice(1, 7, 2, b"fg")) {
            Assembly::Complete(packet) => {
                assert_eq!(&packet.payload[..], b"abcdefg");
                assert_eq!(packet.header.payload_len, 7);
                assert_eq!(packet.header.packet_num, 0);
                assert!(!packet.is_partial_transfer());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(assembler.in_progress(), 0);
    }

    #[test]
    fn interleaved_keys_do_not_mix() {
        let mut assembler = TransferAssembler::new();
        assembler.accept(slice(1, 4, 0, b"ab"));
        assembler.accept(slice(2, 4, 0, b"wx"));
        assert_eq!(assembler.in_progress(), 2);

        match assembler.accept(slice(2, 4, 1, b"yz")) {
            Assembly::Complete(packet) => assert_eq!(&packet.payload[..], b"wxyz"),
            other => panic!("unexpected {other:?}"),
        }
        match assembler.accept(slice(1, 4, 1, b"cd")) {
            Assembly::Complete(packet) => assert_eq!(&packet.payload[..], b"abcd"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn gap_drops_partial_transfer() {
        let mut assembler = TransferAssembler::new();
        assembler.accept(slice(1, 6, 0, b"ab"));
        assert!(matches!(
            assembler.accept(slice(1, 6, 2, b"ef")),
            Assembly::Dropped
        ));
        assert_eq!(assembler.in_progress(), 0);
        assert!(matches!(
            assembler.accept(slice(1, 6, 1, b"cd")),
            Assembly::Dropped
        ));
    }

    #[test]
    fn oversized_transfer_is_dropped() {
        let mut assembler = TransferAssembler::with_limits(8, 4);
        assert!(matches!(
            assembler.accept(slice(1, u32::MAX, 0, b"ab")),
            Assembly::Dropped
        ));
        assert!(matches!(
            assembler.accept(slice(1, 9, 0, b"ab")),
            Assembly::Dropped
        ));
        assert_eq!(assembler.in_progress(), 0);

        assert!(matches!(
            assembler.accept(slice(1, 8, 0, b"ab")),
            Assembly::Incomplete
        ));
        assert_eq!(assembler.in_progress(), 1);
    }

    #[test]
    fn buffer_grows_with_slices_only() {
        let mut assembler = TransferAssembler::new();
        assembler.accept(slice(1, DEFAULT_MAX_TRANSFER as u32, 0, b"abcd"));
        let transfer = assembler.partial.values().next().unwrap();
        assert!(transfer.data.capacity() < 1024);
    }

    #[test]
    fn oldest_transfer_evicted_at_capacity() {
        let mut assembler = TransferAssembler::with_limits(64, 2);
        for mask in 0..1000 {
            assembler.accept(slice(mask, 16, 0, b"ab"));
        }
        assert_eq!(assembler.in_progress(), 2);

        // Only the two most recent starts survive.
        assert!(matches!(
            assembler.accept(slice(0, 16, 1, b"cd")),
            Assembly::Dropped
        ));
        assert!(matches!(
            assembler.accept(slice(999, 16, 1, b"cd")),
            Assembly::Incomplete
        ));
    }

    #[test]
    fn limits_follow_frame_config() {
        let config = FrameConfig {
            max_transfer_size: 4,
            ..FrameConfig::default()
        };
        let mut assembler = TransferAssembler::new();
        assembler.accept(slice(1, 8, 0, b"ab"));
        assembler.set_limits(&config);
        assert_eq!(assembler.in_progress(), 0);
        assert!(matches!(
            assembler.accept(slice(1, 8, 0, b"ab")),
            Assembly::Dropped
        ));
    }

    #[test]
    fn error_status_survives_reassembly() {
        let mut assembler = TransferAssembler::new();
        assembler.accept(slice(1, 4, 0, b"ab"));
        match assembler.accept(slice(1, 4, 1, b"cd").with_status(5)) {
            Assembly::Complete(packet) => assert_eq!(packet.status(), 5),
            other => panic!("unexpected {other:?}"),
        }
    }
}
