use bytes::{Buf, BytesMut};
use tracing::{debug, warn};

use crate::codec::{packet_length, FrameConfig, Packet, HEADER_SIZE, SIGNATURE_BYTES};

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;

/// Framer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Scanning for the signature bytes.
    SeekingSignature,
    /// A signature sits at the buffer head; waiting for the full packet.
    HaveLength,
    /// A complete packet is buffered and about to be handed out.
    Emit,
}

/// Recovers packets from an arbitrarily chunked byte stream.
///
/// All state lives in the instance (buffer + state), so independent
/// decoders over independent transports never interfere. Feeding the same
/// bytes in any chunking yields the same packet sequence.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    state: DecoderState,
    max_payload_size: usize,
    discarded: u64,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a decoder with default configuration.
    pub fn new() -> Self {
        Self::with_config(&FrameConfig::default())
    }

    /// Create a decoder with explicit configuration.
    pub fn with_config(config: &FrameConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            state: DecoderState::SeekingSignature,
            max_payload_size: config.max_payload_size,
            discarded: 0,
        }
    }

    /// Append bytes and hand every complete packet to `consumer`, in order.
    pub fn detect_packets<F: FnMut(Packet)>(&mut self, bytes: &[u8], mut consumer: F) {
        self.extend(bytes);
        while let Some(packet) = self.next_packet() {
            consumer(packet);
        }
    }

    /// Append bytes and collect every complete packet.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Packet> {
        let mut out = Vec::new();
        self.detect_packets(bytes, |packet| out.push(packet));
        out
    }

    /// Append bytes without decoding.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pull the next complete packet out of the buffered bytes, if any.
    pub fn next_packet(&mut self) -> Option<Packet> {
        loop {
            match self.state {
                DecoderState::SeekingSignature => {
                    if !self.seek_signature() {
                        return None;
                    }
                    self.state = DecoderState::HaveLength;
                }
                DecoderState::HaveLength => {
                    let total = packet_length(&self.buf, 0);
                    if total == 0 {
                        return None;
                    }
                    if total - HEADER_SIZE > self.max_payload_size {
                        debug!(
                            declared = total - HEADER_SIZE,
                            max = self.max_payload_size,
                            "oversized length after signature, resynchronizing"
                        );
                        self.discard(1);
                        self.state = DecoderState::SeekingSignature;
                        continue;
                    }
                    if self.buf.len() < total {
                        return None;
                    }
                    self.state = DecoderState::Emit;
                }
                DecoderState::Emit => {
                    let total = packet_length(&self.buf, 0);
                    let frame = self.buf.split_to(total).freeze();
                    self.state = DecoderState::SeekingSignature;
                    match Packet::decode(&frame) {
                        Ok(packet) => return Some(packet),
                        Err(err) => {
                            warn!(error = %err, "dropping undecodable frame");
                            self.discarded += total as u64;
                        }
                    }
                }
            }
        }
    }

    /// Drop bytes up to the next signature. Returns true if one is at the head.
    fn seek_signature(&mut self) -> bool {
        if let Some(pos) = self
            .buf
            .windows(SIGNATURE_BYTES.len())
            .position(|window| window == &SIGNATURE_BYTES[..])
        {
            if pos > 0 {
                debug!(skipped = pos, "discarding bytes before signature");
                self.discard(pos);
            }
            return true;
        }

        // Keep a trailing first signature byte; its partner may be in the next chunk.
        let keep = usize::from(self.buf.last() == Some(&SIGNATURE_BYTES[0]));
        let drop = self.buf.len() - keep;
        if drop > 0 {
            debug!(skipped = drop, "no signature in buffer");
            self.discard(drop);
        }
        false
    }

    fn discard(&mut self, n: usize) {
        self.buf.advance(n);
        self.discarded += n as u64;
    }

    /// Current framer state.
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Bytes buffered but not yet emitted.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Total bytes discarded while resynchronizing.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Drop all buffered bytes and return to signature search.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.state = DecoderState::SeekingSignature;
    }

    /// Update maximum payload size for subsequent packets.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.max_payload_size = max_payload_size;
    }
}
