use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{FrameConfig, Packet};
use crate::decoder::FrameDecoder;
use crate::error::FrameError;

/// `tokio_util` codec adapter over [`FrameDecoder`].
///
/// Use with `FramedRead`/`FramedWrite` when the transport is an
/// `AsyncRead`/`AsyncWrite`. Resynchronization rules are the same as the
/// blocking decoder's.
#[derive(Debug, Default)]
pub struct PacketCodec {
    decoder: FrameDecoder,
}

impl PacketCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &FrameConfig) -> Self {
        Self {
            decoder: FrameDecoder::with_config(config),
        }
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, FrameError> {
        if !src.is_empty() {
            self.decoder.extend(src);
            src.clear();
        }
        Ok(self.decoder.next_packet())
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = FrameError;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<(), FrameError> {
        packet.encode_into(dst)
    }
}

impl Encoder<&Packet> for PacketCodec {
    type Error = FrameError;

    fn encode(&mut self, packet: &Packet, dst: &mut BytesMut) -> Result<(), FrameError> {
        packet.encode_into(dst)
    }
}
