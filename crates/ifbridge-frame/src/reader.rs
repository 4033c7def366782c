use std::io::{ErrorKind, Read};

use crate::codec::{FrameConfig, Packet};
use crate::decoder::FrameDecoder;
use crate::error::{FrameError, Result};

const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Reads complete packets from any `Read` stream.
///
/// Handles partial reads and leading garbage internally; callers always get
/// complete packets.
pub struct PacketReader<T> {
    inner: T,
    decoder: FrameDecoder,
    config: FrameConfig,
}

impl<T: Read> PacketReader<T> {
    /// Create a new packet reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new packet reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            decoder: FrameDecoder::with_config(&config),
            config,
        }
    }

    /// Read the next complete packet (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_packet(&mut self) -> Result<Packet> {
        loop {
            if let Some(packet) = self.decoder.next_packet() {
                return Ok(packet);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.decoder.extend(&chunk[..read]);
        }
    }

    /// Read packets until EOF. Bytes of a trailing incomplete packet are dropped.
    pub fn read_to_end(&mut self) -> Result<Vec<Packet>> {
        let mut packets = Vec::new();
        loop {
            match self.read_packet() {
                Ok(packet) => packets.push(packet),
                Err(FrameError::ConnectionClosed) => return Ok(packets),
                Err(err) => return Err(err),
            }
        }
    }

    /// Bytes skipped so far while searching for packet boundaries.
    pub fn discarded(&self) -> u64 {
        self.decoder.discarded()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current packet reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl<T: Read> Iterator for PacketReader<T> {
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_packet() {
            Ok(packet) => Some(Ok(packet)),
            Err(FrameError::ConnectionClosed) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;

    use super::*;
    use crate::address::{Address, GPIO, UART};
    use crate::codec::{HEADER_SIZE, PARAM_COUNT};

    fn wire(packets: &[Packet]) -> Vec<u8> {
        let mut out = BytesMut::new();
        for p in packets {
            p.encode_into(&mut out).unwrap();
        }
        out.to_vec()
    }

    fn gpio_write(mask: u32, value: u32) -> Packet {
        let mut params = [0u32; PARAM_COUNT];
        params[0] = mask;
        params[1] = value;
        Packet::command(Address::new(GPIO, 0), 2, params)
    }

    #[test]
    fn read_single_packet() {
        let p = gpio_write(0x0F, 0x05);
        let mut reader = PacketReader::new(Cursor::new(wire(&[p.clone()])));
        assert_eq!(reader.read_packet().unwrap(), p);
    }

    #[test]
    fn read_multiple_packets() {
        let packets = vec![
            gpio_write(1, 1),
            Packet::command(Address::new(UART, 1), 2, [0; PARAM_COUNT]).with_payload(&b"tx"[..]),
            gpio_write(2, 0),
        ];
        let reader = PacketReader::new(Cursor::new(wire(&packets)));
        let read: Vec<Packet> = reader.map(|p| p.unwrap()).collect();
        assert_eq!(read, packets);
    }

    #[test]
    fn partial_read_handling() {
        let p = gpio_write(0xFF, 0xAA);
        let byte_reader = ByteByByteReader {
            bytes: wire(&[p.clone()]),
            pos: 0,
        };
        let mut reader = PacketReader::new(byte_reader);
        assert_eq!(reader.read_packet().unwrap(), p);
    }

    #[test]
    fn skips_leading_garbage() {
        let p = gpio_write(1, 0);
        let mut bytes = vec![0x01, 0x02, 0x03];
        bytes.extend(wire(&[p.clone()]));

        let mut reader = PacketReader::new(Cursor::new(bytes));
        assert_eq!(reader.read_packet().unwrap(), p);
        assert_eq!(reader.discarded(), 3);
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = PacketReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_packet().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_packet() {
        let bytes = wire(&[gpio_write(1, 1)]);
        let mut reader = PacketReader::new(Cursor::new(bytes[..HEADER_SIZE - 4].to_vec()));
        let err = reader.read_packet().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn read_to_end_drops_incomplete_tail() {
        let first = gpio_write(1, 1);
        let mut bytes = wire(&[first.clone()]);
        bytes.extend(&wire(&[gpio_write(2, 2)])[..10]);

        let mut reader = PacketReader::new(Cursor::new(bytes));
        assert_eq!(reader.read_to_end().unwrap(), vec![first]);
    }

    #[test]
    fn interrupted_read_retries() {
        let p = gpio_write(8, 8);
        let reader = InterruptedThenData {
            state: 0,
            bytes: wire(&[p.clone()]),
            pos: 0,
        };
        let mut framed = PacketReader::new(reader);
        assert_eq!(framed.read_packet().unwrap(), p);
    }

    #[test]
    fn would_block_propagates_io_error() {
        let reader = WouldBlock;
        let mut framed = PacketReader::new(reader);
        let err = framed.read_packet().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));
    }

    #[test]
    fn accessors_and_into_inner() {
        let cursor = Cursor::new(Vec::<u8>::new());
        let mut reader = PacketReader::new(cursor);

        let _ = reader.get_ref();
        let _ = reader.get_mut();
        assert_eq!(reader.config().max_payload_size, u16::MAX as usize);
        let _inner = reader.into_inner();
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }

            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedThenData {
        state: u8,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.state == 0 {
                self.state = 1;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            let remaining = self.bytes.len() - self.pos;
            let n = remaining.min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    struct WouldBlock;

    impl Read for WouldBlock {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }
    }
}
