//! Inbound half of a session: read until the socket would block, then carve
//! complete units off the front of the receive buffer.

use std::io::{ErrorKind, Read};

use crate::protocol::{Boundary, WsProtocol};

use super::buffer::GrowableBuffer;
use super::SessionError;

#[derive(Debug)]
pub struct SessionReader {
    buffer: GrowableBuffer,
    assembling: bool,
}

impl SessionReader {
    pub fn new(initial_capacity: usize, max_packet_size: usize) -> Self {
        Self {
            buffer: GrowableBuffer::new(initial_capacity, max_packet_size),
            assembling: false,
        }
    }

    /// True while a partially received unit sits in the buffer.
    pub fn is_assembling(&self) -> bool {
        self.assembling
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Read from `source` until it would block.
    ///
    /// After every successful read each complete unit is passed to `on_unit`
    /// in arrival order. Returns the number of bytes read. A zero-length read
    /// is reported as [`SessionError::PeerClosed`].
    pub fn on_readable<R, F>(
        &mut self,
        source: &mut R,
        protocol: &WsProtocol,
        mut on_unit: F,
    ) -> Result<usize, SessionError>
    where
        R: Read,
        F: FnMut(&[u8]) -> Result<(), SessionError>,
    {
        let mut total = 0;
        loop {
            if self.buffer.is_full() {
                self.buffer.grow()?;
            }

            match source.read(self.buffer.spare_mut()) {
                Ok(0) => return Err(SessionError::PeerClosed),
                Ok(n) => {
                    self.assembling = true;
                    self.buffer.advance(n);
                    total += n;
                    self.drain(protocol, &mut on_unit)?;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(total),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(SessionError::Io(e)),
            }
        }
    }

    /// Re-run boundary detection over bytes already buffered.
    pub fn on_heartbeat<F>(&mut self, protocol: &WsProtocol, mut on_unit: F) -> Result<(), SessionError>
    where
        F: FnMut(&[u8]) -> Result<(), SessionError>,
    {
        self.drain(protocol, &mut on_unit)
    }

    fn drain<F>(&mut self, protocol: &WsProtocol, on_unit: &mut F) -> Result<(), SessionError>
    where
        F: FnMut(&[u8]) -> Result<(), SessionError>,
    {
        while !self.buffer.is_empty() {
            let Boundary::Complete(len) = protocol.check_packet(self.buffer.filled())? else {
                break;
            };

            on_unit(&self.buffer.filled()[..len])?;

            if len >= self.buffer.len() {
                self.buffer.reset();
                self.assembling = false;
            } else {
                self.buffer.consume(len);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io;

    use super::*;
    use crate::protocol::frame::{encode_frame, FrameKind};
    use crate::protocol::CodecConfig;

    /// Hands out scripted chunks, then `WouldBlock` or EOF.
    struct ScriptedSource {
        chunks: VecDeque<Vec<u8>>,
        eof: bool,
    }

    impl ScriptedSource {
        fn new(chunks: Vec<Vec<u8>>, eof: bool) -> Self {
            Self {
                chunks: chunks.into(),
                eof,
            }
        }
    }

    impl Read for ScriptedSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let Some(mut chunk) = self.chunks.pop_front() else {
                return if self.eof {
                    Ok(0)
                } else {
                    Err(io::ErrorKind::WouldBlock.into())
                };
            };
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            if n < chunk.len() {
                self.chunks.push_front(chunk.split_off(n));
            }
            Ok(n)
        }
    }

    fn text_frame(payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        encode_frame(FrameKind::Text, true, payload, Some([3, 1, 4, 1]), &mut out);
        out
    }

    #[test]
    fn delivers_each_unit_once_across_split_reads() {
        let protocol = WsProtocol::default();
        let mut reader = SessionReader::new(16, 1024);
        let mut wire = text_frame(b"one");
        wire.extend(text_frame(b"two"));
        let (head, tail) = wire.split_at(5);
        let mut source = ScriptedSource::new(vec![head.to_vec()], false);

        let mut units = Vec::new();
        reader
            .on_readable(&mut source, &protocol, |unit| {
                units.push(unit.to_vec());
                Ok(())
            })
            .unwrap();
        assert!(units.is_empty());
        assert!(reader.is_assembling());

        let mut source = ScriptedSource::new(vec![tail.to_vec()], false);
        reader
            .on_readable(&mut source, &protocol, |unit| {
                units.push(unit.to_vec());
                Ok(())
            })
            .unwrap();

        assert_eq!(units, vec![text_frame(b"one"), text_frame(b"two")]);
        assert!(!reader.is_assembling());
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn grows_for_large_units_then_shrinks() {
        let protocol = WsProtocol::default();
        let mut reader = SessionReader::new(16, 1 << 20);
        let frame = text_frame(&[b'z'; 5000]);
        let mut source = ScriptedSource::new(vec![frame.clone()], false);

        let mut delivered = 0;
        reader
            .on_readable(&mut source, &protocol, |unit| {
                delivered += unit.len();
                Ok(())
            })
            .unwrap();

        assert_eq!(delivered, frame.len());
        assert_eq!(reader.capacity(), 16);
    }

    #[test]
    fn exceeding_the_ceiling_is_fatal() {
        let protocol = WsProtocol::new(CodecConfig {
            max_packet_size: 1 << 20,
            ..CodecConfig::default()
        });
        let mut reader = SessionReader::new(16, 64);
        let mut source = ScriptedSource::new(vec![text_frame(&[b'z'; 100])], false);

        let err = reader.on_readable(&mut source, &protocol, |_| Ok(())).unwrap_err();
        assert!(matches!(err, SessionError::Buffer(_)));
    }

    #[test]
    fn zero_length_read_means_peer_closed() {
        let protocol = WsProtocol::default();
        let mut reader = SessionReader::new(16, 1024);
        let mut source = ScriptedSource::new(Vec::new(), true);

        let err = reader.on_readable(&mut source, &protocol, |_| Ok(())).unwrap_err();
        assert!(matches!(err, SessionError::PeerClosed));
    }

    #[test]
    fn protocol_errors_surface() {
        let protocol = WsProtocol::default();
        let mut reader = SessionReader::new(16, 1024);
        let mut source = ScriptedSource::new(vec![vec![0x83, 0x80]], false);

        let err = reader.on_readable(&mut source, &protocol, |_| Ok(())).unwrap_err();
        assert!(matches!(err, SessionError::Protocol(_)));
    }
}
