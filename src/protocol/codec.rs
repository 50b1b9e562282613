//! Boundary detection, decoding and control side effects for one session.

use super::frame::{scan_message, total_len, Frame};
use super::handshake::Handshake;
use super::http::request_boundary;
use super::message::{ControlKind, ControlMessage, Message};
use super::ProtocolError;

const HANDSHAKE_PREFIX: &[u8] = b"GET";

/// Codec settings taken from the session configuration.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Largest buffered unit (frame sequence or HTTP request) in bytes.
    pub max_packet_size: usize,
    /// Reject client frames without a mask key.
    pub require_mask: bool,
    /// Trusted header carrying the real client address.
    pub forwarded_header: String,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_packet_size: 10 * 1024 * 1024,
            require_mask: true,
            forwarded_header: "X-Forwarded-For".to_string(),
        }
    }
}

/// Result of a boundary check over buffered bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Incomplete,
    /// The first `n` bytes form exactly one complete unit.
    Complete(usize),
}

/// What the codec needs from a session to apply control side effects.
pub trait ControlPeer {
    type Error;

    /// Queue a reply to the client.
    fn reply(&self, message: Message) -> Result<(), Self::Error>;

    /// Remember the client address reported by a trusted proxy.
    fn bind_forwarded_ip(&self, ip: String);
}

/// Stateless WebSocket + handshake codec.
#[derive(Debug, Clone, Default)]
pub struct WsProtocol {
    config: CodecConfig,
}

impl WsProtocol {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Length of the first complete unit in `data`, if any.
    pub fn check_packet(&self, data: &[u8]) -> Result<Boundary, ProtocolError> {
        if data.is_empty() || (data.len() < HANDSHAKE_PREFIX.len() && HANDSHAKE_PREFIX.starts_with(data)) {
            return Ok(Boundary::Incomplete);
        }

        if data.starts_with(HANDSHAKE_PREFIX) {
            return match request_boundary(data, self.config.max_packet_size)? {
                Some(len) => Ok(Boundary::Complete(len)),
                None if data.len() > self.config.max_packet_size => Err(ProtocolError::FrameTooLarge {
                    len: data.len() as u64,
                    max: self.config.max_packet_size,
                }),
                None => Ok(Boundary::Incomplete),
            };
        }

        match scan_message(data, self.config.max_packet_size)? {
            Some(frames) => {
                self.check_masks(&frames)?;
                Ok(Boundary::Complete(total_len(&frames)))
            }
            None => Ok(Boundary::Incomplete),
        }
    }

    /// Decode exactly one complete unit.
    pub fn decode(&self, data: &[u8]) -> Result<Message, ProtocolError> {
        if data.starts_with(HANDSHAKE_PREFIX) {
            let handshake = Handshake::from_request_bytes(data)?;
            return Ok(Message::Handshake(Box::new(handshake)));
        }

        let frames = scan_message(data, self.config.max_packet_size)?.ok_or(ProtocolError::Incomplete)?;
        self.check_masks(&frames)?;
        Message::from_frames(&frames, data)
    }

    pub fn marshal(&self, message: &Message) -> Vec<u8> {
        message.marshal()
    }

    /// Apply the side effects of a decoded message.
    ///
    /// Handshakes, closes and pings are answered through `peer`. For data
    /// messages every interleaved control message is answered in order.
    pub fn apply_control<P: ControlPeer>(&self, message: &Message, peer: &P) -> Result<(), P::Error> {
        match message {
            Message::Handshake(handshake) => {
                if let Some(ip) = self.forwarded_ip(handshake) {
                    peer.bind_forwarded_ip(ip);
                }
                peer.reply(Message::Handshake(handshake.clone()))
            }
            Message::Control(control) => answer(control, peer),
            Message::Text { controls, .. } | Message::Binary { controls, .. } => {
                controls.iter().try_for_each(|control| answer(control, peer))
            }
        }
    }

    /// First entry of the forwarded header, if present and non-empty.
    pub fn forwarded_ip(&self, handshake: &Handshake) -> Option<String> {
        let value = handshake.request.header(&self.config.forwarded_header)?;
        let first = value.split(',').next().unwrap_or_default().trim();
        (!first.is_empty()).then(|| first.to_string())
    }

    fn check_masks(&self, frames: &[Frame]) -> Result<(), ProtocolError> {
        if self.config.require_mask && frames.iter().any(|frame| frame.mask.is_none()) {
            return Err(ProtocolError::UnmaskedFrame);
        }
        Ok(())
    }
}

fn answer<P: ControlPeer>(control: &ControlMessage, peer: &P) -> Result<(), P::Error> {
    match control.kind {
        ControlKind::Close => peer.reply(Message::close()),
        ControlKind::Ping => peer.reply(Message::pong()),
        ControlKind::Pong => Ok(()),
    }
}
