//! Logical WebSocket messages: assembly from frames and marshalling.

use std::fmt;

use super::frame::{encode_frame, Frame, FrameKind};
use super::handshake::Handshake;
use super::ProtocolError;

/// Longest content preview rendered by `Display`.
const PREVIEW_LIMIT: usize = 500;

/// Message type as seen by logging and the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Handshake,
    Close,
    Ping,
    Pong,
    Binary,
    Text,
}

impl MessageKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Handshake => "HANDSHAKE",
            Self::Close => "CLOSE",
            Self::Ping => "PING",
            Self::Pong => "PONG",
            Self::Binary => "BINARY",
            Self::Text => "TEXT",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    Close,
    Ping,
    Pong,
}

impl ControlKind {
    fn from_frame(kind: FrameKind) -> Option<Self> {
        match kind {
            FrameKind::Close => Some(Self::Close),
            FrameKind::Ping => Some(Self::Ping),
            FrameKind::Pong => Some(Self::Pong),
            FrameKind::Continuation | FrameKind::Text | FrameKind::Binary => None,
        }
    }

    fn frame_kind(self) -> FrameKind {
        match self {
            Self::Close => FrameKind::Close,
            Self::Ping => FrameKind::Ping,
            Self::Pong => FrameKind::Pong,
        }
    }
}

/// A close, ping or pong, standalone or interleaved with data fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    pub kind: ControlKind,
    pub payload: Vec<u8>,
}

impl ControlMessage {
    pub fn new(kind: ControlKind) -> Self {
        Self {
            kind,
            payload: Vec::new(),
        }
    }
}

/// One logical unit decoded from, or destined for, the wire.
///
/// Control frames that arrived between the fragments of a data message are
/// kept in `controls`, never merged into the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Handshake(Box<Handshake>),
    Control(ControlMessage),
    Text {
        text: String,
        controls: Vec<ControlMessage>,
    },
    Binary {
        data: Vec<u8>,
        controls: Vec<ControlMessage>,
    },
}

enum DataKind {
    Text,
    Binary,
}

impl Message {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            controls: Vec::new(),
        }
    }

    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::Binary {
            data: data.into(),
            controls: Vec::new(),
        }
    }

    pub fn close() -> Self {
        Self::Control(ControlMessage::new(ControlKind::Close))
    }

    pub fn ping() -> Self {
        Self::Control(ControlMessage::new(ControlKind::Ping))
    }

    pub fn pong() -> Self {
        Self::Control(ControlMessage::new(ControlKind::Pong))
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Handshake(_) => MessageKind::Handshake,
            Self::Control(control) => match control.kind {
                ControlKind::Close => MessageKind::Close,
                ControlKind::Ping => MessageKind::Ping,
                ControlKind::Pong => MessageKind::Pong,
            },
            Self::Text { .. } => MessageKind::Text,
            Self::Binary { .. } => MessageKind::Binary,
        }
    }

    /// Handshakes and close/ping/pong never reach the application handler.
    pub fn is_control(&self) -> bool {
        matches!(self, Self::Handshake(_) | Self::Control(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Self::Binary { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Payload bytes regardless of message type.
    pub fn payload(&self) -> &[u8] {
        match self {
            Self::Handshake(handshake) => handshake.request.body(),
            Self::Control(control) => &control.payload,
            Self::Text { text, .. } => text.as_bytes(),
            Self::Binary { data, .. } => data,
        }
    }

    /// Control messages interleaved with this data message.
    pub fn controls(&self) -> &[ControlMessage] {
        match self {
            Self::Text { controls, .. } | Self::Binary { controls, .. } => controls,
            Self::Handshake(_) | Self::Control(_) => &[],
        }
    }

    pub fn handshake(&self) -> Option<&Handshake> {
        match self {
            Self::Handshake(handshake) => Some(handshake),
            _ => None,
        }
    }

    /// Assemble one message from a scanned frame sequence.
    ///
    /// Data fragments are unmasked and concatenated; the first data frame
    /// decides between text and binary.
    pub fn from_frames(frames: &[Frame], data: &[u8]) -> Result<Self, ProtocolError> {
        let mut opener = None;
        let mut payload = Vec::new();
        let mut controls = Vec::new();

        for frame in frames {
            if let Some(kind) = ControlKind::from_frame(frame.kind) {
                let mut control = ControlMessage::new(kind);
                frame.unmask_into(data, &mut control.payload);
                controls.push(control);
                continue;
            }

            match (&opener, frame.kind) {
                (None, FrameKind::Text) => opener = Some(DataKind::Text),
                (None, FrameKind::Binary) => opener = Some(DataKind::Binary),
                (None, _) => return Err(ProtocolError::UnexpectedContinuation),
                (Some(_), FrameKind::Continuation) => {}
                (Some(_), _) => return Err(ProtocolError::ExpectedContinuation),
            }
            frame.unmask_into(data, &mut payload);
        }

        match opener {
            Some(DataKind::Text) => Ok(Self::Text {
                text: String::from_utf8(payload)?,
                controls,
            }),
            Some(DataKind::Binary) => Ok(Self::Binary {
                data: payload,
                controls,
            }),
            None => controls
                .into_iter()
                .next()
                .map(Self::Control)
                .ok_or(ProtocolError::Incomplete),
        }
    }

    /// Wire bytes for this message.
    ///
    /// Control messages are always sent as a bare two-byte frame; data
    /// messages as one unmasked FIN frame.
    pub fn marshal(&self) -> Vec<u8> {
        match self {
            Self::Handshake(handshake) => handshake.response.marshal(),
            Self::Control(control) => vec![0x80 | control.kind.frame_kind().opcode(), 0x00],
            Self::Text { text, .. } => {
                let mut out = Vec::with_capacity(text.len() + 10);
                encode_frame(FrameKind::Text, true, text.as_bytes(), None, &mut out);
                out
            }
            Self::Binary { data, .. } => {
                let mut out = Vec::with_capacity(data.len() + 10);
                encode_frame(FrameKind::Binary, true, data, None, &mut out);
                out
            }
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())?;
        match self {
            Self::Text { text, .. } if !text.is_empty() => {
                let preview: String = text.chars().take(PREVIEW_LIMIT).collect();
                let ellipsis = if preview.len() < text.len() { "..." } else { "" };
                write!(f, ": '{preview}{ellipsis}', size: {}", text.len())
            }
            Self::Binary { data, .. } if !data.is_empty() => {
                let shown: Vec<String> = data
                    .iter()
                    .take(PREVIEW_LIMIT)
                    .map(u8::to_string)
                    .collect();
                let ellipsis = if data.len() > PREVIEW_LIMIT { ",..." } else { "" };
                write!(f, ": [{}{ellipsis}], size: {}", shown.join(","), data.len())
            }
            Self::Handshake(handshake) => write!(f, ": {}", handshake.request),
            _ => Ok(()),
        }
    }
}
