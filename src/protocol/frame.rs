//! RFC 6455 frame headers and frame-sequence scanning.
//!
//! # Frame Format (RFC 6455 Section 5.2)
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```
//!
//! Frames are never copied while scanning: a [`Frame`] records offsets into
//! the caller's buffer.

use super::ProtocolError;

/// Frame opcode (4 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    /// Continuation of a fragmented message.
    Continuation = 0x0,
    /// UTF-8 text data.
    Text = 0x1,
    /// Binary data.
    Binary = 0x2,
    /// Connection close control frame.
    Close = 0x8,
    /// Ping control frame.
    Ping = 0x9,
    /// Pong control frame.
    Pong = 0xA,
}

impl FrameKind {
    /// Close, ping and pong are control frames.
    pub const fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }

    pub const fn opcode(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for FrameKind {
    type Error = ProtocolError;

    fn try_from(opcode: u8) -> Result<Self, Self::Error> {
        match opcode {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            other => Err(ProtocolError::UnknownOpcode(other)),
        }
    }
}

/// One parsed frame, described by offsets into the scanned buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Offset of the first header byte.
    pub offset: usize,
    /// Total encoded length (header + mask key + payload).
    pub len: usize,
    pub fin: bool,
    pub kind: FrameKind,
    pub mask: Option<[u8; 4]>,
    pub payload_offset: usize,
    pub payload_len: usize,
}

impl Frame {
    /// Offset one past the last byte of this frame.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    /// Raw (possibly masked) payload bytes.
    pub fn raw_payload<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.payload_offset..self.payload_offset + self.payload_len]
    }

    /// Append the unmasked payload to `out`.
    pub fn unmask_into(&self, data: &[u8], out: &mut Vec<u8>) {
        let raw = self.raw_payload(data);
        match self.mask {
            Some(key) => apply_mask(raw, key, out),
            None => out.extend_from_slice(raw),
        }
    }
}

/// XOR `payload` with the rotating 4-byte `key`, appending to `out`.
pub fn apply_mask(payload: &[u8], key: [u8; 4], out: &mut Vec<u8>) {
    out.reserve(payload.len());
    out.extend(payload.iter().enumerate().map(|(i, byte)| byte ^ key[i % 4]));
}

/// Parse the frame starting at `offset`.
///
/// Returns `Ok(None)` when the buffer ends before the frame fully fits. The
/// opcode is validated from the first byte alone, so garbage fails fast even
/// on a one-byte read.
pub fn parse_frame(
    data: &[u8],
    offset: usize,
    max_payload: usize,
) -> Result<Option<Frame>, ProtocolError> {
    let Some(&first) = data.get(offset) else {
        return Ok(None);
    };
    let fin = first & 0x80 != 0;
    let kind = FrameKind::try_from(first & 0x0F)?;
    if kind.is_control() && !fin {
        return Err(ProtocolError::FragmentedControl);
    }

    let Some(&second) = data.get(offset + 1) else {
        return Ok(None);
    };
    let masked = second & 0x80 != 0;
    let mut cursor = offset + 2;

    let declared = match second & 0x7F {
        126 => {
            let Some(bytes) = data.get(cursor..cursor + 2) else {
                return Ok(None);
            };
            cursor += 2;
            u64::from(u16::from_be_bytes([bytes[0], bytes[1]]))
        }
        127 => {
            let Some(bytes) = data.get(cursor..cursor + 8) else {
                return Ok(None);
            };
            cursor += 8;
            let mut be = [0u8; 8];
            be.copy_from_slice(bytes);
            u64::from_be_bytes(be)
        }
        inline => u64::from(inline),
    };

    let too_large = ProtocolError::FrameTooLarge {
        len: declared,
        max: max_payload,
    };
    if declared > max_payload as u64 {
        return Err(too_large);
    }
    let payload_len = usize::try_from(declared).map_err(|_| too_large)?;

    let mask = if masked {
        let Some(key) = data.get(cursor..cursor + 4) else {
            return Ok(None);
        };
        cursor += 4;
        Some([key[0], key[1], key[2], key[3]])
    } else {
        None
    };

    let payload_offset = cursor;
    let end = payload_offset + payload_len;
    if end > data.len() {
        return Ok(None);
    }

    Ok(Some(Frame {
        offset,
        len: end - offset,
        fin,
        kind,
        mask,
        payload_offset,
        payload_len,
    }))
}

/// Scan frames from the start of `data` until one logical message is complete.
///
/// Scanning stops at the first data frame with FIN set, or immediately when
/// the very first frame is a standalone control frame. Control frames that
/// arrive between fragments are kept in the returned list. `Ok(None)` means
/// the message is still incomplete.
pub fn scan_message(data: &[u8], max_packet: usize) -> Result<Option<Vec<Frame>>, ProtocolError> {
    let mut frames = Vec::new();
    let mut offset = 0;

    loop {
        let Some(frame) = parse_frame(data, offset, max_packet)? else {
            return Ok(None);
        };
        frames.push(frame);

        if frame.kind.is_control() && frames.len() == 1 {
            return Ok(Some(frames));
        }
        if !frame.kind.is_control() && frame.fin {
            return Ok(Some(frames));
        }

        offset = frame.end();
        if offset > max_packet {
            return Err(ProtocolError::FrameTooLarge {
                len: offset as u64,
                max: max_packet,
            });
        }
    }
}

/// Total encoded length of a scanned frame sequence.
pub fn total_len(frames: &[Frame]) -> usize {
    frames.iter().map(|frame| frame.len).sum()
}

/// Encode one frame with minimal length encoding.
///
/// Servers pass `mask: None`; the manual-testing client passes a key.
pub fn encode_frame(kind: FrameKind, fin: bool, payload: &[u8], mask: Option<[u8; 4]>, out: &mut Vec<u8>) {
    let fin_bit = if fin { 0x80 } else { 0x00 };
    let mask_bit = if mask.is_some() { 0x80 } else { 0x00 };
    out.push(fin_bit | kind.opcode());

    let len = payload.len();
    if len <= 125 {
        out.push(mask_bit | len as u8);
    } else if len < (1 << 16) {
        out.push(mask_bit | 126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(mask_bit | 127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }

    match mask {
        Some(key) => {
            out.extend_from_slice(&key);
            apply_mask(payload, key, out);
        }
        None => out.extend_from_slice(payload),
    }
}
