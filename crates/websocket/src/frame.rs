//! RFC 6455 frame encoding and decoding

use rand::RngCore;

/// FIN bit in the first header byte
pub const FIN_BIT: u8 = 0x80;
/// MASK bit in the second header byte
pub const MASK_BIT: u8 = 0x80;

/// Frame opcodes this client understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl Opcode {
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }
}

/// A decoded frame with its payload already unmasked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    /// Raw 4-bit opcode
    pub opcode: u8,
    pub masked: bool,
    pub payload: Vec<u8>,
}

impl Frame {
    #[must_use]
    pub const fn kind(&self) -> Option<Opcode> {
        Opcode::from_u8(self.opcode)
    }
}

/// Encode a single frame. Client frames must pass a mask key.
#[must_use]
pub fn encode_frame(opcode: Opcode, payload: &[u8], mask: Option<[u8; 4]>) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 14);
    frame.push(FIN_BIT | opcode as u8);

    let mask_bit = if mask.is_some() { MASK_BIT } else { 0 };
    let len = payload.len();
    if len < 126 {
        frame.push(mask_bit | len as u8);
    } else if len < 65536 {
        frame.push(mask_bit | 126);
        frame.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        frame.push(mask_bit | 127);
        frame.extend_from_slice(&(len as u64).to_be_bytes());
    }

    match mask {
        Some(key) => {
            frame.extend_from_slice(&key);
            frame.extend(payload.iter().zip(key.iter().cycle()).map(|(b, k)| b ^ k));
        }
        None => frame.extend_from_slice(payload),
    }
    frame
}

/// Encode a masked text frame with a fresh random mask key
#[must_use]
pub fn encode_text(message: &str) -> Vec<u8> {
    encode_frame(Opcode::Text, message.as_bytes(), Some(random_mask()))
}

/// Encode a masked control frame
#[must_use]
pub fn encode_control(opcode: Opcode, payload: &[u8]) -> Vec<u8> {
    encode_frame(opcode, payload, Some(random_mask()))
}

fn random_mask() -> [u8; 4] {
    let mut key = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

/// Fixed part of a frame, parsed before the payload arrives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub fin: bool,
    pub opcode: u8,
    pub mask: Option<[u8; 4]>,
    /// Declared payload length
    pub payload_len: u64,
    /// Bytes taken by the header, mask key included
    pub header_len: usize,
}

/// Parse the header at the start of `data`, or `None` if it is incomplete
#[must_use]
pub fn decode_header(data: &[u8]) -> Option<FrameHeader> {
    let (&b0, &b1) = (data.first()?, data.get(1)?);

    let (payload_len, mut header_len) = match b1 & 0x7F {
        126 => {
            let bytes: [u8; 2] = data.get(2..4)?.try_into().ok()?;
            (u64::from(u16::from_be_bytes(bytes)), 4)
        }
        127 => {
            let bytes: [u8; 8] = data.get(2..10)?.try_into().ok()?;
            (u64::from_be_bytes(bytes), 10)
        }
        len => (u64::from(len), 2),
    };

    let mut mask = None;
    if b1 & MASK_BIT != 0 {
        let key: [u8; 4] = data.get(header_len..header_len + 4)?.try_into().ok()?;
        mask = Some(key);
        header_len += 4;
    }

    Some(FrameHeader {
        fin: b0 & FIN_BIT != 0,
        opcode: b0 & 0x0F,
        mask,
        payload_len,
        header_len,
    })
}

/// Decode the first complete frame in `data`.
///
/// Returns the frame and the number of bytes it occupied, or `None` if the
/// buffer does not yet hold a whole frame.
#[must_use]
pub fn decode_frame(data: &[u8]) -> Option<(Frame, usize)> {
    let header = decode_header(data)?;
    let payload_len = usize::try_from(header.payload_len).ok()?;
    let total = header.header_len.checked_add(payload_len)?;
    let raw = data.get(header.header_len..total)?;

    let payload = match header.mask {
        Some(key) => raw.iter().zip(key.iter().cycle()).map(|(b, k)| b ^ k).collect(),
        None => raw.to_vec(),
    };

    Some((
        Frame {
            fin: header.fin,
            opcode: header.opcode,
            masked: header.mask.is_some(),
            payload,
        },
        total,
    ))
}

/// Decode the first frame in `data` as text.
///
/// `None` means no complete frame was available, which is distinct from a
/// frame carrying an empty message.
#[must_use]
pub fn decode(data: &[u8]) -> Option<String> {
    decode_frame(data).map(|(frame, _)| String::from_utf8_lossy(&frame.payload).into_owned())
}
