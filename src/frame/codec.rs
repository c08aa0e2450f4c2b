//! Frame build/parse, escaping, and CRC-16/MODBUS.
//!
//! A frame on the wire looks like:
//!
//! ```text
//! SOF×3 | Version | Seq | Flag | Type | Length | Payload | CRC16 | EOF×3
//! ```
//!
//! Escaping applies only to `header(5) + payload + CRC(2)`; the SOF/EOF
//! runs themselves are never escaped, which is what gives the extractor a
//! self-synchronising frame boundary.

use crate::constants::{DLE, EOF, MAX_PAYLOAD, PROTOCOL_VERSION, SOF, SOF_EOF_RUN};
use std::fmt;

/// A parsed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Protocol version the sender used.
    pub version: u8,
    /// Sequence number, wraps mod 256.
    pub seq: u8,
    /// Reserved flag byte.
    pub flag: u8,
    /// Frame type; only `FRAME_TYPE_HEARTBEAT` is currently defined.
    pub frame_type: u8,
    /// Frame payload, at most `MAX_PAYLOAD` bytes.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Builds a new frame with the current protocol version.
    #[must_use]
    pub fn new(seq: u8, flag: u8, frame_type: u8, payload: Vec<u8>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            seq,
            flag,
            frame_type,
            payload,
        }
    }

    /// Whether this frame is a heartbeat.
    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        self.frame_type == crate::constants::FRAME_TYPE_HEARTBEAT
    }
}

/// Why a candidate buffer failed to parse as a frame. Never propagated
/// past the extractor — parse failures are a normal, silent outcome the
/// caller (the extractor) decides how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Unescaped content was shorter than the fixed header+CRC size.
    TooShort,
    /// The CRC over `content` did not match the trailing two bytes.
    CrcMismatch,
    /// The declared `length` field did not match the remaining bytes.
    LengthMismatch,
    /// The payload exceeds `MAX_PAYLOAD`.
    PayloadTooLarge,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => write!(f, "frame content shorter than header+crc"),
            Self::CrcMismatch => write!(f, "CRC mismatch"),
            Self::LengthMismatch => write!(f, "declared length does not match content"),
            Self::PayloadTooLarge => write!(f, "payload exceeds MAX_PAYLOAD"),
        }
    }
}

/// Fixed header size: version, seq, flag, type, length.
const HEADER_LEN: usize = 5;
/// CRC trailer size.
const CRC_LEN: usize = 2;

/// Builds the wire bytes for a frame: `SOF×3 | escaped(header|payload|crc) | EOF×3`.
///
/// # Panics
///
/// Panics if `frame.payload.len() > MAX_PAYLOAD`; callers are expected to
/// validate payload size before building (frame payloads originate from
/// this codec itself, which never produces an oversized one).
#[must_use]
pub fn build(frame: &Frame) -> Vec<u8> {
    assert!(
        frame.payload.len() <= MAX_PAYLOAD,
        "frame payload exceeds MAX_PAYLOAD"
    );

    let mut content = Vec::with_capacity(HEADER_LEN + frame.payload.len() + CRC_LEN);
    content.push(frame.version);
    content.push(frame.seq);
    content.push(frame.flag);
    content.push(frame.frame_type);
    #[allow(
        clippy::cast_possible_truncation,
        reason = "length already validated <= MAX_PAYLOAD (255)"
    )]
    content.push(frame.payload.len() as u8);
    content.extend_from_slice(&frame.payload);

    let crc = crc16_modbus(&content);
    content.push((crc >> 8) as u8);
    content.push((crc & 0xFF) as u8);

    let escaped = escape(&content);

    let mut out = Vec::with_capacity(SOF_EOF_RUN + escaped.len() + SOF_EOF_RUN);
    out.extend(std::iter::repeat(SOF).take(SOF_EOF_RUN));
    out.extend_from_slice(&escaped);
    out.extend(std::iter::repeat(EOF).take(SOF_EOF_RUN));
    out
}

/// Parses the escaped content between a SOF run and an EOF run into a
/// `Frame`. Returns `Err` on any malformed input; failures are silent by
/// design — the caller decides what a garbled frame boundary means.
pub fn parse(buffer: &[u8]) -> Result<Frame, FrameError> {
    let content = unescape(buffer);
    if content.len() < HEADER_LEN + CRC_LEN {
        return Err(FrameError::TooShort);
    }

    let (body, crc_bytes) = content.split_at(content.len() - CRC_LEN);
    let expected_crc = u16::from(crc_bytes[0]) << 8 | u16::from(crc_bytes[1]);
    let actual_crc = crc16_modbus(body);
    if expected_crc != actual_crc {
        return Err(FrameError::CrcMismatch);
    }

    let length = body[4] as usize;
    if body.len() != HEADER_LEN + length {
        return Err(FrameError::LengthMismatch);
    }
    if length > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge);
    }

    Ok(Frame {
        version: body[0],
        seq: body[1],
        flag: body[2],
        frame_type: body[3],
        payload: body[HEADER_LEN..].to_vec(),
    })
}

/// Escapes every occurrence of `SOF`, `EOF`, or `DLE` as `DLE, byte`.
#[must_use]
pub fn escape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &b in data {
        if b == SOF || b == EOF || b == DLE {
            out.push(DLE);
        }
        out.push(b);
    }
    out
}

/// Reverses `escape`. A stray `DLE x` where `x` is not one of the three
/// escapable bytes is kept as the two literal bytes, for robustness
/// against corruption.
#[must_use]
pub fn unescape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        let b = data[i];
        if b == DLE && i + 1 < data.len() {
            let next = data[i + 1];
            if next == SOF || next == EOF || next == DLE {
                out.push(next);
                i += 2;
                continue;
            }
        }
        out.push(b);
        i += 1;
    }
    out
}

/// CRC-16/MODBUS: polynomial 0x8005 reflected (0xA001), init 0xFFFF,
/// reflected input and output, no final XOR.
#[must_use]
pub fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}
