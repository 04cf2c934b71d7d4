//! Wire Codec
//!
//! Binary packet framing for the GUI protocol. All integers are
//! big-endian; strings are length-prefixed UTF-8.
//!
//! # Packet layout
//!
//! ```text
//! Client -> Device: [kind:u8][requestId:u32]
//!   RequestGui (0): no body
//!   SetValue   (1): [len:u32][path bytes][tag:u8][value bytes]
//!
//! Device -> Client: [kind:u8]
//!   GuiData     (0): [requestId:u32][totalLen:u32][JSON bytes ...]
//!   UpdateValue (1): [requestId:u32][len:u32][path bytes][tag:u8][value bytes]
//!
//! Value encoding by tag:
//!   0 Number:  i32
//!   1 String:  [len:u32][UTF-8 bytes]
//!   2 Boolean: u8 (0/1)
//!   3 RGBW:    [w][r][g][b]  (one byte each, fixed firmware order)
//! ```

use crate::domain::value::{RgbwColor, Value};
use thiserror::Error;

/// Client-to-device packet kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientOpcode {
    RequestGui = 0,
    SetValue = 1,
}

/// Device-to-client packet kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerOpcode {
    GuiData = 0,
    UpdateValue = 1,
}

impl TryFrom<u8> for ServerOpcode {
    type Error = WireError;

    fn try_from(byte: u8) -> Result<Self, WireError> {
        match byte {
            0 => Ok(ServerOpcode::GuiData),
            1 => Ok(ServerOpcode::UpdateValue),
            other => Err(WireError::UnknownMessageKind(other)),
        }
    }
}

const TAG_NUMBER: u8 = 0;
const TAG_STRING: u8 = 1;
const TAG_BOOLEAN: u8 = 2;
const TAG_RGBW: u8 = 3;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("read of {requested} bytes past end of buffer ({remaining} remaining)")]
    BufferRange { requested: usize, remaining: usize },
    #[error("reassembly overflow: {got} bytes for an expected total of {expected}")]
    BufferOverflow { expected: usize, got: usize },
    #[error("unknown value type tag {0}")]
    UnknownValueType(u8),
    #[error("unknown message kind {0}")]
    UnknownMessageKind(u8),
    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,
}

/// Encode a client packet header.
pub fn packet_header(opcode: ClientOpcode, request_id: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5);
    buf.push(opcode as u8);
    buf.extend_from_slice(&request_id.to_be_bytes());
    buf
}

/// Append a length-prefixed UTF-8 string.
pub fn put_string(buf: &mut Vec<u8>, text: &str) {
    buf.extend_from_slice(&(text.len() as u32).to_be_bytes());
    buf.extend_from_slice(text.as_bytes());
}

/// Append a tagged value.
pub fn put_value(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Number(n) => {
            buf.push(TAG_NUMBER);
            buf.extend_from_slice(&n.to_be_bytes());
        }
        Value::String(s) => {
            buf.push(TAG_STRING);
            put_string(buf, s);
        }
        Value::Boolean(b) => {
            buf.push(TAG_BOOLEAN);
            buf.push(u8::from(*b));
        }
        Value::Rgbw(c) => {
            buf.push(TAG_RGBW);
            // Fixed wire order, white first. Do not reorder.
            buf.extend_from_slice(&[c.w, c.r, c.g, c.b]);
        }
    }
}

/// Bounds-checked cursor over a received packet.
pub struct PacketReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn check(&self, requested: usize) -> Result<(), WireError> {
        if requested > self.remaining() {
            return Err(WireError::BufferRange {
                requested,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        self.check(1)?;
        let value = self.data[self.offset];
        self.offset += 1;
        Ok(value)
    }

    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_i32(&mut self) -> Result<i32, WireError> {
        let bytes = self.read_bytes(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        self.check(len)?;
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    /// Take everything after the cursor.
    pub fn read_remaining(&mut self) -> &'a [u8] {
        let slice = &self.data[self.offset..];
        self.offset = self.data.len();
        slice
    }

    pub fn read_string(&mut self) -> Result<String, WireError> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| WireError::InvalidUtf8)
    }

    pub fn read_value(&mut self) -> Result<Value, WireError> {
        match self.read_u8()? {
            TAG_NUMBER => Ok(Value::Number(self.read_i32()?)),
            TAG_STRING => Ok(Value::String(self.read_string()?)),
            TAG_BOOLEAN => Ok(Value::Boolean(self.read_u8()? > 0)),
            TAG_RGBW => {
                let bytes = self.read_bytes(4)?;
                Ok(Value::Rgbw(RgbwColor {
                    w: bytes[0],
                    r: bytes[1],
                    g: bytes[2],
                    b: bytes[3],
                }))
            }
            other => Err(WireError::UnknownValueType(other)),
        }
    }
}
