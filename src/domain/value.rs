//! Value Model
//!
//! The tagged value union shared by the wire protocol and the control tree.
//! A value never exists without a matching tag; typed accessors reject
//! reads through the wrong tag instead of reinterpreting the payload.

use thiserror::Error;

/// The four value kinds a control can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Number,
    String,
    Boolean,
    Rgbw,
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Boolean => "boolean",
            ValueKind::Rgbw => "rgbw color",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("wrong value type: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: ValueKind,
        actual: ValueKind,
    },
}

/// One control value. Immutable once constructed; replace, don't mutate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Number(i32),
    String(String),
    Boolean(bool),
    Rgbw(RgbwColor),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Rgbw(_) => ValueKind::Rgbw,
        }
    }

    pub fn as_number(&self) -> Result<i32, ValueError> {
        match self {
            Value::Number(n) => Ok(*n),
            other => Err(other.mismatch(ValueKind::Number)),
        }
    }

    pub fn as_string(&self) -> Result<&str, ValueError> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(other.mismatch(ValueKind::String)),
        }
    }

    pub fn as_boolean(&self) -> Result<bool, ValueError> {
        match self {
            Value::Boolean(b) => Ok(*b),
            other => Err(other.mismatch(ValueKind::Boolean)),
        }
    }

    pub fn as_rgbw(&self) -> Result<RgbwColor, ValueError> {
        match self {
            Value::Rgbw(c) => Ok(*c),
            other => Err(other.mismatch(ValueKind::Rgbw)),
        }
    }

    fn mismatch(&self, expected: ValueKind) -> ValueError {
        ValueError::TypeMismatch {
            expected,
            actual: self.kind(),
        }
    }
}

/// An RGBW color as the device models it: three color channels plus a
/// dedicated white channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RgbwColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub w: u8,
}

impl RgbwColor {
    pub fn new(r: u8, g: u8, b: u8, w: u8) -> Self {
        Self { r, g, b, w }
    }

    /// Unpack from the device's 32-bit layout: white in the top byte,
    /// then red, green, blue.
    pub fn from_packed(packed: u32) -> Self {
        Self {
            w: (packed >> 24) as u8,
            r: (packed >> 16) as u8,
            g: (packed >> 8) as u8,
            b: packed as u8,
        }
    }

    pub fn to_packed(self) -> u32 {
        (u32::from(self.w) << 24)
            | (u32::from(self.r) << 16)
            | (u32::from(self.g) << 8)
            | u32::from(self.b)
    }
}

/// Which channels of an RGBW control are actually wired up on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorChannels {
    pub r: bool,
    pub g: bool,
    pub b: bool,
    pub w: bool,
}

impl Default for ColorChannels {
    fn default() -> Self {
        Self {
            r: true,
            g: true,
            b: true,
            w: true,
        }
    }
}

impl ColorChannels {
    /// Parse a channel spec string containing any subset of `RGBW`.
    pub fn from_spec(spec: &str) -> Self {
        Self {
            r: spec.contains('R'),
            g: spec.contains('G'),
            b: spec.contains('B'),
            w: spec.contains('W'),
        }
    }
}
