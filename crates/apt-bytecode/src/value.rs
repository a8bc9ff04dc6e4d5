//! Instruction parameter values

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FormatError;

/// A decoded instruction parameter
///
/// `ConstantRef` and `RegisterRef` only ever come from re-tagging an
/// `Integer`; the stored index is the bit-identical `u32`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Signed integer (unsigned 32-bit fields are stored bit-identically)
    Integer(i32),
    /// Floating point number (single precision fields are widened)
    Float(f64),
    /// Boolean flag
    Boolean(bool),
    /// Resolved string
    String(String),
    /// Index into the active constant pool
    ConstantRef(u32),
    /// Index of a VM register
    RegisterRef(u32),
}

/// Discriminant of a [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValueTag {
    /// [`Value::String`]
    String = 0,
    /// [`Value::Boolean`]
    Boolean = 1,
    /// [`Value::Integer`]
    Integer = 2,
    /// [`Value::Float`]
    Float = 3,
    /// [`Value::ConstantRef`]
    Constant = 4,
    /// [`Value::RegisterRef`]
    Register = 5,
}

impl ValueTag {
    fn from_number(n: u8) -> Option<Self> {
        Some(match n {
            0 => Self::String,
            1 => Self::Boolean,
            2 => Self::Integer,
            3 => Self::Float,
            4 => Self::Constant,
            5 => Self::Register,
            _ => return None,
        })
    }
}

impl fmt::Display for ValueTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Constant => "constant",
            Self::Register => "register",
        };
        f.write_str(name)
    }
}

impl Value {
    /// Create a string value
    #[inline]
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    /// Get the tag of this value
    pub fn tag(&self) -> ValueTag {
        match self {
            Self::Integer(_) => ValueTag::Integer,
            Self::Float(_) => ValueTag::Float,
            Self::Boolean(_) => ValueTag::Boolean,
            Self::String(_) => ValueTag::String,
            Self::ConstantRef(_) => ValueTag::Constant,
            Self::RegisterRef(_) => ValueTag::Register,
        }
    }

    /// Get as integer if this is an integer
    #[inline]
    pub fn as_integer(&self) -> Option<i32> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as float if this is a float
    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as string if this is a string
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get the constant pool index if this is a constant reference
    #[inline]
    pub fn as_constant(&self) -> Option<u32> {
        match self {
            Self::ConstantRef(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the register index if this is a register reference
    #[inline]
    pub fn as_register(&self) -> Option<u32> {
        match self {
            Self::RegisterRef(i) => Some(*i),
            _ => None,
        }
    }

    /// Re-tag an integer (or index) as a constant reference
    pub fn to_constant(&self) -> Option<Self> {
        self.raw_index().map(Self::ConstantRef)
    }

    /// Re-tag an integer (or index) as a register reference
    pub fn to_register(&self) -> Option<Self> {
        self.raw_index().map(Self::RegisterRef)
    }

    /// Bit pattern of an integer-like value
    pub(crate) fn raw_index(&self) -> Option<u32> {
        match self {
            Self::Integer(n) => Some(*n as u32),
            Self::ConstantRef(i) | Self::RegisterRef(i) => Some(*i),
            _ => None,
        }
    }
}

/// Textual form: `(<tag number>;<content>)`, strings JSON-quoted
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = self.tag() as u8;
        match self {
            Self::String(s) => {
                let quoted = serde_json::to_string(s).map_err(|_| fmt::Error)?;
                write!(f, "({tag};{quoted})")
            }
            Self::Boolean(b) => write!(f, "({tag};{b})"),
            Self::Integer(n) => write!(f, "({tag};{n})"),
            Self::ConstantRef(i) | Self::RegisterRef(i) => write!(f, "({tag};{i})"),
            Self::Float(n) => write!(f, "({tag};{n:?})"),
        }
    }
}

impl FromStr for Value {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FormatError::InvalidValueText(s.to_string());

        let inner = s
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(invalid)?;
        let (tag, content) = inner.split_once(';').ok_or_else(invalid)?;
        let tag = tag
            .parse::<u8>()
            .ok()
            .and_then(ValueTag::from_number)
            .ok_or_else(invalid)?;

        let value = match tag {
            ValueTag::String => {
                Self::String(serde_json::from_str(content).map_err(|_| invalid())?)
            }
            ValueTag::Boolean => Self::Boolean(content.parse().map_err(|_| invalid())?),
            ValueTag::Integer => Self::Integer(content.parse().map_err(|_| invalid())?),
            ValueTag::Float => Self::Float(content.parse().map_err(|_| invalid())?),
            ValueTag::Constant => Self::ConstantRef(content.parse().map_err(|_| invalid())?),
            ValueTag::Register => Self::RegisterRef(content.parse().map_err(|_| invalid())?),
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retag_preserves_bits() {
        let v = Value::Integer(-1);
        assert_eq!(v.to_constant(), Some(Value::ConstantRef(u32::MAX)));
        assert_eq!(Value::Integer(7).to_register(), Some(Value::RegisterRef(7)));
        assert_eq!(Value::string("x").to_constant(), None);
        assert_eq!(Value::Float(1.0).to_register(), None);
    }

    #[test]
    fn test_text_form() {
        assert_eq!(Value::Integer(-3).to_string(), "(2;-3)");
        assert_eq!(Value::string("a\"b").to_string(), "(0;\"a\\\"b\")");
        assert_eq!(Value::ConstantRef(9).to_string(), "(4;9)");
        assert_eq!(Value::Boolean(true).to_string(), "(1;true)");
    }

    #[test]
    fn test_text_parse() {
        let values = [
            Value::Integer(42),
            Value::Float(0.25),
            Value::Float(3.0),
            Value::Boolean(false),
            Value::string("hello; (world)"),
            Value::ConstantRef(12),
            Value::RegisterRef(3),
        ];
        for v in values {
            let parsed: Value = v.to_string().parse().unwrap();
            assert_eq!(parsed, v);
        }
    }

    #[test]
    fn test_text_parse_errors() {
        for text in ["", "2;1", "(9;1)", "(2;x)", "(0;unquoted)", "(2)"] {
            assert!(
                matches!(text.parse::<Value>(), Err(FormatError::InvalidValueText(_))),
                "{text} should not parse"
            );
        }
    }
}
