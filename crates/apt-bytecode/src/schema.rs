//! Per-opcode parameter schemas
//!
//! Every opcode with a known payload maps to an ordered list of
//! [`Directive`]s. The decoder walks the list reading, the encoder walks
//! the same list writing, so the table is the single source of truth for
//! the binary layout.

use serde::{Deserialize, Serialize};

use crate::opcode::Opcode;

/// Size of a stream pointer in bytes
pub const POINTER_SIZE: usize = 4;

/// Alignment required by flagged opcodes
pub const STREAM_ALIGNMENT: u64 = 4;

/// One step of a parameter schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Directive {
    /// Unsigned 8-bit integer
    U8,
    /// Unsigned 16-bit integer
    U16,
    /// Unsigned 24-bit integer
    U24,
    /// Unsigned 32-bit integer
    U32,
    /// Signed 8-bit integer
    I8,
    /// Signed 16-bit integer
    I16,
    /// Signed 32-bit integer
    I32,
    /// IEEE-754 single
    Float,
    /// IEEE-754 double
    Double,
    /// One-byte boolean
    Boolean,
    /// Absolute pointer to a NUL-terminated string
    String,
    /// 1 filler byte
    Jump8,
    /// 2 filler bytes
    Jump16,
    /// 4 filler bytes
    Jump32,
    /// 8 filler bytes
    Jump64,
    /// Re-tag the previous integer as a constant pool index
    Constant,
    /// Re-tag the previous integer as a register index
    Register,
    /// The previous integer is a branch offset
    BranchOffset,
    /// The previous integer is the size of the next array
    ArraySize,
    /// Like [`Directive::ArraySize`], but the size is dropped from the parameters
    ArraySizeHidden,
    /// Absolute pointer to the record table; record body follows
    ArrayBegin,
    /// End of the record body
    ArrayEnd,
    /// Eight opaque bytes kept in [`crate::Instruction::trailer`]
    Opaque64,
}

impl Directive {
    /// Number of bytes this directive occupies where it is written
    pub const fn width(self) -> usize {
        match self {
            Self::U8 | Self::I8 | Self::Boolean | Self::Jump8 => 1,
            Self::U16 | Self::I16 | Self::Jump16 => 2,
            Self::U24 => 3,
            Self::U32 | Self::I32 | Self::Float | Self::Jump32 => 4,
            Self::String | Self::ArrayBegin => POINTER_SIZE,
            Self::Double | Self::Jump64 | Self::Opaque64 => 8,
            Self::Constant
            | Self::Register
            | Self::BranchOffset
            | Self::ArraySize
            | Self::ArraySizeHidden
            | Self::ArrayEnd => 0,
        }
    }

    /// Whether this directive pushes a parameter value
    pub const fn produces_value(self) -> bool {
        matches!(
            self,
            Self::U8
                | Self::U16
                | Self::U24
                | Self::U32
                | Self::I8
                | Self::I16
                | Self::I32
                | Self::Float
                | Self::Double
                | Self::Boolean
                | Self::String
        )
    }
}

/// Parameter layout of one opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    directives: &'static [Directive],
    aligned: bool,
}

impl Schema {
    /// Create a schema from a directive list
    pub const fn new(directives: &'static [Directive], aligned: bool) -> Self {
        Self {
            directives,
            aligned,
        }
    }

    /// Look up the schema of an opcode
    pub fn of(opcode: Opcode) -> Option<Self> {
        directives_for(opcode).map(|d| Self::new(d, opcode.requires_alignment()))
    }

    /// Ordered directives
    #[inline]
    pub fn directives(&self) -> &'static [Directive] {
        self.directives
    }

    /// Whether parameters start on a 4-byte boundary
    #[inline]
    pub fn aligned(&self) -> bool {
        self.aligned
    }

    /// Index range of the array body, `ArrayBegin` and `ArrayEnd` excluded
    pub fn array_body(&self) -> Option<std::ops::Range<usize>> {
        let begin = self
            .directives
            .iter()
            .position(|d| *d == Directive::ArrayBegin)?;
        let end = self.directives[begin..]
            .iter()
            .position(|d| *d == Directive::ArrayEnd)?;
        Some(begin + 1..begin + end)
    }

    /// Bytes stored in the stream itself (array bodies live elsewhere)
    pub fn inline_len(&self) -> usize {
        let body = self.array_body().unwrap_or(0..0);
        self.directives
            .iter()
            .enumerate()
            .filter(|(i, _)| !body.contains(i))
            .map(|(_, d)| d.width())
            .sum()
    }

    /// Bytes of one array record
    pub fn record_width(&self) -> usize {
        self.array_body()
            .map(|body| self.directives[body].iter().map(|d| d.width()).sum())
            .unwrap_or(0)
    }

    /// Parameter values produced by one array record
    pub fn record_values(&self) -> usize {
        self.array_body()
            .map(|body| {
                self.directives[body]
                    .iter()
                    .filter(|d| d.produces_value())
                    .count()
            })
            .unwrap_or(0)
    }

    /// Parameter values produced outside the array
    pub fn fixed_values(&self) -> usize {
        let body = self.array_body().unwrap_or(0..0);
        let hidden = self
            .directives
            .iter()
            .filter(|d| **d == Directive::ArraySizeHidden)
            .count();
        self.directives
            .iter()
            .enumerate()
            .filter(|(i, d)| !body.contains(i) && d.produces_value())
            .count()
            - hidden
    }
}

use Directive::*;

const NONE: &[Directive] = &[];
const INT32: &[Directive] = &[I32];
const BYTE: &[Directive] = &[I8];
const SHORT: &[Directive] = &[I16];
const LONG: &[Directive] = &[U32];
const FLOAT: &[Directive] = &[Float];
const REGISTER8: &[Directive] = &[U8, Register];
const CONSTANT8: &[Directive] = &[U8, Constant];
const CONSTANT16: &[Directive] = &[U16, Constant];
const STRING: &[Directive] = &[String];
const STRING_PAIR: &[Directive] = &[String, String];
const BRANCH: &[Directive] = &[I32, BranchOffset];
const CONSTANT_ARRAY: &[Directive] = &[U32, ArraySizeHidden, ArrayBegin, U32, Constant, ArrayEnd];
const DEFINE_FUNCTION: &[Directive] = &[
    String, // name
    U32,    // parameter count
    ArraySize,
    ArrayBegin,
    String, // parameter name
    ArrayEnd,
    I32, // body length
    Opaque64,
];
const DEFINE_FUNCTION2: &[Directive] = &[
    String, // name
    U32,    // parameter count
    ArraySize,
    U8,  // register count
    U24, // preload flags
    ArrayBegin,
    I32,    // register
    String, // parameter name
    ArrayEnd,
    I32, // body length
    Opaque64,
];

fn directives_for(opcode: Opcode) -> Option<&'static [Directive]> {
    use Opcode as Op;

    if opcode.to_byte() < 0x80 {
        return Some(NONE);
    }

    let directives = match opcode {
        Op::GetUrl2 => NONE,
        Op::GotoFrame | Op::GotoFrame2 => INT32,
        Op::EaPushByte => BYTE,
        Op::EaPushShort => SHORT,
        // SetRegister keeps a plain index, it is not a register operand
        Op::EaPushLong | Op::SetRegister => LONG,
        Op::EaPushRegister => REGISTER8,
        Op::EaPushValueOfVar
        | Op::EaPushConstantByte
        | Op::EaGetNamedMember
        | Op::EaCallNamedFuncPop
        | Op::EaCallNamedFunc
        | Op::EaCallNamedMethodPop
        | Op::EaCallNamedMethod => CONSTANT8,
        Op::EaPushConstantWord => CONSTANT16,
        Op::GotoLabel
        | Op::SetTarget
        | Op::EaPushString
        | Op::EaGetStringVar
        | Op::EaSetStringVar
        | Op::EaGetStringMember
        | Op::EaSetStringMember => STRING,
        Op::GetUrl => STRING_PAIR,
        Op::EaPushFloat => FLOAT,
        Op::ConstantPool | Op::PushData => CONSTANT_ARRAY,
        Op::DefineFunction => DEFINE_FUNCTION,
        Op::DefineFunction2 => DEFINE_FUNCTION2,
        Op::BranchAlways | Op::BranchIfTrue | Op::EaBranchIfFalse => BRANCH,
        _ => return None,
    };
    Some(directives)
}

impl Opcode {
    /// Parameter schema of this opcode, if its layout is known
    #[inline]
    pub fn schema(self) -> Option<Schema> {
        Schema::of(self)
    }
}
