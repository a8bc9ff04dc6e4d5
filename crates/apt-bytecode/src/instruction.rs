//! Decoded instructions

use serde::{Deserialize, Serialize};

use crate::opcode::Opcode;
use crate::value::Value;

/// One instruction: an opcode and its schema-ordered parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// The opcode
    pub opcode: Opcode,
    /// Parameters in schema order
    pub params: Vec<Value>,
    /// Opaque 8-byte trailer of `DefineFunction`/`DefineFunction2`, zero otherwise
    #[serde(default, skip_serializing_if = "is_zero")]
    pub trailer: u64,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

impl Instruction {
    /// Create an instruction
    pub fn new(opcode: Opcode, params: Vec<Value>) -> Self {
        Self {
            opcode,
            params,
            trailer: 0,
        }
    }

    /// Create an instruction without parameters
    pub fn simple(opcode: Opcode) -> Self {
        Self::new(opcode, Vec::new())
    }

    /// Set the define-function trailer
    pub fn with_trailer(mut self, trailer: u64) -> Self {
        self.trailer = trailer;
        self
    }

    /// Branch instruction with a relative offset
    pub fn branch(opcode: Opcode, offset: i32) -> Self {
        Self::new(opcode, vec![Value::Integer(offset)])
    }

    /// `GotoLabel` with a frame label
    pub fn goto_label(label: impl Into<String>) -> Self {
        Self::new(Opcode::GotoLabel, vec![Value::string(label)])
    }

    /// `EaPushString` with a literal
    pub fn push_string(s: impl Into<String>) -> Self {
        Self::new(Opcode::EaPushString, vec![Value::string(s)])
    }

    /// `ConstantPool` declaring the given constant indices
    pub fn constant_pool(indices: impl IntoIterator<Item = u32>) -> Self {
        Self::new(
            Opcode::ConstantPool,
            indices.into_iter().map(Value::ConstantRef).collect(),
        )
    }

    /// `PushData` pushing the given constant indices
    pub fn push_data(indices: impl IntoIterator<Item = u32>) -> Self {
        Self::new(
            Opcode::PushData,
            indices.into_iter().map(Value::ConstantRef).collect(),
        )
    }

    /// Relative offset of a branch instruction
    pub fn branch_offset(&self) -> Option<i32> {
        if self.opcode.is_branch() {
            self.params.first().and_then(Value::as_integer)
        } else {
            None
        }
    }

    /// Whether this instruction ends a stream
    #[inline]
    pub fn is_end(&self) -> bool {
        self.opcode == Opcode::End
    }
}
