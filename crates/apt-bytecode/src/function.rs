//! Function definitions
//!
//! Typed view over the flat parameter list of `DefineFunction` and
//! `DefineFunction2`. Converting back with
//! [`FunctionDefinition::to_instruction`] yields the exact parameter layout
//! the encoder expects.

use serde::{Deserialize, Serialize};

use crate::error::{FormatError, Result};
use crate::instruction::Instruction;
use crate::opcode::Opcode;
use crate::value::{Value, ValueTag};

/// Register preload flags of `DefineFunction2` (a 24-bit field)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreloadFlags(pub u32);

impl PreloadFlags {
    /// Preload `_global`
    pub const PRELOAD_GLOBAL: Self = Self(0x00_0001);
    /// Preload `this`
    pub const PRELOAD_THIS: Self = Self(0x00_0100);
    /// Do not create `this`
    pub const SUPPRESS_THIS: Self = Self(0x00_0200);
    /// Preload `arguments`
    pub const PRELOAD_ARGUMENTS: Self = Self(0x00_0400);
    /// Do not create `arguments`
    pub const SUPPRESS_ARGUMENTS: Self = Self(0x00_0800);
    /// Preload `super`
    pub const PRELOAD_SUPER: Self = Self(0x00_1000);
    /// Do not create `super`
    pub const SUPPRESS_SUPER: Self = Self(0x00_2000);
    /// Preload `_root`
    pub const PRELOAD_ROOT: Self = Self(0x00_4000);
    /// Preload `_parent`
    pub const PRELOAD_PARENT: Self = Self(0x00_8000);
    /// Preload `extern` (engine extension)
    pub const PRELOAD_EXTERN: Self = Self(0x01_0000);

    /// Raw bits
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two flag sets
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Registers filled on entry, in allocation order starting at register 1
    pub fn preloaded_registers(self) -> Vec<(u8, &'static str)> {
        const ORDER: [(PreloadFlags, &str); 7] = [
            (PreloadFlags::PRELOAD_THIS, "this"),
            (PreloadFlags::PRELOAD_ARGUMENTS, "arguments"),
            (PreloadFlags::PRELOAD_SUPER, "super"),
            (PreloadFlags::PRELOAD_ROOT, "_root"),
            (PreloadFlags::PRELOAD_PARENT, "_parent"),
            (PreloadFlags::PRELOAD_GLOBAL, "_global"),
            (PreloadFlags::PRELOAD_EXTERN, "extern"),
        ];
        ORDER
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .zip(1u8..)
            .map(|((_, name), register)| (register, *name))
            .collect()
    }
}

impl std::ops::BitOr for PreloadFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// A declared function parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionParam {
    /// Register the argument is stored in
    ///
    /// Every `DefineFunction2` parameter decodes to `Some`, with `Some(0)`
    /// when no register is assigned. `None` is written as register 0, and
    /// `DefineFunction` parameters are always `None`.
    pub register: Option<i32>,
    /// Parameter name
    pub name: String,
}

/// A `DefineFunction` or `DefineFunction2` instruction
///
/// `register_count` is `Some` exactly for `DefineFunction2`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Function name (empty for anonymous functions)
    pub name: String,
    /// Declared parameters
    pub params: Vec<FunctionParam>,
    /// Number of registers (`DefineFunction2` only)
    pub register_count: Option<u8>,
    /// Preload flags (`DefineFunction2` only)
    pub flags: PreloadFlags,
    /// Byte length of the function body following the definition
    pub body_length: i32,
    /// Opaque trailer, carried verbatim
    pub trailer: u64,
}

impl FunctionDefinition {
    /// Create a builder
    pub fn builder() -> FunctionDefinitionBuilder {
        FunctionDefinitionBuilder::new()
    }

    /// Opcode this definition encodes to
    #[inline]
    pub fn opcode(&self) -> Opcode {
        if self.register_count.is_some() {
            Opcode::DefineFunction2
        } else {
            Opcode::DefineFunction
        }
    }

    /// Name, or `<anonymous>`
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "<anonymous>"
        } else {
            &self.name
        }
    }

    /// Flatten into an instruction
    pub fn to_instruction(&self) -> Instruction {
        let mut params = vec![
            Value::string(self.name.as_str()),
            Value::Integer(self.params.len() as i32),
        ];
        match self.register_count {
            Some(registers) => {
                params.push(Value::Integer(registers as i32));
                params.push(Value::Integer(self.flags.bits() as i32));
                for param in &self.params {
                    params.push(Value::Integer(param.register.unwrap_or(0)));
                    params.push(Value::string(param.name.as_str()));
                }
            }
            None => params.extend(self.params.iter().map(|p| Value::string(p.name.as_str()))),
        }
        params.push(Value::Integer(self.body_length));
        Instruction::new(self.opcode(), params).with_trailer(self.trailer)
    }
}

impl From<&FunctionDefinition> for Instruction {
    fn from(definition: &FunctionDefinition) -> Self {
        definition.to_instruction()
    }
}

impl TryFrom<&Instruction> for FunctionDefinition {
    type Error = FormatError;

    fn try_from(instruction: &Instruction) -> Result<Self> {
        let opcode = instruction.opcode;
        let v2 = match opcode {
            Opcode::DefineFunction => false,
            Opcode::DefineFunction2 => true,
            other => return Err(FormatError::NotAFunction(other)),
        };
        let mut reader = ParamReader {
            opcode,
            params: &instruction.params,
            next: 0,
        };

        let name = reader.string()?;
        // stored as U32, so a negative count is a huge one
        let count = reader.integer()? as u32 as usize;
        let (register_count, flags) = if v2 {
            (Some(reader.integer()? as u8), PreloadFlags(reader.integer()? as u32))
        } else {
            (None, PreloadFlags::default())
        };

        let per_param = if v2 { 2 } else { 1 };
        let expected = count
            .saturating_mul(per_param)
            .saturating_add(reader.next + 1);
        if expected != instruction.params.len() {
            return Err(FormatError::CountMismatch {
                opcode,
                expected,
                found: instruction.params.len(),
            });
        }

        let mut params = Vec::with_capacity(count);
        for _ in 0..count {
            let register = if v2 { Some(reader.integer()?) } else { None };
            params.push(FunctionParam {
                register,
                name: reader.string()?,
            });
        }

        Ok(Self {
            name,
            params,
            register_count,
            flags,
            body_length: reader.integer()?,
            trailer: instruction.trailer,
        })
    }
}

struct ParamReader<'a> {
    opcode: Opcode,
    params: &'a [Value],
    next: usize,
}

impl ParamReader<'_> {
    fn take(&mut self, expected: ValueTag) -> Result<&Value> {
        let value = self.params.get(self.next).ok_or(FormatError::CountMismatch {
            opcode: self.opcode,
            expected: self.next + 1,
            found: self.params.len(),
        })?;
        self.next += 1;
        if value.tag() != expected {
            return Err(FormatError::TypeMismatch {
                opcode: self.opcode,
                expected,
                found: value.tag(),
            });
        }
        Ok(value)
    }

    fn integer(&mut self) -> Result<i32> {
        Ok(self.take(ValueTag::Integer)?.as_integer().unwrap_or_default())
    }

    fn string(&mut self) -> Result<String> {
        Ok(self
            .take(ValueTag::String)?
            .as_str()
            .unwrap_or_default()
            .to_owned())
    }
}

/// Builder for function definitions
#[derive(Debug, Default)]
pub struct FunctionDefinitionBuilder {
    name: String,
    params: Vec<FunctionParam>,
    register_count: Option<u8>,
    flags: PreloadFlags,
    body_length: i32,
    trailer: u64,
}

impl FunctionDefinitionBuilder {
    /// Create a new builder for an anonymous `DefineFunction`
    pub fn new() -> Self {
        Self::default()
    }

    /// Set function name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add a parameter without a register
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(FunctionParam {
            register: None,
            name: name.into(),
        });
        self
    }

    /// Add a parameter stored in `register`
    pub fn register_param(mut self, register: i32, name: impl Into<String>) -> Self {
        self.params.push(FunctionParam {
            register: Some(register),
            name: name.into(),
        });
        self
    }

    /// Use registers, which makes this a `DefineFunction2`
    pub fn register_count(mut self, count: u8) -> Self {
        self.register_count = Some(count);
        self
    }

    /// Set preload flags
    pub fn flags(mut self, flags: PreloadFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set body length in bytes
    pub fn body_length(mut self, length: i32) -> Self {
        self.body_length = length;
        self
    }

    /// Set the opaque trailer
    pub fn trailer(mut self, trailer: u64) -> Self {
        self.trailer = trailer;
        self
    }

    /// Build the definition
    pub fn build(self) -> FunctionDefinition {
        FunctionDefinition {
            name: self.name,
            params: self.params,
            register_count: self.register_count,
            flags: self.flags,
            body_length: self.body_length,
            trailer: self.trailer,
        }
    }
}
