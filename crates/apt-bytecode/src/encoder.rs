//! Instruction stream encoder
//!
//! The stream chunk is allocated first, sized from each schema's inline
//! length, so a stand-alone encode places the stream at offset 0. Strings
//! and record tables are allocated behind it as they are met and their
//! addresses written into the stream, which is patched into its chunk once
//! every instruction is written.

use crate::arena::{Arena, ChunkHandle, padding_for};
use crate::error::{FormatError, Result};
use crate::instruction::Instruction;
use crate::opcode::Opcode;
use crate::schema::{Directive, STREAM_ALIGNMENT, Schema};
use crate::value::{Value, ValueTag};

/// Encoder for APT instruction streams
#[derive(Debug, Clone, Copy, Default)]
pub struct Encoder {
    _private: (),
}

impl Encoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode instructions into a fresh blob whose stream starts at offset 0
    ///
    /// Integer parameters are checked for their tag only and written
    /// truncated to the field width, so `RegisterRef(300)` in a one-byte
    /// register field is stored as 44.
    pub fn encode(&self, instructions: &[Instruction]) -> Result<Vec<u8>> {
        let mut arena = Arena::new();
        self.encode_into(&mut arena, instructions)?;
        Ok(arena.finalize())
    }

    /// Encode instructions into an existing arena, returning the stream chunk
    ///
    /// `Padding` pseudo-instructions are skipped. Branch offsets are written
    /// as given, and integers are truncated to their field width as in
    /// [`Encoder::encode`]. On error the arena is rolled back to the chunks
    /// it held before the call.
    pub fn encode_into(&self, arena: &mut Arena, instructions: &[Instruction]) -> Result<ChunkHandle> {
        let mark = arena.chunk_count();
        match write_stream(arena, instructions) {
            Ok(stream) => Ok(stream),
            Err(err) => {
                arena.truncate(mark);
                Err(err)
            }
        }
    }
}

/// Encode instructions into a fresh blob
///
/// See [`Encoder::encode`] for how out-of-range integers are written.
pub fn encode(instructions: &[Instruction]) -> Result<Vec<u8>> {
    Encoder::new().encode(instructions)
}

fn write_stream(arena: &mut Arena, instructions: &[Instruction]) -> Result<ChunkHandle> {
    let len = stream_len(instructions)?;
    let stream = arena.allocate_padded(len, STREAM_ALIGNMENT);
    let base = arena.address(stream);

    let mut out = Vec::with_capacity(len);
    for instruction in instructions {
        if instruction.opcode == Opcode::Padding {
            continue;
        }
        let schema = schema_of(instruction.opcode)?;

        out.push(instruction.opcode.to_byte());
        if schema.aligned() {
            let padding = padding_for(base + out.len() as u64, STREAM_ALIGNMENT);
            out.resize(out.len() + padding as usize, 0);
        }

        ParamWriter::new(instruction.opcode, arena, &mut out).write(schema, instruction)?;
    }
    debug_assert_eq!(out.len(), len);
    arena.patch(stream, 0, &out)?;

    tracing::debug!(
        target: "apt::bytecode",
        instructions = instructions.len(),
        stream_address = base,
        stream_len = len,
        arena_len = arena.len(),
        "Encoded instruction stream"
    );
    Ok(stream)
}

fn schema_of(opcode: Opcode) -> Result<Schema> {
    opcode.schema().ok_or(FormatError::NoSchema(opcode))
}

/// Stream bytes needed for `instructions` when the stream starts 4-aligned
fn stream_len(instructions: &[Instruction]) -> Result<usize> {
    let mut len = 0u64;
    for instruction in instructions {
        if instruction.opcode == Opcode::Padding {
            continue;
        }
        let schema = schema_of(instruction.opcode)?;
        len += 1;
        if schema.aligned() {
            len += padding_for(len, STREAM_ALIGNMENT);
        }
        len += schema.inline_len() as u64;
    }
    Ok(len as usize)
}

/// Convert an arena address into a 4-byte stream pointer
fn pointer(address: u64) -> Result<u32> {
    u32::try_from(address).map_err(|_| FormatError::BoundsExceeded {
        offset: address,
        size: 4,
        len: u32::MAX as u64,
    })
}

/// Record table being filled
struct OpenTable {
    chunk: ChunkHandle,
    bytes: Vec<u8>,
    begin: usize,
    remaining: u32,
}

/// Writes the parameters of one instruction
struct ParamWriter<'a> {
    opcode: Opcode,
    arena: &'a mut Arena,
    stream: &'a mut Vec<u8>,
    table: Option<OpenTable>,
}

impl<'a> ParamWriter<'a> {
    fn new(opcode: Opcode, arena: &'a mut Arena, stream: &'a mut Vec<u8>) -> Self {
        Self {
            opcode,
            arena,
            stream,
            table: None,
        }
    }

    /// Where bytes currently go: the open record table or the stream
    fn sink(&mut self) -> &mut Vec<u8> {
        match &mut self.table {
            Some(table) => &mut table.bytes,
            None => &mut *self.stream,
        }
    }

    fn unsupported(&self, directive: Directive) -> FormatError {
        FormatError::UnsupportedDirective {
            opcode: self.opcode,
            directive,
        }
    }

    fn write(mut self, schema: Schema, instruction: &Instruction) -> Result<()> {
        let directives = schema.directives();
        let params = &instruction.params;
        let array_count = self.array_count(schema, params)?;
        let mut next_param = 0;
        let mut index = 0;

        while index < directives.len() {
            let directive = directives[index];
            let following = directives.get(index + 1).copied();
            match directive {
                d if d.produces_value() => {
                    if following == Some(Directive::ArraySizeHidden) {
                        let count = array_count.ok_or(FormatError::MissingArraySize(self.opcode))?;
                        self.write_value(d, &Value::Integer(count as i32), ValueTag::Integer)?;
                    } else {
                        let value = params.get(next_param).ok_or(FormatError::CountMismatch {
                            opcode: self.opcode,
                            expected: next_param + 1,
                            found: params.len(),
                        })?;
                        next_param += 1;
                        let expected = match following {
                            Some(Directive::Constant) => ValueTag::Constant,
                            Some(Directive::Register) => ValueTag::Register,
                            _ => natural_tag(d),
                        };
                        self.write_value(d, value, expected)?;
                    }
                }
                Directive::Jump8 | Directive::Jump16 | Directive::Jump32 | Directive::Jump64 => {
                    let width = directive.width();
                    let sink = self.sink();
                    sink.resize(sink.len() + width, 0);
                }
                Directive::Opaque64 => {
                    self.sink().extend_from_slice(&instruction.trailer.to_le_bytes());
                }
                Directive::ArrayBegin => {
                    let count = array_count.ok_or(FormatError::MissingArraySize(self.opcode))?;
                    if self.table.is_some() {
                        return Err(FormatError::CascadedArray(self.opcode));
                    }
                    if count == 0 {
                        self.sink().extend_from_slice(&0u32.to_le_bytes());
                        index = closing_end(directives, index).ok_or(self.unsupported(directive))? + 1;
                        continue;
                    }

                    let size = schema.record_width() * count as usize;
                    let chunk = self.arena.allocate_padded(size, STREAM_ALIGNMENT);
                    let address = pointer(self.arena.address(chunk))?;
                    self.sink().extend_from_slice(&address.to_le_bytes());
                    self.table = Some(OpenTable {
                        chunk,
                        bytes: Vec::with_capacity(size),
                        begin: index,
                        remaining: count,
                    });
                }
                Directive::ArrayEnd => {
                    if array_count.is_none() {
                        return Err(FormatError::MissingArraySize(self.opcode));
                    }
                    let unsupported = self.unsupported(directive);
                    let table = self.table.as_mut().ok_or(unsupported)?;
                    table.remaining -= 1;
                    if table.remaining > 0 {
                        index = table.begin + 1;
                        continue;
                    }
                    if let Some(table) = self.table.take() {
                        self.arena.patch(table.chunk, 0, &table.bytes)?;
                    }
                }
                // markers: the value they refer to is already written
                _ => {}
            }
            index += 1;
        }

        if next_param != params.len() {
            return Err(FormatError::CountMismatch {
                opcode: self.opcode,
                expected: next_param,
                found: params.len(),
            });
        }
        Ok(())
    }

    /// Number of records in the array of this instruction, if any
    ///
    /// A retained size must agree with the parameters that follow it; a
    /// hidden size is derived from them.
    fn array_count(&self, schema: Schema, params: &[Value]) -> Result<Option<u32>> {
        let Some(body) = schema.array_body() else {
            return Ok(None);
        };
        let directives = schema.directives();
        let Some(size_index) = directives[..body.start].iter().position(|d| {
            matches!(d, Directive::ArraySize | Directive::ArraySizeHidden)
        }) else {
            return Err(FormatError::MissingArraySize(self.opcode));
        };

        let per_record = schema.record_values();
        if per_record == 0 {
            return Err(self.unsupported(Directive::ArrayBegin));
        }
        let fixed = schema.fixed_values();
        let mismatch = |expected| FormatError::CountMismatch {
            opcode: self.opcode,
            expected,
            found: params.len(),
        };

        let count = match directives[size_index] {
            Directive::ArraySizeHidden => {
                let array_values = params.len().checked_sub(fixed).ok_or(mismatch(fixed))?;
                if array_values % per_record != 0 {
                    return Err(mismatch(fixed + array_values.next_multiple_of(per_record)));
                }
                array_values / per_record
            }
            _ => {
                // the size is the value written just before the marker
                let position = directives[..size_index]
                    .iter()
                    .filter(|d| d.produces_value())
                    .count();
                let declared = position
                    .checked_sub(1)
                    .and_then(|i| params.get(i))
                    .ok_or(mismatch(position.max(1)))?;
                let count = declared
                    .raw_index()
                    .ok_or(FormatError::TypeMismatch {
                        opcode: self.opcode,
                        expected: ValueTag::Integer,
                        found: declared.tag(),
                    })? as usize;
                let expected = count
                    .checked_mul(per_record)
                    .and_then(|n| n.checked_add(fixed))
                    .ok_or(mismatch(usize::MAX))?;
                if expected != params.len() {
                    return Err(mismatch(expected));
                }
                count
            }
        };

        u32::try_from(count).map(Some).map_err(|_| mismatch(u32::MAX as usize))
    }

    fn write_value(&mut self, directive: Directive, value: &Value, expected: ValueTag) -> Result<()> {
        if value.tag() != expected {
            return Err(FormatError::TypeMismatch {
                opcode: self.opcode,
                expected,
                found: value.tag(),
            });
        }

        match (directive, value) {
            (Directive::String, Value::String(s)) => {
                let address = self.allocate_string(s)?;
                self.sink().extend_from_slice(&address.to_le_bytes());
            }
            (Directive::Float, Value::Float(n)) => {
                self.sink().extend_from_slice(&(*n as f32).to_le_bytes());
            }
            (Directive::Double, Value::Float(n)) => {
                self.sink().extend_from_slice(&n.to_le_bytes());
            }
            (Directive::Boolean, Value::Boolean(b)) => self.sink().push(*b as u8),
            (d, v) => {
                let raw = v.raw_index().ok_or(self.unsupported(d))?;
                let bytes = raw.to_le_bytes();
                let width = d.width();
                if !matches!(width, 1..=4) {
                    return Err(self.unsupported(d));
                }
                self.sink().extend_from_slice(&bytes[..width]);
            }
        }
        Ok(())
    }

    /// Allocate a fresh NUL-terminated copy of `s`; strings are not interned
    fn allocate_string(&mut self, s: &str) -> Result<u32> {
        if s.as_bytes().contains(&0) {
            return Err(FormatError::InvalidString { offset: 0 });
        }
        let mut bytes = Vec::with_capacity(s.len() + 1);
        bytes.extend_from_slice(s.as_bytes());
        bytes.push(0);
        let chunk = self.arena.allocate_bytes(&bytes);
        pointer(self.arena.address(chunk))
    }
}

fn natural_tag(directive: Directive) -> ValueTag {
    match directive {
        Directive::Float | Directive::Double => ValueTag::Float,
        Directive::Boolean => ValueTag::Boolean,
        Directive::String => ValueTag::String,
        _ => ValueTag::Integer,
    }
}

fn closing_end(directives: &[Directive], begin: usize) -> Option<usize> {
    directives[begin + 1..]
        .iter()
        .position(|d| *d == Directive::ArrayEnd)
        .map(|i| begin + 1 + i)
}
