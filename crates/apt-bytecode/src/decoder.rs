//! Instruction stream decoder

use crate::arena::padding_for;
use crate::error::{FormatError, Result};
use crate::instruction::Instruction;
use crate::opcode::Opcode;
use crate::schema::{Directive, STREAM_ALIGNMENT, Schema};
use crate::value::Value;

/// Guards against corrupt or hostile streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeConfig {
    /// Maximum number of instructions per stream (default: 1M)
    pub max_instructions: usize,
    /// Maximum distance between the start offset and the branch frontier (default: 16MB)
    pub max_branch_span: u64,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            max_instructions: 1 << 20,
            max_branch_span: 16 * 1024 * 1024,
        }
    }
}

/// Read-only little-endian cursor over a byte buffer
#[derive(Debug, Clone)]
pub(crate) struct Cursor<'a> {
    bytes: &'a [u8],
    position: u64,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(bytes: &'a [u8], position: u64) -> Self {
        Self { bytes, position }
    }

    #[inline]
    pub(crate) fn position(&self) -> u64 {
        self.position
    }

    fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn out_of_bounds(&self, offset: u64, size: u64) -> FormatError {
        FormatError::BoundsExceeded {
            offset,
            size,
            len: self.len(),
        }
    }

    /// Bytes left between the cursor and the end of the buffer
    fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.position)
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        if position > self.len() {
            return Err(self.out_of_bounds(position, 0));
        }
        self.position = position;
        Ok(())
    }

    fn skip(&mut self, count: u64) -> Result<()> {
        self.take(count as usize).map(|_| ())
    }

    fn align(&mut self, align: u64) -> Result<()> {
        self.skip(padding_for(self.position, align))
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        let start = self.position;
        let end = start
            .checked_add(count as u64)
            .filter(|end| *end <= self.len())
            .ok_or_else(|| self.out_of_bounds(start, count as u64))?;
        self.position = end;
        Ok(&self.bytes[start as usize..end as usize])
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn read_u24(&mut self) -> Result<u32> {
        let [a, b, c] = self.array()?;
        Ok(u32::from_le_bytes([a, b, c, 0]))
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    /// Read the NUL-terminated string at an absolute offset, cursor unchanged
    fn read_string_at(&self, offset: u64) -> Result<String> {
        let tail = usize::try_from(offset)
            .ok()
            .and_then(|start| self.bytes.get(start..))
            .ok_or_else(|| self.out_of_bounds(offset, 1))?;
        let nul = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| self.out_of_bounds(offset, tail.len() as u64 + 1))?;
        String::from_utf8(tail[..nul].to_vec()).map_err(|_| FormatError::InvalidString { offset })
    }
}

/// Tracks the furthest stream offset any decoded branch can reach
#[derive(Debug, Clone, Copy)]
pub(crate) struct Frontier {
    start: u64,
    furthest: u64,
    max_span: u64,
}

impl Frontier {
    fn new(start: u64, max_span: u64) -> Self {
        Self {
            start,
            furthest: start,
            max_span,
        }
    }

    /// Account for a branch whose operand ends at `position`
    fn report(&mut self, position: u64, offset: i32) -> Result<()> {
        let target = position as i64 + offset as i64;
        if target > self.furthest as i64 {
            let target = target as u64;
            if target - self.start > self.max_span {
                tracing::warn!(
                    target: "apt::bytecode",
                    branch_target = target,
                    limit = self.max_span,
                    "Branch frontier exceeds cap"
                );
                return Err(FormatError::IterationCapExceeded {
                    limit: self.max_span,
                });
            }
            self.furthest = target;
        }
        Ok(())
    }
}

/// Array being read: where its body starts and how to get back
#[derive(Debug, Clone, Copy)]
struct OpenArray {
    begin: usize,
    remaining: u32,
    resume: u64,
}

/// Decoder for APT instruction streams
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    config: DecodeConfig,
}

impl Decoder {
    /// Create a decoder with default caps
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decoder with custom caps
    pub fn with_config(config: DecodeConfig) -> Self {
        Self { config }
    }

    /// Active configuration
    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    /// Decode the stream starting at `start`
    ///
    /// Decoding stops at an `End` instruction unless an earlier branch
    /// targets an offset beyond it.
    pub fn decode(&self, bytes: &[u8], start: u64) -> Result<Vec<(u64, Instruction)>> {
        let mut cursor = Cursor::new(bytes, 0);
        cursor.seek(start)?;
        let mut frontier = Frontier::new(start, self.config.max_branch_span);
        let mut instructions: Vec<(u64, Instruction)> = Vec::new();

        while instructions.last().is_none_or(|(_, last)| !last.is_end())
            || cursor.position() <= frontier.furthest
        {
            if instructions.len() >= self.config.max_instructions {
                tracing::warn!(
                    target: "apt::bytecode",
                    limit = self.config.max_instructions,
                    "Instruction cap reached"
                );
                return Err(FormatError::IterationCapExceeded {
                    limit: self.config.max_instructions as u64,
                });
            }

            let offset = cursor.position();
            let byte = cursor.read_u8()?;
            let opcode =
                Opcode::from_byte(byte).ok_or(FormatError::UnknownOpcode { byte, offset })?;
            let schema = opcode.schema().ok_or(FormatError::NoSchema(opcode))?;

            let instruction = read_instruction(opcode, schema, &mut cursor, &mut frontier)?;
            tracing::trace!(
                target: "apt::bytecode",
                offset,
                opcode = opcode.name(),
                params = instruction.params.len(),
                "Decoded instruction"
            );
            instructions.push((offset, instruction));
        }

        tracing::debug!(
            target: "apt::bytecode",
            start,
            end = cursor.position(),
            frontier = frontier.furthest,
            instructions = instructions.len(),
            "Decoded instruction stream"
        );
        Ok(instructions)
    }
}

/// Decode with default caps
pub fn decode(bytes: &[u8], start: u64) -> Result<Vec<(u64, Instruction)>> {
    Decoder::new().decode(bytes, start)
}

/// Read the parameters of one instruction, the opcode byte already consumed
pub(crate) fn read_instruction(
    opcode: Opcode,
    schema: Schema,
    cursor: &mut Cursor<'_>,
    frontier: &mut Frontier,
) -> Result<Instruction> {
    if schema.aligned() {
        cursor.align(STREAM_ALIGNMENT)?;
    }

    let directives = schema.directives();
    let unsupported = |directive| FormatError::UnsupportedDirective { opcode, directive };

    let mut instruction = Instruction::simple(opcode);
    let params = &mut instruction.params;
    let mut array_size: Option<u32> = None;
    let mut array: Option<OpenArray> = None;
    let mut index = 0;

    while index < directives.len() {
        let directive = directives[index];
        match directive {
            Directive::U8 => params.push(Value::Integer(cursor.read_u8()? as i32)),
            Directive::U16 => params.push(Value::Integer(cursor.read_u16()? as i32)),
            Directive::U24 => params.push(Value::Integer(cursor.read_u24()? as i32)),
            Directive::U32 => params.push(Value::Integer(cursor.read_u32()? as i32)),
            Directive::I8 => params.push(Value::Integer(cursor.read_u8()? as i8 as i32)),
            Directive::I16 => params.push(Value::Integer(cursor.read_u16()? as i16 as i32)),
            Directive::I32 => params.push(Value::Integer(cursor.read_u32()? as i32)),
            Directive::Float => params.push(Value::Float(cursor.read_f32()? as f64)),
            Directive::Double => params.push(Value::Float(cursor.read_f64()?)),
            Directive::Boolean => params.push(Value::Boolean(cursor.read_u8()? != 0)),
            Directive::String => {
                let offset = cursor.read_u32()? as u64;
                params.push(Value::String(cursor.read_string_at(offset)?));
            }
            Directive::Jump8 => cursor.skip(1)?,
            Directive::Jump16 => cursor.skip(2)?,
            Directive::Jump32 => cursor.skip(4)?,
            Directive::Jump64 => cursor.skip(8)?,
            Directive::Opaque64 => instruction.trailer = cursor.read_u64()?,
            Directive::Constant => {
                let last = params.last_mut().ok_or(unsupported(directive))?;
                *last = last.to_constant().ok_or(unsupported(directive))?;
            }
            Directive::Register => {
                let last = params.last_mut().ok_or(unsupported(directive))?;
                *last = last.to_register().ok_or(unsupported(directive))?;
            }
            Directive::BranchOffset => {
                let offset = params
                    .last()
                    .and_then(Value::as_integer)
                    .ok_or(unsupported(directive))?;
                frontier.report(cursor.position(), offset)?;
            }
            Directive::ArraySize => {
                let size = params
                    .last()
                    .and_then(Value::raw_index)
                    .ok_or(unsupported(directive))?;
                array_size = Some(size);
            }
            Directive::ArraySizeHidden => {
                let size = params
                    .pop()
                    .as_ref()
                    .and_then(Value::raw_index)
                    .ok_or(unsupported(directive))?;
                array_size = Some(size);
            }
            Directive::ArrayBegin => {
                let size = array_size.ok_or(FormatError::MissingArraySize(opcode))?;
                if array.is_some() {
                    return Err(FormatError::CascadedArray(opcode));
                }
                let table = cursor.read_u32()? as u64;
                if size == 0 {
                    index = matching_end(directives, index).ok_or(unsupported(directive))? + 1;
                    array_size = None;
                    continue;
                }

                let end = matching_end(directives, index).ok_or(unsupported(directive))?;
                let width: u64 = directives[index + 1..end]
                    .iter()
                    .map(|d| d.width() as u64)
                    .sum();
                if width == 0 {
                    return Err(unsupported(directive));
                }

                let resume = cursor.position();
                cursor.seek(table)?;
                let needed = width * size as u64;
                if needed > cursor.remaining() {
                    return Err(cursor.out_of_bounds(table, needed));
                }
                array = Some(OpenArray {
                    begin: index,
                    remaining: size,
                    resume,
                });
            }
            Directive::ArrayEnd => {
                if array_size.is_none() {
                    return Err(FormatError::MissingArraySize(opcode));
                }
                let open = array.as_mut().ok_or(unsupported(directive))?;
                open.remaining -= 1;
                if open.remaining > 0 {
                    index = open.begin + 1;
                    continue;
                }
                cursor.seek(open.resume)?;
                array = None;
                array_size = None;
            }
        }
        index += 1;
    }

    Ok(instruction)
}

/// Index of the `ArrayEnd` closing the array opened at `begin`
fn matching_end(directives: &[Directive], begin: usize) -> Option<usize> {
    directives[begin + 1..]
        .iter()
        .position(|d| *d == Directive::ArrayEnd)
        .map(|i| begin + 1 + i)
}
