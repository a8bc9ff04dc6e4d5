//! Positioned instruction lists

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::Result;
use crate::instruction::Instruction;
use crate::opcode::Opcode;

/// A decoded action script: instructions keyed by stream offset
///
/// Positions are strictly increasing. Branch targets are stream offsets, so
/// lookups go both ways between an instruction's index and its position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<(u64, Instruction)>", into = "Vec<(u64, Instruction)>")]
pub struct Script {
    instructions: Vec<(u64, Instruction)>,
    by_position: FxHashMap<u64, usize>,
}

impl Script {
    /// Decode a script starting at `start`
    pub fn decode(bytes: &[u8], start: u64) -> Result<Self> {
        Self::decode_with(&Decoder::new(), bytes, start)
    }

    /// Decode a script with a configured decoder
    pub fn decode_with(decoder: &Decoder, bytes: &[u8], start: u64) -> Result<Self> {
        Ok(Self::from_positioned(decoder.decode(bytes, start)?))
    }

    /// Build from `(position, instruction)` pairs, sorting by position
    ///
    /// A repeated position keeps the last instruction given for it.
    pub fn from_positioned(mut instructions: Vec<(u64, Instruction)>) -> Self {
        instructions.sort_by_key(|(position, _)| *position);
        instructions.reverse();
        instructions.dedup_by_key(|(position, _)| *position);
        instructions.reverse();

        let by_position = instructions
            .iter()
            .enumerate()
            .map(|(index, (position, _))| (*position, index))
            .collect();
        Self {
            instructions,
            by_position,
        }
    }

    /// Build from bare instructions, numbering positions by index
    pub fn from_instructions(instructions: impl IntoIterator<Item = Instruction>) -> Self {
        Self::from_positioned((0u64..).zip(instructions).collect())
    }

    /// Number of instructions
    #[inline]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Whether the script has no instructions
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Instructions in stream order
    pub fn instructions(&self) -> impl ExactSizeIterator<Item = &Instruction> + '_ {
        self.instructions.iter().map(|(_, instruction)| instruction)
    }

    /// `(position, instruction)` pairs in stream order
    #[inline]
    pub fn positioned(&self) -> &[(u64, Instruction)] {
        &self.instructions
    }

    /// Stream position of the instruction at `index`
    pub fn position_by_index(&self, index: usize) -> Option<u64> {
        self.instructions.get(index).map(|(position, _)| *position)
    }

    /// Index of the instruction at `position`
    ///
    /// Positions past the last instruction resolve to the last index, as a
    /// branch may target the end of the stream.
    pub fn index_by_position(&self, position: u64) -> Option<usize> {
        if let Some(index) = self.by_position.get(&position) {
            return Some(*index);
        }
        match self.instructions.last() {
            Some((last, _)) if position > *last => Some(self.instructions.len() - 1),
            _ => None,
        }
    }

    /// Instruction at `index`
    pub fn instruction_by_index(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index).map(|(_, instruction)| instruction)
    }

    /// Instruction starting exactly at `position`
    pub fn instruction_at(&self, position: u64) -> Option<&Instruction> {
        self.by_position
            .get(&position)
            .map(|index| &self.instructions[*index].1)
    }

    /// Copy of this script guaranteed to end with `End`
    ///
    /// A missing terminator is appended one past the last position.
    pub fn with_end(&self) -> Self {
        match self.instructions.last() {
            Some((_, last)) if last.is_end() => self.clone(),
            last => {
                let position = last.map_or(0, |(position, _)| position + 1);
                let mut instructions = self.instructions.clone();
                instructions.push((position, Instruction::simple(Opcode::End)));
                Self::from_positioned(instructions)
            }
        }
    }

    /// Encode into a fresh blob; positions are recomputed by the encoder
    pub fn encode(&self) -> Result<Vec<u8>> {
        let instructions: Vec<Instruction> = self.instructions().cloned().collect();
        Encoder::new().encode(&instructions)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl From<Vec<(u64, Instruction)>> for Script {
    fn from(instructions: Vec<(u64, Instruction)>) -> Self {
        Self::from_positioned(instructions)
    }
}

impl From<Script> for Vec<(u64, Instruction)> {
    fn from(script: Script) -> Self {
        script.instructions
    }
}
