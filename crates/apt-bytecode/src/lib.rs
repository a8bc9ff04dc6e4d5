//! # APT Bytecode
//!
//! Codec for the ActionScript bytecode embedded in APT movies.
//!
//! ## Design Principles
//!
//! - **Schema-driven**: Every opcode's parameter layout is a static directive
//!   list shared by the decoder and the encoder
//! - **Pointer-free**: Strings and arrays live at absolute offsets; the
//!   encoder recreates them through a bump [`Arena`] with patchable chunks
//! - **Byte-accurate**: `decode(encode(x))` yields `x`, and re-encoding a
//!   decoded stream reproduces its layout
//! - **Bounded**: Hostile streams hit [`DecodeConfig`] caps instead of
//!   looping forever

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod arena;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod function;
pub mod instruction;
pub mod opcode;
pub mod schema;
pub mod script;
pub mod value;

pub use arena::{Arena, ChunkHandle};
pub use decoder::{DecodeConfig, Decoder, decode};
pub use encoder::{Encoder, encode};
pub use error::{FormatError, Result};
pub use function::{FunctionDefinition, FunctionDefinitionBuilder, FunctionParam, PreloadFlags};
pub use instruction::Instruction;
pub use opcode::Opcode;
pub use schema::{Directive, Schema};
pub use script::Script;
pub use value::{Value, ValueTag};

/// Encode instructions into an existing arena, returning the stream chunk
///
/// A failed call leaves the arena as it was. See [`Encoder::encode_into`].
pub fn encode_into(arena: &mut Arena, instructions: &[Instruction]) -> Result<ChunkHandle> {
    Encoder::new().encode_into(arena, instructions)
}
