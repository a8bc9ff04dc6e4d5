//! Codec errors

use thiserror::Error;

use crate::opcode::Opcode;
use crate::schema::Directive;
use crate::value::ValueTag;

/// Errors that can occur while decoding or encoding an instruction stream
///
/// Every error aborts the whole call; the codec never returns partial output.
#[derive(Debug, Error)]
pub enum FormatError {
    /// Byte that does not name any opcode
    #[error("Unknown opcode 0x{byte:02X} at offset {offset}")]
    UnknownOpcode {
        /// The offending byte
        byte: u8,
        /// Stream offset of the byte
        offset: u64,
    },

    /// Opcode whose payload layout is not known
    #[error("No parameter schema for opcode {0}")]
    NoSchema(Opcode),

    /// Directive that cannot be applied at this point of the schema
    #[error("Unsupported directive {directive:?} for opcode {opcode}")]
    UnsupportedDirective {
        /// Opcode being processed
        opcode: Opcode,
        /// Directive that could not be applied
        directive: Directive,
    },

    /// Array nested inside another array
    #[error("Cascaded arrays are not supported (opcode {0})")]
    CascadedArray(Opcode),

    /// Array directive reached before any array size was assigned
    #[error("Array size must be assigned before the array (opcode {0})")]
    MissingArraySize(Opcode),

    /// Read, seek or patch outside of the buffer
    #[error("Access of {size} bytes at offset {offset} exceeds length {len}")]
    BoundsExceeded {
        /// Start of the access
        offset: u64,
        /// Number of bytes accessed
        size: u64,
        /// Length of the buffer or chunk
        len: u64,
    },

    /// Declared element count does not match the supplied parameters
    #[error("Count mismatch for opcode {opcode}: expected {expected}, found {found}")]
    CountMismatch {
        /// Opcode being encoded
        opcode: Opcode,
        /// Number of values the schema requires
        expected: usize,
        /// Number of values supplied
        found: usize,
    },

    /// Parameter whose tag does not fit its directive
    #[error("Type mismatch for opcode {opcode}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Opcode being encoded
        opcode: Opcode,
        /// Tag the directive requires
        expected: ValueTag,
        /// Tag that was supplied
        found: ValueTag,
    },

    /// String that cannot be represented as a NUL-terminated byte string
    #[error("Invalid string at offset {offset}")]
    InvalidString {
        /// Offset of the string data (0 when encoding)
        offset: u64,
    },

    /// Decoder guard tripped, the stream is likely corrupt or hostile
    #[error("Iteration cap exceeded (limit {limit})")]
    IterationCapExceeded {
        /// The limit that was exceeded
        limit: u64,
    },

    /// Instruction viewed as a function definition is not one
    #[error("Opcode {0} does not define a function")]
    NotAFunction(Opcode),

    /// Malformed textual value
    #[error("Invalid value text: {0}")]
    InvalidValueText(String),

    /// JSON (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, FormatError>;
