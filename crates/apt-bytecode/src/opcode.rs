//! APT ActionScript opcodes

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! opcodes {
    ($($(#[$meta:meta])* $name:ident = $byte:literal,)*) => {
        /// ActionScript opcodes understood by the APT scripting VM.
        ///
        /// Stack-based instruction set. Opcodes below `0x80` never carry a
        /// payload; the rest are described by the schema table.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum Opcode {
            $($(#[$meta])* $name = $byte,)*
        }

        impl Opcode {
            /// Every opcode, in byte order
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name,)*];

            /// Convert byte to opcode
            pub fn from_byte(byte: u8) -> Option<Self> {
                match byte {
                    $($byte => Some(Self::$name),)*
                    _ => None,
                }
            }

            /// Get the opcode name
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$name => stringify!($name),)*
                }
            }
        }
    };
}

opcodes! {
    // ==================== Movie control ====================
    /// End of the instruction stream
    End = 0x00,
    /// Go to the next frame of the current sprite
    NextFrame = 0x04,
    /// Go to the previous frame of the current sprite
    PrevFrame = 0x05,
    /// Start playback of the current sprite
    Play = 0x06,
    /// Stop playback of the current sprite
    Stop = 0x07,
    /// Toggle render quality
    ToggleQuality = 0x08,
    /// Stop every playing sound
    StopSounds = 0x09,

    // ==================== Arithmetic ====================
    /// a + b (numeric)
    Add = 0x0A,
    /// a - b
    Subtract = 0x0B,
    /// a * b
    Multiply = 0x0C,
    /// a / b
    Divide = 0x0D,

    // ==================== Logic ====================
    /// Numeric equality
    Equals = 0x0E,
    /// Numeric less-than
    LessThan = 0x0F,
    /// Logical and
    LogicalAnd = 0x10,
    /// Logical or
    LogicalOr = 0x11,
    /// Logical not
    LogicalNot = 0x12,

    // ==================== Strings ====================
    /// String equality
    StringEquals = 0x13,
    /// String length
    StringLength = 0x14,
    /// Substring extraction
    SubString = 0x15,

    // ==================== Stack & variables ====================
    /// Discard top of stack
    Pop = 0x17,
    /// Truncate to integer
    ToInteger = 0x18,
    /// Read a variable by name
    GetVariable = 0x1C,
    /// Write a variable by name
    SetVariable = 0x1D,
    /// Set target sprite from the stack
    SetTarget2 = 0x20,
    /// String concatenation
    StringConcat = 0x21,
    /// Read a sprite property
    GetProperty = 0x22,
    /// Write a sprite property
    SetProperty = 0x23,
    /// Duplicate a sprite
    CloneSprite = 0x24,
    /// Remove a cloned sprite
    RemoveSprite = 0x25,
    /// Debug output
    Trace = 0x26,
    /// Begin dragging a sprite
    StartDragMovie = 0x27,
    /// Stop dragging
    StopDragMovie = 0x28,
    /// String less-than
    StringCompare = 0x29,
    /// Throw an exception
    Throw = 0x2A,
    /// Type cast
    CastOp = 0x2B,
    /// Declare implemented interfaces
    ImplementsOp = 0x2C,
    /// Random integer
    Random = 0x30,
    /// Multibyte string length
    MbLength = 0x31,
    /// Character to code
    Ord = 0x32,
    /// Code to character
    Chr = 0x33,
    /// Milliseconds since movie start
    GetTime = 0x34,
    /// Multibyte substring
    MbSubString = 0x35,
    /// Multibyte character to code
    MbOrd = 0x36,
    /// Multibyte code to character
    MbChr = 0x37,
    /// Delete a member
    Delete = 0x3A,
    /// Delete a variable
    Delete2 = 0x3B,

    // ==================== Functions & objects ====================
    /// Define a local variable with a value
    DefineLocal = 0x3C,
    /// Call a function by name
    CallFunction = 0x3D,
    /// Return from the current function
    Return = 0x3E,
    /// a % b
    Modulo = 0x3F,
    /// Construct an object by constructor name
    NewObject = 0x40,
    /// Declare a local variable
    Var = 0x41,
    /// Build an array from the stack
    InitArray = 0x42,
    /// Build an object from the stack
    InitObject = 0x43,
    /// typeof operator
    TypeOf = 0x44,
    /// Target path of a sprite
    TargetPath = 0x45,
    /// Enumerate variable members
    Enumerate = 0x46,
    /// a + b (numbers or strings)
    Add2 = 0x47,
    /// Typed less-than
    LessThan2 = 0x48,
    /// Typed equality
    Equals2 = 0x49,
    /// Convert to number
    ToNumber = 0x4A,
    /// Convert to string
    ToString = 0x4B,
    /// Duplicate top of stack
    PushDuplicate = 0x4C,
    /// Swap the two top stack entries
    StackSwap = 0x4D,
    /// Read an object member
    GetMember = 0x4E,
    /// Write an object member
    SetMember = 0x4F,
    /// Add one
    Increment = 0x50,
    /// Subtract one
    Decrement = 0x51,
    /// Call an object method
    CallMethod = 0x52,
    /// Construct through a method
    NewMethod = 0x53,
    /// instanceof operator
    InstanceOf = 0x54,
    /// Enumerate object members
    Enumerate2 = 0x55,

    // ==================== EA extensions ====================
    /// Push `this`
    EaPushThis = 0x56,
    /// Push `_global`
    EaPushGlobal = 0x58,
    /// Push 0
    EaPushZero = 0x59,
    /// Push 1
    EaPushOne = 0x5A,
    /// Call function, discard result
    EaCallFuncPop = 0x5B,
    /// Call function
    EaCallFunc = 0x5C,
    /// Call method, discard result
    EaCallMethodPop = 0x5D,
    /// Call method
    EaCallMethod = 0x5E,

    // ==================== Bitwise ====================
    /// a & b
    BitwiseAnd = 0x60,
    /// a | b
    BitwiseOr = 0x61,
    /// a ^ b
    BitwiseXor = 0x62,
    /// a << b
    ShiftLeft = 0x63,
    /// a >> b
    ShiftRight = 0x64,
    /// a >>> b
    ShiftRight2 = 0x65,
    /// Strict equality
    StrictEquals = 0x66,
    /// Typed greater-than
    Greater = 0x67,
    /// String greater-than
    StringGreater = 0x68,
    /// Class inheritance
    Extends = 0x69,

    // ==================== EA pushes ====================
    /// Push `this` as variable
    EaPushThisVar = 0x70,
    /// Push `_global` as variable
    EaPushGlobalVar = 0x71,
    /// Set variable to zero
    EaZeroVar = 0x72,
    /// Push true
    EaPushTrue = 0x73,
    /// Push false
    EaPushFalse = 0x74,
    /// Push null
    EaPushNull = 0x75,
    /// Push undefined
    EaPushUndefined = 0x76,
    /// Begin a trace block
    TraceStart = 0x77,

    // ==================== Opcodes with payload ====================
    /// Go to frame index
    GotoFrame = 0x81,
    /// Load a URL into a target
    GetUrl = 0x83,
    /// Store top of stack into a register
    SetRegister = 0x87,
    /// Declare the constant pool used by following instructions
    ConstantPool = 0x88,
    /// Wait until a frame is loaded
    WaitForFrame = 0x8A,
    /// Set target sprite by name
    SetTarget = 0x8B,
    /// Go to frame label
    GotoLabel = 0x8C,
    /// Wait for a frame given on the stack
    WaitForFrameExpr = 0x8D,
    /// Define a function with register allocation
    DefineFunction2 = 0x8E,
    /// Begin a try block
    Try = 0x8F,
    /// Begin a with block
    With = 0x94,
    /// Push constant pool entries
    PushData = 0x96,
    /// Unconditional branch
    BranchAlways = 0x99,
    /// Load a URL given on the stack
    GetUrl2 = 0x9A,
    /// Define a function
    DefineFunction = 0x9B,
    /// Branch when top of stack is true
    BranchIfTrue = 0x9D,
    /// Call a frame as a subroutine
    CallFrame = 0x9E,
    /// Go to frame given on the stack
    GotoFrame2 = 0x9F,

    // ==================== EA operand forms ====================
    /// Push a string
    EaPushString = 0xA1,
    /// Push constant by 8-bit index
    EaPushConstantByte = 0xA2,
    /// Push constant by 16-bit index
    EaPushConstantWord = 0xA3,
    /// Read variable named by a string
    EaGetStringVar = 0xA4,
    /// Read member named by a string
    EaGetStringMember = 0xA5,
    /// Write variable named by a string
    EaSetStringVar = 0xA6,
    /// Write member named by a string
    EaSetStringMember = 0xA7,
    /// Push value of variable named by a constant
    EaPushValueOfVar = 0xAE,
    /// Read member named by a constant
    EaGetNamedMember = 0xAF,
    /// Call function named by a constant, discard result
    EaCallNamedFuncPop = 0xB0,
    /// Call function named by a constant
    EaCallNamedFunc = 0xB1,
    /// Call method named by a constant, discard result
    EaCallNamedMethodPop = 0xB2,
    /// Call method named by a constant
    EaCallNamedMethod = 0xB3,
    /// Push a 32-bit float
    EaPushFloat = 0xB4,
    /// Push a signed byte
    EaPushByte = 0xB5,
    /// Push a signed short
    EaPushShort = 0xB6,
    /// Push a 32-bit integer
    EaPushLong = 0xB7,
    /// Branch when top of stack is false
    EaBranchIfFalse = 0xB8,
    /// Push a register
    EaPushRegister = 0xB9,

    /// Editor-only placeholder, never written
    Padding = 0xFF,
}

impl Opcode {
    /// Convert opcode to byte
    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Whether the parameters of this opcode start on a 4-byte boundary
    pub const fn requires_alignment(self) -> bool {
        matches!(
            self,
            Self::DefineFunction
                | Self::DefineFunction2
                | Self::ConstantPool
                | Self::BranchIfTrue
                | Self::BranchAlways
                | Self::PushData
                | Self::GetUrl
                | Self::GotoLabel
                | Self::SetRegister
                | Self::SetTarget
                | Self::GotoFrame
                | Self::GotoFrame2
                | Self::With
                | Self::EaPushString
                | Self::EaBranchIfFalse
                | Self::EaGetStringVar
                | Self::EaSetStringVar
                | Self::EaGetStringMember
                | Self::EaSetStringMember
        )
    }

    /// Whether this opcode reports a branch target to the decoder
    pub const fn is_branch(self) -> bool {
        matches!(
            self,
            Self::BranchAlways | Self::BranchIfTrue | Self::EaBranchIfFalse
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
