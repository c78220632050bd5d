//! Error and warning types for the scene codecs.

use thiserror::Error;

/// Main error type for codec operations. Errors are fatal: the operation that
/// produced one did not complete.
#[derive(Error, Debug)]
pub enum Error {
    /// Magic bytes at the start of a binary file did not match
    #[error("the file header is corrupted")]
    CorruptHeader,

    /// File format version is not the one this codec understands
    #[error("expected version {expected}, decoded version is {decoded}")]
    MismatchedVersion { expected: u16, decoded: u16 },

    /// Stream ended before the expected number of bytes
    #[error("unexpected end of stream at offset {0}")]
    UnexpectedEof(u64),

    /// Chunk payload failed to decompress, or decompressed to the wrong size
    #[error("bad chunk framing: {0}")]
    ChunkFraming(String),

    /// A PROP chunk declared a data type this codec does not know
    #[error("unrecognized data type {0}")]
    UnknownDataType(u8),

    /// A value array's bytes do not describe a whole number of elements
    #[error("malformed value array: {0}")]
    MalformedArray(String),

    /// Parent graph contains a cycle; the scene cannot be serialized
    #[error("cycle in parent graph involving class {0}")]
    ParentCycle(String),

    /// PRNT arrays (or another paired layout) disagree on length
    #[error("length of parent array does not match children array")]
    ParentLengthMismatch,

    /// I/O error from the underlying reader or writer
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a chunk framing error from a message.
    pub fn framing(msg: impl Into<String>) -> Self {
        Self::ChunkFraming(msg.into())
    }

    /// Create a malformed array error from a message.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedArray(msg.into())
    }
}

/// Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Non-fatal diagnostic emitted while decoding or encoding. Warnings
/// accumulate in source order on the operation's output; they never prevent
/// completion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    #[error("reserved space in {0} is non-zero")]
    ReservedNonZero(&'static str),

    #[error("unknown chunk signature `{}`", String::from_utf8_lossy(.0))]
    UnknownChunk([u8; 4]),

    #[error("END chunk is not uncompressed")]
    EndChunkCompressed,

    #[error("END chunk content is not `</roblox>`")]
    EndChunkContent,

    #[error("group count in header ({header}) does not match chunk stream ({actual})")]
    GroupCountMismatch { header: u32, actual: u32 },

    #[error("instance count in header ({header}) does not match chunk stream ({actual})")]
    InstanceCountMismatch { header: u32, actual: u32 },

    #[error("PROP chunk `{property}` refers to unknown group {group_id}")]
    UnknownGroup { group_id: u32, property: String },

    #[error("PROP chunk `{property}` has {values} values for a group of {instances} instances")]
    PropertyCountMismatch {
        property: String,
        values: usize,
        instances: usize,
    },

    #[error("instance {0} appears more than once in PRNT children")]
    DuplicateChild(i32),

    #[error("property `{property}` of class {class} does not match its declared type")]
    TypeMismatch { class: String, property: String },

    #[error("token value {value} is not an item of enum {enum_name}")]
    TokenOutOfRange { enum_name: String, value: u32 },

    #[error("Item tag is missing its class attribute")]
    MissingClass,

    #[error("class {0} is not declared by the schema")]
    UnknownClass(String),

    #[error("property `{property}` has inconsistent value kinds within its group")]
    InconsistentProperty { property: String },
}
