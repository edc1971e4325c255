use thiserror::Error;

/// Malformed bencode input. `position` is the byte offset where decoding failed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected end of input at byte {position}")]
    UnexpectedEof { position: usize },

    #[error("unrecognized prefix 0x{byte:02x} at byte {position}")]
    UnrecognizedPrefix { byte: u8, position: usize },

    #[error("invalid integer {text:?} at byte {position}")]
    InvalidInteger { text: String, position: usize },

    #[error("invalid string length at byte {position}")]
    InvalidStringLength { position: usize },

    #[error("string of length {length} at byte {position} exceeds remaining {remaining} bytes")]
    LengthExceedsInput {
        length: usize,
        remaining: usize,
        position: usize,
    },

    #[error("dictionary key at byte {position} is not a string")]
    NonStringKey { position: usize },

    #[error("nesting deeper than {max_depth} levels at byte {position}")]
    NestingTooDeep { max_depth: usize, position: usize },

    #[error("trailing data at byte {position}")]
    TrailingData { position: usize },

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ParseError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A decoded value did not have the shape the caller asked for.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValueError {
    #[error("missing entry `{0}`")]
    MissingEntry(String),

    #[error("expected {expected}, found {found}")]
    UnexpectedType {
        expected: &'static str,
        found: &'static str,
    },

    #[error("integer {0} out of range")]
    OutOfRange(i64),

    #[error("string is not valid utf8")]
    InvalidUtf8,
}
