use std::fmt;

use thiserror::Error;

/// Fatal schema problem. Compilation of the offending file is aborted; no
/// partial output is produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {message}")]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// The document could not be parsed.
    Parse,
    /// A type declaration or reference is invalid.
    Type,
    /// An instruction list is malformed or contradictory.
    Instruction,
    /// A packet declaration is invalid.
    Packet,
}

impl fmt::Display for SchemaErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchemaErrorKind::Parse => "parse",
            SchemaErrorKind::Type => "type",
            SchemaErrorKind::Instruction => "instruction",
            SchemaErrorKind::Packet => "packet",
        };
        f.write_str(name)
    }
}

impl SchemaError {
    pub fn new(kind: SchemaErrorKind, message: impl Into<String>) -> Self {
        SchemaError {
            kind,
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        SchemaError::new(SchemaErrorKind::Parse, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        SchemaError::new(SchemaErrorKind::Type, message)
    }

    pub fn instruction(message: impl Into<String>) -> Self {
        SchemaError::new(SchemaErrorKind::Instruction, message)
    }

    pub fn packet(message: impl Into<String>) -> Self {
        SchemaError::new(SchemaErrorKind::Packet, message)
    }
}
