//! Resolved protocol types and the primitive catalog.

use std::fmt;
use std::sync::Arc;

/// A primitive integer wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntKind {
    /// Raw byte, not radix-encoded.
    Byte,
    Char,
    Short,
    Three,
    Int,
}

impl IntKind {
    pub fn from_name(name: &str) -> Option<IntKind> {
        match name {
            "byte" => Some(IntKind::Byte),
            "char" => Some(IntKind::Char),
            "short" => Some(IntKind::Short),
            "three" => Some(IntKind::Three),
            "int" => Some(IntKind::Int),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            IntKind::Byte => "byte",
            IntKind::Char => "char",
            IntKind::Short => "short",
            IntKind::Three => "three",
            IntKind::Int => "int",
        }
    }

    /// Serialized size in bytes.
    pub fn size(self) -> usize {
        match self {
            IntKind::Byte | IntKind::Char => 1,
            IntKind::Short => 2,
            IntKind::Three => 3,
            IntKind::Int => 4,
        }
    }

    /// Largest value the encoding can carry. A raw byte holds up to 255;
    /// radix-encoded integers hold up to `253^size - 1`.
    pub fn max_value(self) -> i64 {
        match self {
            IntKind::Byte => 255,
            IntKind::Char => 252,
            IntKind::Short => 64_008,
            IntKind::Three => 16_194_276,
            IntKind::Int => 4_097_152_080,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringKind {
    Plain,
    Encoded,
}

impl StringKind {
    pub fn name(self) -> &'static str {
        match self {
            StringKind::Plain => "string",
            StringKind::Encoded => "encoded_string",
        }
    }
}

/// Length annotation on a type reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Length {
    Unspecified,
    Specified { raw: String },
}

impl Length {
    pub fn unspecified() -> Length {
        Length::Unspecified
    }

    pub fn specified(raw: impl Into<String>) -> Length {
        Length::Specified { raw: raw.into() }
    }

    pub fn is_specified(&self) -> bool {
        matches!(self, Length::Specified { .. })
    }

    /// The literal byte count, when the annotation spells a number rather
    /// than naming a length field.
    pub fn as_literal(&self) -> Option<usize> {
        match self {
            Length::Unspecified => None,
            Length::Specified { raw } => raw.parse().ok(),
        }
    }
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Length::Unspecified => f.write_str("unspecified"),
            Length::Specified { raw } => f.write_str(raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub name: String,
    pub ordinal: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    pub name: String,
    pub underlying: IntKind,
    pub values: Vec<EnumValue>,
}

impl EnumType {
    pub fn value_by_ordinal(&self, ordinal: i64) -> Option<&EnumValue> {
        self.values.iter().find(|v| v.ordinal == ordinal)
    }

    pub fn value_by_name(&self, name: &str) -> Option<&EnumValue> {
        self.values.iter().find(|v| v.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructType {
    pub name: String,
    /// Serialized size when it is the same for every instance.
    pub fixed_size: Option<usize>,
    /// Whether the maximum serialized size is statically known.
    pub bounded: bool,
}

/// A resolved protocol type.
#[derive(Debug, Clone)]
pub enum Type {
    Integer(IntKind),
    Bool { underlying: IntKind },
    String { kind: StringKind, length: Length },
    Blob,
    Enum(Arc<EnumType>),
    Struct(Arc<StructType>),
}

impl Type {
    pub fn name(&self) -> &str {
        match self {
            Type::Integer(kind) => kind.name(),
            Type::Bool { .. } => "bool",
            Type::String { kind, .. } => kind.name(),
            Type::Blob => "blob",
            Type::Enum(e) => &e.name,
            Type::Struct(s) => &s.name,
        }
    }

    /// Serialized size when it is the same for every instance.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            Type::Integer(kind) => Some(kind.size()),
            Type::Bool { underlying } => Some(underlying.size()),
            Type::String { length, .. } => length.as_literal(),
            Type::Blob => None,
            Type::Enum(e) => Some(e.underlying.size()),
            Type::Struct(s) => s.fixed_size,
        }
    }

    /// Whether the maximum serialized size is statically known.
    pub fn bounded(&self) -> bool {
        match self {
            Type::Integer(_) | Type::Bool { .. } | Type::Enum(_) => true,
            Type::String { length, .. } => length.is_specified(),
            Type::Blob => false,
            Type::Struct(s) => s.bounded,
        }
    }

    /// The integer encoding this type serializes as, for types that wrap
    /// one.
    pub fn underlying(&self) -> Option<IntKind> {
        match self {
            Type::Integer(kind) => Some(*kind),
            Type::Bool { underlying } => Some(*underlying),
            Type::Enum(e) => Some(e.underlying),
            _ => None,
        }
    }
}
