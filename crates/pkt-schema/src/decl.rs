//! Serde document model for `protocol.json` schema files.

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::types::Length;

/// One parsed schema document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProtocolFile {
    #[serde(default)]
    pub enums: Vec<EnumDecl>,
    #[serde(default)]
    pub structs: Vec<StructDecl>,
    #[serde(default)]
    pub packets: Vec<PacketDecl>,
}

impl ProtocolFile {
    /// Parses one schema document. Unknown keys are rejected so typos in
    /// hand-written schemas surface immediately.
    pub fn parse(text: &str) -> Result<ProtocolFile, SchemaError> {
        serde_json::from_str(text).map_err(|err| SchemaError::parse(err.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnumDecl {
    pub name: String,
    /// Name of the integer type the enum serializes as.
    #[serde(rename = "type")]
    pub underlying: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub values: Vec<EnumValueDecl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnumValueDecl {
    pub name: String,
    pub value: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StructDecl {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub instructions: Vec<InstructionDecl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PacketDecl {
    pub family: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub instructions: Vec<InstructionDecl>,
}

/// One serialization instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum InstructionDecl {
    /// A single value. Unnamed fields must be hardcoded.
    Field {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(rename = "type")]
        type_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        length: Option<LengthRef>,
        #[serde(default)]
        padded: bool,
        #[serde(default)]
        optional: bool,
        /// Hardcoded value; the field always serializes as this.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Literal>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
    },
    /// A repeated value.
    Array {
        name: String,
        #[serde(rename = "type")]
        type_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        length: Option<LengthRef>,
        #[serde(default)]
        optional: bool,
        /// Elements are separated by chunk delimiters.
        #[serde(default)]
        delimited: bool,
        /// Whether a delimiter also follows the final element. Only
        /// meaningful on delimited arrays; defaults to the value of
        /// `delimited`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trailing_delimiter: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
    },
    /// A field whose value is the serialized length of another field.
    Length {
        name: String,
        #[serde(rename = "type")]
        type_name: String,
        /// Constant added to the measured length on the wire.
        #[serde(default)]
        offset: i64,
        #[serde(default)]
        optional: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
    },
    /// A placeholder written only when nothing else was, and consumed only
    /// when nothing else remains. Must be the final instruction.
    Dummy {
        #[serde(rename = "type")]
        type_name: String,
        value: Literal,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
    },
    /// Variant payload selected by a previously declared field's value.
    Switch {
        field: String,
        cases: Vec<CaseDecl>,
    },
    /// Nested instructions read/written in chunked mode.
    Chunked { instructions: Vec<InstructionDecl> },
    /// Chunk boundary. Legal only inside a chunked section.
    Break,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaseDecl {
    /// Discriminator value: an integer literal or an enum member name.
    /// Absent on the default case.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub instructions: Vec<InstructionDecl>,
}

/// Length attribute: a literal element/byte count, or the name of a length
/// field declared earlier in the same object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LengthRef {
    Literal(u64),
    Name(String),
}

impl LengthRef {
    /// The literal value, if this reference is (or spells) a number.
    pub fn as_literal(&self) -> Option<usize> {
        match self {
            LengthRef::Literal(n) => usize::try_from(*n).ok(),
            LengthRef::Name(name) => name.parse().ok(),
        }
    }

    pub fn raw(&self) -> String {
        match self {
            LengthRef::Literal(n) => n.to_string(),
            LengthRef::Name(name) => name.clone(),
        }
    }

    pub fn to_length(&self) -> Length {
        Length::specified(self.raw())
    }
}

/// A hardcoded value in a schema document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Int(i64),
    Bool(bool),
    Str(String),
}

impl InstructionDecl {
    /// Declared name, for instructions that bind one.
    pub fn name(&self) -> Option<&str> {
        match self {
            InstructionDecl::Field { name, .. } => name.as_deref(),
            InstructionDecl::Array { name, .. } | InstructionDecl::Length { name, .. } => {
                Some(name)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaErrorKind;

    #[test]
    fn parses_tagged_instructions() {
        let file = ProtocolFile::parse(
            r#"{
                "structs": [{"name": "Chat", "instructions": [
                    {"kind": "length", "name": "len", "type": "char"},
                    {"kind": "field", "name": "message", "type": "string", "length": "len"},
                    {"kind": "field", "name": "padding", "type": "string", "length": 2, "padded": true}
                ]}]
            }"#,
        )
        .unwrap();

        let decl = &file.structs[0];
        assert_eq!(decl.name, "Chat");
        match &decl.instructions[1] {
            InstructionDecl::Field { length, .. } => {
                assert_eq!(length, &Some(LengthRef::Name("len".into())));
            }
            other => panic!("expected field, got {other:?}"),
        }
        match &decl.instructions[2] {
            InstructionDecl::Field { length, padded, .. } => {
                assert_eq!(length.as_ref().and_then(LengthRef::as_literal), Some(2));
                assert!(padded);
            }
            other => panic!("expected field, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = ProtocolFile::parse(r#"{"structz": []}"#).unwrap_err();
        assert_eq!(err.kind, SchemaErrorKind::Parse);
    }

    #[test]
    fn numeric_strings_count_as_literal_lengths() {
        assert_eq!(LengthRef::Name("12".into()).as_literal(), Some(12));
        assert_eq!(LengthRef::Name("len".into()).as_literal(), None);
        assert_eq!(LengthRef::Literal(3).raw(), "3");
    }
}
