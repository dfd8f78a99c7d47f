//! Compiled serializer definitions.
//!
//! The compiler's artifact: a flat, immutable description of how every
//! declared type reads and writes itself. Serializes to JSON so it can be
//! inspected or shipped separately from the compiler.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompiledSchema {
    pub enums: BTreeMap<String, EnumDef>,
    pub objects: BTreeMap<String, ObjectDef>,
    pub packets: Vec<PacketDef>,
}

impl CompiledSchema {
    /// Looks up a packet definition by its generated type name.
    pub fn packet(&self, type_name: &str) -> Option<&PacketDef> {
        self.packets.iter().find(|p| p.type_name == type_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumDef {
    pub name: String,
    pub underlying: WireInt,
    pub values: Vec<EnumValueDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumValueDef {
    pub name: String,
    pub ordinal: i64,
}

/// A packet's identity: its generated type plus the `PacketFamily` and
/// `PacketAction` members it was declared with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketDef {
    pub type_name: String,
    pub family: EnumValueDef,
    pub action: EnumValueDef,
}

/// Serializer definition for one struct, packet, or switch-case payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectDef {
    pub name: String,
    pub ops: Vec<Op>,
    pub fields: BTreeMap<String, FieldInfo>,
}

/// Accessor metadata for one named field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldInfo {
    pub type_name: String,
    #[serde(default)]
    pub array: bool,
    #[serde(default)]
    pub optional: bool,
    /// Hardcoded fields have no setter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardcoded: Option<LiteralValue>,
    /// Length fields have no setter; their value is derived.
    #[serde(default)]
    pub length_field: bool,
    /// Name of the length field kept in sync when this field is assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references_length: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    Field(FieldOp),
    Array(ArrayOp),
    Dummy(DummyOp),
    Switch(SwitchOp),
    /// Body runs with chunked reading / string sanitization enabled.
    /// Emitted only for outermost chunked sections; nested ones inline.
    Chunked { ops: Vec<Op> },
    /// Writes a chunk delimiter / advances to the next chunk.
    Break,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldOp {
    /// Unnamed fields are hardcoded padding; the read value is discarded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub wire: WireOp,
    #[serde(default)]
    pub optional: bool,
    /// The logical value is a bool carried on an integer wire type.
    #[serde(default)]
    pub bool_wrap: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardcoded: Option<LiteralValue>,
    /// Length-field offset: the wire carries `value - offset`.
    #[serde(default)]
    pub offset: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_check: Option<LengthCheck>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayOp {
    pub name: String,
    pub element: WireOp,
    #[serde(default)]
    pub bool_wrap: bool,
    /// Element count; absent means "derive from the data".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<LengthSpec>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub delimited: bool,
    #[serde(default)]
    pub trailing_delimiter: bool,
    /// Set when the element type is fixed-size; lets an unlengthed,
    /// undelimited array compute its count from the remaining bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_fixed_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_check: Option<LengthCheck>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DummyOp {
    pub wire: WireOp,
    pub value: LiteralValue,
    /// Write only when nothing was written yet; read only from the start
    /// position. Set when the dummy is the object's sole instruction.
    #[serde(default)]
    pub checkpoint_guard: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchOp {
    /// Name of the discriminator field.
    pub field: String,
    /// Name of the slot holding the case payload.
    pub case_data_field: String,
    pub cases: Vec<CaseOp>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseOp {
    /// Matched discriminator ordinal; absent on the default case.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
    /// Object definition holding the case payload; absent for empty cases,
    /// whose payload must be null.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}

/// Integer wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireInt {
    Byte,
    Char,
    Short,
    Three,
    Int,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireOp {
    Int {
        wire: WireInt,
    },
    String {
        encoded: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        length: Option<LengthSpec>,
        #[serde(default)]
        padded: bool,
    },
    /// Raw byte run; reads all remaining bytes.
    Blob,
    Struct {
        type_name: String,
    },
}

/// A wire size: a literal, or the logical value of a named length field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LengthSpec {
    Literal(usize),
    Field(String),
}

/// Serialize-time bound on a value's size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LengthCheck {
    pub max: i64,
    /// When set, the size must equal `max` exactly rather than stay at or
    /// under it.
    #[serde(default)]
    pub exact: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LiteralValue {
    Int(i64),
    Bool(bool),
    Str(String),
}
