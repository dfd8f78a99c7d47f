//! Generic serializer interpreter.
//!
//! Executes compiled [`ObjectDef`] op lists against dynamic values. One
//! interpreter serves every compiled type; instances are [`ProtocolObject`]
//! maps whose mutations go through the schema so hardcoded and length
//! fields keep their invariants.

use std::collections::BTreeMap;

use pkt_data::{CodecError, Reader, Writer};
use thiserror::Error;

use crate::ir::{
    ArrayOp, CompiledSchema, DummyOp, FieldOp, LengthCheck, LengthSpec, LiteralValue, ObjectDef,
    Op, SwitchOp, WireInt, WireOp,
};

/// A dynamic protocol value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Object(ProtocolObject),
}

static NULL: Value = Value::Null;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ProtocolObject> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Size used for length-field syncing and length checks: characters
    /// for strings, elements for arrays, bytes for byte runs.
    fn size(&self) -> Option<usize> {
        match self {
            Value::Str(value) => Some(value.chars().count()),
            Value::Array(values) => Some(values.len()),
            Value::Bytes(bytes) => Some(bytes.len()),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::Array(values)
    }
}

impl From<ProtocolObject> for Value {
    fn from(object: ProtocolObject) -> Self {
        Value::Object(object)
    }
}

/// An instance of a compiled type.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolObject {
    type_name: String,
    fields: BTreeMap<String, Value>,
    byte_size: usize,
}

impl ProtocolObject {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Size of the data this instance was deserialized from.
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    pub fn get(&self, name: &str) -> &Value {
        self.fields.get(name).unwrap_or(&NULL)
    }

    /// Assigns a field, rejecting unknown, hardcoded, and length fields.
    /// Assigning a sized value to a field that references a length field
    /// also updates that length field.
    pub fn set(
        &mut self,
        schema: &CompiledSchema,
        name: &str,
        value: Value,
    ) -> Result<(), SerializationError> {
        let def = schema
            .objects
            .get(&self.type_name)
            .ok_or_else(|| SerializationError::UnknownType {
                name: self.type_name.clone(),
            })?;
        let info = def
            .fields
            .get(name)
            .ok_or_else(|| SerializationError::UnknownField {
                type_name: self.type_name.clone(),
                name: name.to_string(),
            })?;
        if info.hardcoded.is_some() || info.length_field {
            return Err(SerializationError::ImmutableField {
                name: name.to_string(),
            });
        }

        if let (Some(length_field), Some(size)) = (&info.references_length, value.size()) {
            self.fields
                .insert(length_field.clone(), Value::Int(size as i64));
        }
        self.fields.insert(name.to_string(), value);
        Ok(())
    }
}

/// Run-time serialization failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SerializationError {
    #[error("{name} must not be null")]
    NullField { name: String },
    #[error("expected {name} length to be exactly {expected}, got {actual}")]
    LengthMismatch { name: String, expected: i64, actual: i64 },
    #[error("expected {name} length to be {max} or less, got {actual}")]
    LengthOutOfBound { name: String, max: i64, actual: i64 },
    #[error("value {value} is not representable on the wire (maximum {max})")]
    ValueOutOfRange { value: i64, max: i64 },
    #[error("{name} has {actual} elements, expected at least {expected}")]
    MissingElement { name: String, expected: usize, actual: usize },
    #[error("expected {field} to be null for discriminator value {value}")]
    ExpectedNullCaseData { field: String, value: i64 },
    #[error("expected {field} to be of type {expected} for discriminator value {value}")]
    CaseDataTypeMismatch { field: String, expected: String, value: i64 },
    #[error("{name} is not a {expected} value")]
    WrongValueType { name: String, expected: &'static str },
    #[error("{name} type is not compiled in this schema")]
    UnknownType { name: String },
    #[error("{type_name} has no {name} field")]
    UnknownField { type_name: String, name: String },
    #[error("{name} field cannot be assigned directly")]
    ImmutableField { name: String },
    #[error("expected a {expected} instance, got {actual}")]
    StructTypeMismatch { expected: String, actual: String },
    #[error(transparent)]
    Codec(#[from] CodecError),
}

struct SerCtx {
    reached_null: bool,
    start_len: usize,
}

impl CompiledSchema {
    /// Creates a blank instance of a compiled type. Hardcoded fields come
    /// pre-populated; everything else starts null.
    pub fn new_instance(&self, type_name: &str) -> Result<ProtocolObject, SerializationError> {
        let def = self.object_def(type_name)?;
        let mut fields = BTreeMap::new();
        for (name, info) in &def.fields {
            let value = match &info.hardcoded {
                Some(LiteralValue::Int(v)) => Value::Int(*v),
                Some(LiteralValue::Bool(v)) => Value::Bool(*v),
                Some(LiteralValue::Str(v)) => Value::Str(v.clone()),
                None => Value::Null,
            };
            fields.insert(name.clone(), value);
        }
        Ok(ProtocolObject {
            type_name: type_name.to_string(),
            fields,
            byte_size: 0,
        })
    }

    /// Serializes an instance, restoring the writer's sanitization mode on
    /// every exit path.
    pub fn serialize(
        &self,
        writer: &mut Writer,
        data: &ProtocolObject,
    ) -> Result<(), SerializationError> {
        let def = self.object_def(&data.type_name)?;
        let old_mode = writer.string_sanitization_mode();
        let mut ctx = SerCtx {
            reached_null: false,
            start_len: writer.length(),
        };
        let result = self.serialize_ops(&def.ops, writer, data, &mut ctx);
        writer.set_string_sanitization_mode(old_mode);
        result
    }

    /// Deserializes an instance, restoring the reader's chunked mode on
    /// every exit path.
    pub fn deserialize(
        &self,
        type_name: &str,
        reader: &mut Reader<'_>,
    ) -> Result<ProtocolObject, SerializationError> {
        let def = self.object_def(type_name)?;
        let mut data = self.new_instance(type_name)?;
        let old_mode = reader.chunked_reading_mode();
        let start = reader.position();
        let result = self.deserialize_ops(&def.ops, reader, &mut data, start);
        reader.set_chunked_reading_mode(old_mode);
        result?;
        data.byte_size = reader.position() - start;
        Ok(data)
    }

    fn object_def(&self, type_name: &str) -> Result<&ObjectDef, SerializationError> {
        self.objects
            .get(type_name)
            .ok_or_else(|| SerializationError::UnknownType {
                name: type_name.to_string(),
            })
    }

    fn serialize_ops(
        &self,
        ops: &[Op],
        writer: &mut Writer,
        data: &ProtocolObject,
        ctx: &mut SerCtx,
    ) -> Result<(), SerializationError> {
        for op in ops {
            match op {
                Op::Field(field) => self.serialize_field(field, writer, data, ctx)?,
                Op::Array(array) => self.serialize_array(array, writer, data, ctx)?,
                Op::Dummy(dummy) => self.serialize_dummy(dummy, writer, ctx)?,
                Op::Switch(switch) => self.serialize_switch(switch, writer, data)?,
                Op::Chunked { ops } => {
                    writer.set_string_sanitization_mode(true);
                    self.serialize_ops(ops, writer, data, ctx)?;
                    writer.set_string_sanitization_mode(false);
                }
                Op::Break => {
                    ctx.reached_null = false;
                    writer.add_byte(0xFF)?;
                }
            }
        }
        Ok(())
    }

    fn serialize_field(
        &self,
        field: &FieldOp,
        writer: &mut Writer,
        data: &ProtocolObject,
        ctx: &mut SerCtx,
    ) -> Result<(), SerializationError> {
        let Some(name) = &field.name else {
            // Unnamed fields always write their hardcoded value.
            let Some(value) = &field.hardcoded else {
                return Ok(());
            };
            return self.write_literal(&field.wire, value, writer, data);
        };

        let value = data.get(name);

        if field.optional {
            ctx.reached_null |= value.is_null();
            if ctx.reached_null {
                return Ok(());
            }
        } else if value.is_null() && field.hardcoded.is_none() {
            return Err(SerializationError::NullField { name: name.clone() });
        }

        check_length(name, value, &field.length_check)?;
        self.write_value(&field.wire, field.bool_wrap, -field.offset, name, value, writer, data)
    }

    fn serialize_array(
        &self,
        array: &ArrayOp,
        writer: &mut Writer,
        data: &ProtocolObject,
        ctx: &mut SerCtx,
    ) -> Result<(), SerializationError> {
        let value = data.get(&array.name);

        if array.optional {
            ctx.reached_null |= value.is_null();
            if ctx.reached_null {
                return Ok(());
            }
        } else if value.is_null() {
            return Err(SerializationError::NullField {
                name: array.name.clone(),
            });
        }

        check_length(&array.name, value, &array.length_check)?;

        let elements = value
            .as_array()
            .ok_or(SerializationError::WrongValueType {
                name: array.name.clone(),
                expected: "array",
            })?;

        let count = match &array.length {
            Some(spec) => eval_length(data, spec)?,
            None => elements.len(),
        };
        if elements.len() < count {
            return Err(SerializationError::MissingElement {
                name: array.name.clone(),
                expected: count,
                actual: elements.len(),
            });
        }

        for (i, element) in elements.iter().take(count).enumerate() {
            if array.delimited && !array.trailing_delimiter && i > 0 {
                writer.add_byte(0xFF)?;
            }
            self.write_value(
                &array.element,
                array.bool_wrap,
                0,
                &array.name,
                element,
                writer,
                data,
            )?;
            if array.delimited && array.trailing_delimiter {
                writer.add_byte(0xFF)?;
            }
        }

        Ok(())
    }

    fn serialize_dummy(
        &self,
        dummy: &DummyOp,
        writer: &mut Writer,
        ctx: &mut SerCtx,
    ) -> Result<(), SerializationError> {
        if dummy.checkpoint_guard && writer.length() != ctx.start_len {
            return Ok(());
        }
        self.write_literal_raw(&dummy.wire, &dummy.value, writer)
    }

    fn serialize_switch(
        &self,
        switch: &SwitchOp,
        writer: &mut Writer,
        data: &ProtocolObject,
    ) -> Result<(), SerializationError> {
        let discriminator = data.get(&switch.field).as_int().unwrap_or(0);
        let Some(case) = find_case(switch, data.get(&switch.field)) else {
            return Ok(());
        };

        let case_data = data.get(&switch.case_data_field);
        match &case.type_name {
            None => {
                if !case_data.is_null() {
                    return Err(SerializationError::ExpectedNullCaseData {
                        field: switch.case_data_field.clone(),
                        value: discriminator,
                    });
                }
                Ok(())
            }
            Some(type_name) => {
                let object = case_data.as_object().filter(|o| o.type_name == *type_name);
                let Some(object) = object else {
                    return Err(SerializationError::CaseDataTypeMismatch {
                        field: switch.case_data_field.clone(),
                        expected: type_name.clone(),
                        value: discriminator,
                    });
                };
                self.serialize(writer, object)
            }
        }
    }

    fn write_value(
        &self,
        wire: &WireOp,
        bool_wrap: bool,
        offset: i64,
        name: &str,
        value: &Value,
        writer: &mut Writer,
        data: &ProtocolObject,
    ) -> Result<(), SerializationError> {
        match wire {
            WireOp::Int { wire } => {
                let raw = if bool_wrap {
                    match value.as_bool() {
                        Some(true) => 1,
                        Some(false) => 0,
                        None => {
                            return Err(SerializationError::WrongValueType {
                                name: name.to_string(),
                                expected: "bool",
                            })
                        }
                    }
                } else {
                    value.as_int().ok_or(SerializationError::WrongValueType {
                        name: name.to_string(),
                        expected: "int",
                    })?
                };
                write_int(writer, *wire, raw + offset)
            }
            WireOp::String {
                encoded,
                length,
                padded,
            } => {
                let text = value.as_str().ok_or(SerializationError::WrongValueType {
                    name: name.to_string(),
                    expected: "string",
                })?;
                match length {
                    None => {
                        if *encoded {
                            writer.add_encoded_string(text);
                        } else {
                            writer.add_string(text);
                        }
                        Ok(())
                    }
                    Some(spec) => {
                        let length = eval_length(data, spec)?;
                        if *encoded {
                            writer.add_fixed_encoded_string(text, length, *padded)?;
                        } else {
                            writer.add_fixed_string(text, length, *padded)?;
                        }
                        Ok(())
                    }
                }
            }
            WireOp::Blob => match value {
                Value::Bytes(bytes) => {
                    writer.add_bytes(bytes);
                    Ok(())
                }
                _ => Err(SerializationError::WrongValueType {
                    name: name.to_string(),
                    expected: "bytes",
                }),
            },
            WireOp::Struct { type_name } => {
                let object = value.as_object().ok_or(SerializationError::WrongValueType {
                    name: name.to_string(),
                    expected: "object",
                })?;
                if object.type_name != *type_name {
                    return Err(SerializationError::StructTypeMismatch {
                        expected: type_name.clone(),
                        actual: object.type_name.clone(),
                    });
                }
                self.serialize(writer, object)
            }
        }
    }

    fn write_literal(
        &self,
        wire: &WireOp,
        value: &LiteralValue,
        writer: &mut Writer,
        data: &ProtocolObject,
    ) -> Result<(), SerializationError> {
        match (wire, value) {
            (WireOp::String { encoded, length, padded }, LiteralValue::Str(text)) => {
                match length {
                    None => {
                        if *encoded {
                            writer.add_encoded_string(text);
                        } else {
                            writer.add_string(text);
                        }
                    }
                    Some(spec) => {
                        let length = eval_length(data, spec)?;
                        if *encoded {
                            writer.add_fixed_encoded_string(text, length, *padded)?;
                        } else {
                            writer.add_fixed_string(text, length, *padded)?;
                        }
                    }
                }
                Ok(())
            }
            _ => self.write_literal_raw(wire, value, writer),
        }
    }

    fn write_literal_raw(
        &self,
        wire: &WireOp,
        value: &LiteralValue,
        writer: &mut Writer,
    ) -> Result<(), SerializationError> {
        match (wire, value) {
            (WireOp::Int { wire }, LiteralValue::Int(raw)) => write_int(writer, *wire, *raw),
            (WireOp::Int { wire }, LiteralValue::Bool(flag)) => {
                write_int(writer, *wire, i64::from(*flag))
            }
            (WireOp::String { encoded, .. }, LiteralValue::Str(text)) => {
                if *encoded {
                    writer.add_encoded_string(text);
                } else {
                    writer.add_string(text);
                }
                Ok(())
            }
            _ => Err(SerializationError::WrongValueType {
                name: "hardcoded value".to_string(),
                expected: "matching literal",
            }),
        }
    }

    fn deserialize_ops(
        &self,
        ops: &[Op],
        reader: &mut Reader<'_>,
        data: &mut ProtocolObject,
        start: usize,
    ) -> Result<(), SerializationError> {
        for op in ops {
            match op {
                Op::Field(field) => self.deserialize_field(field, reader, data)?,
                Op::Array(array) => self.deserialize_array(array, reader, data)?,
                Op::Dummy(dummy) => {
                    if dummy.checkpoint_guard && reader.position() != start {
                        continue;
                    }
                    self.read_and_discard(&dummy.wire, reader)?;
                }
                Op::Switch(switch) => self.deserialize_switch(switch, reader, data)?,
                Op::Chunked { ops } => {
                    reader.set_chunked_reading_mode(true);
                    self.deserialize_ops(ops, reader, data, start)?;
                    reader.set_chunked_reading_mode(false);
                }
                Op::Break => reader.next_chunk()?,
            }
        }
        Ok(())
    }

    fn deserialize_field(
        &self,
        field: &FieldOp,
        reader: &mut Reader<'_>,
        data: &mut ProtocolObject,
    ) -> Result<(), SerializationError> {
        if field.optional && reader.remaining() == 0 {
            return Ok(());
        }

        let length = wire_length_spec(&field.wire)
            .map(|spec| eval_length(data, spec))
            .transpose()?;
        let value = self.read_value(&field.wire, field.bool_wrap, field.offset, length, reader)?;

        if let Some(name) = &field.name {
            data.fields.insert(name.clone(), value);
        }
        Ok(())
    }

    fn deserialize_array(
        &self,
        array: &ArrayOp,
        reader: &mut Reader<'_>,
        data: &mut ProtocolObject,
    ) -> Result<(), SerializationError> {
        if array.optional && reader.remaining() == 0 {
            return Ok(());
        }

        let mut count = match &array.length {
            Some(spec) => Some(eval_length(data, spec)?),
            None => None,
        };
        if count.is_none() && !array.delimited {
            if let Some(element_size) = array.element_fixed_size {
                if element_size > 0 {
                    count = Some(reader.remaining() / element_size);
                }
            }
        }

        let mut elements = Vec::new();
        match count {
            Some(count) => {
                for i in 0..count {
                    elements.push(self.read_value(
                        &array.element,
                        array.bool_wrap,
                        0,
                        None,
                        reader,
                    )?);
                    if array.delimited && (array.trailing_delimiter || i + 1 < count) {
                        reader.next_chunk()?;
                    }
                }
            }
            None => {
                while reader.remaining() > 0 {
                    elements.push(self.read_value(
                        &array.element,
                        array.bool_wrap,
                        0,
                        None,
                        reader,
                    )?);
                    if array.delimited {
                        reader.next_chunk()?;
                    }
                }
            }
        }

        data.fields
            .insert(array.name.clone(), Value::Array(elements));
        Ok(())
    }

    fn deserialize_switch(
        &self,
        switch: &SwitchOp,
        reader: &mut Reader<'_>,
        data: &mut ProtocolObject,
    ) -> Result<(), SerializationError> {
        let Some(case) = find_case(switch, data.get(&switch.field)) else {
            return Ok(());
        };

        let value = match &case.type_name {
            None => Value::Null,
            Some(type_name) => Value::Object(self.deserialize(type_name, reader)?),
        };
        data.fields.insert(switch.case_data_field.clone(), value);
        Ok(())
    }

    fn read_value(
        &self,
        wire: &WireOp,
        bool_wrap: bool,
        offset: i64,
        length: Option<usize>,
        reader: &mut Reader<'_>,
    ) -> Result<Value, SerializationError> {
        let value = match wire {
            WireOp::Int { wire } => {
                let raw = read_int(reader, *wire) + offset;
                if bool_wrap {
                    Value::Bool(raw != 0)
                } else {
                    Value::Int(raw)
                }
            }
            WireOp::String {
                encoded, padded, ..
            } => {
                let text = match (length, encoded) {
                    (None, false) => reader.get_string(),
                    (None, true) => reader.get_encoded_string(),
                    (Some(length), false) => reader.get_fixed_string(length, *padded),
                    (Some(length), true) => reader.get_fixed_encoded_string(length, *padded),
                };
                Value::Str(text)
            }
            WireOp::Blob => Value::Bytes(reader.get_bytes(reader.remaining())),
            WireOp::Struct { type_name } => Value::Object(self.deserialize(type_name, reader)?),
        };
        Ok(value)
    }

    fn read_and_discard(
        &self,
        wire: &WireOp,
        reader: &mut Reader<'_>,
    ) -> Result<(), SerializationError> {
        self.read_value(wire, false, 0, wire_fixed_length(wire), reader)?;
        Ok(())
    }
}

fn wire_length_spec(wire: &WireOp) -> Option<&LengthSpec> {
    match wire {
        WireOp::String { length, .. } => length.as_ref(),
        _ => None,
    }
}

fn wire_fixed_length(wire: &WireOp) -> Option<usize> {
    match wire_length_spec(wire) {
        Some(LengthSpec::Literal(length)) => Some(*length),
        _ => None,
    }
}

fn find_case<'a>(switch: &'a SwitchOp, discriminator: &Value) -> Option<&'a crate::ir::CaseOp> {
    let ordinal = discriminator.as_int();
    switch
        .cases
        .iter()
        .find(|case| case.value.is_some() && case.value == ordinal)
        .or_else(|| switch.cases.iter().find(|case| case.value.is_none()))
}

fn check_length(
    name: &str,
    value: &Value,
    check: &Option<LengthCheck>,
) -> Result<(), SerializationError> {
    let Some(check) = check else {
        return Ok(());
    };
    let Some(actual) = value.size() else {
        return Ok(());
    };
    let actual = actual as i64;

    if check.exact {
        if actual != check.max {
            return Err(SerializationError::LengthMismatch {
                name: name.to_string(),
                expected: check.max,
                actual,
            });
        }
    } else if actual > check.max {
        return Err(SerializationError::LengthOutOfBound {
            name: name.to_string(),
            max: check.max,
            actual,
        });
    }
    Ok(())
}

fn eval_length(data: &ProtocolObject, spec: &LengthSpec) -> Result<usize, SerializationError> {
    match spec {
        LengthSpec::Literal(length) => Ok(*length),
        LengthSpec::Field(name) => {
            let value = data
                .get(name)
                .as_int()
                .ok_or(SerializationError::WrongValueType {
                    name: name.clone(),
                    expected: "int",
                })?;
            usize::try_from(value).map_err(|_| SerializationError::ValueOutOfRange {
                value,
                max: i64::MAX,
            })
        }
    }
}

fn wire_max(wire: WireInt) -> i64 {
    crate::field::int_kind(wire).max_value()
}

fn write_int(writer: &mut Writer, wire: WireInt, value: i64) -> Result<(), SerializationError> {
    let raw = u32::try_from(value).map_err(|_| SerializationError::ValueOutOfRange {
        value,
        max: wire_max(wire),
    })?;
    match wire {
        WireInt::Byte => writer.add_byte(raw)?,
        WireInt::Char => writer.add_char(raw)?,
        WireInt::Short => writer.add_short(raw)?,
        WireInt::Three => writer.add_three(raw)?,
        WireInt::Int => writer.add_int(raw)?,
    }
    Ok(())
}

fn read_int(reader: &mut Reader<'_>, wire: WireInt) -> i64 {
    let value = match wire {
        WireInt::Byte => u32::from(reader.get_byte()),
        WireInt::Char => reader.get_char(),
        WireInt::Short => reader.get_short(),
        WireInt::Three => reader.get_three(),
        WireInt::Int => reader.get_int(),
    };
    i64::from(value)
}
