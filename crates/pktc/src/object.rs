//! Object-level instruction compilation.
//!
//! Walks one struct/packet/case instruction list in declaration order,
//! threading a validation context and emitting the object's op list.

use std::collections::BTreeMap;
use std::mem;

use pkt_schema::decl::{InstructionDecl, Literal};
use pkt_schema::types::Type;
use pkt_schema::{SchemaError, TypeRegistry};

use crate::field::{compile_field, FieldArgs};
use crate::ir::{DummyOp, FieldInfo, ObjectDef, Op};
use crate::switch::SwitchCompiler;

/// An entry in the accessible-field scope.
#[derive(Debug, Clone)]
pub(crate) struct FieldData {
    pub ty: Type,
    pub offset: i64,
    pub array: bool,
}

/// Validation state threaded through one object's instruction list.
#[derive(Debug, Clone, Default)]
pub(crate) struct ObjectContext {
    pub chunked_reading_enabled: bool,
    pub reached_optional_field: bool,
    pub reached_dummy: bool,
    pub accessible_fields: BTreeMap<String, FieldData>,
    /// Length fields in scope, and whether each has been referenced.
    pub length_referenced: BTreeMap<String, bool>,
}

impl ObjectContext {
    /// Context for a switch case: outer fields stay visible, but the
    /// length-reference table starts fresh so a case cannot consume an
    /// outer length field.
    pub fn branch(&self) -> ObjectContext {
        let mut result = self.clone();
        result.length_referenced.clear();
        result
    }
}

pub(crate) struct ObjectCompiler<'a> {
    registry: &'a mut TypeRegistry,
    pub(crate) context: ObjectContext,
    name: String,
    ops: Vec<Op>,
    fields: BTreeMap<String, FieldInfo>,
    /// Case payload definitions produced by nested switches.
    aux: Vec<ObjectDef>,
    /// False once any op (or a chunked-mode toggle) has been emitted.
    /// A dummy compiled while this is still true needs runtime guards.
    stream_empty: bool,
}

impl<'a> ObjectCompiler<'a> {
    pub fn new(registry: &'a mut TypeRegistry, name: String, context: ObjectContext) -> Self {
        ObjectCompiler {
            registry,
            context,
            name,
            ops: Vec::new(),
            fields: BTreeMap::new(),
            aux: Vec::new(),
            stream_empty: true,
        }
    }

    pub fn compile_all(&mut self, instructions: &[InstructionDecl]) -> Result<(), SchemaError> {
        for instruction in instructions {
            self.compile_instruction(instruction)?;
        }
        Ok(())
    }

    pub fn compile_instruction(&mut self, instruction: &InstructionDecl) -> Result<(), SchemaError> {
        if self.context.reached_dummy {
            return Err(SchemaError::instruction(
                "dummy fields must not be followed by any other instructions",
            ));
        }

        match instruction {
            InstructionDecl::Field {
                name,
                type_name,
                length,
                padded,
                optional,
                value,
                ..
            } => {
                self.check_optional(*optional)?;
                self.push_field(FieldArgs {
                    name: name.clone(),
                    type_name: type_name.clone(),
                    length: length.clone(),
                    padded: *padded,
                    optional: *optional,
                    hardcoded: value.clone(),
                    ..FieldArgs::default()
                })?;
                self.context.reached_optional_field |= *optional;
            }
            InstructionDecl::Array {
                name,
                type_name,
                length,
                optional,
                delimited,
                trailing_delimiter,
                ..
            } => {
                self.check_optional(*optional)?;
                if *delimited && !self.context.chunked_reading_enabled {
                    return Err(SchemaError::instruction(
                        "delimited arrays are only allowed inside chunked sections",
                    ));
                }
                if trailing_delimiter.is_some() && !*delimited {
                    return Err(SchemaError::instruction(
                        "only delimited arrays can specify a trailing delimiter",
                    ));
                }
                self.push_field(FieldArgs {
                    name: Some(name.clone()),
                    type_name: type_name.clone(),
                    length: length.clone(),
                    optional: *optional,
                    array: true,
                    delimited: *delimited,
                    trailing_delimiter: trailing_delimiter.unwrap_or(*delimited),
                    ..FieldArgs::default()
                })?;
                self.context.reached_optional_field |= *optional;
            }
            InstructionDecl::Length {
                name,
                type_name,
                offset,
                optional,
                ..
            } => {
                self.check_optional(*optional)?;
                self.push_field(FieldArgs {
                    name: Some(name.clone()),
                    type_name: type_name.clone(),
                    offset: *offset,
                    optional: *optional,
                    length_field: true,
                    ..FieldArgs::default()
                })?;
                self.context.reached_optional_field |= *optional;
            }
            InstructionDecl::Dummy {
                type_name, value, ..
            } => self.compile_dummy(type_name, value)?,
            InstructionDecl::Switch { field, cases } => {
                SwitchCompiler::new(field.clone()).compile(self, cases)?;
            }
            InstructionDecl::Chunked { instructions } => self.compile_chunked(instructions)?,
            InstructionDecl::Break => self.compile_break()?,
        }

        Ok(())
    }

    pub fn finish(mut self) -> (ObjectDef, Vec<ObjectDef>) {
        let def = ObjectDef {
            name: mem::take(&mut self.name),
            ops: mem::take(&mut self.ops),
            fields: mem::take(&mut self.fields),
        };
        (def, self.aux)
    }

    pub(crate) fn registry(&mut self) -> &mut TypeRegistry {
        self.registry
    }

    pub(crate) fn push_aux(&mut self, def: ObjectDef) {
        self.aux.push(def);
    }

    pub(crate) fn push_aux_all(&mut self, defs: Vec<ObjectDef>) {
        self.aux.extend(defs);
    }

    pub(crate) fn push_op(&mut self, op: Op) {
        self.ops.push(op);
        self.stream_empty = false;
    }

    pub(crate) fn add_field_info(&mut self, name: String, info: FieldInfo) {
        self.fields.insert(name, info);
    }

    pub(crate) fn object_name(&self) -> &str {
        &self.name
    }

    fn push_field(&mut self, args: FieldArgs) -> Result<(), SchemaError> {
        let compiled = compile_field(self.registry, &mut self.context, args)?;
        if let Some((name, info)) = compiled.field {
            self.fields.insert(name, info);
        }
        self.push_op(compiled.op);
        Ok(())
    }

    fn check_optional(&self, optional: bool) -> Result<(), SchemaError> {
        if self.context.reached_optional_field && !optional {
            return Err(SchemaError::instruction(
                "optional fields may not be followed by non-optional fields",
            ));
        }
        Ok(())
    }

    fn compile_dummy(&mut self, type_name: &str, value: &Literal) -> Result<(), SchemaError> {
        let checkpoint_guard = self.stream_empty;

        let compiled = compile_field(
            self.registry,
            &mut self.context,
            FieldArgs {
                type_name: type_name.to_string(),
                hardcoded: Some(value.clone()),
                ..FieldArgs::default()
            },
        )?;
        let Op::Field(field) = compiled.op else {
            return Err(SchemaError::instruction("dummy must compile to a field"));
        };
        let Some(value) = field.hardcoded else {
            return Err(SchemaError::instruction(
                "dummy fields must specify a hardcoded value",
            ));
        };

        self.push_op(Op::Dummy(DummyOp {
            wire: field.wire,
            value,
            checkpoint_guard,
        }));
        self.context.reached_dummy = true;
        Ok(())
    }

    fn compile_chunked(&mut self, instructions: &[InstructionDecl]) -> Result<(), SchemaError> {
        if self.context.chunked_reading_enabled {
            // Nested toggles are no-ops; inline the body.
            return self.compile_all(instructions);
        }

        self.context.chunked_reading_enabled = true;
        // The mode toggle itself counts as output for dummy guard purposes.
        self.stream_empty = false;

        let outer_ops = mem::take(&mut self.ops);
        let result = self.compile_all(instructions);
        let body = mem::replace(&mut self.ops, outer_ops);

        self.context.chunked_reading_enabled = false;
        result?;

        self.ops.push(Op::Chunked { ops: body });
        Ok(())
    }

    fn compile_break(&mut self) -> Result<(), SchemaError> {
        if !self.context.chunked_reading_enabled {
            return Err(SchemaError::instruction(
                "break instructions are only allowed inside chunked sections",
            ));
        }

        // A new chunk starts a fresh validity window.
        self.context.reached_optional_field = false;
        self.context.reached_dummy = false;

        self.push_op(Op::Break);
        Ok(())
    }
}
