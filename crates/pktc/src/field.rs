//! Field-level validation and op emission.
//!
//! One `FieldArgs` instance covers every field-shaped instruction: plain
//! fields, arrays, length fields, and dummies (an unnamed hardcoded field).
//! All validation rules are fatal schema errors.

use pkt_schema::decl::{LengthRef, Literal};
use pkt_schema::types::{IntKind, Length, StringKind, Type};
use pkt_schema::{SchemaError, TypeRegistry};

use crate::ir::{
    ArrayOp, FieldInfo, FieldOp, LengthCheck, LengthSpec, LiteralValue, Op, WireInt, WireOp,
};
use crate::object::{FieldData, ObjectContext};

#[derive(Debug, Default)]
pub(crate) struct FieldArgs {
    pub name: Option<String>,
    pub type_name: String,
    pub length: Option<LengthRef>,
    pub padded: bool,
    pub optional: bool,
    pub hardcoded: Option<Literal>,
    pub array: bool,
    pub delimited: bool,
    pub trailing_delimiter: bool,
    pub length_field: bool,
    pub offset: i64,
}

pub(crate) struct CompiledField {
    pub op: Op,
    pub field: Option<(String, FieldInfo)>,
}

pub(crate) fn compile_field(
    registry: &mut TypeRegistry,
    context: &mut ObjectContext,
    args: FieldArgs,
) -> Result<CompiledField, SchemaError> {
    let ty = resolve_type(registry, &args)?;
    validate(context, &args, &ty)?;

    let hardcoded = match &args.hardcoded {
        Some(literal) => Some(literal_value(&args, &ty, literal)?),
        None => None,
    };

    let length_check = length_check(context, &args)?;
    let field = register(context, &args, &ty, hardcoded.clone());
    let bool_wrap = matches!(ty, Type::Bool { .. });
    let wire = wire_op(&args, &ty);

    let op = if args.array {
        Op::Array(ArrayOp {
            name: args.name.clone().unwrap_or_default(),
            element: wire,
            bool_wrap,
            length: length_spec(&args),
            optional: args.optional,
            delimited: args.delimited,
            trailing_delimiter: args.trailing_delimiter,
            element_fixed_size: ty.fixed_size(),
            length_check,
        })
    } else {
        Op::Field(FieldOp {
            name: args.name.clone(),
            wire,
            optional: args.optional,
            bool_wrap,
            hardcoded,
            offset: args.offset,
            length_check,
        })
    };

    Ok(CompiledField { op, field })
}

/// Arrays resolve their element type without the length annotation; the
/// length counts elements, not bytes.
fn resolve_type(registry: &mut TypeRegistry, args: &FieldArgs) -> Result<Type, SchemaError> {
    let length = match (&args.length, args.array) {
        (Some(length), false) => length.to_length(),
        _ => Length::unspecified(),
    };
    registry.resolve(&args.type_name, &length)
}

fn validate(context: &ObjectContext, args: &FieldArgs, ty: &Type) -> Result<(), SchemaError> {
    if args.array && args.length_field {
        return Err(SchemaError::instruction(
            "a field cannot be both a length field and an array field",
        ));
    }

    if args.optional && args.name.is_none() {
        return Err(SchemaError::instruction(
            "optional fields must specify a name",
        ));
    }

    if args.array && !args.delimited && !ty.bounded() {
        return Err(SchemaError::instruction(format!(
            "unbounded element type ({}) forbidden in non-delimited array",
            args.type_name
        )));
    }
    if !args.delimited && args.trailing_delimiter {
        return Err(SchemaError::instruction(
            "only delimited arrays can have a trailing delimiter",
        ));
    }

    if args.length_field && !matches!(ty, Type::Integer(_)) {
        return Err(SchemaError::instruction(format!(
            "{} is not a numeric type, so it is not allowed for a length field",
            ty.name()
        )));
    }

    if args.name.is_none() {
        if args.hardcoded.is_none() {
            return Err(SchemaError::instruction(
                "unnamed fields must specify a hardcoded field value",
            ));
        }
        if args.optional {
            return Err(SchemaError::instruction(
                "unnamed fields may not be optional",
            ));
        }
    }

    if let Some(name) = &args.name {
        if context.accessible_fields.contains_key(name) {
            return Err(SchemaError::instruction(format!(
                "cannot redefine {name} field"
            )));
        }
    }

    if let Some(length) = &args.length {
        let raw = length.raw();
        if length.as_literal().is_none() && !context.length_referenced.contains_key(&raw) {
            return Err(SchemaError::instruction(format!(
                "length attribute \"{raw}\" must be a numeric literal, or refer to a length field"
            )));
        }
        if context.length_referenced.get(&raw) == Some(&true) {
            return Err(SchemaError::instruction(format!(
                "length field \"{raw}\" must not be referenced by multiple fields"
            )));
        }
    }

    Ok(())
}

/// Checks a hardcoded literal against the field's type and converts it.
fn literal_value(
    args: &FieldArgs,
    ty: &Type,
    literal: &Literal,
) -> Result<LiteralValue, SchemaError> {
    match ty {
        Type::Integer(_) => match literal {
            Literal::Int(value) => Ok(LiteralValue::Int(*value)),
            other => Err(SchemaError::instruction(format!(
                "{other:?} is not a valid integer value"
            ))),
        },
        Type::Bool { .. } => match literal {
            Literal::Bool(value) => Ok(LiteralValue::Bool(*value)),
            other => Err(SchemaError::instruction(format!(
                "{other:?} is not a valid bool value"
            ))),
        },
        Type::String { .. } => match literal {
            Literal::Str(value) => {
                let length = args.length.as_ref().and_then(LengthRef::as_literal);
                if let Some(length) = length {
                    if value.chars().count() != length {
                        return Err(SchemaError::instruction(format!(
                            "expected length of {length} for hardcoded string value \"{value}\""
                        )));
                    }
                }
                Ok(LiteralValue::Str(value.clone()))
            }
            other => Err(SchemaError::instruction(format!(
                "{other:?} is not a valid string value"
            ))),
        },
        other => Err(SchemaError::instruction(format!(
            "hardcoded field values are not allowed for {} fields (must be a basic type)",
            other.name()
        ))),
    }
}

/// Registers the field in the accessible-field scope and produces its
/// accessor metadata. Length fields enter the length-reference table;
/// a field whose length names one marks that entry as referenced.
fn register(
    context: &mut ObjectContext,
    args: &FieldArgs,
    ty: &Type,
    hardcoded: Option<LiteralValue>,
) -> Option<(String, FieldInfo)> {
    let name = args.name.as_ref()?;

    context.accessible_fields.insert(
        name.clone(),
        FieldData {
            ty: ty.clone(),
            offset: args.offset,
            array: args.array,
        },
    );

    let mut references_length = None;
    if args.length_field {
        context.length_referenced.insert(name.clone(), false);
    } else if hardcoded.is_none() {
        if let Some(length) = &args.length {
            let raw = length.raw();
            if let Some(referenced) = context.length_referenced.get_mut(&raw) {
                *referenced = true;
                references_length = Some(raw);
            }
        }
    }

    Some((
        name.clone(),
        FieldInfo {
            type_name: args.type_name.clone(),
            array: args.array,
            optional: args.optional,
            hardcoded,
            length_field: args.length_field,
            references_length,
        },
    ))
}

/// Serialize-time size bound. A length-field reference bounds the size by
/// the field's maximum representable value plus its offset; a literal
/// bounds it exactly unless the value is padded.
fn length_check(
    context: &ObjectContext,
    args: &FieldArgs,
) -> Result<Option<LengthCheck>, SchemaError> {
    if args.name.is_none() {
        return Ok(None);
    }
    let Some(length) = &args.length else {
        return Ok(None);
    };

    if let Some(field) = context.accessible_fields.get(&length.raw()) {
        let kind = field.ty.underlying().ok_or_else(|| {
            SchemaError::instruction(format!(
                "{} is not a numeric type, so it is not allowed for a length field",
                field.ty.name()
            ))
        })?;
        return Ok(Some(LengthCheck {
            max: kind.max_value() + field.offset,
            exact: false,
        }));
    }

    match length.as_literal() {
        Some(max) => Ok(Some(LengthCheck {
            max: max as i64,
            exact: !args.padded,
        })),
        None => Ok(None),
    }
}

fn length_spec(args: &FieldArgs) -> Option<LengthSpec> {
    let length = args.length.as_ref()?;
    Some(match length.as_literal() {
        Some(literal) => LengthSpec::Literal(literal),
        None => LengthSpec::Field(length.raw()),
    })
}

fn wire_op(args: &FieldArgs, ty: &Type) -> WireOp {
    match ty {
        Type::Integer(kind) => WireOp::Int { wire: wire_int(*kind) },
        Type::Bool { underlying } => WireOp::Int { wire: wire_int(*underlying) },
        Type::Enum(e) => WireOp::Int { wire: wire_int(e.underlying) },
        Type::String { kind, .. } => WireOp::String {
            encoded: *kind == StringKind::Encoded,
            length: if args.array { None } else { length_spec(args) },
            padded: args.padded,
        },
        Type::Blob => WireOp::Blob,
        Type::Struct(s) => WireOp::Struct {
            type_name: s.name.clone(),
        },
    }
}

pub(crate) fn wire_int(kind: IntKind) -> WireInt {
    match kind {
        IntKind::Byte => WireInt::Byte,
        IntKind::Char => WireInt::Char,
        IntKind::Short => WireInt::Short,
        IntKind::Three => WireInt::Three,
        IntKind::Int => WireInt::Int,
    }
}

pub(crate) fn int_kind(wire: WireInt) -> IntKind {
    match wire {
        WireInt::Byte => IntKind::Byte,
        WireInt::Char => IntKind::Char,
        WireInt::Short => IntKind::Short,
        WireInt::Three => IntKind::Three,
        WireInt::Int => IntKind::Int,
    }
}
