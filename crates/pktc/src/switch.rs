//! Switch/case compilation.
//!
//! A switch dispatches on a previously declared scalar field and stores its
//! payload in a dedicated `<field>_data` slot. Each non-empty case compiles
//! into its own object definition named
//! `<Object><FieldPascal>Data<Value|Default>`.

use std::sync::Arc;

use pkt_schema::decl::CaseDecl;
use pkt_schema::types::{EnumType, Type};
use pkt_schema::SchemaError;

use crate::ir::{CaseOp, FieldInfo, Op, SwitchOp};
use crate::object::{FieldData, ObjectCompiler};

pub(crate) struct SwitchCompiler {
    field_name: String,
}

impl SwitchCompiler {
    pub fn new(field_name: String) -> Self {
        SwitchCompiler { field_name }
    }

    pub fn compile(
        self,
        outer: &mut ObjectCompiler<'_>,
        cases: &[CaseDecl],
    ) -> Result<(), SchemaError> {
        let field = outer
            .context
            .accessible_fields
            .get(&self.field_name)
            .cloned()
            .ok_or_else(|| {
                SchemaError::instruction(format!(
                    "referenced {} field is not accessible",
                    self.field_name
                ))
            })?;
        let enum_type = self.discriminator_enum(&field)?;

        let interface_name = format!("{}Data", pascal_case(&self.field_name));
        let case_data_field = format!("{}_data", self.field_name);
        outer.add_field_info(
            case_data_field.clone(),
            FieldInfo {
                type_name: interface_name.clone(),
                array: false,
                optional: false,
                hardcoded: None,
                length_field: false,
                references_length: None,
            },
        );

        let mut reached_optional = outer.context.reached_optional_field;
        let mut reached_dummy = outer.context.reached_dummy;
        let mut case_ops = Vec::with_capacity(cases.len());

        for case in cases {
            let value = if case.default {
                None
            } else {
                let raw = case.value.as_deref().ok_or_else(|| {
                    SchemaError::instruction("non-default cases must declare a value")
                })?;
                Some(self.case_ordinal(enum_type.as_deref(), raw)?)
            };

            let type_name = if case.instructions.is_empty() {
                None
            } else {
                let suffix = if case.default {
                    "Default".to_string()
                } else {
                    case.value.clone().unwrap_or_default()
                };
                let name = format!("{}{interface_name}{suffix}", outer.object_name());

                let case_context = outer.context.branch();
                let mut sub = ObjectCompiler::new(outer.registry(), name.clone(), case_context);
                sub.compile_all(&case.instructions)?;
                reached_optional |= sub.context.reached_optional_field;
                reached_dummy |= sub.context.reached_dummy;

                let (def, aux) = sub.finish();
                outer.push_aux(def);
                outer.push_aux_all(aux);
                Some(name)
            };

            case_ops.push(CaseOp { value, type_name });
        }

        outer.context.reached_optional_field = reached_optional;
        outer.context.reached_dummy = reached_dummy;

        outer.push_op(Op::Switch(SwitchOp {
            field: self.field_name,
            case_data_field,
            cases: case_ops,
        }));
        Ok(())
    }

    fn discriminator_enum(&self, field: &FieldData) -> Result<Option<Arc<EnumType>>, SchemaError> {
        if field.array {
            return Err(SchemaError::instruction(format!(
                "{} field referenced by switch must not be an array",
                self.field_name
            )));
        }
        match &field.ty {
            Type::Integer(_) => Ok(None),
            Type::Enum(e) => Ok(Some(e.clone())),
            _ => Err(SchemaError::instruction(format!(
                "{} field referenced by switch must be a numeric or enumeration type",
                self.field_name
            ))),
        }
    }

    /// For integer discriminators the case value must be an integer
    /// literal. For enum discriminators a known member must be named
    /// symbolically; raw ordinals are allowed only for values the enum
    /// does not define.
    fn case_ordinal(&self, enum_type: Option<&EnumType>, raw: &str) -> Result<i64, SchemaError> {
        let Some(enum_type) = enum_type else {
            return raw.parse().map_err(|_| {
                SchemaError::instruction(format!("\"{raw}\" is not a valid integer value"))
            });
        };

        if let Ok(ordinal) = raw.parse::<i64>() {
            if let Some(member) = enum_type.value_by_ordinal(ordinal) {
                return Err(SchemaError::instruction(format!(
                    "{} value {raw} must be referred to by name ({})",
                    enum_type.name, member.name
                )));
            }
            return Ok(ordinal);
        }

        match enum_type.value_by_name(raw) {
            Some(member) => Ok(member.ordinal),
            None => Err(SchemaError::instruction(format!(
                "\"{raw}\" is not a valid value for enum type {}",
                enum_type.name
            ))),
        }
    }
}

pub(crate) fn pascal_case(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    for part in name.split('_') {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            result.extend(first.to_uppercase());
            result.push_str(chars.as_str());
        }
    }
    result
}
