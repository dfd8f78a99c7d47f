//! Two-phase custom type registry.
//!
//! All declarations across the schema corpus are indexed first; references
//! resolve lazily afterwards and memoize by full reference name (including
//! any `:underlying` override). Length-annotated references are never
//! memoized since the annotation is per-use.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::decl::{EnumDecl, InstructionDecl, LengthRef, StructDecl};
use crate::error::SchemaError;
use crate::types::{EnumType, IntKind, Length, StringKind, StructType, Type};

/// An indexed enum or struct declaration, not yet resolved.
#[derive(Debug, Clone)]
pub enum CustomDecl {
    Enum(EnumDecl),
    Struct(StructDecl),
}

impl CustomDecl {
    pub fn name(&self) -> &str {
        match self {
            CustomDecl::Enum(e) => &e.name,
            CustomDecl::Struct(s) => &s.name,
        }
    }
}

#[derive(Debug, Default)]
pub struct TypeRegistry {
    unresolved: BTreeMap<String, CustomDecl>,
    resolved: BTreeMap<String, Type>,
    resolving: BTreeSet<String>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    /// Indexes a declaration. Returns `false` when the name is already
    /// taken, which the caller must treat as fatal.
    pub fn define(&mut self, decl: CustomDecl) -> bool {
        let name = decl.name().to_string();
        if self.unresolved.contains_key(&name) {
            return false;
        }
        self.unresolved.insert(name, decl);
        true
    }

    pub fn clear(&mut self) {
        self.unresolved.clear();
        self.resolved.clear();
        self.resolving.clear();
    }

    /// Resolves a type reference like `short`, `Item`, or `Gender:char`.
    pub fn resolve(&mut self, name: &str, length: &Length) -> Result<Type, SchemaError> {
        if length.is_specified() {
            return create_with_specified_length(name, length);
        }
        if let Some(existing) = self.resolved.get(name) {
            return Ok(existing.clone());
        }
        let created = self.create(name)?;
        self.resolved.insert(name.to_string(), created.clone());
        Ok(created)
    }

    fn create(&mut self, full_name: &str) -> Result<Type, SchemaError> {
        let (name, underlying_override) = self.read_underlying(full_name)?;

        let result = match name.as_str() {
            "byte" | "char" | "short" | "three" | "int" => {
                Type::Integer(IntKind::from_name(&name).unwrap_or(IntKind::Byte))
            }
            "bool" => Type::Bool {
                underlying: underlying_override.unwrap_or(IntKind::Char),
            },
            "string" => Type::String {
                kind: StringKind::Plain,
                length: Length::unspecified(),
            },
            "encoded_string" => Type::String {
                kind: StringKind::Encoded,
                length: Length::unspecified(),
            },
            "blob" => Type::Blob,
            _ => self.create_custom(&name, underlying_override)?,
        };

        if underlying_override.is_some()
            && !matches!(result, Type::Bool { .. } | Type::Enum(_))
        {
            return Err(SchemaError::type_error(format!(
                "{} has no underlying type, so an underlying type override is not allowed",
                result.name()
            )));
        }

        Ok(result)
    }

    fn read_underlying(
        &mut self,
        full_name: &str,
    ) -> Result<(String, Option<IntKind>), SchemaError> {
        let parts: Vec<&str> = full_name.split(':').collect();
        match parts.as_slice() {
            [_] => Ok((full_name.to_string(), None)),
            [name, underlying_name] => {
                if name == underlying_name {
                    return Err(SchemaError::type_error(format!(
                        "{name} type cannot specify itself as an underlying type"
                    )));
                }
                let underlying = self.resolve(underlying_name, &Length::unspecified())?;
                match underlying {
                    Type::Integer(kind) => Ok((name.to_string(), Some(kind))),
                    other => Err(SchemaError::type_error(format!(
                        "{} is not a numeric type, so it cannot be used as an underlying type",
                        other.name()
                    ))),
                }
            }
            _ => Err(SchemaError::type_error(format!(
                "\"{full_name}\" type syntax is invalid (only one colon is allowed)"
            ))),
        }
    }

    fn create_custom(
        &mut self,
        name: &str,
        underlying_override: Option<IntKind>,
    ) -> Result<Type, SchemaError> {
        let decl = self
            .unresolved
            .get(name)
            .cloned()
            .ok_or_else(|| SchemaError::type_error(format!("{name} type is not defined")))?;

        if !self.resolving.insert(name.to_string()) {
            return Err(SchemaError::type_error(format!(
                "{name} type is part of a circular reference"
            )));
        }

        let result = match &decl {
            CustomDecl::Enum(e) => self.create_enum(e, underlying_override),
            CustomDecl::Struct(s) => self.create_struct(s),
        };

        self.resolving.remove(name);
        result
    }

    fn create_enum(
        &mut self,
        decl: &EnumDecl,
        underlying_override: Option<IntKind>,
    ) -> Result<Type, SchemaError> {
        let underlying = match underlying_override {
            Some(kind) => kind,
            None => {
                if decl.name == decl.underlying {
                    return Err(SchemaError::type_error(format!(
                        "{} type cannot specify itself as an underlying type",
                        decl.name
                    )));
                }
                match self.resolve(&decl.underlying, &Length::unspecified())? {
                    Type::Integer(kind) => kind,
                    other => {
                        return Err(SchemaError::type_error(format!(
                            "{} is not a numeric type, so it cannot be used as an underlying type",
                            other.name()
                        )))
                    }
                }
            }
        };

        let mut ordinals = BTreeSet::new();
        let mut names = BTreeSet::new();
        let mut values = Vec::with_capacity(decl.values.len());

        for value in &decl.values {
            if !ordinals.insert(value.value) {
                return Err(SchemaError::type_error(format!(
                    "{}.{} cannot redefine ordinal value {}",
                    decl.name, value.name, value.value
                )));
            }
            if !names.insert(value.name.as_str()) {
                return Err(SchemaError::type_error(format!(
                    "{} enum cannot redefine value name {}",
                    decl.name, value.name
                )));
            }
            values.push(crate::types::EnumValue {
                name: value.name.clone(),
                ordinal: value.value,
            });
        }

        Ok(Type::Enum(Arc::new(EnumType {
            name: decl.name.clone(),
            underlying,
            values,
        })))
    }

    fn create_struct(&mut self, decl: &StructDecl) -> Result<Type, SchemaError> {
        let fixed_size = self.calc_fixed_size(&decl.instructions)?;
        let bounded = self.calc_bounded(&decl.instructions)?;
        Ok(Type::Struct(Arc::new(StructType {
            name: decl.name.clone(),
            fixed_size,
            bounded,
        })))
    }

    /// Serialized size of an instruction list when every instance has the
    /// same size. Chunked sections and switches make the size dynamic, as
    /// do optional, delimited, or dynamically lengthed members.
    fn calc_fixed_size(
        &mut self,
        instructions: &[InstructionDecl],
    ) -> Result<Option<usize>, SchemaError> {
        let mut size = 0usize;

        for instruction in instructions {
            let part = match instruction {
                InstructionDecl::Field {
                    type_name,
                    length,
                    optional,
                    ..
                } => {
                    let ty = self.resolve(type_name, &length_annotation(length))?;
                    if *optional {
                        None
                    } else {
                        ty.fixed_size()
                    }
                }
                InstructionDecl::Length {
                    type_name, optional, ..
                } => {
                    let ty = self.resolve(type_name, &Length::unspecified())?;
                    if *optional {
                        None
                    } else {
                        ty.fixed_size()
                    }
                }
                InstructionDecl::Array {
                    type_name,
                    length,
                    optional,
                    delimited,
                    ..
                } => {
                    let count = length.as_ref().and_then(LengthRef::as_literal);
                    let element = self.resolve(type_name, &Length::unspecified())?;
                    match (count, element.fixed_size()) {
                        (Some(count), Some(element_size)) if !*optional && !*delimited => {
                            Some(count * element_size)
                        }
                        _ => None,
                    }
                }
                InstructionDecl::Dummy { type_name, .. } => {
                    self.resolve(type_name, &Length::unspecified())?.fixed_size()
                }
                InstructionDecl::Chunked { .. } | InstructionDecl::Switch { .. } => None,
                InstructionDecl::Break => Some(0),
            };

            match part {
                Some(part) => size += part,
                None => return Ok(None),
            }
        }

        Ok(Some(size))
    }

    /// Whether the maximum serialized size of an instruction list is
    /// statically known. Once an unbounded member appears, only a chunk
    /// break restores boundedness.
    fn calc_bounded(&mut self, instructions: &[InstructionDecl]) -> Result<bool, SchemaError> {
        let mut flattened = Vec::new();
        flatten(instructions, &mut flattened);

        let mut result = true;
        for instruction in flattened {
            if !result {
                result = matches!(instruction, InstructionDecl::Break);
                continue;
            }

            result = match instruction {
                InstructionDecl::Field {
                    type_name, length, ..
                } => self
                    .resolve(type_name, &length_annotation(length))?
                    .bounded(),
                InstructionDecl::Length { type_name, .. } => {
                    self.resolve(type_name, &Length::unspecified())?.bounded()
                }
                InstructionDecl::Array {
                    type_name, length, ..
                } => {
                    self.resolve(type_name, &Length::unspecified())?.bounded()
                        && length.is_some()
                }
                InstructionDecl::Dummy { type_name, .. } => {
                    self.resolve(type_name, &Length::unspecified())?.bounded()
                }
                _ => true,
            };
        }

        Ok(result)
    }
}

fn create_with_specified_length(name: &str, length: &Length) -> Result<Type, SchemaError> {
    match name {
        "string" => Ok(Type::String {
            kind: StringKind::Plain,
            length: length.clone(),
        }),
        "encoded_string" => Ok(Type::String {
            kind: StringKind::Encoded,
            length: length.clone(),
        }),
        _ => Err(SchemaError::type_error(format!(
            "{name} type with length {length} is invalid (only string types may specify a length)"
        ))),
    }
}

fn length_annotation(length: &Option<LengthRef>) -> Length {
    match length {
        Some(length) => length.to_length(),
        None => Length::unspecified(),
    }
}

fn flatten<'a>(instructions: &'a [InstructionDecl], out: &mut Vec<&'a InstructionDecl>) {
    for instruction in instructions {
        out.push(instruction);
        match instruction {
            InstructionDecl::Chunked { instructions } => flatten(instructions, out),
            InstructionDecl::Switch { cases, .. } => {
                for case in cases {
                    flatten(&case.instructions, out);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::{EnumValueDecl, Literal};

    fn enum_decl(name: &str, underlying: &str, values: &[(&str, i64)]) -> CustomDecl {
        CustomDecl::Enum(EnumDecl {
            name: name.into(),
            underlying: underlying.into(),
            comment: None,
            values: values
                .iter()
                .map(|&(name, value)| EnumValueDecl {
                    name: name.into(),
                    value,
                    comment: None,
                })
                .collect(),
        })
    }

    fn field(name: &str, type_name: &str) -> InstructionDecl {
        InstructionDecl::Field {
            name: Some(name.into()),
            type_name: type_name.into(),
            length: None,
            padded: false,
            optional: false,
            value: None,
            comment: None,
        }
    }

    #[test]
    fn resolves_primitives() {
        let mut registry = TypeRegistry::new();
        let ty = registry.resolve("short", &Length::unspecified()).unwrap();
        assert!(matches!(ty, Type::Integer(IntKind::Short)));

        let ty = registry.resolve("bool", &Length::unspecified()).unwrap();
        assert!(matches!(ty, Type::Bool { underlying: IntKind::Char }));

        let ty = registry.resolve("blob", &Length::unspecified()).unwrap();
        assert!(!ty.bounded());
    }

    #[test]
    fn memoizes_resolved_types() {
        let mut registry = TypeRegistry::new();
        registry.define(enum_decl("Gender", "char", &[("Female", 0), ("Male", 1)]));

        let first = registry.resolve("Gender", &Length::unspecified()).unwrap();
        let second = registry.resolve("Gender", &Length::unspecified()).unwrap();
        match (first, second) {
            (Type::Enum(a), Type::Enum(b)) => assert!(Arc::ptr_eq(&a, &b)),
            other => panic!("expected enums, got {other:?}"),
        }
    }

    #[test]
    fn rejects_duplicate_definitions() {
        let mut registry = TypeRegistry::new();
        assert!(registry.define(enum_decl("Gender", "char", &[])));
        assert!(!registry.define(enum_decl("Gender", "short", &[])));
    }

    #[test]
    fn rejects_duplicate_enum_ordinals_and_names() {
        let mut registry = TypeRegistry::new();
        registry.define(enum_decl("Bad", "char", &[("A", 1), ("B", 1)]));
        let err = registry.resolve("Bad", &Length::unspecified()).unwrap_err();
        assert!(err.message.contains("ordinal value 1"), "{err}");

        let mut registry = TypeRegistry::new();
        registry.define(enum_decl("Bad", "char", &[("A", 1), ("A", 2)]));
        let err = registry.resolve("Bad", &Length::unspecified()).unwrap_err();
        assert!(err.message.contains("value name A"), "{err}");
    }

    #[test]
    fn underlying_override_applies_to_enums_only() {
        let mut registry = TypeRegistry::new();
        registry.define(enum_decl("Gender", "char", &[("Female", 0)]));

        let ty = registry.resolve("Gender:short", &Length::unspecified()).unwrap();
        match ty {
            Type::Enum(e) => assert_eq!(e.underlying, IntKind::Short),
            other => panic!("expected enum, got {other:?}"),
        }

        let err = registry
            .resolve("short:char", &Length::unspecified())
            .unwrap_err();
        assert!(err.message.contains("no underlying type"), "{err}");
    }

    #[test]
    fn rejects_invalid_override_syntax() {
        let mut registry = TypeRegistry::new();
        let err = registry
            .resolve("a:b:c", &Length::unspecified())
            .unwrap_err();
        assert!(err.message.contains("one colon"), "{err}");

        let err = registry
            .resolve("char:char", &Length::unspecified())
            .unwrap_err();
        assert!(err.message.contains("itself"), "{err}");

        let err = registry
            .resolve("bool:string", &Length::unspecified())
            .unwrap_err();
        assert!(err.message.contains("not a numeric type"), "{err}");
    }

    #[test]
    fn length_annotations_are_for_strings_only() {
        let mut registry = TypeRegistry::new();
        let ty = registry
            .resolve("string", &Length::specified("8"))
            .unwrap();
        assert_eq!(ty.fixed_size(), Some(8));

        let err = registry
            .resolve("int", &Length::specified("8"))
            .unwrap_err();
        assert!(err.message.contains("string types"), "{err}");
    }

    #[test]
    fn detects_circular_references() {
        let mut registry = TypeRegistry::new();
        registry.define(enum_decl("A", "B", &[]));
        registry.define(enum_decl("B", "A", &[]));
        let err = registry.resolve("A", &Length::unspecified()).unwrap_err();
        assert!(err.message.contains("circular"), "{err}");
    }

    #[test]
    fn unknown_type_is_an_error() {
        let mut registry = TypeRegistry::new();
        let err = registry
            .resolve("Missing", &Length::unspecified())
            .unwrap_err();
        assert!(err.message.contains("not defined"), "{err}");
    }

    #[test]
    fn struct_fixed_size_sums_members() {
        let mut registry = TypeRegistry::new();
        registry.define(CustomDecl::Struct(StructDecl {
            name: "Coords".into(),
            comment: None,
            instructions: vec![field("x", "char"), field("y", "char")],
        }));
        registry.define(CustomDecl::Struct(StructDecl {
            name: "Warp".into(),
            comment: None,
            instructions: vec![
                field("map", "short"),
                field("coords", "Coords"),
                InstructionDecl::Array {
                    name: "pad".into(),
                    type_name: "byte".into(),
                    length: Some(LengthRef::Literal(3)),
                    optional: false,
                    delimited: false,
                    trailing_delimiter: None,
                    comment: None,
                },
            ],
        }));

        let ty = registry.resolve("Warp", &Length::unspecified()).unwrap();
        assert_eq!(ty.fixed_size(), Some(7));
        assert!(ty.bounded());
    }

    #[test]
    fn chunked_structs_are_not_fixed_size() {
        let mut registry = TypeRegistry::new();
        registry.define(CustomDecl::Struct(StructDecl {
            name: "Framed".into(),
            comment: None,
            instructions: vec![InstructionDecl::Chunked {
                instructions: vec![field("id", "short")],
            }],
        }));
        let ty = registry.resolve("Framed", &Length::unspecified()).unwrap();
        assert_eq!(ty.fixed_size(), None);
        assert!(ty.bounded());
    }

    #[test]
    fn break_restores_boundedness() {
        let unbounded_field = InstructionDecl::Field {
            name: Some("text".into()),
            type_name: "string".into(),
            length: None,
            padded: false,
            optional: false,
            value: None,
            comment: None,
        };

        let mut registry = TypeRegistry::new();
        registry.define(CustomDecl::Struct(StructDecl {
            name: "Tail".into(),
            comment: None,
            instructions: vec![InstructionDecl::Chunked {
                instructions: vec![unbounded_field.clone(), InstructionDecl::Break, field("id", "short")],
            }],
        }));
        let ty = registry.resolve("Tail", &Length::unspecified()).unwrap();
        assert!(ty.bounded());

        let mut registry = TypeRegistry::new();
        registry.define(CustomDecl::Struct(StructDecl {
            name: "Tail".into(),
            comment: None,
            instructions: vec![InstructionDecl::Chunked {
                instructions: vec![unbounded_field, field("id", "short")],
            }],
        }));
        let ty = registry.resolve("Tail", &Length::unspecified()).unwrap();
        assert!(!ty.bounded());
    }

    #[test]
    fn dummy_counts_toward_fixed_size() {
        let mut registry = TypeRegistry::new();
        registry.define(CustomDecl::Struct(StructDecl {
            name: "Ack".into(),
            comment: None,
            instructions: vec![
                field("code", "short"),
                InstructionDecl::Dummy {
                    type_name: "char".into(),
                    value: Literal::Int(0),
                    comment: None,
                },
            ],
        }));
        let ty = registry.resolve("Ack", &Length::unspecified()).unwrap();
        assert_eq!(ty.fixed_size(), Some(3));
    }
}
