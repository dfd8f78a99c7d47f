//! Corpus-level compilation driver.
//!
//! Collects `protocol.json` files, indexes every declared type, and
//! compiles the whole corpus into one [`CompiledSchema`]. Packet identity
//! comes from the `PacketFamily` and `PacketAction` enums, which every
//! corpus must declare.

use std::fs;
use std::path::Path;

use anyhow::Context;
use pkt_schema::decl::{PacketDecl, ProtocolFile};
use pkt_schema::types::{Length, Type};
use pkt_schema::{CustomDecl, SchemaError, TypeRegistry};

use crate::field::wire_int;
use crate::ir::{CompiledSchema, EnumDef, EnumValueDef, ObjectDef, PacketDef};
use crate::object::{ObjectCompiler, ObjectContext};
use crate::switch::pascal_case;

struct SourceFile {
    /// Slash-separated path of the directory the file came from, relative
    /// to the corpus root. Decides packet naming (`net/client` vs
    /// `net/server`).
    source_path: String,
    decl: ProtocolFile,
}

/// Compiles a corpus of schema documents.
#[derive(Default)]
pub struct ProtocolCompiler {
    registry: TypeRegistry,
    files: Vec<SourceFile>,
}

impl ProtocolCompiler {
    pub fn new() -> Self {
        ProtocolCompiler::default()
    }

    pub fn clear(&mut self) {
        self.registry.clear();
        self.files.clear();
    }

    /// Indexes one document's declarations. Type names are global across
    /// the corpus; packet (family, action) pairs are unique per file only.
    pub fn index_file(
        &mut self,
        source_path: &str,
        decl: ProtocolFile,
    ) -> Result<(), SchemaError> {
        for enum_decl in &decl.enums {
            if !self.registry.define(CustomDecl::Enum(enum_decl.clone())) {
                return Err(SchemaError::type_error(format!(
                    "{} type cannot be redefined",
                    enum_decl.name
                )));
            }
        }
        for struct_decl in &decl.structs {
            if !self.registry.define(CustomDecl::Struct(struct_decl.clone())) {
                return Err(SchemaError::type_error(format!(
                    "{} type cannot be redefined",
                    struct_decl.name
                )));
            }
        }

        let mut seen = std::collections::BTreeSet::new();
        for packet in &decl.packets {
            if !seen.insert((packet.family.clone(), packet.action.clone())) {
                return Err(SchemaError::packet(format!(
                    "{}_{} packet cannot be redefined in {source_path}",
                    packet.family, packet.action
                )));
            }
        }

        self.files.push(SourceFile {
            source_path: source_path.to_string(),
            decl,
        });
        Ok(())
    }

    pub fn compile(mut self) -> Result<CompiledSchema, SchemaError> {
        let mut schema = CompiledSchema::default();

        let enum_names: Vec<String> = self
            .files
            .iter()
            .flat_map(|f| f.decl.enums.iter().map(|e| e.name.clone()))
            .collect();
        for name in enum_names {
            let ty = self.registry.resolve(&name, &Length::unspecified())?;
            let Type::Enum(enum_type) = ty else {
                continue;
            };
            schema.enums.insert(
                name.clone(),
                EnumDef {
                    name,
                    underlying: wire_int(enum_type.underlying),
                    values: enum_type
                        .values
                        .iter()
                        .map(|v| EnumValueDef {
                            name: v.name.clone(),
                            ordinal: v.ordinal,
                        })
                        .collect(),
                },
            );
        }

        let struct_decls: Vec<_> = self
            .files
            .iter()
            .flat_map(|f| f.decl.structs.iter().cloned())
            .collect();
        for decl in struct_decls {
            let (def, aux) = compile_object(&mut self.registry, decl.name, &decl.instructions)?;
            insert_objects(&mut schema, def, aux);
        }

        let packet_decls: Vec<(String, PacketDecl)> = self
            .files
            .iter()
            .flat_map(|f| {
                f.decl
                    .packets
                    .iter()
                    .map(|p| (f.source_path.clone(), p.clone()))
            })
            .collect();
        for (source_path, decl) in packet_decls {
            let family = self.enum_member("PacketFamily", &decl.family)?;
            let action = self.enum_member("PacketAction", &decl.action)?;
            let type_name = format!(
                "{}{}{}",
                pascal_case(&decl.family),
                pascal_case(&decl.action),
                packet_suffix(&source_path)?
            );

            let (def, aux) =
                compile_object(&mut self.registry, type_name.clone(), &decl.instructions)?;
            insert_objects(&mut schema, def, aux);
            schema.packets.push(PacketDef {
                type_name,
                family,
                action,
            });
        }

        Ok(schema)
    }

    fn enum_member(&mut self, enum_name: &str, member: &str) -> Result<EnumValueDef, SchemaError> {
        let ty = self
            .registry
            .resolve(enum_name, &Length::unspecified())
            .map_err(|_| {
                SchemaError::packet(format!("{enum_name} enum is missing from the corpus"))
            })?;
        let Type::Enum(enum_type) = ty else {
            return Err(SchemaError::packet(format!(
                "{enum_name} must be an enum type"
            )));
        };
        let value = enum_type.value_by_name(member).ok_or_else(|| {
            SchemaError::packet(format!("{member} is not a valid {enum_name} member"))
        })?;
        Ok(EnumValueDef {
            name: value.name.clone(),
            ordinal: value.ordinal,
        })
    }
}

fn compile_object(
    registry: &mut TypeRegistry,
    name: String,
    instructions: &[pkt_schema::decl::InstructionDecl],
) -> Result<(ObjectDef, Vec<ObjectDef>), SchemaError> {
    let mut compiler = ObjectCompiler::new(registry, name, ObjectContext::default());
    compiler.compile_all(instructions)?;
    Ok(compiler.finish())
}

fn insert_objects(schema: &mut CompiledSchema, def: ObjectDef, aux: Vec<ObjectDef>) {
    schema.objects.insert(def.name.clone(), def);
    for def in aux {
        schema.objects.insert(def.name.clone(), def);
    }
}

fn packet_suffix(source_path: &str) -> Result<&'static str, SchemaError> {
    if source_path.ends_with("net/client") {
        Ok("ClientPacket")
    } else if source_path.ends_with("net/server") {
        Ok("ServerPacket")
    } else {
        Err(SchemaError::packet(format!(
            "cannot create packet types in directory {source_path} (must be net/client or net/server)"
        )))
    }
}

/// Compiles every `protocol.json` under `root`, walking directories in
/// sorted order.
pub fn compile_dir(root: &Path) -> anyhow::Result<CompiledSchema> {
    let mut compiler = ProtocolCompiler::new();
    index_dir(&mut compiler, root, root)?;
    let schema = compiler.compile().context("schema compilation failed")?;
    Ok(schema)
}

fn index_dir(compiler: &mut ProtocolCompiler, root: &Path, dir: &Path) -> anyhow::Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)
        .with_context(|| format!("failed to read {}", dir.display()))?
        .collect::<Result<_, _>>()
        .with_context(|| format!("failed to read {}", dir.display()))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            index_dir(compiler, root, &path)?;
        } else if path.file_name().is_some_and(|n| n == "protocol.json") {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let decl = ProtocolFile::parse(&text)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            compiler
                .index_file(&source_path_of(root, dir), decl)
                .with_context(|| format!("failed to index {}", path.display()))?;
        }
    }
    Ok(())
}

fn source_path_of(root: &Path, dir: &Path) -> String {
    match dir.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => "protocol".to_string(),
        Ok(rel) => format!("protocol/{}", rel.display().to_string().replace('\\', "/")),
        Err(_) => "protocol".to_string(),
    }
}
