//! Schema document model and type registry.
//!
//! A protocol schema is a set of `protocol.json` documents declaring enums,
//! structs, and packets. This crate parses those documents, catalogs the
//! primitive wire types, and resolves custom type references through a
//! two-phase registry (index everything first, resolve lazily afterwards)
//! with static fixed-size and boundedness analysis.

pub mod decl;
mod error;
mod registry;
pub mod types;

pub use error::{SchemaError, SchemaErrorKind};
pub use registry::{CustomDecl, TypeRegistry};
