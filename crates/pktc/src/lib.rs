//! Protocol schema compiler.
//!
//! Compiles a corpus of `protocol.json` declarations into a
//! [`CompiledSchema`]: an immutable set of serializer definitions, one per
//! declared struct, packet, and switch-case payload. The definitions are
//! executed by a generic interpreter (`exec`) that drives the `pkt-data`
//! codec, so no source code is emitted.

pub mod exec;
mod field;
pub mod ir;
mod object;
pub mod project;
mod switch;

pub use exec::{ProtocolObject, SerializationError, Value};
pub use ir::CompiledSchema;
pub use project::{compile_dir, ProtocolCompiler};
