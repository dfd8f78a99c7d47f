//! Binary codec runtime for the pkt wire protocol.
//!
//! The protocol encodes integers in a 4-digit mixed-radix-253 scheme,
//! obfuscates certain strings with a reversible byte transform, and frames
//! variable-length sections with `0xFF` delimiter bytes ("chunks"). This
//! crate provides the reader/writer pair that compiled serializers drive;
//! it performs no I/O and holds no global state.

pub mod encode;
mod error;
mod reader;
mod writer;

pub use error::CodecError;
pub use reader::Reader;
pub use writer::Writer;

/// Maximum value of an encoded 1-byte integer, exclusive.
pub const CHAR_MAX: u32 = 253;
/// Maximum value of an encoded 2-byte integer, exclusive.
pub const SHORT_MAX: u32 = CHAR_MAX * CHAR_MAX;
/// Maximum value of an encoded 3-byte integer, exclusive.
pub const THREE_MAX: u32 = CHAR_MAX * CHAR_MAX * CHAR_MAX;
/// Maximum value of an encoded 4-byte integer, exclusive.
pub const INT_MAX: u32 = 4_097_152_081; // 253^4

/// Chunk delimiter byte. Terminates a chunk in chunked reading mode.
pub const CHUNK_DELIMITER: u8 = 0xFF;

/// Byte written in place of a literal `0xFF` inside a plain string while the
/// writer's sanitization mode is enabled.
pub const SANITIZE_REPLACEMENT: u8 = 0x79;
