use thiserror::Error;

/// Error raised by the codec runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// A value was too large for the wire size it was written as.
    #[error("value {value} exceeds maximum of {max}")]
    ValueOutOfRange { value: u32, max: u32 },

    /// A fixed-size string did not have the declared length.
    #[error("string {actual} bytes long does not match expected length of {expected}")]
    StringLengthMismatch { expected: usize, actual: usize },

    /// A padded string was longer than the space reserved for it.
    #[error("padded string {actual} bytes long exceeds maximum length of {max}")]
    PaddedStringTooLarge { max: usize, actual: usize },

    /// `next_chunk` was called while chunked reading mode was disabled.
    #[error("not in chunked reading mode")]
    NotChunkedReadingMode,
}
