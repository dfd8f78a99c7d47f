use crate::encode::{encode_number, encode_string, str_to_bytes};
use crate::{CodecError, CHAR_MAX, CHUNK_DELIMITER, INT_MAX, SANITIZE_REPLACEMENT, SHORT_MAX, THREE_MAX};

/// Growable byte buffer with protocol-aware writes.
///
/// While string sanitization mode is enabled, plain string writes replace
/// literal `0xFF` bytes with a placeholder so chunk delimiters written by
/// the serializer stay unambiguous. Obfuscated strings are exempt; the
/// obfuscation transform never produces `0xFF`.
#[derive(Debug, Default)]
pub struct Writer {
    data: Vec<u8>,
    string_sanitization_mode: bool,
}

impl Writer {
    pub fn new() -> Self {
        Writer::default()
    }

    pub fn add_byte(&mut self, value: u32) -> Result<(), CodecError> {
        check_size(value, 0xFF)?;
        self.data.push(value as u8);
        Ok(())
    }

    pub fn add_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn add_char(&mut self, value: u32) -> Result<(), CodecError> {
        check_size(value, CHAR_MAX - 1)?;
        let encoded = encode_number(value);
        self.data.extend_from_slice(&encoded[..1]);
        Ok(())
    }

    pub fn add_short(&mut self, value: u32) -> Result<(), CodecError> {
        check_size(value, SHORT_MAX - 1)?;
        let encoded = encode_number(value);
        self.data.extend_from_slice(&encoded[..2]);
        Ok(())
    }

    pub fn add_three(&mut self, value: u32) -> Result<(), CodecError> {
        check_size(value, THREE_MAX - 1)?;
        let encoded = encode_number(value);
        self.data.extend_from_slice(&encoded[..3]);
        Ok(())
    }

    pub fn add_int(&mut self, value: u32) -> Result<(), CodecError> {
        check_size(value, INT_MAX - 1)?;
        let encoded = encode_number(value);
        self.data.extend_from_slice(&encoded);
        Ok(())
    }

    pub fn add_string(&mut self, value: &str) {
        let mut bytes = str_to_bytes(value);
        self.sanitize(&mut bytes);
        self.data.extend_from_slice(&bytes);
    }

    /// Writes a string into exactly `length` bytes. A padded string may be
    /// shorter and is filled out with `0xFF`; an unpadded string must match
    /// the length exactly.
    pub fn add_fixed_string(
        &mut self,
        value: &str,
        length: usize,
        padded: bool,
    ) -> Result<(), CodecError> {
        let mut bytes = str_to_bytes(value);
        check_string_length(&bytes, length, padded)?;
        self.sanitize(&mut bytes);
        pad(&mut bytes, length);
        self.data.extend_from_slice(&bytes);
        Ok(())
    }

    pub fn add_encoded_string(&mut self, value: &str) {
        let mut bytes = str_to_bytes(value);
        encode_string(&mut bytes);
        self.data.extend_from_slice(&bytes);
    }

    /// Writes an obfuscated string into exactly `length` bytes. Padding is
    /// applied before the obfuscation transform.
    pub fn add_fixed_encoded_string(
        &mut self,
        value: &str,
        length: usize,
        padded: bool,
    ) -> Result<(), CodecError> {
        let mut bytes = str_to_bytes(value);
        check_string_length(&bytes, length, padded)?;
        pad(&mut bytes, length);
        encode_string(&mut bytes);
        self.data.extend_from_slice(&bytes);
        Ok(())
    }

    pub fn string_sanitization_mode(&self) -> bool {
        self.string_sanitization_mode
    }

    pub fn set_string_sanitization_mode(&mut self, enabled: bool) {
        self.string_sanitization_mode = enabled;
    }

    pub fn length(&self) -> usize {
        self.data.len()
    }

    pub fn to_byte_array(&self) -> Vec<u8> {
        self.data.clone()
    }

    fn sanitize(&self, bytes: &mut [u8]) {
        if !self.string_sanitization_mode {
            return;
        }
        for byte in bytes.iter_mut() {
            if *byte == CHUNK_DELIMITER {
                *byte = SANITIZE_REPLACEMENT;
            }
        }
    }
}

fn check_size(value: u32, max: u32) -> Result<(), CodecError> {
    if value > max {
        return Err(CodecError::ValueOutOfRange { value, max });
    }
    Ok(())
}

fn check_string_length(bytes: &[u8], length: usize, padded: bool) -> Result<(), CodecError> {
    if padded {
        if bytes.len() > length {
            return Err(CodecError::PaddedStringTooLarge {
                max: length,
                actual: bytes.len(),
            });
        }
    } else if bytes.len() != length {
        return Err(CodecError::StringLengthMismatch {
            expected: length,
            actual: bytes.len(),
        });
    }
    Ok(())
}

fn pad(bytes: &mut Vec<u8>, length: usize) {
    bytes.resize(length, CHUNK_DELIMITER);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_each_integer_size() {
        let mut writer = Writer::new();
        writer.add_byte(0xAB).unwrap();
        writer.add_char(4).unwrap();
        writer.add_short(253).unwrap();
        writer.add_three(64009).unwrap();
        writer.add_int(16_194_277).unwrap();
        assert_eq!(
            writer.to_byte_array(),
            [
                0xAB, 0x05, 0x01, 0x02, 0x01, 0x01, 0x02, 0x01, 0x01, 0x01,
                0x02,
            ]
        );
    }

    #[test]
    fn rejects_oversized_values() {
        let mut writer = Writer::new();
        assert_eq!(
            writer.add_byte(256),
            Err(CodecError::ValueOutOfRange { value: 256, max: 255 })
        );
        assert_eq!(
            writer.add_char(253),
            Err(CodecError::ValueOutOfRange { value: 253, max: 252 })
        );
        assert_eq!(
            writer.add_short(64009),
            Err(CodecError::ValueOutOfRange { value: 64009, max: 64008 })
        );
        assert!(writer.add_short(64008).is_ok());
        assert_eq!(writer.length(), 2);
    }

    #[test]
    fn fixed_string_pads_with_delimiter_bytes() {
        let mut writer = Writer::new();
        writer.add_fixed_string("ab", 4, true).unwrap();
        assert_eq!(writer.to_byte_array(), [b'a', b'b', 0xFF, 0xFF]);
    }

    #[test]
    fn fixed_string_length_is_checked() {
        let mut writer = Writer::new();
        assert_eq!(
            writer.add_fixed_string("abc", 2, false),
            Err(CodecError::StringLengthMismatch { expected: 2, actual: 3 })
        );
        assert_eq!(
            writer.add_fixed_string("abc", 2, true),
            Err(CodecError::PaddedStringTooLarge { max: 2, actual: 3 })
        );
        assert_eq!(writer.length(), 0);
    }

    #[test]
    fn fixed_encoded_string_pads_before_encoding() {
        let mut writer = Writer::new();
        writer
            .add_fixed_encoded_string("Padded with 0xFF", 24, true)
            .unwrap();
        let expected: Vec<u8> = "ÿÿÿÿÿÿÿÿ+YUo 7Y6V i:i;lO"
            .chars()
            .map(|c| c as u32 as u8)
            .collect();
        assert_eq!(writer.to_byte_array(), expected);
    }

    #[test]
    fn sanitization_replaces_delimiter_in_plain_strings() {
        let mut writer = Writer::new();
        writer.set_string_sanitization_mode(true);
        writer.add_string("a\u{FF}b");
        assert_eq!(writer.to_byte_array(), [b'a', 0x79, b'b']);
    }

    #[test]
    fn sanitization_leaves_encoded_strings_alone() {
        let mut writer = Writer::new();
        writer.set_string_sanitization_mode(true);
        writer.add_encoded_string("Hello, World!");
        assert_eq!(writer.to_byte_array(), b"!;a-^H s^3a:)");
    }

    #[test]
    fn sanitization_is_off_by_default() {
        let mut writer = Writer::new();
        assert!(!writer.string_sanitization_mode());
        writer.add_string("\u{FF}");
        assert_eq!(writer.to_byte_array(), [0xFF]);
    }
}
