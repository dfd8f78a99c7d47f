//! Number and string encoding primitives.
//!
//! Integers travel as up to four mixed-radix-253 digits, least significant
//! first. Each digit byte is `quotient + 1`; digits not needed to represent
//! the value are written as the sentinel byte `0xFE`. Obfuscated strings are
//! inverted in place and then reversed.

use crate::{CHAR_MAX, INT_MAX, SHORT_MAX, THREE_MAX};

const MISSING_DIGIT: u8 = 0xFE;

/// Encodes a number to its 4-byte wire form.
///
/// `number` must be below [`INT_MAX`] (`253^4`); larger values do not fit in
/// four digits. The writer enforces this before calling.
pub fn encode_number(number: u32) -> [u8; 4] {
    debug_assert!(number < INT_MAX, "number {number} exceeds the 4-digit range");
    let mut value = number;

    let mut d = MISSING_DIGIT;
    if number >= THREE_MAX {
        d = (value / THREE_MAX) as u8 + 1;
        value %= THREE_MAX;
    }

    let mut c = MISSING_DIGIT;
    if number >= SHORT_MAX {
        c = (value / SHORT_MAX) as u8 + 1;
        value %= SHORT_MAX;
    }

    let mut b = MISSING_DIGIT;
    if number >= CHAR_MAX {
        b = (value / CHAR_MAX) as u8 + 1;
        value %= CHAR_MAX;
    }

    let a = value as u8 + 1;

    [a, b, c, d]
}

/// Decodes a number from a sequence of bytes.
///
/// Reads at most four digits and stops at the first `0xFE` sentinel. Fewer
/// than four bytes is fine; the missing digits simply contribute nothing.
pub fn decode_number(bytes: &[u8]) -> u32 {
    let mut result: u32 = 0;

    for (i, &byte) in bytes.iter().take(4).enumerate() {
        if byte == MISSING_DIGIT {
            break;
        }
        let value = u32::from(byte).saturating_sub(1);
        result += match i {
            0 => value,
            1 => CHAR_MAX * value,
            2 => SHORT_MAX * value,
            _ => THREE_MAX * value,
        };
    }

    result
}

/// Encodes a string by inverting the bytes and then reversing them.
///
/// This is an in-place operation.
pub fn encode_string(bytes: &mut [u8]) {
    invert_characters(bytes);
    bytes.reverse();
}

/// Decodes a string by reversing the bytes and then inverting them.
///
/// This is an in-place operation.
pub fn decode_string(bytes: &mut [u8]) {
    bytes.reverse();
    invert_characters(bytes);
}

fn invert_characters(bytes: &mut [u8]) {
    let mut flippy = bytes.len() % 2 == 1;

    for byte in bytes.iter_mut() {
        let c = *byte;
        let mut f: i32 = 0;

        if flippy {
            f = 0x2E;
            if c >= 0x50 {
                f = -f;
            }
        }

        if (0x22..=0x7E).contains(&c) {
            *byte = (0x9F - i32::from(c) - f) as u8;
        }

        flippy = !flippy;
    }
}

/// Converts a string to its single-byte wire form.
///
/// Characters with scalar values above `0xFF` have no wire representation
/// and are replaced with `?`.
pub fn str_to_bytes(value: &str) -> Vec<u8> {
    value
        .chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

/// Converts wire bytes back to a string, one character per byte.
pub fn bytes_to_str(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
