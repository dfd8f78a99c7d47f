use crate::encode::{bytes_to_str, decode_number, decode_string};
use crate::{CodecError, CHUNK_DELIMITER};

/// Cursor over a byte buffer with protocol-aware reads.
///
/// Over-reads never fail: integer reads past the end of the data yield `0`
/// and string reads yield what is available. With chunked reading mode
/// enabled, reads are additionally bounded by the next `0xFF` delimiter.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    position: usize,
    chunked_reading_mode: bool,
    chunk_start: usize,
    next_break: Option<usize>,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Reader {
            data,
            position: 0,
            chunked_reading_mode: false,
            chunk_start: 0,
            next_break: None,
        }
    }

    /// Returns a new reader over a sub-range of the same data.
    ///
    /// The range is clamped to the available bytes, so out-of-range
    /// arguments yield an empty reader rather than failing. The new reader
    /// starts with chunked reading mode disabled.
    pub fn slice(&self, index: usize, length: usize) -> Reader<'a> {
        let start = index.min(self.data.len());
        let end = start + length.min(self.data.len() - start);
        Reader::new(&self.data[start..end])
    }

    pub fn get_byte(&mut self) -> u8 {
        self.read_byte()
    }

    pub fn get_bytes(&mut self, length: usize) -> Vec<u8> {
        self.read_bytes(length).to_vec()
    }

    pub fn get_char(&mut self) -> u32 {
        let bytes = self.read_bytes(1);
        decode_number(bytes)
    }

    pub fn get_short(&mut self) -> u32 {
        let bytes = self.read_bytes(2);
        decode_number(bytes)
    }

    pub fn get_three(&mut self) -> u32 {
        let bytes = self.read_bytes(3);
        decode_number(bytes)
    }

    pub fn get_int(&mut self) -> u32 {
        let bytes = self.read_bytes(4);
        decode_number(bytes)
    }

    /// Reads all remaining bytes as a string.
    pub fn get_string(&mut self) -> String {
        let bytes = self.read_bytes(self.remaining());
        bytes_to_str(bytes)
    }

    /// Reads `length` bytes as a string. A padded string is truncated at the
    /// first `0xFF` byte.
    pub fn get_fixed_string(&mut self, length: usize, padded: bool) -> String {
        let mut bytes = self.read_bytes(length);
        if padded {
            bytes = strip_padding(bytes);
        }
        bytes_to_str(bytes)
    }

    /// Reads all remaining bytes as an obfuscated string.
    pub fn get_encoded_string(&mut self) -> String {
        let mut bytes = self.read_bytes(self.remaining()).to_vec();
        decode_string(&mut bytes);
        bytes_to_str(&bytes)
    }

    /// Reads `length` bytes as an obfuscated string. Padding is stripped
    /// after decoding.
    pub fn get_fixed_encoded_string(&mut self, length: usize, padded: bool) -> String {
        let mut bytes = self.read_bytes(length).to_vec();
        decode_string(&mut bytes);
        if padded {
            bytes.truncate(strip_padding(&bytes).len());
        }
        bytes_to_str(&bytes)
    }

    pub fn chunked_reading_mode(&self) -> bool {
        self.chunked_reading_mode
    }

    /// Enables or disables chunked reading mode.
    ///
    /// While enabled, `remaining` reports the distance to the next `0xFF`
    /// delimiter instead of the end of the data.
    pub fn set_chunked_reading_mode(&mut self, enabled: bool) {
        self.chunked_reading_mode = enabled;
        if enabled && self.next_break.is_none() {
            self.next_break = Some(self.find_break(self.chunk_start));
        }
    }

    /// Bytes left to read before the next chunk boundary, or before the end
    /// of the data when chunked reading mode is disabled.
    pub fn remaining(&self) -> usize {
        if self.chunked_reading_mode {
            let next_break = self.next_break.unwrap_or(self.data.len());
            next_break - self.position.min(next_break)
        } else {
            self.data.len() - self.position
        }
    }

    /// Advances past the current chunk's delimiter to the start of the next
    /// chunk. At the end of the data this is a no-op; outside chunked
    /// reading mode it is an error.
    pub fn next_chunk(&mut self) -> Result<(), CodecError> {
        if !self.chunked_reading_mode {
            return Err(CodecError::NotChunkedReadingMode);
        }

        let mut position = self.next_break.unwrap_or(self.data.len());
        if position < self.data.len() {
            // Skip the delimiter itself.
            position += 1;
        }

        self.position = position;
        self.chunk_start = position;
        self.next_break = Some(self.find_break(position));

        Ok(())
    }

    pub fn position(&self) -> usize {
        self.position
    }

    fn find_break(&self, from: usize) -> usize {
        self.data[from.min(self.data.len())..]
            .iter()
            .position(|&b| b == CHUNK_DELIMITER)
            .map(|i| from + i)
            .unwrap_or(self.data.len())
    }

    fn read_byte(&mut self) -> u8 {
        if self.remaining() > 0 {
            let byte = self.data[self.position];
            self.position += 1;
            byte
        } else {
            0
        }
    }

    fn read_bytes(&mut self, length: usize) -> &'a [u8] {
        let length = length.min(self.remaining());
        let bytes = &self.data[self.position..self.position + length];
        self.position += length;
        bytes
    }
}

fn strip_padding(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == CHUNK_DELIMITER) {
        Some(end) => &bytes[..end],
        None => bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_each_integer_size() {
        let data = [
            0x05, 0x01, 0x02, 0x01, 0x01, 0x02, 0x01, 0x01, 0x01, 0x02,
        ];
        let mut reader = Reader::new(&data);
        assert_eq!(reader.get_char(), 4);
        assert_eq!(reader.get_short(), 253);
        assert_eq!(reader.get_three(), 64009);
        assert_eq!(reader.get_int(), 16_194_277);
    }

    #[test]
    fn over_read_yields_zero() {
        let mut reader = Reader::new(&[0x02]);
        assert_eq!(reader.get_char(), 1);
        assert_eq!(reader.get_byte(), 0);
        assert_eq!(reader.get_short(), 0);
        assert_eq!(reader.get_int(), 0);
        assert_eq!(reader.get_string(), "");
        assert_eq!(reader.get_bytes(8), Vec::<u8>::new());
    }

    #[test]
    fn remaining_is_bounded_by_chunk_delimiter() {
        let data = [0x01, 0x02, 0xFF, 0x03, 0x04, 0x05];
        let mut reader = Reader::new(&data);
        assert_eq!(reader.remaining(), 6);

        reader.set_chunked_reading_mode(true);
        assert_eq!(reader.remaining(), 2);

        reader.get_byte();
        reader.get_byte();
        assert_eq!(reader.remaining(), 0);
        assert_eq!(reader.get_byte(), 0);

        reader.next_chunk().unwrap();
        assert_eq!(reader.remaining(), 3);

        reader.set_chunked_reading_mode(false);
        assert_eq!(reader.remaining(), 3);
    }

    #[test]
    fn next_chunk_is_idempotent_at_end() {
        let data = [0x01, 0xFF, 0x02];
        let mut reader = Reader::new(&data);
        reader.set_chunked_reading_mode(true);

        reader.next_chunk().unwrap();
        assert_eq!(reader.position(), 2);
        reader.next_chunk().unwrap();
        assert_eq!(reader.position(), 3);
        reader.next_chunk().unwrap();
        assert_eq!(reader.position(), 3);
    }

    #[test]
    fn next_chunk_requires_chunked_mode() {
        let mut reader = Reader::new(&[0x01, 0xFF]);
        assert_eq!(
            reader.next_chunk(),
            Err(CodecError::NotChunkedReadingMode)
        );
    }

    #[test]
    fn slice_is_clamped() {
        let data = [0x01, 0x02, 0x03, 0x04];
        let reader = Reader::new(&data);

        let mut sub = reader.slice(1, 2);
        assert_eq!(sub.remaining(), 2);
        assert_eq!(sub.get_byte(), 0x02);

        assert_eq!(reader.slice(2, 100).remaining(), 2);
        assert_eq!(reader.slice(100, 2).remaining(), 0);
    }

    #[test]
    fn slice_does_not_disturb_the_source_reader() {
        let data = [0x01, 0x02, 0x03];
        let mut reader = Reader::new(&data);
        reader.get_byte();

        let _ = reader.slice(0, 3);
        assert_eq!(reader.position(), 1);
        assert_eq!(reader.remaining(), 2);
    }

    #[test]
    fn fixed_string_strips_padding_when_padded() {
        let data = [b'a', b'b', 0xFF, 0xFF, b'c'];
        let mut reader = Reader::new(&data);
        assert_eq!(reader.get_fixed_string(4, true), "ab");
        assert_eq!(reader.get_byte(), b'c');

        let mut reader = Reader::new(&data);
        assert_eq!(reader.get_fixed_string(4, false), "ab\u{FF}\u{FF}");
    }

    #[test]
    fn encoded_string_reads() {
        let data = b"!;a-^H s^3a:)";
        let mut reader = Reader::new(data);
        assert_eq!(reader.get_encoded_string(), "Hello, World!");
    }
}
