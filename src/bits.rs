//! MSB-first bit extraction from the unstuffed entropy-coded stream.

use crate::error::{Error, ErrorKind, Result};

pub(crate) struct BitReader<'a> {
    bytes: &'a [u8],
    byte: usize,
    /// Bit position inside the current byte, 0-7, counted from the MSB.
    bit: u8,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            byte: 0,
            bit: 0,
        }
    }

    /// Consumes `count` bits and returns them right-aligned.
    ///
    /// `count` may be 0 (yielding 0), which the zero-length coefficient
    /// paths rely on. Exhausting the stream mid-read is an error.
    pub fn read_bits(&mut self, count: usize) -> Result<usize> {
        if count > usize::BITS as usize {
            return Err(Error::new(ErrorKind::StreamError, "bit read too wide"));
        }
        let mut value = 0;
        for _ in 0..count {
            let byte = *self.bytes.get(self.byte).ok_or_else(|| {
                Error::new(ErrorKind::StreamError, "entropy-coded stream exhausted")
            })?;
            let bit = (byte >> (7 - self.bit)) & 1;
            value = (value << 1) | usize::from(bit);
            self.bit += 1;
            if self.bit == 8 {
                self.bit = 0;
                self.byte += 1;
            }
        }
        Ok(value)
    }

    /// Advances to the next byte boundary if mid-byte. Restart markers are
    /// byte-aligned in the stream.
    pub fn align_to_byte(&mut self) {
        if self.bit != 0 {
            self.bit = 0;
            self.byte += 1;
        }
    }

    /// Steps over `count` whole bytes without inspecting them. Skipping
    /// past the end is not an error by itself; the next read reports the
    /// exhaustion.
    pub fn skip_bytes(&mut self, count: usize) {
        self.byte = self.byte.saturating_add(count);
    }
}
