//! Canonical Huffman tables for the entropy-coded scan.
//!
//! A DHT segment carries, for each code length 1-16, the number of codes
//! of that length, followed by the symbol values in canonical order. The
//! codes themselves are implied: starting from 0, each length's codes are
//! consecutive integers, shifted left once before moving to the next
//! length (Annex C of the JPEG standard).

use core::fmt;

use crate::bits::BitReader;
use crate::error::{Error, ErrorKind, Result};

pub(crate) struct HuffmanTable {
    counts: [u8; 16],
    symbols: Vec<u8>,
    /// One derived code per symbol, in the same order.
    codes: Vec<u16>,
}

impl HuffmanTable {
    /// Derives the canonical codes for the given per-length counts and
    /// symbol list.
    pub fn build(counts: &[u8; 16], symbols: &[u8]) -> Result<Self> {
        let total: usize = counts.iter().map(|&c| usize::from(c)).sum();
        if symbols.len() != total {
            return Err(Error::new(ErrorKind::TableError, "huffman table size mismatch"));
        }

        let mut codes = Vec::with_capacity(total);
        let mut code = 0u32;
        for (i, &count) in counts.iter().enumerate() {
            let bits = i as u32 + 1;
            for _ in 0..count {
                // More codes of some length than the code space has room
                // for would alias shorter codes.
                if code >= 1 << bits {
                    return Err(Error::new(
                        ErrorKind::TableError,
                        "huffman code counts overflow the code space",
                    ));
                }
                codes.push(code as u16);
                code += 1;
            }
            code <<= 1;
        }

        Ok(Self {
            counts: *counts,
            symbols: symbols.to_vec(),
            codes,
        })
    }

    /// Reads bits until they form a code of this table and returns the
    /// associated symbol.
    ///
    /// Codes are at most 16 bits; if no code matched by then the stream
    /// does not conform to this table.
    pub fn decode_symbol(&self, reader: &mut BitReader<'_>) -> Result<u8> {
        let mut code = 0u16;
        let mut cursor = 0;
        for &count in &self.counts {
            code = (code << 1) | reader.read_bits(1)? as u16;
            for _ in 0..count {
                if code == self.codes[cursor] {
                    return Ok(self.symbols[cursor]);
                }
                cursor += 1;
            }
        }
        Err(Error::new(
            ErrorKind::HuffmanError,
            "symbol not present in any code length",
        ))
    }
}

impl fmt::Debug for HuffmanTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut cursor = 0;
        for (i, &count) in self.counts.iter().enumerate() {
            let bits = i + 1;
            for _ in 0..count {
                if cursor != 0 {
                    writeln!(f)?;
                }
                write!(
                    f,
                    "{:01$b} -> {2:02x}",
                    self.codes[cursor], bits, self.symbols[cursor]
                )?;
                cursor += 1;
            }
        }
        Ok(())
    }
}
