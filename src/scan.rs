//! Entropy-coded stream extraction and MCU decoding.
//!
//! Between the SOS header and EOI, the scan bytes contain `0xFF 0x00`
//! stuffing sequences, optional `0xFF` fill bytes, and byte-aligned `RSTn`
//! restart markers. [`ScanBuffer`] unstuffs all of that into a contiguous
//! byte stream, keeping the restart markers in place as two-byte sentinels.
//! The MCU decoder then walks that stream bit by bit, recovering the
//! differential DC and run-length-coded AC coefficients of every block.

use bytemuck::Zeroable;
use log::debug;

use crate::bits::BitReader;
use crate::error::{Error, ErrorKind, Result};
use crate::huffman::HuffmanTable;
use crate::metadata::{Context, Macroblock, UNZIGZAG};

/// Holds the unstuffed entropy-coded byte stream of one scan.
pub struct ScanBuffer {
    bytes: Vec<u8>,
}

impl ScanBuffer {
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Consumes entropy-coded bytes up to and including the EOI marker.
    ///
    /// Anything after EOI is ignored (with a warning); running out of
    /// bytes before EOI is an error.
    pub fn process(&mut self, data: &[u8]) -> Result<()> {
        self.bytes.clear();
        self.bytes.reserve(data.len());

        let mut pos = 0;
        loop {
            let byte = scan_byte(data, pos)?;
            if byte != 0xFF {
                self.bytes.push(byte);
                pos += 1;
                continue;
            }
            match scan_byte(data, pos + 1)? {
                // Byte stuffing sequence; only the 0xFF is data.
                0x00 => {
                    self.bytes.push(0xFF);
                    pos += 2;
                }
                // Fill byte before a marker.
                0xFF => pos += 1,
                // Restart markers stay in the stream; the MCU decoder
                // steps over them at the restart boundaries.
                rst @ 0xD0..=0xD7 => {
                    self.bytes.push(0xFF);
                    self.bytes.push(rst);
                    pos += 2;
                }
                0xD9 => {
                    let trailing = data.len() - pos - 2;
                    if trailing > 0 {
                        log::warn!("ignoring {} trailing bytes after EOI", trailing);
                    }
                    return Ok(());
                }
                _ => {
                    return Err(Error::new(
                        ErrorKind::StreamError,
                        "invalid marker in entropy-coded data",
                    ))
                }
            }
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Default for ScanBuffer {
    fn default() -> Self {
        Self::new()
    }
}

fn scan_byte(data: &[u8], pos: usize) -> Result<u8> {
    data.get(pos).copied().ok_or_else(|| {
        Error::new(ErrorKind::StreamError, "entropy-coded data ends without EOI")
    })
}

/// Decodes every MCU of the scan into a freshly allocated padded
/// macroblock matrix.
pub(crate) fn decode_mcus(ctx: &Context, scan: &[u8]) -> Result<Vec<Macroblock>> {
    debug!(
        "decoding {}x{} blocks ({}x{} padded) from {} scan bytes",
        ctx.grid.hcount,
        ctx.grid.vcount,
        ctx.grid.hpadded,
        ctx.grid.vpadded,
        scan.len(),
    );

    let mut blocks = vec![Macroblock::zeroed(); ctx.grid.padded_total as usize];
    let mut reader = BitReader::new(scan);
    let mut prev_dc = [0i32; 3];
    let restart_interval = usize::from(ctx.restart_interval);

    for (mcu, (hcursor, vcursor)) in ctx.mcu_origins().enumerate() {
        if restart_interval > 0 && mcu > 0 && mcu % restart_interval == 0 {
            // DC prediction restarts, and the stream re-aligns to the
            // byte boundary where the extractor kept the RSTn marker.
            prev_dc = [0; 3];
            reader.align_to_byte();
            reader.skip_bytes(2);
        }
        decode_mcu(ctx, &mut reader, &mut prev_dc, &mut blocks, hcursor, vcursor)?;
    }

    Ok(blocks)
}

/// Decodes one MCU: the luma subblocks in raster order, then one block
/// per chroma component.
fn decode_mcu(
    ctx: &Context,
    reader: &mut BitReader<'_>,
    prev_dc: &mut [i32; 3],
    blocks: &mut [Macroblock],
    hcursor: usize,
    vcursor: usize,
) -> Result<()> {
    for (i, component) in ctx.components.iter().enumerate() {
        let dc_table = ctx.dc_tables[usize::from(component.dc_table)]
            .as_ref()
            .ok_or_else(|| Error::new(ErrorKind::TableError, "dc table not defined"))?;
        let ac_table = ctx.ac_tables[usize::from(component.ac_table)]
            .as_ref()
            .ok_or_else(|| Error::new(ErrorKind::TableError, "ac table not defined"))?;

        for vf in 0..usize::from(component.vsample) {
            for hf in 0..usize::from(component.hsample) {
                let index = ctx.subblock_index(hcursor, vcursor, hf, vf);
                decode_block(
                    reader,
                    dc_table,
                    ac_table,
                    &mut prev_dc[i],
                    blocks[index].plane_mut(i),
                )?;
            }
        }
    }
    Ok(())
}

fn decode_block(
    reader: &mut BitReader<'_>,
    dc_table: &HuffmanTable,
    ac_table: &HuffmanTable,
    prev_dc: &mut i32,
    plane: &mut [i32; 64],
) -> Result<()> {
    // The DC symbol is the bit length of the difference to the previous
    // DC value of the same component.
    let length = dc_table.decode_symbol(reader)?;
    if length > 11 {
        return Err(Error::new(
            ErrorKind::HuffmanError,
            "dc coefficient length out of range",
        ));
    }
    *prev_dc += extend_sign(reader.read_bits(usize::from(length))?, length);
    plane[0] = *prev_dc;

    // AC symbols pack a zero-run count (high nibble) and the coefficient
    // bit length (low nibble).
    let mut k = 1;
    while k < 64 {
        let symbol = ac_table.decode_symbol(reader)?;
        if symbol == 0x00 {
            break; // end of block, the remainder stays zero
        }
        if symbol == 0xF0 {
            k += 16;
            continue;
        }
        let length = symbol & 0x0F;
        if length > 10 {
            return Err(Error::new(
                ErrorKind::HuffmanError,
                "ac coefficient length out of range",
            ));
        }
        k += usize::from(symbol >> 4);
        if k >= 64 {
            return Err(Error::new(
                ErrorKind::StreamError,
                "run-length overruns the block",
            ));
        }
        plane[UNZIGZAG[k]] = extend_sign(reader.read_bits(usize::from(length))?, length);
        k += 1;
    }
    Ok(())
}

/// Recovers the signed coefficient from its magnitude bits: a clear
/// leading bit encodes a negative value offset by `2^length - 1`.
fn extend_sign(raw: usize, length: u8) -> i32 {
    if length == 0 {
        return 0;
    }
    let raw = raw as i32;
    if raw < 1 << (length - 1) {
        raw - ((1 << length) - 1)
    } else {
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Component;

    fn check(scan_data: &[u8], expected: &[u8]) {
        let mut buf = ScanBuffer::new();
        buf.process(scan_data).unwrap();
        assert_eq!(buf.bytes(), expected);
    }

    #[test]
    fn process_scan_data() {
        check(&[0x12, 0x34, 0xFF, 0xD9], &[0x12, 0x34]);
        check(&[0xFF, 0x00, 0x44, 0xFF, 0xD9], &[0xFF, 0x44]);
        check(&[0xFF, 0xFF, 0xFF, 0xD9], &[]);
        check(
            &[0xAA, 0xFF, 0xD3, 0xBB, 0xFF, 0xD9],
            &[0xAA, 0xFF, 0xD3, 0xBB],
        );
        // Trailing bytes after EOI are ignored.
        check(&[0x01, 0xFF, 0xD9, 0x77, 0x88], &[0x01]);
    }

    #[test]
    fn process_errors() {
        let mut buf = ScanBuffer::new();
        // A non-restart marker cannot appear inside the scan.
        let err = buf.process(&[0x12, 0xFF, 0xC0, 0xFF, 0xD9]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StreamError);
        // Data that never reaches EOI is truncated.
        let err = buf.process(&[0x12, 0x34]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StreamError);
        let err = buf.process(&[0x12, 0xFF]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StreamError);
    }

    #[test]
    fn sign_extension() {
        assert_eq!(extend_sign(0, 0), 0);
        assert_eq!(extend_sign(1, 1), 1);
        assert_eq!(extend_sign(0, 1), -1);
        assert_eq!(extend_sign(0b111, 3), 7);
        assert_eq!(extend_sign(0b011, 3), -4);
        assert_eq!(extend_sign(95, 9), -416);
        assert_eq!(extend_sign(0b100000000, 9), 256);
    }

    /// Packs (value, bit-count) groups MSB-first, padding the final byte
    /// with 1-bits like an encoder would.
    fn pack_bits(groups: &[(u16, u8)]) -> Vec<u8> {
        let mut bytes = Vec::new();
        let mut acc = 0u8;
        let mut filled = 0u8;
        for &(value, count) in groups {
            for bit in (0..count).rev() {
                acc = (acc << 1) | ((value >> bit) & 1) as u8;
                filled += 1;
                if filled == 8 {
                    bytes.push(acc);
                    acc = 0;
                    filled = 0;
                }
            }
        }
        if filled > 0 {
            bytes.push((acc << (8 - filled)) | ((1 << (8 - filled)) - 1));
        }
        bytes
    }

    fn gray_context(width: u16, height: u16, restart_interval: u16) -> Context {
        let mut ctx = Context::new();
        ctx.components.push(Component {
            id: 1,
            hsample: 1,
            vsample: 1,
            dc_table: 0,
            ac_table: 0,
            qtable: 0,
        });
        ctx.grid = crate::metadata::McuGrid::new(width, height);
        ctx.restart_interval = restart_interval;
        ctx
    }

    fn table(counts: [u8; 16], symbols: &[u8]) -> HuffmanTable {
        HuffmanTable::build(&counts, symbols).unwrap()
    }

    #[test]
    fn dc_prediction_accumulates() {
        let mut ctx = gray_context(16, 8, 0);
        // `00` -> length 2, `01` -> length 0.
        let mut counts = [0; 16];
        counts[1] = 2;
        ctx.dc_tables[0] = Some(table(counts, &[2, 0]));
        let mut ac_counts = [0; 16];
        ac_counts[0] = 1;
        ctx.ac_tables[0] = Some(table(ac_counts, &[0x00]));

        // Block 0: diff +3; block 1: diff 0. The second DC must be the
        // running sum, not the raw difference.
        let scan = pack_bits(&[
            (0b00, 2),
            (0b11, 2),
            (0b0, 1), // end of block
            (0b01, 2),
            (0b0, 1),
        ]);
        let blocks = decode_mcus(&ctx, &scan).unwrap();
        assert_eq!(blocks[0].y[0], 3);
        assert_eq!(blocks[1].y[0], 3);
    }

    #[test]
    fn restart_resets_dc_prediction() {
        let mut ctx = gray_context(16, 8, 1);
        let mut counts = [0; 16];
        counts[1] = 2;
        ctx.dc_tables[0] = Some(table(counts, &[2, 0]));
        let mut ac_counts = [0; 16];
        ac_counts[0] = 1;
        ctx.ac_tables[0] = Some(table(ac_counts, &[0x00]));

        let mcu = pack_bits(&[(0b00, 2), (0b11, 2), (0b0, 1)]);
        let mut scan = mcu.clone();
        scan.extend_from_slice(&[0xFF, 0xD0]);
        scan.extend_from_slice(&mcu);

        let blocks = decode_mcus(&ctx, &scan).unwrap();
        // Without the predictor reset the second block would be 6.
        assert_eq!(blocks[0].y[0], 3);
        assert_eq!(blocks[1].y[0], 3);

        // Dropping the restart marker leaves the reader past the end of
        // the data after the sentinel skip.
        let mut scan = mcu.clone();
        scan.extend_from_slice(&mcu);
        let err = decode_mcus(&ctx, &scan).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StreamError);
    }

    #[test]
    fn zero_run_to_block_end() {
        let mut ctx = gray_context(8, 8, 0);
        let mut dc_counts = [0; 16];
        dc_counts[0] = 1;
        ctx.dc_tables[0] = Some(table(dc_counts, &[0]));
        // `00` -> end of block, `01` -> run 14/length 1, `10` -> ZRL.
        let mut ac_counts = [0; 16];
        ac_counts[1] = 3;
        ctx.ac_tables[0] = Some(table(ac_counts, &[0x00, 0xE1, 0xF0]));

        // DC 0, one coefficient at k = 15, then three ZRLs: 16 + 16 + 16
        // lands exactly on k = 64, ending the block without an EOB.
        let scan = pack_bits(&[
            (0b0, 1),
            (0b01, 2),
            (0b1, 1),
            (0b10, 2),
            (0b10, 2),
            (0b10, 2),
        ]);
        let blocks = decode_mcus(&ctx, &scan).unwrap();
        assert_eq!(blocks[0].y[UNZIGZAG[15]], 1);
        assert_eq!(blocks[0].y.iter().filter(|&&c| c != 0).count(), 1);
    }

    #[test]
    fn zero_run_overrun_is_rejected() {
        let mut ctx = gray_context(8, 8, 0);
        let mut dc_counts = [0; 16];
        dc_counts[0] = 1;
        ctx.dc_tables[0] = Some(table(dc_counts, &[0]));
        // `0` -> run 15/length 1.
        let mut ac_counts = [0; 16];
        ac_counts[0] = 1;
        ctx.ac_tables[0] = Some(table(ac_counts, &[0xF1]));

        // k reaches 49 after three coefficients; one more run of 15 hits
        // 64 with a coefficient still to write.
        let scan = pack_bits(&[
            (0b0, 1), // DC
            (0b0, 1),
            (0b1, 1),
            (0b0, 1),
            (0b1, 1),
            (0b0, 1),
            (0b1, 1),
            (0b0, 1),
        ]);
        let err = decode_mcus(&ctx, &scan).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StreamError);
    }
}
