//! Quantization tables and the dequantization pass.

use bytemuck::Zeroable;

use crate::metadata::{Context, Macroblock, UNZIGZAG};

/// A 64-entry quantization table in natural (row-major) order.
///
/// DQT stores entries in zigzag order; they are rearranged at load so the
/// dequantization multiply can index coefficients directly.
#[derive(Clone, Copy, Zeroable)]
pub(crate) struct QTable {
    pub values: [u16; 64],
}

impl QTable {
    pub fn from_zigzag(entries: &[u16; 64]) -> Self {
        let mut values = [0; 64];
        for (k, &value) in entries.iter().enumerate() {
            values[UNZIGZAG[k]] = value;
        }
        Self { values }
    }
}

/// Multiplies every coded coefficient by its table entry, in place.
pub(crate) fn dequantize(ctx: &Context, blocks: &mut [Macroblock]) {
    for (hcursor, vcursor) in ctx.mcu_origins() {
        for (i, component) in ctx.components.iter().enumerate() {
            let table = &ctx.qtables[usize::from(component.qtable)];
            for vf in 0..usize::from(component.vsample) {
                for hf in 0..usize::from(component.hsample) {
                    let index = ctx.subblock_index(hcursor, vcursor, hf, vf);
                    let plane = blocks[index].plane_mut(i);
                    for (coeff, &quant) in plane.iter_mut().zip(&table.values) {
                        *coeff *= i32::from(quant);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dezigzag_on_load() {
        let mut entries = [0u16; 64];
        entries[0] = 16; // DC stays at the corner
        entries[1] = 11; // first AC lands at (0,1)
        entries[2] = 12; // second AC lands at (1,0)
        entries[63] = 99;
        let table = QTable::from_zigzag(&entries);
        assert_eq!(table.values[0], 16);
        assert_eq!(table.values[1], 11);
        assert_eq!(table.values[8], 12);
        assert_eq!(table.values[63], 99);
    }

    #[test]
    fn multiplies_in_natural_order() {
        let mut ctx = Context::new();
        ctx.components.push(crate::metadata::Component {
            id: 1,
            hsample: 1,
            vsample: 1,
            dc_table: 0,
            ac_table: 0,
            qtable: 0,
        });
        ctx.grid = crate::metadata::McuGrid::new(8, 8);
        ctx.qtables[0] = QTable { values: [3; 64] };

        let mut blocks = vec![Macroblock::zeroed(); 1];
        for (k, coeff) in blocks[0].y.iter_mut().enumerate() {
            *coeff = k as i32;
        }
        dequantize(&ctx, &mut blocks);
        for (k, &coeff) in blocks[0].y.iter().enumerate() {
            assert_eq!(coeff, k as i32 * 3);
        }
    }
}
