//! Scaled inverse DCT over 8x8 coefficient blocks.
//!
//! The transform is the Arai-Agui-Nakajima factoring: the per-frequency
//! scale factors `cos(k*pi/16)/2` (and `1/sqrt(8)` for DC) are applied on
//! load, which reduces the remaining work to a small butterfly network
//! with five rotation constants. One 1-D pass runs over the columns, a
//! second over the rows; results are truncated to `i32` after each pass.

use crate::metadata::{Context, Macroblock};

// Rotation constants, 2·cos(k·π/8).
const M0: f32 = 1.847_759_065_022_573_5;
const M1: f32 = 1.414_213_562_373_095_1;
const M3: f32 = M1;
const M5: f32 = 0.765_366_864_730_179_6;
const M2: f32 = M0 - M5;
const M4: f32 = M0 + M5;

// Pre-scale factors, cos(k·π/16)/2 with the DC term folded to 1/√8.
const S0: f32 = 0.353_553_390_593_273_73;
const S1: f32 = 0.490_392_640_201_615_2;
const S2: f32 = 0.461_939_766_255_643_37;
const S3: f32 = 0.415_734_806_151_272_6;
const S4: f32 = 0.353_553_390_593_273_8;
const S5: f32 = 0.277_785_116_509_801_1;
const S6: f32 = 0.191_341_716_182_544_9;
const S7: f32 = 0.097_545_161_008_064_13;

/// One 1-D pass. The input is already pre-scaled and permuted into
/// butterfly order (0, 4, 2, 6, 5, 1, 7, 3).
#[inline]
fn butterfly([g0, g1, g2, g3, g4, g5, g6, g7]: [f32; 8]) -> [f32; 8] {
    let f4 = g4 - g7;
    let f5 = g5 + g6;
    let f6 = g5 - g6;
    let f7 = g4 + g7;

    let e2 = g2 - g3;
    let e3 = g2 + g3;
    let e5 = f5 - f7;
    let e7 = f5 + f7;
    let e8 = f4 + f6;

    let d2 = e2 * M1;
    let d4 = f4 * M2;
    let d5 = e5 * M3;
    let d6 = f6 * M4;
    let d8 = e8 * M5;

    let c0 = g0 + g1;
    let c1 = g0 - g1;
    let c2 = d2 - e3;
    let c4 = d4 + d8;
    let c5 = d5 + e7;
    let c6 = d6 - d8;
    let c8 = c5 - c6;

    let b0 = c0 + e3;
    let b1 = c1 + c2;
    let b2 = c1 - c2;
    let b3 = c0 - e3;
    let b4 = c4 - c8;
    let b6 = c6 - e7;

    [
        b0 + e7,
        b1 + b6,
        b2 + c8,
        b3 + b4,
        b3 - b4,
        b2 - c8,
        b1 - b6,
        b0 - e7,
    ]
}

pub(crate) fn idct_block(plane: &mut [i32; 64]) {
    for col in 0..8 {
        let out = butterfly([
            plane[col] as f32 * S0,
            plane[4 * 8 + col] as f32 * S4,
            plane[2 * 8 + col] as f32 * S2,
            plane[6 * 8 + col] as f32 * S6,
            plane[5 * 8 + col] as f32 * S5,
            plane[8 + col] as f32 * S1,
            plane[7 * 8 + col] as f32 * S7,
            plane[3 * 8 + col] as f32 * S3,
        ]);
        for (row, value) in out.into_iter().enumerate() {
            plane[row * 8 + col] = value as i32;
        }
    }
    for row in 0..8 {
        let base = row * 8;
        let out = butterfly([
            plane[base] as f32 * S0,
            plane[base + 4] as f32 * S4,
            plane[base + 2] as f32 * S2,
            plane[base + 6] as f32 * S6,
            plane[base + 5] as f32 * S5,
            plane[base + 1] as f32 * S1,
            plane[base + 7] as f32 * S7,
            plane[base + 3] as f32 * S3,
        ]);
        for (col, value) in out.into_iter().enumerate() {
            plane[base + col] = value as i32;
        }
    }
}

/// Runs the IDCT over every coded block of every component.
pub(crate) fn inverse_dct(ctx: &Context, blocks: &mut [Macroblock]) {
    for (hcursor, vcursor) in ctx.mcu_origins() {
        for (i, component) in ctx.components.iter().enumerate() {
            for vf in 0..usize::from(component.vsample) {
                for hf in 0..usize::from(component.hsample) {
                    let index = ctx.subblock_index(hcursor, vcursor, hf, vf);
                    idct_block(blocks[index].plane_mut(i));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_block_stays_zero() {
        let mut plane = [0; 64];
        idct_block(&mut plane);
        assert_eq!(plane, [0; 64]);
    }

    #[test]
    fn dc_only_block_is_flat() {
        // A pure DC coefficient spreads evenly over all 64 samples:
        // each pass scales by 1/sqrt(8) (with truncation in between).
        let mut plane = [0; 64];
        plane[0] = -416;
        idct_block(&mut plane);
        assert_eq!(plane, [-51; 64]);

        let mut plane = [0; 64];
        plane[0] = 1024;
        idct_block(&mut plane);
        assert_eq!(plane, [127; 64]);
    }
}
