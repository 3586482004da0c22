//! Chroma upsampling and YCbCr to RGB conversion.
//!
//! Conversion rewrites the macroblock planes in place: after this pass the
//! `y`/`cb`/`cr` arrays hold R/G/B samples. The chroma source for a luma
//! pixel (i, j) in subblock (hf, vf) is pixel
//! `(i/vsample + 4*vf, j/hsample + 4*hf)` of the MCU's chroma block, which
//! replicates each chroma sample over the luma pixels it covers.

use crate::metadata::{Context, Macroblock};

#[inline]
fn clamp_channel(value: f32) -> i32 {
    (value as i32).clamp(0, 255)
}

/// Converts every pixel of a three-component image, BT.601 with the +128
/// bias re-applied. Channel math runs in f32 and truncates toward zero.
pub(crate) fn ycbcr_to_rgb(ctx: &Context, blocks: &mut [Macroblock]) {
    let (hsample, vsample) = (usize::from(ctx.hsample), usize::from(ctx.vsample));
    for (hcursor, vcursor) in ctx.mcu_origins() {
        // The chroma carrier doubles as the first luma block, so read from
        // a copy while the blocks are rewritten.
        let chroma = blocks[ctx.subblock_index(hcursor, vcursor, 0, 0)];
        for vf in 0..vsample {
            for hf in 0..hsample {
                let block = &mut blocks[ctx.subblock_index(hcursor, vcursor, hf, vf)];
                for i in 0..8 {
                    for j in 0..8 {
                        let pixel = i * 8 + j;
                        let chroma_pixel = (i / vsample + 4 * vf) * 8 + (j / hsample + 4 * hf);
                        let y = block.y[pixel] as f32;
                        let cb = chroma.cb[chroma_pixel] as f32;
                        let cr = chroma.cr[chroma_pixel] as f32;
                        block.y[pixel] = clamp_channel(y + 1.402 * cr + 128.0);
                        block.cb[pixel] = clamp_channel(y - 0.344 * cb - 0.714 * cr + 128.0);
                        block.cr[pixel] = clamp_channel(y + 1.772 * cb + 128.0);
                    }
                }
            }
        }
    }
}

/// Expands a single-component image to neutral gray, `R = G = B =
/// clamp(Y + 128)`.
pub(crate) fn grayscale_to_rgb(ctx: &Context, blocks: &mut [Macroblock]) {
    for (hcursor, vcursor) in ctx.mcu_origins() {
        let block = &mut blocks[ctx.subblock_index(hcursor, vcursor, 0, 0)];
        for pixel in 0..64 {
            let value = (block.y[pixel] + 128).clamp(0, 255);
            block.y[pixel] = value;
            block.cb[pixel] = value;
            block.cr[pixel] = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use bytemuck::Zeroable;

    use super::*;
    use crate::metadata::{Component, McuGrid};

    fn context(width: u16, height: u16, hsample: u8, vsample: u8) -> Context {
        let mut ctx = Context::new();
        for id in 1..=3 {
            ctx.components.push(Component {
                id,
                hsample: if id == 1 { hsample } else { 1 },
                vsample: if id == 1 { vsample } else { 1 },
                dc_table: 0,
                ac_table: 0,
                qtable: 0,
            });
        }
        ctx.hsample = hsample;
        ctx.vsample = vsample;
        ctx.grid = McuGrid::new(width, height);
        ctx.grid.pad_for_sampling(hsample, vsample);
        ctx
    }

    #[test]
    fn full_resolution_chroma() {
        let ctx = context(8, 8, 1, 1);
        let mut blocks = vec![Macroblock::zeroed(); 1];
        blocks[0].y = [-51; 64];
        blocks[0].cb = [-42; 64];
        blocks[0].cr = [127; 64];

        ycbcr_to_rgb(&ctx, &mut blocks);

        // Red within truncation of the f32 schedule.
        assert_eq!(blocks[0].y, [255; 64]);
        assert_eq!(blocks[0].cb, [0; 64]);
        assert_eq!(blocks[0].cr, [2; 64]);
    }

    #[test]
    fn subsampled_chroma_replication() {
        let ctx = context(16, 16, 2, 2);
        let mut blocks = vec![Macroblock::zeroed(); 4];
        // One hot chroma sample at (4, 4) of the carrier block; it covers
        // luma pixels (0..2, 0..2) of the bottom-right subblock.
        blocks[0].cr[4 * 8 + 4] = 50;

        ycbcr_to_rgb(&ctx, &mut blocks);

        let bottom_right = &blocks[3];
        assert_eq!(bottom_right.y[0], 198); // (0,0): 1.402*50 + 128
        assert_eq!(bottom_right.y[1], 198); // (0,1) shares the sample
        assert_eq!(bottom_right.y[8 + 1], 198); // (1,1)
        assert_eq!(bottom_right.y[2 * 8 + 2], 128); // (2,2) reads (5,5) = 0
        assert_eq!(blocks[0].y[0], 128); // other subblocks see zero chroma
    }

    #[test]
    fn grayscale_expansion() {
        let mut ctx = context(8, 8, 1, 1);
        ctx.components.truncate(1);
        let mut blocks = vec![Macroblock::zeroed(); 1];
        blocks[0].y[0] = -200;
        blocks[0].y[1] = 9;
        blocks[0].y[2] = 400;

        grayscale_to_rgb(&ctx, &mut blocks);

        assert_eq!(blocks[0].y[0], 0);
        assert_eq!(blocks[0].y[1], 137);
        assert_eq!(blocks[0].y[2], 255);
        assert_eq!(blocks[0].cb[1], 137);
        assert_eq!(blocks[0].cr[1], 137);
    }
}
