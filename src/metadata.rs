//! Per-image decoder state: frame parameters, component descriptors,
//! macroblock geometry, and the table stores filled in by the header pass.

use bytemuck::Zeroable;

use crate::huffman::HuffmanTable;
use crate::icc::IccAssembler;
use crate::quant::QTable;

/// Maps zigzag positions to natural (row-major) positions of an 8x8 block.
#[rustfmt::skip]
pub(crate) const UNZIGZAG: [usize; 64] = [
     0,  1,  8, 16,  9,  2,  3, 10,
    17, 24, 32, 25, 18, 11,  4,  5,
    12, 19, 26, 33, 40, 48, 41, 34,
    27, 20, 13,  6,  7, 14, 21, 28,
    35, 42, 49, 56, 57, 50, 43, 36,
    29, 22, 15, 23, 30, 37, 44, 51,
    58, 59, 52, 45, 38, 31, 39, 46,
    53, 60, 61, 54, 47, 55, 62, 63,
];

#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameInfo {
    pub width: u16,
    pub height: u16,
}

/// One frame component as declared by SOF0, with the entropy table
/// selectors filled in later by SOS.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Component {
    pub id: u8,
    pub hsample: u8,
    pub vsample: u8,
    pub dc_table: u8,
    pub ac_table: u8,
    pub qtable: u8,
}

/// Macroblock counts derived from the frame dimensions.
///
/// `hpadded`/`vpadded` round the block counts up to a multiple of the luma
/// sampling factors, so that a partial trailing MCU still owns a full set
/// of blocks.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct McuGrid {
    pub hcount: u32,
    pub vcount: u32,
    pub hpadded: u32,
    pub vpadded: u32,
    pub padded_total: u32,
}

impl McuGrid {
    pub fn new(width: u16, height: u16) -> Self {
        let hcount = (u32::from(width) + 7) / 8;
        let vcount = (u32::from(height) + 7) / 8;
        Self {
            hcount,
            vcount,
            hpadded: hcount,
            vpadded: vcount,
            padded_total: hcount * vcount,
        }
    }

    /// Extends the padded counts to a multiple of the luma sampling
    /// factors (each 1 or 2).
    pub fn pad_for_sampling(&mut self, hsample: u8, vsample: u8) {
        if hsample == 2 {
            self.hpadded += self.hcount % 2;
        }
        if vsample == 2 {
            self.vpadded += self.vcount % 2;
        }
        self.padded_total = self.hpadded * self.vpadded;
    }
}

/// An 8x8 block of all three component planes.
///
/// The planes hold Y/Cb/Cr coefficients through entropy decode,
/// dequantization and the IDCT; the color conversion pass rewrites them in
/// place with R/G/B samples, which is what the raster copy reads.
#[derive(Clone, Copy, Debug, Zeroable)]
pub(crate) struct Macroblock {
    pub y: [i32; 64],
    pub cb: [i32; 64],
    pub cr: [i32; 64],
}

impl Macroblock {
    #[inline]
    pub fn plane_mut(&mut self, component: usize) -> &mut [i32; 64] {
        match component {
            0 => &mut self.y,
            1 => &mut self.cb,
            _ => &mut self.cr,
        }
    }
}

/// All state accumulated while decoding a single image.
///
/// Filled in linearly: the header pass populates tables and frame
/// parameters, the scan and post-processing passes consume them.
pub(crate) struct Context {
    pub frame: Option<FrameInfo>,
    pub components: Vec<Component>,
    /// Image-wide (luma) sampling factors.
    pub hsample: u8,
    pub vsample: u8,
    pub grid: McuGrid,
    /// Never-defined tables stay all-zero, matching how absent tables
    /// behave during dequantization.
    pub qtables: [QTable; 2],
    pub dc_tables: [Option<HuffmanTable>; 2],
    pub ac_tables: [Option<HuffmanTable>; 2],
    /// MCUs per restart interval, 0 when restarts are disabled.
    pub restart_interval: u16,
    pub icc: Option<IccAssembler>,
    pub icc_data: Option<Vec<u8>>,
}

impl Context {
    /// Iterates the origins of all macro-MCUs in raster order, in units of
    /// luma blocks.
    pub fn mcu_origins(&self) -> impl Iterator<Item = (usize, usize)> {
        let (hcount, vcount) = (self.grid.hcount as usize, self.grid.vcount as usize);
        let (hsample, vsample) = (usize::from(self.hsample), usize::from(self.vsample));
        (0..vcount)
            .step_by(vsample)
            .flat_map(move |v| (0..hcount).step_by(hsample).map(move |h| (h, v)))
    }

    /// Macroblock index of subblock (`hf`, `vf`) of the MCU at
    /// (`hcursor`, `vcursor`).
    pub fn subblock_index(&self, hcursor: usize, vcursor: usize, hf: usize, vf: usize) -> usize {
        (vcursor + vf) * self.grid.hpadded as usize + hcursor + hf
    }

    pub fn new() -> Self {
        Self {
            frame: None,
            components: Vec::new(),
            hsample: 1,
            vsample: 1,
            grid: McuGrid::default(),
            qtables: [QTable::zeroed(); 2],
            dc_tables: [None, None],
            ac_tables: [None, None],
            restart_interval: 0,
            icc: None,
            icc_data: None,
        }
    }
}
