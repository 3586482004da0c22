//! A baseline sequential JPEG decoder.
//!
//! Decodes SOF0 (baseline, 8-bit, Huffman-coded) JPEG files with one
//! grayscale component or three YCbCr components in 4:4:4, 4:2:2, 4:4:0 or
//! 4:2:0 subsampling, producing a packed BGRx raster. Embedded ICC
//! profiles split across APP2 segments are reassembled on request.
//!
//! ```no_run
//! let bytes = std::fs::read("image.jpg")?;
//! if seqjpeg::sniff(&bytes) {
//!     let raster = seqjpeg::decode(&bytes)?;
//!     println!("{}x{}", raster.width(), raster.height());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Anything outside the baseline sequential subset (progressive or
//! hierarchical frames, arithmetic coding, 12-bit precision, CMYK) is
//! rejected with [`ErrorKind::UnsupportedFeature`]; the application should
//! fall back to a more fully-featured decoder for those.

mod bits;
mod color;
mod error;
mod file;
mod huffman;
mod icc;
mod idct;
mod metadata;
mod quant;
mod scan;

#[cfg(test)]
mod tests;

use core::fmt;

use log::{debug, trace};

pub use crate::error::{Error, ErrorKind};
pub use crate::scan::ScanBuffer;

use crate::error::Result;
use crate::file::{markers, JpegParser, SegmentKind};
use crate::huffman::HuffmanTable;
use crate::icc::IccAssembler;
use crate::metadata::{Component, Context, FrameInfo, Macroblock, McuGrid};
use crate::quant::QTable;

/// Maximum accepted frame width and height. Frames exceeding this bound
/// in either axis fail with [`ErrorKind::TooLarge`] before any pixel
/// storage is allocated.
pub const MAX_DIMENSION: u16 = 16_384;

/// Returns whether `data` starts like a JPEG stream.
///
/// Only the first three bytes are inspected; short inputs return `false`.
#[inline]
pub fn sniff(data: &[u8]) -> bool {
    data.starts_with(&[0xFF, 0xD8, 0xFF])
}

/// Decodes a complete JPEG file into a BGRx raster.
pub fn decode(data: &[u8]) -> Result<Raster> {
    Decoder::new(data).decode()
}

/// Returns the file's embedded ICC profile, if it carries a complete one.
///
/// Only the header is parsed; the entropy-coded image data is not touched.
pub fn icc_data(data: &[u8]) -> Result<Option<Vec<u8>>> {
    let mut decoder = Decoder::new(data);
    decoder.parse_header()?;
    Ok(decoder.ctx.icc_data.take())
}

/// A decoded image: packed 8-bit BGRx pixels, 4 bytes per pixel in row
/// order, with the padding byte set to 0.
#[derive(Clone, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Raster {
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The pixel bytes, `width * height * 4` of them.
    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    #[inline]
    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }
}

impl fmt::Debug for Raster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Raster")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixels", &format_args!("[{} bytes]", self.pixels.len()))
            .finish()
    }
}

enum State {
    NotDecoded,
    HeaderDecoded,
    BitmapDecoded,
    Failed(Error),
}

/// A decode in progress.
///
/// The decoder moves forward only: header parsing, then the full pixel
/// decode. Any failure is sticky; later calls return the same error.
pub struct Decoder<'a> {
    data: &'a [u8],
    state: State,
    ctx: Context,
    /// Offset of the entropy-coded data, set when SOS is reached.
    scan_start: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            state: State::NotDecoded,
            ctx: Context::new(),
            scan_start: 0,
        }
    }

    /// Parses all header segments up to and including SOS. Does nothing
    /// if the header was parsed already.
    pub fn parse_header(&mut self) -> Result<()> {
        match self.state {
            State::Failed(err) => Err(err),
            State::NotDecoded => match self.parse_header_impl() {
                Ok(()) => {
                    self.state = State::HeaderDecoded;
                    Ok(())
                }
                Err(err) => {
                    self.state = State::Failed(err);
                    Err(err)
                }
            },
            State::HeaderDecoded | State::BitmapDecoded => Ok(()),
        }
    }

    /// The frame dimensions, available once the header has been parsed.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.ctx
            .frame
            .map(|frame| (frame.width.into(), frame.height.into()))
    }

    /// The reassembled ICC profile, if the header embeds a complete one.
    pub fn icc_data(&mut self) -> Result<Option<&[u8]>> {
        self.parse_header()?;
        Ok(self.ctx.icc_data.as_deref())
    }

    /// Runs the full decode pipeline and returns the raster.
    pub fn decode(&mut self) -> Result<Raster> {
        self.parse_header()?;
        match self.decode_impl() {
            Ok(raster) => {
                self.state = State::BitmapDecoded;
                Ok(raster)
            }
            Err(err) => {
                self.state = State::Failed(err);
                Err(err)
            }
        }
    }

    fn decode_impl(&mut self) -> Result<Raster> {
        let mut scan = ScanBuffer::new();
        scan.process(&self.data[self.scan_start..])?;

        let mut blocks = scan::decode_mcus(&self.ctx, scan.bytes())?;
        quant::dequantize(&self.ctx, &mut blocks);
        idct::inverse_dct(&self.ctx, &mut blocks);
        if self.ctx.components.len() == 1 {
            color::grayscale_to_rgb(&self.ctx, &mut blocks);
        } else {
            color::ycbcr_to_rgb(&self.ctx, &mut blocks);
        }
        self.compose_raster(&blocks)
    }

    fn parse_header_impl(&mut self) -> Result<()> {
        let mut parser = JpegParser::new(self.data)?;

        while let Some(segment) = parser.next_segment()? {
            trace!(
                "ff {:02x} segment at offset {:#x} ({} payload bytes)",
                segment.marker(),
                segment.offset(),
                segment.raw_bytes().len(),
            );

            match segment.marker() {
                markers::TEM | markers::RST0..=markers::SOI => {
                    return Err(Error::new(
                        ErrorKind::MalformedHeader,
                        "unexpected marker in header position",
                    ));
                }
                // Every frame type other than baseline sequential DCT.
                0xC0..=0xCF if !matches!(segment.marker(), markers::SOF0 | markers::DHT) => {
                    return Err(Error::new(
                        ErrorKind::UnsupportedFeature,
                        "unsupported frame type",
                    ));
                }
                _ => {}
            }

            match segment.kind {
                Some(SegmentKind::Sof(sof)) => self.handle_sof(&sof)?,
                Some(SegmentKind::Dqt(dqt)) => {
                    for table in dqt.tables() {
                        self.ctx.qtables[usize::from(table.id())] =
                            QTable::from_zigzag(table.values());
                    }
                }
                Some(SegmentKind::Dht(dht)) => {
                    for table in dht.tables() {
                        let built = HuffmanTable::build(table.Li(), table.Vij())?;
                        let store = if table.Tc() == 0 {
                            &mut self.ctx.dc_tables
                        } else {
                            &mut self.ctx.ac_tables
                        };
                        store[usize::from(table.Th())] = Some(built);
                    }
                }
                Some(SegmentKind::Dri(dri)) => self.ctx.restart_interval = dri.Ri(),
                Some(SegmentKind::App(app)) => self.handle_app(&app)?,
                Some(SegmentKind::Sos(sos)) => {
                    self.handle_sos(&sos)?;
                    self.scan_start = self.data.len() - parser.remaining().len();
                    return Ok(());
                }
                // A benign length-prefixed segment (COM, DHP, EXP, JFIF
                // and friends); the parser already skipped its payload.
                None => {}
            }
        }

        Err(Error::new(
            ErrorKind::MalformedHeader,
            "no scan data before EOI",
        ))
    }

    fn handle_sof(&mut self, sof: &file::Sof<'_>) -> Result<()> {
        if self.ctx.frame.is_some() {
            return Err(Error::new(
                ErrorKind::MalformedHeader,
                "repeated SOF segment",
            ));
        }
        if sof.P() != 8 {
            return Err(Error::new(
                ErrorKind::UnsupportedFeature,
                "sample precision is not 8 bits",
            ));
        }
        let (width, height) = (sof.X(), sof.Y());
        if width == 0 || height == 0 {
            return Err(Error::new(
                ErrorKind::MalformedHeader,
                "frame width or height is zero",
            ));
        }
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(Error::new(
                ErrorKind::TooLarge,
                "frame dimensions exceed the configured maximum",
            ));
        }
        if sof.components().len() != 1 && sof.components().len() != 3 {
            return Err(Error::new(
                ErrorKind::UnsupportedFeature,
                "unsupported number of components",
            ));
        }

        let mut grid = McuGrid::new(width, height);
        let mut components = Vec::with_capacity(sof.components().len());
        for (i, fc) in sof.components().iter().enumerate() {
            let (mut hsample, mut vsample) = (fc.Hi(), fc.Vi());
            if i == 0 {
                // A single-component scan is never interleaved; its
                // stored sampling factors are ignored.
                if sof.components().len() == 1 {
                    hsample = 1;
                    vsample = 1;
                }
                // Subsampling only ever applies to chroma, so the luma
                // component carries the image-wide maximum factors.
                if !matches!(hsample, 1 | 2) || !matches!(vsample, 1 | 2) {
                    return Err(Error::new(
                        ErrorKind::UnsupportedFeature,
                        "unsupported luma sampling factors",
                    ));
                }
                grid.pad_for_sampling(hsample, vsample);
                self.ctx.hsample = hsample;
                self.ctx.vsample = vsample;
            } else if hsample != 1 || vsample != 1 {
                return Err(Error::new(
                    ErrorKind::UnsupportedFeature,
                    "unsupported chroma sampling factors",
                ));
            }
            if fc.Tqi() > 1 {
                return Err(Error::new(
                    ErrorKind::TableError,
                    "invalid quantization table reference",
                ));
            }
            components.push(Component {
                id: fc.Ci(),
                hsample,
                vsample,
                dc_table: 0,
                ac_table: 0,
                qtable: fc.Tqi(),
            });
        }

        debug!(
            "{}x{} frame, {} component(s), {}x{} sampling, {}x{} blocks ({}x{} padded)",
            width,
            height,
            components.len(),
            self.ctx.hsample,
            self.ctx.vsample,
            grid.hcount,
            grid.vcount,
            grid.hpadded,
            grid.vpadded,
        );

        self.ctx.components = components;
        self.ctx.grid = grid;
        self.ctx.frame = Some(FrameInfo { width, height });
        Ok(())
    }

    fn handle_app(&mut self, app: &file::App<'_>) -> Result<()> {
        if app.n() != 2 || app.identifier() != b"ICC_PROFILE" {
            trace!("skipping {:?}", app);
            return Ok(());
        }

        let data = app.data();
        if data.len() <= 2 {
            return Err(Error::new(ErrorKind::IccError, "icc segment too small"));
        }
        let (sequence, count) = (data[0], data[1]);
        // The first chunk fixes the total chunk count.
        let assembler = match &mut self.ctx.icc {
            Some(assembler) => assembler,
            empty => empty.insert(IccAssembler::new(count)?),
        };
        assembler.add_chunk(sequence, count, &data[2..])?;
        if assembler.is_complete() {
            self.ctx.icc_data = Some(assembler.assemble());
        }
        Ok(())
    }

    fn handle_sos(&mut self, sos: &file::Sos<'_>) -> Result<()> {
        if self.ctx.frame.is_none() {
            return Err(Error::new(
                ErrorKind::MalformedHeader,
                "SOS before a frame header",
            ));
        }
        if sos.components().len() != self.ctx.components.len() {
            return Err(Error::new(
                ErrorKind::MalformedHeader,
                "scan component count differs from the frame",
            ));
        }
        for (spec, sc) in self.ctx.components.iter_mut().zip(sos.components()) {
            if sc.Csj() != spec.id {
                return Err(Error::new(
                    ErrorKind::MalformedHeader,
                    "scan components are not in frame order",
                ));
            }
            let (dc, ac) = (sc.Tdj(), sc.Taj());
            if dc > 1 || ac > 1 {
                return Err(Error::new(
                    ErrorKind::TableError,
                    "invalid entropy table reference",
                ));
            }
            if self.ctx.dc_tables[usize::from(dc)].is_none() {
                return Err(Error::new(ErrorKind::TableError, "dc table not defined"));
            }
            if self.ctx.ac_tables[usize::from(ac)].is_none() {
                return Err(Error::new(ErrorKind::TableError, "ac table not defined"));
            }
            spec.dc_table = dc;
            spec.ac_table = ac;
        }
        if sos.Ss() != 0 || sos.Se() != 63 || sos.AhAl() != 0 {
            return Err(Error::new(
                ErrorKind::UnsupportedFeature,
                "non-baseline scan header",
            ));
        }
        Ok(())
    }

    /// Copies the visible pixels out of the padded block matrix. The
    /// planes hold clamped R/G/B at this point; BGRx byte order.
    fn compose_raster(&self, blocks: &[Macroblock]) -> Result<Raster> {
        let frame = self.ctx.frame.ok_or_else(|| {
            Error::new(ErrorKind::MalformedHeader, "no frame header was decoded")
        })?;
        let (width, height) = (usize::from(frame.width), usize::from(frame.height));
        let hpadded = self.ctx.grid.hpadded as usize;

        let mut pixels = vec![0u8; width * height * 4];
        for y in 0..height {
            let block_row = y / 8;
            let pixel_row = y % 8;
            for x in 0..width {
                let block = &blocks[block_row * hpadded + x / 8];
                let pixel = pixel_row * 8 + x % 8;
                let out = (y * width + x) * 4;
                pixels[out] = block.cr[pixel] as u8;
                pixels[out + 1] = block.cb[pixel] as u8;
                pixels[out + 2] = block.y[pixel] as u8;
            }
        }

        Ok(Raster {
            width: width as u32,
            height: height as u32,
            pixels,
        })
    }
}
