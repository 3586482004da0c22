//! JPEG/JFIF marker segment parser.
//!
//! This layer is purely syntactic: it walks the marker structure and
//! decodes segment payloads into typed records, using the parameter names
//! of the JPEG standard (Annex B). Semantic validation (precision, bounds,
//! sampling rules, table presence) happens in the decoder driver.

#![allow(non_snake_case)]


use std::fmt;

use bytemuck::AnyBitPattern;

use crate::error::{Error, ErrorKind, Result};

pub(crate) mod markers {
    pub const TEM: u8 = 0x01;
    pub const SOF0: u8 = 0xC0;
    pub const DHT: u8 = 0xC4;
    pub const SOI: u8 = 0xD8;
    pub const EOI: u8 = 0xD9;
    pub const SOS: u8 = 0xDA;
    pub const DQT: u8 = 0xDB;
    pub const DRI: u8 = 0xDD;
    pub const RST0: u8 = 0xD0;
}

pub(crate) struct JpegParser<'a> {
    reader: Reader<'a>,
}

impl<'a> JpegParser<'a> {
    pub fn new(buf: &'a [u8]) -> Result<Self> {
        let mut reader = Reader { buf, position: 0 };
        let soi = reader.read_u8().ok() == Some(0xFF)
            && reader.read_u8().ok() == Some(markers::SOI);
        if !soi {
            return Err(Error::new(
                ErrorKind::MalformedHeader,
                "image does not start with an SOI marker",
            ));
        }
        Ok(Self { reader })
    }

    /// Reads the next [`Segment`] from the JPEG data.
    ///
    /// `SOI` is consumed by [`JpegParser::new`] and `EOI` ends the
    /// iteration with `Ok(None)`; neither is returned as a segment. There
    /// may be data after the EOI marker, retrievable via
    /// [`JpegParser::remaining`].
    pub fn next_segment(&mut self) -> Result<Option<Segment<'a>>> {
        let segment_offset = self.reader.position;
        let marker = self.read_marker()?;

        if marker == markers::EOI {
            if !self.reader.remaining().is_empty() {
                log::warn!(
                    "ignoring {} trailing bytes after EOI",
                    self.reader.remaining().len()
                );
            }
            return Ok(None);
        }

        // Standalone markers carry no length word. They are never valid
        // between header segments; returning them untyped lets the driver
        // reject them by marker value.
        if marker == markers::TEM || (markers::RST0..=markers::SOI).contains(&marker) {
            return Ok(Some(Segment {
                marker,
                raw_bytes: &[],
                offset: segment_offset,
                kind: None,
            }));
        }

        let length = usize::from(self.reader.read_length()?);
        let expected_end = self.reader.position + length;
        let mut reader = Reader {
            buf: &self.reader.buf[..expected_end],
            position: self.reader.position,
        };
        let raw_bytes = reader.remaining();

        let kind = match marker {
            markers::DQT => Some(SegmentKind::Dqt(self.read_dqt(&mut reader)?)),
            markers::DHT => Some(SegmentKind::Dht(self.read_dht(&mut reader)?)),
            markers::SOF0 => Some(SegmentKind::Sof(self.read_sof(&mut reader)?)),
            markers::SOS => Some(SegmentKind::Sos(self.read_sos(&mut reader)?)),
            markers::DRI => Some(SegmentKind::Dri(self.read_dri(&mut reader)?)),
            0xE0..=0xEF => Some(SegmentKind::App(self.read_app(marker, &mut reader)?)),
            // COM, DHP, EXP, other SOFn, reserved markers: the payload is
            // skipped here; the driver decides whether the marker itself
            // is acceptable.
            _ => None,
        };

        if reader.position < expected_end && kind.is_some() {
            log::warn!(
                "ff {:02x} segment specified a length of {} bytes, but {} remain after decoding",
                marker,
                length,
                expected_end - reader.position,
            );
        }
        self.reader.position = expected_end;

        Ok(Some(Segment {
            marker,
            raw_bytes,
            offset: segment_offset,
            kind,
        }))
    }

    /// Returns the unparsed bytes following the last returned segment.
    /// After an SOS segment this is the entropy-coded scan data.
    pub fn remaining(&self) -> &'a [u8] {
        self.reader.remaining()
    }

    /// Reads a two-byte marker word, skipping any 0xFF fill bytes in
    /// front of the marker code.
    fn read_marker(&mut self) -> Result<u8> {
        if self.reader.read_u8()? != 0xFF {
            return Err(Error::new(
                ErrorKind::MalformedHeader,
                "expected a marker between segments",
            ));
        }
        loop {
            match self.reader.read_u8()? {
                0xFF => continue,
                0x00 => {
                    return Err(Error::new(
                        ErrorKind::MalformedHeader,
                        "stuffed byte in marker position",
                    ))
                }
                marker => return Ok(marker),
            }
        }
    }

    fn read_dqt(&mut self, reader: &mut Reader<'a>) -> Result<Dqt> {
        let mut tables = Vec::new();
        while !reader.remaining().is_empty() {
            let info = reader.read_u8()?;
            let wide = match info >> 4 {
                0 => false,
                1 => true,
                _ => {
                    return Err(Error::new(
                        ErrorKind::TableError,
                        "invalid quantization table element width",
                    ))
                }
            };
            let id = info & 0xF;
            if id > 1 {
                return Err(Error::new(
                    ErrorKind::TableError,
                    "invalid quantization table destination",
                ));
            }
            if reader.remaining().len() < if wide { 128 } else { 64 } {
                return Err(Error::new(
                    ErrorKind::TableError,
                    "quantization table size mismatch",
                ));
            }
            // Values stay in zigzag order here; the driver rearranges
            // them into natural order when it stores the table.
            let mut values = [0u16; 64];
            for value in &mut values {
                *value = if wide {
                    reader.read_u16()?
                } else {
                    reader.read_u8()?.into()
                };
            }
            tables.push(DqtTable { id, values });
        }
        Ok(Dqt { tables })
    }

    fn read_dht(&mut self, reader: &mut Reader<'a>) -> Result<Dht<'a>> {
        let mut tables = Vec::new();
        while !reader.remaining().is_empty() {
            if reader.remaining().len() < 17 {
                return Err(Error::new(
                    ErrorKind::TableError,
                    "huffman table size mismatch",
                ));
            }
            let header: &DhtHeader = reader.read_obj()?;
            if header.Tc() > 1 {
                return Err(Error::new(
                    ErrorKind::TableError,
                    "invalid huffman table class",
                ));
            }
            if header.Th() > 1 {
                return Err(Error::new(
                    ErrorKind::TableError,
                    "invalid huffman table destination",
                ));
            }
            let count = header.num_values();
            if reader.remaining().len() < count {
                return Err(Error::new(
                    ErrorKind::TableError,
                    "huffman table size mismatch",
                ));
            }
            let Vij = reader.read_slice(count)?;
            tables.push(DhtTable { header, Vij });
        }
        Ok(Dht { tables })
    }

    fn read_sof(&mut self, reader: &mut Reader<'a>) -> Result<Sof<'a>> {
        let P = reader.read_u8()?;
        let Y = reader.read_u16()?;
        let X = reader.read_u16()?;
        let num_components = reader.read_u8()?;
        let components = reader.read_objs::<FrameComponent>(num_components.into())?;
        Ok(Sof {
            P,
            Y,
            X,
            components,
        })
    }

    fn read_sos(&mut self, reader: &mut Reader<'a>) -> Result<Sos<'a>> {
        let num_components = reader.read_u8()?;
        let components = reader.read_objs::<ScanComponent>(num_components.into())?;
        let Ss = reader.read_u8()?;
        let Se = reader.read_u8()?;
        let AhAl = reader.read_u8()?;
        Ok(Sos {
            components,
            Ss,
            Se,
            AhAl,
        })
    }

    fn read_dri(&mut self, reader: &mut Reader<'a>) -> Result<Dri> {
        if reader.remaining().len() != 2 {
            return Err(Error::new(
                ErrorKind::MalformedHeader,
                "malformed restart interval segment",
            ));
        }
        Ok(Dri {
            Ri: reader.read_u16()?,
        })
    }

    fn read_app(&mut self, marker: u8, reader: &mut Reader<'a>) -> Result<App<'a>> {
        let n = marker - 0xE0;
        let payload = reader.remaining();
        if payload.is_empty() {
            return Err(Error::new(ErrorKind::MalformedHeader, "empty APP segment"));
        }
        let nul = payload.iter().position(|&b| b == 0).ok_or_else(|| {
            Error::new(
                ErrorKind::MalformedHeader,
                "unterminated APP segment identifier",
            )
        })?;
        reader.position = reader.buf.len();
        Ok(App {
            n,
            identifier: &payload[..nul],
            data: &payload[nul + 1..],
        })
    }
}

#[derive(Debug)]
struct Reader<'a> {
    buf: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> &'a [u8] {
        &self.buf[self.position..]
    }

    fn read_u8(&mut self) -> Result<u8> {
        let byte = self.buf.get(self.position).copied().ok_or_else(truncated)?;
        self.position += 1;
        Ok(byte)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let b = [self.read_u8()?, self.read_u8()?];
        Ok(u16::from_be_bytes(b))
    }

    fn read_slice(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.remaining().len() < count {
            return Err(truncated());
        }
        let slice = &self.remaining()[..count];
        self.position += count;
        Ok(slice)
    }

    fn read_obj<T: AnyBitPattern>(&mut self) -> Result<&'a T> {
        assert_eq!(std::mem::align_of::<T>(), 1);
        let bytes = self.read_slice(std::mem::size_of::<T>())?;
        Ok(bytemuck::from_bytes(bytes))
    }

    fn read_objs<T: AnyBitPattern>(&mut self, count: usize) -> Result<&'a [T]> {
        assert_eq!(std::mem::align_of::<T>(), 1);
        let bytes = self.read_slice(count * std::mem::size_of::<T>())?;
        Ok(bytemuck::cast_slice(bytes))
    }

    /// Reads a segment length word. The stored value includes the length
    /// word itself; the returned value does not.
    fn read_length(&mut self) -> Result<u16> {
        let len = self.read_u16()?;
        if len < 2 {
            return Err(Error::new(
                ErrorKind::MalformedHeader,
                "invalid segment length",
            ));
        }
        if self.remaining().len() < usize::from(len - 2) {
            return Err(truncated());
        }
        Ok(len - 2)
    }
}

fn truncated() -> Error {
    Error::new(
        ErrorKind::MalformedHeader,
        "reached end of data while parsing the header",
    )
}

/// A segment of a JPEG file, introduced by a `0xFF 0xXX` marker.
pub(crate) struct Segment<'a> {
    marker: u8,
    raw_bytes: &'a [u8],
    offset: usize,
    pub kind: Option<SegmentKind<'a>>,
}

impl<'a> Segment<'a> {
    /// Offset of the segment's marker in the input buffer.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The `0xXX` byte identifying the type of the segment.
    #[inline]
    pub fn marker(&self) -> u8 {
        self.marker
    }

    /// The payload bytes covered by the segment length word (empty for
    /// standalone markers). For SOS this is only the scan header, not the
    /// entropy-coded data following it.
    #[inline]
    pub fn raw_bytes(&self) -> &[u8] {
        self.raw_bytes
    }
}

/// Enumeration of segment kinds this parser decodes.
#[derive(Debug)]
pub(crate) enum SegmentKind<'a> {
    Dqt(Dqt),
    Dht(Dht<'a>),
    Dri(Dri),
    Sof(Sof<'a>),
    Sos(Sos<'a>),
    App(App<'a>),
}

/// One table definition from a **D**efine **Q**uantization **T**ables
/// segment, with the 64 elements still in zigzag order.
pub(crate) struct DqtTable {
    id: u8,
    values: [u16; 64],
}

impl DqtTable {
    /// Destination identifier (0 or 1).
    #[inline]
    pub fn id(&self) -> u8 {
        self.id
    }

    /// The table elements in zigzag order.
    #[inline]
    pub fn values(&self) -> &[u16; 64] {
        &self.values
    }
}

impl fmt::Debug for DqtTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DqtTable")
            .field("id", &self.id)
            .field("values", &format_args!("{:?} ...", &self.values[..8]))
            .finish()
    }
}

#[derive(Debug)]
pub(crate) struct Dqt {
    tables: Vec<DqtTable>,
}

impl Dqt {
    pub fn tables(&self) -> impl Iterator<Item = &DqtTable> {
        self.tables.iter()
    }
}

#[derive(Clone, Copy, AnyBitPattern)]
#[repr(C)]
struct DhtHeader {
    TcTh: u8,
    Li: [u8; 16],
}

impl DhtHeader {
    fn Tc(&self) -> u8 {
        self.TcTh >> 4
    }

    fn Th(&self) -> u8 {
        self.TcTh & 0xF
    }

    fn num_values(&self) -> usize {
        self.Li.iter().map(|&l| usize::from(l)).sum()
    }
}

/// One table definition from a **D**efine **H**uffman **T**ables segment.
pub(crate) struct DhtTable<'a> {
    header: &'a DhtHeader,
    Vij: &'a [u8],
}

impl<'a> DhtTable<'a> {
    /// Table class: 0 = DC, 1 = AC.
    #[inline]
    pub fn Tc(&self) -> u8 {
        self.header.Tc()
    }

    /// Destination identifier (0 or 1).
    #[inline]
    pub fn Th(&self) -> u8 {
        self.header.Th()
    }

    /// Number of codes of each length 1-16.
    #[inline]
    pub fn Li(&self) -> &[u8; 16] {
        &self.header.Li
    }

    /// The symbol values in canonical code order.
    #[inline]
    pub fn Vij(&self) -> &[u8] {
        self.Vij
    }
}

impl<'a> fmt::Debug for DhtTable<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DhtTable")
            .field("Tc", &self.Tc())
            .field("Th", &self.Th())
            .field("Li", &self.Li())
            .field("Vij", &self.Vij)
            .finish()
    }
}

#[derive(Debug)]
pub(crate) struct Dht<'a> {
    tables: Vec<DhtTable<'a>>,
}

impl<'a> Dht<'a> {
    pub fn tables(&self) -> impl Iterator<Item = &DhtTable<'a>> {
        self.tables.iter()
    }
}

/// **D**efine **R**estart **I**nterval.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Dri {
    Ri: u16,
}

impl Dri {
    /// Number of MCUs contained in each restart interval.
    #[inline]
    pub fn Ri(&self) -> u16 {
        self.Ri
    }
}

/// **SOF** Start Of Frame (baseline layout).
#[derive(Debug)]
pub(crate) struct Sof<'a> {
    P: u8,
    Y: u16,
    X: u16,
    components: &'a [FrameComponent],
}

impl<'a> Sof<'a> {
    /// Sample precision in bits.
    #[inline]
    pub fn P(&self) -> u8 {
        self.P
    }

    /// Number of lines (the height of the frame).
    #[inline]
    pub fn Y(&self) -> u16 {
        self.Y
    }

    /// Samples per line (the width of the frame).
    #[inline]
    pub fn X(&self) -> u16 {
        self.X
    }

    #[inline]
    pub fn components(&self) -> &'a [FrameComponent] {
        self.components
    }
}

#[derive(Clone, Copy, AnyBitPattern)]
#[repr(C)]
pub(crate) struct FrameComponent {
    Ci: u8,
    HiVi: u8,
    Tqi: u8,
}

impl FrameComponent {
    /// Component identifier; the scan header refers to components by this
    /// value.
    #[inline]
    pub fn Ci(&self) -> u8 {
        self.Ci
    }

    /// Horizontal sampling factor.
    #[inline]
    pub fn Hi(&self) -> u8 {
        self.HiVi >> 4
    }

    /// Vertical sampling factor.
    #[inline]
    pub fn Vi(&self) -> u8 {
        self.HiVi & 0xF
    }

    /// Quantization table selector.
    #[inline]
    pub fn Tqi(&self) -> u8 {
        self.Tqi
    }
}

impl fmt::Debug for FrameComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameComponent")
            .field("Ci", &self.Ci)
            .field("Hi", &self.Hi())
            .field("Vi", &self.Vi())
            .field("Tqi", &self.Tqi)
            .finish()
    }
}

/// **SOS** Start Of Scan. The entropy-coded data follows the segment and
/// is not part of it; use [`JpegParser::remaining`] to access it.
#[derive(Debug)]
pub(crate) struct Sos<'a> {
    components: &'a [ScanComponent],
    Ss: u8,
    Se: u8,
    AhAl: u8,
}

impl<'a> Sos<'a> {
    #[inline]
    pub fn components(&self) -> &'a [ScanComponent] {
        self.components
    }

    /// Spectral selection start (0 for baseline).
    #[inline]
    pub fn Ss(&self) -> u8 {
        self.Ss
    }

    /// Spectral selection end (63 for baseline).
    #[inline]
    pub fn Se(&self) -> u8 {
        self.Se
    }

    /// Packed successive approximation parameters (0 for baseline).
    #[inline]
    pub fn AhAl(&self) -> u8 {
        self.AhAl
    }
}

#[derive(Clone, Copy, AnyBitPattern)]
#[repr(C)]
pub(crate) struct ScanComponent {
    Csj: u8,
    TdjTaj: u8,
}

impl ScanComponent {
    /// Scan component selector; must match a frame component id.
    #[inline]
    pub fn Csj(&self) -> u8 {
        self.Csj
    }

    /// DC entropy table selector.
    #[inline]
    pub fn Tdj(&self) -> u8 {
        self.TdjTaj >> 4
    }

    /// AC entropy table selector.
    #[inline]
    pub fn Taj(&self) -> u8 {
        self.TdjTaj & 0xF
    }
}

impl fmt::Debug for ScanComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanComponent")
            .field("Csj", &self.Csj)
            .field("Tdj", &self.Tdj())
            .field("Taj", &self.Taj())
            .finish()
    }
}

/// An application-specific segment (`APPn`) with its NUL-terminated
/// identifier split off.
pub(crate) struct App<'a> {
    n: u8,
    identifier: &'a [u8],
    data: &'a [u8],
}

impl<'a> App<'a> {
    /// The `n` in `APPn`, 0-15.
    #[inline]
    pub fn n(&self) -> u8 {
        self.n
    }

    /// The identifier bytes before the NUL terminator.
    #[inline]
    pub fn identifier(&self) -> &'a [u8] {
        self.identifier
    }

    /// The payload following the identifier.
    #[inline]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}

impl<'a> fmt::Debug for App<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "App {{ n: {}, identifier: \"{}\", {} data bytes }}",
            self.n,
            self.identifier.escape_ascii(),
            self.data.len(),
        )
    }
}
