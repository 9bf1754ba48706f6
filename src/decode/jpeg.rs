//! Baseline JPEG/JFIF decoder.
//!
//! Supports sequential Huffman-coded DCT frames (SOF0/SOF1) with 8-bit
//! precision, one (grayscale) or three (YCbCr) components without chroma
//! subsampling, interleaved scans and restart intervals. Progressive,
//! lossless and arithmetic-coded frames are rejected.
//!
//! Decoding runs in a [`JpegDecoder`] session: all Huffman trees,
//! quantization tables and predictor state belong to it and are dropped
//! when it returns.

use crate::allocator::{PixelAllocator, SystemAllocator};
use crate::bits::BitCursor;
use crate::decode::color::{luma_to_rgba, ycbcr_to_rgba};
use crate::decode::dct::{idct_8x8, Block};
use crate::decode::huffman::{HuffmanTree, TableClass, MAX_CODE_LENGTH};
use crate::error::{Error, Result};
use crate::image::Image;
use crate::options::DecodeOptions;

// Markers (second byte after 0xFF).
const TEM: u8 = 0x01;
const SOF0: u8 = 0xC0;
const SOF1: u8 = 0xC1;
const SOF2: u8 = 0xC2;
const SOF15: u8 = 0xCF;
const DHT: u8 = 0xC4;
const JPG: u8 = 0xC8;
const DAC: u8 = 0xCC;
const RST0: u8 = 0xD0;
const RST7: u8 = 0xD7;
const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const DQT: u8 = 0xDB;
const DRI: u8 = 0xDD;
const APP0: u8 = 0xE0;
const APP15: u8 = 0xEF;
const COM: u8 = 0xFE;

/// Zigzag scan position to natural (row-major) coefficient index.
pub const ZIGZAG: [usize; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27,
    20, 13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58,
    59, 52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

/// Level shift of +128 applied to the dequantized DC term (128 * 8).
const DC_LEVEL_SHIFT: f32 = 1024.0;

/// Largest DC difference category in an 8-bit baseline stream.
const MAX_DC_CATEGORY: u8 = 11;

/// Number of table destinations per kind.
const TABLE_SLOTS: usize = 4;

type QuantTable = [f32; 64];

#[derive(Debug, Clone, Copy)]
struct FrameComponent {
    id: u8,
    quant: usize,
}

#[derive(Debug, Clone)]
struct Frame {
    width: u32,
    height: u32,
    components: Vec<FrameComponent>,
    mcus_x: usize,
    mcus_y: usize,
}

#[derive(Debug, Clone, Copy)]
struct ScanComponent {
    /// Index into the frame's component list.
    frame_index: usize,
    dc: usize,
    ac: usize,
}

/// Per-call JPEG decoding state.
pub struct JpegDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    options: DecodeOptions,
    allocator: &'a dyn PixelAllocator,
    frame: Option<Frame>,
    image: Option<Image>,
    dc_tables: [Option<HuffmanTree>; TABLE_SLOTS],
    ac_tables: [Option<HuffmanTree>; TABLE_SLOTS],
    quant_tables: [Option<QuantTable>; TABLE_SLOTS],
    restart_interval: u16,
}

impl<'a> JpegDecoder<'a> {
    pub fn new(
        data: &'a [u8],
        options: &DecodeOptions,
        allocator: &'a dyn PixelAllocator,
    ) -> Self {
        Self {
            data,
            pos: 0,
            options: *options,
            allocator,
            frame: None,
            image: None,
            dc_tables: Default::default(),
            ac_tables: Default::default(),
            quant_tables: [None; TABLE_SLOTS],
            restart_interval: 0,
        }
    }

    /// Run the decoder to completion.
    pub fn decode(mut self) -> Result<Image> {
        if self.data.len() < 2 || self.data[0] != 0xFF || self.data[1] != SOI {
            return Err(Error::FormatMismatch);
        }
        self.pos = 2;

        loop {
            let (marker, segment) = self.read_marker()?;
            match marker {
                SOF0 | SOF1 => self.parse_sof(marker, segment)?,
                SOF2..=SOF15 if marker != DHT && marker != JPG && marker != DAC => {
                    return Err(self.reject_frame(marker, segment));
                }
                DHT => self.parse_dht(segment)?,
                DQT => self.parse_dqt(segment)?,
                DRI => self.parse_dri(segment)?,
                SOS => {
                    let scan = self.parse_sos(segment)?;
                    return self.decode_scan(&scan);
                }
                APP0 => log_jfif(segment),
                EOI => return Err(Error::InvalidDecode("no image data found".into())),
                APP0..=APP15 | COM => {
                    log::trace!("jpeg: skipping marker {marker:#04X} ({} bytes)", segment.len());
                }
                _ => log::debug!("jpeg: skipping unknown marker {marker:#04X}"),
            }
        }
    }

    /// Read the next marker and, for non-standalone markers, its segment.
    fn read_marker(&mut self) -> Result<(u8, &'a [u8])> {
        let data = self.data;
        let start = self.pos;
        while self.pos < data.len() && data[self.pos] != 0xFF {
            self.pos += 1;
        }
        if self.pos > start {
            log::warn!("jpeg: skipped {} bytes before marker", self.pos - start);
        }
        // Fill bytes.
        while self.pos < data.len() && data[self.pos] == 0xFF {
            self.pos += 1;
        }
        let marker = *data
            .get(self.pos)
            .ok_or_else(|| Error::InvalidDecode("unexpected end of file".into()))?;
        self.pos += 1;

        if matches!(marker, SOI | EOI | TEM | RST0..=RST7) {
            return Ok((marker, &[]));
        }

        let length = data
            .get(self.pos..self.pos + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]) as usize)
            .ok_or_else(|| Error::InvalidDecode("truncated marker".into()))?;
        if length < 2 || self.pos + length > data.len() {
            return Err(Error::InvalidDecode(format!(
                "invalid length {length} for marker {marker:#04X}"
            )));
        }
        let segment = &data[self.pos + 2..self.pos + length];
        self.pos += length;
        Ok((marker, segment))
    }

    fn parse_sof(&mut self, marker: u8, segment: &[u8]) -> Result<()> {
        if self.frame.is_some() {
            return Err(Error::InvalidDecode("multiple frame headers".into()));
        }
        let (precision, width, height, count) = frame_header(segment)?;
        log::debug!(
            "jpeg: SOF{} {width}x{height}, {count} components",
            marker - SOF0
        );
        if precision != 8 {
            return Err(Error::UnsupportedDecode(format!(
                "{precision}-bit JPEG precision"
            )));
        }
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimensions { width, height });
        }
        let max = self.options.max_dimension;
        if width > max || height > max {
            return Err(Error::ImageTooLarge { width, height, max });
        }
        if count != 1 && count != 3 {
            return Err(Error::UnsupportedDecode(format!(
                "JPEG with {count} components"
            )));
        }
        if segment.len() < 6 + count * 3 {
            return Err(Error::InvalidDecode("truncated SOF components".into()));
        }

        let mut components = Vec::with_capacity(count);
        for spec in segment[6..6 + count * 3].chunks_exact(3) {
            let (id, h, v, quant) = (spec[0], spec[1] >> 4, spec[1] & 0x0F, spec[2] as usize);
            if h == 0 || v == 0 {
                return Err(Error::InvalidDecode(format!(
                    "zero sampling factor for component {id}"
                )));
            }
            // A lone component is always coded one block per MCU.
            if count > 1 && (h != 1 || v != 1) {
                return Err(Error::UnsupportedDecode(format!(
                    "chroma subsampling ({h}x{v} on component {id})"
                )));
            }
            if quant >= TABLE_SLOTS {
                return Err(Error::InvalidDecode(format!(
                    "invalid quantization table ID {quant} for component {id}"
                )));
            }
            components.push(FrameComponent { id, quant });
        }

        let mcus_x = (width as usize).div_ceil(8);
        let mcus_y = (height as usize).div_ceil(8);
        let image = Image::allocate((mcus_x * 8) as u32, (mcus_y * 8) as u32, self.allocator)?;
        self.image = Some(image);
        self.frame = Some(Frame {
            width,
            height,
            components,
            mcus_x,
            mcus_y,
        });
        Ok(())
    }

    /// Log a frame type the decoder does not handle and build the error.
    fn reject_frame(&self, marker: u8, segment: &[u8]) -> Error {
        let kind = match marker {
            SOF2 | 0xC6 | 0xCA | 0xCE => "progressive",
            0xC3 | 0xC7 | 0xCB | 0xCF => "lossless",
            _ => "hierarchical or arithmetic",
        };
        if let Ok((_, width, height, count)) = frame_header(segment) {
            log::debug!(
                "jpeg: SOF{} {kind} frame {width}x{height}, {count} components",
                marker - SOF0
            );
        }
        Error::UnsupportedDecode(format!("{kind} JPEG (SOF{})", marker - SOF0))
    }

    fn parse_dht(&mut self, segment: &[u8]) -> Result<()> {
        let mut rest = segment;
        while !rest.is_empty() {
            let class = TableClass::try_from(rest[0] >> 4)?;
            let slot = (rest[0] & 0x0F) as usize;
            if slot >= TABLE_SLOTS {
                return Err(Error::InvalidDecode("invalid Huffman table ID".into()));
            }
            if rest.len() < 1 + MAX_CODE_LENGTH {
                return Err(Error::InvalidDecode("truncated DHT".into()));
            }
            let mut lengths = [0u8; MAX_CODE_LENGTH];
            lengths.copy_from_slice(&rest[1..1 + MAX_CODE_LENGTH]);
            let total: usize = lengths.iter().map(|&n| n as usize).sum();
            let symbols = rest
                .get(1 + MAX_CODE_LENGTH..1 + MAX_CODE_LENGTH + total)
                .ok_or_else(|| Error::InvalidDecode("truncated DHT values".into()))?;

            let tree = HuffmanTree::build(&lengths, symbols)?;
            log::debug!("jpeg: DHT {class:?}{slot}, {total} codes");
            match class {
                TableClass::Dc => self.dc_tables[slot] = Some(tree),
                TableClass::Ac => self.ac_tables[slot] = Some(tree),
            }
            rest = &rest[1 + MAX_CODE_LENGTH + total..];
        }
        Ok(())
    }

    fn parse_dqt(&mut self, segment: &[u8]) -> Result<()> {
        let mut rest = segment;
        while !rest.is_empty() {
            let precision = rest[0] >> 4;
            let slot = (rest[0] & 0x0F) as usize;
            if slot >= TABLE_SLOTS {
                return Err(Error::InvalidDecode("invalid quantization table ID".into()));
            }
            let element = match precision {
                0 => 1,
                1 => 2,
                _ => {
                    return Err(Error::InvalidDecode(format!(
                        "invalid DQT precision {precision}"
                    )))
                }
            };
            let body = rest
                .get(1..1 + 64 * element)
                .ok_or_else(|| Error::InvalidDecode("truncated DQT".into()))?;

            let mut table = [0.0f32; 64];
            for (k, value) in body.chunks_exact(element).enumerate() {
                let q = match value {
                    [b] => *b as u16,
                    [hi, lo] => u16::from_be_bytes([*hi, *lo]),
                    _ => 0,
                };
                table[ZIGZAG[k]] = q as f32;
            }
            log::debug!("jpeg: DQT {slot}, {}-bit", element * 8);
            self.quant_tables[slot] = Some(table);
            rest = &rest[1 + 64 * element..];
        }
        Ok(())
    }

    fn parse_dri(&mut self, segment: &[u8]) -> Result<()> {
        if segment.len() != 2 {
            return Err(Error::InvalidDecode("invalid DRI length".into()));
        }
        self.restart_interval = u16::from_be_bytes([segment[0], segment[1]]);
        log::debug!("jpeg: restart interval {}", self.restart_interval);
        Ok(())
    }

    fn parse_sos(&self, segment: &[u8]) -> Result<Vec<ScanComponent>> {
        let frame = self
            .frame
            .as_ref()
            .ok_or_else(|| Error::InvalidDecode("SOS before frame header".into()))?;
        let count = *segment
            .first()
            .ok_or_else(|| Error::InvalidDecode("empty SOS segment".into()))?
            as usize;
        if count == 0 || count > 4 {
            return Err(Error::InvalidDecode(format!(
                "invalid SOS component count {count}"
            )));
        }
        if count != frame.components.len() {
            return Err(Error::UnsupportedDecode(format!(
                "non-interleaved scan ({count} of {} components)",
                frame.components.len()
            )));
        }
        if segment.len() < 1 + count * 2 + 3 {
            return Err(Error::InvalidDecode("truncated SOS segment".into()));
        }

        let mut scan = Vec::with_capacity(count);
        for spec in segment[1..1 + count * 2].chunks_exact(2) {
            let id = spec[0];
            let frame_index = frame
                .components
                .iter()
                .position(|c| c.id == id)
                .ok_or_else(|| {
                    Error::InvalidDecode(format!("SOS references unknown component {id}"))
                })?;
            if scan.iter().any(|sc: &ScanComponent| sc.frame_index == frame_index) {
                return Err(Error::InvalidDecode(format!(
                    "component {id} appears twice in scan"
                )));
            }
            let dc = (spec[1] >> 4) as usize;
            let ac = (spec[1] & 0x0F) as usize;
            if self.dc_tables.get(dc).map_or(true, Option::is_none) {
                return Err(Error::InvalidDecode(format!(
                    "invalid DC Huffman table ID {dc} for component {id}"
                )));
            }
            if self.ac_tables.get(ac).map_or(true, Option::is_none) {
                return Err(Error::InvalidDecode(format!(
                    "invalid AC Huffman table ID {ac} for component {id}"
                )));
            }
            let quant = frame.components[frame_index].quant;
            if self.quant_tables[quant].is_none() {
                return Err(Error::InvalidDecode(format!(
                    "quantization table {quant} not defined for component {id}"
                )));
            }
            scan.push(ScanComponent {
                frame_index,
                dc,
                ac,
            });
        }

        let tail = &segment[1 + count * 2..];
        if tail[..3] != [0, 63, 0] {
            log::debug!(
                "jpeg: unexpected spectral selection {}..{} / {:#04x} in baseline scan",
                tail[0],
                tail[1],
                tail[2]
            );
        }
        Ok(scan)
    }

    /// Decode the entropy-coded segment that follows the current SOS.
    fn decode_scan(mut self, scan: &[ScanComponent]) -> Result<Image> {
        let (frame, mut image) = match (self.frame.take(), self.image.take()) {
            (Some(frame), Some(image)) => (frame, image),
            _ => return Err(Error::InvalidDecode("SOS before frame header".into())),
        };

        let (entropy, consumed) = destuff_entropy_segment(&self.data[self.pos..]);
        self.pos += consumed;
        log::trace!(
            "jpeg: entropy segment of {consumed} bytes, {} after destuffing",
            entropy.len()
        );

        let total = frame.mcus_x * frame.mcus_y;
        let mut cursor = BitCursor::new(&entropy);
        let mut predictors = [0i32; 3];

        for index in 0..total {
            if let Err(err) = self.decode_mcu(
                &frame,
                scan,
                index,
                &mut cursor,
                &mut predictors,
                &mut image,
            ) {
                if self.options.strict {
                    return Err(err);
                }
                log::warn!("jpeg: scan aborted at MCU {index} of {total}: {err}");
                break;
            }
        }

        match self.data.get(self.pos..self.pos + 2) {
            Some([0xFF, EOI]) => {}
            Some([0xFF, SOS]) => log::debug!("jpeg: ignoring scans after the first"),
            _ => log::warn!("jpeg: no EOI after scan"),
        }

        if self.options.crop_to_frame {
            image.crop(frame.width, frame.height, self.allocator)
        } else {
            Ok(image)
        }
    }

    fn decode_mcu(
        &self,
        frame: &Frame,
        scan: &[ScanComponent],
        index: usize,
        cursor: &mut BitCursor<'_>,
        predictors: &mut [i32; 3],
        image: &mut Image,
    ) -> Result<()> {
        let interval = self.restart_interval as usize;
        if interval > 0 && index > 0 && index % interval == 0 {
            log::trace!("jpeg: restart before MCU {index}");
            *predictors = [0; 3];
            cursor.align();
        }

        let mut planes = [[0.0f32; 64]; 3];
        for sc in scan {
            let quant_slot = frame.components[sc.frame_index].quant;
            let (dc, ac, quant) = match (
                &self.dc_tables[sc.dc],
                &self.ac_tables[sc.ac],
                &self.quant_tables[quant_slot],
            ) {
                (Some(dc), Some(ac), Some(quant)) => (dc, ac, quant),
                _ => return Err(Error::InvalidDecode("scan table missing".into())),
            };
            let coefficients =
                decode_block(cursor, dc, ac, &mut predictors[sc.frame_index], quant)?;
            planes[sc.frame_index] = idct_8x8(&coefficients);
        }

        let (mcu_x, mcu_y) = (index % frame.mcus_x, index / frame.mcus_x);
        let grayscale = frame.components.len() == 1;
        for y in 0..8 {
            for x in 0..8 {
                let i = y * 8 + x;
                let rgba = if grayscale {
                    luma_to_rgba(planes[0][i])
                } else {
                    ycbcr_to_rgba(planes[0][i], planes[1][i], planes[2][i])
                };
                image.put_pixel(mcu_x * 8 + x, mcu_y * 8 + y, rgba);
            }
        }
        Ok(())
    }
}

/// Entropy-decode and dequantize one 8x8 block into natural order.
///
/// The DC term carries the +128 level shift, so the IDCT output is in
/// sample range.
fn decode_block(
    cursor: &mut BitCursor<'_>,
    dc: &HuffmanTree,
    ac: &HuffmanTree,
    predictor: &mut i32,
    quant: &QuantTable,
) -> Result<Block> {
    let mut block = [0.0f32; 64];

    let category = dc.decode(cursor)?;
    if category > MAX_DC_CATEGORY {
        return Err(Error::InvalidDecode(format!(
            "DC magnitude category {category} out of range"
        )));
    }
    let diff = cursor.receive_extend(category)?;
    *predictor = predictor
        .checked_add(diff)
        .ok_or_else(|| Error::InvalidDecode("DC predictor overflow".into()))?;
    block[0] = *predictor as f32 * quant[0] + DC_LEVEL_SHIFT;

    let mut k = 1;
    while k < 64 {
        let rs = ac.decode(cursor)?;
        let (run, size) = ((rs >> 4) as usize, rs & 0x0F);
        if size == 0 {
            match run {
                0 => break,
                15 => {
                    k += 16;
                    continue;
                }
                _ => {
                    return Err(Error::InvalidDecode(format!(
                        "invalid AC symbol {rs:#04x}"
                    )))
                }
            }
        }
        k += run;
        if k > 63 {
            return Err(Error::InvalidDecode("AC run past coefficient 63".into()));
        }
        let value = cursor.receive_extend(size)?;
        let natural = ZIGZAG[k];
        block[natural] = value as f32 * quant[natural];
        k += 1;
    }
    if k > 64 {
        return Err(Error::InvalidDecode("AC run past coefficient 63".into()));
    }
    Ok(block)
}

/// Precision, width, height and component count of a SOFn segment.
fn frame_header(segment: &[u8]) -> Result<(u8, u32, u32, usize)> {
    if segment.len() < 6 {
        return Err(Error::InvalidDecode("invalid SOF length".into()));
    }
    let height = u16::from_be_bytes([segment[1], segment[2]]) as u32;
    let width = u16::from_be_bytes([segment[3], segment[4]]) as u32;
    Ok((segment[0], width, height, segment[5] as usize))
}

fn log_jfif(segment: &[u8]) {
    if segment.len() >= 12 && segment.starts_with(b"JFIF\0") {
        let units = match segment[7] {
            0 => "aspect",
            1 => "dpi",
            2 => "dpcm",
            _ => "unknown units",
        };
        log::debug!(
            "jpeg: JFIF {}.{:02}, density {}x{} {units}",
            segment[5],
            segment[6],
            u16::from_be_bytes([segment[8], segment[9]]),
            u16::from_be_bytes([segment[10], segment[11]])
        );
    } else {
        log::trace!("jpeg: APP0 without JFIF identifier");
    }
}

/// Extract the entropy-coded bytes at the start of `data`.
///
/// Stuffed `0xFF 0x00` pairs become a single `0xFF`, restart markers and
/// fill bytes are dropped, and extraction stops at the first other marker.
/// Returns the payload and the number of input bytes consumed, so the
/// terminating marker (if any) starts at that offset.
pub fn destuff_entropy_segment(data: &[u8]) -> (Vec<u8>, usize) {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        let byte = data[i];
        if byte != 0xFF {
            out.push(byte);
            i += 1;
            continue;
        }
        match data.get(i + 1) {
            Some(0x00) => {
                out.push(0xFF);
                i += 2;
            }
            Some(RST0..=RST7) => i += 2,
            Some(0xFF) => i += 1,
            Some(_) => return (out, i),
            None => {
                i += 1;
                break;
            }
        }
    }
    (out, i)
}

/// Decode a baseline JPEG with default options.
pub fn decode_jpeg(data: &[u8]) -> Result<Image> {
    decode_jpeg_with(data, &DecodeOptions::default(), &SystemAllocator)
}

/// Decode a baseline JPEG with explicit options and pixel allocator.
pub fn decode_jpeg_with(
    data: &[u8],
    options: &DecodeOptions,
    allocator: &dyn PixelAllocator,
) -> Result<Image> {
    JpegDecoder::new(data, options, allocator).decode()
}
