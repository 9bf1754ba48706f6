//! DEFLATE (RFC 1951) + zlib (RFC 1950) decoder with windowed output.
//!
//! The PNG decoder never needs the whole inflated stream at once: it feeds
//! every byte straight into scanline reconstruction. [`ZlibInflater`]
//! therefore hands its output to a sink in windows of bounded size and only
//! retains the 32 KiB of history that back-references may reach.
//!
//! - Supports zlib-wrapped DEFLATE streams (CM=8).
//! - Handles stored, fixed Huffman, and dynamic Huffman blocks.
//! - Verifies zlib FCHECK/FDICT and Adler-32.

use crate::compress::adler32::Adler32;
use crate::error::{Error, Result};

const MAX_CODE_BITS: u8 = 15;
const MAX_DISTANCE: usize = 32 * 1024;

/// Largest output window handed to a sink; larger requests are clamped.
pub const MAX_WINDOW: usize = MAX_DISTANCE * 64;

// Length and distance tables from RFC 1951.
const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];
const LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

const DIST_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];
const DIST_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

// Order for code-length codes in dynamic Huffman blocks.
const CODE_LENGTH_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Receives inflated bytes, one window at a time.
pub type Sink<'s> = dyn FnMut(&[u8]) -> Result<()> + 's;

/// A bounded streaming inflate engine.
pub trait Inflate {
    /// Inflate the complete compressed stream `input`, calling `sink` with
    /// consecutive pieces of output no longer than `window` bytes.
    ///
    /// On a corrupt or truncated stream the output decoded so far is still
    /// delivered to `sink` before the error is returned.
    fn inflate_windowed(&mut self, input: &[u8], window: usize, sink: &mut Sink<'_>)
        -> Result<()>;
}

/// The built-in zlib inflater.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZlibInflater;

impl Inflate for ZlibInflater {
    fn inflate_windowed(
        &mut self,
        input: &[u8],
        window: usize,
        sink: &mut Sink<'_>,
    ) -> Result<()> {
        let payload = parse_zlib_header(input)?;
        let mut br = BitReader::new(payload);
        let mut out = WindowedOutput::new(window.clamp(1, MAX_WINDOW), sink);

        let inflated = inflate_blocks(&mut br, &mut out);
        out.flush_pending()?;
        inflated?;

        let trailer_at = br.consumed_bytes();
        let trailer = payload
            .get(trailer_at..trailer_at + 4)
            .ok_or(Error::StreamUnderrun)?;
        let expected = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let actual = out.adler.finish();
        if actual != expected {
            return Err(Error::InvalidDecode(format!(
                "Adler32 mismatch: expected {expected:#010x}, got {actual:#010x}"
            )));
        }

        log::trace!(
            "inflated {} bytes from {} compressed bytes",
            out.total,
            input.len()
        );
        Ok(())
    }
}

/// Inflate a zlib stream into a single buffer.
pub fn inflate_zlib(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoded = Vec::new();
    ZlibInflater.inflate_windowed(data, MAX_DISTANCE, &mut |piece| {
        decoded.extend_from_slice(piece);
        Ok(())
    })?;
    Ok(decoded)
}

/// Validate the two-byte zlib header and return everything after it.
fn parse_zlib_header(data: &[u8]) -> Result<&[u8]> {
    if data.len() < 2 {
        return Err(Error::InvalidDecode("zlib stream too short".into()));
    }
    let cmf = data[0];
    let flg = data[1];
    if (cmf & 0x0F) != 8 {
        return Err(Error::InvalidDecode(
            "unsupported compression method (expect DEFLATE)".into(),
        ));
    }
    if cmf >> 4 > 7 {
        return Err(Error::InvalidDecode("invalid CINFO/window size".into()));
    }
    if (u16::from(cmf) * 256 + u16::from(flg)) % 31 != 0 {
        return Err(Error::InvalidDecode("zlib FCHECK failed".into()));
    }
    if (flg & 0b0010_0000) != 0 {
        return Err(Error::UnsupportedDecode(
            "zlib FDICT preset dictionary not supported".into(),
        ));
    }
    Ok(&data[2..])
}

/// Output history plus the not-yet-delivered tail.
struct WindowedOutput<'o, 's> {
    history: Vec<u8>,
    flushed: usize,
    window: usize,
    total: usize,
    adler: Adler32,
    sink: &'o mut Sink<'s>,
}

impl<'o, 's> WindowedOutput<'o, 's> {
    fn new(window: usize, sink: &'o mut Sink<'s>) -> Self {
        Self {
            history: Vec::with_capacity(MAX_DISTANCE * 2 + window),
            flushed: 0,
            window,
            total: 0,
            adler: Adler32::new(),
            sink,
        }
    }

    #[inline]
    fn push(&mut self, byte: u8) -> Result<()> {
        self.history.push(byte);
        self.total += 1;
        self.maybe_flush()
    }

    fn extend(&mut self, bytes: &[u8]) -> Result<()> {
        for piece in bytes.chunks(self.window) {
            self.history.extend_from_slice(piece);
            self.total += piece.len();
            self.maybe_flush()?;
        }
        Ok(())
    }

    fn copy_match(&mut self, distance: usize, length: usize) -> Result<()> {
        if distance == 0 || distance > self.history.len() {
            return Err(Error::InvalidDecode(format!(
                "invalid back-reference distance: dist={} out_len={}",
                distance, self.total
            )));
        }
        // Byte by byte: the source may overlap what is being written.
        for _ in 0..length {
            let b = self.history[self.history.len() - distance];
            self.push(b)?;
        }
        Ok(())
    }

    fn maybe_flush(&mut self) -> Result<()> {
        if self.history.len() - self.flushed < self.window {
            return Ok(());
        }
        let end = self.flushed + self.window;
        self.deliver(end)?;

        if self.flushed > MAX_DISTANCE * 2 {
            let cut = self.flushed - MAX_DISTANCE;
            self.history.drain(..cut);
            self.flushed -= cut;
        }
        Ok(())
    }

    fn flush_pending(&mut self) -> Result<()> {
        while self.flushed < self.history.len() {
            let end = (self.flushed + self.window).min(self.history.len());
            self.deliver(end)?;
        }
        Ok(())
    }

    fn deliver(&mut self, end: usize) -> Result<()> {
        let piece = &self.history[self.flushed..end];
        self.adler.update(piece);
        (self.sink)(piece)?;
        self.flushed = end;
        Ok(())
    }
}

fn inflate_blocks(br: &mut BitReader<'_>, out: &mut WindowedOutput<'_, '_>) -> Result<()> {
    loop {
        let bfinal = br.read_bits(1)? != 0;
        let btype = br.read_bits(2)?;
        match btype {
            0 => inflate_stored(br, out)?,
            1 => inflate_compressed(br, out, &Tables::fixed()?)?,
            2 => {
                let tables = Tables::dynamic(br)?;
                inflate_compressed(br, out, &tables)?;
            }
            _ => return Err(Error::InvalidDecode("reserved BTYPE encountered".into())),
        }
        if bfinal {
            return Ok(());
        }
    }
}

fn inflate_stored(br: &mut BitReader<'_>, out: &mut WindowedOutput<'_, '_>) -> Result<()> {
    br.align_byte();
    let len = br.read_u16_le()?;
    let nlen = br.read_u16_le()?;
    if len != !nlen {
        return Err(Error::InvalidDecode(
            "stored block LEN/NLEN mismatch".into(),
        ));
    }
    let start = br.byte_pos;
    let end = start + len as usize;
    if end > br.data.len() {
        // Deliver what is there before reporting the truncation.
        out.extend(&br.data[start..])?;
        br.byte_pos = br.data.len();
        return Err(Error::StreamUnderrun);
    }
    out.extend(&br.data[start..end])?;
    br.byte_pos = end;
    Ok(())
}

fn inflate_compressed(
    br: &mut BitReader<'_>,
    out: &mut WindowedOutput<'_, '_>,
    tables: &Tables,
) -> Result<()> {
    loop {
        let sym = tables.litlen.decode(br)?;
        match sym {
            0..=255 => out.push(sym as u8)?,
            256 => return Ok(()),
            257..=285 => {
                let len_idx = (sym - 257) as usize;
                let length =
                    LENGTH_BASE[len_idx] as usize + br.read_bits(LENGTH_EXTRA[len_idx])? as usize;

                let dist_sym = tables.dist.decode(br)? as usize;
                if dist_sym >= DIST_BASE.len() {
                    return Err(Error::InvalidDecode("distance symbol out of range".into()));
                }
                let distance =
                    DIST_BASE[dist_sym] as usize + br.read_bits(DIST_EXTRA[dist_sym])? as usize;
                if distance > MAX_DISTANCE {
                    return Err(Error::InvalidDecode(
                        "distance exceeds 32 KiB window".into(),
                    ));
                }
                out.copy_match(distance, length)?;
            }
            _ => return Err(Error::InvalidDecode("invalid literal/length symbol".into())),
        }
    }
}

/// LSB-first bit reader for DEFLATE.
struct BitReader<'a> {
    data: &'a [u8],
    bit_buf: u64,
    bits_in_buf: u8,
    byte_pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            bit_buf: 0,
            bits_in_buf: 0,
            byte_pos: 0,
        }
    }

    fn ensure(&mut self, bits: u8) -> Result<()> {
        while self.bits_in_buf < bits {
            let byte = *self.data.get(self.byte_pos).ok_or(Error::StreamUnderrun)?;
            self.bit_buf |= (byte as u64) << self.bits_in_buf;
            self.bits_in_buf += 8;
            self.byte_pos += 1;
        }
        Ok(())
    }

    fn read_bits(&mut self, bits: u8) -> Result<u32> {
        if bits == 0 {
            return Ok(0);
        }
        self.ensure(bits)?;
        let mask = if bits == 32 {
            u32::MAX
        } else {
            (1u32 << bits) - 1
        };
        let val = (self.bit_buf as u32) & mask;
        self.bit_buf >>= bits;
        self.bits_in_buf -= bits;
        Ok(val)
    }

    fn align_byte(&mut self) {
        let drop_bits = self.bits_in_buf % 8;
        self.bit_buf >>= drop_bits;
        self.bits_in_buf -= drop_bits;
    }

    /// Read a little-endian u16 from the byte-aligned bit buffer or input.
    fn read_u16_le(&mut self) -> Result<u16> {
        self.align_byte();
        let lo = self.read_bits(8)? as u16;
        let hi = self.read_bits(8)? as u16;
        Ok(lo | (hi << 8))
    }

    /// Bytes fully consumed once buffered bits are given back.
    fn consumed_bytes(&self) -> usize {
        self.byte_pos - (self.bits_in_buf / 8) as usize
    }
}

struct Tables {
    litlen: Huffman,
    dist: Huffman,
}

impl Tables {
    fn fixed() -> Result<Tables> {
        let mut lengths = [0u8; 288];
        lengths[..144].fill(8);
        lengths[144..256].fill(9);
        lengths[256..280].fill(7);
        lengths[280..].fill(8);
        Ok(Tables {
            litlen: Huffman::from_lengths(&lengths)?,
            dist: Huffman::from_lengths(&[5u8; 30])?,
        })
    }

    fn dynamic(br: &mut BitReader<'_>) -> Result<Tables> {
        let hlit = br.read_bits(5)? as usize + 257;
        let hdist = br.read_bits(5)? as usize + 1;
        let hclen = br.read_bits(4)? as usize + 4;

        let mut code_len_lengths = [0u8; 19];
        for &idx in CODE_LENGTH_ORDER.iter().take(hclen) {
            code_len_lengths[idx] = br.read_bits(3)? as u8;
        }
        let code_len_huff = Huffman::from_lengths(&code_len_lengths)?;

        let total = hlit + hdist;
        let mut lengths: Vec<u8> = Vec::with_capacity(total);
        while lengths.len() < total {
            let sym = code_len_huff.decode(br)?;
            match sym {
                0..=15 => lengths.push(sym as u8),
                16 => {
                    let last = *lengths.last().ok_or_else(|| {
                        Error::InvalidDecode("repeat with no previous length".into())
                    })?;
                    let repeat = 3 + br.read_bits(2)? as usize;
                    lengths.extend(std::iter::repeat(last).take(repeat));
                }
                17 => {
                    let repeat = 3 + br.read_bits(3)? as usize;
                    lengths.extend(std::iter::repeat(0u8).take(repeat));
                }
                18 => {
                    let repeat = 11 + br.read_bits(7)? as usize;
                    lengths.extend(std::iter::repeat(0u8).take(repeat));
                }
                _ => return Err(Error::InvalidDecode("invalid code length symbol".into())),
            }
        }
        if lengths.len() != total {
            return Err(Error::InvalidDecode("code lengths overrun".into()));
        }

        // An all-zero distance tree is legal for blocks made only of literals.
        let (litlen_lengths, dist_lengths) = lengths.split_at(hlit);

        Ok(Tables {
            litlen: Huffman::from_lengths(litlen_lengths)?,
            dist: Huffman::from_lengths(dist_lengths)?,
        })
    }
}

/// Canonical DEFLATE code, decoded by comparing against first codes per length.
#[derive(Clone)]
struct Huffman {
    counts: [u16; (MAX_CODE_BITS as usize) + 1],
    first_code: [u16; (MAX_CODE_BITS as usize) + 1],
    first_symbol: [u16; (MAX_CODE_BITS as usize) + 1],
    symbols: Vec<u16>,
    max_bits: u8,
}

impl Huffman {
    fn from_lengths(lengths: &[u8]) -> Result<Self> {
        let mut counts = [0u16; (MAX_CODE_BITS as usize) + 1];
        for &len in lengths {
            if len > MAX_CODE_BITS {
                return Err(Error::InvalidDecode("code length exceeds 15".into()));
            }
            if len > 0 {
                counts[len as usize] += 1;
            }
        }
        let max_bits = (1..=MAX_CODE_BITS)
            .rev()
            .find(|&b| counts[b as usize] > 0)
            .unwrap_or(0);

        let mut first_code = [0u16; (MAX_CODE_BITS as usize) + 1];
        let mut next_code = [0u16; (MAX_CODE_BITS as usize) + 1];
        let mut code = 0u32;
        for bits in 1..=MAX_CODE_BITS as usize {
            code = (code + u32::from(counts[bits - 1])) << 1;
            if code + u32::from(counts[bits]) > 1 << bits {
                return Err(Error::InvalidDecode("over-subscribed Huffman code".into()));
            }
            first_code[bits] = code as u16;
            next_code[bits] = code as u16;
        }

        let mut first_symbol = [0u16; (MAX_CODE_BITS as usize) + 1];
        let mut sum = 0u16;
        for bits in 1..=MAX_CODE_BITS as usize {
            first_symbol[bits] = sum;
            sum += counts[bits];
        }

        // Symbols ordered by length then code.
        let mut symbols = vec![0u16; lengths.len()];
        for (symbol, &len) in lengths.iter().enumerate() {
            let len = len as usize;
            if len == 0 {
                continue;
            }
            let idx = first_symbol[len] as usize + (next_code[len] - first_code[len]) as usize;
            symbols[idx] = symbol as u16;
            next_code[len] += 1;
        }

        Ok(Self {
            counts,
            first_code,
            first_symbol,
            symbols,
            max_bits,
        })
    }

    fn decode(&self, br: &mut BitReader<'_>) -> Result<u16> {
        let mut code: u16 = 0;
        for len in 1..=self.max_bits as usize {
            code = (code << 1) | br.read_bits(1)? as u16;
            let count = self.counts[len];
            if count == 0 {
                continue;
            }
            let first = self.first_code[len];
            if code >= first && code < first + count {
                let idx = self.first_symbol[len] as usize + (code - first) as usize;
                return Ok(self.symbols[idx]);
            }
        }
        Err(Error::InvalidDecode("invalid Huffman code".into()))
    }
}
