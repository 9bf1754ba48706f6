//! PNG decoder for 8-bit truecolor images.
//!
//! Handles color types 2 (RGB) and 6 (RGBA) at 8 bits per sample without
//! interlacing. IDAT payloads are concatenated, inflated in bounded windows
//! and every window is pushed through [`ScanlineReconstructor`] straight
//! into the RGBA output, so the full filtered stream is never held in
//! memory.

use crate::allocator::{PixelAllocator, SystemAllocator};
use crate::compress::crc32::chunk_crc;
use crate::compress::inflate::{Inflate, ZlibInflater};
use crate::decode::scanline::ScanlineReconstructor;
use crate::error::{Error, Result};
use crate::image::Image;
use crate::options::DecodeOptions;

/// PNG file signature.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Length, type and CRC around every chunk payload.
const CHUNK_OVERHEAD: usize = 12;

const IHDR: [u8; 4] = *b"IHDR";
const PLTE: [u8; 4] = *b"PLTE";
const IDAT: [u8; 4] = *b"IDAT";
const IEND: [u8; 4] = *b"IEND";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorType {
    Truecolor,
    TruecolorAlpha,
}

impl ColorType {
    fn bytes_per_pixel(self) -> usize {
        match self {
            ColorType::Truecolor => 3,
            ColorType::TruecolorAlpha => 4,
        }
    }
}

impl TryFrom<u8> for ColorType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            2 => Ok(ColorType::Truecolor),
            6 => Ok(ColorType::TruecolorAlpha),
            0 => Err(Error::UnsupportedDecode("grayscale PNG".into())),
            3 => Err(Error::UnsupportedDecode("indexed-color PNG".into())),
            4 => Err(Error::UnsupportedDecode("grayscale+alpha PNG".into())),
            _ => Err(Error::UnsupportedDecode(format!("PNG color type {value}"))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Header {
    width: u32,
    height: u32,
    color_type: ColorType,
}

struct Chunk<'a> {
    kind: [u8; 4],
    data: &'a [u8],
}

impl Chunk<'_> {
    fn name(&self) -> String {
        String::from_utf8_lossy(&self.kind).into_owned()
    }

    /// Ancillary chunks have bit 5 of the first type byte set.
    fn is_ancillary(&self) -> bool {
        self.kind[0] & 0x20 != 0
    }
}

/// Per-call PNG decoding state.
pub struct PngDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    options: DecodeOptions,
    allocator: &'a dyn PixelAllocator,
    header: Option<Header>,
    image: Option<Image>,
    idat: Vec<u8>,
    seen_iend: bool,
}

impl<'a> PngDecoder<'a> {
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
            header: None,
            image: None,
            idat: Vec::new(),
            seen_iend: false,
        }
    }

    /// Run the decoder to completion.
    pub fn decode(mut self) -> Result<Image> {
        if self.data.len() < PNG_SIGNATURE.len() || self.data[..8] != PNG_SIGNATURE {
            return Err(Error::FormatMismatch);
        }
        self.pos = PNG_SIGNATURE.len();

        while self.pos < self.data.len() {
            if self.seen_iend && self.data.len() - self.pos < CHUNK_OVERHEAD {
                log::warn!(
                    "png: ignoring {} trailing bytes after IEND",
                    self.data.len() - self.pos
                );
                break;
            }
            let chunk = self.next_chunk()?;
            self.handle_chunk(&chunk)?;
        }

        self.finish()
    }

    /// Read and bounds-check the chunk at the current position.
    fn next_chunk(&mut self) -> Result<Chunk<'a>> {
        let data = self.data;
        let header = data
            .get(self.pos..self.pos + 8)
            .ok_or_else(|| Error::InvalidDecode("truncated PNG chunk".into()))?;
        let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let kind = [header[4], header[5], header[6], header[7]];

        let start = self.pos + 8;
        let end = start
            .checked_add(length)
            .filter(|&end| end + 4 <= data.len())
            .ok_or_else(|| {
                Error::InvalidDecode(format!(
                    "{} chunk length {length} exceeds file",
                    String::from_utf8_lossy(&kind)
                ))
            })?;
        let chunk = Chunk {
            kind,
            data: &data[start..end],
        };

        if self.options.verify_crc {
            let stored = u32::from_be_bytes([data[end], data[end + 1], data[end + 2], data[end + 3]]);
            let computed = chunk_crc(&chunk.kind, chunk.data);
            if stored != computed {
                return Err(Error::InvalidDecode(format!(
                    "CRC mismatch in {} chunk",
                    chunk.name()
                )));
            }
        }

        self.pos = end + 4;
        Ok(chunk)
    }

    fn handle_chunk(&mut self, chunk: &Chunk<'_>) -> Result<()> {
        if self.header.is_none() && chunk.kind != IHDR {
            return Err(Error::CorruptChunkOrdering(format!(
                "{} chunk before IHDR",
                chunk.name()
            )));
        }

        match chunk.kind {
            IHDR => {
                if self.header.is_some() {
                    return Err(Error::CorruptChunkOrdering("duplicate IHDR chunk".into()));
                }
                self.parse_ihdr(chunk.data)?;
            }
            PLTE => log::debug!("png: ignoring {}-entry suggested palette", chunk.data.len() / 3),
            IDAT if self.seen_iend => {
                if self.options.strict {
                    return Err(Error::CorruptChunkOrdering("IDAT after IEND".into()));
                }
                log::warn!("png: skipping IDAT after IEND ({} bytes)", chunk.data.len());
            }
            IDAT => self.idat.extend_from_slice(chunk.data),
            IEND => self.seen_iend = true,
            _ if chunk.is_ancillary() => {
                log::trace!("png: skipping {} chunk ({} bytes)", chunk.name(), chunk.data.len());
            }
            _ => {
                return Err(Error::UnsupportedDecode(format!(
                    "critical chunk {}",
                    chunk.name()
                )))
            }
        }
        Ok(())
    }

    fn parse_ihdr(&mut self, data: &[u8]) -> Result<()> {
        if data.len() != 13 {
            return Err(Error::InvalidDecode("invalid IHDR length".into()));
        }
        let width = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let height = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let (bit_depth, color_type) = (data[8], data[9]);
        let (compression, filter, interlace) = (data[10], data[11], data[12]);
        log::debug!(
            "png: IHDR {width}x{height}, depth {bit_depth}, color type {color_type}, interlace {interlace}"
        );

        if width == 0 || height == 0 {
            return Err(Error::InvalidDimensions { width, height });
        }
        let max = self.options.max_dimension;
        if width > max || height > max {
            return Err(Error::ImageTooLarge { width, height, max });
        }
        let color_type = ColorType::try_from(color_type)?;
        if bit_depth != 8 {
            return Err(Error::UnsupportedDecode(format!(
                "{bit_depth}-bit PNG samples"
            )));
        }
        if compression != 0 {
            return Err(Error::InvalidDecode(
                "unsupported compression method".into(),
            ));
        }
        if filter != 0 {
            return Err(Error::InvalidDecode("unsupported filter method".into()));
        }
        match interlace {
            0 => {}
            1 => {
                return Err(Error::UnsupportedDecode(
                    "Adam7 interlaced images not supported".into(),
                ))
            }
            _ => {
                return Err(Error::InvalidDecode(format!(
                    "invalid interlace method {interlace}"
                )))
            }
        }

        self.image = Some(Image::allocate(width, height, self.allocator)?);
        self.header = Some(Header {
            width,
            height,
            color_type,
        });
        Ok(())
    }

    /// Inflate the collected IDAT stream into the output image.
    fn finish(mut self) -> Result<Image> {
        let (header, mut image) = match (self.header, self.image.take()) {
            (Some(header), Some(image)) => (header, image),
            _ => return Err(Error::InvalidDecode("missing IHDR chunk".into())),
        };
        let strict = self.options.strict;

        if !self.seen_iend {
            if strict {
                return Err(Error::InvalidDecode("missing IEND chunk".into()));
            }
            log::warn!("png: missing IEND chunk");
        }
        if self.idat.is_empty() {
            if strict {
                return Err(Error::InvalidDecode("no IDAT data".into()));
            }
            log::warn!("png: no IDAT data, returning blank image");
            return Ok(image);
        }

        let bpp = header.color_type.bytes_per_pixel();
        let window = self.options.inflate_window.max(1);
        let mut recon = ScanlineReconstructor::new(&mut image, bpp)?;
        let inflated = ZlibInflater.inflate_windowed(&self.idat, window, &mut |piece: &[u8]| {
            recon.push_bytes(piece)
        });
        let (rows, complete, ignored) =
            (recon.rows_done(), recon.is_complete(), recon.ignored_bytes());

        match inflated {
            Ok(()) => {}
            Err(Error::StreamUnderrun) if !strict => {
                log::warn!(
                    "png: image data truncated after {rows} of {} rows",
                    header.height
                );
            }
            Err(err) => return Err(err),
        }
        if !complete {
            if strict {
                return Err(Error::StreamUnderrun);
            }
            log::warn!("png: only {rows} of {} rows present", header.height);
        }
        if ignored > 0 {
            log::warn!("png: ignored {ignored} bytes after the last scanline");
        }

        log::trace!(
            "png: decoded {}x{} from {} bytes of IDAT",
            header.width,
            header.height,
            self.idat.len()
        );
        Ok(image)
    }
}

/// Decode a PNG with default options.
pub fn decode_png(data: &[u8]) -> Result<Image> {
    decode_png_with(data, &DecodeOptions::default(), &SystemAllocator)
}

/// Decode a PNG with explicit options and pixel allocator.
pub fn decode_png_with(
    data: &[u8],
    options: &DecodeOptions,
    allocator: &dyn PixelAllocator,
) -> Result<Image> {
    PngDecoder::new(data, options, allocator).decode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut out = (data.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(data);
        out.extend_from_slice(&chunk_crc(kind, data).to_be_bytes());
        out
    }

    fn ihdr(width: u32, height: u32, depth: u8, color: u8, interlace: u8) -> Vec<u8> {
        let mut data = width.to_be_bytes().to_vec();
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&[depth, color, 0, 0, interlace]);
        chunk(b"IHDR", &data)
    }

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    /// Unfiltered scanlines for raw interleaved samples.
    fn scanlines(raw: &[u8], stride: usize) -> Vec<u8> {
        raw.chunks(stride)
            .flat_map(|row| std::iter::once(0).chain(row.iter().copied()))
            .collect()
    }

    fn png(width: u32, height: u32, color: u8, raw: &[u8]) -> Vec<u8> {
        let bpp = if color == 6 { 4 } else { 3 };
        let mut out = PNG_SIGNATURE.to_vec();
        out.extend(ihdr(width, height, 8, color, 0));
        out.extend(chunk(b"IDAT", &zlib(&scanlines(raw, width as usize * bpp))));
        out.extend(chunk(b"IEND", &[]));
        out
    }

    fn strict() -> DecodeOptions {
        DecodeOptions::builder().strict(true).build()
    }

    #[test]
    fn rejects_non_png() {
        assert!(matches!(decode_png(b"not a PNG file"), Err(Error::FormatMismatch)));
        assert!(matches!(decode_png(&[]), Err(Error::FormatMismatch)));
    }

    #[test]
    fn signature_only_has_no_header() {
        let err = decode_png(&PNG_SIGNATURE).unwrap_err();
        assert!(err.to_string().contains("missing IHDR"));
    }

    #[test]
    fn decodes_rgb() {
        let raw = [255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 0];
        let image = decode_png(&png(2, 2, 2, &raw)).unwrap();
        assert_eq!((image.width(), image.height(), image.pitch()), (2, 2, 8));
        assert_eq!(
            image.data(),
            &[255, 0, 0, 255, 0, 255, 0, 255, 0, 0, 255, 255, 255, 255, 0, 255]
        );
    }

    #[test]
    fn decodes_rgba() {
        let raw = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];
        let image = decode_png(&png(3, 1, 6, &raw)).unwrap();
        assert_eq!(image.data(), &raw);
    }

    #[test]
    fn oversized_inflate_window_is_clamped() {
        let raw: Vec<u8> = (0..5 * 3 * 3).map(|i| (i * 11) as u8).collect();
        let options = DecodeOptions {
            inflate_window: usize::MAX,
            ..DecodeOptions::default()
        };
        let image = decode_png_with(&png(5, 3, 2, &raw), &options, &SystemAllocator).unwrap();
        assert_eq!(image, decode_png(&png(5, 3, 2, &raw)).unwrap());
        assert_eq!(image.pixel(4, 2), Some([raw[42], raw[43], raw[44], 255]));
    }

    #[test]
    fn unsupported_headers() {
        for (depth, color, interlace) in [(8, 0, 0), (8, 3, 0), (8, 4, 0), (8, 5, 0), (16, 2, 0), (8, 2, 1)] {
            let mut data = PNG_SIGNATURE.to_vec();
            data.extend(ihdr(1, 1, depth, color, interlace));
            assert!(
                matches!(decode_png(&data), Err(Error::UnsupportedDecode(_))),
                "depth {depth} color {color} interlace {interlace}"
            );
        }
    }

    #[test]
    fn zero_and_oversized_dimensions() {
        let mut data = PNG_SIGNATURE.to_vec();
        data.extend(ihdr(0, 4, 8, 2, 0));
        assert!(matches!(
            decode_png(&data),
            Err(Error::InvalidDimensions { width: 0, height: 4 })
        ));

        let mut data = PNG_SIGNATURE.to_vec();
        data.extend(ihdr(100, 1, 8, 2, 0));
        let options = DecodeOptions::builder().max_dimension(64).build();
        assert!(matches!(
            decode_png_with(&data, &options, &SystemAllocator),
            Err(Error::ImageTooLarge { max: 64, .. })
        ));
    }

    #[test]
    fn ihdr_must_come_first() {
        let mut data = PNG_SIGNATURE.to_vec();
        data.extend(chunk(b"IDAT", &[0]));
        data.extend(ihdr(1, 1, 8, 2, 0));
        assert!(matches!(
            decode_png(&data),
            Err(Error::CorruptChunkOrdering(_))
        ));
    }

    #[test]
    fn crc_mismatch() {
        let mut data = png(1, 1, 2, &[1, 2, 3]);
        // Last byte of the IHDR CRC.
        data[8 + 8 + 13 + 3] ^= 0xFF;
        let err = decode_png(&data).unwrap_err();
        assert!(err.to_string().contains("CRC mismatch in IHDR"));

        let unchecked = DecodeOptions::builder().verify_crc(false).build();
        let image = decode_png_with(&data, &unchecked, &SystemAllocator).unwrap();
        assert_eq!(image.pixel(0, 0), Some([1, 2, 3, 255]));
    }

    #[test]
    fn chunk_length_past_end_is_fatal() {
        let mut data = PNG_SIGNATURE.to_vec();
        data.extend_from_slice(&[0x7F, 0xFF, 0xFF, 0xFF]);
        data.extend_from_slice(b"IHDR");
        let err = decode_png(&data).unwrap_err();
        assert!(err.to_string().contains("exceeds file"));
    }

    #[test]
    fn idat_after_iend() {
        let mut data = png(1, 1, 2, &[9, 8, 7]);
        data.extend(chunk(b"IDAT", &zlib(&[0, 1, 1, 1])));

        let image = decode_png(&data).unwrap();
        assert_eq!(image.pixel(0, 0), Some([9, 8, 7, 255]));

        let err = decode_png_with(&data, &strict(), &SystemAllocator).unwrap_err();
        assert!(matches!(err, Error::CorruptChunkOrdering(_)));
    }

    #[test]
    fn missing_iend() {
        let data = png(1, 1, 2, &[4, 5, 6]);
        let truncated = &data[..data.len() - CHUNK_OVERHEAD];

        let image = decode_png(truncated).unwrap();
        assert_eq!(image.pixel(0, 0), Some([4, 5, 6, 255]));

        let err = decode_png_with(truncated, &strict(), &SystemAllocator).unwrap_err();
        assert!(err.to_string().contains("IEND"));
    }

    #[test]
    fn no_image_data() {
        let mut data = PNG_SIGNATURE.to_vec();
        data.extend(ihdr(2, 2, 8, 6, 0));
        data.extend(chunk(b"IEND", &[]));

        let image = decode_png(&data).unwrap();
        assert_eq!((image.width(), image.height()), (2, 2));
        assert!(image.data().iter().all(|&b| b == 0));

        let err = decode_png_with(&data, &strict(), &SystemAllocator).unwrap_err();
        assert!(err.to_string().contains("no IDAT"));
    }

    #[test]
    fn truncated_image_data() {
        let raw: Vec<u8> = (0..4 * 4 * 3).map(|i| i as u8).collect();
        let mut data = PNG_SIGNATURE.to_vec();
        data.extend(ihdr(4, 4, 8, 2, 0));
        // Stored so that the prefix decodes byte for byte.
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::none());
        encoder.write_all(&scanlines(&raw, 12)).unwrap();
        let stored = encoder.finish().unwrap();
        data.extend(chunk(b"IDAT", &stored[..stored.len() - 20]));
        data.extend(chunk(b"IEND", &[]));

        let image = decode_png(&data).unwrap();
        assert_eq!(image.pixel(0, 0), Some([0, 1, 2, 255]));
        assert_eq!(image.pixel(3, 3), Some([0, 0, 0, 0]));

        let err = decode_png_with(&data, &strict(), &SystemAllocator).unwrap_err();
        assert!(matches!(err, Error::StreamUnderrun));
    }

    #[test]
    fn bad_filter_tag_is_fatal() {
        let mut data = PNG_SIGNATURE.to_vec();
        data.extend(ihdr(1, 1, 8, 2, 0));
        data.extend(chunk(b"IDAT", &zlib(&[9, 1, 2, 3])));
        data.extend(chunk(b"IEND", &[]));
        let err = decode_png(&data).unwrap_err();
        assert!(err.to_string().contains("invalid filter type 9"));
    }

    #[test]
    fn skips_ancillary_rejects_unknown_critical() {
        let data = png(1, 1, 2, &[1, 1, 1]);
        let iend_at = data.len() - CHUNK_OVERHEAD;
        let mut with_text = data[..iend_at].to_vec();
        with_text.extend(chunk(b"tEXt", b"Comment\0hi"));
        with_text.extend_from_slice(&data[iend_at..]);
        assert!(decode_png(&with_text).is_ok());

        let mut with_unknown = data[..iend_at].to_vec();
        with_unknown.extend(chunk(b"ABCD", &[]));
        with_unknown.extend_from_slice(&data[iend_at..]);
        assert!(matches!(
            decode_png(&with_unknown),
            Err(Error::UnsupportedDecode(_))
        ));
    }
}
