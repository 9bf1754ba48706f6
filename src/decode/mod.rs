//! Image decoders for baseline JPEG and truecolor PNG.
//!
//! Every decoder writes into an RGBA8 [`Image`] obtained from a
//! [`PixelAllocator`]. The format is chosen from the leading bytes with
//! [`ImageFormat::sniff`]; unknown data is [`Error::FormatMismatch`].
//!
//! # Supported Formats
//!
//! ## PNG
//! - Truecolor (RGB) and truecolor with alpha (RGBA), 8 bits per sample
//! - All filter types (None, Sub, Up, Average, Paeth)
//! - Non-interlaced images only (Adam7 not supported)
//!
//! ## JPEG
//! - Baseline and extended sequential Huffman DCT (SOF0, SOF1)
//! - 8-bit precision
//! - Grayscale and YCbCr color without chroma subsampling
//! - Restart intervals
//! - Progressive (SOF2) not supported
//!
//! # Example
//!
//! ```
//! use pixdec::decode::ImageFormat;
//!
//! assert_eq!(ImageFormat::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageFormat::Jpeg));
//! assert_eq!(ImageFormat::sniff(b"GIF89a"), None);
//! ```

pub mod color;
pub mod dct;
pub mod huffman;
pub mod jpeg;
pub mod png;
pub mod scanline;

pub use jpeg::{decode_jpeg, decode_jpeg_with, JpegDecoder};
pub use png::{decode_png, decode_png_with, PngDecoder};

use crate::allocator::{PixelAllocator, SystemAllocator};
use crate::error::{Error, Result};
use crate::image::Image;
use crate::options::DecodeOptions;

/// Container formats the crate can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    /// Identify the format from the first bytes of a file.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&png::PNG_SIGNATURE) {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8]) {
            Some(ImageFormat::Jpeg)
        } else {
            None
        }
    }

    /// Conventional file extension.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
        }
    }
}

/// Decode a JPEG or PNG file with default options.
pub fn decode(bytes: &[u8]) -> Result<Image> {
    decode_with_options(bytes, &DecodeOptions::default())
}

/// Decode a JPEG or PNG file.
pub fn decode_with_options(bytes: &[u8], options: &DecodeOptions) -> Result<Image> {
    decode_with_allocator(bytes, options, &SystemAllocator)
}

/// Decode a JPEG or PNG file into a buffer from `allocator`.
pub fn decode_with_allocator(
    bytes: &[u8],
    options: &DecodeOptions,
    allocator: &dyn PixelAllocator,
) -> Result<Image> {
    match ImageFormat::sniff(bytes) {
        Some(ImageFormat::Jpeg) => JpegDecoder::new(bytes, options, allocator).decode(),
        Some(ImageFormat::Png) => PngDecoder::new(bytes, options, allocator).decode(),
        None => {
            log::debug!(
                "no known signature in {:02X?}",
                &bytes[..bytes.len().min(8)]
            );
            Err(Error::FormatMismatch)
        }
    }
}

/// Decode many independent files concurrently, one decoder per file.
///
/// Results come back in input order.
#[cfg(feature = "parallel")]
pub fn decode_batch<B>(inputs: &[B], options: &DecodeOptions) -> Vec<Result<Image>>
where
    B: AsRef<[u8]> + Sync,
{
    use rayon::prelude::*;

    inputs
        .par_iter()
        .map(|bytes| decode_with_options(bytes.as_ref(), options))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniff_signatures() {
        assert_eq!(ImageFormat::sniff(&png::PNG_SIGNATURE), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::sniff(&[0xFF, 0xD8]), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::sniff(&[0xFF]), None);
        assert_eq!(ImageFormat::sniff(&[]), None);
        assert_eq!(ImageFormat::sniff(b"BM\x00\x00"), None);
    }

    #[test]
    fn unknown_data_is_format_mismatch() {
        assert!(matches!(decode(b"GIF89a"), Err(Error::FormatMismatch)));
        assert!(decode(b"GIF89a").unwrap_or_default().is_empty());
    }

    #[test]
    fn extensions() {
        assert_eq!(ImageFormat::Jpeg.extension(), "jpg");
        assert_eq!(ImageFormat::Png.extension(), "png");
    }
}
