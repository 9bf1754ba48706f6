//! # pixdec
//!
//! A small, dependency-light decoder that turns baseline JPEG/JFIF and
//! truecolor PNG files into RGBA8 pixel buffers ready for upload to a
//! renderer.
//!
//! - **JPEG**: baseline sequential Huffman DCT, grayscale or YCbCr without
//!   chroma subsampling, restart intervals, lenient recovery from truncated
//!   scans.
//! - **PNG**: 8-bit RGB and RGBA, all five scanline filters, a built-in
//!   windowed zlib inflater with CRC and Adler-32 checking.
//! - **Buffers**: output memory comes from a [`PixelAllocator`], so callers
//!   can route it into their own pools.
//!
//! ## Quickstart
//!
//! ```rust
//! # fn main() -> pixdec::Result<()> {
//! # let bytes: Vec<u8> = {
//! #     let mut png = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
//! #     let chunk = |kind: &[u8; 4], data: &[u8]| {
//! #         let mut out = (data.len() as u32).to_be_bytes().to_vec();
//! #         out.extend_from_slice(kind);
//! #         out.extend_from_slice(data);
//! #         out.extend_from_slice(&pixdec::compress::crc32::chunk_crc(kind, data).to_be_bytes());
//! #         out
//! #     };
//! #     png.extend(chunk(b"IHDR", &[0, 0, 0, 1, 0, 0, 0, 1, 8, 2, 0, 0, 0]));
//! #     // zlib stored block holding one unfiltered RGB pixel.
//! #     let raw = [0u8, 10, 20, 30];
//! #     let mut z = vec![0x78, 0x01, 0x01, 4, 0, 0xFB, 0xFF];
//! #     z.extend_from_slice(&raw);
//! #     z.extend_from_slice(&pixdec::compress::adler32::adler32(&raw).to_be_bytes());
//! #     png.extend(chunk(b"IDAT", &z));
//! #     png.extend(chunk(b"IEND", &[]));
//! #     png
//! # };
//! let image = pixdec::decode(&bytes)?;
//! assert_eq!((image.width(), image.height()), (1, 1));
//! assert_eq!(image.pixel(0, 0), Some([10, 20, 30, 255]));
//! # Ok(())
//! # }
//! ```
//!
//! ### Custom options
//!
//! ```rust
//! use pixdec::DecodeOptions;
//!
//! let options = DecodeOptions::builder()
//!     .strict(true) // corrupt input is an error, never a partial image
//!     .inflate_window(16 * 1024)
//!     .crop_to_frame(true)
//!     .build();
//! # let _ = pixdec::decode_with_options(&[], &options);
//! ```
//!
//! ## Feature flags
//! - `parallel` (default): [`decode_batch`] decodes many files concurrently
//!   via rayon.
//!
//! ## Error handling
//! Unknown data is [`Error::FormatMismatch`]; callers that want an empty
//! image instead can use `decode(bytes).unwrap_or_default()`. In the default
//! lenient mode a truncated JPEG scan or PNG data stream yields the partially
//! decoded image and a `log::warn!` record.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

pub mod allocator;
pub mod bits;
pub mod compress;
pub mod decode;
pub mod error;
pub mod image;
pub mod options;

pub use allocator::{PixelAllocator, SystemAllocator};
#[cfg(feature = "parallel")]
#[cfg_attr(docsrs, doc(cfg(feature = "parallel")))]
pub use decode::decode_batch;
pub use decode::{
    decode, decode_jpeg, decode_png, decode_with_allocator, decode_with_options, ImageFormat,
};
pub use error::{Error, Result};
pub use image::Image;
pub use options::{DecodeOptions, DecodeOptionsBuilder};
