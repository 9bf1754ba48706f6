//! Checksums and the DEFLATE engine the PNG decoder consumes.

pub mod adler32;
pub mod crc32;
pub mod inflate;

pub use inflate::{inflate_zlib, Inflate, ZlibInflater};
