//! PNG stream builders. CRCs come from flate2 so they are computed
//! independently of the crate under test.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::{Compression, Crc};

pub const SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

pub fn chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut crc = Crc::new();
    crc.update(kind);
    crc.update(data);

    let mut out = (data.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    out.extend_from_slice(&crc.sum().to_be_bytes());
    out
}

pub fn ihdr(width: u32, height: u32, color_type: u8) -> Vec<u8> {
    let mut data = width.to_be_bytes().to_vec();
    data.extend_from_slice(&height.to_be_bytes());
    data.extend_from_slice(&[8, color_type, 0, 0, 0]);
    chunk(b"IHDR", &data)
}

pub fn zlib(data: &[u8], level: u32) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Prefix every row of `raw` with filter type 0.
pub fn unfiltered(raw: &[u8], stride: usize) -> Vec<u8> {
    raw.chunks(stride)
        .flat_map(|row| std::iter::once(0u8).chain(row.iter().copied()))
        .collect()
}

/// Assemble a PNG whose compressed stream is cut into `idat_parts` IDAT chunks.
pub fn assemble(width: u32, height: u32, color_type: u8, zlib_stream: &[u8], idat_parts: usize) -> Vec<u8> {
    let mut out = SIGNATURE.to_vec();
    out.extend(ihdr(width, height, color_type));
    let part = zlib_stream.len().div_ceil(idat_parts.max(1)).max(1);
    for piece in zlib_stream.chunks(part) {
        out.extend(chunk(b"IDAT", piece));
    }
    out.extend(chunk(b"IEND", &[]));
    out
}

/// Expand packed RGB or RGBA samples to RGBA.
pub fn to_rgba(raw: &[u8], bpp: usize) -> Vec<u8> {
    raw.chunks(bpp)
        .flat_map(|px| [px[0], px[1], px[2], if bpp == 4 { px[3] } else { 255 }])
        .collect()
}
