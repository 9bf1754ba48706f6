#![allow(dead_code)]

pub mod jpeg;
pub mod png;

/// Largest per-channel difference between two RGBA buffers.
pub fn max_channel_diff(a: &[u8], b: &[u8]) -> u8 {
    assert_eq!(a.len(), b.len(), "buffer length mismatch");
    a.iter()
        .zip(b)
        .map(|(&x, &y)| x.abs_diff(y))
        .max()
        .unwrap_or(0)
}
