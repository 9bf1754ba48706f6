//! 8x8 discrete cosine transforms.
//!
//! Both directions use the separable form of the JPEG DCT: a pass over the
//! rows followed by a pass over the columns, each a matrix product with a
//! cached table of `C(u)/2 * cos((2x+1)u*pi/16)`. Blocks are row-major,
//! `block[row * 8 + col]`, with the row index playing the role of `x`/`u`.
//! Sums are accumulated in `f64`.

use std::f64::consts::{FRAC_1_SQRT_2, PI};
use std::sync::OnceLock;

/// One 8x8 block in row-major order.
pub type Block = [f32; 64];

fn basis() -> &'static [[f64; 8]; 8] {
    static BASIS: OnceLock<[[f64; 8]; 8]> = OnceLock::new();
    BASIS.get_or_init(|| {
        let mut table = [[0.0f64; 8]; 8];
        for (x, row) in table.iter_mut().enumerate() {
            for (u, entry) in row.iter_mut().enumerate() {
                let c = if u == 0 { FRAC_1_SQRT_2 } else { 1.0 };
                *entry = 0.5 * c * (((2 * x + 1) as f64 * u as f64 * PI) / 16.0).cos();
            }
        }
        table
    })
}

/// Inverse DCT: frequency coefficients to spatial samples.
pub fn idct_8x8(input: &Block) -> Block {
    let t = basis();
    let mut rows = [0.0f64; 64];
    for u in 0..8 {
        for y in 0..8 {
            let mut sum = 0.0;
            for v in 0..8 {
                sum += t[y][v] * input[u * 8 + v] as f64;
            }
            rows[u * 8 + y] = sum;
        }
    }

    let mut out = [0.0f32; 64];
    for x in 0..8 {
        for y in 0..8 {
            let mut sum = 0.0;
            for u in 0..8 {
                sum += t[x][u] * rows[u * 8 + y];
            }
            out[x * 8 + y] = sum as f32;
        }
    }
    out
}

/// Forward DCT: spatial samples to frequency coefficients.
pub fn fdct_8x8(input: &Block) -> Block {
    let t = basis();
    let mut rows = [0.0f64; 64];
    for x in 0..8 {
        for v in 0..8 {
            let mut sum = 0.0;
            for y in 0..8 {
                sum += t[y][v] * input[x * 8 + y] as f64;
            }
            rows[x * 8 + v] = sum;
        }
    }

    let mut out = [0.0f32; 64];
    for u in 0..8 {
        for v in 0..8 {
            let mut sum = 0.0;
            for x in 0..8 {
                sum += t[x][u] * rows[x * 8 + v];
            }
            out[u * 8 + v] = sum as f32;
        }
    }
    out
}
