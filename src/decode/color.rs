//! JFIF YCbCr to RGB conversion.

/// Homogeneous JFIF conversion: `[R G B 1] = M * [Y Cb Cr 1]`.
///
/// The last column folds in the -128 chroma offset, so samples go in
/// straight from the IDCT without recentering.
pub const YCBCR_TO_RGB: [[f32; 4]; 4] = [
    [1.0, 0.0, 1.402, -1.402 * 128.0],
    [1.0, -0.344_136, -0.714_136, (0.344_136 + 0.714_136) * 128.0],
    [1.0, 1.772, 0.0, -1.772 * 128.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Round to the nearest integer and clamp to `[0, 255]`.
#[inline]
pub fn clamp_sample(value: f32) -> u8 {
    (value + 0.5).clamp(0.0, 255.0) as u8
}

/// Convert one YCbCr sample triple to opaque RGBA.
#[inline]
pub fn ycbcr_to_rgba(y: f32, cb: f32, cr: f32) -> [u8; 4] {
    let input = [y, cb, cr, 1.0];
    let mut out = [0u8; 4];
    for (channel, row) in out.iter_mut().zip(YCBCR_TO_RGB.iter()).take(3) {
        let value: f32 = row.iter().zip(input.iter()).map(|(m, v)| m * v).sum();
        *channel = clamp_sample(value);
    }
    out[3] = 255;
    out
}

/// Gray to opaque RGBA.
#[inline]
pub fn luma_to_rgba(y: f32) -> [u8; 4] {
    let v = clamp_sample(y);
    [v, v, v, 255]
}
