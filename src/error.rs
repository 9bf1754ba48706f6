//! Error types for decoding.

use thiserror::Error;

/// Errors produced while decoding an image.
#[derive(Debug, Error)]
pub enum Error {
    /// The input does not start with a JPEG or PNG signature.
    #[error("unrecognized image format")]
    FormatMismatch,

    /// The input is well formed but uses a feature this crate does not decode.
    #[error("unsupported feature: {0}")]
    UnsupportedDecode(String),

    /// The entropy-coded data ended before a value could be decoded.
    #[error("unexpected end of entropy-coded data")]
    StreamUnderrun,

    /// Chunks appeared in an order the container format forbids.
    #[error("corrupt chunk ordering: {0}")]
    CorruptChunkOrdering(String),

    /// The input is malformed.
    #[error("invalid image data: {0}")]
    InvalidDecode(String),

    /// Width or height is zero.
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Declared width.
        width: u32,
        /// Declared height.
        height: u32,
    },

    /// Width or height exceeds the configured maximum.
    #[error("image too large: {width}x{height} (max {max})")]
    ImageTooLarge {
        /// Declared width.
        width: u32,
        /// Declared height.
        height: u32,
        /// Largest accepted dimension.
        max: u32,
    },

    /// The allocator could not provide a pixel buffer.
    #[error("failed to allocate {size} bytes for pixel data")]
    AllocationFailed {
        /// Requested buffer size in bytes.
        size: usize,
    },
}

/// Result type alias for decode operations.
pub type Result<T> = std::result::Result<T, Error>;
