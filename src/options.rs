//! Decoder configuration.

use crate::compress::inflate::MAX_WINDOW;

/// Default size of the windows handed from the inflater to the scanline
/// reconstructor.
pub const DEFAULT_INFLATE_WINDOW: usize = 32 * 1024;

/// Maximum dimension for decoded images (16 million pixels per side).
pub const DEFAULT_MAX_DIMENSION: u32 = 1 << 24;

/// Options shared by the JPEG and PNG decoders.
///
/// Use [`DecodeOptions::builder()`] to create options with a fluent API.
///
/// # Example
///
/// ```rust
/// use pixdec::DecodeOptions;
///
/// let options = DecodeOptions::builder()
///     .strict(true)
///     .inflate_window(4096)
///     .build();
/// assert!(options.strict);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Turn tolerated corruption (truncated scans, IDAT after IEND, missing
    /// IEND, short image data) into errors instead of partial images.
    pub strict: bool,
    /// Check the CRC of every PNG chunk.
    pub verify_crc: bool,
    /// Largest number of inflated bytes handed to the scanline reconstructor
    /// at once.
    pub inflate_window: usize,
    /// Largest accepted width or height.
    pub max_dimension: u32,
    /// Crop JPEG output from the MCU-aligned canvas down to the frame size.
    pub crop_to_frame: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            strict: false,
            verify_crc: true,
            inflate_window: DEFAULT_INFLATE_WINDOW,
            max_dimension: DEFAULT_MAX_DIMENSION,
            crop_to_frame: false,
        }
    }
}

impl DecodeOptions {
    /// Create a builder for [`DecodeOptions`].
    pub fn builder() -> DecodeOptionsBuilder {
        DecodeOptionsBuilder::default()
    }
}

/// Builder for [`DecodeOptions`].
#[derive(Debug, Clone, Default)]
pub struct DecodeOptionsBuilder {
    options: DecodeOptions,
}

impl DecodeOptionsBuilder {
    pub fn strict(mut self, value: bool) -> Self {
        self.options.strict = value;
        self
    }

    pub fn verify_crc(mut self, value: bool) -> Self {
        self.options.verify_crc = value;
        self
    }

    /// Clamped to `1..=MAX_WINDOW` bytes.
    pub fn inflate_window(mut self, bytes: usize) -> Self {
        self.options.inflate_window = bytes.clamp(1, MAX_WINDOW);
        self
    }

    pub fn max_dimension(mut self, value: u32) -> Self {
        self.options.max_dimension = value;
        self
    }

    pub fn crop_to_frame(mut self, value: bool) -> Self {
        self.options.crop_to_frame = value;
        self
    }

    /// Build the [`DecodeOptions`].
    #[must_use]
    pub fn build(self) -> DecodeOptions {
        self.options
    }
}
