//! The decoded image value shared by every format.

use crate::allocator::PixelAllocator;
use crate::error::{Error, Result};

/// Bits per pixel of every decoded image (RGBA, 8 bits per channel).
pub const BIT_COUNT: u32 = 32;

/// Bytes per output pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// An RGBA8 pixel buffer.
///
/// Rows are `pitch` bytes apart and `data.len() == pitch * height` always
/// holds. The buffer comes from a [`PixelAllocator`] and belongs to the
/// caller once a decode call returns it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    pitch: usize,
    data: Vec<u8>,
}

impl Image {
    /// Allocate a zero-filled image of the given dimensions.
    pub fn allocate(width: u32, height: u32, allocator: &dyn PixelAllocator) -> Result<Self> {
        let pitch = Self::pitch_for(width);
        let size = pitch
            .checked_mul(height as usize)
            .ok_or_else(|| Error::InvalidDecode("image size overflow".into()))?;
        let data = allocator.allocate(size)?;
        if data.len() != size {
            return Err(Error::AllocationFailed { size });
        }
        Ok(Self {
            width,
            height,
            pitch,
            data,
        })
    }

    /// The 0x0 image with no pixel data.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Row pitch for a given width: `width * 4`, rounded up to 4 bytes.
    #[inline]
    pub fn pitch_for(width: u32) -> usize {
        (width as usize * BYTES_PER_PIXEL + 3) & !3
    }

    /// Image width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Always 32.
    pub fn bit_count(&self) -> u32 {
        BIT_COUNT
    }

    /// Bytes between the starts of consecutive rows.
    pub fn pitch(&self) -> usize {
        self.pitch
    }

    /// Size of the pixel buffer in bytes (`pitch * height`).
    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    /// Raw RGBA bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Consume the image and return its pixel buffer.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// True for the 0x0 image.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// One row of RGBA bytes, without any pitch padding.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.pitch;
        &self.data[start..start + self.width as usize * BYTES_PER_PIXEL]
    }

    /// The RGBA value at `(x, y)`, or `None` outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = y as usize * self.pitch + x as usize * BYTES_PER_PIXEL;
        let px = &self.data[offset..offset + BYTES_PER_PIXEL];
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Write the RGBA value at `(x, y)`. Out-of-range coordinates are ignored.
    pub(crate) fn put_pixel(&mut self, x: usize, y: usize, rgba: [u8; 4]) {
        if x >= self.width as usize || y >= self.height as usize {
            return;
        }
        let offset = y * self.pitch + x * BYTES_PER_PIXEL;
        self.data[offset..offset + BYTES_PER_PIXEL].copy_from_slice(&rgba);
    }

    /// Copy the top-left `width x height` region into a new image and hand
    /// this image's buffer back to the allocator.
    pub(crate) fn crop(
        self,
        width: u32,
        height: u32,
        allocator: &dyn PixelAllocator,
    ) -> Result<Self> {
        if width == self.width && height == self.height {
            return Ok(self);
        }
        let width = width.min(self.width);
        let height = height.min(self.height);
        let mut cropped = Self::allocate(width, height, allocator)?;
        let row_bytes = width as usize * BYTES_PER_PIXEL;
        for y in 0..height as usize {
            let src = y * self.pitch;
            let dst = y * cropped.pitch;
            cropped.data[dst..dst + row_bytes].copy_from_slice(&self.data[src..src + row_bytes]);
        }
        self.release(allocator);
        Ok(cropped)
    }

    /// Return the pixel buffer to the allocator it came from.
    pub fn release(self, allocator: &dyn PixelAllocator) {
        allocator.free(self.data);
    }
}
