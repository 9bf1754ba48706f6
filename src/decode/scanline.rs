//! PNG scanline filter reconstruction.
//!
//! Inflated IDAT bytes arrive as a sequence of scanlines, each prefixed by a
//! filter-type byte. [`ScanlineReconstructor`] consumes them a byte at a time
//! so it can sit directly behind a windowed inflater, and writes every
//! reconstructed sample straight into the RGBA output image. Neighbouring
//! samples for the predictors are read back from that image.

use crate::error::{Error, Result};
use crate::image::{Image, BYTES_PER_PIXEL};

/// PNG filter types (filter method 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FilterType {
    None = 0,
    Sub = 1,
    Up = 2,
    Average = 3,
    Paeth = 4,
}

impl FilterType {
    pub const ALL: [FilterType; 5] = [
        FilterType::None,
        FilterType::Sub,
        FilterType::Up,
        FilterType::Average,
        FilterType::Paeth,
    ];

    /// Predicted value from left (`a`), above (`b`) and upper-left (`c`).
    #[inline]
    pub fn predict(self, a: u8, b: u8, c: u8) -> u8 {
        match self {
            FilterType::None => 0,
            FilterType::Sub => a,
            FilterType::Up => b,
            FilterType::Average => ((a as u16 + b as u16) >> 1) as u8,
            FilterType::Paeth => paeth_predictor(a, b, c),
        }
    }

    /// Apply the filter to one raw scanline; the forward direction.
    ///
    /// `prev` is the previous raw scanline, or empty for the first row.
    /// The returned bytes start with the filter tag.
    pub fn filter(self, row: &[u8], prev: &[u8], bpp: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(row.len() + 1);
        out.push(self as u8);
        for (i, &raw) in row.iter().enumerate() {
            let a = if i >= bpp { row[i - bpp] } else { 0 };
            let b = prev.get(i).copied().unwrap_or(0);
            let c = if i >= bpp {
                prev.get(i - bpp).copied().unwrap_or(0)
            } else {
                0
            };
            out.push(raw.wrapping_sub(self.predict(a, b, c)));
        }
        out
    }
}

impl TryFrom<u8> for FilterType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(FilterType::None),
            1 => Ok(FilterType::Sub),
            2 => Ok(FilterType::Up),
            3 => Ok(FilterType::Average),
            4 => Ok(FilterType::Paeth),
            _ => Err(Error::InvalidDecode(format!("invalid filter type {value}"))),
        }
    }
}

/// Paeth predictor; ties prefer `a`, then `b`, then `c`.
#[inline]
pub fn paeth_predictor(a: u8, b: u8, c: u8) -> u8 {
    let a = a as i16;
    let b = b as i16;
    let c = c as i16;

    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();

    if pa <= pb && pa <= pc {
        a as u8
    } else if pb <= pc {
        b as u8
    } else {
        c as u8
    }
}

/// Streams filtered scanline bytes into an RGBA [`Image`].
pub struct ScanlineReconstructor<'a> {
    image: &'a mut Image,
    bpp: usize,
    scanline: usize,
    height: usize,
    row: usize,
    /// `None` while the next byte is a filter tag.
    col: Option<usize>,
    filter: FilterType,
    ignored: usize,
}

impl<'a> ScanlineReconstructor<'a> {
    /// `bpp` is the source bytes per pixel: 3 for truecolor, 4 with alpha.
    pub fn new(image: &'a mut Image, bpp: usize) -> Result<Self> {
        if bpp == 0 || bpp > BYTES_PER_PIXEL {
            return Err(Error::UnsupportedDecode(format!(
                "{bpp} bytes per pixel"
            )));
        }
        let scanline = image.width() as usize * bpp;
        let height = image.height() as usize;
        Ok(Self {
            image,
            bpp,
            scanline,
            height,
            row: 0,
            col: None,
            filter: FilterType::None,
            ignored: 0,
        })
    }

    /// Feed the next run of inflated bytes.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        for &byte in bytes {
            if self.row >= self.height {
                self.ignored += 1;
                continue;
            }
            match self.col {
                None => {
                    self.filter = FilterType::try_from(byte).map_err(|_| {
                        Error::InvalidDecode(format!(
                            "invalid filter type {byte} on row {}",
                            self.row
                        ))
                    })?;
                    self.col = Some(0);
                }
                Some(col) => {
                    self.reconstruct(col, byte);
                    if col + 1 == self.scanline {
                        self.col = None;
                        self.row += 1;
                    } else {
                        self.col = Some(col + 1);
                    }
                }
            }
        }
        Ok(())
    }

    /// Whether every scanline has been fully received.
    pub fn is_complete(&self) -> bool {
        self.row >= self.height
    }

    /// Bytes received past the last scanline.
    pub fn ignored_bytes(&self) -> usize {
        self.ignored
    }

    /// Rows fully reconstructed so far.
    pub fn rows_done(&self) -> usize {
        self.row
    }

    #[inline]
    fn offset(&self, row: usize, col: usize) -> usize {
        row * self.image.pitch() + (col / self.bpp) * BYTES_PER_PIXEL + col % self.bpp
    }

    #[inline]
    fn sample(&self, row: usize, col: usize) -> u8 {
        self.image.data()[self.offset(row, col)]
    }

    fn reconstruct(&mut self, col: usize, raw: u8) {
        let (row, bpp) = (self.row, self.bpp);
        let a = if col >= bpp { self.sample(row, col - bpp) } else { 0 };
        let b = if row > 0 { self.sample(row - 1, col) } else { 0 };
        let c = if row > 0 && col >= bpp {
            self.sample(row - 1, col - bpp)
        } else {
            0
        };
        let value = raw.wrapping_add(self.filter.predict(a, b, c));

        let offset = self.offset(row, col);
        let data = self.image.data_mut();
        data[offset] = value;
        if bpp == 3 && col % 3 == 2 {
            data[offset + 1] = 255;
        }
    }
}
