//! Minimal baseline JPEG writer for building test streams.
//!
//! Coefficients are supplied already quantized, in zigzag order, one block
//! per component per MCU. By default all components share quantization
//! table 0 and Huffman tables DC0/AC0; [`JpegSpec::chroma_tables`] gives the
//! chroma components their own table 1, DC1 and AC1.

use std::collections::HashMap;

use pixdec::decode::jpeg::ZIGZAG;

/// MSB-first bit writer with 0xFF byte stuffing.
#[derive(Default)]
pub struct BitWriter {
    out: Vec<u8>,
    acc: u32,
    nbits: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, code: u16, len: u8) {
        for i in (0..len).rev() {
            self.acc = (self.acc << 1) | ((code >> i) & 1) as u32;
            self.nbits += 1;
            if self.nbits == 8 {
                self.emit();
            }
        }
    }

    fn emit(&mut self) {
        let byte = self.acc as u8;
        self.out.push(byte);
        if byte == 0xFF {
            self.out.push(0x00);
        }
        self.acc = 0;
        self.nbits = 0;
    }

    /// Fill the current byte with 1 bits.
    pub fn pad(&mut self) {
        while self.nbits != 0 {
            self.write(1, 1);
        }
    }

    pub fn restart(&mut self, n: u8) {
        self.pad();
        self.out.extend_from_slice(&[0xFF, 0xD0 + (n & 7)]);
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.pad();
        self.out
    }
}

/// JPEG magnitude category and the bits that encode `value`.
pub fn magnitude(value: i32) -> (u8, u16) {
    let size = (32 - value.unsigned_abs().leading_zeros()) as u8;
    let bits = if value >= 0 {
        value
    } else {
        value + (1 << size) - 1
    };
    (size, bits as u16)
}

/// A DHT table: code counts per length and symbols in code order.
#[derive(Clone)]
pub struct HuffmanSpec {
    pub lengths: [u8; 16],
    pub symbols: Vec<u8>,
}

impl HuffmanSpec {
    /// ITU T.81 Table K.3, luminance DC.
    pub fn luminance_dc() -> Self {
        Self {
            lengths: [0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0],
            symbols: (0..12).collect(),
        }
    }

    /// Every baseline AC symbol with an 8-bit code.
    pub fn flat_ac() -> Self {
        let mut symbols = vec![0x00, 0xF0];
        for run in 0..16u8 {
            for size in 1..=10u8 {
                symbols.push((run << 4) | size);
            }
        }
        let mut lengths = [0u8; 16];
        lengths[7] = symbols.len() as u8;
        Self { lengths, symbols }
    }

    /// Canonical code assignment.
    pub fn codes(&self) -> HashMap<u8, (u16, u8)> {
        let mut map = HashMap::new();
        let mut code = 0u16;
        let mut k = 0;
        for len in 1..=16u8 {
            for _ in 0..self.lengths[len as usize - 1] {
                map.insert(self.symbols[k], (code, len));
                code += 1;
                k += 1;
            }
            code <<= 1;
        }
        map
    }

    /// ITU T.81 Table K.4, chrominance DC.
    pub fn chrominance_dc() -> Self {
        Self {
            lengths: [0, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0],
            symbols: (0..12).collect(),
        }
    }

    /// The [`flat_ac`](Self::flat_ac) symbols, reversed, with 9-bit codes.
    pub fn long_ac() -> Self {
        let mut table = Self::flat_ac();
        table.symbols.reverse();
        table.lengths.swap(7, 8);
        table
    }

    /// One table specification as it appears inside a DHT segment.
    fn table(&self, class_slot: u8) -> Vec<u8> {
        let mut body = vec![class_slot];
        body.extend_from_slice(&self.lengths);
        body.extend_from_slice(&self.symbols);
        body
    }

    fn segment(&self, class_slot: u8) -> Vec<u8> {
        marker_segment(0xC4, &self.table(class_slot))
    }
}

/// One MCU: a zigzag-ordered coefficient block per component.
pub type Mcu = Vec<[i32; 64]>;

/// A block with only a DC coefficient.
pub fn dc_block(dc: i32) -> [i32; 64] {
    let mut block = [0; 64];
    block[0] = dc;
    block
}

fn marker_segment(marker: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![0xFF, marker];
    out.extend_from_slice(&((body.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(body);
    out
}

/// Tables used by components 2 and 3 when present.
#[derive(Clone)]
pub struct ChromaTables {
    /// Quantization table 1 in zigzag order, written with 16-bit entries.
    pub quant: [u16; 64],
    pub dc: HuffmanSpec,
    pub ac: HuffmanSpec,
}

#[derive(Clone)]
pub struct JpegSpec {
    pub width: u16,
    pub height: u16,
    /// 1 (grayscale) or 3 (YCbCr).
    pub components: u8,
    pub restart_interval: u16,
    /// Quantization table in zigzag order.
    pub quant: [u8; 64],
    pub dc: HuffmanSpec,
    pub ac: HuffmanSpec,
    pub chroma: Option<ChromaTables>,
}

impl JpegSpec {
    pub fn new(width: u16, height: u16, components: u8) -> Self {
        Self {
            width,
            height,
            components,
            restart_interval: 0,
            quant: [1; 64],
            dc: HuffmanSpec::luminance_dc(),
            ac: HuffmanSpec::flat_ac(),
            chroma: None,
        }
    }

    /// Give the chroma components quantization table 1 and Huffman tables
    /// DC1/AC1. Both quantization tables then share one DQT segment and all
    /// four Huffman tables share one DHT segment.
    pub fn chroma_tables(mut self) -> Self {
        self.chroma = Some(ChromaTables {
            quant: std::array::from_fn(|k| 1 + (k % 3) as u16),
            dc: HuffmanSpec::chrominance_dc(),
            ac: HuffmanSpec::long_ac(),
        });
        self
    }

    fn uses_chroma_tables(&self, component: usize) -> bool {
        component > 0 && self.chroma.is_some()
    }

    pub fn restart_interval(mut self, interval: u16) -> Self {
        self.restart_interval = interval;
        self
    }

    pub fn mcus_x(&self) -> usize {
        (self.width as usize).div_ceil(8)
    }

    pub fn mcu_count(&self) -> usize {
        self.mcus_x() * (self.height as usize).div_ceil(8)
    }

    /// Everything from SOI through the SOS header.
    pub fn headers(&self) -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8];
        out.extend(marker_segment(
            0xE0,
            &[b'J', b'F', b'I', b'F', 0, 1, 1, 0, 0, 1, 0, 1, 0, 0],
        ));

        let mut dqt = vec![0x00];
        dqt.extend_from_slice(&self.quant);
        if let Some(chroma) = &self.chroma {
            dqt.push(0x11);
            for q in chroma.quant {
                dqt.extend_from_slice(&q.to_be_bytes());
            }
        }
        out.extend(marker_segment(0xDB, &dqt));

        let mut sof = vec![8];
        sof.extend_from_slice(&self.height.to_be_bytes());
        sof.extend_from_slice(&self.width.to_be_bytes());
        sof.push(self.components);
        for id in 1..=self.components {
            let quant = self.uses_chroma_tables(id as usize - 1) as u8;
            sof.extend_from_slice(&[id, 0x11, quant]);
        }
        out.extend(marker_segment(0xC0, &sof));

        match &self.chroma {
            Some(chroma) => {
                let mut dht = self.dc.table(0x00);
                dht.extend(self.ac.table(0x10));
                dht.extend(chroma.dc.table(0x01));
                dht.extend(chroma.ac.table(0x11));
                out.extend(marker_segment(0xC4, &dht));
            }
            None => {
                out.extend(self.dc.segment(0x00));
                out.extend(self.ac.segment(0x10));
            }
        }

        if self.restart_interval > 0 {
            out.extend(marker_segment(0xDD, &self.restart_interval.to_be_bytes()));
        }

        let mut sos = vec![self.components];
        for id in 1..=self.components {
            let tables = if self.uses_chroma_tables(id as usize - 1) { 0x11 } else { 0x00 };
            sos.extend_from_slice(&[id, tables]);
        }
        sos.extend_from_slice(&[0, 63, 0]);
        out.extend(marker_segment(0xDA, &sos));
        out
    }

    /// The stuffed entropy-coded segment, restart markers included.
    pub fn entropy(&self, mcus: &[Mcu]) -> Vec<u8> {
        let luma = (self.dc.codes(), self.ac.codes());
        let chroma = self
            .chroma
            .as_ref()
            .map(|tables| (tables.dc.codes(), tables.ac.codes()));
        let interval = self.restart_interval as usize;

        let mut writer = BitWriter::new();
        let mut predictors = vec![0i32; self.components as usize];
        for (i, mcu) in mcus.iter().enumerate() {
            if interval > 0 && i > 0 && i % interval == 0 {
                writer.restart(((i / interval - 1) % 8) as u8);
                predictors.iter_mut().for_each(|p| *p = 0);
            }
            for (c, (block, pred)) in mcu.iter().zip(predictors.iter_mut()).enumerate() {
                let (dc_codes, ac_codes) = match &chroma {
                    Some(codes) if c > 0 => codes,
                    _ => &luma,
                };
                encode_block(&mut writer, block, pred, dc_codes, ac_codes);
            }
        }
        writer.finish()
    }

    pub fn encode(&self, mcus: &[Mcu]) -> Vec<u8> {
        assert_eq!(mcus.len(), self.mcu_count());
        let mut out = self.headers();
        out.extend(self.entropy(mcus));
        out.extend_from_slice(&[0xFF, 0xD9]);
        out
    }

    /// Expected RGBA output of the MCU-aligned canvas, computed with a
    /// direct-sum IDCT in f64.
    pub fn reference_pixels(&self, mcus: &[Mcu]) -> (usize, usize, Vec<u8>) {
        let mcus_x = self.mcus_x();
        let width = mcus_x * 8;
        let height = (self.height as usize).div_ceil(8) * 8;
        let mut out = vec![0u8; width * height * 4];

        for (index, mcu) in mcus.iter().enumerate() {
            let planes: Vec<[f64; 64]> = mcu
                .iter()
                .enumerate()
                .map(|(c, zz)| {
                    let mut natural = [0.0f64; 64];
                    for (k, &v) in zz.iter().enumerate() {
                        let q = match &self.chroma {
                            Some(chroma) if c > 0 => chroma.quant[k] as f64,
                            _ => self.quant[k] as f64,
                        };
                        natural[ZIGZAG[k]] = v as f64 * q;
                    }
                    direct_idct(&natural)
                })
                .collect();

            let (mx, my) = (index % mcus_x, index / mcus_x);
            for y in 0..8 {
                for x in 0..8 {
                    let i = y * 8 + x;
                    let rgb = if planes.len() == 1 {
                        let v = clamp(planes[0][i]);
                        [v, v, v]
                    } else {
                        let (l, cb, cr) = (planes[0][i], planes[1][i] - 128.0, planes[2][i] - 128.0);
                        [
                            clamp(l + 1.402 * cr),
                            clamp(l - 0.344136 * cb - 0.714136 * cr),
                            clamp(l + 1.772 * cb),
                        ]
                    };
                    let offset = ((my * 8 + y) * width + mx * 8 + x) * 4;
                    out[offset..offset + 4].copy_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
                }
            }
        }
        (width, height, out)
    }
}

fn encode_block(
    writer: &mut BitWriter,
    block: &[i32; 64],
    pred: &mut i32,
    dc_codes: &HashMap<u8, (u16, u8)>,
    ac_codes: &HashMap<u8, (u16, u8)>,
) {
    let diff = block[0] - *pred;
    *pred = block[0];
    let (size, bits) = magnitude(diff);
    let (code, len) = dc_codes[&size];
    writer.write(code, len);
    writer.write(bits, size);

    let mut run = 0u8;
    for &value in &block[1..] {
        if value == 0 {
            run += 1;
            continue;
        }
        while run >= 16 {
            let (code, len) = ac_codes[&0xF0];
            writer.write(code, len);
            run -= 16;
        }
        let (size, bits) = magnitude(value);
        let (code, len) = ac_codes[&((run << 4) | size)];
        writer.write(code, len);
        writer.write(bits, size);
        run = 0;
    }
    if run > 0 {
        let (code, len) = ac_codes[&0x00];
        writer.write(code, len);
    }
}

/// Spatial samples (level-shifted) from natural-order coefficients.
fn direct_idct(coeffs: &[f64; 64]) -> [f64; 64] {
    use std::f64::consts::PI;
    let c = |k: usize| if k == 0 { std::f64::consts::FRAC_1_SQRT_2 } else { 1.0 };
    let mut out = [0.0f64; 64];
    for y in 0..8 {
        for x in 0..8 {
            let mut sum = 0.0;
            for v in 0..8 {
                for u in 0..8 {
                    sum += c(u)
                        * c(v)
                        * coeffs[v * 8 + u]
                        * (((2 * x + 1) as f64 * u as f64 * PI) / 16.0).cos()
                        * (((2 * y + 1) as f64 * v as f64 * PI) / 16.0).cos();
                }
            }
            out[y * 8 + x] = sum / 4.0 + 128.0;
        }
    }
    out
}

fn clamp(v: f64) -> u8 {
    (v + 0.5).clamp(0.0, 255.0) as u8
}
