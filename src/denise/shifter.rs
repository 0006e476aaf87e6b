use log::trace;
use serde::{Deserialize, Serialize};

use crate::consts::BITPLANE_COUNT;
use crate::error::IntegrityViolation;

/// Delay values derived from BPLCON1. Odd bitplanes (BPL1, BPL3, BPL5) and even
/// bitplanes (BPL2, BPL4, BPL6) scroll independently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scroll {
    pub lores_odd: u8,
    pub lores_even: u8,
    pub hires_odd: u8,
    pub hires_even: u8,
}

impl Scroll {
    #[must_use]
    pub fn from_bplcon1(bplcon1: u16) -> Self {
        let v = bplcon1 & 0xFF;
        Self {
            lores_odd: (v & 0b0000_1111) as u8,
            lores_even: ((v & 0b1111_0000) >> 4) as u8,
            hires_odd: ((v & 0b0000_0111) << 1) as u8,
            hires_even: ((v & 0b0111_0000) >> 3) as u8,
        }
    }

    #[inline]
    fn select(&self, hires: bool) -> (u8, u8) {
        match hires {
            true => (self.hires_odd, self.hires_even),
            false => (self.lores_odd, self.lores_even),
        }
    }
}

/// Bitplane shift registers and the bit-slice draw routine.
///
/// The registers are 32 bits wide: the upper half holds the not yet displayed
/// tail of the previous data word, which is what a scroll delay reaches into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftPipeline {
    shift_reg: [u32; BITPLANE_COUNT],
    scroll: Scroll,
    current_pixel: usize,
}

impl ShiftPipeline {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shift_reg: [0; BITPLANE_COUNT],
            scroll: Scroll::default(),
            current_pixel: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn current_pixel(&self) -> usize {
        self.current_pixel
    }

    #[inline]
    pub fn set_current_pixel(&mut self, pixel: usize) {
        self.current_pixel = pixel;
    }

    #[inline]
    #[must_use]
    pub fn scroll(&self) -> Scroll {
        self.scroll
    }

    pub fn set_scroll(&mut self, bplcon1: u16) {
        self.scroll = Scroll::from_bplcon1(bplcon1);
    }

    #[must_use]
    pub fn shift_reg(&self, plane: usize) -> u32 {
        self.shift_reg[plane]
    }

    /// Parallel load of the bitplane data latches into the low word of each
    /// shift register.
    pub fn load(&mut self, bpldat: &[u16; BITPLANE_COUNT]) {
        for (reg, &dat) in self.shift_reg.iter_mut().zip(bpldat.iter()) {
            *reg = (*reg & 0xFFFF_0000) | u32::from(dat);
        }
    }

    /// Shifts out `pixels` bit slices into `raw`, starting at the current pixel.
    /// In lores mode every slice is written twice.
    pub fn draw(
        &mut self,
        pixels: usize,
        hires: bool,
        raw: &mut [u8],
    ) -> Result<(), IntegrityViolation> {
        let width = if hires { Some(pixels) } else { pixels.checked_mul(2) };
        let end = match width.and_then(|w| self.current_pixel.checked_add(w)) {
            Some(end) if end <= raw.len() => end,
            Some(end) => {
                return Err(IntegrityViolation::PixelOutOfRange {
                    pixel: end - 1,
                    len: raw.len(),
                })
            }
            None => {
                return Err(IntegrityViolation::PixelOutOfRange {
                    pixel: usize::MAX,
                    len: raw.len(),
                })
            }
        };

        let (odd, even) = self.scroll.select(hires);
        let mut mask_odd = 0x8000_u32 << odd;
        let mut mask_even = 0x8000_u32 << even;
        let r = &self.shift_reg;

        let mut pixel = self.current_pixel;
        for _ in 0..pixels {
            let index = u8::from(r[0] & mask_odd != 0)
                | (u8::from(r[1] & mask_even != 0) << 1)
                | (u8::from(r[2] & mask_odd != 0) << 2)
                | (u8::from(r[3] & mask_even != 0) << 3)
                | (u8::from(r[4] & mask_odd != 0) << 4)
                | (u8::from(r[5] & mask_even != 0) << 5);

            mask_odd >>= 1;
            mask_even >>= 1;

            raw[pixel] = index;
            pixel += 1;
            if !hires {
                raw[pixel] = index;
                pixel += 1;
            }
        }

        for reg in &mut self.shift_reg {
            *reg = reg.checked_shl(pixels as u32).unwrap_or(0);
        }

        trace!("draw {} pixels {}..{}", pixels, self.current_pixel, end);
        self.current_pixel = pixel;
        Ok(())
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for ShiftPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestCore {
        shifter: ShiftPipeline,
        raw: Vec<u8>,
    }

    impl Default for TestCore {
        fn default() -> Self {
            Self {
                shifter: ShiftPipeline::new(),
                raw: vec![0; 64],
            }
        }
    }

    fn planes(p: &[(usize, u16)]) -> [u16; BITPLANE_COUNT] {
        let mut dat = [0; BITPLANE_COUNT];
        for &(i, v) in p {
            dat[i] = v;
        }
        dat
    }

    #[test]
    fn lores_pixels_are_doubled() {
        let mut c = TestCore::default();
        c.shifter.load(&planes(&[(0, 0b1010_0000_0000_0000)]));

        assert!(c.shifter.draw(4, false, &mut c.raw).is_ok());

        assert_eq!(&c.raw[0..8], &[1, 1, 0, 0, 1, 1, 0, 0]);
        assert_eq!(c.shifter.current_pixel(), 8);
    }

    #[test]
    fn hires_pixels_are_single() {
        let mut c = TestCore::default();
        c.shifter.load(&planes(&[(1, 0b1100_0000_0000_0000)]));

        assert!(c.shifter.draw(4, true, &mut c.raw).is_ok());

        assert_eq!(&c.raw[0..4], &[2, 2, 0, 0]);
        assert_eq!(c.shifter.current_pixel(), 4);
    }

    #[test]
    fn each_plane_contributes_one_index_bit() {
        let mut c = TestCore::default();
        let top = 0x8000;
        c.shifter.load(&planes(&[(0, top), (2, top), (5, top)]));

        assert!(c.shifter.draw(1, true, &mut c.raw).is_ok());

        assert_eq!(c.raw[0], 0b100101);
    }

    #[test]
    fn registers_shift_left_by_drawn_pixels() {
        let mut c = TestCore::default();
        c.shifter.load(&planes(&[(3, 0x00F0)]));

        assert!(c.shifter.draw(8, true, &mut c.raw).is_ok());

        assert_eq!(c.shifter.shift_reg(3), 0xF000);
    }

    #[test]
    fn odd_scroll_delays_odd_planes_only() {
        let mut c = TestCore::default();
        c.shifter.set_scroll(0x0002);
        c.shifter.load(&planes(&[(0, 0x8000), (1, 0x8000)]));

        assert!(c.shifter.draw(4, false, &mut c.raw).is_ok());

        // Even plane shows at once, odd plane two lores pixels later.
        assert_eq!(&c.raw[0..8], &[2, 2, 0, 0, 1, 1, 0, 0]);
    }

    #[test]
    fn scroll_reaches_into_previous_word() {
        let mut c = TestCore::default();
        c.shifter.set_scroll(0x0001);
        c.shifter.load(&planes(&[(0, 0x0001)]));
        assert!(c.shifter.draw(16, false, &mut c.raw).is_ok());
        assert!(c.raw[0..32].iter().all(|&p| p == 0));

        c.shifter.load(&planes(&[(0, 0x0000)]));
        assert!(c.shifter.draw(1, false, &mut c.raw).is_ok());

        assert_eq!(&c.raw[32..34], &[1, 1]);
    }

    #[test]
    fn scroll_decode_matches_bplcon1_layout() {
        let s = Scroll::from_bplcon1(0x00A5);
        assert_eq!(s.lores_odd, 5);
        assert_eq!(s.lores_even, 10);
        assert_eq!(s.hires_odd, 10);
        assert_eq!(s.hires_even, 4);
    }

    #[test]
    fn write_past_buffer_end_is_an_integrity_violation() {
        let mut c = TestCore::default();
        c.shifter.set_current_pixel(60);

        let result = c.shifter.draw(3, false, &mut c.raw);

        assert_eq!(
            result,
            Err(IntegrityViolation::PixelOutOfRange { pixel: 65, len: 64 })
        );
        assert!(c.raw.iter().all(|&p| p == 0));
        assert_eq!(c.shifter.current_pixel(), 60);
    }

    #[test]
    fn oversized_draw_is_an_integrity_violation() {
        let mut c = TestCore::default();
        c.shifter.set_current_pixel(8);

        assert_eq!(
            c.shifter.draw(usize::MAX, false, &mut c.raw),
            Err(IntegrityViolation::PixelOutOfRange { pixel: usize::MAX, len: 64 })
        );
        assert_eq!(
            c.shifter.draw(usize::MAX - 4, true, &mut c.raw),
            Err(IntegrityViolation::PixelOutOfRange { pixel: usize::MAX, len: 64 })
        );
        assert!(c.raw.iter().all(|&p| p == 0));
        assert_eq!(c.shifter.current_pixel(), 8);
    }
}
