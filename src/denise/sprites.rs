use log::trace;
use serde::{Deserialize, Serialize};

use super::buffers::LineBuffers;
use super::depth::sprite_depth;
use super::registers::{sprite_hstrt, sprite_vertical, SpriteInfo};
use crate::consts::{LAST_PIXEL, SPRITE_COUNT};

const SPRITE_WIDTH: usize = 16;
const ATTACHED_BASE_COLOR: u8 = 0b1_0000;

/// Hook that sees the final per pixel ownership of a line and reports the
/// collision bits to latch into CLXDAT.
pub trait CollisionDetector: Send {
    fn check_line(&mut self, _depth: &[u16], _vpos: u16) -> u16 {
        0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoCollisions;

impl CollisionDetector for NoCollisions {}

/// Sprite latches of Denise and the compositor drawing them over the resolved
/// playfields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpriteUnit {
    pos: [u16; SPRITE_COUNT],
    ctl: [u16; SPRITE_COUNT],
    data: [u16; SPRITE_COUNT],
    datb: [u16; SPRITE_COUNT],
    hstrt: [u16; SPRITE_COUNT],
    armed: u8,
    attach: u8,
}

impl SpriteUnit {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pos: [0; SPRITE_COUNT],
            ctl: [0; SPRITE_COUNT],
            data: [0; SPRITE_COUNT],
            datb: [0; SPRITE_COUNT],
            hstrt: [0; SPRITE_COUNT],
            armed: 0,
            attach: 0,
        }
    }

    pub fn poke_pos(&mut self, nr: usize, value: u16) {
        trace!("SPR{}POS = {:04X}", nr, value);
        self.pos[nr] = value;
        self.hstrt[nr] = sprite_hstrt(value, self.hstrt[nr]);
    }

    pub fn poke_ctl(&mut self, nr: usize, value: u16) {
        trace!("SPR{}CTL = {:04X}", nr, value);
        self.ctl[nr] = value;
        self.hstrt[nr] = (self.hstrt[nr] & 0x1FE) | (value & 1);
        self.set_attach(nr, value & 0x80 != 0);
    }

    /// Latches the low pattern word and arms the sprite.
    pub fn poke_data(&mut self, nr: usize, value: u16) {
        trace!("SPR{}DATA = {:04X}", nr, value);
        self.data[nr] = value;
        self.armed |= 1 << nr;
    }

    pub fn poke_datb(&mut self, nr: usize, value: u16) {
        trace!("SPR{}DATB = {:04X}", nr, value);
        self.datb[nr] = value;
    }

    fn set_attach(&mut self, nr: usize, on: bool) {
        match on {
            true => self.attach |= 1 << nr,
            false => self.attach &= !(1 << nr),
        }
    }

    #[inline]
    #[must_use]
    pub fn armed(&self) -> u8 {
        self.armed
    }

    #[inline]
    #[must_use]
    pub fn is_armed(&self, nr: usize) -> bool {
        self.armed & (1 << nr) != 0
    }

    #[inline]
    #[must_use]
    pub fn hstrt(&self, nr: usize) -> u16 {
        self.hstrt[nr]
    }

    /// An odd sprite forms a 15 color sprite with its even neighbour when its
    /// attach bit is set and both start at the same position.
    #[must_use]
    pub fn attached(&self, odd: usize) -> bool {
        debug_assert!(odd % 2 == 1);
        self.attach & (1 << odd) != 0 && self.hstrt[odd - 1] == self.hstrt[odd]
    }

    /// Draws every armed sprite, highest pair first, and disarms them all.
    pub fn draw_all(&mut self, buf: &mut LineBuffers) {
        for odd in [7, 5, 3, 1] {
            let even = odd - 1;
            let pair_mask = (1 << odd) | (1 << even);
            if self.armed & pair_mask == 0 {
                continue;
            }
            if self.attached(odd) {
                self.draw_pair(odd, buf);
            } else {
                if self.is_armed(odd) {
                    self.draw_sprite(odd, buf);
                }
                if self.is_armed(even) {
                    self.draw_sprite(even, buf);
                }
            }
        }
        self.armed = 0;
    }

    fn draw_sprite(&self, nr: usize, buf: &mut LineBuffers) {
        let z = sprite_depth(nr);
        let base = 16 + 2 * (nr as u8 & 6);
        let (a, b) = (self.data[nr], self.datb[nr]);

        self.shift_out(nr, buf, z, |bit| {
            let col = ((a >> bit) & 1) | (((b >> bit) & 1) << 1);
            (col != 0).then(|| base | col as u8)
        });
    }

    fn draw_pair(&self, odd: usize, buf: &mut LineBuffers) {
        let even = odd - 1;
        let z = sprite_depth(odd);
        let (a0, b0) = (self.data[even], self.datb[even]);
        let (a1, b1) = (self.data[odd], self.datb[odd]);

        self.shift_out(odd, buf, z, |bit| {
            let col = ((a0 >> bit) & 1)
                | (((b0 >> bit) & 1) << 1)
                | (((a1 >> bit) & 1) << 2)
                | (((b1 >> bit) & 1) << 3);
            (col != 0).then(|| ATTACHED_BASE_COLOR | col as u8)
        });
    }

    // Walks the 16 sprite pixels from the last one backwards. Each lores sprite
    // pixel covers two buffer cells.
    fn shift_out<F>(&self, nr: usize, buf: &mut LineBuffers, z: u16, color_of: F)
    where
        F: Fn(usize) -> Option<u8>,
    {
        let start = 2 * self.hstrt[nr] as usize;
        trace!("draw sprite {} at {}", nr, start);

        for bit in 0..SPRITE_WIDTH {
            let Some(color) = color_of(bit) else {
                continue;
            };
            let p = start + 2 * (SPRITE_WIDTH - 1 - bit);
            for cell in p..=(p + 1).min(LAST_PIXEL) {
                if z > buf.depth[cell] {
                    buf.color[cell] = color;
                    buf.depth[cell] |= z;
                }
            }
        }
    }

    #[must_use]
    pub fn info(&self, nr: usize) -> SpriteInfo {
        let (vstrt, vstop) = sprite_vertical(self.pos[nr], self.ctl[nr]);
        SpriteInfo {
            pos: self.pos[nr],
            ctl: self.ctl[nr],
            data: self.data[nr],
            datb: self.datb[nr],
            hstrt: self.hstrt[nr],
            vstrt,
            vstop,
            attach: self.attach & (1 << nr) != 0,
            armed: self.is_armed(nr),
            ptr: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for SpriteUnit {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::denise::depth::{Depth, BACKGROUND};

    struct TestCore {
        sprites: SpriteUnit,
        buf: LineBuffers,
    }

    impl Default for TestCore {
        fn default() -> Self {
            Self {
                sprites: SpriteUnit::new(),
                buf: LineBuffers::new(),
            }
        }
    }

    impl TestCore {
        // Places sprite `nr` at lores position `x` with the given pattern words.
        fn sprite(&mut self, nr: usize, x: u16, data: u16, datb: u16) {
            self.sprites.poke_pos(nr, x >> 1);
            self.sprites.poke_ctl(nr, x & 1);
            self.sprites.poke_datb(nr, datb);
            self.sprites.poke_data(nr, data);
        }
    }

    macro_rules! T {
        ($b: expr) => {
            assert!($b);
        };
    }

    #[test]
    fn hstrt_combines_pos_and_ctl() {
        let mut c = TestCore::default();
        c.sprites.poke_pos(2, 0x0040);
        c.sprites.poke_ctl(2, 0x0001);
        assert_eq!(c.sprites.hstrt(2), 0x81);
        c.sprites.poke_pos(2, 0x0041);
        assert_eq!(c.sprites.hstrt(2), 0x83);
    }

    #[test]
    fn data_write_arms_sprite() {
        let mut c = TestCore::default();
        c.sprites.poke_datb(4, 0xFFFF);
        T!(!c.sprites.is_armed(4));
        c.sprites.poke_data(4, 0xFFFF);
        T!(c.sprites.is_armed(4));
    }

    #[test]
    fn independent_sprite_colors_and_placement() {
        let mut c = TestCore::default();
        // Leftmost pixel color 1, rightmost color 3.
        c.sprite(2, 100, 0x8001, 0x0001);

        c.sprites.draw_all(&mut c.buf);

        let base: u8 = 16 + 2 * (2 & 6);
        assert_eq!(&c.buf.color[200..202], &[base | 1, base | 1]);
        assert_eq!(&c.buf.color[230..232], &[base | 3, base | 3]);
        T!(c.buf.color[202..230].iter().all(|&p| p == 0));
        assert_eq!(c.buf.depth[200], Depth::sp2.bits());
        assert_eq!(c.buf.color[199], 0);
        assert_eq!(c.buf.color[232], 0);
    }

    #[test]
    fn sprite_priority_wins_regardless_of_draw_order() {
        // Sprite 3 drawn first (higher pair).
        let mut c = TestCore::default();
        c.sprite(3, 50, 0x8000, 0);
        c.sprite(1, 50, 0x8000, 0x8000);
        c.sprites.draw_all(&mut c.buf);
        assert_eq!(c.buf.color[100], 16 + 2 * (3 & 6) | 1);

        // Sprite 1 drawn first into a fresh line, sprite 3 afterwards.
        let mut c = TestCore::default();
        c.sprite(1, 50, 0x8000, 0x8000);
        c.sprites.draw_all(&mut c.buf);
        c.sprite(3, 50, 0x8000, 0);
        c.sprites.draw_all(&mut c.buf);
        assert_eq!(c.buf.color[100], 16 + 2 * (3 & 6) | 1);
        T!(c.buf.depth[100] & Depth::sp3.bits() != 0);
    }

    #[test]
    fn sprite_stays_behind_higher_playfield() {
        let mut c = TestCore::default();
        c.buf.color[100] = 5;
        c.buf.depth[100] = Depth::pf_0.bits();
        c.sprite(7, 50, 0x8000, 0);

        c.sprites.draw_all(&mut c.buf);

        assert_eq!(c.buf.color[100], 5);
        assert_eq!(c.buf.color[101], 16 + 2 * (7 & 6) | 1);
    }

    #[test]
    fn attached_pair_uses_fifteen_colors() {
        let mut c = TestCore::default();
        c.sprites.poke_ctl(3, 0x80);
        c.sprite(2, 80, 0x8000, 0x0000);
        c.sprites.poke_pos(3, 40);
        c.sprites.poke_datb(3, 0x8001);
        c.sprites.poke_data(3, 0x0001);
        c.sprites.poke_ctl(3, 0x80);

        T!(c.sprites.attached(3));
        c.sprites.draw_all(&mut c.buf);

        // Even sprite DATA is bit 0, odd sprite DATB bit 3.
        assert_eq!(c.buf.color[160], 16 | 0b1001);
        assert_eq!(c.buf.color[190], 16 | 0b1100);
        for &p in &c.buf.color[160..192] {
            T!(p == 0 || (16..32).contains(&p));
        }
        assert_eq!(c.buf.depth[160], Depth::sp3.bits());
    }

    #[test]
    fn attach_needs_equal_start() {
        let mut c = TestCore::default();
        c.sprite(2, 80, 0x8000, 0);
        c.sprite(3, 81, 0x8000, 0);
        c.sprites.poke_ctl(3, 0x81);
        T!(!c.sprites.attached(3));

        c.sprites.draw_all(&mut c.buf);
        assert_eq!(c.buf.color[160], 16 + 2 * (2 & 6) | 1);
    }

    #[test]
    fn drawing_clips_at_line_end() {
        let mut c = TestCore::default();
        let x = (LAST_PIXEL / 2 - 3) as u16;
        c.sprite(0, x, 0xFFFF, 0);

        c.sprites.draw_all(&mut c.buf);

        T!(c.buf.color[2 * x as usize..=LAST_PIXEL].iter().all(|&p| p == 17));
        T!(c.buf.color[LAST_PIXEL + 1..].iter().all(|&p| p == 0));
    }

    #[test]
    fn draw_all_disarms_every_sprite() {
        let mut c = TestCore::default();
        c.sprite(0, 10, 0xFFFF, 0);
        c.sprite(5, 10, 0xFFFF, 0);
        c.sprites.draw_all(&mut c.buf);
        assert_eq!(c.sprites.armed(), 0);

        c.buf.clear();
        c.sprites.draw_all(&mut c.buf);
        T!(c.buf.depth.iter().all(|&z| z == BACKGROUND));
    }

    #[test]
    fn info_decodes_vertical_range() {
        let mut c = TestCore::default();
        c.sprites.poke_pos(6, 0x2C40);
        c.sprites.poke_ctl(6, 0x3C80);
        let info = c.sprites.info(6);
        assert_eq!(info.vstrt, 0x2C);
        assert_eq!(info.vstop, 0x3C);
        T!(info.attach);
        assert_eq!(info.hstrt, 0x80);
    }
}
