use std::sync::Arc;
use bitflags::bitflags;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::consts::{BITPLANE_COUNT, COLOR_REG_COUNT, SPRITE_COUNT};

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct BplCon0:u16
    {
        const hires = 0b1000_0000_0000_0000;
        const bpu   = 0b0111_0000_0000_0000;
        const homod = 0b0000_1000_0000_0000;
        const dblpf = 0b0000_0100_0000_0000;
        const color = 0b0000_0010_0000_0000;
        const gaud  = 0b0000_0001_0000_0000;
        const lpen  = 0b0000_0000_0000_1000;
        const lace  = 0b0000_0000_0000_0100;
        const ersy  = 0b0000_0000_0000_0010;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct BplCon2:u16
    {
        const pf2pri = 0b0100_0000;
        const pf2p   = 0b0011_1000;
        const pf1p   = 0b0000_0111;
    }
}

impl BplCon0 {
    /// Number of enabled bitplanes. Values above 6 are reported as written.
    #[inline]
    #[must_use]
    pub fn bitplanes(&self) -> u8 {
        ((self.bits() & Self::bpu.bits()) >> 12) as u8
    }

    #[inline]
    #[must_use]
    pub fn dual_playfield(&self) -> bool {
        self.contains(Self::dblpf)
    }

    #[inline]
    #[must_use]
    pub fn is_hires(&self) -> bool {
        self.contains(Self::hires)
    }
}

impl BplCon2 {
    #[inline]
    #[must_use]
    pub fn pf1_code(&self) -> u16 {
        self.bits() & Self::pf1p.bits()
    }

    #[inline]
    #[must_use]
    pub fn pf2_code(&self) -> u16 {
        (self.bits() & Self::pf2p.bits()) >> 3
    }

    #[inline]
    #[must_use]
    pub fn pf2_in_front(&self) -> bool {
        self.contains(Self::pf2pri)
    }
}

/// Decoded sprite registers as shown by debuggers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpriteInfo {
    pub pos: u16,
    pub ctl: u16,
    pub data: u16,
    pub datb: u16,
    pub hstrt: u16,
    pub vstrt: u16,
    pub vstop: u16,
    pub attach: bool,
    pub armed: bool,
    pub ptr: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeniseInfo {
    pub bplcon0: u16,
    pub bplcon1: u16,
    pub bplcon2: u16,
    pub bpu: u8,
    pub hires: bool,
    pub dual_playfield: bool,
    pub pf2_in_front: bool,
    pub prio1: u16,
    pub prio2: u16,
    pub diwstrt: u16,
    pub diwstop: u16,
    pub bpldat: [u16; BITPLANE_COUNT],
    pub color_reg: [u16; COLOR_REG_COUNT],
    pub color_rgba: [u32; COLOR_REG_COUNT],
    pub sprite: [SpriteInfo; SPRITE_COUNT],
    pub clxdat: u16,
    pub clxcon: u16,
}

/// Shared read handle on the last inspection snapshot. The emulator thread
/// refreshes it, any other thread may read it. The copy lags behind the live
/// registers until the next refresh.
#[derive(Debug, Clone, Default)]
pub struct DeniseInspector {
    info: Arc<Mutex<DeniseInfo>>,
}

impl DeniseInspector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, info: DeniseInfo) {
        *self.info.lock() = info;
    }

    #[must_use]
    pub fn get(&self) -> DeniseInfo {
        self.info.lock().clone()
    }
}

/// Decodes vertical start and stop lines from a sprite's POS and CTL words.
#[must_use]
pub fn sprite_vertical(pos: u16, ctl: u16) -> (u16, u16) {
    let vstrt = (pos >> 8) | ((ctl & 0b100) << 6);
    let vstop = (ctl >> 8) | ((ctl & 0b010) << 7);
    (vstrt, vstop)
}

/// Horizontal start in lores pixels. Bit 0 comes from SPRxCTL.
#[inline]
#[must_use]
pub fn sprite_hstrt(pos: u16, ctl: u16) -> u16 {
    ((pos & 0xFF) << 1) | (ctl & 1)
}
