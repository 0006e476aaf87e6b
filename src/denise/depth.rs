use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Per-pixel ownership tags. A layer covers a pixel only if its tag is
    /// numerically greater than the one already stored in the depth buffer, so
    /// the bit order encodes the visual stacking from back (low) to front (high).
    ///
    /// `pf_N` is the playfield depth selected by priority code N. Code 0 puts a
    /// playfield in front of every sprite, code 4 behind all of them.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Depth: u16
    {
        const dpf   = 1 << 0;
        const pf_4  = 1 << 1;
        const sp0   = 1 << 2;
        const sp1   = 1 << 3;
        const pf_3  = 1 << 4;
        const sp2   = 1 << 5;
        const sp3   = 1 << 6;
        const pf_2  = 1 << 7;
        const sp4   = 1 << 8;
        const sp5   = 1 << 9;
        const pf_1  = 1 << 10;
        const sp6   = 1 << 11;
        const sp7   = 1 << 12;
        const pf_0  = 1 << 13;
    }
}

pub const BACKGROUND: u16 = 0;

pub const SPRITE_DEPTH: [Depth; 8] = [
    Depth::sp0,
    Depth::sp1,
    Depth::sp2,
    Depth::sp3,
    Depth::sp4,
    Depth::sp5,
    Depth::sp6,
    Depth::sp7,
];

const PLAYFIELD_DEPTH: [Depth; 5] = [
    Depth::pf_0,
    Depth::pf_1,
    Depth::pf_2,
    Depth::pf_3,
    Depth::pf_4,
];

/// Maps a 3 bit playfield priority code to its depth tag. Codes 5 to 7 are
/// undocumented and treated like code 4.
#[must_use]
pub fn playfield_depth(code: u16) -> Depth {
    let code = (code & 0b111) as usize;
    PLAYFIELD_DEPTH[code.min(4)]
}

#[inline]
#[must_use]
pub fn sprite_depth(nr: usize) -> u16 {
    SPRITE_DEPTH[nr].bits()
}
