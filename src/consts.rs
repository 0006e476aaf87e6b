// Custom chip register offsets (relative to $DFF000).
pub const DIWSTRT: u16 = 0x08E;
pub const DIWSTOP: u16 = 0x090;
pub const DDFSTRT: u16 = 0x092;
pub const CLXDAT: u16 = 0x00E;
pub const CLXCON: u16 = 0x098;

pub const BPLCON0: u16 = 0x100;
pub const BPLCON1: u16 = 0x102;
pub const BPLCON2: u16 = 0x104;

pub const BPL1DAT: u16 = 0x110;
pub const BPL6DAT: u16 = 0x11A;

pub const SPR0POS: u16 = 0x140;
pub const SPR7DATB: u16 = 0x17E;
pub const SPR_REG_STRIDE: u16 = 8;
pub const SPRXPOS: u16 = 0;
pub const SPRXCTL: u16 = 2;
pub const SPRXDATA: u16 = 4;
pub const SPRXDATB: u16 = 6;

pub const COLOR00: u16 = 0x180;
pub const COLOR31: u16 = 0x1BE;

/* "
A horizontal line is 227.5 color clocks long. One color clock is the time it takes
to output two lores pixels.
" The line buffers store four pixels per color clock, so a lores pixel always occupies
two buffer cells and a hires pixel one.
*/
pub const HPOS_CNT: usize = 0xE3;
pub const HPIXELS: usize = 4 * HPOS_CNT;
pub const LAST_PIXEL: usize = HPIXELS - 1;

// Bitplane DMA may fetch data for the beginning of the next line while the current
// one is still being drawn. The buffers carry room for that overshoot.
pub const PREFETCH_PIXELS: usize = 64;
pub const PIXEL_BUFFER_LEN: usize = HPIXELS + PREFETCH_PIXELS;

pub const VPOS_CNT: usize = 313;
pub const FIRST_VISIBLE_LINE: u16 = 26;
pub const PAL_REFRESH_RATE: f64 = 50.0;

pub const BITPLANE_COUNT: usize = 6;
pub const SPRITE_COUNT: usize = 8;
pub const COLOR_REG_COUNT: usize = 32;

// Pixels emitted per bitplane fetch (one data word).
pub const PIXELS_PER_FETCH: usize = 16;

// Border indices used when the border debugger is enabled. The pixel engine maps
// them to fixed debug colors.
pub const BORDER_DEBUG_LEFT: u8 = 64;
pub const BORDER_DEBUG_RIGHT: u8 = 65;
pub const BORDER_DEBUG_VERTICAL: u8 = 66;

/// Converts a horizontal beam position (color clocks) into a line buffer index.
#[macro_export]
macro_rules! ppos {
    ($h: expr, $offset: expr) => {
        (($h as usize) * 4 + ($offset as usize))
    };
}
