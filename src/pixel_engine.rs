use log::{trace, warn};
use serde::{Deserialize, Serialize};

use crate::consts::{
    BORDER_DEBUG_LEFT, BORDER_DEBUG_RIGHT, BORDER_DEBUG_VERTICAL, COLOR00, COLOR31,
    COLOR_REG_COUNT, HPIXELS, VPOS_CNT,
};
use crate::denise::change_log::{ChangeSink, RegChange, RegisterChangeLog};
use crate::error::IntegrityViolation;

pub const FRAME_WIDTH: usize = HPIXELS;
pub const FRAME_HEIGHT: usize = VPOS_CNT;
pub const FRAME_BUFFER_LEN: usize = FRAME_WIDTH * FRAME_HEIGHT;

// 32 color registers, 32 extra half brite shades and room for debug colors.
const PALETTE_LEN: usize = 128;
const PALETTE_MASK: usize = PALETTE_LEN - 1;

/// Color lookup stage fed with finished lines of color register indices.
pub trait ColorStage {
    /// Schedules a color register write at `pixel` of the current line.
    fn record_color_change(&mut self, reg: u16, value: u16, pixel: usize);

    /// Converts a line of color indices into the frame buffer row `vpos`.
    fn colorize(&mut self, color_index: &[u8], vpos: u16) -> Result<(), IntegrityViolation>;

    /// Current value of color register `nr`.
    fn color(&self, nr: usize) -> u16;

    /// RGBA value of color register `nr`.
    fn rgba(&self, nr: usize) -> u32;

    /// Applies the pending color changes of a line that isn't drawn.
    fn skip_line(&mut self) {}

    /// DMA debugger hook, called once per line after colorization.
    fn compute_overlay(&mut self, _vpos: u16) {}
}

/// Expands a 12 bit Amiga color to 32 bit RGBA (R in the low byte).
#[inline]
#[must_use]
pub fn rgba(color: u16) -> u32 {
    let r = u32::from((color >> 8) & 0xF) * 0x11;
    let g = u32::from((color >> 4) & 0xF) * 0x11;
    let b = u32::from(color & 0xF) * 0x11;
    0xFF00_0000 | (b << 16) | (g << 8) | r
}

#[inline]
fn half_brite(color: u16) -> u16 {
    (color >> 1) & 0x777
}

fn store_color(palette: &mut [u32], color_reg: &mut [u16; COLOR_REG_COUNT], nr: usize, value: u16) {
    let value = value & 0xFFF;
    color_reg[nr] = value;
    palette[nr] = rgba(value);
    palette[nr + COLOR_REG_COUNT] = rgba(half_brite(value));
}

#[derive(Serialize, Deserialize, Clone)]
struct FrameBuffer {
    #[serde(skip)]
    #[serde(default = "create_frame")]
    data: Vec<u32>,
}

fn create_frame() -> Vec<u32> {
    vec![0; FRAME_BUFFER_LEN]
}

fn create_frame_buffers() -> Vec<FrameBuffer> {
    vec![FrameBuffer::new(), FrameBuffer::new()]
}

fn create_palette() -> Vec<u32> {
    let mut palette = vec![0xFF00_0000; PALETTE_LEN];
    palette[usize::from(BORDER_DEBUG_LEFT)] = rgba(0x0F0);
    palette[usize::from(BORDER_DEBUG_RIGHT)] = rgba(0x00F);
    palette[usize::from(BORDER_DEBUG_VERTICAL)] = rgba(0xF0F);
    palette
}

impl FrameBuffer {
    fn new() -> Self {
        Self {
            data: create_frame(),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct PixelEngine {
    color_reg: [u16; COLOR_REG_COUNT],
    #[serde(skip)]
    #[serde(default = "create_palette")]
    palette: Vec<u32>,
    change_log: RegisterChangeLog,
    #[serde(skip)]
    #[serde(default = "create_frame_buffers")]
    buffers: Vec<FrameBuffer>,
    draw_buffer: usize,
    frames: u64,
}

impl PixelEngine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            color_reg: [0; COLOR_REG_COUNT],
            palette: create_palette(),
            change_log: RegisterChangeLog::new(),
            buffers: create_frame_buffers(),
            draw_buffer: 0,
            frames: 0,
        }
    }

    pub fn power_on(&mut self) {
        *self = Self::new();
    }

    /// Rebuilds the lookup table after a state restore.
    pub fn restore_palette(&mut self) {
        for nr in 0..COLOR_REG_COUNT {
            let value = self.color_reg[nr];
            self.set_color(nr, value);
        }
    }

    fn set_color(&mut self, nr: usize, value: u16) {
        store_color(&mut self.palette, &mut self.color_reg, nr, value);
    }

    #[inline]
    #[must_use]
    pub fn palette(&self) -> &[u32] {
        &self.palette
    }

    #[must_use]
    pub fn pending_changes(&self) -> usize {
        self.change_log.len()
    }

    /// Finished frame, `FRAME_WIDTH` pixels per line.
    #[inline]
    #[must_use]
    pub fn frame(&self) -> &[u32] {
        &self.buffers[1 - self.draw_buffer].data
    }

    /// Frame currently being drawn.
    #[inline]
    #[must_use]
    pub fn working_frame(&self) -> &[u32] {
        &self.buffers[self.draw_buffer].data
    }

    pub fn swap_buffers(&mut self) {
        trace!("swap frame buffers, frame {}", self.frames);
        self.draw_buffer = 1 - self.draw_buffer;
        self.frames += 1;
    }

    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Default for PixelEngine {
    fn default() -> Self {
        Self::new()
    }
}

// Writes one frame buffer row while replaying the color register changes.
struct RowWriter<'a> {
    palette: &'a mut [u32],
    color_reg: &'a mut [u16; COLOR_REG_COUNT],
    color_index: &'a [u8],
    row: &'a mut [u32],
}

impl ChangeSink for RowWriter<'_> {
    fn resolve(&mut self, from: usize, to: usize) {
        let to = to.min(self.row.len());
        if from >= to {
            return;
        }
        for (dst, &idx) in self.row[from..to]
            .iter_mut()
            .zip(self.color_index[from..to].iter())
        {
            *dst = self.palette[usize::from(idx) & PALETTE_MASK];
        }
    }

    fn apply(&mut self, change: &RegChange) -> Result<(), IntegrityViolation> {
        match change.reg {
            COLOR00..=COLOR31 => {
                let nr = usize::from((change.reg - COLOR00) >> 1);
                store_color(self.palette, self.color_reg, nr, change.value);
                Ok(())
            }
            reg => Err(IntegrityViolation::UnknownRegisterChange(reg)),
        }
    }
}

impl ColorStage for PixelEngine {
    fn record_color_change(&mut self, reg: u16, value: u16, pixel: usize) {
        self.change_log.record(reg, value, pixel);
    }

    fn colorize(&mut self, color_index: &[u8], vpos: u16) -> Result<(), IntegrityViolation> {
        let line = usize::from(vpos);
        if line >= FRAME_HEIGHT {
            self.change_log.reset();
            return Err(IntegrityViolation::LineOutOfRange { vpos });
        }

        let start = line * FRAME_WIDTH;
        let draw_buffer = self.draw_buffer;
        let mut writer = RowWriter {
            palette: &mut self.palette,
            color_reg: &mut self.color_reg,
            color_index,
            row: &mut self.buffers[draw_buffer].data[start..start + FRAME_WIDTH],
        };
        self.change_log.replay(FRAME_WIDTH, &mut writer)
    }

    fn skip_line(&mut self) {
        let mut writer = RowWriter {
            palette: &mut self.palette,
            color_reg: &mut self.color_reg,
            color_index: &[],
            row: &mut [],
        };
        if let Err(violation) = self.change_log.replay(0, &mut writer) {
            warn!("{}", violation);
        }
    }

    fn color(&self, nr: usize) -> u16 {
        self.color_reg[nr]
    }

    fn rgba(&self, nr: usize) -> u32 {
        self.palette[nr]
    }
}
