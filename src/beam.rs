use log::trace;
use serde::{Deserialize, Serialize};

use crate::consts::{DDFSTRT, DIWSTOP, DIWSTRT, HPOS_CNT, SPRITE_COUNT, VPOS_CNT};

/// Values Denise reads from the beam and DMA logic of Agnus. This is the only
/// view the video pipeline has of the rest of the chipset.
pub trait BeamSource {
    fn hpos(&self) -> u16;
    fn vpos(&self) -> u16;
    /// Vertical display window flip-flop of the current line.
    fn v_flop(&self) -> bool;
    /// Horizontal display window flip-flop as it was at the start of the line.
    fn h_flop_at_line_start(&self) -> bool;
    /// Lores pixel where the window opened in this line.
    fn h_flop_on(&self) -> Option<u16>;
    /// Lores pixel where the window closed in this line.
    fn h_flop_off(&self) -> Option<u16>;
    /// Cycle of the first BPL1 fetch in this line.
    fn first_bpl_dma_cycle(&self) -> u16;
    fn in_bpl_dma_area(&self) -> bool;
    fn sprite_pointer(&self, _nr: usize) -> u32 {
        0
    }
    /// DIWSTRT and DIWSTOP.
    fn display_window(&self) -> (u16, u16) {
        (0, 0)
    }
}

/// Minimal model of the Agnus beam counters and display window logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeamState {
    pub hpos: u16,
    pub vpos: u16,
    pub v_flop: bool,
    pub h_flop: bool,
    pub h_flop_at_line_start: bool,
    pub h_flop_on: Option<u16>,
    pub h_flop_off: Option<u16>,
    pub first_bpl_dma_cycle: u16,
    pub bpl_dma: bool,
    pub sprite_ptr: [u32; SPRITE_COUNT],
    diwstrt: u16,
    diwstop: u16,
    ddfstrt: u16,
}

impl BeamState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            hpos: 0,
            vpos: 0,
            v_flop: false,
            h_flop: false,
            h_flop_at_line_start: false,
            h_flop_on: None,
            h_flop_off: None,
            first_bpl_dma_cycle: 0,
            bpl_dma: false,
            sprite_ptr: [0; SPRITE_COUNT],
            diwstrt: 0,
            diwstop: 0,
            ddfstrt: 0,
        }
    }

    pub fn poke(&mut self, addr: u16, value: u16) {
        trace!("Beam poke ${:03X} = {:04X}", addr, value);
        match addr {
            DIWSTRT => self.diwstrt = value,
            DIWSTOP => self.diwstop = value,
            DDFSTRT => self.ddfstrt = value & 0xFC,
            _ => (),
        }
    }

    #[inline]
    fn vstrt(&self) -> u16 {
        self.diwstrt >> 8
    }

    // V8 of the stop line is the complement of V7.
    #[inline]
    fn vstop(&self) -> u16 {
        let v = self.diwstop >> 8;
        if v & 0x80 == 0 {
            v | 0x100
        } else {
            v
        }
    }

    #[inline]
    fn hstrt(&self) -> u16 {
        self.diwstrt & 0xFF
    }

    // H8 of the stop position is always set.
    #[inline]
    fn hstop(&self) -> u16 {
        (self.diwstop & 0xFF) | 0x100
    }

    /// Moves the beam to the start of line `v` and evaluates the display window
    /// for it. Window positions stay in lores pixels, two per color clock.
    pub fn advance_line(&mut self, v: u16) {
        self.vpos = v % VPOS_CNT as u16;
        self.hpos = 0;

        if self.vpos == self.vstrt() {
            self.v_flop = true;
        }
        if self.vpos == self.vstop() {
            self.v_flop = false;
        }

        self.h_flop_at_line_start = self.h_flop;
        let on = self.hstrt();
        let off = self.hstop();
        self.h_flop_on = (usize::from(on) < 2 * HPOS_CNT).then_some(on);
        self.h_flop_off = (usize::from(off) < 2 * HPOS_CNT).then_some(off);
        self.h_flop = match (self.h_flop_on, self.h_flop_off) {
            (_, Some(_)) => false,
            (Some(_), None) => true,
            (None, None) => self.h_flop,
        };

        self.first_bpl_dma_cycle = self.ddfstrt;
        self.bpl_dma = self.v_flop;
    }
}

impl Default for BeamState {
    fn default() -> Self {
        Self::new()
    }
}

impl BeamSource for BeamState {
    fn hpos(&self) -> u16 {
        self.hpos
    }

    fn vpos(&self) -> u16 {
        self.vpos
    }

    fn v_flop(&self) -> bool {
        self.v_flop
    }

    fn h_flop_at_line_start(&self) -> bool {
        self.h_flop_at_line_start
    }

    fn h_flop_on(&self) -> Option<u16> {
        self.h_flop_on
    }

    fn h_flop_off(&self) -> Option<u16> {
        self.h_flop_off
    }

    fn first_bpl_dma_cycle(&self) -> u16 {
        self.first_bpl_dma_cycle
    }

    fn in_bpl_dma_area(&self) -> bool {
        self.bpl_dma
    }

    fn sprite_pointer(&self, nr: usize) -> u32 {
        self.sprite_ptr[nr]
    }

    fn display_window(&self) -> (u16, u16) {
        (self.diwstrt, self.diwstop)
    }
}
