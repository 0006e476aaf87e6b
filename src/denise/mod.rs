pub mod border;
pub mod buffers;
pub mod change_log;
pub mod depth;
pub mod playfield;
pub mod registers;
pub mod shifter;
pub mod sprites;

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::beam::BeamSource;
use crate::config::VideoConfig;
use crate::consts::{
    BITPLANE_COUNT, BPLCON0, BPLCON2, COLOR_REG_COUNT, HPIXELS, PIXEL_BUFFER_LEN, SPRITE_COUNT,
};
use crate::error::{fatal, IntegrityViolation};
use crate::pixel_engine::ColorStage;
use crate::ppos;
use buffers::LineBuffers;
use change_log::{ChangeSink, RegChange, RegisterChangeLog};
use playfield::{resolve_dual, resolve_single, Priorities};
use registers::{BplCon0, BplCon2, DeniseInfo, DeniseInspector};
use shifter::ShiftPipeline;
use sprites::{CollisionDetector, NoCollisions, SpriteUnit};

fn create_collision_detector() -> Box<dyn CollisionDetector> {
    Box::new(NoCollisions)
}

/// The display encoder. Turns bitplane and sprite data into one line of color
/// register indices per scanline and hands it to the color stage.
#[derive(Serialize, Deserialize)]
pub struct Denise {
    config: VideoConfig,
    bplcon0: u16,
    bplcon1: u16,
    bplcon2: u16,
    initial_bplcon0: u16,
    initial_bplcon1: u16,
    initial_bplcon2: u16,
    bpldat: [u16; BITPLANE_COUNT],
    shifter: ShiftPipeline,
    sprites: SpriteUnit,
    change_log: RegisterChangeLog,
    clxdat: u16,
    clxcon: u16,
    lines_drawn: u64,
    #[serde(skip)]
    buffers: LineBuffers,
    #[serde(skip)]
    inspector: DeniseInspector,
    #[serde(skip)]
    #[serde(default = "create_collision_detector")]
    collisions: Box<dyn CollisionDetector>,
}

// Resolves the line segment by segment, following BPLCON0 and BPLCON2 as they
// change along the line.
struct Translator<'a> {
    buffers: &'a mut LineBuffers,
    bplcon0: BplCon0,
    bplcon2: BplCon2,
    prio: Priorities,
}

impl ChangeSink for Translator<'_> {
    fn resolve(&mut self, from: usize, to: usize) {
        trace!(
            "translate {}..{} bplcon0:{:04X} bplcon2:{:04X}",
            from,
            to,
            self.bplcon0.bits(),
            self.bplcon2.bits()
        );
        if self.bplcon0.dual_playfield() {
            let front2 = self.bplcon2.pf2_in_front();
            resolve_dual(self.buffers, from, to, &self.prio, front2);
        } else {
            resolve_single(self.buffers, from, to, &self.prio);
        }
    }

    fn apply(&mut self, change: &RegChange) -> Result<(), IntegrityViolation> {
        match change.reg {
            BPLCON0 => self.bplcon0 = BplCon0::from_bits_retain(change.value),
            BPLCON2 => {
                self.bplcon2 = BplCon2::from_bits_retain(change.value);
                self.prio = Priorities::from_bplcon2(change.value);
            }
            reg => return Err(IntegrityViolation::UnknownRegisterChange(reg)),
        }
        Ok(())
    }
}

impl Denise {
    #[must_use]
    pub fn new(config: VideoConfig) -> Self {
        Self {
            config,
            bplcon0: 0,
            bplcon1: 0,
            bplcon2: 0,
            initial_bplcon0: 0,
            initial_bplcon1: 0,
            initial_bplcon2: 0,
            bpldat: [0; BITPLANE_COUNT],
            shifter: ShiftPipeline::new(),
            sprites: SpriteUnit::new(),
            change_log: RegisterChangeLog::new(),
            clxdat: 0,
            clxcon: 0,
            lines_drawn: 0,
            buffers: LineBuffers::new(),
            inspector: DeniseInspector::new(),
            collisions: create_collision_detector(),
        }
    }

    /// Power-on defaults: registers, latches and all line buffers cleared. The
    /// configuration, inspection handle and collision hook are kept.
    pub fn power_on(&mut self) {
        debug!("Denise power on");
        self.bplcon0 = 0;
        self.bplcon1 = 0;
        self.bplcon2 = 0;
        self.initial_bplcon0 = 0;
        self.initial_bplcon1 = 0;
        self.initial_bplcon2 = 0;
        self.bpldat = [0; BITPLANE_COUNT];
        self.shifter.reset();
        self.sprites.reset();
        self.change_log.reset();
        self.clxdat = 0;
        self.clxcon = 0;
        self.lines_drawn = 0;
        self.buffers.clear();
    }

    #[must_use]
    pub fn config(&self) -> &VideoConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: VideoConfig) {
        self.config = config;
    }

    pub fn set_debug_border(&mut self, on: bool) {
        self.config.debug_border = on;
    }

    pub fn set_wrap_prefetch(&mut self, on: bool) {
        self.config.wrap_prefetch = on;
    }

    pub fn set_collision_detector(&mut self, detector: Box<dyn CollisionDetector>) {
        self.collisions = detector;
    }

    pub fn poke_bplcon0<B: BeamSource>(&mut self, value: u16, beam: &B) {
        trace!("BPLCON0 = {:04X}", value);
        if self.bplcon0 != value {
            let pixel = (4 * usize::from(beam.hpos())).saturating_sub(4);
            self.change_log.record(BPLCON0, value, pixel);
            self.bplcon0 = value;
        }
    }

    pub fn poke_bplcon1(&mut self, value: u16) {
        trace!("BPLCON1 = {:04X}", value);
        self.bplcon1 = value & 0xFF;
        self.shifter.set_scroll(self.bplcon1);
    }

    pub fn poke_bplcon2<B: BeamSource>(&mut self, value: u16, beam: &B) {
        trace!("BPLCON2 = {:04X}", value);
        self.bplcon2 = value;
        self.change_log
            .record(BPLCON2, value, 4 * usize::from(beam.hpos()) + 4);
    }

    /// Latches BPLxDAT. Writing BPL1DAT transfers all six latches into the
    /// shift registers.
    pub fn poke_bpldat(&mut self, x: usize, value: u16) {
        trace!("BPL{}DAT = {:04X}", x + 1, value);
        self.bpldat[x] = value;
        if x == 0 {
            self.fill_shift_registers();
        }
    }

    pub fn fill_shift_registers(&mut self) {
        self.shifter.load(&self.bpldat);
    }

    /// Shifts out `pixels` pixels at the current pixel cursor.
    pub fn draw(&mut self, pixels: usize) {
        let hires = BplCon0::from_bits_retain(self.bplcon0).is_hires();
        if let Err(violation) = self.shifter.draw(pixels, hires, &mut self.buffers.raw) {
            fatal(violation);
        }
    }

    /// Moves the pixel cursor to the beam position, then draws.
    pub fn draw_at<B: BeamSource>(&mut self, pixels: usize, beam: &B) {
        self.shifter
            .set_current_pixel(ppos!(beam.hpos(), self.config.pixel_offset));
        self.draw(pixels);
    }

    pub fn poke_spr_pos(&mut self, nr: usize, value: u16) {
        self.sprites.poke_pos(nr, value);
    }

    pub fn poke_spr_ctl(&mut self, nr: usize, value: u16) {
        self.sprites.poke_ctl(nr, value);
    }

    pub fn poke_spr_data(&mut self, nr: usize, value: u16) {
        self.sprites.poke_data(nr, value);
    }

    pub fn poke_spr_datb(&mut self, nr: usize, value: u16) {
        self.sprites.poke_datb(nr, value);
    }

    /// Color registers live in the color stage, which keeps its own change log.
    pub fn poke_color<B: BeamSource, C: ColorStage>(
        &mut self,
        reg: u16,
        value: u16,
        beam: &B,
        colors: &mut C,
    ) {
        trace!("COLOR ${:03X} = {:04X}", reg, value);
        colors.record_color_change(reg, value, 4 * usize::from(beam.hpos()));
    }

    pub fn poke_clxcon(&mut self, value: u16) {
        trace!("CLXCON = {:04X}", value);
        self.clxcon = value;
    }

    /// Reading CLXDAT clears it.
    pub fn peek_clxdat(&mut self) -> u16 {
        core::mem::take(&mut self.clxdat)
    }

    pub fn begin_of_line<B: BeamSource>(&mut self, beam: &B) {
        let pixel = ppos!(beam.first_bpl_dma_cycle(), self.config.pixel_offset);
        self.shifter.set_current_pixel(pixel);

        self.initial_bplcon0 = self.bplcon0;
        self.initial_bplcon1 = self.bplcon1;
        self.initial_bplcon2 = self.bplcon2;
        self.change_log.reset();
    }

    pub fn end_of_line<B: BeamSource, C: ColorStage>(
        &mut self,
        vpos: u16,
        beam: &B,
        colors: &mut C,
    ) {
        if vpos >= self.config.first_visible_line {
            self.translate();

            if self.sprites.armed() != 0 && beam.in_bpl_dma_area() {
                self.sprites.draw_all(&mut self.buffers);
            }
            self.clxdat |= self.collisions.check_line(&self.buffers.depth, vpos);

            border::fill(&mut self.buffers, beam, self.config.debug_border);

            if let Err(violation) = colors.colorize(&self.buffers.color, vpos) {
                fatal(violation);
            }

            if self.config.wrap_prefetch {
                self.buffers.wrap_tail(HPIXELS);
            }
            self.lines_drawn += 1;
        } else {
            colors.skip_line();
        }

        colors.compute_overlay(vpos);
    }

    fn translate(&mut self) {
        let mut sink = Translator {
            buffers: &mut self.buffers,
            bplcon0: BplCon0::from_bits_retain(self.initial_bplcon0),
            bplcon2: BplCon2::from_bits_retain(self.initial_bplcon2),
            prio: Priorities::from_bplcon2(self.initial_bplcon2),
        };
        if let Err(violation) = self.change_log.replay(PIXEL_BUFFER_LEN, &mut sink) {
            fatal(violation);
        }
    }

    /// Refreshes the inspection snapshot.
    pub fn inspect<B: BeamSource, C: ColorStage>(&self, beam: &B, colors: &C) {
        let con0 = BplCon0::from_bits_retain(self.bplcon0);
        let con2 = BplCon2::from_bits_retain(self.bplcon2);
        let prio = Priorities::from_bplcon2(self.bplcon2);
        let (diwstrt, diwstop) = beam.display_window();

        let mut info = DeniseInfo {
            bplcon0: self.bplcon0,
            bplcon1: self.bplcon1,
            bplcon2: self.bplcon2,
            bpu: con0.bitplanes(),
            hires: con0.is_hires(),
            dual_playfield: con0.dual_playfield(),
            pf2_in_front: con2.pf2_in_front(),
            prio1: prio.prio1,
            prio2: prio.prio2,
            diwstrt,
            diwstop,
            bpldat: self.bpldat,
            clxdat: self.clxdat,
            clxcon: self.clxcon,
            ..Default::default()
        };
        for nr in 0..COLOR_REG_COUNT {
            info.color_reg[nr] = colors.color(nr);
            info.color_rgba[nr] = colors.rgba(nr);
        }
        for nr in 0..SPRITE_COUNT {
            info.sprite[nr] = self.sprites.info(nr);
            info.sprite[nr].ptr = beam.sprite_pointer(nr);
        }

        self.inspector.update(info);
    }

    #[must_use]
    pub fn info(&self) -> DeniseInfo {
        self.inspector.get()
    }

    #[must_use]
    pub fn inspector(&self) -> DeniseInspector {
        self.inspector.clone()
    }

    pub fn debug_set_bpu<B: BeamSource>(&mut self, count: u8, beam: &B) {
        let count = u16::from(count.min(6));
        let value = (self.bplcon0 & 0b1000_1111_1111_1111) | (count << 12);
        self.poke_bplcon0(value, beam);
    }

    pub fn debug_set_bplcon<B: BeamSource>(&mut self, x: u8, value: u16, beam: &B) {
        match x {
            0 => self.poke_bplcon0(value, beam),
            1 => self.poke_bplcon1(value),
            2 => self.poke_bplcon2(value, beam),
            _ => warn!("BPLCON{} doesn't exist", x),
        }
    }

    pub fn debug_set_bplcon_bit<B: BeamSource>(&mut self, x: u8, bit: u8, on: bool, beam: &B) {
        let Some(current) = self.bplcon(x) else {
            warn!("BPLCON{} doesn't exist", x);
            return;
        };
        let mask = 1u16 << (bit & 0xF);
        let value = if on { current | mask } else { current & !mask };
        self.debug_set_bplcon(x, value, beam);
    }

    pub fn debug_set_bplcon_nibble<B: BeamSource>(
        &mut self,
        x: u8,
        nibble: u8,
        value: u8,
        beam: &B,
    ) {
        let Some(current) = self.bplcon(x) else {
            warn!("BPLCON{} doesn't exist", x);
            return;
        };
        let shift = 4 * u16::from(nibble & 0b11);
        let mask = 0b1111 << shift;
        let bits = u16::from(value & 0b1111) << shift;
        self.debug_set_bplcon(x, (current & !mask) | bits, beam);
    }

    fn bplcon(&self, x: u8) -> Option<u16> {
        match x {
            0 => Some(self.bplcon0),
            1 => Some(self.bplcon1),
            2 => Some(self.bplcon2),
            _ => None,
        }
    }

    #[must_use]
    pub fn bplcon0(&self) -> u16 {
        self.bplcon0
    }

    #[must_use]
    pub fn bplcon1(&self) -> u16 {
        self.bplcon1
    }

    #[must_use]
    pub fn bplcon2(&self) -> u16 {
        self.bplcon2
    }

    /// BPLCON0, BPLCON1 and BPLCON2 as they were when the line started.
    #[must_use]
    pub fn line_start_bplcon(&self) -> (u16, u16, u16) {
        (self.initial_bplcon0, self.initial_bplcon1, self.initial_bplcon2)
    }

    #[must_use]
    pub fn current_pixel(&self) -> usize {
        self.shifter.current_pixel()
    }

    #[must_use]
    pub fn buffers(&self) -> &LineBuffers {
        &self.buffers
    }

    #[must_use]
    pub fn sprites(&self) -> &SpriteUnit {
        &self.sprites
    }

    #[must_use]
    pub fn change_log(&self) -> &RegisterChangeLog {
        &self.change_log
    }

    #[must_use]
    pub fn lines_drawn(&self) -> u64 {
        self.lines_drawn
    }
}

impl Default for Denise {
    fn default() -> Self {
        Self::new(VideoConfig::default())
    }
}
