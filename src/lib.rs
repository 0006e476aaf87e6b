pub mod beam;
pub mod config;
pub mod consts;
pub mod denise;
pub mod emulator;
pub mod error;
pub mod pixel_engine;

use beam::BeamState;
use config::{Config, VideoConfig};
use consts::*;
use denise::registers::{DeniseInfo, DeniseInspector};
use denise::Denise;
use emulator::Emulation;
use error::{Error, Result};
use log::{debug, trace};
use pixel_engine::{ColorStage, PixelEngine, FRAME_HEIGHT, FRAME_WIDTH};
use serde::{Deserialize, Serialize};

/// A register write performed when the beam reaches (`vpos`, `hpos`). The
/// program is replayed every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledPoke {
    pub vpos: u16,
    pub hpos: u16,
    pub addr: u16,
    pub value: u16,
}

/// Denise, the color stage and the beam counters they share.
#[derive(Serialize, Deserialize)]
pub struct Chipset {
    config: Config,
    beam: BeamState,
    denise: Denise,
    pixel_engine: PixelEngine,
    program: Vec<ScheduledPoke>,
}

impl Chipset {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            beam: BeamState::new(),
            denise: Denise::new(config.video),
            pixel_engine: PixelEngine::new(),
            program: Vec::new(),
        }
    }

    pub fn power_on(&mut self) {
        debug!("Chipset power on");
        self.beam = BeamState::new();
        self.denise.power_on();
        self.pixel_engine.power_on();
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn set_video_config(&mut self, video: VideoConfig) {
        self.config.video = video;
        self.denise.set_config(video);
    }

    pub fn poke(&mut self, addr: u16, value: u16) {
        trace!("[{:03}:{:02X}] > Poke ${:03X} = {:04X}", self.beam.vpos, self.beam.hpos, addr, value);
        match addr {
            BPLCON0                 => self.denise.poke_bplcon0(value, &self.beam),
            BPLCON1                 => self.denise.poke_bplcon1(value),
            BPLCON2                 => self.denise.poke_bplcon2(value, &self.beam),
            BPL1DAT                 => {
                self.denise.poke_bpldat(0, value);
                self.denise.draw_at(PIXELS_PER_FETCH, &self.beam);
            }
            BPL1DAT..=BPL6DAT       => self.denise.poke_bpldat(usize::from((addr - BPL1DAT) >> 1), value),
            SPR0POS..=SPR7DATB      => self.poke_sprite(addr, value),
            COLOR00..=COLOR31       => self.denise.poke_color(addr & !1, value, &self.beam, &mut self.pixel_engine),
            CLXCON                  => self.denise.poke_clxcon(value),
            DIWSTRT | DIWSTOP | DDFSTRT => self.beam.poke(addr, value),
            _ => trace!("Unhandled poke ${:03X}", addr),
        }
    }

    fn poke_sprite(&mut self, addr: u16, value: u16) {
        let offset = addr - SPR0POS;
        let nr = usize::from(offset / SPR_REG_STRIDE);
        match (offset % SPR_REG_STRIDE) & !1 {
            SPRXPOS  => self.denise.poke_spr_pos(nr, value),
            SPRXCTL  => self.denise.poke_spr_ctl(nr, value),
            SPRXDATA => self.denise.poke_spr_data(nr, value),
            SPRXDATB => self.denise.poke_spr_datb(nr, value),
            _ => unreachable!(),
        }
    }

    pub fn peek(&mut self, addr: u16) -> u16 {
        match addr {
            CLXDAT => self.denise.peek_clxdat(),
            _ => {
                trace!("Unhandled peek ${:03X}", addr);
                0
            }
        }
    }

    /// Adds a write to the per-frame program, keeping it in beam order.
    pub fn schedule(&mut self, vpos: u16, hpos: u16, addr: u16, value: u16) {
        let poke = ScheduledPoke { vpos, hpos, addr, value };
        let at = self
            .program
            .partition_point(|p| (p.vpos, p.hpos) <= (vpos, hpos));
        self.program.insert(at, poke);
    }

    pub fn clear_program(&mut self) {
        self.program.clear();
    }

    #[must_use]
    pub fn program(&self) -> &[ScheduledPoke] {
        &self.program
    }

    /// Runs one scanline: window evaluation, scheduled writes, then the Denise
    /// end of line pipeline.
    pub fn compute_line(&mut self, v: u16) {
        self.beam.advance_line(v);
        self.denise.begin_of_line(&self.beam);

        let vpos = self.beam.vpos;
        let start = self.program.partition_point(|p| p.vpos < vpos);
        let end = self.program.partition_point(|p| p.vpos <= vpos);
        for i in start..end {
            let poke = self.program[i];
            self.beam.hpos = poke.hpos;
            self.poke(poke.addr, poke.value);
        }

        self.denise.end_of_line(vpos, &self.beam, &mut self.pixel_engine);
    }

    pub fn compute_frame(&mut self) {
        for v in 0..VPOS_CNT as u16 {
            self.compute_line(v);
        }
        self.pixel_engine.swap_buffers();
        self.denise.inspect(&self.beam, &self.pixel_engine);
    }

    /// Last finished frame, RGBA, [`Chipset::screen_size`] pixels.
    #[must_use]
    pub fn screen_rgba(&self) -> &[u32] {
        self.pixel_engine.frame()
    }

    #[must_use]
    pub fn screen_size(&self) -> (usize, usize) {
        (FRAME_WIDTH, FRAME_HEIGHT)
    }

    #[must_use]
    pub fn frames(&self) -> u64 {
        self.pixel_engine.frames()
    }

    #[must_use]
    pub fn color(&self, nr: usize) -> u16 {
        self.pixel_engine.color(nr)
    }

    #[must_use]
    pub fn info(&self) -> DeniseInfo {
        self.denise.info()
    }

    #[must_use]
    pub fn inspector(&self) -> DeniseInspector {
        self.denise.inspector()
    }

    pub fn debug_set_bpu(&mut self, count: u8) {
        self.denise.debug_set_bpu(count, &self.beam);
    }

    pub fn debug_set_bplcon(&mut self, x: u8, value: u16) {
        self.denise.debug_set_bplcon(x, value, &self.beam);
    }

    pub fn debug_set_bplcon_bit(&mut self, x: u8, bit: u8, on: bool) {
        self.denise.debug_set_bplcon_bit(x, bit, on, &self.beam);
    }

    pub fn debug_set_bplcon_nibble(&mut self, x: u8, nibble: u8, value: u8) {
        self.denise.debug_set_bplcon_nibble(x, nibble, value, &self.beam);
    }

    #[must_use]
    pub fn beam(&self) -> &BeamState {
        &self.beam
    }

    pub fn beam_mut(&mut self) -> &mut BeamState {
        &mut self.beam
    }

    #[must_use]
    pub fn denise(&self) -> &Denise {
        &self.denise
    }

    pub fn denise_mut(&mut self) -> &mut Denise {
        &mut self.denise
    }

    #[must_use]
    pub fn pixel_engine(&self) -> &PixelEngine {
        &self.pixel_engine
    }

    pub fn serialized_size(&self) -> Result<usize> {
        postcard::experimental::serialized_size(&self).map_err(|e| Error::Snapshot(e.to_string()))
    }
}

impl Default for Chipset {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Emulation for Chipset {
    fn compute_frame(&mut self) {
        Chipset::compute_frame(self);
    }

    fn refresh_rate(&self) -> f64 {
        PAL_REFRESH_RATE
    }

    fn did_power_on(&mut self) {
        self.power_on();
    }
}

pub fn serialize(chipset: &Chipset, data: &mut [u8]) -> Result<()> {
    match postcard::to_slice(&chipset, data) {
        Err(e) => Err(Error::Snapshot(format!("{}", e))),
        Ok(_) => Ok(()),
    }
}

pub fn deserialize(data: &[u8]) -> Result<Chipset> {
    let mut chipset = match postcard::from_bytes::<Chipset>(data) {
        Err(e) => return Err(Error::Snapshot(format!("{}", e))),
        Ok(c) => c,
    };
    chipset.pixel_engine.restore_palette();
    Ok(chipset)
}

/// Routes `log` output to stderr. Safe to call more than once.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(cfg!(test)).try_init();
}

pub const fn info() -> (&'static str, &'static str) {
    ("Denise", env!("CARGO_PKG_VERSION"))
}
