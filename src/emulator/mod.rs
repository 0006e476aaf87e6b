pub mod pacing;
pub mod state;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use log::{debug, error, trace};
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::config::ThreadConfig;
use crate::consts::PAL_REFRESH_RATE;
use crate::error::LifecycleError;
use pacing::{FramePacer, Stats};
pub use state::{next_step, Action, ExecState, Transition};

pub const WARP_SOURCES: u8 = 8;

/// The machine driven by the emulator thread. All hooks run on that thread.
pub trait Emulation: Send + 'static {
    fn compute_frame(&mut self);

    fn refresh_rate(&self) -> f64 {
        PAL_REFRESH_RATE
    }

    /// Reports why the machine can't run yet.
    fn is_ready(&self) -> Result<(), String> {
        Ok(())
    }

    /// Called once per loop iteration, whatever the state, before any frame is
    /// computed.
    fn update(&mut self) {}

    fn did_power_on(&mut self) {}
    fn did_power_off(&mut self) {}
    fn did_run(&mut self) {}
    fn did_pause(&mut self) {}
    fn did_halt(&mut self) {}
    fn did_warp_on(&mut self) {}
    fn did_warp_off(&mut self) {}
}

#[derive(Debug)]
struct Control {
    state: ExecState,
    requested: Option<ExecState>,
    warp: u8,
    suspend_counter: u32,
    crashed: bool,
    cpu_load: f64,
    fps: f64,
}

impl Control {
    /// Target actually reached for a request. Running and Suspended are decided
    /// by the suspend counter at the time the request is applied.
    fn resolve(&self, to: ExecState) -> ExecState {
        match to {
            ExecState::Running | ExecState::Suspended if self.suspend_counter > 0 => {
                ExecState::Suspended
            }
            ExecState::Suspended => ExecState::Running,
            other => other,
        }
    }

    fn wants_suspension(&self) -> bool {
        matches!(self.state, ExecState::Running | ExecState::Suspended)
            || matches!(
                self.requested,
                Some(ExecState::Running | ExecState::Suspended)
            )
    }
}

struct Shared<E> {
    core: Mutex<E>,
    control: Mutex<Control>,
    changed: Condvar,
}

/// Runs an [`Emulation`] on a dedicated thread. State changes requested from
/// other threads are performed by the emulator thread between two frames; the
/// requesting thread blocks until then.
pub struct Emulator<E: Emulation> {
    shared: Arc<Shared<E>>,
    config: ThreadConfig,
    thread: Option<JoinHandle<()>>,
    thread_id: Option<ThreadId>,
}

impl<E: Emulation> Emulator<E> {
    #[must_use]
    pub fn new(core: E, config: ThreadConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(core),
                control: Mutex::new(Control {
                    state: ExecState::Off,
                    requested: None,
                    warp: 0,
                    suspend_counter: 0,
                    crashed: false,
                    cpu_load: 0.,
                    fps: 0.,
                }),
                changed: Condvar::new(),
            }),
            config,
            thread: None,
            thread_id: None,
        }
    }

    pub fn launch(&mut self) -> Result<(), LifecycleError> {
        if self.thread.is_some() {
            return Err(LifecycleError::AlreadyLaunched);
        }
        let shared = Arc::clone(&self.shared);
        let config = self.config;
        let handle = std::thread::Builder::new()
            .name("emulator".into())
            .spawn(move || run_loop(&shared, &config))
            .map_err(|e| LifecycleError::NotReady(e.to_string()))?;
        self.thread_id = Some(handle.thread().id());
        self.thread = Some(handle);
        debug!("emulator thread launched");
        Ok(())
    }

    #[must_use]
    pub fn is_launched(&self) -> bool {
        self.thread.is_some()
    }

    #[must_use]
    pub fn state(&self) -> ExecState {
        self.shared.control.lock().state
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == ExecState::Running
    }

    #[must_use]
    pub fn is_warping(&self) -> bool {
        self.shared.control.lock().warp != 0
    }

    #[must_use]
    pub fn suspend_count(&self) -> u32 {
        self.shared.control.lock().suspend_counter
    }

    #[must_use]
    pub fn cpu_load(&self) -> f64 {
        self.shared.control.lock().cpu_load
    }

    #[must_use]
    pub fn fps(&self) -> f64 {
        self.shared.control.lock().fps
    }

    fn lock_core(&self) -> MutexGuard<'_, E> {
        self.shared.core.lock()
    }

    fn wait_for_request(
        &self,
        ctl: &mut MutexGuard<'_, Control>,
    ) -> Result<(), LifecycleError> {
        while ctl.requested.is_some() && !ctl.crashed {
            self.shared.changed.wait(ctl);
        }
        // A request left behind by a dead thread was never served
        match ctl.requested {
            Some(_) => Err(LifecycleError::Crashed),
            None => Ok(()),
        }
    }

    fn check_caller(&self) -> Result<(), LifecycleError> {
        match self.thread_id {
            None => Err(LifecycleError::NotLaunched),
            Some(id) if id == std::thread::current().id() => {
                Err(LifecycleError::CalledFromEmulatorThread)
            }
            Some(_) => Ok(()),
        }
    }

    fn change_state_to(&self, to: ExecState) -> Result<(), LifecycleError> {
        self.check_caller()?;

        let mut ctl = self.shared.control.lock();
        let pending = self.wait_for_request(&mut ctl);
        if ctl.state == to {
            return Ok(());
        }
        pending?;
        if ctl.crashed {
            return Err(LifecycleError::Crashed);
        }
        if state::path(ctl.state, to).is_none() {
            return Err(LifecycleError::InvalidTransition { from: ctl.state, to });
        }

        debug!("request {:?} -> {:?}", ctl.state, to);
        ctl.requested = Some(to);
        self.shared.changed.notify_all();
        self.wait_for_request(&mut ctl)
    }

    /// Brings Running and Suspended in line with the suspend counter. The
    /// caller has already changed the counter under the same lock.
    fn sync_suspension(
        &self,
        ctl: &mut MutexGuard<'_, Control>,
    ) -> Result<(), LifecycleError> {
        loop {
            self.wait_for_request(ctl)?;
            let to = match (ctl.state, ctl.suspend_counter) {
                (ExecState::Running, n) if n > 0 => ExecState::Suspended,
                (ExecState::Suspended, 0) => ExecState::Running,
                _ => return Ok(()),
            };
            debug!("request {:?} -> {:?}", ctl.state, to);
            ctl.requested = Some(to);
            self.shared.changed.notify_all();
        }
    }

    pub fn power_on(&self) -> Result<(), LifecycleError> {
        self.check_caller()?;
        if self.state() == ExecState::Off {
            self.change_state_to(ExecState::Paused)?;
        }
        Ok(())
    }

    pub fn power_off(&self) -> Result<(), LifecycleError> {
        self.check_caller()?;
        if self.state() != ExecState::Off {
            self.change_state_to(ExecState::Off)?;
        }
        Ok(())
    }

    pub fn run(&self) -> Result<(), LifecycleError> {
        self.check_caller()?;
        if self.state() != ExecState::Running {
            self.lock_core().is_ready().map_err(LifecycleError::NotReady)?;
            self.change_state_to(ExecState::Running)?;
        }
        Ok(())
    }

    pub fn pause(&self) -> Result<(), LifecycleError> {
        self.check_caller()?;
        if self.state() == ExecState::Running {
            self.change_state_to(ExecState::Paused)?;
        }
        Ok(())
    }

    /// Powers off, stops the emulator thread and waits for it to exit.
    pub fn halt(&mut self) -> Result<(), LifecycleError> {
        self.change_state_to(ExecState::Halted)?;
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!("emulator thread panicked");
            }
        }
        Ok(())
    }

    /// Stops frame computation until the matching [`Emulator::resume`]. Calls nest.
    /// A machine that is neither running nor suspended is left alone.
    pub fn suspend(&self) -> Result<(), LifecycleError> {
        self.check_caller()?;
        let mut ctl = self.shared.control.lock();
        if ctl.suspend_counter == 0 && !ctl.wants_suspension() {
            return Ok(());
        }
        ctl.suspend_counter += 1;
        trace!("suspend ({})", ctl.suspend_counter);
        self.sync_suspension(&mut ctl)
    }

    pub fn resume(&self) -> Result<(), LifecycleError> {
        self.check_caller()?;
        let mut ctl = self.shared.control.lock();
        if ctl.suspend_counter == 0 {
            return Ok(());
        }
        ctl.suspend_counter -= 1;
        trace!("resume ({})", ctl.suspend_counter);
        self.sync_suspension(&mut ctl)
    }

    /// Runs `f` on the machine while the emulator thread is suspended. This is
    /// the only way to reach the machine from outside the emulator thread.
    pub fn suspended<R>(&self, f: impl FnOnce(&mut E) -> R) -> Result<R, LifecycleError> {
        self.suspend()?;
        let result = f(&mut *self.lock_core());
        self.resume()?;
        Ok(result)
    }

    pub fn warp_on(&self, source: u8) -> Result<(), LifecycleError> {
        self.switch_warp(true, source)
    }

    pub fn warp_off(&self, source: u8) -> Result<(), LifecycleError> {
        self.switch_warp(false, source)
    }

    fn switch_warp(&self, on: bool, source: u8) -> Result<(), LifecycleError> {
        if source >= WARP_SOURCES {
            return Err(LifecycleError::InvalidWarpSource(source));
        }
        self.suspend()?;
        let (old, new) = {
            let mut ctl = self.shared.control.lock();
            let old = ctl.warp;
            match on {
                true => ctl.warp |= 1 << source,
                false => ctl.warp &= !(1 << source),
            }
            (old, ctl.warp)
        };
        if (old != 0) != (new != 0) {
            debug!("warp {}", if new != 0 { "on" } else { "off" });
            let mut core = self.lock_core();
            match new != 0 {
                true => core.did_warp_on(),
                false => core.did_warp_off(),
            }
        }
        self.resume()
    }
}

impl<E: Emulation> Drop for Emulator<E> {
    fn drop(&mut self) {
        if self.thread.is_some() && self.halt().is_err() {
            error!("emulator thread didn't halt");
        }
    }
}

fn switch_state<E: Emulation>(ctl: &mut Control, to: ExecState, core: &mut E) {
    while ctl.state != to {
        let Some(t) = next_step(ctl.state, to) else {
            error!("invalid state transition {:?} -> {:?}", ctl.state, to);
            return;
        };
        match t.action {
            Action::None => (),
            Action::PowerOn => core.did_power_on(),
            Action::PowerOff => core.did_power_off(),
            Action::Run => core.did_run(),
            Action::Pause => core.did_pause(),
            Action::Halt => core.did_halt(),
        }
        ctl.state = t.next;
        debug!("changed state to {:?}", ctl.state);
    }
}

fn run_loop<E: Emulation>(shared: &Shared<E>, config: &ThreadConfig) {
    // A fatal integrity violation unwinds out of the machine. Mark the thread
    // dead so that waiting callers return instead of blocking forever.
    if panic::catch_unwind(AssertUnwindSafe(|| execute(shared, config))).is_err() {
        error!("emulator thread crashed, machine halted");
        let mut ctl = shared.control.lock();
        ctl.state = ExecState::Halted;
        ctl.crashed = true;
        shared.changed.notify_all();
    }
    debug!("emulator thread exits");
}

fn execute<E: Emulation>(shared: &Shared<E>, config: &ThreadConfig) {
    let now = Instant::now();
    let refresh_rate = shared.core.lock().refresh_rate();
    let mut pacer = FramePacer::new(now, refresh_rate, config.max_frame_drift);
    let mut stats = Stats::new(now);
    let timeout = Duration::from_millis(config.sleep_timeout_ms);
    let mut was_warping = false;

    loop {
        let (state, warp) = {
            let ctl = shared.control.lock();
            (ctl.state, ctl.warp != 0)
        };
        if state == ExecState::Halted {
            break;
        }
        if was_warping && !warp {
            pacer.resync(Instant::now());
        }
        was_warping = warp;

        // Compute due frames
        let mut core = shared.core.lock();
        core.update();
        if state == ExecState::Running {
            pacer.set_refresh_rate(Instant::now(), core.refresh_rate());

            let start = Instant::now();
            let due = if warp { 1 } else { pacer.due_frames(start) };
            for _ in 0..due {
                core.compute_frame();
                pacer.frame_done();
            }
            stats.add_busy(start.elapsed(), due as u32);
        }
        drop(core);

        // Perform a requested state change
        {
            let mut ctl = shared.control.lock();
            if let Some(to) = ctl.requested {
                let to = ctl.resolve(to);
                let mut core = shared.core.lock();
                if to == ExecState::Suspended && ctl.state != ExecState::Suspended {
                    switch_state(&mut ctl, ExecState::Running, &mut *core);
                }
                switch_state(&mut ctl, to, &mut *core);
                ctl.requested = None;
                shared.changed.notify_all();
            }
        }

        // Wait for the next frame
        {
            let mut ctl = shared.control.lock();
            let running = ctl.state == ExecState::Running;
            if ctl.requested.is_none() && !(warp && running) {
                let now = Instant::now();
                let deadline = match running {
                    true => pacer.next_wakeup().min(now + timeout),
                    false => now + timeout,
                };
                let _ = shared.changed.wait_until(&mut ctl, deadline);
            }
        }

        let now = Instant::now();
        stats.tick(now, config.stats_interval);
        let mut ctl = shared.control.lock();
        ctl.cpu_load = stats.cpu_load();
        ctl.fps = stats.fps();
    }
}
