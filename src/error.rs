use log::error;

use crate::emulator::ExecState;

/// Corrupt pipeline state. These never cross a scanline boundary: the orchestrator
/// turns them into an abort through [`fatal`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityViolation {
    #[error("pixel write at {pixel} outside line buffer of {len} cells")]
    PixelOutOfRange { pixel: usize, len: usize },

    #[error("register change log holds unknown target ${0:03X}")]
    UnknownRegisterChange(u16),

    #[error("line {vpos} is outside the frame buffer")]
    LineOutOfRange { vpos: u16 },
}

/// Misuse of the emulator lifecycle. Always reported back to the caller.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("the emulator thread hasn't been launched yet, missing call to launch()")]
    NotLaunched,

    #[error("the emulator thread is already running")]
    AlreadyLaunched,

    #[error("emulator is not ready to run: {0}")]
    NotReady(String),

    #[error("invalid state transition {from:?} -> {to:?}")]
    InvalidTransition { from: ExecState, to: ExecState },

    #[error("state changes can't be requested from inside the emulator thread")]
    CalledFromEmulatorThread,

    #[error("warp source {0} out of range (0..8)")]
    InvalidWarpSource(u8),

    #[error("the emulator thread died while computing a frame")]
    Crashed,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("integrity violation: {0}")]
    Integrity(#[from] IntegrityViolation),

    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("snapshot error: {0}")]
    Snapshot(String),
}

pub type Result<T> = core::result::Result<T, Error>;

/// Aborts emulation. Continuing with a corrupted line buffer would desynchronize
/// the picture for good. On the emulator thread the unwind is caught by the run
/// loop, which halts the machine and reports [`LifecycleError::Crashed`].
#[cold]
#[track_caller]
pub fn fatal(violation: IntegrityViolation) -> ! {
    error!("{}", violation);
    panic!("integrity violation: {violation}");
}
