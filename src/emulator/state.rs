use hashbrown::HashMap;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ExecState {
    Off = 0,
    Paused,
    Running,
    Suspended,
    Halted,
}

pub const EXEC_STATES: [ExecState; 5] = [
    ExecState::Off,
    ExecState::Paused,
    ExecState::Running,
    ExecState::Suspended,
    ExecState::Halted,
];

/// Hook fired on the emulator thread while stepping through a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    None,
    PowerOn,
    PowerOff,
    Run,
    Pause,
    Halt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub action: Action,
    pub next: ExecState,
}

const fn step(action: Action, next: ExecState) -> Transition {
    Transition { action, next }
}

lazy_static! {
    /// One step from the current towards the requested state. Pairs missing from
    /// the table are invalid requests.
    static ref TRANSITIONS: HashMap<(ExecState, ExecState), Transition> = {
        use Action as A;
        use ExecState::*;

        let mut t = HashMap::new();
        t.insert((Off, Paused), step(A::PowerOn, Paused));
        t.insert((Off, Running), step(A::PowerOn, Paused));
        t.insert((Off, Halted), step(A::Halt, Halted));

        t.insert((Paused, Off), step(A::PowerOff, Off));
        t.insert((Paused, Running), step(A::Run, Running));
        t.insert((Paused, Halted), step(A::PowerOff, Off));

        t.insert((Running, Off), step(A::Pause, Paused));
        t.insert((Running, Paused), step(A::Pause, Paused));
        t.insert((Running, Suspended), step(A::None, Suspended));
        t.insert((Running, Halted), step(A::Pause, Paused));

        t.insert((Suspended, Off), step(A::Pause, Paused));
        t.insert((Suspended, Paused), step(A::Pause, Paused));
        t.insert((Suspended, Running), step(A::None, Running));
        t.insert((Suspended, Halted), step(A::Pause, Paused));
        t
    };
}

/// Looks up the next step. `None` for an invalid request or when `from == to`.
#[must_use]
pub fn next_step(from: ExecState, to: ExecState) -> Option<Transition> {
    TRANSITIONS.get(&(from, to)).copied()
}

/// Full sequence of steps from `from` to `to`, or `None` if `to` can't be
/// reached.
#[must_use]
pub fn path(from: ExecState, to: ExecState) -> Option<Vec<Transition>> {
    let mut steps = Vec::new();
    let mut state = from;
    while state != to {
        let t = next_step(state, to)?;
        steps.push(t);
        state = t.next;
        if steps.len() > EXEC_STATES.len() {
            return None;
        }
    }
    Some(steps)
}
