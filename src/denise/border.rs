use super::buffers::LineBuffers;
use crate::beam::BeamSource;
use crate::consts::{BORDER_DEBUG_LEFT, BORDER_DEBUG_RIGHT, BORDER_DEBUG_VERTICAL, LAST_PIXEL};

/// Overwrites everything outside the display window with the border color.
pub fn fill<B: BeamSource + ?Sized>(buf: &mut LineBuffers, beam: &B, debug_border: bool) {
    let (left, right, vertical) = match debug_border {
        true => (BORDER_DEBUG_LEFT, BORDER_DEBUG_RIGHT, BORDER_DEBUG_VERTICAL),
        false => (0, 0, 0),
    };

    let h_flop_was_set = beam.h_flop_at_line_start() || beam.h_flop_on().is_some();
    if !beam.v_flop() || !h_flop_was_set {
        buf.color[..=LAST_PIXEL].fill(vertical);
        return;
    }

    if !beam.h_flop_at_line_start() {
        if let Some(on) = beam.h_flop_on() {
            let end = (2 * on as usize).min(LAST_PIXEL + 1);
            buf.color[..end].fill(left);
        }
    }

    if let Some(off) = beam.h_flop_off() {
        let start = 2 * off as usize;
        if start <= LAST_PIXEL {
            buf.color[start..=LAST_PIXEL].fill(right);
        }
    }
}
