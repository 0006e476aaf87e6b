use log::trace;
use serde::{Deserialize, Serialize};

use crate::error::IntegrityViolation;

/// Register id of the terminal entry appended by [`RegisterChangeLog::replay`].
pub const SENTINEL: u16 = 0;

const LOG_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegChange {
    pub reg: u16,
    pub value: u16,
    pub pixel: usize,
}

/// Receives the segments and register changes of a replayed line.
pub trait ChangeSink {
    /// Processes `[from, to)` with the register values currently in effect.
    fn resolve(&mut self, from: usize, to: usize);

    /// Makes `change` the value in effect for all following pixels.
    fn apply(&mut self, change: &RegChange) -> Result<(), IntegrityViolation>;
}

/// Register writes that take effect at a specific pixel of the current line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterChangeLog {
    changes: Vec<RegChange>,
}

impl RegisterChangeLog {
    #[must_use]
    pub fn new() -> Self {
        Self {
            changes: Vec::with_capacity(LOG_CAPACITY),
        }
    }

    #[inline]
    pub fn reset(&mut self) {
        self.changes.clear();
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    #[must_use]
    pub fn changes(&self) -> &[RegChange] {
        &self.changes
    }

    /// Appends a change. Registers take effect at slightly different offsets from
    /// the bus cycle that wrote them, so a later write may land on an earlier
    /// pixel. Those are moved in front of the entries they precede.
    pub fn record(&mut self, reg: u16, value: u16, pixel: usize) {
        trace!("record change ${:03X} = {:04X} @ {}", reg, value, pixel);
        let change = RegChange { reg, value, pixel };
        let at = self
            .changes
            .iter()
            .rposition(|c| c.pixel <= pixel)
            .map_or(0, |i| i + 1);
        self.changes.insert(at, change);
    }

    /// Walks the line in segments split at every recorded change and empties the
    /// log. The last segment ends at `line_len`.
    pub fn replay<S: ChangeSink>(
        &mut self,
        line_len: usize,
        sink: &mut S,
    ) -> Result<(), IntegrityViolation> {
        let mut changes = core::mem::take(&mut self.changes);
        let result = Self::walk(&changes, line_len, sink);
        changes.clear();
        self.changes = changes;
        result
    }

    fn walk<S: ChangeSink>(
        changes: &[RegChange],
        line_len: usize,
        sink: &mut S,
    ) -> Result<(), IntegrityViolation> {
        let mut pixel = 0;

        for change in changes {
            let to = change.pixel.min(line_len);
            if to > pixel {
                sink.resolve(pixel, to);
                pixel = to;
            }
            if change.reg == SENTINEL {
                return Err(IntegrityViolation::UnknownRegisterChange(SENTINEL));
            }
            sink.apply(change)?;
        }

        // Terminal entry (none, 0, line_len): draw the tail after the last change.
        if line_len > pixel {
            sink.resolve(pixel, line_len);
        }
        Ok(())
    }
}

impl Default for RegisterChangeLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct TestSink {
        segments: Vec<(usize, usize)>,
        applied: Vec<(u16, u16)>,
        active: u16,
        active_per_segment: Vec<u16>,
    }

    impl ChangeSink for TestSink {
        fn resolve(&mut self, from: usize, to: usize) {
            self.segments.push((from, to));
            self.active_per_segment.push(self.active);
        }

        fn apply(&mut self, change: &RegChange) -> Result<(), IntegrityViolation> {
            if change.reg == 0x1FE {
                return Err(IntegrityViolation::UnknownRegisterChange(change.reg));
            }
            self.applied.push((change.reg, change.value));
            self.active = change.value;
            Ok(())
        }
    }

    macro_rules! T {
        ($b: expr) => {
            assert!($b);
        };
    }

    #[test]
    fn replay_splits_line_at_each_change() {
        let mut log = RegisterChangeLog::new();
        let mut sink = TestSink::default();

        log.record(0x100, 1, 40);
        log.record(0x104, 2, 120);
        log.record(0x100, 3, 500);
        T!(log.replay(972, &mut sink).is_ok());

        assert_eq!(sink.segments, vec![(0, 40), (40, 120), (120, 500), (500, 972)]);
        assert_eq!(sink.active_per_segment, vec![0, 1, 2, 3]);
        T!(log.is_empty());
    }

    #[test]
    fn empty_log_resolves_the_whole_line_once() {
        let mut log = RegisterChangeLog::new();
        let mut sink = TestSink::default();

        T!(log.replay(908, &mut sink).is_ok());
        assert_eq!(sink.segments, vec![(0, 908)]);
        T!(sink.applied.is_empty());
    }

    #[test]
    fn changes_at_the_same_pixel_produce_no_empty_segment() {
        let mut log = RegisterChangeLog::new();
        let mut sink = TestSink::default();

        log.record(0x100, 1, 0);
        log.record(0x104, 2, 64);
        log.record(0x100, 3, 64);
        T!(log.replay(128, &mut sink).is_ok());

        assert_eq!(sink.segments, vec![(0, 64), (64, 128)]);
        assert_eq!(sink.applied, vec![(0x100, 1), (0x104, 2), (0x100, 3)]);
    }

    #[test]
    fn late_write_to_earlier_pixel_is_kept_in_order() {
        let mut log = RegisterChangeLog::new();

        log.record(0x104, 1, 44);
        log.record(0x100, 2, 40);
        log.record(0x100, 3, 44);

        let pixels: Vec<usize> = log.changes().iter().map(|c| c.pixel).collect();
        assert_eq!(pixels, vec![40, 44, 44]);
        assert_eq!(log.changes()[1].value, 1);
        assert_eq!(log.changes()[2].value, 3);
    }

    #[test]
    fn unknown_target_aborts_replay_and_clears_log() {
        let mut log = RegisterChangeLog::new();
        let mut sink = TestSink::default();

        log.record(0x1FE, 0, 10);
        let result = log.replay(100, &mut sink);

        assert_eq!(result, Err(IntegrityViolation::UnknownRegisterChange(0x1FE)));
        T!(log.is_empty());
    }

    #[test]
    fn reset_clears_pending_changes() {
        let mut log = RegisterChangeLog::new();
        log.record(0x100, 1, 10);
        log.record(0x100, 2, 20);
        log.reset();
        T!(log.is_empty());
    }
}
