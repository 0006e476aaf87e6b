use log::debug;
use serde::{Deserialize, Serialize};

use super::buffers::LineBuffers;
use super::depth::{playfield_depth, Depth, BACKGROUND};
use super::registers::BplCon2;

// Dual playfield mode selects colors 8 to 15 for playfield 2.
const PF2_PALETTE: u8 = 0b1000;

/// Depth tags of both playfields, derived from the BPLCON2 priority fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Priorities {
    pub prio1: u16,
    pub prio2: u16,
    pub prio12: u16,
}

impl Priorities {
    #[must_use]
    pub fn from_bplcon2(bplcon2: u16) -> Self {
        let con = BplCon2::from_bits_retain(bplcon2);
        let (code1, code2) = (con.pf1_code(), con.pf2_code());
        if code1 > 4 || code2 > 4 {
            debug!(
                "reserved playfield priority in BPLCON2 {:04X}, using code 4",
                bplcon2
            );
        }
        let prio1 = playfield_depth(code1).bits();
        let prio2 = playfield_depth(code2).bits();
        Self {
            prio1,
            prio2,
            prio12: prio1.max(prio2),
        }
    }
}

impl Default for Priorities {
    fn default() -> Self {
        Self::from_bplcon2(0)
    }
}

/// Single playfield: the raw value is the color index. Opaque pixels carry the
/// playfield 2 priority, as the hardware uses PF2P for the only playfield.
pub fn resolve_single(buf: &mut LineBuffers, from: usize, to: usize, prio: &Priorities) {
    let raw = &mut buf.raw[from..to];
    let color = &mut buf.color[from..to];
    let depth = &mut buf.depth[from..to];

    for ((s, c), z) in raw.iter_mut().zip(color.iter_mut()).zip(depth.iter_mut()) {
        *c = *s;
        *z = if *s != 0 { prio.prio2 } else { BACKGROUND };
        *s = 0;
    }
}

#[inline]
#[must_use]
pub fn split_dual(s: u8) -> (u8, u8) {
    let index1 = (s & 1) | ((s & 4) >> 1) | ((s & 16) >> 2);
    let index2 = ((s & 2) >> 1) | ((s & 8) >> 2) | ((s & 32) >> 3);
    (index1, index2)
}

/// Dual playfield: odd planes form playfield 1, even planes playfield 2. When
/// both are opaque the front one wins.
pub fn resolve_dual(
    buf: &mut LineBuffers,
    from: usize,
    to: usize,
    prio: &Priorities,
    pf2_in_front: bool,
) {
    let dpf = Depth::dpf.bits();
    let raw = &mut buf.raw[from..to];
    let color = &mut buf.color[from..to];
    let depth = &mut buf.depth[from..to];

    for ((s, c), z) in raw.iter_mut().zip(color.iter_mut()).zip(depth.iter_mut()) {
        let (index1, index2) = split_dual(*s);
        *s = 0;

        let pf1 = (index1, prio.prio1 | dpf);
        let pf2 = (index2 | PF2_PALETTE, prio.prio2 | dpf);

        (*c, *z) = match (index1 != 0, index2 != 0) {
            (false, false) => (0, dpf),
            (true, false) => pf1,
            (false, true) => pf2,
            (true, true) => {
                if pf2_in_front {
                    pf2
                } else {
                    pf1
                }
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestCore {
        buf: LineBuffers,
        prio: Priorities,
    }

    impl Default for TestCore {
        fn default() -> Self {
            Self {
                buf: LineBuffers::new(),
                // PF1P = 2, PF2P = 3
                prio: Priorities::from_bplcon2(0b011_010),
            }
        }
    }

    macro_rules! T {
        ($b: expr) => {
            assert!($b);
        };
    }

    // Raw value with playfield 1 index `a` and playfield 2 index `b`.
    fn dual(a: u8, b: u8) -> u8 {
        (a & 1) | ((a & 2) << 1) | ((a & 4) << 2) | ((b & 1) << 1) | ((b & 2) << 2) | ((b & 4) << 3)
    }

    #[test]
    fn single_playfield_uses_raw_value_as_index() {
        let mut c = TestCore::default();
        for v in 0..64u8 {
            c.buf.raw[v as usize] = v;
        }

        resolve_single(&mut c.buf, 0, 64, &c.prio);

        for v in 0..64usize {
            T!(c.buf.color[v] == v as u8);
            T!(c.buf.raw[v] == 0);
        }
        T!(c.buf.depth[0] == BACKGROUND);
        T!(c.buf.depth[1] == c.prio.prio2);
    }

    #[test]
    fn resolve_touches_only_the_given_range() {
        let mut c = TestCore::default();
        c.buf.raw[9] = 5;
        c.buf.raw[10] = 5;

        resolve_single(&mut c.buf, 10, 20, &c.prio);

        T!(c.buf.raw[9] == 5);
        T!(c.buf.color[9] == 0);
        T!(c.buf.color[10] == 5);
    }

    #[test]
    fn split_dual_interleaves_planes() {
        assert_eq!(split_dual(dual(3, 5)), (3, 5));
        assert_eq!(split_dual(0b010101), (7, 0));
        assert_eq!(split_dual(0b101010), (0, 7));
    }

    #[test]
    fn dual_playfield_tie_break_table() {
        let dpf = Depth::dpf.bits();
        let cases = [
            // pf1, pf2, pf2 in front, color, depth
            (0, 0, true, 0, dpf),
            (0, 0, false, 0, dpf),
            (3, 0, true, 3, 0),
            (3, 0, false, 3, 0),
            (0, 5, true, 13, 1),
            (0, 5, false, 13, 1),
            (3, 5, true, 13, 1),
            (3, 5, false, 3, 0),
        ];

        for (a, b, front2, color, owner) in cases {
            let mut c = TestCore::default();
            c.buf.raw[0] = dual(a, b);

            resolve_dual(&mut c.buf, 0, 1, &c.prio, front2);

            let expected_depth = match (a, b) {
                (0, 0) => dpf,
                _ if owner == 0 => c.prio.prio1 | dpf,
                _ => c.prio.prio2 | dpf,
            };
            assert_eq!(c.buf.color[0], color, "pf1={a} pf2={b} front2={front2}");
            assert_eq!(c.buf.depth[0], expected_depth, "pf1={a} pf2={b} front2={front2}");
            T!(c.buf.raw[0] == 0);
        }
    }

    #[test]
    fn dual_background_sits_behind_every_sprite() {
        let mut c = TestCore::default();
        resolve_dual(&mut c.buf, 0, 4, &c.prio, false);
        T!(c.buf.depth[0] == Depth::dpf.bits());
        T!(c.buf.depth[0] < Depth::sp0.bits());
        T!(c.buf.depth[0] != BACKGROUND);
    }

    #[test]
    fn priorities_track_bplcon2_fields() {
        let p = Priorities::from_bplcon2(0b100_000);
        assert_eq!(p.prio1, Depth::pf_0.bits());
        assert_eq!(p.prio2, Depth::pf_4.bits());
        assert_eq!(p.prio12, Depth::pf_0.bits());
    }

    #[test]
    fn reserved_priority_codes_do_not_abort() {
        let p = Priorities::from_bplcon2(0b111_110);
        assert_eq!(p.prio1, Depth::pf_4.bits());
        assert_eq!(p.prio2, Depth::pf_4.bits());
    }
}
