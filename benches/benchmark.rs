use criterion::{criterion_group, criterion_main, Criterion};
use denise::consts::*;
use denise::Chipset;

// Six lores bitplanes fetched across the whole display window.
fn busy_chipset() -> Chipset {
    let mut chipset = Chipset::default();
    chipset.schedule(0, 0, DIWSTRT, 0x2C81);
    chipset.schedule(0, 0, DIWSTOP, 0x2CC1);
    chipset.schedule(0, 0, DDFSTRT, 0x38);
    chipset.schedule(0, 2, BPLCON0, 0x6200);
    for v in 0x2C..0x12C {
        for fetch in 0..20u16 {
            let h = 0x38 + 8 * fetch;
            for plane in (0..6u16).rev() {
                chipset.schedule(v, h, BPL1DAT + 2 * plane, 0xA5A5 ^ (v + fetch));
            }
        }
    }
    chipset
}

fn criterion_benchmark_frame(c: &mut Criterion) {
    let mut chipset = busy_chipset();
    c.bench_function("compute frame", |b| b.iter(|| chipset.compute_frame()));
}

fn criterion_benchmark_line(c: &mut Criterion) {
    let mut chipset = busy_chipset();
    c.bench_function("compute line", |b| b.iter(|| chipset.compute_line(0x80)));
}

criterion_group!(benches, criterion_benchmark_frame, criterion_benchmark_line);
criterion_main!(benches);
