// Run with:  cargo bench --bench scan_half_row
//
// Cost of shifting and latching one half-row through all bit-planes, with the
// hold times taken out by a virtual clock.

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use embedded_graphics::pixelcolor::RgbColor;
use embedded_graphics::prelude::Point;
use embedded_hal::digital::PinState;
use hub75_bitbang::bitplane::BitPlaneBuffer;
use hub75_bitbang::masks::MaskTables;
use hub75_bitbang::pins::{OutputLines, PinMapping};
use hub75_bitbang::scheduler::Scanner;
use hub75_bitbang::sim::{SimPanel, VirtualClock};
use hub75_bitbang::{compute_rows, Color, PLANES};
use std::convert::Infallible;
use std::hint::black_box;

const ROWS: usize = 32;
const COLS: usize = 64;
const NROWS: usize = compute_rows(ROWS);
const MAPPING: PinMapping = PinMapping::ADAFRUIT_BONNET;

/// Lines that only remember their level, like a memory-mapped GPIO bank.
#[derive(Default)]
struct RegisterLines {
    level: u64,
}

impl OutputLines for RegisterLines {
    type Error = Infallible;

    fn open(&mut self, _line: u8, _state: PinState) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set(&mut self, mask: u64) {
        self.level = black_box(self.level | mask);
    }

    fn clear(&mut self, mask: u64) {
        self.level = black_box(self.level & !mask);
    }
}

fn frame() -> BitPlaneBuffer<ROWS, COLS, NROWS> {
    let mut fb = BitPlaneBuffer::new();
    for y in 0..ROWS {
        for x in 0..COLS {
            let color = if (x + y) % 3 == 0 {
                Color::MAGENTA
            } else {
                Color::new(x as u8 * 4, 0, y as u8 * 8)
            };
            fb.set_pixel(Point::new(x as i32, y as i32), color);
        }
    }
    fb
}

fn scan_half_row(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan_half_row");
    group.throughput(Throughput::Elements((COLS * PLANES) as u64));
    let fb = frame();

    group.bench_function("register_lines", |b| {
        let clock = VirtualClock::new(1_000_000_000);
        let lines = RegisterLines::default();
        let mut scanner = Scanner::new(lines, clock, MaskTables::new(&MAPPING));
        b.iter(|| {
            scanner.scan_half_row(black_box(&fb), 1);
            scanner.advance();
        });
    });

    group.bench_function("sim_panel", |b| {
        let clock = VirtualClock::new(1_000_000_000);
        let mut panel = SimPanel::new(MAPPING, COLS, ROWS, clock.clone());
        for (line, state) in MAPPING.initial_states(NROWS) {
            panel.open(line, state).unwrap();
        }
        let mut scanner = Scanner::new(panel, clock, MaskTables::new(&MAPPING));
        b.iter(|| {
            scanner.scan_half_row(black_box(&fb), 1);
            scanner.advance();
        });
    });

    group.finish();
}

criterion_group!(benches, scan_half_row);
criterion_main!(benches);
