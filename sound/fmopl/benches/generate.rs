//! Sample loop throughput
//!
//! Run with: cargo bench --bench generate -p fmopl

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use fmopl::{Chip, ChipConfig};
use std::hint::black_box;

/// Modulator offsets of channels 0..9 in a bank
const OPERATORS: [u16; 9] = [0x00, 0x01, 0x02, 0x08, 0x09, 0x0a, 0x10, 0x11, 0x12];

fn program_voice(chip: &mut Chip, bank: u16, ch: usize, fnum: u16) {
    let op = OPERATORS[ch];
    for (reg, value) in [
        (0x20 + op, 0xe1), // tremolo, vibrato, hold
        (0x23 + op, 0x21),
        (0x40 + op, 0x18),
        (0x43 + op, 0x00),
        (0x60 + op, 0xf4),
        (0x63 + op, 0xf2),
        (0x80 + op, 0x36),
        (0x83 + op, 0x46),
        (0xc0 + ch as u16, 0x3c),
        (0xa0 + ch as u16, (fnum & 0xff) as u8),
        (0xb0 + ch as u16, 0x30 | (fnum >> 8) as u8),
    ] {
        chip.write_register(bank | reg, value);
    }
}

fn melodic() -> Chip {
    let mut chip = Chip::new(ChipConfig::opl3(44_100)).unwrap();
    chip.write_register(0x105, 1);
    chip.write_register(0xbd, 0xc0);
    for bank in [0x000, 0x100] {
        for ch in 0..9 {
            program_voice(&mut chip, bank, ch, 0x158 + ch as u16 * 0x10);
        }
    }
    chip
}

fn four_op() -> Chip {
    let mut chip = Chip::new(ChipConfig::opl3(44_100)).unwrap();
    chip.write_register(0x105, 1);
    chip.write_register(0x104, 0x3f);
    for bank in [0x000, 0x100] {
        for ch in [3, 4, 5, 0, 1, 2] {
            program_voice(&mut chip, bank, ch, 0x1c0);
        }
    }
    chip
}

fn rhythm() -> Chip {
    let mut chip = Chip::new(ChipConfig::opl2(44_100)).unwrap();
    chip.write_register(0x01, 0x20);
    for ch in 0..9 {
        program_voice(&mut chip, 0, ch, 0x200);
    }
    chip.write_register(0xbd, 0x3f);
    chip
}

fn bench_generate(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate");

    for (name, setup) in [
        ("melodic", melodic as fn() -> Chip),
        ("four_op", four_op),
        ("rhythm", rhythm),
    ] {
        for frames in [512usize, 4096] {
            let mut chip = setup();
            let mut buffer = vec![0i32; frames * 2];
            let mut peaks = vec![0u32; chip.channels().len()];
            group.bench_with_input(BenchmarkId::new(name, frames), &frames, |b, _| {
                b.iter(|| {
                    buffer.fill(0);
                    chip.generate(&mut [&mut buffer[..]], &mut peaks);
                    black_box(&buffer);
                });
            });
        }
    }

    group.finish();
}

fn bench_per_voice(c: &mut Criterion) {
    let mut chip = melodic();
    let voices = chip.channels().len();
    let mut buffers = vec![vec![0i32; 1024]; voices];
    let mut peaks = vec![0u32; voices];

    c.bench_function("generate_per_voice", |b| {
        b.iter(|| {
            let mut slices: Vec<&mut [i32]> = buffers.iter_mut().map(|v| v.as_mut_slice()).collect();
            slices.iter_mut().for_each(|s| s.fill(0));
            chip.generate(&mut slices, &mut peaks);
            black_box(&peaks);
        });
    });
}

criterion_group!(benches, bench_generate, bench_per_voice);
criterion_main!(benches);
