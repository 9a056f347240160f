use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{Chip, ChipConfig, ChipEvents, ChipType, Timer};

mod opl3_tests;

/// Modulator register offset of channels 0..9 within a bank; the carrier is
/// 3 higher
const OPERATOR_OFFSETS: [u16; 9] = [0x00, 0x01, 0x02, 0x08, 0x09, 0x0a, 0x10, 0x11, 0x12];

/// Output rate that makes one generated frame exactly one chip sample
const NATIVE_RATE: u32 = 49_716;

fn native_chip(chip_type: ChipType) -> Chip {
    Chip::new(ChipConfig {
        chip_type,
        clock_hz: chip_type.clock_divider() * NATIVE_RATE,
        rate_hz: NATIVE_RATE,
    })
    .unwrap()
}

/// Register address of `reg` in the bank holding channel `ch`
fn bank_reg(ch: usize, reg: u16) -> u16 {
    if ch >= 9 { 0x100 | reg } else { reg }
}

fn modulator(ch: usize) -> u16 {
    OPERATOR_OFFSETS[ch % 9]
}

fn carrier(ch: usize) -> u16 {
    OPERATOR_OFFSETS[ch % 9] + 3
}

fn write_slot(chip: &mut Chip, ch: usize, base: u16, op: u16, value: u8) {
    chip.write_register(bank_reg(ch, base + op), value);
}

fn write_channel(chip: &mut Chip, ch: usize, base: u16, value: u8) {
    chip.write_register(bank_reg(ch, base + (ch % 9) as u16), value);
}

/// A plain organ-like voice: instant attack, held at full level until key
/// off, fast release. The modulator is fairly loud so FM is audible.
fn write_tone(chip: &mut Chip, ch: usize, connection: bool) {
    for op in [modulator(ch), carrier(ch)] {
        write_slot(chip, ch, 0x20, op, 0x21);
        write_slot(chip, ch, 0x60, op, 0xf0);
        write_slot(chip, ch, 0x80, op, 0x0f);
    }
    write_slot(chip, ch, 0x40, modulator(ch), 0x10);
    write_slot(chip, ch, 0x40, carrier(ch), 0x00);
    write_channel(chip, ch, 0xc0, 0x30 | connection as u8);
    write_channel(chip, ch, 0xa0, 0x98);
    // block 4, no key
    write_channel(chip, ch, 0xb0, 0x11);
}

fn key_on(chip: &mut Chip, ch: usize) {
    write_channel(chip, ch, 0xb0, 0x31);
}

fn key_off(chip: &mut Chip, ch: usize) {
    write_channel(chip, ch, 0xb0, 0x11);
}

/// Every voice mixed into one stereo buffer
fn render_mixed(chip: &mut Chip, frames: usize) -> Vec<i32> {
    let mut buffer = vec![0; frames * 2];
    let mut peaks = vec![0; chip.channels().len()];
    chip.generate(&mut [&mut buffer[..]], &mut peaks);
    buffer
}

/// One stereo buffer per voice, plus the peaks
fn render_voices(chip: &mut Chip, frames: usize) -> (Vec<Vec<i32>>, Vec<u32>) {
    let voices = chip.channels().len();
    let mut buffers = vec![vec![0i32; frames * 2]; voices];
    let mut peaks = vec![0u32; voices];
    {
        let mut slices: Vec<&mut [i32]> = buffers.iter_mut().map(|b| b.as_mut_slice()).collect();
        chip.generate(&mut slices, &mut peaks);
    }
    (buffers, peaks)
}

fn is_silent(samples: &[i32]) -> bool {
    samples.iter().all(|&s| s == 0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Reload(Timer, Option<Duration>),
    Irq(bool),
    Update,
    Hint(Duration),
}

/// Records every callback for inspection
#[derive(Debug, Clone, Default)]
struct Recorder(Arc<Mutex<Vec<Event>>>);

impl Recorder {
    fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }

    fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }
}

impl ChipEvents for Recorder {
    fn timer_reload(&mut self, timer: Timer, period: Option<Duration>) {
        self.push(Event::Reload(timer, period));
    }

    fn irq_changed(&mut self, asserted: bool) {
        self.push(Event::Irq(asserted));
    }

    fn update_request(&mut self) {
        self.push(Event::Update);
    }

    fn update_interval_hint(&mut self, interval: Duration) {
        self.push(Event::Hint(interval));
    }
}

fn recording_chip(config: ChipConfig) -> (Chip, Recorder) {
    let mut chip = Chip::new(config).unwrap();
    let recorder = Recorder::default();
    chip.set_events(Box::new(recorder.clone()));
    recorder.take();
    (chip, recorder)
}
