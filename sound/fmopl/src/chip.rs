//! # Chip
//!
//! Port protocol, status and timers, and the sample loop.
//!
//! Register writes land in [`Chip::write_register`], which dispatches on the
//! register group through a handler table (see `dispatch`). Every derived
//! value (phase increments, rates, routing) is updated at write time, so
//! [`Chip::generate`] only walks the slots.

mod dispatch;

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};

use crate::channel::{Bus, Channel, calc_rhythm};
use crate::envelope::EnvelopeState;
use crate::events::{ChipEvents, NoEvents, Timer};
use crate::lfo::{Lfo, Noise};
use crate::registers::{KeySource, Mode, Rhythm, Status};
use crate::tables::{self, Tables};
use crate::{ChipConfig, ChipType, EG_SH, FREQ_SH, OplError, Result};

const LOG_TAG: &str = "OplChip";

/// One envelope clock per `1 << EG_SH` timer units
const EG_TIMER_OVERFLOW: u32 = 1 << EG_SH;

/// 4-operator pair order of the OPL3 sample loop, bank 0 then bank 1
const OPL3_PAIRS: [[(usize, usize); 3]; 2] = [[(0, 3), (1, 4), (2, 5)], [(9, 12), (10, 13), (11, 14)]];

pub struct Chip {
    tables: Arc<Tables>,
    config: ChipConfig,
    channels: Vec<Channel>,
    /// f-number to phase increment at block 7
    fn_tab: Vec<u32>,
    lfo: Lfo,
    noise: Noise,
    eg_cnt: u32,
    eg_timer: u32,
    eg_timer_add: u32,
    bus: Bus,
    rhythm: Rhythm,
    mode: Mode,
    /// OPL2 waveform select enable, `0x01` bit 5
    wavesel: bool,
    /// OPL3 `0x105` bit 0
    opl3_mode: bool,
    /// Timer counts in chip samples, from `0x02` and `0x03`
    timer_count: [u32; 2],
    timer_running: [bool; 2],
    status: Status,
    status_mask: Status,
    address: u16,
    events: Box<dyn ChipEvents + Send>,
}

impl Chip {
    /// Creates and resets a chip, sharing the lookup tables with other live
    /// chips of the same type
    pub fn new(config: ChipConfig) -> Result<Self> {
        let tables = tables::acquire(config.chip_type)?;
        let mut chip = Self {
            tables,
            config,
            channels: vec![Channel::default(); config.chip_type.voices()],
            fn_tab: vec![0; 1024],
            lfo: Default::default(),
            noise: Default::default(),
            eg_cnt: 0,
            eg_timer: 0,
            eg_timer_add: 0,
            bus: Bus::default(),
            rhythm: Rhythm::empty(),
            mode: Mode::empty(),
            wavesel: false,
            opl3_mode: false,
            timer_count: [0; 2],
            timer_running: [false; 2],
            status: Status::empty(),
            status_mask: Status::empty(),
            address: 0,
            events: Box::new(NoEvents),
        };
        chip.initialize(config.clock_hz, config.rate_hz)?;
        chip.reset();
        info!(
            target: LOG_TAG,
            "{:?} at {} Hz, output {} Hz",
            config.chip_type, config.clock_hz, config.rate_hz
        );
        Ok(chip)
    }

    /// Recomputes every clock-dependent increment for a new master clock or
    /// output rate. Register state is kept.
    pub fn initialize(&mut self, clock_hz: u32, rate_hz: u32) -> Result<()> {
        if clock_hz == 0 || rate_hz == 0 {
            return Err(OplError::InvalidClock {
                clock: clock_hz,
                rate: rate_hz,
            });
        }
        self.config.clock_hz = clock_hz;
        self.config.rate_hz = rate_hz;
        let freqbase = self.frequency_base();

        for (i, step) in self.fn_tab.iter_mut().enumerate() {
            *step = (i as f64 * 64.0 * freqbase * (1 << (FREQ_SH - 10)) as f64) as u32;
        }
        self.lfo.set_frequency_base(freqbase);
        self.noise.set_frequency_base(freqbase);
        self.eg_timer_add = ((1u32 << EG_SH) as f64 * freqbase) as u32;

        debug!(target: LOG_TAG, "Frequency base {freqbase:.6}");
        let hint = self.timer_period(Timer::A, 1);
        self.events.update_interval_hint(hint);
        Ok(())
    }

    /// Chip samples per output sample
    fn frequency_base(&self) -> f64 {
        let divider = self.config.chip_type.clock_divider() as f64;
        self.config.clock_hz as f64 / divider / self.config.rate_hz as f64
    }

    /// Real time taken by `count` ticks of a timer
    fn timer_period(&self, timer: Timer, count: u32) -> Duration {
        let units = match timer {
            Timer::A => 4,
            Timer::B => 16,
        };
        let cycles = units * count as u64 * self.config.chip_type.clock_divider() as u64;
        Duration::from_nanos(cycles * 1_000_000_000 / self.config.clock_hz as u64)
    }

    /// Returns the chip to its power-on state by writing zero to every
    /// register. Free-running counters (phase, envelope clock, LFO, noise)
    /// restart too, so a reset chip plays exactly like a new one.
    pub fn reset(&mut self) {
        debug!(target: LOG_TAG, "Reset {:?}", self.config.chip_type);
        self.eg_timer = 0;
        self.eg_cnt = 0;
        self.lfo.reset();
        self.noise.reset();
        self.bus = Bus::default();
        // register state is rebuilt by the writes below; this only restarts
        // the phase counters and the feedback history
        self.channels.fill(Channel::default());
        self.mode = Mode::empty();

        match self.config.chip_type {
            ChipType::Opl2 => self.status_reset(Status::from_bits_retain(0x7f)),
            ChipType::Opl3 => {
                self.status_reset(Status::TIMER_A | Status::TIMER_B);
                self.write_register(0x105, 0);
                self.write_register(0x104, 0);
            }
        }
        for reg in [0x01, 0x02, 0x03, 0x04] {
            self.write_register(reg, 0);
        }
        for reg in (0x20..=0xff).rev() {
            self.write_register(reg, 0);
        }
        if self.config.chip_type == ChipType::Opl3 {
            for reg in (0x120..=0x1ff).rev() {
                self.write_register(reg, 0);
            }
        }
        for ch in self.channels.iter_mut() {
            ch.slots.iter_mut().for_each(|s| s.silence());
        }
    }

    /// Installs the host's callbacks and reports the update interval
    pub fn set_events(&mut self, events: Box<dyn ChipEvents + Send>) {
        self.events = events;
        let hint = self.timer_period(Timer::A, 1);
        self.events.update_interval_hint(hint);
    }

    /// Writes to a port. Returns the IRQ line state.
    ///
    /// OPL2: even ports latch the address, odd ports write data.
    /// OPL3: port 0 latches a bank 0 address, port 2 a bank 1 address (bank 1
    /// is only reachable in OPL3 mode, except for `0x105`), ports 1 and 3
    /// write data.
    pub fn write(&mut self, port: u16, value: u8) -> bool {
        match self.config.chip_type {
            ChipType::Opl2 => {
                if port & 1 == 0 {
                    self.address = value as u16;
                } else {
                    self.events.update_request();
                    self.write_register(self.address, value);
                }
            }
            ChipType::Opl3 => match port & 3 {
                0 => self.address = value as u16,
                2 => {
                    self.address = if self.opl3_mode || value == 5 {
                        value as u16 | 0x100
                    } else {
                        value as u16
                    };
                }
                _ => {
                    self.events.update_request();
                    self.write_register(self.address, value);
                }
            },
        }
        self.irq()
    }

    /// Reads a port. Only the status port answers; anything else reads 0.
    pub fn read(&self, port: u16) -> u8 {
        match self.config.chip_type {
            ChipType::Opl2 if port & 1 == 0 => (self.status & (self.status_mask | Status::IRQ)).bits(),
            ChipType::Opl3 if port & 3 == 0 => self.status.bits(),
            _ => 0,
        }
    }

    /// Called by the host when a timer period has elapsed. Raises the timer's
    /// status flag, runs CSM key-on for timer A on the OPL2, and asks for the
    /// next period. Returns the IRQ line state.
    pub fn timer_expired(&mut self, timer: Timer) -> bool {
        match timer {
            Timer::B => self.status_set(Status::TIMER_B),
            Timer::A => {
                self.status_set(Status::TIMER_A);
                if self.config.chip_type == ChipType::Opl2 && self.mode.contains(Mode::CSM) {
                    self.events.update_request();
                    for ch in self.channels.iter_mut() {
                        ch.key_on(KeySource::CSM);
                        ch.key_off(KeySource::CSM);
                    }
                }
            }
        }
        let period = self.timer_period(timer, self.timer_count[timer.index()]);
        self.events.timer_reload(timer, Some(period));
        self.irq()
    }

    fn irq(&self) -> bool {
        self.status.contains(Status::IRQ)
    }

    pub(crate) fn status_set(&mut self, flags: Status) {
        self.status |= flags;
        if !self.status.contains(Status::IRQ) && self.status.intersects(self.status_mask) {
            self.status |= Status::IRQ;
            self.events.irq_changed(true);
        }
    }

    pub(crate) fn status_reset(&mut self, flags: Status) {
        self.status.remove(flags);
        if self.status.contains(Status::IRQ) && !self.status.intersects(self.status_mask) {
            self.status.remove(Status::IRQ);
            self.events.irq_changed(false);
        }
    }

    pub(crate) fn status_mask_set(&mut self, mask: Status) {
        self.status_mask = mask;
        // re-evaluate the IRQ line against the new mask
        self.status_set(Status::empty());
        self.status_reset(Status::empty());
    }

    /// Renders one buffer's worth of interleaved stereo frames.
    ///
    /// With a single buffer every voice is mixed into it; otherwise voice `n`
    /// goes to `buffers[n]` and voices without a buffer are dropped. Samples
    /// are added to what the buffers already hold. The number of frames is
    /// half the shortest buffer's length.
    ///
    /// `peaks[n]` receives the largest absolute sample of voice `n` during
    /// this call.
    pub fn generate(&mut self, buffers: &mut [&mut [i32]], peaks: &mut [u32]) {
        let voices = self.channels.len();
        let frames = buffers.iter().map(|b| b.len() / 2).min().unwrap_or(0);
        peaks.iter_mut().take(voices).for_each(|p| *p = 0);
        let mixed = buffers.len() == 1;

        for frame in 0..frames {
            match self.config.chip_type {
                ChipType::Opl2 => self.calc_opl2(),
                ChipType::Opl3 => self.calc_opl3(),
            }

            for voice in 0..voices {
                let out = self.bus.output[voice];
                let (left, right) = match self.config.chip_type {
                    ChipType::Opl2 => (out, out),
                    ChipType::Opl3 => {
                        let pan = &self.channels[voice].pan;
                        (out & pan[0], out & pan[1])
                    }
                };
                if let Some(peak) = peaks.get_mut(voice) {
                    *peak = (*peak).max(left.unsigned_abs()).max(right.unsigned_abs());
                }
                let target = if mixed { 0 } else { voice };
                if let Some(buffer) = buffers.get_mut(target) {
                    buffer[frame * 2] += left;
                    buffer[frame * 2 + 1] += right;
                }
            }

            self.advance();
        }
    }

    fn calc_opl2(&mut self) {
        let tables = &*self.tables;
        self.lfo.advance(tables);
        self.bus.clear_outputs();
        let am = self.lfo.am();

        let melodic = if self.rhythm.contains(Rhythm::ENABLE) { 6 } else { 9 };
        for ch in &mut self.channels[..melodic] {
            ch.calc_opl2(tables, am, &mut self.bus);
        }
        if melodic == 6 {
            calc_rhythm(&mut self.channels, tables, am, self.noise.bit(), &mut self.bus);
        }
    }

    fn calc_opl3(&mut self) {
        let tables = &*self.tables;
        self.lfo.advance(tables);
        self.bus.clear_outputs();
        let am = self.lfo.am();

        for (bank, pairs) in OPL3_PAIRS.iter().enumerate() {
            for &(lo, hi) in pairs {
                self.channels[lo].calc(tables, am, &mut self.bus);
                if self.opl3_mode && self.channels[lo].extended {
                    self.channels[hi].calc_ext(tables, am, &mut self.bus);
                } else {
                    self.channels[hi].calc(tables, am, &mut self.bus);
                }
            }
            let base = bank * 9;
            if bank == 0 && self.rhythm.contains(Rhythm::ENABLE) {
                calc_rhythm(&mut self.channels, tables, am, self.noise.bit(), &mut self.bus);
            } else {
                for ch in &mut self.channels[base + 6..base + 9] {
                    ch.calc(tables, am, &mut self.bus);
                }
            }
        }
    }

    /// Advances envelopes, phases and noise by one output sample
    fn advance(&mut self) {
        let tables = &*self.tables;

        self.eg_timer = self.eg_timer.wrapping_add(self.eg_timer_add);
        while self.eg_timer >= EG_TIMER_OVERFLOW {
            self.eg_timer -= EG_TIMER_OVERFLOW;
            self.eg_cnt = self.eg_cnt.wrapping_add(1);
            for ch in self.channels.iter_mut() {
                for slot in ch.slots.iter_mut() {
                    slot.envelope.advance(tables, self.eg_cnt);
                }
            }
        }

        let pm = self.lfo.pm();
        for ch in self.channels.iter_mut() {
            let block_fnum = ch.freq.block_fnum;
            for slot in ch.slots.iter_mut() {
                slot.advance_phase(tables, block_fnum, pm, &self.fn_tab);
            }
        }

        self.noise.advance();
    }

    pub fn config(&self) -> ChipConfig {
        self.config
    }

    pub fn chip_type(&self) -> ChipType {
        self.config.chip_type
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> Option<&Channel> {
        self.channels.get(index)
    }

    /// Raw status register, unmasked
    pub fn status(&self) -> Status {
        self.status
    }

    /// `0xBD` as last written
    pub fn rhythm(&self) -> Rhythm {
        self.rhythm
    }

    pub fn opl3_mode(&self) -> bool {
        self.opl3_mode
    }

    /// `true` when no slot has an active envelope
    pub fn is_idle(&self) -> bool {
        self.channels
            .iter()
            .flat_map(|ch| ch.slots.iter())
            .all(|s| s.envelope_state() == EnvelopeState::Off)
    }
}
