//! Register write dispatch.
//!
//! The low byte of a register address selects one of eight groups of 32
//! registers (`reg >> 5`); each group has one handler. OPL3 bank 1 uses the
//! same handlers with a channel offset of 9, apart from the three registers
//! that only exist there.

use log::{debug, trace};

use super::{Chip, LOG_TAG};
use crate::ChipType;
use crate::channel::{FOUR_OP_PAIRS, Frequency, four_op_routes, is_pair_first, is_pair_second, two_op_routes};
use crate::events::Timer;
use crate::registers::{
    AttackDecay, BlockFnum, FeedbackConnection, KeyScaleLevel, KeySource, Mode, OpControl, Rhythm, Status,
    SustainRelease, TimerControl, slot_index,
};

/// Handler for one group of registers. Arguments are the channel offset of
/// the bank (0 or 9), the low byte of the register and the value.
type RegisterHandler = fn(&mut Chip, usize, u8, u8);

static REGISTER_HANDLERS: [RegisterHandler; 8] = [
    Chip::write_control,           // 0x00-0x1f
    Chip::write_op_control,        // 0x20-0x3f
    Chip::write_level,             // 0x40-0x5f
    Chip::write_attack_decay,      // 0x60-0x7f
    Chip::write_sustain_release,   // 0x80-0x9f
    Chip::write_frequency,         // 0xa0-0xbf
    Chip::write_feedback,          // 0xc0-0xdf
    Chip::write_waveform,          // 0xe0-0xff
];

/// Channel and operator addressed by an operator register
fn slot_at(bank: usize, reg: u8) -> Option<(usize, usize)> {
    slot_index(reg).map(|slot| {
        let slot = slot + bank * 2;
        (slot / 2, slot & 1)
    })
}

/// Channel addressed by a channel register, `None` above channel 8 of the bank
fn channel_at(bank: usize, reg: u8) -> Option<usize> {
    let ch = (reg & 0x0f) as usize;
    (ch <= 8).then_some(ch + bank)
}

impl Chip {
    /// Writes a register directly, bypassing the port latch.
    ///
    /// Addresses `0x100-0x1ff` reach bank 1 of the OPL3. The OPL2 only
    /// decodes the low byte. Unused registers are ignored.
    pub fn write_register(&mut self, reg: u16, value: u8) {
        let mut bank = 0;
        if self.config.chip_type == ChipType::Opl3 && reg & 0x100 != 0 {
            match reg {
                // test register
                0x101 => return,
                0x104 => return self.write_four_op(value),
                0x105 => return self.set_opl3_mode(value & 1 != 0),
                _ => bank = 9,
            }
        }
        let reg = reg as u8;
        REGISTER_HANDLERS[(reg >> 5) as usize](self, bank, reg, value);
    }

    /// Frequency data a channel's slots follow. The upper channel of an
    /// active 4-op pair uses the lower channel's.
    fn frequency_source(&self, ch: usize) -> Frequency {
        if self.opl3_mode && is_pair_second(ch) && self.channels[ch - 3].extended {
            self.channels[ch - 3].freq
        } else {
            self.channels[ch].freq
        }
    }

    /// Channels whose slots respond to key and frequency writes on `ch`
    fn frequency_group(&self, ch: usize) -> [Option<usize>; 2] {
        if self.opl3_mode {
            if is_pair_first(ch) && self.channels[ch].extended {
                return [Some(ch), Some(ch + 3)];
            }
            if is_pair_second(ch) && self.channels[ch - 3].extended {
                return [None, None];
            }
        }
        [Some(ch), None]
    }

    fn write_control(&mut self, _bank: usize, reg: u8, value: u8) {
        match reg & 0x1f {
            0x01 => {
                // on the OPL3 this is the test register
                if self.config.chip_type == ChipType::Opl2 {
                    self.wavesel = value & 0x20 != 0;
                }
            }
            0x02 => self.timer_count[Timer::A.index()] = 256 - value as u32,
            0x03 => self.timer_count[Timer::B.index()] = 256 - value as u32,
            0x04 => self.write_timer_control(value),
            0x08 => self.mode = Mode::from_bits_truncate(value),
            other => trace!(target: LOG_TAG, "Write to unused register {other:#04x}: {value:#04x}"),
        }
    }

    fn write_timer_control(&mut self, value: u8) {
        let control = TimerControl::from_bits_retain(value);
        if control.contains(TimerControl::IRQ_RESET) {
            let flags = match self.config.chip_type {
                ChipType::Opl2 => Status::from_bits_retain(0x77),
                ChipType::Opl3 => Status::TIMER_A | Status::TIMER_B,
            };
            self.status_reset(flags);
            return;
        }

        // a set mask bit also clears its flag
        let (flags, mask) = match self.config.chip_type {
            ChipType::Opl2 => (0x70, 0x78),
            ChipType::Opl3 => (0x60, 0x60),
        };
        self.status_reset(Status::from_bits_retain(value & flags));
        self.status_mask_set(Status::from_bits_retain(!value & mask));

        for (timer, start) in [(Timer::B, TimerControl::START_B), (Timer::A, TimerControl::START_A)] {
            let running = control.contains(start);
            if self.timer_running[timer.index()] == running {
                continue;
            }
            self.timer_running[timer.index()] = running;
            let period = running.then(|| self.timer_period(timer, self.timer_count[timer.index()]));
            self.events.timer_reload(timer, period);
        }
    }

    fn write_op_control(&mut self, bank: usize, reg: u8, value: u8) {
        let Some((ch, op)) = slot_at(bank, reg) else {
            return;
        };
        let freq = self.frequency_source(ch);
        self.channels[ch].slots[op].set_control(&self.tables, OpControl(value), &freq);
    }

    fn write_level(&mut self, bank: usize, reg: u8, value: u8) {
        let Some((ch, op)) = slot_at(bank, reg) else {
            return;
        };
        let freq = self.frequency_source(ch);
        self.channels[ch].slots[op].set_level(KeyScaleLevel(value), &freq);
    }

    fn write_attack_decay(&mut self, bank: usize, reg: u8, value: u8) {
        if let Some((ch, op)) = slot_at(bank, reg) {
            self.channels[ch].slots[op].set_attack_decay(&self.tables, AttackDecay(value));
        }
    }

    fn write_sustain_release(&mut self, bank: usize, reg: u8, value: u8) {
        if let Some((ch, op)) = slot_at(bank, reg) {
            self.channels[ch].slots[op].set_sustain_release(&self.tables, SustainRelease(value));
        }
    }

    /// `0xA0-0xA8` f-number low, `0xB0-0xB8` key/block/f-number high, and
    /// `0xBD` in bank 0
    fn write_frequency(&mut self, bank: usize, reg: u8, value: u8) {
        if reg == 0xbd {
            if bank == 0 {
                self.write_rhythm(value);
            }
            return;
        }
        let Some(ch) = channel_at(bank, reg) else {
            return;
        };

        let old = self.channels[ch].freq.block_fnum;
        let block_fnum = if reg & 0x10 == 0 {
            old.with_fnum_low(value)
        } else {
            let key_on = value & 0x20 != 0;
            for target in self.frequency_group(ch).into_iter().flatten() {
                if key_on {
                    self.channels[target].key_on(KeySource::FM);
                } else {
                    self.channels[target].key_off(KeySource::FM);
                }
            }
            old.with_high(value)
        };
        if block_fnum != old {
            self.set_frequency(ch, block_fnum);
        }
    }

    fn set_frequency(&mut self, ch: usize, block_fnum: BlockFnum) {
        let note_select = self.mode.contains(Mode::NOTE_SELECT);
        let freq = Frequency::new(&self.tables, &self.fn_tab, block_fnum, note_select);
        self.channels[ch].freq = freq;

        for target in self.frequency_group(ch).into_iter().flatten() {
            for slot in self.channels[target].slots.iter_mut() {
                slot.update_level(&freq);
                slot.update_frequency(&self.tables, &freq);
            }
        }
    }

    /// `0xBD`: LFO depths, rhythm mode and the five drum keys
    fn write_rhythm(&mut self, value: u8) {
        let rhythm = Rhythm::from_bits_retain(value);
        self.lfo.am_depth = rhythm.contains(Rhythm::AM_DEPTH);
        self.lfo.pm_depth_range = if rhythm.contains(Rhythm::PM_DEPTH) { 8 } else { 0 };
        self.rhythm = rhythm;

        // leaving rhythm mode releases every drum
        let keys = if rhythm.contains(Rhythm::ENABLE) {
            rhythm
        } else {
            Rhythm::empty()
        };
        let drums = [
            (Rhythm::BASS_DRUM, 6, 0),
            (Rhythm::BASS_DRUM, 6, 1),
            (Rhythm::HIHAT, 7, 0),
            (Rhythm::SNARE, 7, 1),
            (Rhythm::TOM, 8, 0),
            (Rhythm::CYMBAL, 8, 1),
        ];
        for (drum, ch, op) in drums {
            let slot = &mut self.channels[ch].slots[op];
            if keys.contains(drum) {
                slot.key_on(KeySource::RHYTHM);
            } else {
                slot.key_off(KeySource::RHYTHM);
            }
        }
    }

    /// `0xC0-0xC8`: output enables, feedback and connection
    fn write_feedback(&mut self, bank: usize, reg: u8, value: u8) {
        let Some(ch) = channel_at(bank, reg) else {
            return;
        };
        let stereo = self.opl3_mode;
        self.channels[ch].set_control(FeedbackConnection(value), stereo);
        self.update_routing(ch);
    }

    /// Rewires a channel, or its whole 4-op pair, after a connection or pair
    /// change
    fn update_routing(&mut self, ch: usize) {
        if self.opl3_mode {
            if is_pair_first(ch) && self.channels[ch].extended {
                return self.set_four_op_routes(ch);
            }
            if is_pair_second(ch) && self.channels[ch - 3].extended {
                return self.set_four_op_routes(ch - 3);
            }
        }
        let connection = self.channels[ch].connection;
        self.channels[ch].set_routes(two_op_routes(ch, connection));
    }

    fn set_four_op_routes(&mut self, first: usize) {
        let second = first + 3;
        let routes = four_op_routes(first, self.channels[first].connection, self.channels[second].connection);
        self.channels[first].set_routes([routes[0], routes[1]]);
        self.channels[second].set_routes([routes[2], routes[3]]);
    }

    /// `0x104`: one bit per channel pair
    fn write_four_op(&mut self, value: u8) {
        for (bit, &first) in FOUR_OP_PAIRS.iter().enumerate() {
            let extended = value & (1 << bit) != 0;
            if self.channels[first].extended == extended {
                continue;
            }
            debug!(
                target: LOG_TAG,
                "Channels {} and {} {}",
                first,
                first + 3,
                if extended { "paired" } else { "split" }
            );
            self.channels[first].extended = extended;
            self.update_routing(first);
            self.update_routing(first + 3);
        }
    }

    /// `0x105`: switching modes keeps waveforms and output enables as they are
    /// until they are written again. Pair routing follows the mode at once.
    fn set_opl3_mode(&mut self, enabled: bool) {
        if self.opl3_mode == enabled {
            return;
        }
        debug!(target: LOG_TAG, "OPL3 mode {}", if enabled { "on" } else { "off" });
        self.opl3_mode = enabled;
        for &first in FOUR_OP_PAIRS.iter() {
            self.update_routing(first);
            self.update_routing(first + 3);
        }
    }

    /// `0xE0-0xF5`
    fn write_waveform(&mut self, bank: usize, reg: u8, value: u8) {
        let Some((ch, op)) = slot_at(bank, reg) else {
            return;
        };
        let slot = &mut self.channels[ch].slots[op];
        match self.config.chip_type {
            ChipType::Opl2 => {
                if self.wavesel {
                    slot.set_waveform(value & 3, value & 3);
                }
            }
            ChipType::Opl3 => {
                let wave = value & 7;
                let active = if self.opl3_mode { wave } else { wave & 3 };
                slot.set_waveform(wave, active);
            }
        }
    }
}
