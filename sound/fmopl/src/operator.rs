//! # Operator (Slot)
//!
//! One sine generator with its own phase counter and envelope. Two slots make
//! a channel; the channel decides whether slot 1 modulates slot 2 or both are
//! heard.
//!
//! A slot never reads its channel directly. Frequency-dependent values are
//! passed in as a [`Frequency`], because the second half of a 4-operator voice
//! takes its pitch from the first channel of the pair.

use crate::channel::{Frequency, Route};
use crate::envelope::{Envelope, EnvelopeState};
use crate::fixed::Phase;
use crate::registers::{AttackDecay, BlockFnum, KeySource, KeyScaleLevel, OpControl, SustainRelease};
use crate::tables::Tables;
use crate::{MAX_ATT_INDEX, SIN_LEN};

/// Right shift applied to the key scale level base for each 2-bit KSL value:
/// off, 3dB, 1.5dB and 6dB per octave
const KSL_SHIFT: [u8; 4] = [31, 1, 2, 0];

#[derive(Debug, Clone, Default)]
pub struct Slot {
    pub(crate) phase: Phase,
    /// Phase increment per sample without vibrato
    pub(crate) incr: u32,
    /// Doubled frequency multiplier
    mul: u32,
    /// Key scale rate shift, 0 when KSR is set, else 2
    ksr_shift: u8,
    /// Cached key-scaled rate offset
    ksr: u8,
    ksl_shift: u8,
    /// Total level, in envelope steps
    tl: u32,
    /// Total level plus key scale level
    pub(crate) tll: u32,
    pub(crate) envelope: Envelope,
    /// All ones when tremolo is enabled
    am_mask: u32,
    vibrato: bool,
    pub(crate) key: KeySource,
    /// Waveform number as written, before OPL2-mode masking
    waveform: u8,
    /// Offset of the active waveform in the sine table
    pub(crate) wavetable: usize,
    /// Where this slot's output goes
    pub(crate) route: Route,
}

impl Slot {
    /// Starts the envelope if no other source holds the key
    pub fn key_on(&mut self, source: KeySource) {
        if self.key.is_empty() {
            self.phase = Phase::ZERO;
            self.envelope.state = EnvelopeState::Attack;
        }
        self.key |= source;
    }

    /// Releases `source`; the envelope enters Release once no source is left
    pub fn key_off(&mut self, source: KeySource) {
        if self.key.is_empty() {
            return;
        }
        self.key.remove(source);
        if self.key.is_empty() && self.envelope.state > EnvelopeState::Release {
            self.envelope.state = EnvelopeState::Release;
        }
    }

    /// `0x20-0x35`
    pub(crate) fn set_control(&mut self, tables: &Tables, reg: OpControl, freq: &Frequency) {
        self.mul = tables.multiplier(reg.multiplier());
        self.ksr_shift = if reg.key_scale_rate() { 0 } else { 2 };
        self.envelope.sustain_hold = reg.sustain();
        self.vibrato = reg.vibrato();
        self.am_mask = if reg.tremolo() { !0 } else { 0 };
        self.update_frequency(tables, freq);
    }

    /// `0x40-0x55`
    pub(crate) fn set_level(&mut self, reg: KeyScaleLevel, freq: &Frequency) {
        self.ksl_shift = KSL_SHIFT[reg.ksl() as usize];
        self.tl = (reg.total_level() as u32) << 2;
        self.update_level(freq);
    }

    /// `0x60-0x75`
    pub(crate) fn set_attack_decay(&mut self, tables: &Tables, reg: AttackDecay) {
        self.envelope.set_attack(tables, reg.attack(), self.ksr);
        self.envelope.set_decay(tables, reg.decay(), self.ksr);
    }

    /// `0x80-0x95`
    pub(crate) fn set_sustain_release(&mut self, tables: &Tables, reg: SustainRelease) {
        self.envelope.set_sustain_level(tables, reg.sustain_level());
        self.envelope.set_release(tables, reg.release(), self.ksr);
    }

    /// `0xE0-0xF5`. `active` is the waveform actually played, which OPL2
    /// mode limits to the first four.
    pub(crate) fn set_waveform(&mut self, written: u8, active: u8) {
        self.waveform = written;
        self.wavetable = active as usize * SIN_LEN;
    }

    /// Recomputes total level after the key scale base changed
    #[inline]
    pub(crate) fn update_level(&mut self, freq: &Frequency) {
        self.tll = self.tl + (freq.ksl_base >> self.ksl_shift);
    }

    /// Recomputes the phase increment and, if the key-scaled rate moved, the
    /// envelope rates
    pub(crate) fn update_frequency(&mut self, tables: &Tables, freq: &Frequency) {
        self.incr = freq.fc.wrapping_mul(self.mul);
        let ksr = freq.kcode >> self.ksr_shift;
        if self.ksr != ksr {
            self.ksr = ksr;
            self.envelope.update_rates(tables, ksr);
        }
    }

    /// Combined attenuation of envelope, total level and tremolo
    #[inline]
    pub(crate) fn attenuation(&self, lfo_am: u32) -> u32 {
        self.tll + self.envelope.volume as u32 + (lfo_am & self.am_mask)
    }

    /// Advances the phase counter by one sample. With vibrato the increment
    /// is recomputed from the channel frequency nudged by the LFO.
    ///
    /// # Arguments
    /// * `block_fnum` - frequency of the slot's own channel
    /// * `lfo_pm` - current vibrato step and depth
    /// * `fn_tab` - f-number to increment table of the chip
    #[inline]
    pub(crate) fn advance_phase(&mut self, tables: &Tables, block_fnum: BlockFnum, lfo_pm: usize, fn_tab: &[u32]) {
        if self.vibrato {
            let offset = tables.lfo_pm(lfo_pm + 16 * block_fnum.vibrato_bucket());
            if offset != 0 {
                let bf = BlockFnum(block_fnum.0.wrapping_add_signed(offset as i32));
                let step = fn_tab[bf.fnum() as usize] >> (7 - bf.block());
                self.phase += step.wrapping_mul(self.mul);
                return;
            }
        }
        self.phase += self.incr;
    }

    /// Puts the slot back into the idle, silent state
    pub(crate) fn silence(&mut self) {
        self.envelope.state = EnvelopeState::Off;
        self.envelope.volume = MAX_ATT_INDEX;
    }

    pub fn envelope_state(&self) -> EnvelopeState {
        self.envelope.state
    }

    /// Envelope attenuation, 0 (loudest) to 511 (silent)
    pub fn volume(&self) -> i32 {
        self.envelope.volume
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn key(&self) -> KeySource {
        self.key
    }

    /// Waveform number last written to `0xE0-0xF5`
    pub fn waveform(&self) -> u8 {
        self.waveform
    }

    pub fn total_level(&self) -> u32 {
        self.tll
    }

    pub fn route(&self) -> Route {
        self.route
    }
}
