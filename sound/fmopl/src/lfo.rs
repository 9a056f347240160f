//! Tremolo and vibrato oscillators, and the rhythm noise generator.

use crate::fixed::{LfoCounter, Phase};
use crate::tables::{LFO_AM_LEN, Tables};

/// The chip-wide LFO pair
#[derive(Debug, Clone, Default)]
pub struct Lfo {
    am_cnt: LfoCounter,
    am_inc: u32,
    pm_cnt: LfoCounter,
    pm_inc: u32,
    /// Deep tremolo (4.8dB) selected in `0xBD`
    pub(crate) am_depth: bool,
    /// 8 when deep vibrato is selected, else 0
    pub(crate) pm_depth_range: usize,
    am: u32,
    pm: usize,
}

impl Lfo {
    /// Sets the counter increments for a clock/rate ratio
    pub(crate) fn set_frequency_base(&mut self, freqbase: f64) {
        // one tremolo step every 64 samples, one vibrato step every 1024
        self.am_inc = LfoCounter::from_f64(freqbase / 64.0).raw();
        self.pm_inc = LfoCounter::from_f64(freqbase / 1024.0).raw();
    }

    /// Clears the oscillators, keeping the increments
    pub(crate) fn reset(&mut self) {
        *self = Self {
            am_inc: self.am_inc,
            pm_inc: self.pm_inc,
            ..Self::default()
        };
    }

    #[inline]
    pub(crate) fn advance(&mut self, tables: &Tables) {
        const AM_WRAP: LfoCounter = LfoCounter::from_int(LFO_AM_LEN as u32);

        self.am_cnt += self.am_inc;
        if self.am_cnt >= AM_WRAP {
            self.am_cnt -= AM_WRAP;
        }
        let level = tables.lfo_am(self.am_cnt.int() as usize) as u32;
        self.am = if self.am_depth { level } else { level >> 2 };

        self.pm_cnt += self.pm_inc;
        self.pm = (self.pm_cnt.int() as usize & 7) | self.pm_depth_range;
    }

    /// Current tremolo attenuation
    pub fn am(&self) -> u32 {
        self.am
    }

    /// Current vibrato step and depth, the low index into the vibrato table
    pub fn pm(&self) -> usize {
        self.pm
    }
}

/// 23-bit LFSR clocked at the chip's native rate
#[derive(Debug, Clone)]
pub struct Noise {
    rng: u32,
    counter: Phase,
    step: u32,
}

impl Default for Noise {
    fn default() -> Self {
        Self {
            rng: 1,
            counter: Phase::ZERO,
            step: 0,
        }
    }
}

impl Noise {
    pub(crate) fn set_frequency_base(&mut self, freqbase: f64) {
        self.step = Phase::from_f64(freqbase).raw();
    }

    pub(crate) fn reset(&mut self) {
        self.rng = 1;
        self.counter = Phase::ZERO;
    }

    /// Clocks the register once per elapsed chip sample
    #[inline]
    pub(crate) fn advance(&mut self) {
        self.counter += self.step;
        for _ in 0..self.counter.take_int() {
            if self.rng & 1 != 0 {
                self.rng ^= 0x80_0302;
            }
            self.rng >>= 1;
        }
    }

    /// Output bit used by the high-hat, snare and cymbal
    #[inline]
    pub fn bit(&self) -> bool {
        self.rng & 1 != 0
    }

    pub fn state(&self) -> u32 {
        self.rng
    }
}
