//! Unsigned fixed-point counters with two's-complement wraparound.
//!
//! The chip's phase, envelope timer and LFO counters are plain 32-bit
//! registers that roll over. The waveform index and LFO step are taken from
//! the integer part, so the wrap is part of the sound and must stay exact.

use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// A 32-bit counter with `FRAC` fractional bits
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fixed<const FRAC: u32>(u32);

/// 16.16 phase accumulator
pub type Phase = Fixed<16>;
/// 8.24 LFO counter
pub type LfoCounter = Fixed<24>;

impl<const FRAC: u32> Fixed<FRAC> {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(1 << FRAC);
    const FRAC_MASK: u32 = (1 << FRAC) - 1;

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn from_int(value: u32) -> Self {
        Self(value << FRAC)
    }

    /// Converts a real-valued step, truncating toward zero the way the
    /// increments are derived from the clock ratio
    pub fn from_f64(value: f64) -> Self {
        Self((value * (1u64 << FRAC) as f64) as u32)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Integer part
    pub const fn int(self) -> u32 {
        self.0 >> FRAC
    }

    /// Fractional part, still scaled by `1 << FRAC`
    pub const fn frac(self) -> u32 {
        self.0 & Self::FRAC_MASK
    }

    pub const fn wrapping_add(self, rhs: Self) -> Self {
        Self(self.0.wrapping_add(rhs.0))
    }

    pub const fn wrapping_sub(self, rhs: Self) -> Self {
        Self(self.0.wrapping_sub(rhs.0))
    }

    /// Removes and returns the integer part, keeping the fraction
    pub fn take_int(&mut self) -> u32 {
        let whole = self.int();
        self.0 &= Self::FRAC_MASK;
        whole
    }
}

impl<const FRAC: u32> Add for Fixed<FRAC> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.wrapping_add(rhs)
    }
}

impl<const FRAC: u32> AddAssign for Fixed<FRAC> {
    fn add_assign(&mut self, rhs: Self) {
        *self = self.wrapping_add(rhs);
    }
}

/// Raw increments are added directly, as the chip does
impl<const FRAC: u32> AddAssign<u32> for Fixed<FRAC> {
    fn add_assign(&mut self, rhs: u32) {
        self.0 = self.0.wrapping_add(rhs);
    }
}

impl<const FRAC: u32> Sub for Fixed<FRAC> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.wrapping_sub(rhs)
    }
}

impl<const FRAC: u32> SubAssign for Fixed<FRAC> {
    fn sub_assign(&mut self, rhs: Self) {
        *self = self.wrapping_sub(rhs);
    }
}

impl<const FRAC: u32> fmt::Debug for Fixed<FRAC> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{:#x}/{:#x}", self.int(), self.frac(), 1u64 << FRAC)
    }
}
