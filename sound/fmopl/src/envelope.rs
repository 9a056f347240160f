//! Envelope generator.
//!
//! Each operator's attenuation runs through Attack, Decay, Sustain and
//! Release. The counter is 0 at full volume and [`MAX_ATT_INDEX`] when
//! silent. Rates are looked up once per key-scale change and cached as a
//! shift (how many global envelope ticks to skip) and an increment row.

use crate::tables::{EG_SELECT_INSTANT, Tables};
use crate::{MAX_ATT_INDEX, MIN_ATT_INDEX};

/// Envelope phase. Ordered so that `state > Release` means "still sounding
/// from a key-on".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum EnvelopeState {
    #[default]
    Off,
    Release,
    Sustain,
    Decay,
    Attack,
}

/// Cached shift and increment row for one rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Rate {
    shift: u8,
    select: u8,
}

impl Rate {
    fn lookup(tables: &Tables, index: u32) -> Self {
        let (shift, select) = tables.rate(index);
        Self { shift, select }
    }

    /// `Some(increment)` on ticks where this rate steps
    #[inline]
    fn step(self, tables: &Tables, eg_cnt: u32) -> Option<i32> {
        let mask = (1u32 << self.shift) - 1;
        if eg_cnt & mask != 0 {
            return None;
        }
        Some(tables.eg_inc(self.select, eg_cnt >> self.shift))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Envelope {
    pub(crate) state: EnvelopeState,
    /// Current attenuation, 0..=511
    pub(crate) volume: i32,
    /// Sustain level threshold
    pub(crate) sl: u32,
    /// Attack rate as a rate table index, `16 + (AR << 2)` or 0
    pub(crate) ar: u32,
    pub(crate) dr: u32,
    pub(crate) rr: u32,
    /// Envelope type bit: hold at the sustain level while keyed
    pub(crate) sustain_hold: bool,
    attack: Rate,
    decay: Rate,
    release: Rate,
}

/// Rate table index for a 4-bit register rate
fn rate_index(rate: u8) -> u32 {
    if rate == 0 { 0 } else { 16 + ((rate as u32) << 2) }
}

impl Envelope {
    /// Envelope of a freshly reset operator: silent and idle
    #[cfg(test)]
    pub(crate) fn silent() -> Self {
        Self {
            volume: MAX_ATT_INDEX,
            ..Self::default()
        }
    }

    pub fn state(&self) -> EnvelopeState {
        self.state
    }

    pub fn volume(&self) -> i32 {
        self.volume
    }

    pub(crate) fn set_attack(&mut self, tables: &Tables, rate: u8, ksr: u8) {
        self.ar = rate_index(rate);
        self.update_attack(tables, ksr);
    }

    pub(crate) fn set_decay(&mut self, tables: &Tables, rate: u8, ksr: u8) {
        self.dr = rate_index(rate);
        self.decay = Rate::lookup(tables, self.dr + ksr as u32);
    }

    pub(crate) fn set_release(&mut self, tables: &Tables, rate: u8, ksr: u8) {
        self.rr = rate_index(rate);
        self.release = Rate::lookup(tables, self.rr + ksr as u32);
    }

    pub(crate) fn set_sustain_level(&mut self, tables: &Tables, level: u8) {
        self.sl = tables.sustain_level(level);
    }

    /// Recomputes all three cached rates for a new key scale value
    pub(crate) fn update_rates(&mut self, tables: &Tables, ksr: u8) {
        self.update_attack(tables, ksr);
        self.decay = Rate::lookup(tables, self.dr + ksr as u32);
        self.release = Rate::lookup(tables, self.rr + ksr as u32);
    }

    fn update_attack(&mut self, tables: &Tables, ksr: u8) {
        let index = self.ar + ksr as u32;
        self.attack = if index < tables.chip_type().attack_limit() {
            Rate::lookup(tables, index)
        } else {
            Rate {
                shift: 0,
                select: EG_SELECT_INSTANT,
            }
        };
    }

    /// Runs one envelope clock tick. `eg_cnt` is the chip's global envelope
    /// counter, already incremented for this tick.
    #[inline]
    pub(crate) fn advance(&mut self, tables: &Tables, eg_cnt: u32) {
        match self.state {
            EnvelopeState::Attack => {
                if let Some(inc) = self.attack.step(tables, eg_cnt) {
                    self.volume += (!self.volume * inc) >> 3;
                    if self.volume <= MIN_ATT_INDEX {
                        self.volume = MIN_ATT_INDEX;
                        self.state = EnvelopeState::Decay;
                    }
                }
            }
            EnvelopeState::Decay => {
                if let Some(inc) = self.decay.step(tables, eg_cnt) {
                    self.volume += inc;
                    if self.volume >= self.sl as i32 {
                        self.state = EnvelopeState::Sustain;
                    }
                }
            }
            EnvelopeState::Sustain => {
                // percussive envelopes keep falling at the release rate
                if self.sustain_hold {
                    return;
                }
                if let Some(inc) = self.release.step(tables, eg_cnt) {
                    self.volume = (self.volume + inc).min(MAX_ATT_INDEX);
                }
            }
            EnvelopeState::Release => {
                if let Some(inc) = self.release.step(tables, eg_cnt) {
                    self.volume += inc;
                    if self.volume >= MAX_ATT_INDEX {
                        self.volume = MAX_ATT_INDEX;
                        self.state = EnvelopeState::Off;
                    }
                }
            }
            EnvelopeState::Off => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChipType;

    fn tables(chip_type: ChipType) -> Tables {
        Tables::build(chip_type).unwrap()
    }

    fn run(env: &mut Envelope, tables: &Tables, ticks: u32) -> Vec<i32> {
        (1..=ticks)
            .map(|cnt| {
                env.advance(tables, cnt);
                env.volume
            })
            .collect()
    }

    #[test]
    fn test_state_order() {
        assert!(EnvelopeState::Attack > EnvelopeState::Decay);
        assert!(EnvelopeState::Decay > EnvelopeState::Sustain);
        assert!(EnvelopeState::Sustain > EnvelopeState::Release);
        assert!(EnvelopeState::Release > EnvelopeState::Off);
    }

    #[test]
    fn test_instant_attack_at_limit() {
        for (chip_type, rate, ksr) in [(ChipType::Opl2, 15, 2), (ChipType::Opl3, 15, 0)] {
            let tables = tables(chip_type);
            let mut env = Envelope::silent();
            env.set_attack(&tables, rate, ksr);
            env.state = EnvelopeState::Attack;
            env.advance(&tables, 1);
            assert_eq!(env.volume, 0, "{chip_type:?}");
            assert_eq!(env.state, EnvelopeState::Decay);
        }
    }

    #[test]
    fn test_opl2_rate_15_below_limit_is_not_instant() {
        // 16 + 60 + 1 is instant on the OPL3 but not on the OPL2
        let tables = tables(ChipType::Opl2);
        let mut env = Envelope::silent();
        env.set_attack(&tables, 15, 1);
        env.state = EnvelopeState::Attack;
        env.advance(&tables, 1);
        assert!(env.volume > 0);
        assert_eq!(env.state, EnvelopeState::Attack);
    }

    #[test]
    fn test_attack_zero_never_moves() {
        let tables = tables(ChipType::Opl2);
        let mut env = Envelope::silent();
        env.set_attack(&tables, 0, 0);
        env.state = EnvelopeState::Attack;
        let volumes = run(&mut env, &tables, 10_000);
        assert!(volumes.iter().all(|&v| v == MAX_ATT_INDEX));
    }

    #[test]
    fn test_attack_is_non_increasing() {
        let tables = tables(ChipType::Opl3);
        let mut env = Envelope::silent();
        env.set_attack(&tables, 10, 0);
        env.state = EnvelopeState::Attack;
        let mut last = env.volume;
        for cnt in 1..20_000 {
            env.advance(&tables, cnt);
            if env.state != EnvelopeState::Attack {
                break;
            }
            assert!(env.volume <= last);
            last = env.volume;
        }
        assert_eq!(env.volume, 0);
        assert_eq!(env.state, EnvelopeState::Decay);
    }

    #[test]
    fn test_decay_stops_at_sustain_level() {
        let tables = tables(ChipType::Opl2);
        let mut env = Envelope::default();
        env.set_decay(&tables, 12, 0);
        env.set_sustain_level(&tables, 4);
        env.sustain_hold = true;
        env.state = EnvelopeState::Decay;

        let volumes = run(&mut env, &tables, 1000);
        assert!(volumes.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(env.state, EnvelopeState::Sustain);
        assert!(env.volume >= 64);
        let held = env.volume;
        run(&mut env, &tables, 1000);
        assert_eq!(env.volume, held);
    }

    #[test]
    fn test_percussive_sustain_keeps_falling() {
        let tables = tables(ChipType::Opl2);
        let mut env = Envelope::default();
        env.set_release(&tables, 12, 0);
        env.volume = 64;
        env.state = EnvelopeState::Sustain;
        run(&mut env, &tables, 2000);
        assert_eq!(env.volume, MAX_ATT_INDEX);
        // sustain never turns into Off by itself
        assert_eq!(env.state, EnvelopeState::Sustain);
    }

    #[test]
    fn test_release_reaches_off() {
        let tables = tables(ChipType::Opl3);
        let mut env = Envelope::default();
        env.set_release(&tables, 13, 0);
        env.state = EnvelopeState::Release;
        let volumes = run(&mut env, &tables, 1000);
        assert!(volumes.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(env.state, EnvelopeState::Off);
        assert_eq!(env.volume, MAX_ATT_INDEX);
    }

    #[test]
    fn test_slow_rate_skips_ticks() {
        let tables = tables(ChipType::Opl2);
        let mut env = Envelope::default();
        // rate 1: shift 11, only every 2048th tick steps
        env.set_release(&tables, 1, 0);
        env.state = EnvelopeState::Release;
        run(&mut env, &tables, 2047);
        assert_eq!(env.volume, 0);
        env.advance(&tables, 2048);
        env.advance(&tables, 4096);
        assert!(env.volume > 0);
    }
}
