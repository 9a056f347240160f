//! # Lookup Tables
//!
//! Every table the chip reads from is immutable once built, so one set is
//! shared by all live chips of the same type. [`acquire`] hands out an
//! [`Arc`] and rebuilds the set only when no chip holds it any more; dropping
//! the last chip releases the memory.
//!
//! The sine tables are stored in the logarithmic domain (attenuation plus a
//! sign bit) and [`Tables::op_calc`] turns them back into linear samples
//! through the exponential table, which is how the chip avoids multipliers.

use std::f64::consts::PI;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use log::debug;

use crate::fixed::Phase;
use crate::{ChipType, Result, ENV_BITS, FREQ_MASK, FREQ_SH, RATE_STEPS, SIN_LEN, SIN_MASK};

const LOG_TAG: &str = "OplTables";

/// Size of one attenuation step in dB
const ENV_STEP: f64 = 128.0 / (1 << ENV_BITS) as f64;
/// Entries per octave of the exponential table
const TL_RES_LEN: usize = 256;

/// Number of entries in the tremolo triangle
pub const LFO_AM_LEN: usize = 210;

/// Key scale level attenuation per note, before the octave offset
const KSL_CREATE: [u32; 16] = [64, 32, 24, 19, 16, 12, 11, 10, 8, 6, 5, 4, 3, 2, 1, 0];

/// Frequency multipliers, doubled so that "0.5" stays an integer
const MUL_TAB: [u32; 16] = [1, 2, 4, 6, 8, 10, 12, 14, 16, 18, 20, 20, 24, 24, 30, 30];

/// Envelope increments, one row of eight steps per rate fraction
#[rustfmt::skip]
static EG_INC: [u8; 15 * RATE_STEPS] = [
    // rates 0..12, fraction 0..3
    0, 1, 0, 1, 0, 1, 0, 1,
    0, 1, 0, 1, 1, 1, 0, 1,
    0, 1, 1, 1, 0, 1, 1, 1,
    0, 1, 1, 1, 1, 1, 1, 1,
    // rate 13
    1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 2, 1, 1, 1, 2,
    1, 2, 1, 2, 1, 2, 1, 2,
    1, 2, 2, 2, 1, 2, 2, 2,
    // rate 14
    2, 2, 2, 2, 2, 2, 2, 2,
    2, 2, 2, 4, 2, 2, 2, 4,
    2, 4, 2, 4, 2, 4, 2, 4,
    2, 4, 4, 4, 2, 4, 4, 4,
    // rate 15
    4, 4, 4, 4, 4, 4, 4, 4,
    // instant attack
    8, 8, 8, 8, 8, 8, 8, 8,
    // infinite (rate 0)
    0, 0, 0, 0, 0, 0, 0, 0,
];

/// Row of `EG_INC` used for instant attacks
pub(crate) const EG_SELECT_INSTANT: u8 = (13 * RATE_STEPS) as u8;
/// Row of `EG_INC` that never moves the envelope
const EG_SELECT_FROZEN: u8 = (14 * RATE_STEPS) as u8;

/// Entries in the rate tables: 16 dummies, 64 rates, 16 overflow entries for
/// high key scaling
const EG_RATE_LEN: usize = 16 + 64 + 16;

static OPL2_TABLES: Mutex<Weak<Tables>> = Mutex::new(Weak::new());
static OPL3_TABLES: Mutex<Weak<Tables>> = Mutex::new(Weak::new());

/// Returns the shared tables for `chip_type`, building them if no chip
/// currently holds a reference.
///
/// Concurrent first calls are serialised so the tables are built only once.
/// A failed build leaves nothing registered and the next call tries again.
pub fn acquire(chip_type: ChipType) -> Result<Arc<Tables>> {
    let shared = match chip_type {
        ChipType::Opl2 => &OPL2_TABLES,
        ChipType::Opl3 => &OPL3_TABLES,
    };
    let mut shared = shared.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(tables) = shared.upgrade() {
        return Ok(tables);
    }

    let tables = Arc::new(Tables::build(chip_type)?);
    *shared = Arc::downgrade(&tables);
    debug!(
        target: LOG_TAG,
        "Built {:?} tables: {} attenuation entries, {} waveforms",
        chip_type,
        tables.tl.len(),
        chip_type.waveforms()
    );
    Ok(tables)
}

/// All lookup tables for one chip type
pub struct Tables {
    chip_type: ChipType,
    /// Attenuation (x16) to signed linear output, even = positive
    tl: Vec<i32>,
    /// Logarithmic waveforms, `SIN_LEN` entries per waveform
    sin: Vec<u32>,
    /// Key scale level base per block/f-number bucket
    ksl: [u32; 8 * 16],
    /// Sustain level thresholds
    sl: [u32; 16],
    lfo_am: [u8; LFO_AM_LEN],
    /// Vibrato offsets indexed by `fnum_hi * 16 + depth * 8 + step`
    lfo_pm: [i8; 8 * 16],
    eg_rate_shift: [u8; EG_RATE_LEN],
    eg_rate_select: [u8; EG_RATE_LEN],
}

impl Tables {
    /// Builds a fresh, unshared table set
    pub fn build(chip_type: ChipType) -> Result<Self> {
        let tl = build_tl(chip_type)?;
        let sin = build_sin(chip_type, tl.len() as u32)?;
        let (eg_rate_shift, eg_rate_select) = build_rates();
        Ok(Self {
            chip_type,
            tl,
            sin,
            ksl: build_ksl(),
            sl: build_sl(),
            lfo_am: build_lfo_am(),
            lfo_pm: build_lfo_pm(),
            eg_rate_shift,
            eg_rate_select,
        })
    }

    pub fn chip_type(&self) -> ChipType {
        self.chip_type
    }

    /// Length of the exponential table; any larger index is silence
    pub fn tl_len(&self) -> u32 {
        self.tl.len() as u32
    }

    /// Envelope attenuation at and above which an operator is silent
    pub fn env_quiet(&self) -> u32 {
        self.tl_len() >> 4
    }

    /// Computes one operator sample.
    ///
    /// # Arguments
    /// * `phase` - the operator's phase counter
    /// * `env` - combined envelope, total level and tremolo attenuation
    /// * `pm` - phase modulation from another operator, in waveform steps
    /// * `wave` - offset of the selected waveform
    #[inline]
    pub fn op_calc(&self, phase: Phase, env: u32, pm: i32, wave: usize) -> i32 {
        let modulated = (phase.raw() & !FREQ_MASK).wrapping_add((pm as u32) << FREQ_SH);
        self.lookup(env, wave + ((modulated >> FREQ_SH) as usize & SIN_MASK))
    }

    /// Like [`Tables::op_calc`] but `pm` is already in phase counter units,
    /// as produced by the feedback path
    #[inline]
    pub fn op_calc1(&self, phase: Phase, env: u32, pm: i32, wave: usize) -> i32 {
        let modulated = (phase.raw() & !FREQ_MASK).wrapping_add(pm as u32);
        self.lookup(env, wave + ((modulated >> FREQ_SH) as usize & SIN_MASK))
    }

    #[inline]
    fn lookup(&self, env: u32, sin_index: usize) -> i32 {
        let p = (env << 4) + self.sin[sin_index];
        self.tl.get(p as usize).copied().unwrap_or(0)
    }

    /// Waveform table entry, mostly useful for inspection
    pub fn sin(&self, index: usize) -> Option<u32> {
        self.sin.get(index).copied()
    }

    /// Signed linear value of an attenuation index
    pub fn tl(&self, index: usize) -> Option<i32> {
        self.tl.get(index).copied()
    }

    /// Key scale level base for `block_fnum >> 6`
    pub(crate) fn ksl(&self, bucket: usize) -> u32 {
        self.ksl[bucket & 0x7f]
    }

    pub(crate) fn sustain_level(&self, sl: u8) -> u32 {
        self.sl[(sl & 0x0f) as usize]
    }

    pub(crate) fn multiplier(&self, mul: u8) -> u32 {
        MUL_TAB[(mul & 0x0f) as usize]
    }

    /// Shift and increment row for a key-scaled rate
    pub(crate) fn rate(&self, index: u32) -> (u8, u8) {
        let index = (index as usize).min(EG_RATE_LEN - 1);
        (self.eg_rate_shift[index], self.eg_rate_select[index])
    }

    pub(crate) fn eg_inc(&self, select: u8, step: u32) -> i32 {
        EG_INC[select as usize + (step as usize & 7)] as i32
    }

    pub(crate) fn lfo_am(&self, index: usize) -> u8 {
        self.lfo_am[index]
    }

    pub(crate) fn lfo_pm(&self, index: usize) -> i8 {
        self.lfo_pm[index & 0x7f]
    }
}

fn build_tl(chip_type: ChipType) -> Result<Vec<i32>> {
    let shifts = chip_type.tl_shifts();
    let len = shifts * 2 * TL_RES_LEN;
    let mut tl = Vec::new();
    tl.try_reserve_exact(len)?;
    tl.resize(len, 0);

    for x in 0..TL_RES_LEN {
        let m = ((1 << 16) as f64 / 2f64.powf((x + 1) as f64 * (ENV_STEP / 4.0) / 8.0)).floor();
        // 16 bits down to 12, round to 11, back to 12 as in the chip
        let mut n = (m as i32) >> 4;
        n = if n & 1 != 0 { (n >> 1) + 1 } else { n >> 1 };
        n <<= 1;

        for i in 0..shifts {
            let base = x * 2 + i * 2 * TL_RES_LEN;
            tl[base] = n >> i;
            tl[base + 1] = -(n >> i);
        }
    }
    Ok(tl)
}

fn build_sin(chip_type: ChipType, tl_len: u32) -> Result<Vec<u32>> {
    let len = chip_type.waveforms() * SIN_LEN;
    let mut sin = Vec::new();
    sin.try_reserve_exact(len)?;
    sin.resize(len, 0);

    for i in 0..SIN_LEN {
        // Offset by half a step so zero is never reached
        let m = (((i * 2) + 1) as f64 * PI / SIN_LEN as f64).sin();
        let o = 8.0 * (1.0 / m.abs()).ln() / 2f64.ln() / (ENV_STEP / 4.0);
        let mut n = (2.0 * o) as i32;
        n = if n & 1 != 0 { (n >> 1) + 1 } else { n >> 1 };
        sin[i] = (n * 2) as u32 + u32::from(m < 0.0);
    }

    let half = SIN_LEN / 2;
    for i in 0..SIN_LEN {
        let upper_half = i & half != 0;
        // half-sine
        sin[SIN_LEN + i] = if upper_half { tl_len } else { sin[i] };
        // abs-sine
        sin[2 * SIN_LEN + i] = sin[i & (SIN_MASK >> 1)];
        // quarter-sine pulses
        sin[3 * SIN_LEN + i] = if i & (SIN_LEN / 4) != 0 {
            tl_len
        } else {
            sin[i & (SIN_MASK >> 2)]
        };

        if chip_type == ChipType::Opl2 {
            continue;
        }
        // alternating sine, double speed
        sin[4 * SIN_LEN + i] = if upper_half { tl_len } else { sin[i * 2] };
        // camel sine
        sin[5 * SIN_LEN + i] = if upper_half {
            tl_len
        } else {
            sin[(i * 2) & (SIN_MASK >> 1)]
        };
        // square
        sin[6 * SIN_LEN + i] = u32::from(upper_half);
        // logarithmic sawtooth
        let x = if upper_half {
            ((SIN_LEN - 1 - i) * 16 + 1) as u32
        } else {
            (i * 16) as u32
        };
        sin[7 * SIN_LEN + i] = x.min(tl_len);
    }
    Ok(sin)
}

fn build_ksl() -> [u32; 8 * 16] {
    let mut ksl = [0; 8 * 16];
    for octave in 0..8 {
        for (note, create) in KSL_CREATE.iter().enumerate() {
            ksl[octave * 16 + note] = (octave as u32 * 8).saturating_sub(*create) * 4;
        }
    }
    ksl
}

fn build_sl() -> [u32; 16] {
    let mut sl = [0; 16];
    for (i, level) in sl.iter_mut().enumerate() {
        *level = i as u32 * 16;
    }
    // SL=15 means -93dB, not -45dB
    sl[15] = 31 * 16;
    sl
}

fn build_rates() -> ([u8; EG_RATE_LEN], [u8; EG_RATE_LEN]) {
    let mut shift = [0u8; EG_RATE_LEN];
    let mut select = [EG_SELECT_FROZEN; EG_RATE_LEN];

    for rate in 0..16u8 {
        for fraction in 0..4u8 {
            let index = 16 + rate as usize * 4 + fraction as usize;
            let (row, sh) = match rate {
                0..=12 => (fraction, 12 - rate),
                13 => (4 + fraction, 0),
                14 => (8 + fraction, 0),
                _ => (12, 0),
            };
            shift[index] = sh;
            select[index] = row * RATE_STEPS as u8;
        }
    }
    // key scaling can push rate 15 past the end
    for entry in select.iter_mut().skip(16 + 64) {
        *entry = 12 * RATE_STEPS as u8;
    }
    (shift, select)
}

/// Tremolo triangle: 7 zero steps, up to 26 and back, each entry held for
/// 64 samples
fn build_lfo_am() -> [u8; LFO_AM_LEN] {
    let mut am = [0u8; LFO_AM_LEN];
    let mut i = 7;
    for level in (1..=25).chain([26; 1]) {
        let hold = if level == 26 { 3 } else { 4 };
        for _ in 0..hold {
            am[i] = level;
            i += 1;
        }
    }
    for level in (1..=25).rev() {
        for _ in 0..4 {
            am[i] = level;
            i += 1;
        }
    }
    am
}

/// Vibrato offsets added to the block/f-number for each of the 8 LFO steps.
/// The shallow depth uses half the f-number's top bits.
fn build_lfo_pm() -> [i8; 8 * 16] {
    let mut pm = [0i8; 8 * 16];
    for fnum_hi in 0..8i8 {
        for depth in 0..2 {
            let n = if depth == 0 { fnum_hi >> 1 } else { fnum_hi };
            let pattern = [n, n >> 1, 0, -(n >> 1), -n, -(n >> 1), 0, n >> 1];
            let base = fnum_hi as usize * 16 + depth * 8;
            pm[base..base + 8].copy_from_slice(&pattern);
        }
    }
    pm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tl_table() {
        let tables = Tables::build(ChipType::Opl2).unwrap();
        assert_eq!(tables.tl_len(), 12 * 2 * 256);
        assert_eq!(tables.tl(0), Some(4084));
        assert_eq!(tables.tl(1), Some(-4084));
        assert_eq!(tables.tl(512), Some(2042));
        assert_eq!(tables.tl(513), Some(-2042));
        assert_eq!(tables.env_quiet(), 384);

        let tables = Tables::build(ChipType::Opl3).unwrap();
        assert_eq!(tables.tl_len(), 13 * 2 * 256);
        assert_eq!(tables.env_quiet(), 416);
    }

    #[test]
    fn test_tl_table_decreasing() {
        let tables = Tables::build(ChipType::Opl3).unwrap();
        for x in 1..TL_RES_LEN {
            let prev = tables.tl(x * 2 - 2).unwrap();
            let cur = tables.tl(x * 2).unwrap();
            assert!(cur <= prev, "entry {x}: {cur} > {prev}");
        }
    }

    #[test]
    fn test_sine_table() {
        let tables = Tables::build(ChipType::Opl2).unwrap();
        // Peak of the positive half is 0dB
        assert_eq!(tables.sin(256), Some(0));
        // Peak of the negative half carries the sign bit
        assert_eq!(tables.sin(768), Some(1));
        assert_eq!(tables.sin(0).unwrap() & 1, 0);
        assert_eq!(tables.sin(512).unwrap() & 1, 1);
        // Only four waveforms on the OPL2
        assert_eq!(tables.sin(4 * SIN_LEN), None);
    }

    #[test]
    fn test_derived_waveforms() {
        let tables = Tables::build(ChipType::Opl3).unwrap();
        let silent = tables.tl_len();
        // half-sine mutes the negative half
        assert_eq!(tables.sin(SIN_LEN + 700), Some(silent));
        assert_eq!(tables.sin(SIN_LEN + 100), tables.sin(100));
        // abs-sine repeats the positive half
        assert_eq!(tables.sin(2 * SIN_LEN + 600), tables.sin(600 & 511));
        // quarter-sine
        assert_eq!(tables.sin(3 * SIN_LEN + 300), Some(silent));
        // square is 0dB with a sign
        assert_eq!(tables.sin(6 * SIN_LEN + 10), Some(0));
        assert_eq!(tables.sin(6 * SIN_LEN + 900), Some(1));
        // sawtooth is clipped to silence
        assert_eq!(tables.sin(7 * SIN_LEN + 100), Some(1600));
        assert_eq!(tables.sin(7 * SIN_LEN + 511), Some(silent));
        assert_eq!(tables.sin(7 * SIN_LEN + 1023), Some(1));
    }

    #[test]
    fn test_ksl_table() {
        let tables = Tables::build(ChipType::Opl2).unwrap();
        for note in 0..16 {
            assert_eq!(tables.ksl(note), 0);
        }
        assert_eq!(tables.ksl(7 * 16), 0);
        assert_eq!(tables.ksl(7 * 16 + 1), 96);
        assert_eq!(tables.ksl(7 * 16 + 15), 224);
        assert_eq!(tables.ksl(16 + 9), 8);
    }

    #[test]
    fn test_sustain_levels() {
        let tables = Tables::build(ChipType::Opl2).unwrap();
        assert_eq!(tables.sustain_level(0), 0);
        assert_eq!(tables.sustain_level(14), 224);
        assert_eq!(tables.sustain_level(15), 496);
    }

    #[test]
    fn test_rate_tables() {
        let tables = Tables::build(ChipType::Opl3).unwrap();
        // dummy entries never move
        assert_eq!(tables.rate(0), (0, EG_SELECT_FROZEN));
        assert_eq!(tables.rate(15), (0, EG_SELECT_FROZEN));
        // rate 0 .. 12 slow down by shifting
        assert_eq!(tables.rate(16), (12, 0));
        assert_eq!(tables.rate(16 + 3), (12, 24));
        assert_eq!(tables.rate(16 + 12 * 4), (0, 0));
        // rate 13 and 14 use larger increments
        assert_eq!(tables.rate(16 + 13 * 4), (0, 32));
        assert_eq!(tables.rate(16 + 14 * 4 + 3), (0, 88));
        // rate 15 and overflow
        assert_eq!(tables.rate(16 + 15 * 4), (0, 96));
        assert_eq!(tables.rate(95), (0, 96));
    }

    #[test]
    fn test_eg_increments() {
        let tables = Tables::build(ChipType::Opl2).unwrap();
        let steps: Vec<i32> = (0..8).map(|s| tables.eg_inc(8, s)).collect();
        assert_eq!(steps, [0, 1, 0, 1, 1, 1, 0, 1]);
        assert_eq!(tables.eg_inc(EG_SELECT_INSTANT, 5), 8);
        assert_eq!(tables.eg_inc(EG_SELECT_FROZEN, 3), 0);
    }

    #[test]
    fn test_lfo_am_table() {
        let tables = Tables::build(ChipType::Opl3).unwrap();
        let am: Vec<u8> = (0..LFO_AM_LEN).map(|i| tables.lfo_am(i)).collect();
        assert_eq!(&am[..8], &[0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(*am.iter().max().unwrap(), 26);
        assert_eq!(am.iter().filter(|&&v| v == 26).count(), 3);
        assert_eq!(am[LFO_AM_LEN - 1], 1);
        assert_eq!(am.iter().filter(|&&v| v == 13).count(), 8);
    }

    #[test]
    fn test_lfo_pm_table() {
        let tables = Tables::build(ChipType::Opl3).unwrap();
        let row = |fnum_hi: usize, depth: usize| -> Vec<i8> {
            (0..8).map(|s| tables.lfo_pm(fnum_hi * 16 + depth * 8 + s)).collect()
        };
        assert_eq!(row(0, 1), [0; 8]);
        assert_eq!(row(1, 0), [0; 8]);
        assert_eq!(row(1, 1), [1, 0, 0, 0, -1, 0, 0, 0]);
        assert_eq!(row(3, 1), [3, 1, 0, -1, -3, -1, 0, 1]);
        assert_eq!(row(7, 0), [3, 1, 0, -1, -3, -1, 0, 1]);
        assert_eq!(row(7, 1), [7, 3, 0, -3, -7, -3, 0, 3]);
    }

    #[test]
    fn test_op_calc_silence_past_table() {
        let tables = Tables::build(ChipType::Opl2).unwrap();
        assert_eq!(tables.op_calc(Phase::ZERO, 511, 0, 0), 0);
        // half-sine negative half reads the sentinel
        let phase = Phase::from_int(600);
        assert_eq!(tables.op_calc(phase, 0, 0, SIN_LEN), 0);
        // positive peak at full volume
        let phase = Phase::from_int(256);
        assert_eq!(tables.op_calc(phase, 0, 0, 0), 4084);
        assert_eq!(tables.op_calc(Phase::from_int(768), 0, 0, 0), -4084);
    }

    #[test]
    fn test_op_calc_phase_modulation() {
        let tables = Tables::build(ChipType::Opl2).unwrap();
        let direct = tables.op_calc(Phase::from_int(256), 0, 0, 0);
        let modulated = tables.op_calc(Phase::from_int(200), 0, 56, 0);
        assert_eq!(direct, modulated);
        // feedback modulation is pre-shifted
        let feedback = tables.op_calc1(Phase::from_int(200), 0, 56 << 16, 0);
        assert_eq!(direct, feedback);
        // negative modulation wraps around the table
        let wrapped = tables.op_calc(Phase::from_int(0), 0, -256, 0);
        assert_eq!(wrapped, tables.op_calc(Phase::from_int(768), 0, 0, 0));
    }

    #[test]
    fn test_acquire_shares_tables() {
        let a = acquire(ChipType::Opl2).unwrap();
        let b = acquire(ChipType::Opl2).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let c = acquire(ChipType::Opl3).unwrap();
        assert_eq!(c.chip_type(), ChipType::Opl3);
        assert_eq!(a.chip_type(), ChipType::Opl2);
    }
}
