//! # Channel Algorithms
//!
//! A channel owns two slots and decides how they are wired: slot 1 either
//! phase-modulates slot 2 or both are summed into the output. On the OPL3,
//! designated channel pairs can chain all four slots, and in rhythm mode
//! channels 6 to 8 turn into five percussion instruments.
//!
//! Slot outputs are written to a [`Bus`] through each slot's [`Route`], so the
//! algorithm is selected when the connection registers are written rather
//! than on every sample.

use crate::fixed::Phase;
use crate::operator::Slot;
use crate::registers::{BlockFnum, FeedbackConnection, KeySource, Outputs};
use crate::tables::Tables;

/// Frequency-derived values shared by a channel's slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Frequency {
    pub(crate) block_fnum: BlockFnum,
    /// Phase increment for multiplier 1 (before doubling)
    pub(crate) fc: u32,
    /// Key code used for rate scaling
    pub(crate) kcode: u8,
    /// Key scale level base
    pub(crate) ksl_base: u32,
}

impl Frequency {
    pub(crate) fn new(tables: &Tables, fn_tab: &[u32], block_fnum: BlockFnum, note_select: bool) -> Self {
        Self {
            block_fnum,
            fc: fn_tab[block_fnum.fnum() as usize] >> (7 - block_fnum.block()),
            kcode: block_fnum.key_code(note_select),
            ksl_base: tables.ksl(block_fnum.ksl_bucket()),
        }
    }

    pub fn block_fnum(&self) -> BlockFnum {
        self.block_fnum
    }
}

/// Destination of a slot's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Route {
    /// Modulates the next slot in the chain
    #[default]
    PhaseMod,
    /// Carries modulation from the first channel of a 4-op pair to the second
    PhaseMod2,
    /// Audible, accumulated into this channel's output
    Output(usize),
}

/// Per-sample signal bus shared by every channel of a chip
#[derive(Debug, Clone)]
pub struct Bus {
    pub(crate) phase_modulation: i32,
    pub(crate) phase_modulation2: i32,
    pub(crate) output: [i32; 18],
}

impl Default for Bus {
    fn default() -> Self {
        Self {
            phase_modulation: 0,
            phase_modulation2: 0,
            output: [0; 18],
        }
    }
}

impl Bus {
    #[inline]
    fn add(&mut self, route: Route, value: i32) {
        match route {
            Route::PhaseMod => self.phase_modulation += value,
            Route::PhaseMod2 => self.phase_modulation2 += value,
            Route::Output(ch) => self.output[ch] += value,
        }
    }

    /// Clears the channel outputs. Every channel resets the modulation
    /// inputs itself before it runs.
    #[inline]
    pub(crate) fn clear_outputs(&mut self) {
        self.output = [0; 18];
    }
}

/// Lower channel of each pair that can form a 4-operator voice
pub const FOUR_OP_PAIRS: [usize; 6] = [0, 1, 2, 9, 10, 11];

/// `true` for the lower channel of a 4-operator pair
pub fn is_pair_first(ch: usize) -> bool {
    FOUR_OP_PAIRS.contains(&ch)
}

/// `true` for the upper channel of a 4-operator pair
pub fn is_pair_second(ch: usize) -> bool {
    ch >= 3 && is_pair_first(ch - 3)
}

/// Routes for a 2-operator channel
pub fn two_op_routes(ch: usize, connection: bool) -> [Route; 2] {
    let first = if connection {
        Route::Output(ch)
    } else {
        Route::PhaseMod
    };
    [first, Route::Output(ch)]
}

/// Routes for the four slots of a pair, in the order
/// `[first.slot1, first.slot2, second.slot1, second.slot2]`.
///
/// The two connection bits pick the algorithm:
/// - `00`: `1 -> 2 -> 3 -> 4`
/// - `01`: `(1 -> 2) + (3 -> 4)`
/// - `10`: `1 + (2 -> 3 -> 4)`
/// - `11`: `1 + (2 -> 3) + 4`
pub fn four_op_routes(first: usize, first_con: bool, second_con: bool) -> [Route; 4] {
    let second = first + 3;
    match (first_con, second_con) {
        (false, false) => [
            Route::PhaseMod,
            Route::PhaseMod2,
            Route::PhaseMod,
            Route::Output(second),
        ],
        (false, true) => [
            Route::PhaseMod,
            Route::Output(first),
            Route::PhaseMod,
            Route::Output(second),
        ],
        (true, false) => [
            Route::Output(first),
            Route::PhaseMod2,
            Route::PhaseMod,
            Route::Output(second),
        ],
        (true, true) => [
            Route::Output(first),
            Route::PhaseMod2,
            Route::Output(second),
            Route::Output(second),
        ],
    }
}

#[derive(Debug, Clone)]
pub struct Channel {
    pub(crate) slots: [Slot; 2],
    pub(crate) freq: Frequency,
    /// Feedback shift for slot 1, 0 when feedback is off
    pub(crate) feedback: u8,
    pub(crate) connection: bool,
    /// Last two outputs of slot 1, for feedback
    pub(crate) op1_out: [i32; 2],
    /// Last value written to `0xC0-0xC8`
    pub(crate) control: FeedbackConnection,
    /// Output masks for A, B, C and D; all ones when enabled
    pub(crate) pan: [i32; 4],
    /// Lower channel of an active 4-operator pair
    pub(crate) extended: bool,
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            slots: Default::default(),
            freq: Frequency::default(),
            feedback: 0,
            connection: false,
            op1_out: [0; 2],
            control: FeedbackConnection::default(),
            pan: [!0; 4],
            extended: false,
        }
    }
}

impl Channel {
    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    pub fn block_fnum(&self) -> BlockFnum {
        self.freq.block_fnum
    }

    pub fn connection(&self) -> bool {
        self.connection
    }

    /// Feedback level as written, 0..=7
    pub fn feedback(&self) -> u8 {
        self.control.feedback()
    }

    pub fn outputs(&self) -> Outputs {
        self.control.outputs()
    }

    /// Set on the lower channel of a pair playing as one 4-operator voice
    pub fn extended(&self) -> bool {
        self.extended
    }

    /// Stores `0xC0-0xC8`. `stereo` is set in OPL3 mode, where the output
    /// bits gate the four DAC channels.
    pub(crate) fn set_control(&mut self, reg: FeedbackConnection, stereo: bool) {
        self.control = reg;
        let outputs = reg.outputs();
        self.pan = if stereo {
            [Outputs::A, Outputs::B, Outputs::C, Outputs::D].map(|o| if outputs.contains(o) { !0 } else { 0 })
        } else {
            [!0; 4]
        };
        let fb = reg.feedback();
        self.feedback = if fb != 0 { fb + 7 } else { 0 };
        self.connection = reg.connection();
    }

    pub(crate) fn set_routes(&mut self, routes: [Route; 2]) {
        self.slots[0].route = routes[0];
        self.slots[1].route = routes[1];
    }

    pub(crate) fn key_on(&mut self, source: KeySource) {
        self.slots.iter_mut().for_each(|s| s.key_on(source));
    }

    pub(crate) fn key_off(&mut self, source: KeySource) {
        self.slots.iter_mut().for_each(|s| s.key_off(source));
    }

    /// Runs slot 1 with self-feedback. Returns the previous sample, which the
    /// OPL2 path and the bass drum route; the new one is left in `op1_out[1]`.
    #[inline]
    fn run_feedback(&mut self, tables: &Tables, lfo_am: u32) -> i32 {
        let slot = &self.slots[0];
        let env = slot.attenuation(lfo_am);
        let mut out = self.op1_out[0] + self.op1_out[1];
        self.op1_out[0] = self.op1_out[1];
        self.op1_out[1] = 0;
        if env < tables.env_quiet() {
            if self.feedback == 0 {
                out = 0;
            }
            self.op1_out[1] = tables.op_calc1(slot.phase, env, out << self.feedback, slot.wavetable);
        }
        self.op1_out[0]
    }

    #[inline]
    fn run_slot(&self, index: usize, tables: &Tables, lfo_am: u32, pm: i32) -> Option<i32> {
        let slot = &self.slots[index];
        let env = slot.attenuation(lfo_am);
        (env < tables.env_quiet()).then(|| tables.op_calc(slot.phase, env, pm, slot.wavetable))
    }

    /// YM3812 2-operator channel. Slot 1's delayed output is routed before
    /// the new sample is computed.
    #[inline]
    pub(crate) fn calc_opl2(&mut self, tables: &Tables, lfo_am: u32, bus: &mut Bus) {
        bus.phase_modulation = 0;
        let previous = self.run_feedback(tables, lfo_am);
        bus.add(self.slots[0].route, previous);
        if let Some(out) = self.run_slot(1, tables, lfo_am, bus.phase_modulation) {
            bus.add(self.slots[1].route, out);
        }
    }

    /// YMF262 2-operator channel, or the first half of a 4-operator voice
    #[inline]
    pub(crate) fn calc(&mut self, tables: &Tables, lfo_am: u32, bus: &mut Bus) {
        bus.phase_modulation = 0;
        bus.phase_modulation2 = 0;
        self.run_feedback(tables, lfo_am);
        bus.add(self.slots[0].route, self.op1_out[1]);
        if let Some(out) = self.run_slot(1, tables, lfo_am, bus.phase_modulation) {
            bus.add(self.slots[1].route, out);
        }
    }

    /// Second half of a 4-operator voice: slot 1 is driven by the first
    /// channel instead of feedback
    #[inline]
    pub(crate) fn calc_ext(&mut self, tables: &Tables, lfo_am: u32, bus: &mut Bus) {
        bus.phase_modulation = 0;
        if let Some(out) = self.run_slot(0, tables, lfo_am, bus.phase_modulation2) {
            bus.add(self.slots[0].route, out);
        }
        if let Some(out) = self.run_slot(1, tables, lfo_am, bus.phase_modulation) {
            bus.add(self.slots[1].route, out);
        }
    }
}

/// Bits of a phase counter's integer part
#[inline]
fn phase_bit(phase: Phase, bit: u32) -> u32 {
    (phase.int() >> bit) & 1
}

/// Rhythm section on channels 6, 7 and 8: bass drum, high-hat, snare,
/// tom-tom and top cymbal. Every instrument plays at double amplitude.
///
/// The high-hat and cymbal do not use their own phase. Their waveform
/// position is built from bits of channel 7 slot 1's and channel 8 slot 2's
/// phase counters, mixed with the noise bit.
pub(crate) fn calc_rhythm(channels: &mut [Channel], tables: &Tables, lfo_am: u32, noise: bool, bus: &mut Bus) {
    let quiet = tables.env_quiet();

    // Bass drum: a normal 2-op voice, but with connection set slot 1 is
    // simply dropped and slot 2 plays unmodulated
    bus.phase_modulation = 0;
    let bd = &mut channels[6];
    let previous = bd.run_feedback(tables, lfo_am);
    if !bd.connection {
        bus.phase_modulation = previous;
    }
    if let Some(out) = bd.run_slot(1, tables, lfo_am, bus.phase_modulation) {
        bus.output[6] += out * 2;
    }

    let hh_phase = channels[7].slots[0].phase;
    let tc_phase = channels[8].slots[1].phase;
    let res1 = (phase_bit(hh_phase, 2) ^ phase_bit(hh_phase, 7)) | phase_bit(hh_phase, 3);
    let res2 = phase_bit(tc_phase, 3) ^ phase_bit(tc_phase, 5);

    // High-hat
    let hh = &channels[7].slots[0];
    let env = hh.attenuation(lfo_am);
    if env < quiet {
        let mut phase = if res1 != 0 { 0x200 | (0xd0 >> 2) } else { 0xd0 };
        if res2 != 0 {
            phase = 0x200 | (0xd0 >> 2);
        }
        if phase & 0x200 != 0 {
            if noise {
                phase = 0x200 | 0xd0;
            }
        } else if noise {
            phase = 0xd0 >> 2;
        }
        bus.output[7] += tables.op_calc(Phase::from_int(phase), env, 0, hh.wavetable) * 2;
    }

    // Snare drum
    let sd = &channels[7].slots[1];
    let env = sd.attenuation(lfo_am);
    if env < quiet {
        let mut phase = if phase_bit(hh_phase, 8) != 0 { 0x200 } else { 0x100 };
        if noise {
            phase ^= 0x100;
        }
        bus.output[7] += tables.op_calc(Phase::from_int(phase), env, 0, sd.wavetable) * 2;
    }

    // Tom-tom
    let tom = &channels[8].slots[0];
    let env = tom.attenuation(lfo_am);
    if env < quiet {
        bus.output[8] += tables.op_calc(tom.phase, env, 0, tom.wavetable) * 2;
    }

    // Top cymbal
    let tc = &channels[8].slots[1];
    let env = tc.attenuation(lfo_am);
    if env < quiet {
        let phase = if res1 != 0 || res2 != 0 { 0x300 } else { 0x100 };
        bus.output[8] += tables.op_calc(Phase::from_int(phase), env, 0, tc.wavetable) * 2;
    }
}
