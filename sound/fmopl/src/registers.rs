//! Register field layouts.
//!
//! Each register that packs several parameters gets a newtype with named
//! accessors; flag registers use `bitflags`. Bit positions match the Yamaha
//! register maps.

use bitflags::bitflags;

/// Operator to slot lookup for register offsets `0x00..0x1f`.
/// Slot `n` is operator `n & 1` of channel `n / 2`.
#[rustfmt::skip]
const SLOT_ARRAY: [i8; 32] = [
     0,  2,  4,  1,  3,  5, -1, -1,
     6,  8, 10,  7,  9, 11, -1, -1,
    12, 14, 16, 13, 15, 17, -1, -1,
    -1, -1, -1, -1, -1, -1, -1, -1,
];

/// Slot number (within one bank) addressed by an operator register, if any
pub fn slot_index(reg: u8) -> Option<usize> {
    usize::try_from(SLOT_ARRAY[(reg & 0x1f) as usize]).ok()
}

/// `0x20-0x35`: tremolo, vibrato, sustain, key scale rate, multiplier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpControl(pub u8);

impl OpControl {
    pub fn tremolo(self) -> bool {
        self.0 & 0x80 != 0
    }

    pub fn vibrato(self) -> bool {
        self.0 & 0x40 != 0
    }

    /// Envelope type: hold at the sustain level while keyed
    pub fn sustain(self) -> bool {
        self.0 & 0x20 != 0
    }

    pub fn key_scale_rate(self) -> bool {
        self.0 & 0x10 != 0
    }

    pub fn multiplier(self) -> u8 {
        self.0 & 0x0f
    }
}

/// `0x40-0x55`: key scale level and total level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyScaleLevel(pub u8);

impl KeyScaleLevel {
    /// Raw 2-bit KSL field: 0 = off, 1 = 3dB, 2 = 1.5dB, 3 = 6dB per octave
    pub fn ksl(self) -> u8 {
        self.0 >> 6
    }

    /// Attenuation in 0.75dB steps
    pub fn total_level(self) -> u8 {
        self.0 & 0x3f
    }
}

/// `0x60-0x75`: attack and decay rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttackDecay(pub u8);

impl AttackDecay {
    pub fn attack(self) -> u8 {
        self.0 >> 4
    }

    pub fn decay(self) -> u8 {
        self.0 & 0x0f
    }
}

/// `0x80-0x95`: sustain level and release rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SustainRelease(pub u8);

impl SustainRelease {
    pub fn sustain_level(self) -> u8 {
        self.0 >> 4
    }

    pub fn release(self) -> u8 {
        self.0 & 0x0f
    }
}

/// `0xC0-0xC8`: output enables (OPL3), feedback and connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeedbackConnection(pub u8);

impl FeedbackConnection {
    pub fn outputs(self) -> Outputs {
        Outputs::from_bits_truncate(self.0)
    }

    pub fn feedback(self) -> u8 {
        (self.0 >> 1) & 7
    }

    /// `true` for additive (both operators audible), `false` for FM
    pub fn connection(self) -> bool {
        self.0 & 1 != 0
    }
}

/// Channel frequency: block in bits 10..12, f-number in bits 0..9
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockFnum(pub u32);

impl BlockFnum {
    /// Replaces the low eight f-number bits (`0xA0-0xA8`)
    pub fn with_fnum_low(self, value: u8) -> Self {
        Self((self.0 & 0x1f00) | value as u32)
    }

    /// Replaces block and f-number high bits (`0xB0-0xB8`, key bit excluded)
    pub fn with_high(self, value: u8) -> Self {
        Self((((value & 0x1f) as u32) << 8) | (self.0 & 0xff))
    }

    pub fn block(self) -> u32 {
        (self.0 & 0x1c00) >> 10
    }

    pub fn fnum(self) -> u32 {
        self.0 & 0x3ff
    }

    /// Key code used for key scaling: block in bits 1..3, bit 0 from the
    /// f-number MSB (or the bit below it when note select is set)
    pub fn key_code(self, note_select: bool) -> u8 {
        let low = if note_select {
            (self.0 & 0x100) >> 8
        } else {
            (self.0 & 0x200) >> 9
        };
        (((self.0 & 0x1c00) >> 9) | low) as u8
    }

    /// Index into the key scale level table
    pub fn ksl_bucket(self) -> usize {
        (self.0 >> 6) as usize
    }

    /// Top three f-number bits, which scale the vibrato depth
    pub fn vibrato_bucket(self) -> usize {
        ((self.0 & 0x380) >> 7) as usize
    }
}

bitflags! {
    /// Status register, read from the address port
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Status: u8 {
        /// Any unmasked flag is set
        const IRQ = 0x80;
        /// Timer A overflow (ST1)
        const TIMER_A = 0x40;
        /// Timer B overflow (ST2)
        const TIMER_B = 0x20;
        /// End of sample (ADPCM parts only, never raised here)
        const EOS = 0x10;
        /// Buffer ready (ADPCM parts only, never raised here)
        const BUF_RDY = 0x08;
    }
}

bitflags! {
    /// `0x04`: IRQ reset, flag masks and timer start bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TimerControl: u8 {
        const IRQ_RESET = 0x80;
        const MASK_A = 0x40;
        const MASK_B = 0x20;
        const START_B = 0x02;
        const START_A = 0x01;
    }
}

bitflags! {
    /// `0x08`: composite sine mode and note select
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Mode: u8 {
        /// Timer A overflow keys every channel (OPL2 only)
        const CSM = 0x80;
        const NOTE_SELECT = 0x40;
    }
}

bitflags! {
    /// `0xBD`: LFO depths, rhythm mode and percussion keys
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Rhythm: u8 {
        /// Tremolo depth 4.8dB instead of 1dB
        const AM_DEPTH = 0x80;
        /// Vibrato depth 14 cents instead of 7
        const PM_DEPTH = 0x40;
        const ENABLE = 0x20;
        const BASS_DRUM = 0x10;
        const SNARE = 0x08;
        const TOM = 0x04;
        const CYMBAL = 0x02;
        const HIHAT = 0x01;
    }
}

bitflags! {
    /// OPL3 channel output enables in `0xC0-0xC8`. A and B are the left and
    /// right outputs of a stereo card; C and D go to the second DAC.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Outputs: u8 {
        const A = 0x10;
        const B = 0x20;
        const C = 0x40;
        const D = 0x80;
    }
}

bitflags! {
    /// Sources that can hold an operator keyed on
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct KeySource: u8 {
        /// Channel key bit in `0xB0-0xB8`
        const FM = 0x01;
        /// Percussion key bit in `0xBD`
        const RHYTHM = 0x02;
        /// Timer A overflow in CSM mode
        const CSM = 0x04;
    }
}
