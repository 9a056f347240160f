//! AdLib instrument as stored in S3M and compatible module formats.

/// Feedback/connection byte bits
pub const CONNECTION_BIT: u8 = 0x01;
pub const VOICE_TO_LEFT: u8 = 0x10;
pub const VOICE_TO_RIGHT: u8 = 0x20;
pub const STEREO_BITS: u8 = VOICE_TO_LEFT | VOICE_TO_RIGHT;

const KSL_MASK: u8 = 0xc0;
const TOTAL_LEVEL_MASK: u8 = 0x3f;

/// Twelve instrument bytes, modulator first in each pair:
///
/// | byte  | register                    |
/// |-------|-----------------------------|
/// | 0, 1  | AM/VIB/EG/KSR/MULT (`0x20`) |
/// | 2, 3  | KSL/TL (`0x40`)             |
/// | 4, 5  | AR/DR (`0x60`)              |
/// | 6, 7  | SL/RR (`0x80`)              |
/// | 8, 9  | waveform (`0xE0`)           |
/// | 10    | feedback/connection (`0xC0`)|
/// | 11    | unused                      |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Patch(pub [u8; 12]);

impl Patch {
    /// Bytes for the operator registers of one slot, in register order
    /// `0x20, 0x40, 0x60, 0x80, 0xE0`
    pub fn operator(&self, carrier: bool) -> [u8; 5] {
        let op = carrier as usize;
        let d = &self.0;
        [d[op], d[2 + op], d[4 + op], d[6 + op], d[8 + op] & 7]
    }

    /// Feedback and connection with the output bits cleared
    pub fn feedback_connection(&self) -> u8 {
        self.0[10] & !STEREO_BITS
    }

    /// Both slots are heard rather than one modulating the other
    pub fn additive(&self) -> bool {
        self.0[10] & CONNECTION_BIT != 0
    }

    /// Scales a slot's total level by a tracker volume of 0..=63, keeping
    /// its key scale level bits. Volume 63 gives the patch level, 0 gives
    /// full attenuation.
    pub fn level(&self, carrier: bool, volume: u8) -> u8 {
        let ksl_tl = self.0[2 + carrier as usize];
        let volume = volume.min(63) as u32;
        let tl = (ksl_tl & TOTAL_LEVEL_MASK) as u32;
        let scaled = 63 + tl * volume / 63 - volume;
        (ksl_tl & KSL_MASK) | scaled as u8
    }
}

impl From<[u8; 12]> for Patch {
    fn from(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }
}
