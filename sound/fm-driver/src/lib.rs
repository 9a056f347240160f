//! # FM Driver
//!
//! Plays tracker-style AdLib instruments on an emulated OPL3. The driver owns
//! a [`Chip`] and turns note-level requests (instrument, volume, pan,
//! frequency, note off) into register writes, mapping the tracker's voices
//! onto the chip's 18 channels.
//!
//! ```rust
//! use fm_driver::{FmDriver, Patch};
//!
//! let mut fm = FmDriver::new(44_100).unwrap();
//! let organ = Patch([0x21, 0x31, 0x4f, 0x00, 0xf2, 0xf2, 0x53, 0x56, 0, 0, 0x0e, 0]);
//! fm.patch(0, &organ);
//! fm.touch(0, 63);
//! fm.hertz_touch(0, 440_000, false);
//!
//! let mut mix = vec![0i32; 2 * 256];
//! let mut peaks = [0u32; 18];
//! fm.mix(&mut [&mut mix[..]], &mut peaks);
//! ```

pub mod patch;
pub mod voices;

use fmopl::{Chip, ChipConfig, Result};
use log::{debug, trace};

pub use patch::Patch;
pub use voices::{MAX_VOICES, TRACKER_CHANNELS, VoiceMap};

use patch::{STEREO_BITS, VOICE_TO_LEFT, VOICE_TO_RIGHT};

const LOG_TAG: &str = "FmDriver";

/// Chip channels available to voices
pub const OPL_CHANNELS: usize = 18;

/// Sample rate of the chip itself, the reference for f-numbers
const OPL_BASE_RATE: u64 = 49_716;

/// Highest playable frequency: f-number 1023 at block 7
const MAX_MILLI_HERTZ: u32 = 6_208_431;

/// First operator register offset of channels 0..9 within a bank
const PORT_BASES: [u16; 9] = [0, 1, 2, 8, 9, 10, 16, 17, 18];

const TEST_REGISTER: u16 = 0x01;
const ENABLE_WAVE_SELECT: u8 = 0x20;
const FOUR_OP_REGISTER: u16 = 0x104;
const OPL3_MODE_REGISTER: u16 = 0x105;

const AM_VIB: u16 = 0x20;
const KSL_LEVEL: u16 = 0x40;
const ATTACK_DECAY: u16 = 0x60;
const SUSTAIN_RELEASE: u16 = 0x80;
const FNUM_LOW: u16 = 0xa0;
const KEYON_BLOCK: u16 = 0xb0;
const FEEDBACK_CONNECTION: u16 = 0xc0;
const WAVE_SELECT: u16 = 0xe0;

const KEYON_BIT: u8 = 0x20;

/// Register of a channel-wide setting, bank 1 for channels 9..18
fn channel_register(channel: usize) -> u16 {
    if channel < 9 {
        channel as u16
    } else {
        (channel as u16 - 9) | 0x100
    }
}

/// Register offset of a channel's modulator; the carrier is 3 higher
fn operator_register(channel: usize) -> u16 {
    if channel < 9 {
        PORT_BASES[channel]
    } else {
        PORT_BASES[channel - 9] | 0x100
    }
}

/// Block and f-number for a frequency in milli-Hertz, using the lowest block
/// that keeps the f-number below 1024
pub fn block_fnum(milli_hertz: u32) -> (u8, u16) {
    if milli_hertz > MAX_MILLI_HERTZ {
        return (7, 1023);
    }
    for block in 0..8u8 {
        let scale = 1u64 << (20 - block as u64);
        let divisor = OPL_BASE_RATE * 1000;
        let fnum = (milli_hertz as u64 * scale + divisor / 2) / divisor;
        if fnum < 1024 {
            return (block, fnum as u16);
        }
    }
    (7, 1023)
}

/// Output bits for a pan position of 0 (left) to 64 (right). The chip only
/// knows left, right and both.
pub fn pan_bits(pan: u8) -> u8 {
    match pan.min(64) {
        0..=21 => VOICE_TO_LEFT,
        43..=64 => VOICE_TO_RIGHT,
        _ => STEREO_BITS,
    }
}

pub struct FmDriver {
    chip: Chip,
    voices: VoiceMap,
    patches: [Patch; OPL_CHANNELS],
    /// Last `0xB0` value per channel
    key_on_block: [u8; OPL_CHANNELS],
    /// Output bits per channel, merged into the feedback/connection byte
    pans: [u8; OPL_CHANNELS],
    /// Set once a note has played; nothing is rendered before that
    active: bool,
}

impl FmDriver {
    /// An OPL3 at the usual clock rendering at `rate_hz`
    pub fn new(rate_hz: u32) -> Result<Self> {
        Self::with_config(ChipConfig::opl3(rate_hz))
    }

    pub fn with_config(config: ChipConfig) -> Result<Self> {
        let mut driver = Self {
            chip: Chip::new(config)?,
            voices: VoiceMap::new(OPL_CHANNELS),
            patches: [Patch::default(); OPL_CHANNELS],
            key_on_block: [0; OPL_CHANNELS],
            pans: [STEREO_BITS; OPL_CHANNELS],
            active: false,
        };
        driver.reset();
        Ok(driver)
    }

    /// Resets the chip, forgets every voice and enables waveform select and
    /// OPL3 mode
    pub fn reset(&mut self) {
        self.chip.reset();
        self.voices.clear();
        self.key_on_block = [0; OPL_CHANNELS];
        self.pans = [STEREO_BITS; OPL_CHANNELS];
        self.active = false;

        self.write(TEST_REGISTER, ENABLE_WAVE_SELECT);
        self.write(OPL3_MODE_REGISTER, 1);
        self.write(FOUR_OP_REGISTER, 0);
        debug!(target: LOG_TAG, "Reset");
    }

    /// Writes a register through the chip's ports, bank 1 through the
    /// second address port
    fn write(&mut self, reg: u16, value: u8) {
        let (address, data) = if reg & 0x100 != 0 { (2, 3) } else { (0, 1) };
        self.chip.write(address, reg as u8);
        self.chip.write(data, value);
    }

    /// Loads an instrument into the voice's channel, allocating one if needed
    pub fn patch(&mut self, voice: usize, patch: &Patch) {
        let key_on_block = self.key_on_block;
        let Some(channel) = self
            .voices
            .allocate(voice, |ch| key_on_block[ch] & KEYON_BIT != 0)
        else {
            trace!(target: LOG_TAG, "No channel for voice {voice}");
            return;
        };
        self.patches[channel] = *patch;

        let modulator = operator_register(channel);
        for (op, carrier) in [(modulator, false), (modulator + 3, true)] {
            let bytes = patch.operator(carrier);
            for (reg, value) in [AM_VIB, KSL_LEVEL, ATTACK_DECAY, SUSTAIN_RELEASE, WAVE_SELECT]
                .into_iter()
                .zip(bytes)
            {
                self.write(reg + op, value);
            }
        }
        self.write_feedback(channel);
    }

    fn write_feedback(&mut self, channel: usize) {
        let value = self.patches[channel].feedback_connection() | self.pans[channel];
        self.write(FEEDBACK_CONNECTION + channel_register(channel), value);
    }

    /// Sets a voice's volume, 0..=63. The carrier follows the volume; the
    /// modulator only when both slots are heard.
    pub fn touch(&mut self, voice: usize, volume: u8) {
        let Some(channel) = self.voices.channel(voice) else {
            return;
        };
        let patch = self.patches[channel];
        let modulator = operator_register(channel);
        if patch.additive() {
            self.write(KSL_LEVEL + modulator, patch.level(false, volume));
        }
        self.write(KSL_LEVEL + modulator + 3, patch.level(true, volume));
    }

    /// Pans a voice, 0 (left) to 64 (right)
    pub fn pan(&mut self, voice: usize, pan: u8) {
        let Some(channel) = self.voices.channel(voice) else {
            return;
        };
        self.pans[channel] = pan_bits(pan);
        self.write_feedback(channel);
    }

    /// Sets a voice's frequency in milli-Hertz and keys it on, or only
    /// updates the pitch with the key released when `key_off` is set
    pub fn hertz_touch(&mut self, voice: usize, milli_hertz: u32, key_off: bool) {
        let Some(channel) = self.voices.channel(voice) else {
            return;
        };
        self.active = true;

        let (block, fnum) = block_fnum(milli_hertz);
        let reg = channel_register(channel);
        self.write(FNUM_LOW + reg, (fnum & 0xff) as u8);

        let mut key_on_block = (block << 2) | (fnum >> 8) as u8;
        if !key_off {
            key_on_block |= KEYON_BIT;
        }
        self.key_on_block[channel] = key_on_block;
        self.write(KEYON_BLOCK + reg, key_on_block);
    }

    /// Releases a voice's key; the channel stays assigned until stolen
    pub fn note_off(&mut self, voice: usize) {
        let Some(channel) = self.voices.channel(voice) else {
            return;
        };
        self.key_on_block[channel] &= !KEYON_BIT;
        let value = self.key_on_block[channel];
        self.write(KEYON_BLOCK + channel_register(channel), value);
    }

    /// Renders into the caller's buffers, see [`Chip::generate`]. Does
    /// nothing until the first note.
    pub fn mix(&mut self, buffers: &mut [&mut [i32]], peaks: &mut [u32]) {
        if !self.active {
            peaks.iter_mut().for_each(|p| *p = 0);
            return;
        }
        self.chip.generate(buffers, peaks);
    }

    /// Channel playing `voice`
    pub fn channel(&self, voice: usize) -> Option<usize> {
        self.voices.channel(voice)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn chip(&self) -> &Chip {
        &self.chip
    }
}
