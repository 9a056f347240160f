//! Tracker voice to chip channel allocation.

use log::debug;

use crate::LOG_TAG;

/// Upper bound the voice index is checked against. This is the mixer's
/// voice limit, not the tracker's channel count ([`TRACKER_CHANNELS`]), so
/// voice numbers no tracker channel can produce are still accepted. The
/// check is kept as it has always behaved.
pub const MAX_VOICES: usize = 256;

/// Channels a tracker module can address
pub const TRACKER_CHANNELS: usize = 64;

/// Two-way mapping between tracker voices and chip channels
#[derive(Debug, Clone)]
pub struct VoiceMap {
    voice_to_channel: Vec<Option<usize>>,
    channel_to_voice: Vec<Option<usize>>,
}

impl VoiceMap {
    pub fn new(channels: usize) -> Self {
        Self {
            voice_to_channel: vec![None; MAX_VOICES],
            channel_to_voice: vec![None; channels],
        }
    }

    pub fn clear(&mut self) {
        self.voice_to_channel.fill(None);
        self.channel_to_voice.fill(None);
    }

    /// Channel currently playing `voice`
    pub fn channel(&self, voice: usize) -> Option<usize> {
        if voice >= MAX_VOICES {
            return None;
        }
        self.voice_to_channel[voice]
    }

    /// Voice currently owning `channel`
    pub fn voice(&self, channel: usize) -> Option<usize> {
        self.channel_to_voice.get(channel).copied().flatten()
    }

    /// Returns the channel of `voice`, assigning one if it has none: a free
    /// channel first, otherwise the last channel whose key is released
    /// (`key_down` reports the key state of a channel). `None` when every
    /// channel is busy.
    pub fn allocate(&mut self, voice: usize, key_down: impl Fn(usize) -> bool) -> Option<usize> {
        if voice >= MAX_VOICES {
            return None;
        }
        if let Some(channel) = self.voice_to_channel[voice] {
            return Some(channel);
        }

        if let Some(channel) = self.channel_to_voice.iter().position(Option::is_none) {
            return Some(self.assign(voice, channel));
        }

        let channel = (0..self.channel_to_voice.len()).rev().find(|&ch| !key_down(ch))?;
        if let Some(previous) = self.channel_to_voice[channel] {
            debug!(target: LOG_TAG, "Voice {voice} takes channel {channel} from voice {previous}");
            self.voice_to_channel[previous] = None;
        }
        Some(self.assign(voice, channel))
    }

    fn assign(&mut self, voice: usize, channel: usize) -> usize {
        self.voice_to_channel[voice] = Some(channel);
        self.channel_to_voice[channel] = Some(voice);
        channel
    }
}
