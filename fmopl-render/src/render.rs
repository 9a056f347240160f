//! Drives a chip through a render script and collects the mixed output.
//!
//! Register writes land before the frame they are stamped with. Timers run
//! on the script's sample clock: a started timer overflows at the frame its
//! period ends in, so timer IRQs and CSM key-ons are rendered like on a
//! host that services the chip's timer callbacks.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fmopl::{Chip, ChipEvents, Timer};
use log::{debug, info};

use crate::config::{RenderScript, ScriptWrite};

const LOG_TAG: &str = "Render";
const NANOS_PER_SEC: u64 = 1_000_000_000;
/// Frames generated per call at most
const CHUNK_FRAMES: u64 = 1024;

const TIMERS: [Timer; 2] = [Timer::A, Timer::B];

/// Reloads requested by the chip since the last [`Timers::sync`]
#[derive(Debug, Default, Clone)]
struct TimerEvents(Arc<Mutex<[Option<Option<Duration>>; 2]>>);

impl ChipEvents for TimerEvents {
    fn timer_reload(&mut self, timer: Timer, period: Option<Duration>) {
        if let Ok(mut reloads) = self.0.lock() {
            reloads[timer_index(timer)] = Some(period);
        }
    }

    fn irq_changed(&mut self, asserted: bool) {
        debug!(target: LOG_TAG, "IRQ {}", if asserted { "raised" } else { "cleared" });
    }
}

fn timer_index(timer: Timer) -> usize {
    match timer {
        Timer::A => 0,
        Timer::B => 1,
    }
}

/// Overflow deadlines in nanoseconds of script time
#[derive(Debug, Default)]
struct Timers {
    events: TimerEvents,
    deadlines: [Option<u64>; 2],
}

impl Timers {
    /// Applies pending reloads, counting new periods from `now`
    fn sync(&mut self, now: u64) {
        let Ok(mut reloads) = self.events.0.lock() else {
            return;
        };
        for (deadline, reload) in self.deadlines.iter_mut().zip(reloads.iter_mut()) {
            if let Some(period) = reload.take() {
                *deadline = period.map(|p| now + p.as_nanos() as u64);
            }
        }
    }

    /// Earliest timer overflowing at or before `now`
    fn due(&self, now: u64) -> Option<(Timer, u64)> {
        TIMERS
            .iter()
            .zip(self.deadlines)
            .filter_map(|(&timer, deadline)| Some((timer, deadline?)))
            .filter(|&(_, deadline)| deadline <= now)
            .min_by_key(|&(_, deadline)| deadline)
    }

    fn next(&self) -> Option<u64> {
        self.deadlines.iter().flatten().copied().min()
    }
}

/// Output of a finished render
#[derive(Debug, Clone, Default)]
pub struct Rendering {
    pub rate: u32,
    /// Interleaved stereo, clamped to 16 bits
    pub samples: Vec<i16>,
    /// Highest peak each voice reached
    pub peaks: Vec<u32>,
    /// Samples that had to be clamped
    pub clipped: usize,
    /// Overflows of timer A and B
    pub overflows: [u32; 2],
}

impl Rendering {
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    fn push(&mut self, mix: &[i32]) {
        for &sample in mix {
            let clamped = sample.clamp(i16::MIN as i32, i16::MAX as i32);
            if clamped != sample {
                self.clipped += 1;
            }
            self.samples.push(clamped as i16);
        }
    }
}

/// Renders `script.frames` frames, applying every write stamped inside the
/// rendered range
pub fn render(script: &RenderScript) -> fmopl::Result<Rendering> {
    let config = script.chip_config();
    let mut chip = Chip::new(config)?;
    let mut timers = Timers::default();
    chip.set_events(Box::new(timers.events.clone()));
    info!(
        target: LOG_TAG,
        "Rendering {} frames on {:?} at {} Hz (clock {} Hz)",
        script.frames, config.chip_type, config.rate_hz, config.clock_hz
    );

    let mut writes: Vec<ScriptWrite> = script.writes.clone();
    writes.sort_by_key(|w| w.at);
    let mut pending = writes.iter().peekable();

    let total = u64::from(script.frames);
    let rate = u64::from(config.rate_hz);
    let voices = config.chip_type.voices();
    let mut mix = vec![0i32; CHUNK_FRAMES as usize * 2];
    let mut peaks = vec![0u32; voices];
    let mut rendering = Rendering {
        rate: config.rate_hz,
        samples: Vec::with_capacity(total as usize * 2),
        peaks: vec![0; voices],
        ..Rendering::default()
    };

    let mut cursor = 0u64;
    while cursor < total {
        let now = cursor * NANOS_PER_SEC / rate;
        while let Some(write) = pending.next_if(|w| u64::from(w.at) <= cursor) {
            chip.write_register(write.reg, write.value);
            timers.sync(now);
        }
        while let Some((timer, deadline)) = timers.due(now) {
            timers.deadlines[timer_index(timer)] = None;
            rendering.overflows[timer_index(timer)] += 1;
            chip.timer_expired(timer);
            timers.sync(deadline);
        }

        let mut end = (cursor + CHUNK_FRAMES).min(total);
        if let Some(write) = pending.peek() {
            end = end.min(u64::from(write.at));
        }
        if let Some(deadline) = timers.next() {
            end = end.min((deadline * rate).div_ceil(NANOS_PER_SEC));
        }
        let end = end.max(cursor + 1);

        let buffer = &mut mix[..(end - cursor) as usize * 2];
        buffer.fill(0);
        chip.generate(&mut [&mut *buffer], &mut peaks);
        for (highest, peak) in rendering.peaks.iter_mut().zip(&peaks) {
            *highest = (*highest).max(*peak);
        }
        rendering.push(buffer);
        cursor = end;
    }

    let skipped = pending.count();
    if skipped > 0 {
        debug!(target: LOG_TAG, "{skipped} writes past the last frame ignored");
    }
    Ok(rendering)
}

/// Writes a 16-bit stereo WAV file
pub fn write_wav(path: &Path, rendering: &Rendering) -> Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: rendering.rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in &rendering.samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()
}
