//! Render scripts: chip setup plus a timed list of register writes.

use crate::{BASE_DIR, CLIOptions};
use dirs::config_dir;
use fmopl::{ChipConfig, ChipType};
use log::{info, warn};
use nanoserde::{DeRon, SerRon};
use std::{
    fs::{self, create_dir_all},
    io,
    path::{Path, PathBuf},
    str::FromStr,
};

const LOG_TAG: &str = "RenderScript";

fn get_script_file() -> io::Result<PathBuf> {
    let mut dir = config_dir().ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, format!("{LOG_TAG}: no user config dir"))
    })?;
    dir.push(BASE_DIR);
    if !dir.exists() {
        create_dir_all(&dir)?;
    }
    dir.push("script.ron");
    Ok(dir)
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, DeRon, SerRon)]
pub enum Variant {
    /// YM3812
    Opl2,
    /// YMF262
    Opl3,
}

impl Default for Variant {
    fn default() -> Self {
        Self::Opl3
    }
}

impl FromStr for Variant {
    type Err = io::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "opl2" | "ym3812" => Ok(Self::Opl2),
            "opl3" | "ymf262" => Ok(Self::Opl3),
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "Invalid chip type",
            )),
        }
    }
}

impl From<Variant> for ChipType {
    fn from(variant: Variant) -> Self {
        match variant {
            Variant::Opl2 => ChipType::Opl2,
            Variant::Opl3 => ChipType::Opl3,
        }
    }
}

/// One register write, applied before sample `at` is generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, DeRon, SerRon)]
pub struct ScriptWrite {
    pub at: u32,
    pub reg: u16,
    pub value: u8,
}

#[derive(Debug, Clone, PartialEq, DeRon, SerRon)]
pub struct RenderScript {
    pub chip: Variant,
    /// Master clock, 0 picks the chip's usual clock
    #[nserde(default)]
    pub clock: u32,
    pub rate: u32,
    pub frames: u32,
    pub writes: Vec<ScriptWrite>,
}

impl Default for RenderScript {
    /// One second of a plucked organ tone on channel 0, released half way
    fn default() -> Self {
        let rate = 44_100;
        let at = |at, reg, value| ScriptWrite { at, reg, value };
        RenderScript {
            chip: Variant::Opl3,
            clock: 0,
            rate,
            frames: rate,
            writes: vec![
                at(0, 0x105, 0x01),
                at(0, 0x20, 0x21),
                at(0, 0x23, 0x21),
                at(0, 0x40, 0x1a),
                at(0, 0x43, 0x00),
                at(0, 0x60, 0xf4),
                at(0, 0x63, 0xf3),
                at(0, 0x80, 0x24),
                at(0, 0x83, 0x46),
                at(0, 0xc0, 0x36),
                at(0, 0xa0, 0x44),
                at(0, 0xb0, 0x32),
                at(rate / 2, 0xb0, 0x12),
            ],
        }
    }
}

impl RenderScript {
    /// Reads the user script, creating the default one if it is missing or
    /// can't be parsed
    pub fn load() -> io::Result<Self> {
        let path = get_script_file()?;
        if path.exists() {
            match Self::load_from(&path) {
                Ok(script) => return Ok(script),
                Err(e) => warn!(target: LOG_TAG, "Could not read {path:?}: {e}, recreating script"),
            }
        }
        let script = RenderScript::default();
        script.write_to(&path)?;
        info!(target: LOG_TAG, "Created default render script {path:?}");
        Ok(script)
    }

    pub fn load_from(path: &Path) -> io::Result<Self> {
        let data = fs::read_to_string(path)?;
        let script = Self::parse(&data)?;
        info!(target: LOG_TAG, "Loaded render script {path:?}");
        Ok(script)
    }

    pub fn parse(data: &str) -> io::Result<Self> {
        RenderScript::deserialize_ron(data)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
    }

    /// Writes back to the user script
    pub fn write(&self) -> io::Result<()> {
        self.write_to(&get_script_file()?)
    }

    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.serialize_ron())
    }

    pub fn chip_config(&self) -> ChipConfig {
        let chip_type = ChipType::from(self.chip);
        let clock_hz = match self.clock {
            0 => chip_type.default_clock(),
            clock => clock,
        };
        ChipConfig {
            chip_type,
            clock_hz,
            rate_hz: self.rate,
        }
    }

    /// Sync the CLI options and the script with each other
    pub fn sync_cli(&mut self, cli: &mut CLIOptions) {
        info!(target: LOG_TAG, "Checking CLI options");

        if let Some(chip) = cli.chip {
            if chip != self.chip {
                self.chip = chip;
                info!(target: LOG_TAG, "Chip changed to: {chip:?}");
            }
        } else {
            cli.chip = Some(self.chip);
        }

        if let Some(clock) = cli.clock {
            self.clock = clock;
        } else {
            cli.clock = Some(self.clock);
        }

        if let Some(rate) = cli.rate.filter(|&r| r != 0) {
            self.rate = rate;
        } else {
            cli.rate = Some(self.rate);
        }

        if let Some(frames) = cli.frames {
            self.frames = frames;
        } else {
            cli.frames = Some(self.frames);
        }
    }
}
