use argh::FromArgs;

use crate::config::Variant;

/// Render an OPL2/OPL3 register script to a WAV file
#[derive(Debug, Clone, FromArgs)]
pub struct CLIOptions {
    /// verbose level: off, error, warn, info, debug
    #[argh(option)]
    pub verbose: Option<log::LevelFilter>,
    /// path to a RON render script, the user script is used if not given
    #[argh(option)]
    pub script: Option<String>,
    /// path of the WAV file to write
    #[argh(option, short = 'o', default = "String::from(\"fmopl.wav\")")]
    pub output: String,
    /// chip to emulate <opl2, opl3>
    #[argh(option)]
    pub chip: Option<Variant>,
    /// master clock in Hz, 0 for the chip's usual clock
    #[argh(option)]
    pub clock: Option<u32>,
    /// output sample rate in Hz
    #[argh(option)]
    pub rate: Option<u32>,
    /// number of stereo frames to render
    #[argh(option)]
    pub frames: Option<u32>,
    /// write the script back with the CLI overrides applied
    #[argh(switch)]
    pub save: bool,
}
