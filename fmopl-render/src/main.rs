//! Renders OPL2/OPL3 register scripts to WAV files for listening tests and
//! golden output comparisons.

mod cli;
mod config;
mod render;

use std::error::Error;
use std::path::{Path, PathBuf};

use cli::CLIOptions;
use config::RenderScript;
use log::{info, warn};
use simplelog::TermLogger;

/// Directory under the user config dir holding the default script
const BASE_DIR: &str = "fmopl-render/";

fn main() -> Result<(), Box<dyn Error>> {
    let mut options: CLIOptions = argh::from_env();

    TermLogger::init(
        options.verbose.unwrap_or(log::LevelFilter::Info),
        simplelog::ConfigBuilder::default()
            .set_time_level(log::LevelFilter::Trace)
            .build(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let script_path = options.script.as_ref().map(PathBuf::from);
    let mut script = match &script_path {
        Some(path) => RenderScript::load_from(path)?,
        None => RenderScript::load()?,
    };
    script.sync_cli(&mut options);
    if options.save {
        match &script_path {
            Some(path) => script.write_to(path)?,
            None => script.write()?,
        }
    }

    let rendering = render::render(&script)?;
    let output = Path::new(&options.output);
    render::write_wav(output, &rendering)?;
    info!("Wrote {} frames to {:?}", rendering.frames(), output);

    for (voice, peak) in rendering.peaks.iter().enumerate().filter(|(_, p)| **p > 0) {
        info!("Voice {voice:2}: peak {peak}");
    }
    if rendering.overflows != [0, 0] {
        info!(
            "Timer overflows: A {}, B {}",
            rendering.overflows[0], rendering.overflows[1]
        );
    }
    if rendering.clipped > 0 {
        warn!("{} samples clipped", rendering.clipped);
    }
    Ok(())
}
