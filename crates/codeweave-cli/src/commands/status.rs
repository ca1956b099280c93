//! Status command

use super::open_indexed;
use crate::app::{OutputFormat, ProjectArgs};
use crate::output;
use anyhow::Result;
use codeweave_core::Config;

pub fn run(args: ProjectArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let report = open_indexed(&args.path, config)?.verify()?;
    print!("{}", output::format_verify_report(&report, format));
    Ok(())
}
