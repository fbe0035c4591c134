//! CLI command implementations

pub mod eval;
pub mod inspect;
pub mod repl;

use crate::output::{OutputFormat, ValueReport};
use crate::render::render;

/// Print a decoded value in the requested format
pub(crate) fn print_report(report: &ValueReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => println!("{}", render(&report.value)),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }
    Ok(())
}
