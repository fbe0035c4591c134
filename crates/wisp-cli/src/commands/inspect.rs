//! `wisp inspect` command implementation

use anyhow::Context;
use wisp_bridge::TaggedValue;

use crate::commands::print_report;
use crate::context::CliContext;
use crate::output::ValueReport;

/// Execute the `wisp inspect` command
pub async fn run(ctx: &CliContext, raw: &str) -> anyhow::Result<()> {
    let value = parse_raw(raw)?;
    let mut bridge = ctx.load_bridge().await?;
    let projection = bridge.project(value)?;

    print_report(
        &ValueReport {
            source: None,
            expression: None,
            raw: value,
            value: projection,
        },
        ctx.output,
    )
}

/// Parse a decimal or `0x`-prefixed hex word
pub fn parse_raw(raw: &str) -> anyhow::Result<TaggedValue> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
        None => raw.replace('_', "").parse::<u32>(),
    };
    parsed
        .map(TaggedValue)
        .with_context(|| format!("Invalid raw value: {}", raw))
}
