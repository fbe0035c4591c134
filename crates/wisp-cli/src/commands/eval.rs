//! `wisp eval` command implementation

use crate::commands::print_report;
use crate::context::CliContext;
use crate::output::ValueReport;

/// Execute the `wisp eval` command
pub async fn run(ctx: &CliContext, source: &str) -> anyhow::Result<()> {
    let mut bridge = ctx.load_bridge().await?;

    let exp = bridge.read(source)?;
    let expression = bridge.project(exp)?;
    let result = bridge.eval(exp)?;
    let value = bridge.project(result)?;

    print_report(
        &ValueReport {
            source: Some(source.to_string()),
            expression: Some(expression),
            raw: result,
            value,
        },
        ctx.output,
    )
}
