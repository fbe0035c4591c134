//! `wisp repl` command implementation

use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use wisp_bridge::{Bridge, BridgeError};

use crate::context::CliContext;
use crate::output::OutputFormat;
use crate::render::{Turn, format_turn};

/// Execute the `wisp repl` command
pub async fn run(ctx: &CliContext) -> anyhow::Result<()> {
    let mut bridge = ctx.load_bridge().await?;
    let mut history: Vec<Turn> = Vec::new();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            ":quit" | ":q" => break,
            ":history" => {
                for (index, turn) in history.iter().enumerate() {
                    println!("{}", format_turn(index, turn));
                }
                continue;
            }
            _ => {}
        }

        match step(&mut bridge, line) {
            Ok(turn) => {
                match ctx.output {
                    OutputFormat::Text => println!("{}", format_turn(history.len(), &turn)),
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string(&turn.report())?);
                    }
                }
                history.push(turn);
            }
            Err(BridgeError::GuestExit { code }) => {
                info!("Guest exited with code {}", code);
                break;
            }
            Err(e) => eprintln!("{} {}", "error:".red().bold(), e),
        }
    }

    debug!("REPL finished after {} turns", history.len());
    Ok(())
}

/// One read-eval-project turn
///
/// The read result is decoded before `eval` runs, while it is still live.
fn step(bridge: &mut Bridge, source: &str) -> Result<Turn, BridgeError> {
    let exp = bridge.read(source)?;
    let expression = bridge.project(exp)?;
    let raw = bridge.eval(exp)?;
    let value = bridge.project(raw)?;
    Ok(Turn {
        source: source.to_string(),
        exp,
        expression,
        raw,
        value,
    })
}
