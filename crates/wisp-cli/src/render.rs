//! Terminal rendering of projected values
//!
//! Same list notation as `Projection`'s `Display`, with symbols highlighted
//! and fallback leaves in red.

use colored::Colorize;
use wisp_bridge::{Projection, TaggedValue};

use crate::output::ValueReport;

/// Render `value` with terminal colours
pub fn render(value: &Projection) -> String {
    let mut out = String::new();
    render_into(value, &mut out);
    out
}

fn render_into(value: &Projection, out: &mut String) {
    let Projection::Duo { car, cdr } = value else {
        out.push_str(&render_leaf(value));
        return;
    };

    out.push('(');
    render_into(car, out);
    let mut tail = cdr.as_ref();
    loop {
        match tail {
            Projection::Nil => break,
            Projection::Duo { car, cdr } => {
                out.push(' ');
                render_into(car, out);
                tail = cdr;
            }
            other => {
                out.push_str(" . ");
                render_into(other, out);
                break;
            }
        }
    }
    out.push(')');
}

fn render_leaf(leaf: &Projection) -> String {
    let text = leaf.to_string();
    match leaf {
        Projection::Sym { .. } => text.cyan().bold().to_string(),
        Projection::Nil | Projection::True => text.yellow().to_string(),
        other if other.is_fallback() => text.red().to_string(),
        _ => text,
    }
}

/// One read-eval turn kept by the REPL
#[derive(Debug, Clone)]
pub struct Turn {
    pub source: String,
    /// What the guest read from `source`
    pub exp: TaggedValue,
    pub expression: Projection,
    pub raw: TaggedValue,
    pub value: Projection,
}

impl Turn {
    pub fn report(&self) -> ValueReport {
        ValueReport {
            source: Some(self.source.clone()),
            expression: Some(self.expression.clone()),
            raw: self.raw,
            value: self.value.clone(),
        }
    }
}

/// `i  <exp> ↦ <val>`, both sides decoded
pub fn format_turn(index: usize, turn: &Turn) -> String {
    format!(
        "{}  {} ↦ {}",
        index.to_string().dimmed(),
        render(&turn.expression),
        render(&turn.value)
    )
}
