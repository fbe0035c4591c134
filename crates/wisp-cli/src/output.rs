//! Output formats for CLI commands

use serde::Serialize;
use wisp_bridge::{Projection, TaggedValue};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output for automation
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// A decoded value as printed by `eval` and `inspect`
#[derive(Debug, Serialize)]
pub struct ValueReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Decoded form of what the guest read from `source`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<Projection>,
    pub raw: TaggedValue,
    pub value: Projection,
}

impl ValueReport {
    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
