//! Shared setup for every command: configuration and the loaded bridge

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use wisp_bridge::{Bridge, BridgeConfig, TracingConsole};

use crate::cli::Cli;
use crate::output::OutputFormat;

pub struct CliContext {
    pub config: BridgeConfig,
    pub output: OutputFormat,
}

impl CliContext {
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => BridgeConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => BridgeConfig::default(),
        };
        if let Some(guest) = &cli.guest {
            config.guest = guest.clone();
        }

        Ok(Self {
            config,
            output: cli.output.unwrap_or_default(),
        })
    }

    pub fn guest_path(&self) -> &PathBuf {
        &self.config.guest
    }

    /// Read the guest binary and bootstrap a bridge around it
    pub async fn load_bridge(&self) -> anyhow::Result<Bridge> {
        let path = self.guest_path();
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read guest {}", path.display()))?;
        debug!("Loaded {} bytes from {}", bytes.len(), path.display());

        let console = Arc::new(TracingConsole::new(self.config.shim.console_encoding));
        Bridge::new(&self.config, &bytes, console)
            .with_context(|| format!("Failed to start guest {}", path.display()))
    }
}
