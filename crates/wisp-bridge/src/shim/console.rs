//! Host-visible output channels for guest console writes

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Guest stream a write was addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleStream {
    /// fd 1, the "info" channel
    Stdout,
    /// fd 2, the "warning" channel
    Stderr,
}

impl ConsoleStream {
    pub const STDOUT_FD: u32 = 1;
    pub const STDERR_FD: u32 = 2;

    pub fn from_fd(fd: u32) -> Option<Self> {
        match fd {
            Self::STDOUT_FD => Some(ConsoleStream::Stdout),
            Self::STDERR_FD => Some(ConsoleStream::Stderr),
            _ => None,
        }
    }
}

/// How guest bytes become host text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextDecoding {
    /// One char per byte (U+0000..=U+00FF)
    #[default]
    Latin1,
    /// UTF-8 with U+FFFD for invalid sequences
    Utf8Lossy,
}

impl TextDecoding {
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            TextDecoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
            TextDecoding::Utf8Lossy => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

/// Receiver of complete guest writes.
///
/// `emit` is called once per successful `fd_write`, with every segment
/// already concatenated.
pub trait ConsoleSink: Send + Sync {
    fn emit(&self, stream: ConsoleStream, bytes: &[u8]);
}

/// Routes stdout to `info!` and stderr to `warn!` under the `wisp::guest` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingConsole {
    decoding: TextDecoding,
}

impl TracingConsole {
    pub fn new(decoding: TextDecoding) -> Self {
        Self { decoding }
    }
}

impl ConsoleSink for TracingConsole {
    fn emit(&self, stream: ConsoleStream, bytes: &[u8]) {
        let text = self.decoding.decode(bytes);
        let text = text.strip_suffix('\n').unwrap_or(&text);
        match stream {
            ConsoleStream::Stdout => tracing::info!(target: "wisp::guest", "{}", text),
            ConsoleStream::Stderr => tracing::warn!(target: "wisp::guest", "{}", text),
        }
    }
}

/// One captured guest write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleRecord {
    pub stream: ConsoleStream,
    pub bytes: Vec<u8>,
}

/// Sink that keeps every write in memory, for front ends that render
/// guest output themselves
#[derive(Debug, Clone, Default)]
pub struct BufferedConsole {
    records: Arc<Mutex<Vec<ConsoleRecord>>>,
}

impl BufferedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ConsoleRecord> {
        self.records.lock().clone()
    }

    /// Remove and return everything captured so far
    pub fn take(&self) -> Vec<ConsoleRecord> {
        std::mem::take(&mut *self.records.lock())
    }

    /// Concatenated bytes written to `stream`
    pub fn contents(&self, stream: ConsoleStream) -> Vec<u8> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.stream == stream)
            .flat_map(|r| r.bytes.iter().copied())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl ConsoleSink for BufferedConsole {
    fn emit(&self, stream: ConsoleStream, bytes: &[u8]) {
        self.records.lock().push(ConsoleRecord {
            stream,
            bytes: bytes.to_vec(),
        });
    }
}
