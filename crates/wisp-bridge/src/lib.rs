//! Wisp host bridge
//!
//! Hosts a Wisp interpreter compiled to WebAssembly and lets a host-side
//! consumer read, evaluate and inspect guest values:
//! - a minimal `wasi_snapshot_preview1` shim routing console writes into
//!   the host logger
//! - bounds-checked views over guest linear memory
//! - a projector decoding tagged guest values into renderable trees
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                       Host consumer                       │
//! │        read(source) / eval(value) / project(value)        │
//! └─────────────────────────────┬─────────────────────────────┘
//!                               │
//! ┌─────────────────────────────▼─────────────────────────────┐
//! │                          Bridge                           │
//! │  ┌──────────────┐  ┌───────────────┐  ┌───────────────┐   │
//! │  │ SyscallShim  │  │  MemoryView   │  │ValueProjector │   │
//! │  │ fd_write ... │  │ bounds checks │  │ tag/row/str   │   │
//! │  └──────┬───────┘  └───────┬───────┘  └───────┬───────┘   │
//! └─────────┼──────────────────┼──────────────────┼───────────┘
//!           │ imports          │ memory           │ exports
//! ┌─────────▼──────────────────▼──────────────────▼───────────┐
//! │                 Guest instance (wasmtime)                 │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wisp_bridge::{Bridge, BridgeConfig, TracingConsole};
//!
//! # fn main() -> wisp_bridge::BridgeResult<()> {
//! let config = BridgeConfig::new("wisp.wasm");
//! let console = Arc::new(TracingConsole::new(config.shim.console_encoding));
//! let mut bridge = Bridge::load(&config, console)?;
//!
//! let value = bridge.read("(car '(1 2))")?;
//! let result = bridge.eval(value)?;
//! println!("{}", bridge.project(result)?);
//! # Ok(())
//! # }
//! ```

mod bridge;
pub mod config;
mod error;
pub mod memory;
pub mod projector;
pub mod shim;

pub use bridge::{Bridge, BridgeState, StoreLimits};
pub use config::{BridgeConfig, GuestAbi, GuestLimits};
pub use error::{BridgeError, BridgeResult};
pub use memory::{GuestPtr, MemoryView};
pub use projector::{
    DecodeOptions, DecodingContext, HeapAccess, MAX_DECODE_DEPTH, Projection, Row, Sentinels,
    StringHandle, Tag, TagTable, TaggedValue, ValueProjector, View,
};
pub use shim::{
    BufferedConsole, ConsoleRecord, ConsoleSink, ConsoleStream, Errno, ShimConfig, ShimMetrics,
    StubPolicy, SyscallShim, TextDecoding, TracingConsole,
};
