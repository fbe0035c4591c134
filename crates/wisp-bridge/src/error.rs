//! Bridge error types

use thiserror::Error;

/// Errors raised by the host side of the Wisp bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Memory access out of bounds: offset={offset}, len={len}, memory size={size}")]
    MemoryFault { offset: u32, len: u32, size: usize },

    #[error("Invalid UTF-8 in guest string (handle={handle:#x}, {len} bytes)")]
    Encoding { handle: u32, len: u32 },

    #[error("Syscall invoked before the guest instance was bound")]
    Unbound,

    #[error("Guest instance is already bound")]
    AlreadyBound,

    #[error("Guest exited with code {code}")]
    GuestExit { code: i32 },

    #[error("Tag `{0}` has no row accessor")]
    MissingRow(String),

    #[error("Failed to compile guest module: {0}")]
    Compilation(String),

    #[error("Failed to instantiate guest module: {0}")]
    Instantiation(String),

    #[error("Guest execution failed: {0}")]
    Execution(String),

    #[error("Export not found: {0}")]
    ExportNotFound(String),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Bridge result type
pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    /// Whether the error means guest memory can no longer be trusted
    pub fn is_memory_fault(&self) -> bool {
        matches!(self, BridgeError::MemoryFault { .. })
    }

    /// Recover a bridge error carried inside a wasmtime trap.
    ///
    /// Host functions trap with a `BridgeError` payload; anything else is
    /// reported as a plain execution failure.
    pub(crate) fn from_trap(err: wasmtime::Error) -> Self {
        match err.downcast_ref::<BridgeError>() {
            Some(BridgeError::GuestExit { code }) => BridgeError::GuestExit { code: *code },
            Some(BridgeError::Unbound) => BridgeError::Unbound,
            Some(BridgeError::MemoryFault { offset, len, size }) => BridgeError::MemoryFault {
                offset: *offset,
                len: *len,
                size: *size,
            },
            _ => BridgeError::Execution(format!("{:#}", err)),
        }
    }
}
