//! Syscall shim
//!
//! The slice of `wasi_snapshot_preview1` a single-threaded guest with no
//! filesystem needs: vectored writes to stdout/stderr, `proc_exit`, and
//! stubs for the descriptor calls the guest links against but whose effects
//! do not matter here.
//!
//! The shim is created before the guest instance exists (its call table is
//! the guest's import set) and the instance is bound into it right after
//! instantiation:
//!
//! ```text
//! SyscallShim::new ──► SyscallShim::link(linker) ──► linker.instantiate
//!                                                        │
//!          shim.bind(MemoryView::new(instance)) ◄────────┘
//! ```
//!
//! Every handler checks the binding first; a call that arrives before it is
//! a fatal usage error and traps.

mod console;
mod errno;

pub use console::{
    BufferedConsole, ConsoleRecord, ConsoleSink, ConsoleStream, TextDecoding, TracingConsole,
};
pub use errno::{Errno, StubPolicy};

use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, trace, warn};
use wasmtime::{AsContextMut, Caller, Linker};

use crate::error::{BridgeError, BridgeResult};
use crate::memory::{GuestPtr, MemoryView};

/// Import module name the guest links the shim under
pub const WASI_MODULE: &str = "wasi_snapshot_preview1";

/// Size of one iovec entry: `{ ptr: u32, len: u32 }`
const IOVEC_SIZE: u32 = 8;

/// Shim configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShimConfig {
    /// Status returned by every stub handler
    pub stub_policy: StubPolicy,
    /// Text decoding for console output
    pub console_encoding: TextDecoding,
}

/// Shim counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShimMetrics {
    pub writes: u64,
    pub bytes_written: u64,
    pub stub_calls: u64,
    pub faults: u64,
    pub bad_descriptors: u64,
}

/// Host implementation of the guest's syscall imports
pub struct SyscallShim {
    config: ShimConfig,
    console: Arc<dyn ConsoleSink>,
    binding: OnceLock<MemoryView>,
    metrics: ShimMetrics,
    exit_code: Option<i32>,
}

impl SyscallShim {
    pub fn new(config: ShimConfig, console: Arc<dyn ConsoleSink>) -> Self {
        Self {
            config,
            console,
            binding: OnceLock::new(),
            metrics: ShimMetrics::default(),
            exit_code: None,
        }
    }

    /// Bind the instantiated guest. Only the first call succeeds.
    pub fn bind(&self, view: MemoryView) -> BridgeResult<()> {
        self.binding
            .set(view)
            .map_err(|_| BridgeError::AlreadyBound)?;
        debug!("Syscall shim bound to guest instance");
        Ok(())
    }

    pub fn is_bound(&self) -> bool {
        self.binding.get().is_some()
    }

    /// The bound guest memory, or `Unbound` if instantiation has not finished
    pub fn bound(&self) -> BridgeResult<&MemoryView> {
        self.binding.get().ok_or(BridgeError::Unbound)
    }

    pub fn config(&self) -> &ShimConfig {
        &self.config
    }

    pub fn metrics(&self) -> &ShimMetrics {
        &self.metrics
    }

    /// Code passed to `proc_exit`, if the guest has called it
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Register the call table on `linker`.
    ///
    /// `get` projects the shim out of the store data, so the shim can live
    /// inside whatever state the embedder keeps in its store.
    pub fn link<T: 'static>(
        linker: &mut Linker<T>,
        get: fn(&mut T) -> &mut SyscallShim,
    ) -> BridgeResult<()> {
        linker
            .func_wrap(
                WASI_MODULE,
                "fd_write",
                move |mut caller: Caller<'_, T>,
                      fd: i32,
                      iovs: i32,
                      iovs_len: i32,
                      nwritten: i32|
                      -> wasmtime::Result<i32> {
                    let errno = fd_write(
                        &mut caller,
                        get,
                        fd as u32,
                        iovs as u32,
                        iovs_len as u32,
                        nwritten as u32,
                    )
                    .map_err(wasmtime::Error::new)?;
                    Ok(errno.raw())
                },
            )
            .map_err(|e| BridgeError::Internal(e.to_string()))?;

        linker
            .func_wrap(
                WASI_MODULE,
                "proc_exit",
                move |mut caller: Caller<'_, T>, code: i32| -> wasmtime::Result<()> {
                    let shim = get(caller.data_mut());
                    shim.bound().map_err(wasmtime::Error::new)?;
                    shim.exit_code = Some(code);
                    info!("Guest called proc_exit({})", code);
                    Err(wasmtime::Error::new(BridgeError::GuestExit { code }))
                },
            )
            .map_err(|e| BridgeError::Internal(e.to_string()))?;

        linker
            .func_wrap(
                WASI_MODULE,
                "fd_close",
                move |mut caller: Caller<'_, T>, fd: i32| -> wasmtime::Result<i32> {
                    stub(&mut caller, get, "fd_close", fd)
                },
            )
            .map_err(|e| BridgeError::Internal(e.to_string()))?;

        linker
            .func_wrap(
                WASI_MODULE,
                "fd_read",
                move |mut caller: Caller<'_, T>,
                      fd: i32,
                      _iovs: i32,
                      _iovs_len: i32,
                      _nread: i32|
                      -> wasmtime::Result<i32> {
                    stub(&mut caller, get, "fd_read", fd)
                },
            )
            .map_err(|e| BridgeError::Internal(e.to_string()))?;

        linker
            .func_wrap(
                WASI_MODULE,
                "path_open",
                move |mut caller: Caller<'_, T>,
                      dirfd: i32,
                      _dirflags: i32,
                      _path: i32,
                      _path_len: i32,
                      _oflags: i32,
                      _rights_base: i64,
                      _rights_inheriting: i64,
                      _fdflags: i32,
                      _opened_fd: i32|
                      -> wasmtime::Result<i32> {
                    stub(&mut caller, get, "path_open", dirfd)
                },
            )
            .map_err(|e| BridgeError::Internal(e.to_string()))?;

        linker
            .func_wrap(
                WASI_MODULE,
                "fd_prestat_get",
                move |mut caller: Caller<'_, T>, fd: i32, _buf: i32| -> wasmtime::Result<i32> {
                    stub(&mut caller, get, "fd_prestat_get", fd)
                },
            )
            .map_err(|e| BridgeError::Internal(e.to_string()))?;

        linker
            .func_wrap(
                WASI_MODULE,
                "fd_prestat_dir_name",
                move |mut caller: Caller<'_, T>,
                      fd: i32,
                      _path: i32,
                      _path_len: i32|
                      -> wasmtime::Result<i32> {
                    stub(&mut caller, get, "fd_prestat_dir_name", fd)
                },
            )
            .map_err(|e| BridgeError::Internal(e.to_string()))?;

        linker
            .func_wrap(
                WASI_MODULE,
                "fd_filestat_get",
                move |mut caller: Caller<'_, T>, fd: i32, _buf: i32| -> wasmtime::Result<i32> {
                    stub(&mut caller, get, "fd_filestat_get", fd)
                },
            )
            .map_err(|e| BridgeError::Internal(e.to_string()))?;

        Ok(())
    }
}

/// Shared body of the no-op handlers. Touches no guest memory.
fn stub<T: 'static>(
    caller: &mut Caller<'_, T>,
    get: fn(&mut T) -> &mut SyscallShim,
    name: &str,
    fd: i32,
) -> wasmtime::Result<i32> {
    let shim = get(caller.data_mut());
    shim.bound().map_err(wasmtime::Error::new)?;
    shim.metrics.stub_calls += 1;
    let errno = shim.config.stub_policy.errno();
    trace!("{}(fd={}) stub -> {}", name, fd, errno);
    Ok(errno.raw())
}

/// `fd_write`: gather every segment, write the total, then emit once.
///
/// Nothing reaches the console unless all segments were readable and the
/// out-parameter was written.
fn fd_write<T: 'static>(
    caller: &mut Caller<'_, T>,
    get: fn(&mut T) -> &mut SyscallShim,
    fd: u32,
    iovs: u32,
    iovs_len: u32,
    nwritten: u32,
) -> BridgeResult<Errno> {
    let view = get(caller.data_mut()).bound()?.clone();

    let Some(stream) = ConsoleStream::from_fd(fd) else {
        warn!("fd_write on unsupported descriptor {}", fd);
        get(caller.data_mut()).metrics.bad_descriptors += 1;
        return Ok(Errno::BadFileDescriptor);
    };

    let gathered = gather_iovecs(&view, &mut *caller, iovs, iovs_len).and_then(|(buf, total)| {
        view.write_u32_le(&mut *caller, nwritten, total)
            .map_err(|_| Errno::Fault)?;
        Ok((buf, total))
    });

    let shim = get(caller.data_mut());
    match gathered {
        Ok((buffer, total)) => {
            debug!(
                "fd_write fd={} segments={} bytes={}",
                fd, iovs_len, total
            );
            shim.metrics.writes += 1;
            shim.metrics.bytes_written += u64::from(total);
            if !buffer.is_empty() {
                shim.console.emit(stream, &buffer);
            }
            Ok(Errno::Success)
        }
        Err(errno) => {
            warn!("fd_write fd={} aborted: {}", fd, errno);
            shim.metrics.faults += 1;
            Ok(errno)
        }
    }
}

/// Concatenate the bytes of `count` iovecs starting at `table`.
///
/// Returns the buffer and the summed segment lengths.
fn gather_iovecs<S: AsContextMut>(
    view: &MemoryView,
    store: &mut S,
    table: u32,
    count: u32,
) -> Result<(Vec<u8>, u32), Errno> {
    let mut buffer = Vec::new();
    let mut total: u32 = 0;

    for i in 0..count {
        let entry = i
            .checked_mul(IOVEC_SIZE)
            .and_then(|off| GuestPtr(table).checked_offset(off))
            .ok_or(Errno::Fault)?;
        let len_field = entry.checked_offset(4).ok_or(Errno::Fault)?;

        let ptr = view
            .read_u32_le(store, entry.0)
            .map_err(|_| Errno::Fault)?;
        let len = view
            .read_u32_le(store, len_field.0)
            .map_err(|_| Errno::Fault)?;

        let bytes = view.slice(store, ptr, len).map_err(|_| Errno::Fault)?;
        buffer.extend_from_slice(bytes);
        total = total.checked_add(len).ok_or(Errno::InvalidArgument)?;
    }

    Ok((buffer, total))
}
