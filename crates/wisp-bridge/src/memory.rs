//! Guest memory access
//!
//! Bounds-checked reads over the guest's exported linear memory. The buffer
//! is resolved from the instance on every call: memory growth may relocate
//! it, so no slice outlives the store borrow it was taken from.

use std::sync::Arc;

use tracing::warn;
use wasmtime::{AsContextMut, Instance, Memory};

use crate::error::{BridgeError, BridgeResult};

/// Guest pointer type (32-bit address in WASM linear memory)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GuestPtr(pub u32);

impl GuestPtr {
    /// Pointer `bytes` further on, or `None` if the address wraps
    pub fn checked_offset(&self, bytes: u32) -> Option<Self> {
        self.0.checked_add(bytes).map(Self)
    }
}

/// Validate `offset..offset+len` against a buffer of `size` bytes
pub(crate) fn checked_range(
    offset: u32,
    len: u32,
    size: usize,
) -> BridgeResult<std::ops::Range<usize>> {
    let start = offset as usize;
    let end = start
        .checked_add(len as usize)
        .filter(|end| *end <= size)
        .ok_or(BridgeError::MemoryFault { offset, len, size })?;
    Ok(start..end)
}

/// View over a guest instance's exported linear memory.
///
/// Holds only the instance and the export name; the byte buffer itself is
/// looked up again for every access.
#[derive(Clone)]
pub struct MemoryView {
    instance: Instance,
    export: Arc<str>,
}

impl MemoryView {
    pub fn new(instance: Instance, export: &str) -> Self {
        Self {
            instance,
            export: Arc::from(export),
        }
    }

    /// Name of the memory export this view reads
    pub fn export_name(&self) -> &str {
        &self.export
    }

    fn resolve<S: AsContextMut>(&self, store: &mut S) -> BridgeResult<Memory> {
        self.instance
            .get_memory(&mut *store, &self.export)
            .ok_or_else(|| BridgeError::ExportNotFound(self.export.to_string()))
    }

    /// Current size of the guest buffer in bytes
    pub fn size<S: AsContextMut>(&self, store: &mut S) -> BridgeResult<usize> {
        let memory = self.resolve(store)?;
        Ok(memory.data_size(&*store))
    }

    /// Borrow `len` bytes at `offset`.
    ///
    /// The returned slice borrows the store, so it cannot survive a call back
    /// into the guest.
    pub fn slice<'s, S: AsContextMut>(
        &self,
        store: &'s mut S,
        offset: u32,
        len: u32,
    ) -> BridgeResult<&'s [u8]> {
        let memory = self.resolve(store)?;
        let data = memory.data(&*store);
        match checked_range(offset, len, data.len()) {
            Ok(range) => Ok(&data[range]),
            Err(e) => {
                warn!("Guest memory fault: {}", e);
                Err(e)
            }
        }
    }

    /// Read a little-endian `u32` at `offset`
    pub fn read_u32_le<S: AsContextMut>(&self, store: &mut S, offset: u32) -> BridgeResult<u32> {
        let bytes = self.slice(store, offset, 4)?;
        let mut word = [0u8; 4];
        word.copy_from_slice(bytes);
        Ok(u32::from_le_bytes(word))
    }

    /// Write a little-endian `u32` at `offset`
    pub fn write_u32_le<S: AsContextMut>(
        &self,
        store: &mut S,
        offset: u32,
        value: u32,
    ) -> BridgeResult<()> {
        self.write_bytes(store, offset, &value.to_le_bytes())
    }

    /// Copy `bytes` into guest memory at `offset`
    pub(crate) fn write_bytes<S: AsContextMut>(
        &self,
        store: &mut S,
        offset: u32,
        bytes: &[u8],
    ) -> BridgeResult<()> {
        let len = u32::try_from(bytes.len()).map_err(|_| BridgeError::MemoryFault {
            offset,
            len: u32::MAX,
            size: 0,
        })?;
        let memory = self.resolve(store)?;
        let data = memory.data_mut(&mut *store);
        let range = checked_range(offset, len, data.len())?;
        data[range].copy_from_slice(bytes);
        Ok(())
    }
}
