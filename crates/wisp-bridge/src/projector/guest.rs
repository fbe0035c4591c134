//! [`HeapAccess`] over a live guest instance

use tracing::{debug, warn};
use wasmtime::{AsContextMut, Instance, StoreContextMut, TypedFunc, Val, WasmParams, WasmResults};

use super::tag::{Row, Sentinels, StringHandle, Tag, TagTable, TaggedValue};
use super::{DecodeOptions, HeapAccess, Projection, ValueProjector};
use crate::config::GuestAbi;
use crate::error::{BridgeError, BridgeResult};
use crate::memory::{GuestPtr, MemoryView};

/// Guest exports the projector needs, resolved once after binding
#[derive(Clone)]
pub struct DecodingContext {
    memory: MemoryView,
    tag_of: TypedFunc<u32, u32>,
    row: TypedFunc<(u32, u32), u32>,
    string: TypedFunc<u32, u32>,
    tags: TagTable,
    sentinels: Sentinels,
}

impl DecodingContext {
    /// Look up the accessors, tag codes and sentinels named by `abi`.
    ///
    /// A missing tag-code global only disables that tag: values carrying it
    /// decode as unknown. Missing accessors or sentinels are errors.
    pub fn resolve<S: AsContextMut>(
        store: &mut S,
        instance: &Instance,
        abi: &GuestAbi,
    ) -> BridgeResult<Self> {
        let tag_of = typed_func(store, instance, &abi.tag_of)?;
        let row = typed_func(store, instance, &abi.row)?;
        let string = typed_func(store, instance, &abi.string)?;

        let mut tags = TagTable::new();
        for (tag, name) in [
            (Tag::Int, &abi.tag_int),
            (Tag::Sys, &abi.tag_sys),
            (Tag::Duo, &abi.tag_duo),
            (Tag::Sym, &abi.tag_sym),
        ] {
            match global_u32(store, instance, name) {
                Ok(code) => tags.insert(tag, code),
                Err(BridgeError::ExportNotFound(_)) => {
                    warn!("Guest exports no code for tag {} ({})", tag, name);
                }
                Err(e) => return Err(e),
            }
        }

        if tags.is_empty() {
            warn!("Guest exports no tag codes; every value will decode as unknown");
        }

        let sentinels = Sentinels {
            nil: TaggedValue(global_u32(store, instance, &abi.sys_nil)?),
            t: TaggedValue(global_u32(store, instance, &abi.sys_t)?),
        };
        debug!(
            "Resolved {} tag codes, NIL={} T={}",
            tags.len(),
            sentinels.nil,
            sentinels.t
        );

        Ok(Self {
            memory: MemoryView::new(*instance, &abi.memory),
            tag_of,
            row,
            string,
            tags,
            sentinels,
        })
    }

    pub fn memory(&self) -> &MemoryView {
        &self.memory
    }

    pub fn tags(&self) -> &TagTable {
        &self.tags
    }
}

/// Typed handle to an exported function
pub(crate) fn typed_func<S, Params, Results>(
    store: &mut S,
    instance: &Instance,
    name: &str,
) -> BridgeResult<TypedFunc<Params, Results>>
where
    S: AsContextMut,
    Params: WasmParams,
    Results: WasmResults,
{
    let func = instance
        .get_func(&mut *store, name)
        .ok_or_else(|| BridgeError::ExportNotFound(name.to_string()))?;
    func.typed::<Params, Results>(&*store)
        .map_err(|e| BridgeError::TypeMismatch {
            expected: format!("signature of `{}`", name),
            actual: e.to_string(),
        })
}

/// Value of an exported `i32` global
fn global_u32<S: AsContextMut>(store: &mut S, instance: &Instance, name: &str) -> BridgeResult<u32> {
    let global = instance
        .get_global(&mut *store, name)
        .ok_or_else(|| BridgeError::ExportNotFound(name.to_string()))?;
    match global.get(&mut *store) {
        Val::I32(v) => Ok(v as u32),
        other => Err(BridgeError::TypeMismatch {
            expected: format!("i32 global `{}`", name),
            actual: format!("{:?}", other),
        }),
    }
}

/// Read-only window onto the guest heap for the duration of one host turn.
///
/// Holds the store borrow, so no guest call can happen while a `View` is
/// alive except through the accessors it makes itself.
pub struct View<'a, T: 'static> {
    store: StoreContextMut<'a, T>,
    ctx: &'a DecodingContext,
}

impl<'a, T: 'static> View<'a, T> {
    pub fn new(store: StoreContextMut<'a, T>, ctx: &'a DecodingContext) -> Self {
        Self { store, ctx }
    }

    /// Decode `value` into a [`Projection`]
    pub fn decode(
        &mut self,
        value: TaggedValue,
        options: &DecodeOptions,
    ) -> BridgeResult<Projection> {
        ValueProjector::new(*options).decode(self, value)
    }

    pub fn memory_size(&mut self) -> BridgeResult<usize> {
        self.ctx.memory.size(&mut self.store)
    }

    pub fn read_u32_le(&mut self, offset: u32) -> BridgeResult<u32> {
        self.ctx.memory.read_u32_le(&mut self.store, offset)
    }

    /// Copy `len` bytes at `offset` out of the guest
    pub fn read_bytes(&mut self, offset: u32, len: u32) -> BridgeResult<Vec<u8>> {
        Ok(self.ctx.memory.slice(&mut self.store, offset, len)?.to_vec())
    }
}

impl<T: 'static> HeapAccess for View<'_, T> {
    fn tag_of(&mut self, value: TaggedValue) -> BridgeResult<Tag> {
        let code = self
            .ctx
            .tag_of
            .call(&mut self.store, value.raw())
            .map_err(BridgeError::from_trap)?;
        Ok(self.ctx.tags.classify(code))
    }

    fn row(&mut self, tag: Tag, value: TaggedValue) -> BridgeResult<Row> {
        let width = tag
            .row_width()
            .ok_or_else(|| BridgeError::MissingRow(tag.to_string()))?;
        let code = self
            .ctx
            .tags
            .code_of(tag)
            .ok_or_else(|| BridgeError::MissingRow(tag.to_string()))?;

        let ptr = self
            .ctx
            .row
            .call(&mut self.store, (code, value.raw()))
            .map_err(BridgeError::from_trap)?;

        let bytes = self.ctx.memory.slice(&mut self.store, ptr, width * 4)?;
        let cells = bytes
            .chunks_exact(4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .collect();
        Ok(Row::new(tag, cells))
    }

    fn resolve_string(&mut self, handle: StringHandle) -> BridgeResult<String> {
        let ptr = self
            .ctx
            .string
            .call(&mut self.store, handle.0)
            .map_err(BridgeError::from_trap)?;
        let len = self.ctx.memory.read_u32_le(&mut self.store, ptr)?;
        let Some(start) = GuestPtr(ptr).checked_offset(4) else {
            let size = self.ctx.memory.size(&mut self.store)?;
            return Err(BridgeError::MemoryFault {
                offset: ptr,
                len: 4,
                size,
            });
        };

        let bytes = self.ctx.memory.slice(&mut self.store, start.0, len)?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| BridgeError::Encoding {
                handle: handle.0,
                len,
            })
    }

    fn sentinels(&self) -> Sentinels {
        self.ctx.sentinels
    }
}
