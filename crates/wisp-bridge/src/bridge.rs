//! Bridge lifecycle
//!
//! One [`Bridge`] owns one guest instance: engine, store, the bound syscall
//! shim and the decoding context. Construction runs the whole bootstrap
//! (compile, link the shim, instantiate, bind, resolve the ABI) so a
//! `Bridge` value is always ready to use.

use std::sync::Arc;

use tracing::{debug, info, warn};
use wasmtime::{
    AsContextMut, Engine, Instance, Linker, Module, ResourceLimiter, Result as WasmtimeResult,
    Store, Val,
};

use crate::config::{BridgeConfig, GuestAbi, GuestLimits};
use crate::error::{BridgeError, BridgeResult};
use crate::memory::MemoryView;
use crate::projector::{DecodeOptions, DecodingContext, Projection, TaggedValue, View, typed_func};
use crate::shim::{ConsoleSink, ShimMetrics, SyscallShim};

/// Store limits enforced on guest memory and table growth
#[derive(Debug, Clone)]
pub struct StoreLimits {
    pub max_memory_bytes: u64,
    pub max_table_elements: u32,
}

impl From<&GuestLimits> for StoreLimits {
    fn from(limits: &GuestLimits) -> Self {
        Self {
            max_memory_bytes: limits.max_memory_bytes(),
            max_table_elements: limits.max_table_elements,
        }
    }
}

impl ResourceLimiter for StoreLimits {
    fn memory_growing(
        &mut self,
        current: usize,
        desired: usize,
        maximum: Option<usize>,
    ) -> WasmtimeResult<bool> {
        let max = maximum.unwrap_or(self.max_memory_bytes as usize);
        let allowed = desired <= max && desired <= self.max_memory_bytes as usize;
        if allowed {
            debug!("Guest memory growing {} -> {} bytes", current, desired);
        } else {
            warn!(
                "Guest memory growth to {} bytes denied (limit {})",
                desired, self.max_memory_bytes
            );
        }
        Ok(allowed)
    }

    fn table_growing(
        &mut self,
        _current: usize,
        desired: usize,
        maximum: Option<usize>,
    ) -> WasmtimeResult<bool> {
        let max = maximum.unwrap_or(self.max_table_elements as usize);
        Ok(desired <= max && desired <= self.max_table_elements as usize)
    }
}

/// Data kept in the wasmtime store
pub struct BridgeState {
    pub shim: SyscallShim,
    pub limits: StoreLimits,
}

fn shim_of(state: &mut BridgeState) -> &mut SyscallShim {
    &mut state.shim
}

/// A hosted Wisp guest
pub struct Bridge {
    id: String,
    store: Store<BridgeState>,
    instance: Instance,
    ctx: DecodingContext,
    abi: GuestAbi,
    options: DecodeOptions,
}

impl Bridge {
    /// Compile and bootstrap a guest from module bytes (binary or text).
    pub fn new(
        config: &BridgeConfig,
        bytes: &[u8],
        console: Arc<dyn ConsoleSink>,
    ) -> BridgeResult<Self> {
        let id = uuid::Uuid::now_v7().to_string();

        let mut engine_config = wasmtime::Config::new();
        engine_config.consume_fuel(config.limits.max_fuel.is_some());
        let engine =
            Engine::new(&engine_config).map_err(|e| BridgeError::Internal(e.to_string()))?;

        let module =
            Module::new(&engine, bytes).map_err(|e| BridgeError::Compilation(e.to_string()))?;
        info!("Bridge {} compiled guest module", id);

        let state = BridgeState {
            shim: SyscallShim::new(config.shim.clone(), console),
            limits: StoreLimits::from(&config.limits),
        };
        let mut store = Store::new(&engine, state);
        store.limiter(|state| &mut state.limits);
        if let Some(fuel) = config.limits.max_fuel {
            store
                .set_fuel(fuel)
                .map_err(|e| BridgeError::Internal(e.to_string()))?;
        }

        let mut linker = Linker::new(&engine);
        SyscallShim::link(&mut linker, shim_of)?;

        // Start functions run here, before the shim is bound
        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| match BridgeError::from_trap(e) {
                BridgeError::Execution(msg) => BridgeError::Instantiation(msg),
                other => other,
            })?;
        info!("Bridge {} instantiated guest", id);

        store
            .data()
            .shim
            .bind(MemoryView::new(instance, &config.abi.memory))?;
        let ctx = DecodingContext::resolve(&mut store, &instance, &config.abi)?;
        info!("Bridge {} bound syscall shim and resolved guest ABI", id);

        let mut bridge = Self {
            id,
            store,
            instance,
            ctx,
            abi: config.abi.clone(),
            options: config.decode.clamped(),
        };

        let init = bridge.abi.initialize.clone();
        if bridge.has_export(&init) {
            bridge.call(&init, &[])?;
            debug!("Bridge {} ran {}", bridge.id, init);
        }

        Ok(bridge)
    }

    /// Read the guest binary named by `config.guest` and bootstrap it
    pub fn load(config: &BridgeConfig, console: Arc<dyn ConsoleSink>) -> BridgeResult<Self> {
        let bytes = std::fs::read(&config.guest)?;
        Self::new(config, &bytes, console)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: DecodeOptions) {
        self.options = options.clamped();
    }

    pub fn shim_metrics(&self) -> &ShimMetrics {
        self.store.data().shim.metrics()
    }

    /// Code the guest passed to `proc_exit`, if it has exited
    pub fn exit_code(&self) -> Option<i32> {
        self.store.data().shim.exit_code()
    }

    /// Fuel left, when metering is enabled
    pub fn remaining_fuel(&self) -> Option<u64> {
        self.store.get_fuel().ok()
    }

    pub fn has_export(&mut self, name: &str) -> bool {
        self.instance.get_export(&mut self.store, name).is_some()
    }

    /// Parse `source` in the guest.
    ///
    /// The source bytes are copied into a buffer the guest allocates for
    /// them; this is the only host write outside the syscall shim.
    pub fn read(&mut self, source: &str) -> BridgeResult<TaggedValue> {
        let len = u32::try_from(source.len()).map_err(|_| {
            BridgeError::Internal(format!("source of {} bytes is too large", source.len()))
        })?;

        let alloc = typed_func::<_, u32, u32>(&mut self.store, &self.instance, &self.abi.alloc)?;
        let read =
            typed_func::<_, (u32, u32), u32>(&mut self.store, &self.instance, &self.abi.read)?;

        let ptr = alloc
            .call(&mut self.store, len)
            .map_err(BridgeError::from_trap)?;
        self.ctx
            .memory()
            .write_bytes(&mut self.store, ptr, source.as_bytes())?;

        let value = read
            .call(&mut self.store, (ptr, len))
            .map_err(BridgeError::from_trap)?;
        debug!("read {} bytes -> {}", len, TaggedValue(value));
        Ok(TaggedValue(value))
    }

    /// Evaluate `value` in the guest. May write to the console.
    pub fn eval(&mut self, value: TaggedValue) -> BridgeResult<TaggedValue> {
        let eval = typed_func::<_, u32, u32>(&mut self.store, &self.instance, &self.abi.eval)?;
        let result = eval
            .call(&mut self.store, value.raw())
            .map_err(BridgeError::from_trap)?;
        debug!("eval {} -> {}", value, TaggedValue(result));
        Ok(TaggedValue(result))
    }

    /// Read-only heap access for the rest of this host turn
    pub fn view(&mut self) -> View<'_, BridgeState> {
        View::new(self.store.as_context_mut(), &self.ctx)
    }

    /// Decode `value` with the bridge's decode options
    pub fn project(&mut self, value: TaggedValue) -> BridgeResult<Projection> {
        let options = self.options;
        self.view().decode(value, &options)
    }

    /// Call any exported function with `i32` parameters and results
    pub fn call(&mut self, name: &str, args: &[u32]) -> BridgeResult<Vec<u32>> {
        let func = self
            .instance
            .get_func(&mut self.store, name)
            .ok_or_else(|| BridgeError::ExportNotFound(name.to_string()))?;

        let params: Vec<Val> = args.iter().map(|a| Val::I32(*a as i32)).collect();
        let result_count = func.ty(&self.store).results().len();
        let mut results = vec![Val::I32(0); result_count];

        func.call(&mut self.store, &params, &mut results)
            .map_err(BridgeError::from_trap)?;

        results
            .into_iter()
            .map(|v| match v {
                Val::I32(n) => Ok(n as u32),
                other => Err(BridgeError::TypeMismatch {
                    expected: format!("i32 results from `{}`", name),
                    actual: format!("{:?}", other),
                }),
            })
            .collect()
    }
}
