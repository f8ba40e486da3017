use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::context::PipelineContext;
use super::surface::BindOutcome;
use crate::config::BridgeConfig;
use crate::custom_filter::CustomFilter;
use crate::engine::{Engine, PipelineState, TensorsData, TensorsInfo};
use crate::error::{BridgeError, Result};
use crate::foreign::ForeignRuntime;

/// Opaque pipeline handle as stored on the foreign side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextHandle(u64);

impl ContextHandle {
    pub fn as_raw(self) -> u64 {
        self.0
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

/// Opaque custom filter handle as stored on the foreign side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterHandle(u64);

impl FilterHandle {
    pub fn as_raw(self) -> u64 {
        self.0
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

/// Caller-facing entry point for every bridge operation.
///
/// Handles are resolved through a guarded table, so a stale or made-up
/// handle is rejected instead of dereferenced. Control operations log
/// their failure and report `false`.
pub struct PipelineManager<E: Engine, R: ForeignRuntime> {
    engine: Arc<E>,
    runtime: Arc<R>,
    config: BridgeConfig,
    next_handle: AtomicU64,
    contexts: RwLock<HashMap<ContextHandle, Arc<PipelineContext<E, R>>>>,
    filters: RwLock<HashMap<FilterHandle, Arc<CustomFilter<E, R>>>>,
}

impl<E: Engine, R: ForeignRuntime> PipelineManager<E, R> {
    pub fn new(engine: Arc<E>, runtime: Arc<R>, config: BridgeConfig) -> Self {
        Self {
            engine,
            runtime,
            config,
            next_handle: AtomicU64::new(1),
            contexts: RwLock::new(HashMap::new()),
            filters: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn allocate(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    pub fn context(&self, handle: ContextHandle) -> Option<Arc<PipelineContext<E, R>>> {
        self.contexts.read().get(&handle).cloned()
    }

    pub fn pipeline_count(&self) -> usize {
        self.contexts.read().len()
    }

    fn with_context<T>(
        &self,
        handle: ContextHandle,
        f: impl FnOnce(&PipelineContext<E, R>) -> Result<T>,
    ) -> Result<T> {
        let context = self.context(handle).ok_or_else(|| {
            BridgeError::InvalidArgument(format!("unknown pipeline handle {}", handle.as_raw()))
        })?;
        f(&context)
    }

    fn report(&self, op: &str, result: Result<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                log::error!("{} failed: {}", op, e);
                false
            }
        }
    }

    // ----- Pipeline lifecycle -----

    pub fn construct_pipeline(
        &self,
        description: &str,
        instance: R::Instance,
        want_state_cb: bool,
    ) -> Result<ContextHandle> {
        let context = PipelineContext::construct(
            self.engine.clone(),
            self.runtime.clone(),
            &self.config,
            description,
            instance,
            want_state_cb,
        )?;
        let handle = ContextHandle(self.allocate());
        self.contexts.write().insert(handle, context);
        Ok(handle)
    }

    /// Tear the pipeline down. Unknown and already destroyed handles are
    /// ignored and report `false`.
    pub fn destroy_pipeline(&self, handle: ContextHandle) -> bool {
        let Some(context) = self.contexts.write().remove(&handle) else {
            log::debug!("destroy_pipeline: unknown handle {}", handle.as_raw());
            return false;
        };
        context.destroy()
    }

    pub fn start(&self, handle: ContextHandle) -> bool {
        self.report("start", self.with_context(handle, |c| c.start()))
    }

    pub fn stop(&self, handle: ContextHandle) -> bool {
        self.report("stop", self.with_context(handle, |c| c.stop()))
    }

    pub fn flush(&self, handle: ContextHandle, restart: bool) -> bool {
        self.report("flush", self.with_context(handle, |c| c.flush(restart)))
    }

    /// Current pipeline state, `Unknown` if it cannot be queried.
    pub fn state(&self, handle: ContextHandle) -> PipelineState {
        self.with_context(handle, |c| c.state())
            .unwrap_or_else(|e| {
                log::error!("state failed: {}", e);
                PipelineState::Unknown
            })
    }

    // ----- Elements -----

    pub fn input_data(&self, handle: ContextHandle, source: &str, data: TensorsData) -> bool {
        self.report(
            "input_data",
            self.with_context(handle, |c| c.input_data(source, data)),
        )
    }

    /// Pad names of a switch; empty if the switch cannot be resolved.
    pub fn switch_pads(&self, handle: ContextHandle, switch: &str) -> Vec<String> {
        self.with_context(handle, |c| c.switch_pads(switch))
            .unwrap_or_else(|e| {
                log::error!("switch_pads failed: {}", e);
                Vec::new()
            })
    }

    pub fn select_switch_pad(&self, handle: ContextHandle, switch: &str, pad: &str) -> bool {
        self.report(
            "select_switch_pad",
            self.with_context(handle, |c| c.select_switch_pad(switch, pad)),
        )
    }

    pub fn control_valve(&self, handle: ContextHandle, valve: &str, open: bool) -> bool {
        self.report(
            "control_valve",
            self.with_context(handle, |c| c.control_valve(valve, open)),
        )
    }

    pub fn add_sink_callback(&self, handle: ContextHandle, sink: &str) -> bool {
        self.report(
            "add_sink_callback",
            self.with_context(handle, |c| c.add_sink_callback(sink)),
        )
    }

    /// See [`PipelineContext::remove_sink_callback`] for the blocking rule.
    pub fn remove_sink_callback(&self, handle: ContextHandle, sink: &str) -> bool {
        self.report(
            "remove_sink_callback",
            self.with_context(handle, |c| c.remove_sink_callback(sink)),
        )
    }

    pub fn initialize_surface(
        &self,
        handle: ContextHandle,
        sink: &str,
        surface: &R::Surface,
    ) -> bool {
        let result = self.with_context(handle, |c| c.initialize_surface(sink, surface));
        if let Ok(BindOutcome::Redrawn) = result {
            log::debug!("{} already renders into this surface", sink);
        }
        self.report("initialize_surface", result.map(|_| ()))
    }

    pub fn finalize_surface(&self, handle: ContextHandle, sink: &str) -> bool {
        self.report(
            "finalize_surface",
            self.with_context(handle, |c| c.finalize_surface(sink)),
        )
    }

    pub fn element_available(&self, name: &str) -> bool {
        !name.is_empty() && self.engine.element_available(name)
    }

    // ----- Custom filters -----

    pub fn register_custom_filter(
        &self,
        name: &str,
        instance: R::Instance,
        input: TensorsInfo,
        output: TensorsInfo,
    ) -> Result<FilterHandle> {
        let filter = CustomFilter::register(
            self.engine.clone(),
            self.runtime.clone(),
            &self.config,
            name,
            instance,
            input,
            output,
        )?;
        let handle = FilterHandle(self.allocate());
        self.filters.write().insert(handle, Arc::new(filter));
        Ok(handle)
    }

    pub fn destroy_custom_filter(&self, handle: FilterHandle) -> bool {
        let Some(filter) = self.filters.write().remove(&handle) else {
            log::debug!("destroy_custom_filter: unknown handle {}", handle.as_raw());
            return false;
        };
        filter.destroy()
    }

    /// Destroy every pipeline and filter still registered.
    pub fn shutdown(&self) {
        let contexts: Vec<_> = self.contexts.write().drain().map(|(_, c)| c).collect();
        for context in contexts {
            context.destroy();
        }
        let filters: Vec<_> = self.filters.write().drain().map(|(_, f)| f).collect();
        for filter in filters {
            filter.destroy();
        }
    }
}

impl<E: Engine, R: ForeignRuntime> Drop for PipelineManager<E, R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
