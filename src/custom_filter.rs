//! Foreign objects registered as in-pipeline filters.
//!
//! The engine calls the filter's invoker on a streaming thread for every
//! buffer. The invoker converts the buffer, calls the instance's `invoke`
//! entry point and copies the result back. Teardown follows the same rule
//! as pipeline contexts: once the filter is marked dead under its lock, no
//! invocation reaches the foreign side again.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::config::BridgeConfig;
use crate::engine::{Engine, FilterInvoker, InvokeOutcome, TensorsData, TensorsInfo};
use crate::error::{BridgeError, Result};
use crate::foreign::{AttachGuard, ForeignRuntime};
use crate::pipeline::DescriptorCache;

struct FilterState<O> {
    live: bool,
    input: DescriptorCache<O>,
}

/// The part of a filter the engine's invoker can reach.
struct FilterShared<R: ForeignRuntime> {
    name: String,
    runtime: Arc<R>,
    instance: R::Instance,
    invoke: R::MethodId,
    input_info: TensorsInfo,
    output_info: TensorsInfo,
    state: Mutex<FilterState<R::Object>>,
}

impl<R: ForeignRuntime> FilterShared<R> {
    fn invoke(&self, data: &TensorsData) -> InvokeOutcome {
        let mut state = self.state.lock();
        if !state.live {
            return InvokeOutcome::Error;
        }
        match self.try_invoke(&mut state.input, data) {
            Ok(Some(output)) => InvokeOutcome::Continue(output),
            Ok(None) => InvokeOutcome::Drop,
            Err(e) => {
                log::warn!("Custom filter {} failed: {}", self.name, e);
                InvokeOutcome::Error
            }
        }
    }

    fn try_invoke(
        &self,
        cache: &mut DescriptorCache<R::Object>,
        data: &TensorsData,
    ) -> Result<Option<TensorsData>> {
        data.validate(&self.input_info)?;

        let _attach = AttachGuard::attach(&*self.runtime)?;
        let info = cache.ensure_converted(&self.input_info, |i| self.runtime.convert_info(i))?;
        let input = self.runtime.convert_data(data, info)?;
        let Some(output) = self.runtime.call_invoke(&self.instance, self.invoke, &input)? else {
            return Ok(None);
        };

        let output = self.runtime.parse_data(&output)?;
        output.validate(&self.output_info)?;
        Ok(Some(output))
    }
}

fn invoker<R: ForeignRuntime>(shared: Weak<FilterShared<R>>) -> FilterInvoker {
    Box::new(move |data: &TensorsData| match shared.upgrade() {
        Some(shared) => shared.invoke(data),
        None => InvokeOutcome::Error,
    })
}

pub struct CustomFilter<E: Engine, R: ForeignRuntime> {
    engine: Arc<E>,
    shared: Arc<FilterShared<R>>,
    handle: Mutex<Option<E::CustomFilter>>,
}

impl<E: Engine, R: ForeignRuntime> CustomFilter<E, R> {
    /// Register `instance` with the engine as the filter `name`.
    pub fn register(
        engine: Arc<E>,
        runtime: Arc<R>,
        config: &BridgeConfig,
        name: &str,
        instance: R::Instance,
        input_info: TensorsInfo,
        output_info: TensorsInfo,
    ) -> Result<Self> {
        if name.is_empty() {
            return Err(BridgeError::InvalidArgument(
                "custom filter name is empty".to_string(),
            ));
        }
        let limits = config.limits;
        input_info.validate(limits.max_tensors, limits.max_rank)?;
        output_info.validate(limits.max_tensors, limits.max_rank)?;

        let invoke = {
            let _attach = AttachGuard::attach(&*runtime)?;
            let entry_point = &config.entry_points.invoke;
            runtime.method_id(&instance, &entry_point.name, &entry_point.signature)?
        };

        let shared = Arc::new(FilterShared {
            name: name.to_string(),
            runtime,
            instance,
            invoke,
            input_info,
            output_info,
            state: Mutex::new(FilterState {
                live: true,
                input: DescriptorCache::new(),
            }),
        });

        let handle = engine
            .register_custom_filter(
                name,
                &shared.input_info,
                &shared.output_info,
                invoker(Arc::downgrade(&shared)),
            )
            .map_err(|status| BridgeError::engine("register_custom_filter", status))?;

        log::info!("Registered custom filter {}", name);
        Ok(Self {
            engine,
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn is_live(&self) -> bool {
        self.shared.state.lock().live
    }

    /// Unregister from the engine. Returns `false` if already destroyed.
    ///
    /// Waits for an invocation in progress to return.
    pub fn destroy(&self) -> bool {
        {
            let mut state = self.shared.state.lock();
            if !state.live {
                return false;
            }
            state.live = false;

            let _attach = AttachGuard::attach(&*self.shared.runtime)
                .inspect_err(|e| log::warn!("Releasing filter state without attaching: {}", e))
                .ok();
            state.input.clear();
        }

        if let Some(handle) = self.handle.lock().take()
            && let Err(status) = self.engine.unregister_custom_filter(handle)
        {
            log::error!("Failed to unregister custom filter {}: {}", self.name(), status);
        }

        log::info!("Destroyed custom filter {}", self.name());
        true
    }
}

impl<E: Engine, R: ForeignRuntime> Drop for CustomFilter<E, R> {
    fn drop(&mut self) {
        self.destroy();
    }
}
