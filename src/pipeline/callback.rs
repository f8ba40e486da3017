//! Engine-thread entry points.
//!
//! The closures built here are what the engine holds. They capture a `Weak`
//! to the owning context and, for sinks, the entry's token; everything else
//! is looked up through the context's registry at delivery time.

use std::sync::Weak;

use super::cache::DescriptorCache;
use super::context::PipelineContext;
use super::registry::{EntryData, EntryToken};
use crate::engine::{Engine, PipelineState, SinkListener, StateListener, TensorsData, TensorsInfo};
use crate::error::Result;
use crate::foreign::{AttachGuard, ForeignRuntime};

pub(super) fn state_listener<E: Engine, R: ForeignRuntime>(
    context: Weak<PipelineContext<E, R>>,
) -> StateListener {
    Box::new(move |state| {
        if let Some(context) = context.upgrade() {
            context.deliver_state(state);
        }
    })
}

pub(super) fn sink_listener<E: Engine, R: ForeignRuntime>(
    context: Weak<PipelineContext<E, R>>,
    token: EntryToken,
) -> SinkListener {
    Box::new(move |data: &TensorsData, info: &TensorsInfo| {
        if let Some(context) = context.upgrade() {
            context.deliver_sink_data(token, data, info);
        }
    })
}

impl<E: Engine, R: ForeignRuntime> PipelineContext<E, R> {
    fn deliver_state(&self, state: PipelineState) {
        // Held for the whole delivery; teardown waits on it. Re-entrant, so
        // a handler that starts or stops the pipeline can be told again.
        let slot = self.state_slot.lock();
        if !slot.get() || !self.registry.is_live() {
            return;
        }
        let Some(method) = self.methods.state_changed else {
            return;
        };

        let _attach = match AttachGuard::attach(&*self.runtime) {
            Ok(guard) => guard,
            Err(e) => {
                log::error!("Cannot report state {:?}: {}", state, e);
                return;
            }
        };
        if let Err(e) = self
            .runtime
            .call_state_changed(&self.instance, method, state.as_code())
        {
            log::warn!("State callback raised: {}", e);
        }
    }

    fn deliver_sink_data(&self, token: EntryToken, data: &TensorsData, info: &TensorsInfo) {
        let Some(entry) = self.registry.entry_by_token(token) else {
            log::trace!("Dropping buffer for retired sink token {}", token);
            return;
        };
        // Held for the whole delivery; teardown waits on it.
        let Some(mut state) = entry.lock() else {
            return;
        };
        if !self.registry.is_live() {
            return;
        }
        let EntryData::Sink(cache) = &mut state.data else {
            return;
        };

        if let Err(e) = self.forward_sink_data(entry.name(), cache, data, info) {
            log::warn!("Skipped buffer from {}: {}", entry.name(), e);
        }
    }

    fn forward_sink_data(
        &self,
        sink: &str,
        cache: &mut DescriptorCache<R::Object>,
        data: &TensorsData,
        info: &TensorsInfo,
    ) -> Result<()> {
        info.validate(self.limits.max_tensors, self.limits.max_rank)?;
        data.validate(info)?;

        let _attach = AttachGuard::attach(&*self.runtime)?;
        let info_object = cache.ensure_converted(info, |i| self.runtime.convert_info(i))?;
        let data_object = self.runtime.convert_data(data, info_object)?;
        self.runtime
            .call_new_data(&self.instance, self.methods.new_data, sink, &data_object)?;
        Ok(())
    }
}
