use std::cell::Cell;
use std::sync::{Arc, Weak};

use parking_lot::{ReentrantMutex, RwLock};

use super::callback;
use super::registry::{ElementEntry, ElementHandle, ElementRegistry, EntryData, EntryToken};
use super::surface::{BindOutcome, ElementOverlay};
use crate::config::{BridgeConfig, TensorLimits};
use crate::engine::{ElementKind, Engine, EngineStatus, PipelineState, TensorsData};
use crate::error::{BridgeError, Result};
use crate::foreign::{AttachGuard, ForeignRuntime};

/// Foreign entry points resolved once at construction.
pub(super) struct MethodIds<M> {
    pub state_changed: Option<M>,
    pub new_data: M,
}

/// One constructed pipeline and everything the bridge holds for it.
///
/// Owns the engine pipeline, the foreign instance it reports to and the
/// registry of every element resolved so far. Engine listeners hold only a
/// `Weak` to the context plus an [`EntryToken`].
pub struct PipelineContext<E: Engine, R: ForeignRuntime> {
    pub(super) weak_self: Weak<Self>,
    pub(super) engine: Arc<E>,
    pub(super) runtime: Arc<R>,
    pub(super) instance: R::Instance,
    pub(super) methods: MethodIds<R::MethodId>,
    pub(super) registry: ElementRegistry<E, R>,
    /// `true` while the state-changed callback may reach the instance.
    pub(super) state_slot: ReentrantMutex<Cell<bool>>,
    pub(super) limits: TensorLimits,
    /// Engine calls hold a recursive read guard; only teardown writes.
    pipeline: RwLock<Option<E::Pipeline>>,
}

fn destroyed() -> BridgeError {
    BridgeError::InvalidArgument("pipeline is destroyed".to_string())
}

impl<E: Engine, R: ForeignRuntime> PipelineContext<E, R> {
    /// Resolve the instance's entry points and build the engine pipeline.
    ///
    /// The state listener is installed only when `want_state_cb` is set.
    pub fn construct(
        engine: Arc<E>,
        runtime: Arc<R>,
        config: &BridgeConfig,
        description: &str,
        instance: R::Instance,
        want_state_cb: bool,
    ) -> Result<Arc<Self>> {
        if description.trim().is_empty() {
            return Err(BridgeError::InvalidArgument(
                "pipeline description is empty".to_string(),
            ));
        }

        let methods = {
            let _attach = AttachGuard::attach(&*runtime)?;
            let entry_points = &config.entry_points;
            let new_data = runtime.method_id(
                &instance,
                &entry_points.new_data.name,
                &entry_points.new_data.signature,
            )?;
            let state_changed = if want_state_cb {
                Some(runtime.method_id(
                    &instance,
                    &entry_points.state_changed.name,
                    &entry_points.state_changed.signature,
                )?)
            } else {
                None
            };
            MethodIds {
                state_changed,
                new_data,
            }
        };

        let context = Arc::new_cyclic(|weak| Self {
            weak_self: weak.clone(),
            engine,
            runtime,
            instance,
            methods,
            registry: ElementRegistry::new(),
            state_slot: ReentrantMutex::new(Cell::new(want_state_cb)),
            limits: config.limits,
            pipeline: RwLock::new(None),
        });

        let listener = want_state_cb.then(|| callback::state_listener(Arc::downgrade(&context)));
        let pipeline = context
            .engine
            .construct(description, listener)
            .map_err(|status| BridgeError::engine("construct", status))?;
        *context.pipeline.write() = Some(pipeline);

        log::info!("Constructed pipeline: {}", description);
        Ok(context)
    }

    pub fn is_live(&self) -> bool {
        self.registry.is_live()
    }

    /// Number of elements resolved so far.
    pub fn element_count(&self) -> usize {
        self.registry.len()
    }

    fn with_pipeline<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&E::Pipeline) -> std::result::Result<T, EngineStatus>,
    ) -> Result<T> {
        if !self.registry.is_live() {
            return Err(destroyed());
        }
        let pipeline = self.pipeline.read_recursive();
        let pipeline = pipeline.as_ref().ok_or_else(destroyed)?;
        f(pipeline).map_err(|status| BridgeError::engine(op, status))
    }

    pub fn start(&self) -> Result<()> {
        self.with_pipeline("start", |p| self.engine.start(p))
    }

    pub fn stop(&self) -> Result<()> {
        self.with_pipeline("stop", |p| self.engine.stop(p))
    }

    pub fn flush(&self, restart: bool) -> Result<()> {
        self.with_pipeline("flush", |p| self.engine.flush(p, restart))
    }

    pub fn state(&self) -> Result<PipelineState> {
        self.with_pipeline("state", |p| self.engine.state(p))
    }

    // ----- Element resolution -----

    fn resolve(&self, name: &str, kind: ElementKind) -> Result<Arc<ElementEntry<E, R>>> {
        let pipeline = self.pipeline.read_recursive();
        let pipeline = pipeline.as_ref().ok_or_else(destroyed)?;
        self.registry
            .resolve(name, kind, |token| self.acquire(pipeline, name, kind, token))
    }

    fn acquire(
        &self,
        pipeline: &E::Pipeline,
        name: &str,
        kind: ElementKind,
        token: EntryToken,
    ) -> Result<ElementHandle<E>> {
        let fail = |status: EngineStatus| BridgeError::resolution(name, kind, status.to_string());
        match kind {
            ElementKind::Source => self
                .engine
                .source_handle(pipeline, name)
                .map(ElementHandle::Source)
                .map_err(fail),
            ElementKind::Sink => {
                let listener = callback::sink_listener(self.weak_self.clone(), token);
                self.engine
                    .sink_register(pipeline, name, listener)
                    .map(ElementHandle::Sink)
                    .map_err(fail)
            }
            ElementKind::Switch => self
                .engine
                .switch_handle(pipeline, name)
                .map(|(kind, handle)| ElementHandle::Switch { kind, handle })
                .map_err(fail),
            ElementKind::Valve => self
                .engine
                .valve_handle(pipeline, name)
                .map(ElementHandle::Valve)
                .map_err(fail),
            ElementKind::VideoSink => {
                let element = self.engine.element_handle(pipeline, name).map_err(fail)?;
                if !self.engine.supports_video_overlay(&element) {
                    if let Err(status) = self.engine.release_element(element) {
                        log::warn!("Failed to release element {}: {}", name, status);
                    }
                    return Err(BridgeError::resolution(
                        name,
                        kind,
                        "element does not render into a window",
                    ));
                }
                Ok(ElementHandle::VideoSink(element))
            }
        }
    }

    // ----- Element control -----

    pub fn input_data(&self, source: &str, data: TensorsData) -> Result<()> {
        if data.is_empty() {
            return Err(BridgeError::InvalidArgument(format!(
                "no tensors to push into {}",
                source
            )));
        }
        let entry = self.resolve(source, ElementKind::Source)?;
        let state = entry.read().ok_or_else(destroyed)?;
        let Some(ElementHandle::Source(handle)) = &state.handle else {
            return Err(destroyed());
        };
        self.engine
            .input_data(handle, data)
            .map_err(|status| BridgeError::engine("input_data", status))
    }

    pub fn switch_pads(&self, switch: &str) -> Result<Vec<String>> {
        let entry = self.resolve(switch, ElementKind::Switch)?;
        let state = entry.read().ok_or_else(destroyed)?;
        let Some(ElementHandle::Switch { handle, .. }) = &state.handle else {
            return Err(destroyed());
        };
        self.engine
            .switch_pads(handle)
            .map_err(|status| BridgeError::engine("switch_pads", status))
    }

    pub fn select_switch_pad(&self, switch: &str, pad: &str) -> Result<()> {
        if pad.is_empty() {
            return Err(BridgeError::InvalidArgument("pad name is empty".to_string()));
        }
        let entry = self.resolve(switch, ElementKind::Switch)?;
        let state = entry.read().ok_or_else(destroyed)?;
        let Some(ElementHandle::Switch { handle, .. }) = &state.handle else {
            return Err(destroyed());
        };
        self.engine
            .switch_select(handle, pad)
            .map_err(|status| BridgeError::engine("switch_select", status))
    }

    pub fn control_valve(&self, valve: &str, open: bool) -> Result<()> {
        let entry = self.resolve(valve, ElementKind::Valve)?;
        let state = entry.read().ok_or_else(destroyed)?;
        let Some(ElementHandle::Valve(handle)) = &state.handle else {
            return Err(destroyed());
        };
        self.engine
            .valve_set_open(handle, open)
            .map_err(|status| BridgeError::engine("valve_set_open", status))
    }

    // ----- Sink callbacks -----

    /// Start delivering the sink's buffers to the instance. Adding an
    /// already registered sink is a no-op.
    pub fn add_sink_callback(&self, sink: &str) -> Result<()> {
        self.resolve(sink, ElementKind::Sink).map(|_| ())
    }

    /// Stop delivering the sink's buffers and unregister its listener.
    ///
    /// Blocks until a delivery already in progress for this sink returns.
    /// Must not be called from inside that sink's own callback.
    pub fn remove_sink_callback(&self, sink: &str) -> Result<()> {
        let _attach = AttachGuard::attach(&*self.runtime)?;
        if self.registry.remove_sink(sink, &*self.engine) {
            Ok(())
        } else {
            Err(BridgeError::InvalidArgument(format!(
                "no callback registered for sink {}",
                sink
            )))
        }
    }

    // ----- Video output -----

    /// Bind the window behind `surface` to a video sink.
    pub fn initialize_surface(&self, sink: &str, surface: &R::Surface) -> Result<BindOutcome> {
        let entry = self.resolve(sink, ElementKind::VideoSink)?;
        let _attach = AttachGuard::attach(&*self.runtime)?;
        let window = self.runtime.window_from_surface(surface).ok_or_else(|| {
            BridgeError::InvalidArgument(format!("surface for {} has no native window", sink))
        })?;

        let mut state = entry.lock().ok_or_else(destroyed)?;
        let state = &mut *state;
        let (EntryData::VideoSink(binding), Some(ElementHandle::VideoSink(element))) =
            (&mut state.data, &state.handle)
        else {
            return Err(destroyed());
        };
        let overlay = ElementOverlay {
            engine: &*self.engine,
            element,
        };
        binding
            .initialize(window, &overlay)
            .map_err(|status| BridgeError::engine("set_window_handle", status))
    }

    /// Unbind a video sink from its window and release the windows it holds.
    pub fn finalize_surface(&self, sink: &str) -> Result<()> {
        let entry = self.registry.get(sink).ok_or_else(|| {
            BridgeError::InvalidArgument(format!("no surface bound to {}", sink))
        })?;
        let _attach = AttachGuard::attach(&*self.runtime)?;

        let mut state = entry.lock().ok_or_else(destroyed)?;
        let state = &mut *state;
        let (EntryData::VideoSink(binding), Some(ElementHandle::VideoSink(element))) =
            (&mut state.data, &state.handle)
        else {
            return Err(BridgeError::InvalidArgument(format!(
                "{} is not a video sink",
                sink
            )));
        };
        let overlay = ElementOverlay {
            engine: &*self.engine,
            element,
        };
        binding
            .finalize(&overlay)
            .map_err(|status| BridgeError::engine("set_window_handle", status))
    }

    // ----- Teardown -----

    /// Tear the context down. Returns `false` if it was already torn down.
    ///
    /// Waits for in-flight callbacks to return. Must not be called from
    /// inside one of this context's callbacks.
    pub fn destroy(&self) -> bool {
        let Some(entries) = self.registry.close() else {
            return false;
        };
        if self.pipeline.read().is_none() {
            // Construction failed, so nothing was built or resolved.
            return false;
        }

        // No state delivery starts after this.
        self.state_slot.lock().set(false);

        {
            let _attach = AttachGuard::attach(&*self.runtime)
                .inspect_err(|e| log::warn!("Releasing elements without attaching: {}", e))
                .ok();
            let released = ElementRegistry::release_entries(entries, &*self.engine);
            log::debug!("Released {} element(s)", released);
        }

        if let Some(pipeline) = self.pipeline.write().take()
            && let Err(status) = self.engine.destroy(pipeline)
        {
            log::error!("Failed to destroy pipeline: {}", status);
        }

        log::info!("Pipeline destroyed");
        true
    }
}

impl<E: Engine, R: ForeignRuntime> Drop for PipelineContext<E, R> {
    fn drop(&mut self) {
        self.destroy();
    }
}
