use super::types::*;

/// Called on an engine thread whenever the whole pipeline changes state.
pub type StateListener = Box<dyn Fn(PipelineState) + Send + Sync>;

/// Called on an engine streaming thread for every buffer reaching a sink.
pub type SinkListener = Box<dyn Fn(&TensorsData, &TensorsInfo) + Send + Sync>;

/// Called on an engine streaming thread for every buffer entering a custom
/// filter.
pub type FilterInvoker = Box<dyn Fn(&TensorsData) -> InvokeOutcome + Send + Sync>;

/// Result of one custom-filter invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeOutcome {
    /// Push the produced buffer downstream.
    Continue(TensorsData),
    /// Drop the incoming buffer without producing output.
    Drop,
    /// Processing failed; the engine decides how to react.
    Error,
}

impl InvokeOutcome {
    /// Status code in the engine's convention: 0 ok, 1 drop, negative error.
    pub fn code(&self) -> i32 {
        match self {
            Self::Continue(_) => 0,
            Self::Drop => 1,
            Self::Error => -1,
        }
    }
}

/// The native pipeline engine.
///
/// Handles are owned values: whoever holds one is responsible for handing it
/// back through the matching `release_*` call. Listener closures may be
/// invoked from any engine thread, concurrently for different sinks, but
/// never concurrently for the same sink.
///
/// Implementations must not invoke a listener synchronously from inside the
/// call that registers it. Any other call may fire listeners on the calling
/// thread, and control calls may run concurrently on a shared handle, so
/// element and pipeline handles are `Sync`.
pub trait Engine: Send + Sync + 'static {
    type Pipeline: Send + Sync;
    type Source: Send + Sync;
    type Sink: Send + Sync;
    type Switch: Send + Sync;
    type Valve: Send + Sync;
    type Element: Send + Sync;
    type CustomFilter: Send;

    // ----- Pipeline -----

    fn construct(
        &self,
        description: &str,
        state_listener: Option<StateListener>,
    ) -> Result<Self::Pipeline, EngineStatus>;
    fn destroy(&self, pipeline: Self::Pipeline) -> Result<(), EngineStatus>;
    fn start(&self, pipeline: &Self::Pipeline) -> Result<(), EngineStatus>;
    fn stop(&self, pipeline: &Self::Pipeline) -> Result<(), EngineStatus>;
    fn flush(&self, pipeline: &Self::Pipeline, restart: bool) -> Result<(), EngineStatus>;
    fn state(&self, pipeline: &Self::Pipeline) -> Result<PipelineState, EngineStatus>;

    /// Whether an element factory with this name is installed.
    fn element_available(&self, name: &str) -> bool;

    // ----- Sources -----

    fn source_handle(
        &self,
        pipeline: &Self::Pipeline,
        name: &str,
    ) -> Result<Self::Source, EngineStatus>;
    fn release_source(&self, source: Self::Source) -> Result<(), EngineStatus>;
    fn input_data(&self, source: &Self::Source, data: TensorsData) -> Result<(), EngineStatus>;

    // ----- Sinks -----

    fn sink_register(
        &self,
        pipeline: &Self::Pipeline,
        name: &str,
        listener: SinkListener,
    ) -> Result<Self::Sink, EngineStatus>;
    fn sink_unregister(&self, sink: Self::Sink) -> Result<(), EngineStatus>;

    // ----- Switches -----

    fn switch_handle(
        &self,
        pipeline: &Self::Pipeline,
        name: &str,
    ) -> Result<(SwitchKind, Self::Switch), EngineStatus>;
    fn release_switch(&self, switch: Self::Switch) -> Result<(), EngineStatus>;
    fn switch_pads(&self, switch: &Self::Switch) -> Result<Vec<String>, EngineStatus>;
    fn switch_select(&self, switch: &Self::Switch, pad: &str) -> Result<(), EngineStatus>;

    // ----- Valves -----

    fn valve_handle(&self, pipeline: &Self::Pipeline, name: &str)
    -> Result<Self::Valve, EngineStatus>;
    fn release_valve(&self, valve: Self::Valve) -> Result<(), EngineStatus>;
    fn valve_set_open(&self, valve: &Self::Valve, open: bool) -> Result<(), EngineStatus>;

    // ----- Generic elements / video output -----

    fn element_handle(
        &self,
        pipeline: &Self::Pipeline,
        name: &str,
    ) -> Result<Self::Element, EngineStatus>;
    fn release_element(&self, element: Self::Element) -> Result<(), EngineStatus>;
    /// Whether the renderable object behind this element accepts a window.
    fn supports_video_overlay(&self, element: &Self::Element) -> bool;
    /// Bind (`Some`) or unbind (`None`) the window the element renders into.
    fn set_window_handle(
        &self,
        element: &Self::Element,
        window: Option<WindowHandle>,
    ) -> Result<(), EngineStatus>;
    /// Ask the element to redraw its last frame.
    fn expose(&self, element: &Self::Element) -> Result<(), EngineStatus>;

    // ----- Custom filters -----

    fn register_custom_filter(
        &self,
        name: &str,
        input: &TensorsInfo,
        output: &TensorsInfo,
        invoker: FilterInvoker,
    ) -> Result<Self::CustomFilter, EngineStatus>;
    fn unregister_custom_filter(&self, filter: Self::CustomFilter) -> Result<(), EngineStatus>;
}
