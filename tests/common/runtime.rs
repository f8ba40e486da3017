//! Recording foreign runtime
//!
//! Every object and window it hands out holds a live-reference count, so a
//! test can check nothing was leaked. Foreign calls are recorded in order and
//! can be slowed down to widen race windows.

use std::cell::Cell;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use tensor_bridge::engine::{TensorsData, TensorsInfo, WindowHandle};
use tensor_bridge::error::{BridgeError, Result};
use tensor_bridge::foreign::{ForeignException, ForeignRuntime, PlatformWindow};

use super::{Journal, POISON};

thread_local! {
    static ATTACHED: Cell<bool> = const { Cell::new(false) };
}

struct LiveRef(Arc<AtomicUsize>);

impl LiveRef {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for LiveRef {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct MockInstance {
    pub id: u32,
}

pub enum Payload {
    Info(TensorsInfo),
    Data(TensorsData),
}

pub struct MockObject {
    pub payload: Payload,
    _live: LiveRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    StateChanged,
    NewData,
    Invoke,
}

pub struct MockSurface {
    pub window: Option<WindowHandle>,
}

impl MockSurface {
    pub fn new(window: WindowHandle) -> Self {
        Self {
            window: Some(window),
        }
    }

    pub fn detached() -> Self {
        Self { window: None }
    }
}

pub struct MockWindow {
    handle: WindowHandle,
    journal: Journal,
    _live: LiveRef,
}

impl PlatformWindow for MockWindow {
    fn raw_handle(&self) -> WindowHandle {
        self.handle
    }
}

impl Drop for MockWindow {
    fn drop(&mut self) {
        self.journal
            .lock()
            .push(format!("window:release:{:#x}", self.handle));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    State(i32),
    NewData { sink: String, data: TensorsData },
    Invoke(TensorsData),
}

/// Runs on the calling thread after each recorded foreign call.
pub type CallHook = Arc<dyn Fn(&Call) + Send + Sync>;

#[derive(Debug, Clone)]
pub enum InvokeScript {
    Echo,
    Drop,
    Raise,
    Return(TensorsData),
}

pub struct RecordingRuntime {
    journal: Journal,
    pub live_objects: Arc<AtomicUsize>,
    pub live_windows: Arc<AtomicUsize>,
    pub info_conversions: AtomicUsize,
    pub data_conversions: AtomicUsize,
    pub attaches: AtomicUsize,
    pub detaches: AtomicUsize,
    pub unattached_calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    calls: Mutex<Vec<Call>>,
    call_delay: Mutex<Duration>,
    invoke_script: Mutex<InvokeScript>,
    missing_methods: Mutex<HashSet<String>>,
    raise_on_state: AtomicBool,
    on_call: Mutex<Option<CallHook>>,
}

impl RecordingRuntime {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            live_objects: Arc::new(AtomicUsize::new(0)),
            live_windows: Arc::new(AtomicUsize::new(0)),
            info_conversions: AtomicUsize::new(0),
            data_conversions: AtomicUsize::new(0),
            attaches: AtomicUsize::new(0),
            detaches: AtomicUsize::new(0),
            unattached_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            call_delay: Mutex::new(Duration::ZERO),
            invoke_script: Mutex::new(InvokeScript::Echo),
            missing_methods: Mutex::new(HashSet::new()),
            raise_on_state: AtomicBool::new(false),
            on_call: Mutex::new(None),
        }
    }

    pub fn instance(&self) -> MockInstance {
        MockInstance { id: 1 }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn new_data_calls(&self) -> Vec<(String, TensorsData)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::NewData { sink, data } => Some((sink.clone(), data.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn state_calls(&self) -> Vec<i32> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::State(code) => Some(*code),
                _ => None,
            })
            .collect()
    }

    pub fn set_call_delay(&self, delay: Duration) {
        *self.call_delay.lock() = delay;
    }

    pub fn set_invoke_script(&self, script: InvokeScript) {
        *self.invoke_script.lock() = script;
    }

    pub fn remove_method(&self, name: &str) {
        self.missing_methods.lock().insert(name.to_string());
    }

    pub fn raise_on_state(&self, raise: bool) {
        self.raise_on_state.store(raise, Ordering::SeqCst);
    }

    /// Install `hook` in place of a foreign handler body, e.g. one that
    /// calls back into the bridge.
    pub fn set_on_call(&self, hook: impl Fn(&Call) + Send + Sync + 'static) {
        *self.on_call.lock() = Some(Arc::new(hook));
    }

    pub fn clear_on_call(&self) {
        *self.on_call.lock() = None;
    }

    pub fn live_objects(&self) -> usize {
        self.live_objects.load(Ordering::SeqCst)
    }

    pub fn live_windows(&self) -> usize {
        self.live_windows.load(Ordering::SeqCst)
    }

    fn object(&self, payload: Payload) -> MockObject {
        MockObject {
            payload,
            _live: LiveRef::new(&self.live_objects),
        }
    }

    /// Book-keeping shared by the three entry points.
    fn enter_call(&self, call: Call, label: String) {
        if !ATTACHED.with(Cell::get) {
            self.unattached_calls.fetch_add(1, Ordering::SeqCst);
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.journal.lock().push(format!("foreign:begin:{}", label));
        let delay = *self.call_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.calls.lock().push(call.clone());
        self.journal.lock().push(format!("foreign:end:{}", label));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let hook = self.on_call.lock().clone();
        if let Some(hook) = hook {
            hook(&call);
        }
    }
}

impl ForeignRuntime for RecordingRuntime {
    type Instance = MockInstance;
    type Object = MockObject;
    type MethodId = Method;
    type Surface = MockSurface;
    type Window = MockWindow;

    fn attach_current_thread(&self) -> Result<bool> {
        let newly = !ATTACHED.with(|a| a.replace(true));
        if newly {
            self.attaches.fetch_add(1, Ordering::SeqCst);
        }
        Ok(newly)
    }

    fn detach_current_thread(&self) {
        ATTACHED.with(|a| a.set(false));
        self.detaches.fetch_add(1, Ordering::SeqCst);
    }

    fn method_id(&self, _instance: &MockInstance, name: &str, _signature: &str) -> Result<Method> {
        if self.missing_methods.lock().contains(name) {
            return Err(BridgeError::InvalidArgument(format!("no method {}", name)));
        }
        match name {
            "stateChanged" => Ok(Method::StateChanged),
            "newDataReceived" => Ok(Method::NewData),
            "invoke" => Ok(Method::Invoke),
            _ => Err(BridgeError::InvalidArgument(format!("no method {}", name))),
        }
    }

    fn convert_info(&self, info: &TensorsInfo) -> Result<MockObject> {
        self.info_conversions.fetch_add(1, Ordering::SeqCst);
        Ok(self.object(Payload::Info(info.clone())))
    }

    fn convert_data(&self, data: &TensorsData, info: &MockObject) -> Result<MockObject> {
        let Payload::Info(_) = &info.payload else {
            return Err(BridgeError::Conversion("descriptor object expected".to_string()));
        };
        if data.buffers.iter().any(|b| b.first() == Some(&POISON)) {
            return Err(BridgeError::Conversion("poisoned buffer".to_string()));
        }
        self.data_conversions.fetch_add(1, Ordering::SeqCst);
        Ok(self.object(Payload::Data(data.clone())))
    }

    fn parse_data(&self, data: &MockObject) -> Result<TensorsData> {
        match &data.payload {
            Payload::Data(data) => Ok(data.clone()),
            Payload::Info(_) => Err(BridgeError::Conversion("data object expected".to_string())),
        }
    }

    fn window_from_surface(&self, surface: &MockSurface) -> Option<MockWindow> {
        let handle = surface.window?;
        Some(MockWindow {
            handle,
            journal: self.journal.clone(),
            _live: LiveRef::new(&self.live_windows),
        })
    }

    fn call_state_changed(
        &self,
        _instance: &MockInstance,
        method: Method,
        state: i32,
    ) -> std::result::Result<(), ForeignException> {
        assert_eq!(method, Method::StateChanged);
        self.enter_call(Call::State(state), format!("state:{}", state));
        if self.raise_on_state.load(Ordering::SeqCst) {
            return Err(ForeignException::new("state handler raised"));
        }
        Ok(())
    }

    fn call_new_data(
        &self,
        _instance: &MockInstance,
        method: Method,
        sink_name: &str,
        data: &MockObject,
    ) -> std::result::Result<(), ForeignException> {
        assert_eq!(method, Method::NewData);
        let Payload::Data(data) = &data.payload else {
            return Err(ForeignException::new("data object expected"));
        };
        self.enter_call(
            Call::NewData {
                sink: sink_name.to_string(),
                data: data.clone(),
            },
            format!("new_data:{}", sink_name),
        );
        Ok(())
    }

    fn call_invoke(
        &self,
        _instance: &MockInstance,
        method: Method,
        input: &MockObject,
    ) -> std::result::Result<Option<MockObject>, ForeignException> {
        assert_eq!(method, Method::Invoke);
        let Payload::Data(input) = &input.payload else {
            return Err(ForeignException::new("data object expected"));
        };
        self.enter_call(Call::Invoke(input.clone()), "invoke".to_string());
        let script = self.invoke_script.lock().clone();
        match script {
            InvokeScript::Echo => Ok(Some(self.object(Payload::Data(input.clone())))),
            InvokeScript::Drop => Ok(None),
            InvokeScript::Raise => Err(ForeignException::new("invoke raised")),
            InvokeScript::Return(output) => Ok(Some(self.object(Payload::Data(output)))),
        }
    }
}
